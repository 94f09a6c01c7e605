//! SQLite storage backend.
//!
//! All multi-statement writes go through a transaction; a grouping pass is
//! committed as one atomic replacement of the groups table plus role
//! assignments, so a storage failure never leaves a partial group set
//! visible.

use anyhow::Result;
use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use super::records::{
    ConflictKind, DuplicateGroup, FileRecord, FingerprintRecord, GroupMember, GroupTier,
    ManualOverride, MemberRole, NewFileRecord, OverrideScope,
};
use super::schema::{MIGRATIONS, SCHEMA};
use crate::fingerprint::{HashKind, PerceptualHash};

/// A group computed by a grouping pass, before it has a database id.
#[derive(Debug, Clone)]
pub struct PendingGroup {
    pub tier: GroupTier,
    pub original_id: i64,
    /// (file id, role) in deterministic member order.
    pub members: Vec<(i64, MemberRole)>,
    pub confidence: f64,
    pub hash_kind: Option<HashKind>,
    pub distance: Option<u32>,
    pub dimension_tolerance: Option<f64>,
}

/// A conflict to record alongside a pass commit. `group_idx` indexes into
/// the pending group slice since database ids do not exist yet.
#[derive(Debug, Clone)]
pub struct NewConflict {
    pub group_idx: usize,
    pub auto_id: i64,
    pub manual_id: i64,
    pub kind: ConflictKind,
    pub reason: String,
}

/// One row of the persisted conflict log.
#[derive(Debug, Clone)]
pub struct StoredConflict {
    pub id: i64,
    pub group_id: i64,
    pub auto_id: i64,
    pub manual_id: i64,
    pub kind: ConflictKind,
    pub reason: String,
    pub created_at: String,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        for migration in MIGRATIONS {
            let _ = self.conn.execute(migration, []);
        }
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // ========================================================================
    // File operations
    // ========================================================================

    /// Insert a file row, or refresh the existing row for the same path.
    /// Clears the missing flag either way. Returns the file id.
    pub fn upsert_file(&self, file: &NewFileRecord) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO files (path, size_bytes, modified_at, width, height, taken_at, camera, format, missing)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(path) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                modified_at = excluded.modified_at,
                width = excluded.width,
                height = excluded.height,
                taken_at = excluded.taken_at,
                camera = excluded.camera,
                format = excluded.format,
                missing = 0,
                scanned_at = CURRENT_TIMESTAMP
            "#,
            rusqlite::params![
                file.path,
                file.size_bytes,
                file.modified_at,
                file.width,
                file.height,
                file.taken_at.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
                file.camera,
                file.format,
            ],
        )?;

        let id: i64 = self.conn.query_row(
            "SELECT id FROM files WHERE path = ?",
            [&file.path],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_file(&self, id: i64) -> Result<Option<FileRecord>> {
        let result = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?", FILE_SELECT),
                [id],
                row_to_file,
            )
            .optional()?;
        Ok(result)
    }

    pub fn get_file_by_path(&self, path: &str) -> Result<Option<FileRecord>> {
        let result = self
            .conn
            .query_row(
                &format!("{} WHERE path = ?", FILE_SELECT),
                [path],
                row_to_file,
            )
            .optional()?;
        Ok(result)
    }

    /// All files not marked missing.
    pub fn active_files(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE missing = 0 ORDER BY id", FILE_SELECT))?;
        let files = stmt
            .query_map([], row_to_file)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    /// (id, path) pairs for every active file under a directory prefix.
    pub fn paths_under(&self, directory: &str) -> Result<Vec<(i64, String)>> {
        let pattern = format!("{}%", directory);
        let mut stmt = self
            .conn
            .prepare("SELECT id, path FROM files WHERE missing = 0 AND path LIKE ?")?;
        let rows = stmt
            .query_map([pattern], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_missing(&self, file_id: i64, missing: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE files SET missing = ? WHERE id = ?",
            rusqlite::params![missing as i32, file_id],
        )?;
        Ok(())
    }

    // ========================================================================
    // Fingerprint operations
    // ========================================================================

    /// Store or replace the fingerprint for one file. Row-per-file, so
    /// concurrent stores for different files never contend on data.
    pub fn store_fingerprint(&self, fp: &FingerprintRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO fingerprints
                (file_id, fast_hash, sha256, phash_mean, phash_gradient, phash_dct, signature)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            rusqlite::params![
                fp.file_id,
                fp.fast_hash,
                fp.sha256,
                fp.hash_of_kind(HashKind::Mean).map(|h| h.bits.as_slice()),
                fp.hash_of_kind(HashKind::Gradient).map(|h| h.bits.as_slice()),
                fp.hash_of_kind(HashKind::Dct).map(|h| h.bits.as_slice()),
                fp.signature.as_deref(),
            ],
        )?;
        Ok(())
    }

    pub fn get_fingerprint(&self, file_id: i64) -> Result<Option<FingerprintRecord>> {
        let result = self
            .conn
            .query_row(
                r#"
                SELECT file_id, fast_hash, sha256, phash_mean, phash_gradient, phash_dct, signature
                FROM fingerprints WHERE file_id = ?
                "#,
                [file_id],
                row_to_fingerprint,
            )
            .optional()?;
        Ok(result)
    }

    /// Point-in-time read of every active file with its fingerprint, the
    /// input snapshot for one grouping pass. This is the only read whose
    /// failure is fatal to a pass.
    pub fn load_snapshot(&self) -> Result<Vec<(FileRecord, Option<FingerprintRecord>)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT f.id, f.path, f.size_bytes, f.modified_at, f.width, f.height,
                   f.taken_at, f.camera, f.format, f.missing,
                   fp.file_id, fp.fast_hash, fp.sha256,
                   fp.phash_mean, fp.phash_gradient, fp.phash_dct, fp.signature
            FROM files f
            LEFT JOIN fingerprints fp ON fp.file_id = f.id
            WHERE f.missing = 0
            ORDER BY f.id
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                let file = row_to_file(row)?;
                let fp = if row.get::<_, Option<i64>>(10)?.is_some() {
                    Some(FingerprintRecord {
                        file_id: row.get(10)?,
                        fast_hash: row.get(11)?,
                        sha256: row.get(12)?,
                        perceptual: perceptual_from_columns(
                            row.get(13)?,
                            row.get(14)?,
                            row.get(15)?,
                        ),
                        signature: row.get(16)?,
                    })
                } else {
                    None
                };
                Ok((file, fp))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ========================================================================
    // Grouping pass commit
    // ========================================================================

    /// Atomically replace all groups and role assignments with the output of
    /// a pass, record its conflicts, and apply override bookkeeping
    /// (re-attachment to new group ids, deactivations). Returns the new
    /// group ids in input order.
    pub fn commit_grouping_pass(
        &self,
        groups: &[PendingGroup],
        conflicts: &[NewConflict],
        override_moves: &[(i64, usize)],
        override_deactivations: &[i64],
    ) -> Result<Vec<i64>> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute("DELETE FROM group_members", [])?;
        tx.execute("DELETE FROM duplicate_groups", [])?;

        let mut group_ids = Vec::with_capacity(groups.len());
        for group in groups {
            tx.execute(
                r#"
                INSERT INTO duplicate_groups
                    (tier, original_id, confidence, hash_kind, distance, dimension_tolerance)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
                rusqlite::params![
                    group.tier.as_str(),
                    group.original_id,
                    group.confidence,
                    group.hash_kind.map(|k| k.as_str()),
                    group.distance,
                    group.dimension_tolerance,
                ],
            )?;
            let group_id = tx.last_insert_rowid();
            group_ids.push(group_id);

            for (file_id, role) in &group.members {
                tx.execute(
                    "INSERT INTO group_members (group_id, file_id, role) VALUES (?, ?, ?)",
                    rusqlite::params![group_id, file_id, role.as_str()],
                )?;
            }
        }

        for conflict in conflicts {
            tx.execute(
                r#"
                INSERT INTO conflicts (group_id, auto_id, manual_id, kind, reason)
                VALUES (?, ?, ?, ?, ?)
                "#,
                rusqlite::params![
                    group_ids[conflict.group_idx],
                    conflict.auto_id,
                    conflict.manual_id,
                    conflict.kind.as_str(),
                    conflict.reason,
                ],
            )?;
        }

        for &(override_id, group_idx) in override_moves {
            tx.execute(
                "UPDATE overrides SET group_id = ? WHERE id = ?",
                rusqlite::params![group_ids[group_idx], override_id],
            )?;
        }

        for &override_id in override_deactivations {
            tx.execute(
                "UPDATE overrides SET active = 0 WHERE id = ?",
                rusqlite::params![override_id],
            )?;
        }

        tx.commit()?;
        Ok(group_ids)
    }

    // ========================================================================
    // Group queries
    // ========================================================================

    pub fn list_groups(&self) -> Result<Vec<DuplicateGroup>> {
        let mut stmt = self.conn.prepare(&format!("{} ORDER BY id", GROUP_SELECT))?;
        let groups = stmt
            .query_map([], row_to_group)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    pub fn get_group(&self, group_id: i64) -> Result<Option<DuplicateGroup>> {
        let result = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?", GROUP_SELECT),
                [group_id],
                row_to_group,
            )
            .optional()?;
        Ok(result)
    }

    pub fn group_members(&self, group_id: i64) -> Result<Vec<GroupMember>> {
        let mut stmt = self.conn.prepare(
            "SELECT group_id, file_id, role FROM group_members WHERE group_id = ? ORDER BY file_id",
        )?;
        let members = stmt
            .query_map([group_id], |row| {
                let role: String = row.get(2)?;
                Ok(GroupMember {
                    group_id: row.get(0)?,
                    file_id: row.get(1)?,
                    role: MemberRole::parse(&role).unwrap_or(MemberRole::Duplicate),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(members)
    }

    /// The group a file currently belongs to, if any. Membership is disjoint
    /// by construction so there is at most one.
    pub fn group_containing(&self, file_id: i64) -> Result<Option<i64>> {
        let result = self
            .conn
            .query_row(
                "SELECT group_id FROM group_members WHERE file_id = ?",
                [file_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    pub fn set_member_role(&self, group_id: i64, file_id: i64, role: MemberRole) -> Result<()> {
        self.conn.execute(
            "UPDATE group_members SET role = ? WHERE group_id = ? AND file_id = ?",
            rusqlite::params![role.as_str(), group_id, file_id],
        )?;
        Ok(())
    }

    /// Re-label every member of a group in one transaction: the chosen file
    /// becomes the original, everything else a plain duplicate. Also updates
    /// the group's original_id, keeping the one-original invariant.
    pub fn relabel_group(&self, group_id: i64, original_id: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE group_members SET role = ? WHERE group_id = ?",
            rusqlite::params![MemberRole::Duplicate.as_str(), group_id],
        )?;
        tx.execute(
            "UPDATE group_members SET role = ? WHERE group_id = ? AND file_id = ?",
            rusqlite::params![MemberRole::Original.as_str(), group_id, original_id],
        )?;
        tx.execute(
            "UPDATE duplicate_groups SET original_id = ? WHERE id = ?",
            rusqlite::params![original_id, group_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ========================================================================
    // Override operations
    // ========================================================================

    /// Insert a new override for a group, deactivating any existing active
    /// one in the same transaction (the one-active-per-group invariant).
    pub fn insert_override(
        &self,
        group_id: i64,
        preferred_id: i64,
        auto_id: i64,
        scope: OverrideScope,
        reason: &str,
        notes: Option<&str>,
    ) -> Result<ManualOverride> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE overrides SET active = 0 WHERE group_id = ? AND active = 1",
            [group_id],
        )?;
        tx.execute(
            r#"
            INSERT INTO overrides (group_id, preferred_id, auto_id, scope, reason, notes, active)
            VALUES (?, ?, ?, ?, ?, ?, 1)
            "#,
            rusqlite::params![group_id, preferred_id, auto_id, scope.as_str(), reason, notes],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        let inserted = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?", OVERRIDE_SELECT),
                [id],
                row_to_override,
            )?;
        Ok(inserted)
    }

    pub fn active_override(&self, group_id: i64) -> Result<Option<ManualOverride>> {
        let result = self
            .conn
            .query_row(
                &format!("{} WHERE group_id = ? AND active = 1", OVERRIDE_SELECT),
                [group_id],
                row_to_override,
            )
            .optional()?;
        Ok(result)
    }

    pub fn list_overrides(&self, active_only: bool) -> Result<Vec<ManualOverride>> {
        let sql = if active_only {
            format!("{} WHERE active = 1 ORDER BY id", OVERRIDE_SELECT)
        } else {
            format!("{} ORDER BY id", OVERRIDE_SELECT)
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let overrides = stmt
            .query_map([], row_to_override)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(overrides)
    }

    /// Deactivate the active override for a group. Returns it, if there was one.
    pub fn deactivate_override(&self, group_id: i64) -> Result<Option<ManualOverride>> {
        let existing = self.active_override(group_id)?;
        if let Some(ref ov) = existing {
            self.conn.execute(
                "UPDATE overrides SET active = 0 WHERE id = ?",
                [ov.id],
            )?;
        }
        Ok(existing)
    }

    // ========================================================================
    // Conflict log
    // ========================================================================

    pub fn insert_conflict(
        &self,
        group_id: i64,
        auto_id: i64,
        manual_id: i64,
        kind: ConflictKind,
        reason: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO conflicts (group_id, auto_id, manual_id, kind, reason) VALUES (?, ?, ?, ?, ?)",
            rusqlite::params![group_id, auto_id, manual_id, kind.as_str(), reason],
        )?;
        Ok(())
    }

    pub fn list_conflict_log(&self) -> Result<Vec<StoredConflict>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, group_id, auto_id, manual_id, kind, reason, created_at FROM conflicts ORDER BY id",
        )?;
        let conflicts = stmt
            .query_map([], |row| {
                let kind: String = row.get(4)?;
                Ok(StoredConflict {
                    id: row.get(0)?,
                    group_id: row.get(1)?,
                    auto_id: row.get(2)?,
                    manual_id: row.get(3)?,
                    kind: ConflictKind::parse(&kind)
                        .unwrap_or(ConflictKind::DivergesFromAutomatic),
                    reason: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(conflicts)
    }

    // ========================================================================
    // Counts for diagnostics
    // ========================================================================

    pub fn count_active_files(&self) -> Result<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM files WHERE missing = 0", [], |row| row.get(0))?;
        Ok(n)
    }

    pub fn count_fingerprints(&self) -> Result<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM fingerprints", [], |row| row.get(0))?;
        Ok(n)
    }
}

const FILE_SELECT: &str = r#"
    SELECT id, path, size_bytes, modified_at, width, height, taken_at, camera, format, missing
    FROM files
"#;

const GROUP_SELECT: &str = r#"
    SELECT id, tier, original_id, confidence, hash_kind, distance, dimension_tolerance
    FROM duplicate_groups
"#;

const OVERRIDE_SELECT: &str = r#"
    SELECT id, group_id, preferred_id, auto_id, scope, reason, notes, active, created_at
    FROM overrides
"#;

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    let taken_at: Option<String> = row.get(6)?;
    Ok(FileRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        size_bytes: row.get(2)?,
        modified_at: row.get(3)?,
        width: row.get(4)?,
        height: row.get(5)?,
        taken_at: taken_at.as_deref().and_then(parse_datetime),
        camera: row.get(7)?,
        format: row.get(8)?,
        missing: row.get::<_, i32>(9)? != 0,
    })
}

fn row_to_fingerprint(row: &rusqlite::Row<'_>) -> rusqlite::Result<FingerprintRecord> {
    Ok(FingerprintRecord {
        file_id: row.get(0)?,
        fast_hash: row.get(1)?,
        sha256: row.get(2)?,
        perceptual: perceptual_from_columns(row.get(3)?, row.get(4)?, row.get(5)?),
        signature: row.get(6)?,
    })
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<DuplicateGroup> {
    let tier: String = row.get(1)?;
    let kind: Option<String> = row.get(4)?;
    Ok(DuplicateGroup {
        id: row.get(0)?,
        tier: GroupTier::parse(&tier).unwrap_or(GroupTier::Near),
        original_id: row.get(2)?,
        confidence: row.get(3)?,
        hash_kind: kind.as_deref().and_then(HashKind::parse),
        distance: row.get(5)?,
        dimension_tolerance: row.get(6)?,
    })
}

fn row_to_override(row: &rusqlite::Row<'_>) -> rusqlite::Result<ManualOverride> {
    let scope: String = row.get(4)?;
    Ok(ManualOverride {
        id: row.get(0)?,
        group_id: row.get(1)?,
        preferred_id: row.get(2)?,
        auto_id: row.get(3)?,
        scope: OverrideScope::parse(&scope).unwrap_or(OverrideScope::SingleGroup),
        reason: row.get(5)?,
        notes: row.get(6)?,
        active: row.get::<_, i32>(7)? != 0,
        created_at: row.get(8)?,
    })
}

fn perceptual_from_columns(
    mean: Option<Vec<u8>>,
    gradient: Option<Vec<u8>>,
    dct: Option<Vec<u8>>,
) -> Vec<PerceptualHash> {
    let mut hashes = Vec::new();
    if let Some(bits) = mean {
        hashes.push(PerceptualHash {
            kind: HashKind::Mean,
            bits,
        });
    }
    if let Some(bits) = gradient {
        hashes.push(PerceptualHash {
            kind: HashKind::Gradient,
            bits,
        });
    }
    if let Some(bits) = dct {
        hashes.push(PerceptualHash {
            kind: HashKind::Dct,
            bits,
        });
    }
    hashes
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}
