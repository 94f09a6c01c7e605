//! Manual override workflow.
//!
//! Users correct original selection per group; the correction outlives
//! grouping passes. Conflict *detection* is pure and only describes
//! disagreements; nothing changes until a remedy is explicitly applied.

use anyhow::{bail, Context, Result};

use crate::db::{
    ConflictInfo, ConflictKind, Database, FileRecord, ManualOverride, OverrideScope,
};
use crate::grouping::ranking;

/// Explicit resolutions for a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remedy {
    /// Keep the user's pick and acknowledge the divergence in the log.
    KeepManual,
    /// Drop the override and restore the automatic choice.
    AcceptAutomatic,
}

impl Remedy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Remedy::KeepManual => "keep_manual",
            Remedy::AcceptAutomatic => "accept_automatic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "keep_manual" => Some(Remedy::KeepManual),
            "accept_automatic" => Some(Remedy::AcceptAutomatic),
            _ => None,
        }
    }
}

/// Record an override for a group: the preferred file becomes the original
/// immediately, and the choice is persisted for future passes.
pub fn record(
    db: &Database,
    group_id: i64,
    preferred_id: i64,
    scope: OverrideScope,
    reason: &str,
    notes: Option<&str>,
) -> Result<ManualOverride> {
    let members = member_files(db, group_id)?;
    if members.is_empty() {
        bail!("group {} does not exist", group_id);
    }
    if !members.iter().any(|f| f.id == preferred_id) {
        bail!(
            "file {} is not a member of group {}",
            preferred_id,
            group_id
        );
    }

    let refs: Vec<&FileRecord> = members.iter().collect();
    let auto_id = ranking::select_original(&refs)
        .context("group has no rankable members")?;

    let ov = db.insert_override(group_id, preferred_id, auto_id, scope, reason, notes)?;
    db.relabel_group(group_id, preferred_id)?;

    // A pick that differs from the automatic choice goes straight into the
    // conflict log; the next grouping pass is not the first witness.
    if preferred_id != auto_id {
        db.insert_conflict(
            group_id,
            auto_id,
            preferred_id,
            ConflictKind::DivergesFromAutomatic,
            &format!(
                "manual override prefers file {} over automatic choice {}",
                preferred_id, auto_id
            ),
        )?;
    }

    tracing::info!(
        "override recorded: group {} original {} -> {} ({})",
        group_id,
        auto_id,
        preferred_id,
        reason
    );
    Ok(ov)
}

/// The active override for a group, if any.
pub fn get(db: &Database, group_id: i64) -> Result<Option<ManualOverride>> {
    db.active_override(group_id)
}

pub fn list(db: &Database, active_only: bool) -> Result<Vec<ManualOverride>> {
    db.list_overrides(active_only)
}

/// Remove the active override for a group and restore automatic selection.
/// Returns the deactivated override, if there was one.
pub fn remove(db: &Database, group_id: i64) -> Result<Option<ManualOverride>> {
    let removed = db.deactivate_override(group_id)?;
    if removed.is_some() {
        let members = member_files(db, group_id)?;
        let refs: Vec<&FileRecord> = members.iter().collect();
        if let Some(auto_id) = ranking::select_original(&refs) {
            db.relabel_group(group_id, auto_id)?;
            tracing::info!(
                "override removed: group {} reverted to automatic original {}",
                group_id,
                auto_id
            );
        }
    }
    Ok(removed)
}

/// Pure detection: describe every active override that disagrees with the
/// current group state. Reads only; the caller decides what to do.
pub fn detect_conflicts(db: &Database) -> Result<Vec<ConflictInfo>> {
    let mut conflicts = Vec::new();

    for ov in db.list_overrides(true)? {
        let members = member_files(db, ov.group_id)?;
        if members.is_empty() {
            // The group was dissolved by a rebuild and the override was not
            // re-attached anywhere. Surface it rather than guessing.
            conflicts.push(ConflictInfo {
                group_id: ov.group_id,
                auto_id: ov.auto_id,
                manual_id: ov.preferred_id,
                kind: ConflictKind::PreferredFileMissing,
                reason: format!("group {} no longer exists", ov.group_id),
                remedies: vec![Remedy::AcceptAutomatic.as_str().to_string()],
            });
            continue;
        }

        let refs: Vec<&FileRecord> = members.iter().collect();
        let auto_id = match ranking::select_original(&refs) {
            Some(id) => id,
            None => continue,
        };

        if !members.iter().any(|f| f.id == ov.preferred_id) {
            conflicts.push(ConflictInfo {
                group_id: ov.group_id,
                auto_id,
                manual_id: ov.preferred_id,
                kind: ConflictKind::PreferredFileMissing,
                reason: format!(
                    "preferred file {} is no longer a member of group {}",
                    ov.preferred_id, ov.group_id
                ),
                remedies: vec![Remedy::AcceptAutomatic.as_str().to_string()],
            });
        } else if auto_id != ov.preferred_id {
            conflicts.push(ConflictInfo {
                group_id: ov.group_id,
                auto_id,
                manual_id: ov.preferred_id,
                kind: ConflictKind::DivergesFromAutomatic,
                reason: format!(
                    "automatic selection would now pick file {} but the override prefers {}",
                    auto_id, ov.preferred_id
                ),
                remedies: vec![
                    Remedy::KeepManual.as_str().to_string(),
                    Remedy::AcceptAutomatic.as_str().to_string(),
                ],
            });
        }
    }

    Ok(conflicts)
}

/// Apply one explicit resolution to a detected conflict. This is the only
/// place conflict handling mutates state.
pub fn apply_remedy(db: &Database, conflict: &ConflictInfo, remedy: Remedy) -> Result<()> {
    match remedy {
        Remedy::KeepManual => {
            if conflict.kind == ConflictKind::PreferredFileMissing {
                bail!(
                    "cannot keep the manual choice for group {}: file {} is gone",
                    conflict.group_id,
                    conflict.manual_id
                );
            }
            db.relabel_group(conflict.group_id, conflict.manual_id)?;
            db.insert_conflict(
                conflict.group_id,
                conflict.auto_id,
                conflict.manual_id,
                conflict.kind,
                &conflict.reason,
            )?;
        }
        Remedy::AcceptAutomatic => {
            db.deactivate_override(conflict.group_id)?;
            db.relabel_group(conflict.group_id, conflict.auto_id)?;
            db.insert_conflict(
                conflict.group_id,
                conflict.auto_id,
                conflict.manual_id,
                conflict.kind,
                &conflict.reason,
            )?;
        }
    }

    tracing::info!(
        "conflict remedy {} applied to group {}",
        remedy.as_str(),
        conflict.group_id
    );
    Ok(())
}

fn member_files(db: &Database, group_id: i64) -> Result<Vec<FileRecord>> {
    let mut files = Vec::new();
    for member in db.group_members(group_id)? {
        if let Some(file) = db.get_file(member.file_id)? {
            files.push(file);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{GroupTier, MemberRole, NewFileRecord, PendingGroup};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn add_file(db: &Database, path: &str, width: u32) -> i64 {
        db.upsert_file(&NewFileRecord {
            path: path.to_string(),
            size_bytes: 1000,
            modified_at: None,
            width: Some(width),
            height: Some(width),
            taken_at: None,
            camera: None,
            format: Some("Jpeg".to_string()),
        })
        .unwrap()
    }

    fn seed_group(db: &Database, ids: &[i64], original: i64) -> i64 {
        let members = ids
            .iter()
            .map(|&id| {
                let role = if id == original {
                    MemberRole::Original
                } else {
                    MemberRole::Duplicate
                };
                (id, role)
            })
            .collect();
        let group_ids = db
            .commit_grouping_pass(
                &[PendingGroup {
                    tier: GroupTier::Exact,
                    original_id: original,
                    members,
                    confidence: 1.0,
                    hash_kind: None,
                    distance: None,
                    dimension_tolerance: None,
                }],
                &[],
                &[],
                &[],
            )
            .unwrap();
        group_ids[0]
    }

    #[test]
    fn test_record_then_remove_round_trips() {
        let db = test_db();
        // a has the highest resolution, so it is the automatic original.
        let a = add_file(&db, "/p/a.jpg", 4000);
        let b = add_file(&db, "/p/b.jpg", 1000);
        let c = add_file(&db, "/p/c.jpg", 1000);
        let group = seed_group(&db, &[a, b, c], a);

        let ov = record(&db, group, b, OverrideScope::SingleGroup, "user_pick", None).unwrap();
        assert_eq!(ov.preferred_id, b);
        assert_eq!(ov.auto_id, a);
        assert_eq!(db.get_group(group).unwrap().unwrap().original_id, b);

        let removed = remove(&db, group).unwrap().unwrap();
        assert_eq!(removed.id, ov.id);
        // Automatic selection is restored exactly.
        assert_eq!(db.get_group(group).unwrap().unwrap().original_id, a);
        assert!(db.active_override(group).unwrap().is_none());
    }

    #[test]
    fn test_record_logs_divergence_immediately() {
        let db = test_db();
        // a is the automatic original (highest resolution) in {a, b, c}.
        let a = add_file(&db, "/p/a.jpg", 4000);
        let b = add_file(&db, "/p/b.jpg", 1000);
        let c = add_file(&db, "/p/c.jpg", 1000);
        let group = seed_group(&db, &[a, b, c], a);

        record(&db, group, b, OverrideScope::SingleGroup, "user_pick", None).unwrap();

        let members = db.group_members(group).unwrap();
        for member in &members {
            let expected = if member.file_id == b {
                MemberRole::Original
            } else {
                MemberRole::Duplicate
            };
            assert_eq!(member.role, expected);
        }

        // The divergence is on record before any grouping pass runs.
        let log = db.list_conflict_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, ConflictKind::DivergesFromAutomatic);
        assert_eq!(log[0].auto_id, a);
        assert_eq!(log[0].manual_id, b);

        // Re-affirming the automatic choice diverges from nothing.
        record(&db, group, a, OverrideScope::SingleGroup, "user_pick", None).unwrap();
        assert_eq!(db.list_conflict_log().unwrap().len(), 1);
    }

    #[test]
    fn test_record_rejects_non_member() {
        let db = test_db();
        let a = add_file(&db, "/p/a.jpg", 1000);
        let b = add_file(&db, "/p/b.jpg", 1000);
        let outsider = add_file(&db, "/p/x.jpg", 1000);
        let group = seed_group(&db, &[a, b], a);

        assert!(record(&db, group, outsider, OverrideScope::SingleGroup, "user_pick", None)
            .is_err());
    }

    #[test]
    fn test_detect_is_pure() {
        let db = test_db();
        let a = add_file(&db, "/p/a.jpg", 4000);
        let b = add_file(&db, "/p/b.jpg", 1000);
        let group = seed_group(&db, &[a, b], a);
        record(&db, group, b, OverrideScope::SingleGroup, "user_pick", None).unwrap();

        let found = detect_conflicts(&db).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, ConflictKind::DivergesFromAutomatic);
        assert_eq!(found[0].auto_id, a);
        assert_eq!(found[0].manual_id, b);
        assert_eq!(found[0].remedies.len(), 2);

        // Detection changed nothing: roles, override, and the conflict log
        // (one entry from record itself) are untouched.
        assert_eq!(db.get_group(group).unwrap().unwrap().original_id, b);
        assert!(db.active_override(group).unwrap().is_some());
        assert_eq!(db.list_conflict_log().unwrap().len(), 1);

        // Running it again reports the same thing.
        assert_eq!(detect_conflicts(&db).unwrap().len(), 1);
        assert_eq!(db.list_conflict_log().unwrap().len(), 1);
    }

    #[test]
    fn test_accept_automatic_remedy() {
        let db = test_db();
        let a = add_file(&db, "/p/a.jpg", 4000);
        let b = add_file(&db, "/p/b.jpg", 1000);
        let group = seed_group(&db, &[a, b], a);
        record(&db, group, b, OverrideScope::SingleGroup, "user_pick", None).unwrap();

        let found = detect_conflicts(&db).unwrap();
        apply_remedy(&db, &found[0], Remedy::AcceptAutomatic).unwrap();

        assert_eq!(db.get_group(group).unwrap().unwrap().original_id, a);
        assert!(db.active_override(group).unwrap().is_none());
        // One log entry from record, one from the applied remedy.
        assert_eq!(db.list_conflict_log().unwrap().len(), 2);
        assert!(detect_conflicts(&db).unwrap().is_empty());
    }

    #[test]
    fn test_remedy_names_round_trip() {
        assert_eq!(Remedy::parse("keep_manual"), Some(Remedy::KeepManual));
        assert_eq!(Remedy::parse("accept_automatic"), Some(Remedy::AcceptAutomatic));
        assert_eq!(Remedy::parse(Remedy::KeepManual.as_str()), Some(Remedy::KeepManual));
        assert_eq!(Remedy::parse("shrug"), None);
    }

    #[test]
    fn test_keep_manual_rejected_when_file_gone() {
        let conflict = ConflictInfo {
            group_id: 1,
            auto_id: 10,
            manual_id: 11,
            kind: ConflictKind::PreferredFileMissing,
            reason: "gone".to_string(),
            remedies: vec![Remedy::AcceptAutomatic.as_str().to_string()],
        };
        let db = test_db();
        assert!(apply_remedy(&db, &conflict, Remedy::KeepManual).is_err());
    }
}
