//! Two-tier duplicate grouping over a consistent snapshot.
//!
//! Tier 1 partitions by `(size, fast hash)` and confirms with SHA-256;
//! tier 2 finds near matches through the BK-tree index and re-validates
//! candidates against current metadata. Groups are rebuilt wholesale every
//! pass and committed as one atomic replacement, with active manual
//! overrides re-applied on top of automatic original selection.

pub mod ranking;

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use crate::config::{CollisionPolicy, GroupingConfig};
use crate::db::{
    ConflictKind, Database, DuplicateGroup, FileRecord, FingerprintRecord, GroupTier, MemberRole,
    NewConflict, PendingGroup,
};
use crate::fingerprint::{signature_distance, HashKind};
use crate::index::BkTree;

/// Counters and timing for one grouping pass, for the diagnostics display.
#[derive(Debug, Clone, Default)]
pub struct PassStats {
    pub files_processed: usize,
    pub exact_groups: usize,
    pub near_groups: usize,
    pub duplicates: usize,
    pub conflicts: usize,
    pub elapsed_ms: u128,
}

#[derive(Debug)]
pub struct PassOutcome {
    pub groups: Vec<DuplicateGroup>,
    pub stats: PassStats,
}

/// Confidence for an unconfirmed exact group (confirmation disabled).
const UNCONFIRMED_EXACT_CONFIDENCE: f64 = 0.95;

/// Run one full grouping pass and commit the result atomically.
pub fn run_grouping_pass(db: &Database, cfg: &GroupingConfig) -> Result<PassOutcome> {
    let started = Instant::now();

    // The only fatal read: without the full snapshot no pass can start.
    let snapshot = db
        .load_snapshot()
        .context("failed to read file/fingerprint snapshot")?;
    let files_processed = snapshot.len();

    let mut files: HashMap<i64, FileRecord> = HashMap::with_capacity(snapshot.len());
    let mut prints: BTreeMap<i64, FingerprintRecord> = BTreeMap::new();
    for (file, fp) in snapshot {
        // Files lacking any fingerprint are silently excluded: insufficient
        // data, not an error.
        if let Some(fp) = fp {
            prints.insert(file.id, fp);
        }
        files.insert(file.id, file);
    }

    let mut placed: HashSet<i64> = HashSet::new();
    let mut excluded: HashSet<i64> = HashSet::new();
    let mut pending: Vec<PendingGroup> = Vec::new();

    exact_tier(cfg, &files, &prints, &mut placed, &mut excluded, &mut pending);
    near_tier(cfg, &files, &prints, &mut placed, &excluded, &mut pending);
    signature_fallback(cfg, &files, &prints, &mut placed, &excluded, &mut pending);

    let (conflicts, moves, deactivations) =
        finalize_originals(db, &files, &mut pending)?;

    let conflict_count = conflicts.len();
    db.commit_grouping_pass(&pending, &conflicts, &moves, &deactivations)?;

    let groups = db.list_groups()?;
    let stats = PassStats {
        files_processed,
        exact_groups: groups.iter().filter(|g| g.tier == GroupTier::Exact).count(),
        near_groups: groups.iter().filter(|g| g.tier == GroupTier::Near).count(),
        duplicates: pending.iter().map(|g| g.members.len() - 1).sum(),
        conflicts: conflict_count,
        elapsed_ms: started.elapsed().as_millis(),
    };

    tracing::info!(
        "grouping pass: {} files, {} exact + {} near groups, {} duplicates, {} conflicts in {}ms",
        stats.files_processed,
        stats.exact_groups,
        stats.near_groups,
        stats.duplicates,
        stats.conflicts,
        stats.elapsed_ms
    );

    Ok(PassOutcome { groups, stats })
}

/// Tier 1: exact duplicates by `(size, fast hash)`, confirmed by SHA-256.
fn exact_tier(
    cfg: &GroupingConfig,
    files: &HashMap<i64, FileRecord>,
    prints: &BTreeMap<i64, FingerprintRecord>,
    placed: &mut HashSet<i64>,
    excluded: &mut HashSet<i64>,
    pending: &mut Vec<PendingGroup>,
) {
    let mut partitions: BTreeMap<(i64, String), Vec<i64>> = BTreeMap::new();
    for (id, fp) in prints {
        let Some(file) = files.get(id) else { continue };
        partitions
            .entry((file.size_bytes, fp.fast_hash.clone()))
            .or_default()
            .push(*id);
    }

    for ((size, fast_hash), ids) in partitions {
        if ids.len() < 2 {
            continue;
        }

        if !cfg.require_confirmation {
            push_exact(pending, placed, ids, UNCONFIRMED_EXACT_CONFIDENCE);
            continue;
        }

        let mut by_sha: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for &id in &ids {
            if let Some(sha) = prints.get(&id).and_then(|fp| fp.sha256.clone()) {
                by_sha.entry(sha).or_default().push(id);
            }
        }

        let mut confirmed: HashSet<i64> = HashSet::new();
        for (_, sub) in by_sha {
            if sub.len() >= 2 {
                confirmed.extend(&sub);
                push_exact(pending, placed, sub, 1.0);
            }
        }

        // Everything left over collided on the fast hash without
        // cryptographic confirmation: not a confirmed exact match.
        let leftovers: Vec<i64> = ids.iter().copied().filter(|id| !confirmed.contains(id)).collect();
        if !leftovers.is_empty() {
            tracing::debug!(
                "unconfirmed fast-hash collision ({} bytes, {}): {} files, policy {:?}",
                size,
                fast_hash,
                leftovers.len(),
                cfg.collision_policy
            );
            if cfg.collision_policy == CollisionPolicy::Drop {
                excluded.extend(leftovers);
            }
            // DemoteToNear: leave them in the unplaced pool for tier 2.
        }
    }
}

fn push_exact(
    pending: &mut Vec<PendingGroup>,
    placed: &mut HashSet<i64>,
    ids: Vec<i64>,
    confidence: f64,
) {
    placed.extend(&ids);
    pending.push(PendingGroup {
        tier: GroupTier::Exact,
        original_id: 0, // assigned in finalize_originals
        members: ids.into_iter().map(|id| (id, MemberRole::Duplicate)).collect(),
        confidence,
        hash_kind: None,
        distance: None,
        dimension_tolerance: None,
    });
}

/// Tier 2: near duplicates among files the exact tier did not place.
fn near_tier(
    cfg: &GroupingConfig,
    files: &HashMap<i64, FileRecord>,
    prints: &BTreeMap<i64, FingerprintRecord>,
    placed: &mut HashSet<i64>,
    excluded: &HashSet<i64>,
    pending: &mut Vec<PendingGroup>,
) {
    let budget = cfg.distance_budget();
    let kinds = [HashKind::Gradient, HashKind::Mean, HashKind::Dct];

    // Build once from the point-in-time read, query afterwards.
    let mut trees: HashMap<HashKind, BkTree> = HashMap::new();
    for (id, fp) in prints {
        if placed.contains(id) || excluded.contains(id) {
            continue;
        }
        for kind in kinds {
            if let Some(hash) = fp.hash_of_kind(kind) {
                trees.entry(kind).or_default().insert(hash.bits.clone(), *id);
            }
        }
    }

    for (id, fp) in prints {
        if placed.contains(id) || excluded.contains(id) {
            continue;
        }
        let Some(seed) = files.get(id) else { continue };

        for kind in kinds {
            let Some(hash) = fp.hash_of_kind(kind) else { continue };
            let Some(tree) = trees.get(&kind) else { continue };

            let mut accepted: Vec<(i64, u32)> = Vec::new();
            for (candidate_id, distance) in tree.query(&hash.bits, budget) {
                if candidate_id == *id
                    || placed.contains(&candidate_id)
                    || excluded.contains(&candidate_id)
                {
                    continue;
                }
                // Re-validate against current metadata; a stale index entry
                // is dropped here, never fatal.
                let Some(candidate) = files.get(&candidate_id) else { continue };
                if !dimensions_compatible(seed, candidate, cfg) {
                    continue;
                }
                if cfg.strict_capture_time
                    && !capture_times_close(seed, candidate, cfg.capture_window_secs)
                {
                    continue;
                }
                accepted.push((candidate_id, distance));
            }

            if accepted.is_empty() {
                continue;
            }

            let observed = accepted.iter().map(|&(_, d)| d).max().unwrap_or(0);
            placed.insert(*id);
            let mut members = vec![(*id, MemberRole::Duplicate)];
            for (candidate_id, _) in &accepted {
                placed.insert(*candidate_id);
                members.push((*candidate_id, MemberRole::Duplicate));
            }

            pending.push(PendingGroup {
                tier: GroupTier::Near,
                original_id: 0,
                members,
                confidence: near_confidence(observed, budget, cfg.confidence_floor),
                hash_kind: Some(kind),
                distance: Some(observed),
                dimension_tolerance: Some(cfg.aspect_ratio_tolerance),
            });
            break;
        }
    }
}

/// Accurate-mode fallback: luma signatures catch heavily re-encoded pairs
/// the bit hashes miss. Linear pair scan over what remains unplaced; only
/// files that actually carry a signature participate.
fn signature_fallback(
    cfg: &GroupingConfig,
    files: &HashMap<i64, FileRecord>,
    prints: &BTreeMap<i64, FingerprintRecord>,
    placed: &mut HashSet<i64>,
    excluded: &HashSet<i64>,
    pending: &mut Vec<PendingGroup>,
) {
    let with_signature: Vec<i64> = prints
        .iter()
        .filter(|(id, fp)| {
            !placed.contains(id) && !excluded.contains(id) && fp.signature.is_some()
        })
        .map(|(id, _)| *id)
        .collect();

    for i in 0..with_signature.len() {
        let a = with_signature[i];
        if placed.contains(&a) {
            continue;
        }
        let (Some(file_a), Some(sig_a)) = (
            files.get(&a),
            prints.get(&a).and_then(|fp| fp.signature.as_deref()),
        ) else {
            continue;
        };

        let mut members = vec![(a, MemberRole::Duplicate)];
        for &b in &with_signature[i + 1..] {
            if placed.contains(&b) {
                continue;
            }
            let (Some(file_b), Some(sig_b)) = (
                files.get(&b),
                prints.get(&b).and_then(|fp| fp.signature.as_deref()),
            ) else {
                continue;
            };

            let Some(distance) = signature_distance(sig_a, sig_b) else { continue };
            if distance > cfg.signature_threshold {
                continue;
            }
            if !dimensions_compatible(file_a, file_b, cfg) {
                continue;
            }
            if cfg.strict_capture_time
                && !capture_times_close(file_a, file_b, cfg.capture_window_secs)
            {
                continue;
            }
            members.push((b, MemberRole::Duplicate));
        }

        if members.len() >= 2 {
            for (id, _) in &members {
                placed.insert(*id);
            }
            pending.push(PendingGroup {
                tier: GroupTier::Near,
                original_id: 0,
                members,
                confidence: cfg.confidence_floor,
                hash_kind: None,
                distance: None,
                dimension_tolerance: Some(cfg.aspect_ratio_tolerance),
            });
        }
    }
}

/// Per-group original selection plus override re-application.
///
/// Returns the conflicts to record and the override bookkeeping (moves onto
/// new group ids, deactivations) for the atomic commit.
fn finalize_originals(
    db: &Database,
    files: &HashMap<i64, FileRecord>,
    pending: &mut [PendingGroup],
) -> Result<(Vec<NewConflict>, Vec<(i64, usize)>, Vec<i64>)> {
    let overrides = db.list_overrides(true)?;
    let mut used: HashSet<i64> = HashSet::new();
    let mut conflicts = Vec::new();
    let mut moves = Vec::new();
    let mut deactivations = Vec::new();

    for (idx, group) in pending.iter_mut().enumerate() {
        let mut member_files: Vec<&FileRecord> = group
            .members
            .iter()
            .filter_map(|(id, _)| files.get(id))
            .collect();
        member_files.sort_by(|a, b| ranking::compare(a, b));
        let auto_id = member_files[0].id;
        let member_ids: HashSet<i64> = member_files.iter().map(|f| f.id).collect();

        let mut original_id = auto_id;

        if let Some(ov) = overrides
            .iter()
            .find(|o| !used.contains(&o.id) && member_ids.contains(&o.preferred_id))
        {
            // The user's pick is still a member: it wins over the automatic
            // choice, and the divergence is logged.
            used.insert(ov.id);
            moves.push((ov.id, idx));
            original_id = ov.preferred_id;
            if original_id != auto_id {
                conflicts.push(NewConflict {
                    group_idx: idx,
                    auto_id,
                    manual_id: ov.preferred_id,
                    kind: ConflictKind::DivergesFromAutomatic,
                    reason: format!(
                        "manual override prefers file {} over automatic choice {}",
                        ov.preferred_id, auto_id
                    ),
                });
            }
        } else if let Some(ov) = overrides.iter().find(|o| {
            !used.contains(&o.id)
                && member_ids.contains(&o.auto_id)
                && !member_ids.contains(&o.preferred_id)
        }) {
            // The preferred file vanished from the group: deactivate and
            // fall back to automatic selection.
            used.insert(ov.id);
            moves.push((ov.id, idx));
            deactivations.push(ov.id);
            conflicts.push(NewConflict {
                group_idx: idx,
                auto_id,
                manual_id: ov.preferred_id,
                kind: ConflictKind::PreferredFileMissing,
                reason: format!(
                    "previously preferred file {} is no longer a group member; reverting to automatic selection",
                    ov.preferred_id
                ),
            });
        }

        group.original_id = original_id;
        group.members = member_files
            .iter()
            .map(|f| {
                let role = if f.id == original_id {
                    MemberRole::Original
                } else {
                    MemberRole::Duplicate
                };
                (f.id, role)
            })
            .collect();
    }

    Ok((conflicts, moves, deactivations))
}

fn near_confidence(distance: u32, budget: u32, floor: f64) -> f64 {
    if budget == 0 {
        return 1.0;
    }
    1.0 - (distance as f64 / budget as f64) * (1.0 - floor)
}

/// Aspect ratio and pixel count must each be within tolerance. Unknown
/// dimensions on one side only fail the check; unknown on both sides pass
/// (nothing to compare).
fn dimensions_compatible(a: &FileRecord, b: &FileRecord, cfg: &GroupingConfig) -> bool {
    match (a.aspect_ratio(), b.aspect_ratio()) {
        (Some(ra), Some(rb)) => {
            if rb <= 0.0 || (ra / rb - 1.0).abs() > cfg.aspect_ratio_tolerance {
                return false;
            }
        }
        (None, None) => {}
        _ => return false,
    }

    match (a.pixel_count(), b.pixel_count()) {
        (Some(pa), Some(pb)) => {
            let lo = pa.min(pb) as f64;
            let hi = pa.max(pb) as f64;
            if hi > 0.0 && lo / hi < 1.0 - cfg.pixel_count_tolerance {
                return false;
            }
        }
        (None, None) => {}
        _ => return false,
    }

    true
}

/// Strict-mode burst check: both timestamps present and within the window.
fn capture_times_close(a: &FileRecord, b: &FileRecord, window_secs: i64) -> bool {
    match (a.taken_at, b.taken_at) {
        (Some(ta), Some(tb)) => (ta - tb).num_seconds().abs() <= window_secs,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewFileRecord, OverrideScope};
    use crate::fingerprint::PerceptualHash;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    struct FileSpec {
        path: &'static str,
        size: i64,
        dims: Option<(u32, u32)>,
        fast: &'static str,
        sha: Option<&'static str>,
        phash: Option<Vec<u8>>,
    }

    fn add(db: &Database, spec: FileSpec) -> i64 {
        let id = db
            .upsert_file(&NewFileRecord {
                path: spec.path.to_string(),
                size_bytes: spec.size,
                modified_at: None,
                width: spec.dims.map(|(w, _)| w),
                height: spec.dims.map(|(_, h)| h),
                taken_at: None,
                camera: None,
                format: Some("Jpeg".to_string()),
            })
            .unwrap();
        db.store_fingerprint(&crate::db::FingerprintRecord {
            file_id: id,
            fast_hash: spec.fast.to_string(),
            sha256: spec.sha.map(|s| s.to_string()),
            perceptual: spec
                .phash
                .map(|bits| {
                    vec![PerceptualHash {
                        kind: HashKind::Gradient,
                        bits,
                    }]
                })
                .unwrap_or_default(),
            signature: None,
        })
        .unwrap();
        id
    }

    #[test]
    fn test_confirmed_exact_group_confidence_one() {
        let db = test_db();
        let a = add(
            &db,
            FileSpec {
                path: "/p/a.jpg",
                size: 204800,
                dims: Some((1920, 1080)),
                fast: "ffff",
                sha: Some("sha-x"),
                phash: None,
            },
        );
        let b = add(
            &db,
            FileSpec {
                path: "/p/b.jpg",
                size: 204800,
                dims: Some((1920, 1080)),
                fast: "ffff",
                sha: Some("sha-x"),
                phash: None,
            },
        );

        let outcome = run_grouping_pass(&db, &GroupingConfig::default()).unwrap();
        assert_eq!(outcome.stats.exact_groups, 1);
        assert_eq!(outcome.stats.near_groups, 0);

        let group = &outcome.groups[0];
        assert_eq!(group.tier, GroupTier::Exact);
        assert_eq!(group.confidence, 1.0);
        // Equal resolution/size/format: path tiebreak picks a.jpg.
        assert_eq!(group.original_id, a);

        let members = db.group_members(group.id).unwrap();
        assert_eq!(members.len(), 2);
        let roles: Vec<_> = members.iter().map(|m| (m.file_id, m.role)).collect();
        assert!(roles.contains(&(a, MemberRole::Original)));
        assert!(roles.contains(&(b, MemberRole::Duplicate)));
    }

    #[test]
    fn test_near_group_confidence_between_floor_and_one() {
        let db = test_db();
        // Hamming distance 3 between the two hashes.
        add(
            &db,
            FileSpec {
                path: "/p/a.jpg",
                size: 1000,
                dims: Some((1000, 800)),
                fast: "h-a",
                sha: Some("sha-a"),
                phash: Some(vec![0b0000_0111, 0, 0, 0, 0, 0, 0, 0]),
            },
        );
        add(
            &db,
            FileSpec {
                path: "/p/b.jpg",
                size: 1000,
                dims: Some((1000, 800)),
                fast: "h-b",
                sha: Some("sha-b"),
                phash: Some(vec![0, 0, 0, 0, 0, 0, 0, 0]),
            },
        );

        let mut cfg = GroupingConfig::default();
        cfg.max_distance = Some(6);
        let outcome = run_grouping_pass(&db, &cfg).unwrap();

        assert_eq!(outcome.stats.near_groups, 1);
        let group = &outcome.groups[0];
        assert_eq!(group.tier, GroupTier::Near);
        assert_eq!(group.distance, Some(3));
        assert!(group.confidence > cfg.confidence_floor);
        assert!(group.confidence < 1.0);
        assert!((group.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_unconfirmed_collision_demotes_to_near() {
        let db = test_db();
        // Same size and fast hash but different sha256: a fast-hash collision.
        // With close perceptual hashes, the near tier picks them up.
        add(
            &db,
            FileSpec {
                path: "/p/a.jpg",
                size: 500,
                dims: Some((100, 100)),
                fast: "collide",
                sha: Some("sha-1"),
                phash: Some(vec![0; 8]),
            },
        );
        add(
            &db,
            FileSpec {
                path: "/p/b.jpg",
                size: 500,
                dims: Some((100, 100)),
                fast: "collide",
                sha: Some("sha-2"),
                phash: Some(vec![1, 0, 0, 0, 0, 0, 0, 0]),
            },
        );

        let cfg = GroupingConfig::default();
        let outcome = run_grouping_pass(&db, &cfg).unwrap();
        assert_eq!(outcome.stats.exact_groups, 0);
        assert_eq!(outcome.stats.near_groups, 1);

        let mut drop_cfg = GroupingConfig::default();
        drop_cfg.collision_policy = CollisionPolicy::Drop;
        let outcome = run_grouping_pass(&db, &drop_cfg).unwrap();
        assert_eq!(outcome.groups.len(), 0);
    }

    #[test]
    fn test_membership_is_disjoint_across_tiers() {
        let db = test_db();
        // Exact pair shares bytes; a third file is perceptually identical to
        // them but has different bytes.
        add(
            &db,
            FileSpec {
                path: "/p/a.jpg",
                size: 100,
                dims: Some((10, 10)),
                fast: "same",
                sha: Some("sha"),
                phash: Some(vec![0; 8]),
            },
        );
        add(
            &db,
            FileSpec {
                path: "/p/b.jpg",
                size: 100,
                dims: Some((10, 10)),
                fast: "same",
                sha: Some("sha"),
                phash: Some(vec![0; 8]),
            },
        );
        add(
            &db,
            FileSpec {
                path: "/p/c.jpg",
                size: 90,
                dims: Some((10, 10)),
                fast: "other",
                sha: Some("sha-c"),
                phash: Some(vec![0; 8]),
            },
        );

        let outcome = run_grouping_pass(&db, &GroupingConfig::default()).unwrap();

        let mut seen: HashSet<i64> = HashSet::new();
        for group in &outcome.groups {
            for member in db.group_members(group.id).unwrap() {
                assert!(seen.insert(member.file_id), "file grouped twice");
            }
            let originals = db
                .group_members(group.id)
                .unwrap()
                .into_iter()
                .filter(|m| m.role == MemberRole::Original)
                .count();
            assert_eq!(originals, 1, "exactly one original per group");
        }
    }

    #[test]
    fn test_file_without_fingerprint_left_ungrouped() {
        let db = test_db();
        db.upsert_file(&NewFileRecord {
            path: "/p/unanalyzed.jpg".to_string(),
            size_bytes: 123,
            modified_at: None,
            width: None,
            height: None,
            taken_at: None,
            camera: None,
            format: None,
        })
        .unwrap();

        let outcome = run_grouping_pass(&db, &GroupingConfig::default()).unwrap();
        assert_eq!(outcome.stats.files_processed, 1);
        assert!(outcome.groups.is_empty());
    }

    #[test]
    fn test_dimension_sanity_check_rejects_mismatched_shapes() {
        let db = test_db();
        // Identical perceptual hash but wildly different aspect ratio.
        add(
            &db,
            FileSpec {
                path: "/p/wide.jpg",
                size: 100,
                dims: Some((4000, 1000)),
                fast: "w",
                sha: Some("s1"),
                phash: Some(vec![0; 8]),
            },
        );
        add(
            &db,
            FileSpec {
                path: "/p/tall.jpg",
                size: 100,
                dims: Some((1000, 4000)),
                fast: "t",
                sha: Some("s2"),
                phash: Some(vec![0; 8]),
            },
        );

        let outcome = run_grouping_pass(&db, &GroupingConfig::default()).unwrap();
        assert!(outcome.groups.is_empty());
    }

    #[test]
    fn test_override_survives_rebuild_and_wins() {
        let db = test_db();
        let _a = add(
            &db,
            FileSpec {
                path: "/p/a.jpg",
                size: 100,
                dims: Some((20, 20)),
                fast: "same",
                sha: Some("sha"),
                phash: None,
            },
        );
        let b = add(
            &db,
            FileSpec {
                path: "/p/b.jpg",
                size: 100,
                dims: Some((20, 20)),
                fast: "same",
                sha: Some("sha"),
                phash: None,
            },
        );

        let cfg = GroupingConfig::default();
        let first = run_grouping_pass(&db, &cfg).unwrap();
        let group = &first.groups[0];
        let auto_id = group.original_id;
        assert_ne!(auto_id, b);

        db.insert_override(group.id, b, auto_id, OverrideScope::SingleGroup, "user_pick", None)
            .unwrap();

        // Full rebuild: new group ids, override re-attached by membership.
        let second = run_grouping_pass(&db, &cfg).unwrap();
        let group = &second.groups[0];
        assert_eq!(group.original_id, b);
        assert_eq!(second.stats.conflicts, 1);

        let ov = db.active_override(group.id).unwrap().unwrap();
        assert_eq!(ov.preferred_id, b);

        let log = db.list_conflict_log().unwrap();
        assert!(log
            .iter()
            .any(|c| c.kind == ConflictKind::DivergesFromAutomatic && c.manual_id == b));
    }

    #[test]
    fn test_vanished_override_file_falls_back_to_automatic() {
        let db = test_db();
        let a = add(
            &db,
            FileSpec {
                path: "/p/a.jpg",
                size: 100,
                dims: Some((20, 20)),
                fast: "same",
                sha: Some("sha"),
                phash: None,
            },
        );
        let b = add(
            &db,
            FileSpec {
                path: "/p/b.jpg",
                size: 100,
                dims: Some((20, 20)),
                fast: "same",
                sha: Some("sha"),
                phash: None,
            },
        );
        let c = add(
            &db,
            FileSpec {
                path: "/p/c.jpg",
                size: 100,
                dims: Some((20, 20)),
                fast: "same",
                sha: Some("sha"),
                phash: None,
            },
        );

        let cfg = GroupingConfig::default();
        let first = run_grouping_pass(&db, &cfg).unwrap();
        let group_id = first.groups[0].id;
        assert_eq!(first.groups[0].original_id, a);

        db.insert_override(group_id, c, a, OverrideScope::SingleGroup, "user_pick", None)
            .unwrap();

        // The preferred file disappears before the next pass.
        db.set_missing(c, true).unwrap();

        let second = run_grouping_pass(&db, &cfg).unwrap();
        let group = &second.groups[0];
        assert_eq!(group.original_id, a);

        // Override was deactivated, not deleted.
        assert!(db.active_override(group.id).unwrap().is_none());
        let all = db.list_overrides(false).unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].active);

        let log = db.list_conflict_log().unwrap();
        assert!(log
            .iter()
            .any(|conflict| conflict.kind == ConflictKind::PreferredFileMissing
                && conflict.manual_id == c && conflict.auto_id == a));
        let _ = b;
    }

    #[test]
    fn test_near_confidence_decay() {
        assert_eq!(near_confidence(0, 8, 0.5), 1.0);
        assert_eq!(near_confidence(8, 8, 0.5), 0.5);
        assert!((near_confidence(4, 8, 0.5) - 0.75).abs() < 1e-9);
        assert_eq!(near_confidence(0, 0, 0.5), 1.0);
    }
}
