//! Duplicate escalation.
//!
//! Promotes `duplicate` members to `safe_duplicate` when metadata
//! corroborates the content match strongly enough that deletion carries
//! essentially no risk. Escalation is monotone: it only ever promotes, and
//! a member already marked safe is never demoted here.

use anyhow::Result;
use std::time::Instant;

use crate::config::EscalationConfig;
use crate::db::{Database, FileRecord, MemberRole};

#[derive(Debug, Clone, Default)]
pub struct EscalationStats {
    pub groups_considered: usize,
    pub members_escalated: usize,
    pub elapsed_ms: u128,
}

/// Evaluate every group and promote duplicates with corroborating metadata.
pub fn run_escalation_pass(db: &Database, cfg: &EscalationConfig) -> Result<EscalationStats> {
    let started = Instant::now();
    let mut stats = EscalationStats::default();

    for group in db.list_groups()? {
        stats.groups_considered += 1;

        let Some(original) = db.get_file(group.original_id)? else {
            continue;
        };

        for member in db.group_members(group.id)? {
            if member.role != MemberRole::Duplicate {
                continue;
            }
            let Some(file) = db.get_file(member.file_id)? else {
                continue;
            };

            if corroborated(&original, &file, cfg) {
                db.set_member_role(group.id, member.file_id, MemberRole::SafeDuplicate)?;
                stats.members_escalated += 1;
            }
        }
    }

    stats.elapsed_ms = started.elapsed().as_millis();
    tracing::info!(
        "escalation pass: {} groups, {} members escalated in {}ms",
        stats.groups_considered,
        stats.members_escalated,
        stats.elapsed_ms
    );
    Ok(stats)
}

/// All three criteria must hold against the group's original: byte size
/// equality, capture time within tolerance, and (when enabled) matching
/// camera make/model.
fn corroborated(original: &FileRecord, duplicate: &FileRecord, cfg: &EscalationConfig) -> bool {
    let size_match = original.size_bytes == duplicate.size_bytes;
    let time_match = capture_match(original, duplicate, cfg);
    let camera_match = !cfg.check_camera || camera_matches(original, duplicate);

    let all = size_match && time_match && camera_match;
    if !all && (size_match || time_match) {
        tracing::debug!(
            "partial escalation evidence for file {} vs original {}: size={} time={} camera={}",
            duplicate.id,
            original.id,
            size_match,
            time_match,
            camera_match
        );
    }
    all
}

/// Both timestamps missing counts as agreement only when the camera check is
/// off; with it on, a missing timestamp is missing evidence.
fn capture_match(a: &FileRecord, b: &FileRecord, cfg: &EscalationConfig) -> bool {
    match (a.taken_at, b.taken_at) {
        (Some(ta), Some(tb)) => (ta - tb).num_seconds().abs() <= cfg.capture_tolerance_secs,
        (None, None) => !cfg.check_camera,
        _ => false,
    }
}

/// Case- and whitespace-insensitive camera comparison. Two files that both
/// lack camera metadata count as matching.
fn camera_matches(a: &FileRecord, b: &FileRecord) -> bool {
    match (a.camera.as_deref(), b.camera.as_deref()) {
        (Some(ca), Some(cb)) => normalize(ca) == normalize(cb),
        (None, None) => true,
        _ => false,
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}
