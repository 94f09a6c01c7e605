//! Core record types shared between the storage layer and the engines.

use chrono::NaiveDateTime;

use crate::fingerprint::{HashKind, PerceptualHash};

/// One tracked file. Owned by the scanning pipeline; read-only to the
/// grouping/escalation engines.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: i64,
    pub path: String,
    pub size_bytes: i64,
    pub modified_at: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub taken_at: Option<NaiveDateTime>,
    pub camera: Option<String>,
    pub format: Option<String>,
    /// Set when the path vanished from disk; the record is kept, not deleted.
    pub missing: bool,
}

impl FileRecord {
    pub fn pixel_count(&self) -> Option<u64> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(w as u64 * h as u64),
            _ => None,
        }
    }

    pub fn aspect_ratio(&self) -> Option<f64> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if h > 0 => Some(w as f64 / h as f64),
            _ => None,
        }
    }
}

/// Input for inserting or refreshing a file row. The scanning pipeline is
/// the only writer of these.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub path: String,
    pub size_bytes: i64,
    pub modified_at: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub taken_at: Option<NaiveDateTime>,
    pub camera: Option<String>,
    pub format: Option<String>,
}

/// Content fingerprint, one-to-one with a [`FileRecord`]. Absence means the
/// file has not been analyzed yet.
#[derive(Debug, Clone)]
pub struct FingerprintRecord {
    pub file_id: i64,
    /// Cheap content digest (MD5), exact-tier candidate key only.
    pub fast_hash: String,
    /// Cryptographic confirmation hash.
    pub sha256: Option<String>,
    /// One entry per computed hash algorithm variant.
    pub perceptual: Vec<PerceptualHash>,
    /// Compact luma-grid descriptor, accurate mode only.
    pub signature: Option<Vec<u8>>,
}

impl FingerprintRecord {
    pub fn hash_of_kind(&self, kind: HashKind) -> Option<&PerceptualHash> {
        self.perceptual.iter().find(|h| h.kind == kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupTier {
    Exact,
    Near,
}

impl GroupTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupTier::Exact => "exact",
            GroupTier::Near => "near",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(GroupTier::Exact),
            "near" => Some(GroupTier::Near),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Original,
    Duplicate,
    SafeDuplicate,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Original => "original",
            MemberRole::Duplicate => "duplicate",
            MemberRole::SafeDuplicate => "safe_duplicate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "original" => Some(MemberRole::Original),
            "duplicate" => Some(MemberRole::Duplicate),
            "safe_duplicate" => Some(MemberRole::SafeDuplicate),
            _ => None,
        }
    }
}

/// A stored duplicate group. Rebuilt wholesale on every grouping pass.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub id: i64,
    pub tier: GroupTier,
    pub original_id: i64,
    pub confidence: f64,
    /// Near tier only: which perceptual hash matched.
    pub hash_kind: Option<HashKind>,
    /// Near tier only: largest observed Hamming distance in the group.
    pub distance: Option<u32>,
    /// Near tier only: dimension tolerance that was in effect.
    pub dimension_tolerance: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct GroupMember {
    pub group_id: i64,
    pub file_id: i64,
    pub role: MemberRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideScope {
    SingleGroup,
    DefaultRule,
}

impl OverrideScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideScope::SingleGroup => "single_group",
            OverrideScope::DefaultRule => "default_rule",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "single_group" => Some(OverrideScope::SingleGroup),
            "default_rule" => Some(OverrideScope::DefaultRule),
            _ => None,
        }
    }
}

/// A user correction to original selection. Outlives grouping passes;
/// deactivated (never deleted) when superseded or when its file vanishes.
#[derive(Debug, Clone)]
pub struct ManualOverride {
    pub id: i64,
    pub group_id: i64,
    pub preferred_id: i64,
    pub auto_id: i64,
    pub scope: OverrideScope,
    pub reason: String,
    pub notes: Option<String>,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The manual choice differs from what the algorithm would pick now.
    DivergesFromAutomatic,
    /// The override's preferred file is no longer an active group member.
    PreferredFileMissing,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::DivergesFromAutomatic => "diverges_from_automatic",
            ConflictKind::PreferredFileMissing => "preferred_file_missing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "diverges_from_automatic" => Some(ConflictKind::DivergesFromAutomatic),
            "preferred_file_missing" => Some(ConflictKind::PreferredFileMissing),
            _ => None,
        }
    }
}

/// Structured description of an override that disagrees with current state.
/// Produced by pure detection; nothing is mutated until a remedy is applied.
#[derive(Debug, Clone)]
pub struct ConflictInfo {
    pub group_id: i64,
    pub auto_id: i64,
    pub manual_id: i64,
    pub kind: ConflictKind,
    pub reason: String,
    pub remedies: Vec<String>,
}
