use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::fingerprint::{ExtractPolicy, HashKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub grouping: GroupingConfig,

    #[serde(default)]
    pub escalation: EscalationConfig,
}

/// Performance/accuracy tradeoff applied to extraction and near-match search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyProfile {
    /// Pre-downscale decodes, primary perceptual hash only, tight distance budget.
    ResourceConstrained,
    #[default]
    Balanced,
    /// All hash variants plus the feature signature, generous distance budget.
    HighAccuracy,
}

/// What to do with a fast-hash collision that lacks cryptographic confirmation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Leave the files in the unplaced pool so the near tier can evaluate them.
    #[default]
    DemoteToNear,
    /// Exclude the files from this pass entirely.
    Drop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingConfig {
    #[serde(default)]
    pub profile: PolicyProfile,

    /// Require matching SHA-256 before confirming an exact group.
    #[serde(default = "default_true")]
    pub require_confirmation: bool,

    #[serde(default)]
    pub collision_policy: CollisionPolicy,

    /// Hamming distance budget for the near tier. When unset, the profile
    /// default applies.
    #[serde(default)]
    pub max_distance: Option<u32>,

    #[serde(default = "default_aspect_ratio_tolerance")]
    pub aspect_ratio_tolerance: f64,

    #[serde(default = "default_pixel_count_tolerance")]
    pub pixel_count_tolerance: f64,

    /// Additionally require capture timestamps within `capture_window_secs`
    /// before accepting a near-tier candidate.
    #[serde(default)]
    pub strict_capture_time: bool,

    #[serde(default = "default_capture_window_secs")]
    pub capture_window_secs: i64,

    /// Confidence assigned to a near match at the full distance budget.
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,

    /// Maximum normalized luma-signature distance for the accurate-mode
    /// fallback matcher.
    #[serde(default = "default_signature_threshold")]
    pub signature_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Capture timestamps within this many seconds count as equal.
    #[serde(default = "default_escalation_capture_tolerance")]
    pub capture_tolerance_secs: i64,

    /// Compare camera make/model strings. When disabled, two files that both
    /// lack a capture timestamp may still match on time.
    #[serde(default = "default_true")]
    pub check_camera: bool,
}

fn default_true() -> bool {
    true
}

fn default_aspect_ratio_tolerance() -> f64 {
    0.05
}

fn default_pixel_count_tolerance() -> f64 {
    0.30
}

fn default_capture_window_secs() -> i64 {
    60 // burst sequences land within a minute of each other
}

fn default_confidence_floor() -> f64 {
    0.5
}

fn default_signature_threshold() -> f64 {
    0.08
}

fn default_escalation_capture_tolerance() -> i64 {
    2
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "jpg".to_string(),
        "jpeg".to_string(),
        "png".to_string(),
        "gif".to_string(),
        "webp".to_string(),
        "tiff".to_string(),
        "heic".to_string(),
        "heif".to_string(),
        "raw".to_string(),
        "cr2".to_string(),
        "nef".to_string(),
        "arw".to_string(),
    ]
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("photodup")
        .join("photodup.db")
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
        }
    }
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            profile: PolicyProfile::default(),
            require_confirmation: default_true(),
            collision_policy: CollisionPolicy::default(),
            max_distance: None,
            aspect_ratio_tolerance: default_aspect_ratio_tolerance(),
            pixel_count_tolerance: default_pixel_count_tolerance(),
            strict_capture_time: false,
            capture_window_secs: default_capture_window_secs(),
            confidence_floor: default_confidence_floor(),
            signature_threshold: default_signature_threshold(),
        }
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            capture_tolerance_secs: default_escalation_capture_tolerance(),
            check_camera: default_true(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            scanner: ScannerConfig::default(),
            grouping: GroupingConfig::default(),
            escalation: EscalationConfig::default(),
        }
    }
}

impl GroupingConfig {
    /// Effective Hamming distance budget for the near tier.
    pub fn distance_budget(&self) -> u32 {
        self.max_distance.unwrap_or(match self.profile {
            PolicyProfile::ResourceConstrained => 4,
            PolicyProfile::Balanced => 8,
            PolicyProfile::HighAccuracy => 12,
        })
    }

    /// Extraction policy implied by the configured profile.
    pub fn extract_policy(&self) -> ExtractPolicy {
        match self.profile {
            PolicyProfile::ResourceConstrained => ExtractPolicy {
                sha256: self.require_confirmation,
                hash_kinds: vec![HashKind::Gradient],
                signature: false,
                decode_limit: Some(1024),
            },
            PolicyProfile::Balanced => ExtractPolicy {
                sha256: self.require_confirmation,
                hash_kinds: vec![HashKind::Gradient, HashKind::Mean],
                signature: false,
                decode_limit: None,
            },
            PolicyProfile::HighAccuracy => ExtractPolicy {
                sha256: self.require_confirmation,
                hash_kinds: vec![HashKind::Gradient, HashKind::Mean, HashKind::Dct],
                signature: true,
                decode_limit: None,
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("photodup")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_distance_budgets() {
        let mut cfg = GroupingConfig::default();
        assert_eq!(cfg.distance_budget(), 8);

        cfg.profile = PolicyProfile::ResourceConstrained;
        assert_eq!(cfg.distance_budget(), 4);

        cfg.max_distance = Some(20);
        assert_eq!(cfg.distance_budget(), 20);
    }

    #[test]
    fn test_resource_constrained_policy_is_minimal() {
        let mut cfg = GroupingConfig::default();
        cfg.profile = PolicyProfile::ResourceConstrained;
        let policy = cfg.extract_policy();
        assert_eq!(policy.hash_kinds.len(), 1);
        assert!(!policy.signature);
        assert!(policy.decode_limit.is_some());
    }

    #[test]
    fn test_config_round_trip() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.grouping.distance_budget(), config.grouping.distance_budget());
        assert_eq!(parsed.scanner.image_extensions, config.scanner.image_extensions);
    }
}
