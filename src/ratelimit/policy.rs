//! Tier to policy resolution.
//!
//! Every tier maps to one [`PolicyConfig`]. The built-in table is static; a
//! deployment can replace it with a YAML policy file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use super::algorithm::AlgorithmKind;
use super::error::RateLimitError;
use crate::error::{Result, TollgateError};

/// Service class of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    #[serde(alias = "premium_1", alias = "premium-1")]
    Premium1,
    #[serde(alias = "premium_2", alias = "premium-2")]
    Premium2,
    #[serde(alias = "premium_3", alias = "premium-3")]
    Premium3,
}

impl Tier {
    /// All tiers, lowest first.
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Premium1, Tier::Premium2, Tier::Premium3];
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Free => "free",
            Tier::Premium1 => "premium1",
            Tier::Premium2 => "premium2",
            Tier::Premium3 => "premium3",
        };
        f.write_str(name)
    }
}

impl FromStr for Tier {
    type Err = RateLimitError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "premium1" | "premium-1" | "premium_1" => Ok(Tier::Premium1),
            "premium2" | "premium-2" | "premium_2" => Ok(Tier::Premium2),
            "premium3" | "premium-3" | "premium_3" => Ok(Tier::Premium3),
            _ => Err(RateLimitError::InvalidTier(s.to_string())),
        }
    }
}

/// Resolved limit, window and algorithm for a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolicyConfig {
    /// Maximum admissions per window
    pub limit: u64,
    /// Window the limit applies to
    pub window: Duration,
    /// Algorithm enforcing the limit
    pub algorithm: AlgorithmKind,
}

impl PolicyConfig {
    /// Create a policy.
    pub fn new(limit: u64, window: Duration, algorithm: AlgorithmKind) -> Self {
        Self {
            limit,
            window,
            algorithm,
        }
    }
}

/// The built-in tier policies.
pub fn builtin_policy(tier: Tier) -> PolicyConfig {
    match tier {
        Tier::Free => PolicyConfig::new(5, Duration::from_secs(10), AlgorithmKind::FixedCounter),
        Tier::Premium1 => {
            PolicyConfig::new(20, Duration::from_secs(30), AlgorithmKind::SlidingWindow)
        }
        Tier::Premium2 => {
            PolicyConfig::new(50, Duration::from_secs(60), AlgorithmKind::TokenBucket)
        }
        Tier::Premium3 => {
            PolicyConfig::new(100, Duration::from_secs(60), AlgorithmKind::TokenBucket)
        }
    }
}

/// One tier's entry in a policy file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Maximum admissions per window
    pub limit: u64,
    /// Window length in seconds
    pub window_secs: u64,
    /// Algorithm enforcing the limit
    pub algorithm: AlgorithmKind,
}

/// Policy file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFile {
    #[serde(default)]
    pub tiers: HashMap<Tier, PolicyRule>,
}

/// Maps tiers to policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    policies: HashMap<Tier, PolicyConfig>,
}

impl PolicyTable {
    /// Table holding the built-in policy for every tier.
    pub fn builtin() -> Self {
        Self {
            policies: Tier::ALL
                .iter()
                .map(|&tier| (tier, builtin_policy(tier)))
                .collect(),
        }
    }

    /// Build a table from explicit entries, validating each one.
    pub fn from_policies(
        policies: impl IntoIterator<Item = (Tier, PolicyConfig)>,
    ) -> std::result::Result<Self, RateLimitError> {
        let policies: HashMap<Tier, PolicyConfig> = policies.into_iter().collect();
        for (tier, policy) in &policies {
            validate(*tier, policy)?;
        }
        Ok(Self { policies })
    }

    /// Load a table from a YAML policy file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading tier policy table");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load a table from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: PolicyFile = serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse policy table: {}", e)))?;

        let table = Self::from_policies(file.tiers.into_iter().map(|(tier, rule)| {
            (
                tier,
                PolicyConfig::new(rule.limit, Duration::from_secs(rule.window_secs), rule.algorithm),
            )
        }))?;
        Ok(table)
    }

    /// Resolve the policy for a tier.
    pub fn resolve(&self, tier: Tier) -> std::result::Result<PolicyConfig, RateLimitError> {
        self.policies
            .get(&tier)
            .copied()
            .ok_or_else(|| RateLimitError::InvalidTier(tier.to_string()))
    }

    /// Number of tiers with a policy.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Check if no tier has a policy.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn validate(tier: Tier, policy: &PolicyConfig) -> std::result::Result<(), RateLimitError> {
    if policy.limit == 0 {
        return Err(RateLimitError::InvalidPolicy {
            tier,
            reason: "limit must be positive".to_string(),
        });
    }
    if policy.window.is_zero() {
        return Err(RateLimitError::InvalidPolicy {
            tier,
            reason: "window must be positive".to_string(),
        });
    }
    Ok(())
}
