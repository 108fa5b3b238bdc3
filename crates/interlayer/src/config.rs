use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::warn;

use crate::error::DescriptorError;
use crate::rank::RankEquivalence;

/// Memory level shared by producer and consumer tensors.
pub const DEFAULT_SHARED_TARGET: &str = "MainMemory";

/// Read/write ports of the shared memory used to price layout reorganization.
pub const DEFAULT_MEMORY_PORTS: u64 = 2;

// RehashCostParameters - Crypto engine model for the rehash estimator

/// Field names are kebab-case like the rest of [`AnalysisConfig`]. The crypto
/// descriptor's key names are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RehashCostParameters {
    /// Bits processed per crypto datapath step.
    pub datapath: u64,
    /// Bits per tensor element.
    pub word_bits: u64,
    #[serde(alias = "auth-cycle-per-datapath")]
    pub auth_cycles_per_datapath: u64,
    #[serde(alias = "enc-cycle-per-datapath")]
    pub enc_cycles_per_datapath: u64,
    /// Fixed cycles added to every authentication block.
    #[serde(alias = "auth-additional-cycle-per-block")]
    pub overhead_per_block: u64,
}

impl Default for RehashCostParameters {
    fn default() -> Self {
        RehashCostParameters {
            datapath: 1,
            word_bits: 16,
            auth_cycles_per_datapath: 1,
            enc_cycles_per_datapath: 1,
            overhead_per_block: 1,
        }
    }
}

impl RehashCostParameters {
    /// Parse a crypto descriptor (`crypto: {datapath, auth-cycle-per-datapath, ...}`).
    ///
    /// Never fails: a missing or malformed field falls back to the default cost
    /// model for that field, and unreadable YAML falls back entirely. Each
    /// fallback is logged.
    pub fn from_yaml_str(text: &str) -> Self {
        let defaults = RehashCostParameters::default();
        let doc: Value = match serde_yaml::from_str(text) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(%err, "unreadable crypto descriptor, using default cost model");
                return defaults;
            }
        };
        let crypto = doc.get("crypto");
        if crypto.is_none() {
            warn!("crypto descriptor has no 'crypto' section, using default cost model");
            return defaults;
        }
        let field = |key: &str, default: u64| -> u64 {
            match crypto.and_then(|c| c.get(key)) {
                Some(v) => match v.as_u64() {
                    Some(n) => n,
                    None => {
                        warn!(
                            key,
                            value = ?v,
                            default,
                            "malformed crypto parameter, using default"
                        );
                        default
                    }
                },
                None => {
                    warn!(key, default, "missing crypto parameter, using default");
                    default
                }
            }
        };
        RehashCostParameters {
            datapath: field("datapath", defaults.datapath),
            word_bits: crypto
                .and_then(|c| c.get("word-bits"))
                .and_then(Value::as_u64)
                .unwrap_or(defaults.word_bits),
            auth_cycles_per_datapath: field(
                "auth-cycle-per-datapath",
                defaults.auth_cycles_per_datapath,
            ),
            enc_cycles_per_datapath: field(
                "enc-cycle-per-datapath",
                defaults.enc_cycles_per_datapath,
            ),
            overhead_per_block: field(
                "auth-additional-cycle-per-block",
                defaults.overhead_per_block,
            ),
        }
    }

    /// Read a crypto descriptor file, falling back to defaults when it cannot be read.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => RehashCostParameters::from_yaml_str(&text),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    %err,
                    "crypto descriptor not readable, using default cost model"
                );
                RehashCostParameters::default()
            }
        }
    }

    /// Cycles per datapath step: the slower of encryption and authentication.
    pub fn cycles_per_datapath(&self) -> u64 {
        self.enc_cycles_per_datapath.max(self.auth_cycles_per_datapath)
    }
}

// AnalysisConfig - Explicit configuration passed into every component

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AnalysisConfig {
    pub shared_target: String,
    pub equivalence: RankEquivalence,
    pub rehash: RehashCostParameters,
    pub memory_ports: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            shared_target: DEFAULT_SHARED_TARGET.to_string(),
            equivalence: RankEquivalence::default(),
            rehash: RehashCostParameters::default(),
            memory_ports: DEFAULT_MEMORY_PORTS,
        }
    }
}

impl AnalysisConfig {
    pub fn with_shared_target(mut self, target: impl Into<String>) -> Self {
        self.shared_target = target.into();
        self
    }

    pub fn with_rehash(mut self, rehash: RehashCostParameters) -> Self {
        self.rehash = rehash;
        self
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, DescriptorError> {
        serde_yaml::from_str(text).map_err(|source| DescriptorError::Yaml {
            origin: "analysis config".to_string(),
            source,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DescriptorError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DescriptorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| DescriptorError::Yaml {
            origin: path.display().to_string(),
            source,
        })
    }
}
