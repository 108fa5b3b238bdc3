use std::path::PathBuf;

use crate::dataspace::LayerId;
use crate::layout::LayoutKind;

/// Fatal problems with an external descriptor. None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("failed to read descriptor '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid yaml in '{origin}'")]
    Yaml {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("malformed factor token '{token}': expected 'Rank=value'")]
    InvalidFactor { token: String },

    #[error("invalid rank name '{0}': ranks are single letters")]
    InvalidRank(String),

    #[error("layout has more than one {kind} nest for target '{target}'")]
    DuplicateNest { target: String, kind: LayoutKind },

    #[error("failed to serialize layout descriptor")]
    Serialize(#[source] serde_yaml::Error),
}

/// Failure of the external per-layer cost oracle.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("failed to launch '{program}'")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("failed to access oracle artifact '{}'", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stats report has no '{0}' field")]
    MissingField(&'static str),

    #[error("stats report field '{field}' has unparsable value '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("{0}")]
    Other(String),
}

/// Errors that terminate a network or chain analysis.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("cost oracle failed for layer {layer}")]
    Oracle {
        layer: LayerId,
        #[source]
        source: OracleError,
    },

    #[error("no baseline layout for layer {0}")]
    MissingLayout(LayerId),
}
