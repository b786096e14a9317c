//! # hfvtx-core
//!
//! This is an internal crate used by `hfvtx`.
#![warn(clippy::perf, clippy::style)]
#![allow(clippy::excessive_precision)]

use std::path::PathBuf;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Per-event track tables, output records, and the append-only record collector.
pub mod data;
/// The two-track distance-of-closest-approach vertex fitter.
pub mod dca;
/// Thread policy for fanning work out over events and track pairs.
pub mod execution_context;
/// Frame rotations and transport of [`TrackState`]s along their trajectories.
pub mod propagator;
/// The helical track parameterization and its covariance.
pub mod track;
/// Utility functions, enums, and traits
pub mod utils;

pub use crate::data::{
    test_event, Cand2ProngRecord, Event, RecordCollector, SecondaryVertexRecord, Table,
    TrackRecord, TrackTable,
};
pub use crate::dca::{DcaFitter, FitterConfig, VertexCandidate};
pub use crate::execution_context::{ExecutionContext, ThreadPolicy};
pub use crate::propagator::{MagneticField, Propagator, UniformField};
pub use crate::track::TrackState;
pub use crate::utils::enums::{DcaMetric, Sign};
pub use crate::utils::qa::{HistogramRegistry, NoopSink, QaSink};
pub use crate::utils::vectors::{Vec3, Vec4};
pub use nalgebra::Vector3;

pub type HfvtxResult<T> = Result<T, HfvtxError>;

/// The error type used by all `hfvtx` internal methods
#[derive(Error, Debug)]
pub enum HfvtxError {
    /// An alias for [`std::io::Error`].
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
    /// An alias for [`serde_json::Error`].
    #[error("JSON Error: {0}")]
    JsonError(#[from] serde_json::Error),
    /// An alias for [`shellexpand::LookupError`].
    #[error("Failed to expand path: {0}")]
    LookupError(#[from] shellexpand::LookupError<std::env::VarError>),
    /// A track cannot be transported or rotated to the requested place, either because it would
    /// have to pass a turning point or because its direction becomes (numerically) transverse to
    /// the frame.
    #[error("Degenerate trajectory: {reason}")]
    DegenerateTrajectory {
        /// What made the trajectory degenerate
        reason: String,
    },
    /// An iterative method ran out of iterations before meeting its tolerance.
    #[error("No convergence after {iterations} iterations")]
    NonConvergence {
        /// Number of iterations spent
        iterations: usize,
    },
    /// A row was requested from a table which does not contain it.
    #[error("Index {index} is out of range for table \"{table}\" with {len} rows")]
    IndexOutOfRange {
        /// Name of the table
        table: String,
        /// The requested index
        index: usize,
        /// Number of rows in the table
        len: usize,
    },
    /// A configuration which cannot be run, typically because two settings conflict.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// A description naming the offending settings
        reason: String,
    },
    /// A histogram by the same name was already registered.
    #[error("A histogram by the name \"{name}\" is already registered!")]
    RegistrationError {
        /// Name of the histogram which is already registered
        name: String,
    },
    /// An error which occurs when the user tries to parse an invalid string of text, typically
    /// into an enum variant.
    #[error("Failed to parse string: \"{name}\" does not correspond to a valid \"{object}\"!")]
    ParseError {
        /// The string which was parsed
        name: String,
        /// The name of the object it failed to parse into
        object: String,
    },
    /// An error type for [`rayon`] thread pools
    #[cfg(feature = "rayon")]
    #[error("Error building thread pool: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
    /// A custom fallback error for errors too complex or too infrequent to warrant their own error
    /// category.
    #[error("{0}")]
    Custom(String),
}

impl HfvtxError {
    pub(crate) fn degenerate<S: Into<String>>(reason: S) -> Self {
        HfvtxError::DegenerateTrajectory {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_config<S: Into<String>>(reason: S) -> Self {
        HfvtxError::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors which only concern a single track pair or seed and can be
    /// recovered from by skipping it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HfvtxError::DegenerateTrajectory { .. } | HfvtxError::NonConvergence { .. }
        )
    }
}

pub(crate) fn expand_path(file_path: &str) -> HfvtxResult<PathBuf> {
    Ok(PathBuf::from(&*shellexpand::full(file_path)?))
}

/// A trait for serializable configuration structs which can be loaded from JSON and must be
/// checked before use.
///
/// Only [`validate`](Configuration::validate) needs an implementation; loading always validates,
/// so a configuration obtained through [`from_json_str`](Configuration::from_json_str) or
/// [`from_path`](Configuration::from_path) can be trusted by the constructors which consume it.
pub trait Configuration: Serialize + DeserializeOwned {
    /// Check the configuration for settings which cannot be run.
    fn validate(&self) -> HfvtxResult<()>;

    /// Parse and validate a configuration from a JSON string.
    fn from_json_str(json: &str) -> HfvtxResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a configuration from a JSON file. The path may contain `~` and
    /// environment variables.
    fn from_path(file_path: &str) -> HfvtxResult<Self> {
        let path = expand_path(file_path)?;
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serialize the configuration as pretty-printed JSON.
    fn to_json_string(&self) -> HfvtxResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
