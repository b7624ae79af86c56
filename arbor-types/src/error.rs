//! Error types for world construction and scene loading.

use thiserror::Error;

/// Errors raised while building or initializing a simulation world.
///
/// Per-step numerical failures (singular systems, QP failures) live in
/// `arbor-core`'s `SolverError`; this enum covers everything that can go
/// wrong before the first step: malformed configuration documents, invalid
/// topology, and invalid physical parameters. All of these are fatal at
/// load time by design.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Invalid body handle referenced.
    #[error("invalid body index: {0}")]
    InvalidBody(usize),

    /// Invalid joint handle referenced.
    #[error("invalid joint index: {0}")]
    InvalidJoint(usize),

    /// Joint tree is not in topological order (a parent handle must refer
    /// to an earlier joint).
    #[error("joint {joint} references parent {parent}, which does not precede it")]
    NotTopological {
        /// The offending joint.
        joint: usize,
        /// Its parent handle.
        parent: usize,
    },

    /// A body is claimed by more than one joint.
    #[error("body {body} is owned by joints {first} and {second}")]
    BodyOwnedTwice {
        /// The body with two owners.
        body: usize,
        /// First owning joint.
        first: usize,
        /// Second owning joint.
        second: usize,
    },

    /// Invalid mass properties (non-positive density, degenerate sides).
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
        reason: String,
    },

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Invalid configuration document.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Body not found by name.
    #[error("body not found: {name}")]
    BodyNotFound {
        /// Name of the missing body.
        name: String,
    },

    /// Joint not found by name.
    #[error("joint not found: {name}")]
    JointNotFound {
        /// Name of the missing joint.
        name: String,
    },

    /// Joint axis has zero length.
    #[error("joint {joint_name} has a zero-length axis")]
    ZeroAxis {
        /// Name of the offending joint.
        joint_name: String,
    },

    /// A spline joint needs more control frames than it was given.
    #[error("spline joint {joint_name} needs at least {required} control frames, got {given}")]
    TooFewControlFrames {
        /// Name of the offending joint.
        joint_name: String,
        /// Minimum number of control frames.
        required: usize,
        /// Number of control frames supplied.
        given: usize,
    },
}

impl SimError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid mass properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMassProperties {
            reason: reason.into(),
        }
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }
}
