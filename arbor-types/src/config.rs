//! Scene configuration document.
//!
//! A [`SceneConfig`] is the structured input consumed once at load time:
//! global integration parameters plus a scenario tag that selects which
//! programmatic world builder runs. Scenario-specific geometry lives on
//! the scenario variants themselves.

use serde::{Deserialize, Serialize};

use crate::SimError;

/// Baumgarte-style constraint stabilization gains.
///
/// The equality and inequality paths historically used different gains for
/// the same role; both are configuration here rather than constants, and
/// neither default is blessed as "correct".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stabilization {
    /// Gain on the equality constraint value in the velocity-level bias.
    pub equality: f64,
    /// Gain on active inequality constraint values.
    pub inequality: f64,
}

impl Default for Stabilization {
    fn default() -> Self {
        Self {
            equality: 100.0,
            inequality: 5.0,
        }
    }
}

/// Scenario selector: which bodies/joints/constraints get built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Scenario {
    /// A serial chain of identical links on revolute joints.
    SerialChain {
        /// Number of links.
        links: usize,
    },
    /// A branching tree of ten links with mixed revolute axes.
    Branching,
    /// A five-link mechanism closed by a loop constraint, released with an
    /// initial joint velocity.
    ClosedLoop {
        /// Initial velocity of the last joint (rad/s).
        #[serde(default)]
        release_speed: f64,
    },
    /// A serial chain whose joints past the root carry limit constraints.
    JointLimits {
        /// Number of links.
        links: usize,
        /// Lower joint limit (rad).
        lower: f64,
        /// Upper joint limit (rad).
        upper: f64,
    },
    /// A gravity-free chain with stiff, damped joints and an initial kick.
    JointStiffness {
        /// Joint stiffness (per-DOF).
        stiffness: f64,
        /// Joint damping (per-DOF).
        damping: f64,
    },
    /// A two-link chain with two serial springs attached.
    Springs {
        /// Spring stiffness.
        stiffness: f64,
    },
    /// A three-body mechanism whose middle joint rides a closed spline
    /// curve of control frames.
    SplineCurve,
    /// A three-body mechanism whose middle joint slides on a spline
    /// surface patch.
    SplineSurface,
}

/// Scene configuration document.
///
/// The equivalent of the JSON input the engine is loaded from. Fields not
/// present in the document take the defaults below. `draw_rate` is parsed
/// for external renderers; the core never reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Scenario to build.
    pub scenario: Scenario,
    /// Integration step size (seconds).
    #[serde(default = "default_timestep")]
    pub timestep: f64,
    /// Gravity vector.
    #[serde(default = "default_gravity")]
    pub gravity: [f64; 3],
    /// Simulated time span `[t0, t1]` (seconds).
    #[serde(default = "default_tspan")]
    pub tspan: [f64; 2],
    /// Display refresh rate hint (Hz) for external renderers.
    #[serde(default = "default_draw_rate")]
    pub draw_rate: f64,
    /// Default body density.
    #[serde(default = "default_density")]
    pub density: f64,
    /// Default cuboid side lengths.
    #[serde(default = "default_sides")]
    pub sides: [f64; 3],
    /// Constraint stabilization gains.
    #[serde(default)]
    pub stabilization: Stabilization,
    /// Inequality activation tolerance: a row is active when its slack is
    /// at or below this value. Zero means "violated or touching".
    #[serde(default)]
    pub limit_tolerance: f64,
}

fn default_timestep() -> f64 {
    1.0e-2
}

fn default_gravity() -> [f64; 3] {
    [0.0, -98.0, 0.0]
}

fn default_tspan() -> [f64; 2] {
    [0.0, 5.0]
}

fn default_draw_rate() -> f64 {
    60.0
}

fn default_density() -> f64 {
    1.0
}

fn default_sides() -> [f64; 3] {
    [10.0, 1.0, 1.0]
}

impl SceneConfig {
    /// Create a configuration for the given scenario with default globals.
    #[must_use]
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            timestep: default_timestep(),
            gravity: default_gravity(),
            tspan: default_tspan(),
            draw_rate: default_draw_rate(),
            density: default_density(),
            sides: default_sides(),
            stabilization: Stabilization::default(),
            limit_tolerance: 0.0,
        }
    }

    /// Validate global parameters. Called by the scene builder before any
    /// entity is constructed; failure here is fatal at load time.
    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(SimError::InvalidTimestep(self.timestep));
        }
        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(SimError::invalid_config("gravity must be finite"));
        }
        if !(self.tspan[1] > self.tspan[0]) {
            return Err(SimError::invalid_config(format!(
                "tspan [{}, {}] is empty",
                self.tspan[0], self.tspan[1]
            )));
        }
        if !(self.density.is_finite() && self.density > 0.0) {
            return Err(SimError::invalid_mass(format!(
                "density {} must be positive",
                self.density
            )));
        }
        if self.sides.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(SimError::invalid_mass("sides must be positive".to_string()));
        }
        if self.limit_tolerance < 0.0 {
            return Err(SimError::invalid_config(
                "limit_tolerance must be non-negative",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SceneConfig::new(Scenario::SerialChain { links: 5 });
        config.validate().unwrap();
    }

    #[test]
    fn test_json_round_trip() {
        let config = SceneConfig::new(Scenario::JointLimits {
            links: 6,
            lower: -0.8,
            upper: 0.8,
        });
        let text = serde_json::to_string(&config).unwrap();
        let back: SceneConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_minimal_document() {
        let text = r#"{ "scenario": { "type": "serial_chain", "links": 3 } }"#;
        let config: SceneConfig = serde_json::from_str(text).unwrap();
        assert_eq!(config.timestep, 1.0e-2);
        assert_eq!(config.stabilization.equality, 100.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_timestep() {
        let mut config = SceneConfig::new(Scenario::Branching);
        config.timestep = -1.0;
        assert!(matches!(
            config.validate(),
            Err(SimError::InvalidTimestep(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_document() {
        let text = r#"{ "scenario": { "type": "does_not_exist" } }"#;
        assert!(serde_json::from_str::<SceneConfig>(text).is_err());
    }
}
