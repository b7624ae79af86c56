//! Reduced-coordinate articulated-body dynamics.
//!
//! A tree (optionally loop-closed) of rigid bodies on joints, augmented
//! with springs and external soft bodies, stepped forward in time by a
//! semi-implicit reduced-coordinate integrator:
//!
//! - [`World`] owns every entity — bodies, joints, springs, soft bodies,
//!   constraints — in handle-indexed arenas and drives the recursive
//!   kinematics.
//! - [`Solver`] owns the per-step scratch state: it reduces the maximal
//!   mass/stiffness/force through the tree Jacobian and solves a linear
//!   system, a KKT system, or a quadratic program depending on which
//!   constraint classes are active.
//! - [`se3`] is the spatial-algebra kernel everything else is built on.
//!
//! # Quick start
//!
//! ```
//! use arbor_core::{build_world, ActiveSetQp, Solver};
//! use arbor_types::{SceneConfig, Scenario};
//!
//! let config = SceneConfig::new(Scenario::SerialChain { links: 3 });
//! let mut world = build_world(&config).expect("scene builds");
//! let mut solver = Solver::new();
//! let mut qp = ActiveSetQp::new();
//! for _ in 0..100 {
//!     solver.step(&mut world, &mut qp).expect("step");
//! }
//! let energy = world.energy;
//! assert!(energy.total().is_finite());
//! ```
//!
//! Given identical initial state and configuration, trajectories are
//! bit-identical across runs — there is no randomness and no wall-clock
//! dependency anywhere in the pipeline.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,  // Most methods can't be const due to nalgebra
    clippy::suboptimal_flops,      // mul_add style changes aren't always clearer
    clippy::too_many_lines,        // Physics functions naturally have many steps
    clippy::doc_markdown,          // Not all technical terms need backticks
    clippy::cast_precision_loss
)]

pub mod body;
pub mod constraint;
pub mod deformable;
pub mod joint;
pub mod linalg;
pub mod qp;
pub mod scene;
pub mod se3;
pub mod soft;
pub mod solver;
pub mod world;

pub use body::Body;
pub use constraint::Constraint;
pub use deformable::{Deformable, PointSpring, SerialSpring};
pub use joint::{Joint, JointKind, SplineCurve, SplineSurface};
pub use qp::{ActiveSetQp, QpSolver};
pub use scene::{build_world, load_world};
pub use se3::SpatialVector;
pub use soft::{LumpedNodes, SoftAttachment, SoftBody};
pub use solver::{Solver, SolverError, Trajectory};
pub use world::{frame, Energy, World};

// Re-export the shared types for convenience.
pub use arbor_types::{SceneConfig, Scenario, SimError, Stabilization};
