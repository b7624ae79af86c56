//! Scene construction from a configuration document.
//!
//! [`build_world`] validates a [`SceneConfig`] and runs the scenario's
//! programmatic builder: bodies, joints, springs, and constraints are
//! created through the world factories and the world is initialized.
//! Geometry follows the scenario conventions: links are cuboids of the
//! configured `sides`, chained along +x, with joint frames at the link
//! ends.

use arbor_types::{SceneConfig, Scenario, SimError};
use nalgebra::{Matrix3, Matrix4, Vector3, Vector6};

use crate::se3;
use crate::world::{frame, World};

/// Parse a JSON scene document and build its world.
pub fn load_world(text: &str) -> Result<World, SimError> {
    let config: SceneConfig = serde_json::from_str(text)
        .map_err(|e| SimError::invalid_config(format!("scene document: {e}")))?;
    build_world(&config)
}

/// Build and initialize the world a configuration describes.
pub fn build_world(config: &SceneConfig) -> Result<World, SimError> {
    config.validate()?;
    let gravity = Vector3::from_row_slice(&config.gravity);
    let mut world = World::new(gravity, config.timestep, config.tspan);
    world.stabilization_eq = config.stabilization.equality;
    world.stabilization_ineq = config.stabilization.inequality;
    world.limit_tolerance = config.limit_tolerance;

    let sides = Vector3::from_row_slice(&config.sides);
    let density = config.density;

    match &config.scenario {
        Scenario::SerialChain { links } => {
            if *links == 0 {
                return Err(SimError::invalid_config("serial_chain needs links >= 1"));
            }
            build_chain(&mut world, *links, density, sides, 0.0, 0.0)?;
        }
        Scenario::Branching => {
            build_branching(&mut world, density, sides)?;
        }
        Scenario::ClosedLoop { release_speed } => {
            build_closed_loop(&mut world, density, *release_speed)?;
        }
        Scenario::JointLimits {
            links,
            lower,
            upper,
        } => {
            if *links < 2 {
                return Err(SimError::invalid_config("joint_limits needs links >= 2"));
            }
            if lower >= upper {
                return Err(SimError::invalid_config(format!(
                    "joint limits [{lower}, {upper}] are empty"
                )));
            }
            build_chain(&mut world, *links, density, sides, 0.0, 0.0)?;
            for joint in 1..*links {
                world.add_constraint_joint_limit(joint, *lower, *upper);
            }
        }
        Scenario::JointStiffness { stiffness, damping } => {
            build_chain(&mut world, 3, density, sides, *stiffness, *damping)?;
            world.joints[0].qdot[0] = 1.0;
        }
        Scenario::Springs { stiffness } => {
            build_chain(&mut world, 2, density, sides, 0.0, 0.0)?;
            let chain_mass = sides.x * sides.y * sides.z * density;
            let link_len = sides.x;
            let last = world.bodies.len() - 1;
            world.add_serial_spring(
                chain_mass,
                3,
                None,
                Vector3::new(2.0 * link_len + 10.0, 10.0, 0.0),
                Some(last),
                Vector3::new(0.5 * link_len, 0.0, 0.0),
                *stiffness,
                0.0,
            );
            world.add_serial_spring(
                chain_mass,
                2,
                Some(0),
                Vector3::zeros(),
                Some(last),
                Vector3::zeros(),
                *stiffness,
                0.0,
            );
        }
        Scenario::SplineCurve => {
            build_spline_curve(&mut world, density, sides)?;
        }
        Scenario::SplineSurface => {
            build_spline_surface(&mut world, density, sides)?;
        }
    }

    world.init()?;
    Ok(world)
}

/// A serial chain of `links` cuboids on revolute z-joints along +x.
fn build_chain(
    world: &mut World,
    links: usize,
    density: f64,
    sides: Vector3<f64>,
    stiffness: f64,
    damping: f64,
) -> Result<(), SimError> {
    let len = sides.x;
    for i in 0..links {
        let body = world.add_body(
            format!("link{i}"),
            density,
            sides,
            frame(Matrix3::identity(), Vector3::new(0.5 * len, 0.0, 0.0)),
        )?;
        let origin = if i == 0 {
            Vector3::zeros()
        } else {
            Vector3::new(len, 0.0, 0.0)
        };
        let parent = if i == 0 { None } else { Some(i - 1) };
        let joint = world.add_joint_revolute(
            format!("joint{i}"),
            body,
            Vector3::z(),
            frame(Matrix3::identity(), origin),
            0.0,
            parent,
        )?;
        world.joints[joint].stiffness = stiffness;
        world.joints[joint].damping = damping;
    }
    Ok(())
}

/// Ten links branching over mixed revolute axes.
fn build_branching(world: &mut World, density: f64, sides: Vector3<f64>) -> Result<(), SimError> {
    let down = Vector3::new(1.0, 10.0, 1.0);
    let across = Vector3::new(20.0, 1.0, 1.0);
    let hang = frame(Matrix3::identity(), Vector3::new(0.0, -5.0, 0.0));
    let centered = frame(Matrix3::identity(), Vector3::zeros());

    let layout: [(Vector3<f64>, Matrix4<f64>); 10] = [
        (down, hang),
        (across, centered),
        (down, hang),
        (down, hang),
        (sides, centered),
        (down, hang),
        (down, hang),
        (sides, centered),
        (down, hang),
        (down, hang),
    ];
    for (i, (s, e_ji)) in layout.iter().enumerate() {
        world.add_body(format!("b{i}"), density, *s, *e_ji)?;
    }

    let q45 = std::f64::consts::FRAC_PI_4;
    let joints: [(usize, Vector3<f64>, Vector3<f64>, f64, Option<usize>); 10] = [
        (0, Vector3::x(), Vector3::new(0.0, 15.0, 0.0), 0.0, None),
        (1, Vector3::y(), Vector3::new(0.0, -10.0, 0.0), 0.0, Some(0)),
        (2, Vector3::x(), Vector3::new(-10.0, 0.0, 0.0), q45, Some(1)),
        (3, Vector3::z(), Vector3::new(10.0, 0.0, 0.0), q45, Some(1)),
        (4, Vector3::y(), Vector3::new(0.0, -10.0, 0.0), q45, Some(2)),
        (5, Vector3::x(), Vector3::new(-5.0, 0.0, 0.0), q45, Some(4)),
        (6, Vector3::y(), Vector3::new(5.0, 0.0, 0.0), q45, Some(4)),
        (7, Vector3::y(), Vector3::new(0.0, -10.0, 0.0), q45, Some(3)),
        (8, Vector3::x(), Vector3::new(-5.0, 0.0, 0.0), q45, Some(7)),
        (9, Vector3::y(), Vector3::new(5.0, 0.0, 0.0), q45, Some(7)),
    ];
    for (body, axis, origin, q0, parent) in joints {
        world.add_joint_revolute(
            format!("j{body}"),
            body,
            axis,
            frame(Matrix3::identity(), origin),
            q0,
            parent,
        )?;
    }
    Ok(())
}

/// Five links closed into a four-bar-style loop, released with an initial
/// joint velocity.
fn build_closed_loop(world: &mut World, density: f64, release_speed: f64) -> Result<(), SimError> {
    let beam = Vector3::new(20.0, 1.0, 1.0);
    let post = Vector3::new(1.0, 10.0, 1.0);

    let b0 = world.add_body(
        "beam0",
        density,
        beam,
        frame(Matrix3::identity(), Vector3::zeros()),
    )?;
    let b1 = world.add_body(
        "post0",
        density,
        post,
        frame(Matrix3::identity(), Vector3::new(0.0, -5.0, 0.0)),
    )?;
    let b2 = world.add_body(
        "post1",
        density,
        post,
        frame(Matrix3::identity(), Vector3::new(0.0, -5.0, 0.0)),
    )?;
    let b3 = world.add_body(
        "beam1",
        density,
        beam,
        frame(Matrix3::identity(), Vector3::new(10.0, 0.0, 0.0)),
    )?;
    let b4 = world.add_body(
        "post2",
        density,
        post,
        frame(Matrix3::identity(), Vector3::new(0.0, -5.0, 0.0)),
    )?;

    let j0 = world.add_joint_revolute(
        "j0",
        b0,
        Vector3::z(),
        frame(Matrix3::identity(), Vector3::zeros()),
        0.0,
        None,
    )?;
    let j1 = world.add_joint_revolute(
        "j1",
        b1,
        Vector3::z(),
        frame(Matrix3::identity(), Vector3::new(-10.0, 0.0, 0.0)),
        0.0,
        Some(j0),
    )?;
    let _j2 = world.add_joint_revolute(
        "j2",
        b2,
        Vector3::z(),
        frame(Matrix3::identity(), Vector3::new(10.0, 0.0, 0.0)),
        0.0,
        Some(j0),
    )?;
    let j3 = world.add_joint_revolute(
        "j3",
        b3,
        Vector3::z(),
        frame(Matrix3::identity(), Vector3::new(0.0, -10.0, 0.0)),
        0.0,
        Some(j1),
    )?;
    let j4 = world.add_joint_revolute(
        "j4",
        b4,
        Vector3::z(),
        frame(Matrix3::identity(), Vector3::new(10.0, 0.0, 0.0)),
        0.0,
        Some(j3),
    )?;
    world.joints[j4].qdot[0] = release_speed;

    // Close post1's tip onto beam1.
    world.add_constraint_loop(
        b2,
        b3,
        Vector3::new(0.0, -5.0, 0.0),
        Vector3::new(10.0, 0.0, 0.0),
    );
    Ok(())
}

/// Root revolute link, a spline-curve joint riding a closed loop of four
/// control frames, and a revolute tip link.
fn build_spline_curve(world: &mut World, density: f64, sides: Vector3<f64>) -> Result<(), SimError> {
    let b0 = world.add_body(
        "base",
        density,
        sides,
        frame(Matrix3::identity(), Vector3::new(0.0, -5.0, 0.0)),
    )?;
    let j0 = world.add_joint_revolute(
        "root",
        b0,
        Vector3::z(),
        frame(Matrix3::identity(), Vector3::zeros()),
        0.0,
        None,
    )?;

    let b1 = world.add_body(
        "rider",
        density,
        sides,
        frame(Matrix3::identity(), Vector3::new(5.0, 0.0, 0.0)),
    )?;
    let pi = std::f64::consts::PI;
    let frames = vec![
        frame(se3::aa_to_mat(&Vector3::z(), pi), Vector3::new(-10.0, 0.0, 0.0)),
        frame(se3::aa_to_mat(&Vector3::z(), pi / 2.0), Vector3::new(0.0, 2.0, 0.0)),
        frame(se3::aa_to_mat(&Vector3::z(), 0.0), Vector3::new(10.0, 0.0, 0.0)),
        frame(se3::aa_to_mat(&Vector3::z(), -pi / 2.0), Vector3::new(0.0, -2.0, 0.0)),
    ];
    let j1 = world.add_joint_spline_curve(
        "curve",
        b1,
        frames,
        frame(Matrix3::identity(), Vector3::new(0.0, -10.0, 0.0)),
        Some(j0),
    )?;
    world.joints[j1].q[0] = -0.25 * pi;

    let b2 = world.add_body(
        "tip",
        density,
        sides,
        frame(Matrix3::identity(), Vector3::new(5.0, 0.0, 0.0)),
    )?;
    let j2 = world.add_joint_revolute(
        "tip",
        b2,
        Vector3::z(),
        frame(Matrix3::identity(), Vector3::new(10.0, 0.0, 0.0)),
        0.0,
        Some(j1),
    )?;
    world.joints[j2].q[0] = 15.0 * pi / 16.0;
    Ok(())
}

/// Root revolute link, a 2-DOF spline-surface joint over a paraboloid
/// patch, and a revolute tip link.
fn build_spline_surface(
    world: &mut World,
    density: f64,
    sides: Vector3<f64>,
) -> Result<(), SimError> {
    let hang = frame(Matrix3::identity(), Vector3::new(0.0, -5.0, 0.0));
    let b0 = world.add_body("base", density, sides, hang)?;
    let j0 = world.add_joint_revolute(
        "root",
        b0,
        Vector3::z(),
        frame(Matrix3::identity(), Vector3::zeros()),
        std::f64::consts::FRAC_PI_8,
        None,
    )?;

    let b1 = world.add_body("rider", density, sides, hang)?;
    let half_span = 15.0;
    let half_tilt = 0.25 * std::f64::consts::PI;
    let mut grid = [[Vector6::zeros(); 4]; 4];
    for (i, row) in grid.iter_mut().enumerate() {
        let s1 = i as f64 / 3.0;
        let x = (2.0 * s1 - 1.0) * half_span;
        let a = (2.0 * s1 - 1.0) * half_tilt;
        for (j, ctrl) in row.iter_mut().enumerate() {
            let s2 = j as f64 / 3.0;
            let y = (2.0 * s2 - 1.0) * half_span;
            let z = 0.05 * (x * x + y * y);
            // Twist layout [ω, v]: tilt about x and z, sit on the
            // paraboloid with the patch's y mapped to world z.
            *ctrl = Vector6::new(a, 0.0, a, x, z, y);
        }
    }
    let j1 = world.add_joint_spline_surface(
        "surface",
        b1,
        grid,
        frame(Matrix3::identity(), Vector3::new(0.0, -14.0, 0.0)),
        Some(j0),
    )?;
    world.joints[j1].q[0] = 0.5;
    world.joints[j1].q[1] = 0.5;

    let b2 = world.add_body("tip", density, sides, hang)?;
    world.add_joint_revolute(
        "tip",
        b2,
        Vector3::z(),
        frame(Matrix3::identity(), Vector3::new(0.0, -10.0, 0.0)),
        std::f64::consts::FRAC_PI_4,
        Some(j1),
    )?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use arbor_types::Stabilization;

    #[test]
    fn test_serial_chain_dimensions() {
        let config = SceneConfig::new(Scenario::SerialChain { links: 5 });
        let world = build_world(&config).unwrap();
        assert_eq!(world.nr, 5);
        assert_eq!(world.nm, 30);
        assert_eq!(world.nem + world.ner + world.nim + world.nir, 0);
    }

    #[test]
    fn test_joint_limits_scene() {
        let config = SceneConfig::new(Scenario::JointLimits {
            links: 6,
            lower: -std::f64::consts::FRAC_PI_4,
            upper: std::f64::consts::FRAC_PI_4,
        });
        let world = build_world(&config).unwrap();
        assert_eq!(world.nir, 5);
        assert_eq!(world.nim, 0);
    }

    #[test]
    fn test_closed_loop_scene() {
        let config = SceneConfig::new(Scenario::ClosedLoop { release_speed: 5.0 });
        let world = build_world(&config).unwrap();
        assert_eq!(world.nem, 3);
        assert_eq!(world.nr, 5);
    }

    #[test]
    fn test_springs_scene_counts_node_dofs() {
        let config = SceneConfig::new(Scenario::Springs { stiffness: 5.0e3 });
        let world = build_world(&config).unwrap();
        // 2 joints + (3 + 2 nodes) × 3 coordinates.
        assert_eq!(world.nr, 2 + 15);
        // Two automatic attachment constraints, 6 rows each.
        assert_eq!(world.nem, 12);
    }

    #[test]
    fn test_spline_scenes_build() {
        for scenario in [Scenario::SplineCurve, Scenario::SplineSurface] {
            let config = SceneConfig::new(scenario);
            let world = build_world(&config).unwrap();
            assert!(world.is_initialized());
            assert!(world.nr >= 3);
        }
    }

    #[test]
    fn test_load_world_rejects_malformed_json() {
        assert!(load_world("{ not json").is_err());
        assert!(load_world(r#"{ "scenario": { "type": "nope" } }"#).is_err());
    }

    #[test]
    fn test_load_world_passes_gains_through() {
        let mut config = SceneConfig::new(Scenario::SerialChain { links: 2 });
        config.stabilization = Stabilization {
            equality: 42.0,
            inequality: 7.0,
        };
        let text = serde_json::to_string(&config).unwrap();
        let world = load_world(&text).unwrap();
        assert_eq!(world.stabilization_eq, 42.0);
        assert_eq!(world.stabilization_ineq, 7.0);
    }

    #[test]
    fn test_rejects_degenerate_scenarios() {
        let config = SceneConfig::new(Scenario::SerialChain { links: 0 });
        assert!(build_world(&config).is_err());
        let config = SceneConfig::new(Scenario::JointLimits {
            links: 3,
            lower: 1.0,
            upper: -1.0,
        });
        assert!(build_world(&config).is_err());
    }
}
