//! Loop-closure equality constraint: the attachment points on the two
//! bodies must stay coincident within the stabilization tolerance.

use arbor_core::{build_world, ActiveSetQp, Constraint, Solver, World};
use arbor_types::{SceneConfig, Scenario};
use nalgebra::Vector3;

fn closure_gap(world: &World) -> f64 {
    for con in &world.constraints {
        if let Constraint::Loop {
            body_a,
            body_b,
            ra,
            rb,
            ..
        } = con
        {
            let xa = world.bodies[*body_a].point_world(ra);
            let xb = world.bodies[*body_b].point_world(rb);
            return (xa - xb).norm();
        }
    }
    panic!("no loop constraint in scene");
}

#[test]
fn test_loop_stays_closed() {
    let mut config = SceneConfig::new(Scenario::ClosedLoop { release_speed: 5.0 });
    config.timestep = 1.0e-2;
    let mut world = build_world(&config).expect("scene builds");
    assert!(closure_gap(&world) < 1e-10, "loop starts closed");

    let mut solver = Solver::new();
    let mut qp = ActiveSetQp::new();
    let mut max_gap: f64 = 0.0;
    for _ in 0..500 {
        solver.step(&mut world, &mut qp).expect("step");
        max_gap = max_gap.max(closure_gap(&world));
    }
    // Velocity-level enforcement with Baumgarte stabilization: the gap
    // drifts but stays small relative to the 20-unit links.
    assert!(max_gap < 0.05, "closure gap {max_gap} too large");
}

#[test]
fn test_constraint_forces_are_scattered() {
    let config = SceneConfig::new(Scenario::ClosedLoop { release_speed: 5.0 });
    let mut world = build_world(&config).expect("scene builds");
    let mut solver = Solver::new();
    let mut qp = ActiveSetQp::new();
    for _ in 0..20 {
        solver.step(&mut world, &mut qp).expect("step");
    }
    // The equality solve reports multipliers as body wrenches; a loaded
    // loop carries nonzero constraint force somewhere.
    let total: f64 = world.bodies.iter().map(|b| b.wrench_con.norm()).sum();
    assert!(total > 0.0);
    assert!(total.is_finite());
}

#[test]
fn test_mechanism_still_moves() {
    // The constraint must not freeze the mechanism: the released joint
    // keeps swinging.
    let config = SceneConfig::new(Scenario::ClosedLoop { release_speed: 5.0 });
    let mut world = build_world(&config).expect("scene builds");
    let q0 = world.joints[0].q[0];
    let mut solver = Solver::new();
    let mut qp = ActiveSetQp::new();
    for _ in 0..200 {
        solver.step(&mut world, &mut qp).expect("step");
    }
    assert!((world.joints[0].q[0] - q0).abs() > 1e-4);
}

/// A spring attachment is the same equality machinery on a serial
/// spring's end nodes.
#[test]
fn test_spring_attachment_holds() {
    let config = SceneConfig::new(Scenario::Springs { stiffness: 5.0e3 });
    let mut world = build_world(&config).expect("scene builds");
    let mut solver = Solver::new();
    let mut qp = ActiveSetQp::new();
    for _ in 0..300 {
        solver.step(&mut world, &mut qp).expect("step");
    }

    for con in &world.constraints {
        if let Constraint::AttachSpring { deformable, .. } = con {
            let arbor_core::Deformable::SerialSpring(spring) = &world.deformables[*deformable]
            else {
                panic!("attach-spring constraint on a point spring");
            };
            let anchor0 = match spring.body0 {
                Some(b) => world.bodies[b].point_world(&spring.r0),
                None => spring.r0,
            };
            let gap0: Vector3<f64> = anchor0 - spring.nodes[0].x;
            assert!(gap0.norm() < 0.05, "end-node gap {} too large", gap0.norm());
        }
    }
}
