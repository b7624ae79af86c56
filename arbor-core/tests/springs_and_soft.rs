//! Springs and the soft-body collaborator boundary: implicit tangents
//! keep stiff springs stable, and welded soft-body nodes track their
//! bodies through the attachment constraint.

use approx::assert_relative_eq;
use arbor_core::{
    build_world, frame, ActiveSetQp, LumpedNodes, SoftBody, Solver, World,
};
use arbor_types::{SceneConfig, Scenario};
use nalgebra::{Matrix3, Matrix4, Vector3};

/// A stiff point spring from the world to a pendulum tip must stay
/// stable (the consistent tangents enter the implicit left-hand side)
/// and settle near static equilibrium.
#[test]
fn test_point_spring_suspends_pendulum() {
    let mut world = World::new(Vector3::new(0.0, -9.81, 0.0), 1.0e-2, [0.0, 10.0]);
    let sides = Vector3::new(10.0, 1.0, 1.0);
    let body = world
        .add_body(
            "link",
            1.0,
            sides,
            frame(Matrix3::identity(), Vector3::new(5.0, 0.0, 0.0)),
        )
        .expect("body");
    world
        .add_joint_revolute("pivot", body, Vector3::z(), Matrix4::identity(), 0.0, None)
        .expect("joint");
    // Anchor above the tip; rest length shorter than the drop so the
    // spring carries the link.
    world.add_point_spring(
        None,
        Vector3::new(10.0, 5.0, 0.0),
        Some(body),
        Vector3::new(5.0, 0.0, 0.0),
        2.0e3,
        50.0,
    );
    world.init().expect("init");

    let mut solver = Solver::new();
    let mut qp = ActiveSetQp::new();
    for _ in 0..1500 {
        solver.step(&mut world, &mut qp).expect("step");
    }

    // Damped to rest near the horizontal: the spring balances gravity.
    assert!(world.joints[0].qdot[0].abs() < 1e-3);
    let q = world.joints[0].q[0];
    assert!(q.abs() < 0.5, "settled angle {q} unexpectedly large");
    // At equilibrium the spring is stretched below its rest length's
    // anchor line, i.e. it carries load.
    if let arbor_core::Deformable::PointSpring(s) = &world.deformables[0] {
        assert!(s.length > s.rest_length);
    }
}

#[test]
fn test_springs_scene_energy_stays_finite() {
    let config = SceneConfig::new(Scenario::Springs { stiffness: 5.0e3 });
    let mut world = build_world(&config).expect("scene builds");
    let mut solver = Solver::new();
    let mut qp = ActiveSetQp::new();
    for _ in 0..500 {
        solver.step(&mut world, &mut qp).expect("step");
    }
    let energy = world.energy;
    assert!(energy.kinetic.is_finite());
    assert!(energy.potential.is_finite());
}

/// A soft-body node welded to a swinging link must follow the link's
/// attachment point; free nodes of the same body just fall.
#[test]
fn test_soft_body_weld_tracks_body() {
    let mut world = World::new(Vector3::new(0.0, -9.81, 0.0), 1.0e-3, [0.0, 1.0]);
    let sides = Vector3::new(10.0, 1.0, 1.0);
    let body = world
        .add_body(
            "link",
            1.0,
            sides,
            frame(Matrix3::identity(), Vector3::new(5.0, 0.0, 0.0)),
        )
        .expect("body");
    world
        .add_joint_revolute("pivot", body, Vector3::z(), Matrix4::identity(), 0.0, None)
        .expect("joint");

    // Two nodes: one welded to the link tip, one free.
    let tip_world = Vector3::new(10.0, 0.0, 0.0);
    let mut nodes = LumpedNodes::new(vec![tip_world, Vector3::new(0.0, 5.0, 0.0)], 0.5);
    nodes.weld(0, body, Vector3::new(5.0, 0.0, 0.0));
    world.add_soft_body(Box::new(nodes));
    world.init().expect("init");
    assert_eq!(world.nem, 3);

    let free_y0 = 5.0;
    let mut solver = Solver::new();
    let mut qp = ActiveSetQp::new();
    for _ in 0..500 {
        solver.step(&mut world, &mut qp).expect("step");
    }

    // The link has swung; the welded node is still on its tip.
    assert!(world.joints[0].q[0].abs() > 0.05);
    let tip_now = world.bodies[0].point_world(&Vector3::new(5.0, 0.0, 0.0));
    let (node_x, _) = world.soft_bodies[0].attachment_state(0);
    assert!((tip_now - node_x).norm() < 0.05);

    // The free node fell.
    let y = world.gather_dofs();
    let free_node_y = y[world.joints[0].ndof + 3 + 1];
    assert!(free_node_y < free_y0 - 0.5);
}

#[test]
fn test_soft_body_gather_scatter_round_trip() {
    let mut nodes = LumpedNodes::new(
        vec![Vector3::new(0.1, 0.2, 0.3), Vector3::new(-1.0, 2.0, 0.5)],
        1.0,
    );
    nodes.v[1] = Vector3::new(0.4, -0.7, 1.1);
    let mut nm = 0;
    let mut nr = 0;
    nodes.count_dofs(&mut nm, &mut nr);
    assert_eq!((nm, nr), (6, 6));

    let mut y = nalgebra::DVector::zeros(2 * nr);
    nodes.gather_dofs(&mut y, nr);
    let mut copy = nodes.clone();
    copy.scatter_dofs(&y, nr);
    for i in 0..2 {
        assert_eq!(nodes.x[i], copy.x[i]);
        assert_eq!(nodes.v[i], copy.v[i]);
    }
    assert_relative_eq!(y[nr + 4], -0.7, epsilon = 1e-15);
}
