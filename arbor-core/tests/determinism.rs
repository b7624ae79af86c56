//! Determinism: identical initial state and configuration must reproduce
//! bit-identical trajectories. There is no randomness and no wall-clock
//! dependency anywhere in the pipeline, so this is exact equality, not a
//! tolerance check.

use arbor_core::{build_world, ActiveSetQp, Solver, Trajectory};
use arbor_types::{SceneConfig, Scenario};

fn run(config: &SceneConfig) -> Trajectory {
    let mut world = build_world(config).expect("scene builds");
    let mut solver = Solver::new();
    let mut qp = ActiveSetQp::new();
    solver.simulate(&mut world, &mut qp).expect("simulate")
}

fn assert_bit_identical(a: &Trajectory, b: &Trajectory) {
    assert_eq!(a.t.len(), b.t.len());
    for (ya, yb) in a.y.iter().zip(b.y.iter()) {
        // DVector equality is element-wise exact.
        assert_eq!(ya, yb);
    }
}

#[test]
fn test_serial_chain_is_deterministic() {
    let mut config = SceneConfig::new(Scenario::SerialChain { links: 4 });
    config.tspan = [0.0, 2.0];
    assert_bit_identical(&run(&config), &run(&config));
}

#[test]
fn test_constrained_scenes_are_deterministic() {
    let mut loop_config = SceneConfig::new(Scenario::ClosedLoop { release_speed: 5.0 });
    loop_config.tspan = [0.0, 1.0];
    assert_bit_identical(&run(&loop_config), &run(&loop_config));

    let mut limit_config = SceneConfig::new(Scenario::JointLimits {
        links: 4,
        lower: -0.6,
        upper: 0.6,
    });
    limit_config.tspan = [0.0, 1.0];
    assert_bit_identical(&run(&limit_config), &run(&limit_config));
}

#[test]
fn test_trajectory_shape() {
    let mut config = SceneConfig::new(Scenario::SerialChain { links: 2 });
    config.tspan = [0.0, 0.5];
    let trajectory = run(&config);
    // One row per step plus the initial state; rows are [q; qdot].
    assert_eq!(trajectory.t.len(), 51);
    assert_eq!(trajectory.y[0].len(), 4);
    assert!((trajectory.t[50] - 0.5).abs() < 1e-12);
}
