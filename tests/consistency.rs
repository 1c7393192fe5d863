use approx::{assert_abs_diff_eq, assert_relative_eq};
use hardmd::config::EngineConfig;
use hardmd::core::collision::{self, PairGeometry};
use hardmd::core::{
    Boundary, Collision, EventKind, NeighborLists, NeighborSource, PairPotential, Particle,
    PotentialRegistry, Simulation, Species, Vector,
};
use hardmd::error::{Error, Result};
use std::cell::RefCell;
use std::rc::Rc;

fn pair(config: EngineConfig, potential: PairPotential, r: [Vector; 2], v: [Vector; 2]) -> Result<Simulation> {
    Simulation::new(
        config,
        Boundary::periodic([20.0, 20.0, 20.0])?,
        vec![Species::new(1.0, 0.5)?],
        vec![Particle::new(0, r[0], v[0], 0)?, Particle::new(1, r[1], v[1], 0)?],
        PotentialRegistry::single(potential),
    )
}

fn repredict(sim: &Simulation) -> Result<f64> {
    let p = sim.particles();
    let ladder = sim.potentials().potential_for(0, 0).map(|pot| pot.ladder().clone());
    let ladder = ladder.ok_or_else(|| Error::InvalidParam("no potential".into()))?;
    let g = PairGeometry::new(&p[0], &p[1], sim.boundary(), 0.0);
    collision::pair_collision_time(&ladder, &g, EventKind::Pair { i: 0, j: 1 }, false)
}

fn gas(seed: u64) -> Result<Simulation> {
    Simulation::random_gas(
        EngineConfig {
            seed: Some(seed),
            ..EngineConfig::default()
        },
        Boundary::periodic([7.0, 7.0, 7.0])?,
        30,
        1.0,
        PairPotential::square_well(1.0, 1.5, 1.0)?,
        1.0,
    )
}

#[test]
fn resolved_hard_core_contact_does_not_fire_again() -> Result<()> {
    let mut sim = pair(
        EngineConfig::default(),
        PairPotential::hard_sphere(1.0)?,
        [[5.0, 5.0, 5.0], [7.0, 5.0, 5.0]],
        [[0.0; 3], [-1.0, 0.0, 0.0]],
    )?;
    sim.advance_events(1)?;
    assert_eq!(repredict(&sim)?, f64::INFINITY);
    Ok(())
}

#[test]
fn captured_pair_is_not_captured_twice() -> Result<()> {
    let mut sim = pair(
        EngineConfig::default(),
        PairPotential::square_well(1.0, 1.5, 1.0)?,
        [[5.0, 5.0, 5.0], [6.6, 5.0, 5.0]],
        [[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0]],
    )?;
    sim.advance_events(1)?;
    let t = repredict(&sim)?;
    // next up is the core at 0.5 / relative speed 2 * sqrt(2)
    assert!(t > 0.1 && t.is_finite(), "re-predicted {t}");
    assert_relative_eq!(t, 0.5 / 8.0_f64.sqrt(), epsilon = 1e-6);
    Ok(())
}

#[test]
fn reset_is_idempotent() -> Result<()> {
    let mut sim = gas(3)?;
    sim.advance_to(1.5)?;
    sim.reset()?;
    let before: Vec<f64> = (0..sim.num_particles()).map(|i| sim.queue().time_of(i)).collect();
    sim.reset()?;
    for (i, t) in before.iter().enumerate() {
        let after = sim.queue().time_of(i);
        if t.is_finite() {
            assert_relative_eq!(*t, after, max_relative = 1e-9);
        } else {
            assert_eq!(after, f64::INFINITY);
        }
    }
    sim.verify_schedule()?;
    Ok(())
}

#[test]
fn approaching_overlap_is_fatal_unless_ignored() -> Result<()> {
    let r = [[5.0, 5.0, 5.0], [5.8, 5.0, 5.0]];
    let v = [[0.0; 3], [-1.0, 0.0, 0.0]];
    let err = pair(EngineConfig::default(), PairPotential::hard_sphere(1.0)?, r, v).unwrap_err();
    assert!(matches!(err, Error::Overlap { .. }));
    assert!(err.is_unrecoverable());

    let lenient = EngineConfig {
        ignore_overlap: true,
        ..EngineConfig::default()
    };
    let mut sim = pair(lenient, PairPotential::hard_sphere(1.0)?, r, v)?;
    // nudge time is a small fraction of separation / speed
    assert!(sim.queue().time_of(0) < 1e-3);
    sim.advance_events(1)?;
    let p = sim.particles();
    assert!(p[1].v[0] - p[0].v[0] > 0.0, "pair still approaching");
    assert_abs_diff_eq!(sim.momentum()[0], -1.0, epsilon = 1e-12);
    Ok(())
}

#[test]
fn separating_overlap_is_allowed() -> Result<()> {
    let sim = pair(
        EngineConfig::default(),
        PairPotential::hard_sphere(1.0)?,
        [[5.0, 5.0, 5.0], [5.8, 5.0, 5.0]],
        [[0.0; 3], [1.0, 0.0, 0.0]],
    )?;
    assert_eq!(sim.queue().time_of(0), f64::INFINITY);
    Ok(())
}

#[test]
fn velocity_scaling_and_thermalization() -> Result<()> {
    let mut sim = gas(11)?;
    let ke = sim.kinetic_energy();
    sim.scale_velocities(2.0)?;
    assert_relative_eq!(sim.kinetic_energy(), 4.0 * ke, max_relative = 1e-12);
    sim.verify_schedule()?;

    sim.randomize_velocities(2.0)?;
    for k in 0..3 {
        assert_abs_diff_eq!(sim.momentum()[k], 0.0, epsilon = 1e-10);
    }
    assert!(sim.kinetic_energy() > 0.0);
    sim.verify_schedule()?;
    Ok(())
}

#[test]
fn perturbations_rebuild_the_schedule() -> Result<()> {
    let mut sim = gas(17)?;
    sim.advance_to(0.5)?;
    let positions: Vec<Vector> = sim.particles().iter().map(|p| p.r).collect();
    let mut velocities: Vec<Vector> = sim.particles().iter().map(|p| p.v).collect();
    for v in &mut velocities {
        v[0] = -v[0];
    }
    sim.set_velocities(&velocities)?;
    sim.verify_schedule()?;
    sim.set_positions(&positions)?;
    sim.verify_schedule()?;
    assert!(sim.set_positions(&positions[1..]).is_err());
    sim.modify_pair_potential(0, 0, |p| p.set_lambda(1.4))?;
    assert_relative_eq!(sim.potential_energy(), sim.potential_energy_of_system());
    sim.set_box_size([8.0, 8.0, 8.0])?;
    sim.verify_schedule()?;
    sim.advance_to(1.0)?;
    Ok(())
}

#[test]
fn short_periodic_edge_is_rejected() -> Result<()> {
    let err = Simulation::new(
        EngineConfig::default(),
        Boundary::periodic([2.5, 10.0, 10.0])?,
        vec![Species::new(1.0, 0.5)?],
        vec![Particle::new(0, [1.0, 5.0, 5.0], [0.0; 3], 0)?],
        PotentialRegistry::single(PairPotential::square_well(1.0, 1.5, 1.0)?),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidParam(_)));
    Ok(())
}

#[test]
fn configuration_round_trips_through_json() -> Result<()> {
    let cfg = EngineConfig::from_json_str(r#"{ "check_schedule": true, "time_step": 0.2, "seed": 4 }"#)?;
    let mut sim = Simulation::random_gas(
        cfg.clone(),
        Boundary::walled([6.0, 6.0, 6.0])?,
        10,
        1.0,
        PairPotential::hard_sphere(1.0)?,
        1.0,
    )?;
    assert_eq!(sim.config(), &cfg);
    sim.step()?;
    assert_relative_eq!(sim.current_time(), 0.2);
    let text = serde_json::to_string(&cfg)?;
    assert_eq!(EngineConfig::from_json_str(&text)?, cfg);
    Ok(())
}

#[test]
fn overlapped_start_energy_recovers_once_separated() -> Result<()> {
    let lenient = EngineConfig {
        ignore_overlap: true,
        ..EngineConfig::default()
    };
    let mut sim = pair(
        lenient,
        PairPotential::hard_sphere(1.0)?,
        [[5.0, 5.0, 5.0], [5.8, 5.0, 5.0]],
        [[0.0; 3], [-1.0, 0.0, 0.0]],
    )?;
    assert_eq!(sim.potential_energy(), f64::INFINITY);
    sim.advance_events(1)?;
    // still inside the core, now separating
    assert_eq!(sim.potential_energy(), f64::INFINITY);
    let t = sim.current_time();
    sim.advance_to(t + 1.0)?;
    assert_eq!(sim.potential_energy(), 0.0);
    assert_eq!(sim.potential_energy(), sim.potential_energy_of_system());
    Ok(())
}

#[test]
fn removed_listener_stops_hearing_events() -> Result<()> {
    let mut sim = gas(5)?;
    let heard = Rc::new(RefCell::new(0usize));
    let sink = Rc::clone(&heard);
    let id = sim.add_collision_listener(move |_: &Collision| *sink.borrow_mut() += 1);
    let other = sim.add_collision_listener(|_: &Collision| {});
    assert_ne!(id, other);
    sim.advance_events(10)?;
    assert_eq!(*heard.borrow(), 10);
    assert!(sim.remove_collision_listener(id).is_some());
    assert!(sim.remove_collision_listener(id).is_none());
    sim.advance_events(10)?;
    assert_eq!(*heard.borrow(), 10);
    Ok(())
}

/// Claims a partner index past the end of the particle store.
struct OutOfRange;

impl NeighborSource for OutOfRange {
    fn up_neighbors(&self, atom: usize) -> &[usize] {
        if atom == 0 {
            &[500]
        } else {
            &[]
        }
    }

    fn down_neighbors(&self, _: usize) -> &[usize] {
        &[]
    }
}

#[test]
fn malformed_neighbor_source_is_rejected() -> Result<()> {
    let mut sim = gas(6)?;
    let err = sim.set_neighbors(OutOfRange).unwrap_err();
    assert!(matches!(err, Error::InvalidParam(_)));
    // the all-pairs source is still in place
    sim.advance_to(0.5)?;
    sim.verify_schedule()?;
    Ok(())
}

#[test]
fn wide_cutoff_lists_match_all_pairs() -> Result<()> {
    let mut reference = gas(12)?;
    let mut listed = gas(12)?;
    let lists = NeighborLists::within_cutoff(listed.particles(), listed.boundary(), 100.0);
    listed.set_neighbors(lists)?;
    reference.advance_to(2.0)?;
    listed.advance_to(2.0)?;
    assert_eq!(listed.event_count(), reference.event_count());
    for (a, b) in listed.particles().iter().zip(reference.particles()) {
        for k in 0..3 {
            assert_abs_diff_eq!(a.r[k], b.r[k], epsilon = 1e-12);
            assert_abs_diff_eq!(a.v[k], b.v[k], epsilon = 1e-12);
        }
    }
    Ok(())
}

#[test]
fn short_cutoff_lists_keep_a_consistent_schedule() -> Result<()> {
    let mut sim = gas(14)?;
    let lists = NeighborLists::within_cutoff(sim.particles(), sim.boundary(), 3.0);
    sim.set_neighbors(lists)?;
    sim.verify_schedule()?;
    let e0 = sim.total_energy();
    sim.advance_to(0.5)?;
    sim.verify_schedule()?;
    assert_relative_eq!(sim.potential_energy(), sim.potential_energy_of_system(), epsilon = 1e-9);
    assert_relative_eq!(sim.total_energy(), e0, max_relative = 1e-9);
    Ok(())
}
