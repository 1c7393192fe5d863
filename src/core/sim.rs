use crate::config::{EngineConfig, Thermostat};
use crate::core::boundary::Boundary;
use crate::core::collision::{self, Bump, PairGeometry};
use crate::core::init;
use crate::core::listener::{Collision, CollisionListener, ListenerId};
use crate::core::neighbors::{self, NeighborLists, NeighborSource};
use crate::core::particle::{pair_mut, Particle, Species};
use crate::core::piston::MovingBoundary;
use crate::core::potential::{PairPotential, PotentialRegistry};
use crate::core::queue::EventQueue;
use crate::core::vector::{self, Vector, DIM};
use crate::core::EventKind;
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::Rng;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

/// Relative slack when comparing live and freshly recomputed event times.
const SCHEDULE_RTOL: f64 = 1e-8;

/// Share of `L_min / 2 - range` a particle may travel before its pair
/// predictions are refreshed. Two partners then close at most
/// `0.9 (L_min / 2 - range)` between refreshes, so the nearest image is the
/// only one that can enter the interaction range.
const RECHECK_FRACTION: f64 = 0.45;

/// `advance_events` stops after this many consecutive rechecks per particle
/// without a collision.
const IDLE_RECHECKS_PER_PARTICLE: usize = 1000;

/// What `process_next` did with the head of the queue.
enum Outcome {
    Idle,
    Recheck,
    Collision,
}

/// Event-driven engine for particles interacting through stepwise potentials.
///
/// Stored positions (and the piston state) are valid at `current_time()`.
/// While events are processed the stored state lags behind; each event is
/// evaluated at `false_time = t_event - t_base` and the whole store is drifted
/// once at the end of `advance_to`, `step` and `advance_events`.
///
/// Every particle owns at most one scheduled event: the earliest of its pair
/// events with up-neighbors, its box-wall contacts, its piston contact and,
/// in a periodic box, its next recheck.
pub struct Simulation {
    config: EngineConfig,
    t_base: f64,
    last_event_time: f64,
    boundary: Boundary,
    species: Vec<Species>,
    particles: Vec<Particle>,
    potentials: PotentialRegistry,
    piston: Option<MovingBoundary>,
    neighbors: Box<dyn NeighborSource>,
    /// Distance a particle may travel between two refreshes of its pairs.
    recheck_distance: f64,
    /// Absolute time at which each particle's pair predictions expire.
    recheck_at: Vec<f64>,
    queue: EventQueue,
    listeners: Vec<(ListenerId, Box<dyn CollisionListener>)>,
    next_listener: u64,
    event_count: u64,
    potential_energy: f64,
    steps_to_thermostat: u32,
    rng: StdRng,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("time", &self.t_base)
            .field("particles", &self.particles.len())
            .field("events", &self.event_count)
            .field("piston", &self.piston)
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Build an engine over an initial state and predict every event.
    ///
    /// Particle `k` must carry `id == k`; every species index must have a row
    /// in `potentials`. All pairs are candidate partners until
    /// [`Simulation::set_neighbors`] installs a narrower source.
    pub fn new(
        config: EngineConfig,
        boundary: Boundary,
        species: Vec<Species>,
        particles: Vec<Particle>,
        potentials: PotentialRegistry,
    ) -> Result<Self> {
        config.validate()?;
        if species.is_empty() {
            return Err(Error::InvalidParam("at least one species is required".into()));
        }
        if potentials.n_types() != species.len() {
            return Err(Error::InvalidParam(format!(
                "potential registry covers {} species, {} given",
                potentials.n_types(),
                species.len()
            )));
        }
        for (k, p) in particles.iter().enumerate() {
            if p.id != k {
                return Err(Error::InvalidParam(format!(
                    "particle at index {k} carries id {}",
                    p.id
                )));
            }
            if p.species >= species.len() {
                return Err(Error::InvalidParam(format!(
                    "particle {k} has unknown species {}",
                    p.species
                )));
            }
        }
        let n = particles.len();
        let rng = init::make_rng(config.seed);
        let steps_to_thermostat = config.thermostat_interval;
        let mut sim = Self {
            config,
            t_base: 0.0,
            last_event_time: 0.0,
            boundary,
            species,
            particles,
            potentials,
            piston: None,
            neighbors: Box::new(NeighborLists::all_pairs(n)),
            recheck_distance: f64::INFINITY,
            recheck_at: vec![f64::INFINITY; n],
            queue: EventQueue::new(n),
            listeners: Vec::new(),
            next_listener: 0,
            event_count: 0,
            potential_energy: 0.0,
            steps_to_thermostat,
            rng,
        };
        sim.reset()?;
        Ok(sim)
    }

    /// One species of `n` particles at random non-overlapping positions with
    /// thermal velocities; the wall radius is half the core diameter.
    pub fn random_gas(
        config: EngineConfig,
        boundary: Boundary,
        n: usize,
        mass: f64,
        potential: PairPotential,
        temperature: f64,
    ) -> Result<Self> {
        let diameter = potential.diameter();
        let species = vec![Species::new(mass, 0.5 * diameter)?];
        let mut rng = init::make_rng(config.seed);
        let positions = init::random_positions(&mut rng, n, &boundary, diameter, 0.5 * diameter)?;
        let types = vec![0; n];
        let velocities = init::thermal_velocities(&mut rng, &species, &types, temperature)?;
        let particles = positions
            .into_iter()
            .zip(velocities)
            .enumerate()
            .map(|(id, (r, v))| Particle::new(id, r, v, 0))
            .collect::<Result<Vec<_>>>()?;
        Self::new(
            config,
            boundary,
            species,
            particles,
            PotentialRegistry::single(potential),
        )
    }

    /// Install a moving boundary and re-predict.
    pub fn with_piston(mut self, piston: MovingBoundary) -> Result<Self> {
        self.set_piston(Some(piston))?;
        Ok(self)
    }

    pub fn set_piston(&mut self, piston: Option<MovingBoundary>) -> Result<()> {
        if let Some(p) = &piston {
            if self.boundary.is_periodic(p.axis()) {
                return Err(Error::InvalidParam(format!(
                    "piston axis {} is periodic",
                    p.axis()
                )));
            }
        }
        self.piston = piston;
        self.reset()
    }

    /// Replace the candidate-partner source and re-predict.
    ///
    /// The lists must be directed over the current particles (see
    /// [`neighbors::validate`]); a malformed source is rejected and the
    /// previous one stays installed.
    pub fn set_neighbors<N: NeighborSource + 'static>(&mut self, neighbors: N) -> Result<()> {
        neighbors::validate(&neighbors, self.particles.len())?;
        self.neighbors = Box::new(neighbors);
        self.reset()
    }

    pub fn add_collision_listener<L: CollisionListener + 'static>(&mut self, listener: L) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Unregister a listener and hand it back.
    pub fn remove_collision_listener(&mut self, id: ListenerId) -> Option<Box<dyn CollisionListener>> {
        let pos = self.listeners.iter().position(|(lid, _)| *lid == id)?;
        Some(self.listeners.remove(pos).1)
    }

    // ============ Query surface ============

    /// Time at which stored positions are valid.
    #[inline]
    pub fn current_time(&self) -> f64 {
        self.t_base
    }

    /// Time of the last resolved event.
    #[inline]
    pub fn last_event_time(&self) -> f64 {
        self.last_event_time
    }

    #[inline]
    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    #[inline]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    #[inline]
    pub fn species(&self) -> &[Species] {
        &self.species
    }

    #[inline]
    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    #[inline]
    pub fn potentials(&self) -> &PotentialRegistry {
        &self.potentials
    }

    #[inline]
    pub fn piston(&self) -> Option<&MovingBoundary> {
        self.piston.as_ref()
    }

    #[inline]
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of events resolved so far.
    #[inline]
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Potential energy tracked incrementally from each bump.
    #[inline]
    pub fn potential_energy(&self) -> f64 {
        self.potential_energy
    }

    /// Pair potential energy summed over the current ladder states.
    pub fn potential_energy_of_system(&self) -> f64 {
        let mut total = 0.0;
        for (i, pi) in self.particles.iter().enumerate() {
            for &j in self.neighbors.up_neighbors(i) {
                let pj = &self.particles[j];
                if let Some(pot) = self.potentials.potential_for(pi.species, pj.species) {
                    let dr = self.boundary.nearest_image(vector::sub(&pj.r, &pi.r));
                    total += pot.ladder().energy_at(vector::squared(&dr));
                }
            }
        }
        total
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.particles
            .iter()
            .map(|p| p.kinetic_energy(&self.species[p.species]))
            .sum()
    }

    /// `2 KE / (DIM N)` over the movable particles, zero when there are none.
    pub fn kinetic_temperature(&self) -> f64 {
        let movable = self
            .particles
            .iter()
            .filter(|p| self.species[p.species].is_movable())
            .count();
        if movable == 0 {
            return 0.0;
        }
        2.0 * self.kinetic_energy() / (DIM * movable) as f64
    }

    /// Total momentum of the movable particles.
    pub fn momentum(&self) -> Vector {
        let mut total = vector::ZERO;
        for p in &self.particles {
            let m = p.momentum(&self.species[p.species]);
            vector::add_scaled(&mut total, 1.0, &m);
        }
        total
    }

    /// Particle kinetic and pair potential energy plus the piston's kinetic
    /// and field energy. Conserved by every event.
    pub fn total_energy(&self) -> f64 {
        let piston = self.piston.as_ref().map_or(0.0, |p| {
            p.kinetic_energy() + p.potential_energy(&self.boundary)
        });
        self.kinetic_energy() + self.potential_energy_of_system() + piston
    }

    /// Cross-section of the piston in the current box.
    pub fn piston_area(&self) -> Option<f64> {
        self.piston.as_ref().map(|p| p.area(&self.boundary))
    }

    // ============ Time integration ============

    /// Advance by the configured `time_step`, then run the thermostat when
    /// `isothermal` is on and its interval has elapsed.
    pub fn step(&mut self) -> Result<()> {
        self.advance_to(self.t_base + self.config.time_step)?;
        if self.config.isothermal {
            self.steps_to_thermostat = self.steps_to_thermostat.saturating_sub(1);
            if self.steps_to_thermostat == 0 {
                self.steps_to_thermostat = self.config.thermostat_interval;
                self.apply_thermostat()?;
            }
        }
        Ok(())
    }

    /// Process every event up to `target_time`, then drift the store to it.
    pub fn advance_to(&mut self, target_time: f64) -> Result<()> {
        if !target_time.is_finite() {
            return Err(Error::InvalidParam("target_time must be finite".into()));
        }
        if target_time < self.t_base {
            return Err(Error::InvalidParam(format!(
                "target_time {target_time} is earlier than current time {}",
                self.t_base
            )));
        }
        while !matches!(self.process_next(target_time)?, Outcome::Idle) {}
        self.drift(target_time - self.t_base);
        self.refresh_potential_energy();
        Ok(())
    }

    /// Process up to `n_events` collisions and drift the store to the last
    /// event.
    ///
    /// Rechecks are not counted. Returns the number of collisions processed,
    /// smaller than `n_events` when nothing is left to collide or when the
    /// queue only produced rechecks for a long stretch.
    pub fn advance_events(&mut self, n_events: usize) -> Result<usize> {
        let idle_limit = IDLE_RECHECKS_PER_PARTICLE * self.particles.len().max(1);
        let mut done = 0;
        let mut idle = 0;
        while done < n_events && idle < idle_limit {
            match self.process_next(f64::INFINITY)? {
                Outcome::Idle => break,
                Outcome::Recheck => idle += 1,
                Outcome::Collision => {
                    done += 1;
                    idle = 0;
                }
            }
        }
        if self.last_event_time > self.t_base {
            self.drift(self.last_event_time - self.t_base);
        }
        self.refresh_potential_energy();
        Ok(done)
    }

    /// Discard every prediction and recompute from the current state.
    ///
    /// Idempotent; must follow any external change to positions, velocities,
    /// potentials, the box or the piston.
    pub fn reset(&mut self) -> Result<()> {
        let range = self.potentials.range();
        let size = self.boundary.box_size();
        for k in (0..DIM).filter(|&k| self.boundary.is_periodic(k)) {
            if size[k] <= 2.0 * range {
                return Err(Error::InvalidParam(format!(
                    "periodic edge {k} ({}) must exceed twice the interaction range {range}",
                    size[k]
                )));
            }
        }
        self.recheck_distance = match self.boundary.min_periodic_edge() {
            Some(edge) if range > 0.0 => RECHECK_FRACTION * (0.5 * edge - range),
            _ => f64::INFINITY,
        };
        let n = self.particles.len();
        self.queue.reset(n);
        self.last_event_time = self.t_base;
        self.recheck_at = (0..n).map(|i| self.recheck_deadline(i, self.t_base)).collect();
        for i in 0..n {
            self.collision_time_up(i, 0.0)?;
        }
        self.potential_energy = self.potential_energy_of_system();
        debug!(
            particles = n,
            events = self.queue.len(),
            time = self.t_base,
            "schedule rebuilt"
        );
        Ok(())
    }

    /// Recompute every prediction from scratch and compare with the queue.
    pub fn verify_schedule(&self) -> Result<()> {
        let false_time = (self.last_event_time - self.t_base).max(0.0);
        for i in 0..self.particles.len() {
            let fresh = self
                .predict_up(i, false_time)?
                .map_or(f64::INFINITY, |(t, _)| self.t_base + false_time + t);
            let live = self.queue.time_of(i);
            let agree = if live.is_finite() && fresh.is_finite() {
                (live - fresh).abs() <= SCHEDULE_RTOL * live.abs().max(1.0)
            } else {
                live == fresh
            };
            if !agree {
                return Err(Error::StaleSchedule {
                    particle: i,
                    live,
                    fresh,
                });
            }
        }
        Ok(())
    }

    // ============ External perturbations ============

    /// Replace positions (indexed by particle) and re-predict.
    pub fn set_positions(&mut self, positions: &[Vector]) -> Result<()> {
        self.check_len(positions.len())?;
        for (p, r) in self.particles.iter_mut().zip(positions) {
            p.set_position(*r)?;
        }
        self.reset()
    }

    /// Replace velocities (indexed by particle) and re-predict.
    pub fn set_velocities(&mut self, velocities: &[Vector]) -> Result<()> {
        self.check_len(velocities.len())?;
        for (p, v) in self.particles.iter_mut().zip(velocities) {
            p.set_velocity(*v)?;
        }
        self.reset()
    }

    /// Multiply every velocity by `factor` and re-predict.
    pub fn scale_velocities(&mut self, factor: f64) -> Result<()> {
        if !factor.is_finite() {
            return Err(Error::InvalidParam("velocity scale must be finite".into()));
        }
        for p in &mut self.particles {
            p.v = vector::scaled(factor, &p.v);
        }
        self.reset()
    }

    /// Draw fresh thermal velocities at `temperature` and re-predict.
    pub fn randomize_velocities(&mut self, temperature: f64) -> Result<()> {
        let types: Vec<usize> = self.particles.iter().map(|p| p.species).collect();
        let velocities =
            init::thermal_velocities(&mut self.rng, &self.species, &types, temperature)?;
        for (p, v) in self.particles.iter_mut().zip(velocities) {
            p.v = v;
        }
        self.reset()
    }

    /// Change the `(a, b)` pair potential in place (diameter, well width,
    /// depth...) and re-predict.
    pub fn modify_pair_potential<F>(&mut self, a: usize, b: usize, f: F) -> Result<()>
    where
        F: FnOnce(&mut PairPotential) -> Result<()>,
    {
        self.potentials.modify(a, b, f)?;
        self.reset()
    }

    pub fn set_box_size(&mut self, size: Vector) -> Result<()> {
        self.boundary.set_box_size(size)?;
        debug!(?size, "box resized");
        self.reset()
    }

    pub fn set_piston_pressure(&mut self, pressure: f64) -> Result<()> {
        let piston = self.piston_mut()?;
        piston.set_pressure(pressure)?;
        debug!(pressure, "piston pressure changed");
        self.reset()
    }

    /// Make the piston immovable, or free with `mass`.
    pub fn set_piston_stationary(&mut self, stationary: bool, mass: f64) -> Result<()> {
        let piston = self.piston_mut()?;
        piston.set_stationary(stationary, mass)?;
        debug!(stationary, mass, "piston mass changed");
        self.reset()
    }

    // ============ Thermostat ============

    /// Switch the heat bath on or off. Switching on thermalizes at once and
    /// restarts the step counter.
    pub fn set_isothermal(&mut self, isothermal: bool) -> Result<()> {
        self.config.isothermal = isothermal;
        if !isothermal {
            return Ok(());
        }
        self.steps_to_thermostat = self.config.thermostat_interval;
        self.apply_thermostat()
    }

    pub fn set_temperature(&mut self, temperature: f64) -> Result<()> {
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(Error::InvalidParam("temperature must be finite and >= 0".into()));
        }
        self.config.temperature = temperature;
        Ok(())
    }

    pub fn set_thermostat(&mut self, thermostat: Thermostat, interval: u32) -> Result<()> {
        if interval == 0 {
            return Err(Error::InvalidParam("thermostat_interval must be at least 1".into()));
        }
        self.config.thermostat = thermostat;
        self.config.thermostat_interval = interval;
        self.steps_to_thermostat = interval;
        Ok(())
    }

    /// Run the configured thermostat once at the current time.
    pub fn apply_thermostat(&mut self) -> Result<()> {
        let temperature = self.config.temperature;
        match self.config.thermostat {
            Thermostat::VelocityScaling => self.rescale_to_temperature(temperature),
            Thermostat::Andersen => {
                for p in &mut self.particles {
                    p.v = init::thermal_velocity(&mut self.rng, &self.species[p.species], temperature)?;
                }
                debug!(temperature, "velocities redrawn");
                self.reset()
            }
            Thermostat::AndersenSingle => {
                if self.particles.is_empty() {
                    return Ok(());
                }
                let i = self.rng.random_range(0..self.particles.len());
                let sp = &self.species[self.particles[i].species];
                if !sp.is_movable() {
                    return Ok(());
                }
                self.particles[i].v = init::thermal_velocity(&mut self.rng, sp, temperature)?;
                trace!(particle = i, temperature, "velocity redrawn");
                self.repredict(&[i], 0.0)
            }
        }
    }

    /// Remove the drift, then scale each axis so that `<m v_k^2>` over the
    /// movable particles equals `temperature`.
    fn rescale_to_temperature(&mut self, temperature: f64) -> Result<()> {
        let types: Vec<usize> = self.particles.iter().map(|p| p.species).collect();
        let movable = types.iter().filter(|&&t| self.species[t].is_movable()).count();
        if movable == 0 {
            return Ok(());
        }
        let mut velocities: Vec<Vector> = self.particles.iter().map(|p| p.v).collect();
        if velocities.len() > 1 {
            init::remove_drift(&self.species, &types, &mut velocities);
        }
        let mut sums = self.axis_sums(&types, &velocities);
        if temperature > 0.0 && sums.contains(&0.0) {
            velocities = init::thermal_velocities(&mut self.rng, &self.species, &types, temperature)?;
            sums = self.axis_sums(&types, &velocities);
        }
        for k in 0..DIM {
            let current = sums[k] / movable as f64;
            let factor = if current > 0.0 { (temperature / current).sqrt() } else { 0.0 };
            velocities.iter_mut().for_each(|v| v[k] *= factor);
        }
        for (p, v) in self.particles.iter_mut().zip(velocities) {
            p.v = v;
        }
        debug!(temperature, "velocities rescaled");
        self.reset()
    }

    /// `sum m v_k^2` per axis over the movable particles.
    fn axis_sums(&self, types: &[usize], velocities: &[Vector]) -> Vector {
        let mut sums = vector::ZERO;
        for (v, &t) in velocities.iter().zip(types) {
            let sp = &self.species[t];
            if sp.is_movable() {
                for k in 0..DIM {
                    sums[k] += sp.mass * v[k] * v[k];
                }
            }
        }
        sums
    }

    // ============ Event loop ============

    /// Resolve the earliest event if it is not later than `limit`.
    fn process_next(&mut self, limit: f64) -> Result<Outcome> {
        let Some(event) = self.queue.peek().copied() else {
            return Ok(Outcome::Idle);
        };
        let time = event.time_f64();
        if time > limit {
            return Ok(Outcome::Idle);
        }
        if time < self.last_event_time - self.config.time_tolerance {
            return Err(Error::TimeMachine {
                time,
                previous: self.last_event_time,
            });
        }
        let false_time = time - self.t_base;
        let resolved = self.resolve(event.kind, false_time)?;
        self.last_event_time = self.last_event_time.max(time);
        let Some(bump) = resolved else {
            trace!(time, kind = %event.kind, "predictions refreshed");
            self.invalidate(event.kind, false_time)?;
            self.check_schedule()?;
            return Ok(Outcome::Recheck);
        };
        self.potential_energy += bump.energy_change;
        self.event_count += 1;

        let record = Collision {
            time,
            false_time,
            kind: event.kind,
            bump,
            potential: self.event_potential(event.kind),
        };
        trace!(
            time,
            kind = %event.kind,
            transition = ?bump.transition,
            du = bump.energy_change,
            "event resolved"
        );
        for (_, listener) in &mut self.listeners {
            listener.collision_action(&record);
        }

        self.invalidate(event.kind, false_time)?;
        self.check_schedule()?;
        Ok(Outcome::Collision)
    }

    fn check_schedule(&self) -> Result<()> {
        if self.config.check_schedule {
            self.verify_schedule()?;
        }
        Ok(())
    }

    /// Apply the event's bump; `None` for a recheck, which moves nothing.
    fn resolve(&mut self, kind: EventKind, false_time: f64) -> Result<Option<Bump>> {
        let bump = match kind {
            EventKind::Pair { i, j } => {
                let (ti, tj) = (self.particles[i].species, self.particles[j].species);
                let (inv_i, inv_j) = (self.species[ti].inv_mass, self.species[tj].inv_mass);
                let potential = self.potentials.potential_for(ti, tj).ok_or_else(|| {
                    Error::MathError(format!("no potential for scheduled {kind}"))
                })?;
                let (pi, pj) = pair_mut(&mut self.particles, i, j)?;
                let bump = collision::bump_pair(
                    potential.ladder(),
                    pi,
                    pj,
                    inv_i,
                    inv_j,
                    &self.boundary,
                    false_time,
                )?;
                pi.bump_collision_count();
                pj.bump_collision_count();
                bump
            }
            EventKind::Wall { i, wall_id } => {
                let p = &mut self.particles[i];
                let bump = collision::bump_wall(p, &self.species[p.species], wall_id, false_time)?;
                p.bump_collision_count();
                bump
            }
            EventKind::Piston { i } => {
                let piston = self.piston.as_mut().ok_or_else(|| {
                    Error::MathError(format!("{kind} scheduled without a piston"))
                })?;
                let p = &mut self.particles[i];
                let inv_mass = self.species[p.species].inv_mass;
                let bump = piston.bump(p, inv_mass, &self.boundary, false_time)?;
                p.bump_collision_count();
                bump
            }
            EventKind::Recheck { .. } => return Ok(None),
        };
        Ok(Some(bump))
    }

    fn event_potential(&self, kind: EventKind) -> Option<Rc<PairPotential>> {
        let j = kind.partner()?;
        let (ti, tj) = (self.particles[kind.primary()].species, self.particles[j].species);
        self.potentials.shared(ti, tj).cloned()
    }

    /// Re-predict everything the resolved event may have made stale.
    ///
    /// Local: the participants, and every particle whose live event names a
    /// participant as partner. Global after a piston event: every particle's
    /// piston contact, since the wall trajectory changed.
    fn invalidate(&mut self, kind: EventKind, false_time: f64) -> Result<()> {
        let movers: Vec<usize> = match kind.partner() {
            Some(j) => vec![kind.primary(), j],
            None => vec![kind.primary()],
        };
        self.repredict(&movers, false_time)?;
        if kind.is_piston() {
            self.resync_piston(&movers, false_time)?;
        }
        Ok(())
    }

    /// Full re-prediction for `movers`, whose velocities just changed (or
    /// whose pair horizon ran out), and for every particle whose live event
    /// names one of them.
    fn repredict(&mut self, movers: &[usize], false_time: f64) -> Result<()> {
        let mut colliders: Vec<usize> = Vec::new();
        for &m in movers {
            for &k in self.neighbors.down_neighbors(m) {
                let names_mover = self
                    .queue
                    .get(k)
                    .is_some_and(|e| e.kind.partner() == Some(m));
                if names_mover && !movers.contains(&k) && !colliders.contains(&k) {
                    colliders.push(k);
                }
            }
        }
        let now = self.t_base + false_time;
        for &m in movers {
            self.recheck_at[m] = self.recheck_deadline(m, now);
        }
        for &k in colliders.iter().chain(movers) {
            self.collision_time_up(k, false_time)?;
        }
        for &m in movers {
            self.collision_time_down(m, false_time)?;
        }
        Ok(())
    }

    /// Absolute time at which particle `i`, moving from `now` at its current
    /// speed, has covered the recheck distance.
    fn recheck_deadline(&self, i: usize, now: f64) -> f64 {
        let speed = vector::squared(&self.particles[i].v).sqrt();
        if speed == 0.0 || !self.recheck_distance.is_finite() {
            return f64::INFINITY;
        }
        now + self.recheck_distance / speed
    }

    fn resync_piston(&mut self, skip: &[usize], false_time: f64) -> Result<()> {
        for k in 0..self.particles.len() {
            if skip.contains(&k) {
                continue;
            }
            let was_piston = self.queue.get(k).is_some_and(|e| e.kind.is_piston());
            if was_piston {
                self.collision_time_up(k, false_time)?;
                continue;
            }
            let t = self.piston_time(k, false_time)?;
            if !t.is_finite() {
                continue;
            }
            let time = self.t_base + false_time + t;
            if time < self.queue.time_of(k) {
                self.queue.schedule(time, EventKind::Piston { i: k })?;
            }
        }
        Ok(())
    }

    /// Schedule particle `i`'s earliest event over its up-neighbors and fields.
    fn collision_time_up(&mut self, i: usize, false_time: f64) -> Result<()> {
        match self.predict_up(i, false_time)? {
            Some((t, kind)) => self.queue.schedule(self.t_base + false_time + t, kind),
            None => {
                self.queue.cancel(i);
                Ok(())
            }
        }
    }

    /// Offer `(j, i)` to every down-neighbor `j` that would collide with `i`
    /// earlier than its current event.
    fn collision_time_down(&mut self, i: usize, false_time: f64) -> Result<()> {
        let down = self.neighbors.down_neighbors(i).to_vec();
        for j in down {
            let t = self.pair_time(j, i, false_time)?;
            if !t.is_finite() {
                continue;
            }
            let time = self.t_base + false_time + t;
            if time < self.queue.time_of(j) {
                self.queue.schedule(time, EventKind::Pair { i: j, j: i })?;
            }
        }
        Ok(())
    }

    /// Earliest `(time after false_time, event)` over up-neighbors, walls and piston.
    fn predict_up(&self, i: usize, false_time: f64) -> Result<Option<(f64, EventKind)>> {
        let mut best: Option<(f64, EventKind)> = None;
        let mut offer = |t: f64, kind: EventKind| {
            if t.is_finite() && best.is_none_or(|(bt, _)| t < bt) {
                best = Some((t, kind));
            }
        };
        for &j in self.neighbors.up_neighbors(i) {
            offer(self.pair_time(i, j, false_time)?, EventKind::Pair { i, j });
        }
        let p = &self.particles[i];
        if let Some((t, wall_id)) = collision::wall_collision_time(
            p,
            &self.species[p.species],
            &self.boundary,
            false_time,
            self.config.ignore_overlap,
        )? {
            offer(t, EventKind::Wall { i, wall_id });
        }
        offer(self.piston_time(i, false_time)?, EventKind::Piston { i });
        let now = self.t_base + false_time;
        offer((self.recheck_at[i] - now).max(0.0), EventKind::Recheck { i });
        Ok(best)
    }

    fn pair_time(&self, i: usize, j: usize, false_time: f64) -> Result<f64> {
        let (pi, pj) = (&self.particles[i], &self.particles[j]);
        let Some(potential) = self.potentials.potential_for(pi.species, pj.species) else {
            return Ok(f64::INFINITY);
        };
        let inv_sum = self.species[pi.species].inv_mass + self.species[pj.species].inv_mass;
        if inv_sum == 0.0 {
            return Ok(f64::INFINITY);
        }
        let geometry = PairGeometry::new(pi, pj, &self.boundary, false_time);
        let t = collision::pair_collision_time(
            potential.ladder(),
            &geometry,
            EventKind::Pair { i, j },
            self.config.ignore_overlap,
        )?;
        // beyond either partner's recheck the nearest image may be the wrong one
        let horizon = self.recheck_at[i].min(self.recheck_at[j]) - (self.t_base + false_time);
        Ok(if t > horizon { f64::INFINITY } else { t })
    }

    fn piston_time(&self, i: usize, false_time: f64) -> Result<f64> {
        let Some(piston) = &self.piston else {
            return Ok(f64::INFINITY);
        };
        let p = &self.particles[i];
        piston.collision_time(
            p,
            self.species[p.species].inv_mass,
            &self.boundary,
            false_time,
            self.config.ignore_overlap,
        )
    }

    /// An overlapped start leaves an infinite energy until the pair separates.
    fn refresh_potential_energy(&mut self) {
        if !self.potential_energy.is_finite() {
            self.potential_energy = self.potential_energy_of_system();
        }
    }

    /// Free flight of the whole store (and the piston) for `dt`.
    fn drift(&mut self, dt: f64) {
        for p in &mut self.particles {
            let v = p.v;
            vector::add_scaled(&mut p.r, dt, &v);
            self.boundary.wrap(&mut p.r);
        }
        if let Some(piston) = &mut self.piston {
            piston.advance(dt, &self.boundary);
        }
        self.t_base += dt;
    }

    fn piston_mut(&mut self) -> Result<&mut MovingBoundary> {
        self.piston
            .as_mut()
            .ok_or_else(|| Error::InvalidParam("no piston installed".into()))
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.particles.len() {
            return Err(Error::InvalidParam(format!(
                "expected {} vectors, got {len}",
                self.particles.len()
            )));
        }
        Ok(())
    }
}
