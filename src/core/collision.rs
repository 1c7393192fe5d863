//! Collision prediction and resolution for pair ladders and fixed box walls.
//!
//! Every function takes a `false_time`: the time elapsed since the stored
//! positions were last made current. Trajectories are evaluated at that
//! offset without touching the store, and the resolvers back-correct
//! positions so that `r + false_time * v_new` lands on the contact surface.

use crate::core::boundary::{wall_axis_side, Boundary};
use crate::core::event::EventKind;
use crate::core::particle::{Particle, Species};
use crate::core::potential::Ladder;
use crate::core::vector::{self, Vector, ZERO};
use crate::error::{Error, Result};
use tracing::warn;

/// Relative displacement applied after crossing a well boundary so the same
/// transition is not reported again at `t = 0`.
pub const NUDGE: f64 = 1e-10;

/// Scale of the short time handed out for tolerated overlaps.
pub const OVERLAP_TIME_FACTOR: f64 = 1e-3;

/// What a bump did to the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Elastic reflection off the hard core.
    Core,
    /// Bounce off a step the pair lacked the energy to cross.
    Reflect,
    /// Inward crossing of a step.
    Capture,
    /// Outward crossing of a step.
    Escape,
    /// Elastic reflection off a wall or the piston.
    Wall,
}

/// Outcome of resolving one event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bump {
    pub transition: Transition,
    /// Momentum delivered to the primary particle.
    pub impulse: Vector,
    /// `r . dp` for pair events, zero for field events.
    pub virial: f64,
    /// Change in potential energy (kinetic energy changes by the opposite amount).
    pub energy_change: f64,
}

/// Relative kinematics of particle `j` seen from particle `i` at a false time.
#[derive(Debug, Clone, Copy)]
pub struct PairGeometry {
    pub dr: Vector,
    pub dv: Vector,
    pub r2: f64,
    pub bij: f64,
    pub v2: f64,
}

impl PairGeometry {
    pub fn new(pi: &Particle, pj: &Particle, boundary: &Boundary, false_time: f64) -> Self {
        let dv = vector::sub(&pj.v, &pi.v);
        let mut dr = vector::sub(&pj.r, &pi.r);
        vector::add_scaled(&mut dr, false_time, &dv);
        let dr = boundary.nearest_image(dr);
        Self {
            dr,
            dv,
            r2: vector::squared(&dr),
            bij: vector::dot(&dr, &dv),
            v2: vector::squared(&dv),
        }
    }
}

/// Time until the pair next crosses a ladder radius, or `+inf`.
pub fn pair_collision_time(
    ladder: &Ladder,
    g: &PairGeometry,
    kind: EventKind,
    ignore_overlap: bool,
) -> Result<f64> {
    let (r2, b, v2) = (g.r2, g.bij, g.v2);
    if v2 == 0.0 {
        return Ok(f64::INFINITY);
    }
    let k = ladder.len();
    let state = ladder.state(r2);

    let time = if state == 0 {
        if b < 0.0 {
            if !ignore_overlap {
                return Err(Error::Overlap {
                    kind,
                    separation: r2.sqrt(),
                    approach: b,
                });
            }
            let t = OVERLAP_TIME_FACTOR * (r2 / v2).sqrt();
            warn!(%kind, separation = r2.sqrt(), nudge_time = t, "overlapped pair approaching; nudging apart");
            return Ok(t);
        }
        // leaving an overlap: the core is no barrier on the way out
        if k == 1 {
            return Ok(f64::INFINITY);
        }
        exit_time(b, v2, r2, ladder.radius_sq(1))
    } else if state == k {
        if b >= 0.0 {
            return Ok(f64::INFINITY);
        }
        let disc = b * b - v2 * (r2 - ladder.radius_sq(k - 1));
        if disc < 0.0 {
            return Ok(f64::INFINITY);
        }
        (-b - disc.sqrt()) / v2
    } else {
        let mut inner = f64::INFINITY;
        if b < 0.0 {
            let disc = b * b - v2 * (r2 - ladder.radius_sq(state - 1));
            if disc > 0.0 {
                inner = (-b - disc.sqrt()) / v2;
            }
        }
        if inner.is_finite() {
            inner
        } else {
            exit_time(b, v2, r2, ladder.radius_sq(state))
        }
    };

    if time < 0.0 {
        if ignore_overlap {
            return Ok(0.0);
        }
        return Err(Error::NegativeTime {
            kind,
            time,
            discriminant: b * b - v2 * r2,
        });
    }
    Ok(time)
}

/// Departure through the outer radius of the current rung (`+` root).
#[inline]
fn exit_time(b: f64, v2: f64, r2: f64, outer_sq: f64) -> f64 {
    let disc = b * b - v2 * (r2 - outer_sq);
    (-b + disc.max(0.0).sqrt()) / v2
}

/// Apply the impulse for the ladder transition the pair sits on at `false_time`.
///
/// `inv_i`/`inv_j` are inverse masses; one of them may be zero.
pub fn bump_pair(
    ladder: &Ladder,
    pi: &mut Particle,
    pj: &mut Particle,
    inv_i: f64,
    inv_j: f64,
    boundary: &Boundary,
    false_time: f64,
) -> Result<Bump> {
    let inv_sum = inv_i + inv_j;
    if inv_sum == 0.0 {
        return Err(Error::MathError(format!(
            "pair ({}, {}) has two infinite masses",
            pi.id, pj.id
        )));
    }
    let reduced_mass = 1.0 / inv_sum;
    let g = PairGeometry::new(pi, pj, boundary, false_time);
    let (r2, b) = (g.r2, g.bij);

    let step = ladder.nearest_boundary(r2);
    let (transition, virial, energy_change, nudge) = if step == 0 {
        (Transition::Core, 2.0 * reduced_mass * b, 0.0, 0.0)
    } else {
        let u_in = ladder.energy(step);
        let u_out = ladder.energy(step + 1);
        if b > 0.0 {
            let du = u_out - u_in;
            let disc = b * b - 2.0 * r2 * du / reduced_mass;
            if disc < 0.0 {
                (Transition::Reflect, 2.0 * reduced_mass * b, 0.0, -NUDGE)
            } else {
                (Transition::Escape, reduced_mass * (b - disc.sqrt()), du, NUDGE)
            }
        } else {
            let du = u_in - u_out;
            let disc = b * b - 2.0 * r2 * du / reduced_mass;
            if disc < 0.0 {
                (Transition::Reflect, 2.0 * reduced_mass * b, 0.0, NUDGE)
            } else {
                (Transition::Capture, reduced_mass * (b + disc.sqrt()), du, -NUDGE)
            }
        }
    };

    let impulse = vector::scaled(virial / r2, &g.dr);
    vector::add_scaled(&mut pi.v, inv_i, &impulse);
    vector::add_scaled(&mut pj.v, -inv_j, &impulse);
    vector::add_scaled(&mut pi.r, -false_time * inv_i, &impulse);
    vector::add_scaled(&mut pj.r, false_time * inv_j, &impulse);
    if nudge != 0.0 {
        if inv_i > 0.0 {
            vector::add_scaled(&mut pi.r, -nudge, &g.dr);
        }
        if inv_j > 0.0 {
            vector::add_scaled(&mut pj.r, nudge, &g.dr);
        }
    }

    Ok(Bump {
        transition,
        impulse,
        virial,
        energy_change,
    })
}

/// Earliest fixed-wall contact of a particle as `(time, wall_id)`.
pub fn wall_collision_time(
    p: &Particle,
    species: &Species,
    boundary: &Boundary,
    false_time: f64,
    ignore_overlap: bool,
) -> Result<Option<(f64, u32)>> {
    if !species.is_movable() {
        return Ok(None);
    }
    let r = p.position_at(false_time);
    let size = boundary.box_size();
    let mut best: Option<(f64, u32)> = None;
    for wall_id in boundary.wall_ids() {
        let (axis, is_max) = wall_axis_side(wall_id);
        let v = p.v[axis];
        let (gap, closing) = if is_max {
            (size[axis] - species.wall_radius - r[axis], v)
        } else {
            (r[axis] - species.wall_radius, -v)
        };
        if closing <= 0.0 {
            continue;
        }
        let t = if gap < 0.0 {
            let kind = EventKind::Wall { i: p.id, wall_id };
            if !ignore_overlap {
                return Err(Error::Overlap {
                    kind,
                    separation: gap,
                    approach: -closing,
                });
            }
            let t = OVERLAP_TIME_FACTOR * (-gap) / closing;
            warn!(%kind, gap, nudge_time = t, "particle behind wall; nudging back");
            t
        } else {
            gap / closing
        };
        if best.is_none_or(|(bt, _)| t < bt) {
            best = Some((t, wall_id));
        }
    }
    Ok(best)
}

/// Specular reflection off a fixed wall.
pub fn bump_wall(
    p: &mut Particle,
    species: &Species,
    wall_id: u32,
    false_time: f64,
) -> Result<Bump> {
    if !species.is_movable() {
        return Err(Error::MathError(format!(
            "immovable particle {} cannot bounce off wall {wall_id}",
            p.id
        )));
    }
    let (axis, _) = wall_axis_side(wall_id);
    let dv = -2.0 * p.v[axis];
    p.v[axis] += dv;
    p.r[axis] -= false_time * dv;
    let mut impulse = ZERO;
    impulse[axis] = species.mass * dv;
    Ok(Bump {
        transition: Transition::Wall,
        impulse,
        virial: 0.0,
        energy_change: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::potential::PairPotential;
    use approx::assert_relative_eq;

    const KIND: EventKind = EventKind::Pair { i: 0, j: 1 };

    fn open_box() -> Boundary {
        Boundary::periodic([100.0, 100.0, 100.0]).unwrap()
    }

    fn pair(r1: Vector, v1: Vector, r2: Vector, v2: Vector) -> (Particle, Particle) {
        (
            Particle::new(0, r1, v1, 0).unwrap(),
            Particle::new(1, r2, v2, 0).unwrap(),
        )
    }

    #[test]
    fn head_on_hard_spheres() -> Result<()> {
        let hs = PairPotential::hard_sphere(1.0)?;
        let (a, b) = pair([10.0, 10.0, 10.0], ZERO, [12.0, 10.0, 10.0], [-1.0, 0.0, 0.0]);
        let g = PairGeometry::new(&a, &b, &open_box(), 0.0);
        let t = pair_collision_time(hs.ladder(), &g, KIND, false)?;
        assert_relative_eq!(t, 1.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn false_time_shifts_prediction() -> Result<()> {
        let hs = PairPotential::hard_sphere(1.0)?;
        let (a, b) = pair([10.0, 10.0, 10.0], ZERO, [12.0, 10.0, 10.0], [-1.0, 0.0, 0.0]);
        let g = PairGeometry::new(&a, &b, &open_box(), 0.25);
        let t = pair_collision_time(hs.ladder(), &g, KIND, false)?;
        assert_relative_eq!(t, 0.75, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn receding_or_missing_pairs_never_collide() -> Result<()> {
        let hs = PairPotential::hard_sphere(1.0)?;
        let (a, b) = pair([10.0, 10.0, 10.0], ZERO, [12.0, 10.0, 10.0], [1.0, 0.0, 0.0]);
        let g = PairGeometry::new(&a, &b, &open_box(), 0.0);
        assert_eq!(pair_collision_time(hs.ladder(), &g, KIND, false)?, f64::INFINITY);
        // passes at impact parameter 2 > diameter
        let (a, b) = pair([10.0, 10.0, 10.0], ZERO, [15.0, 12.0, 10.0], [-1.0, 0.0, 0.0]);
        let g = PairGeometry::new(&a, &b, &open_box(), 0.0);
        assert_eq!(pair_collision_time(hs.ladder(), &g, KIND, false)?, f64::INFINITY);
        Ok(())
    }

    #[test]
    fn square_well_inside_prefers_core() -> Result<()> {
        let sw = PairPotential::square_well(1.0, 1.5, 1.0)?;
        // inside the well at 1.2, closing at 1 => core at t = 0.2
        let (a, b) = pair([10.0, 10.0, 10.0], ZERO, [11.2, 10.0, 10.0], [-1.0, 0.0, 0.0]);
        let g = PairGeometry::new(&a, &b, &open_box(), 0.0);
        assert_relative_eq!(pair_collision_time(sw.ladder(), &g, KIND, false)?, 0.2, epsilon = 1e-12);
        // same place, separating => leaves the well at t = 0.3
        let (a, b) = pair([10.0, 10.0, 10.0], ZERO, [11.2, 10.0, 10.0], [1.0, 0.0, 0.0]);
        let g = PairGeometry::new(&a, &b, &open_box(), 0.0);
        assert_relative_eq!(pair_collision_time(sw.ladder(), &g, KIND, false)?, 0.3, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn square_well_glancing_approach_exits_well() -> Result<()> {
        let sw = PairPotential::square_well(1.0, 1.5, 1.0)?;
        // inside the well, moving sideways with a slight approach; misses the core
        let (a, b) = pair([10.0, 10.0, 10.0], ZERO, [11.0, 11.2, 10.0], [-0.1, 1.0, 0.0]);
        let g = PairGeometry::new(&a, &b, &open_box(), 0.0);
        let t = pair_collision_time(sw.ladder(), &g, KIND, false)?;
        assert!(t.is_finite() && t > 0.0);
        let mut dr = g.dr;
        vector::add_scaled(&mut dr, t, &g.dv);
        assert_relative_eq!(vector::squared(&dr).sqrt(), 1.5, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn false_time_is_applied_before_imaging() -> Result<()> {
        let boundary = Boundary::periodic([10.0, 10.0, 10.0])?;
        let (a, b) = pair([1.0, 5.0, 5.0], ZERO, [5.0, 5.0, 5.0], [1.0, 0.0, 0.0]);
        // after 2 time units the partner sits at 7, i.e. 4 behind through the face
        let g = PairGeometry::new(&a, &b, &boundary, 2.0);
        assert_relative_eq!(g.dr[0], -4.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn overlap_is_fatal_unless_ignored() -> Result<()> {
        let hs = PairPotential::hard_sphere(1.0)?;
        let (a, b) = pair([10.0, 10.0, 10.0], ZERO, [10.5, 10.0, 10.0], [-1.0, 0.0, 0.0]);
        let g = PairGeometry::new(&a, &b, &open_box(), 0.0);
        let err = pair_collision_time(hs.ladder(), &g, KIND, false).unwrap_err();
        assert!(matches!(err, Error::Overlap { .. }));
        let t = pair_collision_time(hs.ladder(), &g, KIND, true)?;
        assert!(t > 0.0 && t < 1e-3);
        Ok(())
    }

    #[test]
    fn equal_mass_head_on_exchanges_velocities() -> Result<()> {
        let hs = PairPotential::hard_sphere(1.0)?;
        let (mut a, mut b) = pair([10.0, 10.0, 10.0], ZERO, [11.0, 10.0, 10.0], [-1.0, 0.0, 0.0]);
        let bump = bump_pair(hs.ladder(), &mut a, &mut b, 1.0, 1.0, &open_box(), 0.0)?;
        assert_eq!(bump.transition, Transition::Core);
        assert_relative_eq!(a.v[0], -1.0, epsilon = 1e-12);
        assert_relative_eq!(b.v[0], 0.0, epsilon = 1e-12);
        assert_eq!(bump.energy_change, 0.0);
        Ok(())
    }

    #[test]
    fn bump_back_corrects_positions() -> Result<()> {
        let hs = PairPotential::hard_sphere(1.0)?;
        // contact reached at false_time = 1.0
        let (mut a, mut b) = pair([10.0, 10.0, 10.0], ZERO, [12.0, 10.0, 10.0], [-1.0, 0.0, 0.0]);
        bump_pair(hs.ladder(), &mut a, &mut b, 1.0, 1.0, &open_box(), 1.0)?;
        // at the event time both sit where they were at contact
        assert_relative_eq!(a.position_at(1.0)[0], 10.0, epsilon = 1e-12);
        assert_relative_eq!(b.position_at(1.0)[0], 11.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn well_escape_and_reflection() -> Result<()> {
        let sw = PairPotential::square_well(1.0, 1.5, 1.0)?;
        // relative speed 2 along the line: KE_line = 0.5 * 0.5 * 4 = 1.0 + margin needed
        let (mut a, mut b) = pair([10.0, 10.0, 10.0], [-1.5, 0.0, 0.0], [11.5, 10.0, 10.0], [1.5, 0.0, 0.0]);
        let bump = bump_pair(sw.ladder(), &mut a, &mut b, 1.0, 1.0, &open_box(), 0.0)?;
        assert_eq!(bump.transition, Transition::Escape);
        assert_relative_eq!(bump.energy_change, 1.0, epsilon = 1e-12);
        // KE before 2.25, after 1.25
        let ke = 0.5 * (a.v[0] * a.v[0] + b.v[0] * b.v[0]);
        assert_relative_eq!(ke, 1.25, epsilon = 1e-12);

        let (mut a, mut b) = pair([10.0, 10.0, 10.0], [-0.5, 0.0, 0.0], [11.5, 10.0, 10.0], [0.5, 0.0, 0.0]);
        let bump = bump_pair(sw.ladder(), &mut a, &mut b, 1.0, 1.0, &open_box(), 0.0)?;
        assert_eq!(bump.transition, Transition::Reflect);
        assert_relative_eq!(a.v[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(b.v[0], -0.5, epsilon = 1e-12);
        // nudged inward
        assert!(b.r[0] - a.r[0] < 1.5);
        Ok(())
    }

    #[test]
    fn infinite_mass_partner_reflects_mover_only() -> Result<()> {
        let hs = PairPotential::hard_sphere(1.0)?;
        let (mut a, mut b) = pair([10.0, 10.0, 10.0], ZERO, [11.0, 10.0, 10.0], [-2.0, 0.0, 0.0]);
        bump_pair(hs.ladder(), &mut a, &mut b, 0.0, 1.0, &open_box(), 0.0)?;
        assert_eq!(a.v, ZERO);
        assert_relative_eq!(b.v[0], 2.0, epsilon = 1e-12);
        assert!(bump_pair(hs.ladder(), &mut a, &mut b, 0.0, 0.0, &open_box(), 0.0).is_err());
        Ok(())
    }

    #[test]
    fn wall_prediction_and_bump() -> Result<()> {
        let boundary = Boundary::walled([5.0, 5.0, 5.0])?;
        let species = Species::new(1.0, 0.5)?;
        let mut p = Particle::new(0, [1.0, 2.5, 2.5], [-1.0, 0.0, 0.0], 0)?;
        let (t, wall) = wall_collision_time(&p, &species, &boundary, 0.0, false)?
            .ok_or_else(|| Error::MathError("expected a wall hit".into()))?;
        assert_eq!(wall, 0);
        assert_relative_eq!(t, 0.5, epsilon = 1e-12);
        let bump = bump_wall(&mut p, &species, wall, t)?;
        assert_eq!(p.v[0], 1.0);
        assert_relative_eq!(p.position_at(t)[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(bump.impulse[0], 2.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn periodic_axes_have_no_walls() -> Result<()> {
        let boundary = Boundary::periodic([5.0, 5.0, 5.0])?;
        let species = Species::new(1.0, 0.5)?;
        let p = Particle::new(0, [1.0, 2.5, 2.5], [-1.0, 0.0, 0.0], 0)?;
        assert!(wall_collision_time(&p, &species, &boundary, 0.0, false)?.is_none());
        Ok(())
    }
}
