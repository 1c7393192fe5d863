//! Callbacks fired once per resolved event.

use crate::core::collision::Bump;
use crate::core::event::EventKind;
use crate::core::potential::PairPotential;
use std::cell::RefCell;
use std::rc::Rc;

/// Everything a measurement needs to know about one resolved event.
#[derive(Debug, Clone, PartialEq)]
pub struct Collision {
    /// Absolute event time.
    pub time: f64,
    /// Offset from the time at which stored positions are valid.
    pub false_time: f64,
    pub kind: EventKind,
    pub bump: Bump,
    /// Pair potential in force at the event; `None` for walls and the piston.
    pub potential: Option<Rc<PairPotential>>,
}

/// Handle returned on registration, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Receives every resolved event, in order.
///
/// Listeners observe; they cannot touch the particle store.
pub trait CollisionListener {
    fn collision_action(&mut self, collision: &Collision);
}

impl<F> CollisionListener for F
where
    F: FnMut(&Collision),
{
    fn collision_action(&mut self, collision: &Collision) {
        self(collision)
    }
}

/// Wrap a shared meter so the caller keeps a handle on it after registering.
pub fn shared<L: CollisionListener>(meter: &Rc<RefCell<L>>) -> impl CollisionListener {
    let meter = Rc::clone(meter);
    move |collision: &Collision| meter.borrow_mut().collision_action(collision)
}
