use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use crate::{
    entity::{Entity, EntityId},
    error::{EngineError, QueueError, SimResult},
    sim::{Simulation, Time, WeakSim},
    tally::Tally,
};

/// Occupancy record for one entity inside a queue.
#[derive(Debug, Clone, Copy)]
pub struct Occupancy {
    pub units: usize,
    pub entered: Time,
}

#[derive(Default)]
struct QueueState {
    in_use: usize,
    records: HashMap<EntityId, Occupancy>,
    last_change: Time,
    total_in: u64,
    sim: Option<WeakSim>,
    gross_pop: Tally,
    net_pop: Tally,
    gross_dwell: Tally,
    net_dwell: Tally,
}

struct QueueInner {
    name: String,
    capacity: Option<usize>,
    state: RefCell<QueueState>,
}

/// A named, optionally bounded resource.
///
/// Entities seize units of capacity by entering the queue and give them back
/// by leaving. Admission is gated by [`Queue::can_admit`], which the scheduler
/// re-evaluates on every FEC scan; a queue never keeps explicit wake lists.
///
/// # Statistics
///
/// Four tallies accumulate at every state transition, weighted by the virtual
/// time since the previous transition:
///
/// - *gross population* / *gross dwell* — weighted across the entire run.
/// - *net population* / *net dwell* — only while the queue was non-empty
///   (population), or for strictly positive dwell times (dwell).
///
/// A queue binds to the simulation of the first entity admitted; admitting
/// from a different simulation fails.
#[derive(Clone)]
pub struct Queue {
    inner: Rc<QueueInner>,
}

impl Queue {
    /// An unbounded queue.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    /// A queue with finite capacity in units.
    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self::build(name.into(), Some(capacity))
    }

    fn build(name: String, capacity: Option<usize>) -> Self {
        Self {
            inner: Rc::new(QueueInner {
                name,
                capacity,
                state: RefCell::new(QueueState::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn capacity(&self) -> Option<usize> {
        self.inner.capacity
    }

    /// Whether `units` more units fit right now.
    pub fn can_admit(&self, units: usize) -> bool {
        let state = self.inner.state.borrow();
        match self.inner.capacity {
            None => true,
            Some(cap) => state.in_use + units <= cap,
        }
    }

    pub fn units_in_use(&self) -> usize {
        self.inner.state.borrow().in_use
    }

    /// Number of entities currently inside.
    pub fn len(&self) -> usize {
        self.inner.state.borrow().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().records.is_empty()
    }

    /// Total number of admissions since construction or the last reset.
    pub fn total_in(&self) -> u64 {
        self.inner.state.borrow().total_in
    }

    pub fn last_change(&self) -> Time {
        self.inner.state.borrow().last_change
    }

    pub fn occupies(&self, entity: &Entity) -> bool {
        self.inner
            .state
            .borrow()
            .records
            .contains_key(&entity.serial())
    }

    pub fn occupancy(&self, entity: &Entity) -> Option<Occupancy> {
        self.inner
            .state
            .borrow()
            .records
            .get(&entity.serial())
            .copied()
    }

    pub fn gross_pop(&self) -> Tally {
        self.inner.state.borrow().gross_pop.clone()
    }

    pub fn net_pop(&self) -> Tally {
        self.inner.state.borrow().net_pop.clone()
    }

    pub fn gross_dwell(&self) -> Tally {
        self.inner.state.borrow().gross_dwell.clone()
    }

    pub fn net_dwell(&self) -> Tally {
        self.inner.state.borrow().net_dwell.clone()
    }

    /// Identity comparison: two handles to the same queue.
    pub fn same(&self, other: &Queue) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Admits `entity` with `units`, binding the queue to the entity's
    /// simulation on first touch and updating the population tallies.
    pub(crate) fn admit(&self, entity: &Entity, units: usize, now: Time) -> SimResult<()> {
        let sim = entity.simulation().ok_or_else(|| {
            EngineError::InvariantViolation(format!(
                "admit into '{}' for detached entity {}",
                self.inner.name,
                entity.serial()
            ))
        })?;

        {
            let mut state = self.inner.state.borrow_mut();

            let bound = state.sim.as_ref().and_then(WeakSim::upgrade);
            match bound {
                Some(bound) if !bound.same(&sim) => {
                    return Err(QueueError::CrossSimulation {
                        queue: self.inner.name.clone(),
                    }
                    .into());
                }
                Some(_) => {}
                // Unbound, or the previous simulation is gone: (re)bind.
                None => state.sim = Some(sim.downgrade()),
            }

            if state.records.contains_key(&entity.serial()) {
                return Err(QueueError::DuplicateMembership {
                    queue: self.inner.name.clone(),
                    serial: entity.serial().0,
                }
                .into());
            }
            if let Some(cap) = self.inner.capacity {
                if state.in_use + units > cap {
                    return Err(QueueError::CapacityExceeded {
                        queue: self.inner.name.clone(),
                        units,
                        in_use: state.in_use,
                        capacity: cap,
                    }
                    .into());
                }
            }

            state.roll_population(&self.inner.name, now)?;
            state.records.insert(
                entity.serial(),
                Occupancy {
                    units,
                    entered: now,
                },
            );
            state.in_use += units;
            state.total_in += 1;
            state.last_change = now;
        }

        sim.register_queue(self);
        entity.note_entered(self);
        tracing::trace!(queue = %self.inner.name, entity = %entity.serial(), units, now, "admit");
        Ok(())
    }

    /// Releases `entity`, updating population and dwell tallies.
    pub(crate) fn release(&self, entity: &Entity, now: Time) -> SimResult<()> {
        {
            let mut state = self.inner.state.borrow_mut();

            let Some(record) = state.records.get(&entity.serial()).copied() else {
                return Err(QueueError::NotAMember {
                    queue: self.inner.name.clone(),
                    serial: entity.serial().0,
                }
                .into());
            };

            state.roll_population(&self.inner.name, now)?;

            let dwell = now - record.entered;
            if dwell < 0.0 {
                return Err(EngineError::InvariantViolation(format!(
                    "negative dwell {dwell} in queue '{}'",
                    self.inner.name
                ))
                .into());
            }
            state.gross_dwell.observe(dwell);
            if dwell > 0.0 {
                state.net_dwell.observe(dwell);
            }

            state.records.remove(&entity.serial());
            state.in_use -= record.units;
            state.last_change = now;
        }

        entity.note_left(self);
        tracing::trace!(queue = %self.inner.name, entity = %entity.serial(), now, "release");
        Ok(())
    }

    /// Wipes all records, tallies and the simulation binding.
    pub fn reset(&self) {
        *self.inner.state.borrow_mut() = QueueState::default();
    }

    /// The simulation this queue is bound to, if any.
    pub fn simulation(&self) -> Option<Simulation> {
        self.inner.state.borrow().sim.as_ref().and_then(WeakSim::upgrade)
    }
}

impl QueueState {
    /// Accumulates population tallies for the interval since the last state
    /// change. Called with the pre-transition `in_use`.
    fn roll_population(&mut self, name: &str, now: Time) -> SimResult<()> {
        let dt = now - self.last_change;
        if dt < 0.0 {
            return Err(EngineError::InvariantViolation(format!(
                "clock ran backwards in queue '{name}': last change {}, now {now}",
                self.last_change
            ))
            .into());
        }
        self.gross_pop.add(self.in_use as f64, dt)?;
        if self.in_use > 0 {
            self.net_pop.add(self.in_use as f64, dt)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Queue")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .field("in_use", &state.in_use)
            .field("total_in", &state.total_in)
            .finish()
    }
}
