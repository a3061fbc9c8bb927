use std::{
    cell::Cell,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use crate::{
    entity::{Entity, Process, QueuePath, Signal},
    error::{EngineError, QueueError, SimResult},
    fec::{FecItem, WaitMode},
    queue::Queue,
    sim::{Simulation, Time},
};

/// Options for [`ScriptCtx::delay_with`].
#[derive(Clone, Default)]
pub struct DelayOptions {
    /// Animation path the entity travels during the delay. Opaque to the
    /// scheduler.
    pub path: Option<QueuePath>,
    /// Signal that force-releases the delay before its due time.
    pub interrupt: Option<Signal>,
}

/// The capability handle passed into every entity script.
///
/// The three async methods (`delay`, `enter_queue`, `wait_signal`) are the
/// only suspension points of a script; each inserts exactly one item into the
/// FEC and parks the script until the scheduler dispatches it. Everything
/// else here is synchronous and runs to completion without yielding.
///
/// A primitive's future must be awaited immediately — a script waits on one
/// primitive at a time.
#[derive(Clone)]
pub struct ScriptCtx {
    sim: Simulation,
    entity: Entity,
}

impl ScriptCtx {
    pub(crate) fn new(sim: Simulation, entity: Entity) -> Self {
        Self { sim, entity }
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Current virtual time.
    pub fn now(&self) -> Time {
        self.sim.now()
    }

    /// Suspends for `duration` units of virtual time. Returns the elapsed
    /// virtual time, which equals `duration` for an uninterrupted delay.
    pub async fn delay(&self, duration: Time) -> SimResult<Time> {
        self.delay_with(duration, DelayOptions::default()).await
    }

    /// [`ScriptCtx::delay`] with an interrupt signal and/or animation path.
    ///
    /// An interrupted delay resumes early; the returned elapsed time is
    /// `now - creation`, letting the caller compute the remaining delay.
    pub async fn delay_with(&self, duration: Time, options: DelayOptions) -> SimResult<Time> {
        if !(duration >= 0.0) {
            return Err(EngineError::InvalidArgument(format!(
                "delay must be non-negative, got {duration}"
            ))
            .into());
        }
        let due = self.now() + duration;
        let wait = self.suspend(
            WaitMode::Delay {
                interrupt: options.interrupt,
                path: options.path,
            },
            Some(due),
        );
        Ok(wait.await)
    }

    /// Suspends until one unit of `queue` is seized. Returns the time spent
    /// waiting for admission.
    pub async fn enter_queue(&self, queue: &Queue) -> SimResult<Time> {
        self.enter_queue_units(queue, 1).await
    }

    /// Suspends until `units` of `queue` are seized.
    pub async fn enter_queue_units(&self, queue: &Queue, units: usize) -> SimResult<Time> {
        if queue.occupies(&self.entity) {
            return Err(QueueError::DuplicateMembership {
                queue: queue.name().to_string(),
                serial: self.entity.serial().0,
            }
            .into());
        }
        let wait = self.suspend(
            WaitMode::Enter {
                queue: queue.clone(),
                units,
            },
            None,
        );
        Ok(wait.await)
    }

    /// Suspends until a matching signal is sent. Returns the time waited.
    pub async fn wait_signal(&self, signal: impl Into<Signal>) -> SimResult<Time> {
        let wait = self.suspend(
            WaitMode::Wait {
                signal: signal.into(),
            },
            None,
        );
        Ok(wait.await)
    }

    /// Seizes `units` of `queue` without suspending. The caller guarantees
    /// capacity; fails with `CapacityExceeded` otherwise.
    pub fn enter_queue_immediately(&self, queue: &Queue, units: usize) -> SimResult<()> {
        queue.admit(&self.entity, units, self.now())
    }

    /// Releases this entity's units of `queue`.
    pub fn leave_queue(&self, queue: &Queue) -> SimResult<()> {
        queue.release(&self.entity, self.now())
    }

    /// Force-releases up to `max` waits on `signal` (all of them when `max`
    /// is `None`). Released scripts resume on the scheduler's next scan pass,
    /// not mid-script. Returns the number released.
    pub fn send_signal(&self, signal: impl Into<Signal>, max: Option<usize>) -> usize {
        self.sim.send_signal(signal, max)
    }

    /// Activates another process in the same simulation, running its script
    /// up to the first suspension before returning.
    pub fn activate<P: Process>(&self, process: P) -> SimResult<()> {
        self.sim.activate(process)
    }

    fn suspend(&self, mode: WaitMode, due: Option<Time>) -> WaitFuture {
        let slot = Rc::new(Cell::new(None));
        let item = FecItem::new(self.entity.clone(), mode, due, self.now(), slot.clone());
        self.sim.insert_item(item);
        WaitFuture { slot }
    }
}

/// Resolves once the scheduler dispatches the corresponding FEC item,
/// yielding the elapsed virtual time. Polled only by the scheduler's own
/// drive loop, so no waker bookkeeping is needed.
struct WaitFuture {
    slot: Rc<Cell<Option<Time>>>,
}

impl Future for WaitFuture {
    type Output = Time;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.slot.get() {
            Some(elapsed) => Poll::Ready(elapsed),
            None => Poll::Pending,
        }
    }
}
