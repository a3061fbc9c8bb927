use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
    task::{Context, Poll},
    time::Instant,
};

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::{
    entity::{Entity, EntityId, Process, QueuePath, Signal},
    error::{EngineError, SimResult},
    fec::{Fec, FecItem, WaitMode},
    queue::Queue,
    random::Sampler,
};

pub mod config;
pub mod ctx;
pub mod generator;
pub mod hooks;

pub use config::SimConfig;
pub use ctx::{DelayOptions, ScriptCtx};
pub use generator::GeneratorOptions;
pub use hooks::Model;

use generator::Generator;

/// Virtual simulation time.
pub type Time = f64;

/// Lifecycle state of a [`Simulation`].
///
/// ```md
/// Current State        | Action              | Next State | Notes
/// ---------------------|---------------------|------------|---------------------------
/// `Paused`/`Finished`  | start()             | Running    | optional reset of all state
/// `Running`            | stop() observed     | Paused     | at the next pass boundary
/// `Running`            | end time / idle FEC | Finished   | run complete
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
pub enum SimStatus {
    /// Constructed, or stopped mid-run. `start()` resumes from the current
    /// clock.
    Paused,

    /// The run loop is stepping.
    Running,

    /// The run reached its end time or ran out of timed waits.
    Finished,
}

impl SimStatus {
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

/// What one FEC scan pass concluded.
enum ScanOutcome {
    /// At least one item was dispatched; scan again before advancing time.
    Again,
    /// Nothing ready; the earliest timed wait is due at this clock value.
    NextAt(Time),
    /// Nothing ready and no timed waits left: out of things to do.
    Idle,
}

/// A suspended entity script owned by the scheduler.
struct ScriptTask {
    entity: Entity,
    fut: LocalBoxFuture<'static, SimResult<()>>,
}

pub(crate) struct SimCore {
    clock: Cell<Time>,
    status: Cell<SimStatus>,
    stop_requested: Cell<bool>,
    config: RefCell<SimConfig>,
    fec: RefCell<Fec>,
    tasks: RefCell<HashMap<EntityId, ScriptTask>>,
    queues: RefCell<Vec<Queue>>,
    model: RefCell<Option<Box<dyn Model>>>,
}

/// Weak, clearable backreference to a simulation, held by entities and
/// queues. Upgrades fail once the simulation is dropped.
#[derive(Clone)]
pub(crate) struct WeakSim(Weak<SimCore>);

impl WeakSim {
    pub(crate) fn upgrade(&self) -> Option<Simulation> {
        self.0.upgrade().map(|core| Simulation { core })
    }
}

/// The discrete-event scheduler: owns the virtual clock, the future-event
/// collection and the queue registry, and drives every entity script.
///
/// `Simulation` is a cheap cloneable handle; all clones share one scheduler.
/// The run loop alternates two phases until the end time is reached, the FEC
/// runs out of timed waits, or a stop is requested:
///
/// 1. **Dispatch** — resume every script whose wait is satisfiable at the
///    current clock, rescanning from the front after each resume (a resumed
///    script may free queue capacity or insert new waits).
/// 2. **Advance** — jump the clock to the earliest due time.
///
/// Scripts are polled by the scheduler itself with a no-op waker; the tokio
/// runtime is only borrowed for pacing sleeps and cooperative yields, so
/// [`Simulation::start`] must run on a current-thread runtime (its future is
/// not `Send`).
#[derive(Clone)]
pub struct Simulation {
    core: Rc<SimCore>,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Self {
        Self {
            core: Rc::new(SimCore {
                clock: Cell::new(0.0),
                status: Cell::new(SimStatus::Paused),
                stop_requested: Cell::new(false),
                config: RefCell::new(config),
                fec: RefCell::new(Fec::default()),
                tasks: RefCell::new(HashMap::new()),
                queues: RefCell::new(Vec::new()),
                model: RefCell::new(None),
            }),
        }
    }

    /// Installs the host model whose hooks observe this simulation.
    pub fn set_model(&self, model: impl Model) {
        *self.core.model.borrow_mut() = Some(Box::new(model));
    }

    pub fn config(&self) -> SimConfig {
        *self.core.config.borrow()
    }

    /// Replaces the configuration. Takes effect at the next `start`.
    pub fn set_config(&self, config: SimConfig) {
        *self.core.config.borrow_mut() = config;
    }

    /// Current virtual time.
    pub fn now(&self) -> Time {
        self.core.clock.get()
    }

    pub fn status(&self) -> SimStatus {
        self.core.status.get()
    }

    /// Queues registered through admissions since the last reset.
    pub fn queues(&self) -> Vec<Queue> {
        self.core.queues.borrow().clone()
    }

    /// Number of pending waits in the FEC.
    pub fn pending(&self) -> usize {
        self.core.fec.borrow().len()
    }

    /// The animation path of `entity`'s pending delay, if it suspended with
    /// one. Animation layers poll this to move entities mid-travel.
    pub fn animation_path_of(&self, entity: &Entity) -> Option<QueuePath> {
        self.core
            .fec
            .borrow()
            .iter()
            .find(|item| item.entity() == entity)
            .and_then(|item| item.animation_path().cloned())
    }

    /// Identity comparison: two handles to the same scheduler.
    pub fn same(&self, other: &Simulation) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    pub(crate) fn downgrade(&self) -> WeakSim {
        WeakSim(Rc::downgrade(&self.core))
    }

    /// Runs the simulation until it finishes or pauses.
    ///
    /// With `reset` (or whenever the FEC is empty) all queue state, the FEC
    /// and the clock are wiped first and the `starting`/`started` hooks fire.
    /// Otherwise the run resumes from the current clock. Idempotent while
    /// already running.
    #[tracing::instrument(skip(self), fields(status = %self.status()))]
    pub async fn start(&self, reset: bool) -> SimResult<()> {
        if self.status().is_running() {
            return Ok(());
        }
        self.core.stop_requested.set(false);

        if reset || self.core.fec.borrow().is_empty() {
            self.reset_state();
            self.set_status(SimStatus::Running);
            self.hook_result(|model, sim| model.starting(sim))?;
            self.hook_result(|model, sim| model.started(sim))?;
        } else {
            self.set_status(SimStatus::Running);
        }

        self.step_loop().await
    }

    /// Requests a transition to `Paused` at the next pass boundary. Never
    /// interrupts a dispatch in progress.
    pub fn stop(&self) {
        self.core.stop_requested.set(true);
    }

    /// Attaches `process`'s entity to this simulation and runs its script up
    /// to the first suspension point.
    ///
    /// Fails with `AlreadyActive` if the entity is attached elsewhere. When
    /// the script eventually returns, the entity must have left every queue
    /// it entered (`DisposedWhileHoldingQueues` otherwise) and is detached.
    pub fn activate<P: Process>(&self, process: P) -> SimResult<()> {
        let entity = process.entity().clone();
        entity.attach(self)?;
        tracing::debug!(entity = %entity.serial(), priority = entity.priority(), "activate");

        let ctx = ScriptCtx::new(self.clone(), entity.clone());
        let fut = Box::new(process).script(ctx);
        self.drive(ScriptTask { entity, fut })
    }

    /// Activates an internal arrival process that constructs-and-activates
    /// one `factory` entity per sampled inter-arrival, within the limits of
    /// `options`. Without an inter-arrival sampler a single entity is
    /// produced.
    pub fn generate<P, F>(
        &self,
        factory: F,
        inter_arrival: Option<Box<dyn Sampler>>,
        options: GeneratorOptions,
    ) -> SimResult<()>
    where
        P: Process,
        F: FnMut() -> P + 'static,
    {
        self.activate(Generator::new(factory, inter_arrival, options))
    }

    /// Force-releases up to `max` waits on `signal` (all matching waits when
    /// `None`), in FEC order. Released scripts resume on the next scan pass.
    /// Returns how many waits were newly released.
    pub fn send_signal(&self, signal: impl Into<Signal>, max: Option<usize>) -> usize {
        let signal = signal.into();
        let released = self.core.fec.borrow().force_ready(&signal, max);
        tracing::debug!(%signal, released, "send signal");
        released
    }

    pub(crate) fn insert_item(&self, item: FecItem) {
        self.core.fec.borrow_mut().insert(item);
    }

    pub(crate) fn register_queue(&self, queue: &Queue) {
        let mut queues = self.core.queues.borrow_mut();
        if !queues.iter().any(|q| q.same(queue)) {
            queues.push(queue.clone());
        }
    }

    // ========================================================================
    // Run loop
    // ========================================================================

    async fn step_loop(&self) -> SimResult<()> {
        let config = self.config();
        let mut last_yield = Instant::now();

        loop {
            let scan = self.scan_fec()?;

            let end_reached = config.end_time().is_some_and(|end| self.now() >= end);
            if matches!(scan, ScanOutcome::Idle) || end_reached {
                return self.finish();
            }

            if let ScanOutcome::NextAt(next) = scan {
                let target = match config.max_time_step() {
                    Some(step) => next.min(self.now() + step),
                    None => next,
                };
                self.advance_clock(target)?;

                if !config.frame_delay().is_zero() {
                    tokio::time::sleep(config.frame_delay()).await;
                }
            }

            if self.core.stop_requested.replace(false) {
                self.set_status(SimStatus::Paused);
                return Ok(());
            }

            // Relinquish the thread periodically so cooperative hosts stay
            // responsive. Wall-clock only, never the virtual clock.
            if last_yield.elapsed() >= config.yield_every() {
                tokio::task::yield_now().await;
                last_yield = Instant::now();
            }
        }
    }

    /// One scan pass: dispatch ready items front-first until quiescent.
    ///
    /// The scan restarts from the front after every dispatch because a
    /// resumed script may have freed queue capacity or inserted new items
    /// that are ready right now.
    fn scan_fec(&self) -> SimResult<ScanOutcome> {
        let mut dispatched = 0usize;
        loop {
            let index = self.core.fec.borrow().first_ready(self.now());
            let Some(index) = index else { break };
            self.dispatch(index)?;
            dispatched += 1;
        }

        if dispatched > 0 {
            tracing::trace!(dispatched, clock = self.now(), "scan pass");
            return Ok(ScanOutcome::Again);
        }
        Ok(match self.core.fec.borrow().next_due() {
            Some(due) => ScanOutcome::NextAt(due),
            None => ScanOutcome::Idle,
        })
    }

    /// Removes one ready item, applies its side effects and resumes the
    /// suspended script.
    fn dispatch(&self, index: usize) -> SimResult<()> {
        let item = self.core.fec.borrow_mut().remove(index);
        let now = self.now();

        // Admission happens before the script resumes, so the script observes
        // itself inside the queue.
        if let WaitMode::Enter { queue, units } = item.mode() {
            queue.admit(item.entity(), *units, now)?;
        }
        item.complete(now);

        let task = self.core.tasks.borrow_mut().remove(&item.entity().serial());
        match task {
            Some(task) => self.drive(task),
            None => Err(EngineError::InvariantViolation(format!(
                "dispatch for entity {} without a suspended script",
                item.entity().serial()
            ))
            .into()),
        }
    }

    /// Polls a script until its next suspension point or completion.
    fn drive(&self, mut task: ScriptTask) -> SimResult<()> {
        let waker = futures::task::noop_waker();
        let mut poll_ctx = Context::from_waker(&waker);

        match task.fut.as_mut().poll(&mut poll_ctx) {
            Poll::Pending => {
                self.core
                    .tasks
                    .borrow_mut()
                    .insert(task.entity.serial(), task);
                Ok(())
            }
            Poll::Ready(result) => {
                let entity = task.entity;
                tracing::debug!(entity = %entity.serial(), ok = result.is_ok(), "script finished");
                let outcome = result.and_then(|()| entity.dispose_check());
                entity.detach();
                outcome
            }
        }
    }

    fn finish(&self) -> SimResult<()> {
        self.hook_result(|model, sim| model.finishing(sim))?;
        self.set_status(SimStatus::Finished);
        self.hook_result(|model, sim| model.finished(sim))
    }

    fn reset_state(&self) {
        for queue in self.core.queues.borrow().iter() {
            queue.reset();
        }
        self.core.queues.borrow_mut().clear();
        self.core.fec.borrow_mut().clear();
        self.core.tasks.borrow_mut().clear();
        self.core.clock.set(0.0);
        tracing::debug!("simulation state reset");
    }

    /// Change-notifying clock setter. The clock never runs backwards.
    fn advance_clock(&self, to: Time) -> SimResult<()> {
        let from = self.core.clock.get();
        if to < from {
            return Err(EngineError::InvariantViolation(format!(
                "clock would run backwards: {from} -> {to}"
            ))
            .into());
        }
        self.hook(|model, sim| model.time_changing(sim, from, to));
        self.core.clock.set(to);
        self.hook(|model, sim| model.time_changed(sim, from, to));
        Ok(())
    }

    fn set_status(&self, to: SimStatus) {
        let from = self.core.status.get();
        if from == to {
            return;
        }
        self.hook(|model, sim| model.state_changing(sim, from, to));
        self.core.status.set(to);
        self.hook(|model, sim| model.state_changed(sim, from, to));
        tracing::info!(%from, %to, clock = self.now(), "state change");
    }

    // The model is taken out for the duration of a hook so hooks can freely
    // call back into the simulation (activate entities, read state).
    fn hook(&self, f: impl FnOnce(&mut dyn Model, &Simulation)) {
        let taken = self.core.model.borrow_mut().take();
        if let Some(mut model) = taken {
            f(model.as_mut(), self);
            *self.core.model.borrow_mut() = Some(model);
        }
    }

    fn hook_result(
        &self,
        f: impl FnOnce(&mut dyn Model, &Simulation) -> SimResult<()>,
    ) -> SimResult<()> {
        let taken = self.core.model.borrow_mut().take();
        match taken {
            Some(mut model) => {
                let result = f(model.as_mut(), self);
                *self.core.model.borrow_mut() = Some(model);
                result
            }
            None => Ok(()),
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("status", &self.status())
            .field("clock", &self.now())
            .field("pending", &self.pending())
            .finish()
    }
}
