use std::{
    cell::RefCell,
    fmt,
    rc::Rc,
    sync::Arc,
    sync::atomic::{AtomicU64, Ordering},
};

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::{
    error::{EngineError, EntityError, SimResult},
    impl_from_primitive,
    queue::Queue,
    sim::{ScriptCtx, Simulation, WeakSim},
};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// The unique, monotonically increasing serial of an [`Entity`],
/// assigned at construction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EntityId(pub u64);
impl_from_primitive!(EntityId, u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) struct EntityCore {
    id: EntityId,
    priority: i32,
    sim: RefCell<Option<WeakSim>>,
    queues: RefCell<Vec<Queue>>,
}

/// A simulation participant.
///
/// `Entity` is a cheap cloneable handle; all clones refer to the same
/// participant. Behavior lives in the owning [`Process`] implementation,
/// whose `script` suspends on the scheduler primitives and resumes when the
/// scheduler dispatches the corresponding wait.
///
/// An entity is *detached* until [`Simulation::activate`] attaches it and
/// starts its script. When the script returns, the engine verifies the entity
/// left every queue it entered and detaches it again.
#[derive(Clone)]
pub struct Entity {
    core: Rc<EntityCore>,
}

impl Entity {
    /// A fresh entity with default priority 0.
    pub fn new() -> Self {
        Self::with_priority(0)
    }

    /// A fresh entity with the given dispatch priority. Higher priorities are
    /// favored when several waits become satisfiable at the same instant.
    pub fn with_priority(priority: i32) -> Self {
        Self {
            core: Rc::new(EntityCore {
                id: EntityId(NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)),
                priority,
                sim: RefCell::new(None),
                queues: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn serial(&self) -> EntityId {
        self.core.id
    }

    pub fn priority(&self) -> i32 {
        self.core.priority
    }

    /// The simulation this entity is currently active in, if any.
    pub fn simulation(&self) -> Option<Simulation> {
        self.core.sim.borrow().as_ref().and_then(WeakSim::upgrade)
    }

    /// The queues this entity currently occupies.
    pub fn queues(&self) -> Vec<Queue> {
        self.core.queues.borrow().clone()
    }

    pub(crate) fn attach(&self, sim: &Simulation) -> SimResult<()> {
        let mut slot = self.core.sim.borrow_mut();
        if slot.as_ref().is_some_and(|w| w.upgrade().is_some()) {
            return Err(EntityError::AlreadyActive {
                serial: self.core.id.0,
            }
            .into());
        }
        *slot = Some(sim.downgrade());
        Ok(())
    }

    pub(crate) fn detach(&self) {
        *self.core.sim.borrow_mut() = None;
    }

    pub(crate) fn note_entered(&self, queue: &Queue) {
        self.core.queues.borrow_mut().push(queue.clone());
    }

    pub(crate) fn note_left(&self, queue: &Queue) {
        self.core.queues.borrow_mut().retain(|q| !q.same(queue));
    }

    pub(crate) fn dispose_check(&self) -> SimResult<()> {
        let queues = self.core.queues.borrow();
        if queues.is_empty() {
            return Ok(());
        }
        let names: Vec<_> = queues.iter().map(|q| q.name().to_string()).collect();
        Err(EntityError::DisposedWhileHoldingQueues {
            serial: self.core.id.0,
            queues: names.join(", "),
        }
        .into())
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.core.id == other.core.id
    }
}

impl Eq for Entity {}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("serial", &self.core.id.0)
            .field("priority", &self.core.priority)
            .finish()
    }
}

/// The behavior contract of an entity subtype.
///
/// A `Process` bundles an [`Entity`] with its script. The script is an async
/// procedure that may suspend **only** on the [`ScriptCtx`] primitives
/// (`delay`, `enter_queue`, `wait_signal`); the scheduler polls it directly
/// and decides when each suspension resumes.
///
/// ```ignore
/// struct Customer {
///     entity: Entity,
///     desk: Queue,
/// }
///
/// impl Process for Customer {
///     fn entity(&self) -> &Entity {
///         &self.entity
///     }
///
///     fn script(self: Box<Self>, ctx: ScriptCtx) -> LocalBoxFuture<'static, SimResult<()>> {
///         Box::pin(async move {
///             ctx.enter_queue(&self.desk).await?;
///             ctx.delay(10.0).await?;
///             ctx.leave_queue(&self.desk)?;
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Process: 'static {
    fn entity(&self) -> &Entity;

    fn script(self: Box<Self>, ctx: ScriptCtx) -> LocalBoxFuture<'static, SimResult<()>>;

    /// Hook for animation layers: the position of this entity while waiting in
    /// `queue`, given the queue's start and end anchor. `None` requests the
    /// default queue layout.
    fn animation_position(
        &self,
        _queue: &Queue,
        _start: &Point,
        _end: &Point,
    ) -> Option<AnimationPosition> {
        None
    }
}

/// A signal value, compared structurally. Waits created by `wait_signal` and
/// interruptible delays are force-released when a matching signal is sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Signal {
    Int(i64),
    Named(Arc<str>),
    Entity(EntityId),
}

impl From<i64> for Signal {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Signal {
    fn from(value: &str) -> Self {
        Self::Named(Arc::from(value))
    }
}

impl From<EntityId> for Signal {
    fn from(value: EntityId) -> Self {
        Self::Entity(value)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Named(s) => write!(f, "{s}"),
            Self::Entity(id) => write!(f, "entity#{id}"),
        }
    }
}

/// A point in animation space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Position and heading reported by [`Process::animation_position`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnimationPosition {
    pub position: Point,
    pub angle: f64,
}

/// An animation path through two or more queues, attached to a delay so a
/// renderer can move the entity along it. Opaque to the scheduler.
#[derive(Clone)]
pub struct QueuePath {
    queues: Vec<Queue>,
}

impl QueuePath {
    pub fn new(queues: Vec<Queue>) -> SimResult<Self> {
        if queues.len() < 2 {
            return Err(EngineError::InvalidArgument(format!(
                "a queue path needs at least two queues, got {}",
                queues.len()
            ))
            .into());
        }
        Ok(Self { queues })
    }

    pub fn queues(&self) -> &[Queue] {
        &self.queues
    }
}

impl fmt::Debug for QueuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.queues.iter().map(Queue::name))
            .finish()
    }
}
