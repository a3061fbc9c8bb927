use std::{cell::Cell, rc::Rc};

use crate::{
    entity::{Entity, QueuePath, Signal},
    queue::Queue,
    sim::Time,
};

/// What a suspended script is waiting for.
#[derive(Clone)]
pub(crate) enum WaitMode {
    /// A timed delay, optionally interruptible by a matching signal. The path
    /// is opaque payload for animation layers.
    Delay {
        interrupt: Option<Signal>,
        path: Option<QueuePath>,
    },
    /// Admission of `units` into `queue`.
    Enter { queue: Queue, units: usize },
    /// An indefinite wait for a matching signal.
    Wait { signal: Signal },
}

/// One pending wait in the future-event collection.
///
/// Created by a suspension primitive, dispatched (removed, side effects
/// applied, script resumed) by the scheduler, then discarded. The completion
/// slot carries the elapsed virtual time back into the suspended script.
pub(crate) struct FecItem {
    entity: Entity,
    priority: i32,
    mode: WaitMode,
    due: Option<Time>,
    created: Time,
    ready: Cell<bool>,
    slot: Rc<Cell<Option<Time>>>,
}

impl FecItem {
    pub(crate) fn new(
        entity: Entity,
        mode: WaitMode,
        due: Option<Time>,
        created: Time,
        slot: Rc<Cell<Option<Time>>>,
    ) -> Self {
        let priority = entity.priority();
        Self {
            entity,
            priority,
            mode,
            due,
            created,
            ready: Cell::new(false),
            slot,
        }
    }

    pub(crate) fn entity(&self) -> &Entity {
        &self.entity
    }

    pub(crate) fn mode(&self) -> &WaitMode {
        &self.mode
    }

    pub(crate) fn due(&self) -> Option<Time> {
        self.due
    }

    /// Whether this wait is satisfiable at `clock`.
    ///
    /// Checked in order: forced ready flag, queue admission, due time. An
    /// un-forced signal wait is never ready.
    pub(crate) fn is_ready(&self, clock: Time) -> bool {
        if self.ready.get() {
            return true;
        }
        match &self.mode {
            WaitMode::Enter { queue, units } => queue.can_admit(*units),
            WaitMode::Delay { .. } => self.due.is_some_and(|due| due <= clock),
            WaitMode::Wait { .. } => false,
        }
    }

    /// Forces the ready flag if this item waits on `signal`. Returns `false`
    /// for non-matching items and items that were already forced.
    pub(crate) fn force_if_matching(&self, signal: &Signal) -> bool {
        let matches = match &self.mode {
            WaitMode::Wait { signal: s } => s == signal,
            WaitMode::Delay {
                interrupt: Some(s), ..
            } => s == signal,
            _ => false,
        };
        if matches && !self.ready.replace(true) {
            return true;
        }
        false
    }

    /// The animation path attached to a pending delay, if any.
    pub(crate) fn animation_path(&self) -> Option<&QueuePath> {
        match &self.mode {
            WaitMode::Delay { path, .. } => path.as_ref(),
            _ => None,
        }
    }

    /// Completes the wait, handing `clock - created` to the suspended script.
    pub(crate) fn complete(&self, clock: Time) {
        self.slot.set(Some(clock - self.created));
    }
}

/// The future-event collection: every suspended entity contributes exactly
/// one item.
///
/// Kept as a priority-biased list scanned front to back. Insertion places a
/// new item ahead of the longest trailing run of strictly-lower-priority
/// items (stable otherwise), so higher-priority entities dispatch first among
/// simultaneously ready waits. Readiness is re-evaluated on every scan rather
/// than tracked through wake lists.
#[derive(Default)]
pub(crate) struct Fec {
    items: Vec<FecItem>,
}

impl Fec {
    pub(crate) fn insert(&mut self, item: FecItem) {
        let pos = self
            .items
            .iter()
            .rposition(|it| it.priority >= item.priority)
            .map_or(0, |i| i + 1);
        self.items.insert(pos, item);
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    /// Index of the first ready item, scanning from the front.
    pub(crate) fn first_ready(&self, clock: Time) -> Option<usize> {
        self.items.iter().position(|it| it.is_ready(clock))
    }

    pub(crate) fn remove(&mut self, index: usize) -> FecItem {
        self.items.remove(index)
    }

    /// Earliest finite due time across all timed delays.
    pub(crate) fn next_due(&self) -> Option<Time> {
        self.items
            .iter()
            .filter_map(FecItem::due)
            .min_by(f64::total_cmp)
    }

    /// Forces the ready flag on up to `max` items waiting on `signal`, in FEC
    /// order. Returns how many were newly released.
    pub(crate) fn force_ready(&self, signal: &Signal, max: Option<usize>) -> usize {
        let mut released = 0;
        for item in &self.items {
            if max.is_some_and(|m| released >= m) {
                break;
            }
            if item.force_if_matching(signal) {
                released += 1;
            }
        }
        released
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &FecItem> {
        self.items.iter()
    }
}
