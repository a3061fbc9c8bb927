#![allow(dead_code)]

use std::{cell::RefCell, future::Future, rc::Rc};

use futures::future::LocalBoxFuture;
use takt::{Entity, Process, ScriptCtx, SimResult};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A process whose script is a closure, for concise test scenarios.
pub struct Scripted<F> {
    entity: Entity,
    body: F,
}

impl<F, Fut> Process for Scripted<F>
where
    F: FnOnce(ScriptCtx) -> Fut + 'static,
    Fut: Future<Output = SimResult<()>> + 'static,
{
    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn script(self: Box<Self>, ctx: ScriptCtx) -> LocalBoxFuture<'static, SimResult<()>> {
        let this = *self;
        Box::pin((this.body)(ctx))
    }
}

pub fn scripted<F, Fut>(body: F) -> Scripted<F>
where
    F: FnOnce(ScriptCtx) -> Fut + 'static,
    Fut: Future<Output = SimResult<()>> + 'static,
{
    scripted_with(Entity::new(), body)
}

pub fn prioritized<F, Fut>(priority: i32, body: F) -> Scripted<F>
where
    F: FnOnce(ScriptCtx) -> Fut + 'static,
    Fut: Future<Output = SimResult<()>> + 'static,
{
    scripted_with(Entity::with_priority(priority), body)
}

pub fn scripted_with<F, Fut>(entity: Entity, body: F) -> Scripted<F>
where
    F: FnOnce(ScriptCtx) -> Fut + 'static,
    Fut: Future<Output = SimResult<()>> + 'static,
{
    Scripted { entity, body }
}

/// Shared log of `(label, virtual time)` pairs recorded by scripts.
#[derive(Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<(String, f64)>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, label: impl Into<String>, at: f64) {
        self.0.borrow_mut().push((label.into(), at));
    }

    pub fn entries(&self) -> Vec<(String, f64)> {
        self.0.borrow().clone()
    }

    pub fn times_of(&self, label: &str) -> Vec<f64> {
        self.0
            .borrow()
            .iter()
            .filter(|(l, _)| l == label)
            .map(|(_, t)| *t)
            .collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.0.borrow().iter().map(|(l, _)| l.clone()).collect()
    }
}
