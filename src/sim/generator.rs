use std::marker::PhantomData;

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::{
    entity::{Entity, Process},
    error::SimResult,
    random::Sampler,
    sim::{ScriptCtx, Time},
};

/// Limits for [`crate::sim::Simulation::generate`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeneratorOptions {
    max: Option<u64>,
    start_time: Option<Time>,
    end_time: Option<Time>,
}

impl GeneratorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop after this many entities.
    pub fn with_max(self, max: u64) -> Self {
        Self {
            max: Some(max),
            ..self
        }
    }

    /// Virtual time of the first arrival. Without it, a positive
    /// inter-arrival gets a half-interval warm-up delay instead.
    pub fn with_start_time(self, start_time: Time) -> Self {
        Self {
            start_time: Some(start_time),
            ..self
        }
    }

    /// Stop producing once the clock has passed this time.
    pub fn with_end_time(self, end_time: Time) -> Self {
        Self {
            end_time: Some(end_time),
            ..self
        }
    }
}

/// Internal arrival process driving [`crate::sim::Simulation::generate`]:
/// constructs-and-activates one factory entity per sampled inter-arrival.
pub(crate) struct Generator<P, F> {
    entity: Entity,
    factory: F,
    inter_arrival: Option<Box<dyn Sampler>>,
    options: GeneratorOptions,
    _produces: PhantomData<fn() -> P>,
}

impl<P, F> Generator<P, F> {
    pub(crate) fn new(
        factory: F,
        inter_arrival: Option<Box<dyn Sampler>>,
        options: GeneratorOptions,
    ) -> Self {
        Self {
            entity: Entity::new(),
            factory,
            inter_arrival,
            options,
            _produces: PhantomData,
        }
    }
}

impl<P, F> Process for Generator<P, F>
where
    P: Process,
    F: FnMut() -> P + 'static,
{
    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn script(self: Box<Self>, ctx: ScriptCtx) -> LocalBoxFuture<'static, SimResult<()>> {
        Box::pin(async move {
            let mut this = *self;

            match (this.options.start_time, this.inter_arrival.as_mut()) {
                (Some(start), _) => {
                    let lead = start - ctx.now();
                    if lead > 0.0 {
                        ctx.delay(lead).await?;
                    }
                }
                (None, Some(sampler)) => {
                    // Warm-up: shift the first arrival by half an interval so
                    // a cold-started source does not fire at t = 0.
                    let first = sampler.sample();
                    if first > 0.0 {
                        ctx.delay(first / 2.0).await?;
                    }
                }
                (None, None) => {}
            }

            let mut produced = 0u64;
            loop {
                if this.options.max.is_some_and(|max| produced >= max) {
                    break;
                }
                if this.options.end_time.is_some_and(|end| ctx.now() > end) {
                    break;
                }

                ctx.activate((this.factory)())?;
                produced += 1;

                // No inter-arrival: a single entity was requested.
                let Some(sampler) = this.inter_arrival.as_mut() else {
                    break;
                };
                ctx.delay(sampler.sample().max(0.0)).await?;
            }

            tracing::debug!(produced, now = ctx.now(), "entity generator done");
            Ok(())
        })
    }
}
