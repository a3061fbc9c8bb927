use crate::{
    error::SimResult,
    sim::{SimStatus, Simulation, Time},
};

/// Host-facing lifecycle hooks of a [`Simulation`].
///
/// A model is the "simulation subtype": it owns the scenario. The usual shape
/// overrides [`Model::starting`] to construct the initial queues and entities,
/// and reads statistics back in [`Model::finished`].
///
/// Hooks are notifications. They run synchronously on the scheduler's
/// execution context and must not call suspending primitives; creating and
/// activating entities is fine.
#[allow(unused_variables)]
pub trait Model: 'static {
    /// Fired when a (re)started run has been reset, before any script runs.
    fn starting(&mut self, sim: &Simulation) -> SimResult<()> {
        Ok(())
    }

    /// Fired right after `starting`, once the initial entities are in place.
    fn started(&mut self, sim: &Simulation) -> SimResult<()> {
        Ok(())
    }

    /// Fired when the run is about to finish, before the state transition.
    fn finishing(&mut self, sim: &Simulation) -> SimResult<()> {
        Ok(())
    }

    /// Fired after the transition to [`SimStatus::Finished`].
    fn finished(&mut self, sim: &Simulation) -> SimResult<()> {
        Ok(())
    }

    fn state_changing(&mut self, sim: &Simulation, from: SimStatus, to: SimStatus) {}

    fn state_changed(&mut self, sim: &Simulation, from: SimStatus, to: SimStatus) {}

    fn time_changing(&mut self, sim: &Simulation, from: Time, to: Time) {}

    fn time_changed(&mut self, sim: &Simulation, from: Time, to: Time) {}
}
