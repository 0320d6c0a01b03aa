//! The per-timestep driver.
//!
//! One call to [`TransportKernel::step`] runs, in order:
//!
//! 1. partitioning of every chemical in every occupied layer
//! 2. dissolution of pure-phase solids classes
//! 3. per chemical: kinetics, then the physical transport stages
//! 4. yields into product chemicals
//! 5. explicit-Euler integration to end-of-step concentrations
//! 6. cumulative and outlet bookkeeping
//!
//! Stages 1–4 only read start-of-step concentrations, so the order of
//! compartments within a stage never matters.
use crate::error::{ensure_len, KernelError, Result};
use crate::forcing::StepInputs;
use crate::integrator::{integrate_mass, InstabilityEvent, Stability};
use crate::kinetics;
use crate::limiter::LimiterTally;
use crate::params::ModelConfig;
use crate::partition::partition_all;
use crate::report::{total_mass, OutletTracker, StepReport};
use crate::state::ChemState;
use crate::topology::{Layer, Topology};
use crate::transport::{self, StepContext};

pub struct TransportKernel {
    model: ModelConfig,
    topology: Topology,
    time: f64,
    outlets: OutletTracker,
}

impl TransportKernel {
    pub fn new(model: ModelConfig, topology: Topology) -> Result<Self> {
        model.validate()?;
        let outlets = OutletTracker::new(&topology, model.n_chemicals());
        Ok(Self { model, topology, time: 0.0, outlets })
    }

    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Simulation time (s) at the end of the last step.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn outlets(&self) -> &OutletTracker {
        &self.outlets
    }

    /// Zeroed state sized for this kernel with room for `max_stack` layers.
    pub fn new_state(&self, max_stack: usize) -> ChemState {
        ChemState::new(
            self.model.n_chemicals(),
            self.topology.len(),
            max_stack,
            self.model.n_classes(),
        )
    }

    /// Advance `state` by `dt` seconds under `inputs`.
    ///
    /// Dimension mismatches are fatal.  Negative masses are clamped and
    /// returned as instability events.
    pub fn step(&mut self, state: &mut ChemState, inputs: &StepInputs<'_>, dt: f64) -> Result<StepReport> {
        self.check(state, inputs, dt)?;

        state.clear_fluxes();
        partition_all(&self.model, state, inputs);

        let ctx = StepContext { model: &self.model, topology: &self.topology, inputs, dt };
        let mut tally = LimiterTally::default();
        kinetics::dissolution(&ctx, state, &mut tally);
        for chem in 0..self.model.n_chemicals() {
            kinetics::kinetics(&ctx, state, chem, &mut tally);
            transport::transport_chemical(&ctx, state, chem, &mut tally);
        }
        kinetics::apply_yields(&ctx, state);

        let instabilities = integrate(&ctx, state);

        for (total, fluxes) in state.cumulative.iter_mut().zip(&state.fluxes) {
            total.accumulate(fluxes, dt);
        }
        self.time += dt;
        self.outlets.update(state, self.time, dt);

        if log::log_enabled!(log::Level::Trace) {
            for chem in 0..self.model.n_chemicals() {
                log::trace!(
                    "t = {:.3} s: {} holds {:.6e} g",
                    self.time,
                    self.model.chemicals[chem].name,
                    total_mass(state, &self.topology, inputs, chem)
                );
            }
        }

        Ok(StepReport { time: self.time, instabilities, limiter_activations: tally.0 })
    }

    fn check(&self, state: &ChemState, inputs: &StepInputs<'_>, dt: f64) -> Result<()> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(KernelError::InvalidConfig(format!("timestep must be positive, got {dt}")));
        }
        inputs.validate(&self.topology, self.model.n_classes())?;
        ensure_len("state chemicals", self.model.n_chemicals(), state.n_chemicals())?;
        ensure_len("state compartments", self.topology.len(), state.n_compartments())?;
        ensure_len("state solids classes", self.model.n_classes(), state.n_classes())?;
        if let Some(deepest) = inputs.stacks.iter().map(|s| s.nstack()).max() {
            if deepest > state.max_stack() {
                return Err(KernelError::TopologyMismatch {
                    what: "stack layers held by state",
                    expected: state.max_stack(),
                    found: deepest,
                });
            }
        }
        Ok(())
    }
}

/// Apply every layer's net flux and divide by its end-of-step volume.
fn integrate(ctx: &StepContext<'_>, state: &mut ChemState) -> Vec<InstabilityEvent> {
    let tolerance = ctx.model.kernel.instability_tolerance;
    let mut events = Vec::new();
    for chem in 0..state.n_chemicals() {
        for comp in 0..state.n_compartments() {
            let nstack = ctx.inputs.stacks[comp].nstack();
            for l in 0..=nstack {
                let layer = Layer::from_index(l);
                let i = state.idx(chem, comp, l);
                let f = &state.fluxes[i];
                let next_volume = ctx.next_volume(comp, layer);
                let r = integrate_mass(
                    ctx.mass(state, chem, comp, layer),
                    f.total_in(),
                    f.total_out(),
                    ctx.dt,
                    next_volume,
                    tolerance,
                );
                state.concentration[i] = r.concentration;

                if next_volume <= 0.0 && r.mass > 0.0 {
                    log::debug!(
                        "{:?} {:?} is dry; dropping {:.6e} g of {}",
                        ctx.topology.id(comp),
                        layer,
                        r.mass,
                        ctx.model.chemicals[chem].name
                    );
                }
                if let Stability::Unstable(magnitude) = r.stability {
                    let event = InstabilityEvent {
                        compartment: ctx.topology.id(comp),
                        layer,
                        chemical: chem,
                        magnitude,
                    };
                    log::warn!(
                        "negative mass {:.6e} g of {} in {:?} {:?} clamped to zero",
                        magnitude,
                        ctx.model.chemicals[chem].name,
                        event.compartment,
                        layer
                    );
                    events.push(event);
                }
            }
        }
    }
    events
}
