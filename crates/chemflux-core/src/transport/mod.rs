//! Physical flux stages.
//!
//! Every stage reads the start-of-step concentration field and writes rates
//! (g/s) into [`LayerFluxes`](crate::state::LayerFluxes).  Nothing here
//! touches concentrations; the integrator applies the fluxes once all
//! stages have run.
//!
//! Stage order matters because each limiter subtracts the outfluxes earlier
//! stages already committed:
//!
//! ```text
//!   kinetics → deposition → erosion → infiltration → porewater
//!            → floodplain → advection → dispersion
//! ```
pub mod advection;
pub mod dispersion;
pub mod exchange;
pub mod floodplain;
pub mod infiltration;

use crate::forcing::StepInputs;
use crate::limiter::LimiterTally;
use crate::params::ModelConfig;
use crate::state::ChemState;
use crate::topology::{Layer, Topology};

/// Read-only view shared by every stage of one step.
#[derive(Clone, Copy)]
pub(crate) struct StepContext<'a> {
    pub model: &'a ModelConfig,
    pub topology: &'a Topology,
    pub inputs: &'a StepInputs<'a>,
    pub dt: f64,
}

impl StepContext<'_> {
    /// Start-of-step volume of one layer, m³.  Unoccupied layers have none.
    pub fn volume(&self, comp: usize, layer: Layer) -> f64 {
        match layer {
            Layer::WaterColumn => self.inputs.forcing[comp].water_volume(self.topology.geometry(comp)),
            Layer::Solid(k) => self.inputs.stacks[comp].layer(k).map_or(0.0, |l| l.volume),
        }
    }

    /// End-of-step volume the integrator divides by, m³.
    pub fn next_volume(&self, comp: usize, layer: Layer) -> f64 {
        match layer {
            Layer::WaterColumn => self.inputs.forcing[comp].next_water_volume(self.topology.geometry(comp)),
            Layer::Solid(k) => self.inputs.stacks[comp].layer(k).map_or(0.0, |l| l.next_volume),
        }
    }

    /// Mass present at the start of the step, g.
    pub fn mass(&self, state: &ChemState, chem: usize, comp: usize, layer: Layer) -> f64 {
        self.volume(comp, layer) * state.concentration(chem, comp, layer)
    }

    /// Surface layer of a compartment, if it has a stack.
    pub fn surface(&self, comp: usize) -> Option<Layer> {
        match self.inputs.stacks[comp].nstack() {
            0 => None,
            n => Some(Layer::Solid(n)),
        }
    }
}

/// Run every physical transport stage for one chemical, after kinetics.
pub(crate) fn transport_chemical(
    ctx: &StepContext<'_>,
    state: &mut ChemState,
    chem: usize,
    tally: &mut LimiterTally,
) {
    exchange::deposition(ctx, state, chem, tally);
    exchange::erosion(ctx, state, chem, tally);
    infiltration::infiltration(ctx, state, chem, tally);
    exchange::porewater(ctx, state, chem, tally);
    floodplain::floodplain(ctx, state, chem, tally);
    advection::advection(ctx, state, chem, tally);
    dispersion::dispersion(ctx, state, chem);
}
