//! Water-column exchange between a dual overland cell and the channel node
//! running through it.
//!
//! Both gross flows are read from the overland cell's forcing.  Each
//! direction is limited against its sender's mass net of infiltration, and
//! the limited outflux is credited unchanged to the other side through the
//! floodplain slot of the advection fluxes.
use super::StepContext;
use crate::limiter::{available_mass, limit_outflux, LimiterTally};
use crate::state::ChemState;
use crate::topology::{Layer, Source};

pub(crate) fn floodplain(ctx: &StepContext<'_>, state: &mut ChemState, chem: usize, tally: &mut LimiterTally) {
    let slot = Source::Floodplain.index();
    for ov in 0..ctx.topology.n_overland() {
        let Some(ch) = ctx.topology.neighbors(ov).floodplain() else { continue };
        let forcing = &ctx.inputs.forcing[ov];
        let i_ov = state.idx(chem, ov, 0);
        let i_ch = state.idx(chem, ch, 0);

        let to_channel = side_outflux(ctx, state, ov, i_ov, forcing.floodplain_to_channel, tally);
        let to_overland = side_outflux(ctx, state, ch, i_ch, forcing.floodplain_to_overland, tally);

        state.fluxes[i_ov].advection.outflow[slot] = to_channel;
        state.fluxes[i_ch].advection.inflow[slot] = to_channel;
        state.fluxes[i_ch].advection.outflow[slot] = to_overland;
        state.fluxes[i_ov].advection.inflow[slot] = to_overland;
    }
}

fn side_outflux(
    ctx: &StepContext<'_>,
    state: &ChemState,
    comp: usize,
    i: usize,
    flow: f64,
    tally: &mut LimiterTally,
) -> f64 {
    if flow <= 0.0 {
        return 0.0;
    }
    let c = state.concentration[i];
    let mass = ctx.volume(comp, Layer::WaterColumn) * c;
    let available = available_mass(mass, state.fluxes[i].infiltration_out, ctx.dt);
    let (out, limit) = limit_outflux(flow * c, ctx.dt, available);
    tally.record("floodplain", comp, &limit);
    out
}
