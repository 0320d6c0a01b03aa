//! Infiltration (overland) and transmission loss (channels).
//!
//! Only mobile phases move.  The water column always feeds the surface
//! layer; below that, a layer passes mass to the one beneath only once the
//! wetting front has crossed its lower boundary.  Flux out of layer 1, or
//! out of a water column with no stack, leaves the system.
use super::StepContext;
use crate::limiter::{available_mass, limit_outflux, LimiterTally};
use crate::state::ChemState;
use crate::topology::Layer;

pub(crate) fn infiltration(ctx: &StepContext<'_>, state: &mut ChemState, chem: usize, tally: &mut LimiterTally) {
    for comp in 0..ctx.topology.len() {
        let forcing = &ctx.inputs.forcing[comp];
        let rate = forcing.infiltration_rate;
        if rate <= 0.0 {
            continue;
        }
        let area = ctx.topology.geometry(comp).bed_area();
        let stack = &ctx.inputs.stacks[comp];
        let nstack = stack.nstack();

        // ── Water column → surface layer ─────────────────────────────────────
        let wc = state.idx(chem, comp, 0);
        let c = state.concentration[wc];
        let mobile = state.fractions[wc].mobile();
        let mobile_mass = ctx.volume(comp, Layer::WaterColumn) * c * mobile;
        let available = available_mass(mobile_mass, state.fluxes[wc].kinetic_committed(), ctx.dt);
        let (out, limit) = limit_outflux(rate * area * c * mobile, ctx.dt, available);
        tally.record("infiltration", comp, &limit);
        state.fluxes[wc].infiltration_out = out;
        if nstack > 0 {
            let s = state.idx(chem, comp, nstack);
            state.fluxes[s].infiltration_in = out;
        }

        // ── Layer k → layer k−1 behind the wetting front ─────────────────────
        let Some(front) = forcing.wetting_front else { continue };
        for k in (1..=nstack).rev() {
            let Some(layer) = stack.layer(k) else { continue };
            if !layer.is_crossed_by(front) {
                continue;
            }
            let i = state.idx(chem, comp, k);
            let c = state.concentration[i];
            let mobile = state.fractions[i].mobile();
            // Kinetics only run in the surface layer.
            let committed = if k == nstack { state.fluxes[i].kinetic_committed() } else { 0.0 };
            let available = available_mass(layer.volume * c * mobile, committed, ctx.dt);
            let (out, limit) = limit_outflux(rate * area * c * mobile, ctx.dt, available);
            tally.record("infiltration", comp, &limit);
            state.fluxes[i].infiltration_out = out;
            if k > 1 {
                let below = state.idx(chem, comp, k - 1);
                state.fluxes[below].infiltration_in = out;
            }
        }
    }
}
