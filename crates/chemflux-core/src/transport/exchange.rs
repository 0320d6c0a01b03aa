//! Exchange between the water column and the surface solid layer:
//! deposition, erosion and porewater release.
//!
//! All three act only on the current surface layer.  Compartments without a
//! stack skip them.
use super::StepContext;
use crate::limiter::{available_mass, limit_outflux, LimiterTally};
use crate::state::ChemState;
use crate::topology::Layer;

/// Sorbed-phase settling from the water column onto the surface layer.
///
/// Available mass is the particulate mass less what the kinetic pathways
/// already took from the water column.
pub(crate) fn deposition(ctx: &StepContext<'_>, state: &mut ChemState, chem: usize, tally: &mut LimiterTally) {
    for comp in 0..ctx.topology.len() {
        let Some(surface) = ctx.surface(comp) else { continue };
        let flows = &ctx.inputs.forcing[comp].deposition_flow;
        let wc = state.idx(chem, comp, 0);
        let c = state.concentration[wc];
        let fr = &state.fractions[wc];
        let potential: f64 = flows.iter().zip(&fr.particulate).map(|(q, fp)| q * c * fp).sum();
        if potential <= 0.0 {
            continue;
        }
        let sorbed = ctx.volume(comp, Layer::WaterColumn) * c * fr.particulate_total;
        let available = available_mass(sorbed, state.fluxes[wc].kinetic_committed(), ctx.dt);
        let (out, limit) = limit_outflux(potential, ctx.dt, available);
        tally.record("deposition", comp, &limit);

        let s = state.idx(chem, comp, surface.index());
        state.fluxes[wc].deposition_out = out;
        state.fluxes[s].deposition_in = out;
    }
}

/// Resuspension of sorbed mass from the surface layer into the water column.
pub(crate) fn erosion(ctx: &StepContext<'_>, state: &mut ChemState, chem: usize, tally: &mut LimiterTally) {
    for comp in 0..ctx.topology.len() {
        let Some(surface) = ctx.surface(comp) else { continue };
        let flows = &ctx.inputs.forcing[comp].erosion_flow;
        let s = state.idx(chem, comp, surface.index());
        let c = state.concentration[s];
        let fr = &state.fractions[s];
        let potential: f64 = flows.iter().zip(&fr.particulate).map(|(q, fp)| q * c * fp).sum();
        if potential <= 0.0 {
            continue;
        }
        let sorbed = ctx.volume(comp, surface) * c * fr.particulate_total;
        let available = available_mass(sorbed, state.fluxes[s].kinetic_committed(), ctx.dt);
        let (out, limit) = limit_outflux(potential, ctx.dt, available);
        tally.record("erosion", comp, &limit);

        let wc = state.idx(chem, comp, 0);
        state.fluxes[s].erosion_out = out;
        state.fluxes[wc].erosion_in = out;
    }
}

/// Mobile-phase mass carried out of a layer whose volume shrinks from
/// `volume` to `next_volume`, g.  Zero when the layer does not shrink.
pub fn porewater_release_mass(volume: f64, next_volume: f64, concentration: f64, mobile_fraction: f64) -> f64 {
    (volume - next_volume).max(0.0) * concentration * mobile_fraction
}

/// Release of dissolved and bound mass from a shrinking surface layer into
/// the water column, so the mobile concentration stays finite as the layer
/// volume goes to zero.
///
/// Available mass is the mobile mass less this step's kinetic and
/// infiltration losses, and never more than the whole layer keeps once
/// erosion is also taken out.
pub(crate) fn porewater(ctx: &StepContext<'_>, state: &mut ChemState, chem: usize, tally: &mut LimiterTally) {
    let scale = ctx.model.kernel.erosion_porewater_scale;
    for comp in 0..ctx.topology.len() {
        let Some(surface) = ctx.surface(comp) else { continue };
        let Some(layer) = ctx.inputs.stacks[comp].surface() else { continue };
        if layer.next_volume >= layer.volume {
            continue;
        }
        let s = state.idx(chem, comp, surface.index());
        let c = state.concentration[s];
        let mobile = state.fractions[s].mobile();
        let released = porewater_release_mass(layer.volume, layer.next_volume, c, mobile);
        let potential = released / ctx.dt * scale;
        if potential <= 0.0 {
            continue;
        }
        let f = &state.fluxes[s];
        let mobile_mass = available_mass(layer.volume * c * mobile, f.kinetic_committed() + f.infiltration_out, ctx.dt);
        let layer_mass = available_mass(
            layer.volume * c,
            f.kinetic_committed() + f.erosion_out + f.infiltration_out,
            ctx.dt,
        );
        let available = mobile_mass.min(layer_mass);
        let (out, limit) = limit_outflux(potential, ctx.dt, available);
        tally.record("porewater", comp, &limit);

        let wc = state.idx(chem, comp, 0);
        state.fluxes[s].porewater_out = out;
        state.fluxes[wc].porewater_in = out;
    }
}
