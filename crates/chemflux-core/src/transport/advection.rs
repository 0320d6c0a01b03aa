//! Lateral advection of the water column.
//!
//! Runs in two passes over the compartments.  The first computes and limits
//! every outflux and keeps each compartment's limiter scale; the second
//! builds influxes from the neighbours' start-of-step concentrations times
//! the scale the neighbour applied to itself, so a limited sender never
//! credits more than it released.
//!
//! Slot 0 carries point loads in and point withdrawals out.  The floodplain
//! slot is owned by the floodplain stage and left alone here.
use super::StepContext;
use crate::limiter::{available_mass, limit_outfluxes, LimiterTally};
use crate::state::ChemState;
use crate::topology::{Layer, Source, N_SOURCES};

pub(crate) fn advection(ctx: &StepContext<'_>, state: &mut ChemState, chem: usize, tally: &mut LimiterTally) {
    let n = ctx.topology.len();
    let floodplain = Source::Floodplain.index();
    let mut scale = vec![1.0; n];

    // ── Pass 1: outfluxes ────────────────────────────────────────────────────
    for comp in 0..n {
        let forcing = &ctx.inputs.forcing[comp];
        let nb = ctx.topology.neighbors(comp);
        let i = state.idx(chem, comp, 0);
        let c = state.concentration[i];

        let mut out = [0.0; N_SOURCES];
        for s in Source::ALL {
            if s != Source::Floodplain && nb.is_live(s) {
                out[s.index()] = forcing.advection_out[s.index()] * c;
            }
        }

        let fl = &state.fluxes[i];
        let committed = fl.kinetic_committed() + fl.deposition_out + fl.infiltration_out + fl.advection.outflow[floodplain];
        let available = available_mass(ctx.volume(comp, Layer::WaterColumn) * c, committed, ctx.dt);
        let limit = limit_outfluxes(&mut out, ctx.dt, available);
        tally.record("advection", comp, &limit);
        scale[comp] = limit.scale;

        let outflow = &mut state.fluxes[i].advection.outflow;
        for (slot, &v) in out.iter().enumerate() {
            if slot != floodplain {
                outflow[slot] = v;
            }
        }
    }

    // ── Pass 2: influxes ─────────────────────────────────────────────────────
    for comp in 0..n {
        let forcing = &ctx.inputs.forcing[comp];
        let nb = ctx.topology.neighbors(comp);
        let mut inflow = [0.0; N_SOURCES];

        inflow[Source::PointSource.index()] = ctx.inputs.load_rate(ctx.topology, comp, chem);
        for (s, other) in nb.compass() {
            let c_other = state.concentration[state.idx(chem, other, 0)];
            inflow[s.index()] = forcing.advection_in[s.index()] * c_other * scale[other];
        }
        if nb.boundary {
            let c_bc = ctx.inputs.boundary.concentration(ctx.topology.id(comp), chem);
            inflow[Source::Boundary.index()] = forcing.advection_in[Source::Boundary.index()] * c_bc;
        }

        let i = state.idx(chem, comp, 0);
        let dest = &mut state.fluxes[i].advection.inflow;
        for (slot, &v) in inflow.iter().enumerate() {
            if slot != floodplain {
                dest[slot] = v;
            }
        }
    }
}
