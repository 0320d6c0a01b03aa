//! Gradient-driven dispersive exchange of the water column.
//!
//! For every live neighbour slot, `gradient = C_self − C_neighbour`.  A
//! positive gradient gives an outflux of `coefficient × gradient`, a
//! negative one the matching influx.  The boundary slot uses the
//! boundary-condition concentration as its neighbour.  Dispersion is not
//! limited.
use super::StepContext;
use crate::state::{ChemState, SourceFluxes};
use crate::topology::Source;

/// In/out rates (g/s) for one slot with exchange coefficient `coef`.
#[inline]
pub fn dispersive_exchange(coef: f64, c_self: f64, c_other: f64) -> (f64, f64) {
    let gradient = c_self - c_other;
    if gradient > 0.0 {
        (0.0, coef * gradient)
    } else if gradient < 0.0 {
        (-coef * gradient, 0.0)
    } else {
        (0.0, 0.0)
    }
}

pub(crate) fn dispersion(ctx: &StepContext<'_>, state: &mut ChemState, chem: usize) {
    for comp in 0..ctx.topology.len() {
        let coef = &ctx.inputs.forcing[comp].dispersion;
        let nb = ctx.topology.neighbors(comp);
        let c = state.concentration[state.idx(chem, comp, 0)];

        let mut others: Vec<(Source, f64)> = nb
            .compass()
            .map(|(s, other)| (s, state.concentration[state.idx(chem, other, 0)]))
            .collect();
        if let Some(other) = nb.floodplain() {
            others.push((Source::Floodplain, state.concentration[state.idx(chem, other, 0)]));
        }
        if nb.boundary {
            let c_bc = ctx.inputs.boundary.concentration(ctx.topology.id(comp), chem);
            others.push((Source::Boundary, c_bc));
        }

        let mut fluxes = SourceFluxes::default();
        for (s, c_other) in others {
            let (inflow, outflow) = dispersive_exchange(coef[s.index()], c, c_other);
            fluxes.inflow[s.index()] = inflow;
            fluxes.outflow[s.index()] = outflow;
        }
        let i = state.idx(chem, comp, 0);
        state.fluxes[i].dispersion = fluxes;
    }
}
