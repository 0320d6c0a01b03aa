//! Reaction kinetics in the water column and the surface solid layer.
//!
//! Outflux per pathway is `rate × C × V`.  Biodegradation is limited
//! against the whole layer mass; the remaining six chemical pathways are
//! limited together against the mass left after biodegradation only.
//! Subsurface layers never react.
pub mod rates;
pub mod yields;

use crate::limiter::{available_mass, limit_outflux, limit_outfluxes, LimiterTally};
use crate::params::{DissolutionSpec, Pathway, SolidsClass};
use crate::stack::Environment;
use crate::state::ChemState;
use crate::topology::Layer;
use crate::transport::StepContext;

pub use rates::{dissolution_outflux, particle_surface_area, pathway_rate, temperature_factor};
pub(crate) use yields::apply_yields;

/// Water column, then the surface layer when there is one.
pub(crate) fn reactive_layers(ctx: &StepContext<'_>, comp: usize) -> impl Iterator<Item = Layer> {
    std::iter::once(Layer::WaterColumn).chain(ctx.surface(comp))
}

fn environment(ctx: &StepContext<'_>, comp: usize, layer: Layer) -> Environment {
    match layer {
        Layer::WaterColumn => ctx.inputs.forcing[comp].environment,
        Layer::Solid(k) => ctx.inputs.stacks[comp]
            .layer(k)
            .map_or_else(Environment::default, |l| l.environment),
    }
}

/// Chemical pathway outfluxes for one chemical everywhere.
pub(crate) fn kinetics(ctx: &StepContext<'_>, state: &mut ChemState, chem: usize, tally: &mut LimiterTally) {
    let spec = &ctx.model.chemicals[chem].kinetics;
    if !Pathway::CHEMICAL.iter().any(|&p| spec.is_enabled(p)) {
        return;
    }
    let t_ref = ctx.model.kernel.reference_temperature;
    for comp in 0..ctx.topology.len() {
        for layer in reactive_layers(ctx, comp) {
            let i = state.idx(chem, comp, layer.index());
            let mass = ctx.mass(state, chem, comp, layer);
            if mass <= 0.0 {
                continue;
            }
            let env = environment(ctx, comp, layer);
            let fd = state.fractions[i].dissolved;
            let rate = |p: Pathway| pathway_rate(spec, p, layer, &env, fd, t_ref) * mass;

            let (biodeg, limit) = limit_outflux(rate(Pathway::Biodegradation), ctx.dt, mass);
            tally.record("biodegradation", comp, &limit);

            let others = &Pathway::CHEMICAL[1..];
            let mut out = [0.0; 6];
            for (o, &p) in out.iter_mut().zip(others) {
                *o = rate(p);
            }
            let limit = limit_outfluxes(&mut out, ctx.dt, available_mass(mass, biodeg, ctx.dt));
            tally.record("kinetics", comp, &limit);

            let kinetic_out = &mut state.fluxes[i].kinetic_out;
            kinetic_out[Pathway::Biodegradation.index()] = biodeg;
            for (&p, &v) in others.iter().zip(&out) {
                kinetic_out[p.index()] = v;
            }
        }
    }
}

/// Dissolution of every pure-phase solids class into its chemical.
///
/// The solids outflux (g/s) is stored per class; it only reaches the
/// chemical through a dissolution yield.  Each class is capped by its own
/// solids mass, then all classes feeding one chemical share what the water
/// can take up before saturating.
pub(crate) fn dissolution(ctx: &StepContext<'_>, state: &mut ChemState, tally: &mut LimiterTally) {
    for (chem, spec) in ctx.model.chemicals.iter().enumerate() {
        let Some(solubility) = spec.solubility else { continue };
        let classes: Vec<(usize, &SolidsClass, &DissolutionSpec)> = ctx
            .model
            .solids
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.dissolution.as_ref().filter(|d| d.chemical == chem).map(|d| (i, c, d)))
            .collect();
        if classes.is_empty() {
            continue;
        }
        for comp in 0..ctx.topology.len() {
            for layer in reactive_layers(ctx, comp) {
                let volume = ctx.volume(comp, layer);
                let (solids, water) = match layer {
                    Layer::WaterColumn => (ctx.inputs.forcing[comp].solids.as_slice(), volume),
                    Layer::Solid(k) => match ctx.inputs.stacks[comp].layer(k) {
                        Some(l) => (l.solids.as_slice(), volume * l.water_filled_porosity()),
                        None => continue,
                    },
                };
                if water <= 0.0 {
                    continue;
                }
                let i = state.idx(chem, comp, layer.index());
                let dissolved = state.concentration[i] * state.fractions[i].dissolved * volume / water;

                let mut out = vec![0.0; classes.len()];
                for (f, &(ci, class, d)) in out.iter_mut().zip(&classes) {
                    let m = solids[ci];
                    if m <= 0.0 {
                        continue;
                    }
                    let area = particle_surface_area(m, volume, class);
                    let potential = dissolution_outflux(d.rates.for_layer(layer), area, solubility, dissolved);
                    if potential <= 0.0 {
                        continue;
                    }
                    let (capped, limit) = limit_outflux(potential, ctx.dt, m * volume);
                    tally.record("dissolution", comp, &limit);
                    *f = capped;
                }
                if out.iter().all(|&f| f <= 0.0) {
                    continue;
                }
                let limit = limit_outfluxes(&mut out, ctx.dt, (solubility - dissolved) * water);
                tally.record("dissolution", comp, &limit);
                for (&(ci, ..), &f) in classes.iter().zip(&out) {
                    let d = state.class_idx(ci, comp, layer.index());
                    state.dissolution[d] = f;
                }
            }
        }
    }
}
