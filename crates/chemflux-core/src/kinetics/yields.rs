//! Transfer of reaction losses into product chemicals.
//!
//! Each yield entry credits `fraction × loss` of its pathway to the product
//! as an influx, in the water column and the surface layer only.  For
//! dissolution the loss is the solids outflux of the reacting class.
use super::reactive_layers;
use crate::params::Pathway;
use crate::state::ChemState;
use crate::transport::StepContext;

pub(crate) fn apply_yields(ctx: &StepContext<'_>, state: &mut ChemState) {
    for entry in &ctx.model.yields {
        for comp in 0..ctx.topology.len() {
            for layer in reactive_layers(ctx, comp) {
                let l = layer.index();
                let loss = if entry.pathway == Pathway::Dissolution {
                    state.dissolution[state.class_idx(entry.from, comp, l)]
                } else {
                    state.fluxes[state.idx(entry.from, comp, l)].kinetic_out[entry.pathway.index()]
                };
                let to = state.idx(entry.to, comp, l);
                state.fluxes[to].yield_in += entry.fraction * loss;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetics::{dissolution, kinetics};
    use crate::limiter::LimiterTally;
    use crate::params::{BiodegradationSpec, ChemicalSpec, DissolutionSpec, DomainRates, KineticsSpec, YieldEntry};
    use crate::stack::LayerStack;
    use crate::topology::Layer;
    use crate::transport::test_support::{layer, model, row, Fixture};
    use approx::assert_relative_eq;

    #[test]
    fn parent_loss_feeds_daughter_in_both_reactive_layers() {
        let mut parent = ChemicalSpec::tracer("parent");
        parent.kinetics = KineticsSpec {
            biodegradation: Some(BiodegradationSpec {
                rates: DomainRates::new(0.01, 0.02),
                bacteria_scaled: false,
                theta: 1.0,
            }),
            ..Default::default()
        };
        let mut m = model(vec![parent, ChemicalSpec::tracer("daughter")], 0);
        m.yields = vec![YieldEntry { from: 0, to: 1, pathway: Pathway::Biodegradation, fraction: 0.5 }];

        let mut fx = Fixture::still(1, 1.0, 0);
        fx.stacks[0] = LayerStack::new(vec![layer(-0.1, 10.0, 0), layer(0.0, 10.0, 0)]);
        let mut state = ChemState::new(2, 1, 2, 0);
        state.fill_layer(0, Layer::WaterColumn, 2.0);
        state.fill_layer(0, Layer::Solid(1), 4.0);
        state.fill_layer(0, Layer::Solid(2), 4.0);

        let topo = row(1);
        let inputs = fx.inputs();
        let ctx = StepContext { model: &m, topology: &topo, inputs: &inputs, dt: 1.0 };
        kinetics(&ctx, &mut state, 0, &mut LimiterTally::default());
        apply_yields(&ctx, &mut state);

        // Water: 0.01 × 200 g × 0.5.  Surface: 0.02 × 40 g × 0.5.
        assert_relative_eq!(state.fluxes(1, 0, Layer::WaterColumn).yield_in, 1.0, max_relative = 1e-12);
        assert_relative_eq!(state.fluxes(1, 0, Layer::Solid(2)).yield_in, 0.4, max_relative = 1e-12);
        // The buried layer neither reacts nor yields.
        assert_eq!(state.fluxes(1, 0, Layer::Solid(1)).yield_in, 0.0);
    }

    #[test]
    fn dissolution_yield_maps_solids_loss_to_chemical() {
        let mut m = model(vec![ChemicalSpec::tracer("dissolved")], 1);
        m.chemicals[0].solubility = Some(10.0);
        m.solids[0].dissolution = Some(DissolutionSpec { chemical: 0, rates: DomainRates::new(1.0e-6, 0.0) });
        m.yields = vec![YieldEntry { from: 0, to: 0, pathway: Pathway::Dissolution, fraction: 1.0 }];

        let mut fx = Fixture::still(1, 1.0, 1);
        fx.forcing[0].solids = vec![500.0];
        let mut state = ChemState::new(1, 1, 0, 1);

        let topo = row(1);
        let inputs = fx.inputs();
        let ctx = StepContext { model: &m, topology: &topo, inputs: &inputs, dt: 1.0 };
        dissolution(&ctx, &mut state, &mut LimiterTally::default());
        apply_yields(&ctx, &mut state);

        let solids_loss = state.dissolution_outflux(0, 0, Layer::WaterColumn);
        assert!(solids_loss > 0.0);
        assert_relative_eq!(state.fluxes(0, 0, Layer::WaterColumn).yield_in, solids_loss);
    }
}
