//! Equilibrium partitioning between dissolved, DOC-bound and particulate
//! phases.
//!
//! For one layer with solids classes `i`:
//!
//! ```text
//!   fp_i = pic_i·m_i / (φ + pib·b + Σ pic_j·m_j)
//!   fb   = pib·b     / (φ + pib·b + Σ pic_j·m_j)
//!   fd   = 1 − Σ fp_i − fb
//! ```
//!
//! `φ` is the water-column porosity or the layer's water-filled porosity,
//! `m` and `b` are solids and effective DOC in kg/L.  Only the water column
//! applies the particle-interaction correction to `pic`.
#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::forcing::{CompartmentForcing, StepInputs};
use crate::params::{ChemicalSpec, ModelConfig, PartitionMode, SolidsClass, G_PER_M3_TO_KG_PER_L};
use crate::stack::LayerStack;
use crate::state::{ChemState, PhaseFractions};
use crate::topology::Layer;

/// Inputs for a single layer.
#[derive(Debug, Clone, Copy)]
pub struct PartitionInputs<'a> {
    /// Solids concentration per class, g/m³.
    pub solids: &'a [f64],
    /// Effective (binding) DOC concentration, g/m³.
    pub doc: f64,
    /// Porosity term: volumetric (water column) or water-filled (layer).
    pub porosity: f64,
    /// Particle-interaction parameter; `None` for solid layers.
    pub particle_interaction: Option<f64>,
}

/// Partition coefficient corrected for particle interaction.  Saturates at
/// `nux / m` as the solids concentration `m` (kg/L) grows.
pub fn particle_interaction_kp(kp: f64, m: f64, nux: Option<f64>) -> f64 {
    match nux {
        Some(nux) if nux > 0.0 && m > 0.0 => kp / (1.0 + m * kp / nux),
        _ => kp,
    }
}

/// Volumetric porosity of the water column: one minus the solids volume
/// fraction.
pub fn water_column_porosity(solids: &[f64], classes: &[SolidsClass]) -> f64 {
    let solids_volume: f64 = solids
        .iter()
        .zip(classes)
        .map(|(&m, class)| m.max(0.0) / class.particle_density())
        .sum();
    (1.0 - solids_volume).clamp(0.0, 1.0)
}

/// Pin the particulate fractions to sum to at most one and derive the
/// dissolved fraction by difference.
///
/// A sum above one only arises from rounding at very large partition
/// coefficients; the fractions are rescaled and the total reported as
/// exactly 1.0.  Degenerate (negative or non-finite) inputs leave the
/// chemical fully dissolved.
pub fn normalize_fractions(mut particulate: Vec<f64>, bound: f64) -> PhaseFractions {
    if particulate.iter().any(|f| !(f.is_finite() && *f >= 0.0)) || !bound.is_finite() {
        log::warn!("degenerate partition fractions {particulate:?} (bound {bound}); treating as dissolved");
        return PhaseFractions::dissolved_only(particulate.len());
    }
    let mut total: f64 = particulate.iter().sum();
    if total > 1.0 {
        for f in &mut particulate {
            *f /= total;
        }
        total = 1.0;
    }
    let bound = bound.clamp(0.0, 1.0 - total);
    let dissolved = (1.0 - total - bound).max(0.0);
    PhaseFractions { particulate, particulate_total: total, bound, dissolved }
}

/// Phase fractions of one chemical in one layer.
pub fn partition_phases(
    chem: &ChemicalSpec,
    classes: &[SolidsClass],
    inputs: &PartitionInputs<'_>,
) -> PhaseFractions {
    let n = classes.len();
    if chem.partition == PartitionMode::None {
        return PhaseFractions::dissolved_only(n);
    }

    let sorbed: Vec<f64> = classes
        .iter()
        .enumerate()
        .map(|(i, class)| {
            let m = inputs.solids[i].max(0.0) * G_PER_M3_TO_KG_PER_L;
            let kp = chem.partition.coefficient(i, class);
            particle_interaction_kp(kp, m, inputs.particle_interaction) * m
        })
        .collect();
    let sorbed_total: f64 = sorbed.iter().sum();

    // No pore water: the coefficients are effectively infinite relative to
    // the water phase and nothing can bind to DOC.
    if inputs.porosity <= 0.0 {
        if sorbed_total <= 0.0 {
            return PhaseFractions::dissolved_only(n);
        }
        let particulate = sorbed.iter().map(|s| s / sorbed_total).collect();
        return normalize_fractions(particulate, 0.0);
    }

    let binding = chem.kb * inputs.doc.max(0.0) * G_PER_M3_TO_KG_PER_L;
    let denom = inputs.porosity + binding + sorbed_total;
    let particulate = sorbed.iter().map(|s| s / denom).collect();
    normalize_fractions(particulate, binding / denom)
}

/// Phase fractions for the given layer of a compartment, drawing solids,
/// DOC and porosity from the forcing (water column) or the stack.
pub fn partition_layer(
    model: &ModelConfig,
    chem: usize,
    layer: Layer,
    forcing: &CompartmentForcing,
    stack: &LayerStack,
) -> PhaseFractions {
    let spec = &model.chemicals[chem];
    let classes = &model.solids;
    match layer {
        Layer::WaterColumn => {
            let env = &forcing.environment;
            let nux = model.kernel.particle_interaction;
            let inputs = PartitionInputs {
                solids: &forcing.solids,
                doc: env.doc * env.doc_binding_fraction,
                porosity: water_column_porosity(&forcing.solids, classes),
                particle_interaction: (nux > 0.0).then_some(nux),
            };
            partition_phases(spec, classes, &inputs)
        }
        Layer::Solid(k) => match stack.layer(k) {
            Some(solid) => {
                let env = &solid.environment;
                let inputs = PartitionInputs {
                    solids: &solid.solids,
                    doc: env.doc * env.doc_binding_fraction,
                    porosity: solid.water_filled_porosity(),
                    particle_interaction: None,
                };
                partition_phases(spec, classes, &inputs)
            }
            None => PhaseFractions::dissolved_only(classes.len()),
        },
    }
}

/// Recompute fractions for every chemical, compartment and occupied layer.
///
/// Each (chemical, compartment) column is independent, so with the
/// `threading` feature the columns are processed in parallel.
pub(crate) fn partition_all(model: &ModelConfig, state: &mut ChemState, inputs: &StepInputs<'_>) {
    let n_comp = state.n_compartments();
    let n_layers = state.n_layers();
    let column = |(i, chunk): (usize, &mut [PhaseFractions])| {
        let chem = i / n_comp;
        let comp = i % n_comp;
        let forcing = &inputs.forcing[comp];
        let stack = &inputs.stacks[comp];
        chunk[0] = partition_layer(model, chem, Layer::WaterColumn, forcing, stack);
        // Top-down across the occupied stack.
        for k in (1..=stack.nstack().min(n_layers - 1)).rev() {
            chunk[k] = partition_layer(model, chem, Layer::Solid(k), forcing, stack);
        }
    };

    #[cfg(feature = "threading")]
    state.fractions.par_chunks_mut(n_layers).enumerate().for_each(column);
    #[cfg(not(feature = "threading"))]
    state.fractions.chunks_mut(n_layers).enumerate().for_each(column);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn classes() -> Vec<SolidsClass> {
        vec![
            SolidsClass { name: "sand".into(), diameter: 2e-4, specific_gravity: 2.65, f_oc: 0.005, dissolution: None },
            SolidsClass { name: "clay".into(), diameter: 2e-6, specific_gravity: 2.60, f_oc: 0.03, dissolution: None },
        ]
    }

    fn sorbing(kp: Vec<f64>, kb: f64) -> ChemicalSpec {
        let mut c = ChemicalSpec::tracer("x");
        c.partition = PartitionMode::SolidsMass { kp };
        c.kb = kb;
        c
    }

    #[test]
    fn hand_computed_fractions() {
        // m = 1000 g/m³ = 1e-3 kg/L per class; kp = 1000 and 3000 L/kg.
        // sorbed = 1 and 3, binding = 2000·500e-6 = 1, φ = 1 → denom = 6.
        let chem = sorbing(vec![1000.0, 3000.0], 2000.0);
        let inputs = PartitionInputs {
            solids: &[1000.0, 1000.0],
            doc: 500.0,
            porosity: 1.0,
            particle_interaction: None,
        };
        let f = partition_phases(&chem, &classes(), &inputs);
        assert_abs_diff_eq!(f.particulate[0], 1.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(f.particulate[1], 3.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(f.bound, 1.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(f.dissolved, 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn particle_interaction_lowers_sorption() {
        let kp = 1.0e5;
        let m = 1.0e-3;
        let corrected = particle_interaction_kp(kp, m, Some(1.4));
        assert!(corrected < kp);
        // Saturates toward nux / m.
        assert!(corrected < 1.4 / m);
        assert_eq!(particle_interaction_kp(kp, m, None), kp);
    }

    #[test]
    fn rescaled_sum_is_exactly_one() {
        let f = normalize_fractions(vec![0.5, 0.500_000_3], 0.0);
        assert_eq!(f.particulate_total, 1.0);
        assert_abs_diff_eq!(f.particulate[0], 0.5 / 1.000_000_3, epsilon = 1e-15);
        assert_abs_diff_eq!(f.particulate[1], 0.500_000_3 / 1.000_000_3, epsilon = 1e-15);
        assert_eq!(f.dissolved, 0.0);
        assert_eq!(f.bound, 0.0);
    }

    #[test]
    fn non_finite_fractions_fall_back_to_dissolved() {
        let f = normalize_fractions(vec![f64::NAN], f64::NAN);
        assert_eq!(f.dissolved, 1.0);
        assert_eq!(f.particulate, vec![0.0]);

        let f = normalize_fractions(vec![0.2, -0.1], 0.0);
        assert_eq!(f.dissolved, 1.0);
        assert_eq!(f.particulate_total, 0.0);
    }

    #[test]
    fn zero_porosity_is_fully_sorbed_without_binding() {
        let chem = sorbing(vec![100.0, 100.0], 1.0e6);
        let inputs = PartitionInputs {
            solids: &[300.0, 100.0],
            doc: 50.0,
            porosity: 0.0,
            particle_interaction: None,
        };
        let f = partition_phases(&chem, &classes(), &inputs);
        assert_abs_diff_eq!(f.particulate[0], 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(f.particulate[1], 0.25, epsilon = 1e-12);
        assert_eq!(f.bound, 0.0);
        assert_eq!(f.dissolved, 0.0);
    }

    #[test]
    fn no_partitioning_is_fully_dissolved() {
        let chem = ChemicalSpec::tracer("t");
        let inputs = PartitionInputs {
            solids: &[1.0e5, 1.0e5],
            doc: 10.0,
            porosity: 0.9,
            particle_interaction: Some(1.4),
        };
        let f = partition_phases(&chem, &classes(), &inputs);
        assert_eq!(f.dissolved, 1.0);
        assert_eq!(f.particulate, vec![0.0, 0.0]);
    }

    #[test]
    fn organic_carbon_mode_uses_foc() {
        let mut chem = ChemicalSpec::tracer("oc");
        chem.partition = PartitionMode::OrganicCarbon { koc: 1.0e4 };
        let inputs = PartitionInputs {
            solids: &[1000.0, 1000.0],
            doc: 0.0,
            porosity: 1.0,
            particle_interaction: None,
        };
        let f = partition_phases(&chem, &classes(), &inputs);
        // kp = 50 and 300 L/kg → sorbed 0.05 and 0.3.
        assert!(f.particulate[1] > f.particulate[0] * 5.9);
    }

    #[test]
    fn fractions_sum_to_one_under_extreme_coefficients() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..500 {
            let kp = vec![10f64.powf(rng.gen_range(0.0..14.0)), 10f64.powf(rng.gen_range(0.0..14.0))];
            let chem = sorbing(kp, 10f64.powf(rng.gen_range(0.0..8.0)));
            let solids = [rng.gen_range(0.0..1.0e6), rng.gen_range(0.0..1.0e6)];
            let inputs = PartitionInputs {
                solids: &solids,
                doc: rng.gen_range(0.0..100.0),
                porosity: rng.gen_range(0.0..1.0),
                particle_interaction: if rng.gen_bool(0.5) { Some(1.4) } else { None },
            };
            let f = partition_phases(&chem, &classes(), &inputs);
            assert_abs_diff_eq!(f.total(), 1.0, epsilon = 1e-5);
            assert!(f.dissolved >= 0.0 && f.bound >= 0.0);
            assert!(f.particulate_total <= 1.0);
        }
    }

    #[test]
    fn water_column_porosity_removes_solids_volume() {
        // 26 500 g/m³ of sg 2.65 particles occupies 1% of the volume.
        let p = water_column_porosity(&[26_500.0, 0.0], &classes());
        assert_abs_diff_eq!(p, 0.99, epsilon = 1e-12);
    }
}
