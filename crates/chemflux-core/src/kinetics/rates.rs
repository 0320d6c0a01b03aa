//! Effective first-order rate constants per pathway, and the particle
//! surface-area model behind pure-phase dissolution.
use crate::params::{KineticsSpec, Pathway, SolidsClass};
use crate::stack::Environment;
use crate::topology::Layer;

/// Arrhenius-style correction `θ^(T − T_ref)`.
#[inline]
pub fn temperature_factor(theta: f64, temperature: f64, reference: f64) -> f64 {
    theta.powf(temperature - reference)
}

/// Effective rate (1/s) of one pathway in one layer.  Disabled pathways and
/// dissolution return zero; dissolution acts on solids, see
/// [`dissolution_outflux`].
pub fn pathway_rate(
    kinetics: &KineticsSpec,
    pathway: Pathway,
    layer: Layer,
    env: &Environment,
    dissolved_fraction: f64,
    reference_temperature: f64,
) -> f64 {
    let rate = match pathway {
        Pathway::Biodegradation => kinetics.biodegradation.as_ref().map(|b| {
            let k = b.rates.for_layer(layer) * temperature_factor(b.theta, env.temperature, reference_temperature);
            if b.bacteria_scaled {
                k * env.bacteria
            } else {
                k
            }
        }),
        Pathway::Hydrolysis => kinetics.hydrolysis.as_ref().map(|h| match layer {
            Layer::WaterColumn => h.water.at_ph(env.ph),
            Layer::Solid(_) => h.solid.at_ph(env.ph),
        }),
        Pathway::Oxidation => kinetics.oxidation.map(|r| r.for_layer(layer) * env.oxidant),
        Pathway::Photolysis => kinetics.photolysis.map(|r| r.for_layer(layer) * env.light),
        Pathway::Radioactive => kinetics.radioactive.map(|r| r.for_layer(layer)),
        Pathway::Volatilization => kinetics.volatilization.map(|r| r.for_layer(layer) * dissolved_fraction),
        Pathway::UserDefined => kinetics.user_defined.as_ref().map(|u| {
            u.rates.for_layer(layer) * temperature_factor(u.theta, env.temperature, reference_temperature)
        }),
        Pathway::Dissolution => None,
    };
    rate.unwrap_or(0.0).max(0.0)
}

/// Total surface area (m²) of spherical particles of `class` at
/// concentration `solids` (g/m³) in `volume` (m³): `6·m·V / (d·sg·ρ_w)`.
pub fn particle_surface_area(solids: f64, volume: f64, class: &SolidsClass) -> f64 {
    6.0 * solids.max(0.0) * volume / (class.diameter * class.particle_density())
}

/// Solids dissolution rate (g/s) for mass-transfer coefficient `k` (m/s)
/// across `area`, driven by the solubility deficit.  Zero at or above
/// saturation.
pub fn dissolution_outflux(k: f64, area: f64, solubility: f64, dissolved_concentration: f64) -> f64 {
    let deficit = solubility - dissolved_concentration;
    if deficit > 0.0 {
        k * area * deficit
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{BiodegradationSpec, DomainRates, HydrolysisRates, HydrolysisSpec};
    use approx::assert_relative_eq;

    #[test]
    fn biodegradation_corrects_for_temperature_and_bacteria() {
        let mut k = KineticsSpec {
            biodegradation: Some(BiodegradationSpec {
                rates: DomainRates::new(1.0e-3, 1.0e-4),
                bacteria_scaled: false,
                theta: 1.05,
            }),
            ..Default::default()
        };
        let env = Environment { temperature: 30.0, bacteria: 4.0, ..Default::default() };
        let r = pathway_rate(&k, Pathway::Biodegradation, Layer::WaterColumn, &env, 1.0, 20.0);
        assert_relative_eq!(r, 1.0e-3 * 1.05f64.powi(10), max_relative = 1e-12);

        let solid = pathway_rate(&k, Pathway::Biodegradation, Layer::Solid(1), &env, 1.0, 20.0);
        assert_relative_eq!(solid, 1.0e-4 * 1.05f64.powi(10), max_relative = 1e-12);

        if let Some(b) = k.biodegradation.as_mut() {
            b.bacteria_scaled = true;
        }
        let scaled = pathway_rate(&k, Pathway::Biodegradation, Layer::WaterColumn, &env, 1.0, 20.0);
        assert_relative_eq!(scaled, 4.0 * r, max_relative = 1e-12);
    }

    #[test]
    fn hydrolysis_uses_domain_constants_at_local_ph() {
        let k = KineticsSpec {
            hydrolysis: Some(HydrolysisSpec {
                water: HydrolysisRates { neutral: 1.0e-5, acid: 0.0, base: 10.0 },
                solid: HydrolysisRates { neutral: 2.0e-5, ..Default::default() },
            }),
            ..Default::default()
        };
        let env = Environment { ph: 9.0, ..Default::default() };
        let r = pathway_rate(&k, Pathway::Hydrolysis, Layer::WaterColumn, &env, 1.0, 20.0);
        assert_relative_eq!(r, 1.0e-5 + 10.0 * 1.0e-5, max_relative = 1e-9);
        let s = pathway_rate(&k, Pathway::Hydrolysis, Layer::Solid(2), &env, 1.0, 20.0);
        assert_relative_eq!(s, 2.0e-5, max_relative = 1e-12);
    }

    #[test]
    fn scaled_pathways_follow_their_driver() {
        let k = KineticsSpec {
            oxidation: Some(DomainRates::new(2.0, 0.0)),
            photolysis: Some(DomainRates::new(1.0, 0.0)),
            volatilization: Some(DomainRates::new(1.0, 0.0)),
            ..Default::default()
        };
        let env = Environment { oxidant: 0.25, light: 0.5, ..Default::default() };
        let wc = Layer::WaterColumn;
        assert_eq!(pathway_rate(&k, Pathway::Oxidation, wc, &env, 1.0, 20.0), 0.5);
        assert_eq!(pathway_rate(&k, Pathway::Photolysis, wc, &env, 1.0, 20.0), 0.5);
        assert_eq!(pathway_rate(&k, Pathway::Volatilization, wc, &env, 0.3, 20.0), 0.3);
        assert_eq!(pathway_rate(&k, Pathway::Radioactive, wc, &env, 1.0, 20.0), 0.0);
    }

    #[test]
    fn dissolution_stops_at_saturation() {
        let class = SolidsClass {
            name: "crystal".into(),
            diameter: 1.0e-4,
            specific_gravity: 2.0,
            f_oc: 0.0,
            dissolution: None,
        };
        // 6 · 100 g/m³ · 2 m³ / (1e-4 m · 2e6 g/m³) = 6 m²
        let area = particle_surface_area(100.0, 2.0, &class);
        assert_relative_eq!(area, 6.0, max_relative = 1e-12);
        assert_relative_eq!(dissolution_outflux(1.0e-3, area, 10.0, 4.0), 0.036, max_relative = 1e-12);
        assert_eq!(dissolution_outflux(1.0e-3, area, 10.0, 12.0), 0.0);
    }
}
