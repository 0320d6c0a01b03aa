//! Explicit-Euler mass balance producing next-step concentrations.
//!
//! ```text
//!   new_mass = old_mass + (Σ influx − Σ outflux) · dt
//!   new_conc = new_mass / new_volume   (0 when the layer has no volume)
//! ```
//!
//! Negative masses are clamped to zero.  Within the round-off tolerance this
//! is silent; beyond it the result is flagged unstable so the caller can
//! report it before carrying on.
use serde::Serialize;

use crate::topology::{CompartmentId, Layer};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stability {
    Stable,
    /// Negative by less than the tolerance, zeroed silently.
    RoundOff,
    /// Negative beyond the tolerance; holds the pre-clamp mass (g).
    Unstable(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integrated {
    pub mass: f64,
    pub concentration: f64,
    pub stability: Stability,
}

pub fn integrate_mass(
    old_mass: f64,
    influx: f64,
    outflux: f64,
    dt: f64,
    new_volume: f64,
    tolerance: f64,
) -> Integrated {
    let raw = old_mass + (influx - outflux) * dt;
    let (mass, stability) = if raw >= 0.0 {
        (raw, Stability::Stable)
    } else if -raw < tolerance {
        (0.0, Stability::RoundOff)
    } else {
        (0.0, Stability::Unstable(raw))
    };
    let concentration = if new_volume > 0.0 { mass / new_volume } else { 0.0 };
    Integrated { mass, concentration, stability }
}

/// A negative mass beyond round-off, recovered by clamping to zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstabilityEvent {
    pub compartment: CompartmentId,
    pub layer: Layer,
    pub chemical: usize,
    /// Pre-clamp mass, g (negative).
    pub magnitude: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn simple_outflow_step() {
        let r = integrate_mass(1000.0, 0.0, 50.0, 1.0, 100.0, 1e-6);
        assert_eq!(r.mass, 950.0);
        assert_relative_eq!(r.concentration, 9.5);
        assert_eq!(r.stability, Stability::Stable);
    }

    #[test]
    fn round_off_is_silently_zeroed() {
        let r = integrate_mass(1.0, 0.0, 1.0 + 1e-9, 1.0, 10.0, 1e-6);
        assert_eq!(r.mass, 0.0);
        assert_eq!(r.concentration, 0.0);
        assert_eq!(r.stability, Stability::RoundOff);
    }

    #[test]
    fn large_negative_is_flagged_with_magnitude() {
        let r = integrate_mass(1.0, 0.0, 3.0, 1.0, 10.0, 1e-6);
        assert_eq!(r.mass, 0.0);
        assert_eq!(r.stability, Stability::Unstable(-2.0));
    }

    #[test]
    fn dry_layer_has_zero_concentration() {
        let r = integrate_mass(5.0, 1.0, 0.0, 1.0, 0.0, 1e-6);
        assert_eq!(r.mass, 6.0);
        assert_eq!(r.concentration, 0.0);
    }
}
