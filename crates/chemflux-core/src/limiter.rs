//! Mass-conservation limiter.
//!
//! Every flux and kinetics stage caps its aggregate outflux against the mass
//! actually available in the layer:
//!
//! ```text
//!   potential = Σ outflux · dt
//!   available = max(0, mass − committed · dt)
//!   if potential > available: outflux_i *= available / potential
//! ```
//!
//! What counts as `committed` differs per stage; each call site states it.

/// Result of one limiter application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit {
    /// Σ outflux · dt before scaling, g.
    pub potential: f64,
    /// Mass the outflux may remove, g.
    pub available: f64,
    /// Factor applied to every contributing outflux; exactly 1.0 when the
    /// limiter did not engage.
    pub scale: f64,
}

impl Limit {
    pub fn is_active(&self) -> bool {
        self.scale < 1.0
    }
}

/// Mass left for a stage once other sinks scheduled this step are removed.
#[inline]
pub fn available_mass(mass: f64, committed_rate: f64, dt: f64) -> f64 {
    (mass - committed_rate * dt).max(0.0)
}

/// Scale `outfluxes` in place so they cannot remove more than `available`.
///
/// Outfluxes are left untouched when the potential fits.
pub fn limit_outfluxes(outfluxes: &mut [f64], dt: f64, available: f64) -> Limit {
    let potential = outfluxes.iter().sum::<f64>() * dt;
    let available = available.max(0.0);
    if potential > available {
        let scale = available / potential;
        for f in outfluxes.iter_mut() {
            *f *= scale;
        }
        Limit { potential, available, scale }
    } else {
        Limit { potential, available, scale: 1.0 }
    }
}

/// Single-outflux form of [`limit_outfluxes`].
pub fn limit_outflux(outflux: f64, dt: f64, available: f64) -> (f64, Limit) {
    let mut f = [outflux];
    let limit = limit_outfluxes(&mut f, dt, available);
    (f[0], limit)
}

/// Counts how often limiters engaged during a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimiterTally(pub usize);

impl LimiterTally {
    pub fn record(&mut self, stage: &'static str, compartment: usize, limit: &Limit) {
        if limit.is_active() {
            log::debug!(
                "{stage} limited in compartment {compartment}: potential {:.6e} g, available {:.6e} g, scale {:.6}",
                limit.potential,
                limit.available,
                limit.scale
            );
            self.0 += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fitting_potential_leaves_fluxes_unchanged() {
        let mut f = [50.0];
        let limit = limit_outfluxes(&mut f, 1.0, 1000.0);
        assert_eq!(limit.scale, 1.0);
        assert_eq!(limit.potential, 50.0);
        assert_eq!(f, [50.0]);
        assert!(!limit.is_active());
    }

    #[test]
    fn excess_potential_scales_to_available() {
        let (f, limit) = limit_outflux(50.0, 1.0, 40.0);
        assert_relative_eq!(f, 40.0, max_relative = 1e-12);
        assert_relative_eq!(limit.scale, 0.8, max_relative = 1e-12);
        assert!(limit.is_active());
    }

    #[test]
    fn scaling_is_proportional_across_contributors() {
        let mut f = [3.0, 1.0, 0.0, 4.0];
        limit_outfluxes(&mut f, 2.0, 8.0);
        // potential 16 → scale 0.5
        assert_eq!(f, [1.5, 0.5, 0.0, 2.0]);
        assert_relative_eq!(f.iter().sum::<f64>() * 2.0, 8.0);
    }

    #[test]
    fn committed_mass_is_subtracted_and_clamped() {
        assert_eq!(available_mass(100.0, 30.0, 2.0), 40.0);
        assert_eq!(available_mass(10.0, 30.0, 2.0), 0.0);
        let (f, _) = limit_outflux(5.0, 1.0, available_mass(10.0, 30.0, 2.0));
        assert_eq!(f, 0.0);
    }

    #[test]
    fn tally_counts_active_limits_only() {
        let mut tally = LimiterTally::default();
        tally.record("advection", 0, &limit_outflux(1.0, 1.0, 10.0).1);
        tally.record("advection", 0, &limit_outflux(10.0, 1.0, 1.0).1);
        assert_eq!(tally.0, 1);
    }
}
