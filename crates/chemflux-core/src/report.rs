//! Mass-balance bookkeeping and reporting outputs.
//!
//! Everything here is derived from [`ChemState`] after a step; nothing feeds
//! back into the transport calculation.  Cumulative masses are in kg,
//! instantaneous fluxes in g/s.
use serde::{Deserialize, Serialize};

use crate::forcing::StepInputs;
use crate::integrator::InstabilityEvent;
use crate::params::{Pathway, G_PER_KG};
use crate::state::{ChemState, LayerFluxes};
use crate::topology::{CompartmentId, Layer, Source, Topology, N_SOURCES};

// ── Cumulative transport ──────────────────────────────────────────────────────

/// Mass (kg) moved through each process since the run started, for one
/// chemical in one layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CumulativeMass {
    /// Per source slot; slot 9 is floodplain transfer.
    pub advection_in: [f64; N_SOURCES],
    pub advection_out: [f64; N_SOURCES],
    pub dispersion_in: [f64; N_SOURCES],
    pub dispersion_out: [f64; N_SOURCES],
    pub deposition_in: f64,
    pub deposition_out: f64,
    pub erosion_in: f64,
    pub erosion_out: f64,
    pub infiltration_in: f64,
    pub infiltration_out: f64,
    pub porewater_in: f64,
    pub porewater_out: f64,
    pub kinetic_loss: [f64; Pathway::COUNT],
    pub yield_gain: f64,
}

impl CumulativeMass {
    pub fn accumulate(&mut self, f: &LayerFluxes, dt: f64) {
        let kg = dt / G_PER_KG;
        for s in 0..N_SOURCES {
            self.advection_in[s] += f.advection.inflow[s] * kg;
            self.advection_out[s] += f.advection.outflow[s] * kg;
            self.dispersion_in[s] += f.dispersion.inflow[s] * kg;
            self.dispersion_out[s] += f.dispersion.outflow[s] * kg;
        }
        self.deposition_in += f.deposition_in * kg;
        self.deposition_out += f.deposition_out * kg;
        self.erosion_in += f.erosion_in * kg;
        self.erosion_out += f.erosion_out * kg;
        self.infiltration_in += f.infiltration_in * kg;
        self.infiltration_out += f.infiltration_out * kg;
        self.porewater_in += f.porewater_in * kg;
        self.porewater_out += f.porewater_out * kg;
        for (total, rate) in self.kinetic_loss.iter_mut().zip(&f.kinetic_out) {
            *total += rate * kg;
        }
        self.yield_gain += f.yield_in * kg;
    }

    pub fn kinetic_total(&self) -> f64 {
        self.kinetic_loss.iter().sum()
    }
}

// ── Domain totals ─────────────────────────────────────────────────────────────

/// Mass (g) of one chemical held in every occupied layer, using end-of-step
/// volumes so it matches the concentrations a step leaves behind.
pub fn total_mass(state: &ChemState, topology: &Topology, inputs: &StepInputs<'_>, chem: usize) -> f64 {
    (0..topology.len())
        .map(|comp| {
            let water = inputs.forcing[comp].next_water_volume(topology.geometry(comp))
                * state.concentration(chem, comp, Layer::WaterColumn);
            let stack = &inputs.stacks[comp];
            let solid: f64 = (1..=stack.nstack().min(state.max_stack()))
                .filter_map(|k| stack.layer(k).map(|l| l.next_volume * state.concentration(chem, comp, Layer::Solid(k))))
                .sum();
            water + solid
        })
        .sum()
}

/// Cumulative kinetic loss (kg) of one chemical over every compartment and
/// layer.
pub fn kinetic_loss(state: &ChemState, chem: usize) -> f64 {
    sum_cumulative(state, chem, CumulativeMass::kinetic_total)
}

fn sum_cumulative(state: &ChemState, chem: usize, f: impl Fn(&CumulativeMass) -> f64) -> f64 {
    let mut total = 0.0;
    for comp in 0..state.n_compartments() {
        for l in 0..state.n_layers() {
            total += f(state.cumulative(chem, comp, Layer::from_index(l)));
        }
    }
    total
}

/// Whole-domain budget for one chemical.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MassBalance {
    pub chemical: usize,
    /// Mass currently held, kg.
    pub mass: f64,
    pub kinetic_loss: f64,
    pub yield_gain: f64,
    /// Mass that left through declared outlets, kg.
    pub boundary_export: f64,
    /// Mass that entered as point loads, kg.
    pub loads: f64,
    /// Mass lost below the deepest layer or from bare compartments, kg.
    pub infiltration_loss: f64,
}

impl MassBalance {
    pub fn compute(state: &ChemState, topology: &Topology, inputs: &StepInputs<'_>, chem: usize) -> Self {
        let boundary = Source::Boundary.index();
        let point = Source::PointSource.index();
        let mut infiltration_loss = 0.0;
        for comp in 0..topology.len() {
            let nstack = inputs.stacks[comp].nstack();
            // Mass leaving the bottom of the stack is not credited anywhere.
            let bottom = if nstack == 0 { Layer::WaterColumn } else { Layer::Solid(1) };
            infiltration_loss += state.cumulative(chem, comp, bottom).infiltration_out;
        }
        Self {
            chemical: chem,
            mass: total_mass(state, topology, inputs, chem) / G_PER_KG,
            kinetic_loss: kinetic_loss(state, chem),
            yield_gain: sum_cumulative(state, chem, |c| c.yield_gain),
            boundary_export: sum_cumulative(state, chem, |c| c.advection_out[boundary] + c.dispersion_out[boundary]),
            loads: sum_cumulative(state, chem, |c| c.advection_in[point]),
            infiltration_loss,
        }
    }
}

// ── Outlets ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutletRecord {
    pub compartment: CompartmentId,
    pub chemical: usize,
    /// Largest boundary outflux seen, g/s.
    pub peak_flux: f64,
    /// Simulation time at the end of the step that produced the peak, s.
    pub peak_time: f64,
    /// Cumulative export, kg.
    pub exported: f64,
}

/// Peak flux, time of peak and cumulative export per chemical per outlet.
#[derive(Debug, Clone, Default)]
pub struct OutletTracker {
    outlets: Vec<usize>,
    records: Vec<OutletRecord>,
}

impl OutletTracker {
    pub fn new(topology: &Topology, n_chemicals: usize) -> Self {
        let outlets = topology.outlets().to_vec();
        let records = (0..n_chemicals)
            .flat_map(|chem| {
                outlets.iter().map(move |&comp| OutletRecord {
                    compartment: topology.id(comp),
                    chemical: chem,
                    peak_flux: 0.0,
                    peak_time: 0.0,
                    exported: 0.0,
                })
            })
            .collect();
        Self { outlets, records }
    }

    /// Fold in the boundary outfluxes of the step ending at `time`.
    pub fn update(&mut self, state: &ChemState, time: f64, dt: f64) {
        let boundary = Source::Boundary.index();
        let n_outlets = self.outlets.len();
        for (r, record) in self.records.iter_mut().enumerate() {
            let comp = self.outlets[r % n_outlets];
            let f = state.fluxes(record.chemical, comp, Layer::WaterColumn);
            let flux = f.advection.outflow[boundary] + f.dispersion.outflow[boundary];
            record.exported += flux * dt / G_PER_KG;
            if flux > record.peak_flux {
                record.peak_flux = flux;
                record.peak_time = time;
            }
        }
    }

    pub fn records(&self) -> &[OutletRecord] {
        &self.records
    }

    /// Export (kg) of one chemical summed over every outlet.
    pub fn total_export(&self, chem: usize) -> f64 {
        self.records.iter().filter(|r| r.chemical == chem).map(|r| r.exported).sum()
    }
}

// ── Stations ──────────────────────────────────────────────────────────────────

/// A monitoring compartment reported by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub compartment: CompartmentId,
}

/// Water-column concentrations (g/m³) at a station, split by phase using
/// the fractions from the most recent partitioning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSnapshot {
    pub station: String,
    pub chemical: usize,
    pub time: f64,
    pub total: f64,
    pub dissolved: f64,
    pub bound: f64,
    pub particulate: f64,
}

impl Station {
    /// `None` when the station does not name a compartment of `topology`.
    pub fn snapshot(&self, topology: &Topology, state: &ChemState, chem: usize, time: f64) -> Option<StationSnapshot> {
        let comp = topology.index_of(self.compartment)?;
        let c = state.concentration(chem, comp, Layer::WaterColumn);
        let fr = state.fractions(chem, comp, Layer::WaterColumn);
        Some(StationSnapshot {
            station: self.name.clone(),
            chemical: chem,
            time,
            total: c,
            dissolved: c * fr.dissolved,
            bound: c * fr.bound,
            particulate: c * fr.particulate_total,
        })
    }
}

// ── Step report ───────────────────────────────────────────────────────────────

/// Diagnostics from one kernel step.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepReport {
    /// Simulation time at the end of the step, s.
    pub time: f64,
    pub instabilities: Vec<InstabilityEvent>,
    pub limiter_activations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forcing::{BoundaryConditions, CompartmentForcing};
    use crate::stack::LayerStack;
    use crate::state::PhaseFractions;
    use crate::topology::OverlandGrid;
    use approx::assert_relative_eq;

    #[test]
    fn accumulate_converts_grams_per_second_to_kilograms() {
        let mut f = LayerFluxes::default();
        f.advection.outflow[Source::East.index()] = 50.0;
        f.kinetic_out[Pathway::Photolysis.index()] = 2.0;
        f.yield_in = 1.0;
        let mut c = CumulativeMass::default();
        c.accumulate(&f, 10.0);
        c.accumulate(&f, 10.0);
        assert_relative_eq!(c.advection_out[Source::East.index()], 1.0);
        assert_relative_eq!(c.kinetic_total(), 0.04);
        assert_relative_eq!(c.yield_gain, 0.02);
    }

    #[test]
    fn outlet_tracker_keeps_peak_and_export() {
        let mut grid = OverlandGrid::new(1, 2, 10.0);
        grid.outlets = vec![(0, 1)];
        let topo = Topology::build(&grid, None).unwrap();
        let mut tracker = OutletTracker::new(&topo, 1);
        let mut state = ChemState::new(1, 2, 0, 0);
        let i = state.idx(0, 1, 0);

        for (step, flux) in [3.0, 8.0, 5.0].into_iter().enumerate() {
            state.fluxes[i].advection.outflow[Source::Boundary.index()] = flux;
            tracker.update(&state, (step + 1) as f64 * 2.0, 2.0);
        }
        let r = &tracker.records()[0];
        assert_eq!(r.compartment, CompartmentId::Overland { row: 0, col: 1 });
        assert_eq!(r.peak_flux, 8.0);
        assert_eq!(r.peak_time, 4.0);
        assert_relative_eq!(r.exported, 0.032);
        assert_relative_eq!(tracker.total_export(0), 0.032);
    }

    #[test]
    fn station_splits_concentration_by_phase() {
        let topo = Topology::build(&OverlandGrid::new(1, 1, 10.0), None).unwrap();
        let mut state = ChemState::new(1, 1, 0, 1);
        state.set_concentration(0, 0, Layer::WaterColumn, 10.0);
        let i = state.idx(0, 0, 0);
        state.fractions[i] = PhaseFractions {
            particulate: vec![0.5],
            particulate_total: 0.5,
            bound: 0.2,
            dissolved: 0.3,
        };
        let station = Station { name: "gauge".into(), compartment: CompartmentId::Overland { row: 0, col: 0 } };
        let snap = station.snapshot(&topo, &state, 0, 60.0).unwrap();
        assert_relative_eq!(snap.dissolved, 3.0);
        assert_relative_eq!(snap.bound, 2.0);
        assert_relative_eq!(snap.particulate, 5.0);

        let missing = Station { name: "nowhere".into(), compartment: CompartmentId::Channel { link: 0, node: 0 } };
        assert!(missing.snapshot(&topo, &state, 0, 60.0).is_none());
    }

    #[test]
    fn total_mass_counts_water_and_occupied_layers() {
        let topo = Topology::build(&OverlandGrid::new(1, 1, 10.0), None).unwrap();
        let forcing = vec![CompartmentForcing::still(0.5, 0)];
        let mut layer = crate::transport::test_support::layer(0.0, 10.0, 0);
        layer.next_volume = 8.0;
        let stacks = vec![LayerStack::new(vec![layer])];
        let bc = BoundaryConditions::default();
        let inputs = StepInputs { forcing: &forcing, stacks: &stacks, loads: &[], boundary: &bc };
        let mut state = ChemState::new(1, 1, 2, 0);
        state.set_concentration(0, 0, Layer::WaterColumn, 2.0);
        state.set_concentration(0, 0, Layer::Solid(1), 5.0);
        // Stale value in an unoccupied slot is ignored.
        state.set_concentration(0, 0, Layer::Solid(2), 99.0);
        // 50 m³ × 2 + 8 m³ × 5
        assert_relative_eq!(total_mass(&state, &topo, &inputs, 0), 140.0);
    }
}
