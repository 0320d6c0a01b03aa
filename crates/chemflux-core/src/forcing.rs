//! Per-step inputs supplied by the hydraulic, sediment and environmental
//! collaborators.
use serde::{Deserialize, Serialize};

use crate::error::{ensure_len, Result};
use crate::stack::{Environment, LayerStack};
use crate::topology::{CompartmentId, Geometry, Topology, N_SOURCES};

/// Everything the kernel needs to know about one compartment's water and
/// solids for the current step.
///
/// Flows are indexed by [`Source`](crate::topology::Source) slot.  A
/// receiving compartment's `advection_in` on a slot should equal the
/// sender's `advection_out` on the opposite slot; the kernel does not
/// repair inconsistent flow fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompartmentForcing {
    /// Water depth at the start of the step, m.
    pub depth: f64,
    /// Water depth at the end of the step, m.
    pub next_depth: f64,
    /// Volumetric inflow per slot, m³/s.
    pub advection_in: [f64; N_SOURCES],
    /// Volumetric outflow per slot, m³/s.  Slot 0 is a point withdrawal.
    pub advection_out: [f64; N_SOURCES],
    /// Dispersive exchange coefficient per slot, m³/s.
    pub dispersion: [f64; N_SOURCES],
    /// Water-column solids concentration per class, g/m³.
    pub solids: Vec<f64>,
    /// Settling flow per class, m³/s.
    pub deposition_flow: Vec<f64>,
    /// Bed erosion flow per class, m³/s.
    pub erosion_flow: Vec<f64>,
    /// Infiltration (overland) or transmission loss (channel) rate, m/s.
    pub infiltration_rate: f64,
    /// Wetting-front elevation, m; `None` before the front forms.
    pub wetting_front: Option<f64>,
    /// Gross floodplain flow from an overland cell to its channel, m³/s.
    /// Only read on overland cells.
    pub floodplain_to_channel: f64,
    /// Gross floodplain flow from the channel back onto the cell, m³/s.
    pub floodplain_to_overland: f64,
    pub environment: Environment,
}

impl CompartmentForcing {
    /// Forcing with a constant depth and no flows.
    pub fn still(depth: f64, n_classes: usize) -> Self {
        Self {
            depth,
            next_depth: depth,
            solids: vec![0.0; n_classes],
            deposition_flow: vec![0.0; n_classes],
            erosion_flow: vec![0.0; n_classes],
            ..Default::default()
        }
    }

    pub fn water_volume(&self, geometry: &Geometry) -> f64 {
        geometry.water_volume(self.depth)
    }

    pub fn next_water_volume(&self, geometry: &Geometry) -> f64 {
        geometry.water_volume(self.next_depth)
    }
}

// ── Loads and boundary conditions ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadKind {
    /// Direct mass load, g/s.
    Mass { rate: f64 },
    /// Inflow carrying a concentration, m³/s × g/m³.
    FlowConcentration { flow: f64, concentration: f64 },
    /// Areal load, g/m²/s over the compartment's bed area.
    Distributed { rate_per_area: f64 },
}

/// External load registered against one compartment's water column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointLoad {
    pub compartment: CompartmentId,
    pub chemical: usize,
    #[serde(flatten)]
    pub kind: LoadKind,
}

impl PointLoad {
    /// Mass rate (g/s) delivered to a compartment with the given bed area.
    pub fn mass_rate(&self, area: f64) -> f64 {
        match self.kind {
            LoadKind::Mass { rate } => rate,
            LoadKind::FlowConcentration { flow, concentration } => flow * concentration,
            LoadKind::Distributed { rate_per_area } => rate_per_area * area,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryConcentration {
    pub compartment: CompartmentId,
    pub chemical: usize,
    /// g/m³
    pub concentration: f64,
}

/// Boundary-condition concentrations at declared outlets; unspecified
/// entries are zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundaryConditions {
    pub entries: Vec<BoundaryConcentration>,
}

impl BoundaryConditions {
    pub fn concentration(&self, compartment: CompartmentId, chemical: usize) -> f64 {
        self.entries
            .iter()
            .find(|e| e.compartment == compartment && e.chemical == chemical)
            .map_or(0.0, |e| e.concentration)
    }
}

// ── Step bundle ───────────────────────────────────────────────────────────────

/// Borrowed view of all collaborator inputs for one step.
#[derive(Debug, Clone, Copy)]
pub struct StepInputs<'a> {
    pub forcing: &'a [CompartmentForcing],
    pub stacks: &'a [LayerStack],
    pub loads: &'a [PointLoad],
    pub boundary: &'a BoundaryConditions,
}

impl StepInputs<'_> {
    /// Check every per-compartment record against the topology and the
    /// number of solids classes.
    pub fn validate(&self, topology: &Topology, n_classes: usize) -> Result<()> {
        ensure_len("forcing records", topology.len(), self.forcing.len())?;
        ensure_len("layer stacks", topology.len(), self.stacks.len())?;
        for f in self.forcing {
            ensure_len("water-column solids classes", n_classes, f.solids.len())?;
            ensure_len("deposition flow classes", n_classes, f.deposition_flow.len())?;
            ensure_len("erosion flow classes", n_classes, f.erosion_flow.len())?;
        }
        for stack in self.stacks {
            for layer in &stack.layers {
                ensure_len("layer solids classes", n_classes, layer.solids.len())?;
            }
        }
        Ok(())
    }

    /// Aggregate mass rate of every load on `compartment` for `chemical`.
    pub fn load_rate(&self, topology: &Topology, compartment: usize, chemical: usize) -> f64 {
        let id = topology.id(compartment);
        let area = topology.geometry(compartment).bed_area();
        self.loads
            .iter()
            .filter(|l| l.chemical == chemical && l.compartment == id)
            .map(|l| l.mass_rate(area))
            .sum()
    }
}
