//! Simulation state owned by the chemical kernel.
//!
//! All per-(chemical, compartment, layer) arrays live in one [`ChemState`],
//! laid out chemical-major, then compartment, then layer.  Layer slot 0 is
//! the water column; slots `1..=max_stack` are solid layers.
use serde::Serialize;

use crate::error::{ensure_len, Result};
use crate::params::Pathway;
use crate::report::CumulativeMass;
use crate::topology::{Layer, N_SOURCES};

// ── Phase fractions ───────────────────────────────────────────────────────────

/// Distribution of a chemical between phases in one layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseFractions {
    /// Fraction sorbed to each solids class.
    pub particulate: Vec<f64>,
    /// Sum of `particulate`, pinned to exactly 1.0 after rescaling.
    pub particulate_total: f64,
    /// Fraction bound to dissolved organic carbon.
    pub bound: f64,
    pub dissolved: f64,
}

impl PhaseFractions {
    pub fn dissolved_only(n_classes: usize) -> Self {
        Self {
            particulate: vec![0.0; n_classes],
            particulate_total: 0.0,
            bound: 0.0,
            dissolved: 1.0,
        }
    }

    /// Dissolved plus bound: the phases that move with water.
    #[inline]
    pub fn mobile(&self) -> f64 {
        self.dissolved + self.bound
    }

    pub fn total(&self) -> f64 {
        self.particulate_total + self.bound + self.dissolved
    }
}

// ── Fluxes ────────────────────────────────────────────────────────────────────

/// In/out rates (g/s) for every source slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SourceFluxes {
    pub inflow: [f64; N_SOURCES],
    pub outflow: [f64; N_SOURCES],
}

impl SourceFluxes {
    pub fn total_in(&self) -> f64 {
        self.inflow.iter().sum()
    }

    pub fn total_out(&self) -> f64 {
        self.outflow.iter().sum()
    }
}

/// Every flux (g/s) computed for one chemical in one layer this step.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayerFluxes {
    /// Lateral advection; slot 9 carries floodplain transfer.
    pub advection: SourceFluxes,
    pub dispersion: SourceFluxes,
    pub deposition_in: f64,
    pub deposition_out: f64,
    pub erosion_in: f64,
    pub erosion_out: f64,
    pub infiltration_in: f64,
    pub infiltration_out: f64,
    pub porewater_in: f64,
    pub porewater_out: f64,
    /// Loss per pathway.  The dissolution slot stays zero here: dissolution
    /// removes solids, tracked in [`ChemState::dissolution_outflux`].
    pub kinetic_out: [f64; Pathway::COUNT],
    /// Gain from other species' reactions through the yield table.
    pub yield_in: f64,
}

impl LayerFluxes {
    /// Outflux already committed to the seven chemical reaction pathways.
    pub fn kinetic_committed(&self) -> f64 {
        Pathway::CHEMICAL.iter().map(|p| self.kinetic_out[p.index()]).sum()
    }

    pub fn total_in(&self) -> f64 {
        self.advection.total_in()
            + self.dispersion.total_in()
            + self.deposition_in
            + self.erosion_in
            + self.infiltration_in
            + self.porewater_in
            + self.yield_in
    }

    pub fn total_out(&self) -> f64 {
        self.advection.total_out()
            + self.dispersion.total_out()
            + self.deposition_out
            + self.erosion_out
            + self.infiltration_out
            + self.porewater_out
            + self.kinetic_committed()
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ChemState {
    n_chemicals: usize,
    n_compartments: usize,
    n_layers: usize,
    n_classes: usize,
    pub(crate) concentration: Vec<f64>,
    pub(crate) fractions: Vec<PhaseFractions>,
    pub(crate) fluxes: Vec<LayerFluxes>,
    pub(crate) cumulative: Vec<CumulativeMass>,
    /// Solids outflux (g/s) per (class, compartment, layer).
    pub(crate) dissolution: Vec<f64>,
}

impl ChemState {
    /// Zero concentrations for `max_stack` solid layers under every
    /// compartment.
    pub fn new(n_chemicals: usize, n_compartments: usize, max_stack: usize, n_classes: usize) -> Self {
        let n_layers = max_stack + 1;
        let n = n_chemicals * n_compartments * n_layers;
        Self {
            n_chemicals,
            n_compartments,
            n_layers,
            n_classes,
            concentration: vec![0.0; n],
            fractions: vec![PhaseFractions::dissolved_only(n_classes); n],
            fluxes: vec![LayerFluxes::default(); n],
            cumulative: vec![CumulativeMass::default(); n],
            dissolution: vec![0.0; n_classes * n_compartments * n_layers],
        }
    }

    pub fn n_chemicals(&self) -> usize {
        self.n_chemicals
    }

    pub fn n_compartments(&self) -> usize {
        self.n_compartments
    }

    /// Water column plus the maximum number of solid layers.
    pub fn n_layers(&self) -> usize {
        self.n_layers
    }

    pub fn max_stack(&self) -> usize {
        self.n_layers - 1
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    #[inline]
    pub(crate) fn idx(&self, chem: usize, comp: usize, layer: usize) -> usize {
        debug_assert!(chem < self.n_chemicals && comp < self.n_compartments && layer < self.n_layers);
        (chem * self.n_compartments + comp) * self.n_layers + layer
    }

    #[inline]
    pub(crate) fn class_idx(&self, class: usize, comp: usize, layer: usize) -> usize {
        (class * self.n_compartments + comp) * self.n_layers + layer
    }

    pub fn concentration(&self, chem: usize, comp: usize, layer: Layer) -> f64 {
        self.concentration[self.idx(chem, comp, layer.index())]
    }

    pub fn set_concentration(&mut self, chem: usize, comp: usize, layer: Layer, value: f64) {
        let i = self.idx(chem, comp, layer.index());
        self.concentration[i] = value;
    }

    pub fn fractions(&self, chem: usize, comp: usize, layer: Layer) -> &PhaseFractions {
        &self.fractions[self.idx(chem, comp, layer.index())]
    }

    pub fn fluxes(&self, chem: usize, comp: usize, layer: Layer) -> &LayerFluxes {
        &self.fluxes[self.idx(chem, comp, layer.index())]
    }

    pub fn cumulative(&self, chem: usize, comp: usize, layer: Layer) -> &CumulativeMass {
        &self.cumulative[self.idx(chem, comp, layer.index())]
    }

    /// Solids mass leaving `class` by dissolution this step, g/s.
    pub fn dissolution_outflux(&self, class: usize, comp: usize, layer: Layer) -> f64 {
        self.dissolution[self.class_idx(class, comp, layer.index())]
    }

    /// Set one chemical's concentration in one layer of every compartment.
    pub fn fill_layer(&mut self, chem: usize, layer: Layer, value: f64) {
        for comp in 0..self.n_compartments {
            self.set_concentration(chem, comp, layer, value);
        }
    }

    /// Flat per-compartment concentration field (topology order) for one
    /// chemical and layer, the layout the restart files use.
    pub fn layer_field(&self, chem: usize, layer: Layer) -> Vec<f64> {
        (0..self.n_compartments)
            .map(|comp| self.concentration(chem, comp, layer))
            .collect()
    }

    pub fn set_layer_field(&mut self, chem: usize, layer: Layer, values: &[f64]) -> Result<()> {
        ensure_len("concentration field compartments", self.n_compartments, values.len())?;
        for (comp, &v) in values.iter().enumerate() {
            self.set_concentration(chem, comp, layer, v);
        }
        Ok(())
    }

    pub(crate) fn clear_fluxes(&mut self) {
        self.fluxes.fill(LayerFluxes::default());
        self.dissolution.fill(0.0);
    }
}
