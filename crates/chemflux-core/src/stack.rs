//! Layered solid stack beneath each compartment, and the environmental
//! properties that drive kinetics.
//!
//! The stack is owned by the sediment manager: it pushes and pops layers and
//! sets current/next volumes.  The chemical kernel only reads it, apart from
//! the saturation helper that interpolates the wetting front.
use serde::{Deserialize, Serialize};

/// Environmental scalars for one water column or solid layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    /// °C
    pub temperature: f64,
    pub ph: f64,
    /// Dissolved organic carbon, g/m³.
    pub doc: f64,
    /// Fraction of DOC effective for binding.
    pub doc_binding_fraction: f64,
    /// Oxidant concentration for second-order oxidation.
    pub oxidant: f64,
    /// Bacteria concentration for second-order biodegradation.
    pub bacteria: f64,
    /// Relative light intensity for photolysis, 0–1.
    pub light: f64,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            temperature: 20.0,
            ph: 7.0,
            doc: 0.0,
            doc_binding_fraction: 1.0,
            oxidant: 0.0,
            bacteria: 0.0,
            light: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolidLayer {
    /// m
    pub thickness: f64,
    /// Current volume, m³.
    pub volume: f64,
    /// Volume at the end of the step after erosion/deposition, m³.
    pub next_volume: f64,
    /// Elevation of the layer's lower boundary, m.
    pub elevation_bottom: f64,
    pub porosity: f64,
    /// Volumetric moisture content before wetting.
    #[serde(default)]
    pub initial_moisture: f64,
    /// Fraction of the layer the wetting front has saturated, 0–1.
    #[serde(default)]
    pub saturation: f64,
    /// Solids concentration per class, g/m³ of layer volume.
    pub solids: Vec<f64>,
    #[serde(default)]
    pub environment: Environment,
}

impl SolidLayer {
    pub fn elevation_top(&self) -> f64 {
        self.elevation_bottom + self.thickness
    }

    /// Water-filled porosity between initial moisture and full saturation.
    pub fn water_filled_porosity(&self) -> f64 {
        let theta = self.initial_moisture.min(self.porosity);
        (theta + self.saturation.clamp(0.0, 1.0) * (self.porosity - theta)).max(0.0)
    }

    /// Portion of the layer above the wetting front.
    pub fn saturation_from_front(&self, front: f64) -> f64 {
        if self.thickness <= 0.0 {
            return if front <= self.elevation_bottom { 1.0 } else { 0.0 };
        }
        ((self.elevation_top() - front) / self.thickness).clamp(0.0, 1.0)
    }

    /// The front has passed the lower boundary of this layer.
    pub fn is_crossed_by(&self, front: f64) -> bool {
        front <= self.elevation_bottom
    }
}

/// Solid layers of one compartment, deepest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerStack {
    pub layers: Vec<SolidLayer>,
}

impl LayerStack {
    pub fn new(layers: Vec<SolidLayer>) -> Self {
        Self { layers }
    }

    /// Number of occupied layers; also the index of the surface layer.
    pub fn nstack(&self) -> usize {
        self.layers.len()
    }

    /// Layer `k`, 1-based from the bottom.
    pub fn layer(&self, k: usize) -> Option<&SolidLayer> {
        k.checked_sub(1).and_then(|i| self.layers.get(i))
    }

    pub fn surface(&self) -> Option<&SolidLayer> {
        self.layers.last()
    }

    /// Set every layer's saturation from the wetting-front elevation.
    pub fn update_saturation(&mut self, front: f64) {
        for layer in &mut self.layers {
            layer.saturation = layer.saturation_from_front(front);
        }
    }
}
