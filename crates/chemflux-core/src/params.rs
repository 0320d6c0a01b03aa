//! Model configuration: solids classes, chemical species, kinetic pathways,
//! the yield table and kernel-wide numerical settings.
//!
//! Everything here is plain serde data with defaults, validated once as a
//! whole by [`ModelConfig::validate`] before a kernel is built.
use serde::{Deserialize, Serialize};

use crate::error::{ensure_len, KernelError, Result};
use crate::topology::Layer;

/// Density of water in g/m³.
pub const WATER_DENSITY: f64 = 1.0e6;

/// g/m³ → kg/L, the unit the partition coefficients (L/kg) expect.
pub const G_PER_M3_TO_KG_PER_L: f64 = 1.0e-6;

/// Grams per kilogram, for cumulative reporting.
pub const G_PER_KG: f64 = 1.0e3;

// ── Kernel settings ───────────────────────────────────────────────────────────

/// Numerical settings that apply to every chemical.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Multiplier on the porewater released when erosion shrinks a layer.
    pub erosion_porewater_scale: f64,
    /// Negative masses (g) smaller than this are treated as round-off.
    pub instability_tolerance: f64,
    /// Particle-interaction parameter applied to water-column partitioning.
    /// Zero or negative disables the correction.
    pub particle_interaction: f64,
    /// Reference temperature (°C) for theta-style temperature corrections.
    pub reference_temperature: f64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            erosion_porewater_scale: 1.0,
            instability_tolerance: 1.0e-6,
            particle_interaction: 1.4,
            reference_temperature: 20.0,
        }
    }
}

// ── Solids ────────────────────────────────────────────────────────────────────

/// One particle-size / composition class tracked by the solids engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolidsClass {
    pub name: String,
    /// Particle diameter in metres.
    pub diameter: f64,
    pub specific_gravity: f64,
    /// Fraction organic carbon, used by organic-carbon-normalised partitioning.
    #[serde(default)]
    pub f_oc: f64,
    /// Set when this class is a pure-phase chemical that dissolves.
    #[serde(default)]
    pub dissolution: Option<DissolutionSpec>,
}

impl SolidsClass {
    /// Particle density in g/m³.
    pub fn particle_density(&self) -> f64 {
        self.specific_gravity * WATER_DENSITY
    }
}

/// Pure-phase dissolution of a solids class into a dissolved chemical.
///
/// The rates are mass-transfer coefficients (m/s) applied to the particle
/// surface area; the chemical's solubility bounds the driving deficit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DissolutionSpec {
    /// Chemical whose solubility deficit drives dissolution.
    pub chemical: usize,
    pub rates: DomainRates,
}

// ── Chemicals ─────────────────────────────────────────────────────────────────

/// Partitioning convention for a chemical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PartitionMode {
    /// Entirely dissolved.
    None,
    /// Solids-mass based: one coefficient (L/kg) per solids class.
    SolidsMass { kp: Vec<f64> },
    /// Organic-carbon normalised: kp = koc · f_oc of each class.
    OrganicCarbon { koc: f64 },
}

impl PartitionMode {
    /// Raw partition coefficient (L/kg) for one solids class.
    pub fn coefficient(&self, class: usize, solids: &SolidsClass) -> f64 {
        match self {
            PartitionMode::None => 0.0,
            PartitionMode::SolidsMass { kp } => kp[class],
            PartitionMode::OrganicCarbon { koc } => koc * solids.f_oc,
        }
    }
}

/// A rate constant with separate values for the water column and the
/// solid layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainRates {
    pub water: f64,
    pub solid: f64,
}

impl DomainRates {
    pub fn new(water: f64, solid: f64) -> Self {
        Self { water, solid }
    }

    fn check(&self, what: &str) -> Result<()> {
        non_negative(&format!("{what} water rate"), self.water)?;
        non_negative(&format!("{what} solid rate"), self.solid)
    }

    pub fn for_layer(&self, layer: Layer) -> f64 {
        match layer {
            Layer::WaterColumn => self.water,
            Layer::Solid(_) => self.solid,
        }
    }
}

fn default_theta() -> f64 {
    1.0
}

/// Rejects negative and non-finite coefficients.
fn non_negative(what: &str, value: f64) -> Result<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(KernelError::InvalidConfig(format!("{what} must be a non-negative number, got {value}")))
    }
}

fn positive_theta(what: &str, theta: f64) -> Result<()> {
    if theta > 0.0 && theta.is_finite() {
        Ok(())
    } else {
        Err(KernelError::InvalidConfig(format!("{what} theta must be positive, got {theta}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiodegradationSpec {
    pub rates: DomainRates,
    /// When set the rates are second order and multiplied by the local
    /// bacteria concentration.
    #[serde(default)]
    pub bacteria_scaled: bool,
    #[serde(default = "default_theta")]
    pub theta: f64,
}

/// Acid/neutral/base catalysed hydrolysis constants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydrolysisRates {
    pub neutral: f64,
    pub acid: f64,
    pub base: f64,
}

impl HydrolysisRates {
    fn check(&self, what: &str) -> Result<()> {
        non_negative(&format!("{what} neutral rate"), self.neutral)?;
        non_negative(&format!("{what} acid rate"), self.acid)?;
        non_negative(&format!("{what} base rate"), self.base)
    }

    /// Effective first-order rate (1/s) at the given pH.
    pub fn at_ph(&self, ph: f64) -> f64 {
        let h = 10f64.powf(-ph);
        let oh = 10f64.powf(ph - 14.0);
        self.neutral + self.acid * h + self.base * oh
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HydrolysisSpec {
    pub water: HydrolysisRates,
    pub solid: HydrolysisRates,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDefinedSpec {
    pub rates: DomainRates,
    #[serde(default = "default_theta")]
    pub theta: f64,
}

/// Enabled reaction pathways of one chemical.  `None` disables a pathway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KineticsSpec {
    pub biodegradation: Option<BiodegradationSpec>,
    pub hydrolysis: Option<HydrolysisSpec>,
    /// Second order in the oxidant concentration.
    pub oxidation: Option<DomainRates>,
    /// Scaled by the local light factor.
    pub photolysis: Option<DomainRates>,
    pub radioactive: Option<DomainRates>,
    /// Acts on the dissolved phase only.
    pub volatilization: Option<DomainRates>,
    pub user_defined: Option<UserDefinedSpec>,
}

impl KineticsSpec {
    fn check(&self, chem: &str) -> Result<()> {
        if let Some(b) = &self.biodegradation {
            b.rates.check(&format!("'{chem}' biodegradation"))?;
            positive_theta(&format!("'{chem}' biodegradation"), b.theta)?;
        }
        if let Some(h) = &self.hydrolysis {
            h.water.check(&format!("'{chem}' water hydrolysis"))?;
            h.solid.check(&format!("'{chem}' solid hydrolysis"))?;
        }
        let simple = [
            ("oxidation", &self.oxidation),
            ("photolysis", &self.photolysis),
            ("radioactive", &self.radioactive),
            ("volatilization", &self.volatilization),
        ];
        for (name, rates) in simple {
            if let Some(r) = rates {
                r.check(&format!("'{chem}' {name}"))?;
            }
        }
        if let Some(u) = &self.user_defined {
            u.rates.check(&format!("'{chem}' user-defined"))?;
            positive_theta(&format!("'{chem}' user-defined"), u.theta)?;
        }
        Ok(())
    }

    pub fn is_enabled(&self, pathway: Pathway) -> bool {
        match pathway {
            Pathway::Biodegradation => self.biodegradation.is_some(),
            Pathway::Hydrolysis => self.hydrolysis.is_some(),
            Pathway::Oxidation => self.oxidation.is_some(),
            Pathway::Photolysis => self.photolysis.is_some(),
            Pathway::Radioactive => self.radioactive.is_some(),
            Pathway::Volatilization => self.volatilization.is_some(),
            Pathway::UserDefined => self.user_defined.is_some(),
            Pathway::Dissolution => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChemicalSpec {
    pub name: String,
    pub partition: PartitionMode,
    /// DOC binding coefficient (L/kg).
    #[serde(default)]
    pub kb: f64,
    #[serde(default)]
    pub kinetics: KineticsSpec,
    /// Solubility limit (g/m³); `None` means unlimited.
    #[serde(default)]
    pub solubility: Option<f64>,
}

impl ChemicalSpec {
    /// A conservative, fully dissolved tracer.
    pub fn tracer(name: &str) -> Self {
        Self {
            name: name.to_string(),
            partition: PartitionMode::None,
            kb: 0.0,
            kinetics: KineticsSpec::default(),
            solubility: None,
        }
    }
}

// ── Pathways and yields ───────────────────────────────────────────────────────

/// Kinetic reaction pathways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pathway {
    Biodegradation,
    Hydrolysis,
    Oxidation,
    Photolysis,
    Radioactive,
    Volatilization,
    UserDefined,
    Dissolution,
}

impl Pathway {
    pub const COUNT: usize = 8;

    pub const ALL: [Pathway; Self::COUNT] = [
        Pathway::Biodegradation,
        Pathway::Hydrolysis,
        Pathway::Oxidation,
        Pathway::Photolysis,
        Pathway::Radioactive,
        Pathway::Volatilization,
        Pathway::UserDefined,
        Pathway::Dissolution,
    ];

    /// The seven pathways that consume chemical mass directly.
    pub const CHEMICAL: [Pathway; 7] = [
        Pathway::Biodegradation,
        Pathway::Hydrolysis,
        Pathway::Oxidation,
        Pathway::Photolysis,
        Pathway::Radioactive,
        Pathway::Volatilization,
        Pathway::UserDefined,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Stoichiometric transfer of a pathway's loss into another chemical.
///
/// For [`Pathway::Dissolution`] `from` is a solids-class index; for every
/// other pathway it is a chemical index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldEntry {
    pub from: usize,
    pub to: usize,
    pub pathway: Pathway,
    pub fraction: f64,
}

// ── Whole model ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kernel: KernelConfig,
    pub solids: Vec<SolidsClass>,
    pub chemicals: Vec<ChemicalSpec>,
    pub yields: Vec<YieldEntry>,
}

impl ModelConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let model: ModelConfig = serde_json::from_str(text)
            .map_err(|e| KernelError::InvalidConfig(format!("model JSON: {e}")))?;
        model.validate()?;
        Ok(model)
    }

    pub fn n_chemicals(&self) -> usize {
        self.chemicals.len()
    }

    pub fn n_classes(&self) -> usize {
        self.solids.len()
    }

    /// Check every cross-reference and count in the configuration.
    pub fn validate(&self) -> Result<()> {
        let k = &self.kernel;
        if !(k.instability_tolerance > 0.0) {
            return Err(KernelError::InvalidConfig(format!(
                "instability tolerance must be positive, got {}",
                k.instability_tolerance
            )));
        }
        if k.erosion_porewater_scale < 0.0 {
            return Err(KernelError::InvalidConfig(format!(
                "erosion porewater scale must be non-negative, got {}",
                k.erosion_porewater_scale
            )));
        }

        for class in &self.solids {
            if !(class.diameter > 0.0) || !(class.specific_gravity > 0.0) {
                return Err(KernelError::InvalidConfig(format!(
                    "solids class '{}' needs positive diameter and specific gravity",
                    class.name
                )));
            }
            non_negative(&format!("solids class '{}' organic carbon fraction", class.name), class.f_oc)?;
            if let Some(d) = &class.dissolution {
                d.rates.check(&format!("solids class '{}' dissolution", class.name))?;
                if d.chemical >= self.chemicals.len() {
                    return Err(KernelError::InvalidConfig(format!(
                        "solids class '{}' dissolves into unknown chemical {}",
                        class.name, d.chemical
                    )));
                }
                if self.chemicals[d.chemical].solubility.is_none() {
                    return Err(KernelError::InvalidConfig(format!(
                        "chemical '{}' receives dissolution but has no solubility",
                        self.chemicals[d.chemical].name
                    )));
                }
            }
        }

        for chem in &self.chemicals {
            match &chem.partition {
                PartitionMode::None => {}
                PartitionMode::SolidsMass { kp } => {
                    ensure_len("partition coefficients per solids class", self.solids.len(), kp.len())?;
                    for (i, v) in kp.iter().enumerate() {
                        non_negative(&format!("'{}' kp for class {i}", chem.name), *v)?;
                    }
                }
                PartitionMode::OrganicCarbon { koc } => non_negative(&format!("'{}' koc", chem.name), *koc)?,
            }
            non_negative(&format!("'{}' kb", chem.name), chem.kb)?;
            if let Some(sol) = chem.solubility {
                non_negative(&format!("'{}' solubility", chem.name), sol)?;
            }
            chem.kinetics.check(&chem.name)?;
        }

        for y in &self.yields {
            let from_limit = if y.pathway == Pathway::Dissolution {
                self.solids.len()
            } else {
                self.chemicals.len()
            };
            if y.from >= from_limit || y.to >= self.chemicals.len() {
                return Err(KernelError::InvalidConfig(format!(
                    "yield {:?} {} -> {} refers to an unknown species",
                    y.pathway, y.from, y.to
                )));
            }
            if y.fraction < 0.0 {
                return Err(KernelError::InvalidConfig(format!(
                    "yield {:?} {} -> {} has negative fraction {}",
                    y.pathway, y.from, y.to, y.fraction
                )));
            }
        }
        Ok(())
    }
}
