//! Scenario documents: a model, a domain, initial conditions and constant
//! forcing, plus the run loop and summary that drive the kernel with them.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use chemflux_core::forcing::{BoundaryConditions, CompartmentForcing, PointLoad, StepInputs};
use chemflux_core::grid_io::{export_layer, import_layer, AsciiGrid, ChannelField};
use chemflux_core::params::ModelConfig;
use chemflux_core::report::{MassBalance, OutletRecord, Station, StationSnapshot};
use chemflux_core::stack::{LayerStack, SolidLayer};
use chemflux_core::state::ChemState;
use chemflux_core::topology::{ChannelNetwork, CompartmentId, Layer, OverlandGrid, Topology};
use chemflux_core::TransportKernel;

fn default_dt() -> f64 {
    60.0
}

fn default_steps() -> usize {
    60
}

fn water_column() -> Layer {
    Layer::WaterColumn
}

// ── Scenario JSON ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub model: ModelConfig,
    pub grid: OverlandGrid,
    #[serde(default)]
    pub network: Option<ChannelNetwork>,
    #[serde(default = "default_dt")]
    pub dt: f64,
    #[serde(default = "default_steps")]
    pub steps: usize,
    #[serde(default)]
    pub initial: Vec<InitialConcentration>,
    #[serde(default)]
    pub initial_grids: Vec<InitialGrid>,
    /// Forcing applied to every overland cell without an override.
    #[serde(default)]
    pub overland_forcing: CompartmentForcing,
    /// Forcing applied to every channel node without an override; falls
    /// back to `overland_forcing`.
    #[serde(default)]
    pub channel_forcing: Option<CompartmentForcing>,
    #[serde(default)]
    pub forcing: Vec<ForcingOverride>,
    /// Layer template copied under every compartment, deepest first.
    #[serde(default)]
    pub stack: Vec<SolidLayer>,
    #[serde(default)]
    pub loads: Vec<PointLoad>,
    #[serde(default)]
    pub boundary: BoundaryConditions,
    #[serde(default)]
    pub stations: Vec<Station>,
}

/// Uniform starting concentration, g/m³.
#[derive(Debug, Deserialize)]
pub struct InitialConcentration {
    pub chemical: usize,
    #[serde(default = "water_column")]
    pub layer: Layer,
    /// Every compartment when absent.
    #[serde(default)]
    pub compartment: Option<CompartmentId>,
    pub concentration: f64,
}

/// Starting concentrations read from an ASCII grid and, optionally, a
/// channel field.  Paths are relative to the scenario file.
#[derive(Debug, Deserialize)]
pub struct InitialGrid {
    pub chemical: usize,
    #[serde(default = "water_column")]
    pub layer: Layer,
    pub grid: PathBuf,
    #[serde(default)]
    pub channels: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct ForcingOverride {
    pub compartment: CompartmentId,
    pub forcing: CompartmentForcing,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Resolve the domain and set up kernel, state and inputs.  Relative
    /// grid paths resolve against `base`.
    pub fn build(self, base: &Path) -> Result<Run> {
        let topology = Topology::build(&self.grid, self.network.as_ref()).context("Invalid domain")?;
        let n_classes = self.model.n_classes();
        let kernel = TransportKernel::new(self.model, topology).context("Invalid model")?;
        let topology = kernel.topology();

        let overland = sized(self.overland_forcing, n_classes);
        let channel = self.channel_forcing.map(|f| sized(f, n_classes)).unwrap_or_else(|| overland.clone());
        let mut forcing: Vec<CompartmentForcing> = (0..topology.len())
            .map(|i| if topology.is_channel(i) { channel.clone() } else { overland.clone() })
            .collect();
        for o in self.forcing {
            let i = topology
                .index_of(o.compartment)
                .with_context(|| format!("Forcing override for unknown compartment {:?}", o.compartment))?;
            forcing[i] = sized(o.forcing, n_classes);
        }

        let mut stacks = vec![LayerStack::new(self.stack); topology.len()];
        for (stack, f) in stacks.iter_mut().zip(&forcing) {
            if let Some(front) = f.wetting_front {
                stack.update_saturation(front);
            }
        }

        let max_stack = stacks.iter().map(LayerStack::nstack).max().unwrap_or(0);
        let mut state = kernel.new_state(max_stack);
        let n_chemicals = kernel.model().n_chemicals();
        for ic in &self.initial {
            check_target(ic.chemical, ic.layer, n_chemicals, max_stack)?;
            match ic.compartment {
                Some(id) => {
                    let comp = topology
                        .index_of(id)
                        .with_context(|| format!("Initial condition for unknown compartment {id:?}"))?;
                    state.set_concentration(ic.chemical, comp, ic.layer, ic.concentration);
                }
                None => state.fill_layer(ic.chemical, ic.layer, ic.concentration),
            }
        }
        for ig in &self.initial_grids {
            check_target(ig.chemical, ig.layer, n_chemicals, max_stack)?;
            let path = base.join(&ig.grid);
            let grid = AsciiGrid::load(&path).with_context(|| format!("Cannot load grid {}", path.display()))?;
            let channels = match &ig.channels {
                Some(p) => {
                    let path = base.join(p);
                    Some(ChannelField::load(&path).with_context(|| format!("Cannot load channel field {}", path.display()))?)
                }
                None => None,
            };
            import_layer(topology, &mut state, ig.chemical, ig.layer, &grid, channels.as_ref())
                .with_context(|| format!("Initial grid {} does not fit the domain", path.display()))?;
        }

        Ok(Run {
            kernel,
            state,
            forcing,
            stacks,
            loads: self.loads,
            boundary: self.boundary,
            stations: self.stations,
            instabilities: 0,
            limiter_activations: 0,
            steps: 0,
        })
    }
}

/// Fill per-class vectors left empty in a forcing record.
fn sized(mut f: CompartmentForcing, n_classes: usize) -> CompartmentForcing {
    for v in [&mut f.solids, &mut f.deposition_flow, &mut f.erosion_flow] {
        if v.is_empty() {
            v.resize(n_classes, 0.0);
        }
    }
    f
}

fn check_target(chemical: usize, layer: Layer, n_chemicals: usize, max_stack: usize) -> Result<()> {
    if chemical >= n_chemicals {
        bail!("Initial condition names chemical {chemical}, model has {n_chemicals}");
    }
    if layer.index() > max_stack {
        bail!("Initial condition names {layer:?}, stack has {max_stack} layers");
    }
    Ok(())
}

// ── Run loop ──────────────────────────────────────────────────────────────────

pub struct Run {
    pub kernel: TransportKernel,
    pub state: ChemState,
    forcing: Vec<CompartmentForcing>,
    stacks: Vec<LayerStack>,
    loads: Vec<PointLoad>,
    boundary: BoundaryConditions,
    stations: Vec<Station>,
    instabilities: usize,
    limiter_activations: usize,
    steps: usize,
}

impl Run {
    fn inputs(&self) -> StepInputs<'_> {
        StepInputs {
            forcing: &self.forcing,
            stacks: &self.stacks,
            loads: &self.loads,
            boundary: &self.boundary,
        }
    }

    pub fn advance(&mut self, steps: usize, dt: f64) -> Result<()> {
        let inputs = StepInputs {
            forcing: &self.forcing,
            stacks: &self.stacks,
            loads: &self.loads,
            boundary: &self.boundary,
        };
        let every = (steps / 10).max(1);
        for n in 1..=steps {
            let report = self
                .kernel
                .step(&mut self.state, &inputs, dt)
                .with_context(|| format!("Step {n} failed"))?;
            self.instabilities += report.instabilities.len();
            self.limiter_activations += report.limiter_activations;
            self.steps += 1;
            if n % every == 0 || n == steps {
                log::info!(
                    "step {n}/{steps}  t = {:.1} s  limiter activations {}  instabilities {}",
                    report.time,
                    self.limiter_activations,
                    self.instabilities
                );
            }
        }
        Ok(())
    }

    pub fn summary(&self, dt: f64) -> RunSummary {
        let inputs = self.inputs();
        let model = self.kernel.model();
        let topology = self.kernel.topology();
        let time = self.kernel.time();
        let chemicals = model
            .chemicals
            .iter()
            .enumerate()
            .map(|(chem, spec)| ChemicalSummary {
                name: spec.name.clone(),
                balance: MassBalance::compute(&self.state, topology, &inputs, chem),
            })
            .collect();
        let stations = self
            .stations
            .iter()
            .flat_map(|s| (0..model.n_chemicals()).filter_map(move |chem| s.snapshot(topology, &self.state, chem, time)))
            .collect();
        RunSummary {
            steps: self.steps,
            dt,
            time,
            chemicals,
            outlets: self.kernel.outlets().records().to_vec(),
            stations,
            instabilities: self.instabilities,
            limiter_activations: self.limiter_activations,
        }
    }

    /// Write the concentration of every chemical in every layer to `dir`.
    pub fn write_grids(&self, dir: &Path) -> Result<usize> {
        fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
        let topology = self.kernel.topology();
        let mut written = 0;
        for (chem, spec) in self.kernel.model().chemicals.iter().enumerate() {
            for l in 0..=self.state.max_stack() {
                let layer = Layer::from_index(l);
                let tag = match layer {
                    Layer::WaterColumn => "water".to_string(),
                    Layer::Solid(k) => format!("solid{k}"),
                };
                let (grid, channels) = export_layer(topology, &self.state, chem, layer)?;
                let stem = format!("{}_{tag}", spec.name);
                grid.save(dir.join(format!("{stem}.asc")))?;
                written += 1;
                if let Some(ch) = channels {
                    ch.save(dir.join(format!("{stem}.chan")))?;
                    written += 1;
                }
            }
        }
        Ok(written)
    }
}

// ── Summary ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ChemicalSummary {
    pub name: String,
    #[serde(flatten)]
    pub balance: MassBalance,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub steps: usize,
    pub dt: f64,
    /// Final simulation time, s.
    pub time: f64,
    pub chemicals: Vec<ChemicalSummary>,
    pub outlets: Vec<OutletRecord>,
    pub stations: Vec<StationSnapshot>,
    pub instabilities: usize,
    pub limiter_activations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTLET_ROW: &str = r#"{
        "model": {
            "chemicals": [
                { "name": "tracer", "partition": { "mode": "none" } }
            ]
        },
        "grid": { "rows": 1, "cols": 2, "cell_size": 10.0, "outlets": [[0, 1]] },
        "dt": 1.0,
        "steps": 10,
        "initial": [
            { "chemical": 0, "compartment": { "overland": { "row": 0, "col": 0 } }, "concentration": 10.0 }
        ],
        "overland_forcing": { "depth": 1.0, "next_depth": 1.0 },
        "forcing": [
            {
                "compartment": { "overland": { "row": 0, "col": 0 } },
                "forcing": { "depth": 1.0, "next_depth": 1.0, "advection_out": [0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0] }
            },
            {
                "compartment": { "overland": { "row": 0, "col": 1 } },
                "forcing": {
                    "depth": 1.0, "next_depth": 1.0,
                    "advection_in": [0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0],
                    "advection_out": [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]
                }
            }
        ],
        "stations": [ { "name": "outlet", "compartment": { "overland": { "row": 0, "col": 1 } } } ]
    }"#;

    fn outlet_row() -> Run {
        let scenario: Scenario = serde_json::from_str(OUTLET_ROW).unwrap();
        scenario.build(Path::new(".")).unwrap()
    }

    #[test]
    fn mass_leaving_the_outlet_is_accounted_for() {
        let mut run = outlet_row();
        run.advance(10, 1.0).unwrap();
        let summary = run.summary(1.0);

        assert_eq!(summary.steps, 10);
        assert_eq!(summary.time, 10.0);
        assert_eq!(summary.instabilities, 0);
        let b = &summary.chemicals[0].balance;
        assert!(b.boundary_export > 0.0);
        // 1 kg placed initially.
        assert!((b.mass + b.boundary_export - 1.0).abs() < 1e-12);
        assert_eq!(summary.outlets.len(), 1);
        assert_eq!(summary.stations.len(), 1);
        assert_eq!(summary.stations[0].station, "outlet");
    }

    #[test]
    fn unknown_override_compartment_is_rejected() {
        let mut scenario: Scenario = serde_json::from_str(OUTLET_ROW).unwrap();
        scenario.forcing[1].compartment = CompartmentId::Overland { row: 5, col: 1 };
        assert!(scenario.build(Path::new(".")).is_err());
    }

    #[test]
    fn initial_conditions_beyond_the_stack_are_rejected() {
        let mut scenario: Scenario = serde_json::from_str(OUTLET_ROW).unwrap();
        scenario.initial[0].layer = Layer::Solid(1);
        assert!(scenario.build(Path::new(".")).is_err());
    }

    #[test]
    fn grids_round_trip_through_initial_conditions() {
        let mut run = outlet_row();
        run.advance(3, 1.0).unwrap();
        let dir = std::env::temp_dir().join(format!("chemflux-run-grids-{}", std::process::id()));
        assert_eq!(run.write_grids(&dir).unwrap(), 1);

        let mut scenario: Scenario = serde_json::from_str(OUTLET_ROW).unwrap();
        scenario.initial.clear();
        scenario.initial_grids.push(InitialGrid {
            chemical: 0,
            layer: Layer::WaterColumn,
            grid: PathBuf::from("tracer_water.asc"),
            channels: None,
        });
        let restored = scenario.build(&dir).unwrap();
        assert_eq!(
            restored.state.layer_field(0, Layer::WaterColumn),
            run.state.layer_field(0, Layer::WaterColumn)
        );
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn bundled_demo_runs_and_balances() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/channel_outlet.json");
        let scenario = Scenario::load(&path).unwrap();
        let (steps, dt) = (scenario.steps, scenario.dt);
        let mut run = scenario.build(path.parent().unwrap()).unwrap();
        let before = run.summary(dt);
        run.advance(steps, dt).unwrap();
        let after = run.summary(dt);

        assert_eq!(after.steps, steps);
        assert_eq!(after.instabilities, 0);
        assert_eq!(after.outlets.len(), 2);
        assert_eq!(after.stations[0].station, "outlet");
        for (start, end) in before.chemicals.iter().zip(&after.chemicals) {
            let (s, e) = (&start.balance, &end.balance);
            let gained = s.mass + e.loads + e.yield_gain;
            let spent = e.mass + e.kinetic_loss + e.boundary_export + e.infiltration_loss;
            assert!((gained - spent).abs() < 1e-9 * gained.max(1.0), "{}: {gained} vs {spent}", end.name);
        }
        let daughter = &after.chemicals[1].balance;
        assert!(daughter.yield_gain > 0.0);
        assert!(after.chemicals[0].balance.boundary_export > 0.0);
    }
}
