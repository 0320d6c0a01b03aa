//! Chemical transport kernel for a coupled overland / channel watershed
//! model.  Each timestep partitions every chemical among dissolved, bound
//! and particulate phases, applies reaction kinetics and physical transport
//! under mass-conservation limits, and integrates to new concentrations.
//!
//! [`kernel::TransportKernel`] is the entry point; the stage modules are
//! public for callers that want the individual formulas.
pub mod error;
pub mod forcing;
pub mod grid_io;
pub mod integrator;
pub mod kernel;
pub mod kinetics;
pub mod limiter;
pub mod params;
pub mod partition;
pub mod report;
pub mod stack;
pub mod state;
pub mod topology;
pub mod transport;

pub use error::{KernelError, Result};
pub use forcing::{BoundaryConditions, CompartmentForcing, PointLoad, StepInputs};
pub use kernel::TransportKernel;
pub use params::ModelConfig;
pub use report::{MassBalance, StepReport};
pub use state::ChemState;
pub use topology::{CompartmentId, Layer, Source, Topology};
