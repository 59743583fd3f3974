pub use cgmath;
pub use config::{EnvConfig, RenderMode, SimulatorConfig};
pub use env::{Info, ResetOptions, Step, TrafficEnv};
pub use episode::{EpisodeState, EpisodeStatus, TerminationReason};
pub use error::{Error, Result};
pub use observation::{Observation, ObservationBuilder, SENTINEL};
pub use simulator::{Launcher, Simulator};
pub use space::BoxSpace;
pub use traci::{SumoLauncher, TraciClient};
pub use vehicle::{VehicleAttributes, VehicleState};

pub mod config;
mod env;
mod episode;
mod error;
pub mod math;
pub mod observation;
mod simulator;
mod space;
pub mod traci;
mod vehicle;
