//! Environment configuration, loadable from JSON.

use crate::vehicle::VehicleAttributes;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the simulation is displayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Run the simulator with its graphical interface.
    Human,
}

/// How to start and connect to the simulator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// The scenario configuration (`.sumocfg`) loaded at every reset.
    pub config_file: PathBuf,
    /// An explicit simulator binary. When absent the binary is looked up
    /// from the environment, see [find_binary](crate::traci::find_binary).
    pub binary: Option<PathBuf>,
    /// Additional command line arguments passed to the simulator.
    pub extra_args: Vec<String>,
    /// The number of connection attempts made while the simulator starts up.
    pub connect_retries: usize,
    /// The delay between connection attempts, in ms.
    pub connect_delay_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("scenario/scenario.sumocfg"),
            binary: None,
            extra_args: vec![],
            connect_retries: 60,
            connect_delay_ms: 250,
        }
    }
}

/// The configuration of a [TrafficEnv](crate::TrafficEnv).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// A name prefixed to every log message of the environment instance.
    pub label: String,
    /// The radius around the ego vehicle within which vehicles are observed, in m.
    #[serde(alias = "viewSize")]
    pub view_size: f64,
    /// The number of vehicle slots in the observation.
    #[serde(alias = "maxNearbyVehicles")]
    pub max_nearby_vehicles: usize,
    #[serde(alias = "renderMode")]
    pub render_mode: Option<RenderMode>,
    /// The duration of one simulation step, in s.
    pub step_length: f64,
    /// The number of steps after which an episode is truncated.
    pub horizon: usize,
    /// The reward given when the ego vehicle collides.
    pub collision_penalty: f64,
    /// The simulator ID of the vehicle controlled by the agent.
    pub ego_id: String,
    /// The speed mode bitmask applied to the ego vehicle; 32 disables every speed check.
    pub speed_mode: i32,
    /// The number of steps to wait for the ego vehicle to depart after a reset.
    pub max_startup_steps: usize,
    pub vehicle: VehicleAttributes,
    pub simulator: SimulatorConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            label: "traffic-gym".into(),
            view_size: 20.0,
            max_nearby_vehicles: 6,
            render_mode: None,
            step_length: 0.1,
            horizon: 3000,
            collision_penalty: -300.0,
            ego_id: "ego".into(),
            speed_mode: 32,
            max_startup_steps: 1000,
            vehicle: Default::default(),
            simulator: Default::default(),
        }
    }
}

impl EnvConfig {
    /// Parses and validates a JSON configuration. Missing fields take their default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks that the configuration describes a usable environment.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));
        if !(self.view_size >= 0.0) {
            return invalid(format!("view size must be non-negative, got {}", self.view_size));
        }
        if !(self.step_length > 0.0) {
            return invalid(format!("step length must be positive, got {}", self.step_length));
        }
        if self.horizon == 0 {
            return invalid("horizon must be at least one step".into());
        }
        if !(self.vehicle.max_speed > 0.0) {
            return invalid(format!(
                "max speed must be positive, got {}",
                self.vehicle.max_speed
            ));
        }
        if !(self.vehicle.max_acc >= 0.0) {
            return invalid(format!(
                "max acceleration must be non-negative, got {}",
                self.vehicle.max_acc
            ));
        }
        if !(self.vehicle.max_dec <= 0.0) {
            return invalid(format!(
                "max deceleration must be non-positive, got {}",
                self.vehicle.max_dec
            ));
        }
        if self.max_startup_steps == 0 {
            return invalid("max startup steps must be at least one".into());
        }
        if self.ego_id.is_empty() {
            return invalid("ego ID must not be empty".into());
        }
        Ok(())
    }

    /// Whether the simulator should be started with its graphical interface.
    pub fn gui(&self) -> bool {
        self.render_mode == Some(RenderMode::Human)
    }

    /// Builds the simulator command line, excluding the binary.
    ///
    /// # Parameters
    /// * `config_file` - The scenario configuration to load.
    /// * `seed` - The seed for the simulator's random number generator.
    pub fn simulator_args(&self, config_file: &Path, seed: u32) -> Vec<String> {
        let mut args = vec![
            "-c".to_string(),
            config_file.display().to_string(),
            "--step-length".into(),
            self.step_length.to_string(),
            "--collision.mingap-factor".into(),
            "0".into(),
            "--collision.action".into(),
            "warn".into(),
            "--xml-validation".into(),
            "never".into(),
            "--time-to-teleport".into(),
            "-1".into(),
            "--seed".into(),
            seed.to_string(),
        ];
        args.extend(self.simulator.extra_args.iter().cloned());
        args
    }
}
