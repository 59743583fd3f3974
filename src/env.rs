use crate::config::EnvConfig;
use crate::episode::{EpisodeState, TerminationReason};
use crate::observation::{Observation, ObservationBuilder};
use crate::simulator::{Launcher, Simulator};
use crate::space::BoxSpace;
use crate::traci::SumoLauncher;
use crate::{Error, Result};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::PathBuf;

/// Diagnostic information returned alongside every observation.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Info {
    /// The number of steps taken in the current episode.
    pub tick: usize,
    /// The number of vehicles, ego included, within the view radius.
    /// Absent for terminal observations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_vehicles_nearby: Option<usize>,
    /// Why the episode was terminated, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<TerminationReason>,
}

/// The outcome of a call to [TrafficEnv::step].
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub observation: Observation,
    pub reward: f64,
    /// The episode ended because of a collision or because the ego vehicle left the simulation.
    pub terminated: bool,
    /// The episode reached its horizon.
    pub truncated: bool,
    pub info: Info,
}

impl Step {
    /// Whether the episode has ended for either reason.
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Per-episode overrides accepted by [TrafficEnv::reset].
#[derive(Clone, Debug, Default)]
pub struct ResetOptions {
    /// Load this scenario configuration instead of the configured one.
    pub config_file: Option<PathBuf>,
}

/// A reinforcement learning environment in which the agent controls the
/// longitudinal acceleration of one vehicle inside a traffic simulation.
///
/// The simulator is started on the first [reset](Self::reset), reloaded on
/// every subsequent one, and shut down on [close](Self::close) or drop.
pub struct TrafficEnv<L: Launcher> {
    config: EnvConfig,
    builder: ObservationBuilder,
    launcher: L,
    /// The connection to the running simulator, if one has been started.
    sim: Option<L::Sim>,
    /// The current episode, if the environment has been reset.
    episode: Option<EpisodeState>,
    /// Draws the simulator seed for each episode.
    rng: StdRng,
}

impl TrafficEnv<SumoLauncher> {
    /// Creates an environment which runs SUMO as configured.
    pub fn sumo(config: EnvConfig) -> Result<Self> {
        let launcher = SumoLauncher::new(config.simulator.clone());
        Self::new(config, launcher)
    }
}

impl<L: Launcher> TrafficEnv<L> {
    /// Creates a new environment. The simulator is not started until the first reset.
    pub fn new(config: EnvConfig, launcher: L) -> Result<Self> {
        config.validate()?;
        let builder = ObservationBuilder::new(config.view_size, config.max_nearby_vehicles)?;
        info!(
            "[{}] View size: {} m. Max nearby vehicles to consider: {}.",
            config.label, config.view_size, config.max_nearby_vehicles
        );
        Ok(Self {
            config,
            builder,
            launcher,
            sim: None,
            episode: None,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// The current episode, if the environment has been reset.
    pub fn episode(&self) -> Option<&EpisodeState> {
        self.episode.as_ref()
    }

    /// Whether a simulator is currently connected.
    pub fn is_connected(&self) -> bool {
        self.sim.is_some()
    }

    /// The space of valid actions: a single acceleration in m/s^2.
    pub fn action_space(&self) -> BoxSpace {
        let vehicle = &self.config.vehicle;
        BoxSpace::uniform(vehicle.max_dec as f32, vehicle.max_acc as f32, 1)
    }

    /// The space of observations: `3 * K` unbounded values.
    pub fn observation_space(&self) -> BoxSpace {
        BoxSpace::unbounded(self.builder.observation_len())
    }

    /// Starts a new episode.
    ///
    /// # Parameters
    /// * `seed` - Reseeds the environment so that the episode can be reproduced.
    /// * `options` - Overrides for this episode.
    pub fn reset(
        &mut self,
        seed: Option<u64>,
        options: Option<ResetOptions>,
    ) -> Result<(Observation, Info)> {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.episode = None;

        let config_file = options
            .unwrap_or_default()
            .config_file
            .unwrap_or_else(|| self.config.simulator.config_file.clone());
        if !config_file.is_file() {
            return Err(Error::MissingScenario(config_file));
        }
        let args = self.config.simulator_args(&config_file, self.rng.gen());
        let label = &self.config.label;

        // A simulator which fails to reload is dropped and relaunched on the next reset
        let sim = match self.sim.take() {
            Some(mut sim) => {
                sim.load(&args)?;
                debug!("[{}] Reloaded simulator.", label);
                sim
            }
            None => {
                let sim = self.launcher.launch(self.config.gui(), &args)?;
                debug!("[{}] Started simulator (gui: {}).", label, self.config.gui());
                sim
            }
        };
        let sim = self.sim.insert(sim);

        // Simulate until the ego vehicle appears
        let ego = self.config.ego_id.as_str();
        let mut ids = None;
        for _ in 0..self.config.max_startup_steps {
            sim.simulation_step()?;
            let current = sim.vehicle_ids()?;
            if current.iter().any(|id| id == ego) {
                ids = Some(current);
                break;
            }
            if sim.min_expected_number()? <= 0 {
                break;
            }
        }
        let ids = ids.ok_or_else(|| Error::EgoNeverDeparted {
            id: ego.to_string(),
            steps: self.config.max_startup_steps,
        })?;

        // Hand speed control of the ego vehicle over to the agent
        sim.set_speed_mode(ego, self.config.speed_mode)?;

        let (observation, _) = observe(sim, &self.builder, ego, &ids)?;
        self.episode = Some(EpisodeState::new(self.config.horizon));
        let info = Info {
            tick: 0,
            num_vehicles_nearby: Some(observation.num_nearby()),
            termination: None,
        };
        Ok((observation, info))
    }

    /// Applies an acceleration to the ego vehicle and advances the simulation by one step.
    ///
    /// # Parameters
    /// * `action` - The acceleration in m/s^2, which must lie within the
    ///   [action space](Self::action_space).
    pub fn step(&mut self, action: f64) -> Result<Step> {
        let vehicle = self.config.vehicle;
        if !(action >= vehicle.max_dec && action <= vehicle.max_acc) {
            return Err(Error::InvalidAction {
                action,
                low: vehicle.max_dec,
                high: vehicle.max_acc,
            });
        }
        let episode = self.episode.as_mut().ok_or(Error::NotStarted)?;
        if episode.is_done() {
            return Err(Error::EpisodeFinished);
        }
        let sim = self.sim.as_mut().ok_or(Error::NotStarted)?;
        let ego = self.config.ego_id.as_str();
        let label = &self.config.label;

        let speed = sim.speed(ego)?;
        sim.set_speed(ego, vehicle.integrate_speed(speed, action, self.config.step_length))?;
        sim.simulation_step()?;
        let truncated = episode.advance();
        let tick = episode.tick();

        let collided = sim.colliding_vehicle_ids()?;
        if collided.iter().any(|id| id == ego) {
            warn!("[{}] Ego vehicle has collided at step {}.", label, tick);
            episode.terminate(TerminationReason::Collision);
            return Ok(Step {
                observation: self.builder.sentinel(),
                reward: self.config.collision_penalty,
                terminated: true,
                truncated: false,
                info: Info {
                    tick,
                    num_vehicles_nearby: None,
                    termination: Some(TerminationReason::Collision),
                },
            });
        } else if !collided.is_empty() {
            warn!("[{}] Vehicles other than ego have collided: {:?}.", label, collided);
        }

        let ids = sim.vehicle_ids()?;
        let reason = if !ids.iter().any(|id| id == ego) {
            Some(TerminationReason::EgoLeft)
        } else if sim.min_expected_number()? <= 0 {
            Some(TerminationReason::NoVehiclesExpected)
        } else {
            None
        };

        if let Some(reason) = reason {
            info!("[{}] Episode terminated at step {}: {:?}.", label, tick, reason);
            episode.terminate(reason);
            return Ok(Step {
                observation: self.builder.sentinel(),
                reward: 0.0,
                terminated: true,
                truncated,
                info: Info {
                    tick,
                    num_vehicles_nearby: None,
                    termination: Some(reason),
                },
            });
        }

        let (observation, ego_speed) = observe(sim, &self.builder, ego, &ids)?;
        if truncated {
            episode.truncate();
            info!("[{}] Episode truncated after {} steps.", label, tick);
        }
        let info = Info {
            tick,
            num_vehicles_nearby: Some(observation.num_nearby()),
            termination: None,
        };
        Ok(Step {
            observation,
            reward: ego_speed / vehicle.max_speed,
            terminated: false,
            truncated,
            info,
        })
    }

    /// Rendering is performed by the simulator's own interface when
    /// `render_mode` is `human`, so there is nothing to do here.
    pub fn render(&self) {}

    /// Shuts down the simulator, if it is running.
    pub fn close(&mut self) -> Result<()> {
        self.episode = None;
        if let Some(mut sim) = self.sim.take() {
            sim.close()?;
            debug!("[{}] Stopped simulator.", self.config.label);
        }
        Ok(())
    }
}

impl<L: Launcher> Drop for TrafficEnv<L> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("[{}] Failed to close simulator: {}", self.config.label, err);
        }
    }
}

/// Queries every vehicle in `ids` and builds the ego observation.
/// Also returns the speed of the ego vehicle.
fn observe<S: Simulator>(
    sim: &mut S,
    builder: &ObservationBuilder,
    ego_id: &str,
    ids: &[String],
) -> Result<(Observation, f64)> {
    let vehicles = sim.snapshot(ids)?;
    let observation = builder.build(ego_id, &vehicles)?;
    let ego_speed = vehicles
        .iter()
        .find(|vehicle| vehicle.id == ego_id)
        .map(|vehicle| vehicle.speed)
        .unwrap_or(0.0);
    Ok((observation, ego_speed))
}
