//! Tests of the environment's episode semantics against a scripted in-memory simulator.

use assert_approx_eq::assert_approx_eq;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tempfile::NamedTempFile;
use traffic_gym::math::Point2d;
use traffic_gym::{
    EnvConfig, EpisodeStatus, Error, Launcher, ResetOptions, SimulatorConfig, Simulator,
    TerminationReason, TrafficEnv, VehicleState, SENTINEL,
};

/// Something that happens in the scripted world after a given step.
enum Event {
    Spawn(VehicleState),
    Remove(&'static str),
    Collide(Vec<&'static str>),
    /// The simulator reports that nothing more is expected.
    Drain,
}

/// The state of the scripted simulation, shared between the test and the environment.
#[derive(Default)]
struct World {
    /// Events keyed by the step after which they happen, counted from the last (re)load.
    script: HashMap<usize, Vec<Event>>,
    vehicles: Vec<VehicleState>,
    colliding: Vec<String>,
    drained: bool,
    steps: usize,
    speed_commands: Vec<(String, f64)>,
    speed_modes: Vec<(String, i32)>,
    launches: Vec<Vec<String>>,
    loads: Vec<Vec<String>>,
    closed: bool,
    /// Makes the next load fail.
    fail_next_load: bool,
    /// Makes the next collision query fail.
    fail_collision_check: bool,
}

impl World {
    fn at(mut self, step: usize, event: Event) -> Self {
        self.script.entry(step).or_default().push(event);
        self
    }

    fn vehicle(&mut self, id: &str) -> Result<&mut VehicleState, Error> {
        self.vehicles
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| Error::Simulator {
                command: 0xa4,
                message: format!("Vehicle '{}' is not known.", id),
            })
    }

    fn restart(&mut self) {
        self.steps = 0;
        self.vehicles.clear();
        self.colliding.clear();
        self.drained = false;
    }

    /// The seed passed on the most recent launch or load.
    fn last_seed(&self) -> String {
        let args = self.loads.last().or(self.launches.last()).unwrap();
        let idx = args.iter().position(|a| a == "--seed").unwrap();
        args[idx + 1].clone()
    }
}

struct MockSim(Rc<RefCell<World>>);

impl Simulator for MockSim {
    fn vehicle_ids(&mut self) -> Result<Vec<String>, Error> {
        Ok(self.0.borrow().vehicles.iter().map(|v| v.id.clone()).collect())
    }

    fn position(&mut self, vehicle_id: &str) -> Result<Point2d, Error> {
        Ok(self.0.borrow_mut().vehicle(vehicle_id)?.position)
    }

    fn speed(&mut self, vehicle_id: &str) -> Result<f64, Error> {
        Ok(self.0.borrow_mut().vehicle(vehicle_id)?.speed)
    }

    fn set_speed(&mut self, vehicle_id: &str, speed: f64) -> Result<(), Error> {
        let mut world = self.0.borrow_mut();
        world.vehicle(vehicle_id)?.speed = speed;
        world.speed_commands.push((vehicle_id.to_string(), speed));
        Ok(())
    }

    fn set_speed_mode(&mut self, vehicle_id: &str, mode: i32) -> Result<(), Error> {
        let mut world = self.0.borrow_mut();
        world.vehicle(vehicle_id)?;
        world.speed_modes.push((vehicle_id.to_string(), mode));
        Ok(())
    }

    fn simulation_step(&mut self) -> Result<(), Error> {
        let mut world = self.0.borrow_mut();
        world.steps += 1;
        world.colliding.clear();
        let step = world.steps;
        let events = world.script.remove(&step).unwrap_or_default();
        for event in events {
            match event {
                Event::Spawn(vehicle) => world.vehicles.push(vehicle),
                Event::Remove(id) => world.vehicles.retain(|v| v.id != id),
                Event::Collide(ids) => {
                    world.colliding = ids.into_iter().map(String::from).collect();
                }
                Event::Drain => world.drained = true,
            }
        }
        Ok(())
    }

    fn colliding_vehicle_ids(&mut self) -> Result<Vec<String>, Error> {
        let mut world = self.0.borrow_mut();
        if std::mem::take(&mut world.fail_collision_check) {
            return Err(Error::Simulator {
                command: 0xab,
                message: "connection reset".into(),
            });
        }
        Ok(world.colliding.clone())
    }

    fn min_expected_number(&mut self) -> Result<i32, Error> {
        let world = self.0.borrow();
        if world.drained {
            return Ok(0);
        }
        let pending = world
            .script
            .values()
            .flatten()
            .filter(|event| matches!(event, Event::Spawn(_)))
            .count();
        Ok((world.vehicles.len() + pending) as i32)
    }

    fn load(&mut self, args: &[String]) -> Result<(), Error> {
        let mut world = self.0.borrow_mut();
        if std::mem::take(&mut world.fail_next_load) {
            return Err(Error::Simulator {
                command: 0x01,
                message: "could not load scenario".into(),
            });
        }
        world.loads.push(args.to_vec());
        world.restart();
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.0.borrow_mut().closed = true;
        Ok(())
    }
}

struct MockLauncher(Rc<RefCell<World>>);

impl Launcher for MockLauncher {
    type Sim = MockSim;

    fn launch(&mut self, _gui: bool, args: &[String]) -> Result<MockSim, Error> {
        let mut world = self.0.borrow_mut();
        world.launches.push(args.to_vec());
        world.restart();
        Ok(MockSim(self.0.clone()))
    }
}

fn vehicle(id: &str, x: f64, y: f64, speed: f64) -> VehicleState {
    VehicleState::new(id, Point2d::new(x, y), speed)
}

/// The ego vehicle departs on the first step alongside one vehicle in view
/// and one out of view. Scripted events must be added again after a reload.
fn highway() -> World {
    World::default()
        .at(1, Event::Spawn(vehicle("ego", 0.0, 0.0, 10.0)))
        .at(1, Event::Spawn(vehicle("car_1", 10.0, 0.0, 8.0)))
        .at(1, Event::Spawn(vehicle("car_2", 0.0, 30.0, 5.0)))
}

struct Fixture {
    world: Rc<RefCell<World>>,
    env: TrafficEnv<MockLauncher>,
    _scenario: NamedTempFile,
}

fn fixture_with(world: World, config: EnvConfig) -> Fixture {
    let scenario = NamedTempFile::new().unwrap();
    let config = EnvConfig {
        simulator: SimulatorConfig {
            config_file: scenario.path().to_path_buf(),
            ..Default::default()
        },
        ..config
    };
    let world = Rc::new(RefCell::new(world));
    let env = TrafficEnv::new(config, MockLauncher(world.clone())).unwrap();
    Fixture {
        world,
        env,
        _scenario: scenario,
    }
}

fn fixture(world: World) -> Fixture {
    fixture_with(world, EnvConfig::default())
}

#[test]
fn reset_waits_for_ego_and_observes() {
    let world = World::default()
        .at(3, Event::Spawn(vehicle("ego", 5.0, 5.0, 10.0)))
        .at(2, Event::Spawn(vehicle("car_1", 5.0, 15.0, 8.0)));
    let mut f = fixture(world);

    let (obs, info) = f.env.reset(None, None).unwrap();
    assert_eq!(&obs.values()[..6], &[0.0f32, 0.0, 10.0, 0.0, 10.0, 8.0]);
    assert!(obs.values()[6..].iter().all(|v| *v == SENTINEL));
    assert_eq!(info.num_vehicles_nearby, Some(2));
    assert_eq!(info.tick, 0);

    let world = f.world.borrow();
    assert_eq!(world.steps, 3);
    assert_eq!(world.launches.len(), 1);
    assert_eq!(world.speed_modes, vec![("ego".to_string(), 32)]);
}

#[test]
fn reward_is_speed_ratio() {
    let mut f = fixture(highway());
    f.env.reset(None, None).unwrap();

    let step = f.env.step(2.0).unwrap();
    assert!(!step.terminated);
    assert!(!step.truncated);
    assert_approx_eq!(step.reward, 10.2 / 50.0);
    assert_approx_eq!(step.observation.values()[2], 10.2f32, 1e-5);
    assert_eq!(step.info.num_vehicles_nearby, Some(2));
    assert_eq!(step.info.tick, 1);

    let world = f.world.borrow();
    let (id, speed) = world.speed_commands.last().unwrap();
    assert_eq!(id, "ego");
    assert_approx_eq!(*speed, 10.2);
}

#[test]
fn speed_is_clamped_to_vehicle_limits() {
    let world = World::default().at(1, Event::Spawn(vehicle("ego", 0.0, 0.0, 0.1)));
    let mut f = fixture(world);
    f.env.reset(None, None).unwrap();

    let step = f.env.step(-2.0).unwrap();
    assert_eq!(step.reward, 0.0);
    assert_eq!(f.world.borrow().speed_commands.last().unwrap().1, 0.0);

    f.world.borrow_mut().vehicle("ego").unwrap().speed = 49.9;
    let step = f.env.step(2.0).unwrap();
    assert_eq!(step.reward, 1.0);
}

#[test]
fn invalid_action_leaves_simulation_untouched() {
    let mut f = fixture(highway());
    f.env.reset(None, None).unwrap();
    let steps = f.world.borrow().steps;

    for action in [2.5, -2.01, f64::NAN, f64::INFINITY] {
        let result = f.env.step(action);
        assert!(matches!(result, Err(Error::InvalidAction { .. })));
    }

    let world = f.world.borrow();
    assert_eq!(world.steps, steps);
    assert!(world.speed_commands.is_empty());
    assert_eq!(f.env.episode().unwrap().tick(), 0);
}

#[test]
fn ego_collision_terminates_with_penalty() {
    let world = highway().at(2, Event::Collide(vec!["ego", "car_1"]));
    let mut f = fixture(world);
    f.env.reset(None, None).unwrap();

    let step = f.env.step(0.0).unwrap();
    assert!(step.terminated);
    assert!(!step.truncated);
    assert_eq!(step.reward, -300.0);
    assert!(step.observation.values().iter().all(|v| *v == SENTINEL));
    assert_eq!(step.observation.len(), 18);
    assert_eq!(step.info.termination, Some(TerminationReason::Collision));
}

#[test]
fn other_collisions_do_not_terminate() {
    let world = highway().at(2, Event::Collide(vec!["car_1", "car_2"]));
    let mut f = fixture(world);
    f.env.reset(None, None).unwrap();

    let step = f.env.step(0.0).unwrap();
    assert!(!step.terminated);
    assert_approx_eq!(step.reward, 10.0 / 50.0);
}

#[test]
fn ego_leaving_terminates_without_reward() {
    let world = highway().at(3, Event::Remove("ego"));
    let mut f = fixture(world);
    f.env.reset(None, None).unwrap();

    assert!(!f.env.step(0.0).unwrap().terminated);
    let step = f.env.step(0.0).unwrap();
    assert!(step.terminated);
    assert_eq!(step.reward, 0.0);
    assert!(step.observation.values().iter().all(|v| *v == SENTINEL));
    assert_eq!(step.info.termination, Some(TerminationReason::EgoLeft));
    assert_eq!(step.info.num_vehicles_nearby, None);
}

#[test]
fn nothing_expected_terminates() {
    let world = highway().at(2, Event::Drain);
    let mut f = fixture(world);
    f.env.reset(None, None).unwrap();

    let step = f.env.step(1.0).unwrap();
    assert!(step.terminated);
    assert_eq!(step.reward, 0.0);
    assert_eq!(
        step.info.termination,
        Some(TerminationReason::NoVehiclesExpected)
    );
}

#[test]
fn horizon_truncates_episode() {
    let config = EnvConfig {
        horizon: 3,
        ..Default::default()
    };
    let mut f = fixture_with(highway(), config);
    f.env.reset(None, None).unwrap();

    assert!(!f.env.step(0.0).unwrap().truncated);
    assert!(!f.env.step(0.0).unwrap().truncated);
    let step = f.env.step(0.0).unwrap();
    assert!(step.truncated);
    assert!(!step.terminated);
    assert_approx_eq!(step.reward, 10.0 / 50.0);
    assert!(matches!(f.env.step(0.0), Err(Error::EpisodeFinished)));
}

#[test]
fn ego_leaving_on_horizon_is_terminated_and_truncated() {
    let config = EnvConfig {
        horizon: 2,
        ..Default::default()
    };
    let mut f = fixture_with(highway().at(3, Event::Remove("ego")), config);
    f.env.reset(None, None).unwrap();

    assert!(!f.env.step(0.0).unwrap().done());
    let step = f.env.step(0.0).unwrap();
    assert!(step.terminated);
    assert!(step.truncated);
    assert_eq!(step.reward, 0.0);
    assert_eq!(step.info.termination, Some(TerminationReason::EgoLeft));
}

#[test]
fn failed_query_on_horizon_does_not_end_episode() {
    let config = EnvConfig {
        horizon: 2,
        ..Default::default()
    };
    let mut f = fixture_with(highway(), config);
    f.env.reset(None, None).unwrap();
    f.env.step(0.0).unwrap();

    f.world.borrow_mut().fail_collision_check = true;
    assert!(matches!(f.env.step(0.0), Err(Error::Simulator { .. })));
    assert_eq!(f.env.episode().unwrap().status(), EpisodeStatus::Running);

    let step = f.env.step(0.0).unwrap();
    assert!(step.truncated);
    assert!(!step.terminated);
    assert_eq!(f.env.episode().unwrap().status(), EpisodeStatus::Truncated);
}

#[test]
fn stepping_requires_a_running_episode() {
    let world = highway().at(2, Event::Remove("ego"));
    let mut f = fixture(world);
    assert!(matches!(f.env.step(0.0), Err(Error::NotStarted)));

    f.env.reset(None, None).unwrap();
    assert!(f.env.step(0.0).unwrap().terminated);
    assert!(matches!(f.env.step(0.0), Err(Error::EpisodeFinished)));
}

#[test]
fn second_reset_reloads_simulator() {
    let mut f = fixture(highway());
    f.env.reset(None, None).unwrap();
    f.env.step(0.0).unwrap();

    f.world.borrow_mut().script = highway().script;
    f.env.reset(None, None).unwrap();

    let world = f.world.borrow();
    assert_eq!(world.launches.len(), 1);
    assert_eq!(world.loads.len(), 1);
    assert_eq!(f.env.episode().unwrap().tick(), 0);
}

#[test]
fn failed_reload_relaunches_on_next_reset() {
    let mut f = fixture(highway());
    f.env.reset(None, None).unwrap();
    f.env.step(0.0).unwrap();

    {
        let mut world = f.world.borrow_mut();
        world.fail_next_load = true;
        world.script = highway().script;
    }
    assert!(matches!(f.env.reset(None, None), Err(Error::Simulator { .. })));
    assert!(!f.env.is_connected());
    assert!(f.env.episode().is_none());

    f.env.reset(None, None).unwrap();
    let world = f.world.borrow();
    assert_eq!(world.launches.len(), 2);
    assert!(world.loads.is_empty());
    assert_eq!(f.env.episode().unwrap().tick(), 0);
}

#[test]
fn seeded_resets_are_reproducible() {
    let mut f = fixture(highway());
    f.env.reset(Some(7), None).unwrap();
    let first = f.world.borrow().last_seed();

    f.world.borrow_mut().script = highway().script;
    f.env.reset(Some(7), None).unwrap();
    assert_eq!(f.world.borrow().last_seed(), first);
}

#[test]
fn missing_scenario_is_reported_before_launch() {
    let mut f = fixture(highway());
    let options = ResetOptions {
        config_file: Some("does/not/exist.sumocfg".into()),
    };
    let result = f.env.reset(None, Some(options));
    assert!(matches!(result, Err(Error::MissingScenario(_))));
    assert!(f.world.borrow().launches.is_empty());
}

#[test]
fn ego_that_never_departs_fails_reset() {
    let world = World::default().at(1, Event::Spawn(vehicle("car_1", 0.0, 0.0, 1.0)));
    let mut f = fixture(world);
    let result = f.env.reset(None, None);
    assert!(matches!(result, Err(Error::EgoNeverDeparted { .. })));
}

#[test]
fn close_releases_simulator() {
    let mut f = fixture(highway());
    f.env.reset(None, None).unwrap();
    assert!(f.env.is_connected());

    f.env.close().unwrap();
    assert!(!f.env.is_connected());
    assert!(f.world.borrow().closed);
    assert!(matches!(f.env.step(0.0), Err(Error::NotStarted)));
    f.env.close().unwrap();
}

#[test]
fn dropping_environment_closes_simulator() {
    let f = fixture(highway());
    let world = f.world.clone();
    let mut env = f.env;
    env.reset(None, None).unwrap();
    drop(env);
    assert!(world.borrow().closed);
}

#[test]
fn negative_view_size_is_rejected() {
    let world = Rc::new(RefCell::new(World::default()));
    let config = EnvConfig {
        view_size: -5.0,
        ..Default::default()
    };
    let result = TrafficEnv::new(config, MockLauncher(world));
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[test]
fn spaces_follow_configuration() {
    let f = fixture(highway());
    let actions = f.env.action_space();
    assert_eq!(actions.low(), &[-2.0f32]);
    assert_eq!(actions.high(), &[2.0f32]);
    assert!(actions.contains(&[1.5]));
    assert!(!actions.contains(&[2.5]));

    let observations = f.env.observation_space();
    assert_eq!(observations.dim(), 18);
    assert!(observations.contains(&[SENTINEL; 18]));
}
