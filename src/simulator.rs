//! The boundary between the environment and the external traffic simulator.

use crate::math::Point2d;
use crate::vehicle::VehicleState;
use crate::Result;

/// A connection to a running traffic simulation.
///
/// Every call is a blocking round trip to the simulator. Errors returned
/// here mean the simulator could not be reached or refused a command.
pub trait Simulator {
    /// The IDs of the vehicles currently in the simulation.
    fn vehicle_ids(&mut self) -> Result<Vec<String>>;

    /// The world coordinates of a vehicle, in m.
    fn position(&mut self, vehicle_id: &str) -> Result<Point2d>;

    /// The speed of a vehicle, in m/s.
    fn speed(&mut self, vehicle_id: &str) -> Result<f64>;

    /// Commands a vehicle to drive at the given speed, in m/s.
    fn set_speed(&mut self, vehicle_id: &str, speed: f64) -> Result<()>;

    /// Sets which of the simulator's speed checks apply to a vehicle.
    fn set_speed_mode(&mut self, vehicle_id: &str, mode: i32) -> Result<()>;

    /// Advances the simulation by one step.
    fn simulation_step(&mut self) -> Result<()>;

    /// The IDs of the vehicles which collided during the last step.
    fn colliding_vehicle_ids(&mut self) -> Result<Vec<String>>;

    /// The number of vehicles in the simulation plus those still waiting to be inserted.
    fn min_expected_number(&mut self) -> Result<i32>;

    /// Restarts the simulation with new command line arguments.
    fn load(&mut self, args: &[String]) -> Result<()>;

    /// Ends the simulation and the connection.
    fn close(&mut self) -> Result<()>;

    /// Queries the position and speed of every vehicle in `ids`.
    fn snapshot(&mut self, ids: &[String]) -> Result<Vec<VehicleState>> {
        ids.iter()
            .map(|id| {
                Ok(VehicleState {
                    id: id.clone(),
                    position: self.position(id)?,
                    speed: self.speed(id)?,
                })
            })
            .collect()
    }
}

/// Starts simulators.
pub trait Launcher {
    type Sim: Simulator;

    /// Starts a simulator with the given command line arguments and connects to it.
    ///
    /// # Parameters
    /// * `gui` - Whether the simulator should show its graphical interface.
    /// * `args` - The simulator arguments, excluding the binary.
    fn launch(&mut self, gui: bool, args: &[String]) -> Result<Self::Sim>;
}
