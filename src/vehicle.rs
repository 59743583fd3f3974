use crate::math::Point2d;
use serde::{Deserialize, Serialize};

/// A snapshot of one vehicle as reported by the simulator for the current tick.
#[derive(Clone, Debug, PartialEq)]
pub struct VehicleState {
    /// The simulator's identifier for the vehicle.
    pub id: String,
    /// The coordinates of the vehicle in the simulator's world frame, in m.
    pub position: Point2d,
    /// The vehicle's speed in m/s.
    pub speed: f64,
}

impl VehicleState {
    /// Creates a new vehicle snapshot.
    pub fn new(id: impl Into<String>, position: Point2d, speed: f64) -> Self {
        Self {
            id: id.into(),
            position,
            speed,
        }
    }
}

/// The dynamic limits of the ego vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleAttributes {
    /// The maximum speed of the vehicle, in m/s.
    pub max_speed: f64,
    /// The maximum acceleration of the vehicle, in m/s^2.
    pub max_acc: f64,
    /// The maximum deceleration of the vehicle, a negative number in m/s^2.
    pub max_dec: f64,
}

impl Default for VehicleAttributes {
    fn default() -> Self {
        Self {
            max_speed: 50.0,
            max_acc: 2.0,
            max_dec: -2.0,
        }
    }
}

impl VehicleAttributes {
    /// Computes the speed reached after accelerating at `acc` for `dt` seconds,
    /// never reversing and never exceeding the maximum speed.
    pub fn integrate_speed(&self, speed: f64, acc: f64, dt: f64) -> f64 {
        (speed + acc * dt).clamp(0.0, self.max_speed)
    }
}
