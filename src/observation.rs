//! Construction of the fixed-size observation vector seen by the agent.
//!
//! Every vehicle within the view radius of the ego vehicle is expressed in an
//! ego-centred frame, sorted by distance, and the nearest `K` are written as
//! `(x, y, speed)` triples. Unused slots hold the sentinel `(-1, -1, -1)`.

use crate::math::translate_to;
use crate::vehicle::VehicleState;
use crate::{Error, Result};
use cgmath::MetricSpace;
use itertools::Itertools;

/// The value written to every field of an empty observation slot.
pub const SENTINEL: f32 = -1.0;

/// The number of values describing each vehicle: relative x, relative y and speed.
pub const ENTRY_LEN: usize = 3;

/// A flattened observation of the vehicles around the ego vehicle.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    /// The `(x, y, speed)` entries, nearest first, padded with [SENTINEL].
    values: Vec<f32>,
    /// The number of vehicles (including ego) that were inside the view radius.
    num_nearby: usize,
}

impl Observation {
    /// Creates an observation in which every slot is empty.
    /// Used as the observation of a terminal state.
    pub fn sentinel(max_vehicles: usize) -> Self {
        Self {
            values: vec![SENTINEL; ENTRY_LEN * max_vehicles],
            num_nearby: 0,
        }
    }

    /// The flattened observation values.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// The number of values in the observation, always `3 * K`.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the observation has no slots at all (`K = 0`).
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The number of vehicles, ego included, found within the view radius.
    /// This may exceed the number of slots.
    pub fn num_nearby(&self) -> usize {
        self.num_nearby
    }

    /// Iterates over the `(x, y, speed)` slots of the observation.
    pub fn entries(&self) -> impl Iterator<Item = [f32; ENTRY_LEN]> + '_ {
        self.values
            .chunks_exact(ENTRY_LEN)
            .map(|entry| [entry[0], entry[1], entry[2]])
    }
}

/// Builds ego-relative observations from the vehicles reported by the simulator.
#[derive(Clone, Copy, Debug)]
pub struct ObservationBuilder {
    /// Vehicles further than this from the ego vehicle are ignored, in m.
    view_radius: f64,
    /// The number of slots in the observation (`K`).
    max_vehicles: usize,
}

impl ObservationBuilder {
    /// Creates a new observation builder.
    ///
    /// # Parameters
    /// * `view_radius` - The maximum distance from ego at which a vehicle is observed, in m.
    /// * `max_vehicles` - The number of vehicle slots in each observation.
    pub fn new(view_radius: f64, max_vehicles: usize) -> Result<Self> {
        // Also rejects NaN.
        if !(view_radius >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "view radius must be non-negative, got {}",
                view_radius
            )));
        }
        Ok(Self {
            view_radius,
            max_vehicles,
        })
    }

    /// The view radius in m.
    pub fn view_radius(&self) -> f64 {
        self.view_radius
    }

    /// The number of vehicle slots in each observation.
    pub fn max_vehicles(&self) -> usize {
        self.max_vehicles
    }

    /// The length of every observation this builder produces.
    pub fn observation_len(&self) -> usize {
        ENTRY_LEN * self.max_vehicles
    }

    /// An observation with every slot empty.
    pub fn sentinel(&self) -> Observation {
        Observation::sentinel(self.max_vehicles)
    }

    /// Builds the observation for the ego vehicle.
    ///
    /// # Parameters
    /// * `ego_id` - The ID of the ego vehicle, which must be present in `vehicles`.
    /// * `vehicles` - Every vehicle in the simulation for the current tick, ego included.
    pub fn build(&self, ego_id: &str, vehicles: &[VehicleState]) -> Result<Observation> {
        let ego = vehicles
            .iter()
            .find(|vehicle| vehicle.id == ego_id)
            .ok_or_else(|| Error::EgoNotFound(ego_id.to_string()))?;

        // Ego always comes first, even if another vehicle shares its position.
        let nearby = vehicles
            .iter()
            .map(|vehicle| (vehicle, ego.position.distance(vehicle.position)))
            .filter(|(_, dist)| *dist <= self.view_radius)
            .sorted_by(|(a, dist_a), (b, dist_b)| {
                dist_a
                    .total_cmp(dist_b)
                    .then_with(|| (a.id != ego_id).cmp(&(b.id != ego_id)))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|(vehicle, _)| vehicle)
            .collect::<Vec<_>>();

        let mut values = nearby
            .iter()
            .take(self.max_vehicles)
            .flat_map(|vehicle| {
                let rel = translate_to(vehicle.position, ego.position);
                [rel.x as f32, rel.y as f32, vehicle.speed as f32]
            })
            .collect::<Vec<_>>();
        values.resize(self.observation_len(), SENTINEL);

        Ok(Observation {
            values,
            num_nearby: nearby.len(),
        })
    }
}
