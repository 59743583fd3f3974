use serde::Serialize;

/// Why an episode was terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The ego vehicle was involved in a collision.
    Collision,
    /// The ego vehicle is no longer in the simulation, e.g. it reached the end of its route.
    EgoLeft,
    /// No vehicles remain to be inserted into or driven in the simulation.
    NoVehiclesExpected,
}

/// The state of an episode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpisodeStatus {
    Running,
    Terminated(TerminationReason),
    Truncated,
}

/// Bookkeeping for the current episode.
#[derive(Clone, Debug)]
pub struct EpisodeState {
    /// The number of steps taken since the last reset.
    tick: usize,
    /// The number of steps after which the episode is truncated.
    horizon: usize,
    status: EpisodeStatus,
}

impl EpisodeState {
    /// Starts a new episode.
    pub fn new(horizon: usize) -> Self {
        Self {
            tick: 0,
            horizon,
            status: EpisodeStatus::Running,
        }
    }

    /// The number of steps taken since the last reset.
    pub fn tick(&self) -> usize {
        self.tick
    }

    /// The number of steps after which the episode is truncated.
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn status(&self) -> EpisodeStatus {
        self.status
    }

    /// Whether the episode has ended, either by termination or truncation.
    pub fn is_done(&self) -> bool {
        self.status != EpisodeStatus::Running
    }

    /// Records that one step has been taken.
    /// Returns `true` iff the episode has reached its horizon.
    /// The status is left alone until the outcome of the step is known.
    pub(crate) fn advance(&mut self) -> bool {
        self.tick += 1;
        self.tick >= self.horizon
    }

    /// Marks the episode as having reached its horizon.
    pub(crate) fn truncate(&mut self) {
        self.status = EpisodeStatus::Truncated;
    }

    /// Marks the episode as terminated. Termination takes precedence over truncation.
    pub(crate) fn terminate(&mut self, reason: TerminationReason) {
        self.status = EpisodeStatus::Terminated(reason);
    }
}
