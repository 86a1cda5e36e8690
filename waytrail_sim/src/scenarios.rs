//! Simulation scenarios for the route engine.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SCN-001: One operator records a lap with line follow
    WalkAndRecord,

    /// SCN-002: Record a lap, then follow it to the reward
    Replay,

    /// SCN-003: A followed route is deleted mid-playback
    RouteVanished,

    /// SCN-004: Line follow runs into the point limit
    CapacityLimit,

    /// SCN-005: Playback paused and resumed
    PauseResume,

    /// SCN-006: Many operators record and replay at once
    Crowd,

    /// SCN-007: Operators leave mid-session
    Disconnect,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::WalkAndRecord,
            ScenarioId::Replay,
            ScenarioId::RouteVanished,
            ScenarioId::CapacityLimit,
            ScenarioId::PauseResume,
            ScenarioId::Crowd,
            ScenarioId::Disconnect,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::WalkAndRecord => "walk_and_record",
            ScenarioId::Replay => "replay",
            ScenarioId::RouteVanished => "route_vanished",
            ScenarioId::CapacityLimit => "capacity_limit",
            ScenarioId::PauseResume => "pause_resume",
            ScenarioId::Crowd => "crowd",
            ScenarioId::Disconnect => "disconnect",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::WalkAndRecord => "Walk a 20-unit square with line follow, verify spacing and idling",
            ScenarioId::Replay => "Record a lap, follow it, one reward after exactly N session ticks",
            ScenarioId::RouteVanished => "Two followers, one route deleted, only that follower stops",
            ScenarioId::CapacityLimit => "Point limit of 3, verify the bound and a single notice",
            ScenarioId::PauseResume => "Pause playback for several ticks, cursor stays frozen",
            ScenarioId::Crowd => "Every operator records and replays its own lap concurrently",
            ScenarioId::Disconnect => "Operators leave while recording and following, no rewards",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "walk_and_record" | "walkandrecord" | "record" | "scn-001" => Ok(ScenarioId::WalkAndRecord),
            "replay" | "scn-002" => Ok(ScenarioId::Replay),
            "route_vanished" | "routevanished" | "vanished" | "scn-003" => Ok(ScenarioId::RouteVanished),
            "capacity_limit" | "capacitylimit" | "capacity" | "scn-004" => Ok(ScenarioId::CapacityLimit),
            "pause_resume" | "pauseresume" | "scn-005" => Ok(ScenarioId::PauseResume),
            "crowd" | "scn-006" => Ok(ScenarioId::Crowd),
            "disconnect" | "scn-007" => Ok(ScenarioId::Disconnect),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
