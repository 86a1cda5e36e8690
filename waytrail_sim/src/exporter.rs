//! JSON exporter for simulation runs.
//!
//! Writes operator positions, emitted effects, engine events and the final
//! routes so a run can be plotted or diffed offline.

use crate::effects::{Emission, FireworkStyle, Reward};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use waytrail_core::{EngineEvent, RouteCatalog};
use waytrail_env::{Location, OperatorId};

/// A point in a world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointExport {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PointExport {
    pub fn new(location: &Location) -> Self {
        Self::from_vector(&location.world, location.position)
    }

    pub fn from_vector(world: &str, pos: Vector3<f64>) -> Self {
        Self {
            world: world.to_string(),
            x: pos.x,
            y: pos.y,
            z: pos.z,
        }
    }
}

/// Where one operator stood.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorFrame {
    pub operator: String,
    pub position: PointExport,
}

/// One effect emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionExport {
    pub effect: String,
    pub count: u32,
    pub position: PointExport,
}

impl From<&Emission> for EmissionExport {
    fn from(emission: &Emission) -> Self {
        Self {
            effect: emission.effect.clone(),
            count: emission.count,
            position: PointExport::new(&emission.location),
        }
    }
}

/// Engine event, flattened to text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventExport {
    pub operator: String,
    pub message: String,
}

impl From<&EngineEvent> for EventExport {
    fn from(event: &EngineEvent) -> Self {
        Self {
            operator: event.operator().to_string(),
            message: event.to_string(),
        }
    }
}

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Base tick the frame was taken at
    pub tick: u64,

    /// Online operator positions
    pub operators: Vec<OperatorFrame>,

    /// Effects emitted since the previous frame
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub emissions: Vec<EmissionExport>,

    /// Engine events since the previous frame
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EventExport>,
}

/// A route as it stood at the end of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteExport {
    pub name: String,
    pub effect: String,
    pub points: Vec<PointExport>,
}

/// A fired reward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardExport {
    pub operator: String,
    pub position: PointExport,
    pub style: FireworkStyle,
}

impl From<&Reward> for RewardExport {
    fn from(reward: &Reward) -> Self {
        Self {
            operator: reward.operator.to_string(),
            position: PointExport::new(&reward.location),
            style: reward.style.clone(),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<TrailFrame>,

    /// Routes at the end of the run
    pub routes: Vec<RouteExport>,

    /// Rewards fired during the run
    pub rewards: Vec<RewardExport>,

    /// Final results
    pub passed: bool,
}

impl TrailExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            routes: Vec::new(),
            rewards: Vec::new(),
            passed: false,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: TrailFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Builds a frame from raw simulation state.
    pub fn frame(
        time_sec: f64,
        tick: u64,
        positions: &[(OperatorId, Location)],
        emissions: &[Emission],
        events: &[EngineEvent],
    ) -> TrailFrame {
        TrailFrame {
            time_sec,
            tick,
            operators: positions
                .iter()
                .map(|(id, location)| OperatorFrame {
                    operator: id.to_string(),
                    position: PointExport::new(location),
                })
                .collect(),
            emissions: emissions.iter().map(EmissionExport::from).collect(),
            events: events.iter().map(EventExport::from).collect(),
        }
    }

    /// Finalizes the export with the routes and rewards left at the end.
    pub fn finalize(&mut self, passed: bool, catalog: &RouteCatalog, rewards: &[Reward]) {
        self.passed = passed;
        self.routes = catalog
            .snapshot()
            .into_iter()
            .map(|stored| RouteExport {
                name: stored.name,
                effect: stored.effect,
                points: stored.points.iter().map(PointExport::new).collect(),
            })
            .collect();
        self.rewards = rewards.iter().map(RewardExport::from).collect();
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
