//! Waytrail Deterministic Simulation Harness
//!
//! A controlled world where the route engine runs with no real clock, no
//! real players and no renderer, so every run is reproducible from a seed.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: a virtual clock advanced one base tick at a time
//! - **Movement**: walkers follow waypoints with seeded Gaussian wobble
//! - **Randomness**: every stream (wobble, firework styles) derives from one seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (virtual clock, seed)                     │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                                                     │
//! │  ┌────▼─────────────┐  positions  ┌──────────────────────┐  │
//! │  │     Walkers      │────────────►│     RouteEngine      │  │
//! │  │  (ground truth)  │             │  capture / playback  │  │
//! │  └──────────────────┘             └──────────┬───────────┘  │
//! │                                   effects    │   rewards    │
//! │                          ┌───────────────────▼───────────┐  │
//! │                          │  RecordingEffects / Rewards   │  │
//! │                          └───────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use waytrail_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 4).run(ScenarioId::Replay);
//! assert!(result.passed);
//! ```

mod context;
mod effects;
mod exporter;
mod runner;
mod walker;
mod world;
pub mod scenarios;

pub use context::SimContext;
pub use effects::{Emission, FireworkShape, FireworkStyle, RecordingEffects, RecordingRewards, Reward};
pub use exporter::{TrailExport, TrailFrame};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use walker::{Walker, Walkers};
pub use world::{square, SimConfig, SimEngine, SimWorld};
