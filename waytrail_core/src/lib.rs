//! Waytrail Core - Route Capture and Playback Engine
//!
//! Turns operator movement into routes and routes back into effect trails:
//! 1. **Capture**: distance-threshold resampling of continuous movement
//!    into a sparse, ordered point sequence
//! 2. **Segments**: evenly spaced positions between adjacent points
//! 3. **Playback**: a fixed-rate walk over a route that ends in a reward
//!
//! Every operator owns at most one capture and one playback session. All
//! sessions share one [`RouteCatalog`] and are driven by a single
//! [`TickScheduler`] inside the [`RouteEngine`].

pub mod capture;
pub mod catalog;
pub mod command;
pub mod config;
pub mod effect;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod persistence;
pub mod playback;
pub mod route;
pub mod scheduler;
pub mod segment;

// Re-export key types for convenience
pub use capture::{CaptureSession, CaptureState, CaptureStep, CapturedPoint};
pub use catalog::{lock_route, RouteCatalog, SharedRoute};
pub use command::{EditCommand, FollowCommand, RouteCommand};
pub use config::{CapacityPolicy, EngineConfig};
pub use effect::EffectKind;
pub use engine::{EngineEvent, RouteEngine};
pub use error::RouteError;
pub use persistence::JsonRouteStore;
pub use playback::{PlaybackFrame, PlaybackSession, PlaybackState, PlaybackStep};
pub use route::Route;
pub use scheduler::{TaskKey, TaskKind, TickScheduler};
