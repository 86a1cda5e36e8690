//! Error types for the route engine.

use thiserror::Error;
use waytrail_env::EnvError;

/// Errors returned by catalog, route and session operations.
///
/// Session ticks never propagate these across the scheduler; they are
/// turned into [`crate::EngineEvent`]s or logged instead.
#[derive(Debug, Error)]
pub enum RouteError {
    /// No route with this name exists
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    /// A route with this name already exists
    #[error("Route already exists: {0}")]
    DuplicateName(String),

    /// Route names must contain a visible character
    #[error("Invalid route name: {0:?}")]
    InvalidName(String),

    /// Route is at its point limit
    #[error("Route {route} is full ({max_points} points)")]
    CapacityExceeded { route: String, max_points: usize },

    /// Point index past the end of the route
    #[error("Point index {index} out of range (route has {len} points)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Rejected configuration value or effect name
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The route a session referenced was deleted
    #[error("Route vanished: {0}")]
    RouteVanished(String),

    /// The operator already has a playback session
    #[error("Already following route {0}")]
    AlreadyPlaying(String),

    /// Capture command issued without a selected route
    #[error("No route selected")]
    NoRouteSelected,

    /// Playback command issued without an active playback
    #[error("No route is being followed")]
    NotPlaying,

    /// Command could not be parsed; carries usage help
    #[error("{0}")]
    Usage(String),

    /// Collaborator failure
    #[error(transparent)]
    Env(#[from] EnvError),
}

impl RouteError {
    /// Creates a route-not-found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::RouteNotFound(name.into())
    }

    /// Creates an invalid-configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a usage error.
    pub fn usage(help: impl Into<String>) -> Self {
        Self::Usage(help.into())
    }
}
