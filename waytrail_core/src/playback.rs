//! Playback Session - fixed-rate walk over a route's points.
//!
//! Every active tick renders exactly one point and moves the cursor by one.
//! The tick that renders the last point also finishes the session, so a
//! route of `N ≥ 1` points completes in exactly `N` active ticks. An empty
//! route finishes on its first tick.

use crate::catalog::{lock_route, RouteCatalog};
use crate::effect::EffectKind;
use crate::route::Route;
use waytrail_env::{Location, OperatorId};

/// Whether a playback session is advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
}

/// What to draw for one advanced point.
#[derive(Debug, Clone)]
pub struct PlaybackFrame {
    /// Index of the rendered point
    pub index: usize,

    /// The rendered point
    pub target: Location,

    /// The following point, for the trail toward it
    pub next: Option<Location>,

    /// Route effect at the time of rendering
    pub effect: EffectKind,

    /// Set on every `progress_interval`-th point (never on index 0)
    pub progress: bool,
}

/// Outcome of one playback tick.
#[derive(Debug, Clone)]
pub enum PlaybackStep {
    /// Session is paused; nothing moved
    Paused,

    /// One point rendered, more remain
    Advanced(PlaybackFrame),

    /// Route exhausted. Carries the frame rendered this tick, if any
    Finished(Option<PlaybackFrame>),

    /// Route was deleted while playing
    RouteVanished,
}

/// Per-operator playback session.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    operator: OperatorId,
    route: String,
    generation: u64,
    cursor: usize,
    state: PlaybackState,
}

impl PlaybackSession {
    /// Starts at the first point of `route`, playing.
    pub fn new(operator: OperatorId, route: &Route) -> Self {
        Self {
            operator,
            route: route.name().to_string(),
            generation: route.generation(),
            cursor: 0,
            state: PlaybackState::Playing,
        }
    }

    pub fn operator(&self) -> OperatorId {
        self.operator
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }

    /// `Playing → Paused`. Returns true if the state changed.
    pub fn pause(&mut self) -> bool {
        let changed = self.state == PlaybackState::Playing;
        self.state = PlaybackState::Paused;
        changed
    }

    /// `Paused → Playing`. Returns true if the state changed.
    pub fn resume(&mut self) -> bool {
        let changed = self.state == PlaybackState::Paused;
        self.state = PlaybackState::Playing;
        changed
    }

    /// Runs one playback tick.
    pub fn step(&mut self, catalog: &RouteCatalog, progress_interval: usize) -> PlaybackStep {
        if self.is_paused() {
            return PlaybackStep::Paused;
        }

        let Some(route) = catalog.get_bound(&self.route, self.generation) else {
            return PlaybackStep::RouteVanished;
        };
        let guard = lock_route(&route);

        let index = self.cursor;
        let Some(target) = guard.points().get(index).cloned() else {
            return PlaybackStep::Finished(None);
        };

        self.cursor += 1;
        let frame = PlaybackFrame {
            index,
            target,
            next: guard.points().get(index + 1).cloned(),
            effect: guard.effect(),
            progress: progress_interval > 0 && index > 0 && index % progress_interval == 0,
        };

        if self.cursor >= guard.size() {
            PlaybackStep::Finished(Some(frame))
        } else {
            PlaybackStep::Advanced(frame)
        }
    }
}
