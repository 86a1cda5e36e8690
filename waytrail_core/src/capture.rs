//! Capture Session - distance-threshold resampling of operator movement.
//!
//! ```text
//!   (none) ──select──► Selected ──start──► Capturing ◄──resume── Paused
//!     ▲                   ▲  ▲                 │ ──pause──────────►│
//!     └──── deselect ─────┘  └── capacity stop ┘
//! ```
//!
//! A session stores the route's name and generation, not the route. Every
//! tick looks both up in the catalog, so a deleted route surfaces as
//! [`CaptureStep::RouteVanished`] even if another route took its name.

use crate::catalog::{lock_route, RouteCatalog};
use crate::effect::EffectKind;
use crate::error::RouteError;
use crate::geometry;
use crate::route::Route;
use waytrail_env::{Location, OperatorId, PositionProvider};

/// Capture state for one operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No route selected (no session exists)
    Inactive,
    /// Route chosen, not capturing
    Selected,
    /// Capturing on every tick
    Capturing,
    /// Capture suspended, route still selected
    Paused,
}

/// A point that made it into the route.
#[derive(Debug, Clone)]
pub struct CapturedPoint {
    /// The appended location
    pub point: Location,

    /// Route's last point before the append, if any
    pub previous: Option<Location>,

    /// Route size after the append
    pub size: usize,

    /// Effect of the route, for feedback
    pub effect: EffectKind,
}

/// Outcome of one capture tick.
#[derive(Debug, Clone)]
pub enum CaptureStep {
    /// Session is not capturing
    Idle,

    /// Moved less than the threshold since the last capture
    Held { distance: f64 },

    /// A point was appended
    Captured(CapturedPoint),

    /// Route is full; `first_notice` is set only the first time in a row
    CapacityReached { first_notice: bool, max_points: usize },

    /// Target route no longer exists
    RouteVanished,

    /// Position provider could not locate the operator
    OperatorOffline,
}

/// Per-operator capture session.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    operator: OperatorId,
    route: String,
    generation: u64,
    state: CaptureState,
    last_captured: Option<Location>,
    capacity_noticed: bool,
}

impl CaptureSession {
    /// Creates a session with `route` selected.
    pub fn new(operator: OperatorId, route: &Route) -> Self {
        Self {
            operator,
            route: route.name().to_string(),
            generation: route.generation(),
            state: CaptureState::Selected,
            last_captured: None,
            capacity_noticed: false,
        }
    }

    pub fn operator(&self) -> OperatorId {
        self.operator
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn last_captured(&self) -> Option<&Location> {
        self.last_captured.as_ref()
    }

    /// Points the session at another route. Capture stops and the
    /// baseline is cleared.
    pub fn retarget(&mut self, route: &Route) {
        self.route = route.name().to_string();
        self.generation = route.generation();
        self.state = CaptureState::Selected;
        self.last_captured = None;
        self.capacity_noticed = false;
    }

    /// `Selected | Paused → Capturing`. Returns true if the state changed.
    pub fn start(&mut self) -> bool {
        match self.state {
            CaptureState::Selected | CaptureState::Paused => {
                self.state = CaptureState::Capturing;
                true
            }
            _ => false,
        }
    }

    /// `Capturing → Paused`. Returns true if the state changed.
    pub fn pause(&mut self) -> bool {
        if self.state == CaptureState::Capturing {
            self.state = CaptureState::Paused;
            true
        } else {
            false
        }
    }

    /// `Paused → Capturing`. Anything else is a no-op.
    pub fn resume(&mut self) -> bool {
        if self.state == CaptureState::Paused {
            self.state = CaptureState::Capturing;
            true
        } else {
            false
        }
    }

    /// Ends capturing but keeps the route selected.
    pub fn stop(&mut self) {
        self.state = CaptureState::Selected;
    }

    /// Captures the operator's current position regardless of distance.
    ///
    /// Works in every selected state and becomes the new baseline.
    pub fn add_point_once<P>(
        &mut self,
        catalog: &RouteCatalog,
        positions: &P,
    ) -> Result<CapturedPoint, RouteError>
    where
        P: PositionProvider + ?Sized,
    {
        let route = catalog
            .get_bound(&self.route, self.generation)
            .ok_or_else(|| RouteError::RouteVanished(self.route.clone()))?;
        let current = positions.current_position(self.operator)?;

        let mut guard = lock_route(&route);
        let previous = guard.last_point().cloned();
        let size = guard.append(current.clone())?;
        self.last_captured = Some(current.clone());
        self.capacity_noticed = false;

        Ok(CapturedPoint {
            point: current,
            previous,
            size,
            effect: guard.effect(),
        })
    }

    /// Runs one capture tick.
    ///
    /// The first tick without a baseline captures unconditionally; later
    /// ticks capture once the operator moved `threshold` or more. A move to
    /// another world always counts as far enough.
    pub fn step<P>(&mut self, catalog: &RouteCatalog, positions: &P, threshold: f64) -> CaptureStep
    where
        P: PositionProvider + ?Sized,
    {
        if self.state != CaptureState::Capturing {
            return CaptureStep::Idle;
        }

        let Some(route) = catalog.get_bound(&self.route, self.generation) else {
            return CaptureStep::RouteVanished;
        };

        let current = match positions.current_position(self.operator) {
            Ok(location) => location,
            Err(_) => return CaptureStep::OperatorOffline,
        };

        if let Some(last) = &self.last_captured {
            let moved = geometry::location_distance(last, &current).unwrap_or(f64::INFINITY);
            if moved < threshold {
                return CaptureStep::Held { distance: moved };
            }
        }

        let mut guard = lock_route(&route);
        let previous = guard.last_point().cloned();
        match guard.append(current.clone()) {
            Ok(size) => {
                self.last_captured = Some(current.clone());
                self.capacity_noticed = false;
                CaptureStep::Captured(CapturedPoint {
                    point: current,
                    previous,
                    size,
                    effect: guard.effect(),
                })
            }
            Err(_) => {
                let first_notice = !self.capacity_noticed;
                self.capacity_noticed = true;
                CaptureStep::CapacityReached {
                    first_notice,
                    max_points: guard.max_points(),
                }
            }
        }
    }
}
