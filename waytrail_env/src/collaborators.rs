//! Collaborator traits consumed by the route engine.
//!
//! Each trait is deliberately narrow: the engine never learns how a
//! position is looked up, how an effect is drawn, or where routes live.
//!
//! ```text
//!   World                       Engine                      World
//!     |                           |                           |
//!     |<-- current_position(op) --|                           |
//!     |                           |-- emit(effect, pos, n) -->|
//!     |                           |-- celebrate(op, pos) ---->|
//!   Store <-- load_all/save_all --|                           |
//! ```

use crate::error::EnvError;
use crate::types::{Location, OperatorId, StoredRoute};

/// Looks up where an operator currently is.
pub trait PositionProvider: Send + Sync {
    /// Returns the operator's current location.
    ///
    /// # Returns
    /// * `Err(EnvError::OperatorOffline)` - operator unknown or disconnected
    fn current_position(&self, operator: OperatorId) -> Result<Location, EnvError>;
}

/// Draws visual effects in the world. Fire-and-forget.
pub trait EffectEmitter: Send + Sync {
    /// Emits `count` particles of `effect` at `position`.
    fn emit(&self, effect: &str, position: &Location, count: u32);
}

/// Persists the route catalog.
pub trait RouteStore: Send + Sync {
    /// Loads every stored route in stored order.
    ///
    /// Malformed positional records are dropped by the store, not reported.
    fn load_all(&self) -> Result<Vec<StoredRoute>, EnvError>;

    /// Replaces the stored routes with `routes`.
    fn save_all(&self, routes: &[StoredRoute]) -> Result<(), EnvError>;
}

/// Fires the completion reward once an operator finishes a route.
pub trait RewardSink: Send + Sync {
    /// Celebrates at `position` for `operator`.
    fn celebrate(&self, operator: OperatorId, position: &Location);
}
