//! Waytrail Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam between the route engine and the
//! world it runs in. Everything the engine consumes from outside is a trait
//! here, so the same engine code runs against a live server (tokio) or the
//! deterministic simulation harness.
//!
//! # Intercepted collaborators
//!
//! - Time (`now()`, `sleep_until()`) via [`TrailContext`]
//! - Operator positions via [`PositionProvider`]
//! - Visual effects via [`EffectEmitter`]
//! - Route persistence via [`RouteStore`]
//! - Completion rewards via [`RewardSink`]
//!
//! # Example
//!
//! ```ignore
//! use waytrail_env::{TrailContext, PositionProvider};
//!
//! async fn drive<Ctx: TrailContext, P: PositionProvider>(ctx: &Ctx, positions: &P) {
//!     loop {
//!         ctx.sleep(Duration::from_millis(50)).await;
//!         let here = positions.current_position(operator)?;
//!     }
//! }
//! ```

mod collaborators;
mod context;
mod error;
mod tokio_impl;
mod types;

pub use collaborators::{EffectEmitter, PositionProvider, RewardSink, RouteStore};
pub use context::TrailContext;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use types::{Location, OperatorId, StoredRoute};
