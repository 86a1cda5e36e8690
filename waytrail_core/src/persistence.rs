//! JSON file route store.
//!
//! Layout (creation order is kept):
//!
//! ```json
//! {
//!   "routes": {
//!     "harbour": {
//!       "effect": "FLAME",
//!       "points": ["world;10.5;64.0;-3.0;90.0;0.0", "..."]
//!     }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use waytrail_env::{EnvError, Location, RouteStore, StoredRoute};

use crate::effect::EffectKind;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RoutesFile {
    #[serde(default)]
    routes: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RouteEntry {
    #[serde(default = "default_effect_name")]
    effect: String,

    #[serde(default)]
    points: Vec<String>,
}

fn default_effect_name() -> String {
    EffectKind::Flame.name().to_string()
}

/// Route store backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonRouteStore {
    path: PathBuf,
}

impl JsonRouteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates an empty store file (and parent directories) if missing.
    pub fn ensure_exists(&self) -> Result<(), EnvError> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.write_file(&RoutesFile::default())
    }

    fn write_file(&self, file: &RoutesFile) -> Result<(), EnvError> {
        let json = serde_json::to_string_pretty(file)
            .map_err(|e| EnvError::SerializationError(e.to_string()))?;
        replace_file(&self.path, |out| out.write_all(json.as_bytes()))
    }
}

/// Replaces `path` with what `write` produces.
///
/// The data goes to a temporary file in the same directory, which is
/// renamed over `path` only once it is complete and synced. Until then
/// readers see the previous contents.
fn replace_file<F>(path: &Path, write: F) -> Result<(), EnvError>
where
    F: FnOnce(&mut NamedTempFile) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut out = NamedTempFile::new_in(dir)?;
    write(&mut out)?;
    out.as_file().sync_all()?;
    out.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl RouteStore for JsonRouteStore {
    fn load_all(&self) -> Result<Vec<StoredRoute>, EnvError> {
        self.ensure_exists()?;

        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let file: RoutesFile = serde_json::from_str(&raw)
            .map_err(|e| EnvError::SerializationError(e.to_string()))?;

        let mut routes = Vec::with_capacity(file.routes.len());
        for (name, value) in file.routes {
            let entry: RouteEntry = match serde_json::from_value(value) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable route {:?}: {}", name, e);
                    continue;
                }
            };

            let total = entry.points.len();
            let points: Vec<Location> = entry
                .points
                .iter()
                .filter_map(|record| Location::from_record(record).ok())
                .collect();
            if points.len() < total {
                warn!(
                    "Route {}: skipped {} malformed point records",
                    name,
                    total - points.len()
                );
            }

            routes.push(StoredRoute {
                name,
                effect: entry.effect,
                points,
            });
        }

        info!("Loaded routes: {}", routes.len());
        Ok(routes)
    }

    fn save_all(&self, routes: &[StoredRoute]) -> Result<(), EnvError> {
        let mut file = RoutesFile::default();
        for route in routes {
            let entry = RouteEntry {
                effect: route.effect.clone(),
                points: route.points.iter().map(Location::to_record).collect(),
            };
            let value = serde_json::to_value(entry)
                .map_err(|e| EnvError::SerializationError(e.to_string()))?;
            file.routes.insert(route.name.clone(), value);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.write_file(&file)?;
        debug!("Saved {} routes to {}", routes.len(), self.path.display());
        Ok(())
    }
}
