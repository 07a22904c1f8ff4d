//! Locating and layering configuration.
//!
//! Cluster nodes usually share one deployment file and differ only in their
//! route, so the node-specific values can also come from the environment.
//! Layers, lowest precedence first:
//!
//! 1. user file: `$TESSERA_CONFIG_DIR/config.toml`, else
//!    `<platform config dir>/tessera/config.toml`
//! 2. deployment file: `<deployment dir>/tessera.toml`
//! 3. node environment: `TESSERA_ROUTE`, `TESSERA_MAX_ACTIVE_SESSIONS`

use std::fmt;
use std::path::{Path, PathBuf};

use crate::types::{ManagerSection, RoutingSection};
use crate::{ConfigError, Result, TesseraConfig};

const DEPLOYMENT_FILE: &str = "tessera.toml";
const USER_FILE: &str = "config.toml";
const APP_DIR: &str = "tessera";

const CONFIG_DIR_VAR: &str = "TESSERA_CONFIG_DIR";
const ROUTE_VAR: &str = "TESSERA_ROUTE";
const MAX_ACTIVE_VAR: &str = "TESSERA_MAX_ACTIVE_SESSIONS";

/// One configuration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    User,
    Deployment,
    Environment,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::User => write!(f, "user"),
            Layer::Deployment => write!(f, "deployment"),
            Layer::Environment => write!(f, "environment"),
        }
    }
}

/// Where a layer was looked for and whether it contributed anything.
#[derive(Debug, Clone)]
pub struct LayerSource {
    pub layer: Layer,
    /// File path, or the variable names consulted for the environment.
    pub origin: String,
    pub applied: bool,
}

/// The merged configuration and how it was assembled.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TesseraConfig,
    /// Layers in precedence order, lowest first.
    pub layers: Vec<LayerSource>,
    /// Files that existed but could not be used.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    pub fn applied(&self) -> Vec<Layer> {
        self.layers
            .iter()
            .filter(|source| source.applied)
            .map(|source| source.layer)
            .collect()
    }

    fn merge_file(&mut self, layer: Layer, path: &Path) {
        let origin = path.display().to_string();
        let applied = if !path.is_file() {
            false
        } else {
            match load_config_file(path) {
                Ok(file) => {
                    self.config.merge(file);
                    true
                }
                Err(e) => {
                    self.warnings.push(format!("skipped {layer} config: {e}"));
                    false
                }
            }
        };
        self.layers.push(LayerSource {
            layer,
            origin,
            applied,
        });
    }
}

/// Discover all layers using the process environment.
pub fn load_config(deployment_dir: Option<&Path>) -> Result<LoadedConfig> {
    let env = |name: &str| std::env::var(name).ok();
    load_config_from(deployment_dir, user_config_dir(&env).as_deref(), &env)
}

/// Discover layers from explicit locations.
///
/// `env` stands in for the process environment. The merged result is
/// validated before it is returned; an unusable file is skipped with a
/// warning, a malformed node override is an error.
pub fn load_config_from(
    deployment_dir: Option<&Path>,
    user_dir: Option<&Path>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<LoadedConfig> {
    let mut loaded = LoadedConfig {
        config: TesseraConfig::new(),
        layers: Vec::new(),
        warnings: Vec::new(),
    };

    if let Some(dir) = user_dir {
        loaded.merge_file(Layer::User, &dir.join(USER_FILE));
    }
    let deployment = deployment_dir
        .map(|dir| dir.join(DEPLOYMENT_FILE))
        .unwrap_or_else(|| PathBuf::from(DEPLOYMENT_FILE));
    loaded.merge_file(Layer::Deployment, &deployment);

    let applied = apply_environment(&mut loaded.config, env)?;
    loaded.layers.push(LayerSource {
        layer: Layer::Environment,
        origin: format!("{ROUTE_VAR}, {MAX_ACTIVE_VAR}"),
        applied,
    });

    loaded.config.validate()?;
    Ok(loaded)
}

/// Apply node overrides on top of the file layers. Returns whether any
/// variable was set.
fn apply_environment(
    config: &mut TesseraConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<bool> {
    let mut applied = false;

    if let Some(route) = env(ROUTE_VAR).filter(|route| !route.is_empty()) {
        config
            .routing
            .get_or_insert_with(RoutingSection::default)
            .route = Some(route);
        applied = true;
    }

    if let Some(raw) = env(MAX_ACTIVE_VAR).filter(|raw| !raw.is_empty()) {
        let max = raw
            .trim()
            .parse::<usize>()
            .map_err(|e| ConfigError::Environment {
                var: MAX_ACTIVE_VAR.to_string(),
                reason: format!("'{raw}' is not a session count: {e}"),
            })?;
        config
            .manager
            .get_or_insert_with(ManagerSection::default)
            .max_active_sessions = Some(max);
        applied = true;
    }

    Ok(applied)
}

/// Parse one config file.
pub fn load_config_file(path: &Path) -> Result<TesseraConfig> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    TesseraConfig::from_toml(&contents)
}

/// Write a config file, creating missing parent directories.
pub fn save_config(config: &TesseraConfig, path: &Path) -> Result<()> {
    let io = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ConfigError::Io { path, source }
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io(parent))?;
    }
    std::fs::write(path, config.to_toml()?).map_err(io(path))
}

/// The user config directory: `TESSERA_CONFIG_DIR` when set, else the
/// platform config directory.
pub fn user_config_dir(env: &dyn Fn(&str) -> Option<String>) -> Option<PathBuf> {
    match env(CONFIG_DIR_VAR) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|dir| dir.join(APP_DIR)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
