use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use scout_core::ScoutError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::ScoutConfig;

/// Loads and optionally hot-reloads the Scout configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<ScoutConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > SCOUT_CONFIG env > ~/.scout/scout.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("SCOUT_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".scout")
            .join("scout.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> scout_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::parse_file(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            ScoutConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        // Validate config: log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(ScoutError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Wrap an already-built config (tests, embedding).
    pub fn from_config(config: ScoutConfig, config_path: PathBuf) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        }
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> ScoutConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<ScoutConfig>> {
        Arc::clone(&self.config)
    }

    /// Path being watched.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn parse_file(path: &Path) -> scout_core::Result<ScoutConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<ScoutConfig>(&raw).map_err(|e| {
            ScoutError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Apply env var overrides from the process environment.
    pub fn apply_env_overrides(config: ScoutConfig) -> ScoutConfig {
        Self::apply_env_overrides_from(config, |key| std::env::var(key).ok())
    }

    /// Apply env var overrides using `lookup` to read variables.
    ///
    /// Endpoint, model and paths are overridden unconditionally. Secrets only
    /// fill in when the config file leaves them unset.
    pub fn apply_env_overrides_from(
        mut config: ScoutConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ScoutConfig {
        if let Some(v) = lookup("OLLAMA_HOST") {
            config.inference.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("SCOUT_MODEL").or_else(|| lookup("OLLAMA_MODEL")) {
            config.inference.model = v;
        }
        if let Some(v) = lookup("OLLAMA_TEMPERATURE") {
            match v.parse::<f32>() {
                Ok(t) => config.inference.temperature = t,
                Err(_) => warn!(value = %v, "ignoring unparsable OLLAMA_TEMPERATURE"),
            }
        }
        if let Some(v) = lookup("REPORT_DIR") {
            config.research.reports_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("SCOUT_LOG_LEVEL") {
            config.logging.level = v;
        }
        if config.telegram.token.is_none() {
            config.telegram.token = lookup("TELEGRAM_BOT_TOKEN").filter(|t| !t.is_empty());
        }
        if config.telegram.allowed_chat_ids.is_empty() {
            if let Some(v) = lookup("TELEGRAM_ALLOWED_CHAT_IDS") {
                config.telegram.allowed_chat_ids = v
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
        }
        if config.providers.brave_api_key.is_none() {
            config.providers.brave_api_key = lookup("BRAVE_API_KEY").filter(|k| !k.is_empty());
        }
        if config.providers.balldontlie_api_key.is_none() {
            config.providers.balldontlie_api_key =
                lookup("BALLDONTLIE_API_KEY").filter(|k| !k.is_empty());
        }
        config
    }

    /// Reload the config from disk.
    pub fn reload(&self) -> scout_core::Result<()> {
        if !self.config_path.exists() {
            return Err(ScoutError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::parse_file(&self.config_path)?);
        new_config.validate().map_err(ScoutError::Config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    /// Start a background file watcher that swaps in the new config when the
    /// file changes. The returned watcher must be kept alive.
    pub fn watch(&self) -> scout_core::Result<notify::RecommendedWatcher> {
        let config = Arc::clone(&self.config);
        let config_path = self.config_path.clone();

        info!(?config_path, "starting config file watcher");

        let path_for_event = config_path.clone();
        let mut watcher = notify::recommended_watcher(move |res: Result<NotifyEvent, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "file watcher error");
                    return;
                }
            };
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            let is_our_file = event
                .paths
                .iter()
                .any(|p| p.file_name() == path_for_event.file_name());
            if !is_our_file {
                return;
            }

            info!("config file changed, reloading");
            match ConfigLoader::parse_file(&path_for_event) {
                Ok(new_config) => {
                    let new_config = ConfigLoader::apply_env_overrides(new_config);
                    if let Err(e) = new_config.validate() {
                        warn!(error = %e, "config file has errors, keeping current config");
                        return;
                    }
                    *config.write() = new_config;
                    info!("configuration hot-reloaded successfully");
                }
                Err(e) => {
                    warn!(error = %e, "config file has errors, keeping current config");
                }
            }
        })
        .map_err(|e| ScoutError::Config(format!("failed to create file watcher: {}", e)))?;

        // Watch the parent directory (some editors create temp files + rename)
        let watch_path = self.config_path.parent().unwrap_or(Path::new("."));
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| ScoutError::Config(format!("failed to watch config directory: {}", e)))?;

        Ok(watcher)
    }
}
