use anyhow::{anyhow, Context, Result};
use jsonc_parser::{parse_to_serde_value, ParseOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time;

/// Sampling parameters forwarded to the vendor APIs. Defaults match the
/// values the hosted form has always used.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerationParams {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_top_k")]
    pub top_k: u32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Default provider selection; COPYFORGE_LLM_PROVIDER overrides it.
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default)]
    pub gemini_model: Option<String>,

    #[serde(default)]
    pub openai_model: Option<String>,

    #[serde(default)]
    pub generation: GenerationParams,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_provider() -> String {
    "auto".to_string()
}

fn default_temperature() -> f32 {
    1.0
}

fn default_top_p() -> f32 {
    0.6
}

fn default_top_k() -> u32 {
    0
}

fn default_max_output_tokens() -> u32 {
    8192
}

fn default_request_timeout_secs() -> u64 {
    90
}

fn default_max_attempts() -> u32 {
    6
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            provider: default_provider(),
            gemini_model: None,
            openai_model: None,
            generation: GenerationParams::default(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Clone)]
pub struct ConfigManager {
    inner: Arc<ConfigManagerInner>,
}

struct ConfigManagerInner {
    config: RwLock<Config>,
    config_path: PathBuf,
    change_tx: watch::Sender<Config>,
    watcher_active: AtomicBool,
}

impl ConfigManager {
    pub fn load() -> Result<Self> {
        let config_dir = directories::ProjectDirs::from("", "", "copyforge")
            .context("Failed to get config directory")?
            .config_dir()
            .to_path_buf();

        fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        let jsonc_path = config_dir.join("config.jsonc");
        let legacy_path = config_dir.join("config.json");

        let (config_path, config) = if jsonc_path.exists() {
            let config = Self::read_config_from_disk(&jsonc_path)?;
            (jsonc_path, config)
        } else if legacy_path.exists() {
            let config = Self::read_config_from_disk(&legacy_path)?;
            Self::write_config_file(&jsonc_path, &config)?;
            tracing::info!(
                "Migrated legacy config to JSONC: {:?} -> {:?}",
                legacy_path,
                jsonc_path
            );
            (jsonc_path, config)
        } else {
            let default_config = Config::default();
            Self::write_config_file(&jsonc_path, &default_config)?;
            tracing::info!("Created default config at: {:?}", jsonc_path);
            (jsonc_path, default_config)
        };

        tracing::info!("Loaded config from: {:?}", config_path);

        let (change_tx, _) = watch::channel(config.clone());

        Ok(Self {
            inner: Arc::new(ConfigManagerInner {
                config: RwLock::new(config),
                config_path,
                change_tx,
                watcher_active: AtomicBool::new(false),
            }),
        })
    }

    pub fn start_watching(&self) {
        if self.inner.watcher_active.swap(true, Ordering::SeqCst) {
            return;
        }

        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let mut last_state = Self::file_state(&inner.config_path);
            let mut ticker = time::interval(Duration::from_millis(500));

            loop {
                ticker.tick().await;

                let current_state = Self::file_state(&inner.config_path);
                if current_state == last_state {
                    continue;
                }

                last_state = current_state;

                match Self::read_config_from_disk(&inner.config_path) {
                    Ok(new_config) => {
                        let mut guard = inner.config.write().expect("config lock poisoned");
                        if *guard != new_config {
                            *guard = new_config.clone();
                            drop(guard);

                            if inner.change_tx.send(new_config).is_ok() {
                                tracing::info!("Reloaded config from: {:?}", inner.config_path);
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!("Failed to reload config: {err}");
                    }
                }
            }
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<Config> {
        self.inner.change_tx.subscribe()
    }

    pub fn get(&self) -> Config {
        self.inner
            .config
            .read()
            .expect("config lock poisoned")
            .clone()
    }

    pub fn save(&self) -> Result<()> {
        let config = self.get();
        Self::write_config_file(&self.inner.config_path, &config)?;

        let _ = self.inner.change_tx.send(config);

        tracing::info!("Saved config to: {:?}", self.inner.config_path);
        Ok(())
    }

    fn read_config_from_disk(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {:?}", path))?;
        Self::parse_config(&content)
    }

    fn write_config_file(path: &Path, config: &Config) -> Result<()> {
        let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(path, json).with_context(|| format!("Failed to write config file at {:?}", path))
    }

    fn parse_config(content: &str) -> Result<Config> {
        let value = parse_to_serde_value(content, &ParseOptions::default())
            .context("Failed to parse config as JSONC")?
            .ok_or_else(|| anyhow!("Config file did not contain a JSON value"))?;
        serde_json::from_value(value).context("Failed to deserialize config")
    }

    fn file_state(path: &Path) -> Option<(SystemTime, u64)> {
        let metadata = fs::metadata(path).ok()?;
        let modified = metadata.modified().ok()?;
        Some((modified, metadata.len()))
    }
}
