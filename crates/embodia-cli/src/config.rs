//! Configuration Vault – reads/writes `~/.embodia/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use embodia_runtime::{LlmDriver, PlannerConfig, SessionConfig};
use embodia_types::VisualObject;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// API key for the reasoning backend.  Wiped from memory on drop.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

/// Persisted user configuration stored in `~/.embodia/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the OpenAI-compatible model server.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Multimodal model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer key (stored as plain text – the file is written owner-only).
    #[serde(default, skip_serializing_if = "ApiKey::is_empty")]
    pub api_key: ApiKey,

    /// Upper bound on one backend call.
    #[serde(default = "default_plan_timeout_secs")]
    pub plan_timeout_secs: u64,

    /// Round deadline for gathering speech and vision.
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,

    /// Perception queue capacity before the oldest event is dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Ask the backend once more after an unparseable reply.
    #[serde(default = "default_true")]
    pub malformed_retry: bool,

    /// Return the arm to zero before planning each round.
    #[serde(default = "default_true")]
    pub rehome_each_round: bool,

    /// Most camera objects kept in one fused scene.
    #[serde(default = "default_max_scene_objects")]
    pub max_scene_objects: usize,

    /// Objects the simulated camera sees.
    #[serde(default = "default_scene")]
    pub scene: Vec<VisualObject>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("backend_url", &self.backend_url)
            .field("model", &self.model)
            .field(
                "api_key",
                if self.api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("plan_timeout_secs", &self.plan_timeout_secs)
            .field("sync_timeout_ms", &self.sync_timeout_ms)
            .field("queue_capacity", &self.queue_capacity)
            .field("malformed_retry", &self.malformed_retry)
            .field("rehome_each_round", &self.rehome_each_round)
            .field("max_scene_objects", &self.max_scene_objects)
            .field("scene", &self.scene.len())
            .finish()
    }
}

fn default_backend_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "qwen2.5vl".to_string()
}
fn default_plan_timeout_secs() -> u64 {
    30
}
fn default_sync_timeout_ms() -> u64 {
    3000
}
fn default_queue_capacity() -> usize {
    embodia_middleware::DEFAULT_CAPACITY
}
fn default_max_scene_objects() -> usize {
    SessionConfig::default().max_scene_objects
}
fn default_true() -> bool {
    true
}
fn default_scene() -> Vec<VisualObject> {
    vec![
        VisualObject::new("green block").at(210, 140),
        VisualObject::new("red block").at(330, 150),
        VisualObject::new("basketball").at(80, 95),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            model: default_model(),
            api_key: ApiKey::default(),
            plan_timeout_secs: default_plan_timeout_secs(),
            sync_timeout_ms: default_sync_timeout_ms(),
            queue_capacity: default_queue_capacity(),
            malformed_retry: true,
            rehome_each_round: true,
            max_scene_objects: default_max_scene_objects(),
            scene: default_scene(),
        }
    }
}

impl Config {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            sync_timeout: Duration::from_millis(self.sync_timeout_ms),
            planner: PlannerConfig {
                timeout: Duration::from_secs(self.plan_timeout_secs),
                malformed_retry: self.malformed_retry,
            },
            rehome_each_round: self.rehome_each_round,
            max_scene_objects: self.max_scene_objects,
            ..SessionConfig::default()
        }
    }

    pub fn driver(&self) -> LlmDriver {
        LlmDriver::new(&self.backend_url, &self.model).with_api_key(self.api_key.expose())
    }
}

/// Return the path to `~/.embodia/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".embodia").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
///
/// Values are returned as written; callers layer [`apply_env_overrides`]
/// on top.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `EMBODIA_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `EMBODIA_BACKEND_URL` | `backend_url` |
/// | `EMBODIA_MODEL` | `model` |
/// | `EMBODIA_API_KEY` | `api_key` |
/// | `EMBODIA_PLAN_TIMEOUT_SECS` | `plan_timeout_secs` |
/// | `EMBODIA_SYNC_TIMEOUT_MS` | `sync_timeout_ms` |
/// | `EMBODIA_QUEUE_CAPACITY` | `queue_capacity` |
/// | `EMBODIA_MALFORMED_RETRY` | `malformed_retry` (`true` / `false`) |
/// | `EMBODIA_REHOME` | `rehome_each_round` (`true` / `false`) |
/// | `EMBODIA_MAX_SCENE_OBJECTS` | `max_scene_objects` |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides_from(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("EMBODIA_BACKEND_URL") {
        cfg.backend_url = v;
    }
    if let Some(v) = lookup("EMBODIA_MODEL") {
        cfg.model = v;
    }
    if let Some(v) = lookup("EMBODIA_API_KEY") {
        cfg.api_key = ApiKey::new(v);
    }
    if let Some(secs) = lookup("EMBODIA_PLAN_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        cfg.plan_timeout_secs = secs;
    }
    if let Some(ms) = lookup("EMBODIA_SYNC_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        cfg.sync_timeout_ms = ms;
    }
    if let Some(capacity) = lookup("EMBODIA_QUEUE_CAPACITY").and_then(|v| v.parse().ok()) {
        cfg.queue_capacity = capacity;
    }
    if let Some(retry) = lookup("EMBODIA_MALFORMED_RETRY").and_then(|v| v.parse().ok()) {
        cfg.malformed_retry = retry;
    }
    if let Some(rehome) = lookup("EMBODIA_REHOME").and_then(|v| v.parse().ok()) {
        cfg.rehome_each_round = rehome;
    }
    if let Some(max) = lookup("EMBODIA_MAX_SCENE_OBJECTS").and_then(|v| v.parse().ok()) {
        cfg.max_scene_objects = max;
    }
}

/// Save the config to disk, creating `~/.embodia/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Owner read/write only (rw-------).
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
