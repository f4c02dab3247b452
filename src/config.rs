use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{SeeTapError, SeeTapResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    pub device: DeviceConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub perception: PerceptionConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Full chat-completions URL.
    pub api_base: String,
    /// Default model for this provider (used as fallback when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Optional API key stored in config.toml (falls back to env var SEETAP_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Screen + step list → JSON step analysis.
    pub classifier: Option<RoleEntry>,
    /// Screen → UI element list (vision perception backend).
    pub vision: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
}

fn default_temperature() -> f64 {
    0.3
}

fn default_max_tokens() -> u32 {
    2048
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_appium_url")]
    pub appium_url: String,
    #[serde(default = "default_platform")]
    pub platform_name: String,
    pub device_name: String,
    pub platform_version: String,
    /// Path to the built .app bundle under test.
    pub app_path: String,
    pub bundle_id: String,
    #[serde(default = "default_automation_name")]
    pub automation_name: String,
    #[serde(default = "default_true")]
    pub no_reset: bool,
    #[serde(default = "default_implicit_wait")]
    pub implicit_wait_ms: u64,
    /// Start `appium` if no server process is found.
    #[serde(default = "default_true")]
    pub ensure_appium: bool,
    /// Boot the simulator if `simctl bootstatus` reports it down.
    #[serde(default = "default_true")]
    pub ensure_simulator: bool,
    /// Extra `appium:*` capabilities merged into the session request.
    #[serde(default)]
    pub extra_capabilities: HashMap<String, serde_json::Value>,
}

fn default_appium_url() -> String {
    "http://127.0.0.1:4723".into()
}

fn default_platform() -> String {
    "iOS".into()
}

fn default_automation_name() -> String {
    "XCUITest".into()
}

fn default_implicit_wait() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutomationMode {
    /// Rule-parse each instruction and resolve against detections.
    Direct,
    /// Classify the whole batch against the screen each cycle.
    #[default]
    Analyzed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    #[serde(default)]
    pub mode: AutomationMode,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Upper bound for every blocking collaborator call.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    /// 0 disables post-action settling.
    #[serde(default = "default_settle_timeout")]
    pub settle_timeout_ms: u64,
    #[serde(default = "default_settle_interval")]
    pub settle_interval_ms: u64,
    /// Pause inserted between swipe press and move.
    #[serde(default = "default_swipe_hold")]
    pub swipe_hold_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_call_timeout() -> u64 {
    60
}

fn default_settle_timeout() -> u64 {
    3000
}

fn default_settle_interval() -> u64 {
    250
}

fn default_swipe_hold() -> u64 {
    100
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            mode: AutomationMode::default(),
            max_attempts: default_max_attempts(),
            call_timeout_secs: default_call_timeout(),
            settle_timeout_ms: default_settle_timeout(),
            settle_interval_ms: default_settle_interval(),
            swipe_hold_ms: default_swipe_hold(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PerceptionBackend {
    /// ONNX YOLOv8 detector.
    #[default]
    Yolo,
    /// Vision-capable language model.
    Vlm,
    /// No detector; only device-side element lookup and coordinates.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionConfig {
    #[serde(default)]
    pub backend: PerceptionBackend,
    #[serde(default = "default_model_path")]
    pub model_path: String,
    #[serde(default = "default_conf")]
    pub conf_threshold: f32,
    #[serde(default = "default_iou")]
    pub iou_threshold: f32,
    /// Detector class names; empty means "Element <id>" labels.
    #[serde(default)]
    pub class_names: Vec<String>,
    /// Detections below this confidence are dropped before resolution.
    #[serde(default)]
    pub min_confidence: f32,
    /// Ordered matcher chain: "exact", "substring", "words".
    #[serde(default = "default_strategies")]
    pub match_strategies: Vec<String>,
}

fn default_model_path() -> String {
    "models/yolov8n.onnx".into()
}

fn default_conf() -> f32 {
    0.25
}

fn default_iou() -> f32 {
    0.45
}

fn default_strategies() -> Vec<String> {
    vec!["substring".into()]
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            backend: PerceptionBackend::default(),
            model_path: default_model_path(),
            conf_threshold: default_conf(),
            iou_threshold: default_iou(),
            class_names: Vec::new(),
            min_confidence: 0.0,
            match_strategies: default_strategies(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DebugConfig {
    /// Transient screenshot written on every capture, overwritten each time.
    #[serde(default)]
    pub screenshot_path: Option<String>,
}

impl AppConfig {
    /// Reject configurations that cannot possibly run.
    pub fn validate(&self) -> SeeTapResult<()> {
        if self.automation.max_attempts == 0 {
            return Err(SeeTapError::Config("automation.max_attempts must be at least 1".into()));
        }
        if !Path::new(&self.device.app_path).exists() {
            return Err(SeeTapError::Config(format!(
                "app bundle not found at '{}'",
                self.device.app_path
            )));
        }
        Ok(())
    }
}

fn resolve_config_path() -> SeeTapResult<PathBuf> {
    if let Ok(path) = std::env::var("SEETAP_CONFIG") {
        let candidate = PathBuf::from(path);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config from SEETAP_CONFIG");
            return Ok(candidate);
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(SeeTapError::Config(
        "config.toml not found via SEETAP_CONFIG, next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> SeeTapResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> SeeTapResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(
        path = %path.display(),
        mode = ?config.automation.mode,
        backend = ?config.perception.backend,
        "config loaded"
    );
    Ok(config)
}
