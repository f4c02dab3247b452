/// Appium (W3C WebDriver) session: the single live device connection of a run.
use std::path::PathBuf;
use std::time::Duration;

use base64::Engine as _;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::config::DeviceConfig;
use crate::errors::{SeeTapError, SeeTapResult};

/// W3C web element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Device-side lookup strategies, tried in order until one finds the element.
const LOCATORS: [Locator; 3] = [Locator::AccessibilityId, Locator::Name, Locator::LabelXPath];

#[derive(Debug, Clone, Copy)]
enum Locator {
    AccessibilityId,
    Name,
    LabelXPath,
}

impl Locator {
    fn using(&self) -> &'static str {
        match self {
            Locator::AccessibilityId => "accessibility id",
            Locator::Name => "name",
            Locator::LabelXPath => "xpath",
        }
    }

    fn value(&self, label: &str) -> String {
        match self {
            Locator::AccessibilityId | Locator::Name => label.to_string(),
            Locator::LabelXPath => {
                let lit = xpath_literal(label);
                format!("//*[contains(@label, {lit}) or contains(@name, {lit})]")
            }
        }
    }
}

pub struct DeviceSession {
    client: reqwest::Client,
    base_url: String,
    /// `None` once the session has been closed.
    session_id: Mutex<Option<String>>,
    screenshot_path: Option<PathBuf>,
    pub(crate) swipe_hold_ms: u64,
}

impl DeviceSession {
    /// Open a new Appium session for the configured app.
    pub async fn start(
        cfg: &DeviceConfig,
        call_timeout_secs: u64,
        screenshot_path: Option<PathBuf>,
    ) -> SeeTapResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(call_timeout_secs.max(1)))
            .build()?;
        let base_url = cfg.appium_url.trim_end_matches('/').to_string();

        let body = json!({ "capabilities": { "alwaysMatch": capabilities(cfg), "firstMatch": [{}] } });
        let response = client.post(format!("{base_url}/session")).json(&body).send().await.map_err(|e| {
            SeeTapError::Session(format!("cannot reach automation server at {base_url}: {e}"))
        })?;
        let value = unwrap_response(response).await.map_err(|e| match e {
            SeeTapError::Session(_) => e,
            other => SeeTapError::Session(format!("session not created: {other}")),
        })?;
        let session_id = value["sessionId"]
            .as_str()
            .ok_or_else(|| SeeTapError::Session("response carries no sessionId".into()))?
            .to_string();

        tracing::info!(session = %session_id, device = %cfg.device_name, "device session opened");

        let session = Self {
            client,
            base_url,
            session_id: Mutex::new(Some(session_id)),
            screenshot_path,
            swipe_hold_ms: 100,
        };
        session
            .command(reqwest::Method::POST, "timeouts", Some(json!({ "implicit": cfg.implicit_wait_ms })))
            .await?;
        Ok(session)
    }

    /// Attach to an already-open session, e.g. one created by another tool.
    pub fn attach(base_url: &str, session_id: &str, call_timeout_secs: u64) -> SeeTapResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(call_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: Mutex::new(Some(session_id.to_string())),
            screenshot_path: None,
            swipe_hold_ms: 100,
        })
    }

    pub fn with_swipe_hold(mut self, ms: u64) -> Self {
        self.swipe_hold_ms = ms;
        self
    }

    pub async fn is_open(&self) -> bool {
        self.session_id.lock().await.is_some()
    }

    async fn session_url(&self, path: &str) -> SeeTapResult<String> {
        let guard = self.session_id.lock().await;
        let id = guard
            .as_deref()
            .ok_or_else(|| SeeTapError::Session("device session is closed".into()))?;
        Ok(if path.is_empty() {
            format!("{}/session/{id}", self.base_url)
        } else {
            format!("{}/session/{id}/{path}", self.base_url)
        })
    }

    /// Issue a session-scoped command and return the response's `value`.
    pub async fn command(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> SeeTapResult<Value> {
        let url = self.session_url(path).await?;
        tracing::trace!(%method, %url, "webdriver command");
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        unwrap_response(request.send().await?).await
    }

    pub async fn screenshot(&self) -> SeeTapResult<Vec<u8>> {
        let value = self.command(reqwest::Method::GET, "screenshot", None).await?;
        let b64 = value
            .as_str()
            .ok_or_else(|| SeeTapError::Capture("screenshot payload is not a string".into()))?;
        // Some servers wrap the base64 payload at 76 columns.
        let cleaned: String = b64.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(cleaned)
            .map_err(|e| SeeTapError::Capture(format!("screenshot base64: {e}")))?;

        if let Some(path) = &self.screenshot_path {
            if let Err(e) = tokio::fs::write(path, &bytes).await {
                tracing::warn!(path = %path.display(), error = %e, "could not write screenshot");
            }
        }
        Ok(bytes)
    }

    /// Window size in points; the coordinate space for pointer actions.
    pub async fn window_size(&self) -> SeeTapResult<(u32, u32)> {
        let value = self.command(reqwest::Method::GET, "window/rect", None).await?;
        match (value["width"].as_f64(), value["height"].as_f64()) {
            (Some(w), Some(h)) if w > 0.0 && h > 0.0 => Ok((w as u32, h as u32)),
            _ => Err(SeeTapError::Capture(format!("unexpected window rect: {value}"))),
        }
    }

    pub async fn perform_actions(&self, actions: Value) -> SeeTapResult<()> {
        self.command(reqwest::Method::POST, "actions", Some(actions)).await?;
        self.command(reqwest::Method::DELETE, "actions", None).await?;
        Ok(())
    }

    /// Find an element by label, trying each locator strategy in turn.
    pub async fn find_element(&self, label: &str) -> SeeTapResult<String> {
        for locator in LOCATORS {
            let body = json!({ "using": locator.using(), "value": locator.value(label) });
            match self.command(reqwest::Method::POST, "element", Some(body)).await {
                Ok(value) => {
                    let id = element_id(&value).ok_or_else(|| {
                        SeeTapError::Action(format!("element reference missing in {value}"))
                    })?;
                    tracing::debug!(label, strategy = locator.using(), element = %id, "element found");
                    return Ok(id);
                }
                Err(SeeTapError::Resolution(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(SeeTapError::Resolution(format!("no element labelled '{label}'")))
    }

    pub async fn click_element(&self, element_id: &str) -> SeeTapResult<()> {
        self.command(reqwest::Method::POST, &format!("element/{element_id}/click"), Some(json!({})))
            .await?;
        Ok(())
    }

    pub async fn send_keys_to(&self, element_id: &str, text: &str) -> SeeTapResult<()> {
        self.command(
            reqwest::Method::POST,
            &format!("element/{element_id}/value"),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    /// End the session. Safe to call more than once.
    pub async fn close(&self) -> SeeTapResult<()> {
        let Some(id) = self.session_id.lock().await.take() else {
            return Ok(());
        };
        let url = format!("{}/session/{id}", self.base_url);
        let response = self.client.delete(&url).send().await?;
        unwrap_response(response).await?;
        tracing::info!(session = %id, "device session closed");
        Ok(())
    }
}

/// Session capabilities for an XCUITest run.
pub fn capabilities(cfg: &DeviceConfig) -> Value {
    let mut caps = json!({
        "platformName": cfg.platform_name,
        "appium:deviceName": cfg.device_name,
        "appium:platformVersion": cfg.platform_version,
        "appium:app": cfg.app_path,
        "appium:automationName": cfg.automation_name,
        "appium:noReset": cfg.no_reset,
        "appium:updatedWDABundleId": cfg.bundle_id,
        "appium:useNewWDA": true,
        "appium:wdaStartupRetries": 14,
        "appium:iosInstallPause": 8000,
        "appium:wdaStartupRetryInterval": 20000,
    });
    if let Some(map) = caps.as_object_mut() {
        for (key, value) in &cfg.extra_capabilities {
            let key = if key.contains(':') || key == "platformName" {
                key.clone()
            } else {
                format!("appium:{key}")
            };
            map.insert(key, value.clone());
        }
    }
    caps
}

/// Turn a WebDriver HTTP response into its `value`, mapping protocol errors.
async fn unwrap_response(response: reqwest::Response) -> SeeTapResult<Value> {
    let status = response.status();
    let text = response.text().await?;
    let body: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text)
            .map_err(|e| SeeTapError::Action(format!("non-JSON reply ({status}): {e}: {text}")))?
    };
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let code = value["error"].as_str().unwrap_or("unknown error");
    let message = value["message"].as_str().unwrap_or_default();
    let detail = format!("{code}: {message}");
    Err(match code {
        "invalid session id" | "session not created" => SeeTapError::Session(detail),
        "no such element" => SeeTapError::Resolution(detail),
        _ => SeeTapError::Action(format!("{status} {detail}")),
    })
}

fn element_id(value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    obj.get(ELEMENT_KEY)
        .or_else(|| obj.get("ELEMENT"))
        .or_else(|| obj.values().find(|v| v.is_string()))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Quote a string for use as an XPath literal.
fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{s}'")
    } else if !s.contains('"') {
        format!("\"{s}\"")
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}
