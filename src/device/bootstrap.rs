//! Ensure-running checks for the automation server and the simulator.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::config::DeviceConfig;
use crate::errors::{SeeTapError, SeeTapResult};

const APPIUM_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Keeps an Appium server we started alive for the run; killed on drop.
pub struct AppiumGuard {
    _child: Option<Child>,
}

/// Start `appium` if no server process is running, then wait for `/status`.
pub async fn ensure_appium(cfg: &DeviceConfig) -> SeeTapResult<AppiumGuard> {
    if !cfg.ensure_appium {
        return Ok(AppiumGuard { _child: None });
    }

    let running = Command::new("pgrep")
        .args(["-f", "appium"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false);

    if running {
        tracing::info!("Appium server already running");
        return Ok(AppiumGuard { _child: None });
    }

    tracing::info!(url = %cfg.appium_url, "starting Appium server");
    let mut command = Command::new("appium");
    if let Some(port) = port_of(&cfg.appium_url) {
        command.args(["--port", &port.to_string()]);
    }
    let child = command
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SeeTapError::Bootstrap(format!("cannot start appium: {e}")))?;

    wait_until_ready(&cfg.appium_url, APPIUM_READY_TIMEOUT).await?;
    Ok(AppiumGuard { _child: Some(child) })
}

/// Poll `GET {url}/status` until the server reports ready.
pub async fn wait_until_ready(url: &str, budget: Duration) -> SeeTapResult<()> {
    let client = reqwest::Client::builder().timeout(Duration::from_secs(2)).build()?;
    let status_url = format!("{}/status", url.trim_end_matches('/'));
    let start = std::time::Instant::now();

    while start.elapsed() < budget {
        if let Ok(resp) = client.get(&status_url).send().await {
            if resp.status().is_success() {
                let ready = resp
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v["value"]["ready"].as_bool())
                    .unwrap_or(true);
                if ready {
                    tracing::info!(elapsed = ?start.elapsed(), "automation server ready");
                    return Ok(());
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    Err(SeeTapError::Bootstrap(format!(
        "automation server at {url} not ready after {budget:?}"
    )))
}

/// Boot the simulator if it is not already running and wait for it.
pub async fn ensure_simulator(cfg: &DeviceConfig) -> SeeTapResult<()> {
    if !cfg.ensure_simulator {
        return Ok(());
    }
    tracing::info!(device = %cfg.device_name, os = %cfg.platform_version, "checking simulator");
    let output = Command::new("xcrun")
        .args(["simctl", "bootstatus", &cfg.device_name, "-b"])
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                SeeTapError::Bootstrap("Xcode command-line tools not found".into())
            }
            _ => SeeTapError::Bootstrap(format!("xcrun: {e}")),
        })?;

    if !output.status.success() {
        return Err(SeeTapError::Bootstrap(format!(
            "simulator '{}' could not be booted: {}",
            cfg.device_name,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    tracing::info!(device = %cfg.device_name, "simulator booted");
    Ok(())
}

fn port_of(url: &str) -> Option<u16> {
    let authority = url.split("://").nth(1).unwrap_or(url).split('/').next()?;
    authority.rsplit_once(':')?.1.parse().ok()
}
