pub mod agent_engine;
pub mod analyzer;
pub mod command;
pub mod config;
pub mod device;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::agent_engine::engine::AutomationLoop;
use crate::analyzer::classifier::LlmStepClassifier;
use crate::analyzer::step_analyzer::StepAnalyzer;
use crate::config::{AppConfig, AutomationMode};
use crate::device::bootstrap::{self, AppiumGuard};
use crate::device::session::DeviceSession;
use crate::errors::{SeeTapError, SeeTapResult};
use crate::executor::dispatcher::ActionExecutor;
use crate::llm::registry::{ProviderRegistry, Role};
use crate::perception::pipeline::PerceptionPipeline;
use crate::perception::resolver::ElementResolver;

/// `RUST_LOG` wins; otherwise `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Make sure the simulator and automation server are up, then open a session.
pub async fn connect(cfg: &AppConfig) -> SeeTapResult<(AppiumGuard, Arc<DeviceSession>)> {
    bootstrap::ensure_simulator(&cfg.device).await?;
    let guard = bootstrap::ensure_appium(&cfg.device).await?;
    let session = DeviceSession::start(
        &cfg.device,
        cfg.automation.call_timeout_secs,
        cfg.debug.screenshot_path.as_ref().map(PathBuf::from),
    )
    .await?
    .with_swipe_hold(cfg.automation.swipe_hold_ms);
    Ok((guard, Arc::new(session)))
}

/// Wire perception, analysis and execution around an open session.
pub fn build_loop(cfg: &AppConfig, session: Arc<DeviceSession>) -> SeeTapResult<AutomationLoop> {
    let registry = ProviderRegistry::from_config(cfg);
    let perception = PerceptionPipeline::from_config(&cfg.perception, &registry)?;
    let resolver = ElementResolver::from_names(&cfg.perception.match_strategies)?;
    let executor = ActionExecutor::new(session.clone(), cfg.automation.call_timeout_secs);

    let automation = AutomationLoop::new(session, perception, resolver, executor, cfg.automation.clone());

    if registry.is_empty() {
        if cfg.automation.mode == AutomationMode::Analyzed {
            return Err(SeeTapError::Config(
                "analyzed mode needs at least one [llm.providers] entry".into(),
            ));
        }
        tracing::info!("no LLM providers configured, running without step analyzer");
        return Ok(automation);
    }

    let (provider, call) = registry.call_config_for_role(Role::Classifier)?;
    tracing::info!(provider = provider.name(), model = %call.model, "step analyzer ready");
    let classifier = LlmStepClassifier::new(provider, call);
    Ok(automation.with_analyzer(StepAnalyzer::new(Arc::new(classifier))))
}

/// Run `f` with the session and close the session afterwards, whatever `f` returned.
pub async fn with_session<T, F, Fut>(session: Arc<DeviceSession>, f: F) -> SeeTapResult<T>
where
    F: FnOnce(Arc<DeviceSession>) -> Fut,
    Fut: Future<Output = SeeTapResult<T>>,
{
    let result = f(session.clone()).await;
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "closing device session failed");
    }
    result
}

/// Run `work` until it finishes or `interrupt` fires. An interrupt is a clean
/// stop; an interrupt source that fails to install is ignored.
pub async fn until_interrupted<W, I>(work: W, interrupt: I) -> SeeTapResult<()>
where
    W: Future<Output = SeeTapResult<()>>,
    I: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        res = work => res,
        Ok(()) = interrupt => {
            tracing::info!("interrupted, stopping");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn session_is_closed_after_success() {
        let server = MockServer::start_async().await;
        let close = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/session/s1");
                then.status(200).json_body(json!({ "value": null }));
            })
            .await;
        let session = Arc::new(DeviceSession::attach(&server.base_url(), "s1", 5).unwrap());

        let out = with_session(session.clone(), |_| async { Ok(42) }).await.unwrap();
        assert_eq!(out, 42);
        close.assert_async().await;
        assert!(!session.is_open().await);
    }

    #[tokio::test]
    async fn session_is_closed_after_fatal_error() {
        let server = MockServer::start_async().await;
        let close = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/session/s1");
                then.status(200).json_body(json!({ "value": null }));
            })
            .await;
        let session = Arc::new(DeviceSession::attach(&server.base_url(), "s1", 5).unwrap());

        let err = with_session(session.clone(), |_| async {
            Err::<(), _>(SeeTapError::Capture("simulator is gone".into()))
        })
        .await
        .unwrap_err();
        assert!(err.is_fatal());
        close.assert_async().await;
        assert!(!session.is_open().await);
    }

    #[tokio::test]
    async fn interrupt_stops_work_and_session_is_closed() {
        let server = MockServer::start_async().await;
        let close = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/session/s1");
                then.status(200).json_body(json!({ "value": null }));
            })
            .await;
        let session = Arc::new(DeviceSession::attach(&server.base_url(), "s1", 5).unwrap());

        with_session(session.clone(), |_| {
            until_interrupted(std::future::pending(), async { Ok(()) })
        })
        .await
        .unwrap();
        close.assert_async().await;
        assert!(!session.is_open().await);
    }

    #[tokio::test]
    async fn failed_interrupt_handler_leaves_work_running() {
        let work = async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Err::<(), _>(SeeTapError::Action("tap rejected".into()))
        };
        let err = until_interrupted(work, async { Err(std::io::Error::other("no signal handler")) })
            .await
            .unwrap_err();
        assert!(matches!(err, SeeTapError::Action(_)));
    }
}
