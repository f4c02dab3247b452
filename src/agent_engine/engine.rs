use std::collections::HashSet;
use std::sync::Arc;

use crate::agent_engine::event_bus::{EventBus, LoopEvent};
use crate::agent_engine::loop_control::RetryBudget;
use crate::agent_engine::state::{InstructionReport, InstructionState};
use crate::analyzer::schema::StepStatus;
use crate::analyzer::step_analyzer::StepAnalyzer;
use crate::command::intent::{Intent, Target};
use crate::command::parser;
use crate::config::{AutomationConfig, AutomationMode};
use crate::errors::{with_timeout, SeeTapError, SeeTapResult};
use crate::executor::action::{ActionOutcome, ActionTarget, ResolvedAction};
use crate::executor::dispatcher::ActionExecutor;
use crate::perception::pipeline::PerceptionPipeline;
use crate::perception::resolver::ElementResolver;
use crate::perception::stability::{wait_for_visual_stability, StabilityConfig};
use crate::perception::traits::ScreenSource;
use crate::perception::types::{Detection, Point, ScreenCapture};

/// Outcome of mapping an intent onto the current screen.
enum Resolution {
    Ready(ResolvedAction),
    NotFound(String),
}

/// Bookkeeping for one instruction across analyzed cycles.
struct Tracker {
    instruction: String,
    state: InstructionState,
    attempts: u32,
    not_found: u32,
    detail: Option<String>,
}

impl Tracker {
    fn new(instruction: &str) -> Self {
        Self {
            instruction: instruction.to_string(),
            state: InstructionState::Pending,
            attempts: 0,
            not_found: 0,
            detail: None,
        }
    }

    fn into_report(self) -> InstructionReport {
        let final_state = match self.state {
            s if s.is_terminal() => s,
            _ if self.attempts > 0 && self.not_found == self.attempts => InstructionState::Unresolvable,
            _ => InstructionState::Exhausted,
        };
        InstructionReport {
            instruction: self.instruction,
            final_state,
            attempts: self.attempts,
            detail: self.detail,
        }
    }
}

/// Drives instructions to completion: capture → perceive/analyze → resolve →
/// execute, with bounded retries on a fresh screen each time.
pub struct AutomationLoop {
    screen: Arc<dyn ScreenSource>,
    perception: PerceptionPipeline,
    resolver: ElementResolver,
    analyzer: Option<StepAnalyzer>,
    executor: ActionExecutor,
    config: AutomationConfig,
    stability: StabilityConfig,
    events: EventBus,
}

impl AutomationLoop {
    pub fn new(
        screen: Arc<dyn ScreenSource>,
        perception: PerceptionPipeline,
        resolver: ElementResolver,
        executor: ActionExecutor,
        config: AutomationConfig,
    ) -> Self {
        let stability = StabilityConfig {
            max_wait_ms: config.settle_timeout_ms,
            check_interval_ms: config.settle_interval_ms,
            ..StabilityConfig::default()
        };
        Self {
            screen,
            perception,
            resolver,
            analyzer: None,
            executor,
            config,
            stability,
            events: EventBus::new(),
        }
    }

    pub fn with_analyzer(mut self, analyzer: StepAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run a batch in order. One report per non-blank instruction; only fatal
    /// errors (session, capture, config) end the batch early.
    pub async fn run_batch(&self, instructions: &[String]) -> SeeTapResult<Vec<InstructionReport>> {
        let instructions: Vec<String> = instructions
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        tracing::info!(count = instructions.len(), mode = ?self.config.mode, "batch started");

        let reports = match self.config.mode {
            AutomationMode::Direct => {
                let mut reports = Vec::with_capacity(instructions.len());
                for instruction in &instructions {
                    let report = self.run_direct(instruction).await?;
                    self.finish(&report);
                    reports.push(report);
                }
                reports
            }
            AutomationMode::Analyzed => {
                let reports = self.run_analyzed(&instructions).await?;
                reports.iter().for_each(|r| self.finish(r));
                reports
            }
        };
        Ok(reports)
    }

    fn finish(&self, report: &InstructionReport) {
        tracing::info!(
            instruction = %report.instruction,
            state = %report.final_state,
            attempts = report.attempts,
            detail = report.detail.as_deref().unwrap_or(""),
            "instruction finished"
        );
        self.events.send(LoopEvent::InstructionFinished(report.clone()));
    }

    // ── Direct mode ─────────────────────────────────────────────────────────

    async fn run_direct(&self, instruction: &str) -> SeeTapResult<InstructionReport> {
        let intent = match parser::parse(instruction) {
            Ok(intent) => intent,
            Err(e) => {
                return Ok(InstructionReport {
                    instruction: instruction.to_string(),
                    final_state: InstructionState::Unresolvable,
                    attempts: 0,
                    detail: Some(e.to_string()),
                })
            }
        };

        if intent.is_unknown() {
            if self.analyzer.is_some() {
                tracing::info!(instruction, "no rule matched, escalating to step analyzer");
                let mut reports = self.run_analyzed(&[instruction.to_string()]).await?;
                if let Some(report) = reports.pop() {
                    return Ok(report);
                }
            }
            return Ok(InstructionReport {
                instruction: instruction.to_string(),
                final_state: InstructionState::Unresolvable,
                attempts: 0,
                detail: Some("instruction not recognized".into()),
            });
        }

        tracing::debug!(instruction, %intent, "parsed");
        let mut tracker = Tracker::new(instruction);
        let mut budget = RetryBudget::new(self.config.max_attempts);
        let device_fallback = !self.perception.is_enabled();

        while budget.try_attempt() {
            tracker.attempts = budget.attempts();
            let detections = if needs_detections(&intent) && self.perception.is_enabled() {
                let capture = self.capture().await?;
                match self.perceive(&capture).await {
                    Ok(d) => d,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        tracing::warn!(instruction, error = %e, attempt = tracker.attempts, "perception failed");
                        tracker.state = InstructionState::Failed;
                        tracker.detail = Some(e.to_string());
                        continue;
                    }
                }
            } else {
                Vec::new()
            };

            match self.resolve(&intent, &detections, device_fallback) {
                Resolution::NotFound(label) => {
                    tracing::info!(instruction, label = %label, attempt = tracker.attempts, "element not found");
                    tracker.not_found += 1;
                    tracker.state = InstructionState::Failed;
                    tracker.detail = Some(SeeTapError::Resolution(label).to_string());
                }
                Resolution::Ready(action) => {
                    tracker.state = InstructionState::Resolved;
                    let outcome = self.execute(instruction, &action).await?;
                    if outcome.success {
                        tracker.state = InstructionState::Done;
                        tracker.detail = None;
                        break;
                    }
                    tracker.state = InstructionState::Failed;
                    tracker.detail = outcome.error;
                }
            }
        }
        Ok(tracker.into_report())
    }

    // ── Analyzed mode ───────────────────────────────────────────────────────

    async fn run_analyzed(&self, instructions: &[String]) -> SeeTapResult<Vec<InstructionReport>> {
        let analyzer = self
            .analyzer
            .as_ref()
            .ok_or_else(|| SeeTapError::Config("analyzed mode needs a classifier role".into()))?;

        let mut trackers: Vec<Tracker> = instructions.iter().map(|i| Tracker::new(i)).collect();
        let mut done: HashSet<String> = HashSet::new();
        let mut cycles = RetryBudget::new(self.config.max_attempts);

        while trackers.iter().any(|t| !t.state.is_terminal()) && cycles.try_attempt() {
            let open: Vec<usize> = (0..trackers.len()).filter(|&i| !trackers[i].state.is_terminal()).collect();
            let pending: Vec<String> = open.iter().map(|&i| trackers[i].instruction.clone()).collect();
            tracing::info!(cycle = cycles.attempts(), pending = pending.len(), "analysis cycle");
            self.events.send(LoopEvent::CycleStarted {
                cycle: cycles.attempts(),
                pending: pending.len(),
            });

            let mut capture = self.capture().await?;
            let analysis = with_timeout(
                self.config.call_timeout_secs,
                "step analysis",
                analyzer.analyze(&pending, &capture, &done),
            )
            .await;
            let results = match analysis {
                Ok(results) => results,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(cycle = cycles.attempts(), error = %e, "analysis failed, no actions this cycle");
                    for &i in &open {
                        let t = &mut trackers[i];
                        t.attempts += 1;
                        t.state = InstructionState::Failed;
                        t.detail = Some(e.to_string());
                    }
                    continue;
                }
            };

            let mut detections: Option<Vec<Detection>> = None;
            let mut completed = Vec::new();

            for (&i, result) in open.iter().zip(&results) {
                let t = &mut trackers[i];
                self.events.send(LoopEvent::StepAnalyzed {
                    instruction: t.instruction.clone(),
                    status: result.status.to_string(),
                    reason: result.reason.clone(),
                });

                match result.status {
                    StepStatus::AlreadyDone => {
                        t.state = InstructionState::Done;
                        t.detail = result.reason.clone();
                        completed.push(t.instruction.clone());
                    }
                    StepStatus::WillBeDoneNext => {
                        t.state = InstructionState::Deferred;
                        t.detail = result.reason.clone();
                    }
                    StepStatus::Unresolvable => {
                        t.state = InstructionState::Unresolvable;
                        t.detail = result.reason.clone();
                    }
                    StepStatus::CanBeDone => {
                        t.attempts += 1;
                        if needs_detections(&result.intent) && detections.is_none() && self.perception.is_enabled() {
                            detections = Some(match self.perceive(&capture).await {
                                Ok(d) => d,
                                Err(e) if e.is_fatal() => return Err(e),
                                Err(e) => {
                                    tracing::warn!(error = %e, "perception failed, resolving against the device");
                                    Vec::new()
                                }
                            });
                        }

                        match self.resolve(&result.intent, detections.as_deref().unwrap_or(&[]), true) {
                            Resolution::NotFound(label) => {
                                t.not_found += 1;
                                t.state = InstructionState::Failed;
                                t.detail = Some(SeeTapError::Resolution(label).to_string());
                            }
                            Resolution::Ready(action) => {
                                t.state = InstructionState::Resolved;
                                let outcome = self.execute(&t.instruction, &action).await?;
                                if outcome.success {
                                    t.state = InstructionState::Done;
                                    t.detail = None;
                                    completed.push(t.instruction.clone());
                                    // The screen moved on; later labels need a fresh look.
                                    if detections.is_some() {
                                        capture = self.capture().await?;
                                        detections = None;
                                    }
                                } else {
                                    t.state = InstructionState::Failed;
                                    t.detail = outcome.error;
                                }
                            }
                        }
                    }
                }
            }

            done.extend(completed);
        }

        Ok(trackers.into_iter().map(Tracker::into_report).collect())
    }

    // ── Collaborator calls ──────────────────────────────────────────────────

    async fn capture(&self) -> SeeTapResult<ScreenCapture> {
        with_timeout(self.config.call_timeout_secs, "screen capture", self.screen.capture_screen())
            .await
            .map_err(|e| match e {
                SeeTapError::Timeout(..) => SeeTapError::Capture(e.to_string()),
                other => other,
            })
    }

    async fn perceive(&self, capture: &ScreenCapture) -> SeeTapResult<Vec<Detection>> {
        with_timeout(self.config.call_timeout_secs, "perception", self.perception.perceive(capture)).await
    }

    async fn execute(&self, instruction: &str, action: &ResolvedAction) -> SeeTapResult<ActionOutcome> {
        let outcome = self.executor.execute(action).await?;
        self.events.send(LoopEvent::ActionCompleted {
            instruction: instruction.to_string(),
            action: action.to_string(),
            success: outcome.success,
            error: outcome.error.clone(),
            timestamp: outcome.timestamp,
        });

        if outcome.success {
            match wait_for_visual_stability(self.screen.as_ref(), &self.stability).await {
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::warn!(error = %e, "settle wait failed"),
            }
        }
        Ok(outcome)
    }

    /// Map an intent onto concrete coordinates or a device element. With
    /// `device_fallback`, an unmatched tap label goes to the device's own
    /// element lookup instead of being reported missing.
    fn resolve(&self, intent: &Intent, detections: &[Detection], device_fallback: bool) -> Resolution {
        let locate = |target: &Target| -> Result<Point, String> {
            match target {
                Target::Point(p) => Ok(*p),
                Target::Label(label) => self
                    .resolver
                    .resolve(label, detections)
                    .map(|d| d.center())
                    .ok_or_else(|| label.clone()),
            }
        };

        match intent {
            Intent::Tap { target } => match (locate(target), target) {
                (Ok(p), _) => Resolution::Ready(ResolvedAction::tap(ActionTarget::Point(p))),
                (Err(label), Target::Label(_)) if device_fallback => {
                    Resolution::Ready(ResolvedAction::tap(ActionTarget::Element(label)))
                }
                (Err(label), _) => Resolution::NotFound(label),
            },
            Intent::LongPress { target, duration } => match locate(target) {
                Ok(p) => Resolution::Ready(ResolvedAction::long_press(p, *duration)),
                Err(label) => Resolution::NotFound(label),
            },
            Intent::Swipe { from, to } => Resolution::Ready(ResolvedAction::swipe(*from, *to)),
            Intent::SendKeys { target, text } => Resolution::Ready(ResolvedAction::send_keys(target, text)),
            Intent::Unknown { .. } => Resolution::Ready(ResolvedAction {
                kind: intent.kind(),
                target: None,
                end: None,
                text: None,
                duration: None,
            }),
        }
    }
}

/// Whether resolving this intent needs detections from the current screen.
fn needs_detections(intent: &Intent) -> bool {
    matches!(
        intent,
        Intent::Tap { target: Target::Label(_) } | Intent::LongPress { target: Target::Label(_), .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::step_analyzer::tests::ScriptedClassifier;
    use crate::executor::dispatcher::tests::RecordingDriver;
    use crate::perception::traits::PerceptionProvider;
    use crate::perception::types::BoundingBox;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeScreen {
        captures: AtomicUsize,
        broken: bool,
    }

    #[async_trait]
    impl ScreenSource for FakeScreen {
        async fn capture_screen(&self) -> SeeTapResult<ScreenCapture> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            if self.broken {
                return Err(SeeTapError::Capture("simulator is gone".into()));
            }
            Ok(ScreenCapture {
                image_bytes: vec![7; 16],
                width: 390,
                height: 844,
            })
        }
    }

    struct FixedDetections(Vec<Detection>);

    #[async_trait]
    impl PerceptionProvider for FixedDetections {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn detect(&self, _: &ScreenCapture) -> SeeTapResult<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    fn login_button() -> Vec<Detection> {
        vec![Detection::new(BoundingBox::new(10.0, 10.0, 50.0, 30.0), "Login button", 0.9)]
    }

    fn config(mode: AutomationMode) -> AutomationConfig {
        AutomationConfig {
            mode,
            max_attempts: 3,
            call_timeout_secs: 5,
            settle_timeout_ms: 0,
            ..AutomationConfig::default()
        }
    }

    struct Harness {
        screen: Arc<FakeScreen>,
        driver: Arc<RecordingDriver>,
        automation: AutomationLoop,
    }

    fn harness(mode: AutomationMode, detections: Vec<Detection>, driver: RecordingDriver) -> Harness {
        let screen = Arc::new(FakeScreen::default());
        let driver = Arc::new(driver);
        let automation = AutomationLoop::new(
            screen.clone(),
            PerceptionPipeline::new(Some(Arc::new(FixedDetections(detections))), 0.0),
            ElementResolver::default(),
            ActionExecutor::new(driver.clone(), 5),
            config(mode),
        );
        Harness {
            screen,
            driver,
            automation,
        }
    }

    fn batch(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn tap_on_detected_label_hits_its_center() {
        let h = harness(AutomationMode::Direct, login_button(), RecordingDriver::default());
        let reports = h.automation.run_batch(&batch(&["tap on Login button"])).await.unwrap();
        assert_eq!(reports[0].final_state, InstructionState::Done);
        assert_eq!(reports[0].attempts, 1);
        assert_eq!(h.driver.calls(), vec!["tap 30,20"]);
    }

    #[tokio::test]
    async fn swipe_by_coordinates_skips_perception() {
        let h = harness(AutomationMode::Direct, login_button(), RecordingDriver::default());
        let reports = h.automation.run_batch(&batch(&["swipe from 10,20 to 300,20"])).await.unwrap();
        assert_eq!(reports[0].final_state, InstructionState::Done);
        assert_eq!(h.driver.calls(), vec!["swipe 10,20 300,20"]);
        assert_eq!(h.screen.captures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_label_is_unresolvable_after_every_attempt_and_batch_continues() {
        let h = harness(AutomationMode::Direct, login_button(), RecordingDriver::default());
        let reports = h
            .automation
            .run_batch(&batch(&["tap on Settings", "tap on Login button"]))
            .await
            .unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].final_state, InstructionState::Unresolvable);
        assert_eq!(reports[0].attempts, 3);
        assert_eq!(reports[1].final_state, InstructionState::Done);
        // three fresh captures for the missing label, one for the found one
        assert_eq!(h.screen.captures.load(Ordering::SeqCst), 4);
        assert_eq!(h.driver.calls(), vec!["tap 30,20"]);
    }

    #[tokio::test]
    async fn failing_action_is_retried_exactly_max_attempts_times() {
        let h = harness(AutomationMode::Direct, login_button(), RecordingDriver::failing());
        let reports = h.automation.run_batch(&batch(&["tap on Login button"])).await.unwrap();
        assert_eq!(reports[0].final_state, InstructionState::Exhausted);
        assert_eq!(reports[0].attempts, 3);
        assert_eq!(h.driver.calls().len(), 3);
        assert!(reports[0].detail.as_deref().unwrap().contains("transport closed"));
    }

    #[tokio::test]
    async fn unrecognized_instruction_without_analyzer_is_unresolvable() {
        let h = harness(AutomationMode::Direct, vec![], RecordingDriver::default());
        let reports = h.automation.run_batch(&batch(&["make it pretty"])).await.unwrap();
        assert_eq!(reports[0].final_state, InstructionState::Unresolvable);
        assert!(h.driver.calls().is_empty());
    }

    #[tokio::test]
    async fn unrecognized_instruction_escalates_to_analyzer() {
        let reply = r#"[{"original_step": "open the menu", "action": "tap", "coordinates": "20,40", "status": "can_be_done"}]"#;
        let h = harness(AutomationMode::Direct, vec![], RecordingDriver::default());
        let automation = h
            .automation
            .with_analyzer(StepAnalyzer::new(Arc::new(ScriptedClassifier::new(vec![Ok(reply.into())]))));
        let reports = automation.run_batch(&batch(&["open the menu"])).await.unwrap();
        assert_eq!(reports[0].final_state, InstructionState::Done);
        assert_eq!(h.driver.calls(), vec!["tap 20,40"]);
    }

    #[tokio::test]
    async fn malformed_analysis_executes_nothing_and_counts_as_attempts() {
        let classifier = Arc::new(ScriptedClassifier::new(vec![Ok("not json at all".into())]));
        let h = harness(AutomationMode::Analyzed, login_button(), RecordingDriver::default());
        let automation = h.automation.with_analyzer(StepAnalyzer::new(classifier.clone()));

        let reports = automation.run_batch(&batch(&["tap Login", "tap Pay"])).await.unwrap();
        assert!(h.driver.calls().is_empty());
        assert_eq!(classifier.calls(), 3);
        for r in &reports {
            assert_eq!(r.final_state, InstructionState::Exhausted);
            assert_eq!(r.attempts, 3);
            assert!(r.detail.as_deref().unwrap().starts_with("Classification"), "{r}");
        }
    }

    #[tokio::test]
    async fn analyzed_cycles_defer_then_complete() {
        let first = r#"[
            {"original_step": "tap Login", "action": "tap", "element": "Login button", "status": "can_be_done"},
            {"original_step": "type name", "action": "send_keys", "element": "name", "text": "bob",
             "status": "will_be_done_next", "reason": "form not shown yet"}
        ]"#;
        let second = r#"[{"original_step": "type name", "action": "send_keys", "element": "name", "text": "bob", "status": "can_be_done"}]"#;
        let classifier = Arc::new(ScriptedClassifier::new(vec![Ok(first.into()), Ok(second.into())]));
        let h = harness(AutomationMode::Analyzed, login_button(), RecordingDriver::default());
        let automation = h.automation.with_analyzer(StepAnalyzer::new(classifier.clone()));

        let reports = automation.run_batch(&batch(&["tap Login", "type name"])).await.unwrap();
        assert_eq!(reports[0].final_state, InstructionState::Done);
        assert_eq!(reports[1].final_state, InstructionState::Done);
        assert_eq!(h.driver.calls(), vec!["tap 30,20", "send_keys name=bob"]);
        assert_eq!(*classifier.seen.lock().unwrap(), vec![batch(&["tap Login", "type name"]), batch(&["type name"])]);
    }

    #[tokio::test]
    async fn unmatched_label_in_analyzed_mode_uses_device_lookup() {
        let reply = r#"[{"original_step": "tap Pay", "action": "tap", "element": "Pay", "status": "can_be_done"}]"#;
        let h = harness(AutomationMode::Analyzed, login_button(), RecordingDriver::default());
        let automation = h
            .automation
            .with_analyzer(StepAnalyzer::new(Arc::new(ScriptedClassifier::new(vec![Ok(reply.into())]))));
        let reports = automation.run_batch(&batch(&["tap Pay"])).await.unwrap();
        assert_eq!(reports[0].final_state, InstructionState::Done);
        assert_eq!(h.driver.calls(), vec!["tap_element Pay"]);
    }

    #[tokio::test]
    async fn step_the_classifier_rejects_is_reported_once() {
        let reply = r#"[{"original_step": "tap", "action": "tap", "coordinates": "999,999", "status": "can_be_done"}]"#;
        let h = harness(AutomationMode::Analyzed, vec![], RecordingDriver::default());
        let automation = h
            .automation
            .with_analyzer(StepAnalyzer::new(Arc::new(ScriptedClassifier::new(vec![Ok(reply.into())]))));
        let mut rx = automation.events().subscribe();
        let reports = automation.run_batch(&batch(&["tap the corner"])).await.unwrap();
        assert_eq!(reports[0].final_state, InstructionState::Unresolvable);
        assert!(h.driver.calls().is_empty());

        let mut finished = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, LoopEvent::InstructionFinished(_)) {
                finished += 1;
            }
        }
        assert_eq!(finished, 1);
    }

    #[tokio::test]
    async fn analyzed_mode_without_classifier_is_a_config_error() {
        let h = harness(AutomationMode::Analyzed, vec![], RecordingDriver::default());
        let err = h.automation.run_batch(&batch(&["tap Login"])).await.unwrap_err();
        assert!(matches!(err, SeeTapError::Config(_)));
    }

    #[tokio::test]
    async fn lost_screen_aborts_the_batch() {
        let screen = Arc::new(FakeScreen {
            broken: true,
            ..Default::default()
        });
        let driver = Arc::new(RecordingDriver::default());
        let automation = AutomationLoop::new(
            screen,
            PerceptionPipeline::new(Some(Arc::new(FixedDetections(login_button()))), 0.0),
            ElementResolver::default(),
            ActionExecutor::new(driver.clone(), 5),
            config(AutomationMode::Direct),
        );
        let err = automation.run_batch(&batch(&["tap on Login button"])).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn lost_session_during_an_action_aborts_without_retry() {
        let h = harness(AutomationMode::Direct, vec![], RecordingDriver::session_lost());
        let err = h
            .automation
            .run_batch(&batch(&["swipe from 10,20 to 300,20", "swipe from 300,20 to 10,20"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SeeTapError::Session(_)));
        assert_eq!(h.driver.calls(), vec!["swipe 10,20 300,20"]);
    }

    #[tokio::test]
    async fn lost_session_aborts_an_analyzed_cycle() {
        let reply = r#"[
            {"original_step": "tap Login", "action": "tap", "element": "Login button", "status": "can_be_done"},
            {"original_step": "tap Pay", "action": "tap", "coordinates": "5,5", "status": "can_be_done"}
        ]"#;
        let h = harness(AutomationMode::Analyzed, login_button(), RecordingDriver::session_lost());
        let automation = h
            .automation
            .with_analyzer(StepAnalyzer::new(Arc::new(ScriptedClassifier::new(vec![Ok(reply.into())]))));
        let err = automation.run_batch(&batch(&["tap Login", "tap Pay"])).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(h.driver.calls(), vec!["tap 30,20"]);
    }
}
