//! Mode-aware analysis dispatch: quota gating, the remote model call
//! with timeout and supersession, fail-open deduction, and shape
//! parsing. Collaborators are injected so tests run against fakes.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use log::warn;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    context::ContextPayload,
    credits::QuotaGate,
    llm::{CompletionRequest, ModelClient, ModelError},
    settings::SettingsStore,
    transcript::{TranscriptAnalyses, TranscriptSnapshot},
};

use super::{
    error::AnalysisError,
    mode::{Mode, ResponseShape, SEGMENT_ANALYSIS_PROMPT, SEGMENT_ANALYSIS_TEMPERATURE},
    parser,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub mode: Mode,
    pub answer: String,
    pub steps: Option<String>,
    /// Populated for extraction modes only.
    pub items: Option<Vec<Value>>,
}

pub struct AnalysisEngine {
    model: Arc<dyn ModelClient>,
    quota: Arc<dyn QuotaGate>,
    settings: Arc<SettingsStore>,
    /// Latched after an auth failure so a known-bad credential is not
    /// hammered; reset when settings change.
    auth_failed: AtomicBool,
    /// Token for the in-flight context analysis; a new request cancels
    /// its predecessor.
    in_flight: Mutex<Option<(u64, CancellationToken)>>,
    /// Separate slot for the per-segment pass so it never supersedes a
    /// user-triggered analysis (or vice versa).
    segment_in_flight: Mutex<Option<(u64, CancellationToken)>>,
    request_counter: AtomicU64,
}

impl AnalysisEngine {
    pub fn new(
        model: Arc<dyn ModelClient>,
        quota: Arc<dyn QuotaGate>,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self {
            model,
            quota,
            settings,
            auth_failed: AtomicBool::new(false),
            in_flight: Mutex::new(None),
            segment_in_flight: Mutex::new(None),
            request_counter: AtomicU64::new(0),
        }
    }

    /// Forget a previously latched auth failure, e.g. after the user
    /// updated their API key.
    pub fn reset_auth(&self) {
        self.auth_failed.store(false, Ordering::Relaxed);
    }

    /// Run one mode against an assembled payload.
    pub async fn run(
        &self,
        mode: Mode,
        payload: &ContextPayload,
    ) -> Result<AnalysisResult, AnalysisError> {
        // The assembler already validated, but the engine is also
        // callable directly.
        if payload.is_empty() {
            return Err(AnalysisError::NoContext);
        }

        let request = CompletionRequest {
            system_prompt: mode.system_prompt().to_string(),
            user_message: payload.to_prompt(),
            temperature: mode.temperature(),
            max_tokens: self.settings.model().max_tokens,
        };

        let (id, token) = self.begin(&self.in_flight);
        let raw = self.complete_gated(request, &token).await;
        Self::finish(&self.in_flight, id);
        let raw = raw?;

        Ok(match mode.shape() {
            ResponseShape::Prose => AnalysisResult {
                mode,
                answer: raw.trim().to_string(),
                steps: None,
                items: None,
            },
            ResponseShape::Delimited => {
                let parts = parser::parse_marker_response(&raw);
                AnalysisResult {
                    mode,
                    answer: parts.answer,
                    steps: parts.steps,
                    items: None,
                }
            }
            ResponseShape::Extraction => AnalysisResult {
                mode,
                answer: String::new(),
                steps: None,
                items: Some(parser::parse_extraction_response(&raw)),
            },
        })
    }

    /// Tag every segment of a transcript snapshot. The overlay carries
    /// the snapshot's generation so a later `clear()` invalidates it.
    pub async fn analyze_segments(
        &self,
        snapshot: &TranscriptSnapshot,
    ) -> Result<TranscriptAnalyses, AnalysisError> {
        if snapshot.segments.is_empty() {
            return Err(AnalysisError::NoContext);
        }

        let numbered = snapshot
            .segments
            .iter()
            .map(|segment| format!("{}. {}", segment.index, segment.text))
            .collect::<Vec<_>>()
            .join("\n");

        let request = CompletionRequest {
            system_prompt: SEGMENT_ANALYSIS_PROMPT.to_string(),
            user_message: numbered,
            temperature: SEGMENT_ANALYSIS_TEMPERATURE,
            max_tokens: self.settings.model().max_tokens,
        };

        let (id, token) = self.begin(&self.segment_in_flight);
        let raw = self.complete_gated(request, &token).await;
        Self::finish(&self.segment_in_flight, id);
        let raw = raw?;

        Ok(TranscriptAnalyses {
            generation: snapshot.generation,
            entries: parser::parse_segment_analyses(&raw, snapshot.segments.len()),
        })
    }

    /// The shared gated path: auth latch, quota check, bounded model
    /// call, fail-open deduction.
    async fn complete_gated(
        &self,
        request: CompletionRequest,
        token: &CancellationToken,
    ) -> Result<String, AnalysisError> {
        if self.auth_failed.load(Ordering::Relaxed) {
            return Err(AnalysisError::Auth);
        }

        match self.quota.can_proceed().await {
            Ok(true) => {}
            Ok(false) => return Err(AnalysisError::QuotaExceeded),
            // A broken ledger must not block answers; only an explicit
            // "no" does.
            Err(err) => warn!("quota check failed, allowing request: {err:#}"),
        }

        let timeout = Duration::from_secs(self.settings.model().request_timeout_secs);
        let call = self.model.complete(request);

        let raw = tokio::select! {
            _ = token.cancelled() => return Err(AnalysisError::Cancelled),
            outcome = tokio::time::timeout(timeout, call) => match outcome {
                Err(_) => return Err(AnalysisError::ServiceUnavailable),
                Ok(Err(ModelError::Auth)) => {
                    self.auth_failed.store(true, Ordering::Relaxed);
                    return Err(AnalysisError::Auth);
                }
                Ok(Err(err)) => return Err(err.into()),
                Ok(Ok(raw)) => raw,
            }
        };

        // Deduction is bookkeeping: a generated answer is never
        // withheld, and never billed twice, over a ledger error.
        if let Err(err) = self.quota.deduct(1).await {
            warn!("credit deduction failed, returning result anyway: {err:#}");
        }

        Ok(raw)
    }

    fn begin(
        &self,
        slot: &Mutex<Option<(u64, CancellationToken)>>,
    ) -> (u64, CancellationToken) {
        let id = self.request_counter.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let mut guard = slot.lock().unwrap();
        if let Some((_, previous)) = guard.replace((id, token.clone())) {
            previous.cancel();
        }
        (id, token)
    }

    fn finish(slot: &Mutex<Option<(u64, CancellationToken)>>, id: u64) {
        let mut guard = slot.lock().unwrap();
        // Only clear the slot if it still belongs to this request; a
        // newer request may already occupy it.
        if guard.as_ref().map(|(current, _)| *current) == Some(id) {
            guard.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::TranscriptStore;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;

    enum FakeReply {
        Text(String),
        AuthFailure,
        Unavailable,
        HangForever,
        SleepHour,
    }

    struct FakeModel {
        calls: AtomicU32,
        last_user_message: Mutex<Option<String>>,
        script: Mutex<VecDeque<FakeReply>>,
    }

    impl FakeModel {
        fn scripted(replies: Vec<FakeReply>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                last_user_message: Mutex::new(None),
                script: Mutex::new(replies.into()),
            })
        }

        fn replying(text: &str) -> Arc<Self> {
            Self::scripted(vec![FakeReply::Text(text.to_string())])
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelClient for FakeModel {
        async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_user_message.lock().unwrap() = Some(request.user_message);

            let reply = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(FakeReply::Text("ok".into()));

            match reply {
                FakeReply::Text(text) => Ok(text),
                FakeReply::AuthFailure => Err(ModelError::Auth),
                FakeReply::Unavailable => Err(ModelError::Unavailable("down".into())),
                FakeReply::HangForever => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                FakeReply::SleepHour => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok("too late".into())
                }
            }
        }
    }

    struct FakeGate {
        allowed: bool,
        check_errors: bool,
        deduct_errors: bool,
        deductions: AtomicU32,
    }

    impl FakeGate {
        fn allowing() -> Arc<Self> {
            Arc::new(Self {
                allowed: true,
                check_errors: false,
                deduct_errors: false,
                deductions: AtomicU32::new(0),
            })
        }

        fn denying() -> Arc<Self> {
            Arc::new(Self {
                allowed: false,
                check_errors: false,
                deduct_errors: false,
                deductions: AtomicU32::new(0),
            })
        }

        fn with_broken_deduct() -> Arc<Self> {
            Arc::new(Self {
                allowed: true,
                check_errors: false,
                deduct_errors: true,
                deductions: AtomicU32::new(0),
            })
        }

        fn with_broken_check() -> Arc<Self> {
            Arc::new(Self {
                allowed: false,
                check_errors: true,
                deduct_errors: false,
                deductions: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl QuotaGate for FakeGate {
        async fn can_proceed(&self) -> anyhow::Result<bool> {
            if self.check_errors {
                return Err(anyhow!("ledger unreachable"));
            }
            Ok(self.allowed)
        }

        async fn deduct(&self, amount: u32) -> anyhow::Result<()> {
            if self.deduct_errors {
                return Err(anyhow!("ledger write failed"));
            }
            self.deductions.fetch_add(amount, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_settings() -> Arc<SettingsStore> {
        let path = std::env::temp_dir().join(format!(
            "lectern-engine-test-{}.json",
            uuid::Uuid::new_v4()
        ));
        Arc::new(SettingsStore::new(path).unwrap())
    }

    fn engine(model: Arc<FakeModel>, gate: Arc<FakeGate>) -> AnalysisEngine {
        AnalysisEngine::new(model, gate, test_settings())
    }

    fn payload(text: &str) -> ContextPayload {
        ContextPayload::assemble(None, None, Some(text.into())).unwrap()
    }

    #[tokio::test]
    async fn denied_quota_never_reaches_the_model() {
        let model = FakeModel::replying("unused");
        let engine = engine(model.clone(), FakeGate::denying());

        let err = engine.run(Mode::Explain, &payload("q")).await.unwrap_err();
        assert!(matches!(err, AnalysisError::QuotaExceeded));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn broken_quota_check_fails_open() {
        let model = FakeModel::replying("answer");
        let engine = engine(model.clone(), FakeGate::with_broken_check());

        let result = engine.run(Mode::Explain, &payload("q")).await.unwrap();
        assert_eq!(result.answer, "answer");
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn broken_deduction_still_returns_the_answer() {
        let model = FakeModel::replying("the answer");
        let engine = engine(model.clone(), FakeGate::with_broken_deduct());

        let result = engine.run(Mode::Explain, &payload("q")).await.unwrap();
        assert_eq!(result.answer, "the answer");
    }

    #[tokio::test]
    async fn empty_payload_fails_before_gate_or_model() {
        let model = FakeModel::replying("unused");
        let gate = FakeGate::allowing();
        let engine = engine(model.clone(), gate.clone());

        let empty = ContextPayload {
            screen_text: None,
            transcript_text: None,
            instruction: None,
        };
        let err = engine.run(Mode::Explain, &empty).await.unwrap_err();
        assert!(matches!(err, AnalysisError::NoContext));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn auth_failure_latches_until_reset() {
        let model = FakeModel::scripted(vec![FakeReply::AuthFailure, FakeReply::Text("ok".into())]);
        let engine = engine(model.clone(), FakeGate::allowing());

        let first = engine.run(Mode::Explain, &payload("q")).await.unwrap_err();
        assert!(matches!(first, AnalysisError::Auth));

        // Latched: the known-bad credential is not retried.
        let second = engine.run(Mode::Explain, &payload("q")).await.unwrap_err();
        assert!(matches!(second, AnalysisError::Auth));
        assert_eq!(model.call_count(), 1);

        engine.reset_auth();
        let third = engine.run(Mode::Explain, &payload("q")).await.unwrap();
        assert_eq!(third.answer, "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out_as_service_unavailable() {
        let model = FakeModel::scripted(vec![FakeReply::SleepHour]);
        let gate = FakeGate::allowing();
        let engine = engine(model, gate.clone());

        let err = engine.run(Mode::Explain, &payload("q")).await.unwrap_err();
        assert!(matches!(err, AnalysisError::ServiceUnavailable));
        // Nothing was generated, nothing is billed.
        assert_eq!(gate.deductions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn newer_request_supersedes_and_spares_quota() {
        let model = FakeModel::scripted(vec![
            FakeReply::HangForever,
            FakeReply::Text("second wins".into()),
        ]);
        let gate = FakeGate::allowing();
        let engine = Arc::new(engine(model, gate.clone()));

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run(Mode::QuickAnswer, &payload("one")).await })
        };
        // Let the first request register as in-flight.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = engine.run(Mode::QuickAnswer, &payload("two")).await.unwrap();
        assert_eq!(second.answer, "second wins");

        let first = first.await.unwrap().unwrap_err();
        assert!(matches!(first, AnalysisError::Cancelled));
        // Only the completed request is billed.
        assert_eq!(gate.deductions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delimited_mode_parses_markers() {
        let model = FakeModel::replying("---ANSWER---\n42\n---STEPS---\n1. think");
        let engine = engine(model, FakeGate::allowing());

        let result = engine.run(Mode::QuickAnswer, &payload("q")).await.unwrap();
        assert_eq!(result.answer, "42");
        assert_eq!(result.steps.as_deref(), Some("1. think"));
    }

    #[tokio::test]
    async fn extraction_mode_returns_items() {
        let model = FakeModel::replying(r#"[{"concept": "entropy", "definition": "disorder"}]"#);
        let engine = engine(model, FakeGate::allowing());

        let result = engine
            .run(Mode::ExtractConcepts, &payload("q"))
            .await
            .unwrap();
        let items = result.items.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["concept"], "entropy");
    }

    #[tokio::test]
    async fn transcript_flows_into_the_prompt_and_bills_one_credit() {
        let store = TranscriptStore::new();
        store.append("Today we discuss entropy.".into(), Utc::now());
        store.append("This will be on the exam.".into(), Utc::now());

        let model = FakeModel::replying("entropy matters");
        let gate = FakeGate::allowing();
        let engine = engine(model.clone(), gate.clone());

        let payload =
            ContextPayload::assemble(None, Some(store.joined_text()), None).unwrap();
        let result = engine.run(Mode::Explain, &payload).await.unwrap();
        assert!(!result.answer.is_empty());

        let prompt = model.last_user_message.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("Today we discuss entropy."));
        assert!(prompt.contains("This will be on the exam."));
        assert_eq!(gate.deductions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn segment_overlay_aligns_with_snapshot() {
        let store = TranscriptStore::new();
        store.append("intro".into(), Utc::now());
        store.append("detail".into(), Utc::now());
        store.append("aside".into(), Utc::now());
        let snapshot = store.snapshot();

        let model = FakeModel::replying(
            r#"[
                {"index": 0, "tags": ["new-topic"], "topicLabel": "intro"},
                {"index": 2, "tags": ["example"], "importance": "low"}
            ]"#,
        );
        let engine = engine(model, FakeGate::allowing());

        let overlay = engine.analyze_segments(&snapshot).await.unwrap();
        assert_eq!(overlay.generation, snapshot.generation);
        assert_eq!(overlay.entries.len(), 3);
        assert!(overlay.for_segment(0).is_some());
        assert!(overlay.for_segment(1).is_none());
        assert!(overlay.for_segment(2).is_some());

        // A segment appended after the run has no entry and causes no
        // misalignment.
        store.append("late".into(), Utc::now());
        assert!(overlay.for_segment(3).is_none());

        // A clear invalidates the overlay wholesale.
        let new_generation = store.clear();
        assert!(overlay.is_stale(new_generation));
    }

    #[tokio::test]
    async fn transient_model_failure_maps_to_taxonomy() {
        let model = FakeModel::scripted(vec![FakeReply::Unavailable]);
        let engine = engine(model, FakeGate::allowing());

        let err = engine.run(Mode::Explain, &payload("q")).await.unwrap_err();
        assert!(matches!(err, AnalysisError::ServiceUnavailable));
        assert!(err.is_retryable());
    }
}
