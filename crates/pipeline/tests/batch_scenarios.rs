//! End-to-end batch behavior against a scripted in-memory backend and
//! store: partial failure isolation, timeouts, the concurrency cap,
//! variant fan-out, and cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use shotforge_bria::api::{BriaApiError, StatusResponse, SubmitResponse};
use shotforge_bria::{GenerationBackend, PollConfig};
use shotforge_core::{ErrorKind, JobPayload, JobSpec, StructuredPrompt, TaskOutcome};
use shotforge_db::{GeneratedImageRecord, ImageStore, StoreError, VariantRecord};
use shotforge_pipeline::{BatchConfig, BatchCoordinator, BatchDeps, RefinementBase, VariantRequest};

// ---------------------------------------------------------------------------
// Mock backend
// ---------------------------------------------------------------------------

/// How the mock treats a job, keyed by the submitted prompt text.
#[derive(Clone)]
enum Behavior {
    /// Report `IN_PROGRESS` for `after_polls` queries, then `COMPLETED`
    /// with the given structured prompt value.
    Complete {
        after_polls: usize,
        structured_prompt: serde_json::Value,
    },
    /// Report `ERROR` on the first query.
    Fail,
    /// Never reach a terminal state.
    NeverTerminal,
}

fn quick_complete() -> Behavior {
    Behavior::Complete {
        after_polls: 1,
        structured_prompt: serde_json::json!("{\"style\":\"studio\"}"),
    }
}

struct JobState {
    behavior: Behavior,
    polls: usize,
    terminal_reported: bool,
}

/// Scripted backend that also observes how many jobs are in flight
/// (submitted but not yet reported terminal) at any instant.
struct MockBackend {
    behaviors: HashMap<String, Behavior>,
    jobs: Mutex<HashMap<String, JobState>>,
    next_id: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockBackend {
    fn new(behaviors: HashMap<String, Behavior>) -> Self {
        Self {
            behaviors,
            jobs: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Highest status-query count across all submitted jobs.
    fn max_polls(&self) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .values()
            .map(|j| j.polls)
            .max()
            .unwrap_or(0)
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn submit(&self, body: &serde_json::Value) -> Result<SubmitResponse, BriaApiError> {
        let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
        let behavior = self
            .behaviors
            .get(&prompt)
            .cloned()
            .unwrap_or_else(quick_complete);

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request_id = format!("req-{id}");
        self.jobs.lock().unwrap().insert(
            request_id.clone(),
            JobState {
                behavior,
                polls: 0,
                terminal_reported: false,
            },
        );

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        Ok(SubmitResponse { request_id })
    }

    async fn get_status(&self, request_id: &str) -> Result<StatusResponse, BriaApiError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(request_id).expect("unknown request id");
        job.polls += 1;

        let value = match &job.behavior {
            Behavior::NeverTerminal => serde_json::json!({"status": "IN_PROGRESS"}),
            Behavior::Fail => serde_json::json!({
                "status": "ERROR",
                "error": {"message": "generation rejected"}
            }),
            Behavior::Complete {
                after_polls,
                structured_prompt,
            } => {
                if job.polls <= *after_polls {
                    serde_json::json!({"status": "IN_PROGRESS"})
                } else {
                    let id: usize = request_id
                        .trim_start_matches("req-")
                        .parse()
                        .unwrap_or_default();
                    serde_json::json!({
                        "status": "COMPLETED",
                        "result": {
                            "image_url": format!("https://cdn.example.com/{request_id}.png"),
                            "seed": 1000 + id as i64,
                            "structured_prompt": structured_prompt,
                        }
                    })
                }
            }
        };

        let terminal = value["status"] == "COMPLETED" || value["status"] == "ERROR";
        if terminal && !job.terminal_reported {
            job.terminal_reported = true;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        Ok(serde_json::from_value(value).unwrap())
    }

    async fn fetch_asset(&self, _url: &str) -> Result<Vec<u8>, BriaApiError> {
        Ok(b"img".to_vec())
    }
}

// ---------------------------------------------------------------------------
// Mock store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryStore {
    inserted: Mutex<Vec<GeneratedImageRecord>>,
    variants: Mutex<Vec<(String, VariantRecord)>>,
    /// Shot labels whose insert fails with a database error.
    fail_labels: Vec<String>,
}

impl MemoryStore {
    fn failing_for(labels: &[&str]) -> Self {
        Self {
            fail_labels: labels.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn inserted_labels(&self) -> Vec<String> {
        self.inserted
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.shot_type.clone())
            .collect()
    }
}

#[async_trait]
impl ImageStore for MemoryStore {
    async fn insert_generated(&self, record: &GeneratedImageRecord) -> Result<(), StoreError> {
        if self.fail_labels.contains(&record.shot_type) {
            return Err(StoreError::Database("connection reset".to_string()));
        }
        self.inserted.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn attach_variant(
        &self,
        base_request_id: &str,
        record: &VariantRecord,
    ) -> Result<(), StoreError> {
        if self.fail_labels.contains(&record.variant_label) {
            return Err(StoreError::Database("connection reset".to_string()));
        }
        self.variants
            .lock()
            .unwrap()
            .push((base_request_id.to_string(), record.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_config(max_concurrency: usize) -> BatchConfig {
    BatchConfig {
        max_concurrency,
        per_job_timeout: Duration::from_secs(60),
        poll: PollConfig {
            interval: Duration::from_secs(1),
            deadline: Duration::from_secs(5),
            download_dir: None,
        },
        pacing_delay: Duration::ZERO,
    }
}

fn text_spec(label: &str) -> JobSpec {
    JobSpec::new(
        label,
        JobPayload::Text {
            prompt: format!("prompt for {label}"),
        },
    )
}

fn coordinator(
    behaviors: HashMap<String, Behavior>,
    store: MemoryStore,
    max_concurrency: usize,
) -> (BatchCoordinator, Arc<MockBackend>, Arc<MemoryStore>) {
    coordinator_with_config(behaviors, store, test_config(max_concurrency))
}

fn coordinator_with_config(
    behaviors: HashMap<String, Behavior>,
    store: MemoryStore,
    config: BatchConfig,
) -> (BatchCoordinator, Arc<MockBackend>, Arc<MemoryStore>) {
    let backend = Arc::new(MockBackend::new(behaviors));
    let store = Arc::new(store);
    let deps = BatchDeps {
        backend: Arc::clone(&backend) as Arc<dyn GenerationBackend>,
        store: Arc::clone(&store) as Arc<dyn ImageStore>,
    };
    let coordinator = BatchCoordinator::new(deps, config).unwrap();
    (coordinator, backend, store)
}

fn kind_of<'a>(outcomes: &'a [TaskOutcome], label: &str) -> &'a TaskOutcome {
    outcomes
        .iter()
        .find(|o| o.label() == label)
        .unwrap_or_else(|| panic!("no outcome for {label}"))
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn scenario_backend_error_isolated_to_one_job() {
    // Batch of 4, backend reports ERROR for one.
    let behaviors = HashMap::from([("prompt for detail".to_string(), Behavior::Fail)]);
    let (coordinator, _backend, store) = coordinator(behaviors, MemoryStore::default(), 4);

    let specs = vec![
        text_spec("hero"),
        text_spec("detail"),
        text_spec("environment"),
        text_spec("flatlay"),
    ];
    let outcomes = coordinator
        .run_batch(specs, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 4);
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 3);
    assert_eq!(
        kind_of(&outcomes, "detail").error_kind(),
        Some(ErrorKind::ApiError)
    );
    // Only the three successes were persisted.
    let mut labels = store.inserted_labels();
    labels.sort();
    assert_eq!(labels, vec!["environment", "flatlay", "hero"]);
}

#[tokio::test(start_paused = true)]
async fn scenario_poll_deadline_times_out_without_touching_siblings() {
    // One job never terminates; deadline 5s, interval 1s.
    let behaviors = HashMap::from([(
        "prompt for environment".to_string(),
        Behavior::NeverTerminal,
    )]);
    let (coordinator, backend, _store) = coordinator(behaviors, MemoryStore::default(), 4);

    let specs = vec![
        text_spec("hero"),
        text_spec("environment"),
        text_spec("detail"),
    ];
    let outcomes = coordinator
        .run_batch(specs, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert_eq!(
        kind_of(&outcomes, "environment").error_kind(),
        Some(ErrorKind::Timeout)
    );
    assert!(kind_of(&outcomes, "hero").is_ok());
    assert!(kind_of(&outcomes, "detail").is_ok());

    // The stuck job polled ~5 times before the deadline tripped; its
    // siblings finished after 2.
    let polls = backend.max_polls();
    assert!((5..=7).contains(&polls), "expected ~5 polls, got {polls}");
}

#[tokio::test(start_paused = true)]
async fn scenario_concurrency_cap_respected() {
    // 5 jobs through a gate of 2, each completing after 2 polls.
    let slow = Behavior::Complete {
        after_polls: 2,
        structured_prompt: serde_json::json!("{\"style\":\"studio\"}"),
    };
    let behaviors: HashMap<String, Behavior> = (0..5)
        .map(|i| (format!("prompt for shot-{i}"), slow.clone()))
        .collect();
    let (coordinator, backend, _store) = coordinator(behaviors, MemoryStore::default(), 2);

    let specs: Vec<JobSpec> = (0..5).map(|i| text_spec(&format!("shot-{i}"))).collect();
    let outcomes = coordinator
        .run_batch(specs, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 5);
    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert!(
        backend.max_in_flight() <= 2,
        "observed {} concurrent jobs",
        backend.max_in_flight()
    );
}

#[tokio::test(start_paused = true)]
async fn scenario_malformed_structured_prompt_is_still_ok() {
    let behaviors = HashMap::from([(
        "prompt for hero".to_string(),
        Behavior::Complete {
            after_polls: 1,
            structured_prompt: serde_json::json!("{this is not json"),
        },
    )]);
    let (coordinator, _backend, _store) = coordinator(behaviors, MemoryStore::default(), 4);

    let outcomes = coordinator
        .run_batch(vec![text_spec("hero")], &CancellationToken::new())
        .await
        .unwrap();

    match &outcomes[0] {
        TaskOutcome::Ok { data, .. } => {
            assert_eq!(
                data.structured_prompt,
                StructuredPrompt::Raw("{this is not json".to_string())
            );
        }
        other => panic!("expected ok outcome, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn db_failure_does_not_block_siblings() {
    let (coordinator, _backend, store) = coordinator(
        HashMap::new(),
        MemoryStore::failing_for(&["detail"]),
        4,
    );

    let specs = vec![text_spec("hero"), text_spec("detail"), text_spec("flatlay")];
    let outcomes = coordinator
        .run_batch(specs, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert_eq!(
        kind_of(&outcomes, "detail").error_kind(),
        Some(ErrorKind::DbError)
    );
    assert!(kind_of(&outcomes, "hero").is_ok());
    assert!(kind_of(&outcomes, "flatlay").is_ok());

    let mut labels = store.inserted_labels();
    labels.sort();
    assert_eq!(labels, vec!["flatlay", "hero"]);
}

#[tokio::test(start_paused = true)]
async fn invalid_spec_gets_input_error_outcome_in_full_batch() {
    let (coordinator, _backend, _store) = coordinator(HashMap::new(), MemoryStore::default(), 4);

    let specs = vec![
        text_spec("hero"),
        JobSpec::new(
            "broken",
            JobPayload::Text {
                prompt: String::new(),
            },
        ),
    ];
    let outcomes = coordinator
        .run_batch(specs, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(
        kind_of(&outcomes, "broken").error_kind(),
        Some(ErrorKind::InputError)
    );
    assert!(kind_of(&outcomes, "hero").is_ok());
}

#[tokio::test(start_paused = true)]
async fn per_job_timeout_bounds_submission_plus_polling() {
    let behaviors = HashMap::from([("prompt for hero".to_string(), Behavior::NeverTerminal)]);
    let mut config = test_config(4);
    // The runner-level timeout fires before the poll deadline would.
    config.per_job_timeout = Duration::from_secs(3);
    config.poll.deadline = Duration::from_secs(300);
    let (coordinator, _backend, _store) =
        coordinator_with_config(behaviors, MemoryStore::default(), config);

    let outcomes = coordinator
        .run_batch(vec![text_spec("hero")], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcomes[0].error_kind(), Some(ErrorKind::Timeout));
}

#[tokio::test(start_paused = true)]
async fn variant_fanout_attaches_to_base_record() {
    let (coordinator, _backend, store) = coordinator(HashMap::new(), MemoryStore::default(), 4);

    let base = RefinementBase {
        request_id: "req-base".to_string(),
        seed: 4242,
        structured_prompt: StructuredPrompt::Json(serde_json::json!({"style": "studio"})),
    };
    let variants: Vec<VariantRequest> = shotforge_core::variants::variant_group("lighting")
        .unwrap()
        .iter()
        .map(VariantRequest::from)
        .collect();

    let outcomes = coordinator
        .run_variant_batch(&base, &variants, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 5);
    assert!(outcomes.iter().all(|o| o.is_ok()));

    let attached = store.variants.lock().unwrap();
    assert_eq!(attached.len(), 5);
    for (base_id, record) in attached.iter() {
        assert_eq!(base_id, "req-base");
        assert_eq!(record.refinement_data.previous_seed, 4242);
        assert_eq!(
            record.registry_version,
            shotforge_core::variants::REGISTRY_VERSION
        );
    }
}

#[tokio::test(start_paused = true)]
async fn duplicate_labels_rejected_before_any_submission() {
    let (coordinator, backend, _store) = coordinator(HashMap::new(), MemoryStore::default(), 4);

    let result = coordinator
        .run_batch(
            vec![text_spec("hero"), text_spec("hero")],
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_err());
    assert_eq!(backend.next_id.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_unwinds_all_pending_jobs() {
    let behaviors: HashMap<String, Behavior> = (0..3)
        .map(|i| (format!("prompt for shot-{i}"), Behavior::NeverTerminal))
        .collect();
    let (coordinator, _backend, _store) = coordinator(behaviors, MemoryStore::default(), 2);

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        canceller.cancel();
    });

    let specs: Vec<JobSpec> = (0..3).map(|i| text_spec(&format!("shot-{i}"))).collect();
    let outcomes = coordinator.run_batch(specs, &cancel).await.unwrap();

    // One outcome per spec even under cancellation, all unhandled.
    assert_eq!(outcomes.len(), 3);
    for outcome in &outcomes {
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Unhandled));
    }
}
