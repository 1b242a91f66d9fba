//! Common test utilities for propagation tests.
//!
//! Providers are scripted in-process mocks; time is driven by a
//! `ManualClock` shared by the store and the circuit breakers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use membersync_propagation::{
    AuditError, AuditResult, AuditSink, FailedPropagation, InMemoryReconciliationStore,
    MembershipEvent, MembershipOrchestrator, OrchestratorConfig, ReconciliationStats,
    ReconciliationStore, ReconciliationWorker, StoreConfig, StoreError, StoreResult,
    WorkerConfig,
};
use membersync_provider::{
    CircuitBreakerConfig, CircuitBreakerRegistry, DirectoryProvider, ManualClock,
    MembershipAction, OperationMeta, OperationResult, ProviderError, ProviderKind,
    ProviderRegistry, ProviderResult, StaticGroupMapper,
};

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// How a mock provider answers a membership write.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Success,
    Transient,
    Permanent,
    /// Return `Err` built by the given constructor.
    Error(fn() -> ProviderError),
}

impl MockBehavior {
    fn respond(&self) -> ProviderResult<OperationResult> {
        match self {
            MockBehavior::Success => Ok(OperationResult::success()),
            MockBehavior::Transient => Ok(OperationResult::transient_error(
                "service temporarily unavailable",
                "UNAVAILABLE",
            )),
            MockBehavior::Permanent => Ok(OperationResult::permanent_error(
                "member does not exist",
                "NOT_FOUND",
            )),
            MockBehavior::Error(make) => Err(make()),
        }
    }
}

/// One membership write received by a mock provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub action: MembershipAction,
    pub group_id: String,
    pub member_email: String,
    pub meta: OperationMeta,
}

/// Scripted provider that counts its calls.
///
/// Queued behaviors are consumed first; once the queue is empty the default
/// behavior applies.
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    kind: ProviderKind,
    default_behavior: Mutex<MockBehavior>,
    scripted: Mutex<VecDeque<MockBehavior>>,
    calls: Mutex<Vec<RecordedCall>>,
    write_count: AtomicUsize,
    list_count: AtomicUsize,
    groups: Mutex<Option<Result<OperationResult, fn() -> ProviderError>>>,
}

impl MockProvider {
    pub fn new(name: &str, kind: ProviderKind) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            kind,
            default_behavior: Mutex::new(MockBehavior::Success),
            scripted: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            write_count: AtomicUsize::new(0),
            list_count: AtomicUsize::new(0),
            groups: Mutex::new(None),
        })
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.default_behavior.lock().unwrap() = behavior;
    }

    pub fn push_behavior(&self, behavior: MockBehavior) {
        self.scripted.lock().unwrap().push_back(behavior);
    }

    /// Response returned by both group listing calls.
    pub fn set_groups_response(&self, response: OperationResult) {
        *self.groups.lock().unwrap() = Some(Ok(response));
    }

    /// Make both group listing calls return `Err`.
    pub fn set_groups_error(&self, make: fn() -> ProviderError) {
        *self.groups.lock().unwrap() = Some(Err(make));
    }

    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.list_count.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn write(
        &self,
        action: MembershipAction,
        group_id: &str,
        member_email: &str,
        meta: &OperationMeta,
    ) -> ProviderResult<OperationResult> {
        self.write_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(RecordedCall {
            action,
            group_id: group_id.to_string(),
            member_email: member_email.to_string(),
            meta: meta.clone(),
        });
        let behavior = self
            .scripted
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_behavior.lock().unwrap().clone());
        behavior.respond()
    }

    fn list(&self) -> ProviderResult<OperationResult> {
        self.list_count.fetch_add(1, Ordering::SeqCst);
        match self.groups.lock().unwrap().clone() {
            Some(Ok(result)) => Ok(result),
            Some(Err(make)) => Err(make()),
            None => Ok(OperationResult::success_with_data(json!({ "groups": [] }))),
        }
    }
}

#[async_trait]
impl DirectoryProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn add_member(
        &self,
        group_id: &str,
        member_email: &str,
        meta: &OperationMeta,
    ) -> ProviderResult<OperationResult> {
        self.write(MembershipAction::AddMember, group_id, member_email, meta)
    }

    async fn remove_member(
        &self,
        group_id: &str,
        member_email: &str,
        meta: &OperationMeta,
    ) -> ProviderResult<OperationResult> {
        self.write(MembershipAction::RemoveMember, group_id, member_email, meta)
    }

    async fn list_groups_for_user(&self, _user_email: &str) -> ProviderResult<OperationResult> {
        self.list()
    }

    async fn list_groups_managed_by_user(
        &self,
        _user_email: &str,
    ) -> ProviderResult<OperationResult> {
        self.list()
    }
}

/// Audit sink that keeps every event, optionally failing delivery.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<MembershipEvent>>,
    fail: bool,
}

impl RecordingAuditSink {
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<MembershipEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn emit(&self, event: &MembershipEvent) -> AuditResult<()> {
        self.events.lock().unwrap().push(event.clone());
        if self.fail {
            return Err(AuditError::Delivery {
                message: "audit backend offline".to_string(),
            });
        }
        Ok(())
    }
}

/// Store whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingStore {
    pub save_calls: AtomicUsize,
}

fn backend_down<T>() -> StoreResult<T> {
    Err(StoreError::Backend {
        message: "connection refused".to_string(),
    })
}

#[async_trait]
impl ReconciliationStore for FailingStore {
    async fn save_failed_propagation(&self, _record: FailedPropagation) -> StoreResult<Uuid> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        backend_down()
    }

    async fn fetch_due(&self, _limit: usize) -> StoreResult<Vec<FailedPropagation>> {
        backend_down()
    }

    async fn claim_record(
        &self,
        _id: Uuid,
        _worker_id: &str,
        _lease_seconds: u64,
    ) -> StoreResult<bool> {
        backend_down()
    }

    async fn mark_success(&self, _id: Uuid) -> StoreResult<()> {
        backend_down()
    }

    async fn increment_attempt(&self, _id: Uuid, _last_error: Option<String>) -> StoreResult<()> {
        backend_down()
    }

    async fn mark_permanent_failure(&self, _id: Uuid, _reason: &str) -> StoreResult<()> {
        backend_down()
    }

    async fn get_stats(&self) -> StoreResult<ReconciliationStats> {
        backend_down()
    }

    async fn get_dlq_entries(&self) -> StoreResult<Vec<FailedPropagation>> {
        backend_down()
    }
}

pub const GROUP: &str = "engineering@example.com";
pub const AWS_GROUP: &str = "a1b2c3d4-aws-engineering";
pub const SLACK_GROUP: &str = "S0ENGINEERING";
pub const MEMBER: &str = "jane.doe@example.com";
pub const JUSTIFICATION: &str = "joining the platform team";

/// Google primary with AWS and Slack secondaries, all sharing one clock.
pub struct Harness {
    pub google: Arc<MockProvider>,
    pub aws: Arc<MockProvider>,
    pub slack: Arc<MockProvider>,
    pub registry: Arc<ProviderRegistry>,
    pub mapper: Arc<StaticGroupMapper>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryReconciliationStore>,
    pub breakers: CircuitBreakerRegistry,
    pub audit: Arc<RecordingAuditSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_breaker_config(CircuitBreakerConfig::default())
    }

    pub fn with_breaker_config(breaker_config: CircuitBreakerConfig) -> Self {
        init_test_logging();

        let google = MockProvider::new("google", ProviderKind::GoogleWorkspace);
        let aws = MockProvider::new("aws", ProviderKind::AwsIdentityCenter);
        let slack = MockProvider::new("slack", ProviderKind::Slack);

        let registry = ProviderRegistry::builder()
            .primary(google.clone())
            .secondary(aws.clone())
            .secondary(slack.clone())
            .build()
            .expect("registry should build");

        let mapper = StaticGroupMapper::new()
            .with_mapping(GROUP, "aws", AWS_GROUP)
            .with_mapping(GROUP, "slack", SLACK_GROUP);

        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(InMemoryReconciliationStore::with_clock(
            StoreConfig::default(),
            clock.clone(),
        ));
        let breakers = CircuitBreakerRegistry::with_clock(breaker_config, clock.clone());

        Self {
            google,
            aws,
            slack,
            registry: Arc::new(registry),
            mapper: Arc::new(mapper),
            clock,
            store,
            breakers,
            audit: Arc::new(RecordingAuditSink::default()),
        }
    }

    pub fn orchestrator(&self) -> MembershipOrchestrator {
        MembershipOrchestrator::new(
            self.registry.clone(),
            self.mapper.clone(),
            self.store.clone(),
            self.breakers.clone(),
            OrchestratorConfig::default(),
        )
        .with_audit_sink(self.audit.clone())
    }

    pub fn worker(&self, worker_id: &str) -> ReconciliationWorker {
        ReconciliationWorker::new(
            self.registry.clone(),
            self.mapper.clone(),
            self.store.clone(),
            self.breakers.clone(),
            WorkerConfig {
                worker_id: worker_id.to_string(),
                ..WorkerConfig::default()
            },
        )
    }

    pub async fn stats(&self) -> ReconciliationStats {
        self.store.get_stats().await.expect("stats")
    }
}
