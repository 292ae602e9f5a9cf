use std::env;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use odra_core::error::{Error, Result};
use odra_core::{AuditRequest, DocumentFile, Job, JobPhase, JobState, JobStatus};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::events::JobObserver;
use crate::transport::{AuditApi, load_dotenv, parse_var};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);
pub const COMPLETION_GRACE: Duration = Duration::from_millis(1500);

pub const ENV_POLL_INTERVAL: &str = "ODRA_POLL_INTERVAL_MS";
pub const ENV_MAX_POLL_ERRORS: &str = "ODRA_MAX_POLL_ERRORS";

/// Polling cadence. Fixed interval, no backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Gap between the end of one poll and the start of the next.
    pub interval: Duration,
    /// Delay between observing `completed` and announcing the report.
    pub completion_grace: Duration,
    /// `None` keeps polling through transport errors indefinitely.
    pub max_consecutive_errors: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            completion_grace: COMPLETION_GRACE,
            max_consecutive_errors: None,
        }
    }
}

impl PollPolicy {
    pub fn from_env() -> std::result::Result<Self, AppError> {
        load_dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, AppError> {
        let mut policy = Self::default();

        if let Some(ms) = parse_var::<u64>(&lookup, ENV_POLL_INTERVAL)? {
            if ms == 0 {
                return Err(AppError::InvalidConfig {
                    key: ENV_POLL_INTERVAL,
                    reason: "must be positive".into(),
                });
            }
            policy.interval = Duration::from_millis(ms);
        }
        if let Some(max) = parse_var::<u32>(&lookup, ENV_MAX_POLL_ERRORS)? {
            if max == 0 {
                return Err(AppError::InvalidConfig {
                    key: ENV_MAX_POLL_ERRORS,
                    reason: "must be at least 1".into(),
                });
            }
            policy.max_consecutive_errors = Some(max);
        }

        Ok(policy)
    }
}

/// Read-only view of a controller, published on every transition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControllerState {
    pub phase: JobPhase,
    pub job: Option<Job>,
    /// Polls resolved so far, successful or not.
    pub polls: u64,
    pub consecutive_errors: u32,
    pub last_error: Option<Error>,
    /// Completed, but the report-ready notification has not gone out yet.
    pub report_pending: bool,
}

impl ControllerState {
    /// Nothing left to stop.
    fn is_settled(&self) -> bool {
        match self.phase {
            JobPhase::Failed | JobPhase::Cancelled => true,
            JobPhase::Completed => !self.report_pending,
            _ => false,
        }
    }
}

/// Gate in front of the observer.
///
/// Callbacks are delivered while holding `gate`; `silence` cancels the token
/// and then takes the gate once, so no callback can start after it returns.
struct Notifier {
    observer: Arc<dyn JobObserver>,
    token: CancellationToken,
    gate: Mutex<()>,
}

impl Notifier {
    fn new(observer: Arc<dyn JobObserver>) -> Self {
        Self {
            observer,
            token: CancellationToken::new(),
            gate: Mutex::new(()),
        }
    }

    fn notify(&self, deliver: impl FnOnce(&dyn JobObserver)) {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.token.is_cancelled() {
            deliver(self.observer.as_ref());
        }
    }

    fn error(&self, err: &Error) {
        self.notify(|observer| observer.on_error(err.kind(), &err.to_string()));
    }

    fn silence(&self) {
        self.token.cancel();
        drop(self.gate.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn is_silenced(&self) -> bool {
        self.token.is_cancelled()
    }
}

struct Runtime {
    notifier: Arc<Notifier>,
    poller: Option<JoinHandle<()>>,
}

/// Drives one audit job from submission to report hand-off.
///
/// Polls are strictly sequential: the next one is scheduled only after the
/// previous one resolved, so snapshots are applied in issue order.
pub struct JobController {
    api: Arc<dyn AuditApi>,
    observer: Arc<dyn JobObserver>,
    policy: PollPolicy,
    state: Arc<watch::Sender<ControllerState>>,
    runtime: Mutex<Runtime>,
}

impl JobController {
    pub fn new(api: Arc<dyn AuditApi>, observer: Arc<dyn JobObserver>, policy: PollPolicy) -> Self {
        let (state, _) = watch::channel(ControllerState::default());
        Self {
            runtime: Mutex::new(Runtime {
                notifier: Arc::new(Notifier::new(observer.clone())),
                poller: None,
            }),
            api,
            observer,
            policy,
            state: Arc::new(state),
        }
    }

    pub fn phase(&self) -> JobPhase {
        self.state.borrow().phase
    }

    pub fn job(&self) -> Option<Job> {
        self.state.borrow().job.clone()
    }

    pub fn latest_status(&self) -> Option<JobStatus> {
        self.state.borrow().job.as_ref().map(|job| job.status.clone())
    }

    pub fn state(&self) -> ControllerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Uploads `files` (if any), submits the audit and starts polling.
    ///
    /// Only valid from `Idle`. Any failure before the job id is known returns
    /// the controller to `Idle`.
    pub async fn start(&self, request: AuditRequest, files: Vec<DocumentFile>) -> Result<Job> {
        let phase = self.phase();
        if phase != JobPhase::Idle {
            return Err(Error::InvalidPhase {
                expected: "idle",
                actual: phase,
            });
        }

        let notifier = self.runtime().notifier.clone();
        if let Err(err) = request.validate() {
            notifier.error(&err);
            return Err(err);
        }

        let mut actual = JobPhase::Idle;
        let claimed = self.state.send_if_modified(|state| {
            if state.phase != JobPhase::Idle {
                actual = state.phase;
                return false;
            }
            *state = ControllerState {
                phase: JobPhase::Submitting,
                ..ControllerState::default()
            };
            true
        });
        if !claimed {
            return Err(Error::InvalidPhase {
                expected: "idle",
                actual,
            });
        }

        let outcome = tokio::select! {
            biased;
            _ = notifier.token.cancelled() => Err(Error::Cancelled),
            submitted = self.submit(&notifier, request, files) => submitted,
        };

        match outcome {
            Ok(job) => self.begin_polling(notifier, job),
            Err(Error::Cancelled) => {
                info!("Audit submission cancelled");
                Err(Error::Cancelled)
            }
            Err(err) => {
                self.state.send_if_modified(|state| {
                    if state.phase != JobPhase::Submitting {
                        return false;
                    }
                    state.phase = JobPhase::Idle;
                    true
                });
                warn!("Audit submission failed: {}", err);
                notifier.error(&err);
                Err(err)
            }
        }
    }

    async fn submit(
        &self,
        notifier: &Notifier,
        request: AuditRequest,
        files: Vec<DocumentFile>,
    ) -> Result<Job> {
        let mut uploads = Vec::new();
        if !files.is_empty() {
            uploads = self.api.upload_documents(files).await?;
            if let Some(partial) = odra_core::partial_failure(&uploads) {
                warn!("{}", partial);
                notifier.error(&partial);
            }
        }

        let request = request.with_effective_scope(&uploads);
        self.api.submit_audit(&request).await
    }

    fn begin_polling(&self, notifier: Arc<Notifier>, job: Job) -> Result<Job> {
        let started = self.state.send_if_modified(|state| {
            if state.phase != JobPhase::Submitting || notifier.is_silenced() {
                return false;
            }
            state.phase = JobPhase::Polling;
            state.job = Some(job.clone());
            true
        });
        if !started {
            return Err(Error::Cancelled);
        }

        info!(
            "Polling audit job {} every {:?}",
            job.id, self.policy.interval
        );
        let poller = Poller {
            api: self.api.clone(),
            state: self.state.clone(),
            notifier,
            policy: self.policy,
            job_id: job.id.clone(),
        };
        let handle = tokio::spawn(async move { poller.run().await });
        self.runtime().poller = Some(handle);

        Ok(job)
    }

    /// Stops polling and silences the observer.
    ///
    /// Idempotent. A no-op once the job failed, was cancelled, or completed
    /// and already announced its report. Cancelling during the completion
    /// grace delay suppresses the report-ready notification.
    pub async fn cancel(&self) {
        let mut previous = JobPhase::Idle;
        let cancelled = self.state.send_if_modified(|state| {
            if state.is_settled() {
                return false;
            }
            previous = state.phase;
            state.phase = JobPhase::Cancelled;
            state.report_pending = false;
            true
        });
        if !cancelled {
            debug!("Cancel ignored, controller is {}", self.phase());
            return;
        }

        let (notifier, poller) = {
            let mut runtime = self.runtime();
            (runtime.notifier.clone(), runtime.poller.take())
        };
        notifier.silence();
        if let Some(poller) = poller {
            let _ = poller.await;
        }

        info!("Cancelled audit controller (was {})", previous);
    }

    /// Tears down whatever is running and returns to `Idle` for a new job.
    pub async fn reset(&self) {
        let (previous, poller) = {
            let mut runtime = self.runtime();
            let fresh = Arc::new(Notifier::new(self.observer.clone()));
            (
                std::mem::replace(&mut runtime.notifier, fresh),
                runtime.poller.take(),
            )
        };
        previous.silence();
        if let Some(poller) = poller {
            let _ = poller.await;
        }

        self.state.send_replace(ControllerState::default());
        debug!("Controller reset");
    }

    /// Waits for the polling task to finish, report hand-off included.
    pub async fn join(&self) {
        let poller = self.runtime().poller.take();
        if let Some(poller) = poller {
            if let Err(err) = poller.await {
                warn!("Polling task ended abnormally: {}", err);
            }
        }
    }

    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        let runtime = self.runtime.get_mut().unwrap_or_else(PoisonError::into_inner);
        runtime.notifier.silence();
        if let Some(poller) = runtime.poller.take() {
            poller.abort();
        }
    }
}

enum Next {
    Continue,
    HandOff,
    Stop,
}

/// The single owned timer loop for one job.
struct Poller {
    api: Arc<dyn AuditApi>,
    state: Arc<watch::Sender<ControllerState>>,
    notifier: Arc<Notifier>,
    policy: PollPolicy,
    job_id: String,
}

impl Poller {
    async fn run(&self) {
        let token = &self.notifier.token;
        loop {
            let polled = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                polled = self.api.poll_status(&self.job_id) => polled,
            };

            let next = match polled {
                Ok(status) => self.apply(status),
                Err(err) => self.record_failure(err),
            };
            match next {
                Next::Continue => {}
                Next::HandOff => return self.hand_off().await,
                Next::Stop => return,
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(self.policy.interval) => {}
            }
        }
    }

    fn apply(&self, status: JobStatus) -> Next {
        let reported = status.state;
        let mut seq = 0;
        let applied = self.state.send_if_modified(|state| {
            if state.phase != JobPhase::Polling || self.notifier.is_silenced() {
                return false;
            }
            state.polls += 1;
            seq = state.polls;
            state.consecutive_errors = 0;
            state.last_error = None;
            if let Some(job) = state.job.as_mut() {
                job.status = status.clone();
            }
            match reported {
                JobState::Completed => {
                    state.phase = JobPhase::Completed;
                    state.report_pending = true;
                }
                JobState::Failed => state.phase = JobPhase::Failed,
                JobState::Pending | JobState::Processing => {}
            }
            true
        });
        if !applied {
            return Next::Stop;
        }

        debug!(
            "Poll #{} for job {}: {} at {}% ({}/{} documents)",
            seq,
            self.job_id,
            reported,
            status.progress_percent,
            status.processed_documents,
            status.total_documents
        );
        self.notifier.notify(|observer| observer.on_status_update(&status));

        match reported {
            JobState::Completed => {
                info!("Audit job {} completed", self.job_id);
                Next::HandOff
            }
            JobState::Failed => {
                let failed = Error::JobFailed {
                    job_id: self.job_id.clone(),
                    reason: "backend reported status failed".into(),
                };
                warn!("{}", failed);
                self.notifier.error(&failed);
                Next::Stop
            }
            JobState::Pending | JobState::Processing => Next::Continue,
        }
    }

    fn record_failure(&self, err: Error) -> Next {
        let limit = self.policy.max_consecutive_errors;
        let mut count = 0;
        let mut exhausted = false;
        let recorded = self.state.send_if_modified(|state| {
            if state.phase != JobPhase::Polling || self.notifier.is_silenced() {
                return false;
            }
            state.polls += 1;
            state.consecutive_errors += 1;
            count = state.consecutive_errors;
            state.last_error = Some(err.clone());
            if limit.is_some_and(|limit| count >= limit) {
                state.phase = JobPhase::Failed;
                exhausted = true;
            }
            true
        });
        if !recorded {
            return Next::Stop;
        }

        warn!(
            "Polling job {} failed ({} in a row): {}",
            self.job_id, count, err
        );
        self.notifier.error(&err);

        if exhausted {
            let failed = Error::JobFailed {
                job_id: self.job_id.clone(),
                reason: format!("gave up after {count} consecutive poll errors"),
            };
            warn!("{}", failed);
            self.notifier.error(&failed);
            return Next::Stop;
        }
        Next::Continue
    }

    async fn hand_off(&self) {
        tokio::select! {
            biased;
            _ = self.notifier.token.cancelled() => return,
            _ = tokio::time::sleep(self.policy.completion_grace) => {}
        }

        let ready = self.state.send_if_modified(|state| {
            if state.phase != JobPhase::Completed || !state.report_pending {
                return false;
            }
            state.report_pending = false;
            true
        });
        if ready {
            info!("Report for job {} is ready", self.job_id);
            self.notifier.notify(|observer| observer.on_report_ready(&self.job_id));
        }
    }
}
