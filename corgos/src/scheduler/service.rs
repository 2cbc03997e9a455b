use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{RefreshEvent, RefreshEventBroadcaster};
use super::schedule::RefreshSchedule;
use crate::acquisition::{AcquisitionPipeline, RefreshGuard};

/// Fires the acquisition pipeline at start, on the recurring schedule and on
/// demand. Every refresh runs in a background task; callers never wait.
pub struct RefreshScheduler {
    pipeline: Arc<AcquisitionPipeline>,
    schedule: Option<RefreshSchedule>,
    events: RefreshEventBroadcaster,
    cancellation_token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new(
        pipeline: Arc<AcquisitionPipeline>,
        schedule: Option<RefreshSchedule>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            schedule,
            events: RefreshEventBroadcaster::new(),
            cancellation_token,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    /// Whether a refresh is currently running.
    pub fn is_running(&self) -> bool {
        self.pipeline.is_loading()
    }

    /// Run the initial refresh and arm the recurring schedule.
    pub fn start(&self) {
        if !self.trigger_now() {
            debug!("Initial refresh skipped, one is already running");
        }

        let Some(schedule) = self.schedule.clone() else {
            info!("No refresh days configured, recurring refresh disabled");
            return;
        };
        info!(schedule = %schedule.expression(), "Recurring refresh scheduled");

        let pipeline = self.pipeline.clone();
        let events = self.events.clone();
        let token = self.cancellation_token.clone();
        self.track(tokio::spawn(async move {
            Self::run_schedule(schedule, pipeline, events, token).await;
        }));
    }

    /// Start a refresh in the background unless one is already running.
    /// Returns whether a new refresh was started.
    pub fn trigger_now(&self) -> bool {
        if self.cancellation_token.is_cancelled() {
            return false;
        }
        let Some(guard) = self.pipeline.state().try_begin() else {
            return false;
        };

        let pipeline = self.pipeline.clone();
        let events = self.events.clone();
        let token = self.cancellation_token.clone();
        self.track(tokio::spawn(async move {
            Self::refresh(&pipeline, &events, &token, guard).await;
        }));
        true
    }

    /// Cancel scheduled and running refreshes and wait for them to stop.
    pub async fn shutdown(&self, timeout: Duration) {
        self.cancellation_token.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());

        if tokio::time::timeout(timeout, futures::future::join_all(tasks))
            .await
            .is_err()
        {
            warn!("Refresh tasks did not stop within {:?}", timeout);
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    async fn run_schedule(
        schedule: RefreshSchedule,
        pipeline: Arc<AcquisitionPipeline>,
        events: RefreshEventBroadcaster,
        token: CancellationToken,
    ) {
        loop {
            let now = Local::now();
            let Some(delay) = schedule.until_next(&now) else {
                warn!(schedule = %schedule.expression(), "Refresh schedule has no upcoming time");
                break;
            };
            debug!(in_secs = delay.as_secs(), "Waiting for next scheduled refresh");

            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Refresh schedule stopped");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match pipeline.state().try_begin() {
                Some(guard) => Self::refresh(&pipeline, &events, &token, guard).await,
                None => info!("Scheduled refresh skipped, one is already running"),
            }
        }
    }

    async fn refresh(
        pipeline: &AcquisitionPipeline,
        events: &RefreshEventBroadcaster,
        token: &CancellationToken,
        guard: RefreshGuard,
    ) {
        events.publish(RefreshEvent::Started);

        let event = tokio::select! {
            _ = token.cancelled() => {
                info!("Refresh cancelled");
                RefreshEvent::Failed { reason: "cancelled".to_string() }
            }
            result = pipeline.run_with_guard(guard) => match result {
                Ok(loaded) => RefreshEvent::Completed { loaded },
                Err(e) => {
                    error!(error = %e, "Refresh failed, keeping previous queue");
                    RefreshEvent::Failed { reason: e.to_string() }
                }
            },
        };
        events.publish(event);
    }
}
