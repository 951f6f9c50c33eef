//! Queue worker consuming download jobs from the broker.
//!
//! Maintains a broker session and processes deliveries one at a time.
//! Handles reconnection on channel failures.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::acquirer::SongAcquirer;
use super::broker::{BrokerError, BrokerSession, Delivery, JobBroker, QueueTopology};
use super::events::{EventSink, PipelineEvent};
use super::fingerprint::FingerprintSet;
use super::models::{DeadLetter, DownloadJob, JobOutcome};
use super::retry_policy::{FallbackOutcome, QualityFallbackPolicy};
use super::throttle::Pacer;
use crate::config::BrokerSettings;

/// Connection state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Disconnected,
    /// Channel open, queues declared
    Connected,
    Consuming,
}

/// Counters accumulated over a worker's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub acquired: u64,
    pub skipped: u64,
    pub requeued: u64,
    pub dead_lettered: u64,
    /// Deliveries handed back to the broker on shutdown or channel failure
    pub returned: u64,
    pub reconnects: u64,
    /// Deliveries the broker flagged as handed out before
    pub redelivered: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Acquired => self.acquired += 1,
            JobOutcome::Skipped => self.skipped += 1,
            JobOutcome::Requeued => self.requeued += 1,
            JobOutcome::DeadLettered => self.dead_lettered += 1,
            JobOutcome::Returned => self.returned += 1,
        }
    }
}

/// Background worker that consumes the durable work queue.
///
/// Runs in a loop:
/// 1. Connect and declare the work and dead-letter queues
/// 2. Consume deliveries, one job at a time
/// 3. On channel failure: nack the in-flight delivery, wait and reconnect
pub struct QueueWorker {
    broker: Arc<dyn JobBroker>,
    acquirer: Arc<dyn SongAcquirer>,
    policy: QualityFallbackPolicy,
    pacer: Arc<dyn Pacer>,
    events: Arc<dyn EventSink>,
    topology: QueueTopology,
    reconnect_delay: Duration,
    fingerprints: FingerprintSet,
    state: WorkerState,
    stats: WorkerStats,
}

impl QueueWorker {
    pub fn new(
        broker: Arc<dyn JobBroker>,
        acquirer: Arc<dyn SongAcquirer>,
        policy: QualityFallbackPolicy,
        pacer: Arc<dyn Pacer>,
        events: Arc<dyn EventSink>,
        settings: &BrokerSettings,
        fingerprints: FingerprintSet,
    ) -> Self {
        Self {
            broker,
            acquirer,
            policy,
            pacer,
            events,
            topology: QueueTopology::from_settings(settings),
            reconnect_delay: settings.reconnect_delay,
            fingerprints,
            state: WorkerState::Disconnected,
            stats: WorkerStats::default(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    pub fn fingerprints(&self) -> &FingerprintSet {
        &self.fingerprints
    }

    /// Main processing loop, runs until `shutdown` is cancelled.
    pub async fn run(&mut self, shutdown: CancellationToken) -> WorkerStats {
        info!(
            "Queue worker starting (queue={}, max_retries={}, reconnect_delay={}s, known songs={})",
            self.topology.work_queue,
            self.policy.max_retries,
            self.reconnect_delay.as_secs(),
            self.fingerprints.len()
        );

        loop {
            self.state = WorkerState::Disconnected;
            let connected = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Queue worker shutting down while connecting");
                    break;
                }
                result = self.broker.connect(&self.topology) => result,
            };

            match connected {
                Ok(mut session) => {
                    self.state = WorkerState::Connected;
                    let result = self.consume(session.as_mut(), &shutdown).await;
                    session.close().await;
                    self.state = WorkerState::Disconnected;
                    match result {
                        Ok(()) => {
                            info!("Queue worker shutting down");
                            break;
                        }
                        Err(e) => warn!(
                            "Broker session lost: {}, reconnecting in {}s",
                            e,
                            self.reconnect_delay.as_secs()
                        ),
                    }
                }
                Err(e) => warn!(
                    "Cannot connect to broker: {}, retrying in {}s",
                    e,
                    self.reconnect_delay.as_secs()
                ),
            }

            // Wait before reconnecting
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {
                    self.stats.reconnects += 1;
                }
                _ = shutdown.cancelled() => {
                    info!("Queue worker shutting down during reconnect wait");
                    break;
                }
            }
        }

        self.state = WorkerState::Disconnected;
        info!("Queue worker stopped: {:?}", self.stats);
        self.stats.clone()
    }

    /// Consumes deliveries until shutdown (`Ok`) or a broker failure (`Err`).
    async fn consume(
        &mut self,
        session: &mut dyn BrokerSession,
        shutdown: &CancellationToken,
    ) -> Result<(), BrokerError> {
        self.state = WorkerState::Consuming;

        loop {
            // Shutdown wins over a pending delivery
            let delivery = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                delivery = session.next_delivery() => delivery?,
            };

            match self.handle_delivery(session, &delivery, shutdown).await {
                Ok(outcome) => {
                    self.stats.record(outcome);
                    if matches!(outcome, JobOutcome::Acquired | JobOutcome::Requeued) {
                        self.pacer.pause(shutdown).await;
                    }
                }
                Err(e) => {
                    if let Err(nack_error) = session.nack_requeue(delivery.tag).await {
                        debug!("Nack of delivery {} failed: {}", delivery.tag, nack_error);
                    }
                    self.stats.record(JobOutcome::Returned);
                    return Err(e);
                }
            }
        }
    }

    /// Brings one delivery to a terminal state. Every path acks, nacks or
    /// returns an error (after which the caller nacks).
    async fn handle_delivery(
        &mut self,
        session: &mut dyn BrokerSession,
        delivery: &Delivery,
        shutdown: &CancellationToken,
    ) -> Result<JobOutcome, BrokerError> {
        if delivery.redelivered {
            self.stats.redelivered += 1;
            info!(tag = delivery.tag, "Redelivered message, an earlier attempt did not finish");
        }

        let job = match DownloadJob::decode(&delivery.body) {
            Ok(job) => job,
            Err(e) => {
                let letter = DeadLetter::rejected(&delivery.body, &e);
                session
                    .publish(&self.topology.dead_letter_queue, &letter.encode())
                    .await?;
                session.ack(delivery.tag).await?;
                self.events.emit(PipelineEvent::DeadLettered {
                    song_name: None,
                    reason: &letter.reason,
                });
                return Ok(JobOutcome::DeadLettered);
            }
        };
        let descriptor = &job.descriptor;

        if self.fingerprints.contains(&descriptor.display_key) {
            session.ack(delivery.tag).await?;
            self.events.emit(PipelineEvent::Skipped { descriptor });
            return Ok(JobOutcome::Skipped);
        }

        let outcome = self
            .policy
            .acquire_with_fallback(
                descriptor,
                descriptor.quality_tier,
                job.lyrics,
                self.acquirer.as_ref(),
                shutdown,
            )
            .await;

        match outcome {
            FallbackOutcome::Acquired(_) => {
                // Recorded before the ack so a redelivery is skipped
                self.fingerprints.insert(descriptor.display_key.clone());
                session.ack(delivery.tag).await?;
                Ok(JobOutcome::Acquired)
            }
            FallbackOutcome::Cancelled => {
                session.nack_requeue(delivery.tag).await?;
                Ok(JobOutcome::Returned)
            }
            FallbackOutcome::Exhausted { last_error, .. } => {
                if self.policy.should_requeue(last_error.as_ref(), job.retry_count) {
                    let next = job.next_attempt();
                    session
                        .publish(&self.topology.work_queue, &next.encode())
                        .await?;
                    session.ack(delivery.tag).await?;
                    self.events.emit(PipelineEvent::Requeued {
                        descriptor,
                        retry_count: next.retry_count,
                    });
                    return Ok(JobOutcome::Requeued);
                }

                let reason = match &last_error {
                    Some(error) => format!(
                        "failed after {} retries, last error: {}",
                        job.retry_count, error
                    ),
                    None => format!("failed after {} retries", job.retry_count),
                };
                let letter = DeadLetter::exhausted(&job, reason);
                session
                    .publish(&self.topology.dead_letter_queue, &letter.encode())
                    .await?;
                session.ack(delivery.tag).await?;
                self.events.emit(PipelineEvent::DeadLettered {
                    song_name: letter.song_name(),
                    reason: &letter.reason,
                });
                Ok(JobOutcome::DeadLettered)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrySettings;
    use crate::download_manager::test_support::{
        BrokerCall, InMemoryBroker, RecordingEventSink, ScriptedAcquirer,
    };
    use crate::download_manager::throttle::NoOpPacer;
    use crate::download_manager::JobMessage;

    fn job_body(song: &str, retry_count: u32) -> Vec<u8> {
        serde_json::to_vec(&JobMessage {
            retry_count,
            ..JobMessage::for_song(song)
        })
        .unwrap()
    }

    fn settings() -> BrokerSettings {
        BrokerSettings {
            queue: "jobs".to_string(),
            reconnect_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    fn worker(
        broker: Arc<InMemoryBroker>,
        acquirer: Arc<ScriptedAcquirer>,
        max_retries: u32,
        fingerprints: FingerprintSet,
    ) -> QueueWorker {
        let events: Arc<dyn EventSink> = Arc::new(RecordingEventSink::default());
        QueueWorker::new(
            broker,
            acquirer,
            QualityFallbackPolicy::new(
                &RetrySettings {
                    auto_retry: true,
                    max_retries,
                },
                events.clone(),
            ),
            Arc::new(NoOpPacer),
            events,
            &settings(),
            fingerprints,
        )
    }

    /// Runs the worker until the broker has handed out every queued message
    /// and the worker asked for more.
    async fn run_until_drained(worker: &mut QueueWorker, broker: &InMemoryBroker) -> WorkerStats {
        let shutdown = broker.drained_token();
        tokio::time::timeout(Duration::from_secs(5), worker.run(shutdown))
            .await
            .expect("worker did not drain the queue")
    }

    #[tokio::test]
    async fn test_success_acks_and_records_fingerprint() {
        let broker = Arc::new(InMemoryBroker::with_messages(vec![job_body(
            "Song A - Artist X",
            0,
        )]));
        let acquirer = Arc::new(ScriptedAcquirer::succeeding_at(&[11]));
        let mut worker = worker(broker.clone(), acquirer.clone(), 3, FingerprintSet::new());

        let stats = run_until_drained(&mut worker, &broker).await;

        assert_eq!(stats.acquired, 1);
        assert_eq!(broker.calls(), vec![BrokerCall::Ack(1)]);
        assert!(worker.fingerprints().contains("Song A"));
        assert_eq!(worker.state(), WorkerState::Disconnected);
    }

    #[tokio::test]
    async fn test_known_song_is_skipped_without_acquiring() {
        let broker = Arc::new(InMemoryBroker::with_messages(vec![job_body(
            "Song A - Artist X",
            0,
        )]));
        let acquirer = Arc::new(ScriptedAcquirer::succeeding_at(&[11]));
        let known: FingerprintSet = vec!["Song A".to_string()].into_iter().collect();
        let mut worker = worker(broker.clone(), acquirer.clone(), 3, known);

        let stats = run_until_drained(&mut worker, &broker).await;

        assert_eq!(stats.skipped, 1);
        assert_eq!(acquirer.call_count(), 0);
        assert_eq!(broker.calls(), vec![BrokerCall::Ack(1)]);
    }

    #[tokio::test]
    async fn test_duplicate_jobs_acquire_once() {
        let broker = Arc::new(InMemoryBroker::with_messages(vec![
            job_body("Song A - Artist X", 0),
            job_body("Song A - Artist Y", 0),
        ]));
        let acquirer = Arc::new(ScriptedAcquirer::succeeding_at(&[11]));
        let mut worker = worker(broker.clone(), acquirer.clone(), 3, FingerprintSet::new());

        let stats = run_until_drained(&mut worker, &broker).await;

        assert_eq!(stats.acquired, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(acquirer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_below_ceiling_requeues_with_incremented_count() {
        let broker = Arc::new(InMemoryBroker::with_messages(vec![job_body(
            "Song A - Artist X",
            1,
        )]));
        let acquirer = Arc::new(ScriptedAcquirer::failing());
        let mut worker = worker(broker.clone(), acquirer.clone(), 3, FingerprintSet::new());

        // Let the re-published job come back twice more, then dead-letter
        let stats = run_until_drained(&mut worker, &broker).await;

        assert_eq!(stats.requeued, 2);
        assert_eq!(stats.dead_lettered, 1);

        let published = broker.published("jobs");
        let counts: Vec<u32> = published
            .iter()
            .map(|body| DownloadJob::decode(body).unwrap().retry_count)
            .collect();
        assert_eq!(counts, vec![2, 3]);

        let dead = broker.published("jobs_failed");
        assert_eq!(dead.len(), 1);
        let letter: DeadLetter = serde_json::from_slice(&dead[0]).unwrap();
        assert_eq!(letter.song_name(), Some("Song A - Artist X"));
        assert_eq!(letter.job.map(|job| job.retry_count), Some(3));
        assert!(letter.reason.contains("resolution_miss"));
    }

    #[tokio::test]
    async fn test_failure_at_ceiling_dead_letters_once_and_acks() {
        let broker = Arc::new(InMemoryBroker::with_messages(vec![job_body(
            "Song A - Artist X",
            3,
        )]));
        let acquirer = Arc::new(ScriptedAcquirer::failing());
        let mut worker = worker(broker.clone(), acquirer.clone(), 3, FingerprintSet::new());

        let stats = run_until_drained(&mut worker, &broker).await;

        assert_eq!(stats.dead_lettered, 1);
        assert_eq!(stats.requeued, 0);
        assert!(broker.published("jobs").is_empty());
        assert_eq!(broker.published("jobs_failed").len(), 1);
        assert_eq!(
            broker.calls(),
            vec![
                BrokerCall::Publish("jobs_failed".to_string()),
                BrokerCall::Ack(1)
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_payloads_dead_letter_without_acquiring() {
        let broker = Arc::new(InMemoryBroker::with_messages(vec![
            b"{not json".to_vec(),
            br#"{"song_name":"Song A - Artist X","quality":42}"#.to_vec(),
        ]));
        let acquirer = Arc::new(ScriptedAcquirer::succeeding_at(&[11]));
        let mut worker = worker(broker.clone(), acquirer.clone(), 3, FingerprintSet::new());

        let stats = run_until_drained(&mut worker, &broker).await;

        assert_eq!(stats.dead_lettered, 2);
        assert_eq!(acquirer.call_count(), 0);
        assert!(broker.published("jobs").is_empty());

        let dead = broker.published("jobs_failed");
        let letter: DeadLetter = serde_json::from_slice(&dead[1]).unwrap();
        assert_eq!(
            letter.raw_body.as_deref(),
            Some(r#"{"song_name":"Song A - Artist X","quality":42}"#)
        );
    }

    #[tokio::test]
    async fn test_broker_failure_nacks_and_reconnects() {
        let broker = Arc::new(InMemoryBroker::with_messages(vec![job_body(
            "Song A - Artist X",
            0,
        )]));
        broker.fail_next_ack();
        let acquirer = Arc::new(ScriptedAcquirer::succeeding_at(&[11]));
        let mut worker = worker(broker.clone(), acquirer.clone(), 3, FingerprintSet::new());

        let stats = run_until_drained(&mut worker, &broker).await;

        // First delivery: ack fails, nacked back; after reconnect the
        // redelivery is recognised as already downloaded
        assert_eq!(stats.returned, 1);
        assert_eq!(stats.reconnects, 1);
        assert_eq!(stats.redelivered, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(acquirer.call_count(), 1);
        assert_eq!(broker.connect_count(), 2);
        assert_eq!(
            broker.calls(),
            vec![BrokerCall::NackRequeue(1), BrokerCall::Ack(2)]
        );
    }

    #[tokio::test]
    async fn test_connect_failure_is_retried() {
        let broker = Arc::new(InMemoryBroker::with_messages(vec![job_body(
            "Song A - Artist X",
            0,
        )]));
        broker.fail_next_connect();
        let acquirer = Arc::new(ScriptedAcquirer::succeeding_at(&[11]));
        let mut worker = worker(broker.clone(), acquirer, 3, FingerprintSet::new());

        let stats = run_until_drained(&mut worker, &broker).await;

        assert_eq!(stats.reconnects, 1);
        assert_eq!(stats.acquired, 1);
        assert_eq!(broker.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_mid_job_returns_message() {
        let broker = Arc::new(InMemoryBroker::with_messages(vec![job_body(
            "Song A - Artist X",
            0,
        )]));
        let shutdown = CancellationToken::new();
        let acquirer =
            Arc::new(ScriptedAcquirer::failing().cancelling_after(1, shutdown.clone()));
        let mut worker = worker(broker.clone(), acquirer.clone(), 3, FingerprintSet::new());

        let stats = tokio::time::timeout(Duration::from_secs(5), worker.run(shutdown))
            .await
            .unwrap();

        assert_eq!(stats.returned, 1);
        assert_eq!(acquirer.call_count(), 1);
        assert_eq!(broker.calls(), vec![BrokerCall::NackRequeue(1)]);
        assert!(broker.published("jobs").is_empty());
    }
}
