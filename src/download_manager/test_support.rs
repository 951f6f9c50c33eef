//! Hand-written fakes shared by the download manager unit tests.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::acquirer::SongAcquirer;
use super::broker::{BrokerError, BrokerSession, Delivery, JobBroker, QueueTopology};
use super::events::{EventSink, PipelineEvent};
use super::models::{
    display_key, AcquiredSong, DownloadError, DownloadErrorType, LyricsOptions, SongDescriptor,
};
use super::quality::QualityTier;

pub fn tier(value: i64) -> QualityTier {
    QualityTier::new(value).unwrap()
}

/// Records the kind of every emitted event.
#[derive(Default)]
pub struct RecordingEventSink {
    kinds: Mutex<Vec<String>>,
}

impl RecordingEventSink {
    pub fn kinds(&self) -> Vec<String> {
        self.kinds.lock().unwrap().clone()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: PipelineEvent<'_>) {
        let kind = match event {
            PipelineEvent::Skipped { .. } => "skipped",
            PipelineEvent::AttemptStarted { .. } => "attempt_started",
            PipelineEvent::AttemptFailed { .. } => "attempt_failed",
            PipelineEvent::Acquired { .. } => "acquired",
            PipelineEvent::Exhausted { .. } => "exhausted",
            PipelineEvent::Cancelled { .. } => "cancelled",
            PipelineEvent::Progress { .. } => "progress",
            PipelineEvent::Requeued { .. } => "requeued",
            PipelineEvent::DeadLettered { .. } => "dead_lettered",
        };
        self.kinds.lock().unwrap().push(kind.to_string());
    }
}

/// Acquirer that succeeds only at the scripted tiers.
pub struct ScriptedAcquirer {
    succeed_at: Vec<u8>,
    failing_songs: Vec<String>,
    failure: DownloadErrorType,
    cancel_after: Option<(usize, CancellationToken)>,
    calls: Mutex<Vec<(String, u8)>>,
}

impl ScriptedAcquirer {
    pub fn succeeding_at(tiers: &[u8]) -> Self {
        Self {
            succeed_at: tiers.to_vec(),
            failing_songs: Vec::new(),
            failure: DownloadErrorType::ResolutionMiss,
            cancel_after: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self::succeeding_at(&[])
    }

    pub fn failing_with(failure: DownloadErrorType) -> Self {
        Self {
            failure,
            ..Self::failing()
        }
    }

    /// Songs that fail at every tier regardless of `succeed_at`.
    pub fn failing_for(mut self, search_term: &str) -> Self {
        self.failing_songs.push(search_term.to_string());
        self
    }

    /// Cancels `token` once `calls` attempts have been made.
    pub fn cancelling_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn tiers_tried(&self) -> Vec<u8> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn songs_tried(&self) -> Vec<String> {
        let mut songs: Vec<String> = Vec::new();
        for (song, _) in self.calls.lock().unwrap().iter() {
            if songs.last() != Some(song) {
                songs.push(song.clone());
            }
        }
        songs
    }
}

#[async_trait]
impl SongAcquirer for ScriptedAcquirer {
    async fn acquire(
        &self,
        descriptor: &SongDescriptor,
        tier: QualityTier,
        _lyrics: LyricsOptions,
    ) -> Result<AcquiredSong, DownloadError> {
        let calls = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((descriptor.search_term.clone(), tier.value()));
            calls.len()
        };
        if let Some((after, token)) = &self.cancel_after {
            if calls >= *after {
                token.cancel();
            }
        }

        let fails = self.failing_songs.contains(&descriptor.search_term)
            || !self.succeed_at.contains(&tier.value());
        if fails {
            return Err(DownloadError::new(
                self.failure,
                format!("nothing for '{}' at tier {}", descriptor, tier),
            ));
        }

        Ok(AcquiredSong {
            path: PathBuf::from(format!("{}.mp3", descriptor.search_term)),
            title: display_key(&descriptor.search_term).to_string(),
            artist: "Artist".to_string(),
            tier,
            bytes: 1024,
        })
    }
}

/// Broker operation as observed by [`InMemoryBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    Ack(u64),
    NackRequeue(u64),
    Publish(String),
}

#[derive(Default)]
struct BrokerState {
    work_queue: String,
    ready: VecDeque<(Vec<u8>, bool)>,
    unacked: HashMap<u64, Vec<u8>>,
    next_tag: u64,
    published: Vec<(String, Vec<u8>)>,
    calls: Vec<BrokerCall>,
    connects: usize,
    fail_next_ack: bool,
    fail_next_connect: bool,
}

/// Single-process broker with one work queue.
///
/// Publishing to the work queue makes the message deliverable again. When a
/// session asks for a delivery and nothing is ready, the drained token is
/// cancelled and the call never returns.
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    drained: CancellationToken,
}

impl InMemoryBroker {
    pub fn with_messages(bodies: Vec<Vec<u8>>) -> Self {
        let state = BrokerState {
            ready: bodies.into_iter().map(|body| (body, false)).collect(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            drained: CancellationToken::new(),
        }
    }

    pub fn drained_token(&self) -> CancellationToken {
        self.drained.clone()
    }

    pub fn fail_next_ack(&self) {
        self.state.lock().unwrap().fail_next_ack = true;
    }

    pub fn fail_next_connect(&self) {
        self.state.lock().unwrap().fail_next_connect = true;
    }

    pub fn calls(&self) -> Vec<BrokerCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn published(&self, queue: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|(q, _)| q == queue)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl JobBroker for InMemoryBroker {
    async fn connect(&self, topology: &QueueTopology) -> Result<Box<dyn BrokerSession>, BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        if state.fail_next_connect {
            state.fail_next_connect = false;
            return Err(BrokerError::Other("connection refused".to_string()));
        }
        state.work_queue = topology.work_queue.clone();

        // Whatever the previous session left unacknowledged comes back
        let mut orphaned: Vec<(u64, Vec<u8>)> = state.unacked.drain().collect();
        orphaned.sort_by_key(|(tag, _)| *tag);
        for (_, body) in orphaned.into_iter().rev() {
            state.ready.push_front((body, true));
        }

        Ok(Box::new(InMemorySession {
            state: self.state.clone(),
            drained: self.drained.clone(),
        }))
    }
}

struct InMemorySession {
    state: Arc<Mutex<BrokerState>>,
    drained: CancellationToken,
}

#[async_trait]
impl BrokerSession for InMemorySession {
    async fn next_delivery(&mut self) -> Result<Delivery, BrokerError> {
        let next = {
            let mut state = self.state.lock().unwrap();
            match state.ready.pop_front() {
                Some((body, redelivered)) => {
                    state.next_tag += 1;
                    let tag = state.next_tag;
                    state.unacked.insert(tag, body.clone());
                    Some(Delivery {
                        tag,
                        body,
                        redelivered,
                    })
                }
                None => None,
            }
        };

        match next {
            Some(delivery) => Ok(delivery),
            None => {
                self.drained.cancel();
                std::future::pending().await
            }
        }
    }

    async fn ack(&mut self, tag: u64) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_ack {
            state.fail_next_ack = false;
            return Err(BrokerError::Other("channel closed".to_string()));
        }
        state.unacked.remove(&tag);
        state.calls.push(BrokerCall::Ack(tag));
        Ok(())
    }

    async fn nack_requeue(&mut self, tag: u64) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        if let Some(body) = state.unacked.remove(&tag) {
            state.ready.push_front((body, true));
        }
        state.calls.push(BrokerCall::NackRequeue(tag));
        Ok(())
    }

    async fn publish(&mut self, queue: &str, body: &[u8]) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.published.push((queue.to_string(), body.to_vec()));
        state.calls.push(BrokerCall::Publish(queue.to_string()));
        if queue == state.work_queue {
            state.ready.push_back((body.to_vec(), false));
        }
        Ok(())
    }

    async fn close(&mut self) {}
}
