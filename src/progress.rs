use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    #[default]
    Idle,
    FetchingKingdoms,
    FanningOutOrganisms,
    FanningOutGenes,
    Aggregating,
    Done,
    Interrupted,
    Failed,
}

impl RunState {
    pub fn label(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::FetchingKingdoms => "gathering kingdoms",
            RunState::FanningOutOrganisms => "processing organisms",
            RunState::FanningOutGenes => "processing genes",
            RunState::Aggregating => "aggregating",
            RunState::Done => "finished",
            RunState::Interrupted => "interrupted",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TaskProgress {
    pub state: RunState,
    pub current: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DownloadProgress {
    pub downloading: Option<String>,
    pub downloaded: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Online,
    Trouble,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiStatus {
    pub message: String,
    pub liveness: Liveness,
}

impl ApiStatus {
    pub fn online() -> Self {
        Self {
            message: "API Online".to_string(),
            liveness: Liveness::Online,
        }
    }

    pub fn trouble() -> Self {
        Self {
            message: "API Online - Could not get all data (server issues)".to_string(),
            liveness: Liveness::Trouble,
        }
    }

    pub fn offline() -> Self {
        Self {
            message: "API Offline".to_string(),
            liveness: Liveness::Offline,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    Task(TaskProgress),
    Download(DownloadProgress),
    Api(ApiStatus),
    Eta(Option<Duration>),
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: StatusEvent);
}

pub struct ChannelSink {
    sender: mpsc::Sender<StatusEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::Receiver<StatusEvent>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelSink {
    fn event(&self, event: StatusEvent) {
        let _ = self.sender.send(event);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub task: TaskProgress,
    pub download: DownloadProgress,
    pub api: Option<ApiStatus>,
    pub eta: Option<Duration>,
}

#[derive(Default)]
struct DownloadLabels {
    downloading: Option<String>,
    downloaded: Option<String>,
}

pub struct StatusHub {
    sinks: Vec<Arc<dyn ProgressSink>>,
    state: Mutex<RunState>,
    current: AtomicU64,
    total: AtomicU64,
    downloads: AtomicU64,
    labels: Mutex<DownloadLabels>,
    api: Mutex<Option<ApiStatus>>,
    eta: Mutex<Option<Duration>>,
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl StatusHub {
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self {
            sinks,
            state: Mutex::new(RunState::Idle),
            current: AtomicU64::new(0),
            total: AtomicU64::new(0),
            downloads: AtomicU64::new(0),
            labels: Mutex::new(DownloadLabels::default()),
            api: Mutex::new(None),
            eta: Mutex::new(None),
        }
    }

    fn publish(&self, event: StatusEvent) {
        for sink in &self.sinks {
            sink.event(event.clone());
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn task(&self) -> TaskProgress {
        TaskProgress {
            state: self.state(),
            current: self.current.load(Ordering::SeqCst),
            total: self.total.load(Ordering::SeqCst),
        }
    }

    pub fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
        self.publish(StatusEvent::Task(self.task()));
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
        self.publish(StatusEvent::Task(self.task()));
    }

    pub fn advance(&self) -> u64 {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.publish(StatusEvent::Task(self.task()));
        current
    }

    pub fn remaining(&self) -> u64 {
        self.total
            .load(Ordering::SeqCst)
            .saturating_sub(self.current.load(Ordering::SeqCst))
    }

    pub fn download(&self) -> DownloadProgress {
        let labels = self.labels.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        DownloadProgress {
            downloading: labels.downloading.clone(),
            downloaded: labels.downloaded.clone(),
            count: self.downloads.load(Ordering::SeqCst),
        }
    }

    pub fn downloading(&self, label: &str) {
        self.labels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .downloading = Some(label.to_string());
        self.publish(StatusEvent::Download(self.download()));
    }

    pub fn downloaded(&self, label: &str) {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.labels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .downloaded = Some(label.to_string());
        self.publish(StatusEvent::Download(self.download()));
    }

    pub fn api(&self) -> Option<ApiStatus> {
        self.api
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_api(&self, status: ApiStatus) {
        *self.api.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(status.clone());
        self.publish(StatusEvent::Api(status));
    }

    pub fn eta(&self) -> Option<Duration> {
        *self.eta.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_eta(&self, eta: Option<Duration>) {
        *self.eta.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = eta;
        self.publish(StatusEvent::Eta(eta));
    }

    /// Zeroes the progress counters and the estimate. Liveness is kept, it
    /// describes the endpoint rather than the run.
    pub fn reset(&self) {
        self.current.store(0, Ordering::SeqCst);
        self.total.store(0, Ordering::SeqCst);
        self.downloads.store(0, Ordering::SeqCst);
        *self.labels.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) =
            DownloadLabels::default();
        self.publish(StatusEvent::Task(self.task()));
        self.set_eta(None);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            task: self.task(),
            download: self.download(),
            api: self.api(),
            eta: self.eta(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_reach_channel_subscribers() {
        let (sink, receiver) = ChannelSink::new();
        let hub = StatusHub::new(vec![Arc::new(sink)]);
        hub.set_total(2);
        hub.advance();
        hub.set_api(ApiStatus::offline());

        let events: Vec<StatusEvent> = receiver.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[1],
            StatusEvent::Task(TaskProgress {
                state: RunState::Idle,
                current: 1,
                total: 2,
            })
        );
        assert_eq!(events[2], StatusEvent::Api(ApiStatus::offline()));
    }

    #[test]
    fn reset_clears_progress_but_keeps_liveness() {
        let hub = StatusHub::default();
        hub.set_total(5);
        hub.advance();
        hub.downloaded("NC_000913 (Bacteria)");
        hub.set_eta(Some(Duration::from_secs(3)));
        hub.set_api(ApiStatus::trouble());
        hub.reset();

        let snapshot = hub.snapshot();
        assert_eq!(snapshot.task.current, 0);
        assert_eq!(snapshot.task.total, 0);
        assert_eq!(snapshot.download.count, 0);
        assert_eq!(snapshot.eta, None);
        assert_eq!(snapshot.api, Some(ApiStatus::trouble()));
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (sink, receiver) = ChannelSink::new();
        drop(receiver);
        sink.event(StatusEvent::Eta(None));
    }
}
