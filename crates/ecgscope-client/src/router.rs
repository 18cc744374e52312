//! Runs classification fetches on a worker thread and routes the answers
//! back into the chart store, dropping any that a newer request superseded.

use crate::api::ApiClient;
use crossbeam_channel::{bounded, never, unbounded, Receiver, RecvTimeoutError, Sender};
use ecgscope_lib::classification::{ClassificationOutcome, FetchRequest, RecordKey, RequestTag};
use ecgscope_lib::signal::SignalStore;
use ecgscope_lib::store::ChartStore;
use log::{debug, warn};
use std::ops::{Deref, DerefMut};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Source of per-beat labels for a recording.
pub trait BeatClassifier: Send + 'static {
    fn classify(&self, key: RecordKey, force_refresh: bool) -> ClassificationOutcome;
}

impl BeatClassifier for ApiClient {
    fn classify(&self, key: RecordKey, force_refresh: bool) -> ClassificationOutcome {
        ApiClient::classify(self, key.patient_id, key.ecg_id, force_refresh)
            .map(|response| response.beats_prediction)
            .map_err(|err| err.to_string())
    }
}

enum RouterCommand {
    Classify {
        request: FetchRequest,
        force_refresh: bool,
    },
    Shutdown,
}

struct Classified {
    tag: RequestTag,
    outcome: ClassificationOutcome,
}

pub struct ClassificationRouter {
    chart: ChartStore,
    command_tx: Sender<RouterCommand>,
    update_rx: Receiver<Classified>,
    worker: Option<JoinHandle<()>>,
}

impl ClassificationRouter {
    pub fn new<C: BeatClassifier>(chart: ChartStore, classifier: C) -> Self {
        let (command_tx, command_rx) = bounded(16);
        let (update_tx, update_rx) = unbounded();
        let worker = std::thread::spawn(move || run_worker(classifier, command_rx, update_tx));
        Self {
            chart,
            command_tx,
            update_rx,
            worker: Some(worker),
        }
    }

    /// Load a recording and start fetching its labels if the record changed.
    pub fn load(&mut self, record: Option<RecordKey>, signal: SignalStore) {
        if let Some(request) = self.chart.load(record, signal) {
            self.dispatch(request, false);
        }
    }

    /// Re-run classification for the current record, bypassing stored results.
    pub fn refresh(&mut self) {
        if let Some(request) = self.chart.refresh_classification() {
            self.dispatch(request, true);
        }
    }

    fn dispatch(&mut self, request: FetchRequest, force_refresh: bool) {
        debug!("dispatching fetch {} for {}", request.tag.value(), request.key);
        let command = RouterCommand::Classify {
            request,
            force_refresh,
        };
        if self.command_tx.send(command).is_err() {
            warn!("classification worker is gone");
            self.chart
                .complete_classification(request.tag, Err("classification worker stopped".into()));
        }
    }

    /// Apply every answer received so far. Returns how many changed the labels.
    pub fn route_pending_updates(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.update_rx.try_recv() {
            if self.chart.complete_classification(update.tag, update.outcome) {
                applied += 1;
            }
        }
        applied
    }

    /// Block until the latest fetch settled or `timeout` elapsed.
    pub fn wait_for_labels(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.route_pending_updates();
            if !self.chart.labels().is_loading() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.update_rx.recv_timeout(remaining) {
                Ok(update) => {
                    self.chart.complete_classification(update.tag, update.outcome);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return !self.chart.labels().is_loading();
                }
            }
        }
    }

    pub fn into_chart(mut self) -> ChartStore {
        self.shutdown();
        std::mem::take(&mut self.chart)
    }

    /// Unrouted answers are discarded; the worker stops at its next send.
    fn shutdown(&mut self) {
        self.update_rx = never();
        let _ = self.command_tx.send(RouterCommand::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker<C: BeatClassifier>(
    classifier: C,
    command_rx: Receiver<RouterCommand>,
    update_tx: Sender<Classified>,
) {
    while let Ok(command) = command_rx.recv() {
        match command {
            RouterCommand::Classify {
                request,
                force_refresh,
            } => {
                let outcome = classifier.classify(request.key, force_refresh);
                let update = Classified {
                    tag: request.tag,
                    outcome,
                };
                if update_tx.send(update).is_err() {
                    break;
                }
            }
            RouterCommand::Shutdown => break,
        }
    }
}

impl Deref for ClassificationRouter {
    type Target = ChartStore;

    fn deref(&self) -> &Self::Target {
        &self.chart
    }
}

impl DerefMut for ClassificationRouter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.chart
    }
}

impl Drop for ClassificationRouter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
