//! Shared monitor state: the snapshot history, last update time and warning bookkeeping.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Local};

use crate::history::HistoryBuffer;
use crate::types::{Snapshot, Summary, ThresholdWarning};

#[derive(Debug)]
struct Inner {
    history: HistoryBuffer,
    last_update: Option<DateTime<Local>>,
    last_warning: Option<ThresholdWarning>,
}

#[derive(Clone)]
pub struct MonitorState {
    inner: Arc<RwLock<Inner>>,
    subscribers: Arc<Mutex<Vec<mpsc::Sender<ThresholdWarning>>>>,
    warning_count: Arc<AtomicU64>,
    // number of sampler loops currently alive
    pub(crate) active_loops: Arc<AtomicUsize>,
}

impl MonitorState {
    pub fn new(history_length: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                history: HistoryBuffer::new(history_length),
                last_update: None,
                last_warning: None,
            })),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            warning_count: Arc::new(AtomicU64::new(0)),
            active_loops: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a fully built snapshot, evicting the oldest when full.
    pub fn record(&self, snap: Snapshot) {
        let mut g = self.write();
        g.last_update = Some(snap.timestamp);
        g.history.push(snap);
    }

    pub fn set_capacity(&self, cap: usize) {
        self.write().history.set_capacity(cap);
    }

    pub fn capacity(&self) -> usize {
        self.read().history.capacity()
    }

    pub fn len(&self) -> usize {
        self.read().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().history.is_empty()
    }

    /// Copy of the history, oldest first.
    pub fn history(&self) -> Vec<Snapshot> {
        self.read().history.to_vec()
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.read().history.latest().cloned()
    }

    pub fn last_update(&self) -> Option<DateTime<Local>> {
        self.read().last_update
    }

    pub fn summary(&self, window: usize) -> Summary {
        self.read().history.summary(window)
    }

    pub fn clear(&self) {
        let mut g = self.write();
        g.history.clear();
        g.last_update = None;
    }

    pub fn last_warning(&self) -> Option<ThresholdWarning> {
        self.read().last_warning.clone()
    }

    pub fn warning_count(&self) -> u64 {
        self.warning_count.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> mpsc::Receiver<ThresholdWarning> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    pub(crate) fn publish_warning(&self, warning: ThresholdWarning) {
        self.warning_count.fetch_add(1, Ordering::Relaxed);
        self.write().last_warning = Some(warning.clone());
        // Drop receivers that went away.
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|tx| tx.send(warning.clone()).is_ok());
    }

    pub fn active_loops(&self) -> usize {
        self.active_loops.load(Ordering::Acquire)
    }
}
