//! Background sampler: periodically queries the GPU provider and records snapshots,
//! so node evaluations just read the history.
//!
//! The [`Monitor`] owns a small dedicated runtime and is meant to be driven from
//! synchronous host code. Do not call [`Monitor::sample_now`] from inside another
//! async runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Local;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::{
    clamp_provider_timeout, provider_timeout, DEFAULT_HISTORY_LENGTH,
    DEFAULT_UPDATE_INTERVAL_SECS, DEFAULT_WARNING_THRESHOLD, MAX_UPDATE_INTERVAL_SECS,
    STOP_GRACE,
};
use crate::error::{GpuError, MonitorError};
use crate::gpu::GpuInfoProvider;
use crate::state::MonitorState;
use crate::types::{DeviceInfo, Snapshot, Summary, ThresholdWarning};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerSettings {
    pub interval: Duration,
    pub capacity: usize,
    pub warning_threshold: f64,
}

impl SamplerSettings {
    pub fn new(interval_secs: f64, capacity: usize, warning_threshold: f64) -> Self {
        let secs = if interval_secs.is_finite() && interval_secs > 0.0 {
            interval_secs.min(MAX_UPDATE_INTERVAL_SECS)
        } else {
            DEFAULT_UPDATE_INTERVAL_SECS
        };
        Self {
            interval: Duration::from_secs_f64(secs),
            capacity: capacity.max(1),
            warning_threshold,
        }
    }
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self::new(
            DEFAULT_UPDATE_INTERVAL_SECS,
            DEFAULT_HISTORY_LENGTH,
            DEFAULT_WARNING_THRESHOLD,
        )
    }
}

/// What a single tick did.
#[derive(Debug)]
pub enum TickOutcome {
    Recorded(Snapshot),
    NoDevice,
    Failed(GpuError),
}

/// Strictly greater: a reading equal to the threshold does not warn.
pub fn exceeds_threshold(percent_used: f64, threshold: f64) -> bool {
    percent_used > threshold
}

struct Worker {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    settings: SamplerSettings,
}

pub struct Monitor {
    // Some until drop
    rt: Option<Runtime>,
    provider: Arc<dyn GpuInfoProvider>,
    state: MonitorState,
    worker: Mutex<Option<Worker>>,
    // loop a stop could not wait for; joined before the next start
    draining: Mutex<Option<JoinHandle<()>>>,
    // settings used by sample_now() while stopped
    last_settings: Mutex<SamplerSettings>,
    provider_timeout: Duration,
}

impl Monitor {
    pub fn new(provider: Arc<dyn GpuInfoProvider>) -> Result<Self, MonitorError> {
        Self::with_provider_timeout(provider, provider_timeout())
    }

    pub fn with_provider_timeout(
        provider: Arc<dyn GpuInfoProvider>,
        provider_timeout: Duration,
    ) -> Result<Self, MonitorError> {
        let rt = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(4)
            .thread_name("vramwatch-sampler")
            .enable_time()
            .build()?;
        Ok(Self {
            rt: Some(rt),
            provider,
            state: MonitorState::new(DEFAULT_HISTORY_LENGTH),
            worker: Mutex::new(None),
            draining: Mutex::new(None),
            last_settings: Mutex::new(SamplerSettings::default()),
            provider_timeout: clamp_provider_timeout(provider_timeout),
        })
    }

    fn rt(&self) -> &Runtime {
        self.rt.as_ref().expect("runtime lives until drop")
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn provider(&self) -> &Arc<dyn GpuInfoProvider> {
        &self.provider
    }

    pub fn is_running(&self) -> bool {
        self.worker().is_some()
    }

    /// Settings of the running sampler, if any.
    pub fn settings(&self) -> Option<SamplerSettings> {
        self.worker().as_ref().map(|w| w.settings)
    }

    /// Start periodic sampling. Returns `false` (and changes nothing) when already running.
    pub fn start(&self, settings: SamplerSettings) -> bool {
        let mut slot = self.worker();
        if slot.is_some() {
            debug!("sampler already running; start ignored");
            return false;
        }

        let leftover = self
            .draining
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = leftover {
            self.join(handle);
        }

        self.state.set_capacity(settings.capacity);
        *self.last_settings.lock().unwrap_or_else(|e| e.into_inner()) = settings;

        let running = Arc::new(AtomicBool::new(true));
        let wake = Arc::new(Notify::new());
        let handle = self.rt().spawn(run_loop(
            self.provider.clone(),
            self.state.clone(),
            settings,
            running.clone(),
            wake.clone(),
            self.provider_timeout,
        ));
        *slot = Some(Worker {
            handle,
            running,
            wake,
            settings,
        });
        info!(
            interval_s = settings.interval.as_secs_f64(),
            history = settings.capacity,
            threshold = settings.warning_threshold,
            provider = self.provider.name(),
            "GPU monitoring started"
        );
        true
    }

    /// Signal the loop to exit after its current tick and wait up to one second.
    /// Returns `false` when nothing was running.
    pub fn stop(&self) -> bool {
        let Some(w) = self.worker().take() else {
            return false;
        };
        w.running.store(false, Ordering::Release);
        // notify_one stores a permit, so a loop that is mid-tick still wakes immediately.
        w.wake.notify_one();
        self.join(w.handle);
        info!("GPU monitoring stopped");
        true
    }

    /// Wait (bounded) for a loop that was told to exit. A loop that cannot be
    /// waited for is parked in `draining` and joined by the next `start`.
    fn join(&self, mut handle: JoinHandle<()>) -> bool {
        if tokio::runtime::Handle::try_current().is_ok() {
            // Can't block inside an async context; the loop exits on its own.
            debug!("stop called from async context; not waiting for sampler");
            self.park(handle);
            return false;
        }
        match self
            .rt()
            .block_on(async { timeout(STOP_GRACE, &mut handle).await })
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "sampler task ended abnormally");
                true
            }
            Err(_) => {
                warn!(
                    grace_ms = STOP_GRACE.as_millis() as u64,
                    "sampler did not finish in time"
                );
                self.park(handle);
                false
            }
        }
    }

    fn park(&self, handle: JoinHandle<()>) {
        *self.draining.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Stop and start again with new settings.
    pub fn restart(&self, settings: SamplerSettings) {
        self.stop();
        self.start(settings);
    }

    /// Run one tick now, on the caller's thread.
    pub fn sample_now(&self) -> TickOutcome {
        let threshold = self
            .settings()
            .unwrap_or_else(|| *self.last_settings.lock().unwrap_or_else(|e| e.into_inner()))
            .warning_threshold;
        let reading = self
            .rt()
            .block_on(query_provider(self.provider.clone(), self.provider_timeout));
        record_reading(&self.state, reading, threshold)
    }

    /// Query the provider without recording anything.
    pub fn query_current(&self) -> Result<Option<DeviceInfo>, GpuError> {
        self.rt()
            .block_on(query_provider(self.provider.clone(), self.provider_timeout))
    }

    pub fn snapshot_summary(&self, window: usize) -> Summary {
        self.state.summary(window)
    }

    pub fn subscribe_warnings(&self) -> std::sync::mpsc::Receiver<ThresholdWarning> {
        self.state.subscribe()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
        if let Some(rt) = self.rt.take() {
            // A provider call stuck in the blocking pool must not hang the host.
            if tokio::runtime::Handle::try_current().is_ok() {
                rt.shutdown_background();
            } else {
                rt.shutdown_timeout(STOP_GRACE);
            }
        }
    }
}

struct LoopGuard(MonitorState);

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.active_loops.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn run_loop(
    provider: Arc<dyn GpuInfoProvider>,
    state: MonitorState,
    settings: SamplerSettings,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    provider_timeout: Duration,
) {
    state.active_loops.fetch_add(1, Ordering::AcqRel);
    let _guard = LoopGuard(state.clone());

    while running.load(Ordering::Acquire) {
        let reading = query_provider(provider.clone(), provider_timeout).await;
        if !running.load(Ordering::Acquire) {
            debug!("stopped during provider call; reading dropped");
            break;
        }
        record_reading(&state, reading, settings.warning_threshold);

        tokio::select! {
            _ = sleep(settings.interval) => {}
            _ = wake.notified() => {}
        }
    }
    debug!("sampler loop exited");
}

/// One provider call on the blocking pool, bounded by `limit`.
pub(crate) async fn query_provider(
    provider: Arc<dyn GpuInfoProvider>,
    limit: Duration,
) -> Result<Option<DeviceInfo>, GpuError> {
    let task = tokio::task::spawn_blocking(move || provider.query());
    match timeout(limit, task).await {
        Ok(Ok(res)) => res,
        Ok(Err(e)) => Err(GpuError::Task(e.to_string())),
        Err(_) => Err(GpuError::Timeout(limit.as_millis() as u64)),
    }
}

fn record_reading(
    state: &MonitorState,
    reading: Result<Option<DeviceInfo>, GpuError>,
    warning_threshold: f64,
) -> TickOutcome {
    let info = match reading {
        Ok(Some(info)) => info,
        Ok(None) => {
            debug!("no device found; tick skipped");
            return TickOutcome::NoDevice;
        }
        Err(e) => {
            warn!(error = %e, "GPU query failed; retrying next tick");
            return TickOutcome::Failed(e);
        }
    };

    let snap = Snapshot::from_device(&info, Local::now());
    state.record(snap.clone());

    if exceeds_threshold(snap.percent_used, warning_threshold) {
        warn!(
            percent = snap.percent_used,
            threshold = warning_threshold,
            device = %snap.device_name,
            "🚨 GPU memory usage above warning threshold"
        );
        state.publish_warning(ThresholdWarning {
            timestamp: snap.timestamp,
            percent_used: snap.percent_used,
            threshold: warning_threshold,
            device_name: snap.device_name.clone(),
        });
    }
    TickOutcome::Recorded(snap)
}
