//! Runtime toggles (read once from the environment) and node input ranges.

use once_cell::sync::OnceCell;
use std::time::Duration;

pub const DEFAULT_UPDATE_INTERVAL_SECS: f64 = 1.0;
pub const MIN_UPDATE_INTERVAL_SECS: f64 = 0.1;
pub const MAX_UPDATE_INTERVAL_SECS: f64 = 10.0;

pub const DEFAULT_HISTORY_LENGTH: usize = 60;
pub const MIN_HISTORY_LENGTH: usize = 10;
pub const MAX_HISTORY_LENGTH: usize = 300;

pub const DEFAULT_WARNING_THRESHOLD: f64 = 80.0;
pub const MIN_WARNING_THRESHOLD: f64 = 50.0;
pub const MAX_WARNING_THRESHOLD: f64 = 95.0;

pub const MAX_REFRESH_TRIGGER: u32 = 9999;
pub const MAX_FORCE_RUN: u32 = 999;

/// "Only When High" cleans at or above this usage.
pub const HIGH_USAGE_PERCENT: f64 = 70.0;

/// Upper bound on how long `stop()` waits for the sampler to finish its tick.
pub const STOP_GRACE: Duration = Duration::from_secs(1);

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_millis(750);
/// Provider calls never outlive the stop grace.
pub const MAX_PROVIDER_TIMEOUT: Duration = Duration::from_millis(900);

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name).map(|v| v != "0").unwrap_or(default)
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

// VRAMWATCH_GPU=0 forces the empty provider even when NVML is present.
pub fn gpu_enabled() -> bool {
    static ON: OnceCell<bool> = OnceCell::new();
    *ON.get_or_init(|| env_flag("VRAMWATCH_GPU", true))
}

pub fn provider_timeout() -> Duration {
    static MS: OnceCell<u64> = OnceCell::new();
    let ms = *MS.get_or_init(|| {
        env_u64("VRAMWATCH_PROVIDER_TIMEOUT_MS")
            .unwrap_or(DEFAULT_PROVIDER_TIMEOUT.as_millis() as u64)
    });
    clamp_provider_timeout(Duration::from_millis(ms))
}

pub fn clamp_provider_timeout(limit: Duration) -> Duration {
    limit.clamp(Duration::from_millis(1), MAX_PROVIDER_TIMEOUT)
}

/// How many of the newest samples the statistics block covers.
pub fn summary_window() -> usize {
    static N: OnceCell<usize> = OnceCell::new();
    *N.get_or_init(|| {
        env_u64("VRAMWATCH_SUMMARY_WINDOW")
            .map(|v| v as usize)
            .filter(|v| *v > 0)
            .unwrap_or(10)
    })
}

pub fn clamp_interval(secs: f64) -> f64 {
    if secs.is_nan() {
        return DEFAULT_UPDATE_INTERVAL_SECS;
    }
    secs.clamp(MIN_UPDATE_INTERVAL_SECS, MAX_UPDATE_INTERVAL_SECS)
}

pub fn clamp_history(len: usize) -> usize {
    len.clamp(MIN_HISTORY_LENGTH, MAX_HISTORY_LENGTH)
}

pub fn clamp_threshold(pct: f64) -> f64 {
    if pct.is_nan() {
        return DEFAULT_WARNING_THRESHOLD;
    }
    pct.clamp(MIN_WARNING_THRESHOLD, MAX_WARNING_THRESHOLD)
}
