//! Data types shared by the sampler, the nodes and the display.
//! Keep this module minimal and stable: node outputs are serialized from it.

use chrono::{DateTime, Local};
use serde::Serialize;

/// One device as reported by a telemetry provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub memory_total_mb: f64,
    pub memory_used_mb: f64,
    // fraction 0..1
    pub memory_util: f64,
}

impl DeviceInfo {
    pub fn percent_used(&self) -> f64 {
        self.memory_util * 100.0
    }
}

/// One timestamped GPU memory reading. Never mutated after it is recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Local>,
    pub percent_used: f64,
    pub used_mb: f64,
    pub total_mb: f64,
    pub device_name: String,
}

impl Snapshot {
    pub fn from_device(info: &DeviceInfo, timestamp: DateTime<Local>) -> Self {
        Self {
            timestamp,
            percent_used: info.percent_used(),
            used_mb: info.memory_used_mb,
            total_mb: info.memory_total_mb,
            device_name: info.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
    Unknown,
}

impl Trend {
    pub fn label(self) -> &'static str {
        match self {
            Trend::Increasing => "📈 Increasing trend",
            Trend::Decreasing => "📉 Decreasing trend",
            Trend::Stable => "➡️ Stable",
            Trend::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowStats {
    pub average: f64,
    pub max: f64,
    pub min: f64,
}

/// Rolling statistics over the newest part of the history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    // number of samples the stats were computed over
    pub samples: usize,
    pub stats: Option<WindowStats>,
    pub trend: Trend,
}

/// Emitted when a sample exceeds the configured warning threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdWarning {
    pub timestamp: DateTime<Local>,
    pub percent_used: f64,
    pub threshold: f64,
    pub device_name: String,
}
