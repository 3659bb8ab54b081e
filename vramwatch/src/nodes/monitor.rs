//! GPU Monitor node: keeps the background sampler in line with the node inputs
//! and renders the current reading plus history statistics.

use std::sync::Arc;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{NodeDescriptor, NodeOutput, CATEGORY};
use crate::config::{
    clamp_history, clamp_interval, clamp_threshold, summary_window, DEFAULT_HISTORY_LENGTH,
    DEFAULT_UPDATE_INTERVAL_SECS, DEFAULT_WARNING_THRESHOLD, MAX_REFRESH_TRIGGER,
};
use crate::display::{clock, status_display, status_line};
use crate::error::MonitorError;
use crate::gpu::GpuInfoProvider;
use crate::sampler::{Monitor, SamplerSettings};
use crate::types::Snapshot;

pub const DESCRIPTOR: NodeDescriptor = NodeDescriptor {
    class_name: "VramwatchGpuMonitor",
    display_name: "vramwatch - GPU Monitor",
    category: CATEGORY,
    function: "monitor_gpu",
    output_names: &["status", "usage_percent", "used_mb", "total_mb", "gpu_name"],
    output_node: true,
    always_changed: true,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorInputs {
    pub monitoring_enabled: bool,
    pub update_interval: f64,
    pub history_length: usize,
    pub warning_threshold: f64,
    pub refresh_trigger: u32,
}

impl Default for MonitorInputs {
    fn default() -> Self {
        Self {
            monitoring_enabled: true,
            update_interval: DEFAULT_UPDATE_INTERVAL_SECS,
            history_length: DEFAULT_HISTORY_LENGTH,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            refresh_trigger: 0,
        }
    }
}

impl MonitorInputs {
    /// Pull every input into its documented range.
    pub fn clamped(self) -> Self {
        Self {
            monitoring_enabled: self.monitoring_enabled,
            update_interval: clamp_interval(self.update_interval),
            history_length: clamp_history(self.history_length),
            warning_threshold: clamp_threshold(self.warning_threshold),
            refresh_trigger: self.refresh_trigger.min(MAX_REFRESH_TRIGGER),
        }
    }

    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings::new(
            self.update_interval,
            self.history_length,
            self.warning_threshold,
        )
    }
}

/// `(status, usage_percent, used_mb, total_mb, gpu_name)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorOutputs {
    pub status: String,
    pub usage_percent: f64,
    pub used_mb: f64,
    pub total_mb: f64,
    pub gpu_name: String,
}

impl MonitorOutputs {
    fn empty(status: String, gpu_name: &str) -> Self {
        Self {
            status,
            usage_percent: 0.0,
            used_mb: 0.0,
            total_mb: 0.0,
            gpu_name: gpu_name.to_string(),
        }
    }
}

pub struct GpuMonitorNode {
    monitor: Monitor,
    last_refresh_trigger: u32,
}

impl GpuMonitorNode {
    pub fn new(provider: Arc<dyn GpuInfoProvider>) -> Result<Self, MonitorError> {
        Ok(Self::with_monitor(Monitor::new(provider)?))
    }

    pub fn with_monitor(monitor: Monitor) -> Self {
        Self {
            monitor,
            last_refresh_trigger: 0,
        }
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn evaluate(&mut self, inputs: MonitorInputs) -> NodeOutput<MonitorOutputs> {
        let inputs = inputs.clamped();
        let time = clock();

        if !inputs.monitoring_enabled {
            self.monitor.stop();
            let msg = format!("⏸️ [{time}] GPU real-time monitoring disabled");
            return NodeOutput::new(msg.clone(), MonitorOutputs::empty(msg, "Unknown"));
        }

        let wanted = inputs.sampler_settings();
        match self.monitor.settings() {
            None => {
                self.monitor.start(wanted);
            }
            Some(current) if current != wanted => {
                info!("monitor settings changed; restarting sampler");
                self.monitor.restart(wanted);
            }
            Some(_) => {}
        }

        let trigger_changed = inputs.refresh_trigger != self.last_refresh_trigger;
        self.last_refresh_trigger = inputs.refresh_trigger;
        if trigger_changed && inputs.refresh_trigger > 0 {
            self.monitor.sample_now();
        }

        let info = match self.monitor.query_current() {
            Ok(Some(info)) => info,
            Ok(None) => {
                let msg = format!("❌ [{time}] Cannot get GPU information");
                return NodeOutput::new(msg.clone(), MonitorOutputs::empty(msg, "Error"));
            }
            Err(e) => {
                let msg = format!("💥 [{time}] GPU monitoring error: {e}");
                tracing::error!(error = %e, "GPU monitoring error");
                return NodeOutput::new(msg.clone(), MonitorOutputs::empty(msg, "Error"));
            }
        };

        let current = Snapshot::from_device(&info, Local::now());
        if inputs.refresh_trigger > 0 {
            info!(
                usage = current.percent_used,
                trigger = inputs.refresh_trigger,
                "🔄 GPU status update"
            );
        }

        let summary = self.monitor.snapshot_summary(summary_window());
        let display = status_display(Some(&current), &summary, inputs.warning_threshold);

        NodeOutput::new(
            display,
            MonitorOutputs {
                status: status_line(current.percent_used, current.used_mb, current.total_mb),
                usage_percent: current.percent_used,
                used_mb: current.used_mb,
                total_mb: current.total_mb,
                gpu_name: current.device_name,
            },
        )
    }
}
