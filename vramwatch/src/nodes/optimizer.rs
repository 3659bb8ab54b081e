//! VRAM Optimizer node: decides when to run the cache-release cleanup and
//! reports the outcome as a status line.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Runtime};
use tracing::{error, info};

use super::{NodeDescriptor, NodeOutput, CATEGORY};
use crate::cleaner::{cleanup_message, should_clean, AutoClean, ClearMode, VramCleaner};
use crate::config::{
    clamp_provider_timeout, provider_timeout, HIGH_USAGE_PERCENT, MAX_FORCE_RUN,
};
use crate::display::clock;
use crate::error::{GpuError, MonitorError};
use crate::gpu::GpuInfoProvider;
use crate::sampler::query_provider;
use crate::types::DeviceInfo;

pub const DESCRIPTOR: NodeDescriptor = NodeDescriptor {
    class_name: "VramwatchVramOptimizer",
    display_name: "vramwatch - VRAM Optimizer",
    category: CATEGORY,
    function: "setup_and_run",
    output_names: &["status"],
    output_node: true,
    always_changed: true,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunTiming {
    #[default]
    #[serde(rename = "After Queue")]
    AfterQueue,
    #[serde(rename = "Before Queue")]
    BeforeQueue,
    Both,
}

impl RunTiming {
    pub fn runs_before(self) -> bool {
        matches!(self, RunTiming::BeforeQueue | RunTiming::Both)
    }

    pub fn runs_after(self) -> bool {
        matches!(self, RunTiming::AfterQueue | RunTiming::Both)
    }
}

impl fmt::Display for RunTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunTiming::AfterQueue => f.write_str("After Queue"),
            RunTiming::BeforeQueue => f.write_str("Before Queue"),
            RunTiming::Both => f.write_str("Both"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    pub enabled: bool,
    pub clear_mode: ClearMode,
    pub auto_clean: AutoClean,
    pub run_timing: RunTiming,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            clear_mode: ClearMode::Standard,
            auto_clean: AutoClean::EveryTime,
            run_timing: RunTiming::AfterQueue,
        }
    }
}

impl OptimizerSettings {
    fn log_changes(&self, new: &OptimizerSettings) {
        if self.enabled != new.enabled {
            info!(
                setting = "enabled",
                old = self.enabled,
                new = new.enabled,
                "📝 setting changed"
            );
        }
        if self.clear_mode != new.clear_mode {
            info!(
                setting = "clear_mode",
                old = %self.clear_mode,
                new = %new.clear_mode,
                "📝 setting changed"
            );
        }
        if self.auto_clean != new.auto_clean {
            info!(
                setting = "auto_clean",
                old = %self.auto_clean,
                new = %new.auto_clean,
                "📝 setting changed"
            );
        }
        if self.run_timing != new.run_timing {
            info!(
                setting = "run_timing",
                old = %self.run_timing,
                new = %new.run_timing,
                "📝 setting changed"
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerInputs {
    #[serde(flatten)]
    pub settings: OptimizerSettings,
    // change to a non-zero value to trigger a manual cleanup
    pub force_run: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizerOutputs {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReason {
    SettingsChanged,
    Manual(u32),
    Initial,
    BeforeQueue(String),
    AfterQueue(String),
}

impl fmt::Display for RunReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunReason::SettingsChanged => f.write_str("Auto execution after settings change"),
            RunReason::Manual(t) => write!(f, "Manual execution (trigger: {t})"),
            RunReason::Initial => f.write_str("Initial execution"),
            RunReason::BeforeQueue(id) => write!(f, "Before queue execution (ID: {id})"),
            RunReason::AfterQueue(id) => write!(f, "After queue execution (ID: {id})"),
        }
    }
}

/// Whether this evaluation runs a cleanup. A settings change wins over a
/// simultaneous trigger change; both run the cleanup.
pub fn decide_run(
    settings_changed: bool,
    force_changed: bool,
    force_run: u32,
    execution_count: u64,
) -> Option<RunReason> {
    if settings_changed {
        Some(RunReason::SettingsChanged)
    } else if force_changed && force_run > 0 {
        Some(RunReason::Manual(force_run))
    } else if execution_count == 0 {
        Some(RunReason::Initial)
    } else {
        None
    }
}

pub struct VramOptimizerNode {
    settings: OptimizerSettings,
    execution_count: u64,
    last_force_run: u32,
    provider: Arc<dyn GpuInfoProvider>,
    cleaner: VramCleaner,
    // runs bounded provider queries; Some until drop
    rt: Option<Runtime>,
    provider_timeout: Duration,
}

impl VramOptimizerNode {
    pub fn new(
        provider: Arc<dyn GpuInfoProvider>,
        cleaner: VramCleaner,
    ) -> Result<Self, MonitorError> {
        Self::with_provider_timeout(provider, cleaner, provider_timeout())
    }

    pub fn with_provider_timeout(
        provider: Arc<dyn GpuInfoProvider>,
        cleaner: VramCleaner,
        provider_timeout: Duration,
    ) -> Result<Self, MonitorError> {
        let rt = Builder::new_current_thread()
            .max_blocking_threads(2)
            .thread_name("vramwatch-optimizer")
            .enable_time()
            .build()?;
        Ok(Self {
            settings: OptimizerSettings::default(),
            execution_count: 0,
            last_force_run: 0,
            provider,
            cleaner,
            rt: Some(rt),
            provider_timeout: clamp_provider_timeout(provider_timeout),
        })
    }

    fn query(&self) -> Result<Option<DeviceInfo>, GpuError> {
        let Some(rt) = self.rt.as_ref() else {
            return Err(GpuError::Other("optimizer runtime shut down".into()));
        };
        rt.block_on(query_provider(self.provider.clone(), self.provider_timeout))
    }

    pub fn settings(&self) -> OptimizerSettings {
        self.settings
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    pub fn evaluate(&mut self, inputs: OptimizerInputs) -> NodeOutput<OptimizerOutputs> {
        let force_run = inputs.force_run.min(MAX_FORCE_RUN);
        let new = inputs.settings;

        let settings_changed = self.settings != new;
        let force_changed = force_run != self.last_force_run;
        if settings_changed {
            info!("⚙️ settings change detected");
            self.settings.log_changes(&new);
        }
        self.settings = new;
        self.last_force_run = force_run;

        let reason = decide_run(
            settings_changed,
            force_changed,
            force_run,
            self.execution_count,
        );
        let status = match reason {
            Some(reason) => self.perform_cleanup(true, &reason),
            None => self.current_status(),
        };
        NodeOutput::new(status.clone(), OptimizerOutputs { status })
    }

    /// Queue hook: cleanup before a prompt runs, when the timing asks for it.
    pub fn before_queue(&mut self, prompt_id: &str) -> Option<String> {
        if !self.settings.run_timing.runs_before() {
            return None;
        }
        Some(self.perform_cleanup(false, &RunReason::BeforeQueue(prompt_id.to_string())))
    }

    /// Queue hook: cleanup after a prompt finished, when the timing asks for it.
    pub fn after_queue(&mut self, prompt_id: &str) -> Option<String> {
        if !self.settings.run_timing.runs_after() {
            return None;
        }
        Some(self.perform_cleanup(false, &RunReason::AfterQueue(prompt_id.to_string())))
    }

    /// Run one cleanup and return the status line. `forced` bypasses the enabled flag.
    pub fn perform_cleanup(&mut self, forced: bool, reason: &RunReason) -> String {
        let time = clock();
        self.execution_count += 1;
        let n = self.execution_count;
        info!(%reason, execution = n, "🎯 VRAM cleanup started");

        if !self.settings.enabled && !forced {
            let msg = format!("⏸️ [Execution#{n}] [{time}] VRAM cleanup disabled");
            info!("{msg}");
            return msg;
        }

        let gpu = match self.query() {
            Ok(Some(gpu)) => gpu,
            Ok(None) => {
                let msg = format!("❌ [Execution#{n}] [{time}] GPU not found");
                info!("{msg}");
                return msg;
            }
            Err(e) => {
                error!(error = %e, "VRAM cleanup error");
                return format!("💥 [Execution#{n}] [{time}] VRAM cleanup error: {e}");
            }
        };
        let percent = gpu.percent_used();
        info!(
            used_mb = gpu.memory_used_mb,
            total_mb = gpu.memory_total_mb,
            percent,
            "📊 GPU memory status"
        );

        if !should_clean(self.settings.auto_clean, Some(percent)) {
            let msg = format!(
                "ℹ️ [Execution#{n}] [{time}] VRAM usage {percent:.1}% < {HIGH_USAGE_PERCENT:.0}% → Cleanup skipped"
            );
            info!("{msg}");
            return msg;
        }

        let result = self.cleaner.perform_cleanup(self.settings.clear_mode);
        let final_status = if result.success && result.cleared_mb > 0.0 {
            "CLEANED"
        } else {
            "ALREADY_CLEAN"
        };
        info!(final_status, "🍓 cleanup finished");
        cleanup_message(&result, &time, n)
    }

    /// Report usage without cleaning.
    pub fn current_status(&self) -> String {
        let time = clock();
        let n = self.execution_count;
        match self.query() {
            Ok(Some(gpu)) => {
                let percent = gpu.percent_used();
                info!(percent, "📊 current status check");
                format!("📊 [Check#{n}] [{time}] Current status - GPU usage: {percent:.1}%")
            }
            Ok(None) => format!("❌ [Check#{n}] [{time}] GPU not found"),
            Err(e) => format!("💥 [Check#{n}] [{time}] Status check error: {e}"),
        }
    }
}

impl Drop for VramOptimizerNode {
    fn drop(&mut self) {
        // A timed-out provider call may still be running on the blocking pool.
        if let Some(rt) = self.rt.take() {
            rt.shutdown_background();
        }
    }
}
