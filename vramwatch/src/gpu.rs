// gpu.rs
use std::sync::Arc;

use nvml_wrapper::Nvml;
use tracing::{debug, info};

use crate::config::gpu_enabled;
use crate::error::GpuError;
use crate::types::DeviceInfo;

const MB: f64 = 1024.0 * 1024.0;

/// Source of raw GPU memory stats. Returns the first device, or `None` when
/// there is nothing to report.
pub trait GpuInfoProvider: Send + Sync {
    fn query(&self) -> Result<Option<DeviceInfo>, GpuError>;

    fn name(&self) -> &'static str;
}

/// Used when no telemetry library is available: never reports a device.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyProvider;

impl GpuInfoProvider for EmptyProvider {
    fn query(&self) -> Result<Option<DeviceInfo>, GpuError> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "empty"
    }
}

pub struct NvmlProvider {
    nvml: Nvml,
}

impl NvmlProvider {
    pub fn init() -> Result<Self, GpuError> {
        let nvml = Nvml::init()?;
        Ok(Self { nvml })
    }
}

impl GpuInfoProvider for NvmlProvider {
    fn query(&self) -> Result<Option<DeviceInfo>, GpuError> {
        if self.nvml.device_count()? == 0 {
            return Ok(None);
        }
        let device = self.nvml.device_by_index(0)?;
        let name = device.name()?;
        let mem = device.memory_info()?;

        let total_mb = mem.total as f64 / MB;
        let used_mb = mem.used as f64 / MB;
        let memory_util = if mem.total > 0 {
            mem.used as f64 / mem.total as f64
        } else {
            0.0
        };

        Ok(Some(DeviceInfo {
            name,
            memory_total_mb: total_mb,
            memory_used_mb: used_mb,
            memory_util,
        }))
    }

    fn name(&self) -> &'static str {
        "nvml"
    }
}

/// NVML when it loads (and `VRAMWATCH_GPU` is not `0`), otherwise the empty provider.
pub fn default_provider() -> Arc<dyn GpuInfoProvider> {
    if !gpu_enabled() {
        debug!("GPU telemetry disabled via VRAMWATCH_GPU=0");
        return Arc::new(EmptyProvider);
    }
    match NvmlProvider::init() {
        Ok(p) => {
            info!("NVML telemetry provider initialized");
            Arc::new(p)
        }
        Err(e) => {
            info!(error = %e, "NVML not available; GPU telemetry will report no device");
            Arc::new(EmptyProvider)
        }
    }
}
