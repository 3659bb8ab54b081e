//! VRAM cleanup: the cache-release primitive behind a small trait, and the
//! Standard/Aggressive cleanup procedure built on it.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use tracing::{info, warn};

use crate::config::HIGH_USAGE_PERCENT;
use crate::error::CleanupError;

const MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClearMode {
    #[default]
    Standard,
    Aggressive,
}

impl fmt::Display for ClearMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClearMode::Standard => f.write_str("Standard"),
            ClearMode::Aggressive => f.write_str("Aggressive"),
        }
    }
}

impl std::str::FromStr for ClearMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(ClearMode::Standard),
            "aggressive" => Ok(ClearMode::Aggressive),
            other => Err(format!("unknown clear mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AutoClean {
    #[default]
    #[serde(rename = "Every Time")]
    EveryTime,
    #[serde(rename = "Only When High")]
    OnlyWhenHigh,
}

impl fmt::Display for AutoClean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoClean::EveryTime => f.write_str("Every Time"),
            AutoClean::OnlyWhenHigh => f.write_str("Only When High"),
        }
    }
}

/// Whether a cleanup should go ahead given the current usage (`None` = no device).
pub fn should_clean(auto_clean: AutoClean, percent_used: Option<f64>) -> bool {
    match auto_clean {
        AutoClean::EveryTime => true,
        AutoClean::OnlyWhenHigh => percent_used.is_some_and(|p| p >= HIGH_USAGE_PERCENT),
    }
}

/// The runtime's cache-release primitive and its companions.
pub trait CacheReleaser: Send + Sync {
    fn is_available(&self) -> bool;

    /// Device memory currently in use, in MB.
    fn allocated_mb(&self) -> Result<f64, CleanupError>;

    /// Release cached, unused device memory back to the driver.
    fn release_cached(&self) -> Result<(), CleanupError>;

    /// Generic reclaim pass run in aggressive mode.
    fn reclaim(&self) -> Result<(), CleanupError> {
        Ok(())
    }

    fn synchronize(&self) -> Result<(), CleanupError>;
}

/// No compute runtime present: every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableReleaser;

impl CacheReleaser for UnavailableReleaser {
    fn is_available(&self) -> bool {
        false
    }

    fn allocated_mb(&self) -> Result<f64, CleanupError> {
        Err(CleanupError::Unavailable)
    }

    fn release_cached(&self) -> Result<(), CleanupError> {
        Err(CleanupError::Unavailable)
    }

    fn synchronize(&self) -> Result<(), CleanupError> {
        Err(CleanupError::Unavailable)
    }
}

#[cfg(feature = "cuda")]
mod cuda {
    use std::sync::Arc;

    use cudarc::driver::{result, sys, CudaContext, DriverError};

    use super::{CacheReleaser, CleanupError, MB};

    impl From<DriverError> for CleanupError {
        fn from(err: DriverError) -> Self {
            CleanupError::Runtime(err.to_string())
        }
    }

    /// Release primitive backed by the CUDA driver API (device 0).
    pub struct CudaReleaser {
        ctx: Arc<CudaContext>,
    }

    impl CudaReleaser {
        pub fn new() -> Result<Self, CleanupError> {
            let ctx = CudaContext::new(0)?;
            Ok(Self { ctx })
        }

        fn trim_default_pool(&self) -> Result<(), CleanupError> {
            self.ctx.bind_to_thread()?;
            let mut pool: sys::CUmemoryPool = std::ptr::null_mut();
            // SAFETY: the context is bound to this thread and `pool` is a valid out-pointer.
            unsafe {
                sys::cuDeviceGetDefaultMemPool(&mut pool, self.ctx.cu_device()).result()?;
                sys::cuMemPoolTrimTo(pool, 0).result()?;
            }
            Ok(())
        }
    }

    impl CacheReleaser for CudaReleaser {
        fn is_available(&self) -> bool {
            true
        }

        fn allocated_mb(&self) -> Result<f64, CleanupError> {
            self.ctx.bind_to_thread()?;
            let (free, total) = result::mem_get_info()?;
            Ok(total.saturating_sub(free) as f64 / MB)
        }

        fn release_cached(&self) -> Result<(), CleanupError> {
            self.trim_default_pool()
        }

        fn reclaim(&self) -> Result<(), CleanupError> {
            // Pending frees only return to the pool once the stream work completes.
            self.ctx.synchronize()?;
            self.trim_default_pool()
        }

        fn synchronize(&self) -> Result<(), CleanupError> {
            self.ctx.synchronize()?;
            Ok(())
        }
    }
}

#[cfg(feature = "cuda")]
pub use cuda::CudaReleaser;

/// CUDA when built with the `cuda` feature and a device is present, otherwise unavailable.
pub fn default_releaser() -> Arc<dyn CacheReleaser> {
    #[cfg(feature = "cuda")]
    {
        match CudaReleaser::new() {
            Ok(r) => return Arc::new(r),
            Err(e) => info!(error = %e, "CUDA release primitive not available"),
        }
    }
    Arc::new(UnavailableReleaser)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupResult {
    pub success: bool,
    pub before_mb: f64,
    pub after_mb: f64,
    pub cleared_mb: f64,
    pub mode: ClearMode,
    // host RAM in use after an aggressive pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_used_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CleanupResult {
    fn failed(mode: ClearMode, err: impl ToString) -> Self {
        Self {
            success: false,
            before_mb: 0.0,
            after_mb: 0.0,
            cleared_mb: 0.0,
            mode,
            host_used_mb: None,
            error: Some(err.to_string()),
        }
    }
}

pub struct VramCleaner {
    releaser: Arc<dyn CacheReleaser>,
    host: Mutex<System>,
}

impl VramCleaner {
    pub fn new(releaser: Arc<dyn CacheReleaser>) -> Self {
        let host = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::new().with_ram()),
        );
        Self {
            releaser,
            host: Mutex::new(host),
        }
    }

    pub fn is_available(&self) -> bool {
        self.releaser.is_available()
    }

    fn host_used_mb(&self) -> f64 {
        let mut sys = self.host.lock().unwrap_or_else(|e| e.into_inner());
        sys.refresh_memory_specifics(MemoryRefreshKind::new().with_ram());
        sys.used_memory() as f64 / MB
    }

    /// Run one cleanup pass. Never fails: errors land in the result.
    pub fn perform_cleanup(&self, mode: ClearMode) -> CleanupResult {
        if !self.releaser.is_available() {
            return CleanupResult::failed(mode, CleanupError::Unavailable);
        }
        info!(%mode, "⚡ VRAM cleanup in progress");
        match self.run(mode) {
            Ok(res) => {
                if res.cleared_mb > 0.0 {
                    info!(
                        before_mb = res.before_mb,
                        after_mb = res.after_mb,
                        freed_mb = res.cleared_mb,
                        "🎉 VRAM cleanup successful"
                    );
                } else {
                    info!(current_mb = res.after_mb, "✨ VRAM already optimized");
                }
                res
            }
            Err(e) => {
                warn!(error = %e, "❌ VRAM cleanup failed");
                CleanupResult::failed(mode, e)
            }
        }
    }

    fn run(&self, mode: ClearMode) -> Result<CleanupResult, CleanupError> {
        let before = self.releaser.allocated_mb()?;
        self.releaser.release_cached()?;

        let mut host_used_mb = None;
        if mode == ClearMode::Aggressive {
            self.releaser.reclaim()?;
            self.releaser.synchronize()?;
            host_used_mb = Some(self.host_used_mb());
        }

        let after = self.releaser.allocated_mb()?;
        Ok(CleanupResult {
            success: true,
            before_mb: before,
            after_mb: after,
            cleared_mb: before - after,
            mode,
            host_used_mb,
            error: None,
        })
    }
}

/// Status line shown on the optimizer node after a cleanup.
pub fn cleanup_message(result: &CleanupResult, time: &str, execution: u64) -> String {
    let exec = format!("[Execution#{execution}] ");
    if !result.success {
        let err = result.error.as_deref().unwrap_or("unknown error");
        return format!("❌ {exec}[{time}] {err}");
    }
    if result.cleared_mb > 0.0 {
        format!(
            "🎉 {exec}[{time}] VRAM cleanup completed! Freed: {:.1}MB",
            result.cleared_mb
        )
    } else {
        format!("✨ {exec}[{time}] Already optimized ({:.1}MB)", result.after_mb)
    }
}
