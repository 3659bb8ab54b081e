//! Error types for telemetry, cleanup and the sampler runtime.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("NVML error: {0}")]
    Nvml(#[from] nvml_wrapper::error::NvmlError),
    #[error("provider call timed out after {0} ms")]
    Timeout(u64),
    #[error("provider task failed: {0}")]
    Task(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("CUDA unavailable")]
    Unavailable,
    #[error("{0}")]
    Runtime(String),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to build runtime: {0}")]
    Runtime(#[from] std::io::Error),
}
