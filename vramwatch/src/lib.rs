//! GPU memory telemetry and VRAM cache cleanup for node-based image-generation hosts.
//!
//! [`plugin::Plugin`] is the entry point a host binding owns: it holds one
//! [`nodes::VramOptimizerNode`] and one [`nodes::GpuMonitorNode`]. The monitor
//! node drives a background [`sampler::Monitor`] that records snapshots into a
//! bounded [`history::HistoryBuffer`].

pub mod cleaner;
pub mod config;
pub mod display;
pub mod error;
pub mod gpu;
pub mod history;
pub mod nodes;
pub mod plugin;
pub mod sampler;
pub mod state;
pub mod types;

pub use cleaner::{AutoClean, CacheReleaser, CleanupResult, ClearMode, VramCleaner};
pub use error::{CleanupError, GpuError, MonitorError};
pub use gpu::{EmptyProvider, GpuInfoProvider, NvmlProvider};
pub use plugin::Plugin;
pub use sampler::{Monitor, SamplerSettings, TickOutcome};
pub use types::{DeviceInfo, Snapshot, Summary, ThresholdWarning, Trend};
