//! Host-facing nodes. Each evaluation returns a plain tuple of outputs plus a
//! UI payload; errors are always folded into the status text.

pub mod monitor;
pub mod optimizer;

use serde::Serialize;

pub use monitor::{GpuMonitorNode, MonitorInputs, MonitorOutputs};
pub use optimizer::{
    OptimizerInputs, OptimizerOutputs, OptimizerSettings, RunTiming, VramOptimizerNode,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiPayload {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeOutput<T> {
    pub ui: UiPayload,
    pub result: T,
}

impl<T> NodeOutput<T> {
    pub fn new(text: impl Into<String>, result: T) -> Self {
        Self {
            ui: UiPayload { text: text.into() },
            result,
        }
    }
}

/// Static description of a node for the host's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeDescriptor {
    pub class_name: &'static str,
    pub display_name: &'static str,
    pub category: &'static str,
    pub function: &'static str,
    pub output_names: &'static [&'static str],
    pub output_node: bool,
    // the host must re-run the node on every evaluation
    pub always_changed: bool,
}

pub const CATEGORY: &str = "vramwatch - system";
