//! Registration layer: one explicitly owned instance of each node, the node
//! descriptors the host registers, and the queue hooks.

use std::sync::Arc;

use tracing::info;

use crate::cleaner::{default_releaser, CacheReleaser, VramCleaner};
use crate::error::MonitorError;
use crate::gpu::{default_provider, GpuInfoProvider};
use crate::nodes::{
    monitor, optimizer, GpuMonitorNode, MonitorInputs, MonitorOutputs, NodeDescriptor,
    NodeOutput, OptimizerInputs, OptimizerOutputs, VramOptimizerNode,
};

pub const NODES: &[NodeDescriptor] = &[optimizer::DESCRIPTOR, monitor::DESCRIPTOR];

pub struct Plugin {
    optimizer: VramOptimizerNode,
    monitor: GpuMonitorNode,
}

impl Plugin {
    /// Build with the real telemetry provider and release primitive (when present).
    pub fn new() -> Result<Self, MonitorError> {
        Self::with_parts(default_provider(), default_releaser())
    }

    pub fn with_parts(
        provider: Arc<dyn GpuInfoProvider>,
        releaser: Arc<dyn CacheReleaser>,
    ) -> Result<Self, MonitorError> {
        info!(
            provider = provider.name(),
            release_available = releaser.is_available(),
            "vramwatch plugin initialized"
        );
        Ok(Self {
            optimizer: VramOptimizerNode::new(provider.clone(), VramCleaner::new(releaser))?,
            monitor: GpuMonitorNode::new(provider)?,
        })
    }

    pub fn descriptors() -> &'static [NodeDescriptor] {
        NODES
    }

    pub fn optimizer(&mut self) -> &mut VramOptimizerNode {
        &mut self.optimizer
    }

    pub fn monitor(&mut self) -> &mut GpuMonitorNode {
        &mut self.monitor
    }

    pub fn run_optimizer(&mut self, inputs: OptimizerInputs) -> NodeOutput<OptimizerOutputs> {
        self.optimizer.evaluate(inputs)
    }

    pub fn run_monitor(&mut self, inputs: MonitorInputs) -> NodeOutput<MonitorOutputs> {
        self.monitor.evaluate(inputs)
    }

    /// Host hook around one queued prompt. Returns the status lines of any cleanups run.
    pub fn before_queue(&mut self, prompt_id: &str) -> Option<String> {
        self.optimizer.before_queue(prompt_id)
    }

    pub fn after_queue(&mut self, prompt_id: &str) -> Option<String> {
        self.optimizer.after_queue(prompt_id)
    }
}
