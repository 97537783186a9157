//! GPU frame timing with a two-query timestamp pool

use std::sync::Arc;

use ash::vk;

use crate::render::backends::GpuDevice;
use crate::render::error::VulkanResult;

const QUERY_COUNT: u32 = 2;

/// Measures the time between the start and end of the frame's command buffer
pub struct GpuTimer {
    device: Arc<dyn GpuDevice>,
    query_pool: vk::QueryPool,
    timestamp_period: f32,
}

impl GpuTimer {
    /// Create the query pool
    pub fn new(device: Arc<dyn GpuDevice>) -> VulkanResult<Self> {
        let query_pool = device.create_timestamp_query_pool(QUERY_COUNT)?;
        let timestamp_period = device.capabilities().timestamp_period;
        Ok(Self {
            device,
            query_pool,
            timestamp_period,
        })
    }

    /// Reset the pool and write the start timestamp
    pub fn start(&self, command_buffer: vk::CommandBuffer) {
        self.device
            .cmd_reset_query_pool(command_buffer, self.query_pool, 0, QUERY_COUNT);
        self.device.cmd_write_timestamp(
            command_buffer,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            self.query_pool,
            0,
        );
    }

    /// Write the end timestamp
    pub fn stop(&self, command_buffer: vk::CommandBuffer) {
        self.device.cmd_write_timestamp(
            command_buffer,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            self.query_pool,
            1,
        );
    }

    /// Milliseconds between the two timestamps of the last submitted frame
    pub fn elapsed_ms(&self) -> VulkanResult<f32> {
        let results = self.device.query_results(self.query_pool, 0, QUERY_COUNT)?;
        Ok(match results.as_slice() {
            [start, end] => ticks_to_ms(end.saturating_sub(*start), self.timestamp_period),
            _ => 0.0,
        })
    }
}

impl Drop for GpuTimer {
    fn drop(&mut self) {
        self.device.destroy_query_pool(self.query_pool);
    }
}

fn ticks_to_ms(ticks: u64, timestamp_period: f32) -> f32 {
    (ticks as f64 * f64::from(timestamp_period) / 1e6) as f32
}
