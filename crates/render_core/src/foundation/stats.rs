//! Per-frame statistics written by the renderer

use std::time::Instant;

/// Frame timing and draw statistics
#[derive(Debug, Clone)]
pub struct StatsTracker {
    gpu_time_ms: f32,
    cpu_time_ms: f32,
    frame_count: u64,
    draw_calls: u32,
    frame_start: Option<Instant>,
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self {
            gpu_time_ms: 0.0,
            cpu_time_ms: 0.0,
            frame_count: 0,
            draw_calls: 0,
            frame_start: None,
        }
    }

    /// Mark the start of CPU work for a frame
    pub fn begin_cpu_frame(&mut self) {
        self.frame_start = Some(Instant::now());
    }

    /// Mark the end of CPU work for a frame
    pub fn end_cpu_frame(&mut self) {
        if let Some(start) = self.frame_start.take() {
            self.cpu_time_ms = start.elapsed().as_secs_f32() * 1000.0;
            self.frame_count += 1;
        }
    }

    /// Record the GPU time of the last submitted frame
    pub fn set_gpu_time(&mut self, milliseconds: f32) {
        self.gpu_time_ms = milliseconds;
    }

    /// Record the number of draw calls issued in the last frame
    pub fn set_draw_calls(&mut self, draw_calls: u32) {
        self.draw_calls = draw_calls;
    }

    /// GPU time of the last frame in milliseconds
    pub fn gpu_time_ms(&self) -> f32 {
        self.gpu_time_ms
    }

    /// CPU time of the last frame in milliseconds
    pub fn cpu_time_ms(&self) -> f32 {
        self.cpu_time_ms
    }

    /// Frames completed since creation
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Draw calls issued in the last frame
    pub fn draw_calls(&self) -> u32 {
        self.draw_calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_frame_counts_only_completed_frames() {
        let mut stats = StatsTracker::new();
        stats.end_cpu_frame();
        assert_eq!(stats.frame_count(), 0);

        stats.begin_cpu_frame();
        stats.end_cpu_frame();
        assert_eq!(stats.frame_count(), 1);
        assert!(stats.cpu_time_ms() >= 0.0);
    }

    #[test]
    fn test_gpu_time_is_overwritten_each_frame() {
        let mut stats = StatsTracker::new();
        stats.set_gpu_time(2.5);
        stats.set_gpu_time(1.25);
        assert_eq!(stats.gpu_time_ms(), 1.25);
    }
}
