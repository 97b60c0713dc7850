use moat_core::PreconditionError;

/// Frame rate over the last full second of unpaused time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub fps: f32,
    pub ms_per_frame: f32,
}

/// Simulated clock fed by the host's frame deltas. Time spent stopped does
/// not count toward `total_time`.
#[derive(Debug, Clone, Default)]
pub struct GameTimer {
    total: f64,
    delta: f32,
    stopped: bool,
    ticks: u64,
    window_frames: u32,
    window_start: f64,
    stats: Option<FrameStats>,
}

impl GameTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by `dt` seconds. Returns the delta the frame should use.
    pub fn tick(&mut self, dt: f32) -> Result<f32, PreconditionError> {
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(PreconditionError::InvalidTimeStep(dt));
        }
        self.ticks += 1;
        if self.stopped {
            self.delta = 0.0;
            return Ok(0.0);
        }
        self.delta = dt;
        self.total += f64::from(dt);

        self.window_frames += 1;
        let elapsed = self.total - self.window_start;
        if elapsed >= 1.0 {
            let fps = (f64::from(self.window_frames) / elapsed) as f32;
            self.stats = Some(FrameStats {
                fps,
                ms_per_frame: 1000.0 / fps,
            });
            log::debug!("fps {fps:.1}");
            self.window_frames = 0;
            self.window_start = self.total;
        }
        Ok(dt)
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn start(&mut self) {
        self.stopped = false;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn total_time(&self) -> f32 {
        self.total as f32
    }

    pub fn delta_time(&self) -> f32 {
        self.delta
    }

    /// Calls to [`GameTimer::tick`], stopped or not.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn frame_stats(&self) -> Option<FrameStats> {
        self.stats
    }
}
