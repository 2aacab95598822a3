use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Frames kept for the rolling average.
pub const FRAME_HISTORY: usize = 60;

/// Target frame time for 60 FPS.
pub const DEFAULT_FRAME_BUDGET: Duration = Duration::from_micros(16_667);

/// Timing of one completed frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameTime {
    /// CPU time spent inside the frame.
    pub elapsed: Duration,

    /// Monotonic frame counter, starting at 1 for the first recorded frame.
    pub frame_index: u64,

    pub over_budget: bool,
}

/// Measures CPU frame time against a budget.
///
/// `begin` and `end` bracket one frame. The timer keeps the last
/// [`FRAME_HISTORY`] durations for a rolling average and counts frames that
/// exceeded the budget.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    budget: Duration,
    started: Option<Instant>,
    history: VecDeque<Duration>,
    history_sum: Duration,
    last: Duration,
    frames: u64,
    overruns: u64,
}

impl FrameTimer {
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            started: None,
            history: VecDeque::with_capacity(FRAME_HISTORY),
            history_sum: Duration::ZERO,
            last: Duration::ZERO,
            frames: 0,
            overruns: 0,
        }
    }

    #[inline]
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Marks the start of a frame.
    pub fn begin(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Marks the end of the frame opened by `begin`.
    ///
    /// Returns `None` if no frame was open.
    pub fn end(&mut self) -> Option<FrameTime> {
        let started = self.started.take()?;
        Some(self.record(started.elapsed()))
    }

    /// Records an externally measured frame duration.
    pub fn record(&mut self, elapsed: Duration) -> FrameTime {
        if self.history.len() == FRAME_HISTORY {
            if let Some(oldest) = self.history.pop_front() {
                self.history_sum -= oldest;
            }
        }
        self.history.push_back(elapsed);
        self.history_sum += elapsed;

        self.last = elapsed;
        self.frames = self.frames.wrapping_add(1);

        let over_budget = elapsed > self.budget;
        if over_budget {
            self.overruns += 1;
        }

        FrameTime {
            elapsed,
            frame_index: self.frames,
            over_budget,
        }
    }

    #[inline]
    pub fn last(&self) -> Duration {
        self.last
    }

    /// Mean over the last [`FRAME_HISTORY`] frames.
    pub fn average(&self) -> Duration {
        match self.history.len() {
            0 => Duration::ZERO,
            n => self.history_sum / n as u32,
        }
    }

    #[inline]
    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_BUDGET)
    }
}
