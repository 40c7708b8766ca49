//! Progress reporting.
//!
//! A run reports 0-50% while fingerprinting and 50-100% while substituting.

use tracing::info;

/// Optional progress bar color, linear RGB.
pub type Rgb = [f32; 3];

/// Receiver of progress notifications, typically a progress bar widget.
pub trait ProgressSink {
    /// `percent` is in 0..=100 and never decreases within one run.
    fn update_progress(&mut self, percent: u8, color: Option<Rgb>);

    fn stop_progress(&mut self);
}

/// Progress sink that writes every 10% step to the log.
#[derive(Debug, Default)]
pub struct LogProgress {
    last_step: Option<u8>,
}

impl ProgressSink for LogProgress {
    fn update_progress(&mut self, percent: u8, _color: Option<Rgb>) {
        let step = percent / 10;
        if self.last_step != Some(step) {
            self.last_step = Some(step);
            info!("{:3}%", percent);
        }
    }

    fn stop_progress(&mut self) {
        self.last_step = None;
    }
}

/// Guard around an optional sink enforcing range and monotonicity.
pub struct Progress<'a> {
    sink: Option<&'a mut dyn ProgressSink>,
    last: Option<u8>,
}

impl<'a> Progress<'a> {
    pub fn new(sink: Option<&'a mut dyn ProgressSink>) -> Self {
        Self { sink, last: None }
    }

    /// Progress that goes nowhere.
    pub fn none() -> Self {
        Self::new(None)
    }

    /// Last percentage forwarded to the sink.
    pub fn percent(&self) -> u8 {
        self.last.unwrap_or(0)
    }

    /// Report `percent`, clamped to 100. Values below the last one are dropped.
    pub fn update(&mut self, percent: u32) {
        let percent = percent.min(100) as u8;
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.update_progress(percent, None);
        }
    }

    /// Report `done` of `total` steps mapped onto `base..base + span` percent.
    pub fn step(&mut self, done: usize, total: usize, base: u32, span: u32) {
        let fraction = if total == 0 { span } else { (done.min(total) as u64 * span as u64 / total as u64) as u32 };
        self.update(base + fraction);
    }

    pub fn stop(&mut self) {
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.stop_progress();
        }
    }
}
