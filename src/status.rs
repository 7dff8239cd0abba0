//! Periodic system status display
//!
//! While no foreground command holds the screen, the status task samples
//! CPU, memory and temperature every few seconds and paints them.

use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::AppContext;
use crate::platform::metrics::{Sampler, StatsSample};
use crate::render::{RenderRequest, Trigger};
use crate::ui::text::{self, TextStyle, Typeface};
use crate::ui::{Canvas, Color, SCREEN_SIZE};

const LABEL_COLOR: Color = Color::new(160, 160, 160);
const TIER_LOW: Color = Color::new(183, 225, 205);
const TIER_MID: Color = Color::new(252, 232, 178);
const TIER_HIGH: Color = Color::new(244, 199, 195);

/// Status task states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusState {
    /// Waiting for the next tick
    Scheduled,
    /// Collecting metrics
    Sampling,
    /// Drawing and committing the stats canvas
    Rendering,
    /// Cancelled; no further ticks
    Stopped,
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusState::Scheduled => write!(f, "Scheduled"),
            StatusState::Sampling => write!(f, "Sampling"),
            StatusState::Rendering => write!(f, "Rendering"),
            StatusState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// What one wake-up of the task did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A foreground command holds the screen
    Skipped,
    Rendered,
    Failed,
}

pub struct StatusTask<S: Sampler> {
    ctx: AppContext,
    sampler: S,
    state: StatusState,
    initial_delay: Duration,
    interval: Duration,
}

impl<S: Sampler> StatusTask<S> {
    pub fn new(ctx: AppContext, sampler: S, initial_delay: Duration, interval: Duration) -> Self {
        Self {
            ctx,
            sampler,
            state: StatusState::Scheduled,
            initial_delay,
            interval,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> StatusState {
        self.state
    }

    /// Tick until the context is cancelled.
    ///
    /// The interval is measured from the end of each cycle.
    pub async fn run(mut self) {
        info!(
            "Status task armed: first cycle in {:?}, then every {:?}",
            self.initial_delay, self.interval
        );

        let shutdown = self.ctx.shutdown.clone();
        let mut delay = self.initial_delay;
        while wait(&shutdown, delay).await {
            self.cycle().await;
            delay = self.interval;
        }

        self.transition_to(StatusState::Stopped);
        info!("Status task stopped");
    }

    /// One wake-up: sample and paint unless a foreground command is active
    pub async fn cycle(&mut self) -> CycleOutcome {
        if self.ctx.activity.is_active() {
            debug!("Foreground active, skipping status cycle");
            return CycleOutcome::Skipped;
        }

        self.transition_to(StatusState::Sampling);
        let sample = self.sampler.sample().await;

        // The flag may have been raised while sampling
        if self.ctx.activity.is_active() {
            self.transition_to(StatusState::Scheduled);
            return CycleOutcome::Skipped;
        }

        self.transition_to(StatusState::Rendering);
        let outcome = match self
            .ctx
            .renderer
            .render(RenderRequest::StatsOverlay(sample), Trigger::Background, &self.ctx.shutdown)
            .await
        {
            Ok(()) => CycleOutcome::Rendered,
            Err(e) => {
                warn!("Status render failed: {e}");
                CycleOutcome::Failed
            }
        };

        self.transition_to(StatusState::Scheduled);
        outcome
    }

    fn transition_to(&mut self, new_state: StatusState) {
        debug!("State transition: {} -> {}", self.state, new_state);
        self.state = new_state;
    }
}

/// Sleep for `delay`; false if cancelled first
async fn wait(shutdown: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Colour for a load percentage: calm up to 40, amber up to 70, red above
pub fn tier_color(percent: f64) -> Color {
    if percent > 70.0 {
        TIER_HIGH
    } else if percent > 40.0 {
        TIER_MID
    } else {
        TIER_LOW
    }
}

fn format_percent(percent: f64) -> String {
    format!("{}%", percent.round())
}

/// Lay out the stats screen.
///
/// The temperature is drawn over the MEM label area, and the memory value
/// takes its colour from the CPU percentage. Both match the deployed
/// layout; the second is probably an upstream slip but is kept until the
/// intent is confirmed.
pub fn stats_canvas(face: &dyn Typeface, sample: &StatsSample) -> Canvas {
    let width = SCREEN_SIZE as f32;
    let mut canvas = Canvas::filled(Color::BACKGROUND);
    let label = TextStyle::new(22.0, LABEL_COLOR, false);

    text::draw_wrapped(&mut canvas, face, "CPU", 70.0, 28.0, width, &label);
    let cpu_style = TextStyle::new(30.0, tier_color(sample.cpu_percent), true);
    let cpu_text = format_percent(sample.cpu_percent);
    text::draw_wrapped(&mut canvas, face, &cpu_text, 70.0, 66.0, width, &cpu_style);

    text::draw_wrapped(&mut canvas, face, "MEM", 170.0, 28.0, width, &label);
    let mem_style = TextStyle::new(30.0, tier_color(sample.cpu_percent), true);

    let temp_style = TextStyle::new(33.0, LABEL_COLOR, false);
    text::draw_wrapped(&mut canvas, face, &sample.temperature, 180.0, 28.0, width, &temp_style);

    let mem_text = format_percent(sample.mem_percent);
    text::draw_wrapped(&mut canvas, face, &mem_text, 170.0, 66.0, width, &mem_style);

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::metrics::testing::FixedSampler;
    use crate::ui::testing::RecordingSink;
    use crate::ui::text::testing::BlockFace;
    use std::sync::Arc;

    fn sample(cpu: f64, mem: f64) -> StatsSample {
        StatsSample { cpu_percent: cpu, mem_percent: mem, temperature: "48.3'C\n".to_string() }
    }

    fn task(sink: Arc<RecordingSink>) -> (AppContext, StatusTask<FixedSampler>) {
        let ctx = AppContext::new(sink, Arc::new(BlockFace));
        let task = StatusTask::new(
            ctx.clone(),
            FixedSampler::new(sample(12.0, 34.0)),
            Duration::from_millis(10),
            Duration::from_millis(10),
        );
        (ctx, task)
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(tier_color(0.0), TIER_LOW);
        assert_eq!(tier_color(40.0), TIER_LOW);
        assert_eq!(tier_color(41.0), TIER_MID);
        assert_eq!(tier_color(70.0), TIER_MID);
        assert_eq!(tier_color(71.0), TIER_HIGH);
        assert_eq!(tier_color(100.0), TIER_HIGH);
    }

    #[test]
    fn percentages_are_rounded() {
        assert_eq!(format_percent(42.4), "42%");
        assert_eq!(format_percent(42.5), "43%");
        assert_eq!(format_percent(0.0), "0%");
    }

    #[test]
    fn stats_layout_colors() {
        let canvas = stats_canvas(&BlockFace, &sample(85.0, 20.0));
        assert_eq!(canvas.pixel(0, 239), Some(Color::BACKGROUND));
        // CPU value centred at (70, 66)
        assert_eq!(canvas.pixel(70, 66), Some(TIER_HIGH));
        // Memory value is tiered by CPU load, not by its own value
        assert_eq!(canvas.pixel(170, 66), Some(TIER_HIGH));
    }

    #[test]
    fn low_cpu_keeps_memory_calm() {
        let canvas = stats_canvas(&BlockFace, &sample(10.0, 95.0));
        assert_eq!(canvas.pixel(170, 66), Some(TIER_LOW));
    }

    #[tokio::test]
    async fn foreground_suppresses_status() {
        let sink = RecordingSink::new();
        let (ctx, mut task) = task(sink.clone());

        ctx.foreground(RenderRequest::SolidColor(Color::new(1, 1, 1))).await.unwrap();
        assert_eq!(task.cycle().await, CycleOutcome::Skipped);
        assert_eq!(sink.count(), 1);
        assert_eq!(task.sampler.calls(), 0);
        assert_eq!(task.state(), StatusState::Scheduled);
    }

    #[tokio::test]
    async fn resume_restores_status() {
        let sink = RecordingSink::new();
        let (ctx, mut task) = task(sink.clone());

        ctx.foreground(RenderRequest::SolidColor(Color::new(1, 1, 1))).await.unwrap();
        ctx.resume_status();

        assert_eq!(task.cycle().await, CycleOutcome::Rendered);
        assert_eq!(task.sampler.calls(), 1);
        assert_eq!(sink.count(), 2);
        assert_eq!(sink.last().unwrap().pixel(0, 239), Some(Color::BACKGROUND));
        assert!(!ctx.activity.is_active());
        assert_eq!(task.state(), StatusState::Scheduled);
    }

    #[tokio::test]
    async fn device_failure_keeps_task_alive() {
        let ctx = AppContext::new(RecordingSink::broken(), Arc::new(BlockFace));
        let mut task = StatusTask::new(
            ctx,
            FixedSampler::new(sample(1.0, 1.0)),
            Duration::ZERO,
            Duration::ZERO,
        );
        assert_eq!(task.cycle().await, CycleOutcome::Failed);
        assert_eq!(task.state(), StatusState::Scheduled);
    }

    #[tokio::test]
    async fn run_ticks_until_cancelled() {
        let sink = RecordingSink::new();
        let (ctx, task) = task(sink.clone());

        let handle = tokio::spawn(task.run());
        tokio::time::sleep(Duration::from_millis(200)).await;
        ctx.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("status task did not stop")
            .unwrap();

        assert!(sink.count() >= 2, "expected repeated cycles, got {}", sink.count());
    }

    /// Sampler that takes a fixed time to answer
    struct SlowSampler(Duration);

    impl Sampler for SlowSampler {
        async fn sample(&mut self) -> StatsSample {
            tokio::time::sleep(self.0).await;
            sample(50.0, 50.0)
        }
    }

    fn assert_near(actual: Duration, expected: Duration) {
        let slack = Duration::from_millis(5);
        assert!(
            actual >= expected && actual <= expected + slack,
            "expected {expected:?}, got {actual:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn interval_runs_from_end_of_cycle() {
        let sink = RecordingSink::new();
        let ctx = AppContext::new(sink.clone(), Arc::new(BlockFace));
        let task = StatusTask::new(
            ctx.clone(),
            SlowSampler(Duration::from_secs(1)),
            Duration::from_secs(6),
            Duration::from_secs(3),
        );

        let start = tokio::time::Instant::now();
        let handle = tokio::spawn(task.run());
        tokio::time::sleep(Duration::from_secs(12)).await;
        ctx.shutdown.cancel();
        handle.await.unwrap();

        // Cycles finish at 6+1 s and then 3 s wait + 1 s sampling later
        let timed = sink.timed();
        assert_eq!(timed.len(), 2);
        assert_near(timed[0].0.duration_since(start), Duration::from_secs(7));
        assert_near(timed[1].0.duration_since(timed[0].0), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn cancelled_before_first_tick_never_renders() {
        let sink = RecordingSink::new();
        let ctx = AppContext::new(sink.clone(), Arc::new(BlockFace));
        let task = StatusTask::new(
            ctx.clone(),
            FixedSampler::new(sample(1.0, 1.0)),
            Duration::from_secs(60),
            Duration::from_secs(3),
        );
        ctx.shutdown.cancel();
        task.run().await;
        assert_eq!(sink.count(), 0);
    }
}
