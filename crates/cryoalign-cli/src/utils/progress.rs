use cryoalign::engine::progress::{Progress, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;

/// Running score statistics over the particles reported so far.
///
/// Scores are negated FSC averages, so lower is better. Non-finite scores are
/// counted but left out of the best and mean.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreTally {
    pub aligned: usize,
    pub best: Option<(usize, f64)>,
    scored: usize,
    sum: f64,
}

impl ScoreTally {
    fn record(&mut self, id: usize, score: f64) {
        self.aligned += 1;
        if !score.is_finite() {
            return;
        }
        self.scored += 1;
        self.sum += score;
        match self.best {
            Some((_, best)) if best <= score => {}
            _ => self.best = Some((id, score)),
        }
    }

    pub fn mean(&self) -> Option<f64> {
        (self.scored > 0).then(|| self.sum / self.scored as f64)
    }

    fn label(&self) -> String {
        match (self.best, self.mean()) {
            (Some((id, best)), Some(mean)) => {
                format!("best #{} {:.3} | mean {:.3}", id, best, mean)
            }
            _ => format!("{} unscored", self.aligned),
        }
    }
}

struct Display {
    bar: ProgressBar,
    phase: &'static str,
    tally: ScoreTally,
}

impl Display {
    fn apply(&mut self, event: Progress) {
        match event {
            Progress::PhaseStart { name } => {
                self.phase = name;
                self.bar.reset();
                self.bar.set_length(0);
                self.bar.set_style(spinner_style());
                self.bar
                    .enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                self.bar.set_message(name);
            }
            Progress::PhaseFinish => {
                self.bar.disable_steady_tick();
                self.bar.finish_with_message(format!("✓ {}", self.phase));
            }
            Progress::TaskStart { total_steps } => {
                self.tally = ScoreTally::default();
                self.bar.disable_steady_tick();
                self.bar.reset();
                self.bar.set_length(total_steps);
                self.bar.set_style(particle_style());
                self.bar.set_message("");
            }
            Progress::TaskIncrement => self.bar.inc(1),
            Progress::ParticleAligned { id, score } => {
                self.tally.record(id, score);
                self.bar.set_message(self.tally.label());
            }
            Progress::TaskFinish => {
                if let Some(total) = self.bar.length() {
                    self.bar.set_position(total);
                }
                self.bar.finish();
            }
            Progress::Message(msg) => self.bar.println(format!("  {}", msg)),
        }
    }
}

/// Drives one stderr progress bar from the events of an alignment workflow and
/// keeps the per-particle score statistics for the final summary.
#[derive(Clone)]
pub struct AlignmentProgress {
    display: Arc<Mutex<Display>>,
}

impl AlignmentProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr())
            .with_style(spinner_style());
        Self {
            display: Arc::new(Mutex::new(Display {
                bar,
                phase: "",
                tally: ScoreTally::default(),
            })),
        }
    }

    pub fn callback(&self) -> ProgressCallback<'static> {
        let display = Arc::clone(&self.display);
        Box::new(move |event: Progress| match display.lock() {
            Ok(mut display) => display.apply(event),
            Err(_) => warn!("Progress display mutex was poisoned; dropping event."),
        })
    }

    /// Statistics of the most recent alignment task.
    pub fn tally(&self) -> ScoreTally {
        self.display
            .lock()
            .map(|display| display.tally)
            .unwrap_or_default()
    }
}

impl Default for AlignmentProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn particle_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "[{bar:40.cyan/blue}] {pos}/{len} particles ({elapsed}, eta {eta}) {msg}",
    )
    .map(|style| style.progress_chars("##-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}
