/// Events emitted while a workflow or a dispatched task makes progress.
#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    /// A unit of work with `total_steps` steps has started (particles in a batch,
    /// batches in a run).
    TaskStart { total_steps: u64 },
    TaskIncrement,
    TaskFinish,

    /// One particle has been aligned.
    ParticleAligned { id: usize, score: f64 },

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}

/// Converts `TaskStart`/`TaskIncrement` events into a completion percentage.
#[derive(Debug, Default)]
pub(crate) struct PercentTracker {
    total: std::sync::atomic::AtomicU64,
    done: std::sync::atomic::AtomicU64,
}

impl PercentTracker {
    /// Applies `event` and returns the new percentage when it changed.
    pub(crate) fn observe(&self, event: &Progress) -> Option<u8> {
        use std::sync::atomic::Ordering;
        match event {
            Progress::TaskStart { total_steps } => {
                self.total.store(*total_steps, Ordering::SeqCst);
                self.done.store(0, Ordering::SeqCst);
                Some(0)
            }
            Progress::TaskIncrement => {
                let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
                let total = self.total.load(Ordering::SeqCst).max(1);
                Some(((done.min(total) * 100) / total) as u8)
            }
            Progress::TaskFinish => Some(100),
            _ => None,
        }
    }
}
