pub mod orientations;
pub mod simulate;
pub mod spa;
pub mod spt;

use crate::config::DataPaths;
use crate::data::StackManifest;
use crate::error::Result;
use crate::utils::progress::ScoreTally;
use cryoalign::core::imaging::{GaussianModel, ImageSource, Reference};
use cryoalign::core::models::particle::ReferencePair;
use cryoalign::engine::dispatch::ThreadPoolQueue;
use cryoalign::engine::error::EngineError;
use std::sync::Arc;
use tracing::info;

/// Loads the reference pair: one shared model, or independent even and odd halves.
fn load_references(paths: &DataPaths) -> Result<ReferencePair<dyn Reference>> {
    info!("Loading reference model from {:?}", &paths.reference);
    let even: Arc<dyn Reference> = Arc::new(GaussianModel::load(&paths.reference)?);
    match &paths.reference_odd {
        Some(odd_path) => {
            info!("Loading odd half-set reference from {:?}", odd_path);
            let odd: Arc<dyn Reference> = Arc::new(GaussianModel::load(odd_path)?);
            Ok(ReferencePair::gold_standard(even, odd))
        }
        None => Ok(ReferencePair::shared(even)),
    }
}

fn open_stack(paths: &DataPaths) -> Result<Arc<dyn ImageSource>> {
    let manifest = StackManifest::load(&paths.stack)?;
    Ok(Arc::new(manifest.open(&paths.stack)?))
}

/// `threads == None` lets the pool size itself to the available cores.
fn worker_pool(threads: Option<usize>) -> Result<ThreadPoolQueue> {
    let queue = ThreadPoolQueue::new(threads.unwrap_or(0)).map_err(EngineError::from)?;
    Ok(queue)
}

fn print_score_summary(tally: &ScoreTally) {
    if let (Some((id, best)), Some(mean)) = (tally.best, tally.mean()) {
        println!("  Scores: mean {:.4}, best {:.4} (particle #{})", mean, best, id);
    }
}
