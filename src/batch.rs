use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::detection::{BibDetector, DetectionOutcome};
use crate::error::DetectionError;

/// Detection result for one input file.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub path: PathBuf,
    pub outcome: DetectionOutcome,
}

/// Detect bib numbers in many files at once.
///
/// Each file is decoded and processed on tokio's blocking pool, at most
/// `jobs` at a time. Results come back in input order.
pub async fn detect_all(
    detector: Arc<BibDetector>,
    paths: Vec<PathBuf>,
    jobs: usize,
) -> Vec<BatchItem> {
    let permits = Arc::new(Semaphore::new(jobs.max(1)));
    let mut tasks = JoinSet::new();

    for (index, path) in paths.iter().cloned().enumerate() {
        let detector = detector.clone();
        let permits = permits.clone();
        tasks.spawn(async move {
            // The semaphore is never closed
            let _permit = permits.acquire_owned().await.ok();
            let outcome = tokio::task::spawn_blocking(move || {
                let outcome = detector.detect_path(&path);
                (path, outcome)
            })
            .await;
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<BatchItem>> = vec![None; paths.len()];
    while let Some(joined) = tasks.join_next().await {
        let Ok((index, result)) = joined else {
            continue;
        };
        let item = match result {
            Ok((path, outcome)) => BatchItem { path, outcome },
            Err(e) => BatchItem {
                path: paths[index].clone(),
                outcome: DetectionOutcome::NotDetected(DetectionError::Internal(e.to_string())),
            },
        };
        debug!(
            path = %item.path.display(),
            detected = item.outcome.is_detected(),
            "batch item done"
        );
        slots[index] = Some(item);
    }

    // A slot is only empty if its task itself was lost
    slots
        .into_iter()
        .zip(paths)
        .map(|(slot, path)| {
            slot.unwrap_or_else(|| BatchItem {
                path,
                outcome: DetectionOutcome::NotDetected(DetectionError::Internal(
                    "detection task was cancelled".to_string(),
                )),
            })
        })
        .collect()
}
