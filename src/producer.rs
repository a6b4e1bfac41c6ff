//! Background producers that keep the prefetch queue filled.
//!
//! Each producer picks a random file, prepares it on the blocking pool and
//! pushes the result. Load failures are logged and retried with another pick.

use crate::assets::MediaPath;
use crate::loader::{MediaItem, MediaLoader};
use crate::queue::PrefetchQueue;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Pause after a run of failures as long as the file list.
const FAILURE_BACKOFF: Duration = Duration::from_millis(500);

pub struct ProducerPool {
    handles: Vec<JoinHandle<()>>,
}

impl ProducerPool {
    /// Start `workers` producers on `runtime`.
    pub fn spawn(
        runtime: &Handle,
        workers: usize,
        files: Arc<[MediaPath]>,
        loader: Arc<MediaLoader>,
        queue: Arc<PrefetchQueue<MediaItem>>,
    ) -> Self {
        tracing::info!(
            "Starting {} prefetch workers over {} files",
            workers,
            files.len()
        );
        let handles = (0..workers.max(1))
            .map(|id| {
                runtime.spawn(run_producer(
                    id,
                    files.clone(),
                    loader.clone(),
                    queue.clone(),
                ))
            })
            .collect();
        Self { handles }
    }

    /// Stop every producer. Loads already running on the blocking pool finish
    /// on their own and their results are dropped.
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

async fn run_producer(
    id: usize,
    files: Arc<[MediaPath]>,
    loader: Arc<MediaLoader>,
    queue: Arc<PrefetchQueue<MediaItem>>,
) {
    let mut failures = 0usize;

    while !queue.is_closed() {
        let pick = {
            let mut rng = rand::thread_rng();
            files.choose(&mut rng).cloned()
        };
        let Some(media) = pick else {
            tracing::error!("Producer {} has no files to load", id);
            return;
        };

        let job = {
            let loader = loader.clone();
            let path = media.path().to_path_buf();
            tokio::task::spawn_blocking(move || loader.load(&path))
        };

        match job.await {
            Ok(Ok(item)) => {
                failures = 0;
                if queue.push(item).await.is_err() {
                    break;
                }
                tracing::debug!(
                    "Producer {} queued {} ({}/{} ready)",
                    id,
                    media,
                    queue.ready_count(),
                    queue.capacity()
                );
            }
            Ok(Err(e)) => {
                failures += 1;
                tracing::warn!("Preload error: {}", e);
            }
            Err(e) => {
                failures += 1;
                tracing::error!("Preload of {} panicked: {}", media, e);
            }
        }

        if failures >= files.len().max(1) {
            tracing::warn!(
                "Producer {}: {} consecutive load failures, backing off",
                id,
                failures
            );
            failures = 0;
            tokio::time::sleep(FAILURE_BACKOFF).await;
        }
    }

    tracing::debug!("Producer {} stopped", id);
}
