mod assets;
mod compositor;
mod config;
mod crossfade;
mod decoder;
mod error;
mod loader;
mod producer;
mod queue;
mod renderer;
mod scheduler;
mod video;

use crate::compositor::BlurCompositor;
use crate::config::Settings;
use crate::decoder::FileDecoder;
use crate::loader::MediaLoader;
use crate::producer::ProducerPool;
use crate::queue::PrefetchQueue;
use crate::scheduler::{PlaybackScheduler, RenderTarget};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("slideshow=info")),
        )
        .init();

    let config_path = Settings::path_from_env();
    let settings = Settings::load(&config_path)?;
    let sched_config = settings.scheduler_config();
    tracing::info!(
        "Loaded {}: folder {}, {}s per item, fade {:?} ({} frames)",
        config_path.display(),
        settings.image_folder.display(),
        settings.display_time_s,
        sched_config.fade,
        sched_config.fade.planned_frames(sched_config.tick)
    );

    let files = assets::scan_folder(&settings.image_folder, settings.enable_video)?;
    anyhow::ensure!(
        !files.is_empty(),
        "no media files found in {}",
        settings.image_folder.display()
    );
    tracing::info!("Found {} media files", files.len());

    if settings.enable_video {
        video::init()?;
    }

    // Decode work stays off the render thread: the runtime hosts the
    // producers, their blocking decode jobs and the Ctrl-C watcher.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.preload_workers)
        .thread_name("prefetch")
        .enable_all()
        .build()
        .context("Failed to start prefetch runtime")?;

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let interrupt = interrupt.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down");
                interrupt.store(true, Ordering::SeqCst);
            }
        });
    }

    let (renderer, input) = renderer::open_fullscreen("Slideshow", interrupt)?;
    let (screen_width, screen_height) = renderer.screen_dimensions();

    let compositor = Arc::new(BlurCompositor::new(
        settings.composite_settings(screen_width, screen_height),
    ));
    let loader = Arc::new(MediaLoader::new(
        Arc::new(FileDecoder::new(settings.enable_video)),
        compositor,
        settings.display_time(),
    ));
    let queue = Arc::new(PrefetchQueue::new(settings.queue_capacity));

    let producers = ProducerPool::spawn(
        runtime.handle(),
        settings.preload_workers,
        files.into(),
        loader,
        queue.clone(),
    );

    let mut scheduler = PlaybackScheduler::new(
        queue.clone(),
        renderer,
        input,
        sched_config,
    );
    let result = scheduler.run();
    tracing::debug!("Scheduler ended in {:?}", scheduler.state());

    queue.close();
    producers.shutdown();
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}
