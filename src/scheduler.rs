//! Foreground playback loop.
//!
//! `AwaitingPrefetch -> Showing -> Transitioning -> Showing -> ...` until the
//! exit signal fires. Every wait is sliced to the render tick so the exit
//! check keeps its cadence no matter how long a frame is held.

use crate::compositor::DisplayFrame;
use crate::crossfade::{FadeTiming, Transition};
use crate::loader::{MediaContent, MediaItem, StreamPoll};
use crate::queue::{PrefetchQueue, DEFAULT_MIN_READY};
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where frames go.
pub trait RenderTarget {
    /// Show a whole frame.
    fn present(&mut self, frame: &DisplayFrame) -> Result<()>;

    fn screen_dimensions(&self) -> (u32, u32);
}

/// Source of quit requests, polled once per tick.
pub trait ExitSignal {
    fn poll_quit_requested(&mut self) -> bool;
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How long images and animations stay before the crossfade.
    pub display_time: Duration,
    pub fade: FadeTiming,
    /// Render tick for animations, video and transitions.
    pub tick: Duration,
    /// Tick while a single still frame is shown.
    pub idle_tick: Duration,
    /// Items needed before playback first starts.
    pub min_ready: usize,
    /// Minimum spacing of waiting/starvation log lines.
    pub progress_interval: Duration,
}

impl SchedulerConfig {
    pub fn new(display_time: Duration, fade: FadeTiming) -> Self {
        Self {
            display_time,
            fade,
            tick: Duration::from_secs_f64(1.0 / 60.0),
            idle_tick: Duration::from_millis(50),
            min_ready: DEFAULT_MIN_READY,
            progress_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    AwaitingPrefetch,
    Showing,
    Transitioning,
    Stopped,
}

enum Flow {
    Continue,
    Quit,
}

/// The item on screen and how far into it playback is.
struct ScheduleCursor {
    item: MediaItem,
    frame_index: usize,
    item_start: Instant,
    frame_deadline: Instant,
    /// Latest composited frame of a video item.
    video_frame: Option<DisplayFrame>,
    ended: bool,
}

impl ScheduleCursor {
    fn new(item: MediaItem, now: Instant) -> Self {
        let (first_duration, video_frame) = match item.content() {
            MediaContent::Frames(frames) => (frames[0].duration, None),
            MediaContent::Video(stream) => (
                stream.opening().duration,
                Some(stream.opening().frame.clone()),
            ),
        };
        Self {
            item,
            frame_index: 0,
            item_start: now,
            frame_deadline: now + first_duration,
            video_frame,
            ended: false,
        }
    }

    fn displayed(&self) -> &DisplayFrame {
        if let Some(frame) = &self.video_frame {
            return frame;
        }
        match self.item.content() {
            MediaContent::Frames(frames) => &frames[self.frame_index % frames.len()].frame,
            MediaContent::Video(stream) => &stream.opening().frame,
        }
    }

    fn is_animated(&self) -> bool {
        match self.item.content() {
            MediaContent::Frames(frames) => frames.len() > 1,
            MediaContent::Video(_) => true,
        }
    }

    /// Move to the next sub-frame once the current one has had its time.
    fn advance(&mut self, now: Instant, pull_wait: Duration) {
        if self.ended || now < self.frame_deadline {
            return;
        }

        let duration = match self.item.content_mut() {
            MediaContent::Frames(frames) => {
                if frames.len() < 2 {
                    return;
                }
                self.frame_index += 1;
                frames[self.frame_index % frames.len()].duration
            }
            MediaContent::Video(stream) => match stream.next_frame(pull_wait) {
                StreamPoll::Frame(timed) => {
                    self.frame_index += 1;
                    self.video_frame = Some(timed.frame);
                    timed.duration
                }
                StreamPoll::Pending => return,
                StreamPoll::Ended => {
                    self.ended = true;
                    return;
                }
            },
        };

        // Late by more than a whole frame: restart the clock rather than skip.
        self.frame_deadline = if now.saturating_duration_since(self.frame_deadline) >= duration {
            now + duration
        } else {
            self.frame_deadline + duration
        };
    }

    fn item_end(&self, display_time: Duration) -> Option<Instant> {
        match self.item.content() {
            MediaContent::Frames(_) => Some(self.item_start + display_time),
            MediaContent::Video(_) => None,
        }
    }

    fn finished(&self, now: Instant, display_time: Duration) -> bool {
        match self.item_end(display_time) {
            Some(end) => now >= end,
            None => self.ended,
        }
    }

    /// When the loop should run next: the next tick, or sooner if a frame
    /// deadline or the end of the item falls before it.
    fn wake_time(&self, now: Instant, config: &SchedulerConfig) -> Instant {
        let tick = if self.is_animated() {
            config.tick
        } else {
            config.idle_tick
        };
        let deadline = (self.is_animated() && !self.ended).then_some(self.frame_deadline);

        [deadline, self.item_end(config.display_time)]
            .into_iter()
            .flatten()
            .filter(|&t| t > now)
            .fold(now + tick, Instant::min)
    }
}

pub struct PlaybackScheduler<R, E> {
    queue: Arc<PrefetchQueue<MediaItem>>,
    target: R,
    exit: E,
    config: SchedulerConfig,
    state: PlaybackState,
}

impl<R: RenderTarget, E: ExitSignal> PlaybackScheduler<R, E> {
    pub fn new(
        queue: Arc<PrefetchQueue<MediaItem>>,
        target: R,
        exit: E,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            queue,
            target,
            exit,
            config,
            state: PlaybackState::AwaitingPrefetch,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Play until the exit signal fires.
    pub fn run(&mut self) -> Result<()> {
        let (w, h) = self.target.screen_dimensions();
        tracing::info!("Starting playback at {}x{}", w, h);

        let result = self.play();
        self.state = PlaybackState::Stopped;
        tracing::info!("Playback stopped");
        result
    }

    fn play(&mut self) -> Result<()> {
        let Some((current, next)) = self.await_prefetch() else {
            return Ok(());
        };
        let mut cursor = ScheduleCursor::new(current, Instant::now());
        let mut next = Some(next);

        loop {
            if let Flow::Quit = self.show(&mut cursor, &mut next)? {
                return Ok(());
            }
            let Some(upcoming) = next.take() else {
                continue;
            };

            tracing::debug!("Crossfading {} -> {}", cursor.item.path(), upcoming.path());
            if let Flow::Quit = self.transition(cursor.displayed(), upcoming.opening_frame())? {
                return Ok(());
            }

            cursor = ScheduleCursor::new(upcoming, Instant::now());
            next = self.queue.try_pop();
        }
    }

    /// Block (in tick-sized waits) until enough items are prefetched, then
    /// take the first two.
    fn await_prefetch(&mut self) -> Option<(MediaItem, MediaItem)> {
        self.state = PlaybackState::AwaitingPrefetch;
        let min_ready = self.config.min_ready.max(2);
        let mut last_log = Instant::now();

        loop {
            if self.exit.poll_quit_requested() {
                return None;
            }

            let ready = self.queue.wait_ready(min_ready, self.config.tick);
            if ready >= min_ready {
                if let Some(pair) = self.queue.try_pop_two() {
                    tracing::info!("{} items preloaded, starting slideshow", ready);
                    return Some(pair);
                }
            }
            if self.queue.is_closed() {
                return None;
            }

            if last_log.elapsed() >= self.config.progress_interval {
                tracing::info!("Waiting for preloaded media... {} loaded", ready);
                last_log = Instant::now();
            }
        }
    }

    /// Present the current item until it is done and the next one is at hand.
    fn show(&mut self, cursor: &mut ScheduleCursor, next: &mut Option<MediaItem>) -> Result<Flow> {
        self.state = PlaybackState::Showing;
        let mut last_warning: Option<Instant> = None;

        loop {
            if self.exit.poll_quit_requested() {
                return Ok(Flow::Quit);
            }

            let now = Instant::now();
            cursor.advance(now, self.config.tick / 2);
            self.target.present(cursor.displayed())?;

            if next.is_none() {
                *next = self.queue.try_pop();
            }
            if cursor.finished(now, self.config.display_time) {
                if next.is_some() {
                    return Ok(Flow::Continue);
                }
                if last_warning.map_or(true, |t| t.elapsed() >= self.config.progress_interval) {
                    tracing::warn!(
                        "Next item not ready, holding {} ({} queued)",
                        cursor.item.path(),
                        self.queue.ready_count()
                    );
                    last_warning = Some(Instant::now());
                }
            }

            let wake = cursor.wake_time(Instant::now(), &self.config);
            if self.sleep_until(wake) {
                return Ok(Flow::Quit);
            }
        }
    }

    /// Crossfade from the frame on screen to the opening frame of the next item.
    fn transition(&mut self, from: &DisplayFrame, to: &DisplayFrame) -> Result<Flow> {
        self.state = PlaybackState::Transitioning;
        let mut fade = Transition::start(from, to, self.config.fade);
        let mut tick_at = fade.started();

        loop {
            tick_at += self.config.tick;
            if self.sleep_until(tick_at) || self.exit.poll_quit_requested() {
                return Ok(Flow::Quit);
            }

            let (frame, done) = fade.next_frame(Instant::now());
            self.target.present(&frame)?;
            if done {
                return Ok(Flow::Continue);
            }
        }
    }

    /// Sleep until `deadline` in tick-sized slices. Returns true on quit.
    fn sleep_until(&mut self, deadline: Instant) -> bool {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(self.config.tick));
            if Instant::now() < deadline && self.exit.poll_quit_requested() {
                return true;
            }
        }
    }
}
