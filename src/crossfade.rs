//! Crossfade between the last frame of one item and the opening frame of the next.

use crate::compositor::DisplayFrame;
use image::RgbaImage;
use std::time::{Duration, Instant};

const Q16_ONE: u32 = 1 << 16;

/// How a transition's alpha evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeTiming {
    /// Alpha follows wall-clock time over the given duration.
    Continuous(Duration),
    /// A fixed number of frames, one per render tick.
    Steps(u32),
}

impl FadeTiming {
    /// Alpha of the `step`-th rendered transition frame (0-based), `elapsed`
    /// after the transition started.
    pub fn alpha(&self, step: u32, elapsed: Duration) -> f32 {
        match *self {
            FadeTiming::Continuous(total) => {
                if total.is_zero() {
                    1.0
                } else {
                    (elapsed.as_secs_f64() / total.as_secs_f64()).min(1.0) as f32
                }
            }
            FadeTiming::Steps(n) => ((step + 1) as f32 / n.max(1) as f32).min(1.0),
        }
    }

    /// Number of frames a transition renders when every tick lands on time.
    /// A zero tick cannot advance a timed fade, so it cuts.
    pub fn planned_frames(&self, tick: Duration) -> u32 {
        let frames = match *self {
            FadeTiming::Continuous(total) if total.is_zero() || tick.is_zero() => 1,
            FadeTiming::Continuous(total) => total.as_nanos().div_ceil(tick.as_nanos()),
            FadeTiming::Steps(n) => u128::from(n.max(1)),
        };
        u32::try_from(frames).unwrap_or(u32::MAX)
    }

    /// Alphas a transition produces when every tick lands on time.
    #[cfg(test)]
    pub fn planned_alphas(&self, tick: Duration) -> Vec<f32> {
        let frames = self.planned_frames(tick);
        (0..frames)
            .map(|step| {
                if step + 1 == frames {
                    1.0
                } else {
                    self.alpha(step, tick.saturating_mul(step + 1))
                }
            })
            .collect()
    }
}

/// Blend `to` at opacity `alpha` over a copy of `from`.
///
/// Weights are 16.16 fixed point, so the result only depends on the inputs:
/// `alpha == 0` yields `from`, `alpha == 1` yields `to` and `alpha == 0.5`
/// is symmetric in its arguments.
pub fn blend(from: &DisplayFrame, to: &DisplayFrame, alpha: f32) -> DisplayFrame {
    if from.dimensions() != to.dimensions() {
        tracing::warn!(
            "Crossfade between {:?} and {:?} frames, cutting instead",
            from.dimensions(),
            to.dimensions()
        );
        return to.clone();
    }

    let w = (f64::from(alpha.clamp(0.0, 1.0)) * f64::from(Q16_ONE)).round() as u32;
    let iw = Q16_ONE - w;

    let pixels: Vec<u8> = from
        .as_raw()
        .iter()
        .zip(to.as_raw())
        .map(|(&a, &b)| ((u32::from(a) * iw + u32::from(b) * w + (1 << 15)) >> 16) as u8)
        .collect();

    let (width, height) = from.dimensions();
    match RgbaImage::from_raw(width, height, pixels) {
        Some(image) => DisplayFrame::from_image(image),
        None => to.clone(),
    }
}

/// An in-flight crossfade: produces one blended frame per render tick.
pub struct Transition<'a> {
    from: &'a DisplayFrame,
    to: &'a DisplayFrame,
    timing: FadeTiming,
    started: Instant,
    step: u32,
}

impl<'a> Transition<'a> {
    pub fn start(from: &'a DisplayFrame, to: &'a DisplayFrame, timing: FadeTiming) -> Self {
        Self {
            from,
            to,
            timing,
            started: Instant::now(),
            step: 0,
        }
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// The next frame to present and whether it is the final one.
    pub fn next_frame(&mut self, now: Instant) -> (DisplayFrame, bool) {
        let alpha = self
            .timing
            .alpha(self.step, now.saturating_duration_since(self.started));
        self.step += 1;
        if alpha >= 1.0 {
            (self.to.clone(), true)
        } else {
            (blend(self.from, self.to, alpha), false)
        }
    }
}
