//! Screen-sized composites: blurred, tinted full-bleed background with the
//! aspect-fit foreground centred on top.

use crate::error::ComposeError;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// A finished, screen-sized RGBA frame. Never mutated after creation.
///
/// Clones keep the id, so a renderer can skip re-uploading a frame it has
/// already seen.
#[derive(Clone)]
pub struct DisplayFrame {
    id: u64,
    image: RgbaImage,
}

impl DisplayFrame {
    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            id: NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed),
            image,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Tightly packed RGBA bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image.get_pixel(x, y).0
    }
}

impl std::fmt::Debug for DisplayFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayFrame")
            .field("id", &self.id)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Placement of the aspect-fit foreground on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Calculate the aspect-fit rectangle of an image centred on the screen.
pub fn fit_rect(img_width: u32, img_height: u32, screen_width: u32, screen_height: u32) -> FitRect {
    let (iw, ih) = (u64::from(img_width.max(1)), u64::from(img_height.max(1)));
    let (sw, sh) = (u64::from(screen_width), u64::from(screen_height));

    let (width, height) = if iw * sh > sw * ih {
        // Image is wider than screen, fit to width
        (sw, (sw * ih / iw).max(1))
    } else {
        // Image is taller than screen, fit to height
        ((sh * iw / ih).max(1), sh)
    };

    FitRect {
        x: ((sw - width) / 2) as u32,
        y: ((sh - height) / 2) as u32,
        width: width as u32,
        height: height as u32,
    }
}

/// Tunables for the composite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeSettings {
    pub screen_width: u32,
    pub screen_height: u32,
    /// Gaussian sigma of the background blur, in screen pixels.
    pub blur_radius: f32,
    /// Opacity of the black overlay on the background, 0..=1.
    pub tint_opacity: f32,
}

/// Turns a decoded image into a screen-sized [`DisplayFrame`].
pub trait ImageCompositor: Send + Sync {
    fn compose(&self, raw: &RgbaImage) -> Result<DisplayFrame, ComposeError>;

    fn screen_size(&self) -> (u32, u32);
}

/// CPU compositor built on `image::imageops`.
#[derive(Debug, Clone)]
pub struct BlurCompositor {
    settings: CompositeSettings,
}

impl BlurCompositor {
    pub fn new(settings: CompositeSettings) -> Self {
        Self { settings }
    }

    /// Background fill: stretched to the screen, blurred, then darkened.
    ///
    /// The blur runs on a downscaled copy and is scaled back up, which keeps
    /// large radii cheap and leaves the output dimensions exact.
    fn background(&self, raw: &RgbaImage) -> RgbaImage {
        let CompositeSettings {
            screen_width: sw,
            screen_height: sh,
            blur_radius,
            tint_opacity,
        } = self.settings;

        let mut bg = if blur_radius > 0.0 {
            let factor = blur_downscale(blur_radius);
            let small = imageops::resize(
                raw,
                (sw / factor).max(1),
                (sh / factor).max(1),
                FilterType::Triangle,
            );
            let blurred = imageops::blur(&small, blur_radius / factor as f32);
            imageops::resize(&blurred, sw, sh, FilterType::Triangle)
        } else {
            imageops::resize(raw, sw, sh, FilterType::Triangle)
        };

        let keep = 1.0 - tint_opacity.clamp(0.0, 1.0);
        for px in bg.pixels_mut() {
            for c in 0..3 {
                px[c] = (f32::from(px[c]) * keep).round() as u8;
            }
            px[3] = 255;
        }
        bg
    }
}

impl ImageCompositor for BlurCompositor {
    fn compose(&self, raw: &RgbaImage) -> Result<DisplayFrame, ComposeError> {
        let (sw, sh) = self.screen_size();
        if sw == 0 || sh == 0 {
            return Err(ComposeError::Malformed(format!("screen is {}x{}", sw, sh)));
        }
        let (iw, ih) = raw.dimensions();
        if iw == 0 || ih == 0 {
            return Err(ComposeError::Malformed(format!("image is {}x{}", iw, ih)));
        }
        if raw.as_raw().len() != (iw as usize) * (ih as usize) * 4 {
            return Err(ComposeError::Malformed(format!(
                "{} bytes for {}x{} rgba",
                raw.as_raw().len(),
                iw,
                ih
            )));
        }

        let mut canvas = self.background(raw);

        let rect = fit_rect(iw, ih, sw, sh);
        let mut fg = imageops::resize(raw, rect.width, rect.height, FilterType::Lanczos3);
        for px in fg.pixels_mut() {
            *px = Rgba([px[0], px[1], px[2], 255]);
        }
        imageops::replace(&mut canvas, &fg, i64::from(rect.x), i64::from(rect.y));

        Ok(DisplayFrame::from_image(canvas))
    }

    fn screen_size(&self) -> (u32, u32) {
        (self.settings.screen_width, self.settings.screen_height)
    }
}

fn blur_downscale(radius: f32) -> u32 {
    ((radius / 4.0).floor() as u32).clamp(1, 16)
}
