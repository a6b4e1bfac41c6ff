//! SDL2 fullscreen output and keyboard/window quit handling.

use crate::compositor::DisplayFrame;
use crate::scheduler::{ExitSignal, RenderTarget};
use anyhow::{Context, Result};
use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, Texture};
use sdl2::video::Window;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Fullscreen canvas with one streaming texture the size of the screen.
pub struct Renderer {
    canvas: Canvas<Window>,
    texture: Option<Texture>,
    screen_width: u32,
    screen_height: u32,
    /// Id of the frame currently in the texture.
    uploaded: Option<u64>,
}

/// Polls SDL events and the shared Ctrl-C flag for quit requests.
pub struct InputEvents {
    event_pump: sdl2::EventPump,
    interrupt: Arc<AtomicBool>,
}

/// Initialize SDL2 and create a fullscreen window at desktop resolution.
pub fn open_fullscreen(title: &str, interrupt: Arc<AtomicBool>) -> Result<(Renderer, InputEvents)> {
    let sdl_context = sdl2::init().map_err(|e| anyhow::anyhow!("SDL init failed: {}", e))?;

    let video_subsystem = sdl_context
        .video()
        .map_err(|e| anyhow::anyhow!("SDL video init failed: {}", e))?;

    let display_mode = video_subsystem
        .desktop_display_mode(0)
        .map_err(|e| anyhow::anyhow!("Failed to get display mode: {}", e))?;

    let screen_width = u32::try_from(display_mode.w).context("negative display width")?;
    let screen_height = u32::try_from(display_mode.h).context("negative display height")?;

    tracing::info!(
        "Creating fullscreen window: {}x{}",
        screen_width,
        screen_height
    );

    let window = video_subsystem
        .window(title, screen_width, screen_height)
        .fullscreen_desktop()
        .build()
        .context("Failed to create window")?;

    let mut canvas = window
        .into_canvas()
        .accelerated()
        .present_vsync()
        .build()
        .context("Failed to create canvas")?;

    // Hide cursor for kiosk mode
    sdl_context.mouse().show_cursor(false);

    canvas.set_draw_color(sdl2::pixels::Color::RGB(0, 0, 0));
    canvas.clear();
    canvas.present();

    let texture = canvas
        .texture_creator()
        .create_texture_streaming(PixelFormatEnum::ABGR8888, screen_width, screen_height)
        .context("Failed to create texture")?;

    let event_pump = sdl_context
        .event_pump()
        .map_err(|e| anyhow::anyhow!("Failed to get event pump: {}", e))?;

    Ok((
        Renderer {
            canvas,
            texture: Some(texture),
            screen_width,
            screen_height,
            uploaded: None,
        },
        InputEvents {
            event_pump,
            interrupt,
        },
    ))
}

impl RenderTarget for Renderer {
    fn present(&mut self, frame: &DisplayFrame) -> Result<()> {
        anyhow::ensure!(
            frame.dimensions() == (self.screen_width, self.screen_height),
            "frame is {:?}, screen is {}x{}",
            frame.dimensions(),
            self.screen_width,
            self.screen_height
        );
        let texture = self.texture.as_mut().context("texture already released")?;

        if self.uploaded != Some(frame.id()) {
            // ABGR8888 is RGBA byte order on little-endian targets
            texture
                .update(None, frame.as_raw(), self.screen_width as usize * 4)
                .map_err(|e| anyhow::anyhow!("Failed to update texture: {}", e))?;
            self.uploaded = Some(frame.id());
        }

        self.canvas.clear();
        self.canvas
            .copy(texture, None, None)
            .map_err(|e| anyhow::anyhow!("Failed to render frame: {}", e))?;
        self.canvas.present();
        Ok(())
    }

    fn screen_dimensions(&self) -> (u32, u32) {
        (self.screen_width, self.screen_height)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Some(texture) = self.texture.take() {
            // SAFETY: the canvas that owns the texture's renderer is still
            // alive; struct fields are dropped only after this runs.
            unsafe { texture.destroy() };
        }
    }
}

impl ExitSignal for InputEvents {
    fn poll_quit_requested(&mut self) -> bool {
        let mut quit = self.interrupt.load(Ordering::SeqCst);
        for event in self.event_pump.poll_iter() {
            match event {
                Event::Quit { .. }
                | Event::KeyDown {
                    keycode: Some(Keycode::Escape | Keycode::Q),
                    ..
                } => quit = true,
                _ => {}
            }
        }
        quit
    }
}
