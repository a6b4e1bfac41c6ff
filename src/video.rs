//! GStreamer-based video decoding.
//!
//! Frames are pulled from an appsink one at a time; the pipeline runs
//! unsynchronised and the small appsink buffer bounds how far it decodes ahead.

use crate::decoder::{RawFrame, SourcePoll, VideoSource};
use crate::error::{LoadError, LoadResult};
use anyhow::{Context, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Frames buffered in the appsink before upstream blocks.
const APPSINK_MAX_BUFFERS: u32 = 4;
const FALLBACK_FPS: f64 = 30.0;

/// Initialize GStreamer (call once at startup).
pub fn init() -> Result<()> {
    gst::init().context("Failed to initialize GStreamer")?;
    tracing::info!("GStreamer initialized: {}", gst::version_string());
    Ok(())
}

/// Percent-encoded `file://` URI for an absolute path.
fn file_uri(absolute: &Path) -> Result<String, gst::glib::Error> {
    gst::glib::filename_to_uri(absolute, None).map(String::from)
}

/// A playing `uridecodebin ! videoconvert ! videoscale ! appsink` pipeline.
pub struct GstVideoSource {
    path: PathBuf,
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    bus: gst::Bus,
}

impl GstVideoSource {
    /// Build the pipeline for `path` and start decoding.
    pub fn open(path: &Path) -> LoadResult<Self> {
        let absolute = std::fs::canonicalize(path).map_err(|e| LoadError::io(path, e))?;
        let fail = |what: &str, e: &dyn std::fmt::Display| {
            LoadError::decode(path, format!("{}: {}", what, e))
        };
        let uri = file_uri(&absolute).map_err(|e| fail("uri", &e))?;

        tracing::debug!("Creating video pipeline for: {}", uri);

        let pipeline = gst::Pipeline::new();

        let src = gst::ElementFactory::make("uridecodebin")
            .name("source")
            .property("uri", &uri)
            .build()
            .map_err(|e| fail("uridecodebin", &e))?;

        let convert = gst::ElementFactory::make("videoconvert")
            .name("convert")
            .build()
            .map_err(|e| fail("videoconvert", &e))?;

        let scale = gst::ElementFactory::make("videoscale")
            .name("scale")
            .build()
            .map_err(|e| fail("videoscale", &e))?;

        let appsink = gst_app::AppSink::builder()
            .name("sink")
            .caps(
                &gst_video::VideoCapsBuilder::new()
                    .format(gst_video::VideoFormat::Rgba)
                    .build(),
            )
            .sync(false)
            .max_buffers(APPSINK_MAX_BUFFERS)
            .drop(false)
            .build();

        pipeline
            .add_many([&src, &convert, &scale, appsink.upcast_ref()])
            .map_err(|e| fail("add elements", &e))?;

        gst::Element::link_many([&convert, &scale, appsink.upcast_ref()])
            .map_err(|e| fail("link elements", &e))?;

        // uridecodebin exposes its pads once the container is parsed
        let convert_weak = convert.downgrade();
        src.connect_pad_added(move |_src, src_pad| {
            let Some(convert) = convert_weak.upgrade() else {
                return;
            };
            let Some(sink_pad) = convert.static_pad("sink") else {
                tracing::error!("videoconvert has no sink pad");
                return;
            };
            if sink_pad.is_linked() {
                return;
            }

            let caps = src_pad
                .current_caps()
                .unwrap_or_else(|| src_pad.query_caps(None));
            let is_video = caps
                .structure(0)
                .map(|s| s.name().starts_with("video/"))
                .unwrap_or(false);

            if is_video {
                if let Err(e) = src_pad.link(&sink_pad) {
                    tracing::error!("Failed to link pads: {:?}", e);
                }
            }
        });

        let bus = pipeline
            .bus()
            .ok_or_else(|| LoadError::decode(path, "pipeline has no bus"))?;

        let source = Self {
            path: path.to_path_buf(),
            pipeline,
            appsink,
            bus,
        };

        source
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| fail("start pipeline", &e))?;

        Ok(source)
    }

    /// First pending pipeline error, if any.
    fn pipeline_error(&self) -> Option<String> {
        let msg = self.bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(format!("{} ({:?})", err.error(), err.debug())),
            _ => None,
        }
    }
}

impl VideoSource for GstVideoSource {
    fn pull(&mut self, wait: Duration) -> SourcePoll {
        if let Some(err) = self.pipeline_error() {
            tracing::warn!("GStreamer error in {}: {}", self.path.display(), err);
            return SourcePoll::Ended;
        }

        let timeout = gst::ClockTime::from_nseconds(wait.as_nanos() as u64);
        match self.appsink.try_pull_sample(timeout) {
            Some(sample) => match frame_from_sample(&sample) {
                Ok(frame) => SourcePoll::Frame(frame),
                Err(e) => {
                    tracing::warn!("Dropping video {}: {}", self.path.display(), e);
                    SourcePoll::Ended
                }
            },
            None if self.appsink.is_eos() => SourcePoll::Ended,
            None => SourcePoll::Pending,
        }
    }
}

impl Drop for GstVideoSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Copy a sample into a tightly packed RGBA image with its 1/fps duration.
fn frame_from_sample(sample: &gst::Sample) -> Result<RawFrame> {
    let buffer = sample.buffer().context("sample has no buffer")?;
    let caps = sample.caps().context("sample has no caps")?;
    let info = gst_video::VideoInfo::from_caps(caps).context("sample caps are not video")?;

    let width = info.width();
    let height = info.height();
    let stride = usize::try_from(info.stride()[0]).context("negative stride")?;
    let row_bytes = width as usize * 4;
    anyhow::ensure!(width > 0 && height > 0, "empty {}x{} frame", width, height);

    let map = buffer.map_readable().context("buffer is not readable")?;
    let data = map.as_slice();
    anyhow::ensure!(
        stride >= row_bytes && data.len() >= stride * (height as usize - 1) + row_bytes,
        "{} bytes for {}x{} frame with stride {}",
        data.len(),
        width,
        height,
        stride
    );

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks(stride).take(height as usize) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }
    let image = RgbaImage::from_raw(width, height, pixels).context("frame size mismatch")?;

    let fps = info.fps();
    let rate = if fps.numer() > 0 && fps.denom() > 0 {
        f64::from(fps.numer()) / f64::from(fps.denom())
    } else {
        FALLBACK_FPS
    };

    Ok(RawFrame {
        image,
        delay: Some(Duration::from_secs_f64(1.0 / rate)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_escapes_reserved_characters() {
        let uri = file_uri(Path::new("/media/summer #1 100%?.mp4")).unwrap();
        assert!(uri.starts_with("file:///media/"), "{uri}");
        assert!(uri.contains("%23") && uri.contains("%25") && uri.contains("%3F"), "{uri}");
        assert!(!uri.contains('#') && !uri.contains('?'), "{uri}");
    }
}
