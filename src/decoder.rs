//! Decoder seams: still and animated images through the `image` crate,
//! videos through gstreamer (see [`crate::video`]).

use crate::assets::MediaKind;
use crate::error::{LoadError, LoadResult};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// One decoded, not yet composited frame.
pub struct RawFrame {
    pub image: RgbaImage,
    /// Embedded display duration, if the source carries one.
    pub delay: Option<Duration>,
}

/// Result of pulling from a video stream.
pub enum SourcePoll {
    Frame(RawFrame),
    /// Nothing decoded within the wait; try again later.
    Pending,
    /// End of stream or unrecoverable pipeline error.
    Ended,
}

/// A pull-based, incrementally decoded video.
pub trait VideoSource: Send {
    /// Wait at most `wait` for the next frame.
    fn pull(&mut self, wait: Duration) -> SourcePoll;
}

/// Raw decode primitives used by the loader.
pub trait MediaDecoder: Send + Sync {
    /// Decode every frame of a still or animated image.
    fn decode_frames(&self, path: &Path, kind: MediaKind) -> LoadResult<Vec<RawFrame>>;

    /// Open a video for incremental decoding.
    fn open_video(&self, path: &Path) -> LoadResult<Box<dyn VideoSource>>;
}

/// Decoder for files on disk.
#[derive(Debug, Clone, Copy)]
pub struct FileDecoder {
    video_enabled: bool,
}

impl FileDecoder {
    pub fn new(video_enabled: bool) -> Self {
        Self { video_enabled }
    }
}

impl MediaDecoder for FileDecoder {
    fn decode_frames(&self, path: &Path, kind: MediaKind) -> LoadResult<Vec<RawFrame>> {
        match kind {
            MediaKind::Image => {
                let img = image::open(path).map_err(|e| LoadError::from_image(path, e))?;
                Ok(vec![RawFrame {
                    image: img.to_rgba8(),
                    delay: None,
                }])
            }
            MediaKind::AnimatedImage => decode_gif(path),
            MediaKind::Video => Err(LoadError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    fn open_video(&self, path: &Path) -> LoadResult<Box<dyn VideoSource>> {
        if !self.video_enabled {
            return Err(LoadError::UnsupportedFormat(path.to_path_buf()));
        }
        Ok(Box::new(crate::video::GstVideoSource::open(path)?))
    }
}

fn decode_gif(path: &Path) -> LoadResult<Vec<RawFrame>> {
    let file = File::open(path).map_err(|e| LoadError::io(path, e))?;
    let decoder =
        GifDecoder::new(BufReader::new(file)).map_err(|e| LoadError::from_image(path, e))?;
    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| LoadError::from_image(path, e))?;

    Ok(frames
        .into_iter()
        .map(|frame| {
            let (num, den) = frame.delay().numer_denom_ms();
            let delay = if num == 0 || den == 0 {
                None
            } else {
                Some(Duration::from_secs_f64(f64::from(num) / f64::from(den) / 1000.0))
            };
            RawFrame {
                image: frame.into_buffer(),
                delay,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, Rgba};

    fn write_gif(path: &Path, delays_ms: &[u32]) {
        let file = File::create(path).unwrap();
        let mut encoder = GifEncoder::new(file);
        for (i, &ms) in delays_ms.iter().enumerate() {
            let buf = RgbaImage::from_pixel(4, 3, Rgba([(i * 80) as u8, 0, 0, 255]));
            let frame = Frame::from_parts(buf, 0, 0, Delay::from_numer_denom_ms(ms, 1));
            encoder.encode_frame(frame).unwrap();
        }
    }

    #[test]
    fn still_image_is_one_frame_without_delay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.png");
        RgbaImage::from_pixel(5, 4, Rgba([1, 2, 3, 255])).save(&path).unwrap();

        let frames = FileDecoder::new(false)
            .decode_frames(&path, MediaKind::Image)
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].image.dimensions(), (5, 4));
        assert!(frames[0].delay.is_none());
    }

    #[test]
    fn gif_frames_carry_their_delays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anim.gif");
        write_gif(&path, &[100, 150, 200]);

        let frames = FileDecoder::new(false)
            .decode_frames(&path, MediaKind::AnimatedImage)
            .unwrap();
        let delays: Vec<_> = frames.iter().map(|f| f.delay).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(100)),
                Some(Duration::from_millis(150)),
                Some(Duration::from_millis(200)),
            ]
        );
    }

    #[test]
    fn corrupt_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        let err = FileDecoder::new(false)
            .decode_frames(&path, MediaKind::Image)
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::Decode { .. }), "{err}");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileDecoder::new(false)
            .decode_frames(&dir.path().join("gone.gif"), MediaKind::AnimatedImage)
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::Io { .. }), "{err}");
    }

    #[test]
    fn video_is_rejected_when_disabled() {
        let err = FileDecoder::new(false)
            .open_video(Path::new("clip.mp4"))
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::UnsupportedFormat(_)));
    }
}
