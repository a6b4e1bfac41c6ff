//! Turns a media path into a display-ready [`MediaItem`].
//!
//! Images and animations are decoded and composited up front; videos keep a
//! live stream and composite lazily, one frame per pull.

use crate::assets::{MediaKind, MediaPath};
use crate::compositor::{DisplayFrame, ImageCompositor};
use crate::decoder::{MediaDecoder, RawFrame, SourcePoll, VideoSource};
use crate::error::{LoadError, LoadResult};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Frame duration for animation frames that carry none.
pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

const DEFAULT_VIDEO_FRAME: Duration = Duration::from_nanos(33_333_333);
const OPENING_FRAME_TIMEOUT: Duration = Duration::from_secs(5);
const OPENING_POLL: Duration = Duration::from_millis(100);

/// A composited frame and how long it stays on screen.
pub struct TimedFrame {
    pub frame: DisplayFrame,
    pub duration: Duration,
}

pub enum MediaContent {
    /// Fully materialised, never empty.
    Frames(Vec<TimedFrame>),
    Video(VideoStream),
}

/// A prepared media item, owned by the queue and then by the scheduler.
pub struct MediaItem {
    path: MediaPath,
    content: MediaContent,
}

impl MediaItem {
    pub fn from_frames(path: MediaPath, frames: Vec<TimedFrame>) -> LoadResult<Self> {
        if frames.is_empty() {
            return Err(LoadError::empty(path.path()));
        }
        Ok(Self {
            path,
            content: MediaContent::Frames(frames),
        })
    }

    pub fn from_video(path: MediaPath, stream: VideoStream) -> Self {
        Self {
            path,
            content: MediaContent::Video(stream),
        }
    }

    pub fn path(&self) -> &MediaPath {
        &self.path
    }

    pub fn content(&self) -> &MediaContent {
        &self.content
    }

    pub fn content_mut(&mut self) -> &mut MediaContent {
        &mut self.content
    }

    /// The frame a crossfade into this item targets.
    pub fn opening_frame(&self) -> &DisplayFrame {
        match &self.content {
            MediaContent::Frames(frames) => &frames[0].frame,
            MediaContent::Video(stream) => &stream.opening().frame,
        }
    }

    /// Number of materialised frames; `None` for streams.
    pub fn frame_count(&self) -> Option<usize> {
        match &self.content {
            MediaContent::Frames(frames) => Some(frames.len()),
            MediaContent::Video(_) => None,
        }
    }
}

impl std::fmt::Debug for MediaItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaItem")
            .field("path", &self.path.path())
            .field("kind", &self.path.kind())
            .field("frames", &self.frame_count())
            .finish()
    }
}

/// Result of pulling the next frame of a video item.
pub enum StreamPoll {
    Frame(TimedFrame),
    Pending,
    Ended,
}

/// Lazily composited video frames. The opening frame is decoded by the loader.
pub struct VideoStream {
    source: Box<dyn VideoSource>,
    compositor: Arc<dyn ImageCompositor>,
    opening: TimedFrame,
}

impl VideoStream {
    pub fn opening(&self) -> &TimedFrame {
        &self.opening
    }

    /// Pull and composite the frame after the ones already returned.
    pub fn next_frame(&mut self, wait: Duration) -> StreamPoll {
        match self.source.pull(wait) {
            SourcePoll::Frame(raw) => match compose_timed(self.compositor.as_ref(), raw) {
                Ok(frame) => StreamPoll::Frame(frame),
                Err(reason) => {
                    tracing::warn!("Ending video early: {}", reason);
                    StreamPoll::Ended
                }
            },
            SourcePoll::Pending => StreamPoll::Pending,
            SourcePoll::Ended => StreamPoll::Ended,
        }
    }
}

fn compose_timed(compositor: &dyn ImageCompositor, raw: RawFrame) -> Result<TimedFrame, String> {
    let frame = compositor.compose(&raw.image).map_err(|e| e.to_string())?;
    Ok(TimedFrame {
        frame,
        duration: raw.delay.unwrap_or(DEFAULT_VIDEO_FRAME),
    })
}

/// Classifies, decodes and composites media files.
pub struct MediaLoader {
    decoder: Arc<dyn MediaDecoder>,
    compositor: Arc<dyn ImageCompositor>,
    display_time: Duration,
    opening_timeout: Duration,
}

impl MediaLoader {
    pub fn new(
        decoder: Arc<dyn MediaDecoder>,
        compositor: Arc<dyn ImageCompositor>,
        display_time: Duration,
    ) -> Self {
        Self {
            decoder,
            compositor,
            display_time,
            opening_timeout: OPENING_FRAME_TIMEOUT,
        }
    }

    /// How long a video may take to produce its first frame.
    #[cfg(test)]
    pub fn with_opening_timeout(mut self, timeout: Duration) -> Self {
        self.opening_timeout = timeout;
        self
    }

    pub fn load(&self, path: &Path) -> LoadResult<MediaItem> {
        let media = MediaPath::new(path)?;
        let started = Instant::now();

        let item = match media.kind() {
            MediaKind::Image | MediaKind::AnimatedImage => self.load_frames(media)?,
            MediaKind::Video => self.load_video(media)?,
        };

        tracing::debug!(
            "Prepared {} {} ({:?} frames) in {:.0?}",
            item.path().kind().as_str(),
            item.path(),
            item.frame_count(),
            started.elapsed()
        );
        Ok(item)
    }

    fn load_frames(&self, media: MediaPath) -> LoadResult<MediaItem> {
        let raw = self.decoder.decode_frames(media.path(), media.kind())?;
        // A lone frame is shown like a still, whatever its embedded delay.
        let single = raw.len() == 1;

        let frames = raw
            .into_iter()
            .map(|raw| -> LoadResult<TimedFrame> {
                let duration = if single {
                    self.display_time
                } else {
                    raw.delay
                        .filter(|d| !d.is_zero())
                        .unwrap_or(DEFAULT_FRAME_DELAY)
                };
                let frame = self
                    .compositor
                    .compose(&raw.image)
                    .map_err(|e| LoadError::decode(media.path(), e))?;
                Ok(TimedFrame { frame, duration })
            })
            .collect::<LoadResult<Vec<TimedFrame>>>()?;

        MediaItem::from_frames(media, frames)
    }

    fn load_video(&self, media: MediaPath) -> LoadResult<MediaItem> {
        let mut source = self.decoder.open_video(media.path())?;

        let deadline = Instant::now() + self.opening_timeout;
        let raw = loop {
            let wait = deadline
                .saturating_duration_since(Instant::now())
                .min(OPENING_POLL);
            match source.pull(wait) {
                SourcePoll::Frame(raw) => break raw,
                SourcePoll::Ended => return Err(LoadError::empty(media.path())),
                SourcePoll::Pending if Instant::now() >= deadline => {
                    return Err(LoadError::decode(
                        media.path(),
                        format!("no frame within {:?}", self.opening_timeout),
                    ));
                }
                SourcePoll::Pending => {}
            }
        };

        let opening = compose_timed(self.compositor.as_ref(), raw)
            .map_err(|reason| LoadError::decode(media.path(), reason))?;

        Ok(MediaItem::from_video(
            media,
            VideoStream {
                source,
                compositor: self.compositor.clone(),
                opening,
            },
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::compositor::{BlurCompositor, CompositeSettings};
    use image::{Rgba, RgbaImage};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    pub(crate) fn compositor() -> Arc<dyn ImageCompositor> {
        Arc::new(BlurCompositor::new(CompositeSettings {
            screen_width: 16,
            screen_height: 9,
            blur_radius: 1.0,
            tint_opacity: 0.5,
        }))
    }

    fn raw(shade: u8, delay_ms: Option<u64>) -> RawFrame {
        RawFrame {
            image: RgbaImage::from_pixel(4, 3, Rgba([shade, shade, shade, 255])),
            delay: delay_ms.map(Duration::from_millis),
        }
    }

    /// Hands out canned frame lists and video scripts, one per call.
    #[derive(Default)]
    struct ScriptedDecoder {
        frames: Mutex<VecDeque<LoadResult<Vec<RawFrame>>>>,
        videos: Mutex<VecDeque<Vec<SourcePoll>>>,
    }

    struct ScriptedSource(VecDeque<SourcePoll>);

    impl VideoSource for ScriptedSource {
        fn pull(&mut self, _wait: Duration) -> SourcePoll {
            self.0.pop_front().unwrap_or(SourcePoll::Pending)
        }
    }

    impl MediaDecoder for ScriptedDecoder {
        fn decode_frames(&self, _path: &Path, _kind: MediaKind) -> LoadResult<Vec<RawFrame>> {
            self.frames.lock().unwrap().pop_front().unwrap()
        }

        fn open_video(&self, _path: &Path) -> LoadResult<Box<dyn VideoSource>> {
            let script = self.videos.lock().unwrap().pop_front().unwrap();
            Ok(Box::new(ScriptedSource(script.into())))
        }
    }

    fn loader_with(decoder: ScriptedDecoder) -> MediaLoader {
        MediaLoader::new(Arc::new(decoder), compositor(), Duration::from_secs(10))
            .with_opening_timeout(Duration::from_millis(50))
    }

    fn with_frames(frames: LoadResult<Vec<RawFrame>>) -> MediaLoader {
        let decoder = ScriptedDecoder::default();
        decoder.frames.lock().unwrap().push_back(frames);
        loader_with(decoder)
    }

    fn with_video(script: Vec<SourcePoll>) -> MediaLoader {
        let decoder = ScriptedDecoder::default();
        decoder.videos.lock().unwrap().push_back(script);
        loader_with(decoder)
    }

    /// A video item whose stream yields `frames` frames of `frame_ms` each.
    pub(crate) fn video_item(name: &str, frames: usize, frame_ms: u64) -> MediaItem {
        let mut script: Vec<SourcePoll> = (0..frames)
            .map(|i| SourcePoll::Frame(raw((i * 40) as u8, Some(frame_ms))))
            .collect();
        script.push(SourcePoll::Ended);
        with_video(script)
            .load(Path::new(&format!("{name}.mp4")))
            .unwrap()
    }

    fn durations(item: &MediaItem) -> Vec<Duration> {
        match item.content() {
            MediaContent::Frames(frames) => frames.iter().map(|f| f.duration).collect(),
            MediaContent::Video(_) => panic!("expected frames"),
        }
    }

    #[test]
    fn still_image_lasts_display_time() {
        let item = with_frames(Ok(vec![raw(10, None)]))
            .load(Path::new("a.jpg"))
            .unwrap();
        assert_eq!(durations(&item), vec![Duration::from_secs(10)]);
        assert_eq!(item.opening_frame().dimensions(), (16, 9));
    }

    #[test]
    fn animation_keeps_delays_and_defaults_missing_ones() {
        let item = with_frames(Ok(vec![raw(1, Some(150)), raw(2, None), raw(3, Some(0))]))
            .load(Path::new("a.gif"))
            .unwrap();
        assert_eq!(
            durations(&item),
            vec![
                Duration::from_millis(150),
                DEFAULT_FRAME_DELAY,
                DEFAULT_FRAME_DELAY
            ]
        );
    }

    #[test]
    fn single_frame_animation_acts_like_a_still() {
        let item = with_frames(Ok(vec![raw(1, Some(40))]))
            .load(Path::new("a.gif"))
            .unwrap();
        assert_eq!(durations(&item), vec![Duration::from_secs(10)]);
    }

    #[test]
    fn zero_frames_is_empty_media() {
        let err = with_frames(Ok(Vec::new()))
            .load(Path::new("a.gif"))
            .unwrap_err();
        assert!(matches!(err, LoadError::EmptyMedia(_)));
    }

    #[test]
    fn decoder_errors_pass_through() {
        let err = with_frames(Err(LoadError::decode(Path::new("a.png"), "crc")))
            .load(Path::new("a.png"))
            .unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = loader_with(ScriptedDecoder::default())
            .load(Path::new("a.tiff"))
            .unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat(_)));
    }

    #[test]
    fn video_streams_after_its_opening_frame() {
        let mut item = with_video(vec![
            SourcePoll::Pending,
            SourcePoll::Frame(raw(10, Some(40))),
            SourcePoll::Frame(raw(20, None)),
            SourcePoll::Ended,
        ])
        .load(Path::new("clip.mp4"))
        .unwrap();

        assert_eq!(item.frame_count(), None);
        let MediaContent::Video(stream) = item.content_mut() else {
            panic!("expected video");
        };
        assert_eq!(stream.opening().duration, Duration::from_millis(40));
        match stream.next_frame(Duration::ZERO) {
            StreamPoll::Frame(f) => {
                assert_eq!(f.duration, DEFAULT_VIDEO_FRAME);
                assert_eq!(f.frame.dimensions(), (16, 9));
            }
            _ => panic!("expected a frame"),
        }
        assert!(matches!(stream.next_frame(Duration::ZERO), StreamPoll::Ended));
    }

    #[test]
    fn video_without_frames_is_empty_media() {
        let err = with_video(vec![SourcePoll::Ended])
            .load(Path::new("clip.mov"))
            .unwrap_err();
        assert!(matches!(err, LoadError::EmptyMedia(_)));
    }

    #[test]
    fn stalled_video_times_out_as_decode_error() {
        let err = with_video(Vec::new())
            .load(Path::new("clip.avi"))
            .unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }), "{err}");
    }
}
