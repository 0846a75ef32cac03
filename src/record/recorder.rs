use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use crate::foundation::core::{Canvas, Fps, Rgba8};
use crate::foundation::error::{ReelError, ReelResult};
use crate::record::ffmpeg::{FfmpegRecorder, FfmpegRecorderOpts};
use crate::record::gif::GifRecorder;
use crate::record::memory::InMemoryRecorder;
use crate::render::backend::FrameRGBA;

/// Whether a recorder is currently capturing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    Inactive,
    Recording,
}

/// Stream parameters handed to [`MediaRecorder::start`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecorderConfig {
    pub canvas: Canvas,
    pub fps: Fps,
    /// Color used to flatten transparency for formats without alpha.
    pub background: Rgba8,
}

/// The finalized payload of a recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedMedia {
    pub bytes: Vec<u8>,
    pub mime: String,
    /// Where the recorder already wrote the payload, if it writes files itself.
    pub path: Option<PathBuf>,
    /// Frames captured from the stream (before any encoder-side merging).
    pub frames: u64,
}

impl RecordedMedia {
    pub fn size_description(&self) -> String {
        format_size(self.bytes.len() as u64)
    }

    /// File extension matching [`RecordedMedia::mime`].
    pub fn extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/gif" => "gif",
            "video/mp4" => "mp4",
            "video/webm" => "webm",
            _ => "bin",
        }
    }
}

/// Notifications emitted by a recorder while it runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecorderEvent {
    /// Incremental encoded data.
    Chunk { bytes: Vec<u8> },
    /// Encoding finished; carries the complete payload. Sent at most once per `start`.
    Stopped(RecordedMedia),
    /// The recorder failed and will not emit `Stopped`.
    Error(String),
}

/// A frame-stream recorder.
///
/// `start` begins a stream, `capture` receives frames in stream order, and `stop` finalizes it.
/// Completion is reported only through the event channel, never from `stop` itself.
pub trait MediaRecorder: Send {
    fn state(&self) -> RecorderState;

    fn start(&mut self, config: RecorderConfig, events: Sender<RecorderEvent>) -> ReelResult<()>;

    fn capture(&mut self, frame: &FrameRGBA) -> ReelResult<()>;

    /// Finalize the stream. Calling it on an inactive recorder is a no-op.
    fn stop(&mut self);
}

/// Built-in recorder implementations.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecorderKind {
    /// Animated GIF, encoded in-process.
    #[default]
    Gif,
    /// H.264 MP4 through the system `ffmpeg`.
    Ffmpeg(FfmpegRecorderOpts),
    /// Raw frames kept in memory.
    InMemory,
}

impl RecorderKind {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Ffmpeg(_) => "mp4",
            Self::InMemory => "bin",
        }
    }
}

/// Creates the recorder for a generation run.
///
/// `output_stem` is the run's suggested output location without extension; recorders that write
/// files themselves may use it.
pub trait RecorderFactory: Send + Sync {
    fn create_recorder(&self, output_stem: &Path) -> ReelResult<Box<dyn MediaRecorder>>;
}

impl RecorderFactory for RecorderKind {
    fn create_recorder(&self, output_stem: &Path) -> ReelResult<Box<dyn MediaRecorder>> {
        Ok(match self {
            Self::Gif => Box::new(GifRecorder::new()),
            Self::Ffmpeg(opts) => {
                let mut opts = opts.clone();
                if opts.out_path.is_none() {
                    opts.out_path = Some(output_stem.with_extension("mp4"));
                }
                Box::new(FfmpegRecorder::new(opts))
            }
            Self::InMemory => Box::new(InMemoryRecorder::new()),
        })
    }
}

impl<F> RecorderFactory for F
where
    F: Fn(&Path) -> ReelResult<Box<dyn MediaRecorder>> + Send + Sync,
{
    fn create_recorder(&self, output_stem: &Path) -> ReelResult<Box<dyn MediaRecorder>> {
        self(output_stem)
    }
}

/// Human-readable byte size with two decimals, in binary units (`"1.50 KB"`, `"2.00 MB"`).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

pub(crate) fn check_started(state: RecorderState, name: &str) -> ReelResult<()> {
    match state {
        RecorderState::Recording => Ok(()),
        RecorderState::Inactive => Err(ReelError::recorder(format!("{name} is not recording"))),
    }
}
