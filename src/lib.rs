//! Slidereel turns a "video design" document into a recorded slideshow.
//!
//! A design (title, ordered items, target duration) is planned into a fixed sequence of timed
//! slides, painted frame by frame onto a drawing surface, and captured by a recorder:
//!
//! - Load and validate a [`VideoDesign`]
//! - Create a [`Composer`] with a [`Clock`], a surface factory and a recorder factory
//! - Call [`Composer::generate`] (or [`Composer::spawn_generate`]) to get a [`Recording`]
//!
//! Every session is bounded by a [`SessionGuard`], which force-stops runs that exceed their
//! planned duration plus a grace period.
#![forbid(unsafe_code)]

mod foundation;

/// Optional still images for slide image regions.
pub mod assets;
/// Studio configuration.
pub mod config;
/// Video design boundary model.
pub mod design;
/// Frame-stream recorders.
pub mod record;
/// Drawing surfaces and slide painting.
pub mod render;
/// Timed recording sessions.
pub mod session;
/// Slide plan and layout.
pub mod template;

pub use crate::foundation::core::{Canvas, Fps, MAX_CANVAS_SIDE, Point, Rect, Rgba8};
pub use crate::foundation::error::{ReelError, ReelResult, StopReason};

pub use crate::assets::store::{ImageSource, ImageStore, NoImages, PreparedImage};
pub use crate::config::StudioConfig;
pub use crate::design::model::{
    DEFAULT_DURATION_SECS, Item, ItemContent, MAX_DURATION_SECS, MIN_DURATION_SECS, VideoDesign,
    clamp_duration,
};
pub use crate::record::ffmpeg::{FfmpegRecorder, FfmpegRecorderOpts};
pub use crate::record::gif::GifRecorder;
pub use crate::record::memory::InMemoryRecorder;
pub use crate::record::recorder::{
    MediaRecorder, RecordedMedia, RecorderConfig, RecorderEvent, RecorderFactory, RecorderKind,
    RecorderState, format_size,
};
pub use crate::render::backend::{FrameRGBA, SurfaceFactory, SurfaceKind};
pub use crate::render::cpu::{CpuSurface, CpuSurfaceOpts};
pub use crate::render::frame::{SlideCopy, SlideStyle, Theme, render_slide};
pub use crate::render::recording::{DrawOp, RecordingSurface};
pub use crate::render::surface::{DrawSurface, TextAlign};
pub use crate::render::text::WrapStrategy;
pub use crate::session::clock::{AnimationHandle, Clock, ManualClock, SystemClock, TimerId};
pub use crate::session::composer::{
    Composer, ComposerOpts, DriverPhase, PendingRecording, Recording,
};
pub use crate::session::guard::{GuardOpts, SessionGuard, SessionState};
pub use crate::template::layout::SlideLayout;
pub use crate::template::plan::{
    ActiveSlide, ItemPart, Slide, SlideContent, SlideKind, SlidePlan, SubSlidePolicy,
    compute_slide_plan,
};
