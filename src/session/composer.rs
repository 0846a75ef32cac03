use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use parking_lot::Mutex;

use crate::assets::store::{ImageSource, ImageStore, NoImages};
use crate::design::model::VideoDesign;
use crate::foundation::core::Fps;
use crate::foundation::error::{ReelError, ReelResult, StopReason};
use crate::record::ffmpeg::ensure_parent_dir;
use crate::record::recorder::{
    RecordedMedia, RecorderConfig, RecorderEvent, RecorderFactory, format_size,
};
use crate::render::backend::{FrameRGBA, SurfaceFactory};
use crate::render::frame::{SlideStyle, render_slide};
use crate::render::surface::DrawSurface;
use crate::session::clock::{AnimationHandle, Clock};
use crate::session::guard::{GuardOpts, SessionGuard, SharedRecorder};
use crate::template::layout::SlideLayout;
use crate::template::plan::{SlidePlan, SubSlidePolicy, compute_slide_plan};

/// Options for [`Composer`].
#[derive(Clone, Debug)]
pub struct ComposerOpts {
    /// Capture rate of the recorded stream.
    pub fps: Fps,
    pub guard: GuardOpts,
    /// Delay between reaching the planned duration and ending the session.
    pub stop_grace: Duration,
    /// How long to wait for the recorder's finalize event after the session ends.
    pub finalize_timeout: Duration,
    pub sub_slides: SubSlidePolicy,
    pub style: SlideStyle,
    /// Reuse the last snapshot while the active slide is unchanged instead of repainting.
    pub static_frame_elision: bool,
    /// Root for relative image references in designs. `None` always draws placeholders.
    pub assets_root: Option<PathBuf>,
    /// Where recordings are written.
    pub output_dir: PathBuf,
    /// Write the payload under `output_dir` when the recorder did not already write a file.
    pub persist: bool,
}

impl Default for ComposerOpts {
    fn default() -> Self {
        Self {
            fps: Fps::default(),
            guard: GuardOpts::default(),
            stop_grace: Duration::from_millis(200),
            finalize_timeout: Duration::from_secs(30),
            sub_slides: SubSlidePolicy::default(),
            style: SlideStyle::default(),
            static_frame_elision: false,
            assets_root: None,
            output_dir: std::env::temp_dir().join("slidereel"),
            persist: true,
        }
    }
}

/// Driver state, as observed through [`Composer::phase`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverPhase {
    Idle,
    Initializing,
    Recording,
    Finalizing,
    Resolved,
    Errored,
}

/// A finished recording.
#[derive(Clone, Debug, PartialEq)]
pub struct Recording {
    pub bytes: Vec<u8>,
    /// `file://` URL of the persisted output.
    pub url: Option<url::Url>,
    /// Human-readable size, e.g. `"1.23 MB"`.
    pub size: String,
    pub mime: String,
    pub path: Option<PathBuf>,
    /// Frames captured from the surface.
    pub frames: u64,
    /// Effective (clamped) duration the recording was timed against.
    pub duration_secs: f64,
}

/// Handle to a generation running on a worker thread.
#[derive(Debug)]
pub struct PendingRecording {
    progress: Receiver<u8>,
    handle: std::thread::JoinHandle<ReelResult<Recording>>,
}

impl PendingRecording {
    /// Progress percentages reported so far (non-blocking iteration via `try_iter`).
    pub fn progress(&self) -> &Receiver<u8> {
        &self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the recording resolves.
    pub fn wait(self) -> ReelResult<Recording> {
        self.handle
            .join()
            .map_err(|_| ReelError::render("generation thread panicked"))?
    }
}

/// Composition/Recording Driver.
///
/// Turns a [`VideoDesign`] into a recording: plans the slides, starts the recorder, then repaints
/// the active slide once per frame interval until the planned duration has elapsed. All teardown
/// goes through the [`SessionGuard`]. One generation runs at a time per composer.
pub struct Composer {
    opts: ComposerOpts,
    clock: Arc<dyn Clock>,
    surfaces: Box<dyn SurfaceFactory>,
    recorders: Box<dyn RecorderFactory>,
    guard: Arc<SessionGuard>,
    busy: AtomicBool,
    phase: Mutex<DriverPhase>,
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("opts", &self.opts)
            .field("phase", &self.phase())
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

/// Clears the single-flight flag when a generation ends, however it ends.
struct BusyRelease<'a>(&'a AtomicBool);

impl Drop for BusyRelease<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Everything the tick loop mutates.
struct Run<'a> {
    plan: SlidePlan,
    layout: SlideLayout,
    surface: Box<dyn DrawSurface>,
    images: Box<dyn ImageSource>,
    recorder: SharedRecorder,
    events: &'a Receiver<RecorderEvent>,
    total: Duration,
    total_frames: u64,
    frames_pushed: u64,
    last_index: Option<usize>,
    last_frame: Option<FrameRGBA>,
    early_media: Option<RecordedMedia>,
}

impl Composer {
    pub fn new(
        opts: ComposerOpts,
        clock: Arc<dyn Clock>,
        surfaces: impl SurfaceFactory + 'static,
        recorders: impl RecorderFactory + 'static,
    ) -> Self {
        let guard = SessionGuard::new(Arc::clone(&clock), opts.guard);
        Self {
            opts,
            clock,
            surfaces: Box::new(surfaces),
            recorders: Box::new(recorders),
            guard,
            busy: AtomicBool::new(false),
            phase: Mutex::new(DriverPhase::Idle),
        }
    }

    pub fn opts(&self) -> &ComposerOpts {
        &self.opts
    }

    pub fn phase(&self) -> DriverPhase {
        *self.phase.lock()
    }

    pub fn guard(&self) -> &Arc<SessionGuard> {
        &self.guard
    }

    pub fn is_generating(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Record `design`, blocking until the recorder has finalized.
    ///
    /// `on_progress` receives the percent complete (0..=100) on every tick. A call made while
    /// another generation is in flight fails with [`ReelError::AlreadyGenerating`] and has no
    /// effect on it.
    #[tracing::instrument(skip_all, fields(title = %design.title))]
    pub fn generate(
        &self,
        design: &VideoDesign,
        mut on_progress: impl FnMut(u8),
    ) -> ReelResult<Recording> {
        self.claim()?;
        let _release = BusyRelease(&self.busy);
        self.run_claimed(design, &mut on_progress)
    }

    /// Start recording `design` on a worker thread.
    ///
    /// The single-flight check happens before this returns.
    pub fn spawn_generate(self: &Arc<Self>, design: VideoDesign) -> ReelResult<PendingRecording> {
        self.claim()?;
        let (tx, progress) = mpsc::channel();
        let composer = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("slidereel-compose".to_owned())
            .spawn(move || {
                let _release = BusyRelease(&composer.busy);
                composer.run_claimed(&design, &mut |p| {
                    let _ = tx.send(p);
                })
            });
        match spawned {
            Ok(handle) => Ok(PendingRecording { progress, handle }),
            Err(e) => {
                self.busy.store(false, Ordering::Release);
                Err(ReelError::setup(format!("spawn generation thread: {e}")))
            }
        }
    }

    fn claim(&self) -> ReelResult<()> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ReelError::AlreadyGenerating)
    }

    fn set_phase(&self, phase: DriverPhase) {
        *self.phase.lock() = phase;
    }

    fn run_claimed(
        &self,
        design: &VideoDesign,
        on_progress: &mut dyn FnMut(u8),
    ) -> ReelResult<Recording> {
        self.set_phase(DriverPhase::Initializing);
        let result = self.run(design, on_progress);
        match &result {
            Ok(rec) => {
                self.set_phase(DriverPhase::Resolved);
                tracing::info!(size = %rec.size, frames = rec.frames, "recording resolved");
            }
            Err(e) => {
                self.set_phase(DriverPhase::Errored);
                tracing::warn!(error = %e, "recording failed");
            }
        }
        result
    }

    fn run(
        &self,
        design: &VideoDesign,
        on_progress: &mut dyn FnMut(u8),
    ) -> ReelResult<Recording> {
        design.validate()?;
        let duration_secs = design.effective_duration_secs();
        let fps = self.opts.fps;
        let canvas = design.canvas;

        // Setup: failures here reject before any session exists.
        let plan = compute_slide_plan(design, duration_secs, self.opts.sub_slides);
        let surface = self.surfaces.create_surface(canvas)?;
        let images: Box<dyn ImageSource> = match &self.opts.assets_root {
            Some(root) => Box::new(ImageStore::new(root.clone())),
            None => Box::new(NoImages),
        };
        let stem = self.opts.output_dir.join(output_name(&design.title));
        let mut recorder = self.recorders.create_recorder(&stem)?;
        let (tx, events) = mpsc::channel();
        recorder.start(
            RecorderConfig {
                canvas,
                fps,
                background: self.opts.style.theme.background,
            },
            tx,
        )?;
        let recorder: SharedRecorder = Arc::new(Mutex::new(recorder));

        self.guard.start_session(
            duration_secs,
            Arc::clone(&recorder),
            Box::new(|reason| tracing::debug!(reason = reason.code(), "session force-stopped")),
        );
        self.set_phase(DriverPhase::Recording);

        let total = Duration::from_secs_f64(duration_secs);
        let mut run = Run {
            layout: SlideLayout::for_canvas(canvas),
            plan,
            surface,
            images,
            recorder,
            events: &events,
            total,
            total_frames: frames_due(fps, total).saturating_sub(1).max(1),
            frames_pushed: 0,
            last_index: None,
            last_frame: None,
            early_media: None,
        };
        tracing::info!(
            slides = run.plan.len(),
            duration_secs,
            slide_secs = run.plan.slide_duration_secs(),
            "recording started"
        );

        let driven = self.drive(&mut run, on_progress);
        // A force stop may still be tearing down; its reason wins over whatever the loop saw.
        self.check_forced()?;
        if let Err(e) = driven {
            self.guard.force_stop(StopReason::Error);
            self.guard.wait_settled(self.opts.finalize_timeout);
            return Err(e);
        }

        self.set_phase(DriverPhase::Finalizing);
        let media = match run.early_media.take() {
            Some(media) => Ok(media),
            None => self.await_finalize(&events),
        };
        self.check_forced()?;
        self.resolve(media?, &stem, duration_secs)
    }

    /// Fail with the guard's force-stop reason, after its teardown has finished.
    fn check_forced(&self) -> ReelResult<()> {
        match self.guard.stop_reason() {
            Some(reason) => {
                if !self.guard.wait_settled(self.opts.finalize_timeout) {
                    tracing::warn!(
                        reason = reason.code(),
                        "force-stop teardown still running after finalize timeout"
                    );
                }
                Err(ReelError::ForceStopped(reason))
            }
            None => Ok(()),
        }
    }

    /// The tick loop. Returns once the session is no longer active.
    fn drive(&self, run: &mut Run<'_>, on_progress: &mut dyn FnMut(u8)) -> ReelResult<()> {
        let fps = self.opts.fps;
        let start = self.clock.now();
        let mut handle = AnimationHandle::new();
        self.guard.register_animation_handle(handle.clone());

        loop {
            if !handle.fire() || !self.guard.is_session_active() {
                return Ok(());
            }
            let elapsed = self.clock.now().saturating_sub(start);
            self.tick(run, elapsed)?;
            on_progress(percent(elapsed, run.total));

            if elapsed >= run.total {
                // Let the last frame land before the stop signal.
                self.clock.sleep(self.opts.stop_grace);
                self.guard.end_session();
                return Ok(());
            }

            handle = AnimationHandle::new();
            self.guard.register_animation_handle(handle.clone());
            let next = if run.frames_pushed >= run.total_frames {
                run.total
            } else {
                frame_time(fps, run.frames_pushed)
            };
            self.clock.sleep(next.saturating_sub(elapsed));
        }
    }

    fn tick(&self, run: &mut Run<'_>, elapsed: Duration) -> ReelResult<()> {
        self.drain_events(run)?;

        let active = run.plan.slide_at(elapsed.as_secs_f64());
        let reuse = self.opts.static_frame_elision && run.last_index == Some(active.index);
        if run.last_index != Some(active.index) {
            tracing::debug!(
                slide = active.index,
                kind = ?active.kind(),
                sub_index = active.sub_index(),
                elapsed_ms = elapsed.as_millis() as u64,
                "slide change"
            );
        }
        let frame = match (&run.last_frame, reuse) {
            (Some(frame), true) => frame.clone(),
            _ => {
                render_slide(
                    run.surface.as_mut(),
                    &run.layout,
                    active.slide,
                    &self.opts.style,
                    run.images.as_mut(),
                )?;
                run.surface.snapshot()?
            }
        };
        run.last_index = Some(active.index);

        let due = frames_due(self.opts.fps, elapsed).min(run.total_frames);
        {
            let mut recorder = run.recorder.lock();
            while run.frames_pushed < due {
                recorder.capture(&frame)?;
                run.frames_pushed += 1;
            }
        }
        if self.opts.static_frame_elision {
            run.last_frame = Some(frame);
        }
        Ok(())
    }

    /// Surface recorder errors raised while capturing.
    fn drain_events(&self, run: &mut Run<'_>) -> ReelResult<()> {
        for event in run.events.try_iter() {
            match event {
                RecorderEvent::Chunk { bytes } => {
                    tracing::trace!(bytes = bytes.len(), "recorder chunk");
                }
                RecorderEvent::Stopped(media) => run.early_media = Some(media),
                RecorderEvent::Error(msg) => return Err(ReelError::recorder(msg)),
            }
        }
        Ok(())
    }

    fn await_finalize(&self, events: &Receiver<RecorderEvent>) -> ReelResult<RecordedMedia> {
        loop {
            match events.recv_timeout(self.opts.finalize_timeout) {
                Ok(RecorderEvent::Chunk { .. }) => continue,
                Ok(RecorderEvent::Stopped(media)) => return Ok(media),
                Ok(RecorderEvent::Error(msg)) => return Err(ReelError::recorder(msg)),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(ReelError::recorder(format!(
                        "recorder did not finalize within {} ms",
                        self.opts.finalize_timeout.as_millis()
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ReelError::recorder(
                        "recorder closed its event channel without finalizing",
                    ));
                }
            }
        }
    }

    fn resolve(
        &self,
        media: RecordedMedia,
        stem: &Path,
        duration_secs: f64,
    ) -> ReelResult<Recording> {
        let path = match media.path.clone() {
            Some(path) => Some(path),
            None if self.opts.persist => {
                let path = stem.with_extension(media.extension());
                ensure_parent_dir(&path)?;
                std::fs::write(&path, &media.bytes)
                    .with_context(|| format!("write recording '{}'", path.display()))?;
                Some(path)
            }
            None => None,
        };
        let url = path.as_deref().map(file_url).transpose()?;

        Ok(Recording {
            size: format_size(media.bytes.len() as u64),
            bytes: media.bytes,
            url,
            mime: media.mime,
            path,
            frames: media.frames,
            duration_secs,
        })
    }
}

fn file_url(path: &Path) -> ReelResult<url::Url> {
    let abs = std::path::absolute(path)
        .with_context(|| format!("resolve absolute path of '{}'", path.display()))?;
    url::Url::from_file_path(&abs)
        .map_err(|()| ReelError::validation(format!("'{}' is not a valid file URL", abs.display())))
}

/// Frames a fixed-rate capture has produced by `elapsed`: `floor(elapsed × fps) + 1`.
pub(crate) fn frames_due(fps: Fps, elapsed: Duration) -> u64 {
    let num = u128::from(fps.num);
    let den = u128::from(fps.den) * 1_000_000_000;
    (elapsed.as_nanos() * num / den) as u64 + 1
}

/// Capture time of frame `n`, rounded up to whole nanoseconds.
pub(crate) fn frame_time(fps: Fps, n: u64) -> Duration {
    let num = u128::from(fps.num);
    let nanos = (u128::from(n) * u128::from(fps.den) * 1_000_000_000).div_ceil(num);
    Duration::from_nanos(nanos.min(u128::from(u64::MAX)) as u64)
}

fn percent(elapsed: Duration, total: Duration) -> u8 {
    if total.is_zero() {
        return 100;
    }
    ((elapsed.as_secs_f64() / total.as_secs_f64()) * 100.0)
        .floor()
        .clamp(0.0, 100.0) as u8
}

/// File name stem derived from the design title.
pub(crate) fn output_name(title: &str) -> String {
    let mut out = String::new();
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    let out = out.trim_end_matches('-');
    if out.is_empty() {
        "slidereel".to_owned()
    } else {
        out.chars().take(64).collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/composer.rs"]
mod tests;
