use super::*;
use crate::assets::store::PreparedImage;
use crate::foundation::core::{Canvas, Point, Rect, Rgba8};
use crate::record::memory::InMemoryRecorder;
use crate::record::recorder::{MediaRecorder, RecorderKind, RecorderState, check_started};
use crate::render::backend::SurfaceKind;
use crate::render::recording::RecordingSurface;
use crate::render::surface::TextAlign;
use crate::session::clock::{ManualClock, SystemClock, TimerId, TimerTask};
use crate::session::guard::SessionState;
use std::sync::atomic::AtomicUsize;

const SMALL: Canvas = Canvas {
    width: 32,
    height: 32,
};

fn design(duration: f64, items: usize) -> VideoDesign {
    let items = (0..items)
        .map(|i| {
            serde_json::json!({
                "name": format!("item {i}"),
                "content": {"main": "main text", "details": "details text"}
            })
        })
        .collect::<Vec<_>>();
    serde_json::from_value(serde_json::json!({
        "title": "Composer test",
        "duration": duration,
        "canvas": {"width": SMALL.width, "height": SMALL.height},
        "items": items,
    }))
    .unwrap()
}

fn opts(dir: &str) -> ComposerOpts {
    ComposerOpts {
        output_dir: PathBuf::from("target/unit_composer").join(dir),
        persist: false,
        finalize_timeout: Duration::from_millis(200),
        ..ComposerOpts::default()
    }
}

fn memory_composer(opts: ComposerOpts, clock: Arc<dyn Clock>) -> Composer {
    Composer::new(opts, clock, SurfaceKind::Recording, RecorderKind::InMemory)
}

/// Freezes reported time at `limit` while timers keep running on the inner clock.
struct StallingClock {
    inner: ManualClock,
    limit: Duration,
}

impl Clock for StallingClock {
    fn now(&self) -> Duration {
        self.inner.now().min(self.limit)
    }

    fn sleep(&self, d: Duration) {
        self.inner.sleep(d);
    }

    fn schedule(&self, after: Duration, task: TimerTask) -> TimerId {
        self.inner.schedule(after, task)
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.inner.cancel(id)
    }
}

/// Wall-clock timers, but reported time never moves: a loop that stopped advancing.
struct FrozenClock {
    inner: SystemClock,
}

impl Clock for FrozenClock {
    fn now(&self) -> Duration {
        Duration::ZERO
    }

    fn sleep(&self, d: Duration) {
        self.inner.sleep(d);
    }

    fn schedule(&self, after: Duration, task: TimerTask) -> TimerId {
        self.inner.schedule(after, task)
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.inner.cancel(id)
    }
}

/// Recorder whose `stop` blocks before finalizing, like an encoder flushing a file.
struct SlowStopRecorder {
    events: Option<mpsc::Sender<RecorderEvent>>,
    delay: Duration,
}

impl MediaRecorder for SlowStopRecorder {
    fn state(&self) -> RecorderState {
        if self.events.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Inactive
        }
    }

    fn start(&mut self, _config: RecorderConfig, events: mpsc::Sender<RecorderEvent>) -> ReelResult<()> {
        self.events = Some(events);
        Ok(())
    }

    fn capture(&mut self, _frame: &FrameRGBA) -> ReelResult<()> {
        check_started(self.state(), "slow-stop recorder")
    }

    fn stop(&mut self) {
        let Some(events) = self.events.take() else {
            return;
        };
        std::thread::sleep(self.delay);
        let _ = events.send(RecorderEvent::Stopped(RecordedMedia {
            bytes: vec![1, 2, 3],
            mime: "application/octet-stream".to_owned(),
            path: None,
            frames: 1,
        }));
    }
}

/// Recording surface that counts full repaints.
struct CountingSurface {
    inner: RecordingSurface,
    clears: Arc<AtomicUsize>,
}

impl DrawSurface for CountingSurface {
    fn canvas(&self) -> Canvas {
        self.inner.canvas()
    }
    fn clear(&mut self, color: Rgba8) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear(color);
    }
    fn fill_rect(&mut self, rect: Rect, color: Rgba8) {
        self.inner.fill_rect(rect, color);
    }
    fn stroke_rect(&mut self, rect: Rect, width: f64, color: Rgba8) {
        self.inner.stroke_rect(rect, width, color);
    }
    fn fill_circle(&mut self, center: Point, radius: f64, color: Rgba8) {
        self.inner.fill_circle(center, radius, color);
    }
    fn fill_text(
        &mut self,
        text: &str,
        origin: Point,
        size: f64,
        color: Rgba8,
        align: TextAlign,
    ) -> ReelResult<()> {
        self.inner.fill_text(text, origin, size, color, align)
    }
    fn measure_text(&mut self, text: &str, size: f64) -> f64 {
        self.inner.measure_text(text, size)
    }
    fn draw_image(&mut self, rect: Rect, image: &PreparedImage) -> ReelResult<()> {
        self.inner.draw_image(rect, image)
    }
    fn snapshot(&mut self) -> ReelResult<FrameRGBA> {
        self.inner.snapshot()
    }
}

#[test]
fn frame_pacing_math() {
    let fps = Fps::default();
    assert_eq!(frames_due(fps, Duration::ZERO), 1);
    assert_eq!(frames_due(fps, Duration::from_millis(33)), 1);
    assert_eq!(frames_due(fps, Duration::from_millis(34)), 2);
    assert_eq!(frames_due(fps, Duration::from_secs(15)), 451);
    assert_eq!(frame_time(fps, 1), Duration::from_nanos(33_333_334));
    assert_eq!(frame_time(fps, 30), Duration::from_secs(1));
    for n in [1u64, 7, 449, 1000] {
        assert_eq!(frames_due(fps, frame_time(fps, n)), n + 1, "n = {n}");
    }
}

#[test]
fn output_names_are_slugs() {
    assert_eq!(output_name("Best Ramen in Tokyo!"), "best-ramen-in-tokyo");
    assert_eq!(output_name("東京"), "slidereel");
    assert_eq!(output_name("  a  b "), "a-b");
}

#[test]
fn generate_records_the_full_duration() {
    let clock = Arc::new(ManualClock::new());
    let composer = memory_composer(opts("full"), clock.clone());
    let mut progress = Vec::new();

    let rec = composer
        .generate(&design(15.0, 2), |p| progress.push(p))
        .unwrap();

    assert_eq!(rec.frames, 15 * 30);
    assert_eq!(rec.duration_secs, 15.0);
    assert_eq!(rec.mime, crate::record::memory::RAW_RGBA_MIME);
    assert_eq!(rec.bytes.len(), 15 * 30 * SMALL.rgba_len());
    assert!(rec.url.is_none());
    assert_eq!(progress.first(), Some(&0));
    assert_eq!(progress.last(), Some(&100));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));

    // Grace delay after the planned end.
    assert_eq!(clock.now(), Duration::from_millis(15_200));
    assert_eq!(composer.phase(), DriverPhase::Resolved);
    assert_eq!(composer.guard().state(), SessionState::Stopped);
    assert!(!composer.guard().has_pending_animation());
    assert!(!composer.is_generating());
}

#[test]
fn duration_is_clamped_before_timing() {
    let clock = Arc::new(ManualClock::new());
    let composer = memory_composer(opts("clamp"), clock.clone());
    let rec = composer.generate(&design(3.0, 0), |_| {}).unwrap();
    assert_eq!(rec.duration_secs, 15.0);
    assert_eq!(rec.frames, 450);
}

#[test]
fn second_generate_while_running_is_rejected() {
    let clock = Arc::new(ManualClock::new());
    let composer = memory_composer(opts("single_flight"), clock);
    let d = design(15.0, 1);
    let mut nested = None;

    let rec = composer
        .generate(&d, |p| {
            if nested.is_none() && p >= 10 {
                nested = Some(composer.generate(&d, |_| {}));
            }
        })
        .unwrap();

    assert!(matches!(nested, Some(Err(ReelError::AlreadyGenerating))));
    assert_eq!(rec.frames, 450);
    assert_eq!(composer.phase(), DriverPhase::Resolved);
}

#[test]
fn stalled_progress_is_ended_by_the_timeout() {
    let clock = Arc::new(StallingClock {
        inner: ManualClock::new(),
        limit: Duration::from_secs(8),
    });
    let composer = memory_composer(opts("stall"), clock.clone());
    let mut last = 0;

    let err = composer
        .generate(&design(20.0, 3), |p| last = p)
        .unwrap_err();

    assert_eq!(err.stop_reason(), Some(StopReason::Timeout));
    assert_eq!(last, 40);
    assert!(clock.inner.now() >= Duration::from_millis(25_000));
    assert!(clock.inner.now() < Duration::from_millis(25_100));
    assert_eq!(
        composer.guard().state(),
        SessionState::ForceStopped(StopReason::Timeout)
    );
    assert!(!composer.guard().has_pending_animation());
    assert_eq!(composer.phase(), DriverPhase::Errored);
    assert!(!composer.is_generating());
}

#[test]
fn timeout_during_slow_recorder_stop_is_still_an_error() {
    let mut o = opts("slow_stop");
    o.guard = GuardOpts {
        grace: Duration::from_millis(100),
        max_session: Duration::from_millis(300),
    };
    o.finalize_timeout = Duration::from_secs(5);
    let recorders = |_stem: &Path| -> ReelResult<Box<dyn MediaRecorder>> {
        Ok(Box::new(SlowStopRecorder {
            events: None,
            delay: Duration::from_millis(400),
        }))
    };
    let composer = Composer::new(
        o,
        Arc::new(FrozenClock {
            inner: SystemClock::new(),
        }),
        SurfaceKind::Recording,
        recorders,
    );

    let err = composer.generate(&design(15.0, 1), |_| {}).unwrap_err();

    assert_eq!(err.stop_reason(), Some(StopReason::Timeout));
    // Teardown has finished by the time the caller sees the error.
    assert_eq!(
        composer.guard().state(),
        SessionState::ForceStopped(StopReason::Timeout)
    );
    assert!(!composer.guard().has_pending_animation());
    assert_eq!(composer.phase(), DriverPhase::Errored);
    assert!(!composer.is_generating());
}

#[test]
fn capture_failure_force_stops_with_error() {
    let clock = Arc::new(ManualClock::new());
    let recorders = |_stem: &Path| -> ReelResult<Box<dyn MediaRecorder>> {
        Ok(Box::new(InMemoryRecorder::new().fail_after(10)))
    };
    let composer = Composer::new(opts("capture_fail"), clock, SurfaceKind::Recording, recorders);

    let err = composer.generate(&design(15.0, 1), |_| {}).unwrap_err();
    assert!(matches!(err, ReelError::Recorder(_)));
    assert_eq!(
        composer.guard().state(),
        SessionState::ForceStopped(StopReason::Error)
    );
    assert_eq!(composer.phase(), DriverPhase::Errored);
}

#[test]
fn surface_setup_failure_rejects_before_recording() {
    let clock = Arc::new(ManualClock::new());
    let surfaces = |_canvas: Canvas| -> ReelResult<Box<dyn DrawSurface>> {
        Err(ReelError::setup("no surface"))
    };
    let composer = Composer::new(opts("setup_fail"), clock, surfaces, RecorderKind::InMemory);

    let err = composer.generate(&design(15.0, 1), |_| {}).unwrap_err();
    assert!(matches!(err, ReelError::Setup(_)));
    assert_eq!(composer.guard().state(), SessionState::Idle);
    assert_eq!(composer.phase(), DriverPhase::Errored);
    assert!(!composer.is_generating());
}

#[test]
fn invalid_design_is_rejected() {
    let composer = memory_composer(opts("invalid"), Arc::new(ManualClock::new()));
    let mut d = design(15.0, 1);
    d.title = "  ".to_owned();
    assert!(matches!(
        composer.generate(&d, |_| {}),
        Err(ReelError::Validation(_))
    ));
}

#[test]
fn missing_finalize_event_times_out() {
    let clock = Arc::new(ManualClock::new());
    let recorders = |_stem: &Path| -> ReelResult<Box<dyn MediaRecorder>> {
        Ok(Box::new(InMemoryRecorder::new().without_finalize()))
    };
    let mut o = opts("no_finalize");
    o.finalize_timeout = Duration::from_millis(20);
    let composer = Composer::new(o, clock, SurfaceKind::Recording, recorders);

    let err = composer.generate(&design(15.0, 0), |_| {}).unwrap_err();
    assert!(err.to_string().contains("did not finalize"));
    assert_eq!(composer.guard().state(), SessionState::Stopped);
}

#[test]
fn static_frame_elision_repaints_once_per_slide() {
    let run = |elide: bool| {
        let clears = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&clears);
        let surfaces = move |canvas: Canvas| -> ReelResult<Box<dyn DrawSurface>> {
            Ok(Box::new(CountingSurface {
                inner: RecordingSurface::new(canvas),
                clears: Arc::clone(&counter),
            }))
        };
        let mut o = opts("elision");
        o.static_frame_elision = elide;
        let composer = Composer::new(
            o,
            Arc::new(ManualClock::new()),
            surfaces,
            RecorderKind::InMemory,
        );
        let rec = composer.generate(&design(15.0, 3), |_| {}).unwrap();
        (clears.load(Ordering::SeqCst), rec)
    };

    let (elided, a) = run(true);
    let (full, b) = run(false);
    assert_eq!(elided, 11);
    assert!(full > 400);
    assert_eq!(a.frames, b.frames);
    assert_eq!(a.bytes, b.bytes);
}

#[test]
fn recording_is_persisted_with_file_url() {
    let mut o = opts("persist");
    o.persist = true;
    let composer = memory_composer(o, Arc::new(ManualClock::new()));
    let rec = composer.generate(&design(15.0, 0), |_| {}).unwrap();

    let path = rec.path.clone().unwrap();
    assert!(path.ends_with("composer-test.bin"));
    assert_eq!(std::fs::read(&path).unwrap().len(), rec.bytes.len());
    let url = rec.url.unwrap();
    assert_eq!(url.scheme(), "file");
    assert!(url.path().ends_with("/composer-test.bin"));
    assert!(rec.size.ends_with("KB") || rec.size.ends_with("MB"));
}

#[test]
fn spawn_generate_claims_synchronously() {
    let composer = Arc::new(memory_composer(
        opts("spawn"),
        Arc::new(ManualClock::new()),
    ));
    let pending = composer.spawn_generate(design(15.0, 1)).unwrap();
    let second = composer.spawn_generate(design(15.0, 1));
    let rec = pending.wait().unwrap();

    // Either the worker was still running (rejected) or had already finished (accepted).
    match second {
        Err(e) => assert!(matches!(e, ReelError::AlreadyGenerating)),
        Ok(p) => {
            p.wait().unwrap();
        }
    }
    assert_eq!(rec.frames, 450);
    assert!(!composer.is_generating());
}

#[test]
fn spawn_generate_reports_progress() {
    let composer = Arc::new(memory_composer(
        opts("spawn_progress"),
        Arc::new(ManualClock::new()),
    ));
    let pending = composer.spawn_generate(design(15.0, 0)).unwrap();
    let mut seen = Vec::new();
    while let Ok(p) = pending.progress().recv_timeout(Duration::from_secs(10)) {
        seen.push(p);
        if p == 100 {
            break;
        }
    }
    let rec = pending.wait().unwrap();
    assert_eq!(seen.last(), Some(&100));
    assert_eq!(rec.frames, 450);
}
