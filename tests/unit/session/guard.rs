use super::*;
use crate::foundation::core::{Canvas, Fps, Rgba8};
use crate::record::memory::InMemoryRecorder;
use crate::record::recorder::{RecorderConfig, RecorderEvent};
use crate::session::clock::ManualClock;
use std::sync::mpsc;

struct Fixture {
    clock: Arc<ManualClock>,
    guard: Arc<SessionGuard>,
    recorder: SharedRecorder,
    events: mpsc::Receiver<RecorderEvent>,
    reasons: Arc<Mutex<Vec<StopReason>>>,
}

fn started_recorder() -> (SharedRecorder, mpsc::Receiver<RecorderEvent>) {
    let (tx, rx) = mpsc::channel();
    let mut rec: Box<dyn MediaRecorder> = Box::new(InMemoryRecorder::new());
    rec.start(
        RecorderConfig {
            canvas: Canvas {
                width: 2,
                height: 2,
            },
            fps: Fps::default(),
            background: Rgba8::WHITE,
        },
        tx,
    )
    .unwrap();
    (Arc::new(Mutex::new(rec)), rx)
}

fn fixture(duration_secs: f64) -> Fixture {
    let clock = Arc::new(ManualClock::new());
    let guard = SessionGuard::new(clock.clone(), GuardOpts::default());
    let (recorder, events) = started_recorder();
    let reasons = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reasons);
    guard.start_session(
        duration_secs,
        Arc::clone(&recorder),
        Box::new(move |r| sink.lock().push(r)),
    );
    Fixture {
        clock,
        guard,
        recorder,
        events,
        reasons,
    }
}

fn assert_torn_down(f: &Fixture) {
    assert!(!f.guard.is_session_active());
    assert!(!f.guard.has_pending_animation());
    assert_eq!(f.recorder.lock().state(), RecorderState::Inactive);
    assert_eq!(f.clock.pending_timers(), 0);
}

#[test]
fn timeout_is_duration_plus_grace_capped_by_ceiling() {
    let guard = SessionGuard::new(Arc::new(ManualClock::new()), GuardOpts::default());
    assert_eq!(guard.timeout_for(20.0), Duration::from_millis(25_000));
    assert_eq!(guard.timeout_for(180.0), Duration::from_millis(185_000));
    assert_eq!(guard.timeout_for(10_000.0), Duration::from_millis(185_000));
    assert_eq!(guard.timeout_for(f64::NAN), Duration::from_millis(5_000));
    assert_eq!(guard.timeout_for(f64::INFINITY), Duration::from_millis(185_000));
}

#[test]
fn start_arms_a_recording_session() {
    let f = fixture(20.0);
    assert_eq!(f.guard.state(), SessionState::Recording);
    assert!(f.guard.is_session_active());
    assert_eq!(f.clock.pending_timers(), 1);
}

#[test]
fn end_session_tears_everything_down_once() {
    let f = fixture(20.0);
    let handle = AnimationHandle::new();
    f.guard.register_animation_handle(handle.clone());
    assert!(f.guard.has_pending_animation());

    f.guard.end_session();
    f.guard.end_session();
    f.guard.force_stop(StopReason::Error);

    assert_eq!(f.guard.state(), SessionState::Stopped);
    assert!(handle.is_cancelled());
    assert_torn_down(&f);
    assert!(f.reasons.lock().is_empty());
    let stopped = f
        .events
        .try_iter()
        .filter(|e| matches!(e, RecorderEvent::Stopped(_)))
        .count();
    assert_eq!(stopped, 1);
}

#[test]
fn force_stop_invokes_callback_exactly_once() {
    let f = fixture(20.0);
    f.guard.force_stop(StopReason::Error);
    f.guard.force_stop(StopReason::Timeout);
    f.guard.end_session();

    assert_eq!(*f.reasons.lock(), vec![StopReason::Error]);
    assert_eq!(
        f.guard.state(),
        SessionState::ForceStopped(StopReason::Error)
    );
    assert_torn_down(&f);
}

#[test]
fn timer_forces_timeout_at_duration_plus_grace() {
    let f = fixture(20.0);
    f.clock.advance(Duration::from_millis(24_999));
    assert!(f.guard.is_session_active());
    assert!(f.reasons.lock().is_empty());

    f.clock.advance(Duration::from_millis(1));
    assert_eq!(*f.reasons.lock(), vec![StopReason::Timeout]);
    assert_eq!(
        f.guard.state(),
        SessionState::ForceStopped(StopReason::Timeout)
    );
    assert_torn_down(&f);
}

#[test]
fn stuck_loop_is_stopped_by_the_guard() {
    // The loop keeps re-registering ticks but never ends the session.
    let f = fixture(20.0);
    let mut last = AnimationHandle::new();
    for _ in 0..(30 * 30) {
        if !f.guard.is_session_active() {
            break;
        }
        last = AnimationHandle::new();
        f.guard.register_animation_handle(last.clone());
        f.clock.sleep(Duration::from_millis(33));
    }
    assert_eq!(*f.reasons.lock(), vec![StopReason::Timeout]);
    assert!(last.is_cancelled());
    assert!(f.clock.now() >= Duration::from_millis(25_000));
    assert!(f.clock.now() < Duration::from_millis(25_100));
    assert_torn_down(&f);
}

#[test]
fn reregistering_cancels_the_previous_handle() {
    let f = fixture(20.0);
    let first = AnimationHandle::new();
    let second = AnimationHandle::new();
    f.guard.register_animation_handle(first.clone());
    f.guard.register_animation_handle(second.clone());
    assert!(first.is_cancelled());
    assert!(second.is_pending());
}

#[test]
fn registering_without_session_cancels_immediately() {
    let guard = SessionGuard::new(Arc::new(ManualClock::new()), GuardOpts::default());
    let handle = AnimationHandle::new();
    guard.register_animation_handle(handle.clone());
    assert!(handle.is_cancelled());
    assert!(!guard.has_pending_animation());
    assert_eq!(guard.state(), SessionState::Idle);
}

#[test]
fn restart_tears_down_previous_session_silently() {
    let f = fixture(20.0);
    let (next_recorder, _next_events) = started_recorder();
    let next_reasons = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&next_reasons);
    f.guard.start_session(
        30.0,
        Arc::clone(&next_recorder),
        Box::new(move |r| sink.lock().push(r)),
    );

    assert_eq!(f.recorder.lock().state(), RecorderState::Inactive);
    assert_eq!(next_recorder.lock().state(), RecorderState::Recording);
    assert_eq!(f.clock.pending_timers(), 1);

    // The first session's deadline (25 s) passes without effect; the second fires at 35 s.
    f.clock.advance(Duration::from_secs(26));
    assert!(f.guard.is_session_active());
    assert!(f.reasons.lock().is_empty());
    f.clock.advance(Duration::from_secs(10));
    assert!(f.reasons.lock().is_empty());
    assert_eq!(*next_reasons.lock(), vec![StopReason::Timeout]);
}

#[test]
fn guard_is_reusable_after_force_stop() {
    let f = fixture(20.0);
    f.guard.force_stop(StopReason::Error);
    let (recorder, _events) = started_recorder();
    f.guard
        .start_session(15.0, recorder, Box::new(|_| {}));
    assert_eq!(f.guard.state(), SessionState::Recording);
}

/// Recorder that notes what the guard reports while its `stop` runs.
struct ObservingRecorder {
    guard: Arc<Mutex<Option<Arc<SessionGuard>>>>,
    seen: Arc<Mutex<Option<(Option<StopReason>, SessionState)>>>,
    active: bool,
}

impl MediaRecorder for ObservingRecorder {
    fn state(&self) -> RecorderState {
        if self.active {
            RecorderState::Recording
        } else {
            RecorderState::Inactive
        }
    }

    fn start(
        &mut self,
        _config: RecorderConfig,
        _events: mpsc::Sender<RecorderEvent>,
    ) -> crate::foundation::error::ReelResult<()> {
        self.active = true;
        Ok(())
    }

    fn capture(
        &mut self,
        _frame: &crate::render::backend::FrameRGBA,
    ) -> crate::foundation::error::ReelResult<()> {
        Ok(())
    }

    fn stop(&mut self) {
        self.active = false;
        if let Some(guard) = self.guard.lock().as_ref() {
            *self.seen.lock() = Some((guard.stop_reason(), guard.state()));
        }
    }
}

#[test]
fn stop_reason_is_visible_while_the_recorder_stops() {
    let guard = SessionGuard::new(Arc::new(ManualClock::new()), GuardOpts::default());
    let seen = Arc::new(Mutex::new(None));
    let observing: Box<dyn MediaRecorder> = Box::new(ObservingRecorder {
        guard: Arc::new(Mutex::new(Some(Arc::clone(&guard)))),
        seen: Arc::clone(&seen),
        active: true,
    });
    let recorder: SharedRecorder = Arc::new(Mutex::new(observing));
    guard.start_session(20.0, recorder, Box::new(|_| {}));
    assert_eq!(guard.stop_reason(), None);

    guard.force_stop(StopReason::Timeout);

    assert_eq!(
        *seen.lock(),
        Some((Some(StopReason::Timeout), SessionState::Stopping))
    );
    assert_eq!(guard.stop_reason(), Some(StopReason::Timeout));
    assert!(guard.wait_settled(Duration::ZERO));
}

#[test]
fn stop_reason_resets_on_restart_and_stays_empty_on_normal_end() {
    let f = fixture(20.0);
    f.guard.force_stop(StopReason::Error);
    assert_eq!(f.guard.stop_reason(), Some(StopReason::Error));

    let (recorder, _events) = started_recorder();
    f.guard.start_session(15.0, recorder, Box::new(|_| {}));
    assert_eq!(f.guard.stop_reason(), None);
    f.guard.end_session();
    assert_eq!(f.guard.stop_reason(), None);
    assert_eq!(f.guard.state(), SessionState::Stopped);
}

#[test]
fn wait_settled_blocks_until_a_slow_teardown_finishes() {
    let guard = SessionGuard::new(Arc::new(ManualClock::new()), GuardOpts::default());
    let (recorder, _events) = started_recorder();
    guard.start_session(20.0, Arc::clone(&recorder), Box::new(|_| {}));

    // Hold the recorder so teardown blocks in `stop`.
    let held = recorder.lock();
    let stopper = {
        let guard = Arc::clone(&guard);
        std::thread::spawn(move || guard.force_stop(StopReason::Timeout))
    };
    while guard.state() != SessionState::Stopping {
        std::thread::yield_now();
    }
    assert_eq!(guard.stop_reason(), Some(StopReason::Timeout));
    assert!(!guard.wait_settled(Duration::from_millis(20)));

    drop(held);
    assert!(guard.wait_settled(Duration::from_secs(5)));
    stopper.join().unwrap();
    assert_eq!(
        guard.state(),
        SessionState::ForceStopped(StopReason::Timeout)
    );
}
