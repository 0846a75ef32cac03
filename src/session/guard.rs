use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::foundation::error::StopReason;
use crate::record::recorder::{MediaRecorder, RecorderState};
use crate::session::clock::{AnimationHandle, Clock, TimerId};

/// Recorder shared between the render loop (capture) and the guard (teardown).
pub type SharedRecorder = Arc<Mutex<Box<dyn MediaRecorder>>>;

/// Invoked once when a session is force-stopped.
pub type ForceStopCallback = Box<dyn FnOnce(StopReason) + Send + 'static>;

/// Timing limits enforced by [`SessionGuard`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuardOpts {
    /// Added to the planned duration before the timeout fires.
    pub grace: Duration,
    /// Absolute ceiling for any session.
    pub max_session: Duration,
}

impl Default for GuardOpts {
    fn default() -> Self {
        Self {
            grace: Duration::from_millis(5_000),
            max_session: Duration::from_millis(185_000),
        }
    }
}

/// Lifecycle of the guarded session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Recording,
    /// Teardown in progress.
    Stopping,
    Stopped,
    /// Terminal until the next [`SessionGuard::start_session`], which is the reset point; there is
    /// no separate transition back to `Idle`.
    ForceStopped(StopReason),
}

#[derive(Default)]
struct Teardown {
    timer: Option<TimerId>,
    animation: Option<AnimationHandle>,
    recorder: Option<SharedRecorder>,
}

impl Teardown {
    /// Cancel the timer, cancel the pending tick, then stop the recorder if it is still capturing.
    fn run(self, clock: &dyn Clock) {
        if let Some(id) = self.timer {
            clock.cancel(id);
        }
        if let Some(handle) = self.animation {
            handle.cancel();
        }
        if let Some(recorder) = self.recorder {
            let mut recorder = recorder.lock();
            if recorder.state() == RecorderState::Recording {
                recorder.stop();
            }
        }
    }
}

struct Inner {
    state: SessionState,
    generation: u64,
    timer: Option<TimerId>,
    animation: Option<AnimationHandle>,
    recorder: Option<SharedRecorder>,
    on_force_stop: Option<ForceStopCallback>,
    /// Set under the lock before teardown starts, so it is visible while the recorder stops.
    forced: Option<StopReason>,
}

impl Inner {
    fn take_teardown(&mut self) -> Teardown {
        Teardown {
            timer: self.timer.take(),
            animation: self.animation.take(),
            recorder: self.recorder.take(),
        }
    }
}

/// Recording Session Guard.
///
/// Bounds every session with a wall-clock timeout and owns the only teardown path: whatever ends a
/// session (normal completion, a failure, or the timeout) cancels the timer and the pending
/// animation tick and stops the recorder. Teardown is idempotent.
///
/// Callbacks and recorder calls happen outside the guard's lock.
pub struct SessionGuard {
    clock: Arc<dyn Clock>,
    opts: GuardOpts,
    inner: Mutex<Inner>,
    /// Notified whenever a teardown leaves `Stopping`.
    settled: Condvar,
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("opts", &self.opts)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionGuard {
    pub fn new(clock: Arc<dyn Clock>, opts: GuardOpts) -> Arc<Self> {
        Arc::new(Self {
            clock,
            opts,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                generation: 0,
                timer: None,
                animation: None,
                recorder: None,
                on_force_stop: None,
                forced: None,
            }),
            settled: Condvar::new(),
        })
    }

    pub fn opts(&self) -> GuardOpts {
        self.opts
    }

    /// `min(duration + grace, max_session)`.
    pub fn timeout_for(&self, duration_secs: f64) -> Duration {
        let planned = Duration::try_from_secs_f64(duration_secs.max(0.0))
            .unwrap_or(self.opts.max_session);
        planned.saturating_add(self.opts.grace).min(self.opts.max_session)
    }

    /// Arm the guard for a new session and return its timeout.
    ///
    /// A session that is still active is torn down first, without invoking its callback.
    #[tracing::instrument(skip(self, recorder, on_force_stop))]
    pub fn start_session(
        self: &Arc<Self>,
        duration_secs: f64,
        recorder: SharedRecorder,
        on_force_stop: ForceStopCallback,
    ) -> Duration {
        let (previous, generation) = {
            let mut inner = self.inner.lock();
            let previous = match inner.state {
                SessionState::Recording | SessionState::Stopping => {
                    tracing::warn!("restarting guard while a session is active");
                    inner.on_force_stop = None;
                    Some(inner.take_teardown())
                }
                _ => None,
            };
            inner.generation += 1;
            inner.state = SessionState::Recording;
            inner.forced = None;
            inner.recorder = Some(recorder);
            inner.on_force_stop = Some(on_force_stop);
            (previous, inner.generation)
        };
        if let Some(previous) = previous {
            previous.run(self.clock.as_ref());
        }

        let timeout = self.timeout_for(duration_secs);
        let weak: Weak<Self> = Arc::downgrade(self);
        let timer = self.clock.schedule(
            timeout,
            Box::new(move || {
                if let Some(guard) = weak.upgrade() {
                    guard.on_timeout(generation);
                }
            }),
        );

        let stale = {
            let mut inner = self.inner.lock();
            if inner.generation == generation && inner.state == SessionState::Recording {
                inner.timer = Some(timer);
                false
            } else {
                true
            }
        };
        if stale {
            self.clock.cancel(timer);
        }

        tracing::debug!(
            generation,
            timeout_ms = timeout.as_millis() as u64,
            "session armed"
        );
        timeout
    }

    /// Track the pending tick; the previous one is cancelled. While no session is active the new
    /// handle is cancelled immediately.
    pub fn register_animation_handle(&self, handle: AnimationHandle) {
        let previous = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Recording {
                drop(inner);
                handle.cancel();
                return;
            }
            inner.animation.replace(handle)
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    pub fn is_session_active(&self) -> bool {
        self.inner.lock().state == SessionState::Recording
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Why the current session was force-stopped, once a force stop has begun. Unlike the callback,
    /// this is observable while teardown is still stopping the recorder.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.inner.lock().forced
    }

    /// Block until no teardown is in progress, or `timeout` passes. Returns `false` on timeout.
    pub fn wait_settled(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.state == SessionState::Stopping {
            if self.settled.wait_until(&mut inner, deadline).timed_out() {
                return inner.state != SessionState::Stopping;
            }
        }
        true
    }

    pub fn has_pending_animation(&self) -> bool {
        self.inner
            .lock()
            .animation
            .as_ref()
            .is_some_and(AnimationHandle::is_pending)
    }

    /// Normal-path teardown. No-op unless a session is active.
    #[tracing::instrument(skip(self))]
    pub fn end_session(&self) {
        let (teardown, generation) = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Recording {
                return;
            }
            inner.state = SessionState::Stopping;
            inner.on_force_stop = None;
            (inner.take_teardown(), inner.generation)
        };
        teardown.run(self.clock.as_ref());

        {
            let mut inner = self.inner.lock();
            if inner.generation == generation && inner.state == SessionState::Stopping {
                inner.state = SessionState::Stopped;
            }
        }
        self.settled.notify_all();
        tracing::debug!(generation, "session ended");
    }

    /// Abnormal-path teardown, then the session's callback with `reason`. No-op unless a session is
    /// active, so the callback runs at most once per session.
    pub fn force_stop(&self, reason: StopReason) {
        self.stop_forced(None, reason);
    }

    fn on_timeout(&self, generation: u64) {
        self.stop_forced(Some(generation), StopReason::Timeout);
    }

    fn stop_forced(&self, expected_generation: Option<u64>, reason: StopReason) {
        let (teardown, callback, generation) = {
            let mut inner = self.inner.lock();
            if expected_generation.is_some_and(|g| g != inner.generation) {
                return;
            }
            if expected_generation.is_some() {
                // The firing timer is already spent.
                inner.timer = None;
            }
            if inner.state != SessionState::Recording {
                return;
            }
            inner.state = SessionState::Stopping;
            inner.forced = Some(reason);
            (
                inner.take_teardown(),
                inner.on_force_stop.take(),
                inner.generation,
            )
        };
        tracing::warn!(reason = reason.code(), generation, "force-stopping session");
        teardown.run(self.clock.as_ref());

        {
            let mut inner = self.inner.lock();
            if inner.generation == generation && inner.state == SessionState::Stopping {
                inner.state = SessionState::ForceStopped(reason);
            }
        }
        self.settled.notify_all();
        if let Some(callback) = callback {
            callback(reason);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/guard.rs"]
mod tests;
