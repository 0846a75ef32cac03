use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// One-shot timer callback.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Identifies a scheduled timer for cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Monotonic time source with one-shot timers.
///
/// Timers run on a timeline other than the caller's: [`SystemClock`] uses background threads,
/// [`ManualClock`] runs them from whichever thread advances virtual time.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    fn sleep(&self, d: Duration);

    /// Run `task` once `after` has elapsed, unless cancelled first.
    fn schedule(&self, after: Duration, task: TimerTask) -> TimerId;

    /// Returns `true` when the timer was still pending.
    fn cancel(&self, id: TimerId) -> bool;
}

#[derive(Default)]
struct TimerSlot {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Wall-clock [`Clock`] backed by [`Instant`].
pub struct SystemClock {
    origin: Instant,
    next_id: AtomicU64,
    timers: Arc<Mutex<HashMap<TimerId, Arc<TimerSlot>>>>,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SystemClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemClock")
            .field("now", &self.now())
            .field("pending_timers", &self.timers.lock().len())
            .finish()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            next_id: AtomicU64::new(1),
            timers: Arc::default(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            std::thread::sleep(d);
        }
    }

    fn schedule(&self, after: Duration, task: TimerTask) -> TimerId {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(TimerSlot::default());
        self.timers.lock().insert(id, Arc::clone(&slot));

        let timers = Arc::clone(&self.timers);
        let deadline = Instant::now() + after;
        let spawned = std::thread::Builder::new()
            .name(format!("slidereel-timer-{}", id.0))
            .spawn(move || {
                {
                    let mut cancelled = slot.cancelled.lock();
                    while !*cancelled {
                        if slot.wake.wait_until(&mut cancelled, deadline).timed_out() {
                            break;
                        }
                    }
                    if *cancelled {
                        return;
                    }
                }
                if timers.lock().remove(&id).is_some() {
                    task();
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "failed to spawn timer thread; timer dropped");
            self.timers.lock().remove(&id);
        }
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let Some(slot) = self.timers.lock().remove(&id) else {
            return false;
        };
        *slot.cancelled.lock() = true;
        slot.wake.notify_all();
        true
    }
}

struct ManualTimer {
    id: TimerId,
    deadline: Duration,
    task: TimerTask,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    timers: Vec<ManualTimer>,
}

/// Virtual-time [`Clock`] for tests.
///
/// `sleep` and [`ManualClock::advance`] move time forward and run due timers in deadline order on
/// the calling thread, so long recordings complete instantly and deterministically.
#[derive(Default)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl std::fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualClock")
            .field("now", &state.now)
            .field("pending_timers", &state.timers.len())
            .finish()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward by `d`, firing every timer that falls due on the way.
    pub fn advance(&self, d: Duration) {
        let target = self.state.lock().now.saturating_add(d);
        loop {
            let due = {
                let mut state = self.state.lock();
                let next = state
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.deadline <= target)
                    .min_by_key(|(_, t)| (t.deadline, t.id.0))
                    .map(|(i, _)| i);
                match next {
                    Some(i) => {
                        let timer = state.timers.remove(i);
                        state.now = state.now.max(timer.deadline);
                        Some(timer.task)
                    }
                    None => {
                        state.now = state.now.max(target);
                        None
                    }
                }
            };
            match due {
                // Tasks run without the state lock so they may schedule or cancel timers.
                Some(task) => task(),
                None => break,
            }
        }
    }

    pub fn pending_timers(&self) -> usize {
        self.state.lock().timers.len()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.state.lock().now
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }

    fn schedule(&self, after: Duration, task: TimerTask) -> TimerId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = TimerId(state.next_id);
        let deadline = state.now.saturating_add(after);
        state.timers.push(ManualTimer { id, deadline, task });
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let mut state = self.state.lock();
        let before = state.timers.len();
        state.timers.retain(|t| t.id != id);
        state.timers.len() != before
    }
}

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// The render loop's "next tick is scheduled" token.
///
/// A handle starts pending; exactly one of [`AnimationHandle::fire`] (the tick runs) or
/// [`AnimationHandle::cancel`] (the tick is dropped) wins. Clones share state.
#[derive(Clone, Debug)]
pub struct AnimationHandle {
    state: Arc<AtomicU8>,
}

impl Default for AnimationHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationHandle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PENDING)),
        }
    }

    /// Claim the tick. Returns `false` when it was cancelled (or already fired).
    pub fn fire(&self) -> bool {
        self.state
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Drop the tick. Returns `true` when it was still pending.
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/clock.rs"]
mod tests;
