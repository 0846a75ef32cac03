use super::*;
use std::sync::atomic::AtomicUsize;

#[test]
fn manual_clock_fires_timers_in_deadline_order() {
    let clock = ManualClock::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    for (name, ms) in [("b", 200u64), ("a", 100), ("c", 300)] {
        let log = Arc::clone(&log);
        clock.schedule(
            Duration::from_millis(ms),
            Box::new(move || log.lock().push(name)),
        );
    }

    clock.advance(Duration::from_millis(250));
    assert_eq!(*log.lock(), vec!["a", "b"]);
    assert_eq!(clock.now(), Duration::from_millis(250));
    assert_eq!(clock.pending_timers(), 1);

    clock.sleep(Duration::from_millis(50));
    assert_eq!(*log.lock(), vec!["a", "b", "c"]);
}

#[test]
fn manual_timer_observes_its_own_deadline() {
    let clock = Arc::new(ManualClock::new());
    let seen = Arc::new(Mutex::new(None));
    {
        let clock2 = Arc::clone(&clock);
        let seen = Arc::clone(&seen);
        clock.schedule(
            Duration::from_secs(5),
            Box::new(move || *seen.lock() = Some(clock2.now())),
        );
    }
    clock.advance(Duration::from_secs(60));
    assert_eq!(*seen.lock(), Some(Duration::from_secs(5)));
    assert_eq!(clock.now(), Duration::from_secs(60));
}

#[test]
fn cancelled_manual_timer_never_fires() {
    let clock = ManualClock::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    let id = clock.schedule(
        Duration::from_millis(10),
        Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert!(clock.cancel(id));
    assert!(!clock.cancel(id));
    clock.advance(Duration::from_secs(1));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn timer_may_schedule_another_timer() {
    let clock = Arc::new(ManualClock::new());
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let clock2 = Arc::clone(&clock);
        let hits = Arc::clone(&hits);
        clock.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                let hits = Arc::clone(&hits);
                clock2.schedule(
                    Duration::from_millis(10),
                    Box::new(move || {
                        hits.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );
    }
    clock.advance(Duration::from_millis(25));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn system_clock_timer_fires_and_cancel_wins_before_deadline() {
    let clock = SystemClock::new();
    let (tx, rx) = std::sync::mpsc::channel();
    clock.schedule(
        Duration::from_millis(5),
        Box::new(move || {
            let _ = tx.send(());
        }),
    );
    assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());

    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    let id = clock.schedule(
        Duration::from_secs(30),
        Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert!(clock.cancel(id));
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn system_clock_is_monotonic() {
    let clock = SystemClock::new();
    let a = clock.now();
    clock.sleep(Duration::from_millis(2));
    assert!(clock.now() > a);
}

#[test]
fn animation_handle_fire_and_cancel_are_exclusive() {
    let h = AnimationHandle::new();
    assert!(h.is_pending());
    assert!(h.cancel());
    assert!(!h.fire());
    assert!(h.is_cancelled());

    let h = AnimationHandle::new();
    let shared = h.clone();
    assert!(shared.fire());
    assert!(!h.cancel());
    assert!(!h.is_pending());
}
