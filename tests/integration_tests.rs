//! Integration tests for Filament

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use filament::runtime::ReactiveRuntime;
use filament::{batch, create_effect, create_memo, create_signal, untrack, Signal};

#[test]
fn signal_integration() {
    ReactiveRuntime::scope(|| {
        let (count, set_count) = create_signal(0);

        // Test read
        assert_eq!(count.get(), 0);

        // Test write
        set_count.set(42);
        assert_eq!(count.get(), 42);

        // Test update
        set_count.update(|n| *n += 10);
        assert_eq!(count.get(), 52);
    });
}

#[test]
fn memo_integration() {
    ReactiveRuntime::scope(|| {
        let (a, set_a) = create_signal(5);
        let (b, set_b) = create_signal(10);

        let sum = create_memo({
            let a = a.clone();
            let b = b.clone();
            move || a.get() + b.get()
        });

        assert_eq!(sum.get(), 15);

        set_a.set(20);
        assert_eq!(sum.get(), 30);

        set_b.set(5);
        assert_eq!(sum.get(), 25);
    });
}

#[test]
fn effect_integration() {
    ReactiveRuntime::scope(|| {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let (signal, set_signal) = create_signal(0);

        create_effect({
            let signal = signal.clone();
            move || {
                let _ = signal.get();
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Effect runs immediately
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // A write propagates once the write unwinds
        set_signal.set(7);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    });
}

#[test]
fn effect_dispose_stops_reruns() {
    ReactiveRuntime::scope(|| {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let (signal, set_signal) = create_signal(0);

        let effect = create_effect({
            let signal = signal.clone();
            move || {
                let _ = signal.get();
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        set_signal.set(1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        effect.dispose();
        set_signal.set(2);
        set_signal.set(3);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    });
}

#[test]
fn untrack_reads_without_subscribing() {
    ReactiveRuntime::scope(|| {
        let (tracked, set_tracked) = create_signal(0);
        let (peeked, set_peeked) = create_signal(100);

        let runs = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(AtomicUsize::new(0));

        create_effect({
            let (tracked, peeked) = (tracked.clone(), peeked.clone());
            let (runs, seen) = (runs.clone(), seen.clone());
            move || {
                let _ = tracked.get();
                seen.store(untrack(|| peeked.get()), Ordering::SeqCst);
                runs.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 100);

        // Untracked source: no re-run, stale snapshot kept
        set_peeked.set(200);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 100);

        // Tracked source: re-run picks up the fresh untracked value
        set_tracked.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 200);
    });
}

#[test]
fn unsubscribed_read_creates_no_edge() {
    ReactiveRuntime::scope(|| {
        let (signal, set_signal) = create_signal(0);

        // Reads outside any observer are plain value reads.
        assert_eq!(signal.get(), 0);

        let runs = Arc::new(AtomicUsize::new(0));
        create_effect({
            let runs = runs.clone();
            move || {
                runs.fetch_add(1, Ordering::SeqCst);
            }
        });

        // The effect never read the signal, so writes leave it alone.
        set_signal.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn custom_comparator_controls_notification() {
    ReactiveRuntime::scope(|| {
        // Writes are equal when they agree modulo 10.
        let signal = Signal::with_comparator(2, |a: &i32, b: &i32| a % 10 == b % 10);

        let runs = Arc::new(AtomicUsize::new(0));
        create_effect({
            let (signal, runs) = (signal.clone(), runs.clone());
            move || {
                let _ = signal.get();
                runs.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        signal.set(12); // 12 and 2 agree mod 10: dropped
        assert_eq!(signal.get(), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        signal.set(13);
        assert_eq!(signal.get(), 13);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    });
}

#[test]
fn update_notifies_unconditionally() {
    ReactiveRuntime::scope(|| {
        let (count, set_count) = create_signal(1);

        let runs = Arc::new(AtomicUsize::new(0));
        create_effect({
            let (count, runs) = (count.clone(), runs.clone());
            move || {
                let _ = count.get();
                runs.fetch_add(1, Ordering::SeqCst);
            }
        });

        // `update` bypasses the equality policy.
        set_count.update(|n| *n *= 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    });
}

#[test]
fn complex_reactive_chain() {
    ReactiveRuntime::scope(|| {
        let (input, set_input) = create_signal(1);

        let doubled = create_memo({
            let input = input.clone();
            move || input.get() * 2
        });

        let quadrupled = create_memo({
            let doubled = doubled.clone();
            move || doubled.get() * 2
        });

        assert_eq!(quadrupled.get(), 4);

        set_input.set(5);
        assert_eq!(quadrupled.get(), 20);
    });
}

#[test]
fn batched_writes_propagate_once() {
    ReactiveRuntime::scope(|| {
        let (a, set_a) = create_signal(1);
        let (b, set_b) = create_signal(2);

        let runs = Arc::new(AtomicUsize::new(0));
        let total = Arc::new(AtomicUsize::new(0));

        create_effect({
            let (a, b) = (a.clone(), b.clone());
            let (runs, total) = (runs.clone(), total.clone());
            move || {
                total.store((a.get() + b.get()) as usize, Ordering::SeqCst);
                runs.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let result = batch(|| {
            set_a.set(10);
            set_b.set(20);
            // Still the pre-batch view inside: nothing has flushed yet.
            assert_eq!(runs.load(Ordering::SeqCst), 1);
            "done"
        });

        assert_eq!(result, "done");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(total.load(Ordering::SeqCst), 30);
    });
}

#[test]
fn scoped_runtimes_are_isolated() {
    let outer = Signal::new(1);

    ReactiveRuntime::scope(|| {
        let inner = Signal::new(2);
        assert_eq!(inner.get(), 2);
        // Signals from the outer runtime still read their own graph.
        assert_eq!(outer.get(), 1);
    });

    outer.set(10);
    assert_eq!(outer.get(), 10);
}
