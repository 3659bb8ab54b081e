//! Sampler loop behaviour: recording, skipping, failure tolerance, idempotent start/stop.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{device, device_at, wait_until, FailingProvider, ScriptedProvider, Step};
use vramwatch::sampler::exceeds_threshold;
use vramwatch::{GpuError, Monitor, SamplerSettings, TickOutcome, Trend};

fn settings(capacity: usize, threshold: f64) -> SamplerSettings {
    SamplerSettings::new(0.01, capacity, threshold)
}

#[test]
fn three_ticks_of_half_full_gpu() {
    let provider = Arc::new(ScriptedProvider::always(device("GPU0", 8192.0, 4096.0)));
    let monitor = Monitor::new(provider).unwrap();
    monitor.state().set_capacity(10);

    for _ in 0..3 {
        assert!(matches!(monitor.sample_now(), TickOutcome::Recorded(_)));
    }

    let history = monitor.state().history();
    assert_eq!(history.len(), 3);
    for s in &history {
        assert_eq!(s.percent_used, 50.0);
        assert_eq!(s.used_mb, 4096.0);
        assert_eq!(s.total_mb, 8192.0);
        assert_eq!(s.device_name, "GPU0");
    }

    let summary = monitor.snapshot_summary(10);
    let stats = summary.stats.expect("three samples give stats");
    assert_eq!(stats.average, 50.0);
    assert_eq!(stats.max, 50.0);
    assert_eq!(stats.min, 50.0);
    assert_eq!(summary.trend, Trend::Unknown);
    assert!(monitor.state().last_update().is_some());
}

#[test]
fn empty_tick_records_nothing() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Step::Empty,
        Step::Device(device("GPU0", 8192.0, 2048.0)),
    ]));
    let monitor = Monitor::new(provider).unwrap();

    assert!(matches!(monitor.sample_now(), TickOutcome::NoDevice));
    assert!(monitor.state().is_empty());
    assert!(monitor.state().last_update().is_none());

    assert!(matches!(monitor.sample_now(), TickOutcome::Recorded(_)));
    assert_eq!(monitor.state().len(), 1);
    assert_eq!(monitor.state().latest().unwrap().percent_used, 25.0);
}

#[test]
fn provider_error_is_reported_not_recorded() {
    let provider = Arc::new(ScriptedProvider::new(vec![Step::Fail("nvml exploded")]));
    let monitor = Monitor::new(provider).unwrap();
    match monitor.sample_now() {
        TickOutcome::Failed(GpuError::Other(msg)) => assert_eq!(msg, "nvml exploded"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(monitor.state().is_empty());
}

#[test]
fn warning_fires_only_strictly_above_threshold() {
    assert!(!exceeds_threshold(80.0, 80.0));
    assert!(exceeds_threshold(80.1, 80.0));
    assert!(!exceeds_threshold(79.9, 80.0));

    let provider = Arc::new(ScriptedProvider::new(vec![
        Step::Device(device_at(80.0)),
        Step::Device(device_at(80.1)),
    ]));
    let monitor = Monitor::new(provider).unwrap();
    let rx = monitor.subscribe_warnings();

    // Stopped monitor samples against the default 80% threshold.
    monitor.sample_now();
    assert_eq!(monitor.state().warning_count(), 0);
    assert!(rx.try_recv().is_err());

    monitor.sample_now();
    assert_eq!(monitor.state().warning_count(), 1);
    let warnings: Vec<_> = rx.try_iter().collect();
    assert_eq!(warnings.len(), 1);
    let last = monitor.state().last_warning().expect("a warning was recorded");
    assert!((last.percent_used - 80.1).abs() < 1e-9);
    assert_eq!(last.threshold, 80.0);
}

#[test]
fn sample_now_uses_last_threshold() {
    let provider = Arc::new(ScriptedProvider::always(device_at(60.0)));
    let monitor = Monitor::new(provider).unwrap();
    let rx = monitor.subscribe_warnings();

    // Default threshold (80%) does not warn at 60%.
    monitor.sample_now();
    assert!(rx.try_recv().is_err());

    monitor.start(SamplerSettings::new(3600.0, 10, 50.0));
    monitor.stop();
    monitor.sample_now();
    let w = rx.recv_timeout(Duration::from_secs(1)).expect("warning at 60% > 50%");
    assert_eq!(w.threshold, 50.0);
    assert_eq!(w.device_name, "GPU0");
}

#[test]
fn loop_records_until_stopped() {
    let provider = Arc::new(ScriptedProvider::always(device_at(40.0)));
    let monitor = Monitor::new(provider.clone()).unwrap();

    assert!(monitor.start(settings(5, 80.0)));
    assert!(monitor.is_running());
    assert!(wait_until(Duration::from_secs(3), || monitor.state().len() >= 5));
    assert!(monitor.stop());
    assert!(!monitor.is_running());

    // Capacity holds while the loop keeps producing.
    assert_eq!(monitor.state().len(), 5);
    assert_eq!(monitor.state().active_loops(), 0);

    let calls = provider.calls();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(provider.calls(), calls, "no ticks after stop");
}

#[test]
fn start_twice_runs_one_loop_and_stop_twice_is_safe() {
    let provider = Arc::new(ScriptedProvider::always(device_at(10.0)));
    let monitor = Monitor::new(provider).unwrap();

    assert!(monitor.start(settings(10, 80.0)));
    assert!(!monitor.start(settings(20, 90.0)), "second start is a no-op");
    assert_eq!(monitor.settings().unwrap().capacity, 10);
    assert!(wait_until(Duration::from_secs(2), || monitor.state().active_loops() == 1));
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(monitor.state().active_loops(), 1);

    assert!(monitor.stop());
    assert!(!monitor.stop());
    assert_eq!(monitor.state().active_loops(), 0);
}

#[test]
fn stop_without_start_is_noop() {
    let monitor = Monitor::new(Arc::new(ScriptedProvider::new(Vec::new()))).unwrap();
    assert!(!monitor.is_running());
    assert!(!monitor.stop());
}

#[test]
fn failing_provider_does_not_stop_the_loop() {
    let provider = Arc::new(FailingProvider::default());
    let monitor = Monitor::new(provider.clone()).unwrap();
    monitor.start(settings(10, 80.0));

    assert!(wait_until(Duration::from_secs(3), || {
        provider.calls.load(Ordering::SeqCst) >= 3
    }));
    assert!(monitor.is_running());
    assert_eq!(monitor.state().active_loops(), 1);
    assert!(monitor.state().is_empty());
    monitor.stop();
}

#[test]
fn slow_provider_times_out() {
    let provider = Arc::new(ScriptedProvider::slow(
        device_at(10.0),
        Duration::from_millis(300),
    ));
    let monitor = Monitor::with_provider_timeout(provider, Duration::from_millis(20)).unwrap();
    match monitor.sample_now() {
        TickOutcome::Failed(GpuError::Timeout(ms)) => assert_eq!(ms, 20),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(monitor.state().is_empty());
}

#[test]
fn restart_applies_new_capacity() {
    let provider = Arc::new(ScriptedProvider::always(device_at(30.0)));
    let monitor = Monitor::new(provider).unwrap();
    monitor.start(settings(20, 80.0));
    assert!(wait_until(Duration::from_secs(3), || monitor.state().len() >= 12));

    monitor.restart(settings(10, 80.0));
    assert!(monitor.state().len() <= 10);
    assert_eq!(monitor.settings().unwrap().capacity, 10);
    monitor.stop();
}

#[test]
fn huge_interval_is_clamped() {
    let s = SamplerSettings::new(1e300, 10, 80.0);
    assert_eq!(s.interval, Duration::from_secs(10));
    assert_eq!(SamplerSettings::new(-1.0, 10, 80.0).interval, Duration::from_secs(1));
}

#[test]
fn provider_timeout_never_exceeds_stop_grace() {
    let provider = Arc::new(ScriptedProvider::slow(
        device_at(10.0),
        Duration::from_millis(1500),
    ));
    let monitor = Monitor::with_provider_timeout(provider, Duration::from_secs(10)).unwrap();
    match monitor.sample_now() {
        TickOutcome::Failed(GpuError::Timeout(ms)) => assert_eq!(ms, 900),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
fn stop_mid_tick_is_bounded_and_drops_the_reading() {
    let provider = Arc::new(ScriptedProvider::slow(
        device_at(10.0),
        Duration::from_millis(400),
    ));
    let monitor =
        Monitor::with_provider_timeout(provider.clone(), Duration::from_secs(5)).unwrap();
    monitor.start(settings(10, 80.0));
    assert!(wait_until(Duration::from_secs(2), || provider.calls() >= 1));

    let started = Instant::now();
    assert!(monitor.stop());
    assert!(started.elapsed() < Duration::from_millis(1500));
    assert_eq!(monitor.state().active_loops(), 0);

    let len = monitor.state().len();
    std::thread::sleep(Duration::from_millis(600));
    assert_eq!(monitor.state().len(), len, "history grew after stop");
}

#[test]
fn restart_mid_tick_keeps_a_single_loop() {
    let provider = Arc::new(ScriptedProvider::slow(
        device_at(10.0),
        Duration::from_millis(400),
    ));
    let monitor =
        Monitor::with_provider_timeout(provider.clone(), Duration::from_secs(5)).unwrap();
    monitor.start(settings(10, 80.0));
    assert!(wait_until(Duration::from_secs(2), || provider.calls() >= 1));

    monitor.restart(settings(20, 80.0));
    assert!(monitor.state().active_loops() <= 1);
    assert!(wait_until(Duration::from_secs(2), || monitor.state().active_loops() == 1));
    for _ in 0..10 {
        assert!(monitor.state().active_loops() <= 1);
        std::thread::sleep(Duration::from_millis(20));
    }
    monitor.stop();
    assert_eq!(monitor.state().active_loops(), 0);
}
