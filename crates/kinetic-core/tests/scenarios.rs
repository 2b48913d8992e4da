//! Cross-cutting scenarios spanning wall-clock coordination that don't fit
//! naturally as a single module's inline unit tests (see each module's
//! `#[cfg(test)] mod tests` for the corresponding boundary-condition and
//! state-machine coverage, and `assisted_service.rs` for the work-stealing
//! scenario, which fits there directly).

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use kinetic_core::{
    AssistedService, AssistedServiceConfig, BoxError, CyclicConfig, CyclicTask, ScalableService,
    ScalableServiceConfig,
};

// Scenario B — Cyclic finite: count=5, budget=1s; exactly 5 invocations.
#[test]
fn scenario_b_cyclic_finite_runs_exact_count() {
    let service = AssistedService::new(AssistedServiceConfig::default().with_worker_count(1)).unwrap();
    service.activate();

    struct Counting {
        invocations: Arc<AtomicU32>,
        cleaned_up: Arc<AtomicU32>,
    }
    impl CyclicTask for Counting {
        fn execute(&mut self) -> Result<bool, BoxError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
        fn on_cleanup(&mut self) {
            self.cleaned_up.fetch_add(1, Ordering::SeqCst);
        }
    }

    let invocations = Arc::new(AtomicU32::new(0));
    let cleaned_up = Arc::new(AtomicU32::new(0));
    let handle = service
        .submit_cyclic(
            Counting {
                invocations: invocations.clone(),
                cleaned_up: cleaned_up.clone(),
            },
            CyclicConfig {
                cycle_budget: Duration::from_millis(5),
                max_cycles: Some(5),
            },
        )
        .unwrap();

    assert!(handle.await_completion());
    assert_eq!(invocations.load(Ordering::SeqCst), 5);
    assert_eq!(cleaned_up.load(Ordering::SeqCst), 1);
    assert_eq!(handle.cycles_run(), 5);

    service.shutdown_and_wait();
}

// Scenario C — Cyclic infinite with external terminate: count=0 (unbounded),
// budget=500ms; sleep ~10s, terminate, expect 19-21 invocations.
//
// Scaled down from the spec's literal 10s/500ms to keep the test suite fast
// while preserving the same ratio (budget * ~20 == sleep duration).
#[test]
fn scenario_c_cyclic_infinite_terminate_mid_run() {
    let service = AssistedService::new(AssistedServiceConfig::default().with_worker_count(1)).unwrap();
    service.activate();

    struct Counting {
        invocations: Arc<AtomicU32>,
        cleaned_up: Arc<AtomicU32>,
    }
    impl CyclicTask for Counting {
        fn execute(&mut self) -> Result<bool, BoxError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
        fn on_cleanup(&mut self) {
            self.cleaned_up.fetch_add(1, Ordering::SeqCst);
        }
    }

    let invocations = Arc::new(AtomicU32::new(0));
    let cleaned_up = Arc::new(AtomicU32::new(0));
    let budget = Duration::from_millis(50);
    let handle = service
        .submit_cyclic(
            Counting {
                invocations: invocations.clone(),
                cleaned_up: cleaned_up.clone(),
            },
            CyclicConfig {
                cycle_budget: budget,
                max_cycles: None,
            },
        )
        .unwrap();

    std::thread::sleep(budget * 20);
    handle.terminate();
    assert!(handle.await_completion());

    let count = invocations.load(Ordering::SeqCst);
    assert!((18..=22).contains(&count), "invocations={count}");
    assert_eq!(cleaned_up.load(Ordering::SeqCst), 1);

    service.shutdown_and_wait();
}

// Scenario D — Cyclic self-termination on the 17th invocation.
#[test]
fn scenario_d_cyclic_self_terminates_at_17th_invocation() {
    let service = AssistedService::new(AssistedServiceConfig::default().with_worker_count(1)).unwrap();
    service.activate();

    struct SelfTerminating {
        invocations: Arc<AtomicU32>,
        cleaned_up: Arc<AtomicU32>,
    }
    impl CyclicTask for SelfTerminating {
        fn execute(&mut self) -> Result<bool, BoxError> {
            let n = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(n < 17)
        }
        fn on_cleanup(&mut self) {
            self.cleaned_up.fetch_add(1, Ordering::SeqCst);
        }
    }

    let invocations = Arc::new(AtomicU32::new(0));
    let cleaned_up = Arc::new(AtomicU32::new(0));
    let handle = service
        .submit_cyclic(
            SelfTerminating {
                invocations: invocations.clone(),
                cleaned_up: cleaned_up.clone(),
            },
            CyclicConfig {
                cycle_budget: Duration::from_millis(1),
                max_cycles: None,
            },
        )
        .unwrap();

    assert!(handle.await_completion());
    assert_eq!(invocations.load(Ordering::SeqCst), 17);
    assert_eq!(cleaned_up.load(Ordering::SeqCst), 1);

    service.shutdown_and_wait();
}

// Scenario E — Scalable elasticity: min/max/timeout scaled down from the
// spec's 20/500/200ms and 1000x2s tasks to keep this test fast, preserving
// the same shape (grows under load, drains back to min after idling).
#[test]
fn scenario_e_scalable_elasticity_grows_and_shrinks() {
    let min = 2;
    let max = 10;
    let on_demand_timeout = Duration::from_millis(150);
    let service = ScalableService::new(
        ScalableServiceConfig::default()
            .with_min(min)
            .with_max(max)
            .with_on_demand_timeout(on_demand_timeout),
    )
    .unwrap();
    service.activate();

    let task_duration = Duration::from_millis(120);
    let handles: Vec<_> = (0..30)
        .map(|i| {
            service
                .submit_result(move || {
                    std::thread::sleep(task_duration);
                    Ok::<i64, BoxError>(i)
                })
                .unwrap()
        })
        .collect();

    // while tasks are still in flight, the pool should have grown above min
    // and stay at or below max.
    std::thread::sleep(task_duration / 2);
    let mid_flight_count = service.current_executor_count();
    assert!(mid_flight_count > min, "mid_flight_count={mid_flight_count}");
    assert!(mid_flight_count <= max, "mid_flight_count={mid_flight_count}");

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.get_and_wait(), Some(i as i64));
    }

    // once everything is idle, on-demand workers should time out and the
    // pool should drain back down to min within a couple of timeouts.
    let deadline = Instant::now() + on_demand_timeout * 10;
    while service.current_executor_count() > min && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(service.current_executor_count(), min);

    service.shutdown_and_wait();
}

// Scenario F — Cancel race: immediate cancel always wins; a cancel delayed
// past the point the body has likely started always loses.
#[test]
fn scenario_f_cancel_race_immediate_wins() {
    let service = AssistedService::new(AssistedServiceConfig::default().with_worker_count(1)).unwrap();
    service.activate();

    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = ran.clone();
    let handle = service
        .submit_event(move || {
            std::thread::sleep(Duration::from_secs(1));
            ran_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    let canceled = handle.cancel();
    assert!(canceled);
    assert!(!handle.await_completion());
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    service.shutdown_and_wait();
}

#[test]
fn scenario_f_cancel_race_delayed_loses() {
    let service = AssistedService::new(AssistedServiceConfig::default().with_worker_count(1)).unwrap();
    service.activate();

    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = ran.clone();
    let handle = service
        .submit_event(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(50));
    let canceled = handle.cancel();
    assert!(!canceled);
    assert!(handle.await_completion());
    assert_eq!(ran.load(Ordering::SeqCst), 1);

    service.shutdown_and_wait();
}
