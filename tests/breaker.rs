use resilient_http::{Breaker, BreakerError, HookRegistry, Rejection, State};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct TestError(String);

impl TestError {
    fn new(msg: &str) -> Self {
        TestError(msg.to_string())
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Test error: {}", self.0)
    }
}

impl Error for TestError {}

fn wait_for(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn fast_breaker(hooks: HookRegistry) -> Breaker {
    Breaker::builder()
        .sample_ttl(Duration::from_millis(20))
        .min_sample_volume(3)
        .break_ttl(Duration::from_millis(200))
        .max_error_rate(10)
        .hooks(hooks)
        .build()
}

#[test]
fn test_breaker_accepts_while_warming_up() {
    let breaker = Breaker::builder()
        .sample_ttl(Duration::from_secs(3600))
        .build();

    assert_eq!(breaker.current_state(), State::WarmingUp);

    for _ in 0..50 {
        let result = breaker.call(|| -> Result<(), TestError> { Err(TestError::new("down")) });
        assert!(matches!(result, Err(BreakerError::Operation(_))));
    }

    // Nothing is evaluated before the window is full.
    assert_eq!(breaker.snapshot().error_rate, 0);
    assert!(breaker.accept().is_ok());
}

#[test]
fn test_breaker_trips_and_recovers() {
    let breaks = Arc::new(AtomicUsize::new(0));
    let recoveries = Arc::new(AtomicUsize::new(0));

    let hooks = HookRegistry::new();
    let b = Arc::clone(&breaks);
    hooks.set_on_break(move |reason| {
        assert_eq!(reason, Rejection::ErrorRateExceeded);
        b.fetch_add(1, Ordering::SeqCst);
    });
    let r = Arc::clone(&recoveries);
    hooks.set_on_recover(move || {
        r.fetch_add(1, Ordering::SeqCst);
    });

    let breaker = fast_breaker(hooks);

    // Keep failing until the refresh loop notices.
    let tripped = wait_for(Duration::from_secs(5), || {
        matches!(
            breaker.call(|| -> Result<(), TestError> { Err(TestError::new("down")) }),
            Err(BreakerError::Rejected(Rejection::ErrorRateExceeded))
        )
    });
    assert!(tripped, "breaker never rejected");
    let breaking = wait_for(Duration::from_secs(1), || {
        breaker.current_state() == State::Breaking
    });
    assert!(breaking);
    assert!(breaks.load(Ordering::SeqCst) >= 1);

    // Rejected actions never run.
    let ran = AtomicUsize::new(0);
    let result = breaker.call(|| -> Result<(), TestError> {
        ran.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    assert!(result.unwrap_err().is_breaker_error());
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    // Failed samples roll out of the window once traffic stops.
    let recovered = wait_for(Duration::from_secs(5), || {
        breaker.current_state() == State::Accepting
    });
    assert!(recovered, "breaker never recovered");
    assert_eq!(recoveries.load(Ordering::SeqCst), 1);

    let result = breaker.call(|| -> Result<&str, TestError> { Ok("back") });
    assert_eq!(result.unwrap(), "back");
}

#[test]
fn test_healthy_traffic_never_trips() {
    // Sub-millisecond latencies jitter far beyond any sane loss limit.
    let breaker = Breaker::builder()
        .sample_ttl(Duration::from_millis(20))
        .min_sample_volume(3)
        .max_performance_loss(100_000)
        .build();

    let started = Instant::now();
    while started.elapsed() < Duration::from_millis(200) {
        let result = breaker.call(|| -> Result<(), TestError> { Ok(()) });
        assert!(result.is_ok());
        thread::sleep(Duration::from_millis(1));
    }

    assert_ne!(breaker.current_state(), State::Breaking);
    assert_eq!(breaker.snapshot().error_rate, 0);
}

#[test]
fn test_clones_share_state() {
    let breaker = fast_breaker(HookRegistry::new());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let breaker = breaker.clone();
            thread::spawn(move || {
                let deadline = Instant::now() + Duration::from_secs(5);
                while Instant::now() < deadline {
                    let result = breaker
                        .call(|| -> Result<(), TestError> { Err(TestError::new("down")) });
                    if let Err(BreakerError::Rejected(_)) = result {
                        return true;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                false
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert!(breaker.accept().is_err());
}

#[test]
fn test_nil_action() {
    let breaker = Breaker::default();
    let result = breaker.run::<fn() -> Result<(), TestError>, TestError>(None);
    assert!(matches!(result, Err(BreakerError::NilAction)));
    assert_eq!(result.unwrap_err().to_string(), "cannot call nil action");
}

#[test]
fn test_shutdown_freezes_state() {
    let breaker = fast_breaker(HookRegistry::new());
    breaker.shutdown();

    let state = breaker.current_state();
    for _ in 0..20 {
        let _ = breaker.call(|| -> Result<(), TestError> { Err(TestError::new("down")) });
    }
    thread::sleep(Duration::from_millis(100));

    assert_eq!(breaker.current_state(), state);
    assert!(breaker.accept().is_ok());
}
