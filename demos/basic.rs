use resilient_http::{Breaker, BreakerError};
use std::error::Error;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct ServiceError(String);

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error: {}", self.0)
    }
}

impl Error for ServiceError {}

// Every third call fails: a 33% error rate.
fn flaky_service(n: u32) -> Result<String, ServiceError> {
    if n % 3 == 0 {
        Err(ServiceError(format!("request {} failed", n)))
    } else {
        Ok(format!("request {} ok", n))
    }
}

fn main() {
    let breaker = Breaker::builder()
        .sample_ttl(Duration::from_millis(100))
        .min_sample_volume(5)
        .max_error_rate(20)
        .break_ttl(Duration::from_secs(1))
        .build();

    println!("Breaker initial state: {:?}", breaker.current_state());

    let started = Instant::now();
    let mut n = 0;

    while started.elapsed() < Duration::from_secs(3) {
        n += 1;

        match breaker.call(|| flaky_service(n)) {
            Ok(reply) => println!("{}", reply),
            Err(BreakerError::Rejected(reason)) => {
                println!("request {} rejected: {}", n, reason);
                thread::sleep(Duration::from_millis(200));
            }
            Err(err) => println!("{}", err),
        }

        thread::sleep(Duration::from_millis(20));
    }

    let snapshot = breaker.snapshot();
    println!(
        "Final state: {:?} (concurrency {}, error rate {}%, performance loss {}%)",
        breaker.current_state(),
        snapshot.concurrency,
        snapshot.error_rate,
        snapshot.performance_loss
    );
}
