//! Configuration for breakers and transports.
//!
//! Every option has a documented default. A value left at zero is replaced by
//! its default when the configuration is [normalized](BreakerConfig::normalized),
//! which every builder does before constructing anything.

use std::sync::Arc;
use std::time::Duration;

use crate::breaker::Breaker;
use crate::hook::HookRegistry;
use crate::metrics::{MetricSink, NullMetricSink};
use crate::policy::{BreakerPolicy, ThresholdPolicy};

/// Default maximum number of concurrent actions.
pub const DEFAULT_MAX_CONCURRENCY: u32 = 20;
/// Default cooldown after a breached limit.
pub const DEFAULT_BREAK_TTL: Duration = Duration::from_secs(10);
/// Default maximum error rate, in percent.
pub const DEFAULT_MAX_ERROR_RATE: u32 = 10;
/// Default maximum performance loss, in percent.
pub const DEFAULT_MAX_PERFORMANCE_LOSS: u32 = 25;
/// Default refresh cadence.
pub const DEFAULT_SAMPLE_TTL: Duration = Duration::from_secs(2);
/// Default number of samples in the window.
pub const DEFAULT_MIN_SAMPLE_VOLUME: usize = 10;

/// Limits and cadence of a [`Breaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Maximum number of actions allowed in flight. Beyond it the breaker
    /// stops accepting new actions.
    pub max_concurrency: u32,

    /// How long no new actions are accepted once a limit is breached.
    pub break_ttl: Duration,

    /// Percentage of failed actions allowed across the window.
    pub max_error_rate: u32,

    /// Percentage by which current latency may exceed historical latency.
    pub max_performance_loss: u32,

    /// Interval between metric refreshes. Also the lifetime of one sample.
    pub sample_ttl: Duration,

    /// Number of samples the window must hold before the breaker gates.
    pub min_sample_volume: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            break_ttl: DEFAULT_BREAK_TTL,
            max_error_rate: DEFAULT_MAX_ERROR_RATE,
            max_performance_loss: DEFAULT_MAX_PERFORMANCE_LOSS,
            sample_ttl: DEFAULT_SAMPLE_TTL,
            min_sample_volume: DEFAULT_MIN_SAMPLE_VOLUME,
        }
    }
}

impl BreakerConfig {
    /// Replaces every zero value by its default.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();

        if self.max_concurrency == 0 {
            self.max_concurrency = defaults.max_concurrency;
        }
        if self.break_ttl.is_zero() {
            self.break_ttl = defaults.break_ttl;
        }
        if self.max_error_rate == 0 {
            self.max_error_rate = defaults.max_error_rate;
        }
        if self.max_performance_loss == 0 {
            self.max_performance_loss = defaults.max_performance_loss;
        }
        if self.sample_ttl.is_zero() {
            self.sample_ttl = defaults.sample_ttl;
        }
        if self.min_sample_volume == 0 {
            self.min_sample_volume = defaults.min_sample_volume;
        }

        self
    }
}

/// Builder for creating breakers with custom configurations.
pub struct BreakerBuilder {
    config: BreakerConfig,
    metric_sink: Arc<dyn MetricSink>,
    hook_registry: Arc<HookRegistry>,
}

impl Default for BreakerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::from_config(BreakerConfig::default())
    }

    /// Creates a builder starting from an existing configuration.
    pub fn from_config(config: BreakerConfig) -> Self {
        Self {
            config,
            metric_sink: Arc::new(NullMetricSink),
            hook_registry: Arc::new(HookRegistry::new()),
        }
    }

    /// Sets the maximum number of concurrent actions.
    pub fn max_concurrency(mut self, max: u32) -> Self {
        self.config.max_concurrency = max;
        self
    }

    /// Sets the cooldown applied after a breached limit.
    pub fn break_ttl(mut self, duration: Duration) -> Self {
        self.config.break_ttl = duration;
        self
    }

    /// Sets the maximum error rate, in percent.
    pub fn max_error_rate(mut self, rate: u32) -> Self {
        self.config.max_error_rate = rate;
        self
    }

    /// Sets the maximum performance loss, in percent.
    pub fn max_performance_loss(mut self, loss: u32) -> Self {
        self.config.max_performance_loss = loss;
        self
    }

    /// Sets the refresh cadence.
    pub fn sample_ttl(mut self, duration: Duration) -> Self {
        self.config.sample_ttl = duration;
        self
    }

    /// Sets the number of samples kept in the window.
    pub fn min_sample_volume(mut self, volume: usize) -> Self {
        self.config.min_sample_volume = volume;
        self
    }

    /// Sets a metric sink for the breaker.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Sets a hook registry for the breaker.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hook_registry = Arc::new(hooks);
        self
    }

    /// The configuration as it will be applied.
    pub fn config(&self) -> BreakerConfig {
        self.config.normalized()
    }

    /// Builds a breaker gated by the configured thresholds.
    pub fn build(self) -> Breaker {
        let policy = ThresholdPolicy::from_config(&self.config());
        self.build_with_policy(policy)
    }

    /// Builds a breaker gated by a custom policy.
    pub fn build_with_policy<P: BreakerPolicy>(self, policy: P) -> Breaker<P> {
        Breaker::new(
            self.config(),
            policy,
            self.metric_sink,
            self.hook_registry,
        )
    }
}

#[cfg(feature = "transport")]
pub use self::transport::*;

#[cfg(feature = "transport")]
mod transport {
    use std::time::Duration;

    use super::{BreakerBuilder, BreakerConfig};
    use crate::hook::HookRegistry;
    use crate::metrics::MetricSink;
    use crate::transmit::{HttpTransmitter, Transmit};
    use crate::transport::Transport;

    /// Default timeout of a single dial attempt.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default number of dial attempts.
    pub const DEFAULT_CONNECT_RETRY: u32 = 2;
    /// Default pause after a refused connection.
    pub const DEFAULT_CONNECT_RETRY_DELAY: Duration = Duration::from_millis(200);
    /// Default timeout of a single request attempt.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default number of request retries after the first attempt.
    pub const DEFAULT_REQUEST_RETRY: u32 = 2;
    /// Default pause between request attempts.
    pub const DEFAULT_REQUEST_RETRY_DELAY: Duration = Duration::from_millis(200);

    /// Retry and timeout settings of a [`Transport`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransportConfig {
        /// Timeout of a single dial attempt.
        pub connect_timeout: Duration,

        /// Number of dial attempts made while connections are refused.
        pub connect_retry: u32,

        /// Time to block before dialing again after a refused connection.
        pub connect_retry_delay: Duration,

        /// Time within which a request attempt must complete before it is
        /// cancelled.
        pub request_timeout: Duration,

        /// Number of retries after the first attempt when a request timed out,
        /// failed or answered with a 5xx status.
        pub request_retry: u32,

        /// Time to block before retrying a request.
        pub request_retry_delay: Duration,

        /// Configuration of the breaker guarding the transport.
        pub breaker: BreakerConfig,
    }

    impl Default for TransportConfig {
        fn default() -> Self {
            Self {
                connect_timeout: DEFAULT_CONNECT_TIMEOUT,
                connect_retry: DEFAULT_CONNECT_RETRY,
                connect_retry_delay: DEFAULT_CONNECT_RETRY_DELAY,
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
                request_retry: DEFAULT_REQUEST_RETRY,
                request_retry_delay: DEFAULT_REQUEST_RETRY_DELAY,
                breaker: BreakerConfig::default(),
            }
        }
    }

    impl TransportConfig {
        /// Replaces every zero value, including the breaker's, by its default.
        pub fn normalized(mut self) -> Self {
            let defaults = Self::default();

            if self.connect_timeout.is_zero() {
                self.connect_timeout = defaults.connect_timeout;
            }
            if self.connect_retry == 0 {
                self.connect_retry = defaults.connect_retry;
            }
            if self.connect_retry_delay.is_zero() {
                self.connect_retry_delay = defaults.connect_retry_delay;
            }
            if self.request_timeout.is_zero() {
                self.request_timeout = defaults.request_timeout;
            }
            if self.request_retry == 0 {
                self.request_retry = defaults.request_retry;
            }
            if self.request_retry_delay.is_zero() {
                self.request_retry_delay = defaults.request_retry_delay;
            }
            self.breaker = self.breaker.normalized();

            self
        }
    }

    /// Builder for creating transports with custom configurations.
    pub struct TransportBuilder {
        config: TransportConfig,
        breaker: BreakerBuilder,
    }

    impl Default for TransportBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TransportBuilder {
        /// Creates a new builder with default settings.
        pub fn new() -> Self {
            Self::from_config(TransportConfig::default())
        }

        /// Creates a builder starting from an existing configuration.
        pub fn from_config(config: TransportConfig) -> Self {
            Self {
                config,
                breaker: BreakerBuilder::from_config(config.breaker),
            }
        }

        /// Sets the timeout of a single dial attempt.
        pub fn connect_timeout(mut self, timeout: Duration) -> Self {
            self.config.connect_timeout = timeout;
            self
        }

        /// Sets the number of dial attempts.
        pub fn connect_retry(mut self, attempts: u32) -> Self {
            self.config.connect_retry = attempts;
            self
        }

        /// Sets the pause after a refused connection.
        pub fn connect_retry_delay(mut self, delay: Duration) -> Self {
            self.config.connect_retry_delay = delay;
            self
        }

        /// Sets the timeout of a single request attempt.
        pub fn request_timeout(mut self, timeout: Duration) -> Self {
            self.config.request_timeout = timeout;
            self
        }

        /// Sets the number of request retries after the first attempt.
        pub fn request_retry(mut self, retries: u32) -> Self {
            self.config.request_retry = retries;
            self
        }

        /// Sets the pause between request attempts.
        pub fn request_retry_delay(mut self, delay: Duration) -> Self {
            self.config.request_retry_delay = delay;
            self
        }

        /// Configures the guarding breaker.
        pub fn breaker<F>(mut self, f: F) -> Self
        where
            F: FnOnce(BreakerBuilder) -> BreakerBuilder,
        {
            self.breaker = f(self.breaker);
            self
        }

        /// Sets a metric sink for the guarding breaker.
        pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
            self.breaker = self.breaker.metric_sink(sink);
            self
        }

        /// Sets a hook registry for the guarding breaker.
        pub fn hooks(mut self, hooks: HookRegistry) -> Self {
            self.breaker = self.breaker.hooks(hooks);
            self
        }

        /// The configuration as it will be applied.
        pub fn config(&self) -> TransportConfig {
            let mut config = self.config;
            config.breaker = self.breaker.config();
            config.normalized()
        }

        /// Builds a transport sending over plain HTTP/1.1.
        pub fn build(self) -> Transport {
            let config = self.config();
            let transmitter = HttpTransmitter::new(&config);
            Transport::new(config, self.breaker.build(), transmitter)
        }

        /// Builds a transport sending through a custom transmitter.
        pub fn build_with_transmitter<T: Transmit>(self, transmitter: T) -> Transport<T> {
            let config = self.config();
            Transport::new(config, self.breaker.build(), transmitter)
        }
    }
}
