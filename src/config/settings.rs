use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes the broker limits, logging, and the parameters of the sample
/// scenarios run by the binary.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub logging: LoggingSettings,
    pub samples: SampleSettings,
    pub dto: DtoSettings,
    pub latency: LatencySettings,
}

/// Configuration settings for the broker.
///
/// `max_sessions` caps the number of connected sessions; connecting beyond it
/// fails with a connection error.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub max_sessions: usize,
}

/// Default log level, overridden by `RUST_LOG` when set.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Which sample scenario the binary runs.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    #[default]
    Dto,
    Latency,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct SampleSettings {
    pub scenario: Scenario,
}

/// Deliver-to-one scenario parameters.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DtoSettings {
    pub topic: String,
    pub message_count: u64,
    /// Pause between publishes.
    pub interval_ms: u64,
}

/// Round-trip latency scenario parameters.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LatencySettings {
    pub topic: String,
    pub message_count: u64,
    /// Probes per second.
    pub publish_rate: u32,
    pub long_latency_threshold_ms: i64,
    /// Log every round trip, not just the long ones.
    pub verbose: bool,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self { max_sessions: 1000 }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for DtoSettings {
    fn default() -> Self {
        Self {
            topic: "tutorial/topic".to_string(),
            message_count: 10,
            interval_ms: 500,
        }
    }
}

impl Default for LatencySettings {
    fn default() -> Self {
        Self {
            topic: "tutorial/topic".to_string(),
            message_count: 1000,
            publish_rate: 5,
            long_latency_threshold_ms: 100,
            verbose: false,
        }
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub logging: Option<PartialLoggingSettings>,
    pub samples: Option<PartialSampleSettings>,
    pub dto: Option<PartialDtoSettings>,
    pub latency: Option<PartialLatencySettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub max_sessions: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialSampleSettings {
    pub scenario: Option<Scenario>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialDtoSettings {
    pub topic: Option<String>,
    pub message_count: Option<u64>,
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLatencySettings {
    pub topic: Option<String>,
    pub message_count: Option<u64>,
    pub publish_rate: Option<u32>,
    pub long_latency_threshold_ms: Option<i64>,
    pub verbose: Option<bool>,
}

impl PartialSettings {
    /// Fills every missing value from `Settings::default()`.
    pub fn merge_with_defaults(self) -> Settings {
        let default = Settings::default();
        let broker = self.broker.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();
        let samples = self.samples.unwrap_or_default();
        let dto = self.dto.unwrap_or_default();
        let latency = self.latency.unwrap_or_default();

        Settings {
            broker: BrokerSettings {
                max_sessions: broker.max_sessions.unwrap_or(default.broker.max_sessions),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
            samples: SampleSettings {
                scenario: samples.scenario.unwrap_or(default.samples.scenario),
            },
            dto: DtoSettings {
                topic: dto.topic.unwrap_or(default.dto.topic),
                message_count: dto.message_count.unwrap_or(default.dto.message_count),
                interval_ms: dto.interval_ms.unwrap_or(default.dto.interval_ms),
            },
            latency: LatencySettings {
                topic: latency.topic.unwrap_or(default.latency.topic),
                message_count: latency
                    .message_count
                    .unwrap_or(default.latency.message_count),
                publish_rate: latency.publish_rate.unwrap_or(default.latency.publish_rate),
                long_latency_threshold_ms: latency
                    .long_latency_threshold_ms
                    .unwrap_or(default.latency.long_latency_threshold_ms),
                verbose: latency.verbose.unwrap_or(default.latency.verbose),
            },
        }
    }
}
