use std::ops::Deref;
use std::str::FromStr;

use envconfig::Envconfig;

/// Boolean that also accepts 1/0, yes/no and on/off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlexBool(pub bool);

impl FromStr for FlexBool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(FlexBool(true)),
            "false" | "0" | "no" | "off" | "" => Ok(FlexBool(false)),
            _ => Err(format!("Invalid boolean value: {}", s)),
        }
    }
}

impl Deref for FlexBool {
    type Target = bool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8080")]
    pub port: u16,

    // Injected by Cloud Run, takes precedence over BIND_PORT
    #[envconfig(from = "PORT")]
    pub platform_port: Option<u16>,

    /// Trained model, as written by `delay-train --output`
    #[envconfig(from = "MODEL_PATH", default = "")]
    pub model_path: String,

    /// Flights CSV to train on at startup when no MODEL_PATH is given
    #[envconfig(from = "TRAINING_DATA_PATH", default = "")]
    pub training_data_path: String,

    #[envconfig(from = "MAX_CONCURRENCY", default = "1000")]
    pub max_concurrency: usize,

    #[envconfig(from = "ENABLE_METRICS", default = "false")]
    pub enable_metrics: FlexBool,

    #[envconfig(from = "DEBUG", default = "false")]
    pub debug: FlexBool,

    #[envconfig(from = "OTEL_URL")]
    pub otel_url: Option<String>,

    #[envconfig(from = "OTEL_SAMPLING_RATE", default = "1.0")]
    pub otel_sampling_rate: f64,

    #[envconfig(from = "OTEL_SERVICE_NAME", default = "delay-api")]
    pub otel_service_name: String,

    #[envconfig(from = "OTEL_LOG_LEVEL", default = "info")]
    pub otel_log_level: tracing::Level,

    #[envconfig(from = "OTEL_EXPORT_TIMEOUT_SECS", default = "3")]
    pub otel_export_timeout_secs: u64,
}

impl Config {
    pub fn bind(&self) -> String {
        let port = self.platform_port.unwrap_or(self.port);
        format!("{}:{}", self.host, port)
    }

    pub fn default_test_config() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            platform_port: None,
            model_path: "".to_string(),
            training_data_path: "".to_string(),
            max_concurrency: 1000,
            enable_metrics: FlexBool(false),
            debug: FlexBool(false),
            otel_url: None,
            otel_sampling_rate: 1.0,
            otel_service_name: "delay-api".to_string(),
            otel_log_level: tracing::Level::ERROR,
            otel_export_timeout_secs: 3,
        }
    }
}
