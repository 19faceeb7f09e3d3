use super::*;

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB_em540".to_string(),
            baud_rate: 115_200,
            unit_id: 1,
            parity: "none".to_string(),
            data_bits: 8,
            stop_bits: 1,
            read_timeout_ms: 2000,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3725,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "em540".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/em540_exporter.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            web: WebConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
            poll_interval_ms: 1000,
        }
    }
}
