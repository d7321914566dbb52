use super::{types::Config, ConfigError};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.database.reserve_wait_ms > config.database.busy_timeout_ms {
        return Err(invalid(
            "database.reserve_wait_ms cannot exceed database.busy_timeout_ms",
        ));
    }

    let base = &config.publisher.stream_base;
    if base.is_empty() {
        return Err(invalid("publisher.stream_base cannot be empty"));
    }
    if base.chars().any(char::is_whitespace) {
        return Err(invalid("publisher.stream_base cannot contain whitespace"));
    }
    if config.publisher.append_timeout_ms == 0 {
        return Err(invalid("publisher.append_timeout_ms must be positive"));
    }
    if config.publisher.writer_buffer == 0 || config.publisher.broadcast_capacity == 0 {
        return Err(invalid(
            "publisher.writer_buffer and publisher.broadcast_capacity must be positive",
        ));
    }

    if config.dispatcher.tick_interval_ms == 0 {
        return Err(invalid("dispatcher.tick_interval_ms must be positive"));
    }
    if config.dispatcher.replicas_per_queue == 0 {
        return Err(invalid("dispatcher.replicas_per_queue must be at least 1"));
    }
    if config.dispatcher.queues.iter().any(|&id| id <= 0) {
        return Err(invalid("dispatcher.queues entries must be positive"));
    }

    if config.notifier.ping_interval_secs == 0 {
        return Err(invalid("notifier.ping_interval_secs must be positive"));
    }

    Ok(())
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::ValidationError(msg.to_string())
}
