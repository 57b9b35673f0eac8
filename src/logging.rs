use time::UtcOffset;
use tracing_subscriber::{
    fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

use crate::{errors::InitializationError, RelayConfig, RelayError};

pub fn setup_logging(config: &RelayConfig) -> Result<(), RelayError> {
    // Validate logging config before proceeding
    config.logging.validate().map_err(RelayError::Config)?;

    let timer = OffsetTime::new(
        UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        time::format_description::well_known::Rfc3339,
    );

    // Determine base level filter
    let base_level = config.logging.get_level_filter();

    // Build the EnvFilter
    let mut env_filter = EnvFilter::default().add_directive(base_level.into());

    // If trace_frames is enabled, add more specific filtering
    if config.logging.trace_frames {
        env_filter = env_filter
            .add_directive("modbus_relay::protocol=trace".parse().unwrap())
            .add_directive("modbus_relay::transport=trace".parse().unwrap());
    }

    // Build and initialize the subscriber
    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(config.logging.thread_ids)
        .with_thread_names(config.logging.thread_names)
        .with_file(config.logging.include_location)
        .with_line_number(config.logging.include_location)
        .with_level(true)
        .with_timer(timer)
        .with_filter(env_filter);

    Registry::default().with(layer).try_init().map_err(|e| {
        RelayError::Init(InitializationError::logging(format!(
            "Failed to initialize logging: {}",
            e
        )))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tracing::level_filters::LevelFilter;

    use crate::config::LoggingConfig;

    #[test]
    fn test_log_config_validation() {
        let config = LoggingConfig {
            level: "invalid".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = LoggingConfig {
            level: "debug".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_level_filter() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            ..Default::default()
        };
        assert_eq!(config.get_level_filter(), LevelFilter::DEBUG);

        let config = LoggingConfig {
            level: "invalid".to_string(),
            ..Default::default()
        };
        assert_eq!(config.get_level_filter(), LevelFilter::INFO); // fallback
    }
}
