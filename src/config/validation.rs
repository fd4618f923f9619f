//! Configuration validation.

use crate::config::Config;

/// Validate the configuration.
///
/// Checks for:
/// - Producer URLs with a supported scheme and a host
/// - Non-zero timeouts
/// - A sane backoff (multiplier >= 1, initial delay <= max delay)
/// - A metrics path starting with `/`
/// - A known log level
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing the problem.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();
    let producer = &config.producer;

    check_url(&producer.api_url, &["http"], "producer.api_url", &mut errors);
    check_url(&producer.channel_url, &["ws"], "producer.channel_url", &mut errors);

    if producer.fetch_timeout.is_zero() {
        errors.push("producer.fetch_timeout must be greater than zero".to_string());
    }

    if producer.connect_timeout.is_zero() {
        errors.push("producer.connect_timeout must be greater than zero".to_string());
    }

    // Validate reconnect backoff
    let reconnect = &config.reconnect;
    if !reconnect.multiplier.is_finite() || reconnect.multiplier < 1.0 {
        errors.push(format!(
            "reconnect.multiplier must be a finite number >= 1.0, got {}",
            reconnect.multiplier
        ));
    }

    if reconnect.initial_delay > reconnect.max_delay {
        errors.push(format!(
            "reconnect.initial_delay ({}) exceeds reconnect.max_delay ({})",
            humantime::format_duration(reconnect.initial_delay),
            humantime::format_duration(reconnect.max_delay)
        ));
    }

    if reconnect.max_attempts == Some(0) {
        errors.push("reconnect.max_attempts must be >= 1 when set".to_string());
    }

    if !config.server.metrics_path.starts_with('/') {
        errors.push(format!(
            "server.metrics_path '{}' must start with '/'",
            config.server.metrics_path
        ));
    }

    // Validate log level
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

fn check_url(url: &str, schemes: &[&str], field: &str, errors: &mut Vec<String>) {
    let uri = match url.parse::<hyper::Uri>() {
        Ok(uri) => uri,
        Err(e) => {
            errors.push(format!("{} '{}' is not a valid URL: {}", field, url, e));
            return;
        }
    };

    match uri.scheme_str() {
        Some(scheme) if schemes.contains(&scheme) => {}
        other => errors.push(format!(
            "{} '{}' has unsupported scheme {:?} (expected {})",
            field,
            url,
            other.unwrap_or(""),
            schemes.join(" or ")
        )),
    }

    if uri.host().is_none() {
        errors.push(format!("{} '{}' has no host", field, url));
    }
}
