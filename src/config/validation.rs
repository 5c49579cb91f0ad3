use super::types::*;

pub fn validate_config(config: &Config) -> Result<(), String> {
    let queue_service = &config.queue_service;
    if queue_service.host.is_empty() {
        return Err("Queue service host cannot be empty".into());
    }

    if queue_service.port == 0 {
        return Err("Queue service port cannot be 0".into());
    }

    if queue_service.qos > 2 {
        return Err("QoS must be between 0 and 2".into());
    }

    for (source, stream) in &queue_service.streams {
        if source.is_empty() || stream.is_empty() {
            return Err("Stream mappings cannot contain empty queue names".into());
        }
    }

    let dashboard = &config.dashboard;
    if dashboard.streams.is_empty() {
        return Err("No dashboard stream queues defined".into());
    }

    if dashboard.streams.iter().any(|s| s.is_empty()) {
        return Err("Dashboard stream queue names cannot be empty".into());
    }

    if dashboard.ring_size == 0 {
        return Err("Dashboard ring_size must be greater than 0".into());
    }

    if dashboard.wait_ms == 0 {
        return Err("Dashboard wait_ms must be greater than 0".into());
    }

    if dashboard.snapshot_interval_ms == 0 {
        return Err("Dashboard snapshot_interval_ms must be greater than 0".into());
    }

    if config.spin.queue.is_empty() {
        return Err("Spin queue cannot be empty".into());
    }

    if config.spin.wait_ms == 0 {
        return Err("Spin wait_ms must be greater than 0".into());
    }

    Ok(())
}
