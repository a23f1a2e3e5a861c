//! Human-readable renderings of measured values.

/// Megabits per second, switching to Gbps from 1000 Mbps up.
pub fn format_bandwidth(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.2} Gbps", mbps / 1000.0)
    } else {
        format!("{:.2} Mbps", mbps)
    }
}

/// Microseconds, switching to milliseconds from 1000 μs up.
pub fn format_latency(us: f64) -> String {
    if us >= 1000.0 {
        format!("{:.2} ms", us / 1000.0)
    } else {
        format!("{:.2} μs", us)
    }
}

pub fn format_jitter(ms: f64) -> String {
    format!("{:.3} ms", ms)
}

pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value)
}
