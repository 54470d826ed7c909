use std::net::IpAddr;

use axum::http::HeaderMap;

pub mod args;
pub mod cors;
pub mod metrics;
pub mod shutdown;

/// Writes a readiness marker file. Mirrors the container-orchestrator
/// convention of signalling liveness via a file the runtime probes for.
pub fn signal_ready() {
    if let Ok(path) = std::env::var("DC2_READY_FILE") {
        let _ = std::fs::write(path, b"ready");
    }
}

pub fn get_source_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded_for) = headers.get("x-forwarded-for")
        && let Ok(forwarded_for) = forwarded_for.to_str()
        && let Some(ip_str) = forwarded_for.split(',').next()
        && let Ok(ip) = ip_str.trim().parse()
    {
        return Some(ip);
    }

    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(ip_str) = real_ip.to_str()
        && let Ok(ip) = ip_str.trim().parse()
    {
        return Some(ip);
    }

    None
}
