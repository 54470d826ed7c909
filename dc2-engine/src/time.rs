//! Timestamp formatting shared across lifecycle modules. Every wire response
//! that carries a time (`LaunchTime`, `CreateTime`, `AttachTime`, ...) uses
//! the same RFC 3339 UTC rendering.

use chrono::Utc;

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// `StateTransitionReason` uses AWS's "User initiated (2024-01-02 03:04:05 GMT)"
/// phrasing rather than RFC 3339 (`spec.md` §4.3).
pub fn now_gmt_display() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S GMT").to_string()
}
