// src/models/rate_limit.rs

use serde::{Deserialize, Serialize};

/// A remote-imposed temporary block on a specific method (§3.1, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FloodWaitBlock {
    pub method: String,
    pub blocked_until: i64,
    pub wait_seconds: i64,
}

/// `RateLimitsService::get_status` payload (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RateLimitStatus {
    pub total_calls: i64,
    pub calls_by_method: std::collections::HashMap<String, i64>,
    pub active_flood_waits: Vec<FloodWaitBlock>,
}
