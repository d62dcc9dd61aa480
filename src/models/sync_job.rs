// src/models/sync_job.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum JobType {
    ForwardCatchup,
    BackwardHistory,
    InitialLoad,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ForwardCatchup => "ForwardCatchup",
            JobType::BackwardHistory => "BackwardHistory",
            JobType::InitialLoad => "InitialLoad",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ForwardCatchup" => Some(JobType::ForwardCatchup),
            "BackwardHistory" => Some(JobType::BackwardHistory),
            "InitialLoad" => Some(JobType::InitialLoad),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Running => "Running",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(JobStatus::Pending),
            "Running" => Some(JobStatus::Running),
            "Completed" => Some(JobStatus::Completed),
            "Failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// A persistent sync job (§3.1). Status transitions are
/// `Pending -> Running -> {Completed, Failed}` only, CAS-verified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncJob {
    pub id: i64,
    pub chat_id: String,
    pub job_type: JobType,
    pub priority: i64,
    pub status: JobStatus,
    pub cursor_start: Option<i64>,
    pub cursor_end: Option<i64>,
    pub messages_fetched: i64,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}
