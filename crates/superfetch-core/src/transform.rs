//! Transform worker pool task/result types (spec §3 "Transform Task", §4.6).

use serde::Serialize;

#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub include_metadata: bool,
    pub skip_noise_removal: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            include_metadata: true,
            skip_noise_removal: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformTask {
    pub id: String,
    pub html: String,
    pub url: String,
    pub options: TransformOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransformResult {
    pub markdown: String,
    pub title: Option<String>,
    pub truncated: bool,
}

/// Terminal states of a `TransformTask` (spec §4.6 "exactly one terminal transition").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutcome {
    Completed,
    Failed,
    TimedOut,
    Canceled,
}
