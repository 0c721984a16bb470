//! Coordinator-visible execution outcome.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The outcome of a card's command execution, as seen by the review
/// coordinator and persisted with each review.
///
/// This is a projection of the sandbox layer's result plus the thinking time
/// (card shown to command launched) and the network posture the driver
/// actually used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock duration of the command itself.
    pub duration: Duration,
    /// Time from the card being shown to the command being launched.
    pub thinking_time: Duration,
    /// True when the command was terminated by its per-command deadline.
    pub timed_out: bool,
    pub container_id: String,
    pub image_used: String,
    pub network_enabled: bool,
}

impl ExecutionResult {
    /// Project a sandbox-layer result into the coordinator-visible form,
    /// attaching the thinking time and the network posture actually used.
    pub fn from_sandbox(
        result: &crate::traits::ExecutionResult,
        thinking_time: Duration,
        network_enabled: bool,
    ) -> Self {
        Self {
            success: result.success,
            exit_code: result.exit_code,
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            duration: result.duration,
            thinking_time,
            timed_out: result.timed_out,
            container_id: result.container_id.clone(),
            image_used: result.image_used.clone(),
            network_enabled,
        }
    }
}
