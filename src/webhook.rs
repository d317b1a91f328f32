//! Outbound side-effects fired on a job's terminal state: the caller's
//! webhook and an upstream GitHub issue comment.
//!
//! Grounded on `original_source/src/core/job_manager.py`'s
//! `_send_callback`/`_send_github_comment`: fire-and-forget, a fixed 10 s
//! timeout, failures logged and never retried. Nothing else here has an
//! outbound webhook of its own, so the HTTP leg is built directly against
//! `reqwest` (already pulled in for the browser-download fetcher) rather
//! than ported from an existing file.

use crate::job_broker::{Job, JobStatus};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct CallbackPayload<'a> {
    job_id: uuid::Uuid,
    url: &'a str,
    status: &'a str,
    data: &'a Option<crate::extractor::Artifact>,
    error: Option<&'a str>,
    error_details: &'a Option<crate::job_broker::job::ErrorDetails>,
}

/// Spawn the callback and/or issue-comment tasks for a job's terminal
/// state. Returns immediately; neither task blocks the worker that called
/// it, matching `asyncio.create_task(self._send_callback_async(job))`.
pub fn dispatch_side_effects(job: Job, github_repo: String) {
    if job.callback_url.is_some() {
        let job = job.clone();
        tokio::spawn(async move { send_callback(&job).await });
    }
    if job.issue_ref.is_some() {
        tokio::spawn(async move { send_github_comment(&job, &github_repo).await });
    }
}

async fn send_callback(job: &Job) {
    let Some(callback_url) = &job.callback_url else { return };

    let payload = CallbackPayload {
        job_id: job.id,
        url: &job.url,
        status: job.status.as_str(),
        data: &job.result,
        error: job.error.as_ref().map(|e| e.message.as_str()),
        error_details: &job.error,
    };

    let client = match reqwest::Client::builder().timeout(CALLBACK_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            error!(job_id = %job.id, error = %e, "failed to build webhook client");
            return;
        }
    };

    match client.post(callback_url).json(&payload).send().await {
        Ok(resp) if resp.status().is_success() => {
            info!(job_id = %job.id, callback_url, "webhook delivered");
        }
        Ok(resp) => {
            error!(job_id = %job.id, callback_url, status = %resp.status(), "webhook rejected");
        }
        Err(e) => {
            error!(job_id = %job.id, callback_url, error = %e, "failed to send webhook");
        }
    }
}

/// Shells out to `gh issue comment`, matching
/// `subprocess.run(["gh", "issue", "comment", ...])`'s message format
/// exactly so downstream issue threads read the same either way.
async fn send_github_comment(job: &Job, repo: &str) {
    let Some(issue_ref) = job.issue_ref else { return };

    let body = if job.status == JobStatus::Completed {
        let size_kb = job.result.as_ref().map(|a| a.markdown.len()).unwrap_or(0) as f64 / 1024.0;
        format!("\u{2705} **Done**: Extracted {size_kb:.1}KB markdown for {}", job.url)
    } else {
        let retry_text = if job.error.as_ref().is_some_and(|e| e.retryable) { "(retryable)" } else { "(fatal)" };
        let message = job.error.as_ref().map(|e| e.message.as_str()).unwrap_or("unknown error");
        format!("\u{274c} **Failed**: {message} {retry_text}")
    };

    let output = tokio::process::Command::new("gh")
        .args(["issue", "comment", &issue_ref.to_string(), "--body", &body, "--repo", repo])
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            info!(job_id = %job.id, issue_ref, "github comment sent");
        }
        Ok(output) => {
            error!(job_id = %job.id, issue_ref, stderr = %String::from_utf8_lossy(&output.stderr), "gh issue comment failed");
        }
        Err(e) => {
            error!(job_id = %job.id, issue_ref, error = %e, "failed to spawn gh issue comment");
        }
    }
}
