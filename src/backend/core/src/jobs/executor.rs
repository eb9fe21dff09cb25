//! Runs a single attempt of a unit of work.
//!
//! The attempt is bounded by its timeout, when it has one, and panics are
//! caught at this boundary, so every attempt ends in exactly one [`JobResult`].

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::job::{JobContext, JobError, JobResult, Work};

/// Result of one attempt together with how long it ran.
#[derive(Debug)]
pub struct AttemptOutcome {
    pub result: JobResult,
    pub elapsed: Duration,
}

/// Run one attempt of `work`. `None` runs it without a deadline.
pub async fn execute_attempt(
    work: Arc<dyn Work>,
    ctx: JobContext,
    timeout: Option<Duration>,
) -> AttemptOutcome {
    let job_id = ctx.job_id().clone();
    let attempt = ctx.attempt();
    let started = Instant::now();

    let guarded = AssertUnwindSafe(work.run(ctx)).catch_unwind();
    let finished = match timeout {
        Some(limit) => tokio::time::timeout(limit, guarded).await.map_err(|_| limit),
        None => Ok(guarded.await),
    };
    let result = match finished {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => {
            let message = panic_message(&*panic);
            warn!(job_id = %job_id, attempt, panic = %message, "Unit of work panicked");
            Err(JobError::execution(format!("panicked: {}", message)).with_code("PANIC"))
        }
        Err(limit) => {
            debug!(job_id = %job_id, attempt, timeout_ms = limit.as_millis() as u64, "Attempt timed out");
            Err(JobError::timeout(limit))
        }
    };

    AttemptOutcome {
        result,
        elapsed: started.elapsed(),
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::{JobErrorKind, JobId};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> JobContext {
        JobContext::new(
            JobId::new("track-1"),
            1,
            3,
            serde_json::Value::Null,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_successful_attempt() {
        let work: Arc<dyn Work> =
            Arc::new(|_ctx: JobContext| async { Ok::<_, JobError>(json!("done")) });

        let outcome = execute_attempt(work, ctx(), Some(Duration::from_secs(1))).await;
        assert_eq!(outcome.result.unwrap(), json!("done"));
    }

    #[tokio::test]
    async fn test_failed_attempt_keeps_error() {
        let work: Arc<dyn Work> = Arc::new(|_ctx: JobContext| async {
            Err::<serde_json::Value, _>(JobError::execution("exit status 1"))
        });

        let outcome = execute_attempt(work, ctx(), Some(Duration::from_secs(1))).await;
        let error = outcome.result.unwrap_err();
        assert_eq!(error.kind, JobErrorKind::Execution);
        assert_eq!(error.message, "exit status 1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let work: Arc<dyn Work> = Arc::new(|_ctx: JobContext| async {
            std::future::pending::<()>().await;
            Ok::<_, JobError>(serde_json::Value::Null)
        });

        let outcome = execute_attempt(work, ctx(), Some(Duration::from_millis(50))).await;
        assert_eq!(outcome.result.unwrap_err().kind, JobErrorKind::Timeout);
        assert!(outcome.elapsed >= Duration::from_millis(50));
        assert!(outcome.elapsed < Duration::from_millis(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_deadline_runs_to_completion() {
        let work: Arc<dyn Work> = Arc::new(|_ctx: JobContext| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, JobError>(json!("slow"))
        });

        let outcome = execute_attempt(work, ctx(), None).await;
        assert_eq!(outcome.result.unwrap(), json!("slow"));
        assert!(outcome.elapsed >= Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_async_panic_is_caught() {
        async fn explode_later(_ctx: JobContext) -> JobResult {
            tokio::task::yield_now().await;
            panic!("decoder exploded");
        }
        let work: Arc<dyn Work> = Arc::new(explode_later);

        let outcome = execute_attempt(work, ctx(), Some(Duration::from_secs(1))).await;
        let error = outcome.result.unwrap_err();
        assert_eq!(error.kind, JobErrorKind::Execution);
        assert_eq!(error.code.as_deref(), Some("PANIC"));
        assert!(error.message.contains("decoder exploded"));
    }

    #[tokio::test]
    async fn test_sync_panic_is_caught() {
        fn explode(ctx: JobContext) -> std::future::Ready<JobResult> {
            panic!("bad argument list for {}", ctx.job_id());
        }
        let work: Arc<dyn Work> = Arc::new(explode);

        let outcome = execute_attempt(work, ctx(), Some(Duration::from_secs(1))).await;
        let error = outcome.result.unwrap_err();
        assert!(error.message.contains("bad argument list for track-1"));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }
}
