//! Deadline-bounded execution of a single upstream call
//!
//! The caller always regains control within the timeout, whatever the call
//! does. The call runs in a unit of execution the caller does not own and is
//! raced against a timer; on timeout it is abandoned, never awaited.
//!
//! Two strategies sit behind the same `invoke`:
//! - `Preemptive`: spawn on the current runtime, `abort()` the task at the
//!   deadline. Resources held by the call are released by the runtime.
//! - `Isolated`: run on a dedicated OS thread with its own current-thread
//!   runtime. Bounded even when the call blocks its executor, at the cost of a
//!   thread per attempt and a detached thread on timeout.
//!
//! `Invoker::detect` prefers `Preemptive` where the runtime can keep the timer
//! alive next to a misbehaving task (multi-thread), and falls back to
//! `Isolated` otherwise.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};
use upstream::UpstreamError;

/// How the invoker isolates the call from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Preemptive,
    Isolated,
}

/// Result of racing a call against its deadline.
#[derive(Debug)]
pub enum Invocation<T> {
    Completed(T),
    TimedOut,
}

/// Runs one call under a hard wall-clock deadline. Holds no pool state.
#[derive(Debug, Clone, Copy)]
pub struct Invoker {
    strategy: Strategy,
}

impl Invoker {
    pub fn new(strategy: Strategy) -> Self {
        Self { strategy }
    }

    /// Pick the strategy for the runtime we are running on.
    pub fn detect() -> Self {
        let strategy = match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                Strategy::Preemptive
            }
            _ => Strategy::Isolated,
        };
        debug!(?strategy, "selected invoker strategy");
        Self { strategy }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Run `call` and return within `timeout`.
    ///
    /// A call that panics or whose executor disappears completes with
    /// `UpstreamError::Internal`; it is not reported as a timeout.
    ///
    /// Under `Isolated` the call is polled by a runtime that is dropped when the
    /// call finishes, so it must not rely on resources bound to the caller's
    /// runtime.
    pub async fn invoke<T, F>(&self, call: F, timeout: Duration) -> Invocation<upstream::Result<T>>
    where
        F: Future<Output = upstream::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        match self.strategy {
            Strategy::Preemptive => invoke_preemptive(call, timeout).await,
            Strategy::Isolated => invoke_isolated(call, timeout).await,
        }
    }
}

async fn invoke_preemptive<T, F>(call: F, timeout: Duration) -> Invocation<upstream::Result<T>>
where
    F: Future<Output = upstream::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut handle = tokio::spawn(call);
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(result)) => Invocation::Completed(result),
        Ok(Err(join_error)) => Invocation::Completed(Err(UpstreamError::Internal(format!(
            "upstream task failed: {join_error}"
        )))),
        Err(_) => {
            handle.abort();
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "upstream call exceeded deadline, task aborted"
            );
            Invocation::TimedOut
        }
    }
}

async fn invoke_isolated<T, F>(call: F, timeout: Duration) -> Invocation<upstream::Result<T>>
where
    F: Future<Output = upstream::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = tokio::sync::oneshot::channel();

    let spawned = std::thread::Builder::new()
        .name("upstream-call".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = tx.send(Err(UpstreamError::Internal(format!(
                        "failed to build call runtime: {e}"
                    ))));
                    return;
                }
            };
            let result = runtime.block_on(call);
            // Receiver is gone if the caller already timed out
            let _ = tx.send(result);
        });

    if let Err(e) = spawned {
        return Invocation::Completed(Err(UpstreamError::Internal(format!(
            "failed to spawn call thread: {e}"
        ))));
    }

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(result)) => Invocation::Completed(result),
        Ok(Err(_)) => Invocation::Completed(Err(UpstreamError::Internal(
            "upstream call thread exited without a result".into(),
        ))),
        Err(_) => {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "upstream call exceeded deadline, thread abandoned"
            );
            Invocation::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant as StdInstant;
    use upstream::Generation;

    fn ok(text: &str) -> upstream::Result<Generation> {
        Ok(Generation { text: text.into() })
    }

    #[tokio::test(start_paused = true)]
    async fn preemptive_returns_completed_result() {
        let invoker = Invoker::new(Strategy::Preemptive);
        let outcome = invoker
            .invoke(async { ok("fast") }, Duration::from_secs(10))
            .await;
        assert!(matches!(outcome, Invocation::Completed(Ok(ref g)) if g.text == "fast"));
    }

    #[tokio::test(start_paused = true)]
    async fn preemptive_passes_through_call_errors() {
        let invoker = Invoker::new(Strategy::Preemptive);
        let outcome = invoker
            .invoke(
                async {
                    Err::<Generation, _>(UpstreamError::Api {
                        status: 429,
                        message: "quota".into(),
                    })
                },
                Duration::from_secs(10),
            )
            .await;
        assert!(matches!(
            outcome,
            Invocation::Completed(Err(UpstreamError::Api { status: 429, .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn preemptive_times_out_at_deadline() {
        let invoker = Invoker::new(Strategy::Preemptive);
        let start = tokio::time::Instant::now();
        let outcome = invoker
            .invoke(
                async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    ok("late")
                },
                Duration::from_secs(10),
            )
            .await;
        assert!(matches!(outcome, Invocation::TimedOut));
        let waited = start.elapsed();
        assert!(
            waited >= Duration::from_secs(10) && waited < Duration::from_secs(11),
            "waited {waited:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn preemptive_aborts_the_abandoned_call() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let invoker = Invoker::new(Strategy::Preemptive);

        let outcome = invoker
            .invoke(
                async move {
                    tokio::time::sleep(Duration::from_secs(20)).await;
                    flag.store(true, Ordering::SeqCst);
                    ok("late")
                },
                Duration::from_secs(10),
            )
            .await;
        assert!(matches!(outcome, Invocation::TimedOut));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!finished.load(Ordering::SeqCst), "aborted call kept running");
    }

    #[tokio::test(start_paused = true)]
    async fn preemptive_reports_panics_as_internal() {
        let invoker = Invoker::new(Strategy::Preemptive);
        let outcome = invoker
            .invoke(
                async {
                    if true {
                        panic!("boom");
                    }
                    ok("unreachable")
                },
                Duration::from_secs(10),
            )
            .await;
        assert!(matches!(
            outcome,
            Invocation::Completed(Err(UpstreamError::Internal(_)))
        ));
    }

    #[tokio::test]
    async fn isolated_returns_completed_result() {
        let invoker = Invoker::new(Strategy::Isolated);
        let outcome = invoker
            .invoke(async { ok("threaded") }, Duration::from_secs(5))
            .await;
        assert!(matches!(outcome, Invocation::Completed(Ok(ref g)) if g.text == "threaded"));
    }

    #[tokio::test]
    async fn isolated_bounds_a_blocking_call() {
        let invoker = Invoker::new(Strategy::Isolated);
        let start = StdInstant::now();
        let outcome = invoker
            .invoke(
                async {
                    // Blocks its executor thread outright; no await point to cancel at
                    std::thread::sleep(Duration::from_secs(2));
                    ok("late")
                },
                Duration::from_millis(200),
            )
            .await;
        assert!(matches!(outcome, Invocation::TimedOut));
        assert!(
            start.elapsed() < Duration::from_secs(1),
            "caller waited {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn isolated_reports_panics_as_internal() {
        let invoker = Invoker::new(Strategy::Isolated);
        let outcome = invoker
            .invoke(
                async {
                    if true {
                        panic!("boom");
                    }
                    ok("unreachable")
                },
                Duration::from_secs(5),
            )
            .await;
        assert!(matches!(
            outcome,
            Invocation::Completed(Err(UpstreamError::Internal(_)))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn detect_prefers_preemptive_on_multi_thread_runtime() {
        assert_eq!(Invoker::detect().strategy(), Strategy::Preemptive);
    }

    #[tokio::test]
    async fn detect_falls_back_to_isolated_on_current_thread_runtime() {
        assert_eq!(Invoker::detect().strategy(), Strategy::Isolated);
    }

    #[test]
    fn detect_falls_back_to_isolated_without_runtime() {
        assert_eq!(Invoker::detect().strategy(), Strategy::Isolated);
    }
}
