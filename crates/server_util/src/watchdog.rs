use log::error;
use std::future::Future;
use std::time::Duration;

/// Result of racing an operation against a deadline.
#[derive(Debug)]
pub enum WatchdogOutcome<T> {
    Completed(T),
    TimedOut,
}

/// Runs `fut` and returns its result, unless `deadline` elapses first.
///
/// Does not itself take any drastic action on timeout; pair with [`escalate`]
/// at the call site once the caller has logged whatever context it has.
pub async fn watch<F: Future>(deadline: Duration, label: &str, fut: F) -> WatchdogOutcome<F::Output> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(value) => WatchdogOutcome::Completed(value),
        Err(_) => {
            error!("watchdog: {label} did not complete within {deadline:?}");
            WatchdogOutcome::TimedOut
        }
    }
}

/// Abrupt termination for a shutdown that could not complete cleanly.
/// Only ever called after [`watch`] reports [`WatchdogOutcome::TimedOut`].
pub fn escalate(label: &str) -> ! {
    error!("watchdog: {label} exceeded its shutdown deadline, terminating process");
    std::process::exit(1)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn completes_when_fast_enough() {
        let outcome = watch(Duration::from_millis(50), "test", async { 7 }).await;
        assert!(matches!(outcome, WatchdogOutcome::Completed(7)));
    }

    #[tokio::test]
    async fn times_out_when_too_slow() {
        let outcome = watch(Duration::from_millis(5), "test", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        })
        .await;
        assert!(matches!(outcome, WatchdogOutcome::TimedOut));
    }
}
