use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Run state of one worker task (dispatcher, monitor or listener).
///
/// Transitions only move forward: `NotStarted -> Running -> StopRequested ->
/// Stopped`, with `Running -> Stopped` when the worker ends on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted,
    Running,
    StopRequested,
    Stopped,
}

/// Shared, observable run state. The worker polls it at loop boundaries;
/// owners request a stop and can await the terminal state.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<LifecycleState>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LifecycleState::NotStarted);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// True until the worker has actually exited.
    pub fn is_alive(&self) -> bool {
        matches!(
            self.state(),
            LifecycleState::Running | LifecycleState::StopRequested
        )
    }

    pub fn mark_running(&self) {
        self.tx.send_replace(LifecycleState::Running);
    }

    /// Ask the worker to stop at its next loop boundary. Returns false when
    /// it was not running.
    pub fn request_stop(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == LifecycleState::Running {
                *state = LifecycleState::StopRequested;
                true
            } else {
                false
            }
        })
    }

    pub fn mark_stopped(&self) {
        self.tx.send_replace(LifecycleState::Stopped);
    }

    /// Resolves once a stop was requested or the worker finished.
    pub async fn stop_requested(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx
            .wait_for(|s| matches!(s, LifecycleState::StopRequested | LifecycleState::Stopped))
            .await;
    }

    /// Resolves once the worker has exited.
    pub async fn wait_stopped(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|s| *s == LifecycleState::Stopped).await;
    }

    /// Sleep for `period`, cut short by a stop request.
    pub async fn pause(&self, period: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = self.stop_requested() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_only_applies_to_running_worker() {
        let lc = Lifecycle::new();
        assert!(!lc.request_stop());
        assert_eq!(lc.state(), LifecycleState::NotStarted);
        lc.mark_running();
        assert!(lc.request_stop());
        assert!(!lc.request_stop());
        assert!(lc.is_alive());
        assert!(!lc.is_running());
        lc.mark_stopped();
        assert!(!lc.is_alive());
    }

    #[tokio::test]
    async fn pause_ends_early_on_stop() {
        let lc = Lifecycle::new();
        lc.mark_running();
        let waiter = {
            let lc = lc.clone();
            tokio::spawn(async move { lc.pause(Duration::from_secs(30)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        lc.request_stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("pause ignored the stop request")
            .unwrap();
    }

    #[tokio::test]
    async fn wait_stopped_returns_after_exit() {
        let lc = Lifecycle::new();
        lc.mark_running();
        let worker = lc.clone();
        tokio::spawn(async move {
            worker.stop_requested().await;
            worker.mark_stopped();
        });
        lc.request_stop();
        tokio::time::timeout(Duration::from_secs(1), lc.wait_stopped())
            .await
            .expect("worker never reported stopped");
    }
}
