use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Periodic callback running on its own task until stopped.
pub struct Ticker;

/// Stops the ticker when `stop` is awaited. Dropping it also ends the loop.
pub struct TickerHandle {
    quit: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Ticker {
    /// Invoke `callback` once immediately, then every `interval`.
    pub fn start<F>(interval: Duration, mut callback: F) -> TickerHandle
    where
        F: FnMut() + Send + 'static,
    {
        let (quit_tx, mut quit_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => callback(),
                    _ = &mut quit_rx => break,
                }
            }
        });
        TickerHandle {
            quit: Some(quit_tx),
            task,
        }
    }
}

impl TickerHandle {
    pub async fn stop(mut self) {
        if let Some(quit) = self.quit.take() {
            let _ = quit.send(());
        }
        let _ = (&mut self.task).await;
    }
}
