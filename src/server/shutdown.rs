use tokio::sync::watch;

pub fn shutdown_signal() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);

    (ShutdownHandle { tx }, ShutdownSignal { rx })
}

/// Dropping the handle, or calling `shutdown()`, stops every task holding a matching signal.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown is requested. Resolves immediately if it already was.
    pub async fn recv(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            // We don't care if the handle sent a value or dropped
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn every_clone_observes_shutdown() {
        let (handle, signal) = shutdown_signal();
        let mut a = signal.clone();
        let mut b = signal;

        tokio::time::timeout(Duration::from_millis(10), a.recv())
            .await
            .expect_err("Expected timeout");

        handle.shutdown();
        a.recv().await;
        b.recv().await;
        assert!(b.is_shutdown());
    }

    #[tokio::test]
    async fn dropping_handle_is_shutdown() {
        let (handle, mut signal) = shutdown_signal();
        drop(handle);
        signal.recv().await;
    }
}
