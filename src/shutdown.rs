//! Cooperative shutdown latch.
//!
//! SIGINT and SIGTERM both set the same one-shot latch. Once requested, a
//! shutdown is never withdrawn; every blocking wait in the daemon races against
//! [`Shutdown::requested`] so it wakes as soon as the latch is set.
//!
//! The flag behind [`Shutdown::is_requested`] is written inside the signal
//! handler itself, so a child killed by the same group-wide signal is never
//! observed before the latch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Cloneable handle to the process-wide shutdown latch.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the latch. Idempotent.
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.token.is_cancelled()
    }

    /// Resolves once a shutdown has been requested (immediately if it already was).
    pub async fn requested(&self) {
        if self.flag.load(Ordering::SeqCst) {
            return;
        }
        self.token.cancelled().await
    }
}

/// Register SIGINT/SIGTERM on `shutdown`.
///
/// The handler only stores the atomic flag. A tokio task picks up the same
/// delivery to wake async waiters and log it.
pub fn install_signal_handlers(shutdown: &Shutdown) -> anyhow::Result<()> {
    for sig in [SIGINT, SIGTERM] {
        flag::register(sig, Arc::clone(&shutdown.flag))
            .with_context(|| format!("failed to register handler for signal {}", sig))?;
    }

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;

    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        tracing::info!(signal = name, "Shutdown requested");
        shutdown.request();
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn starts_unset() {
        assert!(!Shutdown::new().is_requested());
    }

    #[test]
    fn request_is_sticky_and_shared_by_clones() {
        let shutdown = Shutdown::new();
        let observer = shutdown.clone();
        shutdown.request();
        shutdown.request();
        assert!(observer.is_requested());
        assert!(shutdown.is_requested());
    }

    #[tokio::test]
    async fn requested_wakes_pending_waiter() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.requested().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.request();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn requested_resolves_immediately_once_set() {
        let shutdown = Shutdown::new();
        shutdown.request();
        tokio::time::timeout(Duration::from_millis(100), shutdown.requested())
            .await
            .expect("already-set latch must not block");
    }

    #[tokio::test]
    async fn signal_sets_latch_before_raise_returns() {
        use nix::sys::signal::{raise, Signal};

        let shutdown = Shutdown::new();
        install_signal_handlers(&shutdown).unwrap();

        raise(Signal::SIGTERM).unwrap();
        assert!(shutdown.is_requested());
        tokio::time::timeout(Duration::from_secs(1), shutdown.requested())
            .await
            .expect("async waiters should observe the signal too");
    }
}
