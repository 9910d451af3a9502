//! Annulation coopérative d'une exécution.
//!
//! L'orchestrateur consulte le signal entre deux étapes et interrompt les
//! attentes (lecture du modèle, inférence distante). Les écritures en base
//! ne sont jamais interrompues : un job créé est toujours connu de
//! l'orchestrateur, qui peut alors le clore en échec.

use std::future::Future;
use tokio::sync::watch;

use crate::infrastructure::error::{AppError, AppResult};

/// Côté émetteur, conservé par celui qui peut annuler
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Côté récepteur, passé à l'exécution
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelSignal {
    /// Signal qui ne se déclenche jamais
    #[cfg(test)]
    pub fn never() -> Self {
        let (_, signal) = cancel_pair();
        signal
    }

    pub fn is_canceled(&self) -> bool {
        *self.rx.borrow()
    }

    /// `Err(Canceled)` si l'annulation a été demandée
    pub fn check(&self) -> AppResult<()> {
        if self.is_canceled() {
            return Err(AppError::Canceled);
        }
        Ok(())
    }

    /// Se résout à la demande d'annulation ; jamais si l'émetteur disparaît avant
    pub async fn canceled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|canceled| *canceled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Exécute `operation` jusqu'à son terme ou jusqu'à l'annulation
    pub async fn guard<T, F>(&self, operation: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.canceled() => Err(AppError::Canceled),
            result = operation => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_guard_interrupts_a_pending_wait() {
        let (handle, signal) = cancel_pair();
        assert!(signal.check().is_ok());

        let waiting = signal.guard(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        let cancel = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.cancel();
        };
        let (result, ()) = tokio::join!(waiting, cancel);

        assert!(matches!(result, Err(AppError::Canceled)));
        assert!(matches!(signal.check(), Err(AppError::Canceled)));
    }

    #[tokio::test]
    async fn test_never_lets_operations_finish() {
        let signal = CancelSignal::never();
        let value = signal.guard(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert!(!signal.is_canceled());
    }
}
