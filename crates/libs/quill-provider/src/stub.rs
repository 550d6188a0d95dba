use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

use crate::error::ProviderError;
use crate::traits::WalletService;

/// A configurable in-memory wallet for tests.
///
/// Starts provisioned, unlocked, with one active address. Tests flip lock
/// state, clear key material, or inject broadcast failures to drive the
/// broker through its failure branches.
pub struct StubWallet {
    state: Mutex<StubState>,
    unlocked: Notify,
}

struct StubState {
    has_key_material: bool,
    locked: bool,
    address: Option<String>,
    chain_id: String,
    broadcast_error: Option<ProviderError>,
    broadcasts: Vec<String>,
}

impl Default for StubWallet {
    fn default() -> Self {
        Self {
            state: Mutex::new(StubState {
                has_key_material: true,
                locked: false,
                address: Some("quill1qtestaddress0".to_string()),
                chain_id: "quill:mainnet".to_string(),
                broadcast_error: None,
                broadcasts: Vec::new(),
            }),
            unlocked: Notify::new(),
        }
    }
}

impl StubWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A wallet with no provisioned key material.
    pub fn unprovisioned() -> Self {
        let wallet = Self::default();
        {
            let mut state = wallet.state.lock().expect("stub state poisoned");
            state.has_key_material = false;
            state.address = None;
        }
        wallet
    }

    pub fn set_locked(&self, locked: bool) {
        self.state.lock().expect("stub state poisoned").locked = locked;
        if !locked {
            self.unlocked.notify_waiters();
        }
    }

    pub fn set_broadcast_error(&self, error: Option<ProviderError>) {
        self.state.lock().expect("stub state poisoned").broadcast_error = error;
    }

    /// Signed payloads handed to `broadcast_transaction`, in order.
    pub fn broadcasts(&self) -> Vec<String> {
        self.state.lock().expect("stub state poisoned").broadcasts.clone()
    }
}

#[async_trait]
impl WalletService for StubWallet {
    fn has_key_material(&self) -> bool {
        self.state.lock().expect("stub state poisoned").has_key_material
    }

    fn is_locked(&self) -> bool {
        self.state.lock().expect("stub state poisoned").locked
    }

    fn active_address(&self) -> Option<String> {
        self.state.lock().expect("stub state poisoned").address.clone()
    }

    fn chain_id(&self) -> String {
        self.state.lock().expect("stub state poisoned").chain_id.clone()
    }

    async fn await_unlock(&self, timeout: Duration) -> Result<(), ProviderError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.is_locked() {
                return Ok(());
            }
            let notified = self.unlocked.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(ProviderError::timeout("unlock"));
            }
        }
    }

    async fn broadcast_transaction(&self, signed_hex: &str) -> Result<String, ProviderError> {
        let mut state = self.state.lock().expect("stub state poisoned");
        if let Some(error) = state.broadcast_error.clone() {
            return Err(error);
        }
        state.broadcasts.push(signed_hex.to_string());
        Ok(format!("txid-{:04}", state.broadcasts.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn await_unlock_resolves_after_notify() {
        let wallet = std::sync::Arc::new(StubWallet::new());
        wallet.set_locked(true);

        let waiter = wallet.clone();
        let handle = tokio::spawn(async move {
            waiter.await_unlock(Duration::from_secs(5)).await
        });

        tokio::task::yield_now().await;
        wallet.set_locked(false);
        assert!(handle.await.expect("join").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn await_unlock_times_out_when_still_locked() {
        let wallet = StubWallet::new();
        wallet.set_locked(true);
        let result = wallet.await_unlock(Duration::from_secs(1)).await;
        assert_eq!(result, Err(ProviderError::timeout("unlock")));
    }

    #[tokio::test]
    async fn broadcast_records_payloads_in_order() {
        let wallet = StubWallet::new();
        let first = wallet.broadcast_transaction("aa00").await.expect("broadcast");
        let second = wallet.broadcast_transaction("bb11").await.expect("broadcast");
        assert_ne!(first, second);
        assert_eq!(wallet.broadcasts(), vec!["aa00".to_string(), "bb11".to_string()]);
    }
}
