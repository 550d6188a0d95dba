use async_trait::async_trait;
use std::time::Duration;

use crate::error::ProviderError;

/// The keychain/wallet collaborator.
///
/// Key storage, address derivation, and signing live behind this boundary;
/// the broker only observes lock state and delegates network broadcasts.
#[async_trait]
pub trait WalletService: Send + Sync {
    /// Whether any key material has been provisioned at all.
    fn has_key_material(&self) -> bool;

    /// Whether the keychain is currently locked.
    fn is_locked(&self) -> bool;

    /// The active receive address, if one is derivable right now.
    fn active_address(&self) -> Option<String>;

    /// Chain identifier reported to pages.
    fn chain_id(&self) -> String;

    /// Park until the user unlocks the keychain or the deadline passes.
    ///
    /// Returns `Timeout` when the deadline elapses with the keychain still
    /// locked; never blocks the event loop.
    async fn await_unlock(&self, timeout: Duration) -> Result<(), ProviderError>;

    /// Submit an already-signed transaction to the network.
    ///
    /// Returns the network transaction id. Failures propagate verbatim so
    /// the caller can settle the pending request.
    async fn broadcast_transaction(&self, signed_hex: &str) -> Result<String, ProviderError>;
}
