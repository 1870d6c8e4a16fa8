//! Wallet capability: signing keys, local DIDs and pairwise relationships.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// A signing key held by the wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub verkey: String,
    #[serde(default)]
    pub metadata: Value,
}

/// A DID owned by this agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DidInfo {
    pub did: String,
    pub verkey: String,
    #[serde(default)]
    pub metadata: Value,
}

/// A pairwise relationship between one of our DIDs and a peer DID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseInfo {
    pub their_did: String,
    pub their_verkey: String,
    pub my_did: String,
    pub my_verkey: String,
    #[serde(default)]
    pub metadata: Value,
}

#[async_trait]
pub trait Wallet: Send + Sync {
    /// Create a new signing key, deterministic when `seed` is given.
    async fn create_signing_key(
        &self,
        seed: Option<&str>,
        metadata: Option<Value>,
    ) -> Result<KeyInfo, CoreError>;

    async fn get_signing_key(&self, verkey: &str) -> Result<KeyInfo, CoreError>;

    /// Create a local DID. `did` overrides the identifier derived from the key.
    async fn create_local_did(
        &self,
        seed: Option<&str>,
        did: Option<&str>,
        metadata: Option<Value>,
    ) -> Result<DidInfo, CoreError>;

    async fn get_local_did(&self, did: &str) -> Result<DidInfo, CoreError>;

    async fn get_local_did_for_verkey(&self, verkey: &str) -> Result<DidInfo, CoreError>;

    async fn get_local_dids(&self) -> Result<Vec<DidInfo>, CoreError>;

    async fn replace_local_did_metadata(&self, did: &str, metadata: Value) -> Result<(), CoreError>;

    /// Record a pairwise relationship. Fails with `WalletDuplicate` when
    /// `their_did` is already paired.
    async fn create_pairwise(
        &self,
        their_did: &str,
        their_verkey: &str,
        my_did: &str,
        metadata: Option<Value>,
    ) -> Result<PairwiseInfo, CoreError>;

    async fn get_pairwise_for_did(&self, their_did: &str) -> Result<PairwiseInfo, CoreError>;

    async fn get_pairwise_for_verkey(&self, their_verkey: &str) -> Result<PairwiseInfo, CoreError>;

    async fn get_pairwise_list(&self) -> Result<Vec<PairwiseInfo>, CoreError>;

    /// Sign `message` with the private key behind `from_verkey`.
    async fn sign_message(&self, message: &[u8], from_verkey: &str) -> Result<Vec<u8>, CoreError>;

    /// Check `signature` over `message` against `from_verkey`.
    async fn verify_message(
        &self,
        message: &[u8],
        signature: &[u8],
        from_verkey: &str,
    ) -> Result<bool, CoreError>;

    /// Create (or replace) the agent's public DID.
    async fn create_public_did(&self, seed: Option<&str>) -> Result<DidInfo, CoreError>;

    async fn get_public_did(&self) -> Result<Option<DidInfo>, CoreError>;
}
