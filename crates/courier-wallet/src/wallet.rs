use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::RwLock;

use courier_core::{CoreError, DidInfo, KeyInfo, PairwiseInfo, Wallet};
use courier_crypto::{did_from_public_key, seed_from_str, sign, verify_with_verkey, CryptoError, KeyPair};

struct StoredKey {
    keypair: KeyPair,
    metadata: Value,
}

/// Wallet keeping keys, DIDs and pairwise relationships in memory.
pub struct BasicWallet {
    /// Verkey → key pair.
    keys: DashMap<String, StoredKey>,
    /// Unqualified DID → local DID.
    local_dids: DashMap<String, DidInfo>,
    /// Their DID → pairwise relationship.
    pairwise: DashMap<String, PairwiseInfo>,
    public_did: RwLock<Option<String>>,
}

impl Default for BasicWallet {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicWallet {
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
            local_dids: DashMap::new(),
            pairwise: DashMap::new(),
            public_did: RwLock::new(None),
        }
    }

    fn keypair_for(seed: Option<&str>) -> Result<KeyPair, CoreError> {
        match seed {
            Some(seed) => {
                let bytes = seed_from_str(seed).map_err(crypto_to_wallet)?;
                Ok(KeyPair::from_seed(&bytes))
            }
            None => Ok(KeyPair::generate()),
        }
    }

    fn store_key(&self, keypair: KeyPair, metadata: Value) -> String {
        let verkey = keypair.verkey();
        self.keys
            .entry(verkey.clone())
            .or_insert(StoredKey { keypair, metadata });
        verkey
    }
}

fn crypto_to_wallet(e: CryptoError) -> CoreError {
    CoreError::WalletError(e.to_string())
}

#[async_trait]
impl Wallet for BasicWallet {
    async fn create_signing_key(
        &self,
        seed: Option<&str>,
        metadata: Option<Value>,
    ) -> Result<KeyInfo, CoreError> {
        let keypair = Self::keypair_for(seed)?;
        let verkey = keypair.verkey();
        if self.keys.contains_key(&verkey) {
            return Err(CoreError::WalletDuplicate(format!(
                "signing key already exists: {}",
                verkey
            )));
        }
        let metadata = metadata.unwrap_or(Value::Null);
        self.store_key(keypair, metadata.clone());
        tracing::debug!(verkey = %verkey, "signing key created");
        Ok(KeyInfo { verkey, metadata })
    }

    async fn get_signing_key(&self, verkey: &str) -> Result<KeyInfo, CoreError> {
        self.keys
            .get(verkey)
            .map(|k| KeyInfo {
                verkey: verkey.to_string(),
                metadata: k.metadata.clone(),
            })
            .ok_or_else(|| CoreError::WalletNotFound(format!("unknown key: {}", verkey)))
    }

    async fn create_local_did(
        &self,
        seed: Option<&str>,
        did: Option<&str>,
        metadata: Option<Value>,
    ) -> Result<DidInfo, CoreError> {
        let keypair = Self::keypair_for(seed)?;
        let did = match did {
            Some(did) => did.to_string(),
            None => did_from_public_key(&keypair.public_key()),
        };
        if self.local_dids.contains_key(&did) {
            return Err(CoreError::WalletDuplicate(format!("DID already exists: {}", did)));
        }
        let verkey = self.store_key(keypair, Value::Null);
        let info = DidInfo {
            did: did.clone(),
            verkey,
            metadata: metadata.unwrap_or(Value::Null),
        };
        self.local_dids.insert(did.clone(), info.clone());
        tracing::debug!(did = %did, "local DID created");
        Ok(info)
    }

    async fn get_local_did(&self, did: &str) -> Result<DidInfo, CoreError> {
        self.local_dids
            .get(did)
            .map(|d| d.value().clone())
            .ok_or_else(|| CoreError::WalletNotFound(format!("unknown DID: {}", did)))
    }

    async fn get_local_did_for_verkey(&self, verkey: &str) -> Result<DidInfo, CoreError> {
        self.local_dids
            .iter()
            .find(|d| d.verkey == verkey)
            .map(|d| d.value().clone())
            .ok_or_else(|| CoreError::WalletNotFound(format!("no DID for verkey: {}", verkey)))
    }

    async fn get_local_dids(&self) -> Result<Vec<DidInfo>, CoreError> {
        Ok(self.local_dids.iter().map(|d| d.value().clone()).collect())
    }

    async fn replace_local_did_metadata(&self, did: &str, metadata: Value) -> Result<(), CoreError> {
        let mut entry = self
            .local_dids
            .get_mut(did)
            .ok_or_else(|| CoreError::WalletNotFound(format!("unknown DID: {}", did)))?;
        entry.metadata = metadata;
        Ok(())
    }

    async fn create_pairwise(
        &self,
        their_did: &str,
        their_verkey: &str,
        my_did: &str,
        metadata: Option<Value>,
    ) -> Result<PairwiseInfo, CoreError> {
        let mine = self.get_local_did(my_did).await?;
        if self.pairwise.contains_key(their_did) {
            return Err(CoreError::WalletDuplicate(format!(
                "pairwise already exists for {}",
                their_did
            )));
        }
        let info = PairwiseInfo {
            their_did: their_did.to_string(),
            their_verkey: their_verkey.to_string(),
            my_did: mine.did,
            my_verkey: mine.verkey,
            metadata: metadata.unwrap_or(Value::Null),
        };
        self.pairwise.insert(their_did.to_string(), info.clone());
        tracing::debug!(their_did = %their_did, my_did = %my_did, "pairwise created");
        Ok(info)
    }

    async fn get_pairwise_for_did(&self, their_did: &str) -> Result<PairwiseInfo, CoreError> {
        self.pairwise
            .get(their_did)
            .map(|p| p.value().clone())
            .ok_or_else(|| CoreError::WalletNotFound(format!("no pairwise for {}", their_did)))
    }

    async fn get_pairwise_for_verkey(&self, their_verkey: &str) -> Result<PairwiseInfo, CoreError> {
        self.pairwise
            .iter()
            .find(|p| p.their_verkey == their_verkey)
            .map(|p| p.value().clone())
            .ok_or_else(|| CoreError::WalletNotFound(format!("no pairwise for verkey {}", their_verkey)))
    }

    async fn get_pairwise_list(&self) -> Result<Vec<PairwiseInfo>, CoreError> {
        Ok(self.pairwise.iter().map(|p| p.value().clone()).collect())
    }

    async fn sign_message(&self, message: &[u8], from_verkey: &str) -> Result<Vec<u8>, CoreError> {
        let key = self
            .keys
            .get(from_verkey)
            .ok_or_else(|| CoreError::WalletNotFound(format!("unknown key: {}", from_verkey)))?;
        Ok(sign(message, &key.keypair).to_bytes().to_vec())
    }

    async fn verify_message(
        &self,
        message: &[u8],
        signature: &[u8],
        from_verkey: &str,
    ) -> Result<bool, CoreError> {
        match verify_with_verkey(message, signature, from_verkey) {
            Ok(()) => Ok(true),
            Err(CryptoError::SignatureVerificationFailed) | Err(CryptoError::InvalidInput(_)) => {
                Ok(false)
            }
            Err(e) => Err(crypto_to_wallet(e)),
        }
    }

    async fn create_public_did(&self, seed: Option<&str>) -> Result<DidInfo, CoreError> {
        let keypair = Self::keypair_for(seed)?;
        let did = did_from_public_key(&keypair.public_key());
        let info = match self.get_local_did(&did).await {
            Ok(existing) => existing,
            Err(_) => self.create_local_did(seed, None, None).await?,
        };
        *self.public_did.write().await = Some(info.did.clone());
        tracing::info!(did = %info.did, "public DID set");
        Ok(info)
    }

    async fn get_public_did(&self) -> Result<Option<DidInfo>, CoreError> {
        let public = self.public_did.read().await.clone();
        match public {
            Some(did) => Ok(Some(self.get_local_did(&did).await?)),
            None => Ok(None),
        }
    }
}
