//! Address & transaction service.
//!
//! Holds the account-level keys exported from the master key and answers
//! per-user requests: the receiving address of a user, and transfers
//! between users funded from the sender's unspent outputs.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chain_btc::source::{MemoryUtxoSource, SourcePool, UtxoSource};
use chain_btc::transaction::{build_p2pkh_transfer, Serialization};
use chain_btc::{P2pkhSigner, ScriptSigner, SignedTransaction, Transaction, UtxoCache};
use tracing::{debug, info, warn};

use crate::address::{derive_user_address, ensure_account_depth};
use crate::config::ServiceConfig;
use crate::error::WalletError;
use crate::hd_derivation::ExtendedKey;
use crate::key_file;
use crate::path::DerivationScheme;
use crate::types::{CoinType, DerivedAddress, Network};

pub const DEFAULT_FLAT_FEE_SAT: u64 = 10_000;

pub struct AddrTxService {
    network: Network,
    scheme: DerivationScheme,
    btc_account: ExtendedKey,
    eth_account: ExtendedKey,
    /// Private BTC account key. Present only when the service signs.
    btc_signing: Option<ExtendedKey>,
    cache: Arc<UtxoCache>,
    sources: SourcePool,
    flat_fee_sat: u64,
}

impl AddrTxService {
    /// Build a service from account keys.
    ///
    /// Only the public halves are kept; use [`with_signing_key`] to let the
    /// service sign transfers.
    ///
    /// [`with_signing_key`]: AddrTxService::with_signing_key
    pub fn new(
        network: Network,
        scheme: DerivationScheme,
        btc_account: &ExtendedKey,
        eth_account: &ExtendedKey,
        sources: SourcePool,
        cache: Arc<UtxoCache>,
    ) -> Result<Self, WalletError> {
        for (coin, key) in [(CoinType::Btc, btc_account), (CoinType::Eth, eth_account)] {
            if key.network() != network {
                return Err(WalletError::Config(format!(
                    "{coin} account key is for {}, service runs on {network}",
                    key.network()
                )));
            }
            ensure_account_depth(key, coin, scheme)?;
        }

        Ok(Self {
            network,
            scheme,
            btc_account: btc_account.to_public(),
            eth_account: eth_account.to_public(),
            btc_signing: None,
            cache,
            sources,
            flat_fee_sat: DEFAULT_FLAT_FEE_SAT,
        })
    }

    /// Attach the private BTC account key. It must be the private half of
    /// the configured BTC account key.
    pub fn with_signing_key(mut self, key: ExtendedKey) -> Result<Self, WalletError> {
        if !key.is_private() {
            return Err(WalletError::MalformedKey("signing key has no private half".into()));
        }
        if key.to_public() != self.btc_account {
            return Err(WalletError::MalformedKey(
                "signing key does not match the BTC account key".into(),
            ));
        }
        self.btc_signing = Some(key);
        Ok(self)
    }

    pub fn with_flat_fee(mut self, fee_sat: u64) -> Self {
        self.flat_fee_sat = fee_sat;
        self
    }

    /// Bootstrap from configuration: load key files and fixture sources.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, WalletError> {
        let btc_path = config
            .keys
            .btc_account
            .as_ref()
            .ok_or_else(|| WalletError::Config("keys.btc_account is not set".into()))?;
        let eth_path = config
            .keys
            .eth_account
            .as_ref()
            .ok_or_else(|| WalletError::Config("keys.eth_account is not set".into()))?;
        let btc_account = key_file::load(btc_path)?;
        let eth_account = key_file::load(eth_path)?;

        let mut sources: Vec<Arc<dyn UtxoSource>> = Vec::with_capacity(config.utxo.fixtures.len());
        for path in &config.utxo.fixtures {
            sources.push(Arc::new(load_fixture(path)?));
        }
        if sources.is_empty() {
            warn!("no utxo fixtures configured, transfers will find no funds");
            sources.push(Arc::new(MemoryUtxoSource::new("empty")));
        }
        let pool = SourcePool::new(sources, config.utxo.selection_seed)?;

        let mut service = Self::new(
            config.network,
            config.scheme,
            &btc_account,
            &eth_account,
            pool,
            Arc::new(UtxoCache::new()),
        )?
        .with_flat_fee(config.utxo.flat_fee_sat);

        if let Some(path) = &config.keys.btc_signing {
            service = service.with_signing_key(key_file::load(path)?)?;
        }

        info!(
            title = %config.title,
            network = %config.network,
            scheme = ?config.scheme,
            sources = service.sources.len(),
            signing = service.can_sign(),
            "service ready"
        );
        Ok(service)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn scheme(&self) -> DerivationScheme {
        self.scheme
    }

    pub fn cache(&self) -> &Arc<UtxoCache> {
        &self.cache
    }

    pub fn can_sign(&self) -> bool {
        self.btc_signing.is_some()
    }

    fn account(&self, coin: CoinType) -> &ExtendedKey {
        match coin {
            CoinType::Btc => &self.btc_account,
            CoinType::Eth => &self.eth_account,
        }
    }

    /// Receiving address of `user_id` on `coin`.
    pub fn get_address(&self, coin: CoinType, user_id: u32) -> Result<DerivedAddress, WalletError> {
        let derived = derive_user_address(self.account(coin), coin, self.scheme, user_id)?;
        debug!(
            coin = %coin,
            user_id,
            address = %derived.address,
            path = %derived.derivation_path,
            "address derived"
        );
        Ok(derived)
    }

    /// Raw transaction hex moving `amount` from one user to another.
    ///
    /// BTC transfers come back signed when a signing key is configured and
    /// in unsigned broadcast layout otherwise. ETH is not supported.
    pub fn get_transaction(
        &self,
        coin: CoinType,
        from_user: u32,
        to_user: u32,
        amount: u64,
    ) -> Result<String, WalletError> {
        match coin {
            CoinType::Btc => {
                let tx = self.plan_transfer(from_user, to_user, amount, &[])?;
                if self.can_sign() {
                    Ok(tx.sign()?.to_hex())
                } else {
                    tx.validate()?;
                    Ok(hex::encode(tx.serialize(Serialization::Final)))
                }
            }
            CoinType::Eth => Err(WalletError::UnsupportedCoin(
                "ETH transactions are not supported".into(),
            )),
        }
    }

    /// Build an unsigned BTC transfer between two users, with `memo`
    /// attached as custom data when non-empty.
    ///
    /// Change goes back to the sender. Inputs carry the sender's signer when
    /// the service can sign.
    pub fn plan_transfer(
        &self,
        from_user: u32,
        to_user: u32,
        amount_sat: u64,
        memo: &[u8],
    ) -> Result<Transaction, WalletError> {
        let from = self.get_address(CoinType::Btc, from_user)?.address;
        let to = self.get_address(CoinType::Btc, to_user)?.address;
        let signer = self.user_signer(from_user)?;

        let source = self.sources.pick();
        let utxos = self.cache.get_or_fetch(source.as_ref(), &from, signer)?;

        let mut tx = build_p2pkh_transfer(
            &utxos,
            &to,
            amount_sat,
            &from,
            self.flat_fee_sat,
            self.network.btc(),
        )?;
        tx.attach_custom_data(memo)?;

        info!(
            from = %from,
            to = %to,
            amount_sat,
            fee_sat = self.flat_fee_sat,
            inputs = tx.inputs.len(),
            outputs = tx.outputs.len(),
            source = source.name(),
            "transfer planned"
        );
        Ok(tx)
    }

    /// Plan, sign and relay a BTC transfer. Returns the txid.
    pub fn send_transaction(
        &self,
        from_user: u32,
        to_user: u32,
        amount_sat: u64,
        memo: &[u8],
    ) -> Result<String, WalletError> {
        let signed = self.plan_transfer(from_user, to_user, amount_sat, memo)?.sign()?;
        self.broadcast(&signed)
    }

    /// Relay a signed transaction and drop the outputs it spends from the
    /// cache.
    pub fn broadcast(&self, signed: &SignedTransaction) -> Result<String, WalletError> {
        let source = self.sources.pick();
        let txid = source.broadcast(signed.as_bytes())?;

        let mut spent = 0;
        for hash in signed.spent_hashes() {
            if self.cache.mark_spent(hash) {
                spent += 1;
            }
        }
        info!(txid = %txid, source = source.name(), spent, "transaction broadcast");
        Ok(txid)
    }

    fn user_signer(&self, user_id: u32) -> Result<Option<Arc<dyn ScriptSigner>>, WalletError> {
        let Some(account) = &self.btc_signing else {
            return Ok(None);
        };
        let user_key = account.derive_child(user_id)?;
        let secret = user_key
            .private_key()
            .ok_or_else(|| {
                WalletError::MalformedKey("derived signing key lost its private half".into())
            })?;
        let signer: Arc<dyn ScriptSigner> = Arc::new(P2pkhSigner::new(secret)?);
        Ok(Some(signer))
    }
}

impl std::fmt::Debug for AddrTxService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddrTxService")
            .field("network", &self.network)
            .field("scheme", &self.scheme)
            .field("signing", &self.can_sign())
            .field("sources", &self.sources)
            .field("flat_fee_sat", &self.flat_fee_sat)
            .finish_non_exhaustive()
    }
}

fn load_fixture(path: &Path) -> Result<MemoryUtxoSource, WalletError> {
    let json = fs::read_to_string(path)
        .map_err(|e| {
            WalletError::Config(format!("failed to read fixture {}: {e}", path.display()))
        })?;
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let source = MemoryUtxoSource::from_fixture_json(name, &json)?;
    debug!(path = %path.display(), "utxo fixture loaded");
    Ok(source)
}
