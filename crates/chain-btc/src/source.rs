//! Where unspent outputs come from and where signed transactions go.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::encode::double_sha256;
use crate::error::BtcError;
use crate::explorer::{PushResponse, UnspentResponse};
use crate::utxo::Utxo;

/// A backend able to list unspent outputs and relay raw transactions.
pub trait UtxoSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// All unspent outputs currently owned by `address`.
    fn fetch_unspent(&self, address: &str) -> Result<Vec<Utxo>, BtcError>;

    /// Relay a signed transaction. Returns the txid hex reported by the backend.
    fn broadcast(&self, raw_tx: &[u8]) -> Result<String, BtcError>;
}

/// In-memory source backed by fixtures.
///
/// Used offline and in tests. Every broadcast is recorded. It is answered
/// with the configured explorer push reply, or with the transaction's own id
/// when none is set.
pub struct MemoryUtxoSource {
    name: String,
    unspent: RwLock<HashMap<String, Vec<Utxo>>>,
    push_reply: Mutex<Option<String>>,
    broadcasts: Mutex<Vec<Vec<u8>>>,
    fetches: AtomicUsize,
    offline: bool,
}

impl MemoryUtxoSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unspent: RwLock::new(HashMap::new()),
            push_reply: Mutex::new(None),
            broadcasts: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            offline: false,
        }
    }

    /// A source whose every call fails with a network error.
    pub fn offline(name: impl Into<String>) -> Self {
        Self {
            offline: true,
            ..Self::new(name)
        }
    }

    /// Load a fixture: a JSON object mapping each address to an explorer
    /// unspent-list response. An optional `"push"` entry holds the explorer
    /// reply returned for broadcasts.
    pub fn from_fixture_json(name: impl Into<String>, json: &str) -> Result<Self, BtcError> {
        let fixture: Fixture = serde_json::from_str(json)
            .map_err(|e| BtcError::Service(format!("invalid utxo fixture: {e}")))?;

        let source = Self::new(name);
        for (address, response) in fixture.unspent {
            let utxos = UnspentResponse::parse(&response.to_string())?.into_utxos(&address)?;
            source.set_unspent(&address, utxos);
        }
        if let Some(push) = fixture.push {
            let reply = push.to_string();
            PushResponse::parse(&reply)?;
            source.set_push_reply(reply);
        }
        Ok(source)
    }

    pub fn set_unspent(&self, address: &str, utxos: Vec<Utxo>) {
        self.unspent.write().insert(address.to_string(), utxos);
    }

    /// Explorer JSON answered to every later broadcast.
    pub fn set_push_reply(&self, json: impl Into<String>) {
        *self.push_reply.lock() = Some(json.into());
    }

    /// Raw transactions relayed so far, oldest first.
    pub fn broadcasts(&self) -> Vec<Vec<u8>> {
        self.broadcasts.lock().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<(), BtcError> {
        if self.offline {
            return Err(BtcError::Network(format!("{} is unreachable", self.name)));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct Fixture {
    #[serde(default)]
    push: Option<serde_json::Value>,
    #[serde(flatten)]
    unspent: HashMap<String, serde_json::Value>,
}

impl UtxoSource for MemoryUtxoSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_unspent(&self, address: &str) -> Result<Vec<Utxo>, BtcError> {
        self.ensure_online()?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.unspent.read().get(address).cloned().unwrap_or_default())
    }

    fn broadcast(&self, raw_tx: &[u8]) -> Result<String, BtcError> {
        self.ensure_online()?;
        if raw_tx.is_empty() {
            return Err(BtcError::Service("empty transaction".into()));
        }
        self.broadcasts.lock().push(raw_tx.to_vec());

        if let Some(reply) = self.push_reply.lock().as_deref() {
            return PushResponse::parse(reply)?.into_txid();
        }
        let mut txid = double_sha256(raw_tx);
        txid.reverse();
        Ok(hex::encode(txid))
    }
}

impl std::fmt::Debug for MemoryUtxoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryUtxoSource")
            .field("name", &self.name)
            .field("offline", &self.offline)
            .finish_non_exhaustive()
    }
}

/// A set of interchangeable sources, one picked at random per request.
///
/// The RNG can be seeded so that selection is reproducible.
pub struct SourcePool {
    sources: Vec<Arc<dyn UtxoSource>>,
    rng: Mutex<StdRng>,
}

impl SourcePool {
    pub fn new(sources: Vec<Arc<dyn UtxoSource>>, seed: Option<u64>) -> Result<Self, BtcError> {
        if sources.is_empty() {
            return Err(BtcError::Service("no utxo sources configured".into()));
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            sources,
            rng: Mutex::new(rng),
        })
    }

    pub fn pick(&self) -> Arc<dyn UtxoSource> {
        let index = self.rng.lock().gen_range(0..self.sources.len());
        self.sources[index].clone()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for SourcePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("SourcePool").field("sources", &names).finish()
    }
}
