use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::BtcError;
use crate::signer::ScriptSigner;
use crate::source::UtxoSource;
use crate::transaction::TxInput;

/// A single unspent transaction output (UTXO).
#[derive(Clone)]
pub struct Utxo {
    /// Address that owns the output.
    pub address: String,
    /// Id of the funding transaction, display byte order.
    pub tx_hash: Vec<u8>,
    /// Value in satoshis.
    pub amount_sat: u64,
    /// Output index within the funding transaction.
    pub output_index: u32,
    /// The locking script (scriptPubKey) serialized bytes.
    pub script_pubkey: Vec<u8>,
    pub confirmations: u64,
    /// Capability able to unlock this output, if the owner's key is known.
    pub signer: Option<Arc<dyn ScriptSigner>>,
}

impl Utxo {
    /// Turn this output into a transaction input spending it.
    pub fn to_input(&self) -> TxInput {
        let input = TxInput::new(
            self.tx_hash.clone(),
            self.output_index,
            self.script_pubkey.clone(),
        );
        match &self.signer {
            Some(signer) => input.with_signer(signer.clone()),
            None => input,
        }
    }
}

impl std::fmt::Debug for Utxo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Utxo")
            .field("address", &self.address)
            .field("tx_hash", &hex::encode(&self.tx_hash))
            .field("amount_sat", &self.amount_sat)
            .field("output_index", &self.output_index)
            .field("confirmations", &self.confirmations)
            .field("has_signer", &self.signer.is_some())
            .finish()
    }
}

/// Result of UTXO selection: the chosen UTXOs and their aggregate value.
#[derive(Debug, Clone)]
pub struct UtxoSelection {
    /// The selected UTXOs.
    pub selected: Vec<Utxo>,
    /// Total value of the selected UTXOs in satoshis.
    pub total_sat: u64,
}

/// Select UTXOs covering `target_sat`, smallest first.
///
/// Spending the small outputs first keeps the address's UTXO set compact.
/// The fee is the caller's concern and must already be part of `target_sat`.
pub fn select_utxos(utxos: &[Utxo], target_sat: u64) -> Result<UtxoSelection, BtcError> {
    if utxos.is_empty() {
        return Err(BtcError::TransactionBuildError("no UTXOs available".into()));
    }

    let mut sorted: Vec<&Utxo> = utxos.iter().collect();
    sorted.sort_by_key(|utxo| utxo.amount_sat);

    let mut selected = Vec::new();
    let mut total_sat: u64 = 0;

    for utxo in sorted {
        selected.push(utxo.clone());
        total_sat = total_sat.saturating_add(utxo.amount_sat);
        if total_sat >= target_sat {
            return Ok(UtxoSelection { selected, total_sat });
        }
    }

    Err(BtcError::TransactionBuildError(format!(
        "insufficient funds: have {total_sat} sat, need {target_sat} sat"
    )))
}

type Slot = Arc<Mutex<Option<Vec<Utxo>>>>;

/// Process-wide `address -> unspent outputs` cache.
///
/// Each address owns a slot with its own lock, so a fetch for one address
/// never blocks readers of another. The map lock is only held long enough
/// to look up or create a slot.
#[derive(Default)]
pub struct UtxoCache {
    slots: RwLock<HashMap<String, Slot>>,
}

impl UtxoCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, address: &str) -> Slot {
        if let Some(slot) = self.slots.read().get(address) {
            return slot.clone();
        }
        self.slots
            .write()
            .entry(address.to_string())
            .or_default()
            .clone()
    }

    /// Cached outputs for `address`, ascending by amount.
    pub fn cached(&self, address: &str) -> Option<Vec<Utxo>> {
        let slot = self.slots.read().get(address)?.clone();
        let guard = slot.lock();
        guard.clone()
    }

    /// Return the cached outputs for `address`, fetching them from `source`
    /// on a miss.
    ///
    /// Fetched outputs are sorted ascending by amount and tagged with
    /// `signer`. They are only retained when a signer is supplied, and
    /// lookups without one never create a slot. With a signer the slot lock is held across the
    /// fetch, so concurrent callers for the same address trigger a single
    /// fetch.
    pub fn get_or_fetch(
        &self,
        source: &dyn UtxoSource,
        address: &str,
        signer: Option<Arc<dyn ScriptSigner>>,
    ) -> Result<Vec<Utxo>, BtcError> {
        let Some(signer) = signer else {
            if let Some(utxos) = self.cached(address) {
                debug!(address, count = utxos.len(), "utxo cache hit");
                return Ok(utxos);
            }
            let mut utxos = source.fetch_unspent(address)?;
            utxos.sort_by_key(|utxo| utxo.amount_sat);
            debug!(address, source = source.name(), "fetched utxos without signer, not cached");
            return Ok(utxos);
        };

        let slot = self.slot(address);
        let mut guard = slot.lock();

        if let Some(utxos) = guard.as_ref() {
            debug!(address, count = utxos.len(), "utxo cache hit");
            return Ok(utxos.clone());
        }

        let mut utxos = match source.fetch_unspent(address) {
            Ok(utxos) => utxos,
            Err(e) => {
                drop(guard);
                self.discard_empty(address, &slot);
                return Err(e);
            }
        };
        utxos.sort_by_key(|utxo| utxo.amount_sat);
        for utxo in &mut utxos {
            utxo.signer = Some(signer.clone());
        }
        debug!(
            address,
            source = source.name(),
            count = utxos.len(),
            "utxo cache populated"
        );
        *guard = Some(utxos.clone());

        Ok(utxos)
    }

    /// Remove `slot` from the map if it is still the one registered for
    /// `address` and nothing was stored in it.
    fn discard_empty(&self, address: &str, slot: &Slot) {
        let mut slots = self.slots.write();
        let unused = slots.get(address).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && slot.try_lock().is_some_and(|guard| guard.is_none())
        });
        if unused {
            slots.remove(address);
        }
    }

    /// Replace the cached outputs for `address`.
    pub fn insert(&self, address: &str, mut utxos: Vec<Utxo>) {
        utxos.sort_by_key(|utxo| utxo.amount_sat);
        let slot = self.slot(address);
        *slot.lock() = Some(utxos);
    }

    /// Remove the first cached output funded by `tx_hash`, scanning every
    /// address. Returns whether an output was removed.
    pub fn mark_spent(&self, tx_hash: &[u8]) -> bool {
        let slots: Vec<(String, Slot)> = self
            .slots
            .read()
            .iter()
            .map(|(address, slot)| (address.clone(), slot.clone()))
            .collect();

        for (address, slot) in slots {
            let mut guard = slot.lock();
            let Some(utxos) = guard.as_mut() else {
                continue;
            };
            if let Some(position) = utxos.iter().position(|utxo| utxo.tx_hash == tx_hash) {
                let spent = utxos.remove(position);
                debug!(
                    address = %address,
                    tx_hash = %hex::encode(tx_hash),
                    output_index = spent.output_index,
                    "utxo marked spent"
                );
                return true;
            }
        }
        false
    }

    /// Drop everything cached for `address`. Returns whether it was cached.
    pub fn invalidate(&self, address: &str) -> bool {
        let removed = self.slots.write().remove(address);
        match removed {
            Some(slot) => slot.lock().take().is_some(),
            None => false,
        }
    }

    /// Number of addresses holding cached outputs.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.read().values().cloned().collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for UtxoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UtxoCache")
            .field("addresses", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryUtxoSource;
    use std::thread;

    const ADDR_A: &str = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";
    const ADDR_B: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

    fn make_utxo(address: &str, hash_byte: u8, amount_sat: u64) -> Utxo {
        Utxo {
            address: address.to_string(),
            tx_hash: vec![hash_byte; 32],
            amount_sat,
            output_index: 0,
            script_pubkey: vec![0xaa; 25],
            confirmations: 1,
            signer: None,
        }
    }

    fn stub_signer() -> Arc<dyn ScriptSigner> {
        Arc::new(|_: &[u8; 32]| -> Result<Vec<u8>, BtcError> { Ok(vec![0x00]) })
    }

    fn amounts(utxos: &[Utxo]) -> Vec<u64> {
        utxos.iter().map(|u| u.amount_sat).collect()
    }

    #[test]
    fn selects_smallest_first() {
        let utxos = vec![
            make_utxo(ADDR_A, 1, 100_000),
            make_utxo(ADDR_A, 2, 1_000),
            make_utxo(ADDR_A, 3, 50_000),
        ];
        let selection = select_utxos(&utxos, 30_000).unwrap();
        assert_eq!(amounts(&selection.selected), vec![1_000, 50_000]);
        assert_eq!(selection.total_sat, 51_000);
    }

    #[test]
    fn exact_amount_is_enough() {
        let utxos = vec![make_utxo(ADDR_A, 1, 5_000)];
        let selection = select_utxos(&utxos, 5_000).unwrap();
        assert_eq!(selection.selected.len(), 1);
    }

    #[test]
    fn insufficient_funds_returns_error() {
        let utxos = vec![make_utxo(ADDR_A, 1, 1_000)];
        let msg = select_utxos(&utxos, 500_000).unwrap_err().to_string();
        assert!(msg.contains("insufficient funds"));
    }

    #[test]
    fn empty_utxos_returns_error() {
        assert!(select_utxos(&[], 1_000).is_err());
    }

    #[test]
    fn to_input_carries_outpoint_and_signer() {
        let mut utxo = make_utxo(ADDR_A, 7, 10);
        utxo.output_index = 3;
        let input = utxo.to_input();
        assert_eq!(input.previous_tx_hash, vec![7u8; 32]);
        assert_eq!(input.output_index, 3);
        assert_eq!(input.previous_script_pubkey, utxo.script_pubkey);
        assert!(!input.has_signer());

        utxo.signer = Some(stub_signer());
        assert!(utxo.to_input().has_signer());
    }

    #[test]
    fn fetch_sorts_and_caches_with_signer() {
        let source = MemoryUtxoSource::new("memory");
        source.set_unspent(
            ADDR_A,
            vec![make_utxo(ADDR_A, 1, 300), make_utxo(ADDR_A, 2, 100), make_utxo(ADDR_A, 3, 200)],
        );
        let cache = UtxoCache::new();

        let utxos = cache.get_or_fetch(&source, ADDR_A, Some(stub_signer())).unwrap();
        assert_eq!(amounts(&utxos), vec![100, 200, 300]);
        assert!(utxos.iter().all(|u| u.signer.is_some()));

        // Second call is served from the cache.
        cache.get_or_fetch(&source, ADDR_A, Some(stub_signer())).unwrap();
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(amounts(&cache.cached(ADDR_A).unwrap()), vec![100, 200, 300]);
    }

    #[test]
    fn fetch_without_signer_is_not_cached() {
        let source = MemoryUtxoSource::new("memory");
        source.set_unspent(ADDR_A, vec![make_utxo(ADDR_A, 1, 300)]);
        let cache = UtxoCache::new();

        let utxos = cache.get_or_fetch(&source, ADDR_A, None).unwrap();
        assert_eq!(utxos.len(), 1);
        assert!(cache.cached(ADDR_A).is_none());

        cache.get_or_fetch(&source, ADDR_A, None).unwrap();
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn uncached_lookups_leave_no_slots() {
        let source = MemoryUtxoSource::new("memory");
        let cache = UtxoCache::new();
        for i in 0..1000 {
            cache.get_or_fetch(&source, &format!("addr{i}"), None).unwrap();
        }
        assert!(cache.is_empty());
        assert!(cache.slots.read().is_empty());
    }

    #[test]
    fn lookup_without_signer_reads_existing_cache() {
        let source = MemoryUtxoSource::new("memory");
        source.set_unspent(ADDR_A, vec![make_utxo(ADDR_A, 1, 300)]);
        let cache = UtxoCache::new();

        cache.get_or_fetch(&source, ADDR_A, Some(stub_signer())).unwrap();
        let utxos = cache.get_or_fetch(&source, ADDR_A, None).unwrap();
        assert!(utxos[0].signer.is_some());
        assert_eq!(source.fetch_count(), 1);
    }

    #[test]
    fn fetch_error_leaves_cache_empty() {
        let source = MemoryUtxoSource::offline("down");
        let cache = UtxoCache::new();
        let result = cache.get_or_fetch(&source, ADDR_A, Some(stub_signer()));
        assert!(matches!(result, Err(BtcError::Network(_))));
        assert!(cache.cached(ADDR_A).is_none());
        assert!(cache.is_empty());
        assert!(cache.slots.read().is_empty());
    }

    #[test]
    fn mark_spent_removes_first_match_only() {
        let cache = UtxoCache::new();
        cache.insert(ADDR_A, vec![make_utxo(ADDR_A, 9, 10), make_utxo(ADDR_A, 9, 20)]);
        cache.insert(ADDR_B, vec![make_utxo(ADDR_B, 5, 30)]);

        assert!(cache.mark_spent(&[9u8; 32]));
        let remaining = cache.cached(ADDR_A).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(cache.cached(ADDR_B).unwrap().len(), 1);

        assert!(cache.mark_spent(&[9u8; 32]));
        assert!(cache.cached(ADDR_A).unwrap().is_empty());
        assert!(!cache.mark_spent(&[9u8; 32]));
    }

    #[test]
    fn mark_spent_scans_all_addresses() {
        let cache = UtxoCache::new();
        cache.insert(ADDR_A, vec![make_utxo(ADDR_A, 1, 10)]);
        cache.insert(ADDR_B, vec![make_utxo(ADDR_B, 2, 30), make_utxo(ADDR_B, 3, 40)]);

        assert!(cache.mark_spent(&[3u8; 32]));
        assert_eq!(amounts(&cache.cached(ADDR_B).unwrap()), vec![30]);
        assert_eq!(cache.cached(ADDR_A).unwrap().len(), 1);
    }

    #[test]
    fn mark_spent_unknown_hash_is_noop() {
        let cache = UtxoCache::new();
        assert!(!cache.mark_spent(&[1u8; 32]));
        cache.insert(ADDR_A, vec![make_utxo(ADDR_A, 1, 10)]);
        assert!(!cache.mark_spent(&[2u8; 32]));
        assert_eq!(cache.cached(ADDR_A).unwrap().len(), 1);
    }

    #[test]
    fn invalidate_forces_refetch() {
        let source = MemoryUtxoSource::new("memory");
        source.set_unspent(ADDR_A, vec![make_utxo(ADDR_A, 1, 300)]);
        let cache = UtxoCache::new();

        cache.get_or_fetch(&source, ADDR_A, Some(stub_signer())).unwrap();
        assert!(cache.invalidate(ADDR_A));
        assert!(!cache.invalidate(ADDR_A));
        cache.get_or_fetch(&source, ADDR_A, Some(stub_signer())).unwrap();
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn concurrent_fetch_and_mark_spent() {
        let cache = Arc::new(UtxoCache::new());
        let source = Arc::new(MemoryUtxoSource::new("memory"));
        let utxos: Vec<Utxo> = (0..64u8).map(|i| make_utxo(ADDR_A, i, u64::from(i) + 1)).collect();
        source.set_unspent(ADDR_A, utxos);

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let source = source.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        let utxos = cache
                            .get_or_fetch(source.as_ref(), ADDR_A, Some(stub_signer()))
                            .unwrap();
                        // Readers always see a sorted, complete snapshot.
                        assert!(utxos.windows(2).all(|w| w[0].amount_sat <= w[1].amount_sat));
                    }
                })
            })
            .collect();

        let writer = {
            let cache = cache.clone();
            let source = source.clone();
            thread::spawn(move || {
                cache
                    .get_or_fetch(source.as_ref(), ADDR_A, Some(stub_signer()))
                    .unwrap();
                (0..32u8).filter(|i| cache.mark_spent(&[*i; 32])).count()
            })
        };

        for reader in readers {
            reader.join().unwrap();
        }
        let removed = writer.join().unwrap();

        assert_eq!(removed, 32);
        assert_eq!(source.fetch_count(), 1);
        let remaining = cache.cached(ADDR_A).unwrap();
        assert_eq!(remaining.len(), 32);
        assert_eq!(remaining[0].amount_sat, 33);
    }
}
