//! In-process implementations of the collaborators, used to run a committee on a single machine
//! and in tests.
//!
//! The virtual machine increments a counter for every request it processes. The signature scheme
//! derives every share from the signer index, and any `t` valid shares aggregate to the same
//! committee signature. The ledger confirms a signed transaction if it anchors the next index of
//! the chain, and broadcasts the answer of every query to all the subscribers of the chain.
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, RwLock,
    },
};

use futures::future::{self, BoxFuture};
use log::{debug, trace};

use scchain_data_structures::{
    chain::{Balances, ChainId, Hash, RequestId, TransactionId},
    request::{request_id_from, RequestArgs, RequestPayload},
    state::{Block, Mutation, StateUpdate, VirtualState},
    transaction::AnchorTransaction,
};

use crate::collaborators::{
    BlobCache, InclusionLevel, LedgerCallback, LedgerClient, LedgerEvent, SubscriptionId,
    ThresholdSigner, Vm, VmOutput, VmTask,
};

/// Variable holding the number of processed requests
pub const COUNTER_KEY: &[u8] = b"counter";

/// Value of the counter in `state`
pub fn counter(state: &VirtualState) -> u64 {
    state
        .get(COUNTER_KEY)
        .and_then(|v| <[u8; 8]>::try_from(v).ok())
        .map(u64::from_be_bytes)
        .unwrap_or(0)
}

/// State of a chain right after its origin block
pub fn origin_state(chain_id: ChainId) -> VirtualState {
    match VirtualState::pre_origin(chain_id).with_block(&Block::origin()) {
        Ok(state) => state,
        Err(e) => panic!("origin block rejected by the pre-origin state: {}", e),
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// VIRTUAL MACHINE
////////////////////////////////////////////////////////////////////////////////////////

/// Virtual machine counting the requests it processes
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatedVm;

impl SimulatedVm {
    /// Run the batch synchronously
    pub fn run(task: &VmTask) -> Result<VmOutput, String> {
        if task.requests.is_empty() {
            return Err("empty batch".to_string());
        }
        let mut value = counter(&task.state);
        let updates = task
            .requests
            .iter()
            .map(|r| {
                value += 1;
                let mut mutations = vec![Mutation::Set {
                    key: COUNTER_KEY.to_vec(),
                    value: value.to_be_bytes().to_vec(),
                }];
                mutations.extend(r.args.iter().map(|(name, data)| Mutation::Set {
                    key: format!("{}:{}", r.payload.request_id, name).into_bytes(),
                    value: data.clone(),
                }));
                StateUpdate {
                    request_id: r.payload.request_id,
                    timestamp: task.timestamp,
                    mutations,
                }
            })
            .collect();

        let block = Block::new(task.state.block_index.saturating_add(1), updates);
        let next = task.state.with_block(&block).map_err(|e| e.to_string())?;
        let tx = AnchorTransaction::new(
            next.chain_id,
            next.block_index,
            next.state_hash,
            next.timestamp,
            block.request_ids(),
        );

        Ok(VmOutput { block, tx })
    }
}

impl Vm for SimulatedVm {
    fn run_batch(&self, task: VmTask) -> BoxFuture<'static, Result<VmOutput, String>> {
        Box::pin(future::ready(SimulatedVm::run(&task)))
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// SIGNATURES
////////////////////////////////////////////////////////////////////////////////////////

/// Share of a deterministic threshold scheme. It mimics the interface of a real one and is in
/// no way secure.
#[derive(Clone, Copy, Debug)]
pub struct SimulatedSigner {
    index: u16,
    threshold: u16,
}

impl SimulatedSigner {
    /// Share of the peer `index` in a scheme requiring `threshold` shares
    pub fn new(index: u16, threshold: u16) -> Self {
        SimulatedSigner { index, threshold }
    }

    fn share_of(index: u16, digest: &Hash) -> Vec<u8> {
        let mut share = index.to_be_bytes().to_vec();
        share.extend_from_slice(Hash::of_parts(&[b"share", &index.to_be_bytes()[..], digest.as_bytes()]).as_bytes());

        share
    }

    /// Signature produced by any `threshold` valid shares over `digest`
    pub fn committee_signature(digest: &Hash) -> Vec<u8> {
        Hash::of_parts(&[b"committee", digest.as_bytes()]).0.to_vec()
    }
}

impl ThresholdSigner for SimulatedSigner {
    fn sign_share(&self, digest: &Hash) -> Result<Vec<u8>, String> {
        Ok(Self::share_of(self.index, digest))
    }

    fn verify_share(&self, index: u16, digest: &Hash, share: &[u8]) -> bool {
        share == Self::share_of(index, digest).as_slice()
    }

    fn aggregate(&self, digest: &Hash, shares: &[(u16, Vec<u8>)]) -> Result<Vec<u8>, String> {
        let valid: HashSet<u16> = shares
            .iter()
            .filter(|(i, s)| self.verify_share(*i, digest, s))
            .map(|(i, _)| *i)
            .collect();
        if valid.len() < usize::from(self.threshold) {
            return Err(format!(
                "{} valid shares, {} required",
                valid.len(),
                self.threshold
            ));
        }

        Ok(Self::committee_signature(digest))
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// LEDGER
////////////////////////////////////////////////////////////////////////////////////////

#[derive(Default)]
struct LedgerChain {
    state_tx: Option<AnchorTransaction>,
    confirmed: HashMap<TransactionId, AnchorTransaction>,
    rejected: HashSet<TransactionId>,
    outstanding: BTreeMap<RequestId, RequestPayload>,
    balances: Balances,
    subscribers: Vec<(SubscriptionId, LedgerCallback)>,
}

impl LedgerChain {
    fn callbacks(&self) -> Vec<LedgerCallback> {
        self.subscribers.iter().map(|(_, c)| c.clone()).collect()
    }
}

/// Ledger kept in memory, shared by every node of a local committee
#[derive(Default)]
pub struct SimulatedLedger {
    chains: Mutex<HashMap<ChainId, LedgerChain>>,
    next_id: AtomicU64,
}

/// Callbacks are run after the lock is released, they may call back into the ledger
fn deliver(callbacks: Vec<LedgerCallback>, events: Vec<LedgerEvent>) {
    for callback in &callbacks {
        for event in &events {
            callback(event.clone());
        }
    }
}

impl SimulatedLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chain and confirm its origin transaction
    pub fn create_chain(&self, chain_id: ChainId) -> AnchorTransaction {
        let origin = origin_state(chain_id);
        let mut tx = AnchorTransaction::new(
            chain_id,
            origin.block_index,
            origin.state_hash,
            origin.timestamp,
            vec![],
        );
        tx.signature = Some(SimulatedSigner::committee_signature(&tx.essence_hash()));

        let callbacks = {
            let mut chains = self.lock();
            let chain = chains.entry(chain_id).or_default();
            chain.confirmed.insert(tx.id(), tx.clone());
            chain.state_tx = Some(tx.clone());
            chain.callbacks()
        };
        deliver(callbacks, vec![LedgerEvent::StateTransaction(tx.clone())]);

        tx
    }

    /// Send a request to the chain, returning its id
    pub fn send_request(&self, chain_id: ChainId, args: RequestArgs, timelock: u32) -> RequestId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let sender_tx = TransactionId(Hash::of_parts(&[b"request", &n.to_be_bytes()[..]]).0);
        let payload = RequestPayload {
            request_id: request_id_from(&sender_tx, 0),
            sender_tx,
            timelock,
            args,
        };
        let request_id = payload.request_id;

        let callbacks = {
            let mut chains = self.lock();
            let chain = chains.entry(chain_id).or_default();
            chain.outstanding.insert(request_id, payload.clone());
            chain.callbacks()
        };
        debug!("ledger: request {} sent to {}", request_id.short(), chain_id.short());
        deliver(callbacks, vec![LedgerEvent::Request(payload)]);

        request_id
    }

    /// Set the balances of the chain address
    pub fn set_balances(&self, chain_id: ChainId, balances: Balances) {
        let callbacks = {
            let mut chains = self.lock();
            let chain = chains.entry(chain_id).or_default();
            chain.balances = balances.clone();
            chain.callbacks()
        };
        deliver(callbacks, vec![LedgerEvent::Balances(balances)]);
    }

    /// Last confirmed anchoring transaction of the chain
    pub fn state_transaction(&self, chain_id: &ChainId) -> Option<AnchorTransaction> {
        self.lock().get(chain_id).and_then(|c| c.state_tx.clone())
    }

    /// Requests not consumed by a confirmed transaction yet
    pub fn outstanding_requests(&self, chain_id: &ChainId) -> usize {
        self.lock().get(chain_id).map_or(0, |c| c.outstanding.len())
    }

    /// Number of subscriptions to the chain
    pub fn num_subscribers(&self, chain_id: &ChainId) -> usize {
        self.lock().get(chain_id).map_or(0, |c| c.subscribers.len())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ChainId, LedgerChain>> {
        // A panicking callback never runs under the lock, poisoning is harmless
        self.chains.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn inclusion_level(chain: &LedgerChain, tx_id: &TransactionId) -> InclusionLevel {
        if chain.confirmed.contains_key(tx_id) {
            InclusionLevel::Confirmed
        } else if chain.rejected.contains(tx_id) {
            InclusionLevel::Rejected
        } else {
            InclusionLevel::Undefined
        }
    }
}

impl LedgerClient for SimulatedLedger {
    fn subscribe(&self, chain_id: ChainId, callback: LedgerCallback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let events = {
            let mut chains = self.lock();
            let chain = chains.entry(chain_id).or_default();
            chain.subscribers.push((id, callback.clone()));
            let mut events = vec![];
            if let Some(tx) = &chain.state_tx {
                events.push(LedgerEvent::StateTransaction(tx.clone()));
            }
            if !chain.balances.is_empty() {
                events.push(LedgerEvent::Balances(chain.balances.clone()));
            }
            events.extend(chain.outstanding.values().cloned().map(LedgerEvent::Request));
            events
        };
        deliver(vec![callback], events);

        id
    }

    fn unsubscribe(&self, chain_id: &ChainId, subscription: SubscriptionId) {
        if let Some(chain) = self.lock().get_mut(chain_id) {
            chain.subscribers.retain(|(id, _)| *id != subscription);
        }
    }

    fn post_transaction(&self, tx: &AnchorTransaction) -> Result<(), String> {
        let signature = tx
            .signature
            .as_ref()
            .ok_or_else(|| "transaction is not signed".to_string())?;
        if *signature != SimulatedSigner::committee_signature(&tx.essence_hash()) {
            return Err("invalid committee signature".to_string());
        }
        let tx_id = tx.id();

        let (callbacks, events) = {
            let mut chains = self.lock();
            let chain = chains
                .get_mut(&tx.chain_id)
                .ok_or_else(|| format!("unknown chain {}", tx.chain_id.short()))?;
            if chain.confirmed.contains_key(&tx_id) {
                trace!("ledger: transaction {} posted again", tx_id.short());
                return Ok(());
            }
            let expected = chain
                .state_tx
                .as_ref()
                .map_or(0, |s| s.state_index.saturating_add(1));
            let event = if tx.state_index == expected {
                for id in &tx.request_ids {
                    chain.outstanding.remove(id);
                }
                chain.confirmed.insert(tx_id, tx.clone());
                chain.state_tx = Some(tx.clone());
                debug!(
                    "ledger: chain {} anchored at #{} by {}",
                    tx.chain_id.short(),
                    tx.state_index,
                    tx_id.short()
                );
                LedgerEvent::StateTransaction(tx.clone())
            } else {
                chain.rejected.insert(tx_id);
                debug!(
                    "ledger: transaction {} for #{} rejected, expected #{}",
                    tx_id.short(),
                    tx.state_index,
                    expected
                );
                LedgerEvent::InclusionLevel(tx_id, InclusionLevel::Rejected)
            };
            (chain.callbacks(), vec![event])
        };
        deliver(callbacks, events);

        Ok(())
    }

    fn request_confirmed_transaction(&self, chain_id: &ChainId, tx_id: &TransactionId) {
        let found = self.lock().get(chain_id).and_then(|c| {
            c.confirmed
                .get(tx_id)
                .map(|tx| (c.callbacks(), tx.clone()))
        });
        if let Some((callbacks, tx)) = found {
            deliver(callbacks, vec![LedgerEvent::StateTransaction(tx)]);
        }
    }

    fn request_state_transaction(&self, chain_id: &ChainId) {
        let found = self
            .lock()
            .get(chain_id)
            .and_then(|c| c.state_tx.clone().map(|tx| (c.callbacks(), tx)));
        if let Some((callbacks, tx)) = found {
            deliver(callbacks, vec![LedgerEvent::StateTransaction(tx)]);
        }
    }

    fn request_inclusion_level(&self, chain_id: &ChainId, tx_id: &TransactionId) {
        let found = self.lock().get(chain_id).map(|c| {
            (c.callbacks(), SimulatedLedger::inclusion_level(c, tx_id))
        });
        if let Some((callbacks, level)) = found {
            deliver(callbacks, vec![LedgerEvent::InclusionLevel(*tx_id, level)]);
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// BLOBS
////////////////////////////////////////////////////////////////////////////////////////

/// Blob cache kept in memory
#[derive(Default)]
pub struct InMemoryBlobCache {
    blobs: RwLock<HashMap<Hash, Vec<u8>>>,
}

impl InMemoryBlobCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobCache for InMemoryBlobCache {
    fn get_blob(&self, hash: &Hash) -> Option<Vec<u8>> {
        self.blobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(hash)
            .cloned()
    }

    fn put_blob(&self, data: Vec<u8>) -> Hash {
        let hash = Hash::of(&data);
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(hash, data);

        hash
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use scchain_data_structures::request::ArgValue;

    use super::*;
    use crate::collaborators::BatchRequest;

    const CHAIN: ChainId = ChainId([3; 32]);

    fn recorder() -> (LedgerCallback, Arc<Mutex<Vec<LedgerEvent>>>) {
        let events = Arc::new(Mutex::new(vec![]));
        let sink = events.clone();
        let callback: LedgerCallback = Arc::new(move |e| sink.lock().unwrap().push(e));
        (callback, events)
    }

    fn batch(state: VirtualState, n: u8) -> VmTask {
        let requests = (0..n)
            .map(|i| {
                let mut args = BTreeMap::new();
                args.insert("x".to_string(), vec![i]);
                BatchRequest {
                    payload: RequestPayload {
                        request_id: RequestId([i; 16]),
                        sender_tx: TransactionId([i; 32]),
                        timelock: 0,
                        args: RequestArgs::new(),
                    },
                    args,
                }
            })
            .collect();
        VmTask {
            batch_hash: Hash::of(b"batch"),
            state,
            requests,
            timestamp: 42,
            leader: 0,
            fee_destination: Default::default(),
            balances: Balances::new(),
        }
    }

    #[test]
    fn vm_counts_requests() {
        let output = SimulatedVm::run(&batch(origin_state(CHAIN), 3)).unwrap();
        assert_eq!(output.block.block_index, 1);
        assert_eq!(output.block.size(), 3);
        assert_eq!(output.tx.state_index, 1);

        let next = origin_state(CHAIN).with_block(&output.block).unwrap();
        assert_eq!(counter(&next), 3);
        assert_eq!(output.tx.state_hash, next.state_hash);
        assert_eq!(output.tx.timestamp, 42);
    }

    #[test]
    fn origin_state_has_the_origin_block_applied() {
        let origin = origin_state(CHAIN);
        assert!(origin.initialized);
        assert_eq!(origin.block_index, 0);
        assert_ne!(origin.state_hash, VirtualState::pre_origin(CHAIN).state_hash);
    }

    #[test]
    fn vm_rejects_empty_batch() {
        assert!(SimulatedVm::run(&batch(origin_state(CHAIN), 0)).is_err());
    }

    #[test]
    fn any_threshold_of_shares_gives_the_same_signature() {
        let digest = Hash::of(b"essence");
        let shares: Vec<_> = (0..4)
            .map(|i| (i, SimulatedSigner::new(i, 3).sign_share(&digest).unwrap()))
            .collect();
        let signer = SimulatedSigner::new(0, 3);
        assert!(signer.verify_share(2, &digest, &shares[2].1));
        assert!(!signer.verify_share(1, &digest, &shares[2].1));

        let a = signer.aggregate(&digest, &shares[..3]).unwrap();
        let b = signer.aggregate(&digest, &shares[1..]).unwrap();
        assert_eq!(a, b);
        assert!(signer.aggregate(&digest, &shares[..2]).is_err());
        // Duplicated shares do not count twice
        let dup = vec![shares[0].clone(), shares[0].clone(), shares[1].clone()];
        assert!(signer.aggregate(&digest, &dup).is_err());
    }

    #[test]
    fn ledger_confirms_next_index_and_rejects_others() {
        let ledger = SimulatedLedger::new();
        ledger.create_chain(CHAIN);
        let (callback, events) = recorder();
        ledger.subscribe(CHAIN, callback);
        assert!(matches!(
            events.lock().unwrap()[0],
            LedgerEvent::StateTransaction(ref tx) if tx.state_index == 0
        ));

        let mut args = RequestArgs::new();
        args.insert("a".into(), ArgValue::Inline(vec![1]));
        let request_id = ledger.send_request(CHAIN, args, 0);
        assert_eq!(ledger.outstanding_requests(&CHAIN), 1);

        let mut tx = AnchorTransaction::new(CHAIN, 1, Hash::of(b"s1"), 1, vec![request_id]);
        assert!(ledger.post_transaction(&tx).is_err());
        tx.signature = Some(SimulatedSigner::committee_signature(&tx.essence_hash()));
        ledger.post_transaction(&tx).unwrap();
        assert_eq!(ledger.state_transaction(&CHAIN).unwrap().state_index, 1);
        assert_eq!(ledger.outstanding_requests(&CHAIN), 0);

        let mut stale = AnchorTransaction::new(CHAIN, 1, Hash::of(b"other"), 2, vec![]);
        stale.signature = Some(SimulatedSigner::committee_signature(&stale.essence_hash()));
        ledger.post_transaction(&stale).unwrap();
        let last = events.lock().unwrap().last().cloned();
        assert!(matches!(
            last,
            Some(LedgerEvent::InclusionLevel(id, InclusionLevel::Rejected)) if id == stale.id()
        ));
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let ledger = SimulatedLedger::new();
        ledger.create_chain(CHAIN);
        let (callback, events) = recorder();
        let id = ledger.subscribe(CHAIN, callback);
        ledger.unsubscribe(&CHAIN, id);
        assert_eq!(ledger.num_subscribers(&CHAIN), 0);
        let before = events.lock().unwrap().len();
        ledger.request_state_transaction(&CHAIN);
        assert_eq!(events.lock().unwrap().len(), before);
    }

    #[test]
    fn blob_cache_is_content_addressed() {
        let cache = InMemoryBlobCache::new();
        let hash = cache.put_blob(b"blob".to_vec());
        assert_eq!(hash, Hash::of(b"blob"));
        assert_eq!(cache.get_blob(&hash), Some(b"blob".to_vec()));
        assert_eq!(cache.get_blob(&Hash::of(b"other")), None);
    }
}
