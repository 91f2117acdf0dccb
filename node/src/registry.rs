//! # Chain registry
//!
//! Owned by the process supervisor: maps chain ids to their running chain actor. Activation
//! checks the committee description against the local node before anything is started.
use std::{collections::HashMap, sync::Arc};

use actix::{Actor, Addr};
use ansi_term::Color::Green;
use log::{debug, info};

use scchain_config::config::Chain;
use scchain_data_structures::chain::ChainId;
use scchain_p2p::{group::PeerGroup, network::NetId};

use crate::{
    actors::{
        chain::{ChainActor, ChainDeps, ChainParams},
        messages::ChainEvent,
    },
    error::ChainError,
};

/// Description of a chain as known to the node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainRecord {
    /// Chain
    pub chain_id: ChainId,
    /// Network ids of the committee, in committee order
    pub committee_nodes: Vec<NetId>,
    /// Whether the chain should be running
    pub active: bool,
}

/// Share of the committee key held by this node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThresholdShare {
    /// Index of the share, which is the committee index of this node
    pub index: u16,
    /// Number of shares
    pub n: u16,
    /// Shares needed to sign
    pub t: u16,
}

/// Running chains of the node
pub struct ChainRegistry {
    config: Chain,
    chains: HashMap<ChainId, Addr<ChainActor>>,
}

impl ChainRegistry {
    /// Empty registry, every chain is started with `config`
    pub fn new(config: Chain) -> Self {
        ChainRegistry {
            config,
            chains: HashMap::new(),
        }
    }

    /// Start the chain described by `record`, or return it if it is already running.
    ///
    /// Must be called from within a running actix system.
    pub fn activate(
        &mut self,
        record: &ChainRecord,
        share: ThresholdShare,
        deps: ChainDeps,
    ) -> Result<Addr<ChainActor>, ChainError> {
        if !record.active {
            return Err(ChainError::NotActive(record.chain_id.short()));
        }
        if let Some(addr) = self.chains.get(&record.chain_id) {
            if addr.connected() {
                debug!("[{}] chain already active", record.chain_id.short());
                return Ok(addr.clone());
            }
        }

        let params = validate(record, share)?;
        let peers = PeerGroup::new(deps.net.clone(), &record.committee_nodes)?;
        if peers.self_index() != share.index {
            return Err(ChainError::CommitteeInconsistency(format!(
                "own node is at index {} but holds share {}",
                peers.self_index(),
                share.index
            )));
        }

        let addr = ChainActor::new(params, self.config.clone(), Arc::new(peers), deps).start();
        info!(
            "[{}:{}] {} committee of {}, quorum {}",
            record.chain_id.short(),
            share.index,
            Green.bold().paint("[Chain activated]"),
            share.n,
            share.t
        );
        self.chains.insert(record.chain_id, addr.clone());

        Ok(addr)
    }

    /// Dismiss a chain. Returns whether it was running.
    pub fn deactivate(&mut self, chain_id: &ChainId) -> bool {
        match self.chains.remove(chain_id) {
            Some(addr) => {
                addr.do_send(ChainEvent::Dismiss("deactivated".to_string()));
                true
            }
            None => false,
        }
    }

    /// Address of a running chain
    pub fn get(&self, chain_id: &ChainId) -> Option<Addr<ChainActor>> {
        self.chains.get(chain_id).cloned()
    }

    /// Ids of the registered chains
    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.chains.keys().copied().collect()
    }

    /// Dismiss every chain
    pub fn dismiss_all(&mut self) {
        for (_, addr) in self.chains.drain() {
            addr.do_send(ChainEvent::Dismiss("node shutting down".to_string()));
        }
    }

    /// Number of registered chains
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Whether no chain is registered
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

/// Check the share against the committee and derive the chain parameters
fn validate(record: &ChainRecord, share: ThresholdShare) -> Result<ChainParams, ChainError> {
    if usize::from(share.n) != record.committee_nodes.len() {
        return Err(ChainError::CommitteeInconsistency(format!(
            "share for {} nodes, committee of {}",
            share.n,
            record.committee_nodes.len()
        )));
    }
    if share.t == 0 || share.t > share.n {
        return Err(ChainError::CommitteeInconsistency(format!(
            "threshold {} out of range for {} nodes",
            share.t, share.n
        )));
    }
    if share.index >= share.n {
        return Err(ChainError::CommitteeInconsistency(format!(
            "share index {} out of range for {} nodes",
            share.index, share.n
        )));
    }

    Ok(ChainParams {
        chain_id: record.chain_id,
        size: share.n,
        quorum: share.t,
        own_index: share.index,
    })
}
