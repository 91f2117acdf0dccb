use std::{sync::Arc, time::Duration};

pub use actix::System;
use actix::Recipient;
use log::{debug, info};

use scchain_config::config::{Config, Storage};
use scchain_data_structures::{
    chain::{AgentId, ChainId, Hash},
    request::{ArgValue, RequestArgs},
};
use scchain_p2p::local::LocalNetwork;

use crate::{
    actors::{chain::ChainDeps, messages::RequestProcessed},
    error::ChainError,
    registry::{ChainRecord, ChainRegistry, ThresholdShare},
    simulation::{InMemoryBlobCache, SimulatedLedger, SimulatedSigner, SimulatedVm},
    storage_mngr::{create_appropriate_backend, SolidStateStore},
};

/// Period between two requests sent by the request feeder of [`run`]
const REQUEST_FEED_PERIOD: Duration = Duration::from_secs(1);

/// Committee of nodes sharing one process, one in-memory network and one ledger
pub struct LocalCommittee {
    /// Network connecting the nodes
    pub network: LocalNetwork,
    /// Ledger shared by the nodes
    pub ledger: Arc<SimulatedLedger>,
    /// Registry of every node, in committee order
    pub nodes: Vec<ChainRegistry>,
    /// Chains run by the committee
    pub chain_ids: Vec<ChainId>,
}

impl LocalCommittee {
    /// Dismiss every chain of every node
    pub fn dismiss_all(&mut self) {
        for registry in &mut self.nodes {
            registry.dismiss_all();
        }
    }
}

/// Net id of the node at `index` of a local committee
pub fn local_net_id(index: u16) -> String {
    format!("node-{}", index)
}

/// Deterministic id of the chain number `n` of a local committee
pub fn local_chain_id(n: u16) -> ChainId {
    ChainId(Hash::of_parts(&[b"chain", &n.to_be_bytes()[..]]).0)
}

/// Start every chain of the committee described in `config` on every node.
///
/// Must be called from within a running actix system.
pub fn start_local_committee(
    config: &Config,
    request_processed: Option<Recipient<RequestProcessed>>,
) -> Result<LocalCommittee, ChainError> {
    let committee = &config.committee;
    let network = LocalNetwork::new();
    let ledger = Arc::new(SimulatedLedger::new());

    let net_ids: Vec<String> = (0..committee.size).map(local_net_id).collect();
    let chain_ids: Vec<ChainId> = (0..committee.chains).map(local_chain_id).collect();
    for chain_id in &chain_ids {
        let origin = ledger.create_chain(*chain_id);
        debug!("Origin of chain {} is {}", chain_id, origin.id().short());
    }

    // Every member must be known to the network before the first peer group is built
    let providers: Vec<_> = net_ids.iter().map(|net_id| network.node(net_id)).collect();

    let mut nodes = Vec::with_capacity(net_ids.len());
    for ((index, net_id), provider) in (0u16..).zip(&net_ids).zip(providers) {
        let backend = create_appropriate_backend(&Storage {
            backend: config.storage.backend,
            db_path: config.storage.db_path.join(net_id),
        })?;
        let deps = ChainDeps {
            net: provider,
            vm: Arc::new(SimulatedVm),
            signer: Arc::new(SimulatedSigner::new(index, committee.quorum)),
            ledger: ledger.clone(),
            persistence: Arc::new(SolidStateStore::new(backend)),
            blobs: Arc::new(InMemoryBlobCache::new()),
            fee_destination: AgentId::default(),
            request_processed: request_processed.clone(),
        };
        let share = ThresholdShare {
            index,
            n: committee.size,
            t: committee.quorum,
        };

        let mut registry = ChainRegistry::new(config.chain.clone());
        for chain_id in &chain_ids {
            let record = ChainRecord {
                chain_id: *chain_id,
                committee_nodes: net_ids.clone(),
                active: true,
            };
            registry.activate(&record, share, deps.clone())?;
        }
        nodes.push(registry);
    }

    info!(
        "Local committee of {} nodes running {} chains",
        committee.size, committee.chains
    );

    Ok(LocalCommittee {
        network,
        ledger,
        nodes,
        chain_ids,
    })
}

/// Function to run the main system
pub fn run(config: Arc<Config>, callback: fn()) -> anyhow::Result<()> {
    // Init system
    let system = System::new();

    // Init actors
    let committee = system.block_on(async {
        // Call cb function (register interrupt handlers)
        callback();

        let committee = start_local_committee(&config, None)?;

        // Feed the chains with requests
        let ledger = committee.ledger.clone();
        let chain_ids = committee.chain_ids.clone();
        actix::spawn(async move {
            let mut interval = tokio::time::interval(REQUEST_FEED_PERIOD);
            let mut n: u64 = 0;
            loop {
                interval.tick().await;
                n += 1;
                for chain_id in &chain_ids {
                    let mut args = RequestArgs::new();
                    args.insert("n".to_string(), ArgValue::Inline(n.to_be_bytes().to_vec()));
                    let request_id = ledger.send_request(*chain_id, args, 0);
                    debug!("Request {} sent to chain {}", request_id.short(), chain_id);
                }
            }
        });

        Ok::<_, ChainError>(committee)
    })?;

    // Run system
    system.run()?;
    drop(committee);

    Ok(())
}

/// Function to close the main system
pub fn close(system: &System) {
    info!("Closing node");
    system.stop();
}
