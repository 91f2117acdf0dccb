use std::{sync::Arc, time::Duration};

use scchain_config::config::Config;
use scchain_data_structures::chain::{AgentId, ChainId};
use scchain_node::{
    actors::{chain::ChainDeps, messages::GetChainStatus},
    error::ChainError,
    registry::{ChainRecord, ChainRegistry, ThresholdShare},
    simulation::{InMemoryBlobCache, SimulatedLedger, SimulatedSigner, SimulatedVm},
    storage_mngr::SolidStateStore,
    utils::test_actix_system,
};
use scchain_p2p::local::LocalNetwork;
use scchain_storage::backends::hashmap;

const CHAIN: ChainId = ChainId([7; 32]);

fn committee() -> Vec<String> {
    (0..4).map(|i| format!("node-{}", i)).collect()
}

fn record() -> ChainRecord {
    ChainRecord {
        chain_id: CHAIN,
        committee_nodes: committee(),
        active: true,
    }
}

/// Dependencies of `node-1`, every other member registered in the same network
fn deps(ledger: &Arc<SimulatedLedger>) -> ChainDeps {
    let network = LocalNetwork::new();
    let nodes: Vec<_> = committee().iter().map(|n| network.node(n)).collect();

    ChainDeps {
        net: nodes[1].clone(),
        vm: Arc::new(SimulatedVm),
        signer: Arc::new(SimulatedSigner::new(1, 3)),
        ledger: ledger.clone(),
        persistence: Arc::new(SolidStateStore::new(Arc::new(hashmap::Backend::new()))),
        blobs: Arc::new(InMemoryBlobCache::new()),
        fee_destination: AgentId::default(),
        request_processed: None,
    }
}

const SHARE: ThresholdShare = ThresholdShare { index: 1, n: 4, t: 3 };

#[test]
fn inactive_chain_is_not_started() {
    test_actix_system(|| async {
        let ledger = Arc::new(SimulatedLedger::new());
        let mut registry = ChainRegistry::new(Config::default().chain);
        let mut inactive = record();
        inactive.active = false;

        let res = registry.activate(&inactive, SHARE, deps(&ledger));
        assert!(matches!(res, Err(ChainError::NotActive(_))));
        assert!(registry.is_empty());
    });
}

#[test]
fn inconsistent_committee_is_refused() {
    test_actix_system(|| async {
        let ledger = Arc::new(SimulatedLedger::new());
        let mut registry = ChainRegistry::new(Config::default().chain);

        // Share of another member
        let wrong_share = ThresholdShare { index: 2, ..SHARE };
        let res = registry.activate(&record(), wrong_share, deps(&ledger));
        assert!(matches!(res, Err(ChainError::CommitteeInconsistency(_))));

        // Own node missing from the committee
        let mut without_self = record();
        without_self.committee_nodes[1] = "node-9".to_string();
        let res = registry.activate(&without_self, SHARE, deps(&ledger));
        assert!(matches!(res, Err(ChainError::CommitteeInconsistency(_))));

        // Same node twice
        let mut duplicated = record();
        duplicated.committee_nodes[3] = "node-0".to_string();
        let res = registry.activate(&duplicated, SHARE, deps(&ledger));
        assert!(matches!(res, Err(ChainError::CommitteeInconsistency(_))));

        assert!(registry.is_empty());
    });
}

#[test]
fn activate_is_idempotent_and_deactivate_stops_the_chain() {
    test_actix_system(|| async {
        let ledger = Arc::new(SimulatedLedger::new());
        ledger.create_chain(CHAIN);
        let mut registry = ChainRegistry::new(Config::default().chain);
        let deps = deps(&ledger);

        let addr = registry.activate(&record(), SHARE, deps.clone()).unwrap();
        let again = registry.activate(&record(), SHARE, deps).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.chain_ids(), vec![CHAIN]);

        let status = again.send(GetChainStatus).await.unwrap();
        assert_eq!(status.chain_id, CHAIN);
        assert_eq!(status.own_index, 1);
        assert_eq!(ledger.num_subscribers(&CHAIN), 1);

        assert!(registry.deactivate(&CHAIN));
        assert!(!registry.deactivate(&CHAIN));
        assert!(registry.get(&CHAIN).is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(addr.send(GetChainStatus).await.is_err());
        assert_eq!(ledger.num_subscribers(&CHAIN), 0);
    });
}
