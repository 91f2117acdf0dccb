//! In-process transport connecting several nodes of the same process.
//!
//! Delivery is synchronous: the receiving callbacks run on the sending thread. Nodes can be
//! marked down and a fraction of the messages can be dropped to simulate an unreliable network.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::trace;
use rand::Rng;

use scchain_data_structures::chain::ChainId;

use crate::network::{AttachId, NetId, NetworkProvider, PeerMessage, PeerSender, RecvCallback, RecvEvent};

struct Attachment {
    id: AttachId,
    chain_id: ChainId,
    callback: RecvCallback,
}

#[derive(Default)]
struct Hub {
    alive: HashMap<NetId, bool>,
    attachments: HashMap<NetId, Vec<Attachment>>,
    next_attach_id: AttachId,
    drop_probability: f64,
}

fn lock(hub: &Mutex<Hub>) -> MutexGuard<'_, Hub> {
    hub.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared hub of the in-process network
#[derive(Clone, Default)]
pub struct LocalNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl LocalNetwork {
    /// Empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node and return its view of the network
    pub fn node(&self, net_id: &str) -> Arc<LocalNode> {
        lock(&self.hub).alive.insert(net_id.to_string(), true);

        Arc::new(LocalNode {
            net_id: net_id.to_string(),
            hub: Arc::clone(&self.hub),
        })
    }

    /// Mark a node up or down. Messages from or to a down node are lost.
    pub fn set_alive(&self, net_id: &str, alive: bool) {
        lock(&self.hub).alive.insert(net_id.to_string(), alive);
    }

    /// Fraction of the messages silently dropped, between 0 and 1
    pub fn set_drop_probability(&self, probability: f64) {
        lock(&self.hub).drop_probability = probability.clamp(0.0, 1.0);
    }
}

/// One node of a [`LocalNetwork`]
pub struct LocalNode {
    net_id: NetId,
    hub: Arc<Mutex<Hub>>,
}

impl NetworkProvider for LocalNode {
    fn self_net_id(&self) -> &str {
        &self.net_id
    }

    fn peer_by_net_id(&self, net_id: &str) -> Option<Arc<dyn PeerSender>> {
        if !lock(&self.hub).alive.contains_key(net_id) {
            return None;
        }

        Some(Arc::new(LocalPeer {
            from: self.net_id.clone(),
            to: net_id.to_string(),
            hub: Arc::clone(&self.hub),
        }))
    }

    fn attach(&self, chain_id: ChainId, callback: RecvCallback) -> AttachId {
        let mut hub = lock(&self.hub);
        hub.next_attach_id += 1;
        let id = hub.next_attach_id;
        hub.attachments
            .entry(self.net_id.clone())
            .or_default()
            .push(Attachment {
                id,
                chain_id,
                callback,
            });

        id
    }

    fn detach(&self, attach_id: AttachId) {
        if let Some(list) = lock(&self.hub).attachments.get_mut(&self.net_id) {
            list.retain(|a| a.id != attach_id);
        }
    }
}

struct LocalPeer {
    from: NetId,
    to: NetId,
    hub: Arc<Mutex<Hub>>,
}

impl PeerSender for LocalPeer {
    fn net_id(&self) -> &str {
        &self.to
    }

    fn send_msg(&self, msg: &PeerMessage) {
        let callbacks: Vec<RecvCallback> = {
            let hub = lock(&self.hub);
            let up = |id: &NetId| hub.alive.get(id).copied().unwrap_or(false);
            if !up(&self.from) || !up(&self.to) {
                trace!("{} -> {}: peer down, message lost", self.from, self.to);
                return;
            }
            if hub.drop_probability > 0.0 && rand::thread_rng().gen_bool(hub.drop_probability) {
                trace!("{} -> {}: message dropped", self.from, self.to);
                return;
            }
            hub.attachments
                .get(&self.to)
                .map(|list| {
                    list.iter()
                        .filter(|a| a.chain_id == msg.chain_id)
                        .map(|a| Arc::clone(&a.callback))
                        .collect()
                })
                .unwrap_or_default()
        };

        for callback in callbacks {
            callback(RecvEvent {
                from: self.from.clone(),
                msg: msg.clone(),
            });
        }
    }

    fn is_alive(&self) -> bool {
        let hub = lock(&self.hub);
        let up = |id: &NetId| hub.alive.get(id).copied().unwrap_or(false);

        up(&self.from) && up(&self.to)
    }
}
