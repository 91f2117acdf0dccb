use std::{collections::BTreeMap, collections::HashSet, sync::Arc, time::Duration};

use log::{debug, error, trace, warn};
use tokio::{sync::mpsc, time};
use tokio_util::sync::CancellationToken;

use scchain_data_structures::{chain::ChainId, peer_set::PeerSet};

use crate::{
    error::{ExchangeError, PeeringError},
    network::{AttachId, NetId, NetworkProvider, PeerMessage, PeerSender, RecvCallback, RecvEvent},
};

/// Reason reported for targets which never answered
const NO_RESPONSE: &str = "no response";

/// The members of one chain committee, addressed by their index in the committee
pub struct PeerGroup {
    net: Arc<dyn NetworkProvider>,
    nodes: Vec<Arc<dyn PeerSender>>,
    self_index: u16,
}

impl PeerGroup {
    /// Build the group from the network ids of the committee, in committee order.
    ///
    /// Every id must be unique and known to the transport, and the own id must be present.
    pub fn new(net: Arc<dyn NetworkProvider>, committee: &[NetId]) -> Result<Self, PeeringError> {
        let mut seen = HashSet::with_capacity(committee.len());
        let mut nodes = Vec::with_capacity(committee.len());
        let mut self_index = None;

        for (i, net_id) in committee.iter().enumerate() {
            if !seen.insert(net_id.as_str()) {
                return Err(PeeringError::DuplicateNodes(net_id.clone()));
            }
            if net_id == net.self_net_id() {
                self_index = Some(i as u16);
            }
            let peer = net
                .peer_by_net_id(net_id)
                .ok_or_else(|| PeeringError::PeerNotFound(net_id.clone()))?;
            nodes.push(peer);
        }
        let self_index =
            self_index.ok_or_else(|| PeeringError::NotInGroup(net.self_net_id().to_string()))?;

        Ok(PeerGroup {
            net,
            nodes,
            self_index,
        })
    }

    /// Number of members
    pub fn size(&self) -> u16 {
        self.nodes.len() as u16
    }

    /// Index of this node
    pub fn self_index(&self) -> u16 {
        self.self_index
    }

    /// Network id of a member
    pub fn net_id(&self, index: u16) -> Option<&str> {
        self.nodes.get(usize::from(index)).map(|p| p.net_id())
    }

    /// Committee index of the member with the given network id
    pub fn peer_index_by_net_id(&self, net_id: &str) -> Option<u16> {
        self.nodes
            .iter()
            .position(|p| p.net_id() == net_id)
            .map(|i| i as u16)
    }

    fn peer(&self, index: u16) -> Option<&Arc<dyn PeerSender>> {
        self.nodes.get(usize::from(index))
    }

    /// Send `msg` to one member. Errors are logged.
    pub fn send_to_index(&self, index: u16, msg: &PeerMessage) {
        match self.peer(index) {
            Some(peer) => {
                trace!("Sending message type {} to peer #{}", msg.msg_type, index);
                peer.send_msg(msg);
            }
            None => error!(
                "Cannot send message type {}: peer index {} out of range (committee of {})",
                msg.msg_type,
                index,
                self.size()
            ),
        }
    }

    /// Send `msg` to every member, optionally including this node. Returns the number of sends.
    pub fn broadcast(&self, msg: &PeerMessage, include_self: bool) -> usize {
        let mut sent = 0;
        for (i, peer) in self.nodes.iter().enumerate() {
            if !include_self && i == usize::from(self.self_index) {
                continue;
            }
            peer.send_msg(msg);
            sent += 1;
        }

        sent
    }

    /// Whether the connection to a member is up. This node is always alive.
    pub fn is_alive(&self, index: u16) -> bool {
        index == self.self_index || self.peer(index).map_or(false, |p| p.is_alive())
    }

    /// Members currently alive, this node included
    pub fn alive_set(&self) -> PeerSet {
        let mut set = PeerSet::new(self.size());
        for i in (0..self.size()).filter(|i| self.is_alive(*i)) {
            set.mark_seen(i);
        }

        set
    }

    /// Number of members currently alive, this node included
    pub fn num_alive(&self) -> u16 {
        self.alive_set().count_seen() as u16
    }

    /// One-line status of every member, used in logs
    pub fn peer_status(&self) -> String {
        let entries: Vec<String> = (0..self.size())
            .map(|i| {
                let status = if i == self.self_index {
                    "self"
                } else if self.is_alive(i) {
                    "up"
                } else {
                    "down"
                };
                format!("{}:{}({})", i, status, self.net_id(i).unwrap_or_default())
            })
            .collect();

        entries.join(" ")
    }

    /// Receive the messages of `chain_id` sent by members of this group.
    ///
    /// Messages from senders outside of the group are dropped with a warning.
    pub fn attach<F>(&self, chain_id: ChainId, callback: F) -> AttachId
    where
        F: Fn(RecvEvent) + Send + Sync + 'static,
    {
        let members: HashSet<NetId> = self.nodes.iter().map(|p| p.net_id().to_string()).collect();
        let filtered: RecvCallback = Arc::new(move |ev: RecvEvent| {
            if members.contains(&ev.from) {
                callback(ev);
            } else {
                warn!(
                    "[{}] {}",
                    chain_id.short(),
                    PeeringError::UnknownSender(ev.from)
                );
            }
        });

        self.net.attach(chain_id, filtered)
    }

    /// Stop receiving messages
    pub fn detach(&self, attach_id: AttachId) {
        self.net.detach(attach_id);
    }

    /// Run a request/acknowledge round with `targets`.
    ///
    /// `on_send` is called for every target at the start and then, every `retry`, for the targets
    /// which have not acknowledged yet. Every message read from `recv` is attributed to a member by
    /// its network id and handed to `on_receive`; `Ok(true)` acknowledges the sender, an error is
    /// kept as the reason reported if the round times out. Messages from already acknowledged
    /// targets are dropped as duplicates.
    ///
    /// The round succeeds once `required` targets acknowledged (every target if there are fewer)
    /// and fails after `give_up`, or as soon as `cancel` fires or `recv` is closed.
    #[allow(clippy::too_many_arguments)]
    pub async fn exchange_round<S, R>(
        &self,
        targets: &[u16],
        required: usize,
        recv: &mut mpsc::UnboundedReceiver<RecvEvent>,
        retry: Duration,
        give_up: Duration,
        cancel: &CancellationToken,
        mut on_send: S,
        mut on_receive: R,
    ) -> Result<(), ExchangeError>
    where
        S: FnMut(u16, &dyn PeerSender),
        R: FnMut(u16, &RecvEvent) -> Result<bool, String>,
    {
        if let Some(invalid) = targets.iter().find(|t| **t >= self.size()) {
            return Err(ExchangeError::InvalidTarget(*invalid));
        }
        if cancel.is_cancelled() {
            return Err(ExchangeError::Cancelled);
        }

        let mut acked = PeerSet::new(self.size());
        let mut reasons: BTreeMap<u16, String> = targets
            .iter()
            .map(|t| (*t, NO_RESPONSE.to_string()))
            .collect();

        let required = required.min(reasons.len());
        for t in reasons.keys() {
            if let Some(peer) = self.peer(*t) {
                on_send(*t, peer.as_ref());
            }
        }

        let deadline = time::sleep(give_up);
        tokio::pin!(deadline);
        let mut retry_timer = time::interval_at(time::Instant::now() + retry, retry);

        loop {
            if acked.count_seen() >= required {
                return Ok(());
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ExchangeError::Cancelled),
                _ = &mut deadline => {
                    let unacked = std::mem::take(&mut reasons)
                        .into_iter()
                        .filter(|(t, _)| !acked.is_seen(*t))
                        .collect();
                    return Err(ExchangeError::RoundTimeout { timeout: give_up, unacked });
                }
                _ = retry_timer.tick() => {
                    for t in reasons.keys().filter(|t| !acked.is_seen(**t)) {
                        if let Some(peer) = self.peer(*t) {
                            debug!("Resending round message to peer #{}", t);
                            on_send(*t, peer.as_ref());
                        }
                    }
                }
                ev = recv.recv() => {
                    let ev = ev.ok_or(ExchangeError::ChannelClosed)?;
                    let index = match self.peer_index_by_net_id(&ev.from) {
                        Some(index) => index,
                        None => {
                            warn!("Round message dropped: {}", PeeringError::UnknownSender(ev.from));
                            continue;
                        }
                    };
                    let reason = match reasons.get_mut(&index) {
                        Some(reason) => reason,
                        None => {
                            debug!("Round message from peer #{} which is not a target", index);
                            continue;
                        }
                    };
                    if acked.is_seen(index) {
                        trace!("Duplicate round message from peer #{}", index);
                        continue;
                    }
                    match on_receive(index, &ev) {
                        Ok(true) => {
                            acked.mark_seen(index);
                        }
                        Ok(false) => {}
                        Err(e) => {
                            debug!("Round message from peer #{} rejected: {}", index, e);
                            *reason = e;
                        }
                    }
                }
            }
        }
    }
}
