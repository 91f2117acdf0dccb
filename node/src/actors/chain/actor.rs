use std::{sync::Arc, time::SystemTime};

use actix::prelude::*;
use log::{debug, info, warn};

use super::ChainActor;
use crate::{
    actors::messages::{ChainEvent, ConnectivityMsg},
    collaborators::{LedgerCallback, LedgerEvent},
    utils::stop_system_if_panicking,
};

/// Implement Actor trait for `ChainActor`
impl Actor for ChainActor {
    /// Every actor has to provide execution `Context` in which it can run
    type Context = Context<Self>;

    /// Method to be executed when the actor is started
    fn started(&mut self, ctx: &mut Self::Context) {
        debug!(
            "{} chain actor has been started, committee of {} with quorum {}",
            self.log_prefix(),
            self.params.size,
            self.params.quorum
        );
        ctx.set_mailbox_capacity(self.config.inbound_queue_capacity);

        self.attach_to_peers(ctx);

        let actions = self.sm.bootstrap(SystemTime::now());
        self.execute(actions, ctx);

        self.subscribe_to_ledger(ctx);

        ctx.run_interval(self.config.timer_tick_period, |act, ctx| {
            act.tick = act.tick.wrapping_add(1);
            ctx.notify(ChainEvent::TimerTick(act.tick));
        });
        ctx.run_interval(self.config.quorum_poll_period, |act, ctx| {
            ctx.notify(ChainEvent::Connectivity(ConnectivityMsg {
                alive: act.peers.alive_set(),
            }));
        });
        ctx.notify(ChainEvent::Connectivity(ConnectivityMsg {
            alive: self.peers.alive_set(),
        }));
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.release();
        info!("{} chain actor stopped", self.log_prefix());
    }
}

impl Drop for ChainActor {
    fn drop(&mut self) {
        stop_system_if_panicking("ChainActor");
    }
}

impl ChainActor {
    /// Peer messages go through the bounded mailbox and are dropped when it is full
    fn attach_to_peers(&mut self, ctx: &mut Context<Self>) {
        let addr = ctx.address();
        let chain_id = self.params.chain_id;
        let own_index = self.params.own_index;
        let attach_id = self.peers.attach(chain_id, move |ev| {
            if let Err(SendError::Full(ChainEvent::Peer(ev))) = addr.try_send(ChainEvent::Peer(ev))
            {
                warn!(
                    "[{}:{}] event queue full, message type {} from {} dropped",
                    chain_id.short(),
                    own_index,
                    ev.msg.msg_type,
                    ev.from
                );
            }
        });
        self.attach_id = Some(attach_id);
    }

    /// Ledger events are never dropped
    fn subscribe_to_ledger(&mut self, ctx: &mut Context<Self>) {
        let addr = ctx.address();
        let callback: LedgerCallback = Arc::new(move |event: LedgerEvent| {
            addr.do_send(ChainEvent::from(event));
        });
        let subscription = self.ledger.subscribe(self.params.chain_id, callback);
        self.subscription = Some(subscription);
    }
}
