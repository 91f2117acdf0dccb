use actix::{Context, Handler, MessageResult};
use log::trace;

use super::ChainActor;
use crate::actors::messages::{ChainEvent, GetChainStatus, StartTestTrace};

////////////////////////////////////////////////////////////////////////////////////////
// ACTOR MESSAGE HANDLERS
////////////////////////////////////////////////////////////////////////////////////////

/// Handler for ChainEvent message
impl Handler<ChainEvent> for ChainActor {
    type Result = ();

    fn handle(&mut self, event: ChainEvent, ctx: &mut Context<Self>) {
        if self.dismissed {
            return;
        }
        if !self.queue_open {
            trace!(
                "{} {} dropped, the state manager is not ready",
                self.log_prefix(),
                event.name()
            );
            return;
        }

        let actions = self.dispatch(event, ctx);
        self.execute(actions, ctx);
    }
}

/// Handler for GetChainStatus message
impl Handler<GetChainStatus> for ChainActor {
    type Result = MessageResult<GetChainStatus>;

    fn handle(&mut self, _msg: GetChainStatus, _ctx: &mut Context<Self>) -> Self::Result {
        MessageResult(self.status())
    }
}

/// Handler for StartTestTrace message
impl Handler<StartTestTrace> for ChainActor {
    type Result = ();

    fn handle(&mut self, _msg: StartTestTrace, ctx: &mut Context<Self>) {
        if self.dismissed || !self.queue_open {
            return;
        }
        let actions = self.start_test_trace();
        self.execute(actions, ctx);
    }
}
