//! Message dispatcher
//!
//! Routes each message to its handler inside a store checkpoint. A handler
//! that panics is caught here: every store write it made is rolled back
//! and the panic comes back as an internal error so the block carries on.

use std::panic::{catch_unwind, AssertUnwindSafe};

use asgard_core::{Error, Event, Msg, Result};
use asgard_store::Keeper;

/// Events emitted while handling one message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerResult {
    pub events: Vec<Event>,
}

pub fn dispatch(keeper: &mut Keeper, msg: &Msg) -> Result<HandlerResult> {
    dispatch_with(keeper, msg, route)
}

fn dispatch_with(
    keeper: &mut Keeper,
    msg: &Msg,
    handler: impl FnOnce(&mut Keeper, &Msg) -> Result<()>,
) -> Result<HandlerResult> {
    let depth = keeper.checkpoint_depth();
    let first_event = keeper.events().len();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        keeper.with_checkpoint(|k| match handler(k, msg) {
            // the yggdrasil return requested before failing must persist
            Err(Error::ReturnYgg) => Ok(Err(Error::ReturnYgg)),
            other => other.map(Ok),
        })
    }));
    match outcome {
        Ok(Ok(Ok(()))) => Ok(HandlerResult {
            events: keeper.events()[first_event..].to_vec(),
        }),
        Ok(Ok(Err(err)) | Err(err)) => {
            tracing::debug!(msg = msg.name(), code = err.code(), error = %err, "handler failed");
            Err(err)
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            tracing::error!(msg = msg.name(), reason = %reason, "handler panicked");
            keeper.rollback_to(depth)?;
            Err(Error::internal(format!("panic in {} handler: {reason}", msg.name())))
        }
    }
}

fn route(keeper: &mut Keeper, msg: &Msg) -> Result<()> {
    match msg {
        Msg::Swap(m) => {
            let outcome = amm::handle_swap(keeper, m)?;
            tracing::debug!(tx = %m.tx.id, emit = outcome.emit, "swap handled");
            Ok(())
        }
        Msg::UnBond(m) => validators::handle_unbond(keeper, m),
        Msg::Bond(m) => validators::handle_bond(keeper, m),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
