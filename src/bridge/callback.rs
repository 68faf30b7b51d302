//! The `interprolog_callback/3` built-in
//!
//! Runs inside engine execution: the engine holds the call stack, the
//! bridge lends this dispatcher the pieces of itself the callback needs, and
//! a failure here is ordinary predicate failure to the engine. Faults that
//! the outer caller must observe are parked in `pending` and raised once
//! the engine returns.

use super::lease::LeaseTracker;
use super::state::{QueryMachine, QueryState};
use super::stats::Counters;
use crate::codec::{self, ByteBuffer, Reservation, ZeroLengthPolicy};
use crate::engine::{Foreign, Frame};
use crate::errors::{BridgeError, Result};
use crate::logging::trace_step;
use crate::managed::{ManagedObject, ManagedRuntime, CALLBACK_METHOD, CALLBACK_SIGNATURE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

/// What a callback that returns no buffer means
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullReplyPolicy {
    /// The built-in fails; engine sees ordinary failure
    #[default]
    Fail,
    /// Bind the reply argument to the empty list
    EmptyList,
    /// Fail the built-in and raise `NullReply` to the outer caller
    Fault,
}

pub(crate) struct CallbackDispatch<'b> {
    pub predicate: &'b str,
    pub null_reply: NullReplyPolicy,
    pub caller: Option<Arc<dyn ManagedObject>>,
    pub runtime: &'b dyn ManagedRuntime,
    pub machine: &'b mut QueryMachine,
    pub leases: &'b LeaseTracker,
    pub counters: &'b mut Counters,
    pub pending: &'b mut Option<BridgeError>,
    pub debug: bool,
}

impl<'b> CallbackDispatch<'b> {
    fn handle_callback(&mut self, frame: &mut Frame<'_>) -> Result<()> {
        let caller = self.caller.clone().ok_or(BridgeError::MissingRegistration)?;
        self.runtime.attach_current_thread()?;

        let class = caller.class_name().ok_or(BridgeError::MissingClass)?;
        let method = caller
            .callback_method()
            .ok_or_else(|| BridgeError::MissingMethod {
                class: class.to_string(),
                name: CALLBACK_METHOD,
                signature: CALLBACK_SIGNATURE,
            })?;
        trace_step!(self.debug, class, "interprolog_callback");

        let (Some(length), Some(list), Some(reply_slot)) = (frame.arg(1), frame.arg(2), frame.arg(3))
        else {
            return Err(BridgeError::MalformedList(format!(
                "{} expects 3 arguments, got {}",
                self.predicate,
                frame.arity()
            )));
        };

        let declared = frame
            .heap
            .int_value(length)?
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| BridgeError::MalformedList("length is not a natural number".into()))?;
        trace_step!(self.debug, bsize = declared, "declared request size");

        let request = self
            .leases
            .lease(codec::encode(&*frame.heap, list, Some(declared))?);
        self.counters.bytes_out += request.len() as u64;
        trace_step!(self.debug, bytes = request.len(), "messaging managed side");

        let outcome = method.invoke(&request);
        drop(request);
        trace_step!(self.debug, "returned from managed side");

        let reply = match outcome {
            Ok(Some(reply)) => reply,
            Ok(None) if self.null_reply == NullReplyPolicy::EmptyList => {
                warn!("callback did not return a byte buffer, binding empty list");
                ByteBuffer::new()
            }
            Ok(None) => return Err(BridgeError::NullReply),
            Err(fault) => return Err(fault.into()),
        };

        trace_step!(self.debug, bytes = reply.len(), "constructing result list");
        codec::decode(
            &mut *frame.heap,
            &reply,
            reply_slot,
            Reservation::CallbackReply,
            ZeroLengthPolicy::Empty,
        )?;
        self.counters.bytes_in += reply.len() as u64;
        trace_step!(self.debug, "exiting interprolog_callback");
        Ok(())
    }

    /// Log a callback failure and park it if the outer caller must see it
    fn report(&mut self, err: BridgeError) {
        self.counters.callback_failures += 1;
        match &err {
            BridgeError::ManagedFault(fault) => {
                self.counters.faults += 1;
                error!(class = %fault.class, message = %fault.message, "pending managed fault, rethrowing to caller");
                self.park(err);
            }
            BridgeError::FatalAllocation(_) => {
                error!(error = %err, "could not grow working memory for callback reply");
                self.park(err);
            }
            BridgeError::NullReply => {
                warn!("did not get back a byte buffer from the callback");
                if self.null_reply == NullReplyPolicy::Fault {
                    self.park(err);
                }
            }
            _ => warn!(error = %err, predicate = self.predicate, "callback aborted"),
        }
    }

    /// Fatal conditions replace anything parked; otherwise the first fault wins
    fn park(&mut self, err: BridgeError) {
        let replace = match &*self.pending {
            None => true,
            Some(parked) => err.is_fatal() && !parked.is_fatal(),
        };
        if replace {
            *self.pending = Some(err);
        }
    }
}

impl<'b> Foreign for CallbackDispatch<'b> {
    fn call(&mut self, name: &str, frame: &mut Frame<'_>) -> bool {
        if name != self.predicate {
            warn!(predicate = name, "unknown foreign predicate");
            return false;
        }
        self.counters.callbacks += 1;

        if let Err(err) = self.machine.transition(QueryState::AwaitingCallback) {
            self.report(err);
            return false;
        }
        let result = self.handle_callback(frame);
        if let Err(err) = self.machine.transition(QueryState::Running) {
            self.report(err);
            return false;
        }

        match result {
            Ok(()) => true,
            Err(err) => {
                self.report(err);
                false
            }
        }
    }
}
