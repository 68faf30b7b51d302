//! Boundary controller
//!
//! [`Bridge`] is the context object every boundary call goes through. It
//! owns the engine handle and the active caller slot, decodes the caller's
//! buffer into a fresh goal, runs the goal, services `interprolog_callback/3`
//! while the engine is mid-query, and hands faults and results back to the
//! outer caller.
//!
//! Architecture:
//! - `state.rs` - Idle/Running/AwaitingCallback/Completed/Failed machine
//! - `callback.rs` - the re-entrant built-in dispatched by the engine
//! - `lease.rs` - scoped ownership of buffers lent to the managed side
//! - `stats.rs` - counters

mod callback;
mod lease;
mod state;
mod stats;

pub use callback::NullReplyPolicy;
pub use lease::{BufferLease, LeaseTracker};
pub use state::{QueryMachine, QueryState};
pub use stats::BridgeStats;

use crate::codec::{self, ByteBuffer, Reservation};
use crate::engine::{Engine, Foreign, InterruptFlag, Status, TermRef};
use crate::errors::{BridgeError, Result};
use crate::frontend::BridgeConfig;
use crate::logging::trace_step;
use crate::managed::{LocalRuntime, ManagedObject, ManagedRuntime};
use callback::CallbackDispatch;
use smallvec::SmallVec;
use stats::Counters;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of one `invoke_query`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutcome {
    /// Raw engine status
    pub status: Status,
    /// Second goal argument encoded back, when it is bound to a byte list
    pub reply: Option<ByteBuffer>,
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

pub struct Bridge<E: Engine> {
    engine: E,
    runtime: Arc<dyn ManagedRuntime>,
    caller: Option<Arc<dyn ManagedObject>>,
    debug: bool,
    config: BridgeConfig,
    machine: QueryMachine,
    leases: LeaseTracker,
    counters: Counters,
    interrupt: InterruptFlag,
    initialized: bool,
}

impl<E: Engine> Bridge<E> {
    pub fn new(engine: E, runtime: Arc<dyn ManagedRuntime>, config: BridgeConfig) -> Self {
        let interrupt = engine.interrupt_flag();
        Self {
            engine,
            runtime,
            caller: None,
            debug: config.debug.enabled,
            config,
            machine: QueryMachine::new(),
            leases: LeaseTracker::new(),
            counters: Counters::default(),
            interrupt,
            initialized: false,
        }
    }

    /// Bridge with an in-process runtime and default configuration
    pub fn with_engine(engine: E) -> Self {
        Self::new(engine, Arc::new(LocalRuntime::new()), BridgeConfig::default())
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn state(&self) -> QueryState {
        self.machine.state()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn stats(&self) -> BridgeStats {
        self.counters.snapshot(self.leases.outstanding())
    }

    pub fn leases(&self) -> &LeaseTracker {
        &self.leases
    }

    /// Toggle step tracing; purely observational
    pub fn set_debug(&mut self, enabled: bool) {
        self.debug = enabled;
        debug!(enabled, "debug tracing toggled");
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Register the object the engine calls back into
    pub fn register_caller(&mut self, caller: Arc<dyn ManagedObject>) {
        self.caller = Some(caller);
    }

    pub fn clear_caller(&mut self) {
        self.caller = None;
    }

    pub fn has_caller(&self) -> bool {
        self.caller.is_some()
    }

    /// Handle for interrupting from other threads
    pub fn interrupter(&self) -> InterruptFlag {
        self.interrupt.clone()
    }

    /// Request cooperative cancellation of the running query
    pub fn interrupt(&self) {
        if !self.interrupt.is_active() {
            debug!("interrupt requested with no active query");
        }
        self.interrupt.request();
    }

    /// Start the engine with `[path, "-n"]`
    pub fn init_engine(&mut self, path: &str) -> Result<Status> {
        self.init_engine_with_args(path, &[])
    }

    /// Start the engine with `[path, "-n", args...]`
    pub fn init_engine_with_args(&mut self, path: &str, args: &[String]) -> Result<Status> {
        self.ensure_usable()?;
        let mut argv = Vec::with_capacity(args.len() + 2);
        argv.push(path.to_string());
        argv.push("-n".to_string());
        argv.extend(args.iter().cloned());

        trace_step!(self.debug, argv = ?argv, "entering engine init");
        let status = self.engine.init(&argv);
        trace_step!(self.debug, status = %status, "exiting engine init");
        if !status.is_success() {
            error!(status = %status, message = ?self.engine.error_message(), "engine initialization error");
            return Err(BridgeError::EngineInit(status));
        }
        self.initialized = true;
        info!(path, extra_args = args.len(), "engine initialized");
        Ok(status)
    }

    /// Start the engine from the `[engine]` config section
    pub fn init_from_config(&mut self) -> Result<Status> {
        let path = self
            .config
            .engine
            .path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .ok_or(crate::errors::ConfigError::InvalidValue {
                key: "engine.path",
                value: String::new(),
            })?;
        let args = self.config.engine.args.clone();
        self.init_engine_with_args(&path, &args)
    }

    /// Submit `buffer` as the first argument of `functor/arg_count`
    ///
    /// Arities 2 and 3 add fresh unbound variables for the reply and
    /// auxiliary slots. The engine may call back into `caller` any number of
    /// times before this returns.
    pub fn invoke_query(
        &mut self,
        caller: Arc<dyn ManagedObject>,
        buffer: &[i8],
        arg_count: usize,
        functor: &str,
    ) -> Result<QueryOutcome> {
        self.ensure_usable()?;
        if !(1..=3).contains(&arg_count) {
            return Err(BridgeError::InvalidArity(arg_count));
        }
        trace_step!(self.debug, functor, arg_count, bytes = buffer.len(), "entering put_bytes");

        self.caller = Some(caller);
        self.reopen()?;

        let (goal, args) = match self.build_goal(buffer, arg_count, functor) {
            Ok(built) => built,
            Err(err) if err.is_fatal() => return Err(self.poison(err)),
            Err(err) => return Err(err),
        };
        self.counters.queries += 1;
        self.counters.bytes_in += buffer.len() as u64;

        let status = self.execute(|engine, foreign| engine.query(goal, foreign))?;

        let reply = match args.get(1) {
            Some(&slot) if status.is_success() => self.extract_reply(slot),
            _ => None,
        };
        trace_step!(self.debug, status = %status, "leaving put_bytes");
        Ok(QueryOutcome { status, reply })
    }

    /// Arity-1 `invoke_query`; true iff the goal succeeded
    pub fn command_with_array(
        &mut self,
        caller: Arc<dyn ManagedObject>,
        functor: &str,
        buffer: &[i8],
    ) -> Result<bool> {
        Ok(self.invoke_query(caller, buffer, 1, functor)?.is_success())
    }

    /// Execute a command string with no list marshaling
    pub fn run_command(&mut self, caller: Arc<dyn ManagedObject>, text: &str) -> Result<Status> {
        self.ensure_usable()?;
        self.reopen()?;
        self.caller = Some(caller);
        self.counters.commands += 1;
        trace_step!(self.debug, command = text, "running command string");
        self.execute(|engine, foreign| engine.command_string(text, foreign))
    }

    /// Run `text` as a goal: success is `true`, failure `false`
    ///
    /// Closes the open query first and appends the terminating period when
    /// it is missing. Any other status is an error.
    pub fn command(&mut self, caller: Arc<dyn ManagedObject>, text: &str) -> Result<bool> {
        self.close_query();
        let text = if text.trim_end().ends_with('.') {
            text.to_string()
        } else {
            format!("{}.", text)
        };

        let status = self.run_command(caller, &text)?;
        match status {
            Status::SUCCESS => Ok(true),
            Status::FAILURE => Ok(false),
            other => Err(BridgeError::EngineQuery {
                status: other,
                message: self.engine.error_message().unwrap_or_default(),
            }),
        }
    }

    /// Release the open query's resources
    pub fn close_query(&mut self) -> Status {
        let status = self.engine.close_query();
        if self.machine.state().is_open() {
            // is_open guarantees the transition is legal
            let _ = self.machine.transition(QueryState::Idle);
        }
        status
    }

    /// Stop the engine; also done on drop
    pub fn shutdown(&mut self) -> Status {
        if !self.initialized {
            return Status::SUCCESS;
        }
        self.initialized = false;
        let status = self.engine.close();
        if status.is_success() {
            info!("engine shut down");
        } else {
            error!(status = %status, "engine exited uncleanly");
        }
        status
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.machine.state() == QueryState::Poisoned {
            return Err(BridgeError::Poisoned);
        }
        Ok(())
    }

    /// Discard a previous query still held by the engine
    fn reopen(&mut self) -> Result<()> {
        if self.machine.state().is_open() {
            self.engine.close_query();
            self.machine.transition(QueryState::Idle)?;
        }
        Ok(())
    }

    fn build_goal(
        &mut self,
        buffer: &[i8],
        arg_count: usize,
        functor: &str,
    ) -> Result<(TermRef, SmallVec<[TermRef; 4]>)> {
        let zero_length = self.config.codec.zero_length;
        let heap = self.engine.heap();
        let goal = heap.new_var()?;
        let args = heap.bind_functor(goal, functor, arg_count)?;
        codec::decode(heap, buffer, args[0], Reservation::QueryArgument, zero_length)?;
        trace_step!(self.debug, cells = heap.len(), "constructed goal");
        Ok((goal, args))
    }

    /// Run the engine with the callback dispatcher lent to it
    fn execute<F>(&mut self, run: F) -> Result<Status>
    where
        F: FnOnce(&mut E, &mut dyn Foreign) -> Status,
    {
        self.machine.transition(QueryState::Running)?;
        self.interrupt.set_active(true);

        let mut pending = None;
        let status = {
            let mut dispatch = CallbackDispatch {
                predicate: &self.config.callback.predicate,
                null_reply: self.config.callback.null_reply,
                caller: self.caller.clone(),
                runtime: self.runtime.as_ref(),
                machine: &mut self.machine,
                leases: &self.leases,
                counters: &mut self.counters,
                pending: &mut pending,
                debug: self.debug,
            };
            run(&mut self.engine, &mut dispatch)
        };
        self.interrupt.set_active(false);

        if let Some(err) = pending {
            if err.is_fatal() {
                return Err(self.poison(err));
            }
            self.machine.transition(QueryState::Failed)?;
            return Err(err);
        }

        if status.is_error() {
            let message = self.engine.error_message().unwrap_or_default();
            error!(status = %status, message = %message, "engine error");
        }

        let next = if status.is_success() {
            QueryState::Completed
        } else {
            QueryState::Failed
        };
        self.machine.transition(next)?;
        Ok(status)
    }

    /// Encode the reply slot if the goal bound it to a byte list
    fn extract_reply(&mut self, slot: TermRef) -> Option<ByteBuffer> {
        let heap = self.engine.heap();
        if heap.is_unbound(slot).unwrap_or(true) {
            return None;
        }
        match codec::encode(heap, slot, None) {
            Ok(reply) => {
                self.counters.bytes_out += reply.len() as u64;
                Some(reply)
            }
            Err(err) => {
                debug!(error = %err, "reply argument is not a byte list");
                None
            }
        }
    }

    fn poison(&mut self, err: BridgeError) -> BridgeError {
        error!(error = %err, "fatal failure, bridge is no longer usable");
        self.machine.poison();
        self.interrupt.set_active(false);
        err
    }
}

impl<E: Engine> Drop for Bridge<E> {
    fn drop(&mut self) {
        if self.initialized {
            let status = self.shutdown();
            if !status.is_success() {
                warn!(status = %status, "engine did not close cleanly on drop");
            }
        }
    }
}
