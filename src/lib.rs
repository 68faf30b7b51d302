//! Marshaling bridge between a managed runtime and an embedded Prolog engine
//!
//! Byte buffers from the managed side become engine integer lists, a goal is
//! built and run, and the engine may call back into the caller object
//! through `interprolog_callback/3` while the query is still executing.

// Core modules
pub mod bridge;
pub mod codec;
pub mod engine;
pub mod errors;
pub mod frontend;
pub mod logging;
pub mod managed;

// Re-export commonly used items
pub use bridge::{Bridge, BridgeStats, NullReplyPolicy, QueryOutcome, QueryState};
pub use codec::{ByteBuffer, ZeroLengthPolicy};
pub use engine::{Engine, InterruptFlag, ScriptedEngine, Status};
pub use errors::{BridgeError, ConfigError, HeapError, Result};
pub use frontend::{cli_main, BridgeConfig};
pub use managed::{identity_caller, FnCaller, LocalRuntime, ManagedFault, ManagedObject, ManagedRuntime};
