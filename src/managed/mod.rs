//! Managed-runtime side of the boundary
//!
//! A caller registers an object implementing [`ManagedObject`]; the engine
//! reaches it through the single fixed-shape [`CallbackMethod`] (one byte
//! buffer in, one byte buffer out). Before any managed call the invoking
//! thread is attached through [`ManagedRuntime`].

use crate::codec::ByteBuffer;
use crate::errors::{BridgeError, Result};
use dashmap::DashSet;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::debug;

/// Name and descriptor of the fixed callback method
pub const CALLBACK_METHOD: &str = "callback";
pub const CALLBACK_SIGNATURE: &str = "([B)[B";

/// Exception raised by managed code during a callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedFault {
    pub class: String,
    pub message: String,
}

impl ManagedFault {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ManagedFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}

impl std::error::Error for ManagedFault {}

/// The one method the engine calls back into
pub trait CallbackMethod {
    /// `Ok(None)` models a managed method that returned no buffer
    fn invoke(
        &self,
        request: &[i8],
    ) -> std::result::Result<Option<ByteBuffer>, ManagedFault>;
}

/// Object registered as the active caller
pub trait ManagedObject: Send + Sync {
    /// Runtime class of the object, `None` if it cannot be resolved
    fn class_name(&self) -> Option<&str>;

    /// Locate `callback([B)[B`, `None` if the class does not define it
    fn callback_method(&self) -> Option<&dyn CallbackMethod>;
}

/// Caller whose callback is a closure
pub struct FnCaller<F> {
    class: String,
    callback: F,
}

impl<F> FnCaller<F>
where
    F: Fn(&[i8]) -> std::result::Result<Option<ByteBuffer>, ManagedFault> + Send + Sync,
{
    pub fn new(class: impl Into<String>, callback: F) -> Self {
        Self {
            class: class.into(),
            callback,
        }
    }

    pub fn shared(class: impl Into<String>, callback: F) -> Arc<Self> {
        Arc::new(Self::new(class, callback))
    }
}

impl<F> CallbackMethod for FnCaller<F>
where
    F: Fn(&[i8]) -> std::result::Result<Option<ByteBuffer>, ManagedFault> + Send + Sync,
{
    fn invoke(
        &self,
        request: &[i8],
    ) -> std::result::Result<Option<ByteBuffer>, ManagedFault> {
        (self.callback)(request)
    }
}

impl<F> ManagedObject for FnCaller<F>
where
    F: Fn(&[i8]) -> std::result::Result<Option<ByteBuffer>, ManagedFault> + Send + Sync,
{
    fn class_name(&self) -> Option<&str> {
        Some(&self.class)
    }

    fn callback_method(&self) -> Option<&dyn CallbackMethod> {
        Some(self)
    }
}

/// Caller that echoes every request back
pub fn identity_caller() -> Arc<dyn ManagedObject> {
    FnCaller::shared("IdentityCaller", |request: &[i8]| {
        Ok(Some(ByteBuffer::from(request)))
    })
}

/// Execution context of the managed runtime
pub trait ManagedRuntime: Send + Sync {
    /// Associate the current OS thread with the runtime; must be idempotent
    fn attach_current_thread(&self) -> Result<()>;

    fn is_attached(&self, thread: ThreadId) -> bool;
}

/// Runtime that lives in this process and tracks attached threads
#[derive(Debug, Default)]
pub struct LocalRuntime {
    attached: DashSet<ThreadId>,
    max_threads: Option<usize>,
}

impl LocalRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse attachment beyond `max_threads` distinct threads
    pub fn with_thread_limit(max_threads: usize) -> Self {
        Self {
            attached: DashSet::new(),
            max_threads: Some(max_threads),
        }
    }

    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }
}

impl ManagedRuntime for LocalRuntime {
    fn attach_current_thread(&self) -> Result<()> {
        let id = thread::current().id();
        if self.attached.contains(&id) {
            return Ok(());
        }
        if let Some(limit) = self.max_threads {
            if self.attached.len() >= limit {
                return Err(BridgeError::ThreadAttach(format!(
                    "thread limit {} reached",
                    limit
                )));
            }
        }
        if self.attached.insert(id) {
            debug!(thread = ?id, "attached thread to managed runtime");
        }
        Ok(())
    }

    fn is_attached(&self, thread: ThreadId) -> bool {
        self.attached.contains(&thread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_is_idempotent() {
        let runtime = LocalRuntime::new();
        runtime.attach_current_thread().unwrap();
        runtime.attach_current_thread().unwrap();
        assert_eq!(runtime.attached_count(), 1);
        assert!(runtime.is_attached(thread::current().id()));
    }

    #[test]
    fn test_attach_from_other_thread() {
        let runtime = Arc::new(LocalRuntime::new());
        runtime.attach_current_thread().unwrap();
        let remote = runtime.clone();
        thread::spawn(move || remote.attach_current_thread().unwrap())
            .join()
            .unwrap();
        assert_eq!(runtime.attached_count(), 2);
    }

    #[test]
    fn test_thread_limit() {
        let runtime = Arc::new(LocalRuntime::with_thread_limit(1));
        runtime.attach_current_thread().unwrap();
        let remote = runtime.clone();
        let result = thread::spawn(move || remote.attach_current_thread())
            .join()
            .unwrap();
        assert!(matches!(result, Err(BridgeError::ThreadAttach(_))));
    }

    #[test]
    fn test_fn_caller_exposes_method() {
        let caller = FnCaller::new("Echo", |request: &[i8]| Ok(Some(ByteBuffer::from(request))));
        assert_eq!(caller.class_name(), Some("Echo"));
        let method = caller.callback_method().unwrap();
        let reply = method.invoke(&[-1, 2]).unwrap().unwrap();
        assert_eq!(reply.as_slice(), &[-1, 2]);
    }

    #[test]
    fn test_fault_display() {
        let fault = ManagedFault::new("java.lang.IllegalStateException", "boom");
        assert_eq!(fault.to_string(), "java.lang.IllegalStateException: boom");
    }
}
