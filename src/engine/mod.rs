//! Embedded engine interface
//!
//! The bridge never talks to a concrete Prolog system directly. It drives an
//! [`Engine`]: something that owns working memory, runs goals, and calls
//! back into the host through [`Foreign`] whenever a goal reaches a foreign
//! built-in predicate.
//!
//! Architecture:
//! - `heap.rs` - working memory (cells, capacity checks, list traversal)
//! - `scripted.rs` - in-process engine whose predicates are Rust closures

mod heap;
mod scripted;

pub use heap::{Cell, Heap, ListIter, TermRef};
pub use scripted::{Goal, PredicateTable, ScriptedEngine};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Raw engine status code
///
/// Codes other than the four named ones are carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const SUCCESS: Status = Status(0);
    pub const FAILURE: Status = Status(1);
    pub const ERROR: Status = Status(2);
    pub const OVERFLOW: Status = Status(3);

    #[inline]
    pub fn code(self) -> i32 {
        self.0
    }

    #[inline]
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    #[inline]
    pub fn is_failure(self) -> bool {
        self == Self::FAILURE
    }

    /// Error or overflow; anything that warrants fetching the engine message
    #[inline]
    pub fn is_error(self) -> bool {
        !self.is_success() && !self.is_failure()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SUCCESS => write!(f, "success"),
            Self::FAILURE => write!(f, "failure"),
            Self::ERROR => write!(f, "error"),
            Self::OVERFLOW => write!(f, "overflow"),
            Status(code) => write!(f, "status {}", code),
        }
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> i32 {
        status.0
    }
}

/// Cooperative interrupt flag shared between the engine and other threads
///
/// Requests made while no query is active are dropped.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    inner: Arc<InterruptState>,
}

#[derive(Debug, Default)]
struct InterruptState {
    requested: AtomicBool,
    active: AtomicBool,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a user interrupt; returns without waiting
    pub fn request(&self) {
        if self.inner.active.load(Ordering::Acquire) {
            self.inner.requested.store(true, Ordering::Release);
        }
    }

    /// Poll and clear a pending request (engine check point)
    pub fn take(&self) -> bool {
        self.inner.requested.swap(false, Ordering::AcqRel)
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Mark the start or end of query execution
    pub fn set_active(&self, active: bool) {
        self.inner.active.store(active, Ordering::Release);
        if !active {
            self.inner.requested.store(false, Ordering::Release);
        }
    }
}

/// Argument registers handed to a foreign predicate
pub struct Frame<'a> {
    pub heap: &'a mut Heap,
    args: &'a [TermRef],
}

impl<'a> Frame<'a> {
    pub fn new(heap: &'a mut Heap, args: &'a [TermRef]) -> Self {
        Self { heap, args }
    }

    /// Register `n`, 1-based
    #[inline]
    pub fn arg(&self, n: usize) -> Option<TermRef> {
        n.checked_sub(1).and_then(|i| self.args.get(i)).copied()
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// Host side of foreign predicate calls
pub trait Foreign {
    /// Run foreign predicate `name`; `false` is ordinary predicate failure
    fn call(&mut self, name: &str, frame: &mut Frame<'_>) -> bool;
}

/// Host that defines no foreign predicates
pub struct NoForeign;

impl Foreign for NoForeign {
    fn call(&mut self, _name: &str, _frame: &mut Frame<'_>) -> bool {
        false
    }
}

/// Embedded logic engine as seen from the boundary
pub trait Engine {
    /// Start the engine with a full argument vector (`argv[0]` is the path)
    fn init(&mut self, argv: &[String]) -> Status;

    /// Stop the engine
    fn close(&mut self) -> Status;

    fn heap(&mut self) -> &mut Heap;

    /// Run `goal` (built in working memory) to its first answer
    fn query(&mut self, goal: TermRef, foreign: &mut dyn Foreign) -> Status;

    /// Parse and run a command string
    fn command_string(&mut self, command: &str, foreign: &mut dyn Foreign) -> Status;

    /// Release the open query and its working memory
    fn close_query(&mut self) -> Status;

    /// Diagnostic message for the last error status
    fn error_message(&self) -> Option<String>;

    fn interrupt_flag(&self) -> InterruptFlag;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(Status::SUCCESS.is_success());
        assert!(Status::FAILURE.is_failure());
        assert!(Status::ERROR.is_error());
        assert!(Status::OVERFLOW.is_error());
        assert!(Status(42).is_error());
        assert_eq!(Status(42).to_string(), "status 42");
        assert_eq!(i32::from(Status::ERROR), 2);
    }

    #[test]
    fn test_interrupt_ignored_when_idle() {
        let flag = InterruptFlag::new();
        flag.request();
        assert!(!flag.is_requested());

        flag.set_active(true);
        flag.request();
        assert!(flag.take());
        assert!(!flag.take());
    }

    #[test]
    fn test_interrupt_cleared_at_query_end() {
        let flag = InterruptFlag::new();
        flag.set_active(true);
        flag.clone().request();
        flag.set_active(false);
        assert!(!flag.is_requested());
    }

    #[test]
    fn test_frame_registers_are_one_based() {
        let mut heap = Heap::new(4, 4);
        let a = heap.new_var().unwrap();
        let b = heap.new_var().unwrap();
        let args = [a, b];
        let frame = Frame::new(&mut heap, &args);
        assert_eq!(frame.arg(1), Some(a));
        assert_eq!(frame.arg(2), Some(b));
        assert_eq!(frame.arg(0), None);
        assert_eq!(frame.arg(3), None);
        assert_eq!(frame.arity(), 2);
    }
}
