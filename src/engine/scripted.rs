//! In-process scripted engine
//!
//! Predicates are Rust closures keyed by `name/arity`. A predicate sees its
//! arguments in working memory and may call foreign built-ins, which is how
//! a goal re-enters the bridge mid-query. Used by the test suite, the
//! benches and the CLI in place of a real embedded Prolog.

use super::{Engine, Foreign, Frame, Heap, InterruptFlag, Status, TermRef};
use crate::errors::HeapError;
use crate::frontend::EngineConfig;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

pub type Predicate = Arc<dyn Fn(&mut Goal<'_>) -> Status + Send + Sync>;

/// Shared predicate registry
///
/// Cloning yields another handle on the same table, so predicates can be
/// defined after the engine has been moved into a bridge.
#[derive(Clone, Default)]
pub struct PredicateTable {
    inner: Arc<RwLock<HashMap<(String, usize), Predicate>>>,
}

impl PredicateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define<F>(&self, name: &str, arity: usize, predicate: F)
    where
        F: Fn(&mut Goal<'_>) -> Status + Send + Sync + 'static,
    {
        self.inner
            .write()
            .insert((name.to_string(), arity), Arc::new(predicate));
    }

    /// Define `name/2`: send argument 1 through `callback/3`, unify the
    /// reply with argument 2
    pub fn define_relay(&self, name: &str, callback: &str) {
        let callback = callback.to_string();
        self.define(name, 2, move |goal| {
            let (Some(request), Some(out)) = (goal.arg(1), goal.arg(2)) else {
                return Status::FAILURE;
            };
            match goal.callback(&callback, request) {
                Ok(Some(reply)) => match goal.heap().bind_term(out, reply) {
                    Ok(()) => Status::SUCCESS,
                    Err(_) => Status::FAILURE,
                },
                Ok(None) => Status::FAILURE,
                Err(err) => goal.error(err.to_string()),
            }
        });
    }

    pub fn lookup(&self, name: &str, arity: usize) -> Option<Predicate> {
        self.inner.read().get(&(name.to_string(), arity)).cloned()
    }

    pub fn is_defined(&self, name: &str, arity: usize) -> bool {
        self.inner.read().contains_key(&(name.to_string(), arity))
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Execution context of one predicate call
pub struct Goal<'a> {
    heap: &'a mut Heap,
    args: SmallVec<[TermRef; 4]>,
    command: Option<&'a str>,
    foreign: &'a mut dyn Foreign,
    interrupt: &'a InterruptFlag,
    error: Option<String>,
}

impl<'a> Goal<'a> {
    pub fn heap(&mut self) -> &mut Heap {
        &mut *self.heap
    }

    pub fn heap_ref(&self) -> &Heap {
        &*self.heap
    }

    /// Argument `n`, 1-based
    pub fn arg(&self, n: usize) -> Option<TermRef> {
        n.checked_sub(1).and_then(|i| self.args.get(i)).copied()
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Raw text when the goal came from a command string
    pub fn command(&self) -> Option<&str> {
        self.command
    }

    /// Call a foreign built-in with the given argument registers
    pub fn call_foreign(&mut self, name: &str, args: &[TermRef]) -> bool {
        trace!(predicate = name, args = args.len(), "calling foreign predicate");
        let mut frame = Frame::new(&mut *self.heap, args);
        self.foreign.call(name, &mut frame)
    }

    /// Send `request` through the three-argument callback built-in
    ///
    /// Builds `predicate(Length, Request, Reply)` registers and returns the
    /// bound reply when the built-in succeeds.
    pub fn callback(
        &mut self,
        predicate: &str,
        request: TermRef,
    ) -> Result<Option<TermRef>, HeapError> {
        let Some(len) = self.list_len(request) else {
            return Ok(None);
        };
        let length = self.heap.new_var()?;
        self.heap.bind_int(length, len as i64)?;
        let reply = self.heap.new_var()?;
        if self.call_foreign(predicate, &[length, request, reply]) {
            Ok(Some(reply))
        } else {
            Ok(None)
        }
    }

    /// Interrupt check point; consumes a pending request
    pub fn interrupted(&self) -> bool {
        self.interrupt.take()
    }

    /// Record an engine error message and return the error status
    pub fn error(&mut self, message: impl Into<String>) -> Status {
        self.error = Some(message.into());
        Status::ERROR
    }

    /// Number of elements in a proper list, `None` for anything else
    pub fn list_len(&self, list: TermRef) -> Option<usize> {
        let mut count = 0;
        for item in self.heap.list_iter(list) {
            item.ok()?;
            count += 1;
        }
        Some(count)
    }
}

pub struct ScriptedEngine {
    heap: Heap,
    predicates: PredicateTable,
    interrupt: InterruptFlag,
    argv: Option<Vec<String>>,
    last_error: Option<String>,
    query_open: bool,
}

impl ScriptedEngine {
    pub const DEFAULT_INITIAL_CELLS: usize = 4096;
    pub const DEFAULT_MAX_CELLS: usize = 1 << 22;

    pub fn new() -> Self {
        Self::with_heap(Self::DEFAULT_INITIAL_CELLS, Self::DEFAULT_MAX_CELLS)
    }

    pub fn with_heap(initial_cells: usize, max_cells: usize) -> Self {
        let predicates = PredicateTable::new();
        predicates.define("true", 0, |_| Status::SUCCESS);
        predicates.define("fail", 0, |_| Status::FAILURE);

        Self {
            heap: Heap::new(initial_cells, max_cells),
            predicates,
            interrupt: InterruptFlag::new(),
            argv: None,
            last_error: None,
            query_open: false,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_heap(config.initial_heap_cells, config.max_heap_cells)
    }

    pub fn predicates(&self) -> PredicateTable {
        self.predicates.clone()
    }

    /// Argument vector of the last successful `init`
    pub fn argv(&self) -> Option<&[String]> {
        self.argv.as_deref()
    }

    pub fn is_initialized(&self) -> bool {
        self.argv.is_some()
    }

    pub fn is_query_open(&self) -> bool {
        self.query_open
    }

    fn run(
        &mut self,
        goal: TermRef,
        command: Option<&str>,
        foreign: &mut dyn Foreign,
    ) -> Status {
        self.last_error = None;
        if self.argv.is_none() {
            self.last_error = Some("engine not initialized".to_string());
            return Status::ERROR;
        }

        let (name, args) = match self.heap.get(goal) {
            Ok(super::Cell::Struct { name, args }) => (name.clone(), args.clone()),
            Ok(_) => {
                self.last_error = Some("goal is not callable".to_string());
                return Status::ERROR;
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                return Status::ERROR;
            }
        };

        let Some(predicate) = self.predicates.lookup(&name, args.len()) else {
            self.last_error = Some(format!("Undefined predicate {}/{}", name, args.len()));
            return Status::ERROR;
        };

        self.query_open = true;
        if self.interrupt.take() {
            debug!(goal = %name, "interrupted before execution");
            return Status::FAILURE;
        }

        let mut ctx = Goal {
            heap: &mut self.heap,
            args,
            command,
            foreign,
            interrupt: &self.interrupt,
            error: None,
        };
        let status = predicate(&mut ctx);
        self.last_error = ctx.error.take();
        status
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for ScriptedEngine {
    fn init(&mut self, argv: &[String]) -> Status {
        if argv.is_empty() {
            self.last_error = Some("missing engine path".to_string());
            return Status::ERROR;
        }
        debug!(argv = ?argv, "scripted engine starting");
        self.argv = Some(argv.to_vec());
        Status::SUCCESS
    }

    fn close(&mut self) -> Status {
        if self.argv.take().is_none() {
            self.last_error = Some("engine not initialized".to_string());
            return Status::ERROR;
        }
        self.heap.clear();
        self.query_open = false;
        Status::SUCCESS
    }

    fn heap(&mut self) -> &mut Heap {
        &mut self.heap
    }

    fn query(&mut self, goal: TermRef, foreign: &mut dyn Foreign) -> Status {
        self.run(goal, None, foreign)
    }

    fn command_string(&mut self, command: &str, foreign: &mut dyn Foreign) -> Status {
        let text = command.trim();
        let text = text.strip_suffix('.').unwrap_or(text);
        let name = text.split('(').next().unwrap_or("").trim();
        if name.is_empty() {
            self.last_error = Some(format!("syntax error in command {:?}", command));
            return Status::ERROR;
        }

        let goal = match self
            .heap
            .new_var()
            .and_then(|goal| self.heap.bind_functor(goal, name, 0).map(|_| goal))
        {
            Ok(goal) => goal,
            Err(err) => {
                self.last_error = Some(err.to_string());
                return Status::OVERFLOW;
            }
        };
        self.run(goal, Some(text), foreign)
    }

    fn close_query(&mut self) -> Status {
        self.query_open = false;
        self.heap.clear();
        Status::SUCCESS
    }

    fn error_message(&self) -> Option<String> {
        self.last_error.clone()
    }

    fn interrupt_flag(&self) -> InterruptFlag {
        self.interrupt.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NoForeign;

    fn started() -> ScriptedEngine {
        let mut engine = ScriptedEngine::new();
        assert!(engine.init(&["/opt/xsb".to_string()]).is_success());
        engine
    }

    fn goal(engine: &mut ScriptedEngine, name: &str, arity: usize) -> TermRef {
        let heap = engine.heap();
        let goal = heap.new_var().unwrap();
        heap.bind_functor(goal, name, arity).unwrap();
        goal
    }

    #[test]
    fn test_query_requires_init() {
        let mut engine = ScriptedEngine::new();
        let g = goal(&mut engine, "true", 0);
        assert_eq!(engine.query(g, &mut NoForeign), Status::ERROR);
        assert_eq!(engine.error_message().as_deref(), Some("engine not initialized"));
    }

    #[test]
    fn test_undefined_predicate_is_error() {
        let mut engine = started();
        let g = goal(&mut engine, "nope", 2);
        assert_eq!(engine.query(g, &mut NoForeign), Status::ERROR);
        assert_eq!(
            engine.error_message().as_deref(),
            Some("Undefined predicate nope/2")
        );
    }

    #[test]
    fn test_predicate_binds_argument() {
        let mut engine = started();
        engine.predicates().define("answer", 1, |goal| {
            let out = goal.arg(1).unwrap();
            match goal.heap().bind_int(out, 42) {
                Ok(()) => Status::SUCCESS,
                Err(err) => goal.error(err.to_string()),
            }
        });
        let g = goal(&mut engine, "answer", 1);
        assert!(engine.query(g, &mut NoForeign).is_success());
        let arg = engine.heap().arg(g, 1).unwrap().unwrap();
        assert_eq!(engine.heap().int_value(arg).unwrap(), Some(42));
    }

    #[test]
    fn test_command_string_strips_period() {
        let mut engine = started();
        engine.predicates().define("hello", 0, |goal| {
            if goal.command() == Some("hello(world)") {
                Status::SUCCESS
            } else {
                Status::FAILURE
            }
        });
        assert!(engine.command_string("hello(world).", &mut NoForeign).is_success());
        assert!(engine.command_string("fail.", &mut NoForeign).is_failure());
        assert_eq!(engine.command_string("  .", &mut NoForeign), Status::ERROR);
    }

    #[test]
    fn test_close_query_releases_memory() {
        let mut engine = started();
        let g = goal(&mut engine, "true", 0);
        assert!(engine.query(g, &mut NoForeign).is_success());
        assert!(engine.is_query_open());
        engine.close_query();
        assert!(!engine.is_query_open());
        assert!(engine.heap().is_empty());
    }

    #[test]
    fn test_close_without_init_is_error() {
        let mut engine = ScriptedEngine::new();
        assert_eq!(engine.close(), Status::ERROR);
        let mut engine = started();
        assert!(engine.close().is_success());
        assert!(!engine.is_initialized());
    }
    struct Echo;

    impl Foreign for Echo {
        fn call(&mut self, name: &str, frame: &mut Frame<'_>) -> bool {
            let (Some(request), Some(reply)) = (frame.arg(2), frame.arg(3)) else {
                return false;
            };
            name == "interprolog_callback" && frame.heap.bind_term(reply, request).is_ok()
        }
    }

    #[test]
    fn test_goal_callback_builds_registers() {
        let mut engine = started();
        engine.predicates().define_relay("relay", "interprolog_callback");

        let g = goal(&mut engine, "relay", 2);
        let request = engine.heap().arg(g, 1).unwrap().unwrap();
        engine.heap().bind_nil(request).unwrap();
        assert!(engine.query(g, &mut Echo).is_success());
        let out = engine.heap().arg(g, 2).unwrap().unwrap();
        assert!(engine.heap().is_nil(out).unwrap());

        engine.close_query();
        let g = goal(&mut engine, "relay", 2);
        assert!(engine.query(g, &mut NoForeign).is_failure());
    }
}
