//! End-to-end round trips through the bridge and the scripted engine

use prolog_bridge::engine::{PredicateTable, ScriptedEngine};
use prolog_bridge::frontend::cli::random_bytes;
use prolog_bridge::{identity_caller, Bridge, ByteBuffer, FnCaller, QueryState, Status};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn started() -> (Bridge<ScriptedEngine>, PredicateTable) {
    let engine = ScriptedEngine::new();
    let predicates = engine.predicates();
    let mut bridge = Bridge::with_engine(engine);
    bridge.init_engine("/usr/local/xsb").unwrap();
    (bridge, predicates)
}

#[test]
fn test_thousand_random_bytes_survive_identity_callback() {
    let (mut bridge, predicates) = started();
    predicates.define_relay("echo", "interprolog_callback");

    let request = random_bytes(1000, 42);
    assert!(request.iter().any(|&b| b == i8::MIN || b < -100));
    assert!(request.iter().any(|&b| b > 100));

    let outcome = bridge
        .invoke_query(identity_caller(), &request, 2, "echo")
        .unwrap();
    assert_eq!(outcome.status, Status::SUCCESS);
    assert_eq!(outcome.reply.as_ref(), Some(&request));

    let stats = bridge.stats();
    assert_eq!(stats.callbacks, 1);
    assert_eq!(stats.leases_outstanding, 0);
}

#[test]
fn test_every_byte_value_round_trips() {
    let (mut bridge, predicates) = started();
    predicates.define_relay("echo", "interprolog_callback");

    let request: ByteBuffer = (i8::MIN..=i8::MAX).collect();
    let outcome = bridge
        .invoke_query(identity_caller(), &request, 2, "echo")
        .unwrap();
    assert_eq!(outcome.reply.unwrap(), request);
}

#[test]
fn test_known_vector_seen_by_callback() {
    let (mut bridge, predicates) = started();
    predicates.define_relay("echo", "interprolog_callback");

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let record = seen.clone();
    let caller = FnCaller::shared("Recorder", move |request: &[i8]| {
        record.lock().extend_from_slice(request);
        Ok(Some(ByteBuffer::from(vec![-128i8, 127])))
    });

    let outcome = bridge
        .invoke_query(caller, &[-1, 0, 127, -128], 2, "echo")
        .unwrap();
    assert_eq!(*seen.lock(), vec![-1, 0, 127, -128]);
    assert_eq!(outcome.reply.unwrap().as_slice(), &[-128, 127]);
}

#[test]
fn test_fresh_variables_by_arity() {
    let (mut bridge, predicates) = started();
    let unbound = Arc::new(AtomicUsize::new(0));

    for arity in [2usize, 3] {
        let counter = unbound.clone();
        predicates.define("inspect", arity, move |goal| {
            for n in 2..=goal.arity() {
                let slot = goal.arg(n).unwrap();
                if goal.heap_ref().is_unbound(slot).unwrap() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
            Status::SUCCESS
        });
    }

    bridge.invoke_query(identity_caller(), &[1], 2, "inspect").unwrap();
    assert_eq!(unbound.load(Ordering::SeqCst), 1);
    bridge.invoke_query(identity_caller(), &[1], 3, "inspect").unwrap();
    assert_eq!(unbound.load(Ordering::SeqCst), 3);
}

#[test]
fn test_empty_buffer_is_empty_list() {
    let (mut bridge, predicates) = started();
    predicates.define_relay("echo", "interprolog_callback");

    let outcome = bridge.invoke_query(identity_caller(), &[], 2, "echo").unwrap();
    assert!(outcome.is_success());
    assert!(outcome.reply.unwrap().is_empty());
}

#[test]
fn test_second_callback_consumes_first_reply() {
    let (mut bridge, predicates) = started();
    predicates.define("outer", 2, |goal| {
        let (request, out) = (goal.arg(1).unwrap(), goal.arg(2).unwrap());
        let first = match goal.callback("interprolog_callback", request) {
            Ok(Some(reply)) => reply,
            _ => return Status::FAILURE,
        };
        match goal.callback("interprolog_callback", first) {
            Ok(Some(reply)) if goal.heap().bind_term(out, reply).is_ok() => Status::SUCCESS,
            _ => Status::FAILURE,
        }
    });

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let caller = FnCaller::shared("Incrementer", move |request: &[i8]| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Some(request.iter().map(|b| b.wrapping_add(1)).collect()))
    });

    let outcome = bridge.invoke_query(caller, &[126, -1], 2, "outer").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.reply.unwrap().as_slice(), &[-128, 1]);
    assert_eq!(bridge.state(), QueryState::Completed);
}

#[test]
fn test_interrupt_with_no_query_is_noop() {
    let (mut bridge, predicates) = started();
    predicates.define_relay("echo", "interprolog_callback");

    let interrupter = bridge.interrupter();
    std::thread::spawn(move || interrupter.request()).join().unwrap();

    let outcome = bridge.invoke_query(identity_caller(), &[7], 2, "echo").unwrap();
    assert!(outcome.is_success());
}

#[test]
fn test_callbacks_attach_thread_once() {
    let runtime = Arc::new(prolog_bridge::LocalRuntime::new());
    let engine = ScriptedEngine::new();
    engine.predicates().define_relay("echo", "interprolog_callback");
    let mut bridge = Bridge::new(engine, runtime.clone(), Default::default());
    bridge.init_engine("/usr/local/xsb").unwrap();

    for _ in 0..3 {
        bridge.invoke_query(identity_caller(), &[1, 2, 3], 2, "echo").unwrap();
    }
    assert_eq!(runtime.attached_count(), 1);
}

#[test]
fn test_custom_callback_predicate_name() {
    let mut config = prolog_bridge::BridgeConfig::default();
    config.callback.predicate = "host_call".to_string();

    let engine = ScriptedEngine::new();
    engine.predicates().define_relay("echo", "host_call");
    engine.predicates().define_relay("legacy", "interprolog_callback");
    let mut bridge = Bridge::new(engine, Arc::new(prolog_bridge::LocalRuntime::new()), config);
    bridge.init_engine("/usr/local/xsb").unwrap();

    let outcome = bridge.invoke_query(identity_caller(), &[4], 2, "echo").unwrap();
    assert_eq!(outcome.reply.unwrap().as_slice(), &[4]);
    let outcome = bridge.invoke_query(identity_caller(), &[4], 2, "legacy").unwrap();
    assert_eq!(outcome.status, Status::FAILURE);
}
