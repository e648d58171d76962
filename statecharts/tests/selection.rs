use std::rc::Rc;

use statecharts::{CallbackEvaluator, Event, Interpreter, State, Statechart, Transition};

#[test]
fn eventless_transitions_win_and_consume_nothing() {
    let chart = Rc::new(
        Statechart::builder("eventless priority")
            .root(State::compound("root").initial("a"))
            .child("root", State::atomic("a"))
            .child("root", State::atomic("b"))
            .child("root", State::atomic("c"))
            .transition(Transition::new("a", "b"))
            .transition(Transition::new("a", "c").on_event("x"))
            .build()
            .expect("valid chart"),
    );
    let mut interpreter =
        Interpreter::new(chart, Box::new(CallbackEvaluator::new())).expect("evaluator binds");
    interpreter.execute_once().expect("no violation");
    interpreter.queue("x").expect("external event");

    let step = interpreter
        .execute_once()
        .expect("no violation")
        .expect("the eventless transition is enabled");
    assert!(step.event().is_none(), "no event was consumed");
    assert_eq!(interpreter.configuration(), ["root", "b"]);

    // `x` stayed in the queue; from `b` nothing matches it, so the next
    // step consumes it emptily.
    let step = interpreter
        .execute_once()
        .expect("no violation")
        .expect("x is still due");
    assert_eq!(step.event().map(Event::name), Some("x"));
    assert!(step.transitions().is_empty());
}

#[test]
fn deeper_sources_shadow_their_ancestors() {
    let chart = Rc::new(
        Statechart::builder("inner first")
            .root(State::compound("root").initial("parent"))
            .child("root", State::compound("parent").initial("child"))
            .child("parent", State::atomic("child"))
            .child("root", State::atomic("parent_target"))
            .child("root", State::atomic("child_target"))
            .transition(Transition::new("parent", "parent_target").on_event("e"))
            .transition(Transition::new("child", "child_target").on_event("e"))
            .build()
            .expect("valid chart"),
    );
    let mut interpreter =
        Interpreter::new(chart, Box::new(CallbackEvaluator::new())).expect("evaluator binds");
    interpreter.execute_once().expect("no violation");
    interpreter.queue("e").expect("external event");

    let step = interpreter
        .execute_once()
        .expect("no violation")
        .expect("e is due");
    let transitions = step.transitions();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].source(), "child", "only the inner transition fires");
    assert_eq!(interpreter.configuration(), ["root", "child_target"]);
}

#[test]
fn highest_enabled_priority_class_wins_within_a_source() {
    let chart = Rc::new(
        Statechart::builder("priorities")
            .root(State::compound("root").initial("a"))
            .child("root", State::atomic("a"))
            .child("root", State::atomic("b"))
            .child("root", State::atomic("c"))
            .child("root", State::atomic("d"))
            .transition(
                Transition::new("a", "b")
                    .on_event("e")
                    .with_priority(2)
                    .with_guard("blocked"),
            )
            .transition(Transition::new("a", "c").on_event("e").with_priority(1))
            .transition(Transition::new("a", "d").on_event("e"))
            .build()
            .expect("valid chart"),
    );
    let evaluator = CallbackEvaluator::new().guard("blocked", |_, _| false);
    let mut interpreter =
        Interpreter::new(chart, Box::new(evaluator)).expect("evaluator binds");
    interpreter.execute_once().expect("no violation");
    interpreter.queue("e").expect("external event");

    interpreter.execute_once().expect("no violation");
    assert_eq!(
        interpreter.configuration(),
        ["root", "c"],
        "priority 2 is guarded out, priority 1 beats priority 0"
    );
}

#[test]
fn a_passing_high_priority_guard_hides_lower_classes() {
    let chart = Rc::new(
        Statechart::builder("priorities")
            .root(State::compound("root").initial("a"))
            .child("root", State::atomic("a"))
            .child("root", State::atomic("b"))
            .child("root", State::atomic("c"))
            .transition(
                Transition::new("a", "b")
                    .on_event("e")
                    .with_priority(5)
                    .with_guard("open"),
            )
            .transition(Transition::new("a", "c").on_event("e"))
            .build()
            .expect("valid chart"),
    );
    let evaluator = CallbackEvaluator::new().guard("open", |_, _| true);
    let mut interpreter =
        Interpreter::new(chart, Box::new(evaluator)).expect("evaluator binds");
    interpreter.execute_once().expect("no violation");
    interpreter.queue("e").expect("external event");

    interpreter.execute_once().expect("no violation");
    assert_eq!(interpreter.configuration(), ["root", "b"]);
}

#[test]
fn eventless_guards_never_see_the_pending_event() {
    let chart = Rc::new(
        Statechart::builder("guard exposure")
            .root(State::compound("root").initial("a"))
            .child("root", State::atomic("a"))
            .child("root", State::atomic("b"))
            .child("root", State::atomic("c"))
            .transition(Transition::new("a", "b").with_guard("saw_event"))
            .transition(Transition::new("a", "c").on_event("x").with_guard("saw_event"))
            .build()
            .expect("valid chart"),
    );
    let evaluator = CallbackEvaluator::new().guard("saw_event", |_, event| event.is_some());
    let mut interpreter =
        Interpreter::new(chart, Box::new(evaluator)).expect("evaluator binds");
    interpreter.execute_once().expect("no violation");
    interpreter.queue("x").expect("external event");

    interpreter.execute_once().expect("no violation");
    assert_eq!(
        interpreter.configuration(),
        ["root", "c"],
        "the eventless guard ran without the event and failed; the triggered one saw `x`"
    );
}

#[test]
fn guards_read_the_event_payload() {
    let chart = Rc::new(
        Statechart::builder("payloads")
            .root(State::compound("root").initial("closed"))
            .child("root", State::atomic("closed"))
            .child("root", State::atomic("open"))
            .transition(
                Transition::new("closed", "open")
                    .on_event("badge")
                    .with_guard("clearance"),
            )
            .build()
            .expect("valid chart"),
    );
    let evaluator = CallbackEvaluator::new().guard("clearance", |_, event| {
        event
            .and_then(|e| e.data().get("level"))
            .and_then(|level| level.as_i64())
            .is_some_and(|level| level >= 3)
    });
    let mut interpreter =
        Interpreter::new(chart, Box::new(evaluator)).expect("evaluator binds");
    interpreter.execute_once().expect("no violation");

    interpreter
        .queue(Event::external("badge").with("level", 1))
        .expect("external event");
    interpreter.execute_once().expect("no violation");
    assert_eq!(interpreter.configuration(), ["root", "closed"]);

    interpreter
        .queue(Event::external("badge").with("level", 4))
        .expect("external event");
    interpreter.execute_once().expect("no violation");
    assert_eq!(interpreter.configuration(), ["root", "open"]);
}
