use std::rc::Rc;

use statecharts::{CallbackEvaluator, Interpreter, State, Statechart, Transition};

/// A compound `workflow` with a shallow history, reachable from `outside`.
fn shallow_chart() -> Rc<Statechart> {
    Rc::new(
        Statechart::builder("shallow history")
            .root(State::compound("root").initial("outside"))
            .child("root", State::atomic("outside"))
            .child("root", State::compound("workflow").initial("a"))
            .child("workflow", State::atomic("a"))
            .child("workflow", State::atomic("b"))
            .child("workflow", State::shallow_history("h").default_memory("a"))
            .transition(Transition::new("outside", "workflow").on_event("enter"))
            .transition(Transition::new("a", "b").on_event("advance"))
            .transition(Transition::new("workflow", "outside").on_event("leave"))
            .transition(Transition::new("outside", "h").on_event("resume"))
            .build()
            .expect("valid chart"),
    )
}

fn interpreter(chart: Rc<Statechart>) -> Interpreter {
    Interpreter::new(chart, Box::new(CallbackEvaluator::new())).expect("evaluator binds")
}

#[test]
fn shallow_history_reenters_the_last_active_child() {
    let mut interpreter = interpreter(shallow_chart());
    interpreter.execute_once().expect("no violation");

    for event in ["enter", "advance", "leave"] {
        interpreter.queue(event).expect("external event");
    }
    interpreter.execute(None).expect("no violation");
    assert_eq!(interpreter.configuration(), ["root", "outside"]);

    interpreter.queue("resume").expect("external event");
    interpreter.execute(None).expect("no violation");
    assert_eq!(
        interpreter.configuration(),
        ["root", "workflow", "b"],
        "history restored `b`, not the initial child `a`"
    );
}

#[test]
fn shallow_history_defaults_before_any_exit() {
    let mut interpreter = interpreter(shallow_chart());
    interpreter.execute_once().expect("no violation");

    // `workflow` was never exited, so the history falls back to its
    // declared default memory.
    interpreter.queue("resume").expect("external event");
    interpreter.execute(None).expect("no violation");
    assert_eq!(interpreter.configuration(), ["root", "workflow", "a"]);
}

#[test]
fn history_pseudostates_never_stay_active() {
    let mut interpreter = interpreter(shallow_chart());
    interpreter.queue("resume").expect("external event");
    let steps = interpreter.execute(None).expect("no violation");

    assert!(
        !interpreter.configuration().iter().any(|name| name == "h"),
        "the history pseudostate is a transient stabilization target"
    );
    // It was entered and exited within the same macro step.
    let resume_step = steps.last().expect("resume produced a step");
    assert!(resume_step.entered_states().contains(&"h"));
    assert!(resume_step.exited_states().contains(&"h"));
}

#[test]
fn deep_history_restores_the_whole_descendant_set() {
    let chart = Rc::new(
        Statechart::builder("deep history")
            .root(State::compound("root").initial("outside"))
            .child("root", State::atomic("outside"))
            .child("root", State::compound("workflow").initial("stage"))
            .child("workflow", State::compound("stage").initial("x"))
            .child("stage", State::atomic("x"))
            .child("stage", State::atomic("y"))
            .child("workflow", State::deep_history("h"))
            .transition(Transition::new("outside", "workflow").on_event("enter"))
            .transition(Transition::new("x", "y").on_event("advance"))
            .transition(Transition::new("workflow", "outside").on_event("leave"))
            .transition(Transition::new("outside", "h").on_event("resume"))
            .build()
            .expect("valid chart"),
    );
    let mut interpreter = interpreter(chart);
    interpreter.execute_once().expect("no violation");

    for event in ["enter", "advance", "leave", "resume"] {
        interpreter.queue(event).expect("external event");
    }
    interpreter.execute(None).expect("no violation");
    assert_eq!(
        interpreter.configuration(),
        ["root", "workflow", "stage", "y"],
        "deep history restored the nested leaf, not the initial descent"
    );
}

#[test]
fn history_memory_is_rewritten_on_every_exit() {
    let mut interpreter = interpreter(shallow_chart());
    interpreter.execute_once().expect("no violation");

    // First visit ends in `b`.
    for event in ["enter", "advance", "leave", "resume"] {
        interpreter.queue(event).expect("external event");
    }
    interpreter.execute(None).expect("no violation");
    assert_eq!(interpreter.configuration(), ["root", "workflow", "b"]);

    // Second visit leaves while in `b`; nothing moved, so the memory is
    // written again with the same child.
    interpreter.queue("leave").expect("external event");
    interpreter.queue("resume").expect("external event");
    interpreter.execute(None).expect("no violation");
    assert_eq!(interpreter.configuration(), ["root", "workflow", "b"]);
}
