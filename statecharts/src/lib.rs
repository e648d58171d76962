//! A discrete-time interpreter for hierarchical statecharts.
//!
//! The execution semantics are close to SCXML: eventless transitions take
//! priority, transitions are resolved inner-first relative to their source
//! states, and each macro step runs to completion (exit set, transition
//! action, entry set, then stabilization to a fixed point) under a single
//! time snapshot.
//!
//! The model is built once through [`StatechartBuilder`] and stays
//! read-only; an [`Interpreter`] drives it with externally queued events,
//! running guards, actions and design-by-contract assertions through an
//! [`Evaluator`]. Property statecharts can be bound as runtime monitors: a
//! monitor reaching a final configuration fails the execution with a
//! [`PropertyViolation`].
//!
//! ```
//! use std::rc::Rc;
//! use statecharts::{CallbackEvaluator, Interpreter, State, Statechart, Transition};
//!
//! let chart = Statechart::builder("light switch")
//!     .root(State::compound("root").initial("off"))
//!     .child("root", State::atomic("off"))
//!     .child("root", State::atomic("on"))
//!     .transition(Transition::new("off", "on").on_event("press"))
//!     .transition(Transition::new("on", "off").on_event("press"))
//!     .build()
//!     .expect("valid chart");
//!
//! let mut interpreter =
//!     Interpreter::new(Rc::new(chart), Box::new(CallbackEvaluator::new())).expect("bound");
//! interpreter.queue("press").expect("external event");
//!
//! let steps = interpreter.execute(None).expect("no violation");
//! assert_eq!(steps.len(), 2); // the initial step, then `press`
//! assert_eq!(interpreter.configuration(), ["root", "on"]);
//! ```

pub mod core {
    pub use statecharts_core::*;
}

pub use statecharts_core::{
    AnyStep, ChartError, ContractError, ContractKind, ContractLocation, EvaluationError, Event,
    EventKind, ExecutionError, MacroStep, MicroStep, PropertyViolation, State, StateKind,
    Statechart, StatechartBuilder, Transition,
};

mod clock;
mod evaluator;
mod interpreter;
mod queue;

pub use clock::{Clock, MonotonicClock, SimulatedClock, SynchronizedClock};
pub use evaluator::{CallbackEvaluator, Context, ContractTarget, Evaluator, EventSink};
pub use interpreter::Interpreter;
pub use queue::EventQueue;
