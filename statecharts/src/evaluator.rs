//! The seam between the step engine and user code.
//!
//! Guards, actions and contract assertions are stored in the model as plain
//! names; an [`Evaluator`] resolves and runs them. The engine does not care
//! how: an implementation may interpret an embedded scripting language,
//! dispatch to compiled predicates, or look closures up in a registry, as
//! [`CallbackEvaluator`] does.

use std::collections::HashMap;

use serde_json::{Map, Value};

use statecharts_core::{
    ContractLocation, EvaluationError, Event, State, Statechart, Transition,
};

/// The mutable execution context shared by guards, actions and assertions.
pub type Context = Map<String, Value>;

/// The model element whose contract conditions are being evaluated.
#[derive(Debug, Clone, Copy)]
pub enum ContractTarget<'a> {
    State(&'a State),
    Transition(&'a Transition),
}

impl<'a> ContractTarget<'a> {
    pub fn preconditions(&self) -> &'a [String] {
        match self {
            ContractTarget::State(state) => state.preconditions(),
            ContractTarget::Transition(transition) => transition.preconditions(),
        }
    }

    pub fn postconditions(&self) -> &'a [String] {
        match self {
            ContractTarget::State(state) => state.postconditions(),
            ContractTarget::Transition(transition) => transition.postconditions(),
        }
    }

    pub fn invariants(&self) -> &'a [String] {
        match self {
            ContractTarget::State(state) => state.invariants(),
            ContractTarget::Transition(transition) => transition.invariants(),
        }
    }

    /// An owned description of the target, for error payloads.
    pub fn location(&self) -> ContractLocation {
        match self {
            ContractTarget::State(state) => ContractLocation::State(state.name().to_string()),
            ContractTarget::Transition(transition) => {
                ContractLocation::Transition((*transition).clone())
            }
        }
    }
}

/// Collects the events an action wants to raise.
///
/// Actions can only raise internal events (via [`send`](EventSink::send) and
/// friends) and meta events (via [`notify`](EventSink::notify)); the
/// interpreter rejects anything else.
#[derive(Debug, Default)]
pub struct EventSink {
    events: Vec<Event>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise an internal event.
    pub fn send(&mut self, name: &str) {
        self.events.push(Event::internal(name));
    }

    /// Raise an internal event with a payload.
    pub fn send_with(&mut self, name: &str, data: Context) {
        self.events.push(Event::internal(name).with_data(data));
    }

    /// Raise an internal event scheduled `delay` seconds from now.
    pub fn send_delayed(&mut self, name: &str, delay: f64) {
        self.events.push(Event::internal(name).delayed(delay));
    }

    /// Raise a meta event, delivered to bound property statecharts only.
    pub fn notify(&mut self, name: &str, data: Context) {
        self.events.push(Event::meta(name).with_data(data));
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

/// Runs guards, actions and contract assertions on behalf of the engine.
///
/// Every method receives the triggering event only when the caller decided
/// it should be visible: guards of eventless transitions, for instance, are
/// evaluated without one.
pub trait Evaluator {
    /// Called once when an interpreter binds its chart; the place to run the
    /// chart's preamble.
    fn execute_statechart(&mut self, chart: &Statechart) -> Result<(), EvaluationError> {
        let _ = chart;
        Ok(())
    }

    /// Called at the beginning of each macro step, with the event about to
    /// be consumed, if any.
    fn on_step_starts(&mut self, event: Option<&Event>) -> Result<(), EvaluationError> {
        let _ = event;
        Ok(())
    }

    /// Whether the transition's guard holds. Only called when the
    /// transition has a guard.
    fn evaluate_guard(
        &mut self,
        transition: &Transition,
        event: Option<&Event>,
    ) -> Result<bool, EvaluationError>;

    /// Run the transition's action, returning the events it raised. An
    /// actionless transition yields no events.
    fn execute_action(
        &mut self,
        transition: &Transition,
        event: Option<&Event>,
    ) -> Result<Vec<Event>, EvaluationError>;

    /// Run the state's entry action, returning the events it raised.
    fn execute_on_entry(&mut self, state: &State) -> Result<Vec<Event>, EvaluationError>;

    /// Run the state's exit action, returning the events it raised.
    fn execute_on_exit(&mut self, state: &State) -> Result<Vec<Event>, EvaluationError>;

    /// Evaluate the target's preconditions and return the unsatisfied ones.
    fn evaluate_preconditions(
        &mut self,
        target: ContractTarget<'_>,
        event: Option<&Event>,
    ) -> Result<Vec<String>, EvaluationError>;

    /// Evaluate the target's postconditions and return the unsatisfied ones.
    fn evaluate_postconditions(
        &mut self,
        target: ContractTarget<'_>,
        event: Option<&Event>,
    ) -> Result<Vec<String>, EvaluationError>;

    /// Evaluate the target's invariants and return the unsatisfied ones.
    fn evaluate_invariants(
        &mut self,
        target: ContractTarget<'_>,
        event: Option<&Event>,
    ) -> Result<Vec<String>, EvaluationError>;

    /// The execution context, exposed for diagnostics and assertions.
    fn context(&self) -> &Context;
}

type GuardFn = Box<dyn Fn(&Context, Option<&Event>) -> bool>;
type ActionFn = Box<dyn FnMut(&mut Context, Option<&Event>, &mut EventSink)>;

/// An [`Evaluator`] backed by registries of named closures.
///
/// Guards and assertions read the context; actions mutate it and may raise
/// events through the provided [`EventSink`]. Names referenced by the model
/// but never registered surface as [`EvaluationError`]s at run time.
///
/// ```
/// use statecharts::CallbackEvaluator;
///
/// let evaluator = CallbackEvaluator::new()
///     .with_var("attempts", 0)
///     .guard("has_budget", |ctx, _| ctx["attempts"].as_i64().unwrap_or(0) < 3)
///     .action("retry", |ctx, _, sink| {
///         let attempts = ctx["attempts"].as_i64().unwrap_or(0) + 1;
///         ctx.insert("attempts".into(), attempts.into());
///         sink.send("retried");
///     });
/// ```
#[derive(Default)]
pub struct CallbackEvaluator {
    context: Context,
    guards: HashMap<String, GuardFn>,
    actions: HashMap<String, ActionFn>,
    assertions: HashMap<String, GuardFn>,
}

impl CallbackEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Seed a single context variable.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Register a guard predicate.
    pub fn guard(
        mut self,
        name: impl Into<String>,
        guard: impl Fn(&Context, Option<&Event>) -> bool + 'static,
    ) -> Self {
        self.guards.insert(name.into(), Box::new(guard));
        self
    }

    /// Register an action.
    pub fn action(
        mut self,
        name: impl Into<String>,
        action: impl FnMut(&mut Context, Option<&Event>, &mut EventSink) + 'static,
    ) -> Self {
        self.actions.insert(name.into(), Box::new(action));
        self
    }

    /// Register a contract assertion predicate.
    pub fn assertion(
        mut self,
        name: impl Into<String>,
        assertion: impl Fn(&Context, Option<&Event>) -> bool + 'static,
    ) -> Self {
        self.assertions.insert(name.into(), Box::new(assertion));
        self
    }

    fn run_action(
        &mut self,
        name: &str,
        event: Option<&Event>,
    ) -> Result<Vec<Event>, EvaluationError> {
        let action = self
            .actions
            .get_mut(name)
            .ok_or_else(|| EvaluationError::UnknownAction(name.to_string()))?;
        let mut sink = EventSink::new();
        action(&mut self.context, event, &mut sink);
        Ok(sink.into_events())
    }

    fn unsatisfied(
        &self,
        assertions: &[String],
        event: Option<&Event>,
    ) -> Result<Vec<String>, EvaluationError> {
        let mut unsatisfied = Vec::new();
        for name in assertions {
            let assertion = self
                .assertions
                .get(name)
                .ok_or_else(|| EvaluationError::UnknownAssertion(name.clone()))?;
            if !assertion(&self.context, event) {
                unsatisfied.push(name.clone());
            }
        }
        Ok(unsatisfied)
    }
}

impl Evaluator for CallbackEvaluator {
    fn execute_statechart(&mut self, chart: &Statechart) -> Result<(), EvaluationError> {
        if let Some(preamble) = chart.preamble() {
            // The preamble initializes the context; events it raises have no
            // interpreter to land in yet and are dropped.
            self.run_action(preamble, None)?;
        }
        Ok(())
    }

    fn evaluate_guard(
        &mut self,
        transition: &Transition,
        event: Option<&Event>,
    ) -> Result<bool, EvaluationError> {
        match transition.guard() {
            None => Ok(true),
            Some(name) => {
                let guard = self
                    .guards
                    .get(name)
                    .ok_or_else(|| EvaluationError::UnknownGuard(name.to_string()))?;
                Ok(guard(&self.context, event))
            }
        }
    }

    fn execute_action(
        &mut self,
        transition: &Transition,
        event: Option<&Event>,
    ) -> Result<Vec<Event>, EvaluationError> {
        match transition.action() {
            None => Ok(Vec::new()),
            Some(name) => self.run_action(name, event),
        }
    }

    fn execute_on_entry(&mut self, state: &State) -> Result<Vec<Event>, EvaluationError> {
        match state.entry_action() {
            None => Ok(Vec::new()),
            Some(name) => self.run_action(name, None),
        }
    }

    fn execute_on_exit(&mut self, state: &State) -> Result<Vec<Event>, EvaluationError> {
        match state.exit_action() {
            None => Ok(Vec::new()),
            Some(name) => self.run_action(name, None),
        }
    }

    fn evaluate_preconditions(
        &mut self,
        target: ContractTarget<'_>,
        event: Option<&Event>,
    ) -> Result<Vec<String>, EvaluationError> {
        self.unsatisfied(target.preconditions(), event)
    }

    fn evaluate_postconditions(
        &mut self,
        target: ContractTarget<'_>,
        event: Option<&Event>,
    ) -> Result<Vec<String>, EvaluationError> {
        self.unsatisfied(target.postconditions(), event)
    }

    fn evaluate_invariants(
        &mut self,
        target: ContractTarget<'_>,
        event: Option<&Event>,
    ) -> Result<Vec<String>, EvaluationError> {
        self.unsatisfied(target.invariants(), event)
    }

    fn context(&self) -> &Context {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statecharts_core::Transition;

    #[test]
    fn guardless_transitions_always_pass() {
        let mut evaluator = CallbackEvaluator::new();
        let transition = Transition::new("a", "b");
        assert_eq!(evaluator.evaluate_guard(&transition, None), Ok(true));
    }

    #[test]
    fn unknown_guard_is_an_error() {
        let mut evaluator = CallbackEvaluator::new();
        let transition = Transition::new("a", "b").with_guard("missing");
        assert_eq!(
            evaluator.evaluate_guard(&transition, None),
            Err(EvaluationError::UnknownGuard("missing".to_string()))
        );
    }

    #[test]
    fn guards_observe_the_exposed_event() {
        let mut evaluator = CallbackEvaluator::new()
            .guard("saw_event", |_, event| event.is_some());
        let transition = Transition::new("a", "b").with_guard("saw_event");

        assert_eq!(evaluator.evaluate_guard(&transition, None), Ok(false));
        let event = Event::external("go");
        assert_eq!(evaluator.evaluate_guard(&transition, Some(&event)), Ok(true));
    }

    #[test]
    fn actions_mutate_context_and_collect_events() {
        let mut evaluator = CallbackEvaluator::new().with_var("count", 0).action(
            "bump",
            |ctx, _, sink| {
                let count = ctx["count"].as_i64().unwrap() + 1;
                ctx.insert("count".into(), count.into());
                sink.send("bumped");
            },
        );
        let transition = Transition::new("a", "b").with_action("bump");

        let events = evaluator
            .execute_action(&transition, None)
            .expect("action registered");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "bumped");
        assert!(events[0].is_internal());
        assert_eq!(evaluator.context()["count"], 1);
    }

    #[test]
    fn unsatisfied_assertions_are_reported_by_name() {
        let mut evaluator = CallbackEvaluator::new()
            .assertion("always", |_, _| true)
            .assertion("never", |_, _| false);
        let state = State::atomic("s")
            .with_precondition("always")
            .with_precondition("never");

        let unsatisfied = evaluator
            .evaluate_preconditions(ContractTarget::State(&state), None)
            .expect("assertions registered");
        assert_eq!(unsatisfied, ["never"]);
    }
}
