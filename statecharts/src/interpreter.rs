//! The discrete-time step engine.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::{debug, trace};

use statecharts_core::{
    AnyStep, ContractError, ContractKind, Event, EventKind, ExecutionError, MacroStep, MicroStep,
    PropertyViolation, StateKind, Statechart, Transition,
};

use crate::clock::{Clock, SimulatedClock, SynchronizedClock};
use crate::evaluator::{Context, ContractTarget, Evaluator};
use crate::queue::EventQueue;

type Listener = Box<dyn FnMut(&Event)>;

/// A discrete interpreter executing one statechart, with semantics close to
/// SCXML: eventless transitions first, inner-first/source-state resolution.
///
/// The interpreter owns its configuration, history memory, event queue and
/// evaluator; the chart itself is read-only and may be shared. Execution is
/// strictly single-threaded: a macro step is atomic from the caller's
/// perspective, and when it fails mid-way the side effects already applied
/// are kept (no rollback).
pub struct Interpreter {
    chart: Rc<Statechart>,
    evaluator: Box<dyn Evaluator>,
    clock: Rc<dyn Clock>,
    ignore_contract: bool,
    initialized: bool,
    /// Time snapshot of the latest macro step, shared with the
    /// `SynchronizedClock`s of bound property statecharts.
    step_time: Rc<Cell<f64>>,
    configuration: HashSet<String>,
    /// Per-history-state record of the states to re-enter.
    memory: HashMap<String, Vec<String>>,
    events: EventQueue,
    listeners: Vec<Listener>,
    properties: Vec<Interpreter>,
}

impl Interpreter {
    /// Bind a chart and an evaluator. Runs the evaluator's chart setup (the
    /// preamble); the first call to [`execute_once`](Self::execute_once)
    /// performs the initial step.
    ///
    /// The interpreter starts on a [`SimulatedClock`] at time 0; see
    /// [`with_clock`](Self::with_clock).
    pub fn new(
        chart: Rc<Statechart>,
        mut evaluator: Box<dyn Evaluator>,
    ) -> Result<Self, ExecutionError> {
        evaluator.execute_statechart(&chart)?;
        let clock: Rc<dyn Clock> = Rc::new(SimulatedClock::new());
        let step_time = Rc::new(Cell::new(clock.time()));
        Ok(Self {
            chart,
            evaluator,
            clock,
            ignore_contract: false,
            initialized: false,
            step_time,
            configuration: HashSet::new(),
            memory: HashMap::new(),
            events: EventQueue::new(),
            listeners: Vec::new(),
            properties: Vec::new(),
        })
    }

    /// Replace the clock driving this interpreter.
    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.step_time.set(clock.time());
        self.clock = clock;
        self
    }

    /// Skip every contract evaluation during execution.
    pub fn ignoring_contracts(mut self) -> Self {
        self.ignore_contract = true;
        self
    }

    /// The chart this interpreter executes.
    pub fn chart(&self) -> &Statechart {
        &self.chart
    }

    /// Time of the latest macro step.
    pub fn time(&self) -> f64 {
        self.step_time.get()
    }

    /// Active state names, ordered by depth then name.
    pub fn configuration(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configuration.iter().cloned().collect();
        names.sort_by(|a, b| {
            self.chart
                .depth_of(a)
                .cmp(&self.chart.depth_of(b))
                .then_with(|| a.cmp(b))
        });
        names
    }

    /// The evaluator's execution context.
    pub fn context(&self) -> &Context {
        self.evaluator.context()
    }

    /// True once the interpreter has been initialized and has emptied its
    /// configuration, i.e. a final state of the root was reached.
    pub fn is_final(&self) -> bool {
        self.initialized && self.configuration.is_empty()
    }

    /// Queue an external event.
    ///
    /// Internal events cannot be queued from the outside, and a delayed
    /// event (scheduled at the clock's current time plus its delay) must not
    /// have a negative delay.
    pub fn queue(&mut self, event: impl Into<Event>) -> Result<(), ExecutionError> {
        let event = event.into();
        if event.kind() == EventKind::Internal {
            return Err(ExecutionError::InvalidInternalEvent { event });
        }
        if let Some(delay) = event.delay() {
            if delay < 0.0 {
                return Err(ExecutionError::InvalidDelay { event, delay });
            }
        }
        self.events.push(self.clock.time(), event);
        Ok(())
    }

    /// Register a listener receiving every event this chart emits. Events
    /// raised internally are forwarded as external events with the same name
    /// and payload (delayed ones keep their delay), which makes coupling two
    /// charts a one-liner.
    pub fn bind(&mut self, listener: impl FnMut(&Event) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Bind a property statechart used as a runtime monitor.
    ///
    /// The monitor's clock is replaced by one slaved to this interpreter's
    /// step time. It receives every lifecycle meta-event; as soon as it
    /// reaches a final configuration, execution fails with
    /// [`PropertyViolation`].
    pub fn bind_property(&mut self, monitor: Interpreter) {
        let monitor = monitor.with_clock(Rc::new(SynchronizedClock::new(Rc::clone(
            &self.step_time,
        ))));
        self.properties.push(monitor);
    }

    /// Repeatedly call [`execute_once`](Self::execute_once) until nothing is
    /// due, or `max_steps` macro steps were executed.
    pub fn execute(&mut self, max_steps: Option<usize>) -> Result<Vec<MacroStep>, ExecutionError> {
        let mut steps = Vec::new();
        while max_steps.is_none_or(|max| steps.len() < max) {
            match self.execute_once()? {
                Some(step) => steps.push(step),
                None => break,
            }
        }
        Ok(steps)
    }

    /// Run one macro step: select transitions based on the queued events,
    /// process them atomically (exit set, action, entry set, stabilization)
    /// and check invariants and properties.
    ///
    /// Returns `None` when nothing is due. On error, effects already applied
    /// during the failing step remain visible.
    pub fn execute_once(&mut self) -> Result<Option<MacroStep>, ExecutionError> {
        // One time snapshot for the whole macro step.
        self.step_time.set(self.clock.time());

        let Some(computed_steps) = self.compute_steps()? else {
            self.check_properties(None)?;
            return Ok(None);
        };

        self.notify_properties("step started", Map::new())?;

        // Consume the event that triggered the step, if any.
        let event = if computed_steps[0].event.is_some() {
            let event = self
                .pop_due_event()
                .expect("a due event was peeked while computing steps");
            debug!(event = %event, "event consumed");
            self.notify_properties("event consumed", attribute("event", &event))?;
            Some(event)
        } else {
            None
        };

        self.evaluator.on_step_starts(event.as_ref())?;

        let mut executed_steps = Vec::new();
        for step in computed_steps {
            executed_steps.push(self.apply_step(step)?);
            executed_steps.extend(self.stabilize()?);
        }
        let macro_step = MacroStep {
            time: self.step_time.get(),
            steps: executed_steps,
        };

        // State invariants hold at the end of every macro step, checked in
        // depth order.
        let chart = Rc::clone(&self.chart);
        let step_record = AnyStep::Macro(macro_step.clone());
        for name in self.configuration() {
            let state = chart.state(&name).expect("active state exists in chart");
            self.check_contracts(
                ContractTarget::State(state),
                ContractKind::Invariant,
                Some(&step_record),
            )?;
        }

        self.notify_properties("step ended", Map::new())?;
        self.check_properties(Some(&macro_step))?;

        Ok(Some(macro_step))
    }

    /// The next due event, left in place.
    fn peek_due_event(&self) -> Option<Event> {
        match self.events.first() {
            Some((at, event)) if at <= self.step_time.get() => Some(event.clone()),
            _ => None,
        }
    }

    /// The next due event, consumed.
    fn pop_due_event(&mut self) -> Option<Event> {
        let due = matches!(self.events.first(), Some((at, _)) if at <= self.step_time.get());
        if due {
            self.events.pop().map(|(_, event)| event)
        } else {
            None
        }
    }

    /// Compute the micro steps the next macro step would apply, or `None`
    /// when there is neither a due event nor an enabled eventless
    /// transition.
    fn compute_steps(&mut self) -> Result<Option<Vec<MicroStep>>, ExecutionError> {
        if !self.initialized {
            self.initialized = true;
            return Ok(Some(vec![MicroStep {
                entered_states: vec![self.chart.root().to_string()],
                ..Default::default()
            }]));
        }

        let event = self.peek_due_event();
        let transitions = self.select_transitions(event.as_ref())?;

        if transitions.is_empty() {
            // An event with no matching transition still has to be consumed:
            // yield an empty step carrying only the event.
            return Ok(event.map(|event| {
                vec![MicroStep {
                    event: Some(event),
                    ..Default::default()
                }]
            }));
        }

        let transitions = self.sort_transitions(transitions)?;

        // Eventless steps consume nothing.
        let event = if transitions[0].event().is_none() {
            None
        } else {
            event
        };

        Ok(Some(self.create_steps(event, &transitions)))
    }

    /// Select the transitions triggered by `event` (or eventless ones) from
    /// the active configuration, under eventless-first and
    /// inner-first/source-state semantics.
    fn select_transitions(
        &mut self,
        event: Option<&Event>,
    ) -> Result<Vec<Transition>, ExecutionError> {
        let chart = Rc::clone(&self.chart);
        let event_name = event.map(Event::name);

        let candidates: Vec<&Transition> = chart
            .transitions()
            .iter()
            .filter(|t| self.configuration.contains(t.source()))
            .filter(|t| t.event().is_none() || t.event() == event_name)
            .collect();

        let mut selected: Vec<Transition> = Vec::new();
        let mut shadowed: HashSet<&str> = HashSet::new();

        // Eventless transitions take priority: when any is selected, the
        // event-triggered group is discarded entirely.
        for eventless in [true, false] {
            if !selected.is_empty() {
                break;
            }
            // The event is only exposed to guards of event-triggered
            // transitions.
            let exposed_event = if eventless { None } else { event };

            let mut group: Vec<&Transition> = candidates
                .iter()
                .copied()
                .filter(|t| t.event().is_none() == eventless)
                .collect();
            // Deepest sources first; within a source, highest priority
            // first. The sort is stable, so insertion order breaks any
            // remaining tie.
            group.sort_by(|a, b| {
                chart
                    .depth_of(b.source())
                    .cmp(&chart.depth_of(a.source()))
                    .then_with(|| a.source().cmp(b.source()))
                    .then_with(|| b.priority().cmp(&a.priority()))
            });

            let mut index = 0;
            while index < group.len() {
                let source = group[index].source();
                let block_end = group[index..]
                    .iter()
                    .position(|t| t.source() != source)
                    .map(|offset| index + offset)
                    .unwrap_or(group.len());
                let block = &group[index..block_end];
                index = block_end;

                if shadowed.contains(source) {
                    continue;
                }

                // Within one source, collect every passing transition of the
                // highest priority class that has at least one.
                let mut found = false;
                let mut class_start = 0;
                while class_start < block.len() && !found {
                    let priority = block[class_start].priority();
                    let class_end = block[class_start..]
                        .iter()
                        .position(|t| t.priority() != priority)
                        .map(|offset| class_start + offset)
                        .unwrap_or(block.len());
                    for transition in &block[class_start..class_end] {
                        let enabled = match transition.guard() {
                            None => true,
                            Some(_) => self.evaluator.evaluate_guard(transition, exposed_event)?,
                        };
                        if enabled {
                            selected.push((*transition).clone());
                            found = true;
                        }
                    }
                    class_start = class_end;
                }

                // Inner-first: a selected source hides its ancestors from
                // the rest of the selection.
                if found {
                    for ancestor in chart.ancestors_of(source) {
                        shadowed.insert(ancestor);
                    }
                    shadowed.insert(source);
                }
            }
        }

        Ok(selected)
    }

    /// Check a selected set for non-determinism and parallel conflicts, and
    /// order it for processing: deepest sources first, ties by name.
    fn sort_transitions(
        &self,
        mut transitions: Vec<Transition>,
    ) -> Result<Vec<Transition>, ExecutionError> {
        if transitions.len() <= 1 {
            return Ok(transitions);
        }

        let chart = &self.chart;
        for (i, t1) in transitions.iter().enumerate() {
            for t2 in &transitions[i + 1..] {
                // Sibling selections are only legal under an orthogonal
                // ancestor.
                let lca = chart.least_common_ancestor(t1.source(), t2.source());
                let orthogonal = lca
                    .and_then(|lca| chart.state(lca))
                    .is_some_and(|state| matches!(state.kind(), StateKind::Orthogonal));
                if !orthogonal {
                    return Err(ExecutionError::NonDeterminism {
                        transitions: transitions.clone(),
                        configuration: self.configuration(),
                    });
                }
                let lca = lca.expect("orthogonal ancestor exists");

                // Neither transition may leave its own region: each target
                // must stay under the child of the LCA its source lives in.
                for transition in [t1, t2] {
                    let mut region = transition.source();
                    for ancestor in chart.ancestors_of(transition.source()) {
                        if ancestor == lca {
                            break;
                        }
                        region = ancestor;
                    }
                    if let Some(target) = transition.target() {
                        let inside = target == region
                            || chart.descendants_of(region).iter().any(|d| *d == target);
                        if !inside {
                            return Err(ExecutionError::ConflictingTransitions {
                                transitions: transitions.clone(),
                                configuration: self.configuration(),
                            });
                        }
                    }
                }
            }
        }

        transitions.sort_by(|a, b| {
            chart
                .depth_of(b.source())
                .cmp(&chart.depth_of(a.source()))
                .then_with(|| a.source().cmp(b.source()))
        });
        Ok(transitions)
    }

    /// Build one micro step per transition: exit set, transition, entry set.
    fn create_steps(&self, event: Option<Event>, transitions: &[Transition]) -> Vec<MicroStep> {
        let chart = &self.chart;
        let mut steps = Vec::new();

        for transition in transitions {
            let Some(target) = transition.target() else {
                // Internal transition: no exits, no entries.
                steps.push(MicroStep {
                    event: event.clone(),
                    transition: Some(transition.clone()),
                    ..Default::default()
                });
                continue;
            };

            let lca = chart.least_common_ancestor(transition.source(), target);

            // Highest ancestor of the source that is still below the LCA;
            // the source itself when it is a direct child of the LCA.
            let mut last_before_lca = transition.source();
            for ancestor in chart.ancestors_of(transition.source()) {
                if Some(ancestor) == lca {
                    break;
                }
                last_before_lca = ancestor;
            }

            // Exit the active part of that subtree, deepest first.
            let mut exited_states: Vec<String> = Vec::new();
            for descendant in chart.descendants_of(last_before_lca).iter().rev() {
                if self.configuration.contains(*descendant) {
                    exited_states.push((*descendant).to_string());
                }
            }
            if self.configuration.contains(last_before_lca) {
                exited_states.push(last_before_lca.to_string());
            }

            // Enter the path from below the LCA down to the target.
            let mut entered_states: Vec<String> = vec![target.to_string()];
            for ancestor in chart.ancestors_of(target) {
                if Some(ancestor) == lca {
                    break;
                }
                entered_states.insert(0, ancestor.to_string());
            }

            steps.push(MicroStep {
                event: event.clone(),
                transition: Some(transition.clone()),
                entered_states,
                exited_states,
                ..Default::default()
            });
        }

        steps
    }

    /// The next stabilization step for the current configuration, or `None`
    /// when it is already stable.
    fn stabilization_step(&self) -> Option<MicroStep> {
        let chart = &self.chart;
        let mut leaves = chart.leaves_of(&self.configuration);
        leaves.sort_by(|a, b| {
            chart
                .depth_of(b)
                .cmp(&chart.depth_of(a))
                .then_with(|| a.cmp(b))
        });

        for leaf in leaves {
            let state = chart.state(leaf).expect("active state exists in chart");
            match state.kind() {
                // A final state directly under the root terminates the
                // chart: both are exited and the configuration empties.
                StateKind::Final if chart.parent_of(leaf) == Some(chart.root()) => {
                    return Some(MicroStep {
                        exited_states: vec![leaf.to_string(), chart.root().to_string()],
                        ..Default::default()
                    });
                }
                StateKind::ShallowHistory { default } | StateKind::DeepHistory { default } => {
                    let mut entered_states = match self.memory.get(leaf) {
                        Some(memorized) => memorized.clone(),
                        None => default.iter().cloned().collect(),
                    };
                    entered_states.sort_by(|a, b| {
                        chart
                            .depth_of(a)
                            .cmp(&chart.depth_of(b))
                            .then_with(|| a.cmp(b))
                    });
                    return Some(MicroStep {
                        entered_states,
                        exited_states: vec![leaf.to_string()],
                        ..Default::default()
                    });
                }
                StateKind::Orthogonal if !chart.children_of(leaf).is_empty() => {
                    let mut entered_states = chart.children_of(leaf).to_vec();
                    entered_states.sort();
                    return Some(MicroStep {
                        entered_states,
                        ..Default::default()
                    });
                }
                StateKind::Compound {
                    initial: Some(initial),
                } => {
                    return Some(MicroStep {
                        entered_states: vec![initial.clone()],
                        ..Default::default()
                    });
                }
                _ => {}
            }
        }

        None
    }

    /// Apply stabilization steps until a fixed point is reached.
    fn stabilize(&mut self) -> Result<Vec<MicroStep>, ExecutionError> {
        let mut steps = Vec::new();
        while let Some(step) = self.stabilization_step() {
            steps.push(self.apply_step(step)?);
        }
        Ok(steps)
    }

    /// Apply one micro step: run exit actions (memorizing history), the
    /// transition action, entry actions, and raise the events they emitted.
    fn apply_step(&mut self, step: MicroStep) -> Result<MicroStep, ExecutionError> {
        let chart = Rc::clone(&self.chart);
        let step_record = AnyStep::Micro(step.clone());
        // History memorizes the configuration as it was when the step
        // started, not as it shrinks while states are exited.
        let active_before: HashSet<String> = self.configuration.clone();
        let mut sent_events: Vec<Event> = Vec::new();

        for name in &step.exited_states {
            let state = chart.state(name).expect("exited state exists in chart");
            sent_events.extend(self.evaluator.execute_on_exit(state)?);

            // An exited compound with a history child memorizes what was
            // active under it.
            if state.kind().is_compound() {
                for child_name in chart.children_of(name) {
                    let child = chart.state(child_name).expect("child exists in chart");
                    match child.kind() {
                        StateKind::DeepHistory { .. } => {
                            let active: Vec<String> = chart
                                .descendants_of(name)
                                .iter()
                                .filter(|d| active_before.contains(**d))
                                .map(|d| d.to_string())
                                .collect();
                            assert!(
                                !active.is_empty(),
                                "deep history `{child_name}` memorized an empty configuration"
                            );
                            self.memory.insert(child_name.clone(), active);
                        }
                        StateKind::ShallowHistory { .. } => {
                            let active: Vec<String> = chart
                                .children_of(name)
                                .iter()
                                .filter(|c| active_before.contains(*c))
                                .cloned()
                                .collect();
                            assert!(
                                active.len() == 1,
                                "shallow history `{child_name}` expected exactly one active child"
                            );
                            self.memory.insert(child_name.clone(), active);
                        }
                        _ => {}
                    }
                }
            }

            self.configuration.remove(name);
            self.check_contracts(
                ContractTarget::State(state),
                ContractKind::Postcondition,
                Some(&step_record),
            )?;
            trace!(state = %name, "state exited");
            self.notify_properties("state exited", attribute("state", name))?;
        }

        if let Some(transition) = &step.transition {
            let target = ContractTarget::Transition(transition);
            self.check_contracts(target, ContractKind::Precondition, Some(&step_record))?;
            self.check_contracts(target, ContractKind::Invariant, Some(&step_record))?;

            sent_events.extend(
                self.evaluator
                    .execute_action(transition, step.event.as_ref())?,
            );

            self.check_contracts(target, ContractKind::Postcondition, Some(&step_record))?;
            self.check_contracts(target, ContractKind::Invariant, Some(&step_record))?;

            debug!(transition = %transition, "transition processed");
            let mut data = Map::new();
            data.insert("source".to_string(), transition.source().into());
            data.insert(
                "target".to_string(),
                transition.target().map(Value::from).unwrap_or(Value::Null),
            );
            data.insert(
                "event".to_string(),
                step.event
                    .as_ref()
                    .map(|event| {
                        serde_json::to_value(event).expect("events serialize to JSON")
                    })
                    .unwrap_or(Value::Null),
            );
            self.notify_properties("transition processed", data)?;
        }

        for name in &step.entered_states {
            let state = chart.state(name).expect("entered state exists in chart");
            self.check_contracts(
                ContractTarget::State(state),
                ContractKind::Precondition,
                Some(&step_record),
            )?;
            sent_events.extend(self.evaluator.execute_on_entry(state)?);
            self.configuration.insert(name.clone());
            trace!(state = %name, "state entered");
            self.notify_properties("state entered", attribute("state", name))?;
        }

        for event in &sent_events {
            self.raise_event(event)?;
        }

        Ok(MicroStep {
            sent_events,
            ..step
        })
    }

    /// Route an event raised by an action: internal events go to the queue
    /// and are mirrored to listeners, meta events go to property monitors.
    fn raise_event(&mut self, event: &Event) -> Result<(), ExecutionError> {
        match event.kind() {
            EventKind::Internal => {
                self.events.push(self.step_time.get(), event.clone());

                let external = event.as_external();
                let notification = if external.is_delayed() {
                    "delayed event sent"
                } else {
                    "event sent"
                };
                self.notify_properties(notification, attribute("event", &external))?;
                for listener in &mut self.listeners {
                    listener(&external);
                }
                Ok(())
            }
            EventKind::Meta => self.forward_meta(event.clone()),
            EventKind::External => Err(ExecutionError::InvalidEmittedEvent {
                event: event.clone(),
            }),
        }
    }

    /// Send a lifecycle meta-event to every bound property statechart.
    fn notify_properties(
        &mut self,
        name: &str,
        data: Map<String, Value>,
    ) -> Result<(), ExecutionError> {
        if self.properties.is_empty() {
            return Ok(());
        }
        self.forward_meta(Event::meta(name).with_data(data))
    }

    fn forward_meta(&mut self, event: Event) -> Result<(), ExecutionError> {
        for monitor in &mut self.properties {
            monitor.queue(event.clone())?;
        }
        for monitor in &mut self.properties {
            monitor.execute(None)?;
        }
        Ok(())
    }

    /// Fail when any bound property statechart has reached a final
    /// configuration.
    fn check_properties(&self, step: Option<&MacroStep>) -> Result<(), ExecutionError> {
        for monitor in &self.properties {
            if monitor.is_final() {
                return Err(Box::new(PropertyViolation {
                    property: monitor.chart().name().to_string(),
                    configuration: self.configuration(),
                    step: step.cloned(),
                    context: self.evaluator.context().clone(),
                })
                .into());
            }
        }
        Ok(())
    }

    /// Evaluate one contract condition set on a state or transition, failing
    /// on the first unsatisfied assertion.
    fn check_contracts(
        &mut self,
        target: ContractTarget<'_>,
        kind: ContractKind,
        step: Option<&AnyStep>,
    ) -> Result<(), ExecutionError> {
        if self.ignore_contract {
            return Ok(());
        }

        let event = step.and_then(AnyStep::event).cloned();
        let unsatisfied = match kind {
            ContractKind::Precondition => self
                .evaluator
                .evaluate_preconditions(target, event.as_ref())?,
            ContractKind::Postcondition => self
                .evaluator
                .evaluate_postconditions(target, event.as_ref())?,
            ContractKind::Invariant => {
                self.evaluator.evaluate_invariants(target, event.as_ref())?
            }
        };

        if let Some(assertion) = unsatisfied.into_iter().next() {
            return Err(Box::new(ContractError {
                kind,
                location: target.location(),
                assertion,
                configuration: self.configuration(),
                step: step.cloned(),
                context: self.evaluator.context().clone(),
            })
            .into());
        }
        Ok(())
    }
}

/// A one-entry meta-event payload.
fn attribute<T: serde::Serialize + ?Sized>(key: &str, value: &T) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(
        key.to_string(),
        serde_json::to_value(value).expect("meta attributes serialize to JSON"),
    );
    data
}
