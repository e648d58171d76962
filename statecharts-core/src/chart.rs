//! The immutable statechart model and its builder.

use core::fmt;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ChartError;

/// What a state is, and the structural data that comes with that role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    /// A leaf state with no children.
    Atomic,
    /// A leaf state that, as a direct child of the root, terminates the chart.
    Final,
    /// Exactly one child is active; `initial` names the default one.
    Compound { initial: Option<String> },
    /// All children are active in parallel.
    Orthogonal,
    /// Re-enters the last active direct child of the parent compound.
    ShallowHistory { default: Option<String> },
    /// Re-enters the full previously active descendant set of the parent.
    DeepHistory { default: Option<String> },
}

impl StateKind {
    pub fn is_history(&self) -> bool {
        matches!(
            self,
            StateKind::ShallowHistory { .. } | StateKind::DeepHistory { .. }
        )
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, StateKind::Compound { .. })
    }
}

/// A named state of the chart, together with its actions and contracts.
///
/// Tree structure (parent and children) is owned by the [`Statechart`], not
/// by the state itself; a `State` is attached to the tree when it is handed
/// to the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    name: String,
    kind: StateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_entry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_exit: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    preconditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    postconditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    invariants: Vec<String>,
}

impl State {
    fn with_kind(name: impl Into<String>, kind: StateKind) -> Self {
        Self {
            name: name.into(),
            kind,
            on_entry: None,
            on_exit: None,
            preconditions: Vec::new(),
            postconditions: Vec::new(),
            invariants: Vec::new(),
        }
    }

    pub fn atomic(name: impl Into<String>) -> Self {
        Self::with_kind(name, StateKind::Atomic)
    }

    pub fn final_state(name: impl Into<String>) -> Self {
        Self::with_kind(name, StateKind::Final)
    }

    pub fn compound(name: impl Into<String>) -> Self {
        Self::with_kind(name, StateKind::Compound { initial: None })
    }

    pub fn orthogonal(name: impl Into<String>) -> Self {
        Self::with_kind(name, StateKind::Orthogonal)
    }

    pub fn shallow_history(name: impl Into<String>) -> Self {
        Self::with_kind(name, StateKind::ShallowHistory { default: None })
    }

    pub fn deep_history(name: impl Into<String>) -> Self {
        Self::with_kind(name, StateKind::DeepHistory { default: None })
    }

    /// Declare the initial child of a compound state.
    ///
    /// Has no effect on other kinds; the builder validates that every
    /// compound state names one of its children here.
    pub fn initial(mut self, child: impl Into<String>) -> Self {
        if let StateKind::Compound { initial } = &mut self.kind {
            *initial = Some(child.into());
        }
        self
    }

    /// Declare the default memory of a history state, used when the history
    /// is reached before its parent compound was ever exited.
    pub fn default_memory(mut self, state: impl Into<String>) -> Self {
        match &mut self.kind {
            StateKind::ShallowHistory { default } | StateKind::DeepHistory { default } => {
                *default = Some(state.into());
            }
            _ => {}
        }
        self
    }

    /// Name of the action executed when this state is entered.
    pub fn on_entry(mut self, action: impl Into<String>) -> Self {
        self.on_entry = Some(action.into());
        self
    }

    /// Name of the action executed when this state is exited.
    pub fn on_exit(mut self, action: impl Into<String>) -> Self {
        self.on_exit = Some(action.into());
        self
    }

    pub fn with_precondition(mut self, assertion: impl Into<String>) -> Self {
        self.preconditions.push(assertion.into());
        self
    }

    pub fn with_postcondition(mut self, assertion: impl Into<String>) -> Self {
        self.postconditions.push(assertion.into());
        self
    }

    pub fn with_invariant(mut self, assertion: impl Into<String>) -> Self {
        self.invariants.push(assertion.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &StateKind {
        &self.kind
    }

    pub fn entry_action(&self) -> Option<&str> {
        self.on_entry.as_deref()
    }

    pub fn exit_action(&self) -> Option<&str> {
        self.on_exit.as_deref()
    }

    pub fn preconditions(&self) -> &[String] {
        &self.preconditions
    }

    pub fn postconditions(&self) -> &[String] {
        &self.postconditions
    }

    pub fn invariants(&self) -> &[String] {
        &self.invariants
    }
}

/// A directed edge between two states of the chart.
///
/// A transition without a target is internal: when it fires, no state is
/// exited or entered, only its action runs. A transition without an event is
/// eventless and fires whenever its guard holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    guard: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    #[serde(default)]
    priority: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    preconditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    postconditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    invariants: Vec<String>,
}

impl Transition {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: Some(target.into()),
            event: None,
            guard: None,
            action: None,
            priority: 0,
            preconditions: Vec::new(),
            postconditions: Vec::new(),
            invariants: Vec::new(),
        }
    }

    /// An internal transition: fires on its source without exiting it.
    pub fn internal(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: None,
            event: None,
            guard: None,
            action: None,
            priority: 0,
            preconditions: Vec::new(),
            postconditions: Vec::new(),
            invariants: Vec::new(),
        }
    }

    pub fn on_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Higher priorities win within one source state.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_precondition(mut self, assertion: impl Into<String>) -> Self {
        self.preconditions.push(assertion.into());
        self
    }

    pub fn with_postcondition(mut self, assertion: impl Into<String>) -> Self {
        self.postconditions.push(assertion.into());
        self
    }

    pub fn with_invariant(mut self, assertion: impl Into<String>) -> Self {
        self.invariants.push(assertion.into());
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    pub fn guard(&self) -> Option<&str> {
        self.guard.as_deref()
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_internal(&self) -> bool {
        self.target.is_none()
    }

    pub fn is_eventless(&self) -> bool {
        self.event.is_none()
    }

    pub fn preconditions(&self) -> &[String] {
        &self.preconditions
    }

    pub fn postconditions(&self) -> &[String] {
        &self.postconditions
    }

    pub fn invariants(&self) -> &[String] {
        &self.invariants
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{} -> {}", self.source, target)?,
            None => write!(f, "{} (internal)", self.source)?,
        }
        if let Some(event) = &self.event {
            write!(f, " [{event}]")?;
        }
        Ok(())
    }
}

/// A validated, read-only statechart: a tree of named states rooted at a
/// single root, plus a list of transitions.
///
/// The model is immutable once built and can be shared between interpreters
/// (e.g. behind an `Rc`). All tree queries borrow from the chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statechart {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preamble: Option<String>,
    root: String,
    states: HashMap<String, State>,
    parents: HashMap<String, String>,
    children: HashMap<String, Vec<String>>,
    transitions: Vec<Transition>,
}

impl Statechart {
    pub fn builder(name: impl Into<String>) -> StatechartBuilder {
        StatechartBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the action executed once when an interpreter binds this chart.
    pub fn preamble(&self) -> Option<&str> {
        self.preamble.as_deref()
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.values()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn parent_of(&self, name: &str) -> Option<&str> {
        self.parents.get(name).map(String::as_str)
    }

    /// Direct children of a state, in declaration order. Empty for leaves.
    pub fn children_of(&self, name: &str) -> &[String] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of ancestors of a state; the root has depth 0.
    pub fn depth_of(&self, name: &str) -> usize {
        self.ancestors_of(name).len()
    }

    /// Ancestors of a state, closest first and root last. The state itself
    /// is not included.
    pub fn ancestors_of(&self, name: &str) -> Vec<&str> {
        let mut ancestors = Vec::new();
        let mut current = name;
        while let Some(parent) = self.parent_of(current) {
            ancestors.push(parent);
            current = parent;
        }
        ancestors
    }

    /// Descendants of a state in pre-order, the state itself excluded.
    pub fn descendants_of(&self, name: &str) -> Vec<&str> {
        let mut descendants = Vec::new();
        let mut stack: Vec<&str> = self
            .children_of(name)
            .iter()
            .rev()
            .map(String::as_str)
            .collect();
        while let Some(state) = stack.pop() {
            descendants.push(state);
            for child in self.children_of(state).iter().rev() {
                stack.push(child);
            }
        }
        descendants
    }

    /// States of `names` that have no child in `names`.
    pub fn leaves_of<'a>(&'a self, names: &'a HashSet<String>) -> Vec<&'a str> {
        names
            .iter()
            .filter(|name| !self.children_of(name).iter().any(|c| names.contains(c)))
            .map(String::as_str)
            .collect()
    }

    /// Deepest common proper ancestor of two states.
    ///
    /// A state is not an ancestor of itself, so the LCA of a state and one
    /// of its descendants is the state's parent. `None` when either side is
    /// the root.
    pub fn least_common_ancestor(&self, a: &str, b: &str) -> Option<&str> {
        let ancestors_of_b: HashSet<&str> = self.ancestors_of(b).into_iter().collect();
        self.ancestors_of(a)
            .into_iter()
            .find(|state| ancestors_of_b.contains(state))
    }
}

/// Assembles and validates a [`Statechart`].
#[derive(Debug, Default)]
pub struct StatechartBuilder {
    name: String,
    preamble: Option<String>,
    root: Option<State>,
    nested: Vec<(String, State)>,
    transitions: Vec<Transition>,
}

impl StatechartBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Name of the action executed once when an interpreter binds the chart.
    pub fn preamble(mut self, action: impl Into<String>) -> Self {
        self.preamble = Some(action.into());
        self
    }

    pub fn root(mut self, state: State) -> Self {
        self.root = Some(state);
        self
    }

    pub fn child(mut self, parent: impl Into<String>, state: State) -> Self {
        self.nested.push((parent.into(), state));
        self
    }

    pub fn transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn build(self) -> Result<Statechart, ChartError> {
        let root = self.root.ok_or(ChartError::MissingRoot)?;
        if root.kind().is_history() || matches!(root.kind(), StateKind::Final) {
            return Err(ChartError::InvalidRoot(root.name().to_string()));
        }

        let root_name = root.name().to_string();
        let mut states: HashMap<String, State> = HashMap::new();
        let mut parents: HashMap<String, String> = HashMap::new();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();

        states.insert(root_name.clone(), root);
        for (parent, state) in self.nested {
            let name = state.name().to_string();
            if states.contains_key(&name) {
                return Err(ChartError::DuplicateState(name));
            }
            parents.insert(name.clone(), parent.clone());
            children.entry(parent).or_default().push(name.clone());
            states.insert(name, state);
        }

        // Parents must be declared states.
        for (child, parent) in &parents {
            if !states.contains_key(parent) {
                return Err(ChartError::UnknownState {
                    name: parent.clone(),
                    referrer: format!("state `{child}`"),
                });
            }
        }

        // Every state must hang off the root; this also rejects parent
        // cycles, which would otherwise break the tree queries.
        let mut reachable: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![root_name.as_str()];
        while let Some(name) = stack.pop() {
            reachable.insert(name);
            if let Some(child_names) = children.get(name) {
                stack.extend(child_names.iter().map(String::as_str));
            }
        }
        for name in states.keys() {
            if !reachable.contains(name.as_str()) {
                return Err(ChartError::UnreachableState(name.clone()));
            }
        }

        // Per-kind structural rules.
        for state in states.values() {
            let name = state.name();
            let child_names = children.get(name).map(Vec::as_slice).unwrap_or(&[]);
            match state.kind() {
                StateKind::Atomic | StateKind::Final => {
                    if !child_names.is_empty() {
                        return Err(ChartError::LeafWithChildren(name.to_string()));
                    }
                }
                StateKind::Compound { initial } => {
                    let initial = initial
                        .as_ref()
                        .ok_or_else(|| ChartError::MissingInitial(name.to_string()))?;
                    if !child_names.contains(initial) {
                        return Err(ChartError::InvalidInitial {
                            state: name.to_string(),
                            initial: initial.clone(),
                        });
                    }
                }
                StateKind::Orthogonal => {
                    // Every child is a region running in parallel; only
                    // compound, atomic and final states qualify.
                    for child in child_names {
                        match states[child].kind() {
                            StateKind::Compound { .. } | StateKind::Atomic | StateKind::Final => {}
                            kind if kind.is_history() => {
                                return Err(ChartError::HistoryOutsideCompound(child.clone()));
                            }
                            _ => {
                                return Err(ChartError::InvalidOrthogonalChild {
                                    state: name.to_string(),
                                    child: child.clone(),
                                });
                            }
                        }
                    }
                }
                StateKind::ShallowHistory { default } | StateKind::DeepHistory { default } => {
                    if !child_names.is_empty() {
                        return Err(ChartError::LeafWithChildren(name.to_string()));
                    }
                    let parent = parents.get(name).expect("history state has a parent");
                    if !states[parent].kind().is_compound() {
                        return Err(ChartError::HistoryOutsideCompound(name.to_string()));
                    }
                    if let Some(default) = default {
                        let siblings = children.get(parent).map(Vec::as_slice).unwrap_or(&[]);
                        let valid = match state.kind() {
                            StateKind::ShallowHistory { .. } => siblings.contains(default),
                            _ => {
                                // Deep history may memorize any strict
                                // descendant of the parent compound.
                                let mut current = default.as_str();
                                loop {
                                    match parents.get(current) {
                                        Some(p) if p == parent => break true,
                                        Some(p) => current = p,
                                        None => break false,
                                    }
                                }
                            }
                        };
                        if !valid {
                            return Err(ChartError::InvalidHistoryDefault {
                                state: name.to_string(),
                                default: default.clone(),
                            });
                        }
                    }
                }
            }
        }

        // Transition endpoints must exist, and history pseudostates cannot
        // be transition sources.
        for transition in &self.transitions {
            let source = match states.get(transition.source()) {
                Some(source) => source,
                None => {
                    return Err(ChartError::UnknownState {
                        name: transition.source().to_string(),
                        referrer: format!("transition `{transition}`"),
                    });
                }
            };
            if source.kind().is_history() {
                return Err(ChartError::TransitionFromHistory(
                    transition.source().to_string(),
                ));
            }
            if let Some(target) = transition.target() {
                if !states.contains_key(target) {
                    return Err(ChartError::UnknownState {
                        name: target.to_string(),
                        referrer: format!("transition `{transition}`"),
                    });
                }
            }
        }

        Ok(Statechart {
            name: self.name,
            preamble: self.preamble,
            root: root_name,
            states,
            parents,
            children,
            transitions: self.transitions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_chart() -> Statechart {
        Statechart::builder("nested")
            .root(State::compound("root").initial("a"))
            .child("root", State::compound("a").initial("a1"))
            .child("a", State::atomic("a1"))
            .child("a", State::atomic("a2"))
            .child("root", State::orthogonal("b"))
            .child("b", State::compound("b1").initial("b1a"))
            .child("b1", State::atomic("b1a"))
            .child("b", State::compound("b2").initial("b2a"))
            .child("b2", State::atomic("b2a"))
            .build()
            .expect("valid chart")
    }

    #[test]
    fn ancestors_exclude_self_and_end_at_root() {
        let chart = nested_chart();
        assert_eq!(chart.ancestors_of("b1a"), ["b1", "b", "root"]);
        assert!(chart.ancestors_of("root").is_empty());
    }

    #[test]
    fn descendants_are_preordered() {
        let chart = nested_chart();
        assert_eq!(
            chart.descendants_of("b"),
            ["b1", "b1a", "b2", "b2a"],
            "children first, each subtree fully visited before the next"
        );
    }

    #[test]
    fn depth_counts_ancestors() {
        let chart = nested_chart();
        assert_eq!(chart.depth_of("root"), 0);
        assert_eq!(chart.depth_of("a"), 1);
        assert_eq!(chart.depth_of("b1a"), 3);
    }

    #[test]
    fn lca_is_a_proper_ancestor() {
        let chart = nested_chart();
        assert_eq!(chart.least_common_ancestor("b1a", "b2a"), Some("b"));
        assert_eq!(chart.least_common_ancestor("a1", "a2"), Some("a"));
        // The LCA of a state and its own descendant is the state's parent.
        assert_eq!(chart.least_common_ancestor("a", "a1"), Some("root"));
        assert_eq!(chart.least_common_ancestor("root", "a1"), None);
    }

    #[test]
    fn leaves_ignore_states_with_active_children() {
        let chart = nested_chart();
        let names: HashSet<String> = ["root", "a", "a1"].iter().map(|s| s.to_string()).collect();
        assert_eq!(chart.leaves_of(&names), ["a1"]);
    }

    #[test]
    fn compound_requires_an_initial_child() {
        let result = Statechart::builder("broken")
            .root(State::compound("root"))
            .child("root", State::atomic("a"))
            .build();
        assert!(matches!(result, Err(ChartError::MissingInitial(state)) if state == "root"));
    }

    #[test]
    fn initial_must_be_a_child() {
        let result = Statechart::builder("broken")
            .root(State::compound("root").initial("elsewhere"))
            .child("root", State::atomic("a"))
            .build();
        assert!(matches!(result, Err(ChartError::InvalidInitial { .. })));
    }

    #[test]
    fn history_must_live_under_a_compound() {
        let result = Statechart::builder("broken")
            .root(State::orthogonal("root"))
            .child("root", State::shallow_history("h"))
            .build();
        assert!(matches!(result, Err(ChartError::HistoryOutsideCompound(name)) if name == "h"));
    }

    #[test]
    fn orthogonal_children_must_be_region_states() {
        let result = Statechart::builder("broken")
            .root(State::orthogonal("root"))
            .child("root", State::compound("r1").initial("r1a"))
            .child("r1", State::atomic("r1a"))
            .child("root", State::orthogonal("r2"))
            .build();
        assert!(matches!(
            result,
            Err(ChartError::InvalidOrthogonalChild { state, child }) if state == "root" && child == "r2"
        ));
    }

    #[test]
    fn transitions_cannot_leave_a_history_state() {
        let result = Statechart::builder("broken")
            .root(State::compound("root").initial("a"))
            .child("root", State::atomic("a"))
            .child("root", State::shallow_history("h"))
            .transition(Transition::new("h", "a"))
            .build();
        assert!(matches!(result, Err(ChartError::TransitionFromHistory(_))));
    }

    #[test]
    fn parent_cycles_are_rejected() {
        let result = Statechart::builder("broken")
            .root(State::compound("root").initial("a"))
            .child("root", State::atomic("a"))
            .child("x", State::atomic("y"))
            .child("y", State::atomic("x"))
            .build();
        assert!(matches!(result, Err(ChartError::UnreachableState(_))));
    }

    #[test]
    fn unknown_transition_target_is_rejected() {
        let result = Statechart::builder("broken")
            .root(State::compound("root").initial("a"))
            .child("root", State::atomic("a"))
            .transition(Transition::new("a", "nowhere"))
            .build();
        assert!(matches!(result, Err(ChartError::UnknownState { .. })));
    }
}
