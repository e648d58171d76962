//! Error types surfaced by chart construction and execution.

use core::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::chart::Transition;
use crate::event::Event;
use crate::step::{AnyStep, MacroStep};

/// A structurally invalid statechart, rejected by the builder.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
    #[error("statechart has no root state")]
    MissingRoot,

    #[error("root state `{0}` cannot be a history or final state")]
    InvalidRoot(String),

    #[error("duplicate state `{0}`")]
    DuplicateState(String),

    #[error("unknown state `{name}` referenced by {referrer}")]
    UnknownState { name: String, referrer: String },

    #[error("state `{0}` is not connected to the root")]
    UnreachableState(String),

    #[error("state `{0}` is a leaf kind and cannot have children")]
    LeafWithChildren(String),

    #[error("compound state `{0}` declares no initial child")]
    MissingInitial(String),

    #[error("initial state `{initial}` of compound `{state}` is not one of its children")]
    InvalidInitial { state: String, initial: String },

    #[error("history state `{0}` must be a direct child of a compound state")]
    HistoryOutsideCompound(String),

    #[error("child `{child}` of orthogonal state `{state}` must be a compound, atomic or final state")]
    InvalidOrthogonalChild { state: String, child: String },

    #[error("default memory `{default}` of history state `{state}` lies outside its parent")]
    InvalidHistoryDefault { state: String, default: String },

    #[error("transitions cannot originate from history state `{0}`")]
    TransitionFromHistory(String),
}

/// A failure inside the evaluator: a guard, action or assertion name that
/// resolves to nothing, or a user callback reporting an error of its own.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("no guard registered under `{0}`")]
    UnknownGuard(String),

    #[error("no action registered under `{0}`")]
    UnknownAction(String),

    #[error("no assertion registered under `{0}`")]
    UnknownAssertion(String),

    #[error("evaluation failed: {0}")]
    Failed(String),
}

/// Which design-by-contract condition set was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    Precondition,
    Postcondition,
    Invariant,
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContractKind::Precondition => "precondition",
            ContractKind::Postcondition => "postcondition",
            ContractKind::Invariant => "invariant",
        };
        f.write_str(label)
    }
}

/// The model element a contract condition is attached to.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractLocation {
    State(String),
    Transition(Transition),
}

impl fmt::Display for ContractLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractLocation::State(name) => write!(f, "state `{name}`"),
            ContractLocation::Transition(transition) => write!(f, "transition `{transition}`"),
        }
    }
}

/// A violated contract condition, with enough of the interpreter state
/// attached to diagnose it.
///
/// Side effects applied earlier in the same macro step are not rolled back;
/// `configuration` reflects the partially advanced interpreter.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} `{assertion}` failed on {location}")]
pub struct ContractError {
    pub kind: ContractKind,
    pub location: ContractLocation,
    pub assertion: String,
    pub configuration: Vec<String>,
    pub step: Option<AnyStep>,
    pub context: Map<String, Value>,
}

/// A bound property statechart reached a final configuration, meaning the
/// temporal property it expresses has been violated.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("property statechart `{property}` reached a final configuration")]
pub struct PropertyViolation {
    /// Name of the monitor's chart.
    pub property: String,
    /// Active configuration of the monitored interpreter.
    pub configuration: Vec<String>,
    /// The macro step whose meta-events drove the monitor to completion.
    pub step: Option<MacroStep>,
    /// Context of the monitored interpreter.
    pub context: Map<String, Value>,
}

/// A fatal error raised while executing a macro step.
///
/// Side effects already applied during the failing step are kept; the
/// interpreter does not roll back.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    /// An internal event was handed to `queue`; only external, delayed and
    /// meta events can be queued from the outside.
    #[error("internal event `{event}` cannot be queued from the outside")]
    InvalidInternalEvent { event: Event },

    /// A delayed event carried a negative delay.
    #[error("delayed event `{event}` has a negative delay ({delay})")]
    InvalidDelay { event: Event, delay: f64 },

    /// An action emitted an event that is neither internal nor meta.
    #[error("statechart emitted event `{event}` that is neither internal nor meta")]
    InvalidEmittedEvent { event: Event },

    /// Several transitions were enabled without a common orthogonal
    /// ancestor to justify firing them together.
    #[error("non-deterministic choice between {} enabled transitions", .transitions.len())]
    NonDeterminism {
        transitions: Vec<Transition>,
        configuration: Vec<String>,
    },

    /// A transition selected together with others would cross a parallel
    /// region boundary.
    #[error("conflicting transitions cross a parallel region boundary")]
    ConflictingTransitions {
        transitions: Vec<Transition>,
        configuration: Vec<String>,
    },

    #[error(transparent)]
    Contract(#[from] Box<ContractError>),

    #[error(transparent)]
    Property(#[from] Box<PropertyViolation>),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}
