//! Records of what an execution did.

use serde::{Deserialize, Serialize};

use crate::chart::Transition;
use crate::event::Event;

/// The atomic unit of execution: one transition's exit set, action and entry
/// set, or a single stabilization action.
///
/// `event` is the consumed event when the step was triggered by one;
/// stabilization steps carry neither event nor transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MicroStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entered_states: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exited_states: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sent_events: Vec<Event>,
}

/// One user-visible advance of the interpreter: the micro steps applied
/// during a single call to `execute_once`, including stabilization, all
/// under one time snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroStep {
    pub time: f64,
    pub steps: Vec<MicroStep>,
}

impl MacroStep {
    /// The event consumed during this macro step, if any.
    pub fn event(&self) -> Option<&Event> {
        self.steps.iter().find_map(|step| step.event.as_ref())
    }

    /// Every transition processed during this macro step, in order.
    pub fn transitions(&self) -> Vec<&Transition> {
        self.steps
            .iter()
            .filter_map(|step| step.transition.as_ref())
            .collect()
    }

    /// Every state entered during this macro step, in order.
    pub fn entered_states(&self) -> Vec<&str> {
        self.steps
            .iter()
            .flat_map(|step| step.entered_states.iter().map(String::as_str))
            .collect()
    }

    /// Every state exited during this macro step, in order.
    pub fn exited_states(&self) -> Vec<&str> {
        self.steps
            .iter()
            .flat_map(|step| step.exited_states.iter().map(String::as_str))
            .collect()
    }

    /// Every event sent during this macro step, in order.
    pub fn sent_events(&self) -> Vec<&Event> {
        self.steps.iter().flat_map(|step| &step.sent_events).collect()
    }
}

/// Either a single micro step or a whole macro step, for diagnostics
/// attached to contract errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnyStep {
    Micro(MicroStep),
    Macro(MacroStep),
}

impl AnyStep {
    /// The event carried by the step, if any.
    pub fn event(&self) -> Option<&Event> {
        match self {
            AnyStep::Micro(step) => step.event.as_ref(),
            AnyStep::Macro(step) => step.event(),
        }
    }
}
