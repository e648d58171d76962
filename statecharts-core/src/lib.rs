//! Core model types for hierarchical statecharts.
//!
//! This crate defines the immutable statechart model (a tree of named states
//! plus a transition list), the events exchanged with and within a chart, the
//! micro/macro step records produced by an execution, and every error type
//! surfaced by the interpreter. The interpreter itself lives in the
//! `statecharts` crate.
//!
//! A model is assembled through [`StatechartBuilder`], which validates the
//! tree before handing out a read-only [`Statechart`]:
//!
//! ```
//! use statecharts_core::{State, Statechart, Transition};
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
//! assert_eq!(chart.root(), "root");
//! assert_eq!(chart.children_of("root"), ["off", "on"]);
//! ```

pub mod chart;
pub mod error;
pub mod event;
pub mod step;

pub use chart::{State, StateKind, Statechart, StatechartBuilder, Transition};
pub use error::{
    ChartError, ContractError, ContractKind, ContractLocation, EvaluationError, ExecutionError,
    PropertyViolation,
};
pub use event::{Event, EventKind};
pub use step::{AnyStep, MacroStep, MicroStep};
