//! Events exchanged with and within a statechart.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Routing policy of an [`Event`].
///
/// The kind decides where an event may travel, not what it carries:
/// external events are queued by the outside world, internal events are
/// raised by the chart's own actions, and meta events are lifecycle signals
/// that are only ever delivered to bound property statecharts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Queued from outside the chart.
    External,
    /// Raised by an action of the chart itself.
    Internal,
    /// Lifecycle signal; never enters the regular queue.
    Meta,
}

/// A named event with an optional JSON payload.
///
/// Whether an event is delayed is orthogonal to its kind: both internal and
/// external events may carry a delay, which is added to the current time
/// when the event is inserted into a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    name: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    data: Map<String, Value>,
    kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delay: Option<f64>,
}

impl Event {
    /// An external event, the default for anything queued by a caller.
    pub fn external(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Map::new(),
            kind: EventKind::External,
            delay: None,
        }
    }

    /// An internal event, as raised by actions through an event sink.
    pub fn internal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Map::new(),
            kind: EventKind::Internal,
            delay: None,
        }
    }

    /// A meta event carrying a lifecycle notification.
    pub fn meta(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Map::new(),
            kind: EventKind::Meta,
            delay: None,
        }
    }

    /// Attach a payload, replacing any previous one.
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Attach a single payload entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Turn this event into a delayed one, scheduled `delay` time units
    /// after its insertion into a queue.
    pub fn delayed(mut self, delay: f64) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn delay(&self) -> Option<f64> {
        self.delay
    }

    pub fn is_internal(&self) -> bool {
        self.kind == EventKind::Internal
    }

    pub fn is_meta(&self) -> bool {
        self.kind == EventKind::Meta
    }

    pub fn is_delayed(&self) -> bool {
        self.delay.is_some()
    }

    /// The externally visible mirror of this event: same name, payload and
    /// delay, but with [`EventKind::External`]. Used when an internally
    /// raised event is forwarded to bound listeners.
    pub fn as_external(&self) -> Event {
        Event {
            name: self.name.clone(),
            data: self.data.clone(),
            kind: EventKind::External,
            delay: self.delay,
        }
    }
}

impl From<&str> for Event {
    fn from(name: &str) -> Self {
        Event::external(name)
    }
}

impl From<String> for Event {
    fn from(name: String) -> Self {
        Event::external(name)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.data.is_empty() {
            write!(f, "({})", Value::Object(self.data.clone()))?;
        }
        Ok(())
    }
}
