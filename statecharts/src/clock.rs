//! Time sources driving an interpreter.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// A monotone time source, sampled once per macro step.
pub trait Clock {
    /// Current time, in seconds. Must never decrease.
    fn time(&self) -> f64;
}

/// A clock that only moves when told to. The default for new interpreters,
/// and the natural choice for tests and simulations.
#[derive(Debug, Default)]
pub struct SimulatedClock {
    now: Cell<f64>,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump to an absolute time. Panics when moving backwards.
    pub fn set_time(&self, time: f64) {
        assert!(
            time >= self.now.get(),
            "simulated clock cannot move backwards (now {}, asked {time})",
            self.now.get()
        );
        self.now.set(time);
    }

    /// Move forward by `duration` seconds.
    pub fn advance(&self, duration: f64) {
        assert!(duration >= 0.0, "cannot advance a clock by {duration}");
        self.now.set(self.now.get() + duration);
    }
}

impl Clock for SimulatedClock {
    fn time(&self) -> f64 {
        self.now.get()
    }
}

/// Wall-clock seconds elapsed since the clock was created.
#[derive(Debug)]
pub struct MonotonicClock {
    started: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

/// A clock slaved to a host interpreter's step-time snapshot.
///
/// Property statecharts get one of these when they are bound, so that they
/// observe exactly the time at which their host executes. The shared cell is
/// written by the host at the start of each of its macro steps; holding the
/// cell rather than the host itself keeps the ownership one-directional.
#[derive(Debug, Clone)]
pub struct SynchronizedClock {
    host_time: Rc<Cell<f64>>,
}

impl SynchronizedClock {
    pub(crate) fn new(host_time: Rc<Cell<f64>>) -> Self {
        Self { host_time }
    }
}

impl Clock for SynchronizedClock {
    fn time(&self) -> f64 {
        self.host_time.get()
    }
}
