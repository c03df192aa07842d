//! Leaf task traits and the slot chassis that drives them.
//!
//! Hosts implement [`ActionTask`] and [`ConditionTask`] for their own leaf
//! work; graphs never call those hooks directly. Each task is wrapped in an
//! [`ActionSlot`] or [`ConditionSlot`] that owns the enable flag, the status
//! latch and the hook ordering, so every task sees the same lifecycle no
//! matter which composite or state it sits under.

use std::fmt;

use arbor_serial::Reflect;
use uuid::Uuid;

use crate::blackboard::Blackboard;
use crate::status::Status;

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of whatever a graph acts on behalf of.
///
/// Tasks receive the agent through [`ExecContext`]; the library attaches no
/// behavior to it beyond identity and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    id: Uuid,
    name: String,
}

impl Agent {
    /// A named agent with a fresh unique id.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            name: String::new(),
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "agent-{}", self.id)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// How an action chose to finish.
///
/// `Cancelled` is not a result: the slot rewinds to `Resting` as if the task
/// had never started, and no success or failure is reported upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Cancelled,
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution Context
// ─────────────────────────────────────────────────────────────────────────────

/// Per-update context handed to every hook.
///
/// Carries the agent, the blackboard and the frame timing, plus the outbox
/// a task signals completion through: [`end_action`](Self::end_action),
/// [`error`](Self::error) and [`latch_result`](Self::latch_result). The
/// enclosing slot drains the outbox right after each hook returns.
pub struct ExecContext<'a> {
    pub agent: Agent,
    pub blackboard: &'a mut Blackboard,
    /// Seconds since the previous update.
    pub dt: f64,
    /// Monotonic update counter of the owning graph.
    pub tick: u64,
    scope: String,
    pending: Option<Outcome>,
    errored: bool,
    latch: Option<bool>,
}

impl<'a> ExecContext<'a> {
    pub fn new(agent: Agent, blackboard: &'a mut Blackboard, dt: f64, tick: u64) -> Self {
        Self {
            agent,
            blackboard,
            dt,
            tick,
            scope: String::from("graph"),
            pending: None,
            errored: false,
            latch: None,
        }
    }

    /// Finish the current action with the given outcome.
    ///
    /// Valid from `on_execute` (instant actions) and `on_update` alike. The
    /// last call before the hook returns wins.
    pub fn end_action(&mut self, outcome: Outcome) {
        self.pending = Some(outcome);
    }

    /// Abort the current action, logging the message against the task.
    ///
    /// The slot latches `Error`, which propagates through composites like an
    /// ordinary failure.
    pub fn error(&mut self, message: impl AsRef<str>) {
        tracing::error!(agent = %self.agent, task = %self.scope, "{}", message.as_ref());
        self.errored = true;
    }

    /// Pin the condition result so it also holds on the following tick.
    pub fn latch_result(&mut self, value: bool) {
        self.latch = Some(value);
    }

    pub(crate) fn propagate_error(&mut self) {
        self.errored = true;
    }

    pub(crate) fn take_pending(&mut self) -> Option<Outcome> {
        self.pending.take()
    }

    pub(crate) fn take_errored(&mut self) -> bool {
        std::mem::take(&mut self.errored)
    }

    pub(crate) fn take_latch(&mut self) -> Option<bool> {
        self.latch.take()
    }

    pub(crate) fn enter_scope(&mut self, label: &str) -> String {
        std::mem::replace(&mut self.scope, label.to_string())
    }

    pub(crate) fn restore_scope(&mut self, previous: String) {
        self.scope = previous;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Task Traits
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of work that runs over one or more ticks.
///
/// `on_execute` fires once when the slot leaves `Resting`; `on_update` fires
/// every following tick until the task calls [`ExecContext::end_action`] or
/// [`ExecContext::error`]. `on_stop` always closes the run, with
/// `interrupted` set when the task did not finish on its own terms.
pub trait ActionTask: Reflect {
    /// Display name used in logs and editor surfaces.
    fn label(&self) -> &str {
        self.type_name()
    }

    fn on_execute(&mut self, cx: &mut ExecContext<'_>);

    fn on_update(&mut self, _cx: &mut ExecContext<'_>) {}

    fn on_stop(&mut self, _cx: &mut ExecContext<'_>, _interrupted: bool) {}

    fn on_pause(&mut self, _cx: &mut ExecContext<'_>) {}

    fn on_resume(&mut self, _cx: &mut ExecContext<'_>) {}

    fn on_graph_started(&mut self, _cx: &mut ExecContext<'_>) {}

    fn on_graph_stopped(&mut self, _cx: &mut ExecContext<'_>) {}
}

/// A boolean predicate evaluated on demand.
pub trait ConditionTask: Reflect {
    /// Display name used in logs and editor surfaces.
    fn label(&self) -> &str {
        self.type_name()
    }

    fn on_check(&mut self, cx: &mut ExecContext<'_>) -> bool;

    fn on_graph_started(&mut self, _cx: &mut ExecContext<'_>) {}

    fn on_graph_stopped(&mut self, _cx: &mut ExecContext<'_>) {}
}

// ─────────────────────────────────────────────────────────────────────────────
// Action Slot
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime chassis around one action task.
///
/// The slot enforces the hook protocol: `on_execute` only on the
/// `Resting` to `Running` edge, terminal statuses latched until
/// [`rewind`](Self::rewind), `Cancelled` rewinding in place.
#[derive(Debug, Clone)]
pub struct ActionSlot {
    /// Disabled slots report [`Status::Optional`] without running the task.
    pub enabled: bool,
    status: Status,
    paused: bool,
    elapsed: f64,
}

impl Default for ActionSlot {
    fn default() -> Self {
        Self {
            enabled: true,
            status: Status::Resting,
            paused: false,
            elapsed: 0.0,
        }
    }
}

impl ActionSlot {
    pub fn status(&self) -> Status {
        self.status
    }

    /// Seconds the task has been running since its last `on_execute`.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Advance the task one tick and return the resulting status.
    pub fn tick(&mut self, task: &mut dyn ActionTask, cx: &mut ExecContext<'_>) -> Status {
        if !self.enabled {
            return Status::Optional;
        }
        if self.status.is_terminal() || self.paused {
            return self.status;
        }
        let scope = cx.enter_scope(task.label());
        if self.status == Status::Resting {
            self.status = Status::Running;
            self.elapsed = 0.0;
            task.on_execute(cx);
        } else {
            task.on_update(cx);
        }
        self.elapsed += cx.dt;
        let outcome = cx.take_pending();
        if cx.take_errored() {
            task.on_stop(cx, true);
            self.status = Status::Error;
        } else if let Some(outcome) = outcome {
            task.on_stop(cx, outcome == Outcome::Cancelled);
            self.status = match outcome {
                Outcome::Success => Status::Success,
                Outcome::Failure => Status::Failure,
                Outcome::Cancelled => {
                    self.elapsed = 0.0;
                    Status::Resting
                }
            };
        }
        cx.restore_scope(scope);
        self.status
    }

    /// Rewind to `Resting`, interrupting the task if it was mid-run.
    pub fn rewind(&mut self, task: &mut dyn ActionTask, cx: &mut ExecContext<'_>) {
        if self.status == Status::Running {
            let scope = cx.enter_scope(task.label());
            task.on_stop(cx, true);
            cx.restore_scope(scope);
        }
        self.status = Status::Resting;
        self.paused = false;
        self.elapsed = 0.0;
    }

    pub fn pause(&mut self, task: &mut dyn ActionTask, cx: &mut ExecContext<'_>) {
        if self.status == Status::Running && !self.paused {
            self.paused = true;
            task.on_pause(cx);
        }
    }

    pub fn resume(&mut self, task: &mut dyn ActionTask, cx: &mut ExecContext<'_>) {
        if self.paused {
            self.paused = false;
            task.on_resume(cx);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Condition Slot
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime chassis around one condition task.
///
/// Applies the enable and invert switches and holds the sticky latch a task
/// pins through [`ExecContext::latch_result`]. A latched value answers
/// checks without re-invoking the task until it expires one tick later.
#[derive(Debug, Clone)]
pub struct ConditionSlot {
    pub enabled: bool,
    /// Flip the result after latching.
    pub invert: bool,
    latch: Option<(bool, u64)>,
}

impl Default for ConditionSlot {
    fn default() -> Self {
        Self {
            enabled: true,
            invert: false,
            latch: None,
        }
    }
}

impl ConditionSlot {
    /// Evaluate the condition for this tick.
    pub fn check(&mut self, task: &mut dyn ConditionTask, cx: &mut ExecContext<'_>) -> bool {
        if !self.enabled {
            return true;
        }
        if let Some((value, expires)) = self.latch {
            if cx.tick <= expires {
                return value != self.invert;
            }
            self.latch = None;
        }
        let scope = cx.enter_scope(task.label());
        let raw = task.on_check(cx);
        let pinned = cx.take_latch();
        cx.restore_scope(scope);
        let value = match pinned {
            Some(latched) => {
                // Valid through the following tick.
                self.latch = Some((latched, cx.tick + 1));
                latched
            }
            None => raw,
        };
        value != self.invert
    }

    pub fn clear_latch(&mut self) {
        self.latch = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
