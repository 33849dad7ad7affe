//! State, transition, guard and action value types.
//!
//! These are the building blocks of a chart before it is indexed. A [`State`]
//! owns its substates directly; [`Chart`](crate::Chart) flattens the tree into
//! an arena once it has been validated.

use crate::context::Context;
use crate::error::{CallbackError, CoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type Predicate<C> = dyn Fn(&C, &[Value]) -> Result<bool, CallbackError> + Send + Sync;
type Procedure<C> = dyn Fn(&mut C, &[Value]) -> Result<(), CallbackError> + Send + Sync;

/// Kind of a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    /// Leaf state.
    Atomic,
    /// State with substates.
    Compound,
    /// Leaf state marking completion.
    Final,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StateKind::Atomic => "atomic",
            StateKind::Compound => "compound",
            StateKind::Final => "final",
        };
        f.write_str(s)
    }
}

/// Condition source of a guard.
pub enum Condition<C> {
    /// Direct predicate.
    Predicate(Arc<Predicate<C>>),
    /// Guard looked up on the instance context by name.
    Method(String),
    /// Constant outcome.
    Literal(bool),
}

/// Boolean gate on a transition.
pub struct Guard<C> {
    condition: Condition<C>,
}

impl<C> Guard<C> {
    /// Creates a guard from an infallible predicate.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&C, &[Value]) -> bool + Send + Sync + 'static,
    {
        Self::try_new(move |ctx: &C, args: &[Value]| Ok(f(ctx, args)))
    }

    /// Creates a guard from a predicate that may fail.
    pub fn try_new<F>(f: F) -> Self
    where
        F: Fn(&C, &[Value]) -> Result<bool, CallbackError> + Send + Sync + 'static,
    {
        Self {
            condition: Condition::Predicate(Arc::new(f)),
        }
    }

    /// Creates a guard resolved on the instance context by name.
    pub fn method(name: impl Into<String>) -> Self {
        Self {
            condition: Condition::Method(name.into()),
        }
    }

    /// Creates a guard with a fixed outcome.
    pub fn literal(value: bool) -> Self {
        Self {
            condition: Condition::Literal(value),
        }
    }

    pub fn condition(&self) -> &Condition<C> {
        &self.condition
    }
}

impl<C: Context> Guard<C> {
    /// Evaluates the guard against the context and event arguments.
    pub fn evaluate(&self, ctx: &C, args: &[Value]) -> Result<bool, CoreError> {
        match &self.condition {
            Condition::Predicate(f) => f(ctx, args).map_err(CoreError::Callback),
            Condition::Method(name) => match ctx.guard(name, args) {
                Some(result) => result.map_err(CoreError::Callback),
                None => Err(CoreError::UnresolvedMethod { name: name.clone() }),
            },
            Condition::Literal(value) => Ok(*value),
        }
    }
}

impl<C> Clone for Guard<C> {
    fn clone(&self) -> Self {
        let condition = match &self.condition {
            Condition::Predicate(f) => Condition::Predicate(Arc::clone(f)),
            Condition::Method(name) => Condition::Method(name.clone()),
            Condition::Literal(value) => Condition::Literal(*value),
        };
        Self { condition }
    }
}

impl<C> fmt::Debug for Guard<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.condition {
            Condition::Predicate(_) => f.write_str("Guard(<predicate>)"),
            Condition::Method(name) => write!(f, "Guard({name})"),
            Condition::Literal(value) => write!(f, "Guard({value})"),
        }
    }
}

/// Executable content of an action.
pub enum Content<C> {
    /// Direct procedure.
    Procedure(Arc<Procedure<C>>),
    /// Action looked up on the instance context by name.
    Method(String),
}

/// Side effect run on entry, on exit, or as part of a transition.
pub struct Action<C> {
    content: Content<C>,
}

impl<C> Action<C> {
    /// Creates an action from a procedure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut C, &[Value]) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        Self {
            content: Content::Procedure(Arc::new(f)),
        }
    }

    /// Creates an action resolved on the instance context by name.
    pub fn method(name: impl Into<String>) -> Self {
        Self {
            content: Content::Method(name.into()),
        }
    }

    pub fn content(&self) -> &Content<C> {
        &self.content
    }
}

impl<C: Context> Action<C> {
    /// Runs the action. Its result is discarded; only failures propagate.
    pub fn run(&self, ctx: &mut C, args: &[Value]) -> Result<(), CoreError> {
        match &self.content {
            Content::Procedure(f) => f(ctx, args).map_err(CoreError::Callback),
            Content::Method(name) => match ctx.action(name, args) {
                Some(result) => result.map_err(CoreError::Callback),
                None => Err(CoreError::UnresolvedMethod { name: name.clone() }),
            },
        }
    }
}

impl<C> Clone for Action<C> {
    fn clone(&self) -> Self {
        let content = match &self.content {
            Content::Procedure(f) => Content::Procedure(Arc::clone(f)),
            Content::Method(name) => Content::Method(name.clone()),
        };
        Self { content }
    }
}

impl<C> fmt::Debug for Action<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.content {
            Content::Procedure(_) => f.write_str("Action(<procedure>)"),
            Content::Method(name) => write!(f, "Action({name})"),
        }
    }
}

/// A transition out of its owning state.
pub struct Transition<C> {
    event: String,
    target: String,
    guards: Vec<Guard<C>>,
    actions: Vec<Action<C>>,
}

impl<C> Transition<C> {
    /// Creates a transition. An empty event makes it automatic.
    pub fn new(event: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            target: target.into(),
            guards: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Creates an automatic transition, fired on entry to its owner.
    pub fn automatic(target: impl Into<String>) -> Self {
        Self::new("", target)
    }

    pub fn guard(mut self, guard: Guard<C>) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn action(mut self, action: Action<C>) -> Self {
        self.actions.push(action);
        self
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn guards(&self) -> &[Guard<C>] {
        &self.guards
    }

    pub fn actions(&self) -> &[Action<C>] {
        &self.actions
    }

    pub fn is_automatic(&self) -> bool {
        self.event.is_empty()
    }
}

impl<C: Context> Transition<C> {
    /// Returns true if every guard passes. Stops at the first failing guard.
    pub fn evaluate(&self, ctx: &C, args: &[Value]) -> Result<bool, CoreError> {
        for guard in &self.guards {
            if !guard.evaluate(ctx, args)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<C> Clone for Transition<C> {
    fn clone(&self) -> Self {
        Self {
            event: self.event.clone(),
            target: self.target.clone(),
            guards: self.guards.clone(),
            actions: self.actions.clone(),
        }
    }
}

impl<C> fmt::Debug for Transition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("event", &self.event)
            .field("target", &self.target)
            .field("guards", &self.guards)
            .field("actions", &self.actions)
            .finish()
    }
}

/// A state and its subtree, before indexing.
pub struct State<C> {
    pub(crate) name: String,
    pub(crate) kind: Option<StateKind>,
    pub(crate) initial: Option<String>,
    pub(crate) states: Vec<State<C>>,
    pub(crate) transitions: Vec<Transition<C>>,
    pub(crate) on_entry: Vec<Action<C>>,
    pub(crate) on_exit: Vec<Action<C>>,
}

impl<C> State<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            initial: None,
            states: Vec::new(),
            transitions: Vec::new(),
            on_entry: Vec::new(),
            on_exit: Vec::new(),
        }
    }

    /// Declares the kind explicitly instead of inferring it from substates.
    pub fn kind(mut self, kind: StateKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn initial(mut self, path: impl Into<String>) -> Self {
        self.initial = Some(path.into());
        self
    }

    pub fn substate(mut self, state: State<C>) -> Self {
        self.states.push(state);
        self
    }

    pub fn transition(mut self, transition: Transition<C>) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn on_entry(mut self, action: Action<C>) -> Self {
        self.on_entry.push(action);
        self
    }

    pub fn on_exit(mut self, action: Action<C>) -> Self {
        self.on_exit.push(action);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared kind, or the kind implied by the substates.
    pub fn state_kind(&self) -> StateKind {
        match self.kind {
            Some(kind) => kind,
            None if self.states.is_empty() => StateKind::Atomic,
            None => StateKind::Compound,
        }
    }

    pub fn substates(&self) -> &[State<C>] {
        &self.states
    }

    pub fn transitions(&self) -> &[Transition<C>] {
        &self.transitions
    }
}

impl<C> Clone for State<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            initial: self.initial.clone(),
            states: self.states.clone(),
            transitions: self.transitions.clone(),
            on_entry: self.on_entry.clone(),
            on_exit: self.on_exit.clone(),
        }
    }
}

impl<C> fmt::Debug for State<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name)
            .field("kind", &self.state_kind())
            .field("initial", &self.initial)
            .field("states", &self.states)
            .field("transitions", &self.transitions)
            .finish()
    }
}
