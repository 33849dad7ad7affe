//! Declarative chart records and the functions that build states from them.
//!
//! Charts use a nested JSON (or YAML) DSL:
//!
//! ```json
//! {
//!   "name": "player",
//!   "initial": "stopped",
//!   "states": [
//!     "stopped",
//!     {
//!       "name": "active",
//!       "states": ["playing", "paused"],
//!       "transitions": [{"event": "stop", "target": "stopped", "action": "rewind"}]
//!     }
//!   ],
//!   "transitions": [{"event": "play", "target": "active.playing", "guard": "has_media"}]
//! }
//! ```
//!
//! Every record may be replaced by an already-built value: see [`StateDef`],
//! [`TransitionDef`], [`GuardDef`] and [`ActionDef`].

use crate::error::CoreError;
use crate::model::{Action, Guard, State, StateKind, Transition};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Name given to a root record that does not declare one.
pub const DEFAULT_ROOT_NAME: &str = "root";

/// Raw state record as written in a chart file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Initial substate path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<StateKind>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<StateEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<TransitionRecord>,

    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub on_entry: Vec<ContentRecord>,

    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub on_exit: Vec<ContentRecord>,
}

/// A nested state: a bare name or a full record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateEntry {
    Name(String),
    Record(StateRecord),
}

/// Raw transition record.
///
/// `event` and `target` are optional here so that a missing key is reported
/// as a configuration error by [`create_transition`] rather than as a parse
/// failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(
        default,
        alias = "cond",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub guard: Vec<ContentRecord>,

    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub action: Vec<ContentRecord>,
}

/// Raw guard or action content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentRecord {
    /// Literal guard outcome.
    Flag(bool),
    /// Method name resolved on the instance context.
    Name(String),
    /// Anything else; only `{"condition": ..}` and `{"content": ..}` are valid.
    Other(Value),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    })
}

/// Source for a state: a bare name, a record, or a built node.
pub enum StateDef<C> {
    Name(String),
    Record(StateRecord),
    Node(State<C>),
}

impl<C> From<&str> for StateDef<C> {
    fn from(name: &str) -> Self {
        StateDef::Name(name.to_string())
    }
}

impl<C> From<String> for StateDef<C> {
    fn from(name: String) -> Self {
        StateDef::Name(name)
    }
}

impl<C> From<StateRecord> for StateDef<C> {
    fn from(record: StateRecord) -> Self {
        StateDef::Record(record)
    }
}

impl<C> From<StateEntry> for StateDef<C> {
    fn from(entry: StateEntry) -> Self {
        match entry {
            StateEntry::Name(name) => StateDef::Name(name),
            StateEntry::Record(record) => StateDef::Record(record),
        }
    }
}

impl<C> From<State<C>> for StateDef<C> {
    fn from(state: State<C>) -> Self {
        StateDef::Node(state)
    }
}

/// Source for a transition: a record or a built transition.
pub enum TransitionDef<C> {
    Record(TransitionRecord),
    Node(Transition<C>),
}

impl<C> From<TransitionRecord> for TransitionDef<C> {
    fn from(record: TransitionRecord) -> Self {
        TransitionDef::Record(record)
    }
}

impl<C> From<Transition<C>> for TransitionDef<C> {
    fn from(transition: Transition<C>) -> Self {
        TransitionDef::Node(transition)
    }
}

/// Source for a guard: raw content or a built guard.
pub enum GuardDef<C> {
    Record(ContentRecord),
    Node(Guard<C>),
}

impl<C> From<bool> for GuardDef<C> {
    fn from(value: bool) -> Self {
        GuardDef::Record(ContentRecord::Flag(value))
    }
}

impl<C> From<&str> for GuardDef<C> {
    fn from(name: &str) -> Self {
        GuardDef::Record(ContentRecord::Name(name.to_string()))
    }
}

impl<C> From<ContentRecord> for GuardDef<C> {
    fn from(record: ContentRecord) -> Self {
        GuardDef::Record(record)
    }
}

impl<C> From<Guard<C>> for GuardDef<C> {
    fn from(guard: Guard<C>) -> Self {
        GuardDef::Node(guard)
    }
}

/// Source for an action: raw content or a built action.
pub enum ActionDef<C> {
    Record(ContentRecord),
    Node(Action<C>),
}

impl<C> From<&str> for ActionDef<C> {
    fn from(name: &str) -> Self {
        ActionDef::Record(ContentRecord::Name(name.to_string()))
    }
}

impl<C> From<ContentRecord> for ActionDef<C> {
    fn from(record: ContentRecord) -> Self {
        ActionDef::Record(record)
    }
}

impl<C> From<Action<C>> for ActionDef<C> {
    fn from(action: Action<C>) -> Self {
        ActionDef::Node(action)
    }
}

/// Builds a guard from a literal, a method name, or a built guard.
pub fn create_guard<C>(def: impl Into<GuardDef<C>>) -> Result<Guard<C>, CoreError> {
    match def.into() {
        GuardDef::Node(guard) => Ok(guard),
        GuardDef::Record(ContentRecord::Flag(value)) => Ok(Guard::literal(value)),
        GuardDef::Record(ContentRecord::Name(name)) => Ok(Guard::method(name)),
        GuardDef::Record(ContentRecord::Other(value)) => match keyed(&value, "condition") {
            Some(Value::Bool(b)) => Ok(Guard::literal(*b)),
            Some(Value::String(name)) => Ok(Guard::method(name.clone())),
            _ => Err(CoreError::config(format!(
                "could not find a valid configuration for guard: {value}"
            ))),
        },
    }
}

/// Builds an action from a method name or a built action.
pub fn create_action<C>(def: impl Into<ActionDef<C>>) -> Result<Action<C>, CoreError> {
    match def.into() {
        ActionDef::Node(action) => Ok(action),
        ActionDef::Record(ContentRecord::Name(name)) => Ok(Action::method(name)),
        ActionDef::Record(ContentRecord::Other(value)) => match keyed(&value, "content") {
            Some(Value::String(name)) => Ok(Action::method(name.clone())),
            _ => Err(CoreError::config(format!(
                "could not find a valid configuration for action: {value}"
            ))),
        },
        ActionDef::Record(ContentRecord::Flag(value)) => Err(CoreError::config(format!(
            "could not find a valid configuration for action: {value}"
        ))),
    }
}

/// Returns the value of `key` if `value` is an object with exactly that key.
fn keyed<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get(key),
        _ => None,
    }
}

/// Builds a transition. Records must carry both `event` and `target`; an
/// empty event declares an automatic transition.
pub fn create_transition<C>(def: impl Into<TransitionDef<C>>) -> Result<Transition<C>, CoreError> {
    let record = match def.into() {
        TransitionDef::Node(transition) => return Ok(transition),
        TransitionDef::Record(record) => record,
    };

    let event = record
        .event
        .ok_or_else(|| CoreError::config("transition is missing 'event'"))?;
    let target = record
        .target
        .ok_or_else(|| CoreError::config(format!("transition '{event}' is missing 'target'")))?;

    let mut transition = Transition::new(event, target);
    for guard in record.guard {
        transition = transition.guard(create_guard(guard)?);
    }
    for action in record.action {
        transition = transition.action(create_action(action)?);
    }
    Ok(transition)
}

/// Builds and validates a state from a name, a record, or a built node.
///
/// Built nodes are validated along with their whole subtree. Records are
/// validated as their substates are created.
pub fn create_state<C>(def: impl Into<StateDef<C>>) -> Result<State<C>, CoreError> {
    match def.into() {
        StateDef::Name(name) => {
            let state = State::new(name);
            validate_state(&state)?;
            Ok(state)
        }
        StateDef::Record(record) => {
            let name = record
                .name
                .clone()
                .ok_or_else(|| CoreError::config("state is missing 'name'"))?;
            build_record(name, record)
        }
        StateDef::Node(state) => {
            validate_tree(&state)?;
            Ok(state)
        }
    }
}

/// Builds the root state of a chart; the root name defaults to `root`.
pub fn create_root<C>(record: StateRecord) -> Result<State<C>, CoreError> {
    let name = record
        .name
        .clone()
        .unwrap_or_else(|| DEFAULT_ROOT_NAME.to_string());
    build_record(name, record)
}

fn build_record<C>(name: String, record: StateRecord) -> Result<State<C>, CoreError> {
    let mut state = State::new(name);
    state.kind = record.kind;
    state.initial = record.initial;
    for entry in record.states {
        state.states.push(create_state(entry)?);
    }
    for transition in record.transitions {
        state.transitions.push(create_transition(transition)?);
    }
    for action in record.on_entry {
        state.on_entry.push(create_action(action)?);
    }
    for action in record.on_exit {
        state.on_exit.push(create_action(action)?);
    }
    validate_state(&state)?;
    Ok(state)
}

/// Returns true if the name matches `[A-Za-z0-9_]+`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Checks one state against its direct substates.
pub(crate) fn validate_state<C>(state: &State<C>) -> Result<(), CoreError> {
    if !is_valid_name(&state.name) {
        return Err(CoreError::config(format!(
            "state name contains invalid characters: '{}'",
            state.name
        )));
    }

    match (state.kind, state.states.len()) {
        (Some(StateKind::Atomic | StateKind::Final), n) if n > 0 => {
            return Err(CoreError::config(format!(
                "{} state '{}' cannot have substates",
                state.state_kind(),
                state.name
            )));
        }
        (Some(StateKind::Compound), n) | (None, n @ 1) if n < 2 => {
            return Err(CoreError::config(format!(
                "compound state '{}' must have at least two substates",
                state.name
            )));
        }
        _ => {}
    }

    let mut seen = HashSet::new();
    for substate in &state.states {
        if !seen.insert(substate.name.as_str()) {
            return Err(CoreError::config(format!(
                "duplicate substate '{}' in state '{}'",
                substate.name, state.name
            )));
        }
    }

    if state.state_kind() == StateKind::Final && !state.on_exit.is_empty() {
        tracing::warn!(
            "final state '{}' declares exit actions that will never run",
            state.name
        );
    }

    Ok(())
}

pub(crate) fn validate_tree<C>(state: &State<C>) -> Result<(), CoreError> {
    validate_state(state)?;
    state.states.iter().try_for_each(validate_tree)
}
