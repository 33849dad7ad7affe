//! Validated, indexed state tree.
//!
//! A [`Chart`] is the template built once per machine type. States live in
//! an arena and refer to each other by [`StateId`]; each node's parent is set
//! when the arena is filled and cannot be changed afterwards. Instances take
//! their own copy of the chart with [`Clone`].

use crate::definition::{create_root, validate_tree, StateRecord};
use crate::error::CoreError;
use crate::model::{Action, State, StateKind, Transition};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Index of a state inside its chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub(crate) usize);

impl StateId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A state inside a chart.
pub struct Node<C> {
    id: StateId,
    name: String,
    kind: StateKind,
    parent: Option<StateId>,
    children: Vec<StateId>,
    child_index: HashMap<String, StateId>,
    initial: Option<String>,
    transitions: Vec<Transition<C>>,
    /// Transition positions by event label; `""` holds automatic transitions.
    by_event: HashMap<String, Vec<usize>>,
    on_entry: Vec<Action<C>>,
    on_exit: Vec<Action<C>>,
}

impl<C> Node<C> {
    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn parent(&self) -> Option<StateId> {
        self.parent
    }

    /// Substates in declaration order.
    pub fn children(&self) -> &[StateId] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<StateId> {
        self.child_index.get(name).copied()
    }

    pub fn initial(&self) -> Option<&str> {
        self.initial.as_deref()
    }

    pub fn transitions(&self) -> &[Transition<C>] {
        &self.transitions
    }

    /// Transitions declared on this state for `event`, in declaration order.
    pub fn transitions_for<'a>(&'a self, event: &str) -> impl Iterator<Item = &'a Transition<C>> + 'a {
        self.by_event
            .get(event)
            .into_iter()
            .flatten()
            .map(move |&i| &self.transitions[i])
    }

    pub fn has_transitions_for(&self, event: &str) -> bool {
        self.by_event.contains_key(event)
    }

    /// Returns true if the state declares an automatic transition.
    pub fn has_automatic(&self) -> bool {
        self.has_transitions_for("")
    }

    pub fn on_entry(&self) -> &[Action<C>] {
        &self.on_entry
    }

    pub fn on_exit(&self) -> &[Action<C>] {
        &self.on_exit
    }
}

impl<C> Clone for Node<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            parent: self.parent,
            children: self.children.clone(),
            child_index: self.child_index.clone(),
            initial: self.initial.clone(),
            transitions: self.transitions.clone(),
            by_event: self.by_event.clone(),
            on_entry: self.on_entry.clone(),
            on_exit: self.on_exit.clone(),
        }
    }
}

impl<C> fmt::Debug for Node<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("transitions", &self.transitions)
            .finish()
    }
}

/// Immutable template tree.
pub struct Chart<C> {
    nodes: Vec<Node<C>>,
    checksum: Option<String>,
}

impl<C> Chart<C> {
    /// Validates a state tree and indexes it.
    pub fn new(root: State<C>) -> Result<Self, CoreError> {
        validate_tree(&root)?;
        Self::index(root)
    }

    /// Builds a chart from a root record.
    pub fn from_record(record: StateRecord) -> Result<Self, CoreError> {
        let canonical = serde_json::to_vec(&record)
            .map_err(|e| CoreError::config(format!("could not encode chart: {e}")))?;
        // Records are validated node by node as they are created.
        let mut chart = Self::index(create_root(record)?)?;
        chart.checksum = Some(format!("{:08x}", crc32c::crc32c(&canonical)));
        Ok(chart)
    }

    /// Parses and builds a chart from JSON.
    pub fn from_json(json: &Value) -> Result<Self, CoreError> {
        let record: StateRecord = serde_json::from_value(json.clone())
            .map_err(|e| CoreError::config(format!("malformed chart: {e}")))?;
        Self::from_record(record)
    }

    fn index(root: State<C>) -> Result<Self, CoreError> {
        // `root.x` names the top-level `x`, so no top-level state may take
        // the root's name.
        if root.states.iter().any(|s| s.name == root.name) {
            return Err(CoreError::config(format!(
                "substate '{}' cannot share the name of its root",
                root.name
            )));
        }

        let mut nodes = Vec::new();
        push_node(&mut nodes, root, None);
        let chart = Self {
            nodes,
            checksum: None,
        };
        chart.check_paths()?;

        tracing::debug!(
            "built chart '{}' with {} states",
            chart.root_node().name,
            chart.nodes.len()
        );
        Ok(chart)
    }

    /// Absolute targets and declared initial states must exist.
    fn check_paths(&self) -> Result<(), CoreError> {
        for node in &self.nodes {
            if let Some(initial) = &node.initial {
                self.get_state(initial).map_err(|_| {
                    CoreError::config(format!(
                        "initial state '{}' of '{}' not found",
                        initial, node.name
                    ))
                })?;
            }
            for transition in &node.transitions {
                let target = transition.target();
                if target.is_empty() || target.starts_with('.') {
                    continue;
                }
                self.get_state(target).map_err(|_| {
                    CoreError::config(format!(
                        "transition target '{}' of state '{}' not found",
                        target, node.name
                    ))
                })?;
            }
        }
        Ok(())
    }

    pub fn root(&self) -> StateId {
        StateId(0)
    }

    pub fn root_node(&self) -> &Node<C> {
        &self.nodes[0]
    }

    /// Returns the node for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` belongs to a different chart with more states.
    pub fn node(&self, id: StateId) -> &Node<C> {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All states in depth-first pre-order, root first.
    pub fn nodes(&self) -> impl Iterator<Item = &Node<C>> {
        self.nodes.iter()
    }

    /// Names of all states in depth-first pre-order.
    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    pub fn has_state_named(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n.name == name)
    }

    /// All named events declared anywhere in the chart.
    pub fn events(&self) -> BTreeSet<&str> {
        self.nodes
            .iter()
            .flat_map(|n| n.transitions.iter())
            .filter(|t| !t.is_automatic())
            .map(|t| t.event())
            .collect()
    }

    /// CRC32C of the record the chart was built from, if any.
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }
}

/// Appends `state` and its subtree in pre-order, so ids follow declaration
/// order and the root is always id 0.
fn push_node<C>(nodes: &mut Vec<Node<C>>, state: State<C>, parent: Option<StateId>) -> StateId {
    let id = StateId(nodes.len());
    let kind = state.state_kind();

    let mut by_event: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, transition) in state.transitions.iter().enumerate() {
        by_event
            .entry(transition.event().to_string())
            .or_default()
            .push(i);
    }

    nodes.push(Node {
        id,
        name: state.name,
        kind,
        parent,
        children: Vec::new(),
        child_index: HashMap::new(),
        initial: state.initial,
        transitions: state.transitions,
        by_event,
        on_entry: state.on_entry,
        on_exit: state.on_exit,
    });

    for substate in state.states {
        let name = substate.name.clone();
        let child = push_node(nodes, substate, Some(id));
        let node = &mut nodes[id.0];
        node.children.push(child);
        node.child_index.insert(name, child);
    }
    id
}

impl<C> Clone for Chart<C> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            checksum: self.checksum.clone(),
        }
    }
}

impl<C> fmt::Debug for Chart<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chart")
            .field("nodes", &self.nodes)
            .field("checksum", &self.checksum)
            .finish()
    }
}
