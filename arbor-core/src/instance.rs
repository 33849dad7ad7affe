//! Running statechart instances.

use crate::chart::{Chart, Node, StateId};
use crate::context::Context;
use crate::engine::{self, EngineConfig, FireResult, QUERY_PREFIX};
use crate::error::CoreError;
use crate::model::Transition;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Lifecycle phase of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Uninitialized,
    /// Copying the template and picking the initial state.
    Initializing,
    /// Running entry and exit actions along a walk.
    Entering,
    /// Firing automatic transitions.
    Draining,
    /// Accepting events.
    Ready,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Uninitialized => "uninitialized",
            Phase::Initializing => "initializing",
            Phase::Entering => "entering",
            Phase::Draining => "draining",
            Phase::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// An operation named on the dynamic surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Fire the named event.
    Fire(String),
    /// Ask whether the named state is active.
    Query(String),
}

/// Outcome of [`Instance::invoke`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Fired(FireResult),
    Active(bool),
}

/// A running statechart with its own copy of the chart and its context.
pub struct Instance<C> {
    chart: Chart<C>,
    current: StateId,
    ctx: C,
    config: EngineConfig,
    phase: Phase,
}

impl<C: Context> Instance<C> {
    /// Creates an instance in the chart's initial state.
    pub fn new(template: &Chart<C>, ctx: C) -> Result<Self, CoreError> {
        Self::construct(template, ctx, None, EngineConfig::default())
    }

    /// Creates an instance, optionally overriding the initial state.
    ///
    /// The initial state is the override if given, else the root's declared
    /// `initial`, else the root's first substate. Entry actions run from the
    /// root down to it and automatic transitions are drained before the
    /// instance is returned.
    pub fn construct(
        template: &Chart<C>,
        ctx: C,
        initial: Option<&str>,
        config: EngineConfig,
    ) -> Result<Self, CoreError> {
        let mut instance = Self {
            chart: template.clone(),
            current: template.root(),
            ctx,
            config,
            phase: Phase::Initializing,
        };

        let root = instance.chart.root_node();
        instance.current = match initial.or(root.initial()) {
            Some(path) => instance.chart.get_state(path)?,
            None => *root.children().first().ok_or_else(|| {
                CoreError::config("an initial state must exist for the chart")
            })?,
        };

        instance.phase = Phase::Entering;
        engine::enter_lineage(&instance.chart, instance.current, &mut instance.ctx)?;

        instance.phase = Phase::Draining;
        engine::drain(
            &instance.chart,
            &mut instance.current,
            &mut instance.ctx,
            &instance.config,
        )?;

        instance.phase = Phase::Ready;
        tracing::info!(
            "initialized statechart '{}' in '{}'",
            instance.chart.root_node().name(),
            instance.current_path()
        );
        Ok(instance)
    }

    /// Fires `event` with `args`.
    ///
    /// All guards are evaluated before any state changes, so a rejected event
    /// (no match, no passing guard, or more than one) leaves the instance
    /// where it was. Automatic transitions only fire on their own, so the
    /// empty event never matches.
    pub fn fire_event(&mut self, event: &str, args: &[Value]) -> Result<FireResult, CoreError> {
        if self.phase != Phase::Ready {
            return Err(CoreError::NotReady {
                phase: self.phase.to_string(),
            });
        }
        if event.is_empty() {
            return Err(CoreError::NoMatchingTransition {
                event: String::new(),
                state: self.current_path(),
            });
        }
        let from = self.current_path();
        let result = self.step(event, args);
        self.phase = Phase::Ready;
        let auto = result?;

        let to = self.current_path();
        tracing::info!("processed event '{}': '{}' -> '{}'", event, from, to);
        Ok(FireResult {
            event: event.to_string(),
            from,
            to,
            auto,
        })
    }

    fn step(&mut self, event: &str, args: &[Value]) -> Result<usize, CoreError> {
        let selection = engine::select(&self.chart, self.current, &self.ctx, event, args)?;

        self.phase = Phase::Entering;
        engine::execute(
            &self.chart,
            &mut self.current,
            &mut self.ctx,
            selection.transition,
            args,
        )?;

        self.phase = Phase::Draining;
        engine::drain(&self.chart, &mut self.current, &mut self.ctx, &self.config)
    }

    /// Resolves a dynamic operation name.
    ///
    /// `is_<state>` queries a state declared in the chart; any other name must
    /// be an event reachable from the active chain.
    pub fn operation(&self, name: &str) -> Result<Operation, CoreError> {
        if let Some(state) = name.strip_prefix(QUERY_PREFIX) {
            if self.chart.has_state_named(state) {
                return Ok(Operation::Query(state.to_string()));
            }
        }
        if !name.is_empty() && self.transitions_for(name).next().is_some() {
            return Ok(Operation::Fire(name.to_string()));
        }
        Err(CoreError::UnknownOperation {
            name: name.to_string(),
        })
    }

    /// Runs a dynamic operation by name.
    pub fn invoke(&mut self, name: &str, args: &[Value]) -> Result<Outcome, CoreError> {
        match self.operation(name)? {
            Operation::Fire(event) => self.fire_event(&event, args).map(Outcome::Fired),
            Operation::Query(state) => self.is_active(&state).map(Outcome::Active),
        }
    }

    /// Evaluates guards for `event` without changing anything. Returns the
    /// target of the transition that would fire.
    pub fn can_fire(&self, event: &str, args: &[Value]) -> Result<&str, CoreError> {
        engine::select(&self.chart, self.current, &self.ctx, event, args)
            .map(|selection| selection.transition.target())
    }
}

impl<C> Instance<C> {
    pub fn chart(&self) -> &Chart<C> {
        &self.chart
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &C {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    pub fn into_context(self) -> C {
        self.ctx
    }

    /// The current state.
    pub fn state(&self) -> &Node<C> {
        self.chart.node(self.current)
    }

    pub fn state_id(&self) -> StateId {
        self.current
    }

    /// Dotted path of the current state.
    pub fn current_path(&self) -> String {
        self.chart.path_of(self.current)
    }

    /// Parent of the current state, or the root when it has none.
    pub fn superstate(&self) -> &Node<C> {
        let id = self.state().parent().unwrap_or(self.chart.root());
        self.chart.node(id)
    }

    /// The current state and its siblings, in declaration order.
    pub fn states(&self) -> impl Iterator<Item = &Node<C>> {
        self.superstate()
            .children()
            .iter()
            .map(move |&id| self.chart.node(id))
    }

    /// Active chain, current state first and root last.
    pub fn active(&self) -> impl Iterator<Item = &Node<C>> {
        self.chart.ancestors(self.current).map(move |id| self.chart.node(id))
    }

    /// Returns whether a state named `name` is on the active chain.
    pub fn is_active(&self, name: &str) -> Result<bool, CoreError> {
        if !self.chart.has_state_named(name) {
            return Err(CoreError::UnknownOperation {
                name: format!("{QUERY_PREFIX}{name}"),
            });
        }
        Ok(self.active().any(|node| node.name() == name))
    }

    /// Transitions on the active chain, innermost state first.
    pub fn transitions(&self) -> impl Iterator<Item = &Transition<C>> {
        self.active().flat_map(|node| node.transitions().iter())
    }

    /// Transitions on the active chain for `event`, innermost state first.
    pub fn transitions_for<'a>(&'a self, event: &'a str) -> impl Iterator<Item = &'a Transition<C>> + 'a {
        self.active().flat_map(move |node| node.transitions_for(event))
    }

    /// Named events reachable from the active chain.
    pub fn available_events(&self) -> BTreeSet<String> {
        self.transitions()
            .filter(|t| !t.is_automatic())
            .map(|t| t.event().to_string())
            .collect()
    }

    /// Looks up a state; relative paths start from the current state.
    pub fn get_state(&self, path: &str) -> Result<&Node<C>, CoreError> {
        let id = self.chart.resolve(path, self.current)?;
        Ok(self.chart.node(id))
    }

    /// Relative path from the current state to `target`.
    pub fn get_relpath(&self, target: &str) -> Result<String, CoreError> {
        let id = self.chart.resolve(target, self.current)?;
        Ok(self.chart.relpath(id, self.current)?.to_string())
    }
}

impl<C: fmt::Debug> fmt::Debug for Instance<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("state", &self.current_path())
            .field("phase", &self.phase)
            .field("ctx", &self.ctx)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, State};
    use serde_json::json;

    fn switch() -> Chart<()> {
        Chart::from_json(&json!({
            "initial": "idle",
            "states": [
                {"name": "idle", "transitions": [{"event": "start", "target": "running"}]},
                {"name": "running", "transitions": [{"event": "stop", "target": "idle"}]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_start_stop_scenario() {
        let mut instance = Instance::new(&switch(), ()).unwrap();
        assert_eq!(instance.current_path(), "idle");
        assert_eq!(instance.phase(), Phase::Ready);

        let result = instance.fire_event("start", &[]).unwrap();
        assert_eq!(result.from, "idle");
        assert_eq!(result.to, "running");
        assert_eq!(instance.current_path(), "running");

        instance.fire_event("stop", &[]).unwrap();
        assert_eq!(instance.current_path(), "idle");

        let err = instance.fire_event("stop", &[]).unwrap_err();
        assert!(matches!(err, CoreError::NoMatchingTransition { .. }));
        assert_eq!(instance.current_path(), "idle");
        assert_eq!(instance.phase(), Phase::Ready);
    }

    #[test]
    fn test_initial_selection() {
        let chart = Chart::<()>::from_json(&json!({"states": ["a", "b", "c"]})).unwrap();
        assert_eq!(Instance::new(&chart, ()).unwrap().current_path(), "a");

        let chart = Chart::<()>::from_json(&json!({"initial": "b", "states": ["a", "b", "c"]}))
            .unwrap();
        assert_eq!(Instance::new(&chart, ()).unwrap().current_path(), "b");

        let instance =
            Instance::construct(&chart, (), Some("c"), EngineConfig::default()).unwrap();
        assert_eq!(instance.current_path(), "c");

        let err = Instance::construct(&chart, (), Some("z"), EngineConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::StateNotFound { .. }));
    }

    #[test]
    fn test_chart_without_states_has_no_initial() {
        let chart = Chart::<()>::new(State::new("lonely")).unwrap();
        let err = Instance::new(&chart, ()).unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
    }

    #[test]
    fn test_entry_actions_run_root_to_leaf() {
        let record = |label: &'static str| {
            Action::new(move |ctx: &mut Vec<String>, _: &[Value]| {
                ctx.push(label.to_string());
                Ok(())
            })
        };
        let root = State::new("root")
            .on_entry(record("root"))
            .substate(
                State::new("outer")
                    .on_entry(record("outer"))
                    .substate(State::new("inner").on_entry(record("inner")))
                    .substate(State::new("other")),
            )
            .substate(State::new("elsewhere"));
        let chart = Chart::new(root).unwrap();

        impl Context for Vec<String> {}

        let instance =
            Instance::construct(&chart, Vec::new(), Some("inner"), EngineConfig::default())
                .unwrap();
        assert_eq!(instance.context(), &vec!["root", "outer", "inner"]);
    }

    #[test]
    fn test_guard_not_satisfied_leaves_state() {
        let chart = Chart::<Value>::from_json(&json!({
            "states": [
                {"name": "locked", "transitions": [
                    {"event": "open", "target": "unlocked", "guard": "has_key"}
                ]},
                "unlocked"
            ]
        }))
        .unwrap();

        let mut instance = Instance::new(&chart, json!({"has_key": false})).unwrap();
        let err = instance.fire_event("open", &[]).unwrap_err();
        assert!(matches!(err, CoreError::GuardNotSatisfied { .. }));
        assert_eq!(instance.current_path(), "locked");

        instance.context_mut()["has_key"] = json!(true);
        instance.fire_event("open", &[]).unwrap();
        assert_eq!(instance.current_path(), "unlocked");
    }

    #[test]
    fn test_ambiguous_transition_leaves_state() {
        let chart = Chart::<()>::from_json(&json!({
            "states": [
                {"name": "fork", "transitions": [
                    {"event": "go", "target": "left", "guard": true},
                    {"event": "go", "target": "right", "guard": true}
                ]},
                "left",
                "right"
            ]
        }))
        .unwrap();

        let mut instance = Instance::new(&chart, ()).unwrap();
        let err = instance.fire_event("go", &[]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::AmbiguousTransition { count: 2, .. }
        ));
        assert_eq!(instance.current_path(), "fork");
    }

    struct Counter(usize);

    impl Context for Counter {
        fn action(&mut self, name: &str, _: &[Value]) -> Option<Result<(), crate::CallbackError>> {
            (name == "count").then(|| {
                self.0 += 1;
                Ok(())
            })
        }
    }

    #[test]
    fn test_automatic_transition_drains_once() {
        let chart: Chart<Counter> = Chart::from_json(&json!({
            "states": [
                {"name": "idle", "transitions": [{"event": "go", "target": "checking"}]},
                {"name": "checking", "transitions": [{"event": "", "target": "done"}]},
                {"name": "done", "on_entry": "count"}
            ]
        }))
        .unwrap();

        let mut instance = Instance::new(&chart, Counter(0)).unwrap();
        let result = instance.fire_event("go", &[]).unwrap();
        assert_eq!(result.to, "done");
        assert_eq!(result.auto, 1);
        assert_eq!(instance.context().0, 1);
    }

    #[test]
    fn test_automatic_transition_at_construction() {
        let chart = Chart::<()>::from_json(&json!({
            "states": [
                {"name": "boot", "transitions": [{"event": "", "target": "ready"}]},
                "ready"
            ]
        }))
        .unwrap();
        let instance = Instance::new(&chart, ()).unwrap();
        assert_eq!(instance.current_path(), "ready");
    }

    #[test]
    fn test_empty_event_is_rejected() {
        let chart = Chart::<()>::from_json(&json!({
            "states": [
                {"name": "waiting", "transitions": [
                    {"event": "", "target": "done", "guard": false}
                ]},
                "done"
            ]
        }))
        .unwrap();
        let mut instance = Instance::new(&chart, ()).unwrap();
        assert_eq!(instance.current_path(), "waiting");

        let err = instance.fire_event("", &[]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::NoMatchingTransition { ref event, .. } if event.is_empty()
        ));
        assert_eq!(instance.current_path(), "waiting");
        assert!(instance.can_fire("", &[]).is_err());
    }

    #[test]
    fn test_state_query_guards_toggle() {
        let chart = Chart::<Value>::from_json(&json!({
            "name": "player",
            "initial": "stopped",
            "states": [
                {"name": "stopped", "transitions": [{"event": "play", "target": "active.playing"}]},
                {
                    "name": "active",
                    "states": ["playing", "paused"],
                    "transitions": [
                        {"event": "stop", "target": "stopped"},
                        {"event": "toggle", "target": "paused", "guard": "is_playing"},
                        {"event": "toggle", "target": "playing", "guard": "is_paused"}
                    ]
                }
            ]
        }))
        .unwrap();

        let mut instance = Instance::new(&chart, json!({})).unwrap();
        instance.fire_event("play", &[]).unwrap();
        assert_eq!(instance.current_path(), "active.playing");

        assert_eq!(instance.fire_event("toggle", &[]).unwrap().to, "active.paused");
        assert_eq!(instance.fire_event("toggle", &[]).unwrap().to, "active.playing");

        instance.fire_event("stop", &[]).unwrap();
        let err = instance.fire_event("toggle", &[]).unwrap_err();
        assert!(matches!(err, CoreError::NoMatchingTransition { .. }));
    }

    #[test]
    fn test_unresolved_method_is_reported() {
        let chart = Chart::<()>::from_json(&json!({
            "states": [
                {"name": "a", "transitions": [{"event": "go", "target": "b", "action": "missing"}]},
                "b"
            ]
        }))
        .unwrap();
        let mut instance = Instance::new(&chart, ()).unwrap();
        let err = instance.fire_event("go", &[]).unwrap_err();
        assert!(matches!(err, CoreError::UnresolvedMethod { ref name } if name == "missing"));
        assert_eq!(instance.phase(), Phase::Ready);
    }

    #[test]
    fn test_instances_are_independent() {
        let chart = switch();
        let mut first = Instance::new(&chart, ()).unwrap();
        let second = Instance::new(&chart, ()).unwrap();

        first.fire_event("start", &[]).unwrap();
        assert_eq!(first.current_path(), "running");
        assert_eq!(second.current_path(), "idle");
    }

    #[test]
    fn test_dynamic_operations() {
        let mut instance = Instance::new(&switch(), ()).unwrap();

        assert_eq!(instance.invoke("is_idle", &[]).unwrap(), Outcome::Active(true));
        assert_eq!(instance.invoke("is_running", &[]).unwrap(), Outcome::Active(false));

        match instance.invoke("start", &[]).unwrap() {
            Outcome::Fired(result) => assert_eq!(result.to, "running"),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(instance.invoke("is_running", &[]).unwrap(), Outcome::Active(true));

        // not reachable from 'running'
        let err = instance.invoke("start", &[]).unwrap_err();
        assert!(matches!(err, CoreError::UnknownOperation { .. }));
        let err = instance.invoke("is_flying", &[]).unwrap_err();
        assert!(matches!(err, CoreError::UnknownOperation { .. }));
        assert!(instance.is_active("flying").is_err());
    }

    fn nested() -> Chart<()> {
        Chart::from_json(&json!({
            "initial": "on.playing",
            "states": [
                {"name": "on", "states": [
                    {"name": "playing", "transitions": [
                        {"event": "pause", "target": "..paused"},
                        {"event": "dive", "target": ".deeper"}
                    ]},
                    {"name": "paused", "transitions": [{"event": "play", "target": "..playing"}]}
                ], "transitions": [{"event": "off", "target": "off"}]},
                {"name": "off", "transitions": [{"event": "on", "target": "on.playing"}]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_nested_queries() {
        let mut instance = Instance::new(&nested(), ()).unwrap();
        assert_eq!(instance.current_path(), "on.playing");
        assert!(instance.is_active("on").unwrap());
        assert!(instance.is_active("root").unwrap());
        assert!(!instance.is_active("off").unwrap());

        let active: Vec<&str> = instance.active().map(|n| n.name()).collect();
        assert_eq!(active, ["playing", "on", "root"]);
        assert_eq!(instance.superstate().name(), "on");
        let siblings: Vec<&str> = instance.states().map(|n| n.name()).collect();
        assert_eq!(siblings, ["playing", "paused"]);

        let events: Vec<String> = instance.available_events().into_iter().collect();
        assert_eq!(events, ["dive", "off", "pause"]);
        assert_eq!(instance.transitions().count(), 3);

        instance.fire_event("off", &[]).unwrap();
        assert_eq!(instance.current_path(), "off");
        assert_eq!(instance.superstate().name(), "root");
    }

    #[test]
    fn test_relative_targets() {
        let mut instance = Instance::new(&nested(), ()).unwrap();
        assert_eq!(instance.can_fire("pause", &[]).unwrap(), "..paused");

        // '.deeper' names a child of 'playing', which has none
        let err = instance.fire_event("dive", &[]).unwrap_err();
        assert!(matches!(err, CoreError::StateNotFound { .. }));
        assert_eq!(instance.current_path(), "on.playing");

        instance.fire_event("pause", &[]).unwrap();
        assert_eq!(instance.current_path(), "on.paused");
        instance.fire_event("play", &[]).unwrap();
        assert_eq!(instance.current_path(), "on.playing");

        assert_eq!(instance.get_relpath("on.paused").unwrap(), "..paused");
        assert_eq!(instance.get_state("..paused").unwrap().name(), "paused");
        assert_eq!(instance.get_relpath("on.playing").unwrap(), ".");
    }

    #[test]
    fn test_current_path_resolves_to_current_state() {
        let mut instance = Instance::new(&nested(), ()).unwrap();
        for event in ["off", "on"] {
            instance.fire_event(event, &[]).unwrap();
            let path = instance.current_path();
            assert_eq!(instance.get_state(&path).unwrap().id(), instance.state_id());
        }
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Ready.to_string(), "ready");
        assert_eq!(Phase::default(), Phase::Uninitialized);
    }
}
