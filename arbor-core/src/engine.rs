//! Transition engine - selects, walks and drains transitions.
//!
//! Firing an event is split in two halves. Selection evaluates every guard
//! before anything changes, so a rejected event leaves the instance exactly
//! as it was. Execution then walks the relative path from the current state
//! to the target, running exit actions while ascending and entry actions
//! while descending, and finally runs the transition's own actions.

use crate::chart::{Chart, StateId};
use crate::context::Context;
use crate::error::CoreError;
use crate::model::{Condition, Transition};
use crate::path::{RelPath, Step};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix of active-state queries, as in `is_running`.
pub const QUERY_PREFIX: &str = "is_";

/// Default bound on automatic transitions fired in a single drain.
pub const DEFAULT_MAX_AUTO_DEPTH: usize = 32;

/// Engine settings applied to an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum automatic transitions in one drain before failing.
    pub max_auto_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_auto_depth: DEFAULT_MAX_AUTO_DEPTH,
        }
    }
}

impl EngineConfig {
    pub fn with_max_auto_depth(mut self, depth: usize) -> Self {
        self.max_auto_depth = depth;
        self
    }
}

/// Result of firing an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireResult {
    pub event: String,
    /// Path of the state the event was fired in.
    pub from: String,
    /// Path of the state the instance settled in, after draining.
    pub to: String,
    /// Number of automatic transitions drained after the step.
    pub auto: usize,
}

/// The transition chosen for an event.
pub(crate) struct Selection<'c, C> {
    pub owner: StateId,
    pub transition: &'c Transition<C>,
}

/// Picks the single transition allowed to fire for `event`.
///
/// The active chain is searched from `leaf` outward and the first state that
/// declares any transition for the event supplies every candidate; outer
/// states are not consulted after that.
pub(crate) fn select<'c, C: Context>(
    chart: &'c Chart<C>,
    leaf: StateId,
    ctx: &C,
    event: &str,
    args: &[Value],
) -> Result<Selection<'c, C>, CoreError> {
    let state_name = || chart.path_of(leaf);

    let owner = chart
        .ancestors(leaf)
        .find(|&id| chart.node(id).has_transitions_for(event))
        .ok_or_else(|| CoreError::NoMatchingTransition {
            event: event.to_string(),
            state: state_name(),
        })?;

    let mut allowed = Vec::new();
    for transition in chart.node(owner).transitions_for(event) {
        if passes(chart, leaf, transition, ctx, args)? {
            allowed.push(transition);
        }
    }

    match allowed.len() {
        0 => Err(CoreError::GuardNotSatisfied {
            event: event.to_string(),
            state: state_name(),
        }),
        1 => {
            tracing::debug!(
                "processed guards for '{}' on state '{}'",
                event,
                chart.node(owner).name()
            );
            Ok(Selection {
                owner,
                transition: allowed[0],
            })
        }
        count => Err(CoreError::AmbiguousTransition {
            event: event.to_string(),
            state: state_name(),
            count,
        }),
    }
}

/// Evaluates a transition's guards in order, stopping at the first failure.
///
/// A method guard named `is_<state>` for a state of the chart asks whether
/// that state is on the active chain; other names go to the context.
fn passes<C: Context>(
    chart: &Chart<C>,
    leaf: StateId,
    transition: &Transition<C>,
    ctx: &C,
    args: &[Value],
) -> Result<bool, CoreError> {
    for guard in transition.guards() {
        let allowed = match guard.condition() {
            Condition::Method(name) => match is_active(chart, leaf, name) {
                Some(active) => active,
                None => guard.evaluate(ctx, args)?,
            },
            _ => guard.evaluate(ctx, args)?,
        };
        if !allowed {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Answers an `is_<state>` query, or `None` if `name` is not one.
fn is_active<C>(chart: &Chart<C>, leaf: StateId, name: &str) -> Option<bool> {
    let state = name.strip_prefix(QUERY_PREFIX)?;
    if !chart.has_state_named(state) {
        return None;
    }
    Some(chart.ancestors(leaf).any(|id| chart.node(id).name() == state))
}

/// Runs the selected transition: walk to the target, then its actions.
pub(crate) fn execute<C: Context>(
    chart: &Chart<C>,
    current: &mut StateId,
    ctx: &mut C,
    transition: &Transition<C>,
    args: &[Value],
) -> Result<(), CoreError> {
    let target = chart.resolve(transition.target(), *current)?;
    let relpath = chart.relpath(target, *current)?;
    walk(chart, current, ctx, &relpath)?;

    for action in transition.actions() {
        action.run(ctx, args)?;
    }
    if transition.actions().is_empty() {
        tracing::debug!("no actions for event '{}'", transition.event());
    } else {
        tracing::debug!("executed actions for event '{}'", transition.event());
    }
    Ok(())
}

/// Follows `relpath` step by step, updating `current` as it goes.
pub(crate) fn walk<C: Context>(
    chart: &Chart<C>,
    current: &mut StateId,
    ctx: &mut C,
    relpath: &RelPath,
) -> Result<(), CoreError> {
    if relpath.is_self() {
        run_exit(chart, *current, ctx)?;
        run_entry(chart, *current, ctx)?;
        return Ok(());
    }

    for step in relpath.steps() {
        match step {
            Step::Ascend => {
                run_exit(chart, *current, ctx)?;
                *current = chart
                    .node(*current)
                    .parent()
                    .ok_or_else(|| CoreError::StateNotFound {
                        path: relpath.to_string(),
                    })?;
            }
            Step::Descend(name) => {
                *current =
                    chart
                        .node(*current)
                        .child(name)
                        .ok_or_else(|| CoreError::StateNotFound {
                            path: relpath.to_string(),
                        })?;
                run_entry(chart, *current, ctx)?;
            }
        }
    }
    tracing::debug!("walked {} to '{}'", relpath, chart.path_of(*current));
    Ok(())
}

/// Fires automatic transitions until the current state has none left.
///
/// An automatic transition whose guards all fail does not fire and ends the
/// drain. Returns how many automatic transitions fired.
pub(crate) fn drain<C: Context>(
    chart: &Chart<C>,
    current: &mut StateId,
    ctx: &mut C,
    config: &EngineConfig,
) -> Result<usize, CoreError> {
    let mut fired = 0;
    while chart.node(*current).has_automatic() {
        let selection = match select(chart, *current, ctx, "", &[]) {
            Ok(selection) => selection,
            Err(CoreError::GuardNotSatisfied { .. }) => break,
            Err(e) => return Err(e),
        };
        if fired >= config.max_auto_depth {
            return Err(CoreError::AutoTransitionLimit {
                limit: config.max_auto_depth,
                state: chart.path_of(*current),
            });
        }
        tracing::debug!(
            "draining automatic transition from '{}' to '{}'",
            chart.node(selection.owner).name(),
            selection.transition.target()
        );
        execute(chart, current, ctx, selection.transition, &[])?;
        fired += 1;
    }
    Ok(fired)
}

/// Runs the entry actions of every state from the root down to `leaf`.
pub(crate) fn enter_lineage<C: Context>(
    chart: &Chart<C>,
    leaf: StateId,
    ctx: &mut C,
) -> Result<(), CoreError> {
    chart
        .lineage(leaf)
        .into_iter()
        .try_for_each(|id| run_entry(chart, id, ctx))
}

fn run_entry<C: Context>(chart: &Chart<C>, id: StateId, ctx: &mut C) -> Result<(), CoreError> {
    let node = chart.node(id);
    for action in node.on_entry() {
        action.run(ctx, &[])?;
    }
    if !node.on_entry().is_empty() {
        tracing::debug!("executed 'on_entry' actions for '{}'", node.name());
    }
    Ok(())
}

fn run_exit<C: Context>(chart: &Chart<C>, id: StateId, ctx: &mut C) -> Result<(), CoreError> {
    let node = chart.node(id);
    for action in node.on_exit() {
        action.run(ctx, &[])?;
    }
    if !node.on_exit().is_empty() {
        tracing::debug!("executed 'on_exit' actions for '{}'", node.name());
    }
    Ok(())
}
