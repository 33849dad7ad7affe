//! Absolute and relative state addressing.
//!
//! Absolute paths are dotted names from the root (`active.playing`); the
//! root's own name may lead the path and is skipped. A bare name searches the
//! whole tree depth-first and the first match wins.
//!
//! Relative paths start with a dot. After the leading dot each empty segment
//! ascends one level and each name descends into that substate:
//!
//! | from               | to              | relative path |
//! |--------------------|-----------------|---------------|
//! | `active.playing`   | `active.playing`| `.`           |
//! | `active.playing`   | `active.paused` | `..paused`    |
//! | `active.playing`   | `active`        | `..`          |
//! | `active.playing`   | `stopped`       | `...stopped`  |
//! | `active`           | `active.paused` | `.paused`     |
//!
//! A walk that ends by ascending carries one trailing dot so that a single
//! ascent (`..`) is not confused with the self reference (`.`).

use crate::chart::{Chart, StateId};
use crate::error::CoreError;
use std::fmt;
use std::str::FromStr;

/// One move in a relative walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Exit the current state and move to its parent.
    Ascend,
    /// Move into the named substate and enter it.
    Descend(String),
}

/// Relative path between two states. No steps means the state itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelPath {
    steps: Vec<Step>,
}

impl RelPath {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns true for the self reference `.`.
    pub fn is_self(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn ascents(&self) -> usize {
        self.steps.iter().filter(|s| **s == Step::Ascend).count()
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(".")?;
        let segments: Vec<&str> = self
            .steps
            .iter()
            .map(|s| match s {
                Step::Ascend => "",
                Step::Descend(name) => name.as_str(),
            })
            .collect();
        f.write_str(&segments.join("."))?;
        if self.steps.last() == Some(&Step::Ascend) {
            f.write_str(".")?;
        }
        Ok(())
    }
}

impl FromStr for RelPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix('.').ok_or_else(|| CoreError::StateNotFound {
            path: s.to_string(),
        })?;
        if rest.is_empty() {
            return Ok(Self::default());
        }
        let body = rest.strip_suffix('.').unwrap_or(rest);
        let mut steps = Vec::new();
        let mut descended = false;
        for segment in body.split('.') {
            if segment.is_empty() {
                // Ascents may not follow descents.
                if descended {
                    return Err(CoreError::StateNotFound {
                        path: s.to_string(),
                    });
                }
                steps.push(Step::Ascend);
            } else {
                descended = true;
                steps.push(Step::Descend(segment.to_string()));
            }
        }
        Ok(Self { steps })
    }
}

impl<C> Chart<C> {
    /// Resolves an absolute path or bare name.
    pub fn get_state(&self, path: &str) -> Result<StateId, CoreError> {
        let not_found = || CoreError::StateNotFound {
            path: path.to_string(),
        };
        if path.is_empty() {
            return Err(not_found());
        }
        if !path.contains('.') {
            return self.find(path).ok_or_else(not_found);
        }

        let segments: Vec<&str> = path.split('.').collect();
        self.descend(self.root(), &segments)
            .or_else(|| match segments.split_first() {
                Some((first, rest)) if *first == self.root_node().name() => {
                    self.descend(self.root(), rest)
                }
                _ => None,
            })
            .ok_or_else(not_found)
    }

    fn descend(&self, from: StateId, segments: &[&str]) -> Option<StateId> {
        segments
            .iter()
            .try_fold(from, |current, segment| self.node(current).child(segment))
    }

    /// Depth-first search from the root for a state named `name`.
    pub fn find(&self, name: &str) -> Option<StateId> {
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if node.name() == name {
                return Some(id);
            }
            stack.extend(node.children().iter().rev().copied());
        }
        None
    }

    /// Resolves `path` with relative paths taken from `from`.
    ///
    /// `.` is `from` itself, every further leading dot climbs one ancestor,
    /// and the remaining names descend. An empty path also means `from`.
    pub fn resolve(&self, path: &str, from: StateId) -> Result<StateId, CoreError> {
        if path.is_empty() {
            return Ok(from);
        }
        let Some(rest) = path.strip_prefix('.') else {
            return self.get_state(path);
        };

        let not_found = || CoreError::StateNotFound {
            path: path.to_string(),
        };
        let body = rest.trim_start_matches('.');
        let climbs = rest.len() - body.len();

        let mut current = from;
        for _ in 0..climbs {
            current = self.node(current).parent().ok_or_else(not_found)?;
        }
        if body.is_empty() {
            return Ok(current);
        }
        let segments: Vec<&str> = body.split('.').collect();
        self.descend(current, &segments).ok_or_else(not_found)
    }

    /// Ids from the root down to `id`, inclusive.
    pub fn lineage(&self, id: StateId) -> Vec<StateId> {
        let mut lineage: Vec<StateId> = self.ancestors(id).collect();
        lineage.reverse();
        lineage
    }

    /// `id` followed by its ancestors up to the root.
    pub fn ancestors(&self, id: StateId) -> impl Iterator<Item = StateId> + '_ {
        std::iter::successors(Some(id), move |&current| self.node(current).parent())
    }

    /// Dotted path of a state, without the root segment. The root's path is
    /// its own name.
    ///
    /// A top-level state whose bare name would be found elsewhere first is
    /// qualified with the root name. Charts never give a top-level state
    /// the root's name, so the path always resolves back to `id` through
    /// [`get_state`](Self::get_state).
    pub fn path_of(&self, id: StateId) -> String {
        if id == self.root() {
            return self.root_node().name().to_string();
        }
        let mut names: Vec<&str> = self
            .lineage(id)
            .into_iter()
            .map(|i| self.node(i).name())
            .collect();
        if names.len() > 2 || self.find(names[1]) == Some(id) {
            names.remove(0);
        }
        names.join(".")
    }

    /// Computes the minimal walk from `from` to `target`.
    pub fn relpath(&self, target: StateId, from: StateId) -> Result<RelPath, CoreError> {
        if target == from {
            return Ok(RelPath::default());
        }
        let source = self.lineage(from);
        let dest = self.lineage(target);

        let common = source
            .iter()
            .zip(dest.iter())
            .take_while(|(a, b)| a == b)
            .count();
        if common == 0 {
            return Err(CoreError::NoRelativePath {
                target: self.path_of(target),
            });
        }

        let mut steps = vec![Step::Ascend; source.len() - common];
        steps.extend(
            dest[common..]
                .iter()
                .map(|&id| Step::Descend(self.node(id).name().to_string())),
        );
        Ok(RelPath::new(steps))
    }

    /// Follows a relative walk from `from` without running any actions.
    pub fn walk(&self, from: StateId, relpath: &RelPath) -> Result<StateId, CoreError> {
        let mut current = from;
        for step in relpath.steps() {
            current = match step {
                Step::Ascend => self.node(current).parent(),
                Step::Descend(name) => self.node(current).child(name),
            }
            .ok_or_else(|| CoreError::StateNotFound {
                path: relpath.to_string(),
            })?;
        }
        Ok(current)
    }
}
