//! # arbor-core
//!
//! Hierarchical statechart engine for arbor.
//!
//! This crate provides:
//! - State tree construction from records or builders, with validation
//! - Dotted and relative path resolution
//! - Transition selection with guards, entry/exit actions and automatic transitions
//! - Independent running instances over a shared chart template

pub mod chart;
pub mod context;
pub mod definition;
pub mod engine;
pub mod error;
pub mod instance;
pub mod model;
pub mod path;

pub use chart::{Chart, Node, StateId};
pub use context::{is_truthy, Context};
pub use definition::{
    create_action, create_guard, create_root, create_state, create_transition, is_valid_name,
    ActionDef, ContentRecord, GuardDef, StateDef, StateEntry, StateRecord, TransitionDef,
    TransitionRecord, DEFAULT_ROOT_NAME,
};
pub use engine::{EngineConfig, FireResult, DEFAULT_MAX_AUTO_DEPTH, QUERY_PREFIX};
pub use error::{CallbackError, CoreError};
pub use instance::{Instance, Operation, Outcome, Phase};
pub use model::{Action, Condition, Content, Guard, State, StateKind, Transition};
pub use path::{RelPath, Step};
