//! Composable reconciliation pipeline engine
//!
//! Every controller in this repository is assembled from the same pieces: an
//! [`Action`](action::Action) is the atomic unit of work, a
//! [`Pipeline`](action::Pipeline) chains actions until one returns a terminal
//! [`Signal`](signal::Signal), predicates and branch combinators select which
//! actions run, and state layers carry the loaded objects and clients the
//! actions operate on. The pipeline is re-walked from the top on every
//! reconcile; every action re-derives "is this already done?" from observed
//! state, which makes the whole flow resumable with at-least-once semantics.

#![deny(missing_docs)]

/// Action trait and pipeline composer
pub mod action;
/// Focal state layer resolving the owning Scope
pub mod focal;
/// Predicates and branching combinators
pub mod predicate;
/// Outcome signals and the mapping to scheduler decisions
pub mod signal;
/// Base object state and store access
pub mod state;
/// Status patch builder with change detection
pub mod status;

pub use action::{Action, DynAction, Pipeline};
pub use focal::{pick_scope, provider_is, FocalState, HasScope, KubeScopeOps, ScopeOps};
pub use predicate::{all, any, case, not, switch, when, Case, DynPredicate, Predicate};
pub use signal::{handle, Flow, Signal};
pub use state::{KubeOps, ObjKey, ObjState, ObjectOps};
pub use status::StatusPatch;
