//! Predicates and branching combinators
//!
//! Predicates are synchronous reads of the state; decisions needing IO belong
//! in actions. `when` is if-without-else, `switch` picks the first matching
//! case the way a provider dispatch point does.

use std::sync::Arc;

use async_trait::async_trait;

use crate::action::{Action, DynAction};
use crate::signal::Flow;

/// Boolean test over reconciliation state
pub trait Predicate<S>: Send + Sync {
    /// Evaluate against the state
    fn eval(&self, state: &S) -> bool;
}

impl<S, F> Predicate<S> for F
where
    F: Fn(&S) -> bool + Send + Sync,
{
    fn eval(&self, state: &S) -> bool {
        self(state)
    }
}

/// Shared, type-erased predicate
pub type DynPredicate<S> = Arc<dyn Predicate<S>>;

struct AllOf<S>(Vec<DynPredicate<S>>);

impl<S> Predicate<S> for AllOf<S>
where
    S: Send + Sync,
{
    fn eval(&self, state: &S) -> bool {
        self.0.iter().all(|p| p.eval(state))
    }
}

/// True iff every predicate is true; short-circuits on the first false
pub fn all<S: Send + Sync + 'static>(predicates: Vec<DynPredicate<S>>) -> DynPredicate<S> {
    Arc::new(AllOf(predicates))
}

struct AnyOf<S>(Vec<DynPredicate<S>>);

impl<S> Predicate<S> for AnyOf<S>
where
    S: Send + Sync,
{
    fn eval(&self, state: &S) -> bool {
        self.0.iter().any(|p| p.eval(state))
    }
}

/// True iff at least one predicate is true; short-circuits on the first true
pub fn any<S: Send + Sync + 'static>(predicates: Vec<DynPredicate<S>>) -> DynPredicate<S> {
    Arc::new(AnyOf(predicates))
}

struct NotOf<S>(DynPredicate<S>);

impl<S> Predicate<S> for NotOf<S>
where
    S: Send + Sync,
{
    fn eval(&self, state: &S) -> bool {
        !self.0.eval(state)
    }
}

/// Inverts a predicate
pub fn not<S: Send + Sync + 'static>(predicate: impl Predicate<S> + 'static) -> DynPredicate<S> {
    Arc::new(NotOf(Arc::new(predicate)))
}

/// If-without-else: runs the body only when the predicate holds, otherwise a
/// no-op that continues
pub struct When<S: Send> {
    predicate: DynPredicate<S>,
    body: DynAction<S>,
}

/// Build a [`When`] combinator
pub fn when<S: Send + Sync + 'static>(
    predicate: impl Predicate<S> + 'static,
    body: impl Action<S> + 'static,
) -> When<S> {
    When {
        predicate: Arc::new(predicate),
        body: Arc::new(body),
    }
}

#[async_trait]
impl<S: Send + Sync + 'static> Action<S> for When<S> {
    fn name(&self) -> &str {
        self.body.name()
    }

    async fn run(&self, state: &mut S) -> Flow {
        if self.predicate.eval(state) {
            self.body.run(state).await
        } else {
            None
        }
    }
}

/// One arm of a [`Switch`]
pub struct Case<S: Send> {
    predicate: DynPredicate<S>,
    action: DynAction<S>,
}

/// Build a switch case
pub fn case<S: Send + Sync + 'static>(
    predicate: impl Predicate<S> + 'static,
    action: impl Action<S> + 'static,
) -> Case<S> {
    Case {
        predicate: Arc::new(predicate),
        action: Arc::new(action),
    }
}

/// First-matching-case selector
///
/// Evaluates case predicates in declaration order and runs the first true
/// case's action; if none match, runs the default when present, else
/// continues. At most one arm runs per invocation.
pub struct Switch<S: Send> {
    name: String,
    default: Option<DynAction<S>>,
    cases: Vec<Case<S>>,
}

/// Build a [`Switch`] combinator
pub fn switch<S: Send + Sync + 'static>(
    name: impl Into<String>,
    default: Option<DynAction<S>>,
    cases: Vec<Case<S>>,
) -> Switch<S> {
    Switch {
        name: name.into(),
        default,
        cases,
    }
}

#[async_trait]
impl<S: Send + Sync + 'static> Action<S> for Switch<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &mut S) -> Flow {
        for c in &self.cases {
            if c.predicate.eval(state) {
                return c.action.run(state).await;
            }
        }
        match &self.default {
            Some(default) => default.run(state).await,
            None => None,
        }
    }
}
