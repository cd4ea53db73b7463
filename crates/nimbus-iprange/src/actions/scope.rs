//! Scope resolution

use async_trait::async_trait;
use tracing::warn;

use nimbus_pipeline::{Action, Flow, Signal};

use crate::actions::{retry, LONG_DELAY};
use crate::state::IpRangeState;

/// Resolves the Scope named by `spec.scope`
///
/// A missing Scope is not an error of the range itself; the reconcile backs
/// off with a long delay until the Scope appears.
pub struct LoadScope;

#[async_trait]
impl Action<IpRangeState> for LoadScope {
    fn name(&self) -> &str {
        "loadScope"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let Some(scope_name) = state.obj().map(|o| o.spec.scope.name.clone()) else {
            return Some(Signal::StopAndForget);
        };
        match state.load_scope(&scope_name).await {
            Ok(true) => None,
            Ok(false) => {
                warn!(scope = %scope_name, "scope not found, backing off");
                Some(Signal::RequeueAfter(LONG_DELAY))
            }
            Err(err) => retry(err, "load scope"),
        }
    }
}
