//! Mirror controller state
//!
//! Wraps the base object state with the mirror store, the tenant identity
//! this controller runs for, and the mirror loaded during the run.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use nimbus_common::crd::control::IpRange as KcpIpRange;
use nimbus_common::crd::tenant::IpRange;
use nimbus_common::crd::types::{RemoteRef, StatusState};
use nimbus_common::crd::ObjWithConditions;
use nimbus_pipeline::{ObjKey, ObjState, ObjectOps};

use crate::store::MirrorStore;

/// Everything the tenant IpRange pipeline reads and writes
pub struct MirrorState {
    base: ObjState<IpRange>,
    pub(crate) mirrors: Arc<dyn MirrorStore>,
    pub(crate) tenant: String,
    pub(crate) kcp_namespace: String,

    /// The control-plane mirror, once found or created
    pub(crate) mirror: Option<KcpIpRange>,
}

impl MirrorState {
    /// Build state for one reconcile
    pub fn new(
        ops: Arc<dyn ObjectOps<IpRange>>,
        mirrors: Arc<dyn MirrorStore>,
        tenant: impl Into<String>,
        kcp_namespace: impl Into<String>,
        key: ObjKey,
    ) -> Self {
        Self {
            base: ObjState::new(ops, key),
            mirrors,
            tenant: tenant.into(),
            kcp_namespace: kcp_namespace.into(),
            mirror: None,
        }
    }

    /// The control-plane mirror, if loaded
    pub fn mirror(&self) -> Option<&KcpIpRange> {
        self.mirror.as_ref()
    }

    /// Identity of the reconciled object as seen from the control plane
    pub fn remote_ref(&self) -> RemoteRef {
        RemoteRef {
            namespace: self.base.key().namespace.clone(),
            name: self.base.key().name.clone(),
        }
    }

    /// Lifecycle state the mirror reports; Processing when none is loaded
    pub fn mirror_state(&self) -> StatusState {
        self.mirror
            .as_ref()
            .map(|m| m.state())
            .unwrap_or_default()
    }
}

impl Deref for MirrorState {
    type Target = ObjState<IpRange>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl DerefMut for MirrorState {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}
