//! Single-use sandboxes that never count against registry capacity.

use super::{SandboxError, SandboxHandle, SandboxRegistry};
use std::sync::Arc;

/// A sandbox scoped to one tool invocation.
///
/// Call [`TemporarySandbox::release`] once the guarded work is done. If the
/// guard is dropped without being released (early return, panic unwinding,
/// or the owning future being cancelled), termination is scheduled on the
/// registry's task tracker instead, where `cleanup_all` waits for it. Until
/// then the registry keeps the handle on its temporary list, so shutdown
/// terminates it even if nothing else does. Either way the sandbox is killed
/// at most once.
pub struct TemporarySandbox {
    handle: Arc<dyn SandboxHandle>,
    registry: Arc<SandboxRegistry>,
    released: bool,
}

impl TemporarySandbox {
    pub async fn create(registry: &Arc<SandboxRegistry>) -> Result<Self, SandboxError> {
        let handle = registry.create_temporary().await?;
        Ok(Self {
            handle,
            registry: Arc::clone(registry),
            released: false,
        })
    }

    pub fn id(&self) -> &str {
        self.handle.id()
    }

    pub fn handle(&self) -> &dyn SandboxHandle {
        self.handle.as_ref()
    }

    /// Terminate the sandbox. Failures are logged, never returned, so they
    /// cannot mask the result of the work that used the sandbox.
    pub async fn release(mut self) {
        self.released = true;
        if let Some(kill) = self.registry.terminate_temporary(self.handle.id()) {
            if let Err(e) = kill.await {
                tracing::warn!(sandbox_id = %self.handle.id(), error = %e, "temporary sandbox cleanup task failed");
            }
        }
    }
}

impl Drop for TemporarySandbox {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if self.registry.terminate_temporary(self.handle.id()).is_some() {
            tracing::warn!(
                sandbox_id = %self.handle.id(),
                "temporary sandbox dropped before release; termination scheduled"
            );
        }
    }
}
