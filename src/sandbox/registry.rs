//! Registry of the sandboxes owned by this process.
//!
//! The registry is the only component that inserts or removes tracked
//! handles. Every mutation happens inside one short critical section, so a
//! concurrent caller always sees the mapping either before or after a
//! create/kill, never in between.
//!
//! Remote creates and kills run on the registry's [`TaskTracker`] rather than
//! inside the caller's future. A caller that stops waiting (an aborted tool
//! call at shutdown) therefore never strands a remote sandbox: the create
//! still lands in the registry, the kill still completes, and
//! [`SandboxRegistry::cleanup_all`] waits for both before terminating what is
//! left.

use super::{SandboxError, SandboxHandle, SandboxProvider};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

/// Default sandbox lifetime: 5 minutes.
pub const DEFAULT_SANDBOX_TIMEOUT_MS: u64 = 300_000;
/// Upper bound on any requested lifetime: 1 hour.
pub const MAX_SANDBOX_TIMEOUT_MS: u64 = 3_600_000;
/// Smallest lifetime a client may request.
pub const MIN_SANDBOX_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_MAX_SANDBOXES: usize = 10;

/// Capacity and timeout limits, fixed at registry construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    pub max_sandboxes: usize,
    pub default_timeout_ms: u64,
    pub max_timeout_ms: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_sandboxes: DEFAULT_MAX_SANDBOXES,
            default_timeout_ms: DEFAULT_SANDBOX_TIMEOUT_MS,
            max_timeout_ms: MAX_SANDBOX_TIMEOUT_MS,
        }
    }
}

impl SandboxLimits {
    /// `min(requested ?? default, max)`.
    pub fn effective_timeout(&self, requested_ms: Option<u64>) -> u64 {
        requested_ms
            .unwrap_or(self.default_timeout_ms)
            .min(self.max_timeout_ms)
    }
}

/// Point-in-time view of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub active_sandboxes: usize,
    pub max_sandboxes: usize,
    /// Sorted, so repeated snapshots of an unchanged registry are identical.
    pub sandbox_ids: Vec<String>,
}

/// Outcome of [`SandboxRegistry::cleanup_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub terminated: Vec<String>,
    pub failed: Vec<String>,
}

type Handles = BTreeMap<String, Arc<dyn SandboxHandle>>;

#[derive(Default)]
struct RegistryState {
    sandboxes: Handles,
    /// Single-use sandboxes. Outside capacity and stats, but still
    /// terminated by `cleanup_all`.
    temporary: Handles,
    /// Slots held by creates whose remote call is still in flight.
    reserved: usize,
}

/// Tracks live sandboxes and enforces the concurrency ceiling.
pub struct SandboxRegistry {
    provider: Arc<dyn SandboxProvider>,
    limits: SandboxLimits,
    state: Arc<Mutex<RegistryState>>,
    tasks: TaskTracker,
}

impl SandboxRegistry {
    pub fn new(provider: Arc<dyn SandboxProvider>, limits: SandboxLimits) -> Self {
        tracing::info!(
            max_sandboxes = limits.max_sandboxes,
            default_timeout_ms = limits.default_timeout_ms,
            max_timeout_ms = limits.max_timeout_ms,
            "sandbox registry initialized"
        );
        Self {
            provider,
            limits,
            state: Arc::new(Mutex::new(RegistryState::default())),
            tasks: TaskTracker::new(),
        }
    }

    pub fn limits(&self) -> SandboxLimits {
        self.limits
    }

    /// Create and register a sandbox.
    ///
    /// Capacity is reserved before the remote call, so the registry can never
    /// exceed `max_sandboxes`, even with several creates in flight. If the
    /// remote call fails the slot is released and nothing is registered. If
    /// this future is dropped, the remote call still finishes and registers
    /// its sandbox.
    pub async fn create(
        &self,
        timeout_ms: Option<u64>,
    ) -> Result<(String, Arc<dyn SandboxHandle>), SandboxError> {
        let slot = self.reserve()?;
        let timeout_ms = self.limits.effective_timeout(timeout_ms);
        let provider = Arc::clone(&self.provider);

        let created = self.tasks.spawn(async move {
            let handle = match provider.create(timeout_ms).await {
                Ok(handle) => handle,
                Err(source) => {
                    tracing::error!(error = %source, "failed to create sandbox");
                    return Err(source);
                }
            };
            let active = slot.commit(Arc::clone(&handle));
            tracing::info!(sandbox_id = %handle.id(), timeout_ms, active, "sandbox created");
            Ok(handle)
        });

        let handle = flatten(created.await).map_err(SandboxError::CreateFailed)?;
        Ok((handle.id().to_string(), handle))
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn SandboxHandle>, SandboxError> {
        self.state
            .lock()
            .sandboxes
            .get(id)
            .cloned()
            .ok_or_else(|| SandboxError::NotFound { id: id.to_string() })
    }

    /// Remove `id` and terminate it remotely.
    ///
    /// The entry is removed before the remote call and stays removed when the
    /// call fails; the error is still reported as `KillFailed`.
    pub async fn kill(&self, id: &str) -> Result<(), SandboxError> {
        let (handle, active) = {
            let mut state = self.state.lock();
            let handle = state
                .sandboxes
                .remove(id)
                .ok_or_else(|| SandboxError::NotFound { id: id.to_string() })?;
            (handle, state.sandboxes.len())
        };

        let killed = self.tasks.spawn(async move { handle.kill().await });
        match flatten(killed.await) {
            Ok(()) => {
                tracing::info!(sandbox_id = %id, active, "sandbox killed");
                Ok(())
            }
            Err(source) => {
                tracing::error!(sandbox_id = %id, error = %source, "error killing sandbox");
                Err(SandboxError::KillFailed {
                    id: id.to_string(),
                    source,
                })
            }
        }
    }

    /// Terminate every sandbox this process still owns, temporary ones
    /// included. Pending creates and kills are awaited first. Individual
    /// failures are logged and do not stop the remaining attempts; the
    /// registry is empty afterwards.
    pub async fn cleanup_all(&self) -> CleanupReport {
        self.tasks.close();
        if !self.tasks.is_empty() {
            tracing::info!(pending = self.tasks.len(), "waiting for pending sandbox operations");
        }
        self.tasks.wait().await;

        let drained: Vec<_> = {
            let mut state = self.state.lock();
            let tracked = std::mem::take(&mut state.sandboxes);
            let temporary = std::mem::take(&mut state.temporary);
            tracked.into_iter().chain(temporary).collect()
        };
        tracing::info!(count = drained.len(), "cleaning up sandboxes");

        let mut report = CleanupReport::default();
        for (id, handle) in drained {
            match handle.kill().await {
                Ok(()) => {
                    tracing::info!(sandbox_id = %id, "cleaned up sandbox");
                    report.terminated.push(id);
                }
                Err(e) => {
                    tracing::error!(sandbox_id = %id, error = %e, "error cleaning up sandbox");
                    report.failed.push(id);
                }
            }
        }

        tracing::info!(
            terminated = report.terminated.len(),
            failed = report.failed.len(),
            "all sandboxes cleaned up"
        );
        report
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();
        RegistryStats {
            active_sandboxes: state.sandboxes.len(),
            max_sandboxes: self.limits.max_sandboxes,
            sandbox_ids: state.sandboxes.keys().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().sandboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a single-use sandbox with the default timeout. It bypasses
    /// capacity and stays out of `stats`.
    pub(super) async fn create_temporary(&self) -> Result<Arc<dyn SandboxHandle>, SandboxError> {
        let provider = Arc::clone(&self.provider);
        let state = Arc::clone(&self.state);
        let timeout_ms = self.limits.default_timeout_ms;

        let created = self.tasks.spawn(async move {
            let handle = match provider.create(timeout_ms).await {
                Ok(handle) => handle,
                Err(source) => {
                    tracing::error!(error = %source, "failed to create temporary sandbox");
                    return Err(source);
                }
            };
            state
                .lock()
                .temporary
                .insert(handle.id().to_string(), Arc::clone(&handle));
            tracing::info!(sandbox_id = %handle.id(), timeout_ms, "created temporary sandbox");
            Ok(handle)
        });

        flatten(created.await).map_err(SandboxError::CreateFailed)
    }

    /// Claim temporary sandbox `id` and start its termination. Returns
    /// `None` when it was already claimed or no runtime is available.
    pub(super) fn terminate_temporary(&self, id: &str) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(sandbox_id = %id, "no runtime to terminate temporary sandbox");
            return None;
        };
        let handle = self.state.lock().temporary.remove(id)?;
        Some(self.tasks.spawn_on(
            async move {
                match handle.kill().await {
                    Ok(()) => {
                        tracing::info!(sandbox_id = %handle.id(), "temporary sandbox cleaned up")
                    }
                    Err(e) => tracing::warn!(
                        sandbox_id = %handle.id(),
                        error = %e,
                        "error cleaning up temporary sandbox"
                    ),
                }
            },
            &runtime,
        ))
    }

    fn reserve(&self) -> Result<Reservation, SandboxError> {
        let mut state = self.state.lock();
        if state.sandboxes.len() + state.reserved >= self.limits.max_sandboxes {
            tracing::warn!(
                max_sandboxes = self.limits.max_sandboxes,
                "sandbox limit reached"
            );
            return Err(SandboxError::CapacityExceeded {
                max: self.limits.max_sandboxes,
            });
        }
        state.reserved += 1;
        Ok(Reservation {
            state: Arc::clone(&self.state),
            committed: false,
        })
    }
}

fn flatten<T>(
    joined: Result<anyhow::Result<T>, tokio::task::JoinError>,
) -> anyhow::Result<T> {
    joined.map_err(|e| anyhow::Error::new(e).context("sandbox operation task failed"))?
}

/// A capacity slot held while a remote create is in flight.
struct Reservation {
    state: Arc<Mutex<RegistryState>>,
    committed: bool,
}

impl Reservation {
    /// Turn the slot into a registered sandbox; returns the new active count.
    fn commit(mut self, handle: Arc<dyn SandboxHandle>) -> usize {
        let mut state = self.state.lock();
        state.reserved -= 1;
        state.sandboxes.insert(handle.id().to_string(), handle);
        self.committed = true;
        state.sandboxes.len()
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            self.state.lock().reserved -= 1;
        }
    }
}
