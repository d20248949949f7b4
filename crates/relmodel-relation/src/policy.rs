//! Handling of remote data failures.

use relmodel_core::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};

/// Decides whether a failed remote call aborts an assemble call.
///
/// Consulted on every failure, never cached, so a configuration reload takes
/// effect on the next failure.
pub trait RemoteErrorPolicy: Send + Sync {
    fn ignore_remote_errors(&self) -> bool;
}

/// A policy fixed at construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPolicy(pub bool);

impl RemoteErrorPolicy for FixedPolicy {
    fn ignore_remote_errors(&self) -> bool {
        self.0
    }
}

impl RemoteErrorPolicy for AtomicBool {
    fn ignore_remote_errors(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

/// Log a remote failure and either swallow it (`Ok`) or hand it back (`Err`).
pub fn handle_remote_failure(policy: &dyn RemoteErrorPolicy, relation: &str, error: Error) -> Result<()> {
    tracing::error!(relation = %relation, "RPC call failed: {}", error);
    if policy.ignore_remote_errors() {
        tracing::warn!(relation = %relation, "Ignoring remote failure, relation left unset");
        Ok(())
    } else {
        Err(error)
    }
}
