//! Presence detection for the streaming application.

use std::ffi::OsStr;
use std::sync::{Mutex, PoisonError};

use streamctl_rpc::Presence;
use sysinfo::{ProcessesToUpdate, System};

pub use streamctl_rpc::AlwaysPresent;

/// Presence backed by the process table: the target counts as running while
/// a process with exactly this name exists.
pub struct ProcessPresence {
    name: String,
    system: Mutex<System>,
}

impl ProcessPresence {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system: Mutex::new(System::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Presence for ProcessPresence {
    fn is_running(&self) -> bool {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes(ProcessesToUpdate::All, true);
        system
            .processes_by_exact_name(OsStr::new(&self.name))
            .next()
            .is_some()
    }
}

impl std::fmt::Debug for ProcessPresence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessPresence")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
