//! # hypha-safety
//!
//! The safety coordinator: one shared instance per process, constructed at
//! startup and handed to collaborators behind an `Arc`.
//!
//! - Safe mode: global kill switch consulted before every task dispatch
//! - Flags: arbitrary named JSON values
//! - Task registration: the ids of currently registered task handlers
//!
//! Every operation takes the lock once and never calls another operation
//! while holding it.

#![deny(unsafe_code)]

use std::collections::{BTreeSet, HashMap, HashSet};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct SafetyState {
    safe_mode: bool,
    flags: HashMap<String, Value>,
    registered_tasks: HashSet<String>,
}

/// Point-in-time copy of the coordinator state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CoreStatus {
    /// Whether task dispatch is currently suppressed.
    pub safe_mode: bool,
    /// Registered task ids, sorted.
    pub active_tasks: Vec<String>,
    /// All flags.
    pub flags: HashMap<String, Value>,
}

/// Process-wide safety gate.
#[derive(Debug, Default)]
pub struct SafetyCoordinator {
    state: Mutex<SafetyState>,
}

impl SafetyCoordinator {
    /// Create a coordinator in normal (non-safe) mode.
    pub fn new() -> Self {
        info!("safety coordinator initialized");
        Self::default()
    }

    /// `true` unless safe mode is enabled.
    pub fn is_operational(&self) -> bool {
        !self.state.lock().safe_mode
    }

    /// Suppress all task dispatch.
    pub fn enable_safe_mode(&self) {
        self.state.lock().safe_mode = true;
        warn!("safe mode enabled");
    }

    /// Resume task dispatch.
    pub fn disable_safe_mode(&self) {
        self.state.lock().safe_mode = false;
        info!("safe mode disabled");
    }

    /// Flip safe mode and return the new value.
    pub fn toggle_safe_mode(&self) -> bool {
        let enabled = {
            let mut state = self.state.lock();
            state.safe_mode = !state.safe_mode;
            state.safe_mode
        };
        if enabled {
            warn!("safe mode enabled");
        } else {
            info!("safe mode disabled");
        }
        enabled
    }

    /// Set a named flag, replacing any previous value.
    pub fn set_flag(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let _ = self.state.lock().flags.insert(key, value);
    }

    /// Get a flag, or `default` when it was never set.
    pub fn get_flag(&self, key: &str, default: Value) -> Value {
        self.state.lock().flags.get(key).cloned().unwrap_or(default)
    }

    /// Record a task handler id as registered.
    pub fn register_task(&self, id: impl Into<String>) {
        let id = id.into();
        let _ = self.state.lock().registered_tasks.insert(id.clone());
        info!(task_id = %id, "task registered");
    }

    /// Forget a task handler id. Unknown ids are ignored.
    pub fn unregister_task(&self, id: &str) {
        let _ = self.state.lock().registered_tasks.remove(id);
        info!(task_id = %id, "task unregistered");
    }

    /// Copy of the registered task ids.
    pub fn list_active_tasks(&self) -> HashSet<String> {
        self.state.lock().registered_tasks.clone()
    }

    /// Snapshot of safe mode, tasks, and flags under one lock acquisition.
    pub fn status(&self) -> CoreStatus {
        let state = self.state.lock();
        let active_tasks: BTreeSet<&String> = state.registered_tasks.iter().collect();
        CoreStatus {
            safe_mode: state.safe_mode,
            active_tasks: active_tasks.into_iter().cloned().collect(),
            flags: state.flags.clone(),
        }
    }
}
