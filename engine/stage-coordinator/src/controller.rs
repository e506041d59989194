// Stage controller: binds lifecycle states to the stage sets they run

use crate::manager::StageManager;
use crate::types::StageError;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Callback fired when the server enters a lifecycle state, before any
/// stage exclusive to that state is started. Commonly used to create the
/// incoming state's stages.
pub type TransitionTrigger = Box<dyn Fn(&str) + Send>;

/// Finite-state coordinator binding named stages to abstract lifecycle
/// states (joining a cluster, becoming primary, shutting down, ...).
///
/// Not internally synchronized: `transition` takes `&mut self`, so exactly
/// one lifecycle-driving thread owns the controller at a time. A failed
/// transition is not rolled back; the caller must treat the system as
/// possibly part-transitioned and escalate.
pub struct StageController {
    manager: Arc<StageManager>,
    states: HashMap<String, BTreeSet<String>>,
    triggers: HashMap<String, TransitionTrigger>,
    current: Option<String>,
}

impl StageController {
    pub fn new(manager: Arc<StageManager>) -> Self {
        Self { manager, states: HashMap::new(), triggers: HashMap::new(), current: None }
    }

    pub fn add_stage_to_state(&mut self, state: &str, stage_name: &str) {
        self.states.entry(state.to_string()).or_default().insert(stage_name.to_string());
    }

    pub fn add_trigger_to_state(&mut self, state: &str, trigger: TransitionTrigger) {
        self.triggers.insert(state.to_string(), trigger);
    }

    pub fn current_state(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn stages_in_state(&self, state: &str) -> BTreeSet<String> {
        self.states.get(state).cloned().unwrap_or_default()
    }

    /// Move the server from one lifecycle state to another:
    ///
    /// 1. destroy every stage exclusive to `from`,
    /// 2. fire `to`'s trigger, if any,
    /// 3. start every stage exclusive to `to`.
    ///
    /// Stages present in both states are left untouched, which is what lets
    /// long-lived stages survive a mode change while mode-specific stages
    /// come and go.
    pub fn transition(&mut self, from: &str, to: &str) -> Result<(), StageError> {
        if let Some(current) = &self.current {
            if current != from {
                tracing::warn!(current = %current, from, "transition source differs from bookkept state");
            }
        }

        let from_set = self.stages_in_state(from);
        let to_set = self.stages_in_state(to);

        for name in from_set.difference(&to_set) {
            tracing::info!(stage = %name, from, to, "destroying stage on state exit");
            self.manager.destroy_stage(name)?;
        }

        if let Some(trigger) = self.triggers.get(to) {
            trigger(to);
        }

        for name in to_set.difference(&from_set) {
            tracing::info!(stage = %name, from, to, "starting stage on state entry");
            self.manager.start_stage(name)?;
        }

        self.current = Some(to.to_string());
        Ok(())
    }
}
