//! Ordered lifecycle callbacks, run by [`crate::store::Collection`] around
//! its store calls. The model types themselves know nothing about hooks.

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::model::ModelInstance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    PreSave,
    PostSave,
    PreDelete,
    PostDelete,
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookEvent::PreSave => "pre_save",
            HookEvent::PostSave => "post_save",
            HookEvent::PreDelete => "pre_delete",
            HookEvent::PostDelete => "post_delete",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{event} hook #{index} failed: {message}")]
pub struct HookError {
    pub event: HookEvent,
    pub index: usize, // registration position within the event
    pub message: String,
}

/// What a callback returns to stop the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reject(pub String);

impl From<&str> for Reject {
    fn from(message: &str) -> Self { Reject(message.to_string()) }
}

impl From<String> for Reject {
    fn from(message: String) -> Self { Reject(message) }
}

pub type HookFn = Box<dyn Fn(&mut ModelInstance) -> Result<(), Reject> + Send + Sync>;

#[derive(Default)]
pub struct Hooks {
    by_event: IndexMap<HookEvent, Vec<HookFn>>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: IndexMap<HookEvent, usize> = self.by_event.iter().map(|(e, v)| (*e, v.len())).collect();
        f.debug_struct("Hooks").field("by_event", &counts).finish()
    }
}

impl Hooks {
    pub fn new() -> Self { Self::default() }

    /// Append a callback to the event's list.
    pub fn on<F>(&mut self, event: HookEvent, callback: F) -> &mut Self
    where
        F: Fn(&mut ModelInstance) -> Result<(), Reject> + Send + Sync + 'static,
    {
        self.by_event.entry(event).or_default().push(Box::new(callback));
        self
    }

    pub fn count(&self, event: HookEvent) -> usize { self.by_event.get(&event).map_or(0, Vec::len) }

    /// Invoke the event's callbacks in registration order; the first
    /// rejection stops the chain.
    pub fn run(&self, event: HookEvent, instance: &mut ModelInstance) -> Result<(), HookError> {
        let Some(callbacks) = self.by_event.get(&event) else { return Ok(()) };
        for (index, callback) in callbacks.iter().enumerate() {
            if let Err(Reject(message)) = callback(instance) {
                tracing::debug!(%event, index, %message, "hook rejected instance");
                return Err(HookError { event, index, message });
            }
        }
        Ok(())
    }
}
