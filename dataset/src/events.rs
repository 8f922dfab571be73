//! Change notification.
//!
//! Observers subscribe to a [`FlowDataset`] and are called synchronously, in
//! registration order, after a mutation has completed. Observers receive the
//! dataset mutably and may trigger further mutations; events raised while a
//! dispatch is running are queued and delivered in the same round.
//!
//! Within one round each [`EventKind`] is delivered at most once. An event
//! whose kind was already delivered (or is already queued) is dropped, which
//! keeps an observer that re-triggers its own event from recursing.

use crate::dataset::FlowDataset;
use crate::error::Result;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use strum_macros::Display;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetEvent {
    /// Newly registered gate names
    GatesAdded(Vec<Arc<str>>),
    /// Newly registered data-type labels
    DataTypesAdded(Vec<Arc<str>>),
    ControlsRegistered,
    BinConfigChanged,
    BinsUpdated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EventKind {
    GatesAdded,
    DataTypesAdded,
    ControlsRegistered,
    BinConfigChanged,
    BinsUpdated,
}

impl DatasetEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DatasetEvent::GatesAdded(_) => EventKind::GatesAdded,
            DatasetEvent::DataTypesAdded(_) => EventKind::DataTypesAdded,
            DatasetEvent::ControlsRegistered => EventKind::ControlsRegistered,
            DatasetEvent::BinConfigChanged => EventKind::BinConfigChanged,
            DatasetEvent::BinsUpdated => EventKind::BinsUpdated,
        }
    }
}

/// Handle returned by [`FlowDataset::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

pub type Observer = Box<dyn FnMut(&mut FlowDataset, &DatasetEvent) -> Result<()> + Send>;

#[derive(Default)]
pub(crate) struct EventBus {
    next_id: u64,
    observers: Vec<(ObserverId, Observer)>,
    dispatching: bool,
    pending: VecDeque<DatasetEvent>,
    delivered: FxHashSet<EventKind>,
    retired: Vec<ObserverId>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field(
                "observers",
                &self.observers.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            )
            .field("dispatching", &self.dispatching)
            .field("pending", &self.pending)
            .finish()
    }
}

impl FlowDataset {
    /// Register an observer; it is called after every subsequent mutation event
    pub fn subscribe<F>(&mut self, observer: F) -> ObserverId
    where
        F: FnMut(&mut FlowDataset, &DatasetEvent) -> Result<()> + Send + 'static,
    {
        let id = ObserverId(self.events.next_id);
        self.events.next_id += 1;
        self.events.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove an observer. Takes effect immediately, including for the rest of
    /// a dispatch round that is currently running.
    pub fn unsubscribe(&mut self, id: ObserverId) {
        if self.auto_binning == Some(id) {
            self.auto_binning = None;
        }
        let before = self.events.observers.len();
        self.events.observers.retain(|(existing, _)| *existing != id);
        if self.events.dispatching && self.events.observers.len() == before {
            self.events.retired.push(id);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.events.observers.len()
    }

    /// Notify observers of a completed mutation.
    ///
    /// Observer errors stop the round and are returned; the mutation that
    /// raised the event stays applied.
    pub(crate) fn emit(&mut self, event: DatasetEvent) -> Result<()> {
        let kind = event.kind();
        if self.events.dispatching {
            let queued = self.events.pending.iter().any(|e| e.kind() == kind);
            if self.events.delivered.contains(&kind) || queued {
                debug!("Suppressed re-entrant {} notification", kind);
            } else {
                self.events.pending.push_back(event);
            }
            return Ok(());
        }

        if self.events.observers.is_empty() {
            return Ok(());
        }

        self.events.dispatching = true;
        self.events.pending.push_back(event);
        let result = self.drain_events();
        self.events.dispatching = false;
        self.events.pending.clear();
        self.events.delivered.clear();
        self.events.retired.clear();
        result
    }

    fn drain_events(&mut self) -> Result<()> {
        while let Some(event) = self.events.pending.pop_front() {
            self.events.delivered.insert(event.kind());

            let mut observers = std::mem::take(&mut self.events.observers);
            let mut result = Ok(());
            for (id, observer) in observers.iter_mut() {
                if self.events.retired.contains(id) {
                    continue;
                }
                if let Err(e) = observer(self, &event) {
                    result = Err(e);
                    break;
                }
            }

            // observers subscribed during the round go after the existing ones
            let subscribed = std::mem::replace(&mut self.events.observers, observers);
            self.events.observers.extend(subscribed);
            let retired = &self.events.retired;
            self.events
                .observers
                .retain(|(id, _)| !retired.contains(id));

            result?;
        }
        Ok(())
    }
}
