use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::introspect::ObjectId;
use crate::location::normalize_classpath_element;
use crate::log_node::LogNode;

/// Classpath root discovered while walking a class loader.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub struct ClasspathEntry {
    pub location: String,
    pub class_loader: ObjectId,
}

#[derive(Debug, Default)]
struct OrderState {
    entries: Vec<ClasspathEntry>,
    seen: HashSet<ClasspathEntry>,
}

/// Ordered, de-duplicated classpath entries.
///
/// Appends are serialized internally, so handlers running on different threads may
/// share one order; each caller's entries keep the order in which they were added.
#[derive(Debug, Default)]
pub struct ClasspathOrder {
    state: Mutex<OrderState>,
}

impl ClasspathOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry unless the same location was already added for the same loader.
    /// Returns true if the entry was new.
    pub fn add_classpath_entry(
        &self,
        location: impl Into<String>,
        class_loader: ObjectId,
        log: Option<&LogNode>,
    ) -> bool {
        let entry = ClasspathEntry {
            location: location.into(),
            class_loader,
        };
        if entry.location.is_empty() {
            return false;
        }
        let mut state = self.lock();
        if state.seen.contains(&entry) {
            return false;
        }
        tracing::debug!(
            location = %entry.location,
            class_loader = %class_loader,
            "found classpath entry"
        );
        if let Some(log) = log {
            log.log(format_args!(
                "Found classpath entry {} in class loader {class_loader}",
                entry.location
            ));
        }
        state.seen.insert(entry.clone());
        state.entries.push(entry);
        true
    }

    /// Normalize a raw location string, then add it.
    pub fn add_classpath_element(
        &self,
        location: &str,
        class_loader: ObjectId,
        log: Option<&LogNode>,
    ) -> bool {
        match normalize_classpath_element(location) {
            Some(location) => self.add_classpath_entry(location, class_loader, log),
            None => false,
        }
    }

    /// Add several raw locations in order. Returns how many were new.
    pub fn add_classpath_elements<I, S>(
        &self,
        locations: I,
        class_loader: ObjectId,
        log: Option<&LogNode>,
    ) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        locations
            .into_iter()
            .filter(|location| self.add_classpath_element(location.as_ref(), class_loader, log))
            .count()
    }

    /// Append every entry of `other`, keeping its order.
    pub fn extend_from(&self, other: &ClasspathOrder) {
        for entry in other.get_order() {
            self.add_classpath_entry(entry.location, entry.class_loader, None);
        }
    }

    /// Snapshot of the entries in insertion order.
    pub fn get_order(&self) -> Vec<ClasspathEntry> {
        self.lock().entries.clone()
    }

    /// Locations in insertion order, keeping only the first loader that contributed each.
    pub fn unique_locations(&self) -> Vec<String> {
        let state = self.lock();
        let mut seen = HashSet::new();
        state
            .entries
            .iter()
            .filter(|entry| seen.insert(entry.location.as_str()))
            .map(|entry| entry.location.clone())
            .collect()
    }

    pub fn into_entries(self) -> Vec<ClasspathEntry> {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, OrderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
