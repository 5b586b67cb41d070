//! Suppression ledger: ids whose next local structural event is an echo.
//!
//! Callers `expect` an id right before a mutation they know will surface as
//! an added/removed event, and the event handler consumes it. Entries are
//! counted per id, not matched per message: an id expected twice and
//! observed once keeps one entry, which will swallow the next genuine event
//! for that id.

use std::collections::HashMap;

use tandem_core::SceneObject;

#[derive(Debug, Default, Clone)]
pub struct SuppressionLedger {
    pending: HashMap<String, usize>,
}

impl SuppressionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(&mut self, id: impl Into<String>) {
        *self.pending.entry(id.into()).or_insert(0) += 1;
    }

    pub fn expect_all<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            self.expect(id);
        }
    }

    /// True (and one entry fewer) if `id` was pending.
    pub fn consume(&mut self, id: &str) -> bool {
        match self.pending.get_mut(id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.pending.remove(id);
                true
            }
            None => false,
        }
    }

    pub fn pending(&self, id: &str) -> usize {
        self.pending.get(id).copied().unwrap_or(0)
    }

    /// Total outstanding expectations.
    pub fn len(&self) -> usize {
        self.pending.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Drops every object whose id is pending, consuming one entry each.
    /// Objects without an id are kept.
    pub fn filter_and_consume(&mut self, objects: Vec<SceneObject>) -> Vec<SceneObject> {
        objects
            .into_iter()
            .filter(|object| match object.id() {
                Some(id) => !self.consume(id),
                None => true,
            })
            .collect()
    }

    pub fn filter_ids(&mut self, ids: Vec<String>) -> Vec<String> {
        ids.into_iter().filter(|id| !self.consume(id)).collect()
    }
}
