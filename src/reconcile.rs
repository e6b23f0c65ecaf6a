use crate::session::SourceId;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reconciled {
    pub enabled: BTreeSet<SourceId>,
    pub known: BTreeSet<SourceId>,
}

/// Carries the user's enabled-source choices across a refetched source list.
///
/// Ids still present keep their previous state, ids missing from the last
/// snapshot are enabled, and ids that disappeared are dropped. An empty
/// previous selection enables everything, which is how the first fetch
/// bootstraps. Only one snapshot of history is kept, so an id that comes back
/// after dropping out of `previous_known` is treated as new.
pub fn reconcile(
    previous_enabled: &BTreeSet<SourceId>,
    previous_known: &BTreeSet<SourceId>,
    new_ids: &[SourceId],
) -> Reconciled {
    let known: BTreeSet<SourceId> = new_ids.iter().copied().collect();

    let enabled = if previous_enabled.is_empty() && !known.is_empty() {
        known.clone()
    } else {
        known
            .iter()
            .copied()
            .filter(|id| previous_enabled.contains(id) || !previous_known.contains(id))
            .collect()
    };

    Reconciled { enabled, known }
}

/// Enabled/known source sets for one workspace. `enabled ⊆ known` holds after
/// every operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSelection {
    enabled: BTreeSet<SourceId>,
    known: BTreeSet<SourceId>,
}

impl SourceSelection {
    pub fn enabled(&self) -> &BTreeSet<SourceId> {
        &self.enabled
    }

    pub fn known(&self) -> &BTreeSet<SourceId> {
        &self.known
    }

    pub fn is_enabled(&self, id: SourceId) -> bool {
        self.enabled.contains(&id)
    }

    pub fn reconcile(&mut self, new_ids: &[SourceId]) {
        let Reconciled { enabled, known } = reconcile(&self.enabled, &self.known, new_ids);
        self.enabled = enabled;
        self.known = known;
    }

    /// Returns false when `id` is not a known source.
    pub fn toggle(&mut self, id: SourceId) -> bool {
        if !self.known.contains(&id) {
            return false;
        }
        if !self.enabled.remove(&id) {
            self.enabled.insert(id);
        }
        true
    }

    pub fn set_all(&mut self, ids: &[SourceId]) {
        self.enabled = ids
            .iter()
            .copied()
            .filter(|id| self.known.contains(id))
            .collect();
    }

    pub fn clear(&mut self) {
        self.enabled.clear();
        self.known.clear();
    }
}
