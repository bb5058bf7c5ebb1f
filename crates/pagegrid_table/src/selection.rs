//! Row selection that survives reloads.
//!
//! Live selection is kept by proxy. Before proxies are thrown away (reload,
//! eviction) the selected ones are stashed by identity, and re-selected when
//! a proxy with the same identity is loaded again.

use pagegrid_core::proxy::{BeanIdentity, ProxyId};
use std::collections::BTreeSet;

#[derive(Debug, Default)]
pub(crate) struct Selection {
    selected: BTreeSet<ProxyId>,
    pending: Vec<BeanIdentity>,
}

impl Selection {
    pub(crate) fn contains(&self, id: ProxyId) -> bool {
        self.selected.contains(&id)
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = ProxyId> + '_ {
        self.selected.iter().copied()
    }

    /// Replace the selection; stashed identities are forgotten.
    ///
    /// # Returns
    /// `true` if anything changed.
    pub(crate) fn set(&mut self, ids: impl IntoIterator<Item = ProxyId>) -> bool {
        let next: BTreeSet<ProxyId> = ids.into_iter().collect();
        let changed = next != self.selected || !self.pending.is_empty();
        self.selected = next;
        self.pending.clear();
        changed
    }

    pub(crate) fn remove(&mut self, id: ProxyId) -> bool {
        self.selected.remove(&id)
    }

    /// Move `id` out of the live selection, remembering `identity`.
    pub(crate) fn stash(&mut self, id: ProxyId, identity: BeanIdentity) -> bool {
        if !self.selected.remove(&id) {
            return false;
        }
        if !self.pending.contains(&identity) {
            self.pending.push(identity);
        }
        true
    }

    /// Select `id` if its identity was stashed.
    pub(crate) fn restore(&mut self, id: ProxyId, identity: &BeanIdentity) -> bool {
        let Some(index) = self.pending.iter().position(|pending| pending == identity) else {
            return false;
        };
        self.pending.swap_remove(index);
        self.selected.insert(id)
    }

    #[cfg(test)]
    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::Selection;
    use pagegrid_core::model::RecordId;
    use pagegrid_core::proxy::{BeanIdentity, RowProxy};

    #[test]
    fn stashed_identity_is_restored_on_new_proxy() {
        let old = RowProxy::dummy(None).id();
        let new = RowProxy::dummy(None).id();
        let identity = BeanIdentity::Record(RecordId::from("r7"));
        let mut selection = Selection::default();
        selection.set([old]);
        assert!(selection.stash(old, identity.clone()));
        assert!(!selection.contains(old));
        assert!(selection.has_pending());
        assert!(selection.restore(new, &identity));
        assert!(selection.contains(new));
        assert!(!selection.has_pending());
    }

    #[test]
    fn explicit_selection_drops_stash() {
        let old = RowProxy::dummy(None).id();
        let mut selection = Selection::default();
        selection.set([old]);
        selection.stash(old, BeanIdentity::Record(RecordId::from("a")));
        selection.set([]);
        assert!(!selection.has_pending());
    }
}
