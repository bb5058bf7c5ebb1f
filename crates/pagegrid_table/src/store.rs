//! Sparse page cache plus the locally added rows.
//!
//! Row layout: paged rows `0..paged_rows()`, then added rows, then the
//! optional trailing new-row editor. Within a loaded page a `None` slot means
//! the row is known to exist but was not fetched yet; a missing page key
//! means the page was never requested.

use pagegrid_core::proxy::ProxyId;
use std::collections::{BTreeMap, BTreeSet};

pub(crate) type Page = Vec<Option<ProxyId>>;

/// Where a row index points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowLocation {
    Paged { page: usize, slot: usize },
    Added(usize),
    LastRowDummy,
    OutOfRange,
}

#[derive(Debug)]
pub(crate) struct PageStore {
    page_size: usize,
    pages: BTreeMap<usize, Page>,
    added: Vec<ProxyId>,
    last_row_dummy: Option<ProxyId>,
    counted: Option<usize>,
    optimistic: usize,
}

impl PageStore {
    pub(crate) fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            pages: BTreeMap::new(),
            added: Vec::new(),
            last_row_dummy: None,
            counted: None,
            optimistic: 0,
        }
    }

    pub(crate) fn page_size(&self) -> usize {
        self.page_size
    }

    /// `max(counted, optimistic)`.
    pub(crate) fn paged_rows(&self) -> usize {
        self.counted.unwrap_or(0).max(self.optimistic)
    }

    pub(crate) fn row_count(&self) -> usize {
        self.paged_rows() + self.added.len() + usize::from(self.last_row_dummy.is_some())
    }

    pub(crate) fn counted(&self) -> Option<usize> {
        self.counted
    }

    pub(crate) fn set_counted(&mut self, counted: Option<usize>) {
        self.counted = counted;
    }

    pub(crate) fn optimistic(&self) -> usize {
        self.optimistic
    }

    pub(crate) fn set_optimistic(&mut self, rows: usize) {
        self.optimistic = rows;
    }

    pub(crate) fn raise_optimistic(&mut self, rows: usize) {
        self.optimistic = self.optimistic.max(rows);
    }

    pub(crate) fn page_start(&self, page: usize) -> usize {
        page * self.page_size
    }

    /// Number of rows page `page` should hold given the current row count.
    pub(crate) fn page_bound(&self, page: usize) -> usize {
        self.paged_rows()
            .saturating_sub(self.page_start(page))
            .min(self.page_size)
    }

    pub(crate) fn last_page_index(&self) -> usize {
        self.paged_rows().saturating_sub(1) / self.page_size
    }

    /// `true` if `page` is the last page as far as the table knows.
    pub(crate) fn is_last_page(&self, page: usize) -> bool {
        page >= self.last_page_index() && self.pages.range(page + 1..).next().is_none()
    }

    /// Edge pages load without delay.
    pub(crate) fn is_edge_page(&self, page: usize) -> bool {
        page == 0 || page >= self.last_page_index()
    }

    pub(crate) fn locate(&self, row: usize) -> RowLocation {
        let paged = self.paged_rows();
        if row < paged {
            return RowLocation::Paged {
                page: row / self.page_size,
                slot: row % self.page_size,
            };
        }
        let index = row - paged;
        if index < self.added.len() {
            return RowLocation::Added(index);
        }
        if index == self.added.len() && self.last_row_dummy.is_some() {
            return RowLocation::LastRowDummy;
        }
        RowLocation::OutOfRange
    }

    /// Proxy currently shown at `row`, without triggering any load.
    pub(crate) fn slot(&self, row: usize) -> Option<ProxyId> {
        match self.locate(row) {
            RowLocation::Paged { page, slot } => {
                self.pages.get(&page).and_then(|p| p.get(slot).copied().flatten())
            }
            RowLocation::Added(index) => self.added.get(index).copied(),
            RowLocation::LastRowDummy => self.last_row_dummy,
            RowLocation::OutOfRange => None,
        }
    }

    /// Row index of `id`, if it is visible in the store.
    pub(crate) fn row_of(&self, id: ProxyId) -> Option<usize> {
        for (page, slots) in &self.pages {
            if let Some(slot) = slots.iter().position(|slot| *slot == Some(id)) {
                let row = self.page_start(*page) + slot;
                return (row < self.paged_rows()).then_some(row);
            }
        }
        let paged = self.paged_rows();
        if let Some(index) = self.added.iter().position(|added| *added == id) {
            return Some(paged + index);
        }
        (self.last_row_dummy == Some(id)).then_some(paged + self.added.len())
    }

    pub(crate) fn page(&self, page: usize) -> Option<&Page> {
        self.pages.get(&page)
    }

    pub(crate) fn page_mut(&mut self, page: usize) -> Option<&mut Page> {
        self.pages.get_mut(&page)
    }

    pub(crate) fn contains_page(&self, page: usize) -> bool {
        self.pages.contains_key(&page)
    }

    pub(crate) fn insert_page(&mut self, page: usize, slots: Page) -> Option<Page> {
        self.pages.insert(page, slots)
    }

    pub(crate) fn remove_page(&mut self, page: usize) -> Option<Page> {
        self.pages.remove(&page)
    }

    pub(crate) fn page_indices(&self) -> Vec<usize> {
        self.pages.keys().copied().collect()
    }

    /// Distinct proxies referenced by `page`.
    pub(crate) fn page_ids(&self, page: usize) -> Vec<ProxyId> {
        let mut seen = BTreeSet::new();
        self.pages
            .get(&page)
            .into_iter()
            .flatten()
            .flatten()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Drop every row at or beyond `rows` from the paged area.
    ///
    /// # Returns
    /// Proxies that are no longer referenced.
    pub(crate) fn truncate(&mut self, rows: usize) -> Vec<ProxyId> {
        let mut released = Vec::new();
        let first_gone = rows.div_ceil(self.page_size);
        for (_, slots) in self.pages.split_off(&first_gone) {
            released.extend(slots.into_iter().flatten());
        }
        if rows % self.page_size != 0 {
            let page = rows / self.page_size;
            let keep = rows - self.page_start(page);
            if let Some(slots) = self.pages.get_mut(&page) {
                if slots.len() > keep {
                    released.extend(slots.drain(keep..).flatten());
                }
            }
        }
        self.optimistic = rows;
        if self.counted.is_some_and(|counted| counted > rows) {
            self.counted = Some(rows);
        }
        released.sort();
        released.dedup();
        released.retain(|id| !self.references(*id));
        released
    }

    fn references(&self, id: ProxyId) -> bool {
        self.pages
            .values()
            .any(|slots| slots.contains(&Some(id)))
    }

    /// Forget every page and both row counts; added rows stay.
    ///
    /// # Returns
    /// Every proxy that was referenced by a page.
    pub(crate) fn clear_pages(&mut self) -> Vec<ProxyId> {
        let mut released: Vec<ProxyId> = std::mem::take(&mut self.pages)
            .into_values()
            .flatten()
            .flatten()
            .collect();
        released.sort();
        released.dedup();
        self.counted = None;
        self.optimistic = 0;
        released
    }

    pub(crate) fn added(&self) -> &[ProxyId] {
        &self.added
    }

    pub(crate) fn push_added(&mut self, id: ProxyId) -> usize {
        self.added.push(id);
        self.paged_rows() + self.added.len() - 1
    }

    pub(crate) fn remove_added(&mut self, id: ProxyId) -> bool {
        let before = self.added.len();
        self.added.retain(|added| *added != id);
        self.added.len() != before
    }

    pub(crate) fn last_row_dummy(&self) -> Option<ProxyId> {
        self.last_row_dummy
    }

    pub(crate) fn set_last_row_dummy(&mut self, id: Option<ProxyId>) {
        self.last_row_dummy = id;
    }
}
