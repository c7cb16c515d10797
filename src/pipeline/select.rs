//! Selection over a working set: which entries (and, for page-level tools,
//! which pages) participate in the next submission.
//!
//! Selection is Preview-phase state. It always holds a subset of the current
//! working set's ids — removing an entry removes it from the selection in
//! the same call, and [`SelectionState::prune`] repairs the invariant after
//! any external mutation. Ordering is not stored here: submission order is
//! the working set's order, filtered to the selected ids, so reordering the
//! set reorders the submission for free.

use std::collections::{BTreeSet, HashSet};

use crate::model::{FileEntry, WorkingSet};

/// The ids (and pages) marked for the next operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    selected: HashSet<String>,
    /// 1-indexed page numbers, for split-style tools. Sorted on read.
    pages: BTreeSet<usize>,
}

impl SelectionState {
    /// Empty selection.
    pub fn new() -> Self {
        SelectionState::default()
    }

    /// Select every entry in the set — the Preview page's starting state.
    pub fn all_of(ws: &WorkingSet) -> Self {
        SelectionState {
            selected: ws.entries.iter().map(|e| e.id.clone()).collect(),
            pages: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    /// Flip one entry's membership. Ids not in the working set are ignored.
    pub fn toggle(&mut self, ws: &WorkingSet, id: &str) {
        if !ws.contains(id) {
            return;
        }
        if !self.selected.remove(id) {
            self.selected.insert(id.to_string());
        }
    }

    pub fn select_all(&mut self, ws: &WorkingSet) {
        self.selected = ws.entries.iter().map(|e| e.id.clone()).collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Remove an entry from the backing working set and the selection.
    ///
    /// Selection size strictly decreases by 0 or 1 and the removed id is
    /// never referenced afterwards.
    pub fn remove(&mut self, ws: &mut WorkingSet, id: &str) -> Option<FileEntry> {
        let removed = ws.remove(id);
        self.selected.remove(id);
        if ws.is_empty() {
            self.pages.clear();
        }
        removed
    }

    /// Drop any selected id that no longer exists in the working set.
    pub fn prune(&mut self, ws: &WorkingSet) {
        self.selected.retain(|id| ws.contains(id));
        if ws.is_empty() {
            self.pages.clear();
        }
    }

    /// Selected entries in working-set order — the order a submission uses.
    pub fn selected_entries<'a>(&self, ws: &'a WorkingSet) -> Vec<&'a FileEntry> {
        ws.entries
            .iter()
            .filter(|e| self.selected.contains(&e.id))
            .collect()
    }

    // ── Page-level selection (split) ──────────────────────────────────────

    /// Flip one page's membership. Pages are 1-indexed and bounds-checked
    /// against the entry's known page count; with no known count the call
    /// is refused. Returns whether the toggle was applied.
    pub fn toggle_page(&mut self, entry: &FileEntry, page: usize) -> bool {
        let Some(count) = entry.page_count else {
            return false;
        };
        if page == 0 || page > count {
            return false;
        }
        if !self.pages.remove(&page) {
            self.pages.insert(page);
        }
        true
    }

    /// Select every page of the entry. Refused without a known page count.
    pub fn select_all_pages(&mut self, entry: &FileEntry) -> bool {
        let Some(count) = entry.page_count else {
            return false;
        };
        self.pages = (1..=count).collect();
        true
    }

    pub fn clear_pages(&mut self) {
        self.pages.clear();
    }

    /// Selected pages in ascending order.
    pub fn pages(&self) -> Vec<usize> {
        self.pages.iter().copied().collect()
    }

    pub fn page_selection_len(&self) -> usize {
        self.pages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(names: &[&str]) -> WorkingSet {
        let mut ws = WorkingSet::new();
        for name in names {
            ws.push(FileEntry::new(*name, "application/pdf", b"%PDF".to_vec()));
        }
        ws
    }

    #[test]
    fn starts_with_everything_selected() {
        let ws = set_of(&["a.pdf", "b.pdf", "c.pdf"]);
        let sel = SelectionState::all_of(&ws);
        assert_eq!(sel.len(), 3);
        for e in &ws.entries {
            assert!(sel.is_selected(&e.id));
        }
    }

    #[test]
    fn toggle_flips_membership() {
        let ws = set_of(&["a.pdf", "b.pdf"]);
        let mut sel = SelectionState::all_of(&ws);
        let id = ws.entries[0].id.clone();

        sel.toggle(&ws, &id);
        assert!(!sel.is_selected(&id));
        sel.toggle(&ws, &id);
        assert!(sel.is_selected(&id));

        // Unknown id: no effect.
        sel.toggle(&ws, "missing-id");
        assert_eq!(sel.len(), 2);
    }

    #[test]
    fn remove_shrinks_selection_by_at_most_one() {
        let mut ws = set_of(&["a.pdf", "b.pdf", "c.pdf"]);
        let mut sel = SelectionState::all_of(&ws);
        let id = ws.entries[1].id.clone();

        let before = sel.len();
        sel.remove(&mut ws, &id);
        assert_eq!(sel.len(), before - 1);
        assert!(!sel.is_selected(&id));
        assert!(!ws.contains(&id));

        // Removing again is a no-op on both sides.
        let before = sel.len();
        sel.remove(&mut ws, &id);
        assert_eq!(sel.len(), before);
    }

    #[test]
    fn removing_a_deselected_entry_leaves_selection_size() {
        let mut ws = set_of(&["a.pdf", "b.pdf"]);
        let mut sel = SelectionState::all_of(&ws);
        let id = ws.entries[0].id.clone();
        sel.toggle(&ws, &id);
        let before = sel.len();
        sel.remove(&mut ws, &id);
        assert_eq!(sel.len(), before);
    }

    #[test]
    fn selected_entries_follow_working_set_order() {
        let mut ws = set_of(&["a.pdf", "b.pdf", "c.pdf"]);
        let sel = SelectionState::all_of(&ws);

        ws.reorder(0, 2);
        let names: Vec<&str> = sel
            .selected_entries(&ws)
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, ["b.pdf", "c.pdf", "a.pdf"]);
    }

    #[test]
    fn prune_repairs_the_subset_invariant() {
        let mut ws = set_of(&["a.pdf", "b.pdf"]);
        let mut sel = SelectionState::all_of(&ws);
        // Mutate the set behind the selection's back.
        let id = ws.entries[0].id.clone();
        ws.remove(&id);
        sel.prune(&ws);
        assert_eq!(sel.len(), 1);
        assert!(!sel.is_selected(&id));
    }

    #[test]
    fn page_toggles_are_bounds_checked() {
        let mut entry = FileEntry::new("doc.pdf", "application/pdf", b"%PDF".to_vec());
        let mut sel = SelectionState::new();

        // Unknown page count: refused.
        assert!(!sel.toggle_page(&entry, 1));

        entry.page_count = Some(3);
        assert!(sel.toggle_page(&entry, 1));
        assert!(sel.toggle_page(&entry, 3));
        assert!(!sel.toggle_page(&entry, 0));
        assert!(!sel.toggle_page(&entry, 4));
        assert_eq!(sel.pages(), vec![1, 3]);

        assert!(sel.toggle_page(&entry, 1));
        assert_eq!(sel.pages(), vec![3]);
    }

    #[test]
    fn select_all_pages_covers_the_document() {
        let mut entry = FileEntry::new("doc.pdf", "application/pdf", b"%PDF".to_vec());
        entry.page_count = Some(4);
        let mut sel = SelectionState::new();
        assert!(sel.select_all_pages(&entry));
        assert_eq!(sel.pages(), vec![1, 2, 3, 4]);
        sel.clear_pages();
        assert!(sel.pages().is_empty());
    }

    #[test]
    fn emptying_the_set_clears_pages() {
        let mut ws = set_of(&["doc.pdf"]);
        ws.entries[0].page_count = Some(2);
        let mut sel = SelectionState::all_of(&ws);
        let entry = ws.entries[0].clone();
        sel.toggle_page(&entry, 1);

        let id = entry.id.clone();
        sel.remove(&mut ws, &id);
        assert!(sel.pages().is_empty());
    }
}
