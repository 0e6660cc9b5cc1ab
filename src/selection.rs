//! Selection set for bulk operations
//!
//! The selection is always a subset of the currently visible (filtered) lead
//! ids: selecting a hidden id is refused, and narrowing the visible set drops
//! any selected id that fell out of it.

use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    visible: BTreeSet<String>,
    selected: BTreeSet<String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `visible` ids and nothing selected
    pub fn with_visible<I, S>(visible: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            visible: visible.into_iter().map(Into::into).collect(),
            selected: BTreeSet::new(),
        }
    }

    /// Replace the visible ids (e.g. after a filter change or refetch).
    pub fn set_visible<I, S>(&mut self, visible: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.visible = visible.into_iter().map(Into::into).collect();
        let visible = &self.visible;
        self.selected.retain(|id| visible.contains(id));
    }

    /// Select a visible id. Returns false when the id is not visible.
    pub fn select(&mut self, id: &str) -> bool {
        if !self.visible.contains(id) {
            return false;
        }
        self.selected.insert(id.to_string());
        true
    }

    pub fn deselect(&mut self, id: &str) -> bool {
        self.selected.remove(id)
    }

    /// Flip selection of a visible id; returns whether it is now selected.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.selected.remove(id) {
            false
        } else {
            self.select(id)
        }
    }

    pub fn select_all_visible(&mut self) {
        self.selected = self.visible.clone();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Selected ids in sorted order
    pub fn ids(&self) -> Vec<String> {
        self.selected.iter().cloned().collect()
    }

    pub fn visible(&self) -> &BTreeSet<String> {
        &self.visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_visible_ids_selectable() {
        let mut sel = SelectionSet::with_visible(["L1", "L2"]);
        assert!(sel.select("L1"));
        assert!(!sel.select("L9"));
        assert_eq!(sel.ids(), vec!["L1".to_string()]);
    }

    #[test]
    fn test_narrowing_visible_drops_hidden() {
        let mut sel = SelectionSet::with_visible(["L1", "L2", "L3"]);
        sel.select_all_visible();
        sel.set_visible(["L2", "L3", "L4"]);
        assert_eq!(sel.ids(), vec!["L2".to_string(), "L3".to_string()]);
        assert!(sel.ids().iter().all(|id| sel.visible().contains(id)));
    }

    #[test]
    fn test_toggle_and_clear() {
        let mut sel = SelectionSet::with_visible(["L1"]);
        assert!(sel.toggle("L1"));
        assert!(sel.is_selected("L1"));
        assert!(!sel.toggle("L1"));
        assert!(sel.is_empty());
        assert!(!sel.toggle("L2"));

        sel.select("L1");
        sel.clear();
        assert_eq!(sel.len(), 0);
        assert_eq!(sel.visible().len(), 1);
    }
}
