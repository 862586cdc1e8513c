//! Default [`sop_core::traits::ItemActionTracker`].

use sop_core::traits::{ItemActionTracker, TrackedItemAction};

/// Plain append-only tracker of item actions for one transaction.
#[derive(Debug, Default)]
pub struct DefaultItemActionTracker {
    actions: Vec<TrackedItemAction>,
}

impl DefaultItemActionTracker {
    /// A fresh, empty tracker.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ItemActionTracker for DefaultItemActionTracker {
    fn record(&mut self, action: TrackedItemAction) {
        self.actions.push(action);
    }

    fn actions(&self) -> &[TrackedItemAction] {
        &self.actions
    }

    fn clear(&mut self) {
        self.actions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sop_core::traits::ItemAction;
    use uuid::Uuid;

    fn sample(action: ItemAction) -> TrackedItemAction {
        TrackedItemAction {
            item_id: Uuid::new_v4(),
            action,
            observed_version: 0,
            new_version_if_write: None,
            key: b"k".to_vec(),
        }
    }

    #[test]
    fn records_in_order() {
        let mut t = DefaultItemActionTracker::new();
        t.record(sample(ItemAction::Get));
        t.record(sample(ItemAction::Add));
        assert_eq!(t.actions().len(), 2);
        assert_eq!(t.actions()[0].action, ItemAction::Get);
        assert_eq!(t.actions()[1].action, ItemAction::Add);
    }

    #[test]
    fn clear_empties_the_tracker() {
        let mut t = DefaultItemActionTracker::new();
        t.record(sample(ItemAction::Update));
        t.clear();
        assert!(t.actions().is_empty());
    }
}
