//! Runtime event stream payloads.

use crate::types::{CategoryFilter, DishId, Price};

/// Events emitted from the single-writer runtime loop so the UI can re-render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuEvent {
    /// A dish was added.
    DishAdded {
        /// New dish id.
        id: DishId,
    },
    /// A dish was edited.
    DishUpdated {
        /// Edited dish id.
        id: DishId,
    },
    /// A dish was deleted.
    DishRemoved {
        /// Deleted dish id.
        id: DishId,
    },
    /// The catalog went back to the defaults and the selection was cleared.
    CatalogReset,
    /// The catalog was replaced by an import.
    CatalogImported {
        /// Number of imported dishes.
        count: usize,
    },
    /// A quantity changed.
    QuantityChanged {
        /// Dish id.
        id: DishId,
        /// New quantity.
        quantity: u32,
    },
    /// The active tab changed.
    ActiveCategoryChanged {
        /// New tab.
        filter: CategoryFilter,
    },
    /// An order was submitted.
    OrderSubmitted {
        /// Frozen total.
        total_price: Price,
        /// Frozen item count.
        total_count: u64,
    },
    /// A change was applied in memory but may not survive a reload.
    WriteFailed {
        /// Storage key that failed.
        key: &'static str,
    },
}
