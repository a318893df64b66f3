//! Catalog, order state and the session tying them together.

/// Dish catalog repository with import/export.
pub mod catalog;
/// Per-session quantities, active tab and submitted order.
pub mod order;
/// Session facade sequencing cross-component writes.
pub mod session;
/// Order summary builder.
pub mod summary;
