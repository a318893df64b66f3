//! Restaurant self-ordering core: dish catalog, order quantities and
//! submitted-order snapshots, persisted in a key-value store.
//!
//! # Examples
//!
//! Direct use of [`core::session::MenuSession`] over an in-memory store:
//! ```
//! use dishorder::{
//!     config::MenuConfig,
//!     core::session::MenuSession,
//!     dish::DishDraft,
//!     persist::memory::MemoryKvStore,
//!     types::{Category, Price},
//! };
//!
//! let mut menu = MenuSession::open(MemoryKvStore::new(), MenuConfig::default());
//! let id = menu
//!     .add_dish(DishDraft {
//!         name: "Hot and Sour Soup".to_string(),
//!         price: Some(Price::from_units(16)),
//!         category: Some(Category::Hot),
//!         image: None,
//!     })
//!     .expect("valid dish")
//!     .value;
//! assert_eq!(id, 7);
//!
//! let _ = menu.set_quantity(id, 2);
//! assert_eq!(menu.totals().display_price(), "32.00");
//! let order = menu.submit().expect("non-empty order").value;
//! assert_eq!(order.total_count, 2);
//! ```
//!
//! Runtime usage with a SQLite-backed store:
//! ```no_run
//! use dishorder::{
//!     config::MenuConfig,
//!     core::session::MenuSession,
//!     persist::sqlite::SqliteKvStore,
//!     runtime::handle::{spawn_menu, QuantityChange},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = SqliteKvStore::open("menu.db").expect("open sqlite");
//! let handle = spawn_menu(MenuSession::open(store, MenuConfig::default()));
//! let _ = handle.change_quantity(1, QuantityChange::Increment).await.expect("quantity");
//! let totals = handle.totals().await.expect("totals");
//! println!("total: {}", totals.display_price());
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Session configuration.
pub mod config;
/// Catalog repository, order state, summaries and the session facade.
pub mod core;
/// Dish records, drafts and patches.
pub mod dish;
/// Key-value storage abstraction with in-memory and SQLite hosts.
pub mod persist;
/// Photo ingestion pipeline.
pub mod photo;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Shared primitive types.
pub mod types;
