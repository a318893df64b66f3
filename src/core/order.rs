use std::collections::BTreeMap;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    config::MenuConfig,
    dish::Dish,
    persist::{
        ACTIVE_CATEGORY_KEY, KeyValueStore, ORDER_SNAPSHOT_KEY, PersistResult, Persisted, QUANTITIES_KEY,
        WriteFailure, read_json, write_json,
    },
    types::{CategoryFilter, DishId, EpochMillis, Price, now_ms},
};

use super::{
    catalog::CatalogRepository,
    summary::{OrderLine, OrderSnapshot, OrderSummaryBuilder},
};

/// Submission refused; nothing was stored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitRejected {
    /// No dish has a positive quantity.
    #[error("no dishes selected")]
    EmptyOrder,
}

/// Live totals of the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderTotals {
    /// Sum of `quantity × current price`.
    pub total_price: Price,
    /// Sum of quantities of dishes still in the catalog.
    pub total_count: u64,
}

impl OrderTotals {
    /// Two-decimal display form of the total price.
    pub fn display_price(&self) -> String {
        self.total_price.to_string()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredOrder {
    is_submitted: bool,
    order_data: Option<OrderData>,
    timestamp: EpochMillis,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderData {
    items: Vec<OrderLine>,
    total_price: Price,
    total_count: u64,
    order_time: String,
}

impl From<&OrderSnapshot> for StoredOrder {
    fn from(snap: &OrderSnapshot) -> Self {
        Self {
            is_submitted: snap.submitted,
            order_data: Some(OrderData {
                items: snap.lines.clone(),
                total_price: snap.total_price,
                total_count: snap.total_count,
                order_time: snap.order_time.clone(),
            }),
            timestamp: snap.created_at,
        }
    }
}

impl StoredOrder {
    fn into_snapshot(self) -> Option<OrderSnapshot> {
        if !self.is_submitted {
            return None;
        }
        let data = self.order_data?;
        Some(OrderSnapshot {
            lines: data.items,
            total_price: data.total_price,
            total_count: data.total_count,
            created_at: self.timestamp,
            order_time: data.order_time,
            submitted: true,
        })
    }
}

/// Per-session selection: quantities, the active tab and the last submit.
///
/// Dishes are referenced by id only; ids that vanish from the catalog are
/// tolerated everywhere.
#[derive(Debug)]
pub struct OrderState<S> {
    store: S,
    quantities: HashMap<DishId, u32>,
    active: CategoryFilter,
    clear_on_submit: bool,
    order_ttl_ms: u64,
}

impl<S: KeyValueStore> OrderState<S> {
    /// Empty selection over `store`; nothing is read.
    pub fn new(store: S, config: &MenuConfig) -> Self {
        Self {
            store,
            quantities: HashMap::new(),
            active: CategoryFilter::All,
            clear_on_submit: config.clear_on_submit,
            order_ttl_ms: config.order_ttl_ms,
        }
    }

    /// Selection restored from `store`, checked against `catalog`.
    pub fn load(store: S, catalog: &CatalogRepository<S>, config: &MenuConfig) -> Self {
        let mut state = Self::new(store, config);
        state.restore_quantities(catalog);
        state.restore_active_category();
        state
    }

    /// Selected quantity of `id` (zero when unselected).
    pub fn quantity(&self, id: DishId) -> u32 {
        self.quantities.get(&id).copied().unwrap_or(0)
    }

    /// Sets the quantity of `id`, clamping negatives to zero.
    pub fn set_quantity(&mut self, id: DishId, n: i64) -> Persisted<u32> {
        let quantity = u32::try_from(n.max(0)).unwrap_or(u32::MAX);
        if quantity == 0 {
            self.quantities.remove(&id);
        } else {
            self.quantities.insert(id, quantity);
        }
        debug!(dish_id = id, quantity, "quantity set");
        Persisted::from_write(quantity, QUANTITIES_KEY, self.persist_quantities())
    }

    /// Adds one unit of `id`.
    pub fn increment(&mut self, id: DishId) -> Persisted<u32> {
        let next = i64::from(self.quantity(id)) + 1;
        self.set_quantity(id, next)
    }

    /// Removes one unit of `id`; a no-op at zero.
    pub fn decrement(&mut self, id: DishId) -> Persisted<u32> {
        match self.quantity(id) {
            0 => Persisted::durable(0),
            current => self.set_quantity(id, i64::from(current) - 1),
        }
    }

    /// Live totals using current catalog prices.
    pub fn totals(&self, catalog: &CatalogRepository<S>) -> OrderTotals {
        self.selected(catalog)
            .fold(OrderTotals::default(), |acc, (dish, quantity)| OrderTotals {
                total_price: acc.total_price + dish.price.times(quantity),
                total_count: acc.total_count + u64::from(quantity),
            })
    }

    /// Dishes with a positive quantity, in catalog order.
    pub fn selected<'a>(&'a self, catalog: &'a CatalogRepository<S>) -> impl Iterator<Item = (&'a Dish, u32)> + 'a {
        catalog
            .dishes()
            .iter()
            .map(|dish| (dish, self.quantity(dish.id)))
            .filter(|(_, quantity)| *quantity > 0)
    }

    /// Currently shown tab.
    pub fn active_category(&self) -> &CategoryFilter {
        &self.active
    }

    /// Switches tab and remembers it across reloads.
    pub fn set_active_category(&mut self, filter: CategoryFilter) -> Persisted<()> {
        let write = write_json(&self.store, ACTIVE_CATEGORY_KEY, &filter);
        if let Err(err) = &write {
            warn!(key = ACTIVE_CATEGORY_KEY, error = %err, "active category write failed");
        }
        self.active = filter;
        Persisted::from_write((), ACTIVE_CATEGORY_KEY, write)
    }

    /// Writes the full id to quantity mapping.
    pub fn persist_quantities(&self) -> PersistResult<()> {
        let ordered: BTreeMap<DishId, u32> = self.quantities.iter().map(|(id, q)| (*id, *q)).collect();
        let write = write_json(&self.store, QUANTITIES_KEY, &ordered);
        if let Err(err) = &write {
            warn!(key = QUANTITIES_KEY, error = %err, "quantities write failed");
        }
        write
    }

    /// Replaces in-memory quantities with the stored ones.
    ///
    /// Entries for dishes missing from `catalog` and malformed entries are
    /// skipped. Returns the number of restored entries.
    pub fn restore_quantities(&mut self, catalog: &CatalogRepository<S>) -> usize {
        self.quantities.clear();
        let stored: BTreeMap<String, Value> = match read_json(&self.store, QUANTITIES_KEY) {
            Ok(stored) => stored.unwrap_or_default(),
            Err(err) => {
                warn!(key = QUANTITIES_KEY, error = %err, "ignoring unreadable quantities");
                return 0;
            }
        };

        for (key, value) in stored {
            let Ok(id) = key.parse::<DishId>() else {
                continue;
            };
            let Some(quantity) = value.as_u64().and_then(|q| u32::try_from(q).ok()) else {
                continue;
            };
            if quantity == 0 || !catalog.contains(id) {
                continue;
            }
            self.quantities.insert(id, quantity);
        }
        debug!(restored = self.quantities.len(), "quantities restored");
        self.quantities.len()
    }

    /// Reads the remembered tab, defaulting to `all`.
    pub fn restore_active_category(&mut self) {
        self.active = match read_json::<CategoryFilter>(&self.store, ACTIVE_CATEGORY_KEY) {
            Ok(filter) => filter.unwrap_or_default(),
            Err(err) => {
                warn!(key = ACTIVE_CATEGORY_KEY, error = %err, "ignoring unreadable active category");
                CategoryFilter::All
            }
        };
    }

    /// Freezes the selection into a stored [`OrderSnapshot`].
    pub fn submit(&mut self, catalog: &CatalogRepository<S>) -> Result<Persisted<OrderSnapshot>, SubmitRejected> {
        self.submit_at(catalog, now_ms())
    }

    /// [`OrderState::submit`] with an explicit clock.
    pub fn submit_at(
        &mut self,
        catalog: &CatalogRepository<S>,
        now: EpochMillis,
    ) -> Result<Persisted<OrderSnapshot>, SubmitRejected> {
        if self.totals(catalog).total_count == 0 {
            debug!("submit rejected: empty order");
            return Err(SubmitRejected::EmptyOrder);
        }

        let snapshot = OrderSummaryBuilder::build(self.selected(catalog), now);
        let mut failure = write_json(&self.store, ORDER_SNAPSHOT_KEY, &StoredOrder::from(&snapshot))
            .err()
            .map(|source| {
                warn!(key = ORDER_SNAPSHOT_KEY, error = %source, "order snapshot write failed");
                WriteFailure {
                    key: ORDER_SNAPSHOT_KEY,
                    source,
                }
            });

        if self.clear_on_submit {
            self.quantities.clear();
            if let Err(source) = self.persist_quantities() {
                failure.get_or_insert(WriteFailure {
                    key: QUANTITIES_KEY,
                    source,
                });
            }
        }

        info!(
            total_price = %snapshot.total_price,
            total_count = snapshot.total_count,
            "order submitted"
        );
        Ok(Persisted {
            value: snapshot,
            write_failure: failure,
        })
    }

    /// Last submitted order, unless it has expired.
    pub fn restore_submitted_order(&self) -> Option<OrderSnapshot> {
        self.restore_submitted_order_at(now_ms())
    }

    /// [`OrderState::restore_submitted_order`] with an explicit clock.
    ///
    /// An expired snapshot is deleted from storage.
    pub fn restore_submitted_order_at(&self, now: EpochMillis) -> Option<OrderSnapshot> {
        let stored = match read_json::<StoredOrder>(&self.store, ORDER_SNAPSHOT_KEY) {
            Ok(stored) => stored?,
            Err(err) => {
                warn!(key = ORDER_SNAPSHOT_KEY, error = %err, "ignoring unreadable order snapshot");
                return None;
            }
        };

        if now.saturating_sub(stored.timestamp) > self.order_ttl_ms {
            info!(created_at = stored.timestamp, "discarding expired order snapshot");
            if let Err(err) = self.store.remove(ORDER_SNAPSHOT_KEY) {
                warn!(key = ORDER_SNAPSHOT_KEY, error = %err, "failed to discard expired order snapshot");
            }
            return None;
        }
        stored.into_snapshot()
    }

    /// Drops quantities of dishes no longer in `catalog` and persists the
    /// remainder when anything changed. Returns the number dropped.
    pub fn retain_catalog(&mut self, catalog: &CatalogRepository<S>) -> Persisted<usize> {
        let before = self.quantities.len();
        self.quantities.retain(|id, _| catalog.contains(*id));
        let dropped = before - self.quantities.len();
        if dropped == 0 {
            return Persisted::durable(0);
        }
        Persisted::from_write(dropped, QUANTITIES_KEY, self.persist_quantities())
    }

    /// Drops the in-memory quantity of a deleted dish.
    pub fn forget(&mut self, id: DishId) {
        self.quantities.remove(&id);
    }

    /// Clears in-memory quantities and the active tab; storage is untouched.
    pub fn reset(&mut self) {
        self.quantities.clear();
        self.active = CategoryFilter::All;
    }
}
