use serde_json::Value;
use tracing::{debug, info};

use crate::{
    config::MenuConfig,
    dish::{Dish, DishDraft, DishPatch, ValidationError},
    persist::{KeyValueStore, Persisted},
    photo::{ImageIngestPipeline, ImagePayload},
    types::{CategoryFilter, DishId, EpochMillis, now_ms},
};

use super::{
    catalog::{CatalogRepository, ExportedCatalog, ImportRejected},
    order::{OrderState, OrderTotals, SubmitRejected},
    summary::OrderSnapshot,
};

/// One menu over one store: the catalog, the selection and the photo pipeline.
///
/// Every user intent goes through here so that side effects spanning the
/// catalog and the order state happen in a fixed order.
#[derive(Debug)]
pub struct MenuSession<S> {
    catalog: CatalogRepository<S>,
    order: OrderState<S>,
    images: ImageIngestPipeline,
    config: MenuConfig,
}

impl<S: KeyValueStore> MenuSession<S> {
    /// Loads catalog and selection from `store`.
    pub fn open(store: S, config: MenuConfig) -> Self {
        let catalog = CatalogRepository::load(store.clone());
        let order = OrderState::load(store, &catalog, &config);
        info!(
            dishes = catalog.len(),
            source = ?catalog.loaded_from(),
            active = ?order.active_category(),
            "menu session opened"
        );
        Self {
            catalog,
            order,
            images: ImageIngestPipeline::from_config(&config),
            config,
        }
    }

    /// Catalog, read-only.
    pub fn catalog(&self) -> &CatalogRepository<S> {
        &self.catalog
    }

    /// Selection, read-only.
    pub fn order(&self) -> &OrderState<S> {
        &self.order
    }

    /// Photo pipeline for add/edit flows.
    pub fn images(&self) -> &ImageIngestPipeline {
        &self.images
    }

    /// Session configuration.
    pub fn config(&self) -> &MenuConfig {
        &self.config
    }

    /// Dishes of the active tab.
    pub fn visible_dishes(&self) -> Vec<Dish> {
        self.catalog.list_by_category(self.order.active_category())
    }

    /// See [`CatalogRepository::add`].
    pub fn add_dish(&mut self, draft: DishDraft) -> Result<Persisted<DishId>, ValidationError> {
        self.catalog.add(draft)
    }

    /// See [`CatalogRepository::update`].
    pub fn update_dish(&mut self, id: DishId, patch: &DishPatch) -> Result<Persisted<bool>, ValidationError> {
        self.catalog.update(id, patch)
    }

    /// Stores the outcome of a crop step on dish `id`.
    ///
    /// `None` (a cancelled crop) keeps the current image and returns `false`.
    pub fn set_dish_image(
        &mut self,
        id: DishId,
        payload: Option<ImagePayload>,
    ) -> Result<Persisted<bool>, ValidationError> {
        let Some(payload) = payload else {
            return Ok(Persisted::durable(false));
        };
        let patch = DishPatch {
            image: Some(payload.into_string()),
            ..DishPatch::default()
        };
        self.catalog.update(id, &patch)
    }

    /// Deletes a dish, then its stored and in-memory quantity.
    pub fn remove_dish(&mut self, id: DishId) -> Persisted<bool> {
        let out = self.catalog.remove(id);
        self.order.forget(id);
        out
    }

    /// Full session reset: default dishes, no selection, no stored order.
    pub fn clear_catalog(&mut self) -> Persisted<()> {
        let out = self.catalog.clear();
        self.order.reset();
        out
    }

    /// Imports dishes and drops quantities that no longer point anywhere.
    pub fn import_all(&mut self, records: &Value) -> Result<Persisted<usize>, ImportRejected> {
        let out = self.catalog.import_all(records)?;
        Ok(self.after_import(out))
    }

    /// Imports an export file or a bare dish array.
    pub fn import_json(&mut self, raw: &str) -> Result<Persisted<usize>, ImportRejected> {
        let out = self.catalog.import_json(raw)?;
        Ok(self.after_import(out))
    }

    /// See [`CatalogRepository::export_all`].
    pub fn export_all(&self) -> ExportedCatalog {
        self.catalog.export_all()
    }

    /// See [`OrderState::set_quantity`]. Ids missing from the catalog stay at zero.
    pub fn set_quantity(&mut self, id: DishId, n: i64) -> Persisted<u32> {
        if !self.knows(id) {
            return Persisted::durable(0);
        }
        self.order.set_quantity(id, n)
    }

    /// See [`OrderState::increment`]. Ids missing from the catalog stay at zero.
    pub fn increment(&mut self, id: DishId) -> Persisted<u32> {
        if !self.knows(id) {
            return Persisted::durable(0);
        }
        self.order.increment(id)
    }

    /// See [`OrderState::decrement`].
    pub fn decrement(&mut self, id: DishId) -> Persisted<u32> {
        if !self.knows(id) {
            return Persisted::durable(0);
        }
        self.order.decrement(id)
    }

    /// Live totals.
    pub fn totals(&self) -> OrderTotals {
        self.order.totals(&self.catalog)
    }

    /// See [`OrderState::set_active_category`].
    pub fn set_active_category(&mut self, filter: CategoryFilter) -> Persisted<()> {
        self.order.set_active_category(filter)
    }

    /// See [`OrderState::submit`].
    pub fn submit(&mut self) -> Result<Persisted<OrderSnapshot>, SubmitRejected> {
        self.submit_at(now_ms())
    }

    /// See [`OrderState::submit_at`].
    pub fn submit_at(&mut self, now: EpochMillis) -> Result<Persisted<OrderSnapshot>, SubmitRejected> {
        self.order.submit_at(&self.catalog, now)
    }

    /// See [`OrderState::restore_submitted_order`].
    pub fn restore_submitted_order(&self) -> Option<OrderSnapshot> {
        self.order.restore_submitted_order()
    }

    /// See [`OrderState::restore_submitted_order_at`].
    pub fn restore_submitted_order_at(&self, now: EpochMillis) -> Option<OrderSnapshot> {
        self.order.restore_submitted_order_at(now)
    }

    fn knows(&self, id: DishId) -> bool {
        let known = self.catalog.contains(id);
        if !known {
            debug!(dish_id = id, "ignoring quantity change for unknown dish");
        }
        known
    }

    fn after_import(&mut self, out: Persisted<usize>) -> Persisted<usize> {
        let pruned = self.order.retain_catalog(&self.catalog);
        Persisted {
            value: out.value,
            write_failure: out.write_failure.or(pruned.write_failure),
        }
    }
}
