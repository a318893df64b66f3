use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    dish::{Dish, DishDraft, DishPatch, RawDish, ValidationError, default_dishes},
    persist::{
        ACTIVE_CATEGORY_KEY, CATALOG_KEY, KeyValueStore, ORDER_SNAPSHOT_KEY, PersistResult, Persisted,
        QUANTITIES_KEY, WriteFailure, read_json, write_json,
    },
    types::{CategoryFilter, DishId, local_timestamp, now_ms},
};

/// Key holding the id high-water mark so deleted ids are never handed out again.
pub const NEXT_ID_KEY: &str = "catalog.nextId";

/// Version tag written into every export.
pub const EXPORT_VERSION: &str = "1.0";

/// Backup document produced by [`CatalogRepository::export_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedCatalog {
    /// Schema version tag.
    pub version: String,
    /// Human-readable local export time.
    pub export_time: String,
    /// Full dish list in display order.
    pub dishes: Vec<Dish>,
}

impl ExportedCatalog {
    /// Export file body.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Import payload refused; the catalog was left untouched.
#[derive(Debug, thiserror::Error)]
pub enum ImportRejected {
    /// Payload is not valid JSON.
    #[error("import payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Payload is neither a dish array nor an export document.
    #[error("import payload is not a dish list")]
    NotASequence,
    /// No element had a name, a price and a category.
    #[error("import payload contains no valid dishes")]
    NoValidRecords,
}

/// How [`CatalogRepository::load`] obtained its dishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Nothing stored yet; the default set was used.
    Seeded,
    /// Stored catalog was read (after legacy migration).
    Restored,
    /// Stored catalog was unreadable; the default set was used.
    Recovered,
}

/// Sole owner and writer of the dish list.
#[derive(Debug)]
pub struct CatalogRepository<S> {
    store: S,
    dishes: Vec<Dish>,
    next_id: DishId,
    loaded_from: LoadSource,
}

impl<S: KeyValueStore> CatalogRepository<S> {
    /// Loads the catalog from `store`, seeding or recovering with the defaults.
    pub fn load(store: S) -> Self {
        let (dishes, loaded_from) = match store.get(CATALOG_KEY) {
            Ok(None) => (default_dishes(), LoadSource::Seeded),
            Ok(Some(raw)) => match migrate_stored(&raw) {
                Some(dishes) => (dishes, LoadSource::Restored),
                None => {
                    warn!(key = CATALOG_KEY, "stored catalog is unreadable, falling back to defaults");
                    (default_dishes(), LoadSource::Recovered)
                }
            },
            Err(err) => {
                warn!(key = CATALOG_KEY, error = %err, "catalog read failed, falling back to defaults");
                (default_dishes(), LoadSource::Recovered)
            }
        };

        let stored_next = match read_json::<DishId>(&store, NEXT_ID_KEY) {
            Ok(next) => next.unwrap_or(1),
            Err(err) => {
                warn!(key = NEXT_ID_KEY, error = %err, "ignoring unreadable id high-water mark");
                1
            }
        };
        let next_id = stored_next.max(max_id(&dishes) + 1);

        debug!(count = dishes.len(), next_id, source = ?loaded_from, "catalog loaded");
        Self {
            store,
            dishes,
            next_id,
            loaded_from,
        }
    }

    /// Where the dishes came from at load time.
    pub fn loaded_from(&self) -> LoadSource {
        self.loaded_from
    }

    /// Storage handle shared with the order state.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Owned copy of every dish in display order.
    pub fn list(&self) -> Vec<Dish> {
        self.dishes.clone()
    }

    /// Borrowed view of every dish in display order.
    pub fn dishes(&self) -> &[Dish] {
        &self.dishes
    }

    /// Dishes passing `filter`; an unknown category yields an empty list.
    pub fn list_by_category(&self, filter: &CategoryFilter) -> Vec<Dish> {
        self.dishes
            .iter()
            .filter(|d| filter.matches(&d.category))
            .cloned()
            .collect()
    }

    /// Looks up one dish.
    pub fn get(&self, id: DishId) -> Option<&Dish> {
        self.dishes.iter().find(|d| d.id == id)
    }

    /// Looks up one dish and clones it.
    pub fn get_cloned(&self, id: DishId) -> Option<Dish> {
        self.get(id).cloned()
    }

    /// True when `id` names a dish in the catalog.
    pub fn contains(&self, id: DishId) -> bool {
        self.get(id).is_some()
    }

    /// Number of dishes.
    pub fn len(&self) -> usize {
        self.dishes.len()
    }

    /// True when the catalog holds no dishes.
    pub fn is_empty(&self) -> bool {
        self.dishes.is_empty()
    }

    /// Id the next added dish will receive.
    pub fn peek_next_id(&self) -> DishId {
        self.next_id
    }

    /// Validates and appends a new dish, returning its id.
    pub fn add(&mut self, draft: DishDraft) -> Result<Persisted<DishId>, ValidationError> {
        let id = self.next_id;
        let dish = draft.into_dish(id)?;
        self.next_id += 1;
        self.dishes.push(dish);
        info!(dish_id = id, "dish added");
        Ok(self.persist_catalog(id))
    }

    /// Applies `patch` to dish `id`. Returns `false` when no such dish exists.
    pub fn update(&mut self, id: DishId, patch: &DishPatch) -> Result<Persisted<bool>, ValidationError> {
        patch.validate()?;
        let Some(dish) = self.dishes.iter_mut().find(|d| d.id == id) else {
            return Ok(Persisted::durable(false));
        };
        patch.apply_to(dish);
        info!(dish_id = id, "dish updated");
        Ok(self.persist_catalog(true))
    }

    /// Deletes dish `id` and then its stored quantity.
    ///
    /// The quantity cleanup only runs after the catalog write succeeded.
    pub fn remove(&mut self, id: DishId) -> Persisted<bool> {
        let before = self.dishes.len();
        self.dishes.retain(|d| d.id != id);
        if self.dishes.len() == before {
            return Persisted::durable(false);
        }
        info!(dish_id = id, "dish removed");

        let written = self.persist_catalog(true);
        if written
            .write_failure
            .as_ref()
            .is_some_and(|f| f.key == CATALOG_KEY)
        {
            return written;
        }
        match drop_stored_quantity(&self.store, id) {
            Ok(()) => written,
            Err(source) => {
                warn!(dish_id = id, error = %source, "quantity cleanup failed");
                Persisted {
                    value: true,
                    write_failure: Some(WriteFailure {
                        key: QUANTITIES_KEY,
                        source,
                    }),
                }
            }
        }
    }

    /// Resets to the default dishes and purges every persisted order key.
    pub fn clear(&mut self) -> Persisted<()> {
        self.dishes = default_dishes();
        self.next_id = self.next_id.max(max_id(&self.dishes) + 1);
        info!("catalog reset to defaults");

        let mut failure = self.persist_catalog(()).write_failure;
        for key in [QUANTITIES_KEY, ACTIVE_CATEGORY_KEY, ORDER_SNAPSHOT_KEY] {
            if let Err(source) = self.store.remove(key) {
                warn!(key, error = %source, "failed to purge order state");
                failure.get_or_insert(WriteFailure { key, source });
            }
        }
        Persisted {
            value: (),
            write_failure: failure,
        }
    }

    /// Replaces the whole catalog with the valid records of `records`.
    ///
    /// Foreign ids are discarded; survivors are numbered from the current
    /// high-water mark upwards. Returns the number of imported dishes.
    pub fn import_all(&mut self, records: &Value) -> Result<Persisted<usize>, ImportRejected> {
        let Value::Array(items) = records else {
            warn!("import rejected: payload is not a list");
            return Err(ImportRejected::NotASequence);
        };

        let mut next_id = self.next_id;
        let imported: Vec<Dish> = items
            .iter()
            .filter_map(RawDish::from_value)
            .filter_map(|raw| {
                let dish = raw.into_imported(next_id)?;
                next_id += 1;
                Some(dish)
            })
            .collect();

        if imported.is_empty() {
            warn!(offered = items.len(), "import rejected: no valid dishes");
            return Err(ImportRejected::NoValidRecords);
        }

        let count = imported.len();
        self.dishes = imported;
        self.next_id = next_id;
        info!(count, skipped = items.len() - count, "catalog imported");
        Ok(self.persist_catalog(count))
    }

    /// Imports an export file or a bare dish array.
    pub fn import_json(&mut self, raw: &str) -> Result<Persisted<usize>, ImportRejected> {
        let value: Value = serde_json::from_str(raw)?;
        match value {
            Value::Object(mut doc) => match doc.remove("dishes") {
                Some(dishes) => self.import_all(&dishes),
                None => Err(ImportRejected::NotASequence),
            },
            other => self.import_all(&other),
        }
    }

    /// Backup document of the current catalog.
    pub fn export_all(&self) -> ExportedCatalog {
        ExportedCatalog {
            version: EXPORT_VERSION.to_string(),
            export_time: local_timestamp(now_ms()),
            dishes: self.list(),
        }
    }

    fn persist_catalog<T>(&self, value: T) -> Persisted<T> {
        if let Err(source) = write_json(&self.store, CATALOG_KEY, &self.dishes) {
            warn!(key = CATALOG_KEY, error = %source, "catalog write failed; change may not survive a reload");
            return Persisted {
                value,
                write_failure: Some(WriteFailure {
                    key: CATALOG_KEY,
                    source,
                }),
            };
        }
        let mark = write_json(&self.store, NEXT_ID_KEY, &self.next_id);
        if let Err(err) = &mark {
            warn!(key = NEXT_ID_KEY, error = %err, "id high-water mark write failed");
        }
        Persisted::from_write(value, NEXT_ID_KEY, mark)
    }
}

fn max_id(dishes: &[Dish]) -> DishId {
    dishes.iter().map(|d| d.id).max().unwrap_or(0)
}

fn migrate_stored(raw: &str) -> Option<Vec<Dish>> {
    let Value::Array(items) = serde_json::from_str::<Value>(raw).ok()? else {
        return None;
    };

    let mut dishes: Vec<Dish> = Vec::with_capacity(items.len());
    for item in &items {
        let Some(dish) = RawDish::from_value(item).and_then(RawDish::migrate) else {
            warn!(record = %item, "dropping unreadable stored dish");
            continue;
        };
        if dishes.iter().any(|d| d.id == dish.id) {
            warn!(dish_id = dish.id, "dropping stored dish with duplicate id");
            continue;
        }
        dishes.push(dish);
    }
    Some(dishes)
}

fn drop_stored_quantity(store: &impl KeyValueStore, id: DishId) -> PersistResult<()> {
    let mut counts: BTreeMap<String, Value> = match read_json(store, QUANTITIES_KEY) {
        Ok(Some(counts)) => counts,
        Ok(None) => return Ok(()),
        Err(err) => {
            // Stale keys are ignored on restore, so an unreadable map is left alone.
            debug!(error = %err, "skipping cleanup of unreadable quantities");
            return Ok(());
        }
    };
    if counts.remove(&id.to_string()).is_some() {
        write_json(store, QUANTITIES_KEY, &counts)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        dish::PLACEHOLDER_IMAGE,
        persist::memory::MemoryKvStore,
        types::{Category, Price},
    };

    fn draft(name: &str, units: u64, category: Category) -> DishDraft {
        DishDraft {
            name: name.to_string(),
            price: Some(Price::from_units(units)),
            category: Some(category),
            image: None,
        }
    }

    fn empty_repo() -> CatalogRepository<MemoryKvStore> {
        let store = MemoryKvStore::new();
        store.set(CATALOG_KEY, "[]").expect("seed");
        CatalogRepository::load(store)
    }

    #[test]
    fn fresh_store_seeds_defaults() {
        let repo = CatalogRepository::load(MemoryKvStore::new());
        assert_eq!(repo.loaded_from(), LoadSource::Seeded);
        assert_eq!(repo.len(), 6);
        assert_eq!(repo.peek_next_id(), 7);
    }

    #[test]
    fn corrupt_catalog_recovers_defaults() {
        let store = MemoryKvStore::new();
        store.set(CATALOG_KEY, "{{{").expect("set");
        let repo = CatalogRepository::load(store);
        assert_eq!(repo.loaded_from(), LoadSource::Recovered);
        assert_eq!(repo.len(), 6);
    }

    #[test]
    fn legacy_records_are_backfilled_on_load() {
        let store = MemoryKvStore::new();
        store
            .set(CATALOG_KEY, r#"[{"id":2,"name":"Noodles","price":"15","category":"hot"}]"#)
            .expect("set");
        let repo = CatalogRepository::load(store);
        assert_eq!(repo.loaded_from(), LoadSource::Restored);
        let dish = repo.get(2).expect("dish");
        assert_eq!(dish.price, Price::from_units(15));
        assert_eq!(dish.image, PLACEHOLDER_IMAGE);
        assert_eq!(repo.peek_next_id(), 3);
    }

    #[test]
    fn first_id_in_empty_catalog_is_one() {
        let mut repo = empty_repo();
        let id = repo.add(draft("Rice", 2, Category::Snack)).expect("add").value;
        assert_eq!(id, 1);
    }

    #[test]
    fn deleted_ids_are_not_reused() {
        let mut repo = empty_repo();
        for name in ["a", "b", "c"] {
            let _ = repo.add(draft(name, 1, Category::Hot)).expect("add");
        }
        assert!(repo.remove(3).value);
        let id = repo.add(draft("d", 1, Category::Hot)).expect("add").value;
        assert_eq!(id, 4);

        let reloaded = CatalogRepository::load(repo.store().clone());
        assert_eq!(reloaded.peek_next_id(), 5);
    }

    #[test]
    fn add_rejects_invalid_draft_without_writing() {
        let mut repo = empty_repo();
        let err = repo.add(draft("   ", 1, Category::Hot)).expect_err("empty name");
        assert_eq!(err, ValidationError::EmptyName);
        assert!(repo.is_empty());
        assert_eq!(repo.peek_next_id(), 1);
    }

    #[test]
    fn blank_category_is_rejected_before_anything_is_stored() {
        let mut repo = empty_repo();
        let err = repo
            .add(draft("Ghost", 1, Category::from("")))
            .expect_err("blank category");
        assert_eq!(err, ValidationError::MissingCategory);

        let id = repo.add(draft("Tofu", 1, Category::Other("vegan".to_string()))).expect("add").value;
        let blank = DishPatch {
            category: Some(Category::Other(" ".to_string())),
            ..DishPatch::default()
        };
        assert_eq!(repo.update(id, &blank).expect_err("blank"), ValidationError::MissingCategory);

        let reloaded = CatalogRepository::load(repo.store().clone());
        assert_eq!(reloaded.list(), repo.list());
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn update_repins_identity_and_reports_missing() {
        let mut repo = CatalogRepository::load(MemoryKvStore::new());
        let patch = DishPatch {
            price: Some(Price::from_units(99)),
            ..DishPatch::default()
        };
        assert!(repo.update(1, &patch).expect("valid").value);
        assert_eq!(repo.get(1).map(|d| d.price), Some(Price::from_units(99)));
        assert!(!repo.update(404, &patch).expect("valid").value);
    }

    #[test]
    fn remove_cleans_stored_quantity() {
        let mut repo = CatalogRepository::load(MemoryKvStore::new());
        repo.store()
            .set(QUANTITIES_KEY, r#"{"5":2,"1":1}"#)
            .expect("set");
        let out = repo.remove(5);
        assert!(out.value && out.is_durable());
        let counts: BTreeMap<String, u32> = read_json(repo.store(), QUANTITIES_KEY)
            .expect("read")
            .expect("present");
        assert_eq!(counts.get("5"), None);
        assert_eq!(counts.get("1"), Some(&1));
    }

    #[test]
    fn failed_catalog_write_skips_quantity_cleanup() {
        let mut repo = CatalogRepository::load(MemoryKvStore::new());
        repo.store().set(QUANTITIES_KEY, r#"{"5":2}"#).expect("set");
        repo.store().reject_writes(true);

        let out = repo.remove(5);
        assert!(out.value, "in-memory removal is kept");
        assert_eq!(out.write_failure.as_ref().map(|f| f.key), Some(CATALOG_KEY));
        assert!(!repo.contains(5));

        repo.store().reject_writes(false);
        assert_eq!(
            repo.store().get(QUANTITIES_KEY).expect("get").as_deref(),
            Some(r#"{"5":2}"#)
        );
    }

    #[test]
    fn clear_restores_defaults_and_purges_order_keys() {
        let mut repo = empty_repo();
        for key in [QUANTITIES_KEY, ACTIVE_CATEGORY_KEY, ORDER_SNAPSHOT_KEY] {
            repo.store().set(key, "{}").expect("set");
        }
        assert!(repo.clear().is_durable());
        assert_eq!(repo.len(), 6);
        for key in [QUANTITIES_KEY, ACTIVE_CATEGORY_KEY, ORDER_SNAPSHOT_KEY] {
            assert!(repo.store().get(key).expect("get").is_none());
        }
    }

    #[test]
    fn import_rekeys_above_current_maximum() {
        let mut repo = CatalogRepository::load(MemoryKvStore::new());
        let out = repo
            .import_all(&json!([
                {"id": 1, "name": "A", "price": 3, "category": "hot"},
                {"id": 1, "name": "", "price": 3, "category": "hot"},
                {"id": 1, "name": "B", "price": "4.5", "category": "cold"}
            ]))
            .expect("import");
        assert_eq!(out.value, 2);
        let ids: Vec<DishId> = repo.dishes().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![7, 8]);
    }

    #[test]
    fn import_rejections_leave_catalog_untouched() {
        let mut repo = CatalogRepository::load(MemoryKvStore::new());
        let before = repo.list();
        assert!(matches!(
            repo.import_all(&json!([{"name": "", "price": 5, "category": "hot"}])),
            Err(ImportRejected::NoValidRecords)
        ));
        assert!(matches!(
            repo.import_all(&json!({"name": "A"})),
            Err(ImportRejected::NotASequence)
        ));
        assert!(matches!(repo.import_json("[oops"), Err(ImportRejected::Malformed(_))));
        assert_eq!(repo.list(), before);
    }

    #[test]
    fn import_json_accepts_export_document() {
        let mut source = CatalogRepository::load(MemoryKvStore::new());
        let doc = source.export_all().to_json_pretty().expect("export");
        let _ = source.remove(1);

        let mut target = empty_repo();
        let out = target.import_json(&doc).expect("import");
        assert_eq!(out.value, 6);
        assert_eq!(target.get(1).map(|d| d.price), Some(Price::from_units(88)));
    }

    #[test]
    fn unknown_category_lists_nothing() {
        let repo = CatalogRepository::load(MemoryKvStore::new());
        assert!(repo.list_by_category(&"dessert".into()).is_empty());
        assert_eq!(repo.list_by_category(&CategoryFilter::All).len(), 6);
        assert_eq!(repo.list_by_category(&"hot".into()).len(), 2);
    }
}
