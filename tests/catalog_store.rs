use serde_json::json;

use dishorder::{
    core::catalog::{CatalogRepository, EXPORT_VERSION, ImportRejected},
    dish::{DishDraft, DishPatch, PLACEHOLDER_IMAGE},
    persist::{CATALOG_KEY, KeyValueStore, memory::MemoryKvStore},
    types::{Category, CategoryFilter, DishId, Price},
};

fn draft(name: &str, units: u64, category: Category) -> DishDraft {
    DishDraft {
        name: name.to_string(),
        price: Some(Price::from_units(units)),
        category: Some(category),
        image: None,
    }
}

fn empty_catalog() -> CatalogRepository<MemoryKvStore> {
    let store = MemoryKvStore::new();
    store.set(CATALOG_KEY, "[]").expect("seed empty");
    CatalogRepository::load(store)
}

#[test]
fn add_yields_monotonic_ids_across_deletes() {
    let mut repo = empty_catalog();
    let mut ids = Vec::new();
    for name in ["Crayfish", "Clams", "Cucumber"] {
        ids.push(repo.add(draft(name, 10, Category::Hot)).expect("add").value);
    }
    assert_eq!(ids, vec![1, 2, 3]);

    assert!(repo.remove(3).value);
    let next = repo.add(draft("Skewer", 5, Category::Snack)).expect("add").value;
    assert_eq!(next, 4);
}

#[test]
fn list_returns_an_independent_copy() {
    let mut repo = CatalogRepository::load(MemoryKvStore::new());
    let mut copy = repo.list();
    copy[0].name = "Changed".to_string();
    copy.clear();
    assert_eq!(repo.len(), 6);
    assert_ne!(repo.get(1).map(|d| d.name.as_str()), Some("Changed"));

    let _ = repo
        .update(
            1,
            &DishPatch {
                name: Some("Renamed".to_string()),
                ..DishPatch::default()
            },
        )
        .expect("update");
    assert_eq!(repo.get(1).map(|d| d.name.as_str()), Some("Renamed"));
}

#[test]
fn export_then_import_preserves_dish_content() {
    let mut repo = CatalogRepository::load(MemoryKvStore::new());
    let _ = repo
        .add(DishDraft {
            image: Some("data:image/jpeg;base64,AAAA".to_string()),
            ..draft("Tea Eggs", 2, Category::Other("breakfast".to_string()))
        })
        .expect("add");

    let exported = repo.export_all();
    assert_eq!(exported.version, EXPORT_VERSION);
    assert!(!exported.export_time.is_empty());

    let records = serde_json::to_value(&exported.dishes).expect("serialize");
    let out = repo.import_all(&records).expect("import");
    assert_eq!(out.value, exported.dishes.len());

    let content = |dishes: &[dishorder::dish::Dish]| -> Vec<(String, Price, Category, String)> {
        dishes
            .iter()
            .map(|d| (d.name.clone(), d.price, d.category.clone(), d.image.clone()))
            .collect()
    };
    assert_eq!(content(repo.dishes()), content(&exported.dishes));

    let old_ids: Vec<DishId> = exported.dishes.iter().map(|d| d.id).collect();
    let max_old = old_ids.iter().copied().max().unwrap_or(0);
    assert!(repo.dishes().iter().all(|d| d.id > max_old));
}

#[test]
fn import_with_only_invalid_records_changes_nothing() {
    let mut repo = CatalogRepository::load(MemoryKvStore::new());
    let before = repo.list();
    let stored_before = repo.store().get(CATALOG_KEY).expect("get");

    let res = repo.import_all(&json!([{"name": "", "price": 5, "category": "hot"}]));
    assert!(matches!(res, Err(ImportRejected::NoValidRecords)));
    let res = repo.import_all(&json!("not a list"));
    assert!(matches!(res, Err(ImportRejected::NotASequence)));

    assert_eq!(repo.list(), before);
    assert_eq!(repo.store().get(CATALOG_KEY).expect("get"), stored_before);
}

#[test]
fn import_backfills_missing_images() {
    let mut repo = empty_catalog();
    let _ = repo
        .import_json(r#"{"version":"0.9","exportTime":"x","dishes":[{"name":"Bun","price":1.5,"category":"snack"}]}"#)
        .expect("import");
    let dish = &repo.dishes()[0];
    assert_eq!(dish.image, PLACEHOLDER_IMAGE);
    assert_eq!(dish.price, Price::from_cents(150));
}

#[test]
fn category_filter_is_exact_and_never_errors() {
    let repo = CatalogRepository::load(MemoryKvStore::new());
    assert!(repo.list_by_category(&CategoryFilter::from("dessert")).is_empty());
    let snacks = repo.list_by_category(&CategoryFilter::Only(Category::Snack));
    assert_eq!(snacks.iter().map(|d| d.id).collect::<Vec<_>>(), vec![5, 6]);
    assert_eq!(repo.list_by_category(&CategoryFilter::All), repo.list());
}

#[test]
fn quota_failure_keeps_in_memory_change() {
    let store = MemoryKvStore::with_quota(4096);
    let mut repo = CatalogRepository::load(store);
    let huge = format!("data:image/jpeg;base64,{}", "A".repeat(8192));
    let out = repo
        .add(DishDraft {
            image: Some(huge),
            ..draft("Whole Fish", 120, Category::Hot)
        })
        .expect("valid");

    let failure = out.write_failure.as_ref().expect("write should fail");
    assert_eq!(failure.key, CATALOG_KEY);
    assert!(repo.contains(out.value));

    let reloaded = CatalogRepository::load(repo.store().clone());
    assert!(!reloaded.contains(out.value));
}
