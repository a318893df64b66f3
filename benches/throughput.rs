use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use dishorder::{
    config::MenuConfig,
    core::{catalog::CatalogRepository, session::MenuSession},
    dish::DishDraft,
    persist::memory::MemoryKvStore,
    types::{Category, CategoryFilter, DishId, Price},
};

fn draft(i: u64) -> DishDraft {
    let category = match i % 4 {
        0 => Category::Hot,
        1 => Category::Cold,
        2 => Category::Snack,
        _ => Category::Other("drinks".to_string()),
    };
    DishDraft {
        name: format!("Dish {i}"),
        price: Some(Price::from_cents(100 + i)),
        category: Some(category),
        image: None,
    }
}

fn bench_catalog_adds(c: &mut Criterion) {
    c.bench_function("catalog_add_500", |b| {
        b.iter(|| {
            let mut repo = CatalogRepository::load(MemoryKvStore::new());
            for i in 0..500u64 {
                let _ = repo.add(draft(i)).expect("add");
            }
        });
    });
}

fn bench_quantity_updates(c: &mut Criterion) {
    let mut menu = MenuSession::open(MemoryKvStore::new(), MenuConfig::default());
    for i in 0..200u64 {
        let _ = menu.add_dish(draft(i)).expect("add");
    }

    c.bench_function("quantity_increment_1k", |b| {
        b.iter(|| {
            for i in 0..1_000u64 {
                let id: DishId = 1 + (i % 200);
                let _ = menu.increment(id);
            }
            menu.totals()
        });
    });
}

fn bench_category_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_by_category");
    for n in [50u64, 500, 5_000] {
        let mut repo = CatalogRepository::load(MemoryKvStore::new());
        for i in 0..n {
            let _ = repo.add(draft(i)).expect("add");
        }
        let filter = CategoryFilter::Only(Category::Snack);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| repo.list_by_category(&filter));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_catalog_adds, bench_quantity_updates, bench_category_filter);
criterion_main!(benches);
