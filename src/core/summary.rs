use serde::{Deserialize, Serialize};

use crate::{
    dish::Dish,
    types::{DishId, EpochMillis, Price, local_timestamp},
};

/// One dish of a submitted order, priced at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    /// Dish the line was built from; may no longer exist in the catalog.
    #[serde(default)]
    pub dish_id: DishId,
    /// Dish name at submission time.
    pub name: String,
    /// Unit price at submission time.
    #[serde(rename = "price")]
    pub unit_price: Price,
    /// Ordered quantity, always positive.
    #[serde(rename = "count")]
    pub quantity: u32,
    /// `quantity × unit_price`.
    pub subtotal: Price,
    /// Dish image at submission time.
    #[serde(default)]
    pub image: String,
}

/// Immutable record of a submitted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSnapshot {
    /// Lines with a positive quantity, in catalog order.
    pub lines: Vec<OrderLine>,
    /// Sum of the line subtotals.
    pub total_price: Price,
    /// Sum of the line quantities.
    pub total_count: u64,
    /// Creation time.
    pub created_at: EpochMillis,
    /// Human-readable local creation time.
    pub order_time: String,
    /// Always true for snapshots produced by a submit.
    pub submitted: bool,
}

impl OrderSnapshot {
    /// Age of the snapshot at `now`.
    pub fn age_ms(&self, now: EpochMillis) -> u64 {
        now.saturating_sub(self.created_at)
    }
}

/// Builds order summaries from dishes and quantities.
pub struct OrderSummaryBuilder;

impl OrderSummaryBuilder {
    /// Freezes names, prices and images of `items` into a snapshot.
    ///
    /// Items with zero quantity are skipped. Each subtotal is exact to the
    /// cent and the total is the sum of the subtotals.
    pub fn build<'a>(items: impl IntoIterator<Item = (&'a Dish, u32)>, created_at: EpochMillis) -> OrderSnapshot {
        let lines: Vec<OrderLine> = items
            .into_iter()
            .filter(|(_, quantity)| *quantity > 0)
            .map(|(dish, quantity)| OrderLine {
                dish_id: dish.id,
                name: dish.name.clone(),
                unit_price: dish.price,
                quantity,
                subtotal: dish.price.times(quantity),
                image: dish.image.clone(),
            })
            .collect();

        OrderSnapshot {
            total_price: lines.iter().map(|l| l.subtotal).sum(),
            total_count: lines.iter().map(|l| u64::from(l.quantity)).sum(),
            lines,
            created_at,
            order_time: local_timestamp(created_at),
            submitted: true,
        }
    }

    /// File name offered when the rendered order card is downloaded.
    pub fn download_file_name(created_at: EpochMillis) -> String {
        format!("order-menu_{created_at}.png")
    }
}
