//! Dish domain record, draft, patch, and built-in defaults.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Category, DishId, Price};

/// Built-in image payload used when a dish has none.
pub const PLACEHOLDER_IMAGE: &str = "data:image/svg+xml;base64,PHN2ZyB3aWR0aD0iMTIwIiBoZWlnaHQ9IjEyMCIgeG1sbnM9Imh0dHA6Ly93d3cudzMub3JnLzIwMDAvc3ZnIj48cmVjdCB3aWR0aD0iMTAwJSIgaGVpZ2h0PSIxMDAlIiBmaWxsPSIjZjJmMmYyIi8+PHBhdGggZD0iTTMwIDQ1IEw2MCAzMCBMOTAgNDUgTDkwIDgwIEw2MCA5NSBMMzAgODBaIiBmaWxsPSIjY2NjIi8+PC9zdmc+";

/// Sellable menu item as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dish {
    /// Immutable identifier.
    pub id: DishId,
    /// Trimmed, non-empty display name.
    pub name: String,
    /// Current unit price.
    pub price: Price,
    /// Grouping tag.
    pub category: Category,
    /// Embeddable image payload (data URL).
    pub image: String,
}

impl Dish {
    /// True when the dish still shows the built-in placeholder.
    pub fn has_placeholder_image(&self) -> bool {
        self.image == PLACEHOLDER_IMAGE
    }
}

/// Rejected dish input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Name is empty after trimming.
    #[error("dish name must not be empty")]
    EmptyName,
    /// No price was supplied.
    #[error("dish price is required")]
    MissingPrice,
    /// No category was supplied.
    #[error("dish category is required")]
    MissingCategory,
}

/// Insert payload used to create a new [`Dish`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DishDraft {
    /// Raw name; trimmed on insert.
    pub name: String,
    /// Unit price.
    pub price: Option<Price>,
    /// Grouping tag.
    pub category: Option<Category>,
    /// Image payload; the placeholder is used when absent.
    pub image: Option<String>,
}

impl DishDraft {
    /// Validates the draft and materializes it under `id`.
    pub fn into_dish(self, id: DishId) -> Result<Dish, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let price = self.price.ok_or(ValidationError::MissingPrice)?;
        let category = self
            .category
            .filter(|c| !c.is_blank())
            .ok_or(ValidationError::MissingCategory)?;
        Ok(Dish {
            id,
            name: name.to_string(),
            price,
            category,
            image: image_or_placeholder(self.image),
        })
    }
}

/// Sparse patch where each `Some` field overwrites the record value.
///
/// Has no `id` field, so identity cannot be patched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DishPatch {
    /// Optional replacement name; trimmed, must stay non-empty.
    pub name: Option<String>,
    /// Optional replacement price.
    pub price: Option<Price>,
    /// Optional replacement category.
    pub category: Option<Category>,
    /// Optional replacement image; empty resets to the placeholder.
    pub image: Option<String>,
}

impl DishPatch {
    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Checks the patch without touching any record.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.as_ref().is_some_and(|name| name.trim().is_empty()) {
            return Err(ValidationError::EmptyName);
        }
        if self.category.as_ref().is_some_and(Category::is_blank) {
            return Err(ValidationError::MissingCategory);
        }
        Ok(())
    }

    /// Applies this patch in place to `dish`. Call [`DishPatch::validate`] first.
    pub fn apply_to(&self, dish: &mut Dish) {
        if let Some(v) = &self.name {
            dish.name = v.trim().to_string();
        }
        if let Some(v) = self.price {
            dish.price = v;
        }
        if let Some(v) = &self.category {
            dish.category = v.clone();
        }
        if let Some(v) = &self.image {
            dish.image = image_or_placeholder(Some(v.clone()));
        }
    }
}

/// The catalog a fresh install starts with.
pub fn default_dishes() -> Vec<Dish> {
    [
        (1, "Spicy Crayfish", 88, Category::Hot),
        (2, "Garlic Steamed Clams", 38, Category::Hot),
        (3, "Cucumber Salad", 12, Category::Cold),
        (4, "Smashed Cucumber", 10, Category::Cold),
        (5, "Lamb Skewer", 5, Category::Snack),
        (6, "Grilled Gluten", 3, Category::Snack),
    ]
    .into_iter()
    .map(|(id, name, units, category)| Dish {
        id,
        name: name.to_string(),
        price: Price::from_units(units),
        category,
        image: PLACEHOLDER_IMAGE.to_string(),
    })
    .collect()
}

pub(crate) fn image_or_placeholder(image: Option<String>) -> String {
    match image {
        Some(image) if !image.trim().is_empty() => image,
        _ => PLACEHOLDER_IMAGE.to_string(),
    }
}

/// Loosely typed dish as found in storage or import files.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawDish {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    price: Option<Value>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    image: Option<String>,
}

impl RawDish {
    /// Parses one element of an untyped array; anything not shaped like a dish is `None`.
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Storage migration: backfills the image and coerces the price, with an
    /// unreadable price becoming zero. Records without a usable id, name or
    /// category cannot be shown and are dropped.
    pub(crate) fn migrate(self) -> Option<Dish> {
        let id = self.id.as_ref().and_then(coerce_id)?;
        let name = self.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())?;
        let category = self.category.filter(|c| !c.trim().is_empty())?;
        let price = self.price.as_ref().and_then(coerce_price).unwrap_or(Price::ZERO);
        Some(Dish {
            id,
            name,
            price,
            category: Category::from(category),
            image: image_or_placeholder(self.image),
        })
    }

    /// Import validation: non-empty name, a readable price and a category.
    /// The foreign id is ignored; the record is re-keyed under `id`.
    pub(crate) fn into_imported(self, id: DishId) -> Option<Dish> {
        let name = self.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())?;
        let price = self.price.as_ref().and_then(coerce_price)?;
        let category = self.category.filter(|c| !c.trim().is_empty())?;
        Some(Dish {
            id,
            name,
            price,
            category: Category::from(category),
            image: image_or_placeholder(self.image),
        })
    }
}

fn coerce_id(value: &Value) -> Option<DishId> {
    let id = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (id > 0).then_some(id)
}

fn coerce_price(value: &Value) -> Option<Price> {
    match value {
        Value::Number(n) => n.as_f64().and_then(Price::from_decimal),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn dish(id: DishId) -> Dish {
        Dish {
            id,
            name: "Tofu".to_string(),
            price: Price::from_units(9),
            category: Category::Hot,
            image: PLACEHOLDER_IMAGE.to_string(),
        }
    }

    #[test]
    fn draft_trims_name_and_defaults_image() {
        let d = DishDraft {
            name: "  Mapo Tofu ".to_string(),
            price: Some(Price::from_units(18)),
            category: Some(Category::Hot),
            image: None,
        }
        .into_dish(7)
        .expect("valid");
        assert_eq!(d.id, 7);
        assert_eq!(d.name, "Mapo Tofu");
        assert!(d.has_placeholder_image());
    }

    #[test]
    fn draft_rejects_missing_fields() {
        let base = DishDraft {
            name: "Soup".to_string(),
            price: Some(Price::from_units(1)),
            category: Some(Category::Hot),
            image: None,
        };
        assert_eq!(
            DishDraft { name: "   ".to_string(), ..base.clone() }.into_dish(1),
            Err(ValidationError::EmptyName)
        );
        assert_eq!(
            DishDraft { price: None, ..base.clone() }.into_dish(1),
            Err(ValidationError::MissingPrice)
        );
        assert_eq!(
            DishDraft { category: None, ..base }.into_dish(1),
            Err(ValidationError::MissingCategory)
        );
    }

    #[test]
    fn patch_never_touches_id_and_resets_empty_image() {
        let mut d = dish(3);
        d.image = "data:image/jpeg;base64,AAAA".to_string();
        let patch = DishPatch {
            name: Some(" Fried Tofu ".to_string()),
            image: Some(String::new()),
            ..DishPatch::default()
        };
        patch.validate().expect("valid");
        patch.apply_to(&mut d);
        assert_eq!(d.id, 3);
        assert_eq!(d.name, "Fried Tofu");
        assert!(d.has_placeholder_image());
    }

    #[test]
    fn patch_with_blank_name_is_invalid() {
        let patch = DishPatch {
            name: Some(" ".to_string()),
            ..DishPatch::default()
        };
        assert_eq!(patch.validate(), Err(ValidationError::EmptyName));
    }

    #[test]
    fn blank_category_counts_as_missing() {
        let draft = DishDraft {
            name: "Ghost".to_string(),
            price: Some(Price::from_units(1)),
            category: Some(Category::from("")),
            image: None,
        };
        assert_eq!(draft.into_dish(1), Err(ValidationError::MissingCategory));

        let patch = DishPatch {
            category: Some(Category::from("  ")),
            ..DishPatch::default()
        };
        assert_eq!(patch.validate(), Err(ValidationError::MissingCategory));
    }

    #[test]
    fn migrate_backfills_image_and_coerces_price() {
        let raw = RawDish::from_value(&json!({
            "id": 4, "name": "Old", "price": "12.50", "category": "cold"
        }))
        .expect("object");
        let d = raw.migrate().expect("migrated");
        assert_eq!(d.price, Price::from_cents(1250));
        assert!(d.has_placeholder_image());

        let bad_price = RawDish::from_value(&json!({
            "id": 5, "name": "Odd", "price": "n/a", "category": "hot"
        }))
        .expect("object");
        assert_eq!(bad_price.migrate().expect("migrated").price, Price::ZERO);
    }

    #[test]
    fn migrate_drops_records_without_identity() {
        let raw = RawDish::from_value(&json!({"name": "Ghost", "price": 1, "category": "hot"}))
            .expect("object");
        assert!(raw.migrate().is_none());
        assert!(RawDish::from_value(&json!(42)).is_none());
    }

    #[test]
    fn import_requires_readable_price() {
        let raw = RawDish::from_value(&json!({"name": "X", "category": "hot"})).expect("object");
        assert!(raw.into_imported(1).is_none());
        let raw = RawDish::from_value(&json!({"name": "X", "price": 0, "category": "hot", "id": 99}))
            .expect("object");
        assert_eq!(raw.into_imported(10).map(|d| d.id), Some(10));
    }
}
