//! Shared primitive IDs, categories, prices and clock helpers.

use std::{
    fmt,
    iter::Sum,
    ops::Add,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Positive dish identifier, unique for the lifetime of a catalog.
pub type DishId = u64;
/// Milliseconds since the Unix epoch.
pub type EpochMillis = u64;

/// Coarse grouping tag for dishes.
///
/// The built-in set is `hot`, `cold` and `snack`; any other non-empty tag is
/// kept verbatim in [`Category::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    /// Hot dishes.
    Hot,
    /// Cold dishes.
    Cold,
    /// Snacks.
    Snack,
    /// Any tag outside the built-in set.
    Other(String),
}

impl Category {
    /// Wire tag of this category.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Hot => "hot",
            Self::Cold => "cold",
            Self::Snack => "snack",
            Self::Other(tag) => tag,
        }
    }

    /// True for a tag with no visible characters.
    pub fn is_blank(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        match value.as_str() {
            "hot" => Self::Hot,
            "cold" => Self::Cold,
            "snack" => Self::Snack,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for Category {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        match value {
            Category::Other(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Active tab of the menu: every dish, or one category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CategoryFilter {
    /// Pseudo-category `all`; no filtering.
    #[default]
    All,
    /// Exact category match.
    Only(Category),
}

impl CategoryFilter {
    /// Returns true when `category` passes this filter.
    pub fn matches(&self, category: &Category) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == category,
        }
    }
}

impl From<String> for CategoryFilter {
    fn from(value: String) -> Self {
        if value == "all" {
            Self::All
        } else {
            Self::Only(Category::from(value))
        }
    }
}

impl From<&str> for CategoryFilter {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Category> for CategoryFilter {
    fn from(value: Category) -> Self {
        Self::Only(value)
    }
}

impl From<CategoryFilter> for String {
    fn from(value: CategoryFilter) -> Self {
        match value {
            CategoryFilter::All => "all".to_string(),
            CategoryFilter::Only(category) => category.into(),
        }
    }
}

/// Non-negative money amount held as integer cents.
///
/// Serialized as a plain JSON number (`88`, `12.5`). Deserialization also
/// accepts numeric strings, which older stored catalogs contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price {
    cents: u64,
}

impl Price {
    /// Zero.
    pub const ZERO: Self = Self { cents: 0 };

    /// Builds a price from integer cents.
    pub const fn from_cents(cents: u64) -> Self {
        Self { cents }
    }

    /// Builds a price from whole currency units.
    pub const fn from_units(units: u64) -> Self {
        Self {
            cents: units.saturating_mul(100),
        }
    }

    /// Rounds a decimal amount to cents. Negative or non-finite input yields `None`.
    pub fn from_decimal(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let cents = (value * 100.0).round();
        if cents > u64::MAX as f64 {
            return None;
        }
        Some(Self {
            cents: cents as u64,
        })
    }

    /// Amount in cents.
    pub const fn cents(self) -> u64 {
        self.cents
    }

    /// Amount as a decimal number.
    pub fn as_decimal(self) -> f64 {
        self.cents as f64 / 100.0
    }

    /// Line amount for `quantity` units.
    pub fn times(self, quantity: u32) -> Self {
        Self {
            cents: self.cents.saturating_mul(u64::from(quantity)),
        }
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            cents: self.cents.saturating_add(rhs.cents),
        }
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// Two-decimal display form, e.g. `214.00`.
impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.cents / 100, self.cents % 100)
    }
}

impl FromStr for Price {
    type Err = InvalidPrice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<f64>()
            .ok()
            .and_then(Self::from_decimal)
            .ok_or_else(|| InvalidPrice(s.to_string()))
    }
}

/// Text that does not describe a non-negative decimal amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid price: {0:?}")]
pub struct InvalidPrice(pub String);

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.cents % 100 == 0 {
            serializer.serialize_u64(self.cents / 100)
        } else {
            serializer.serialize_f64(self.as_decimal())
        }
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PriceVisitor;

        impl de::Visitor<'_> for PriceVisitor {
            type Value = Price;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative number or numeric string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Price, E> {
                Ok(Price::from_cents(v.saturating_mul(100)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Price, E> {
                u64::try_from(v)
                    .map(|units| Price::from_cents(units.saturating_mul(100)))
                    .map_err(|_| E::custom("negative price"))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Price, E> {
                Price::from_decimal(v).ok_or_else(|| E::custom("negative or non-finite price"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Price, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(PriceVisitor)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> EpochMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Human-readable local timestamp for the given epoch milliseconds.
pub fn local_timestamp(ms: EpochMillis) -> String {
    use chrono::{Local, TimeZone};

    match Local.timestamp_millis_opt(ms as i64) {
        chrono::LocalResult::Single(t) | chrono::LocalResult::Ambiguous(t, _) => {
            t.format("%Y-%m-%d %H:%M:%S").to_string()
        }
        chrono::LocalResult::None => ms.to_string(),
    }
}
