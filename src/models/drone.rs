//! Drone catalog record and its request/response shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validator::{unique, Validator};

/// Earliest accepted production year.
pub const MIN_YEAR: i32 = 1888;
/// Longest accepted title, in bytes.
pub const MAX_TITLE_BYTES: usize = 500;
/// Most categories a drone can carry.
pub const MAX_CATEGORIES: usize = 5;
/// Currency word appended to formatted prices.
pub const CURRENCY: &str = "tenge";

/// A catalog record as persisted by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Drone {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub year: i32,
    pub price: i64,
    pub categories: Vec<String>,
    /// Optimistic concurrency token, starts at 1
    pub version: i64,
}

impl Drone {
    /// Build an unsaved record; the store assigns id, timestamp and version.
    pub fn new(title: String, year: i32, price: i64, categories: Vec<String>) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            title,
            year,
            price,
            categories,
            version: 0,
        }
    }

    /// Apply the fields present in a partial update.
    pub fn apply(&mut self, changes: UpdateDroneRequest) {
        if let Some(title) = changes.title {
            self.title = title;
        }
        if let Some(year) = changes.year {
            self.year = year;
        }
        if let Some(price) = changes.price {
            self.price = price;
        }
        if let Some(categories) = changes.categories {
            self.categories = categories;
        }
    }
}

/// Client-facing representation of a drone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DroneResponse {
    pub id: i64,
    pub title: String,
    #[serde(skip_serializing_if = "is_zero_year", default)]
    pub year: i32,
    /// Formatted as `"<amount> tenge"`
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub categories: Vec<String>,
    pub version: i64,
}

fn is_zero_year(year: &i32) -> bool {
    *year == 0
}

/// Render a price with its currency, or nothing for a zero price.
pub fn format_price(price: i64) -> Option<String> {
    (price != 0).then(|| format!("{} {}", price, CURRENCY))
}

impl From<&Drone> for DroneResponse {
    fn from(drone: &Drone) -> Self {
        Self {
            id: drone.id,
            title: drone.title.clone(),
            year: drone.year,
            price: format_price(drone.price),
            categories: drone.categories.clone(),
            version: drone.version,
        }
    }
}

impl From<Drone> for DroneResponse {
    fn from(drone: Drone) -> Self {
        Self {
            id: drone.id,
            price: format_price(drone.price),
            title: drone.title,
            year: drone.year,
            categories: drone.categories,
            version: drone.version,
        }
    }
}

/// Request body for creating a new drone.
///
/// Missing fields default to their zero value so that validation, not
/// deserialization, reports them.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateDroneRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
}

/// Request body for partially updating a drone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateDroneRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Run the catalog rules against a candidate record.
///
/// `categories` is `None` when the client omitted the field entirely.
pub fn validate_drone(
    v: &mut Validator,
    title: &str,
    year: i32,
    price: i64,
    categories: Option<&[String]>,
    current_year: i32,
) {
    v.check(!title.is_empty(), "title", "must be provided");
    v.check(
        title.len() <= MAX_TITLE_BYTES,
        "title",
        "must not be more than 500 bytes long",
    );

    v.check(year != 0, "year", "must be provided");
    v.check(year >= MIN_YEAR, "year", "must be greater than 1888");
    v.check(year <= current_year, "year", "must not be in the future");

    v.check(price != 0, "price", "must be provided");
    v.check(price > 0, "price", "must be a positive integer");

    let Some(categories) = categories else {
        v.add_error("categories", "must be provided");
        return;
    };
    v.check(
        !categories.is_empty(),
        "categories",
        "must contain at least 1 category",
    );
    v.check(
        categories.len() <= MAX_CATEGORIES,
        "categories",
        "must not contain more than 5 categories",
    );
    v.check(
        unique(categories),
        "categories",
        "must not contain duplicate values",
    );
}

/// Validate a full record, e.g. after a partial update was applied.
pub fn validate_record(v: &mut Validator, drone: &Drone, current_year: i32) {
    validate_drone(
        v,
        &drone.title,
        drone.year,
        drone.price,
        Some(&drone.categories),
        current_year,
    );
}
