//! Sorting and pagination parameters for list endpoints.

use serde::Serialize;

use crate::validator::{permitted_value, Validator};

/// Largest accepted page number.
pub const MAX_PAGE: i64 = 10_000_000;
/// Largest accepted page size.
pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Sort values accepted from clients; a leading `-` sorts descending.
pub const SORT_SAFELIST: [&str; 8] = [
    "id", "title", "year", "price", "-id", "-title", "-year", "-price",
];

/// Column a list can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Title,
    Year,
    Price,
}

impl SortColumn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortColumn::Id => "id",
            SortColumn::Title => "title",
            SortColumn::Year => "year",
            SortColumn::Price => "price",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A validated sort key. Only these static names ever reach the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortField {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl SortField {
    /// Parse a client sort value, accepting only safelisted names.
    pub fn parse(value: &str) -> Option<Self> {
        let (direction, name) = match value.strip_prefix('-') {
            Some(rest) => (SortDirection::Desc, rest),
            None => (SortDirection::Asc, value),
        };
        let column = match name {
            "id" => SortColumn::Id,
            "title" => SortColumn::Title,
            "year" => SortColumn::Year,
            "price" => SortColumn::Price,
            _ => return None,
        };
        Some(Self { column, direction })
    }
}

impl Default for SortField {
    fn default() -> Self {
        Self {
            column: SortColumn::Id,
            direction: SortDirection::Asc,
        }
    }
}

/// Page window and ordering for a list query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: SortField,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: SortField::default(),
        }
    }
}

impl Filters {
    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

/// Check raw paging values and build `Filters` when they are acceptable.
///
/// Errors are recorded on `v`; the returned value is only meaningful when
/// `v` is still valid.
pub fn validate_filters(v: &mut Validator, page: i64, page_size: i64, sort: &str) -> Filters {
    v.check(page > 0, "page", "must be greater than zero");
    v.check(page <= MAX_PAGE, "page", "must be a maximum of 10 million");
    v.check(page_size > 0, "page_size", "must be greater than zero");
    v.check(
        page_size <= MAX_PAGE_SIZE,
        "page_size",
        "must be a maximum of 100",
    );
    v.check(
        permitted_value(&sort, &SORT_SAFELIST),
        "sort",
        "invalid sort value",
    );

    Filters {
        page,
        page_size,
        sort: SortField::parse(sort).unwrap_or_default(),
    }
}

/// Pagination summary returned alongside list results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

/// Compute the pagination summary; everything is zero when nothing matched.
pub fn calculate_metadata(total_records: i64, page: i64, page_size: i64) -> Metadata {
    if total_records == 0 || page_size <= 0 {
        return Metadata::default();
    }

    Metadata {
        current_page: page,
        page_size,
        first_page: 1,
        last_page: (total_records + page_size - 1) / page_size,
        total_records,
    }
}
