//! Dimension catalog
//!
//! A dimension is a named, event-scoped taxonomy axis (room, audience, signup
//! method, ...). Each dimension owns its allowed values. Both carry localized
//! titles and optional display metadata; a value's color and icon fall back to
//! its dimension's when the value does not override them.

pub mod catalog;

pub use catalog::{list_dimensions, load_dimension, save_many, sync_catalog, CatalogSync};

use crate::db::get_guid;
use crate::{Error, LocalizedText, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// How the values of a dimension are ordered when listed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueOrdering {
    Slug,
    Title,
    /// Order of the choice list the catalog was last synced with
    #[default]
    Manual,
}

impl ValueOrdering {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueOrdering::Slug => "slug",
            ValueOrdering::Title => "title",
            ValueOrdering::Manual => "manual",
        }
    }
}

impl fmt::Display for ValueOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueOrdering {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "slug" => Ok(ValueOrdering::Slug),
            "title" => Ok(ValueOrdering::Title),
            "manual" => Ok(ValueOrdering::Manual),
            other => Err(Error::InvalidInput(format!("unknown value ordering '{}'", other))),
        }
    }
}

/// Persisted dimension
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dimension {
    pub guid: Uuid,
    pub event_id: Uuid,
    pub slug: String,
    pub title: LocalizedText,
    pub color: String,
    pub icon: String,
    pub value_ordering: ValueOrdering,
    /// Selecting a value means "this is present / not ok" (e.g. hazards)
    pub is_negative_selection: bool,
    pub is_list_filter: bool,
    pub is_shown_in_detail: bool,
    pub position: i64,
}

impl Dimension {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let title: String = row.try_get("title")?;
        let ordering: String = row.try_get("value_ordering")?;

        Ok(Self {
            guid: get_guid(row, "guid")?,
            event_id: get_guid(row, "event_id")?,
            slug: row.try_get("slug")?,
            title: LocalizedText::from_json(&title)?,
            color: row.try_get("color")?,
            icon: row.try_get("icon")?,
            value_ordering: ordering.parse()?,
            is_negative_selection: row.try_get("is_negative_selection")?,
            is_list_filter: row.try_get("is_list_filter")?,
            is_shown_in_detail: row.try_get("is_shown_in_detail")?,
            position: row.try_get("position")?,
        })
    }
}

/// Persisted dimension value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionValue {
    pub guid: Uuid,
    pub dimension_id: Uuid,
    pub slug: String,
    pub title: LocalizedText,
    pub override_color: String,
    pub override_icon: String,
    pub position: i64,
}

impl DimensionValue {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let title: String = row.try_get("title")?;

        Ok(Self {
            guid: get_guid(row, "guid")?,
            dimension_id: get_guid(row, "dimension_id")?,
            slug: row.try_get("slug")?,
            title: LocalizedText::from_json(&title)?,
            override_color: row.try_get("override_color")?,
            override_icon: row.try_get("override_icon")?,
            position: row.try_get("position")?,
        })
    }

    /// Own color if set, else the dimension's
    pub fn color<'a>(&'a self, dimension: &'a Dimension) -> &'a str {
        debug_assert_eq!(self.dimension_id, dimension.guid);
        if self.override_color.is_empty() {
            &dimension.color
        } else {
            &self.override_color
        }
    }

    /// Own icon if set, else the dimension's
    pub fn icon<'a>(&'a self, dimension: &'a Dimension) -> &'a str {
        debug_assert_eq!(self.dimension_id, dimension.guid);
        if self.override_icon.is_empty() {
            &dimension.icon
        } else {
            &self.override_icon
        }
    }
}

/// A dimension together with its values, in listing order
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionWithValues {
    pub dimension: Dimension,
    pub values: Vec<DimensionValue>,
}

impl DimensionWithValues {
    pub fn value(&self, slug: &str) -> Option<&DimensionValue> {
        self.values.iter().find(|v| v.slug == slug)
    }
}

/// Declarative description of one dimension for [`save_many`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub slug: String,
    #[serde(default)]
    pub title: LocalizedText,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub value_ordering: ValueOrdering,
    #[serde(default)]
    pub is_negative_selection: bool,
    #[serde(default = "default_true")]
    pub is_list_filter: bool,
    #[serde(default = "default_true")]
    pub is_shown_in_detail: bool,
    /// Full list of allowed values. `None` is synced as an empty list.
    #[serde(default)]
    pub choices: Option<Vec<DimensionValueSpec>>,
}

fn default_true() -> bool {
    true
}

impl DimensionSpec {
    pub fn new(slug: impl Into<String>, title: LocalizedText) -> Self {
        Self {
            slug: slug.into(),
            title,
            color: String::new(),
            icon: String::new(),
            value_ordering: ValueOrdering::default(),
            is_negative_selection: false,
            is_list_filter: true,
            is_shown_in_detail: true,
            choices: None,
        }
    }

    pub fn choices(mut self, choices: Vec<DimensionValueSpec>) -> Self {
        self.choices = Some(choices);
        self
    }

    pub fn value_ordering(mut self, ordering: ValueOrdering) -> Self {
        self.value_ordering = ordering;
        self
    }

    pub fn negative_selection(mut self) -> Self {
        self.is_negative_selection = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.is_list_filter = false;
        self.is_shown_in_detail = false;
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn choice_slugs(&self) -> Vec<&str> {
        self.choices
            .iter()
            .flatten()
            .map(|choice| choice.slug.as_str())
            .collect()
    }
}

/// Declarative description of one allowed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionValueSpec {
    pub slug: String,
    #[serde(default)]
    pub title: LocalizedText,
    /// Override color; empty inherits the dimension's
    #[serde(default)]
    pub color: String,
    /// Override icon; empty inherits the dimension's
    #[serde(default)]
    pub icon: String,
}

impl DimensionValueSpec {
    pub fn new(slug: impl Into<String>, title: LocalizedText) -> Self {
        Self {
            slug: slug.into(),
            title,
            color: String::new(),
            icon: String::new(),
        }
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }
}
