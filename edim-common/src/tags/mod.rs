//! Tag store and upsert engine
//!
//! A tag assigns one dimension value to one tagged entity (a program item or a
//! survey response). Tag rows are unique on (entity, value) and carry the
//! value's dimension denormalized for filtering.
//!
//! Assignments arrive as an [`AssignmentMap`] of dimension slug → value slugs.
//! The [`upsert`] module resolves maps against a per-event [`UpsertCache`] and
//! writes them; [`store`] reads tags back and maintains the cached aggregate on
//! each tagged entity.

pub mod store;
pub mod upsert;

pub use store::{refresh_cached_dimensions, refresh_cached_dimensions_for_event, value_slugs_for};
pub use upsert::{
    apply, build_upsert_cache, build_upsertables, bulk_upsert, resolve, set_dimension_values,
    ReconcileOutcome, ReconcileScope, ResolvedAssignments, UpsertCache,
};

use crate::dimensions::DimensionValue;
use crate::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Dimension slug → value slugs, as stored in `cached_dimensions`
pub type CachedDimensions = BTreeMap<String, Vec<String>>;

/// Kind of entity a tag row points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagTarget {
    Program,
    Response,
}

impl TagTarget {
    pub fn tag_table(self) -> &'static str {
        match self {
            TagTarget::Program => "program_dimension_values",
            TagTarget::Response => "response_dimension_values",
        }
    }

    pub fn entity_column(self) -> &'static str {
        match self {
            TagTarget::Program => "program_id",
            TagTarget::Response => "response_id",
        }
    }

    pub fn entity_table(self) -> &'static str {
        match self {
            TagTarget::Program => "programs",
            TagTarget::Response => "responses",
        }
    }

    /// Query selecting the guid of every entity of this kind in one event (one bind: event id)
    pub(crate) fn entities_of_event_sql(self) -> &'static str {
        match self {
            TagTarget::Program => "SELECT guid FROM programs WHERE event_id = ?",
            TagTarget::Response => {
                "SELECT r.guid FROM responses r JOIN surveys s ON s.guid = r.survey_id WHERE s.event_id = ?"
            }
        }
    }
}

/// Identity of one tagged entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagOwner {
    pub target: TagTarget,
    pub entity_id: Uuid,
    pub event_id: Uuid,
}

impl TagOwner {
    pub fn program(entity_id: Uuid, event_id: Uuid) -> Self {
        Self {
            target: TagTarget::Program,
            entity_id,
            event_id,
        }
    }

    pub fn response(entity_id: Uuid, event_id: Uuid) -> Self {
        Self {
            target: TagTarget::Response,
            entity_id,
            event_id,
        }
    }

    /// Recompute this entity's `cached_dimensions` from persisted tags
    pub async fn refresh_cached_dimensions(&self, pool: &SqlitePool) -> Result<CachedDimensions> {
        store::refresh_cached_dimensions(pool, *self).await
    }
}

/// An entity that can carry tags
pub trait TaggedEntity {
    fn tag_owner(&self) -> TagOwner;
}

impl TaggedEntity for TagOwner {
    fn tag_owner(&self) -> TagOwner {
        *self
    }
}

/// Desired values for one dimension: a bare slug, a list, or nothing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSlugs {
    One(String),
    Many(Vec<String>),
    #[default]
    Unset,
}

impl ValueSlugs {
    /// Bare slug → singleton list; empty strings dropped; duplicates removed keeping first occurrence
    pub fn normalized(&self) -> Vec<&str> {
        let slugs: Vec<&str> = match self {
            ValueSlugs::One(slug) => vec![slug.as_str()],
            ValueSlugs::Many(slugs) => slugs.iter().map(String::as_str).collect(),
            ValueSlugs::Unset => Vec::new(),
        };

        let mut seen = Vec::with_capacity(slugs.len());
        for slug in slugs {
            if !slug.is_empty() && !seen.contains(&slug) {
                seen.push(slug);
            }
        }
        seen
    }

    pub fn is_empty(&self) -> bool {
        self.normalized().is_empty()
    }
}

impl From<&str> for ValueSlugs {
    fn from(slug: &str) -> Self {
        ValueSlugs::One(slug.to_string())
    }
}

impl From<String> for ValueSlugs {
    fn from(slug: String) -> Self {
        ValueSlugs::One(slug)
    }
}

impl From<Vec<String>> for ValueSlugs {
    fn from(slugs: Vec<String>) -> Self {
        ValueSlugs::Many(slugs)
    }
}

impl From<Vec<&str>> for ValueSlugs {
    fn from(slugs: Vec<&str>) -> Self {
        ValueSlugs::Many(slugs.into_iter().map(str::to_string).collect())
    }
}

/// Dimension slug → desired values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentMap(BTreeMap<String, ValueSlugs>);

impl AssignmentMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dimension: impl Into<String>, values: impl Into<ValueSlugs>) {
        self.0.insert(dimension.into(), values.into());
    }

    pub fn get(&self, dimension: &str) -> Option<&ValueSlugs> {
        self.0.get(dimension)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValueSlugs)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<ValueSlugs>> FromIterator<(K, V)> for AssignmentMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<CachedDimensions> for AssignmentMap {
    fn from(cached: CachedDimensions) -> Self {
        cached.into_iter().collect()
    }
}

/// Unsaved tag row
///
/// Only constructible from a resolved [`DimensionValue`], so its dimension is
/// always the value's dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTag {
    owner: TagOwner,
    dimension_id: Uuid,
    value_id: Uuid,
}

impl NewTag {
    pub fn new(owner: TagOwner, value: &DimensionValue) -> Self {
        Self {
            owner,
            dimension_id: value.dimension_id,
            value_id: value.guid,
        }
    }

    pub fn owner(&self) -> TagOwner {
        self.owner
    }

    pub fn dimension_id(&self) -> Uuid {
        self.dimension_id
    }

    pub fn value_id(&self) -> Uuid {
        self.value_id
    }
}

/// Persisted tag row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub guid: Uuid,
    pub target: TagTarget,
    pub entity_id: Uuid,
    pub dimension_id: Uuid,
    pub value_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_string_normalizes_to_singleton() {
        assert_eq!(ValueSlugs::from("konsti").normalized(), vec!["konsti"]);
        assert!(ValueSlugs::from("").is_empty());
        assert!(ValueSlugs::Unset.is_empty());
    }

    #[test]
    fn test_list_drops_empty_and_repeated() {
        let slugs = ValueSlugs::from(vec!["en", "", "fi", "en"]);
        assert_eq!(slugs.normalized(), vec!["en", "fi"]);
    }

    #[test]
    fn test_assignment_map_from_json() {
        let map: AssignmentMap = serde_json::from_str(
            r#"{"signup": "konsti", "language": ["en", "fi"], "room": null, "audience": []}"#,
        )
        .unwrap();

        assert_eq!(map.get("signup"), Some(&ValueSlugs::from("konsti")));
        assert_eq!(map.get("language").unwrap().normalized(), vec!["en", "fi"]);
        assert_eq!(map.get("room"), Some(&ValueSlugs::Unset));
        assert!(map.get("audience").unwrap().is_empty());
    }

    #[test]
    fn test_new_tag_takes_dimension_from_value() {
        let value = DimensionValue {
            guid: Uuid::new_v4(),
            dimension_id: Uuid::new_v4(),
            slug: "konsti".to_string(),
            title: Default::default(),
            override_color: String::new(),
            override_icon: String::new(),
            position: 0,
        };
        let tag = NewTag::new(TagOwner::program(Uuid::new_v4(), Uuid::new_v4()), &value);

        assert_eq!(tag.dimension_id(), value.dimension_id);
        assert_eq!(tag.value_id(), value.guid);
    }
}
