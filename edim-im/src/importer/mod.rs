//! Derivation rules
//!
//! An [`Importer`] turns a source export into a dimension catalog and, per
//! programme, an assignment map, annotations and schedule items. Every hook
//! has a default built from the functions in [`default`]; per-event importers
//! override hooks by calling the default first and extending its result.
//!
//! Dimension values only accumulate within one derivation: rules call
//! [`DerivedDimensions::add`], which never removes a value added earlier.

pub mod default;
pub mod konsti;
pub mod tracon;

pub use default::DefaultImporter;
pub use tracon::TraconImporter;

use crate::source::{SourceCatalog, SourceProgramme};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use edim_common::db::{Event, Program, ScheduleItem};
use edim_common::dimensions::DimensionSpec;
use edim_common::slug::{slugify, UniqueSlugs};
use edim_common::tags::{AssignmentMap, ValueSlugs};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Programmes starting before 04:00 local time belong to the previous day
pub const DATE_CUTOFF_HOURS: i64 = 4;

/// Everything derivation rules may read
#[derive(Debug, Clone)]
pub struct ImportContext {
    pub event: Event,
    pub source: SourceCatalog,
    pub timezone: Tz,
    /// Language of single-language source titles
    pub language: String,
    /// Room name → value slug, in first-seen order
    rooms: Vec<(String, String)>,
    room_index: HashMap<String, usize>,
}

impl ImportContext {
    pub fn new(event: Event, source: SourceCatalog, timezone: Tz, language: impl Into<String>) -> Self {
        let mut rooms = Vec::new();
        let mut room_index = HashMap::new();
        let mut unique = UniqueSlugs::new();

        let names = source
            .rooms
            .iter()
            .map(|room| room.name.clone())
            .chain(source.programmes.iter().filter_map(|p| p.room.clone()));

        for name in names {
            if name.trim().is_empty() || room_index.contains_key(&name) {
                continue;
            }
            let mut base = slugify(&name);
            if base.is_empty() {
                base = "room".to_string();
            }
            let slug = unique.ensure(&base);
            room_index.insert(name.clone(), rooms.len());
            rooms.push((name, slug));
        }

        Self {
            event,
            source,
            timezone,
            language: language.into(),
            rooms,
            room_index,
        }
    }

    /// Rooms as (name, slug) pairs
    pub fn rooms(&self) -> &[(String, String)] {
        &self.rooms
    }

    pub fn room_slug(&self, name: &str) -> Option<&str> {
        self.room_index
            .get(name)
            .map(|&index| self.rooms[index].1.as_str())
    }

    /// Local calendar day of an instant, honoring [`DATE_CUTOFF_HOURS`]
    pub fn local_date(&self, time: DateTime<Utc>) -> NaiveDate {
        (time.with_timezone(&self.timezone) - Duration::hours(DATE_CUTOFF_HOURS)).date_naive()
    }
}

/// Per-programme assignment map under construction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedDimensions(BTreeMap<String, Vec<String>>);

impl DerivedDimensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure the dimension is present, possibly with no values
    pub fn ensure(&mut self, dimension: &str) {
        self.0.entry(dimension.to_string()).or_default();
    }

    /// Add a value unless already present; returns whether it was added
    pub fn add(&mut self, dimension: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        let values = self.0.entry(dimension.to_string()).or_default();
        if values.contains(&value) {
            return false;
        }
        values.push(value);
        true
    }

    pub fn values(&self, dimension: &str) -> &[String] {
        self.0.get(dimension).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, dimension: &str, value: &str) -> bool {
        self.values(dimension).iter().any(|v| v == value)
    }

    pub fn has_values(&self, dimension: &str) -> bool {
        !self.values(dimension).is_empty()
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_assignment_map(self) -> AssignmentMap {
        self.0
            .into_iter()
            .map(|(dimension, values)| (dimension, ValueSlugs::Many(values)))
            .collect()
    }
}

/// Derivation hooks
///
/// Hooks are synchronous and read only the [`ImportContext`]; the import job
/// owns all storage access.
pub trait Importer {
    fn context(&self) -> &ImportContext;

    /// Full catalog for the event
    fn get_dimensions(&self) -> Vec<DimensionSpec> {
        default::dimensions(self.context())
    }

    fn get_program_dimension_values(&self, programme: &SourceProgramme) -> DerivedDimensions {
        default::program_dimension_values(self.context(), programme)
    }

    /// Non-dimension metadata; may depend on the derived dimension values
    fn get_program_annotations(&self, programme: &SourceProgramme) -> Map<String, Value> {
        default::program_annotations(self.context(), programme)
    }

    fn get_start_time(&self, programme: &SourceProgramme) -> Option<DateTime<Utc>> {
        programme.start_time
    }

    fn get_end_time(&self, programme: &SourceProgramme) -> Option<DateTime<Utc>> {
        programme.computed_end_time()
    }

    /// Unsaved schedule items for the program created from `programme`
    fn get_schedule_items(&self, programme: &SourceProgramme, program: &Program) -> Vec<ScheduleItem> {
        default::schedule_items(self, programme, program)
    }
}
