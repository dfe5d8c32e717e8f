//! Legacy programme export
//!
//! The importer only reads this data. Times are UTC instants; lengths are
//! minutes.

use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SourceCatalog {
    pub event: SourceEvent,
    #[serde(default)]
    pub categories: Vec<SourceCategory>,
    #[serde(default)]
    pub rooms: Vec<SourceRoom>,
    #[serde(default)]
    pub programmes: Vec<SourceProgramme>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceEvent {
    pub slug: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceCategory {
    pub slug: String,
    pub title: String,
    /// Style class of the legacy UI, mapped to a color
    #[serde(default)]
    pub style: String,
    #[serde(default = "default_true")]
    pub public: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRoom {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceProgramme {
    pub slug: String,
    pub title: String,
    pub description: String,
    /// Category slug
    pub category: Option<String>,
    /// Room name
    pub room: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Length in minutes
    pub length: Option<i64>,
    pub signup_link: String,
    /// Slug of the signup form used, if any
    pub form_used: Option<String>,
    pub is_age_restricted: bool,
    pub is_children_friendly: bool,
    pub is_beginner_friendly: bool,
    pub is_intended_for_experienced_participants: bool,
    pub is_using_paikkala: bool,
    pub has_flashing_lights: bool,
    pub has_loud_noises: bool,
    pub has_smoke_effects: bool,
    /// `fi`, `en` or `free`
    pub language: Option<String>,
    /// Program type in the Konsti signup system
    pub konsti_type: Option<String>,
}

/// Longest programme length accepted from an export: one week
pub const MAX_LENGTH_MINUTES: i64 = 7 * 24 * 60;

fn default_true() -> bool {
    true
}

impl SourceCatalog {
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn category(&self, slug: &str) -> Option<&SourceCategory> {
        self.categories.iter().find(|c| c.slug == slug)
    }
}

impl SourceProgramme {
    /// Reject a length that is negative or longer than [`MAX_LENGTH_MINUTES`]
    pub fn validate(&self) -> std::result::Result<(), edim_common::Error> {
        match self.length {
            Some(minutes) if !(0..=MAX_LENGTH_MINUTES).contains(&minutes) => {
                Err(edim_common::Error::InvalidInput(format!(
                    "length {} minutes is outside 0..={}",
                    minutes, MAX_LENGTH_MINUTES
                )))
            }
            _ => Ok(()),
        }
    }

    /// Explicit end time, else start plus length
    ///
    /// `None` when the sum does not fit a timestamp.
    pub fn computed_end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time.or_else(|| {
            let start = self.start_time?;
            let length = Duration::try_minutes(self.length?)?;
            start.checked_add_signed(length)
        })
    }
}
