//! Tracon rules
//!
//! Extends the defaults with accessibility, audience, language, signup and
//! Konsti dimensions, external link annotations and flea market arrival slots.

use super::default::{self, category_dimension, date_dimension, room_dimension};
use super::konsti::{is_konsti_program_type, konsti_dimension, KONSTI_DIMENSION_SLUG};
use super::{DerivedDimensions, ImportContext, Importer};
use crate::source::{SourceProgramme, MAX_LENGTH_MINUTES};
use chrono::{DateTime, Duration, Utc};
use edim_common::db::{Program, ScheduleItem};
use edim_common::dimensions::{DimensionSpec, DimensionValueSpec, ValueOrdering};
use edim_common::LocalizedText;
use serde_json::{json, Map, Value};

/// Programme slugs of flea market reservation windows contain this
pub const FLEAMARKET_SLUG_MARKER: &str = "kirpputorin-ajanvaraus";

pub const FLEAMARKET_SLOT_MINUTES: i64 = 30;

pub const FLEAMARKET_MAX_ATTENDANCE: i64 = 130;

const KONSTI_PROGRAM_URL: &str = "https://ropekonsti.fi/program/item/";
const RESERVATIONS_URL: &str = "https://kompassi.eu/profile/reservations";

fn value(slug: &str, fi: &str, en: &str, sv: Option<&str>) -> DimensionValueSpec {
    let mut title = LocalizedText::from_pairs([("fi", fi), ("en", en)]);
    if let Some(sv) = sv {
        title.insert("sv", sv);
    }
    DimensionValueSpec::new(slug, title)
}

#[derive(Debug, Clone)]
pub struct TraconImporter {
    context: ImportContext,
}

impl TraconImporter {
    pub fn new(context: ImportContext) -> Self {
        Self { context }
    }

    fn fleamarket_schedule_item(
        &self,
        program: &Program,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        slot_offset: Duration,
    ) -> Option<ScheduleItem> {
        let slot_start = start_time.checked_add_signed(slot_offset)?;
        let slot_end = slot_start.checked_add_signed(Duration::minutes(FLEAMARKET_SLOT_MINUTES))?;

        let tz = self.context.timezone;
        let mut item = ScheduleItem::new(program.guid, start_time, end_time - start_time);
        item.subtitle = format!(
            "Saapuminen kello {}–{}",
            slot_start.with_timezone(&tz).format("%H:%M"),
            slot_end.with_timezone(&tz).format("%H:%M")
        );
        item.cached_location = program.cached_location.clone();
        item.slot = Some((slot_start, slot_end));
        Some(item)
    }
}

impl Importer for TraconImporter {
    fn context(&self) -> &ImportContext {
        &self.context
    }

    fn get_dimensions(&self) -> Vec<DimensionSpec> {
        let ctx = &self.context;

        vec![
            date_dimension(ctx),
            category_dimension(ctx),
            DimensionSpec::new(
                "accessibility",
                LocalizedText::from_pairs([("fi", "Esteettömyys"), ("en", "Accessibility"), ("sv", "Tillgänglighet")]),
            )
            .negative_selection()
            .value_ordering(ValueOrdering::Title)
            .choices(vec![
                value("flashing-lights", "Kirkkaita/välkkyviä valoja", "Bright/flashing lights", None),
                value("loud-noises", "Kovia ääniä", "Loud noises", None),
                value("smoke-effects", "Savutehosteita", "Smoke effects", None),
            ]),
            DimensionSpec::new(
                "audience",
                LocalizedText::from_pairs([("fi", "Kohderyhmä"), ("en", "Target Audience"), ("sv", "Målgrupp")]),
            )
            .value_ordering(ValueOrdering::Manual)
            .choices(vec![
                value("unrestricted", "Ei ikärajaa", "No age limit", Some("Ingen åldersgräns")),
                value("r18", "K-18", "For ages 18 and up", Some("För personer över 18 år")),
                value("child-friendly", "Lapsiystävällinen", "Child-friendly", Some("Barnvänlig")),
                value("beginner-friendly", "Aloittelijaystävällinen", "Beginner-friendly", Some("Nybörjarvänlig")),
                value("experienced", "Kokeneille", "For experienced", Some("För erfarna")),
            ]),
            // Not shown until the source data carries languages
            DimensionSpec::new(
                "language",
                LocalizedText::from_pairs([("fi", "Kieli"), ("en", "Language"), ("sv", "Språk")]),
            )
            .value_ordering(ValueOrdering::Manual)
            .hidden()
            .choices(vec![
                value("fi", "Suomi", "Finnish", Some("Finska")),
                value("en", "Englanti", "English", Some("Engelska")),
                value("free", "Kielivapaa", "Language free", Some("Språkfri")),
            ]),
            room_dimension(ctx),
            DimensionSpec::new(
                "signup",
                LocalizedText::from_pairs([
                    ("fi", "Ennakkoilmoittautuminen"),
                    ("en", "Advance Registration"),
                    ("sv", "Förhandsanmälan"),
                ]),
            )
            .choices(vec![
                value("none", "Ei ennakkoilmoittautumista", "No advance registration", Some("Ingen förhandsanmälan")),
                value("tickets", "Erilliset pääsyliput", "Separate tickets", Some("Separata biljetter")),
                value("paikkala", "Maksuttomat paikkaliput", "Free seating tickets", Some("Gratis sittplatsbiljetter")),
                value("konsti", "Ilmoittautuminen Konstilla", "Registration via Konsti", Some("Anmälan via Konsti")),
                value("form", "Ilmoittautuminen lomakkeella", "Registration via form", Some("Anmälan via formulär")),
            ]),
            konsti_dimension(),
        ]
    }

    fn get_program_dimension_values(&self, programme: &SourceProgramme) -> DerivedDimensions {
        let mut dimensions = default::program_dimension_values(&self.context, programme);

        for (flag, slug) in [
            (programme.has_flashing_lights, "flashing-lights"),
            (programme.has_loud_noises, "loud-noises"),
            (programme.has_smoke_effects, "smoke-effects"),
        ] {
            if flag {
                dimensions.add("accessibility", slug);
            }
        }

        dimensions.ensure("audience");
        for (flag, slug) in [
            (programme.is_age_restricted, "r18"),
            (programme.is_children_friendly, "child-friendly"),
            (programme.is_beginner_friendly, "beginner-friendly"),
            (programme.is_intended_for_experienced_participants, "experienced"),
        ] {
            if flag {
                dimensions.add("audience", slug);
            }
        }
        if !dimensions.contains("audience", "r18") {
            dimensions.add("audience", "unrestricted");
        }

        if let Some(language) = programme.language.as_deref() {
            if matches!(language, "fi" | "en" | "free") {
                dimensions.add("language", language);
            }
        }

        dimensions.ensure(KONSTI_DIMENSION_SLUG);
        if programme.form_used.as_deref() == Some("rpg") {
            dimensions.add(KONSTI_DIMENSION_SLUG, "tabletopRPG");
        }
        if let Some(konsti_type) = programme.konsti_type.as_deref() {
            if is_konsti_program_type(konsti_type) {
                dimensions.add(KONSTI_DIMENSION_SLUG, konsti_type);
            }
        }

        dimensions.ensure("signup");
        if dimensions.has_values(KONSTI_DIMENSION_SLUG) {
            dimensions.add("signup", "konsti");
        }
        let link = programme.signup_link.as_str();
        if !link.is_empty() {
            if link.contains("forms") || link.contains("survey") {
                dimensions.add("signup", "form");
            }
            if link.contains("konsti") {
                dimensions.add("signup", "konsti");
            }
            if link.contains("lippu.fi") {
                dimensions.add("signup", "tickets");
            }
        }
        if programme.is_using_paikkala {
            dimensions.add("signup", "paikkala");
        }
        if !dimensions.has_values("signup") {
            dimensions.add("signup", "none");
        }

        dimensions
    }

    fn get_program_annotations(&self, programme: &SourceProgramme) -> Map<String, Value> {
        let mut annotations = default::program_annotations(&self.context, programme);
        let dimensions = self.get_program_dimension_values(programme);

        if dimensions.has_values(KONSTI_DIMENSION_SLUG) {
            annotations.insert(
                "internal:links:signup".to_string(),
                json!(format!("{}{}", KONSTI_PROGRAM_URL, programme.slug)),
            );
        }
        if dimensions.contains(KONSTI_DIMENSION_SLUG, "fleamarket") {
            annotations.insert("konsti:maxAttendance".to_string(), json!(FLEAMARKET_MAX_ATTENDANCE));
        }

        if programme.signup_link.contains("lippu.fi") {
            annotations.insert("internal:links:tickets".to_string(), json!(programme.signup_link));
            annotations.insert("internal:links:signup".to_string(), json!(""));
        }

        if dimensions.contains("signup", "paikkala") {
            annotations.insert("internal:links:reservation".to_string(), json!(RESERVATIONS_URL));
        }

        annotations
    }

    /// Flea market windows become one item per 30-minute arrival slot
    ///
    /// Every item spans the whole window so Konsti treats the slots as mutually
    /// exclusive. Offsets run `0, 30, ...` strictly below the programme length.
    fn get_schedule_items(&self, programme: &SourceProgramme, program: &Program) -> Vec<ScheduleItem> {
        if !programme.slug.contains(FLEAMARKET_SLUG_MARKER) {
            return default::schedule_items(self, programme, program);
        }

        let (Some(start_time), Some(end_time)) =
            (self.get_start_time(programme), self.get_end_time(programme))
        else {
            return Vec::new();
        };

        let total_minutes = programme
            .length
            .filter(|&minutes| minutes != 0)
            .unwrap_or(-1)
            .min(MAX_LENGTH_MINUTES);

        (0..total_minutes)
            .step_by(FLEAMARKET_SLOT_MINUTES as usize)
            .filter_map(|offset| {
                self.fleamarket_schedule_item(program, start_time, end_time, Duration::minutes(offset))
            })
            .collect()
    }
}
