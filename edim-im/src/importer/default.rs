//! Default derivation: date, category and room

use super::{ImportContext, Importer};
use crate::source::SourceProgramme;
use chrono::{Datelike, NaiveDate, Weekday};
use edim_common::db::{Program, ScheduleItem};
use edim_common::dimensions::{DimensionSpec, DimensionValueSpec, ValueOrdering};
use edim_common::LocalizedText;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub fn date_dimension_title() -> LocalizedText {
    LocalizedText::from_pairs([("fi", "Päivä"), ("en", "Day"), ("sv", "Dag")])
}

pub fn category_dimension_title() -> LocalizedText {
    LocalizedText::from_pairs([("fi", "Kategoria"), ("en", "Category"), ("sv", "Kategori")])
}

pub fn room_dimension_title() -> LocalizedText {
    LocalizedText::from_pairs([("fi", "Tila"), ("en", "Room"), ("sv", "Lokal")])
}

/// Color of a legacy category style; unknown styles inherit the dimension's (empty)
pub fn category_color(style: &str) -> &'static str {
    match style {
        "color1" => "#8b5cf6",
        "color2" => "#0ea5e9",
        "color3" => "#22c55e",
        "color4" => "#eab308",
        "color5" => "#f97316",
        "color6" => "#ef4444",
        "color7" => "#ec4899",
        _ => "",
    }
}

/// Importer with only the default rules
#[derive(Debug, Clone)]
pub struct DefaultImporter {
    context: ImportContext,
}

impl DefaultImporter {
    pub fn new(context: ImportContext) -> Self {
        Self { context }
    }
}

impl Importer for DefaultImporter {
    fn context(&self) -> &ImportContext {
        &self.context
    }
}

pub fn dimensions(ctx: &ImportContext) -> Vec<DimensionSpec> {
    vec![date_dimension(ctx), category_dimension(ctx), room_dimension(ctx)]
}

pub fn date_dimension(ctx: &ImportContext) -> DimensionSpec {
    DimensionSpec::new("date", date_dimension_title())
        .value_ordering(ValueOrdering::Slug)
        .choices(date_dimension_values(ctx))
}

pub fn category_dimension(ctx: &ImportContext) -> DimensionSpec {
    DimensionSpec::new("category", category_dimension_title()).choices(
        ctx.source
            .categories
            .iter()
            .filter(|category| category.public)
            .map(|category| {
                DimensionValueSpec::new(
                    &category.slug,
                    LocalizedText::single(&ctx.language, &category.title),
                )
                .color(category_color(&category.style))
            })
            .collect(),
    )
}

pub fn room_dimension(ctx: &ImportContext) -> DimensionSpec {
    DimensionSpec::new("room", room_dimension_title()).choices(
        ctx.rooms()
            .iter()
            .map(|(name, slug)| DimensionValueSpec::new(slug, LocalizedText::single(&ctx.language, name)))
            .collect(),
    )
}

/// One value per local day that has programme, slug `YYYY-MM-DD`
pub fn date_dimension_values(ctx: &ImportContext) -> Vec<DimensionValueSpec> {
    let dates: BTreeSet<NaiveDate> = ctx
        .source
        .programmes
        .iter()
        .filter_map(|p| p.start_time)
        .map(|start| ctx.local_date(start))
        .collect();

    dates
        .into_iter()
        .map(|date| DimensionValueSpec::new(date_slug(date), date_title(date)))
        .collect()
}

pub fn date_slug(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn date_title(date: NaiveDate) -> LocalizedText {
    let (fi, en, sv) = match date.weekday() {
        Weekday::Mon => ("ma", "Mon", "mån"),
        Weekday::Tue => ("ti", "Tue", "tis"),
        Weekday::Wed => ("ke", "Wed", "ons"),
        Weekday::Thu => ("to", "Thu", "tors"),
        Weekday::Fri => ("pe", "Fri", "fre"),
        Weekday::Sat => ("la", "Sat", "lör"),
        Weekday::Sun => ("su", "Sun", "sön"),
    };

    let mut title = LocalizedText::new();
    title.insert("fi", format!("{} {}.{}.", fi, date.day(), date.month()));
    title.insert("en", format!("{} {}", en, date.format("%-d %b")));
    title.insert("sv", format!("{} {}/{}", sv, date.day(), date.month()));
    title
}

pub fn program_dimension_values(ctx: &ImportContext, programme: &SourceProgramme) -> super::DerivedDimensions {
    let mut dimensions = super::DerivedDimensions::new();

    if let Some(start) = programme.start_time {
        dimensions.add("date", date_slug(ctx.local_date(start)));
    }

    if let Some(category) = programme
        .category
        .as_deref()
        .and_then(|slug| ctx.source.category(slug))
        .filter(|category| category.public)
    {
        dimensions.add("category", &category.slug);
    }

    if let Some(room) = programme.room.as_deref().and_then(|name| ctx.room_slug(name)) {
        dimensions.add("room", room);
    }

    dimensions
}

pub fn program_annotations(_ctx: &ImportContext, _programme: &SourceProgramme) -> Map<String, Value> {
    Map::new()
}

/// One schedule item copied from the source times; none when either end is missing
pub fn schedule_items<I: Importer + ?Sized>(
    importer: &I,
    programme: &SourceProgramme,
    program: &Program,
) -> Vec<ScheduleItem> {
    let (Some(start), Some(end)) = (importer.get_start_time(programme), importer.get_end_time(programme)) else {
        return Vec::new();
    };

    let mut item = ScheduleItem::new(program.guid, start, end - start);
    item.cached_location = program.cached_location.clone();
    vec![item]
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_default_dimensions() {
        let mut opening = programme("opening");
        opening.start_time = Some(Utc.with_ymd_and_hms(2024, 9, 7, 7, 0, 0).unwrap());
        let mut late = programme("late-night");
        late.start_time = Some(Utc.with_ymd_and_hms(2024, 9, 8, 0, 30, 0).unwrap());
        let mut sunday = programme("sunday");
        sunday.start_time = Some(Utc.with_ymd_and_hms(2024, 9, 8, 8, 0, 0).unwrap());
        let ctx = context(vec![opening, late, sunday]);

        let specs = dimensions(&ctx);
        let slugs: Vec<&str> = specs.iter().map(|d| d.slug.as_str()).collect();
        assert_eq!(slugs, vec!["date", "category", "room"]);

        assert_eq!(specs[0].choice_slugs(), vec!["2024-09-07", "2024-09-08"]);
        let saturday = &specs[0].choices.as_ref().unwrap()[0];
        assert_eq!(saturday.title.get("fi"), Some("la 7.9."));

        // Non-public categories are left out
        assert_eq!(specs[1].choice_slugs(), vec!["anime"]);
        assert_eq!(specs[1].choices.as_ref().unwrap()[0].color, "#8b5cf6");

        assert_eq!(specs[2].choice_slugs(), vec!["iso-sali"]);
    }

    #[test]
    fn test_default_program_values() {
        let mut p = programme("opening");
        p.start_time = Some(Utc.with_ymd_and_hms(2024, 9, 7, 7, 0, 0).unwrap());
        p.category = Some("anime".to_string());
        p.room = Some("Iso sali".to_string());
        let ctx = context(vec![p.clone()]);

        let derived = program_dimension_values(&ctx, &p);
        assert_eq!(derived.values("date"), ["2024-09-07"]);
        assert_eq!(derived.values("category"), ["anime"]);
        assert_eq!(derived.values("room"), ["iso-sali"]);

        p.category = Some("backstage".to_string());
        assert!(!program_dimension_values(&ctx, &p).has_values("category"));
    }

    #[test]
    fn test_default_schedule_copies_times() {
        let mut p = programme("opening");
        p.start_time = Some(Utc.with_ymd_and_hms(2024, 9, 7, 7, 0, 0).unwrap());
        p.length = Some(45);
        let ctx = context(vec![p.clone()]);
        let importer = DefaultImporter::new(ctx.clone());

        let mut program = Program::new(ctx.event.guid, "opening", "Opening");
        program.cached_location = "Iso sali".to_string();

        let items = importer.get_schedule_items(&p, &program);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].length, chrono::Duration::minutes(45));
        assert_eq!(items[0].cached_location, "Iso sali");
        assert!(items[0].slot.is_none());

        p.start_time = None;
        assert!(importer.get_schedule_items(&p, &program).is_empty());
    }
}
