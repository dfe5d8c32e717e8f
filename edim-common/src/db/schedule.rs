//! Schedule items of program items
//!
//! A program owns zero or more schedule items. Reimports replace the whole set.

use crate::db::get_guid;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleItem {
    pub guid: Uuid,
    pub program_id: Uuid,
    pub subtitle: String,
    pub start_time: DateTime<Utc>,
    pub length: Duration,
    pub cached_location: String,
    /// Arrival slot within a longer window (flea market reservations)
    pub slot: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl ScheduleItem {
    pub fn new(program_id: Uuid, start_time: DateTime<Utc>, length: Duration) -> Self {
        Self {
            guid: Uuid::new_v4(),
            program_id,
            subtitle: String::new(),
            start_time,
            length,
            cached_location: String::new(),
            slot: None,
        }
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + self.length
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        let length_seconds: i64 = row.try_get("length_seconds")?;
        let slot_start: Option<DateTime<Utc>> = row.try_get("slot_start")?;
        let slot_end: Option<DateTime<Utc>> = row.try_get("slot_end")?;

        Ok(Self {
            guid: get_guid(row, "guid")?,
            program_id: get_guid(row, "program_id")?,
            subtitle: row.try_get("subtitle")?,
            start_time: row.try_get("start_time")?,
            length: Duration::seconds(length_seconds),
            cached_location: row.try_get("cached_location")?,
            slot: slot_start.zip(slot_end),
        })
    }
}

/// Replace the schedule items of a program
///
/// New items are inserted before the previous set is deleted.
pub async fn replace_schedule_items(
    conn: &mut SqliteConnection,
    program_id: Uuid,
    items: &[ScheduleItem],
) -> Result<()> {
    let previous: Vec<String> =
        sqlx::query_scalar("SELECT guid FROM schedule_items WHERE program_id = ?")
            .bind(program_id.to_string())
            .fetch_all(&mut *conn)
            .await?;

    for item in items {
        sqlx::query(
            r#"
            INSERT INTO schedule_items (
                guid, program_id, subtitle, start_time, length_seconds,
                cached_end_time, cached_location, slot_start, slot_end
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(program_id.to_string())
        .bind(&item.subtitle)
        .bind(item.start_time)
        .bind(item.length.num_seconds())
        .bind(item.end_time())
        .bind(&item.cached_location)
        .bind(item.slot.map(|(start, _)| start))
        .bind(item.slot.map(|(_, end)| end))
        .execute(&mut *conn)
        .await?;
    }

    for guid in &previous {
        sqlx::query("DELETE FROM schedule_items WHERE guid = ?")
            .bind(guid)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Schedule items of a program in start order
pub async fn list_schedule_items(pool: &SqlitePool, program_id: Uuid) -> Result<Vec<ScheduleItem>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, program_id, subtitle, start_time, length_seconds, cached_location, slot_start, slot_end
        FROM schedule_items
        WHERE program_id = ?
        ORDER BY start_time, slot_start
        "#,
    )
    .bind(program_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(ScheduleItem::from_row).collect()
}
