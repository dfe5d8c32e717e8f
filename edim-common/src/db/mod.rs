//! Database initialization, migrations and persisted records

pub mod events;
pub mod init;
pub mod migrations;
pub mod programs;
pub mod schedule;
pub mod surveys;

pub use events::Event;
pub use init::{init_database, init_schema, open_in_memory};
pub use migrations::run_migrations;
pub use programs::Program;
pub use schedule::ScheduleItem;
pub use surveys::{Response, Survey};

use crate::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// Read a TEXT guid column as a UUID
pub(crate) fn get_guid(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let text: String = row.try_get(column)?;
    Ok(Uuid::parse_str(&text)?)
}
