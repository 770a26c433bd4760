use chrono::NaiveDate;
use rusqlite::{Connection, params};

use crate::config::DestinationHandle;
use crate::domain::DailyStatRecord;
use crate::error::StatsError;

/// Idempotent bootstrap for a destination database. `dim_location` is
/// maintained outside this tool; the two views are what the area catalog
/// reads.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS dim_location (
    alpha_2_code TEXT PRIMARY KEY,
    name TEXT,
    is_covid_country INTEGER NOT NULL DEFAULT 0,
    is_covid_state INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS dim_date (
    date TEXT PRIMARY KEY
);
CREATE TABLE IF NOT EXISTS day_stat (
    alpha_2_code TEXT NOT NULL,
    date TEXT NOT NULL REFERENCES dim_date(date),
    confirmed INTEGER NOT NULL,
    deaths INTEGER NOT NULL,
    recovered INTEGER NOT NULL,
    PRIMARY KEY (alpha_2_code, date)
);
CREATE VIEW IF NOT EXISTS api_countries AS
    SELECT alpha_2_code FROM dim_location WHERE is_covid_country = 1;
CREATE VIEW IF NOT EXISTS api_states AS
    SELECT alpha_2_code FROM dim_location WHERE is_covid_state = 1;
";

/// Write contract of one destination store.
pub trait Destination {
    fn name(&self) -> &str;
    /// Upserts the date dimension entry.
    fn register_date(&mut self, date: NaiveDate) -> Result<(), StatsError>;
    /// Upserts the `(area, date)` row with the record's counts.
    fn upsert_day_stat(&mut self, record: &DailyStatRecord) -> Result<(), StatsError>;
}

pub trait DestinationConnector: Send + Sync {
    fn open(&self, handle: &DestinationHandle) -> Result<Box<dyn Destination>, StatsError>;
}

pub struct SqliteConnector;

impl DestinationConnector for SqliteConnector {
    fn open(&self, handle: &DestinationHandle) -> Result<Box<dyn Destination>, StatsError> {
        Ok(Box::new(SqliteDestination::open(handle)?))
    }
}

pub struct SqliteDestination {
    name: String,
    conn: Connection,
}

impl SqliteDestination {
    pub fn open(handle: &DestinationHandle) -> Result<Self, StatsError> {
        let unavailable = |err: rusqlite::Error| StatsError::DestinationUnavailable {
            destination: handle.name.clone(),
            message: err.to_string(),
        };
        let conn = Connection::open(handle.path.as_std_path()).map_err(unavailable)?;
        conn.execute_batch(SCHEMA).map_err(unavailable)?;
        Ok(Self {
            name: handle.name.clone(),
            conn,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn write_failed(&self, err: rusqlite::Error) -> StatsError {
        StatsError::DestinationWriteFailed {
            destination: self.name.clone(),
            message: err.to_string(),
        }
    }
}

impl Destination for SqliteDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_date(&mut self, date: NaiveDate) -> Result<(), StatsError> {
        self.conn
            .execute(
                "INSERT INTO dim_date (date) VALUES (?1) ON CONFLICT(date) DO NOTHING",
                params![date.format("%Y-%m-%d").to_string()],
            )
            .map_err(|err| self.write_failed(err))?;
        Ok(())
    }

    fn upsert_day_stat(&mut self, record: &DailyStatRecord) -> Result<(), StatsError> {
        let column = |name: &str, count: u64| {
            i64::try_from(count).map_err(|_| StatsError::DestinationWriteFailed {
                destination: self.name.clone(),
                message: format!("{name} {count} for {} exceeds SQLite integer range", record.area),
            })
        };
        let counts = [
            column("confirmed", record.confirmed)?,
            column("deaths", record.deaths)?,
            column("recovered", record.recovered)?,
        ];
        self.conn
            .execute(
                "INSERT INTO day_stat (alpha_2_code, date, confirmed, deaths, recovered)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(alpha_2_code, date) DO UPDATE SET
                    confirmed = excluded.confirmed,
                    deaths = excluded.deaths,
                    recovered = excluded.recovered",
                params![
                    record.area.as_str(),
                    record.date.format("%Y-%m-%d").to_string(),
                    counts[0],
                    counts[1],
                    counts[2],
                ],
            )
            .map_err(|err| self.write_failed(err))?;
        Ok(())
    }
}
