use rusqlite::{Connection, OpenFlags};

use crate::config::DestinationHandle;
use crate::domain::{AreaCode, Scope};
use crate::error::StatsError;

/// Source of the areas a scope should fetch, in fetch order.
pub trait AreaCatalog: Send + Sync {
    fn list_areas(&self, scope: Scope) -> Result<Vec<AreaCode>, StatsError>;
}

/// Reads the catalog from a single destination; all destinations are
/// assumed to carry the same location dimension. The database is opened
/// read-only and must already exist.
#[derive(Debug, Clone)]
pub struct SqliteAreaCatalog {
    handle: DestinationHandle,
}

impl SqliteAreaCatalog {
    pub fn new(handle: DestinationHandle) -> Self {
        Self { handle }
    }

    fn query(&self, view: &str) -> Result<Vec<AreaCode>, StatsError> {
        let unavailable = |err: rusqlite::Error| {
            StatsError::CatalogUnavailable(format!("{}: {err}", self.handle.name))
        };
        let conn = Connection::open_with_flags(
            self.handle.path.as_std_path(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(unavailable)?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT alpha_2_code FROM {view} ORDER BY alpha_2_code"
            ))
            .map_err(unavailable)?;
        let codes = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(unavailable)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(unavailable)?;

        codes
            .into_iter()
            .map(|code| {
                code.parse::<AreaCode>().map_err(|_| {
                    StatsError::CatalogUnavailable(format!(
                        "{}: invalid area code in {view}: {code:?}",
                        self.handle.name
                    ))
                })
            })
            .collect()
    }
}

impl AreaCatalog for SqliteAreaCatalog {
    fn list_areas(&self, scope: Scope) -> Result<Vec<AreaCode>, StatsError> {
        match scope {
            Scope::Country => self.query("api_countries"),
            Scope::Region => self.query("api_states"),
            Scope::Global => Ok(vec![AreaCode::global()]),
        }
    }
}
