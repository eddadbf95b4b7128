//! Event source adapter
//!
//! Reads the events of one extraction window from the event store. The
//! store is reached through [`EventSource`] so the pipeline can be driven
//! by an in-memory source in tests.

use crate::config::DatabaseConfig;
use crate::errors::ExtractionError;
use crate::event::{non_empty_metadata, DatasetSnapshot, EventRecord, ExtractionWindow};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{ConnectOptions, Connection, FromRow};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Read-only query for one window; bounds are bound as `$1` and `$2`.
pub const WINDOW_QUERY: &str = "SELECT id::text AS id, user_id::bigint AS user_id, \
     activity_id::bigint AS activity_id, event_type, metadata::text AS metadata, \
     created_at::timestamptz AS created_at \
     FROM event_logs WHERE created_at >= $1 AND created_at < $2";

/// Typed row at the store boundary
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct EventRow {
    pub id: String,
    pub user_id: Option<i64>,
    pub activity_id: Option<i64>,
    pub event_type: String,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        EventRecord {
            id: row.id,
            user_id: row.user_id,
            activity_id: row.activity_id,
            event_type: row.event_type,
            metadata: non_empty_metadata(row.metadata),
            created_at: row.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }
}

/// Anything that can answer the window query
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch(&self, window: &ExtractionWindow) -> Result<Vec<EventRow>, ExtractionError>;
}

/// Postgres-backed event source.
///
/// Opens one connection per [`fetch`](EventSource::fetch) and releases it
/// before returning.
pub struct PgEventSource {
    options: PgConnectOptions,
    host: String,
    port: u16,
    database: String,
}

/// Reported to the server as `application_name`
pub const APPLICATION_NAME: &str = "ml-offline";

impl PgEventSource {
    /// Build connection options from `config`.
    ///
    /// sqlx seeds its options from the libpq environment (`PGHOST`,
    /// `PGSSLMODE`, `PGAPPNAME`, ...). Every field the pipeline configures is
    /// overwritten here, along with the SSL mode and application name, and
    /// the password file is not consulted. `PGOPTIONS` and the TLS
    /// certificate variables (`PGSSLROOTCERT`, `PGSSLCERT`, `PGSSLKEY`) are
    /// still honored by the driver.
    pub fn new(config: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new_without_pgpass()
            .host(&config.host)
            .port(config.port)
            .database(&config.name)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(PgSslMode::Prefer)
            .application_name(APPLICATION_NAME);
        Self {
            options,
            host: config.host.clone(),
            port: config.port,
            database: config.name.clone(),
        }
    }
}

#[async_trait]
impl EventSource for PgEventSource {
    async fn fetch(&self, window: &ExtractionWindow) -> Result<Vec<EventRow>, ExtractionError> {
        debug!(host = %self.host, port = self.port, database = %self.database, "connecting to event store");
        let mut conn: PgConnection =
            self.options
                .connect()
                .await
                .map_err(|source| ExtractionError::Connect {
                    host: self.host.clone(),
                    port: self.port,
                    database: self.database.clone(),
                    source,
                })?;

        // On error the connection is dropped here, which closes it.
        let rows = sqlx::query_as::<_, EventRow>(WINDOW_QUERY)
            .bind(window.start)
            .bind(window.end)
            .fetch_all(&mut conn)
            .await
            .map_err(|source| ExtractionError::Query {
                window: *window,
                source,
            })?;

        if let Err(e) = conn.close().await {
            warn!(error = %e, "failed to close event store connection cleanly");
        }
        Ok(rows)
    }
}

/// Run the window query and package the result as a snapshot.
///
/// Rows the source returns outside the window are dropped and counted so
/// every record in the snapshot satisfies the window bounds.
pub async fn extract(
    source: &dyn EventSource,
    window: &ExtractionWindow,
    timeout: Option<Duration>,
) -> Result<DatasetSnapshot, ExtractionError> {
    if window.lookback_days <= 0 {
        return Err(ExtractionError::InvalidWindow {
            lookback_days: window.lookback_days,
        });
    }

    info!(%window, "extracting events");
    let rows = match timeout {
        Some(after) => tokio::time::timeout(after, source.fetch(window))
            .await
            .map_err(|_| ExtractionError::Timeout {
                window: *window,
                after,
            })??,
        None => source.fetch(window).await?,
    };

    let fetched = rows.len();
    let records: Vec<EventRecord> = rows
        .into_iter()
        .filter(|row| window.contains(&row.created_at))
        .map(EventRecord::from)
        .collect();

    let outside = fetched - records.len();
    if outside > 0 {
        warn!(
            outside,
            fetched,
            %window,
            "event source returned rows outside the window; dropped"
        );
    }
    info!(rows = records.len(), %window, "extraction complete");

    Ok(DatasetSnapshot::new(records, Utc::now()))
}
