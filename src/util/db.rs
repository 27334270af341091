use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// Session knobs applied to every pooled connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectTuning {
    pub max_connections: u32,
    /// Keep server-side prepared statements; turn off behind PgBouncer in txn mode.
    pub prepared: bool,
    /// `synchronous_commit = off` for bulk loads.
    pub fast_ingest: bool,
}

impl Default for ConnectTuning {
    fn default() -> Self {
        Self {
            max_connections: 2,
            prepared: true,
            fast_ingest: false,
        }
    }
}

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, tuning: ConnectTuning) -> Result<Self, sqlx::Error> {
        let mut connect_options = PgConnectOptions::from_str(database_url)?;

        // Ensure TLS is enabled when DSN contains sslmode=require
        if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        if !tuning.prepared {
            // PgBouncer txn mode safe
            connect_options = connect_options.statement_cache_capacity(0);
        }

        let fast_ingest = tuning.fast_ingest;
        let pool = PgPoolOptions::new()
            .max_connections(tuning.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if fast_ingest {
                        // Best-effort; ignore errors to avoid blocking startup in restricted envs
                        let _ = sqlx::query("SET synchronous_commit = 'off'")
                            .execute(&mut *conn)
                            .await;
                    }
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await?;
        info!(fast_ingest, prepared = tuning.prepared, "connected to db");
        Ok(Self { pool })
    }
}
