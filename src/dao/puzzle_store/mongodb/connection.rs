use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::{debug, info};

use super::error::{MongoDaoError, MongoResult};

const APP_NAME: &str = "tactics-back";
const PING_DELAY_CAP: Duration = Duration::from_secs(5);

/// How hard [`establish_connection`] tries before giving up.
#[derive(Debug, Clone, Copy)]
pub struct PingRetry {
    pub attempts: u32,
    pub initial_delay: Duration,
}

impl PingRetry {
    /// Used on startup, when the database may still be booting.
    pub const STARTUP: Self = Self {
        attempts: 10,
        initial_delay: Duration::from_millis(250),
    };
    /// Used by reconnects; the storage supervisor already backs off between calls.
    pub const RECONNECT: Self = Self {
        attempts: 1,
        initial_delay: Duration::from_millis(250),
    };
}

/// Build a client, wait until the database answers a ping and check that the
/// deployment can run multi-document transactions.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
    retry: PingRetry,
) -> MongoResult<(Client, Database)> {
    let mut options = options.clone();
    options.app_name.get_or_insert_with(|| APP_NAME.to_owned());
    let client = Client::with_options(options)
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut attempts = 0;
    let mut delay = retry.initial_delay;
    loop {
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => break,
            Err(err) => {
                attempts += 1;
                if attempts >= retry.attempts {
                    return Err(MongoDaoError::InitialPing {
                        attempts,
                        source: err,
                    });
                }
                debug!(attempts, error = %err, "MongoDB ping failed; retrying");
                sleep(delay).await;
                delay = (delay * 2).min(PING_DELAY_CAP);
            }
        }
    }

    ensure_transactions(&database).await?;
    info!(database = database_name, "connected to MongoDB");
    Ok((client, database))
}

/// Transactions need a replica set member or a mongos router.
async fn ensure_transactions(database: &Database) -> MongoResult<()> {
    let hello = database
        .run_command(doc! { "hello": 1 })
        .await
        .map_err(|source| MongoDaoError::HealthPing { source })?;

    let replica_set = hello.get_str("setName").is_ok();
    let router = hello.get_str("msg").is_ok_and(|msg| msg == "isdbgrid");
    if replica_set || router {
        Ok(())
    } else {
        Err(MongoDaoError::TransactionsUnsupported)
    }
}
