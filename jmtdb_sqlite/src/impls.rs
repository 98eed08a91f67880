use jmtcore::platform::{
    DefaultTMPlatform,
    PlatformUrl,
};
use sqlx::{
    Sqlite,
    SqlitePool,
    migrate::MigrateDatabase,
};
use std::sync::Arc;

use crate::SqliteBackend;

mod task;

impl PlatformUrl for SqliteBackend {
    fn url(&self) -> &str {
        self.url.as_ref()
    }
}

impl DefaultTMPlatform for SqliteBackend {}

impl SqliteBackend {
    pub async fn connect(url: &str) -> Result<SqliteBackend, sqlx::Error> {
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            log::warn!("sqlite database {url} does not exist; creating...");
            Sqlite::create_database(url).await?
        }

        let pool = SqlitePool::connect(url).await?;
        Ok(SqliteBackend {
            pool: Arc::new(pool),
            url: url.to_string(),
        })
    }

    pub async fn migrate_tm(self) -> Result<Self, sqlx::Error> {
        sqlx::migrate!("./migrations").run(&*self.pool).await?;
        Ok(self)
    }

    /// Connect and migrate in one go; the task-management bootstrap used
    /// by the bins and tests.
    pub async fn tm(url: &str) -> Result<Self, sqlx::Error> {
        SqliteBackend::connect(url)
            .await?
            .migrate_tm()
            .await
    }
}
