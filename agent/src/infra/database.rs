//! Post-update database migration through the `mysql` client.

use anyhow::{Context, Result};

use crate::application::ports::{CommandRunner, DatabaseMigrator};
use crate::domain::DatabaseConfig;
use crate::infra::command_runner::check_status;

pub struct MysqlMigrator<C> {
    runner: C,
    database: Option<DatabaseConfig>,
}

impl<C: CommandRunner> MysqlMigrator<C> {
    pub fn new(runner: C, database: Option<DatabaseConfig>) -> Self {
        Self { runner, database }
    }
}

impl<C: CommandRunner> DatabaseMigrator for MysqlMigrator<C> {
    async fn migrate(&self) -> Result<()> {
        let Some(db) = &self.database else {
            tracing::info!("no database configured; skipping migration");
            return Ok(());
        };
        let password = tokio::fs::read_to_string(&db.key_file)
            .await
            .with_context(|| format!("reading database key {}", db.key_file.display()))?;
        let password_arg = format!("-p{}", password.trim());
        let source = format!("source {}", db.sql_path.display());
        let args = [
            "-u",
            db.login.as_str(),
            "-h",
            db.host.as_str(),
            "-P",
            db.port.as_str(),
            password_arg.as_str(),
            "-e",
            source.as_str(),
        ];
        let output = self.runner.run("mysql", &args).await?;
        check_status("mysql", output)
            .with_context(|| format!("applying {}", db.sql_path.display()))?;
        tracing::info!(sql = %db.sql_path.display(), host = %db.host, "database migration applied");
        Ok(())
    }
}
