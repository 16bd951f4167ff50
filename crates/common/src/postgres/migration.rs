use crate::postgres::PostgresConfig;
use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

/// Applies goose SQL migrations by running the goose binary.
pub struct MigrationRunner {
    goose_binary_path: String,
    migrations_dir: String,
    dsn: String,
}

impl MigrationRunner {
    pub fn new(goose_binary_path: String, migrations_dir: String, dsn: String) -> Self {
        Self {
            goose_binary_path,
            migrations_dir,
            dsn,
        }
    }

    pub fn from_config(config: &PostgresConfig) -> Self {
        Self::new(
            config.goose_binary_path.clone(),
            config.migrations_dir.clone(),
            config.dsn(),
        )
    }

    /// Runs `goose -dir {migrations_dir} postgres {dsn} up`.
    pub async fn run_migrations(&self) -> Result<()> {
        debug!(migrations_dir = %self.migrations_dir, "running migrations");
        let stdout = self.goose("up").await?;
        info!("migrations applied");
        debug!("goose output:\n{}", stdout);
        Ok(())
    }

    async fn goose(&self, command: &str) -> Result<String> {
        let output = Command::new(&self.goose_binary_path)
            .arg("-dir")
            .arg(&self.migrations_dir)
            .arg("postgres")
            .arg(&self.dsn)
            .arg(command)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.goose_binary_path))?;

        // goose prints status to stderr
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            bail!(
                "goose {} failed.\nstdout: {}\nstderr: {}",
                command,
                stdout,
                stderr
            );
        }

        Ok(format!("{}{}", stdout, stderr))
    }
}
