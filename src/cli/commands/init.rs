//! Initialize command.

use crate::config::Settings;
use crate::repository::migrations;

/// Create the database file and bring the schema up to date.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    migrations::run_migrations(&settings.database_url()).await?;
    println!("Database ready at {}", settings.database_path.display());
    Ok(())
}
