use crate::commands::{block_on, CommandResult, Failure};
use pactum_core::config::{AppConfig, LoadOptions};
use pactum_db::{connect_with_settings, migrations};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let result = block_on("migrate", async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let pending = migrations::pending_versions(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<_, Failure>(pending)
    });

    match result {
        Ok(pending) if pending.is_empty() => {
            CommandResult::success("migrate", "session store schema already up to date")
        }
        Ok(pending) => {
            let versions: Vec<String> = pending.iter().map(i64::to_string).collect();
            CommandResult::success(
                "migrate",
                format!("applied {} migration(s): {}", pending.len(), versions.join(", ")),
            )
        }
        Err(result) => result,
    }
}
