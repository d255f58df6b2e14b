use blockttl::CacheSettings;
use eyre::WrapErr;
use std::path::Path;

/// Loads settings from `file` when given, then applies the environment
pub async fn load(file: Option<&Path>) -> eyre::Result<CacheSettings> {
    let settings = match file {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .wrap_err_with(|| format!("failed to read settings from {}", path.display()))?;
            CacheSettings::from_json_str(&json)?.merge_env()?
        }
        None => CacheSettings::from_env()?,
    };

    tracing::debug!(
        max_entry_life_ms = settings.max_entry_life_ms,
        block_width = settings.block_width,
        "loaded settings"
    );
    Ok(settings)
}

pub async fn execute(file: Option<&Path>) -> eyre::Result<()> {
    let settings = load(file).await?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
