use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use prayer_ai_cache::{FlowCache, FlowCacheConfig};
use prayer_flows::fakes::StaticModel;
use prayer_flows::{operations, PrayerFlows};
use prayer_monitoring::MonitoringConfig;
use tracing::info;

const VERSE: &str = r#"```json
{"verse": "Do not be anxious about anything, but in every situation, by prayer and petition, with thanksgiving, present your requests to God.", "reference": "Philippians 4:6"}
```"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Set up monitoring
    let monitoring_config = MonitoringConfig::from_env();
    prayer_monitoring::init(&monitoring_config).context("Failed to initialize monitoring")?;

    // Load configuration from environment variables
    let config = FlowCacheConfig::from_env().context("Failed to load flow cache configuration")?;
    let cache = FlowCache::start(config).context("Failed to start flow cache")?;

    let model = Arc::new(StaticModel::new(VERSE));
    let flows = PrayerFlows::new(model.clone(), cache.clone());
    let date = NaiveDate::from_ymd_opt(2024, 6, 1).context("Invalid demo date")?;

    for call in 1..=5 {
        let verse = flows
            .daily_verse(date)
            .await
            .with_context(|| format!("Daily verse call {call} failed"))?;
        info!(call, reference = %verse.reference, "Daily verse");
    }

    info!(
        model_calls = model.calls(),
        stats = ?cache.stats(),
        window = ?cache.rate_window(operations::DAILY_VERSE),
        "Demo finished"
    );

    prayer_monitoring::shutdown();
    Ok(())
}
