use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::domain::{DateHour, HourlyForecast};
use crate::repo::ForecastStore;

/// Price and energy estimates per hour, as collected by the upstream
/// forecast jobs. `None` means nothing is known about that hour yet.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn hour_forecast(&self, hour: DateHour) -> Result<Option<HourlyForecast>>;
}

/// Copies `hours` hours starting at `from` from `upstream` into `store`.
/// Hours the upstream knows nothing about are skipped. Returns how many
/// hours were written.
pub async fn refresh(
    upstream: &dyn ForecastSource,
    store: &dyn ForecastStore,
    from: DateHour,
    hours: usize,
) -> Result<usize> {
    let mut written = 0;
    for offset in 0..hours {
        let hour = from.add(offset as i64);
        match upstream.hour_forecast(hour).await? {
            Some(forecast) => {
                store.save_forecast(hour, forecast).await?;
                written += 1;
            }
            None => debug!(%hour, "upstream has no forecast"),
        }
    }
    Ok(written)
}
