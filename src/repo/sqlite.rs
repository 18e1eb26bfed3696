//! SQLite persistence, enabled with the `db` feature.
//!
//! Hours are keyed by `(date, hour)` in UTC. Dates are stored as
//! `YYYY-MM-DD` text so lexical order is chronological order.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use super::{ForecastStore, HourlyStore, PlanningStore};
use crate::domain::{DateHour, HourlyForecast, HourlySummary, PlanningRow, Strategy};
use crate::forecast::ForecastSource;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS planning (
        date TEXT NOT NULL,
        hour INTEGER NOT NULL,
        strategy TEXT NOT NULL,
        PRIMARY KEY (date, hour)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS energy_forecast (
        date TEXT NOT NULL,
        hour INTEGER NOT NULL,
        production REAL NOT NULL,
        consumption REAL NOT NULL,
        PRIMARY KEY (date, hour)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS energy_price (
        date TEXT NOT NULL,
        hour INTEGER NOT NULL,
        price REAL NOT NULL,
        PRIMARY KEY (date, hour)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS hourly (
        date TEXT NOT NULL,
        hour INTEGER NOT NULL,
        grid_import REAL NOT NULL,
        grid_export REAL NOT NULL,
        price REAL NOT NULL,
        cash_flow REAL NOT NULL,
        battery_level REAL NOT NULL,
        strategy TEXT,
        PRIMARY KEY (date, hour)
    )
    "#,
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> Result<Self> {
        // Every connection to an in-memory database sees its own copy.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .with_context(|| format!("connecting to {url}"))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url, "sqlite store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn to_row((date, hour, strategy): (NaiveDate, i64, String)) -> Result<PlanningRow> {
    let hour = DateHour::new(date, hour as u32)
        .with_context(|| format!("stored hour out of range: {date} {hour}"))?;
    let strategy: Strategy = strategy
        .parse()
        .with_context(|| format!("unknown stored strategy {strategy:?}"))?;
    Ok(PlanningRow::new(hour, strategy))
}

type HourlyRecord = (NaiveDate, i64, f64, f64, f64, f64, f64, Option<String>);

fn to_summary(row: HourlyRecord) -> Result<HourlySummary> {
    let (date, hour, grid_import_kwh, grid_export_kwh, energy_price, cash_flow, battery_level_pct, strategy) =
        row;
    let hour = DateHour::new(date, hour as u32)
        .with_context(|| format!("stored hour out of range: {date} {hour}"))?;
    let strategy = strategy
        .map(|s| s.parse::<Strategy>().with_context(|| format!("unknown stored strategy {s:?}")))
        .transpose()?;
    Ok(HourlySummary {
        hour,
        grid_import_kwh,
        grid_export_kwh,
        energy_price,
        cash_flow,
        battery_level_pct,
        strategy,
    })
}

#[async_trait]
impl PlanningStore for SqliteStore {
    async fn save_planning(&self, row: PlanningRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO planning (date, hour, strategy)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (date, hour) DO UPDATE SET strategy = excluded.strategy
            "#,
        )
        .bind(row.hour.date)
        .bind(row.hour.hour as i64)
        .bind(row.strategy.as_ref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn planning_for_hour(&self, hour: DateHour) -> Result<Option<PlanningRow>> {
        let row: Option<(NaiveDate, i64, String)> = sqlx::query_as(
            r#"
            SELECT date, hour, strategy
            FROM planning
            WHERE date = ?1 AND hour = ?2
            "#,
        )
        .bind(hour.date)
        .bind(hour.hour as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(to_row).transpose()
    }

    async fn planning_from(&self, from: DateHour) -> Result<Vec<PlanningRow>> {
        let rows: Vec<(NaiveDate, i64, String)> = sqlx::query_as(
            r#"
            SELECT date, hour, strategy
            FROM planning
            WHERE date > ?1 OR (date = ?1 AND hour >= ?2)
            ORDER BY date, hour
            "#,
        )
        .bind(from.date)
        .bind(from.hour as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(to_row).collect()
    }

    async fn purge_planning_before(&self, before: DateHour) -> Result<u64> {
        let res = sqlx::query("DELETE FROM planning WHERE date < ?1 OR (date = ?1 AND hour < ?2)")
            .bind(before.date)
            .bind(before.hour as i64)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl ForecastSource for SqliteStore {
    async fn hour_forecast(&self, hour: DateHour) -> Result<Option<HourlyForecast>> {
        let row: Option<(f64, f64, f64)> = sqlx::query_as(
            r#"
            SELECT p.price, f.production, f.consumption
            FROM energy_forecast f
            JOIN energy_price p ON p.date = f.date AND p.hour = f.hour
            WHERE f.date = ?1 AND f.hour = ?2
            "#,
        )
        .bind(hour.date)
        .bind(hour.hour as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(energy_price, production_kwh, consumption_kwh)| HourlyForecast {
            energy_price,
            production_kwh,
            consumption_kwh,
        }))
    }
}

#[async_trait]
impl ForecastStore for SqliteStore {
    async fn save_forecast(&self, hour: DateHour, forecast: HourlyForecast) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO energy_forecast (date, hour, production, consumption)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (date, hour) DO UPDATE
            SET production = excluded.production, consumption = excluded.consumption
            "#,
        )
        .bind(hour.date)
        .bind(hour.hour as i64)
        .bind(forecast.production_kwh)
        .bind(forecast.consumption_kwh)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"
            INSERT INTO energy_price (date, hour, price)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (date, hour) DO UPDATE SET price = excluded.price
            "#,
        )
        .bind(hour.date)
        .bind(hour.hour as i64)
        .bind(forecast.energy_price)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn purge_forecasts_before(&self, before: DateHour) -> Result<u64> {
        let mut purged = 0;
        for table in ["energy_forecast", "energy_price"] {
            let res = sqlx::query(&format!(
                "DELETE FROM {table} WHERE date < ?1 OR (date = ?1 AND hour < ?2)"
            ))
            .bind(before.date)
            .bind(before.hour as i64)
            .execute(&self.pool)
            .await?;
            purged += res.rows_affected();
        }
        Ok(purged)
    }
}

#[async_trait]
impl HourlyStore for SqliteStore {
    async fn save_hourly(&self, summary: HourlySummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO hourly
                (date, hour, grid_import, grid_export, price, cash_flow, battery_level, strategy)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (date, hour) DO UPDATE SET
                grid_import = excluded.grid_import,
                grid_export = excluded.grid_export,
                price = excluded.price,
                cash_flow = excluded.cash_flow,
                battery_level = excluded.battery_level,
                strategy = excluded.strategy
            "#,
        )
        .bind(summary.hour.date)
        .bind(summary.hour.hour as i64)
        .bind(summary.grid_import_kwh)
        .bind(summary.grid_export_kwh)
        .bind(summary.energy_price)
        .bind(summary.cash_flow)
        .bind(summary.battery_level_pct)
        .bind(summary.strategy.map(|s| s.as_ref().to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn hourly_from(&self, from: DateHour) -> Result<Vec<HourlySummary>> {
        let rows: Vec<HourlyRecord> = sqlx::query_as(
            r#"
            SELECT date, hour, grid_import, grid_export, price, cash_flow, battery_level, strategy
            FROM hourly
            WHERE date > ?1 OR (date = ?1 AND hour >= ?2)
            ORDER BY date, hour
            "#,
        )
        .bind(from.date)
        .bind(from.hour as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(to_summary).collect()
    }

    async fn purge_hourly_before(&self, before: DateHour) -> Result<u64> {
        let res = sqlx::query("DELETE FROM hourly WHERE date < ?1 OR (date = ?1 AND hour < ?2)")
            .bind(before.date)
            .bind(before.hour as i64)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}
