//! Fiscal calendar and store registry commands

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use ciclops_core::{FiscalCalendar, PipelineConfig};

pub fn cmd_period(calendar: &FiscalCalendar, date: Option<&str>) -> Result<()> {
    let date = match date {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}' (use YYYY-MM-DD)", d))?,
        None => Local::now().date_naive(),
    };

    let period = calendar.period_for(date)?;
    let (year, week) = calendar.week_of_year(date)?;

    println!("📅 {}", date);
    println!("   Fiscal year: {}", year);
    println!("   Week:        {}", week);
    println!(
        "   Period:      {} ({} to {}, {} days)",
        period.key(),
        period.start_date,
        period.end_date,
        period.days()
    );
    Ok(())
}

pub fn cmd_periods(calendar: &FiscalCalendar, year: i32) -> Result<()> {
    let periods = calendar.periods_in_year(year)?;

    println!(
        "Fiscal year {} (weeks start {:?})",
        year,
        calendar.anchor()
    );
    println!();
    println!("{:<9}  {:<10}  {:<10}  {:>4}", "PERIOD", "START", "END", "DAYS");
    println!("{}", "-".repeat(40));
    for p in periods {
        println!(
            "{:<9}  {:<10}  {:<10}  {:>4}",
            p.key(),
            p.start_date,
            p.end_date,
            p.days()
        );
    }
    Ok(())
}

pub fn cmd_stores(config: &PipelineConfig) -> Result<()> {
    if config.stores.is_empty() {
        println!("No stores configured. Documents will be filed under UNASSIGNED.");
        return Ok(());
    }

    println!("{:<22}  {:<24}  {}", "ID", "NAME", "ALIASES");
    println!("{}", "-".repeat(70));
    for store in &config.stores {
        println!(
            "{:<22}  {:<24}  {}",
            store.id,
            store.name,
            store.aliases.join(", ")
        );
    }
    Ok(())
}
