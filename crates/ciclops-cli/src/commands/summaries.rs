//! Summary command implementations

use anyhow::{Context, Result};
use ciclops_core::models::FinancialSummary;
use ciclops_core::taxonomy::{self, Branch};
use ciclops_core::Pipeline;
use rust_decimal::Decimal;

pub fn cmd_summary(pipeline: &Pipeline, store: &str, period: &str, json: bool) -> Result<()> {
    let period = pipeline
        .calendar()
        .parse_period(period)
        .with_context(|| format!("Invalid period '{}' (use e.g. 2025-P4)", period))?;

    let Some(summary) = pipeline.get_summary(store, &period)? else {
        println!("No summary for store {} in {}.", store, period);
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

pub fn cmd_summaries_list(pipeline: &Pipeline, store: Option<&str>, year: Option<i32>) -> Result<()> {
    let summaries = pipeline.db().list_summaries(store, year)?;
    if summaries.is_empty() {
        println!("No summaries found.");
        return Ok(());
    }

    println!(
        "{:<9}  {:<20}  {:>14}  {:>14}  {:>8}  {:>6}",
        "PERIOD", "STORE", "REVENUE", "NET PROFIT", "MARGIN", "ALERTS"
    );
    println!("{}", "-".repeat(80));
    for s in summaries {
        println!(
            "{:<9}  {:<20}  {:>14}  {:>14}  {:>7}%  {:>6}",
            s.period.key(),
            s.store_id,
            s.branch_total(Branch::Revenue).round_dp(2),
            s.metrics.net_profit.round_dp(2),
            (s.metrics.net_margin * Decimal::ONE_HUNDRED).round_dp(1),
            s.alerts.len()
        );
    }
    Ok(())
}

/// Print branch totals, non-zero leaves, metrics and alerts
pub fn print_summary(summary: &FinancialSummary) {
    println!(
        "🏪 {} · {}{}",
        summary.store_id,
        summary.period,
        if summary.period_inferred {
            " (period inferred)"
        } else {
            ""
        }
    );
    println!("   ─────────────────────────────");

    for branch in Branch::ALL.iter() {
        let total = summary.branch_total(*branch);
        println!("   {:<28} {:>14}", branch.as_str(), total.round_dp(2));
        for node in taxonomy::all_nodes()
            .into_iter()
            .filter(|n| n.starts_with(&format!("{}.", branch.as_str())))
        {
            let value = summary.total(node);
            if !value.is_zero() {
                let depth = node.matches('.').count();
                println!(
                    "   {}{:<width$} {:>14}",
                    "  ".repeat(depth),
                    node.rsplit('.').next().unwrap_or(node),
                    value.round_dp(2),
                    width = 28usize.saturating_sub(2 * depth)
                );
            }
        }
    }
    if !summary.uncategorized.is_zero() {
        println!("   {:<28} {:>14}", "uncategorized", summary.uncategorized.round_dp(2));
    }

    let m = &summary.metrics;
    println!();
    println!("   Gross profit: {}", m.gross_profit.round_dp(2));
    println!("   Net profit:   {}", m.net_profit.round_dp(2));

    if let Some(c) = &summary.comparison {
        let pct = |v: Option<Decimal>| {
            v.map(|v| format!("{}%", v.round_dp(1)))
                .unwrap_or_else(|| "n/a".to_string())
        };
        println!(
            "   vs {}: revenue {}, expenses {} ({:?})",
            c.prior_period,
            pct(c.revenue_variation_pct),
            pct(c.expense_variation_pct),
            c.trend
        );
    }

    if !summary.alerts.is_empty() {
        println!();
        for alert in &summary.alerts {
            println!("   ⚠️  [{}] {}", alert.alert_type, alert.message);
        }
    }
}
