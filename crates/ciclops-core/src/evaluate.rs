//! Metrics and anomaly evaluation
//!
//! Turns mapped line items for one store and period into a `FinancialSummary`:
//! per-node totals rolled up the taxonomy, derived profit ratios, a comparison
//! against the prior period and the alerts raised by the anomaly rules.
//!
//! Amounts are `Decimal` throughout, so every non-leaf total is exactly the
//! sum of its children.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::fiscal::FiscalPeriod;
use crate::models::{
    Alert, AlertType, FinancialMetrics, FinancialSummary, MappedLineItem, PeriodComparison,
    Severity, Trend,
};
use crate::taxonomy::{self, Branch, Category, ExpenseLeaf, UNCATEGORIZED};

/// Revenue change (percent) beyond which the trend is growing or declining
const TREND_BAND_PCT: i64 = 5;

/// Percentage-over-baseline rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub enabled: bool,
    pub threshold_pct: Decimal,
}

/// Lower bound on a ratio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorRule {
    pub enabled: bool,
    pub floor: Decimal,
}

/// Upper bound on a ratio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CeilingRule {
    pub enabled: bool,
    pub ceiling: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingDataRule {
    pub enabled: bool,
    pub expected_branches: Vec<Branch>,
}

/// Anomaly rules. Each one can be disabled or re-parameterized on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Expense leaf rose more than `threshold_pct` over the prior period
    pub high_cost: ThresholdRule,
    /// Net margin below `floor`
    pub low_margin: FloorRule,
    /// Revenue fell more than `threshold_pct` from the prior period
    pub revenue_drop: ThresholdRule,
    /// Expected branch with no mapped items
    pub missing_data: MissingDataRule,
    /// Costs over `ceiling` of revenue
    pub cost_ratio: CeilingRule,
    /// Payroll over `ceiling` of revenue
    pub labor_ratio: CeilingRule,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            high_cost: ThresholdRule {
                enabled: true,
                threshold_pct: Decimal::new(30, 0),
            },
            low_margin: FloorRule {
                enabled: true,
                floor: Decimal::new(10, 2),
            },
            revenue_drop: ThresholdRule {
                enabled: true,
                threshold_pct: Decimal::new(15, 0),
            },
            missing_data: MissingDataRule {
                enabled: true,
                expected_branches: vec![Branch::Revenue, Branch::Costs, Branch::Expenses],
            },
            cost_ratio: CeilingRule {
                enabled: false,
                ceiling: Decimal::new(30, 2),
            },
            labor_ratio: CeilingRule {
                enabled: false,
                ceiling: Decimal::new(25, 2),
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsEvaluator {
    config: AnomalyConfig,
}

impl MetricsEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AnomalyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Build the summary for one store and period.
    ///
    /// Fails with `InvalidData` when the amounts overflow `Decimal`.
    pub fn evaluate(
        &self,
        store_id: &str,
        period: FiscalPeriod,
        items: &[MappedLineItem],
        prior: Option<&FinancialSummary>,
    ) -> Result<FinancialSummary> {
        let (totals, uncategorized, item_counts) = aggregate(items)?;
        let metrics = compute_metrics(&totals)?;
        let comparison = prior.map(|p| compare(&totals, p));

        let mut summary = FinancialSummary {
            store_id: store_id.to_string(),
            period,
            period_inferred: false,
            totals,
            uncategorized,
            item_counts,
            metrics,
            comparison,
            alerts: Vec::new(),
            document_id: None,
            generated_at: Utc::now(),
        };
        summary.alerts = self.alerts(&summary, prior);

        debug!(
            store = %store_id,
            period = %period.key(),
            items = items.len(),
            alerts = summary.alerts.len(),
            "Evaluated summary"
        );
        Ok(summary)
    }

    fn alerts(&self, summary: &FinancialSummary, prior: Option<&FinancialSummary>) -> Vec<Alert> {
        let cfg = &self.config;
        let revenue = summary.branch_total(Branch::Revenue);
        let mut alerts = Vec::new();

        if let Some(prior) = prior {
            if cfg.high_cost.enabled {
                for leaf in Category::leaves()
                    .iter()
                    .filter(|c| c.branch() == Some(Branch::Expenses))
                {
                    let before = prior.category_total(*leaf);
                    let now = summary.category_total(*leaf);
                    let Some(change) = pct_change(now, before) else {
                        continue;
                    };
                    if change > cfg.high_cost.threshold_pct {
                        alerts.push(Alert {
                            alert_type: AlertType::HighCost,
                            category_path: leaf.path().to_string(),
                            message: format!(
                                "{} rose {}% over the prior period ({} to {})",
                                leaf.leaf_name(),
                                change.round_dp(1),
                                before,
                                now
                            ),
                            severity: Severity::Warning,
                        });
                    }
                }
            }

            if cfg.revenue_drop.enabled {
                let before = prior.branch_total(Branch::Revenue);
                if let Some(change) = pct_change(revenue, before) {
                    if -change > cfg.revenue_drop.threshold_pct {
                        alerts.push(Alert {
                            alert_type: AlertType::RevenueDrop,
                            category_path: Branch::Revenue.as_str().to_string(),
                            message: format!(
                                "Revenue fell {}% from the prior period ({} to {})",
                                (-change).round_dp(1),
                                before,
                                revenue
                            ),
                            severity: Severity::Warning,
                        });
                    }
                }
            }
        }

        // Margins are undefined without revenue
        if cfg.low_margin.enabled
            && !revenue.is_zero()
            && summary.metrics.net_margin < cfg.low_margin.floor
        {
            alerts.push(Alert {
                alert_type: AlertType::LowMargin,
                category_path: "net_margin".to_string(),
                message: format!(
                    "Net margin {}% is below the {}% floor",
                    as_pct(summary.metrics.net_margin),
                    as_pct(cfg.low_margin.floor)
                ),
                severity: Severity::Warning,
            });
        }

        if cfg.cost_ratio.enabled
            && !revenue.is_zero()
            && summary.metrics.cost_ratio > cfg.cost_ratio.ceiling
        {
            alerts.push(Alert {
                alert_type: AlertType::HighCost,
                category_path: Branch::Costs.as_str().to_string(),
                message: format!(
                    "Costs are {}% of revenue, above the {}% ceiling",
                    as_pct(summary.metrics.cost_ratio),
                    as_pct(cfg.cost_ratio.ceiling)
                ),
                severity: Severity::Warning,
            });
        }

        if cfg.labor_ratio.enabled
            && !revenue.is_zero()
            && summary.metrics.labor_ratio > cfg.labor_ratio.ceiling
        {
            alerts.push(Alert {
                alert_type: AlertType::HighCost,
                category_path: Category::Expenses(ExpenseLeaf::Nomina).path().to_string(),
                message: format!(
                    "Payroll is {}% of revenue, above the {}% ceiling",
                    as_pct(summary.metrics.labor_ratio),
                    as_pct(cfg.labor_ratio.ceiling)
                ),
                severity: Severity::Warning,
            });
        }

        if cfg.missing_data.enabled {
            for branch in &cfg.missing_data.expected_branches {
                if summary.item_count(branch.as_str()) == 0 {
                    alerts.push(Alert {
                        alert_type: AlertType::MissingData,
                        category_path: branch.as_str().to_string(),
                        message: format!("No line items were mapped to {}", branch),
                        severity: Severity::Info,
                    });
                }
            }
        }

        alerts.sort_by(|a, b| {
            a.alert_type
                .cmp(&b.alert_type)
                .then_with(|| a.category_path.cmp(&b.category_path))
        });
        alerts.dedup();
        alerts
    }
}

/// Per-node totals (zero-filled), the uncategorized bucket and item counts
#[allow(clippy::type_complexity)]
fn aggregate(
    items: &[MappedLineItem],
) -> Result<(BTreeMap<String, Decimal>, Decimal, BTreeMap<String, usize>)> {
    let mut totals: BTreeMap<String, Decimal> = taxonomy::all_nodes()
        .into_iter()
        .map(|n| (n.to_string(), Decimal::ZERO))
        .collect();
    let mut counts: BTreeMap<String, usize> = Branch::ALL
        .iter()
        .map(|b| b.as_str())
        .chain(std::iter::once(UNCATEGORIZED))
        .map(|k| (k.to_string(), 0))
        .collect();
    let mut uncategorized = Decimal::ZERO;

    for item in items {
        let Some(branch) = item.category.branch() else {
            uncategorized = add(uncategorized, item.amount, UNCATEGORIZED)?;
            *counts.entry(UNCATEGORIZED.to_string()).or_default() += 1;
            continue;
        };
        let path = item.category.path();
        for node in std::iter::once(path).chain(item.category.ancestors()) {
            let total = totals.entry(node.to_string()).or_default();
            *total = add(*total, item.amount, node)?;
        }
        *counts.entry(branch.as_str().to_string()).or_default() += 1;
    }

    Ok((totals, uncategorized, counts))
}

fn add(total: Decimal, amount: Decimal, node: &str) -> Result<Decimal> {
    total
        .checked_add(amount)
        .ok_or_else(|| overflow(node))
}

fn overflow(what: &str) -> Error {
    Error::InvalidData(format!("Amounts for {} are out of range", what))
}

fn compute_metrics(totals: &BTreeMap<String, Decimal>) -> Result<FinancialMetrics> {
    let total = |path: &str| totals.get(path).copied().unwrap_or(Decimal::ZERO);
    let revenue = total(Branch::Revenue.as_str());
    let costs = total(Branch::Costs.as_str());
    let expenses = total(Branch::Expenses.as_str());
    let taxes = total(Branch::Taxes.as_str());
    let payroll = total(Category::Expenses(ExpenseLeaf::Nomina).path());

    let gross_profit = revenue
        .checked_sub(costs)
        .ok_or_else(|| overflow("gross_profit"))?;
    let net_profit = gross_profit
        .checked_sub(expenses)
        .and_then(|p| p.checked_sub(taxes))
        .ok_or_else(|| overflow("net_profit"))?;

    Ok(FinancialMetrics {
        gross_profit,
        gross_margin: ratio(gross_profit, revenue),
        net_profit,
        net_margin: ratio(net_profit, revenue),
        cost_ratio: ratio(costs, revenue),
        labor_ratio: ratio(payroll, revenue),
    })
}

fn compare(totals: &BTreeMap<String, Decimal>, prior: &FinancialSummary) -> PeriodComparison {
    let total = |path: &str| totals.get(path).copied().unwrap_or(Decimal::ZERO);
    let revenue_variation_pct = pct_change(
        total(Branch::Revenue.as_str()),
        prior.branch_total(Branch::Revenue),
    )
    .map(|p| p.round_dp(2));
    let expense_variation_pct = pct_change(
        total(Branch::Expenses.as_str()),
        prior.branch_total(Branch::Expenses),
    )
    .map(|p| p.round_dp(2));

    let band = Decimal::from(TREND_BAND_PCT);
    let trend = match revenue_variation_pct {
        Some(v) if v > band => Trend::Growing,
        Some(v) if v < -band => Trend::Declining,
        _ => Trend::Stable,
    };

    PeriodComparison {
        prior_period: prior.period,
        revenue_variation_pct,
        expense_variation_pct,
        trend,
    }
}

/// `numerator / denominator` to 4 places; zero when the denominator is zero
fn ratio(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        return Decimal::ZERO;
    }
    numerator
        .checked_div(denominator)
        .map(|r| r.round_dp(4))
        .unwrap_or(Decimal::ZERO)
}

/// Percent change from `before` to `now`; `None` unless `before` is positive
/// and the change fits in a `Decimal`
fn pct_change(now: Decimal, before: Decimal) -> Option<Decimal> {
    if before <= Decimal::ZERO {
        return None;
    }
    now.checked_sub(before)?
        .checked_div(before)?
        .checked_mul(Decimal::ONE_HUNDRED)
}

fn as_pct(ratio: Decimal) -> Decimal {
    ratio
        .checked_mul(Decimal::ONE_HUNDRED)
        .map_or(ratio, |p| p.round_dp(2).normalize())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use super::*;
    use crate::fiscal::FiscalCalendar;
    use crate::mapper::ConceptMapper;
    use crate::memory::CorrectionMemory;
    use crate::models::RawLineItem;
    use crate::taxonomy::{children, CostLeaf};

    fn period() -> FiscalPeriod {
        FiscalCalendar::default().period(2025, 3).unwrap()
    }

    fn mapped(labels: &[(&str, i64)]) -> Vec<MappedLineItem> {
        let raw: Vec<RawLineItem> = labels
            .iter()
            .enumerate()
            .map(|(i, (label, amount))| RawLineItem {
                label: label.to_string(),
                amount: Decimal::from(*amount),
                source_row: i + 1,
            })
            .collect();
        ConceptMapper::new(Arc::new(CorrectionMemory::new())).map_items(&raw)
    }

    fn scenario_items() -> Vec<MappedLineItem> {
        mapped(&[("NOMINAS", 45000), ("CFE", 8000), ("VENTAS MOSTRADOR", 230000)])
    }

    fn assert_branch_sums(summary: &FinancialSummary) {
        for node in taxonomy::all_nodes() {
            let kids = children(node);
            if kids.is_empty() {
                continue;
            }
            let sum: Decimal = kids.iter().map(|k| summary.total(k)).sum();
            assert_eq!(summary.total(node), sum, "node {}", node);
        }
    }

    #[test]
    fn test_scenario_first_statement() {
        let summary = MetricsEvaluator::new().evaluate("CENTRO", period(), &scenario_items(), None).unwrap();

        assert_eq!(summary.branch_total(Branch::Revenue), Decimal::from(230000));
        assert_eq!(summary.total("expenses.nomina"), Decimal::from(45000));
        assert_eq!(
            summary.total("expenses.servicios.electricidad"),
            Decimal::from(8000)
        );
        assert_eq!(summary.metrics.net_profit, Decimal::from(177000));
        assert_eq!(
            summary.metrics.net_margin,
            Decimal::from_str("0.7696").unwrap()
        );

        assert_eq!(summary.alerts.len(), 1);
        let alert = &summary.alerts[0];
        assert_eq!(alert.alert_type, AlertType::MissingData);
        assert_eq!(alert.category_path, "costs");
        assert_eq!(alert.severity, Severity::Info);
        assert!(summary.comparison.is_none());
        assert_branch_sums(&summary);
    }

    #[test]
    fn test_scenario_electricity_spike() {
        let evaluator = MetricsEvaluator::new();
        let prior_items = mapped(&[("NOMINAS", 45000), ("CFE", 5714), ("VENTAS MOSTRADOR", 230000)]);
        let prior = evaluator.evaluate("CENTRO", period(), &prior_items, None).unwrap();

        let summary = evaluator.evaluate("CENTRO", period(), &scenario_items(), Some(&prior)).unwrap();
        let high_cost: Vec<&Alert> = summary
            .alerts
            .iter()
            .filter(|a| a.alert_type == AlertType::HighCost)
            .collect();
        assert_eq!(high_cost.len(), 1);
        assert_eq!(high_cost[0].category_path, "expenses.servicios.electricidad");
        assert_eq!(high_cost[0].severity, Severity::Warning);

        let comparison = summary.comparison.unwrap();
        assert_eq!(comparison.revenue_variation_pct, Some(Decimal::ZERO));
        assert_eq!(comparison.trend, Trend::Stable);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let evaluator = MetricsEvaluator::new();
        let items = scenario_items();
        let prior = evaluator.evaluate("CENTRO", period(), &items[..2], None).unwrap();
        let a = evaluator.evaluate("CENTRO", period(), &items, Some(&prior)).unwrap();
        let b = evaluator.evaluate("CENTRO", period(), &items, Some(&prior)).unwrap();
        assert!(a.same_content(&b));
        assert_eq!(
            serde_json::to_value(&a.totals).unwrap(),
            serde_json::to_value(&b.totals).unwrap()
        );
    }

    #[test]
    fn test_branch_sums_with_groups() {
        let items = mapped(&[
            ("HARINA", 1200),
            ("QUESO MOZZARELLA", 3400),
            ("PEPPERONI", 900),
            ("AGUA", 300),
            ("GAS LP", 450),
            ("CFE", 1000),
            ("IVA", 700),
            ("CONCEPTO RARO", 55),
        ]);
        let summary = MetricsEvaluator::new().evaluate("CENTRO", period(), &items, None).unwrap();
        assert_eq!(summary.total("costs.insumos"), Decimal::from(5500));
        assert_eq!(summary.total("expenses.servicios"), Decimal::from(1750));
        assert_eq!(summary.uncategorized, Decimal::from(55));
        assert_eq!(summary.item_count(UNCATEGORIZED), 1);
        assert_branch_sums(&summary);
    }

    #[test]
    fn test_zero_revenue_has_zero_ratios() {
        let items = mapped(&[("NOMINAS", 45000)]);
        let summary = MetricsEvaluator::new().evaluate("CENTRO", period(), &items, None).unwrap();
        assert_eq!(summary.metrics.gross_margin, Decimal::ZERO);
        assert_eq!(summary.metrics.net_margin, Decimal::ZERO);
        assert_eq!(summary.metrics.net_profit, Decimal::from(-45000));
        assert!(summary
            .alerts
            .iter()
            .all(|a| a.alert_type == AlertType::MissingData));
    }

    #[test]
    fn test_overflowing_totals_are_an_error() {
        let mut items = mapped(&[("VENTAS", 1), ("VENTAS MOSTRADOR", 1)]);
        for item in &mut items {
            item.amount = Decimal::MAX;
        }
        let err = MetricsEvaluator::new()
            .evaluate("CENTRO", period(), &items, None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));

        // Each total fits, the profit does not
        let mut items = mapped(&[("VENTAS", 1), ("HARINA", 1)]);
        items[0].amount = Decimal::MAX;
        items[1].amount = Decimal::MIN;
        assert!(MetricsEvaluator::new()
            .evaluate("CENTRO", period(), &items, None)
            .is_err());
    }

    #[test]
    fn test_unrepresentable_change_is_skipped() {
        let tiny = Decimal::new(1, 28);
        assert_eq!(pct_change(Decimal::MAX, tiny), None);
        assert_eq!(pct_change(Decimal::from(150), Decimal::from(100)), Some(Decimal::from(50)));
        assert_eq!(as_pct(Decimal::MAX), Decimal::MAX);
    }

    #[test]
    fn test_low_margin_and_revenue_drop() {
        let evaluator = MetricsEvaluator::new();
        let prior = evaluator.evaluate("CENTRO", period(), &mapped(&[("VENTAS", 100000)]), None).unwrap();
        let items = mapped(&[("VENTAS", 80000), ("HARINA", 40000), ("NOMINAS", 35000)]);
        let summary = evaluator.evaluate("CENTRO", period(), &items, Some(&prior)).unwrap();

        let types: Vec<AlertType> = summary.alerts.iter().map(|a| a.alert_type).collect();
        assert!(types.contains(&AlertType::LowMargin));
        assert!(types.contains(&AlertType::RevenueDrop));
        assert_eq!(summary.comparison.unwrap().trend, Trend::Declining);
    }

    #[test]
    fn test_rules_can_be_disabled() {
        let mut config = AnomalyConfig::default();
        config.missing_data.enabled = false;
        config.high_cost.enabled = false;
        let evaluator = MetricsEvaluator::with_config(config);

        let prior_items = mapped(&[("CFE", 1000), ("VENTAS", 1000)]);
        let prior = evaluator.evaluate("CENTRO", period(), &prior_items, None).unwrap();
        let summary = evaluator.evaluate(
            "CENTRO",
            period(),
            &mapped(&[("CFE", 5000), ("VENTAS", 100000)]),
            Some(&prior),
        ).unwrap();
        assert!(summary.alerts.is_empty());
        assert_eq!(summary.comparison.unwrap().trend, Trend::Growing);
    }

    #[test]
    fn test_ratio_ceilings() {
        let mut config = AnomalyConfig::default();
        config.cost_ratio.enabled = true;
        config.labor_ratio.enabled = true;
        config.missing_data.enabled = false;
        let evaluator = MetricsEvaluator::with_config(config);

        let items = mapped(&[("VENTAS", 100000), ("HARINA", 35000), ("NOMINAS", 30000)]);
        let summary = evaluator.evaluate("CENTRO", period(), &items, None).unwrap();
        assert_eq!(
            summary.metrics.cost_ratio,
            Decimal::from_str("0.35").unwrap()
        );
        let paths: Vec<&str> = summary
            .alerts
            .iter()
            .filter(|a| a.alert_type == AlertType::HighCost)
            .map(|a| a.category_path.as_str())
            .collect();
        assert_eq!(paths, vec!["costs", "expenses.nomina"]);
    }

    #[test]
    fn test_new_expense_without_prior_baseline_is_not_high_cost() {
        let evaluator = MetricsEvaluator::new();
        let prior = evaluator.evaluate("CENTRO", period(), &mapped(&[("VENTAS", 1000)]), None).unwrap();
        let summary = evaluator.evaluate(
            "CENTRO",
            period(),
            &mapped(&[("VENTAS", 1000), ("RENTA", 18000)]),
            Some(&prior),
        ).unwrap();
        assert!(!summary
            .alerts
            .iter()
            .any(|a| a.alert_type == AlertType::HighCost));
    }

    #[test]
    fn test_cost_leaf_does_not_trigger_expense_rule() {
        let evaluator = MetricsEvaluator::new();
        let prior = evaluator.evaluate("CENTRO", period(), &mapped(&[("HARINA", 100)]), None).unwrap();
        let summary =
            evaluator.evaluate("CENTRO", period(), &mapped(&[("HARINA", 1000)]), Some(&prior)).unwrap();
        assert_eq!(
            summary.category_total(Category::Costs(CostLeaf::Harina)),
            Decimal::from(1000)
        );
        assert!(!summary
            .alerts
            .iter()
            .any(|a| a.alert_type == AlertType::HighCost));
    }
}
