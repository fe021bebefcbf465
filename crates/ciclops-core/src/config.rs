//! Pipeline configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/ciclops/config/pipeline.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Every key is optional; anything missing keeps its built-in default.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Weekday;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::classify::ClassifierConfig;
use crate::error::{Error, Result};
use crate::evaluate::AnomalyConfig;
use crate::fiscal::FiscalCalendar;
use crate::mapper::MapperConfig;
use crate::models::Store;
use crate::stores::{FuzzyConfig, StoreRegistry};
use crate::taxonomy::Branch;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/pipeline.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub calendar: FiscalCalendar,
    pub mapper: MapperConfig,
    pub classifier: ClassifierConfig,
    /// Fuzzy store-name matching limits
    pub store_matching: FuzzyConfig,
    pub anomalies: AnomalyConfig,
    pub stores: Vec<Store>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            calendar: FiscalCalendar::default(),
            mapper: MapperConfig::default(),
            classifier: ClassifierConfig::default(),
            store_matching: FuzzyConfig::default(),
            anomalies: AnomalyConfig::default(),
            stores: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Override file if present, else the embedded defaults
    pub fn load() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Self::embedded(),
        }
    }

    pub fn embedded() -> Result<Self> {
        parse_config(DEFAULT_CONFIG)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loading pipeline config");
        parse_config(&content)
    }

    pub fn store_registry(&self) -> StoreRegistry {
        StoreRegistry::with_fuzzy(self.stores.clone(), self.store_matching)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("ciclops").join("config").join("pipeline.toml"))
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    fiscal: Option<RawFiscal>,
    mapper: Option<RawMapper>,
    classifier: Option<RawClassifier>,
    anomalies: Option<RawAnomalies>,
    stores: Option<Vec<Store>>,
}

#[derive(Debug, Deserialize)]
struct RawFiscal {
    anchor: Option<String>,
    min_year: Option<i32>,
    max_year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct RawMapper {
    taxonomy_confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawClassifier {
    type_weight: Option<f64>,
    period_weight: Option<f64>,
    store_weight: Option<f64>,
    ai_timeout_secs: Option<u64>,
    store_max_distance: Option<usize>,
    store_short_max_distance: Option<usize>,
    store_short_first_char: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawAnomalies {
    high_cost: Option<RawRule>,
    low_margin: Option<RawRule>,
    revenue_drop: Option<RawRule>,
    missing_data: Option<RawRule>,
    cost_ratio: Option<RawRule>,
    labor_ratio: Option<RawRule>,
}

/// Any anomaly rule; each rule reads the fields it understands
#[derive(Debug, Deserialize)]
struct RawRule {
    enabled: Option<bool>,
    threshold_pct: Option<Decimal>,
    floor: Option<Decimal>,
    ceiling: Option<Decimal>,
    expected_branches: Option<Vec<String>>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<PipelineConfig> {
    let raw: RawConfig = toml::from_str(content)?;
    let mut config = PipelineConfig::default();

    if let Some(fiscal) = raw.fiscal {
        let (min_default, max_default) = config.calendar.supported_years();
        let anchor = match fiscal.anchor {
            Some(name) => name
                .parse::<Weekday>()
                .map_err(|_| Error::Config(format!("Invalid fiscal anchor weekday: {}", name)))?,
            None => config.calendar.anchor(),
        };
        let min_year = fiscal.min_year.unwrap_or(min_default);
        let max_year = fiscal.max_year.unwrap_or(max_default);
        if min_year > max_year {
            return Err(Error::Config(format!(
                "fiscal.min_year {} is after max_year {}",
                min_year, max_year
            )));
        }
        config.calendar = FiscalCalendar::new(anchor, min_year, max_year);
    }

    if let Some(mapper) = raw.mapper {
        if let Some(c) = mapper.taxonomy_confidence {
            check_unit("mapper.taxonomy_confidence", c)?;
            config.mapper.taxonomy_confidence = c;
        }
    }

    if let Some(classifier) = raw.classifier {
        let c = &mut config.classifier;
        if let Some(w) = classifier.type_weight {
            c.type_weight = w;
        }
        if let Some(w) = classifier.period_weight {
            c.period_weight = w;
        }
        if let Some(w) = classifier.store_weight {
            c.store_weight = w;
        }
        if let Some(t) = classifier.ai_timeout_secs {
            c.ai_timeout_secs = t;
        }
        for (name, w) in [
            ("type_weight", c.type_weight),
            ("period_weight", c.period_weight),
            ("store_weight", c.store_weight),
        ] {
            if w < 0.0 {
                return Err(Error::Config(format!("classifier.{} must not be negative", name)));
            }
        }
        let m = &mut config.store_matching;
        if let Some(d) = classifier.store_max_distance {
            m.max_distance = d;
        }
        if let Some(d) = classifier.store_short_max_distance {
            m.short_max_distance = d;
        }
        if let Some(gate) = classifier.store_short_first_char {
            m.short_first_char = gate;
        }
    }

    if let Some(anomalies) = raw.anomalies {
        let a = &mut config.anomalies;
        if let Some(rule) = anomalies.high_cost {
            a.high_cost.enabled = rule.enabled.unwrap_or(a.high_cost.enabled);
            a.high_cost.threshold_pct = rule.threshold_pct.unwrap_or(a.high_cost.threshold_pct);
        }
        if let Some(rule) = anomalies.low_margin {
            a.low_margin.enabled = rule.enabled.unwrap_or(a.low_margin.enabled);
            a.low_margin.floor = rule.floor.unwrap_or(a.low_margin.floor);
        }
        if let Some(rule) = anomalies.revenue_drop {
            a.revenue_drop.enabled = rule.enabled.unwrap_or(a.revenue_drop.enabled);
            a.revenue_drop.threshold_pct =
                rule.threshold_pct.unwrap_or(a.revenue_drop.threshold_pct);
        }
        if let Some(rule) = anomalies.missing_data {
            a.missing_data.enabled = rule.enabled.unwrap_or(a.missing_data.enabled);
            if let Some(branches) = rule.expected_branches {
                a.missing_data.expected_branches = branches
                    .iter()
                    .map(|b| b.parse::<Branch>())
                    .collect::<Result<Vec<_>>>()
                    .map_err(|e| Error::Config(e.to_string()))?;
            }
        }
        if let Some(rule) = anomalies.cost_ratio {
            a.cost_ratio.enabled = rule.enabled.unwrap_or(a.cost_ratio.enabled);
            a.cost_ratio.ceiling = rule.ceiling.unwrap_or(a.cost_ratio.ceiling);
        }
        if let Some(rule) = anomalies.labor_ratio {
            a.labor_ratio.enabled = rule.enabled.unwrap_or(a.labor_ratio.enabled);
            a.labor_ratio.ceiling = rule.ceiling.unwrap_or(a.labor_ratio.ceiling);
        }
    }

    if let Some(stores) = raw.stores {
        let mut seen = std::collections::HashSet::new();
        for store in &stores {
            if store.id.trim().is_empty() {
                return Err(Error::Config("Store id must not be empty".into()));
            }
            if !seen.insert(store.id.as_str()) {
                return Err(Error::Config(format!("Duplicate store id: {}", store.id)));
            }
        }
        config.stores = stores;
    }

    Ok(config)
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::Config(format!(
            "{} must be between 0 and 1, got {}",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_config_parses() {
        let config = PipelineConfig::embedded().unwrap();
        assert_eq!(config.calendar, FiscalCalendar::default());
        assert_eq!(config.anomalies, AnomalyConfig::default());
        assert_eq!(config.classifier, ClassifierConfig::default());
        assert_eq!(config.stores.len(), 4);
        assert!(config.store_registry().contains("5_FEBRERO"));
        assert_eq!(config.store_matching, FuzzyConfig::default());
    }

    #[test]
    fn test_store_matching_override() {
        let config = parse_config(
            r#"
            [classifier]
            store_short_max_distance = 2
            store_short_first_char = false
            "#,
        )
        .unwrap();
        assert_eq!(
            config.store_matching,
            FuzzyConfig {
                max_distance: 2,
                short_max_distance: 2,
                short_first_char: false,
            }
        );
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = parse_config(
            r#"
            [fiscal]
            anchor = "monday"

            [anomalies.high_cost]
            threshold_pct = 50

            [anomalies.cost_ratio]
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(config.calendar.anchor(), Weekday::Mon);
        assert_eq!(config.calendar.supported_years(), (2000, 2099));
        assert_eq!(config.anomalies.high_cost.threshold_pct, Decimal::from(50));
        assert!(config.anomalies.high_cost.enabled);
        assert!(config.anomalies.cost_ratio.enabled);
        assert_eq!(config.anomalies.cost_ratio.ceiling, Decimal::new(30, 2));
        assert!(config.stores.is_empty());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(parse_config("[fiscal]\nanchor = \"someday\"").is_err());
        assert!(parse_config("[mapper]\ntaxonomy_confidence = 1.5").is_err());
        assert!(parse_config("[fiscal]\nmin_year = 2050\nmax_year = 2040").is_err());
        assert!(parse_config(
            "[anomalies.missing_data]\nexpected_branches = [\"revenue\", \"assets\"]"
        )
        .is_err());
        assert!(parse_config(
            "[[stores]]\nid = \"A\"\nname = \"a\"\n[[stores]]\nid = \"A\"\nname = \"b\""
        )
        .is_err());
        assert!(matches!(parse_config("not = [valid"), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "[[stores]]\nid = \"CENTRO\"\nname = \"Centro\"\n").unwrap();
        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.stores[0].id, "CENTRO");
        assert!(PipelineConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
