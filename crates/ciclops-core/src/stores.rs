//! Store registry and store-name matching
//!
//! Documents name stores inconsistently ("5 de Febrero", "5 FEBRERO",
//! "´5 FEB"). Matching runs on normalized phrases:
//!
//! - exact: a store name, alias, or id appears as whole tokens
//! - fuzzy: a window of the same number of tokens is within a small edit
//!   distance of the name (names of five characters or more, see
//!   [`FuzzyConfig`]). Transpositions count as one edit and numeric tokens
//!   must match exactly, so "15 Febrero" is not "5 Febrero".
//! - learned: a store-alias correction appears as whole tokens

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::memory::{CorrectionMemory, MemoryKey};
use crate::models::Store;
use crate::normalize;

/// Store id used when a document names no known store
pub const UNASSIGNED_STORE: &str = "UNASSIGNED";

/// Names shorter than this are only matched exactly
const MIN_FUZZY_CHARS: usize = 5;

/// Names this long or longer use `FuzzyConfig::max_distance`
const LONG_NAME_CHARS: usize = 8;

/// Fuzzy store-name matching limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzyConfig {
    /// Edits allowed for names of eight characters or more
    pub max_distance: usize,
    /// Edits allowed for names of five to seven characters
    pub short_max_distance: usize,
    /// Short names must keep their first character ("dentro" is not "centro")
    pub short_first_char: bool,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            max_distance: 2,
            short_max_distance: 1,
            short_first_char: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Fuzzy,
    Learned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreMatch {
    pub store_id: String,
    /// Normalized phrase that matched
    pub matched: String,
    pub kind: MatchKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_key: Option<MemoryKey>,
}

struct AliasEntry {
    phrase: String,
    token_count: usize,
    store_id: String,
}

#[derive(Default)]
pub struct StoreRegistry {
    stores: Vec<Store>,
    aliases: Vec<AliasEntry>,
    fuzzy: FuzzyConfig,
}

impl StoreRegistry {
    pub fn new(stores: Vec<Store>) -> Self {
        Self::with_fuzzy(stores, FuzzyConfig::default())
    }

    pub fn with_fuzzy(stores: Vec<Store>, fuzzy: FuzzyConfig) -> Self {
        let mut aliases = Vec::new();
        for store in &stores {
            let names = std::iter::once(&store.id)
                .chain(std::iter::once(&store.name))
                .chain(store.aliases.iter());
            let mut seen = BTreeSet::new();
            for name in names {
                let phrase = normalize::phrase(name);
                if phrase.is_empty() || !seen.insert(phrase.clone()) {
                    continue;
                }
                aliases.push(AliasEntry {
                    token_count: phrase.split(' ').count(),
                    phrase,
                    store_id: store.id.clone(),
                });
            }
        }
        // Longer names first so "plaza americas norte" beats "plaza americas"
        aliases.sort_by(|a, b| b.phrase.len().cmp(&a.phrase.len()));

        Self {
            stores,
            aliases,
            fuzzy,
        }
    }

    pub fn stores(&self) -> &[Store] {
        &self.stores
    }

    pub fn get(&self, id: &str) -> Option<&Store> {
        self.stores.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Resolve a store id or name to a registered id
    pub fn resolve(&self, name: &str) -> Option<String> {
        if let Some(store) = self.get(name) {
            return Some(store.id.clone());
        }
        let phrase = normalize::phrase(name);
        self.aliases
            .iter()
            .find(|a| a.phrase == phrase)
            .map(|a| a.store_id.clone())
    }

    /// Every store named in `text`, registry matches first, then learned aliases
    pub fn find_in_text(&self, text: &str, memory: Option<&CorrectionMemory>) -> Vec<StoreMatch> {
        let haystack = normalize::phrase(text);
        let mut matches = Vec::new();
        if haystack.is_empty() {
            return matches;
        }

        for alias in &self.aliases {
            if normalize::contains_phrase(&haystack, &alias.phrase) {
                matches.push(StoreMatch {
                    store_id: alias.store_id.clone(),
                    matched: alias.phrase.clone(),
                    kind: MatchKind::Exact,
                    memory_key: None,
                });
            } else if alias.phrase.chars().count() >= MIN_FUZZY_CHARS {
                if let Some(window) = self.fuzzy_window(&haystack, alias) {
                    matches.push(StoreMatch {
                        store_id: alias.store_id.clone(),
                        matched: window,
                        kind: MatchKind::Fuzzy,
                        memory_key: None,
                    });
                }
            }
        }

        if let Some(memory) = memory {
            for (phrase, store_id, key) in memory.store_aliases() {
                if normalize::contains_phrase(&haystack, &phrase) {
                    matches.push(StoreMatch {
                        store_id,
                        matched: phrase,
                        kind: MatchKind::Learned,
                        memory_key: Some(key),
                    });
                }
            }
        }

        if !matches.is_empty() {
            debug!(
                stores = ?matches.iter().map(|m| m.store_id.as_str()).collect::<Vec<_>>(),
                "Matched stores in text"
            );
        }
        matches
    }

    /// First store named by a single label, if any
    pub fn match_label(&self, label: &str, memory: Option<&CorrectionMemory>) -> Option<StoreMatch> {
        self.find_in_text(label, memory).into_iter().next()
    }

    /// Window of tokens within edit distance of `alias`
    fn fuzzy_window(&self, haystack: &str, alias: &AliasEntry) -> Option<String> {
        let tokens: Vec<&str> = haystack.split(' ').collect();
        if tokens.len() < alias.token_count {
            return None;
        }
        let short = alias.phrase.chars().count() < LONG_NAME_CHARS;
        let allowed = if short {
            self.fuzzy.short_max_distance
        } else {
            self.fuzzy.max_distance
        };
        let alias_tokens: Vec<&str> = alias.phrase.split(' ').collect();
        let first = alias.phrase.chars().next();
        tokens
            .windows(alias.token_count)
            .filter(|w| numbers_agree(w, &alias_tokens))
            .map(|w| w.join(" "))
            .filter(|window| {
                !(short && self.fuzzy.short_first_char) || window.chars().next() == first
            })
            .find(|window| strsim::osa_distance(window, &alias.phrase) <= allowed)
    }
}

/// Tokens holding digits must be identical in window and name
fn numbers_agree(window: &[&str], name: &[&str]) -> bool {
    window.iter().zip(name).all(|(w, n)| {
        let numeric = |t: &str| t.chars().any(|c| c.is_ascii_digit());
        if numeric(*w) || numeric(*n) {
            w == n
        } else {
            true
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StoreRegistry {
        StoreRegistry::new(vec![
            Store {
                id: "5_FEBRERO".into(),
                name: "5 de Febrero".into(),
                aliases: vec![],
            },
            Store {
                id: "CENTRO".into(),
                name: "Centro".into(),
                aliases: vec!["Sucursal Centro".into()],
            },
            Store {
                id: "PLAZA_LAS_AMERICAS".into(),
                name: "Plaza Las Américas".into(),
                aliases: vec![],
            },
        ])
    }

    fn ids(matches: &[StoreMatch]) -> BTreeSet<String> {
        matches.iter().map(|m| m.store_id.clone()).collect()
    }

    #[test]
    fn test_exact_match_is_accent_and_case_insensitive() {
        let reg = registry();
        let found = reg.find_in_text("ESTADO DE RESULTADOS PLAZA LAS AMERICAS P11", None);
        assert_eq!(ids(&found), BTreeSet::from(["PLAZA_LAS_AMERICAS".to_string()]));
        assert_eq!(found[0].kind, MatchKind::Exact);
    }

    #[test]
    fn test_fuzzy_match_tolerates_typos() {
        let reg = registry();
        let found = reg.find_in_text("Sucursal 5 Febreo", None);
        assert_eq!(ids(&found), BTreeSet::from(["5_FEBRERO".to_string()]));
        assert_eq!(found[0].kind, MatchKind::Fuzzy);
    }

    #[test]
    fn test_fuzzy_match_tolerates_common_typos() {
        let reg = StoreRegistry::new(vec![
            Store {
                id: "CENTRO".into(),
                name: "Centro".into(),
                aliases: vec![],
            },
            Store {
                id: "UNIVERSIDAD".into(),
                name: "Universidad".into(),
                aliases: vec![],
            },
        ]);
        for text in ["Sucursal Cnetro", "Sucursal Centor", "Sucursal Cemtro"] {
            assert_eq!(
                ids(&reg.find_in_text(text, None)),
                BTreeSet::from(["CENTRO".to_string()]),
                "text {text}"
            );
        }
        // Long names take two edits, first character included
        for text in ["Jniversidad", "Unibersidaf", "Univresidad norte"] {
            assert_eq!(
                ids(&reg.find_in_text(text, None)),
                BTreeSet::from(["UNIVERSIDAD".to_string()]),
                "text {text}"
            );
        }
        assert!(reg.find_in_text("Gastos dentro del periodo", None).is_empty());
        assert!(reg.find_in_text("Unxxersixad", None).is_empty());
    }

    #[test]
    fn test_short_name_first_character_gate_is_configurable() {
        let stores = vec![Store {
            id: "CENTRO".into(),
            name: "Centro".into(),
            aliases: vec![],
        }];
        let strict = StoreRegistry::new(stores.clone());
        assert!(strict.find_in_text("Sucursal Xentro", None).is_empty());

        let loose = StoreRegistry::with_fuzzy(
            stores,
            FuzzyConfig {
                short_first_char: false,
                ..FuzzyConfig::default()
            },
        );
        let found = loose.find_in_text("Sucursal Xentro", None);
        assert_eq!(ids(&found), BTreeSet::from(["CENTRO".to_string()]));
        assert_eq!(found[0].kind, MatchKind::Fuzzy);
    }

    #[test]
    fn test_fuzzy_match_keeps_numbers_exact() {
        let reg = registry();
        assert!(reg.find_in_text("Corte al 15 Febrero", None).is_empty());
        assert!(reg.find_in_text("Corte al 6 Febrero", None).is_empty());
        assert_eq!(
            ids(&reg.find_in_text("Sucursal 5 Febrreo", None)),
            BTreeSet::from(["5_FEBRERO".to_string()])
        );
    }

    #[test]
    fn test_abbreviation_needs_learned_alias() {
        let reg = registry();
        assert!(reg.find_in_text("´5 FEB", None).is_empty());

        let memory = CorrectionMemory::new();
        memory.record_store_alias("5 FEB", "5_FEBRERO", 1.0).unwrap();
        let found = reg.find_in_text("Reporte ´5 FEB enero", Some(&memory));
        assert_eq!(ids(&found), BTreeSet::from(["5_FEBRERO".to_string()]));
        assert_eq!(found[0].kind, MatchKind::Learned);
        assert!(found[0].memory_key.is_some());
    }

    #[test]
    fn test_multiple_stores() {
        let reg = registry();
        let found = reg.find_in_text("Consolidado: Centro y 5 de Febrero", None);
        assert_eq!(
            ids(&found),
            BTreeSet::from(["5_FEBRERO".to_string(), "CENTRO".to_string()])
        );
    }

    #[test]
    fn test_resolve() {
        let reg = registry();
        assert_eq!(reg.resolve("CENTRO"), Some("CENTRO".into()));
        assert_eq!(reg.resolve("plaza las americas"), Some("PLAZA_LAS_AMERICAS".into()));
        assert_eq!(reg.resolve("norte"), None);
    }

    #[test]
    fn test_no_false_positive_on_unrelated_text() {
        let reg = registry();
        assert!(reg.find_in_text("Ventas mostrador 230000", None).is_empty());
        // "enero" is two edits from "centro"
        assert!(reg.find_in_text("Corte de enero", None).is_empty());
        assert!(reg.find_in_text("", None).is_empty());
    }
}
