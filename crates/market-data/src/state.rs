//! Per-symbol baseline documents and live price maps

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::enrichment::enrich;
use crate::instruments::{instrument_keys, reference_closes};
use crate::types::{EnrichedView, LiveQuote, SymbolDocument};

/// Document plus the live values collected for it.
///
/// The price maps are never pruned; enrichment only reads ids the current
/// document references.
#[derive(Debug, Default)]
pub struct SymbolState {
    pub document: Option<SymbolDocument>,
    pub prices: HashMap<String, f64>,
    pub averages: HashMap<String, f64>,
}

/// One batched request covering every loaded symbol
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FetchPlan {
    /// Deduplicated, in configured symbol order
    pub keys: Vec<String>,
    /// Which symbols reference each key
    pub owners: HashMap<String, Vec<String>>,
}

#[derive(Debug)]
pub struct SymbolStore {
    order: Vec<String>,
    states: HashMap<String, SymbolState>,
}

impl SymbolStore {
    /// `symbols` fixes enumeration order, which is also batch priority.
    pub fn new(symbols: &[String]) -> Self {
        let states = symbols
            .iter()
            .map(|s| (s.clone(), SymbolState::default()))
            .collect();

        Self {
            order: symbols.to_vec(),
            states,
        }
    }

    /// Replace the document for `symbol` and seed missing prices from its
    /// reference closes. Live values already collected are kept.
    pub fn load(&mut self, symbol: &str, document: SymbolDocument) {
        if !self.states.contains_key(symbol) {
            self.order.push(symbol.to_string());
        }
        let state = self.states.entry(symbol.to_string()).or_default();

        let mut seeded = 0;
        for (key, close) in reference_closes(&document) {
            state.prices.entry(key).or_insert_with(|| {
                seeded += 1;
                close
            });
        }
        debug!(symbol, seeded, "Prices seeded from reference closes");

        state.document = Some(document);
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolState> {
        self.states.get(symbol)
    }

    /// Loaded symbols in configured order
    pub fn loaded_symbols(&self) -> Vec<String> {
        self.loaded().map(|(symbol, _)| symbol.to_string()).collect()
    }

    fn loaded(&self) -> impl Iterator<Item = (&str, &SymbolDocument)> {
        self.order.iter().filter_map(|symbol| {
            self.states
                .get(symbol)
                .and_then(|s| s.document.as_ref())
                .map(|doc| (symbol.as_str(), doc))
        })
    }

    pub fn fetch_plan(&self) -> FetchPlan {
        let mut plan = FetchPlan::default();
        let mut seen = HashSet::new();

        for (symbol, doc) in self.loaded() {
            for key in instrument_keys(doc) {
                let owners = plan.owners.entry(key.clone()).or_default();
                if !owners.iter().any(|o| o == symbol) {
                    owners.push(symbol.to_string());
                }
                if seen.insert(key.clone()) {
                    plan.keys.push(key);
                }
            }
        }

        plan
    }

    /// Distribute `quotes` to the symbols that own each key. Returns the
    /// number of values written. Quotes for unplanned ids are ignored.
    ///
    /// A quote replaces the previous one for its id, so a missing average
    /// clears the stored one.
    pub fn apply_quotes(&mut self, plan: &FetchPlan, quotes: &HashMap<String, LiveQuote>) -> usize {
        let mut written = 0;

        for (key, quote) in quotes {
            let Some(owners) = plan.owners.get(key) else {
                continue;
            };
            for symbol in owners {
                if let Some(state) = self.states.get_mut(symbol) {
                    state.prices.insert(key.clone(), quote.last_price);
                    match quote.average_price {
                        Some(average) => state.averages.insert(key.clone(), average),
                        None => state.averages.remove(key),
                    };
                    written += 1;
                }
            }
        }

        written
    }

    pub fn enriched(&self, symbol: &str) -> Option<EnrichedView> {
        let state = self.states.get(symbol)?;
        let doc = state.document.as_ref()?;
        Some(enrich(doc, &state.prices, &state.averages))
    }

    pub fn enriched_all(&self) -> BTreeMap<String, EnrichedView> {
        self.loaded()
            .filter_map(|(symbol, _)| self.enriched(symbol).map(|v| (symbol.to_string(), v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LevelName;
    use serde_json::json;

    fn nifty() -> SymbolDocument {
        serde_json::from_value(json!({
            "symbol": "NIFTY",
            "instrument_key": "IDX",
            "cash_data": { "CP": 24000.0 },
            "ce_summary": { "BASE": { "instrument_key": "X", "CP": 100.0 } },
            "pe_summary": { "BASE": { "instrument_key": "SHARED", "CP": 90.0 } }
        }))
        .unwrap()
    }

    fn banknifty() -> SymbolDocument {
        serde_json::from_value(json!({
            "symbol": "BANKNIFTY",
            "instrument_key": "BIDX",
            "cash_data": { "CP": 51000.0 },
            "ce_summary": { "MIN": { "instrument_key": "SHARED", "CP": 90.0 } }
        }))
        .unwrap()
    }

    fn quote(id: &str, ltp: f64, avg: Option<f64>) -> (String, LiveQuote) {
        (
            id.to_string(),
            LiveQuote {
                instrument_id: id.to_string(),
                last_price: ltp,
                average_price: avg,
            },
        )
    }

    fn store() -> SymbolStore {
        let mut store = SymbolStore::new(&["NIFTY".to_string(), "BANKNIFTY".to_string()]);
        store.load("NIFTY", nifty());
        store.load("BANKNIFTY", banknifty());
        store
    }

    fn call_base(store: &SymbolStore) -> (Option<f64>, Option<f64>) {
        let view = store.enriched("NIFTY").unwrap();
        let level = view.ce_summary.unwrap().base.unwrap();
        (level.ltp, level.average_price)
    }

    #[test]
    fn test_unloaded_symbols_are_skipped() {
        let mut store = SymbolStore::new(&["NIFTY".to_string(), "BANKNIFTY".to_string()]);
        store.load("BANKNIFTY", banknifty());

        assert_eq!(store.loaded_symbols(), vec!["BANKNIFTY"]);
        assert!(store.enriched("NIFTY").is_none());
        assert_eq!(store.enriched_all().len(), 1);
        assert_eq!(store.fetch_plan().keys, vec!["BIDX", "SHARED"]);
    }

    #[test]
    fn test_plan_dedupes_in_symbol_order() {
        let plan = store().fetch_plan();

        assert_eq!(plan.keys, vec!["IDX", "X", "SHARED", "BIDX"]);
        assert_eq!(plan.owners["SHARED"], vec!["NIFTY", "BANKNIFTY"]);
    }

    #[test]
    fn test_live_values_survive_an_empty_fetch() {
        let mut store = store();
        let plan = store.fetch_plan();

        assert_eq!(call_base(&store), (Some(100.0), None));

        let quotes = HashMap::from([quote("X", 105.0, Some(102.0))]);
        store.apply_quotes(&plan, &quotes);
        assert_eq!(call_base(&store), (Some(105.0), Some(102.0)));

        store.apply_quotes(&plan, &HashMap::new());
        assert_eq!(call_base(&store), (Some(105.0), Some(102.0)));
    }

    #[test]
    fn test_quote_without_average_clears_previous_average() {
        let mut store = store();
        let plan = store.fetch_plan();

        store.apply_quotes(&plan, &HashMap::from([quote("X", 105.0, Some(102.0))]));
        assert_eq!(call_base(&store), (Some(105.0), Some(102.0)));

        store.apply_quotes(&plan, &HashMap::from([quote("X", 106.0, None)]));
        assert_eq!(call_base(&store), (Some(106.0), None));
        assert!(!store.get("NIFTY").unwrap().averages.contains_key("X"));
    }

    #[test]
    fn test_shared_keys_reach_every_owner() {
        let mut store = store();
        let plan = store.fetch_plan();
        let quotes = HashMap::from([quote("SHARED", 95.0, None), quote("UNPLANNED", 1.0, None)]);

        assert_eq!(store.apply_quotes(&plan, &quotes), 2);
        assert_eq!(store.get("NIFTY").unwrap().prices["SHARED"], 95.0);
        assert_eq!(store.get("BANKNIFTY").unwrap().prices["SHARED"], 95.0);
        assert!(!store.get("NIFTY").unwrap().prices.contains_key("UNPLANNED"));
        assert!(store.get("NIFTY").unwrap().averages.is_empty());
    }

    #[test]
    fn test_reload_keeps_live_prices_and_replaces_document() {
        let mut store = store();
        let plan = store.fetch_plan();
        store.apply_quotes(&plan, &HashMap::from([quote("X", 105.0, None)]));

        let mut replacement = nifty();
        replacement.expiry_date = Some(json!("2025-01-30"));
        store.load("NIFTY", replacement);

        let view = store.enriched("NIFTY").unwrap();
        assert_eq!(view.expiry_date, Some(json!("2025-01-30")));
        assert_eq!(
            view.ce_summary.as_ref().unwrap().level(LevelName::Base).unwrap().ltp,
            Some(105.0)
        );
    }
}
