//! Nearest-strike option pairs around a reference price

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::baseline::{is_safe_symbol, read_json_file};
use crate::error::FeedError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionSide {
    CE,
    PE,
}

/// One contract as stored in the option chain
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OptionContract {
    #[serde(rename = "strikePrice")]
    pub strike: f64,
    #[serde(rename = "optionType")]
    pub side: OptionSide,
    #[serde(rename = "openInterest", default)]
    pub open_interest: Option<f64>,
    #[serde(default)]
    pub ga: Option<f64>,
    #[serde(default)]
    pub va: Option<f64>,
    #[serde(rename = "closePrice", default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub maxa: Option<f64>,
    #[serde(default)]
    pub instrument_key: Option<String>,
    #[serde(default)]
    pub trading_symbol: Option<String>,
}

/// One side of a strike pair in the wire shape the dashboard reads
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairLeg {
    #[serde(rename = "PRICE")]
    pub strike: f64,
    #[serde(rename = "OI")]
    pub open_interest: f64,
    #[serde(rename = "GA")]
    pub ga: f64,
    #[serde(rename = "VA")]
    pub va: f64,
    #[serde(rename = "CP")]
    pub close: f64,
    #[serde(rename = "MAXA")]
    pub maxa: f64,
    pub instrument_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trading_symbol: Option<String>,
    #[serde(rename = "optionType")]
    pub side: OptionSide,
}

impl PairLeg {
    /// Zero-filled stand-in for a side the chain does not list
    pub fn placeholder(strike: f64, side: OptionSide) -> Self {
        Self {
            strike,
            open_interest: 0.0,
            ga: 0.0,
            va: 0.0,
            close: 0.0,
            maxa: 0.0,
            instrument_key: String::new(),
            trading_symbol: None,
            side,
        }
    }
}

impl From<&OptionContract> for PairLeg {
    fn from(contract: &OptionContract) -> Self {
        Self {
            strike: contract.strike,
            open_interest: contract.open_interest.unwrap_or(0.0),
            ga: contract.ga.unwrap_or(0.0),
            va: contract.va.unwrap_or(0.0),
            close: contract.close.unwrap_or(0.0),
            maxa: contract.maxa.unwrap_or(0.0),
            instrument_key: contract.instrument_key.clone().unwrap_or_default(),
            trading_symbol: contract.trading_symbol.clone(),
            side: contract.side,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrikePair {
    pub strike: f64,
    pub ce: PairLeg,
    pub pe: PairLeg,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraOptions {
    /// Nearest first, ascending
    pub above: Vec<StrikePair>,
    /// Nearest first, descending
    pub below: Vec<StrikePair>,
    pub current_price: f64,
}

fn nearest<'a, F>(
    contracts: &'a [OptionContract],
    side: OptionSide,
    keep: F,
    descending: bool,
    count: usize,
) -> Vec<&'a OptionContract>
where
    F: Fn(f64) -> bool,
{
    let mut picked: Vec<_> = contracts
        .iter()
        .filter(|c| c.side == side && c.strike.is_finite() && keep(c.strike))
        .collect();
    picked.sort_by(|a, b| {
        let ord = a.strike.total_cmp(&b.strike);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
    picked.truncate(count);
    picked
}

/// Join call and put legs by strike; a missing side becomes a placeholder.
fn pair_up(calls: &[&OptionContract], puts: &[&OptionContract], descending: bool) -> Vec<StrikePair> {
    // Keyed by bit pattern so equal strikes from both sides meet
    let mut by_strike: HashMap<u64, (f64, Option<PairLeg>, Option<PairLeg>)> = HashMap::new();

    for contract in calls {
        by_strike.entry(contract.strike.to_bits()).or_insert((contract.strike, None, None)).1 =
            Some(PairLeg::from(*contract));
    }
    for contract in puts {
        by_strike.entry(contract.strike.to_bits()).or_insert((contract.strike, None, None)).2 =
            Some(PairLeg::from(*contract));
    }

    let mut pairs: Vec<StrikePair> = by_strike
        .into_values()
        .map(|(strike, ce, pe)| StrikePair {
            strike,
            ce: ce.unwrap_or_else(|| PairLeg::placeholder(strike, OptionSide::CE)),
            pe: pe.unwrap_or_else(|| PairLeg::placeholder(strike, OptionSide::PE)),
        })
        .collect();

    pairs.sort_by(|a, b| {
        let ord = a.strike.total_cmp(&b.strike);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
    pairs
}

/// Up to `count` strikes strictly above and strictly below `price`, per side.
///
/// A strike equal to `price` is in neither list. When the two sides list
/// different strikes a list can hold more than `count` pairs.
pub fn nearest_pairs(contracts: &[OptionContract], price: f64, count: usize) -> ExtraOptions {
    let ce_above = nearest(contracts, OptionSide::CE, |s| s > price, false, count);
    let pe_above = nearest(contracts, OptionSide::PE, |s| s > price, false, count);
    let ce_below = nearest(contracts, OptionSide::CE, |s| s < price, true, count);
    let pe_below = nearest(contracts, OptionSide::PE, |s| s < price, true, count);

    ExtraOptions {
        above: pair_up(&ce_above, &pe_above, false),
        below: pair_up(&ce_below, &pe_below, true),
        current_price: price,
    }
}

#[async_trait]
pub trait OptionChainSource: Send + Sync {
    /// Every listed contract for `symbol`; empty when the symbol has no chain.
    async fn contracts(&self, symbol: &str) -> Result<Vec<OptionContract>>;
}

/// Reads `<directory>/<SYMBOL>.json`, a JSON array of contracts
#[derive(Debug, Clone)]
pub struct JsonChainDirectory {
    directory: PathBuf,
}

impl JsonChainDirectory {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

#[async_trait]
impl OptionChainSource for JsonChainDirectory {
    async fn contracts(&self, symbol: &str) -> Result<Vec<OptionContract>> {
        if !is_safe_symbol(symbol) {
            return Ok(Vec::new());
        }
        let path = self.directory.join(format!("{symbol}.json"));
        read_json_file::<Vec<OptionContract>>(&path)
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| FeedError::OptionChainUnavailable {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            })
    }
}

#[derive(Default)]
pub struct StaticChainSource {
    chains: RwLock<BTreeMap<String, Vec<OptionContract>>>,
}

impl StaticChainSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, symbol: &str, contracts: Vec<OptionContract>) -> Self {
        self.chains.write().insert(symbol.to_string(), contracts);
        self
    }
}

#[async_trait]
impl OptionChainSource for StaticChainSource {
    async fn contracts(&self, symbol: &str) -> Result<Vec<OptionContract>> {
        Ok(self.chains.read().get(symbol).cloned().unwrap_or_default())
    }
}
