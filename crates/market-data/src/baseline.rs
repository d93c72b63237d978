//! Baseline document sources
//!
//! A source answers "document or nothing" for one symbol. The
//! [`BaselineLoader`] wraps a source with the bundled snapshot fallback,
//! which only the default symbol may use.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::FeedError;
use crate::types::SymbolDocument;
use crate::Result;

#[async_trait]
pub trait BaselineSource: Send + Sync {
    /// `Ok(None)` when the source has no document for `symbol`.
    async fn load_symbol(&self, symbol: &str) -> Result<Option<SymbolDocument>>;
}

/// Symbols become file names, so only a conservative character set is accepted.
pub(crate) fn is_safe_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub(crate) async fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Reads `<directory>/<SYMBOL>.json`
#[derive(Debug, Clone)]
pub struct JsonDirectorySource {
    directory: PathBuf,
}

impl JsonDirectorySource {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

#[async_trait]
impl BaselineSource for JsonDirectorySource {
    async fn load_symbol(&self, symbol: &str) -> Result<Option<SymbolDocument>> {
        if !is_safe_symbol(symbol) {
            return Ok(None);
        }
        read_json_file(&self.directory.join(format!("{symbol}.json"))).await
    }
}

/// In-memory source; documents can be swapped at runtime
#[derive(Default)]
pub struct StaticBaselineSource {
    documents: RwLock<HashMap<String, SymbolDocument>>,
}

impl StaticBaselineSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, symbol: &str, document: SymbolDocument) -> Self {
        self.insert(symbol, document);
        self
    }

    pub fn insert(&self, symbol: &str, document: SymbolDocument) {
        self.documents.write().insert(symbol.to_string(), document);
    }
}

#[async_trait]
impl BaselineSource for StaticBaselineSource {
    async fn load_symbol(&self, symbol: &str) -> Result<Option<SymbolDocument>> {
        Ok(self.documents.read().get(symbol).cloned())
    }
}

pub struct BaselineLoader {
    source: Arc<dyn BaselineSource>,
    fallback: Option<PathBuf>,
    default_symbol: String,
}

impl BaselineLoader {
    pub fn new(
        source: Arc<dyn BaselineSource>,
        fallback: Option<PathBuf>,
        default_symbol: impl Into<String>,
    ) -> Self {
        Self {
            source,
            fallback,
            default_symbol: default_symbol.into(),
        }
    }

    /// Load `symbol`, falling back to the bundled snapshot for the default
    /// symbol when the source has nothing or fails. Never errors.
    pub async fn load(&self, symbol: &str) -> Option<SymbolDocument> {
        let reason = match self.source.load_symbol(symbol).await {
            Ok(Some(doc)) => {
                info!(symbol, "Baseline document loaded");
                return Some(with_symbol(doc, symbol));
            }
            Ok(None) => "not found in source".to_string(),
            Err(e) => e.to_string(),
        };

        if symbol == self.default_symbol {
            if let Some(doc) = self.load_fallback(symbol).await {
                return Some(with_symbol(doc, symbol));
            }
        }

        let err = FeedError::BaselineUnavailable {
            symbol: symbol.to_string(),
            reason,
        };
        warn!(symbol, "{}", err);
        None
    }

    async fn load_fallback(&self, symbol: &str) -> Option<SymbolDocument> {
        let path = self.fallback.as_ref()?;
        match read_json_file::<SymbolDocument>(path).await {
            Ok(Some(doc)) => {
                info!(symbol, path = %path.display(), "Loaded bundled snapshot");
                Some(doc)
            }
            Ok(None) => {
                warn!(symbol, path = %path.display(), "Bundled snapshot missing");
                None
            }
            Err(e) => {
                warn!(symbol, path = %path.display(), error = %e, "Bundled snapshot unreadable");
                None
            }
        }
    }
}

fn with_symbol(mut doc: SymbolDocument, symbol: &str) -> SymbolDocument {
    if doc.symbol.is_empty() {
        doc.symbol = symbol.to_string();
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tokio_test::{assert_err, assert_ok};

    struct FailingSource;

    #[async_trait]
    impl BaselineSource for FailingSource {
        async fn load_symbol(&self, _symbol: &str) -> Result<Option<SymbolDocument>> {
            Err(FeedError::Io(std::io::Error::other("store offline")))
        }
    }

    fn snapshot() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            json!({ "instrument_key": "IDX", "cash_data": { "CP": 1.0 } })
        )
        .unwrap();
        file
    }

    #[tokio::test]
    async fn test_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("NIFTY.json"),
            json!({ "symbol": "NIFTY", "instrument_key": "IDX" }).to_string(),
        )
        .unwrap();
        std::fs::write(dir.path().join("BROKEN.json"), "{").unwrap();

        let source = JsonDirectorySource::new(dir.path());

        let doc = assert_ok!(source.load_symbol("NIFTY").await).unwrap();
        assert_eq!(doc.instrument_key.as_deref(), Some("IDX"));
        assert!(assert_ok!(source.load_symbol("BANKNIFTY").await).is_none());
        assert!(assert_ok!(source.load_symbol("../NIFTY").await).is_none());
        assert_err!(source.load_symbol("BROKEN").await);
    }

    #[tokio::test]
    async fn test_fallback_only_for_default_symbol() {
        let file = snapshot();
        let loader = BaselineLoader::new(
            Arc::new(StaticBaselineSource::new()),
            Some(file.path().to_path_buf()),
            "NIFTY",
        );

        let doc = loader.load("NIFTY").await.unwrap();
        assert_eq!(doc.symbol, "NIFTY");
        assert!(loader.load("BANKNIFTY").await.is_none());
    }

    #[tokio::test]
    async fn test_fallback_on_source_error() {
        let file = snapshot();
        let loader = BaselineLoader::new(
            Arc::new(FailingSource),
            Some(file.path().to_path_buf()),
            "NIFTY",
        );

        assert!(loader.load("NIFTY").await.is_some());
        assert!(loader.load("BANKNIFTY").await.is_none());
    }

    #[tokio::test]
    async fn test_source_wins_over_fallback() {
        let file = snapshot();
        let doc: SymbolDocument =
            serde_json::from_value(json!({ "symbol": "NIFTY", "instrument_key": "FROM_SOURCE" })).unwrap();
        let loader = BaselineLoader::new(
            Arc::new(StaticBaselineSource::new().with("NIFTY", doc)),
            Some(file.path().to_path_buf()),
            "NIFTY",
        );

        let loaded = loader.load("NIFTY").await.unwrap();
        assert_eq!(loaded.instrument_key.as_deref(), Some("FROM_SOURCE"));
    }

    #[tokio::test]
    async fn test_missing_fallback_file() {
        let loader = BaselineLoader::new(
            Arc::new(StaticBaselineSource::new()),
            Some(PathBuf::from("/nonexistent/data.json")),
            "NIFTY",
        );
        assert!(loader.load("NIFTY").await.is_none());
    }
}
