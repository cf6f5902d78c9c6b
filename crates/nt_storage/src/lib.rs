use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use nt_core::{ArticleStorage, Error, Result};

pub mod analysis;
pub mod backends;
pub mod export;

pub use analysis::{CoverageAnalyzer, CoverageReport, QualityReport};
pub use backends::*;
pub use export::{export_json, range_export_filename, read_export, DEFAULT_EXPORT_FILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    #[default]
    Sqlite,
    Memory,
}

impl FromStr for StorageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(Error::Config(format!("unknown storage backend: {}", other))),
        }
    }
}

/// Open the configured backend. `db_path` is ignored for the memory store.
pub async fn create_storage(kind: StorageKind, db_path: &Path) -> Result<Arc<dyn ArticleStorage>> {
    match kind {
        #[cfg(feature = "sqlite")]
        StorageKind::Sqlite => Ok(Arc::new(SQLiteStorage::new_with_path(db_path).await?)),
        #[cfg(not(feature = "sqlite"))]
        StorageKind::Sqlite => Err(Error::Config(format!(
            "sqlite support not compiled in, cannot open {}",
            db_path.display()
        ))),
        StorageKind::Memory => Ok(Arc::new(InMemoryStorage::new())),
    }
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, CoverageAnalyzer, StorageKind};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_kind_parsing() {
        assert_eq!("SQLite".parse::<StorageKind>().unwrap(), StorageKind::Sqlite);
        assert_eq!("memory".parse::<StorageKind>().unwrap(), StorageKind::Memory);
        assert!(matches!("qdrant".parse::<StorageKind>(), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_create_memory_storage() {
        let storage = create_storage(StorageKind::Memory, Path::new("unused.db"))
            .await
            .unwrap();
        assert_eq!(storage.count().await.unwrap(), 0);
    }
}
