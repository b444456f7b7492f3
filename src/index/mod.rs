//! # Redirect Index
//!
//! Persisted cache that maps catalog identifiers to previously resolved
//! playable resource ids.
//!
//! ## Components
//!
//! - [`IndexBackend`]: the persistence surface (point lookup, insert, update,
//!   delete, and the modification-lock count). Transactions and storage
//!   layout are the backend's business; every call is one atomic unit of work.
//! - [`store::RedirectIndexStore`]: operations scoped to redirect entries
//!   (`find_by_key`, `touch`, `insert_if_absent`, `remove`).
//! - [`guard::ModificationLockGuard`]: refuses writes while any
//!   [`ModificationLock`] record exists.
//!
//! ## Backends
//!
//! - [`memory::MemoryBackend`]: DashMap in process memory
//! - [`json::JsonBackend`]: single JSON document in the data directory
//!
//! ## Example
//!
//! ```rust,no_run
//! use open_music_redirect::index::{memory::MemoryBackend, IndexBackend, RedirectIndexEntry};
//! use open_music_redirect::placeholder::CatalogKind;
//!
//! # fn example() -> Result<(), open_music_redirect::error::StoreError> {
//! let backend = MemoryBackend::new();
//! backend.insert(RedirectIndexEntry::new("trk_1", "yt_A", CatalogKind::Track))?;
//! assert!(backend.find("trk_1")?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod guard;
pub mod json;
pub mod memory;
pub mod store;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::placeholder::CatalogKind;

pub use guard::ModificationLockGuard;
pub use store::RedirectIndexStore;

#[cfg(test)]
use mockall::automock;

/// Entrada persistida del índice de redirección.
///
/// Como máximo una por `catalog_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectIndexEntry {
    /// Identificador del item en el catálogo (clave única)
    pub catalog_id: String,
    /// Id del recurso reproducible resuelto
    pub resource_id: String,
    pub kind: CatalogKind,
    /// Último día en que la entrada sirvió un cache hit
    pub last_used: NaiveDate,
}

impl RedirectIndexEntry {
    /// Crea una entrada usada por última vez hoy
    pub fn new(
        catalog_id: impl Into<String>,
        resource_id: impl Into<String>,
        kind: CatalogKind,
    ) -> Self {
        Self {
            catalog_id: catalog_id.into(),
            resource_id: resource_id.into(),
            kind,
            last_used: today(),
        }
    }

    pub fn with_last_used(mut self, last_used: NaiveDate) -> Self {
        self.last_used = last_used;
        self
    }
}

/// Registro centinela de mantenimiento: mientras exista alguno no se escribe en el índice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationLock {
    pub id: u64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Superficie de persistencia que consume el motor
#[cfg_attr(test, automock)]
pub trait IndexBackend: Send + Sync {
    /// Busca la entrada de un identificador de catálogo
    fn find(&self, catalog_id: &str) -> Result<Option<RedirectIndexEntry>, StoreError>;

    /// Inserta una entrada nueva; falla con [`StoreError::Duplicate`] si la clave existe
    fn insert(&self, entry: RedirectIndexEntry) -> Result<(), StoreError>;

    /// Reemplaza una entrada existente; falla con [`StoreError::NotFound`] si no existe
    fn update(&self, entry: RedirectIndexEntry) -> Result<(), StoreError>;

    /// Elimina la entrada; devuelve si existía
    fn delete(&self, catalog_id: &str) -> Result<bool, StoreError>;

    /// Todas las entradas, para mantenimiento y estadísticas
    fn entries(&self) -> Result<Vec<RedirectIndexEntry>, StoreError>;

    fn count_modification_locks(&self) -> Result<u64, StoreError>;

    fn create_modification_lock(&self, reason: &str) -> Result<ModificationLock, StoreError>;

    /// Elimina un lock; devuelve si existía
    fn release_modification_lock(&self, id: u64) -> Result<bool, StoreError>;

    fn modification_locks(&self) -> Result<Vec<ModificationLock>, StoreError>;
}

/// Fecha local actual, la granularidad que usa `last_used`
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
