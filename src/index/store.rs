use std::sync::Arc;
use tracing::debug;

use super::{today, IndexBackend, RedirectIndexEntry};
use crate::error::StoreError;

/// Operaciones de persistencia del índice de redirección.
///
/// No toma locks propios: quien llama aporta el mutex de la clave.
#[derive(Clone)]
pub struct RedirectIndexStore {
    backend: Arc<dyn IndexBackend>,
}

impl RedirectIndexStore {
    pub fn new(backend: Arc<dyn IndexBackend>) -> Self {
        Self { backend }
    }

    pub fn find_by_key(&self, catalog_id: &str) -> Result<Option<RedirectIndexEntry>, StoreError> {
        self.backend.find(catalog_id)
    }

    /// Marca la entrada como usada hoy.
    ///
    /// `last_used` nunca retrocede. Si la entrada ya no existe (la borró una
    /// tarea anterior) no se recrea.
    pub fn touch(&self, entry: &RedirectIndexEntry) -> Result<(), StoreError> {
        let Some(mut current) = self.backend.find(&entry.catalog_id)? else {
            debug!("Entrada {} eliminada antes del touch, se omite", entry.catalog_id);
            return Ok(());
        };

        let last_used = current.last_used.max(entry.last_used).max(today());
        if last_used == current.last_used {
            return Ok(());
        }

        current.last_used = last_used;
        self.backend.update(current)
    }

    /// Inserta la entrada solo si sigue sin existir; devuelve si se insertó
    pub fn insert_if_absent(&self, entry: RedirectIndexEntry) -> Result<bool, StoreError> {
        // Otra resolución de la misma clave pudo escribir entre el miss y esta tarea
        if self.backend.find(&entry.catalog_id)?.is_some() {
            debug!("Entrada {} ya creada por otra resolución", entry.catalog_id);
            return Ok(false);
        }

        match self.backend.insert(entry) {
            Ok(()) => Ok(true),
            Err(StoreError::Duplicate(catalog_id)) => {
                debug!("Entrada {} insertada concurrentemente", catalog_id);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Elimina una entrada obsoleta; devuelve si se eliminó.
    ///
    /// Se relee la fila actual: si entretanto apunta a otro recurso, ya no es
    /// la entrada obsoleta y se conserva.
    pub fn remove(&self, entry: &RedirectIndexEntry) -> Result<bool, StoreError> {
        match self.backend.find(&entry.catalog_id)? {
            Some(current) if current.resource_id == entry.resource_id => {
                self.backend.delete(&entry.catalog_id)
            }
            Some(_) => {
                debug!(
                    "Entrada {} reemplazada antes del borrado, se conserva",
                    entry.catalog_id
                );
                Ok(false)
            }
            None => Ok(false),
        }
    }
}
