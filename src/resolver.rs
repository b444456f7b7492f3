use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{LookupError, RedirectError, Result};
use crate::index::{IndexBackend, ModificationLockGuard, RedirectIndexEntry, RedirectIndexStore};
use crate::lookup::RedirectLookup;
use crate::maintenance::{self, RefreshReport};
use crate::placeholder::Placeholder;
use crate::sync::KeyedMutex;
use crate::write_queue::{SequentialWriteQueue, WriteOp, WriteQueueStats};

/// Resuelve el recurso reproducible de un item del catálogo apoyándose en el índice persistido.
///
/// Busca primero una redirección guardada (bajo el mutex de la clave). Si la
/// hay y el recurso sigue siendo válido, completa el placeholder con ella; si
/// no, hace la búsqueda externa completa. Todas las escrituras sobre el índice
/// se delegan al [`SequentialWriteQueue`] y no se esperan.
pub struct RedirectResolver {
    backend: Arc<dyn IndexBackend>,
    store: RedirectIndexStore,
    lookup: Arc<dyn RedirectLookup>,
    mutex: Arc<KeyedMutex<String>>,
    queue: SequentialWriteQueue,
    refresh_after_days: u64,
}

impl RedirectResolver {
    pub fn new(
        backend: Arc<dyn IndexBackend>,
        lookup: Arc<dyn RedirectLookup>,
        config: &Config,
    ) -> Result<Self> {
        let store = RedirectIndexStore::new(Arc::clone(&backend));
        let guard = ModificationLockGuard::new(Arc::clone(&backend));
        let mutex = Arc::new(KeyedMutex::new());
        let queue = SequentialWriteQueue::start(
            store.clone(),
            guard,
            Arc::clone(&mutex),
            &config.writer_thread_name,
        )?;

        Ok(Self {
            backend,
            store,
            lookup,
            mutex,
            queue,
            refresh_after_days: config.refresh_after_days,
        })
    }

    /// Resuelve `placeholder`, dejándolo en `Done` o `Canceled`.
    ///
    /// Falla con [`RedirectError::NotRedirected`] si el placeholder no está
    /// enlazado a un item del catálogo. Los errores de la búsqueda externa se
    /// propagan tal cual; los del índice se registran y no afectan al resultado.
    pub fn resolve(&self, placeholder: &Placeholder) -> Result<()> {
        let item = placeholder
            .catalog_item()
            .ok_or_else(|| RedirectError::NotRedirected(placeholder.to_string()))?;

        // Otra ruta prioritaria ya lo cargó
        if placeholder.is_done() {
            debug!("Placeholder ya resuelto: {}", item.display());
            return Ok(());
        }

        placeholder.mark_loading();
        let catalog_id = item.id();

        if let Some(entry) = catalog_id.and_then(|id| self.cached_entry(id)) {
            let revalidated = match self.lookup.revalidate(&entry.resource_id) {
                Ok(resource) => resource,
                Err(LookupError::Unavailable(reason)) => {
                    debug!("Recurso {} no disponible: {}", entry.resource_id, reason);
                    None
                }
                Err(e) => return Err(e.into()),
            };

            match revalidated {
                Some(resource) => {
                    debug!("✅ Cache hit de redirección: {} → {}", entry.catalog_id, resource.id);
                    // El título viene del catálogo para que coincida con lo que pidió el usuario
                    if !placeholder.complete(&resource, item.display()) {
                        debug!("Placeholder terminado por otra ruta: {}", item.display());
                    }
                    self.queue.enqueue(WriteOp::Touch(entry));
                    return Ok(());
                }
                None => {
                    info!(
                        "♻️ Redirección obsoleta {} → {}, buscando de nuevo",
                        entry.catalog_id, entry.resource_id
                    );
                    self.queue.enqueue(WriteOp::Remove(entry));
                }
            }
        }

        self.lookup.redirect(placeholder)?;

        if placeholder.is_canceled() {
            debug!("Redirección cancelada, no se cachea: {}", item.display());
            return Ok(());
        }

        let Some(catalog_id) = catalog_id else {
            return Ok(());
        };

        // Sin id de recurso la tarea lo reporta como no disponible al escribir
        self.queue.enqueue(WriteOp::InsertIfAbsent {
            catalog_id: catalog_id.to_string(),
            kind: item.kind(),
            resource_id: placeholder.resource_id(),
        });

        Ok(())
    }

    /// Ejecuta [`resolve`](Self::resolve) en el pool bloqueante de tokio
    pub async fn resolve_async(self: &Arc<Self>, placeholder: Arc<Placeholder>) -> Result<()> {
        let resolver = Arc::clone(self);
        tokio::task::spawn_blocking(move || resolver.resolve(&placeholder)).await?
    }

    /// Revalida las entradas sin usar desde hace más de `refresh_after_days` días.
    ///
    /// Mientras corre, las escrituras encoladas por este resolver se descartan.
    pub fn refresh_stale(&self) -> Result<RefreshReport> {
        maintenance::refresh_stale_entries(
            Arc::clone(&self.backend),
            self.lookup.as_ref(),
            self.refresh_after_days,
        )
    }

    /// Espera a que se apliquen las escrituras encoladas hasta ahora
    pub fn drain(&self) {
        self.queue.drain();
    }

    pub fn shutdown(&self) {
        self.queue.shutdown();
    }

    pub fn write_stats(&self) -> WriteQueueStats {
        self.queue.stats()
    }

    fn cached_entry(&self, catalog_id: &str) -> Option<RedirectIndexEntry> {
        let key = catalog_id.to_string();
        match self.mutex.evaluate(&key, || self.store.find_by_key(catalog_id)) {
            Ok(entry) => entry,
            Err(e) => {
                // Un índice ilegible equivale a un miss
                error!("❌ Error leyendo el índice de redirección para {}: {}", catalog_id, e);
                None
            }
        }
    }
}
