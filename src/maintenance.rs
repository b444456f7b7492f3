//! Mantenimiento fuera de línea del índice de redirección.
//!
//! Revalida las entradas que llevan tiempo sin usarse y borra las que apuntan
//! a recursos que ya no existen. Mientras corre mantiene un lock de
//! modificación, así el worker de escritura del resolver descarta sus
//! escrituras y no pisa el trabajo en curso.

use chrono::{Days, NaiveDate};
use std::{fmt, sync::Arc};
use tracing::{debug, error, info, warn};

use crate::error::{LookupError, Result, StoreError};
use crate::index::{today, IndexBackend, ModificationLock};
use crate::lookup::RedirectLookup;

/// Lock de modificación que se libera al soltarse
pub struct ModificationLockHandle {
    backend: Arc<dyn IndexBackend>,
    lock: ModificationLock,
}

impl ModificationLockHandle {
    pub fn acquire(backend: Arc<dyn IndexBackend>, reason: &str) -> std::result::Result<Self, StoreError> {
        let lock = backend.create_modification_lock(reason)?;
        info!("🔒 Lock de modificación #{} creado: {}", lock.id, lock.reason);
        Ok(Self { backend, lock })
    }

    pub fn lock(&self) -> &ModificationLock {
        &self.lock
    }
}

impl Drop for ModificationLockHandle {
    fn drop(&mut self) {
        match self.backend.release_modification_lock(self.lock.id) {
            Ok(true) => info!("🔓 Lock de modificación #{} liberado", self.lock.id),
            Ok(false) => warn!("⚠️ El lock de modificación #{} ya no existía", self.lock.id),
            Err(e) => error!("❌ No se pudo liberar el lock de modificación #{}: {}", self.lock.id, e),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub examined: usize,
    pub removed: usize,
    pub kept: usize,
}

impl fmt::Display for RefreshReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "🧹 Refresh: {} revisadas, {} eliminadas, {} vigentes",
            self.examined, self.removed, self.kept
        )
    }
}

/// Primer día que no se considera antiguo tras `days` días sin uso
pub fn refresh_cutoff(days: u64) -> NaiveDate {
    today().checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

/// Revalida las entradas sin usar durante más de `refresh_after_days` días.
///
/// Un recurso que el buscador da por no disponible cuenta como obsoleto. Cualquier
/// otro fallo de la búsqueda externa aborta el refresh y se devuelve; el lock
/// se libera igualmente.
pub fn refresh_stale_entries(
    backend: Arc<dyn IndexBackend>,
    lookup: &dyn RedirectLookup,
    refresh_after_days: u64,
) -> Result<RefreshReport> {
    let older_than = refresh_cutoff(refresh_after_days);
    let _lock = ModificationLockHandle::acquire(Arc::clone(&backend), "refresh stale redirects")?;
    let mut report = RefreshReport::default();

    let candidates: Vec<_> = backend
        .entries()?
        .into_iter()
        .filter(|entry| entry.last_used < older_than)
        .collect();

    for entry in candidates {
        report.examined += 1;
        let valid = match lookup.revalidate(&entry.resource_id) {
            Ok(resource) => resource.is_some(),
            Err(LookupError::Unavailable(_)) => false,
            Err(e) => return Err(e.into()),
        };
        if valid {
            report.kept += 1;
            continue;
        }

        if backend.delete(&entry.catalog_id)? {
            debug!("Entrada obsoleta eliminada: {} → {}", entry.catalog_id, entry.resource_id);
        }
        report.removed += 1;
    }

    info!("{}", report);
    Ok(report)
}
