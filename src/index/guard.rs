use std::sync::Arc;
use tracing::{debug, error};

use super::IndexBackend;

/// Bloquea las escrituras del motor mientras haya locks de modificación activos.
///
/// Se consulta inmediatamente antes de cada escritura; el resultado nunca se
/// guarda. Es una pausa de mejor esfuerzo, no una barrera transaccional.
#[derive(Clone)]
pub struct ModificationLockGuard {
    backend: Arc<dyn IndexBackend>,
}

impl ModificationLockGuard {
    pub fn new(backend: Arc<dyn IndexBackend>) -> Self {
        Self { backend }
    }

    /// `false` si existe algún registro de lock o si no se pudo consultar
    pub fn can_write(&self) -> bool {
        match self.backend.count_modification_locks() {
            Ok(0) => true,
            Ok(locks) => {
                debug!("🔒 {} lock(s) de modificación activos, escritura omitida", locks);
                false
            }
            Err(e) => {
                error!("❌ Error consultando locks de modificación: {}", e);
                false
            }
        }
    }
}
