//! Errores del motor de redirección

use thiserror::Error;

/// Result del resolver
pub type Result<T> = std::result::Result<T, RedirectError>;

/// Errores que el resolver puede devolver al llamador
#[derive(Error, Debug)]
pub enum RedirectError {
    /// El placeholder no está enlazado a ningún item del catálogo (error de programación)
    #[error("{0} is not a placeholder for a redirected catalog item")]
    NotRedirected(String),

    /// Fallo del mecanismo externo de búsqueda; se propaga sin modificar
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// Fallo del índice persistido (solo en rutas síncronas como el mantenimiento)
    #[error("Redirect index error: {0}")]
    Store(#[from] StoreError),

    /// No se pudo arrancar el worker de escritura
    #[error("Write worker error: {0}")]
    Worker(#[source] std::io::Error),

    /// La tarea bloqueante lanzada desde tokio terminó con pánico o fue cancelada
    #[error("Resolution task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errores del mecanismo externo de búsqueda
#[derive(Error, Debug)]
pub enum LookupError {
    /// Fallo de red o de I/O durante la búsqueda
    #[error("I/O error during lookup: {0}")]
    Io(#[from] std::io::Error),

    /// El recurso dejó de estar disponible mientras se consultaba
    #[error("Resource unavailable: {0}")]
    Unavailable(String),

    /// Cualquier otro fallo reportado por el buscador
    #[error("Lookup error: {0}")]
    Other(String),
}

/// Errores de la superficie de persistencia
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redirect index entry already exists for `{0}`")]
    Duplicate(String),

    #[error("No redirect index entry for `{0}`")]
    NotFound(String),

    /// El item o el recurso resuelto desapareció justo antes de escribir
    #[error("Resource unavailable while writing: {0}")]
    Unavailable(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    /// Errores transitorios que se registran como warning y no como error
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
