//! Contrato del mecanismo externo de búsqueda.
//!
//! La búsqueda real (YouTube, Invidious, ...) vive fuera de este crate; el
//! resolver solo la invoca a través de [`RedirectLookup`].

use crate::error::LookupError;
use crate::placeholder::{Placeholder, ResolvedResource};

#[cfg(test)]
use mockall::automock;

/// Buscador que encuentra el recurso reproducible equivalente a un item del catálogo
#[cfg_attr(test, automock)]
pub trait RedirectLookup: Send + Sync {
    /// Vuelve a validar un recurso ya conocido.
    ///
    /// `Ok(None)` si el recurso ya no existe. No tiene efectos secundarios.
    fn revalidate(&self, resource_id: &str) -> Result<Option<ResolvedResource>, LookupError>;

    /// Resolución completa: deja el placeholder en `Done` o `Canceled`.
    ///
    /// Puede bloquear en I/O de red; un fallo de I/O se devuelve como error.
    fn redirect(&self, placeholder: &Placeholder) -> Result<(), LookupError>;
}
