use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Tipo de item del catálogo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    Track,
    Episode,
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Track => write!(f, "track"),
            Self::Episode => write!(f, "episode"),
        }
    }
}

/// Item del catálogo que no se puede reproducir directamente
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    id: Option<String>,
    kind: CatalogKind,
    display: String,
}

impl CatalogItem {
    /// Un id vacío se trata como ausente: el item nunca se cachea
    pub fn new(id: Option<String>, kind: CatalogKind, display: impl Into<String>) -> Self {
        Self {
            id: id.filter(|id| !id.trim().is_empty()),
            kind,
            display: display.into(),
        }
    }

    /// Identificador estable, si el item tiene uno
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn kind(&self) -> CatalogKind {
        self.kind
    }

    /// Texto legible, p. ej. "Artista - Canción"
    pub fn display(&self) -> &str {
        &self.display
    }
}

/// Recurso reproducible devuelto por el buscador externo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    pub id: String,
    pub duration: Duration,
    pub title: String,
}

impl ResolvedResource {
    pub fn new(id: impl Into<String>, duration: Duration, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            duration,
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderState {
    Uninitialized,
    Loading,
    Done,
    Canceled,
}

impl PlaceholderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Canceled)
    }
}

#[derive(Debug)]
struct PlaceholderContent {
    state: PlaceholderState,
    resource_id: Option<String>,
    duration: Option<Duration>,
    title: String,
}

/// Recurso reproducible pendiente que ocupa el lugar de un item del catálogo.
///
/// Lo crea y lo descarta el subsistema de reproducción; el resolver solo lo
/// lee y lo completa. Transiciones: `Uninitialized → Loading → {Done, Canceled}`.
/// Una vez terminal, el contenido ya no cambia.
#[derive(Debug)]
pub struct Placeholder {
    catalog_item: Option<CatalogItem>,
    content: Mutex<PlaceholderContent>,
}

impl Placeholder {
    /// Placeholder para un item del catálogo que hay que redirigir
    pub fn redirect(item: CatalogItem) -> Self {
        let title = item.display().to_string();
        Self::build(Some(item), title)
    }

    /// Placeholder sin item de catálogo (búsqueda directa, no redirigible)
    pub fn detached(title: impl Into<String>) -> Self {
        Self::build(None, title.into())
    }

    fn build(catalog_item: Option<CatalogItem>, title: String) -> Self {
        Self {
            catalog_item,
            content: Mutex::new(PlaceholderContent {
                state: PlaceholderState::Uninitialized,
                resource_id: None,
                duration: None,
                title,
            }),
        }
    }

    pub fn catalog_item(&self) -> Option<&CatalogItem> {
        self.catalog_item.as_ref()
    }

    pub fn state(&self) -> PlaceholderState {
        self.content.lock().state
    }

    pub fn is_done(&self) -> bool {
        self.state() == PlaceholderState::Done
    }

    pub fn is_canceled(&self) -> bool {
        self.state() == PlaceholderState::Canceled
    }

    /// `Uninitialized → Loading`; en cualquier otro estado no hace nada
    pub fn mark_loading(&self) {
        let mut content = self.content.lock();
        if content.state == PlaceholderState::Uninitialized {
            content.state = PlaceholderState::Loading;
        }
    }

    /// Completa el placeholder con el recurso y el título dados.
    ///
    /// Devuelve `false` si ya estaba terminado o cancelado.
    pub fn complete(&self, resource: &ResolvedResource, title: impl Into<String>) -> bool {
        let mut content = self.content.lock();
        if content.state.is_terminal() {
            return false;
        }

        content.resource_id = Some(resource.id.clone());
        content.duration = Some(resource.duration);
        content.title = title.into();
        content.state = PlaceholderState::Done;
        true
    }

    /// Devuelve `false` si ya estaba terminado o cancelado
    pub fn cancel(&self) -> bool {
        let mut content = self.content.lock();
        if content.state.is_terminal() {
            return false;
        }

        content.state = PlaceholderState::Canceled;
        true
    }

    pub fn resource_id(&self) -> Option<String> {
        self.content.lock().resource_id.clone()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.content.lock().duration
    }

    pub fn title(&self) -> String {
        self.content.lock().title.clone()
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let content = self.content.lock();
        write!(f, "Placeholder({}, {:?})", content.title, content.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song() -> CatalogItem {
        CatalogItem::new(Some("trk_1".into()), CatalogKind::Track, "Artist - Song")
    }

    #[test]
    fn test_empty_id_is_absent() {
        let item = CatalogItem::new(Some("  ".into()), CatalogKind::Track, "x");
        assert_eq!(item.id(), None);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let placeholder = Placeholder::redirect(song());
        assert_eq!(placeholder.state(), PlaceholderState::Uninitialized);

        placeholder.mark_loading();
        assert_eq!(placeholder.state(), PlaceholderState::Loading);

        let resource = ResolvedResource::new("yt_A", Duration::from_secs(180), "Song (Official)");
        assert!(placeholder.complete(&resource, "Artist - Song"));
        assert!(placeholder.is_done());
        assert_eq!(placeholder.resource_id().as_deref(), Some("yt_A"));
        assert_eq!(placeholder.title(), "Artist - Song");

        // Terminal: ni cancelar ni volver a cargar cambia nada
        assert!(!placeholder.cancel());
        placeholder.mark_loading();
        assert!(placeholder.is_done());
    }

    #[test]
    fn test_canceled_content_is_frozen() {
        let placeholder = Placeholder::redirect(song());
        placeholder.mark_loading();
        assert!(placeholder.cancel());

        let resource = ResolvedResource::new("yt_A", Duration::from_secs(1), "x");
        assert!(!placeholder.complete(&resource, "x"));
        assert_eq!(placeholder.resource_id(), None);
    }
}
