//! # Open Music Redirect
//!
//! Resolution and caching of playable redirects for catalog tracks.
//!
//! Catalog services (Spotify and the like) do not allow full playback, so
//! every catalog track is played through an equivalent resource found on a
//! second service. Finding that resource is expensive; this crate remembers
//! the result in a persisted redirect index and reuses it on later requests.
//!
//! ## Architecture
//!
//! ### [`resolver`] - RedirectResolver
//! - Single entry point used by the playback queue
//! - Cache check under a per-key mutex, revalidation, full lookup on miss
//!
//! ### [`index`] - Redirect Index
//! - Persistence surface ([`index::IndexBackend`]) with memory and JSON backends
//! - Store operations and the modification-lock guard
//!
//! ### [`write_queue`] - SequentialWriteQueue
//! - One dedicated worker thread applies every index write in order
//!
//! ### [`sync`] - KeyedMutex
//! - Per-key reentrant exclusion shared by reads and writes
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use open_music_redirect::{
//!     config::Config,
//!     index::json::JsonBackend,
//!     lookup::RedirectLookup,
//!     placeholder::{CatalogItem, CatalogKind, Placeholder},
//!     resolver::RedirectResolver,
//! };
//! use std::sync::Arc;
//!
//! # fn example(lookup: Arc<dyn RedirectLookup>) -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let backend = Arc::new(JsonBackend::open(config.index_path())?);
//! let resolver = RedirectResolver::new(backend, lookup, &config)?;
//!
//! let item = CatalogItem::new(Some("trk_1".into()), CatalogKind::Track, "Artist - Song");
//! let placeholder = Placeholder::redirect(item);
//! resolver.resolve(&placeholder)?;
//! println!("Playing {:?}", placeholder.resource_id());
//!
//! resolver.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod lookup;
pub mod maintenance;
pub mod placeholder;
pub mod resolver;
pub mod sync;
pub mod telemetry;
pub mod write_queue;

pub use error::{LookupError, RedirectError, StoreError};
pub use placeholder::{CatalogItem, CatalogKind, Placeholder, PlaceholderState, ResolvedResource};
pub use resolver::RedirectResolver;
