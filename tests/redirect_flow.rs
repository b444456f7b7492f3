use chrono::Days;
use open_music_redirect::{
    config::Config,
    error::LookupError,
    index::{json::JsonBackend, memory::MemoryBackend, today, IndexBackend, RedirectIndexEntry},
    lookup::RedirectLookup,
    CatalogItem, CatalogKind, Placeholder, RedirectResolver, ResolvedResource,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
    time::Duration,
};

/// Buscador falso: cada resolución completa devuelve `resource_id`
struct FakeLookup {
    resource_id: String,
    valid: Mutex<HashSet<String>>,
    redirects: AtomicUsize,
    revalidations: AtomicUsize,
    delay: Duration,
}

impl FakeLookup {
    fn new(resource_id: &str) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            valid: Mutex::new(HashSet::from([resource_id.to_string()])),
            redirects: AtomicUsize::new(0),
            revalidations: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl RedirectLookup for FakeLookup {
    fn revalidate(&self, resource_id: &str) -> Result<Option<ResolvedResource>, LookupError> {
        self.revalidations.fetch_add(1, Ordering::SeqCst);
        let valid = self.valid.lock().contains(resource_id);
        Ok(valid.then(|| ResolvedResource::new(resource_id, Duration::from_secs(180), "Song")))
    }

    fn redirect(&self, placeholder: &Placeholder) -> Result<(), LookupError> {
        self.redirects.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        placeholder.complete(
            &ResolvedResource::new(self.resource_id.clone(), Duration::from_secs(180), "Song"),
            "Song",
        );
        Ok(())
    }
}

fn config() -> Config {
    Config {
        writer_thread_name: "it-redirect-writer".to_string(),
        ..Config::default()
    }
}

fn song(id: &str) -> Placeholder {
    Placeholder::redirect(CatalogItem::new(Some(id.to_string()), CatalogKind::Track, "Song"))
}

#[test]
fn concurrent_misses_leave_a_single_entry() {
    let backend = Arc::new(MemoryBackend::new());
    let lookup = Arc::new(FakeLookup::new("yt_A").with_delay(Duration::from_millis(10)));
    let resolver = Arc::new(RedirectResolver::new(backend.clone(), lookup.clone(), &config()).unwrap());

    let callers = 8;
    let barrier = Arc::new(Barrier::new(callers));
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let placeholder = song("trk_1");
                barrier.wait();
                resolver.resolve(&placeholder).unwrap();
                placeholder
            })
        })
        .collect();

    for handle in handles {
        let placeholder = handle.join().unwrap();
        assert!(placeholder.is_done());
        assert_eq!(placeholder.resource_id().as_deref(), Some("yt_A"));
    }

    resolver.drain();
    assert_eq!(backend.len(), 1);
    assert_eq!(backend.find("trk_1").unwrap().unwrap().resource_id, "yt_A");

    // Tras vaciar la cola, una nueva petición ya no busca
    let before = lookup.redirects.load(Ordering::SeqCst);
    resolver.resolve(&song("trk_1")).unwrap();
    assert_eq!(lookup.redirects.load(Ordering::SeqCst), before);
}

#[test]
fn repeated_hits_never_move_last_used_backwards() {
    let ten_days_ago = today().checked_sub_days(Days::new(10)).unwrap();
    let backend = Arc::new(MemoryBackend::with_entries([RedirectIndexEntry::new(
        "trk_1",
        "yt_A",
        CatalogKind::Track,
    )
    .with_last_used(ten_days_ago)]));
    let lookup = Arc::new(FakeLookup::new("yt_A"));
    let resolver = RedirectResolver::new(backend.clone(), lookup.clone(), &config()).unwrap();

    let mut previous = ten_days_ago;
    for _ in 0..5 {
        resolver.resolve(&song("trk_1")).unwrap();
        resolver.drain();
        let last_used = backend.find("trk_1").unwrap().unwrap().last_used;
        assert!(last_used >= previous);
        previous = last_used;
    }

    assert_eq!(previous, today());
    assert_eq!(lookup.redirects.load(Ordering::SeqCst), 0);
    assert_eq!(lookup.revalidations.load(Ordering::SeqCst), 5);
}

#[test]
fn lock_record_blocks_touch_but_not_resolution() {
    let ten_days_ago = today().checked_sub_days(Days::new(10)).unwrap();
    let backend = Arc::new(MemoryBackend::with_entries([RedirectIndexEntry::new(
        "trk_1",
        "yt_A",
        CatalogKind::Track,
    )
    .with_last_used(ten_days_ago)]));
    backend.create_modification_lock("bulk refresh").unwrap();

    let resolver =
        RedirectResolver::new(backend.clone(), Arc::new(FakeLookup::new("yt_A")), &config()).unwrap();

    let placeholder = song("trk_1");
    resolver.resolve(&placeholder).unwrap();
    resolver.drain();

    assert!(placeholder.is_done());
    assert_eq!(backend.find("trk_1").unwrap().unwrap().last_used, ten_days_ago);
    assert_eq!(resolver.write_stats().skipped_locked, 1);
}

#[test]
fn json_index_keeps_redirect_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("redirect_index.json");

    {
        let backend = Arc::new(JsonBackend::open(&path).unwrap());
        let resolver =
            RedirectResolver::new(backend, Arc::new(FakeLookup::new("yt_A")), &config()).unwrap();

        let placeholder = song("trk_1");
        resolver.resolve(&placeholder).unwrap();
        assert_eq!(placeholder.duration(), Some(Duration::from_secs(180)));
        assert_eq!(placeholder.title(), "Song");
        resolver.drain();
        resolver.shutdown();
    }

    let backend = Arc::new(JsonBackend::open(&path).unwrap());
    let entry = backend.find("trk_1").unwrap().unwrap();
    assert_eq!(entry.resource_id, "yt_A");
    assert_eq!(entry.last_used, today());

    let lookup = Arc::new(FakeLookup::new("yt_A"));
    let resolver = RedirectResolver::new(backend, lookup.clone(), &config()).unwrap();
    let placeholder = song("trk_1");
    resolver.resolve(&placeholder).unwrap();

    assert_eq!(placeholder.resource_id().as_deref(), Some("yt_A"));
    assert_eq!(lookup.redirects.load(Ordering::SeqCst), 0);
}
