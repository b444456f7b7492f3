use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};
use tracing::{debug, error, info, warn};

use crate::error::{RedirectError, StoreError};
use crate::index::{ModificationLockGuard, RedirectIndexEntry, RedirectIndexStore};
use crate::placeholder::CatalogKind;
use crate::sync::KeyedMutex;

/// Escritura diferida sobre el índice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Actualiza `last_used` tras un cache hit
    Touch(RedirectIndexEntry),
    /// Crea la entrada tras una resolución completa, salvo que ya exista.
    ///
    /// El recurso se lee del placeholder al encolar; si para entonces ya no
    /// tenía id, la tarea falla con [`StoreError::Unavailable`].
    InsertIfAbsent {
        catalog_id: String,
        kind: CatalogKind,
        resource_id: Option<String>,
    },
    /// Borra una entrada cuyo recurso ya no es válido
    Remove(RedirectIndexEntry),
}

impl WriteOp {
    /// Inserción de una entrada ya resuelta
    pub fn insert(entry: RedirectIndexEntry) -> Self {
        Self::InsertIfAbsent {
            catalog_id: entry.catalog_id,
            kind: entry.kind,
            resource_id: Some(entry.resource_id),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Touch(entry) | Self::Remove(entry) => &entry.catalog_id,
            Self::InsertIfAbsent { catalog_id, .. } => catalog_id,
        }
    }

    fn apply(self, store: &RedirectIndexStore) -> Result<(), StoreError> {
        match self {
            Self::Touch(entry) => store.touch(&entry),
            Self::InsertIfAbsent {
                catalog_id,
                kind,
                resource_id,
            } => {
                let resource_id =
                    resource_id.ok_or_else(|| StoreError::Unavailable(catalog_id.clone()))?;
                let entry = RedirectIndexEntry::new(catalog_id.clone(), resource_id.clone(), kind);
                if store.insert_if_absent(entry)? {
                    info!("💾 Redirección guardada: {} → {}", catalog_id, resource_id);
                }
                Ok(())
            }
            Self::Remove(entry) => {
                if store.remove(&entry)? {
                    info!(
                        "🗑️ Redirección obsoleta eliminada: {} → {}",
                        entry.catalog_id, entry.resource_id
                    );
                }
                Ok(())
            }
        }
    }
}

/// Contadores del worker de escritura
#[derive(Debug, Default)]
struct QueueCounters {
    submitted: AtomicU64,
    applied: AtomicU64,
    skipped_locked: AtomicU64,
    failed: AtomicU64,
}

/// Instantánea de las estadísticas de la cola
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteQueueStats {
    pub submitted: u64,
    pub applied: u64,
    pub skipped_locked: u64,
    pub failed: u64,
    pub pending: usize,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Task(Job),
    Barrier(Sender<()>),
}

/// Cola de escrituras con un único worker dedicado.
///
/// Las tareas se ejecutan estrictamente en orden de envío. Cada tarea consulta
/// el [`ModificationLockGuard`] justo antes de escribir (si hay lock se
/// descarta, sin reintento) y luego aplica la escritura bajo el mismo mutex de
/// clave que usa la lectura del resolver. Ningún fallo de una tarea detiene
/// el worker.
pub struct SequentialWriteQueue {
    sender: Mutex<Option<Sender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
    counters: Arc<QueueCounters>,
    store: RedirectIndexStore,
    guard: ModificationLockGuard,
    mutex: Arc<KeyedMutex<String>>,
}

impl SequentialWriteQueue {
    /// Arranca el worker en un hilo con nombre `thread_name`
    pub fn start(
        store: RedirectIndexStore,
        guard: ModificationLockGuard,
        mutex: Arc<KeyedMutex<String>>,
        thread_name: &str,
    ) -> Result<Self, RedirectError> {
        let (sender, receiver) = unbounded::<Message>();
        let running = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(QueueCounters::default());

        let worker = {
            let running = Arc::clone(&running);
            let counters = Arc::clone(&counters);
            thread::Builder::new()
                .name(thread_name.to_string())
                .spawn(move || run_worker(receiver, running, counters))
                .map_err(RedirectError::Worker)?
        };

        info!("🧵 Worker de escritura del índice iniciado ({})", thread_name);

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            running,
            counters,
            store,
            guard,
            mutex,
        })
    }

    /// Encola una escritura; vuelve sin esperar a que se aplique
    pub fn enqueue(&self, op: WriteOp) {
        let store = self.store.clone();
        let guard = self.guard.clone();
        let counters = Arc::clone(&self.counters);

        let key = op.key().to_string();
        let description = format!("{:?}", op);
        // Mismo mutex de clave que la lectura del resolver
        let write = self
            .mutex
            .synchronized(key.clone(), move || op.apply(&store));

        let job: Job = Box::new(move || {
            if !guard.can_write() {
                counters.skipped_locked.fetch_add(1, Ordering::Relaxed);
                debug!("🔒 Escritura descartada por lock de modificación: {}", description);
                return;
            }

            match write() {
                Ok(()) => {
                    counters.applied.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) if e.is_transient() => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!("⚠️ Recurso no disponible al escribir en el índice ({}): {}", key, e);
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    error!("❌ Error escribiendo en el índice de redirección: {} - {:?}", description, e);
                }
            }
        });

        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(Message::Task(job)).is_ok(),
            None => false,
        };

        if sent {
            self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        } else {
            warn!("⚠️ Cola de escritura detenida, escritura descartada");
        }
    }

    /// Bloquea hasta que todas las tareas encoladas antes de la llamada se hayan ejecutado
    pub fn drain(&self) {
        let (ack_tx, ack_rx) = bounded(1);
        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(Message::Barrier(ack_tx)).is_ok(),
            None => false,
        };

        if sent {
            // Si el worker se detiene antes de llegar a la barrera, recv falla y se vuelve igual
            let _ = ack_rx.recv();
        }
    }

    /// Detiene el worker. Las tareas pendientes se abandonan.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let dropped = self.sender.lock().take().map(|sender| sender.len());

        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                error!("❌ El worker de escritura terminó con pánico");
            }
        }

        if let Some(pending) = dropped {
            info!("🛑 Worker de escritura detenido ({} tareas abandonadas)", pending);
        }
    }

    pub fn stats(&self) -> WriteQueueStats {
        WriteQueueStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            applied: self.counters.applied.load(Ordering::Relaxed),
            skipped_locked: self.counters.skipped_locked.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            pending: self.sender.lock().as_ref().map_or(0, |sender| sender.len()),
        }
    }
}

impl Drop for SequentialWriteQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(receiver: Receiver<Message>, running: Arc<AtomicBool>, counters: Arc<QueueCounters>) {
    for message in receiver.iter() {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        match message {
            Message::Task(job) => {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    error!("❌ Pánico en una tarea de escritura del índice; el worker continúa");
                }
            }
            Message::Barrier(ack) => {
                let _ = ack.send(());
            }
        }
    }

    debug!("Worker de escritura finalizado");
}
