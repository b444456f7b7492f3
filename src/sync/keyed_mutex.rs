use dashmap::DashMap;
use parking_lot::ReentrantMutex;
use std::{hash::Hash, sync::Arc};
use tracing::trace;

/// Exclusión mutua por clave.
///
/// Dos operaciones con la misma clave nunca ejecutan su sección protegida a la
/// vez; claves distintas no se bloquean entre sí. Cada clave tiene un
/// [`ReentrantMutex`] creado bajo demanda que se elimina del registro cuando ya
/// nadie lo referencia, así que el mapa solo crece con las claves en uso.
///
/// El mutex es reentrante: el mismo hilo puede volver a tomar una clave que ya
/// tiene sin bloquearse.
#[derive(Debug)]
pub struct KeyedMutex<K: Eq + Hash> {
    locks: DashMap<K, Arc<ReentrantMutex<()>>>,
}

/// Referencia viva a la entrada de una clave; al soltarse limpia el registro
struct KeySlot<'a, K: Eq + Hash> {
    owner: &'a KeyedMutex<K>,
    key: &'a K,
    lock: Arc<ReentrantMutex<()>>,
}

impl<K: Eq + Hash> Drop for KeySlot<'_, K> {
    fn drop(&mut self) {
        // Solo el registro conserva el Arc: nadie espera ni sostiene la clave
        self.owner
            .locks
            .remove_if(self.key, |_, lock| Arc::strong_count(lock) == 2);
    }
}

impl<K> KeyedMutex<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Ejecuta `supplier` con acceso exclusivo a `key` y devuelve su resultado.
    ///
    /// La clave se libera al terminar, también si `supplier` devuelve un error
    /// o entra en pánico. El mutex no guarda ningún estado de error.
    pub fn evaluate<T, F>(&self, key: &K, supplier: F) -> T
    where
        F: FnOnce() -> T,
    {
        let slot = self.slot(key);
        let _guard = slot.lock.lock();
        supplier()
    }

    /// Igual que [`evaluate`](Self::evaluate) para acciones sin valor de retorno
    pub fn with_key<F>(&self, key: &K, action: F)
    where
        F: FnOnce(),
    {
        self.evaluate(key, action)
    }

    /// Envuelve una unidad de trabajo para que se ejecute bajo `key` cuando se invoque.
    ///
    /// Permite proteger con la misma clave tanto una llamada directa como una
    /// tarea que correrá más tarde en otro hilo.
    pub fn synchronized<T, F>(self: &Arc<Self>, key: K, work: F) -> impl FnOnce() -> T + Send
    where
        K: Send + Sync + 'static,
        F: FnOnce() -> T + Send,
    {
        let mutex = Arc::clone(self);
        move || mutex.evaluate(&key, work)
    }

    /// Número de claves con un mutex vivo en este momento
    pub fn active_keys(&self) -> usize {
        self.locks.len()
    }

    fn slot<'a>(&'a self, key: &'a K) -> KeySlot<'a, K> {
        // El guard de DashMap se suelta antes de bloquear el mutex de la clave
        let lock = Arc::clone(self.locks.entry(key.clone()).or_default().value());
        trace!("mutex de clave adquirido del registro");
        KeySlot {
            owner: self,
            key,
            lock,
        }
    }
}

impl<K> Default for KeyedMutex<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_same_key_is_exclusive() {
        let mutex = Arc::new(KeyedMutex::<String>::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    mutex.with_key(&"trk_1".to_string(), || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(mutex.active_keys(), 0);
    }

    #[test]
    fn test_different_keys_do_not_block() {
        let mutex = Arc::new(KeyedMutex::<String>::new());
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);

        let holder = {
            let mutex = Arc::clone(&mutex);
            thread::spawn(move || {
                mutex.with_key(&"a".to_string(), || {
                    // Espera a que el otro hilo entre con "b" mientras "a" sigue tomada
                    rx.recv_timeout(Duration::from_secs(5)).unwrap();
                });
            })
        };

        thread::sleep(Duration::from_millis(20));
        mutex.with_key(&"b".to_string(), || tx.send(()).unwrap());
        holder.join().unwrap();
    }

    #[test]
    fn test_reentrant_on_same_thread() {
        let mutex = KeyedMutex::<String>::new();
        let key = "trk_1".to_string();
        let value = mutex.evaluate(&key, || mutex.evaluate(&key, || 42));
        assert_eq!(value, 42);
        assert_eq!(mutex.active_keys(), 0);
    }

    #[test]
    fn test_error_releases_key() {
        let mutex = KeyedMutex::<String>::new();
        let key = "trk_1".to_string();

        let result: Result<(), &str> = mutex.evaluate(&key, || Err("boom"));
        assert!(result.is_err());
        assert_eq!(mutex.active_keys(), 0);

        // Un segundo uso no se bloquea
        assert_eq!(mutex.evaluate(&key, || 1), 1);
    }

    #[test]
    fn test_panic_releases_key() {
        let mutex = Arc::new(KeyedMutex::<String>::new());
        let key = "trk_1".to_string();

        let panicking = {
            let mutex = Arc::clone(&mutex);
            let key = key.clone();
            thread::spawn(move || mutex.with_key(&key, || panic!("boom")))
        };
        assert!(panicking.join().is_err());

        assert_eq!(mutex.evaluate(&key, || 7), 7);
        assert_eq!(mutex.active_keys(), 0);
    }

    #[test]
    fn test_synchronized_runs_later_on_other_thread() {
        let mutex = Arc::new(KeyedMutex::<String>::new());
        let task = mutex.synchronized("trk_1".to_string(), || "done");
        let handle = thread::spawn(task);
        assert_eq!(handle.join().unwrap(), "done");
        assert_eq!(mutex.active_keys(), 0);
    }
}
