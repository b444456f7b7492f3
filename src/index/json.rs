use chrono::Utc;
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    time::SystemTime,
};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::{IndexBackend, ModificationLock, RedirectIndexEntry};
use crate::error::StoreError;

/// Documento JSON con el índice completo
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct IndexDocument {
    #[serde(default)]
    entries: BTreeMap<String, RedirectIndexEntry>,
    #[serde(default)]
    modification_locks: Vec<ModificationLock>,
    #[serde(default)]
    next_lock_id: u64,
}

/// Huella del archivo en disco para detectar cambios hechos por otro proceso
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

impl FileStamp {
    fn of(metadata: &fs::Metadata) -> io::Result<Self> {
        Ok(Self {
            modified: metadata.modified()?,
            len: metadata.len(),
        })
    }
}

/// Lock advisory sobre el archivo `.lock` hermano; se suelta al salir de scope
struct FileLockGuard<'a>(&'a File);

impl<'a> FileLockGuard<'a> {
    fn shared(file: &'a File) -> io::Result<Self> {
        FileExt::lock_shared(file)?;
        Ok(Self(file))
    }

    fn exclusive(file: &'a File) -> io::Result<Self> {
        FileExt::lock_exclusive(file)?;
        Ok(Self(file))
    }
}

impl Drop for FileLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(self.0) {
            warn!("⚠️ No se pudo soltar el lock del índice: {}", e);
        }
    }
}

#[derive(Debug)]
struct LoadedDocument {
    document: IndexDocument,
    stamp: Option<FileStamp>,
}

/// Backend de persistencia basado en un archivo JSON.
///
/// Dentro del proceso las operaciones se serializan con un mutex interno;
/// entre procesos, con un lock advisory sobre `<índice>.lock` (compartido para
/// leer, exclusivo para recargar, modificar y persistir). Antes de cada
/// operación se compara la huella del archivo y se recarga si cambió, así un
/// lock de mantenimiento creado por otro proceso se ve en el siguiente
/// recuento. Las escrituras van a un archivo temporal que reemplaza al destino.
#[derive(Debug)]
pub struct JsonBackend {
    path: PathBuf,
    lock_file: File,
    state: Mutex<LoadedDocument>,
}

impl JsonBackend {
    /// Abre (o crea vacío) el índice en `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(PathBuf::from(lock_path))?;

        let backend = Self {
            path,
            lock_file,
            state: Mutex::new(LoadedDocument {
                document: IndexDocument::default(),
                stamp: None,
            }),
        };

        let entries = backend.read(|document| document.entries.len())?;
        info!(
            "📁 Índice de redirección inicializado en: {} ({} entradas)",
            backend.path.display(),
            entries
        );

        Ok(backend)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read<T>(&self, f: impl FnOnce(&IndexDocument) -> T) -> Result<T, StoreError> {
        let mut state = self.state.lock();
        let _file_lock = FileLockGuard::shared(&self.lock_file)?;
        self.reload_if_changed(&mut state)?;
        Ok(f(&state.document))
    }

    /// Aplica `f` y persiste; si `f` falla no se escribe nada
    fn write<T>(
        &self,
        f: impl FnOnce(&mut IndexDocument) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut state = self.state.lock();
        // Ningún otro proceso escribe entre la recarga y el reemplazo
        let _file_lock = FileLockGuard::exclusive(&self.lock_file)?;
        self.reload_if_changed(&mut state)?;

        let mut document = state.document.clone();
        let result = f(&mut document)?;

        let persisted = self.persist(&document)?;
        state.document = document;
        // Los datos ya están en disco: sin huella se fuerza una recarga en la próxima operación
        state.stamp = match persisted.metadata().and_then(|metadata| FileStamp::of(&metadata)) {
            Ok(stamp) => Some(stamp),
            Err(e) => {
                warn!("⚠️ No se pudo leer la huella del índice recién escrito: {}", e);
                None
            }
        };
        Ok(result)
    }

    fn reload_if_changed(&self, state: &mut LoadedDocument) -> Result<(), StoreError> {
        let stamp = self.stamp()?;
        if stamp == state.stamp {
            return Ok(());
        }

        state.document = match stamp {
            Some(_) => {
                let content = fs::read_to_string(&self.path)?;
                if content.trim().is_empty() {
                    IndexDocument::default()
                } else {
                    serde_json::from_str(&content)?
                }
            }
            None => IndexDocument::default(),
        };
        state.stamp = stamp;

        debug!("🔄 Índice recargado desde {}", self.path.display());
        Ok(())
    }

    fn stamp(&self) -> Result<Option<FileStamp>, StoreError> {
        match fs::metadata(&self.path) {
            Ok(metadata) => Ok(Some(FileStamp::of(&metadata)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Reemplaza el índice y devuelve el archivo ya en su ruta definitiva
    fn persist(&self, document: &IndexDocument) -> Result<File, StoreError> {
        let content = serde_json::to_string_pretty(document)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(content.as_bytes())?;
        file.as_file().sync_all()?;
        Ok(file.persist(&self.path).map_err(|e| e.error)?)
    }
}

impl IndexBackend for JsonBackend {
    fn find(&self, catalog_id: &str) -> Result<Option<RedirectIndexEntry>, StoreError> {
        self.read(|document| document.entries.get(catalog_id).cloned())
    }

    fn insert(&self, entry: RedirectIndexEntry) -> Result<(), StoreError> {
        self.write(|document| {
            if document.entries.contains_key(&entry.catalog_id) {
                return Err(StoreError::Duplicate(entry.catalog_id));
            }
            document.entries.insert(entry.catalog_id.clone(), entry);
            Ok(())
        })
    }

    fn update(&self, entry: RedirectIndexEntry) -> Result<(), StoreError> {
        self.write(|document| match document.entries.get_mut(&entry.catalog_id) {
            Some(current) => {
                *current = entry;
                Ok(())
            }
            None => Err(StoreError::NotFound(entry.catalog_id)),
        })
    }

    fn delete(&self, catalog_id: &str) -> Result<bool, StoreError> {
        // Evita reescribir el archivo si no hay nada que borrar
        if self.find(catalog_id)?.is_none() {
            return Ok(false);
        }
        self.write(|document| Ok(document.entries.remove(catalog_id).is_some()))
    }

    fn entries(&self) -> Result<Vec<RedirectIndexEntry>, StoreError> {
        self.read(|document| document.entries.values().cloned().collect())
    }

    fn count_modification_locks(&self) -> Result<u64, StoreError> {
        self.read(|document| document.modification_locks.len() as u64)
    }

    fn create_modification_lock(&self, reason: &str) -> Result<ModificationLock, StoreError> {
        self.write(|document| {
            document.next_lock_id += 1;
            let lock = ModificationLock {
                id: document.next_lock_id,
                reason: reason.to_string(),
                created_at: Utc::now(),
            };
            document.modification_locks.push(lock.clone());
            Ok(lock)
        })
    }

    fn release_modification_lock(&self, id: u64) -> Result<bool, StoreError> {
        self.write(|document| {
            let before = document.modification_locks.len();
            document.modification_locks.retain(|lock| lock.id != id);
            Ok(document.modification_locks.len() != before)
        })
    }

    fn modification_locks(&self) -> Result<Vec<ModificationLock>, StoreError> {
        self.read(|document| document.modification_locks.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::CatalogKind;
    use pretty_assertions::assert_eq;
    use std::{
        sync::{Arc, Barrier},
        thread,
    };

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redirect_index.json");

        {
            let backend = JsonBackend::open(&path).unwrap();
            backend
                .insert(RedirectIndexEntry::new("trk_1", "yt_A", CatalogKind::Track))
                .unwrap();
            backend
                .insert(RedirectIndexEntry::new("ep_9", "yt_B", CatalogKind::Episode))
                .unwrap();
            assert!(backend.delete("ep_9").unwrap());
        }

        let reopened = JsonBackend::open(&path).unwrap();
        let entry = reopened.find("trk_1").unwrap().unwrap();
        assert_eq!(entry.resource_id, "yt_A");
        assert_eq!(entry.kind, CatalogKind::Track);
        assert!(reopened.find("ep_9").unwrap().is_none());
    }

    #[test]
    fn test_lock_from_other_instance_is_seen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redirect_index.json");

        let engine = JsonBackend::open(&path).unwrap();
        engine
            .insert(RedirectIndexEntry::new("trk_1", "yt_A", CatalogKind::Track))
            .unwrap();
        assert_eq!(engine.count_modification_locks().unwrap(), 0);

        // Otro proceso de mantenimiento abre el mismo archivo
        let maintenance = JsonBackend::open(&path).unwrap();
        let lock = maintenance.create_modification_lock("refresh").unwrap();

        assert_eq!(engine.count_modification_locks().unwrap(), 1);

        maintenance.release_modification_lock(lock.id).unwrap();
        assert_eq!(engine.count_modification_locks().unwrap(), 0);
        assert!(engine.find("trk_1").unwrap().is_some());
    }

    #[test]
    fn test_overlapping_writers_keep_each_others_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redirect_index.json");
        let engine = Arc::new(JsonBackend::open(&path).unwrap());
        let maintenance = Arc::new(JsonBackend::open(&path).unwrap());
        let start = Arc::new(Barrier::new(2));

        let writer = {
            let engine = Arc::clone(&engine);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for i in 0..20 {
                    engine
                        .insert(RedirectIndexEntry::new(format!("trk_{i}"), "yt_A", CatalogKind::Track))
                        .unwrap();
                }
            })
        };

        start.wait();
        maintenance.create_modification_lock("refresh").unwrap();
        writer.join().unwrap();

        // El motor ve el lock aunque lo creó otra instancia a mitad de sus escrituras
        assert_eq!(engine.count_modification_locks().unwrap(), 1);

        let reopened = JsonBackend::open(&path).unwrap();
        assert_eq!(reopened.count_modification_locks().unwrap(), 1);
        assert_eq!(reopened.entries().unwrap().len(), 20);
    }

    #[test]
    fn test_failed_write_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redirect_index.json");
        let backend = JsonBackend::open(&path).unwrap();

        let err = backend
            .update(RedirectIndexEntry::new("trk_1", "yt_A", CatalogKind::Track))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!path.exists());
    }
}
