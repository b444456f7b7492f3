use anyhow::Result;
use tracing::{error, info};

use open_music_redirect::{
    config::Config,
    index::{json::JsonBackend, IndexBackend},
    telemetry,
};

const USAGE: &str = "Uso: open-music-redirect <stats|list|locks|lock <motivo>|unlock <id>|--health-check>";

fn main() -> Result<()> {
    // Cargar configuración
    let config = Config::load()?;
    telemetry::init_tracing(&config)?;

    info!("🎵 Open Music Redirect v{}", env!("CARGO_PKG_VERSION"));

    let args: Vec<String> = std::env::args().skip(1).collect();

    // Manejar health check si es necesario
    if args.iter().any(|arg| arg == "--health-check") {
        return health_check(&config);
    }

    let backend = JsonBackend::open(config.index_path())?;

    match args.first().map(String::as_str) {
        Some("stats") => stats(&config, &backend),
        Some("list") => list(&backend),
        Some("locks") => locks(&backend),
        Some("lock") => {
            let reason = args[1..].join(" ");
            if reason.is_empty() {
                anyhow::bail!("{}", USAGE);
            }
            let lock = backend.create_modification_lock(&reason)?;
            println!("🔒 Lock #{} creado: {}", lock.id, lock.reason);
            Ok(())
        }
        Some("unlock") => {
            let id: u64 = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("{}", USAGE))?
                .parse()?;
            if backend.release_modification_lock(id)? {
                println!("🔓 Lock #{} liberado", id);
            } else {
                println!("⚠️ No existe el lock #{}", id);
            }
            Ok(())
        }
        _ => {
            error!("Comando no reconocido: {:?}", args);
            anyhow::bail!("{}", USAGE)
        }
    }
}

fn stats(config: &Config, backend: &dyn IndexBackend) -> Result<()> {
    let entries = backend.entries()?;
    let tracks = entries
        .iter()
        .filter(|entry| entry.kind == open_music_redirect::CatalogKind::Track)
        .count();
    let oldest = entries.iter().map(|entry| entry.last_used).min();

    println!("{}", config.summary());
    println!(
        "📊 Redirect Index Stats:\n\
         📝 Entradas: {} ({} tracks, {} episodios)\n\
         📅 Uso más antiguo: {}\n\
         🔒 Locks activos: {}",
        entries.len(),
        tracks,
        entries.len() - tracks,
        oldest.map_or("-".to_string(), |date| date.to_string()),
        backend.count_modification_locks()?
    );
    Ok(())
}

fn list(backend: &dyn IndexBackend) -> Result<()> {
    for entry in backend.entries()? {
        println!(
            "{}\t{}\t{}\t{}",
            entry.catalog_id, entry.resource_id, entry.kind, entry.last_used
        );
    }
    Ok(())
}

fn locks(backend: &dyn IndexBackend) -> Result<()> {
    for lock in backend.modification_locks()? {
        println!("#{}\t{}\t{}", lock.id, lock.created_at.to_rfc3339(), lock.reason);
    }
    Ok(())
}

fn health_check(config: &Config) -> Result<()> {
    // Verificar que el índice se puede abrir y leer
    let backend = JsonBackend::open(config.index_path())?;
    backend.count_modification_locks()?;
    println!("OK");
    Ok(())
}
