use anyhow::Result;

use crate::config::Config;

/// Inicializa logging: `RUST_LOG` manda y se añade el nivel por defecto del crate
pub fn init_tracing(config: &Config) -> Result<()> {
    let directive = format!("open_music_redirect={}", config.log_level.to_ascii_lowercase());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .with_thread_names(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("No se pudo inicializar el logging: {}", e))?;

    Ok(())
}
