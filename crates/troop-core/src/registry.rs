//! Maps a configured backend identifier to a constructed backend.
//!
//! The set of backends is closed. An identifier that names none of them is
//! a configuration error raised before anything is constructed.

use crate::backend::{Backend, BackendKind, EmbeddedBackend, NetworkBackend, ProcessBackend};
use crate::config::Config;
use crate::error::Result;

/// Resolve `identifier` and construct the matching backend.
pub fn resolve(identifier: &str, config: &Config) -> Result<Backend> {
    let kind: BackendKind = identifier.parse()?;
    construct(kind, config)
}

/// Construct the backend for `kind`.
///
/// The network backend takes its credential from `config.network`.
pub fn construct(kind: BackendKind, config: &Config) -> Result<Backend> {
    log::info!("Starting {} backend ({})", kind, kind.description());

    let backend = match kind {
        BackendKind::Embedded => Backend::Embedded(EmbeddedBackend::new(&config.embedded)?),
        BackendKind::Network => Backend::Network(NetworkBackend::connect(
            &config.network,
            config.network.credential.as_deref(),
        )?),
        BackendKind::Process => Backend::Process(ProcessBackend::spawn(&config.process)?),
    };
    Ok(backend)
}

/// Every backend identifier with its description.
pub fn available() -> Vec<(BackendKind, &'static str)> {
    BackendKind::ALL
        .iter()
        .map(|kind| (*kind, kind.description()))
        .collect()
}
