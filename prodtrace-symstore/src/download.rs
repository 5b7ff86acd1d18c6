//! Downloads from remote symbol servers.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use tempfile::NamedTempFile;

use crate::error::{SymbolError, SymbolErrorKind};

const USER_AGENT: &str = concat!("prodtrace/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client(timeout: Duration) -> Result<Client, SymbolError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| SymbolError::new(SymbolErrorKind::Download, e))
}

/// Downloads `<url>/<relative>` to `dest`.
///
/// Returns `false` if the server does not have the file. Transport errors and error statuses are
/// reported as [`SymbolErrorKind::Download`], failures to store the file as
/// [`SymbolErrorKind::Io`].
#[tracing::instrument(level = "debug", name = "download", skip(client, dest))]
pub(crate) fn download(
    client: &Client,
    url: &str,
    relative: &str,
    dest: &Path,
) -> Result<bool, SymbolError> {
    let url = format!("{}/{relative}", url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .send()
        .map_err(|e| SymbolError::new(SymbolErrorKind::Download, e))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        tracing::trace!("not found on symbol server");
        return Ok(false);
    }

    let response = response
        .error_for_status()
        .map_err(|e| SymbolError::new(SymbolErrorKind::Download, e))?;
    let bytes = response
        .bytes()
        .map_err(|e| SymbolError::new(SymbolErrorKind::Download, e))?;

    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    // Partial files must never appear under the final name.
    let mut partial = NamedTempFile::new_in(parent)?;
    partial.write_all(&bytes)?;
    partial.persist(dest).map_err(|e| e.error)?;

    tracing::debug!(size = bytes.len(), dest = %dest.display(), "downloaded debug file");
    Ok(true)
}
