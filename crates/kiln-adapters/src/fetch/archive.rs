use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use flate2::read::GzDecoder;
use tracing::{debug, instrument, warn};

use kiln_core::{domain::SourceDescriptor, error::KilnResult};

use super::unavailable;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Downloads a `.tar.gz` over HTTP(S) and unpacks it.
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: reqwest::blocking::Client,
}

impl ArchiveFetcher {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("kiln/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self { client }
    }

    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    pub fn download_into(&self, url: &str, dest: &Path) -> KilnResult<()> {
        let source = SourceDescriptor::Archive {
            url: url.to_string(),
        };
        let bytes = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes())
            .map_err(|e| unavailable(&source, e))?;
        debug!(bytes = bytes.len(), "Downloaded archive");

        unpack_tar_gz(&bytes, dest).map_err(|e| unavailable(&source, e))
    }
}

impl Default for ArchiveFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Unpack a gzipped tarball into `dest`.
///
/// Entries that would land outside `dest` (absolute paths, `..`) are
/// skipped.
pub fn unpack_tar_gz(bytes: &[u8], dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(bytes)));
    archive.set_preserve_permissions(true);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.unpack_in(dest)? {
            warn!(path = %entry.path()?.display(), "Skipped archive entry outside the destination");
        }
    }
    Ok(())
}
