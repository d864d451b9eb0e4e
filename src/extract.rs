//! Extraction of single-entry archives.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::progress::{DownloadProgress, ProxyReader, trim_label};

const COPY_CHUNK: usize = 64 * 1024;

/// Extracts the only entry of `archive` into `dest`, then deletes `archive`.
///
/// Runs on the blocking pool. The copy checks `token` between chunks; on
/// cancellation or failure the half-written output is removed and the
/// archive is kept, so the extraction can be retried later.
///
/// Returns the path of the extracted file.
///
/// # Errors
///
/// Returns [`Error::UnexpectedArchiveShape`] unless the archive has exactly
/// one file entry, [`Error::Cancelled`] if `token` fires mid-copy, or an
/// archive / file system error.
pub async fn extract(
    archive: &Path,
    dest: &Path,
    title: &str,
    progress: &Arc<dyn DownloadProgress>,
    token: &CancellationToken,
) -> Result<PathBuf> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    let label = trim_label(&format!("{title} (unzip)"));
    let progress = Arc::clone(progress);
    let token = token.clone();

    tokio::task::spawn_blocking(move || extract_blocking(&archive, &dest, &label, &progress, &token))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(format!("extract task failed: {e}"))))?
}

fn extract_blocking(
    archive_path: &Path,
    dest: &Path,
    label: &str,
    progress: &Arc<dyn DownloadProgress>,
    token: &CancellationToken,
) -> Result<PathBuf> {
    let mut archive = ZipArchive::new(BufReader::new(File::open(archive_path)?))?;
    if archive.len() != 1 {
        return Err(Error::UnexpectedArchiveShape {
            count: archive.len(),
        });
    }

    let entry = archive.by_index(0)?;
    if entry.is_dir() {
        return Err(Error::UnexpectedArchiveShape { count: 0 });
    }
    let relative = entry.enclosed_name().ok_or_else(|| Error::UnsafeEntryName {
        name: entry.name().to_string(),
    })?;
    let out_path = dest.join(relative);
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(entry.unix_mode().map_or(0o644, |m| m & 0o7777));
    }
    let mut out = options.open(&out_path)?;

    let size = entry.size();
    let bar = progress.new_bar(label, size);
    let mut reader = ProxyReader::new(entry, Arc::clone(&bar));

    let copied = copy_cancellable(&mut reader, &mut out, token).and_then(|n| {
        out.sync_all()?;
        Ok(n)
    });
    drop(out);
    if let Err(e) = copied {
        bar.abandon();
        let _ = std::fs::remove_file(&out_path);
        return Err(e);
    }
    bar.set_total(size, true);

    drop(reader);
    drop(archive);
    std::fs::remove_file(archive_path)?;
    log::info!("Extracted {} to {}", archive_path.display(), out_path.display());
    Ok(out_path)
}

/// Copies `reader` into `writer` in fixed chunks, stopping if `token` fires.
fn copy_cancellable<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    token: &CancellationToken,
) -> Result<u64> {
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut total = 0u64;
    loop {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    writer.flush()?;
    Ok(total)
}
