//! Resumable archive transfer.
//!
//! Bytes land in `<title>.part` and only a completed transfer is renamed to
//! the archive path, so at rest a title has at most one of the two files.
//! An interrupted transfer keeps its `.part` file and the next attempt asks
//! the server for the remainder with a `Range` header.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, HeaderMap, RANGE};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::catalog::Item;
use crate::error::{Error, Result};
use crate::paths::DownloadPaths;
use crate::progress::{Bar, DownloadProgress, trim_label};
use crate::stats::FileStats;

/// Result of a successful [`Fetcher::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// The archive was already on disk; nothing was transferred.
    AlreadyPresent,
    /// The archive was transferred (possibly resuming) and renamed into place.
    Downloaded(FileStats),
}

/// Parses the first byte position out of a `Content-Range: bytes a-b/n` header.
fn content_range_start(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let range = value.trim().strip_prefix("bytes")?.trim_start();
    let (start, _) = range.split_once('-')?;
    start.trim().parse().ok()
}

/// Current length of the `.part` file, 0 if there is none.
async fn partial_len(path: &Path) -> Result<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Streams archives from the server into the download directory.
#[derive(Debug, Clone)]
pub struct Fetcher {
    http: reqwest::Client,
    paths: DownloadPaths,
    timeout: Duration,
}

impl Fetcher {
    /// Creates a fetcher. `timeout` bounds the wait for response headers.
    #[must_use]
    pub const fn new(http: reqwest::Client, paths: DownloadPaths, timeout: Duration) -> Self {
        Self {
            http,
            paths,
            timeout,
        }
    }

    /// Path helpers for the download directory.
    #[must_use]
    pub const fn paths(&self) -> &DownloadPaths {
        &self.paths
    }

    /// Downloads `item` to its archive path, resuming any `.part` file.
    ///
    /// On failure or cancellation the `.part` file is left in place with
    /// whatever was written, so a later call continues from there.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, an unexpected HTTP status, a
    /// misaligned partial response, a file system failure, or cancellation.
    pub async fn fetch(
        &self,
        item: &Item,
        progress: &Arc<dyn DownloadProgress>,
        token: &CancellationToken,
    ) -> Result<Fetched> {
        self.paths.ensure_dir().await?;

        let archive = self.paths.archive_path(&item.title);
        if tokio::fs::try_exists(&archive).await? {
            log::debug!("Archive already present: {}", archive.display());
            return Ok(Fetched::AlreadyPresent);
        }

        let partial = self.paths.partial_path(&item.title);
        let mut offset = partial_len(&partial).await?;
        if offset > 0 {
            log::info!("Resuming {} at {offset} bytes", item.title);
            progress.on_resume(item, offset);
        }

        let started = Instant::now();
        let mut response = self.send(&item.url, offset, token).await?;
        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE && offset > 0 {
            log::warn!(
                "Server rejected resume of {} at {offset} bytes; discarding {}",
                item.title,
                partial.display()
            );
            tokio::fs::remove_file(&partial).await?;
            offset = 0;
            response = self.send(&item.url, offset, token).await?;
        }
        let mut restart = false;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                if let Some(got) = content_range_start(response.headers())
                    && got != offset
                {
                    return Err(Error::RangeNotHonored {
                        requested: offset,
                        got,
                    });
                }
            }
            StatusCode::OK => {
                if offset > 0 {
                    log::warn!(
                        "Server ignored range request for {}; restarting from 0",
                        item.title
                    );
                    restart = true;
                }
            }
            status => {
                return Err(Error::HttpStatus {
                    status: status.as_u16(),
                    url: item.url.clone(),
                });
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&partial)
            .await?;
        if restart {
            file.set_len(0).await?;
            offset = 0;
        }

        let body_len = response.content_length();
        let bar = progress.new_bar(&trim_label(&item.title), body_len.map_or(0, |n| n + offset));
        bar.inc(offset);

        let copied = copy_body(response, &mut file, &bar, token).await;
        let transferred = match copied {
            Ok(n) => n,
            Err(e) => {
                bar.abandon();
                if let Err(flush) = file.flush().await {
                    log::debug!("Flushing {} after error: {flush}", partial.display());
                }
                return Err(e);
            }
        };
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(expected) = body_len
            && transferred < expected
        {
            bar.abandon();
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("body ended after {transferred} of {expected} bytes"),
            )));
        }

        let size = offset + transferred;
        bar.set_total(size, true);

        tokio::fs::rename(&partial, &archive)
            .await
            .map_err(|source| Error::Rename {
                from: partial.clone(),
                to: archive.clone(),
                source,
            })?;

        Ok(Fetched::Downloaded(FileStats {
            size,
            transferred,
            resumed_from: offset,
            elapsed: started.elapsed(),
        }))
    }

    /// Issues the GET, with a `Range` header when resuming.
    async fn send(
        &self,
        url: &str,
        offset: u64,
        token: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let mut request = self.http.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        tokio::select! {
            biased;
            () = token.cancelled() => Err(Error::Cancelled),
            sent = tokio::time::timeout(self.timeout, request.send()) => match sent {
                Ok(response) => Ok(response?),
                Err(_) => Err(Error::Timeout { url: url.to_string() }),
            },
        }
    }
}

/// Streams the response body into `file`, checking `token` between chunks.
async fn copy_body(
    response: reqwest::Response,
    file: &mut File,
    bar: &Arc<dyn Bar>,
    token: &CancellationToken,
) -> Result<u64> {
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    loop {
        let chunk = tokio::select! {
            biased;
            () = token.cancelled() => return Err(Error::Cancelled),
            next = stream.next() => match next {
                Some(chunk) => chunk?,
                None => break,
            },
        };
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        bar.inc(chunk.len() as u64);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::progress::testing::RecordingProgress;
    use reqwest::header::HeaderValue;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn headers(value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(CONTENT_RANGE, HeaderValue::from_str(value).unwrap());
        map
    }

    #[test]
    fn content_range_start_parses() {
        assert_eq!(content_range_start(&headers("bytes 40-99/100")), Some(40));
        assert_eq!(content_range_start(&headers("bytes 0-0/*")), Some(0));
        assert_eq!(content_range_start(&headers("items 1-2/3")), None);
        assert_eq!(content_range_start(&HeaderMap::new()), None);
    }

    fn fetcher(dir: &TempDir) -> Fetcher {
        Fetcher::new(
            reqwest::Client::new(),
            DownloadPaths::new(dir.path().join("dl")),
            Duration::from_secs(5),
        )
    }

    fn body() -> Vec<u8> {
        (0..100u8).collect()
    }

    #[tokio::test]
    async fn fresh_fetch_renames_part_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = fetcher(&dir);
        let item = Item::new("Game A", "100 B", format!("{}/a.zip", server.uri()));
        let progress: Arc<dyn DownloadProgress> = Arc::new(NoProgress);

        let fetched = fetcher
            .fetch(&item, &progress, &CancellationToken::new())
            .await
            .unwrap();

        let Fetched::Downloaded(stats) = fetched else {
            panic!("expected a transfer");
        };
        assert_eq!(stats.size, 100);
        assert_eq!(stats.resumed_from, 0);
        let paths = fetcher.paths();
        assert_eq!(std::fs::read(paths.archive_path("Game A")).unwrap(), body());
        assert!(!paths.partial_path("Game A").exists());
    }

    #[tokio::test]
    async fn resumes_with_range_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/b.zip"))
            .and(header("Range", "bytes=40-"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", "bytes 40-99/100")
                    .set_body_bytes(body()[40..].to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = fetcher(&dir);
        let paths = fetcher.paths().clone();
        std::fs::create_dir_all(paths.download_dir()).unwrap();
        std::fs::write(paths.partial_path("Game B"), &body()[..40]).unwrap();

        let item = Item::new("Game B", "100 B", format!("{}/b.zip", server.uri()));
        let recorder = Arc::new(RecordingProgress::default());
        let progress: Arc<dyn DownloadProgress> = recorder.clone();

        let fetched = fetcher
            .fetch(&item, &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            fetched,
            Fetched::Downloaded(FileStats { size: 100, transferred: 60, resumed_from: 40, .. })
        ));
        assert_eq!(std::fs::read(paths.archive_path("Game B")).unwrap(), body());
        assert_eq!(recorder.events(), vec!["resume Game B at 40".to_string()]);

        let bars = recorder.bars.lock().unwrap();
        assert_eq!(bars[0].1, 100);
        assert_eq!(*bars[0].2.total.lock().unwrap(), Some((100, true)));
    }

    #[tokio::test]
    async fn ignored_range_truncates_and_restarts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/c.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = fetcher(&dir);
        let paths = fetcher.paths().clone();
        std::fs::create_dir_all(paths.download_dir()).unwrap();
        std::fs::write(paths.partial_path("Game C"), vec![0xAA; 50]).unwrap();

        let item = Item::new("Game C", "100 B", format!("{}/c.zip", server.uri()));
        let progress: Arc<dyn DownloadProgress> = Arc::new(NoProgress);
        fetcher
            .fetch(&item, &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read(paths.archive_path("Game C")).unwrap(), body());
    }

    #[tokio::test]
    async fn misaligned_partial_response_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/m.zip"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", "bytes 0-99/100")
                    .set_body_bytes(body()),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = fetcher(&dir);
        let paths = fetcher.paths().clone();
        std::fs::create_dir_all(paths.download_dir()).unwrap();
        std::fs::write(paths.partial_path("Game M"), &body()[..10]).unwrap();

        let item = Item::new("Game M", "100 B", format!("{}/m.zip", server.uri()));
        let progress: Arc<dyn DownloadProgress> = Arc::new(NoProgress);
        let err = fetcher
            .fetch(&item, &progress, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RangeNotHonored { requested: 10, got: 0 }));
        assert_eq!(std::fs::read(paths.partial_path("Game M")).unwrap(), &body()[..10]);
    }

    #[tokio::test]
    async fn error_status_keeps_partial() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = fetcher(&dir);
        let paths = fetcher.paths().clone();
        std::fs::create_dir_all(paths.download_dir()).unwrap();
        std::fs::write(paths.partial_path("Game E"), b"abc").unwrap();

        let item = Item::new("Game E", "", format!("{}/e.zip", server.uri()));
        let progress: Arc<dyn DownloadProgress> = Arc::new(NoProgress);
        let err = fetcher
            .fetch(&item, &progress, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::HttpStatus { status: 404, .. }));
        assert_eq!(std::fs::read(paths.partial_path("Game E")).unwrap(), b"abc");
        assert!(!paths.archive_path("Game E").exists());
    }

    #[tokio::test]
    async fn existing_archive_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = fetcher(&dir);
        let paths = fetcher.paths().clone();
        std::fs::create_dir_all(paths.download_dir()).unwrap();
        std::fs::write(paths.archive_path("Game F"), b"zip").unwrap();

        let item = Item::new("Game F", "", format!("{}/f.zip", server.uri()));
        let progress: Arc<dyn DownloadProgress> = Arc::new(NoProgress);
        let fetched = fetcher
            .fetch(&item, &progress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fetched, Fetched::AlreadyPresent);
    }

    #[tokio::test]
    async fn cancelled_before_request_keeps_partial() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = fetcher(&dir);
        let paths = fetcher.paths().clone();
        std::fs::create_dir_all(paths.download_dir()).unwrap();
        std::fs::write(paths.partial_path("Game G"), &body()[..20]).unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let item = Item::new("Game G", "", format!("{}/g.zip", server.uri()));
        let progress: Arc<dyn DownloadProgress> = Arc::new(NoProgress);
        let err = fetcher.fetch(&item, &progress, &token).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(std::fs::read(paths.partial_path("Game G")).unwrap(), &body()[..20]);
        assert!(!paths.archive_path("Game G").exists());
    }

    /// Serves `Content-Length: 100` with only the first 40 bytes of
    /// [`body`], then stalls (`close == false`) or hangs up.
    async fn short_body_server(close: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n")
                .await
                .unwrap();
            socket.write_all(&body()[..40]).await.unwrap();
            socket.flush().await.unwrap();
            if !close {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
        });
        format!("http://{addr}/h.zip")
    }

    async fn resume_from_40(fetcher: &Fetcher, title: &str) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("Range", "bytes=40-"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", "bytes 40-99/100")
                    .set_body_bytes(body()[40..].to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let item = Item::new(title, "100 B", format!("{}/h.zip", server.uri()));
        let progress: Arc<dyn DownloadProgress> = Arc::new(NoProgress);
        fetcher
            .fetch(&item, &progress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(std::fs::read(fetcher.paths().archive_path(title)).unwrap(), body());
        assert!(!fetcher.paths().partial_path(title).exists());
    }

    #[tokio::test]
    async fn cancel_during_body_keeps_written_bytes() {
        let dir = TempDir::new().unwrap();
        let fetcher = fetcher(&dir);
        let item = Item::new("Game H", "100 B", short_body_server(false).await);
        let progress: Arc<dyn DownloadProgress> = Arc::new(NoProgress);

        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            cancel.cancel();
        });

        let err = fetcher.fetch(&item, &progress, &token).await.unwrap_err();

        assert!(err.is_cancelled());
        let paths = fetcher.paths();
        assert_eq!(std::fs::read(paths.partial_path("Game H")).unwrap(), &body()[..40]);
        assert!(!paths.archive_path("Game H").exists());

        resume_from_40(&fetcher, "Game H").await;
    }

    #[tokio::test]
    async fn truncated_body_keeps_written_bytes() {
        let dir = TempDir::new().unwrap();
        let fetcher = fetcher(&dir);
        let item = Item::new("Game I", "100 B", short_body_server(true).await);
        let progress: Arc<dyn DownloadProgress> = Arc::new(NoProgress);

        let err = fetcher
            .fetch(&item, &progress, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(!err.is_cancelled());
        let paths = fetcher.paths();
        assert_eq!(std::fs::read(paths.partial_path("Game I")).unwrap(), &body()[..40]);
        assert!(!paths.archive_path("Game I").exists());

        resume_from_40(&fetcher, "Game I").await;
    }

    #[tokio::test]
    async fn unsatisfiable_range_discards_partial_and_restarts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/j.zip"))
            .and(header_exists("Range"))
            .respond_with(ResponseTemplate::new(416))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/j.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = fetcher(&dir);
        let paths = fetcher.paths().clone();
        std::fs::create_dir_all(paths.download_dir()).unwrap();
        // A full-length `.part` left by a crash before the rename.
        std::fs::write(paths.partial_path("Game J"), body()).unwrap();

        let item = Item::new("Game J", "100 B", format!("{}/j.zip", server.uri()));
        let progress: Arc<dyn DownloadProgress> = Arc::new(NoProgress);
        let fetched = fetcher
            .fetch(&item, &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            fetched,
            Fetched::Downloaded(FileStats { size: 100, resumed_from: 0, .. })
        ));
        assert_eq!(std::fs::read(paths.archive_path("Game J")).unwrap(), body());
        assert!(!paths.partial_path("Game J").exists());
    }
}
