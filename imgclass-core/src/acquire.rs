//! Dataset acquisition: download an image-set archive and unpack it.
//!
//! The download goes through the [`DatasetFetcher`] trait so the pipeline
//! can run against a local fake in tests.

use crate::error::{ClassifyError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Fetches a remote archive into a local directory.
#[async_trait]
pub trait DatasetFetcher: Send + Sync {
    /// Download `url` to `dest_dir/file_name` and return the local path.
    async fn fetch(&self, url: &str, dest_dir: &Path, file_name: &str) -> Result<PathBuf>;
}

/// HTTP(S) fetcher backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DatasetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path, file_name: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| local_failure("create", dest_dir, e))?;
        let target = dest_dir.join(file_name);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ClassifyError::acquisition(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClassifyError::acquisition(format!(
                "download of {file_name} returned HTTP {status}"
            )));
        }

        // Write to a partial file so an interrupted download is never mistaken
        // for a complete archive.
        let partial = dest_dir.join(format!("{file_name}.part"));
        let written = match write_body(response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(local_failure("rename", &partial, e));
        }

        tracing::info!(file = file_name, bytes = written, "Downloaded archive");
        Ok(target)
    }
}

/// Stream the response body into `partial`, returning the byte count.
async fn write_body(response: reqwest::Response, partial: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(partial)
        .await
        .map_err(|e| local_failure("create", partial, e))?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| ClassifyError::acquisition(format!("download interrupted: {e}")))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| local_failure("write", partial, e))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| local_failure("write", partial, e))?;
    Ok(written)
}

fn local_failure(action: &str, path: &Path, err: std::io::Error) -> ClassifyError {
    ClassifyError::acquisition(format!("cannot {action} {}: {err}", path.display()))
}

/// Extract every file of the zip at `archive` into `dest_dir`.
///
/// Entries whose names would resolve outside `dest_dir` are refused. Returns
/// the number of files written. A failure can leave a partial tree behind;
/// [`ensure_dataset`] extracts into a staging directory for that reason.
pub fn extract_zip(archive: &Path, dest_dir: &Path) -> Result<usize> {
    let file = File::open(archive).map_err(|e| local_failure("open", archive, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| {
        ClassifyError::acquisition(format!("invalid zip archive {}: {e}", archive.display()))
    })?;

    let mut extracted = 0;
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| ClassifyError::acquisition(format!("corrupt entry #{i}: {e}")))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(ClassifyError::acquisition(format!(
                "entry '{}' escapes the extraction directory",
                entry.name()
            )));
        };
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| local_failure("create", &out_path, e))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| local_failure("create", parent, e))?;
        }
        let mut out = File::create(&out_path).map_err(|e| local_failure("create", &out_path, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| {
            ClassifyError::acquisition(format!("failed to extract {}: {e}", out_path.display()))
        })?;
        extracted += 1;
    }

    tracing::info!(
        archive = %archive.display(),
        files = extracted,
        "Extracted archive"
    );
    Ok(extracted)
}

/// Where an image set comes from.
#[derive(Debug, Clone)]
pub struct DatasetSource<'a> {
    pub url: &'a str,
    pub archive_name: &'a str,
    /// Folder the archive unpacks to, relative to the images directory.
    pub folder_name: &'a str,
}

/// Make sure the image set is present under `images_dir`, downloading and
/// unpacking it when it is not. Returns the image-set folder.
///
/// The archive is unpacked into `.<folder>.extracting` and only the image-set
/// folder is moved into place, so `<folder>` exists only after a complete
/// extraction. An archive that fails to extract is deleted so the next run
/// downloads it again.
pub async fn ensure_dataset(
    fetcher: &dyn DatasetFetcher,
    source: &DatasetSource<'_>,
    images_dir: &Path,
) -> Result<PathBuf> {
    let folder = images_dir.join(source.folder_name);
    if folder.is_dir() {
        tracing::info!(folder = %folder.display(), "Image set already present, skipping download");
        return Ok(folder);
    }

    let archive = images_dir.join(source.archive_name);
    let archive = if archive.is_file() {
        tracing::info!(archive = %archive.display(), "Reusing downloaded archive");
        archive
    } else {
        tracing::info!(url = source.url, "Downloading image set");
        fetcher
            .fetch(source.url, images_dir, source.archive_name)
            .await?
    };

    let staging = images_dir.join(format!(".{}.extracting", source.folder_name));
    remove_staging(&staging)?;
    let unpacked = extract_zip(&archive, &staging).and_then(|_| {
        let extracted = staging.join(source.folder_name);
        if !extracted.is_dir() {
            return Err(ClassifyError::acquisition(format!(
                "archive {} did not contain folder '{}'",
                archive.display(),
                source.folder_name
            )));
        }
        std::fs::rename(&extracted, &folder).map_err(|e| local_failure("move", &extracted, e))
    });
    let cleanup = remove_staging(&staging);

    if let Err(e) = unpacked {
        tracing::warn!(archive = %archive.display(), "Extraction failed, discarding archive");
        let _ = std::fs::remove_file(&archive);
        return Err(e);
    }
    cleanup?;
    Ok(folder)
}

fn remove_staging(staging: &Path) -> Result<()> {
    if staging.exists() {
        std::fs::remove_dir_all(staging).map_err(|e| local_failure("remove", staging, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use zip::CompressionMethod;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    /// Serves a pre-built archive from disk and counts calls.
    struct LocalFetcher {
        archive: PathBuf,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DatasetFetcher for LocalFetcher {
        async fn fetch(&self, _url: &str, dest_dir: &Path, file_name: &str) -> Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::create_dir_all(dest_dir)?;
            let target = dest_dir.join(file_name);
            std::fs::copy(&self.archive, &target)?;
            Ok(target)
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl DatasetFetcher for FailingFetcher {
        async fn fetch(&self, url: &str, _dest: &Path, _name: &str) -> Result<PathBuf> {
            Err(ClassifyError::acquisition(format!("unreachable: {url}")))
        }
    }

    #[test]
    fn test_extract_zip_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("set.zip");
        write_zip(
            &archive,
            &[("set/rose/a.jpg", b"a"), ("set/tulip/b.jpg", b"bb")],
        );
        let out = dir.path().join("out");
        let count = extract_zip(&archive, &out).unwrap();
        assert_eq!(count, 2);
        assert_eq!(std::fs::read(out.join("set/tulip/b.jpg")).unwrap(), b"bb");
    }

    #[test]
    fn test_extract_zip_refuses_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("../escape.jpg", b"x")]);
        let err = extract_zip(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, ClassifyError::DataAcquisition(_)));
        assert!(!dir.path().join("escape.jpg").exists());
    }

    #[test]
    fn test_extract_invalid_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"not a zip").unwrap();
        let err = extract_zip(&archive, dir.path()).unwrap_err();
        assert!(matches!(err, ClassifyError::DataAcquisition(_)));
    }

    #[tokio::test]
    async fn test_ensure_dataset_downloads_once() {
        let dir = tempfile::tempdir().unwrap();
        let prebuilt = dir.path().join("prebuilt.zip");
        write_zip(&prebuilt, &[("flowers/rose/a.jpg", b"a")]);
        let fetcher = LocalFetcher {
            archive: prebuilt,
            calls: AtomicUsize::new(0),
        };
        let images = dir.path().join("images");
        let source = DatasetSource {
            url: "https://example.invalid/flowers.zip",
            archive_name: "flowers.zip",
            folder_name: "flowers",
        };

        let folder = ensure_dataset(&fetcher, &source, &images).await.unwrap();
        assert_eq!(folder, images.join("flowers"));
        assert!(folder.join("rose/a.jpg").is_file());

        ensure_dataset(&fetcher, &source, &images).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ensure_dataset_propagates_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let source = DatasetSource {
            url: "https://example.invalid/flowers.zip",
            archive_name: "flowers.zip",
            folder_name: "flowers",
        };
        let err = ensure_dataset(&FailingFetcher, &source, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::DataAcquisition(_)));
    }

    #[tokio::test]
    async fn test_ensure_dataset_requires_expected_folder() {
        let dir = tempfile::tempdir().unwrap();
        let prebuilt = dir.path().join("prebuilt.zip");
        write_zip(&prebuilt, &[("other/a.jpg", b"a")]);
        let fetcher = LocalFetcher {
            archive: prebuilt,
            calls: AtomicUsize::new(0),
        };
        let source = DatasetSource {
            url: "https://example.invalid/flowers.zip",
            archive_name: "flowers.zip",
            folder_name: "flowers",
        };
        let err = ensure_dataset(&fetcher, &source, &dir.path().join("images"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::DataAcquisition(_)));
    }

    /// Archive whose second entry fails its CRC check on extraction.
    fn write_corrupt_zip(path: &Path) {
        let stored = || SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("flowers/rose/a.jpg", stored()).unwrap();
            zip.write_all(b"aaaa").unwrap();
            zip.start_file("flowers/tulip/b.jpg", stored()).unwrap();
            zip.write_all(b"BBBBBBBB").unwrap();
            zip.finish().unwrap();
        }
        let at = buf.windows(8).position(|w| w == b"BBBBBBBB").unwrap();
        buf[at] = b'X';
        std::fs::write(path, buf).unwrap();
    }

    #[tokio::test]
    async fn test_failed_extraction_leaves_no_dataset_folder() {
        let dir = tempfile::tempdir().unwrap();
        let corrupt = dir.path().join("corrupt.zip");
        write_corrupt_zip(&corrupt);
        let fetcher = LocalFetcher {
            archive: corrupt,
            calls: AtomicUsize::new(0),
        };
        let images = dir.path().join("images");
        let source = DatasetSource {
            url: "https://example.invalid/flowers.zip",
            archive_name: "flowers.zip",
            folder_name: "flowers",
        };

        for attempt in 1..=2 {
            let err = ensure_dataset(&fetcher, &source, &images).await.unwrap_err();
            assert!(matches!(err, ClassifyError::DataAcquisition(_)));
            assert!(!images.join("flowers").exists());
            assert!(!images.join(".flowers.extracting").exists());
            assert!(!images.join("flowers.zip").exists());
            assert_eq!(fetcher.calls.load(Ordering::SeqCst), attempt);
        }
    }

    #[test]
    fn test_extract_into_unwritable_destination_is_acquisition_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("set.zip");
        write_zip(&archive, &[("set/rose/a.jpg", b"a")]);
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file, not a directory").unwrap();
        let err = extract_zip(&archive, &blocker.join("out")).unwrap_err();
        assert!(matches!(err, ClassifyError::DataAcquisition(_)));
    }

    /// Answer a single HTTP request with `status` and `body`, returning the URL.
    async fn serve_once(status: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/flowers.zip")
    }

    fn local_fetcher() -> HttpFetcher {
        HttpFetcher::new(reqwest::Client::builder().no_proxy().build().unwrap())
    }

    #[tokio::test]
    async fn test_http_fetcher_downloads_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_once("200 OK", b"zip bytes").await;
        let path = local_fetcher()
            .fetch(&url, dir.path(), "flowers.zip")
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("flowers.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), b"zip bytes");
        assert!(!dir.path().join("flowers.zip.part").exists());
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_error_status() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_once("404 Not Found", b"").await;
        let err = local_fetcher()
            .fetch(&url, dir.path(), "flowers.zip")
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::DataAcquisition(_)));
        assert!(!dir.path().join("flowers.zip").exists());
        assert!(!dir.path().join("flowers.zip.part").exists());
    }

    #[tokio::test]
    async fn test_http_fetcher_unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let err = local_fetcher()
            .fetch("http://127.0.0.1:9/unused.zip", &blocker.join("sub"), "a.zip")
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::DataAcquisition(_)));
    }
}
