use super::part_path;
use crate::error::TransportError;
use futures::StreamExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};
use url::Url;

pub fn http_client() -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .user_agent(concat!("imdb-loader/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(TransportError::Client)
}

/// Stream `url` into `dest`. The body lands in `<dest>.part` first and is
/// renamed on success, so an interrupted transfer never replaces a good file.
/// Any 4xx/5xx status fails the transfer. `cancel` is checked before every
/// body chunk. Returns bytes written.
#[instrument(skip(client, url, cancel), fields(url = %url))]
pub async fn download(
    client: &reqwest::Client,
    url: &Url,
    dest: &Path,
    cancel: &AtomicBool,
) -> Result<u64, TransportError> {
    let part = part_path(dest);
    match fetch_into(client, url, &part, cancel).await {
        Ok(bytes) => {
            tokio::fs::rename(&part, dest)
                .await
                .map_err(|source| TransportError::Io {
                    path: dest.to_path_buf(),
                    source,
                })?;
            info!(bytes, dest = %dest.display(), "download complete");
            Ok(bytes)
        }
        Err(err) => {
            if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(part = %part.display(), error = %cleanup, "could not remove partial download");
                }
            }
            Err(err)
        }
    }
}

async fn fetch_into(
    client: &reqwest::Client,
    url: &Url,
    part: &Path,
    cancel: &AtomicBool,
) -> Result<u64, TransportError> {
    let request_err = |source| TransportError::Request {
        url: url.to_string(),
        source,
    };
    let resp = client.get(url.clone()).send().await.map_err(request_err)?;
    let status = resp.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let io_err = |source| TransportError::Io {
        path: part.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::create(part).await.map_err(io_err)?;
    let mut body = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        if cancel.load(Ordering::SeqCst) {
            return Err(TransportError::Cancelled {
                url: url.to_string(),
            });
        }
        let chunk = chunk.map_err(request_err)?;
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_err)?;
    Ok(written)
}
