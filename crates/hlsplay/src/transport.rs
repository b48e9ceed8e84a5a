use std::{
    future::Future,
    path::{Path, PathBuf},
};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::{
    error::{HlsError, HlsResult},
    util::http::HttpClient,
};

/// Network side of a fetch session.
pub trait Transport: Send + Sync + 'static {
    /// Fetch the text of a playlist.
    fn fetch_playlist(&self, url: &Url) -> impl Future<Output = HlsResult<String>> + Send;

    /// Download a segment into `path`, returning the number of bytes written.
    ///
    /// `path` must only appear once the download is complete.
    fn fetch_segment(&self, url: &Url, path: &Path)
        -> impl Future<Output = HlsResult<u64>> + Send;
}

#[derive(Clone, Default)]
pub struct HttpTransport {
    client: HttpClient,
}

impl HttpTransport {
    /// Transports built from clones of one client share its cookie jar.
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    async fn get(&self, url: &Url) -> HlsResult<reqwest::Response> {
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            if let Ok(body) = response.text().await {
                log::debug!("Error body: {body}");
            }
            return Err(HlsError::HttpError(status));
        }
        Ok(response)
    }
}

impl Transport for HttpTransport {
    async fn fetch_playlist(&self, url: &Url) -> HlsResult<String> {
        log::debug!("fetching {url}");
        let response = self.get(url).await?;
        Ok(response.text().await?)
    }

    async fn fetch_segment(&self, url: &Url, path: &Path) -> HlsResult<u64> {
        let response = self.get(url).await?;

        let mut part = path.as_os_str().to_owned();
        part.push(".part");
        let part = PathBuf::from(part);
        let mut file = tokio::fs::File::create(&part).await?;
        let mut written = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&part, path).await?;
        Ok(written)
    }
}
