mod download;
mod live;

use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use futures::FutureExt;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    cache::{CacheStatus, FetchedSegment, SegmentCache},
    error::{HlsError, HlsResult},
    hls::{resolve_url, FirstVariant, PlaylistDocument, VariantSelector},
    transport::{HttpTransport, Transport},
    util::retry::{retry_with_backoff, RetryPolicy},
};

/// Lifecycle of a fetch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Bootstrapping,
    SelectingVariant,
    Streaming,
    /// The playlist ended, remaining segments are still downloading
    Draining,
    Stopped,
    Failed,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub retry: RetryPolicy,
    /// How many segments behind the live edge downloading starts
    pub lookback: u64,
    /// Keep at most this many segments behind the last requested one
    pub retain: Option<u64>,
    pub max_variant_depth: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            lookback: 3,
            retain: None,
            max_variant_depth: 5,
        }
    }
}

pub struct FetcherBuilder {
    options: FetchOptions,
    cache_dir: Option<PathBuf>,
    selector: Arc<dyn VariantSelector>,
}

impl FetcherBuilder {
    pub fn new() -> Self {
        Self {
            options: FetchOptions::default(),
            cache_dir: None,
            selector: Arc::new(FirstVariant),
        }
    }

    /// Directory downloaded segments are written to. A fresh temporary directory is
    /// created when unset.
    pub fn cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.options.retry = retry;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.options.retry.max_retries = retries;
        self
    }

    pub fn selector(mut self, selector: impl VariantSelector + 'static) -> Self {
        self.selector = Arc::new(selector);
        self
    }

    pub fn lookback(mut self, lookback: u64) -> Self {
        self.options.lookback = lookback;
        self
    }

    /// Evict cached segments more than `segments` sequences behind the last request.
    pub fn retain(mut self, segments: u64) -> Self {
        // pacing looks two segments back
        self.options.retain = Some(segments.max(2));
        self
    }

    pub fn max_variant_depth(mut self, depth: usize) -> Self {
        self.options.max_variant_depth = depth;
        self
    }

    pub fn build(self, url: &str) -> HlsResult<HlsFetcher<HttpTransport>> {
        self.build_with_transport(url, HttpTransport::default())
    }

    pub fn build_with_transport<T: Transport>(
        self,
        url: &str,
        transport: T,
    ) -> HlsResult<HlsFetcher<T>> {
        let url = Url::parse(url)?;
        let cache_dir = match self.cache_dir {
            Some(dir) => {
                std::fs::create_dir_all(&dir)?;
                dir
            }
            None => tempfile::Builder::new()
                .prefix("hlsplay_")
                .tempdir()?
                .keep(),
        };
        log::debug!("Segments of {url} are cached in {}", cache_dir.display());

        Ok(HlsFetcher {
            inner: Arc::new(Inner {
                url,
                transport,
                options: self.options,
                selector: self.selector,
                cache_dir,
                cache: SegmentCache::new(),
                token: CancellationToken::new(),
                state: Mutex::new(FetchState::Idle),
                stopped: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }
}

impl Default for FetcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Inner<T> {
    url: Url,
    transport: T,
    options: FetchOptions,
    selector: Arc<dyn VariantSelector>,
    cache_dir: PathBuf,
    cache: SegmentCache,
    token: CancellationToken,
    state: Mutex<FetchState>,
    stopped: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Transport> Inner<T> {
    fn set_state(&self, state: FetchState) {
        let mut current = self.state.lock().unwrap();
        if matches!(*current, FetchState::Stopped | FetchState::Failed) {
            return;
        }
        log::debug!("{}: {:?} -> {state:?}", self.url, *current);
        *current = state;
    }

    fn fail(&self, error: &HlsError) {
        if self.token.is_cancelled() && matches!(error, HlsError::Stopped) {
            return;
        }
        log::error!("Fetch session for {} failed: {error}", self.url);
        self.set_state(FetchState::Failed);
        self.cache.set_status(CacheStatus::Failed(error.to_string()));
        self.token.cancel();
    }

    async fn fetch_playlist(&self, url: &Url) -> HlsResult<String> {
        retry_with_backoff(&self.options.retry, &self.token, |_| {
            self.transport.fetch_playlist(url)
        })
        .await
    }
}

/// Fetch the playlist at `url`, following variant indexes down to a media playlist.
#[async_recursion::async_recursion]
async fn bootstrap<T: Transport>(
    inner: &Inner<T>,
    url: Url,
    depth: usize,
) -> HlsResult<PlaylistDocument> {
    inner.set_state(FetchState::Bootstrapping);
    log::info!("Start fetching M3U8 file {url}.");

    let content = inner.fetch_playlist(&url).await?;
    let mut doc = PlaylistDocument::new(url);
    doc.update(&content)?;

    if !doc.is_variant_index() {
        return Ok(doc);
    }

    inner.set_state(FetchState::SelectingVariant);
    if depth >= inner.options.max_variant_depth {
        return Err(HlsError::VariantDepthExceeded(inner.options.max_variant_depth));
    }
    let next = {
        let variant = doc.select_variant(inner.selector.as_ref())?;
        let next = resolve_url(doc.url(), &variant.uri)?;
        log::info!(
            "Variant playlist detected, selected {next}; Bandwidth: {:?}",
            variant.bandwidth
        );
        next
    };
    bootstrap(inner, next, depth + 1).await
}

/// A fetch session for one playlist URL.
///
/// ```text
///           start()
///              │
///   ┌──────────▼──────────┐ variant index ┌──────────────────┐
///   │    Bootstrapping    ├───────────────►  SelectingVariant │
///   │                     ◄───────────────┤                  │
///   └──────────┬──────────┘  resolved URL └──────────────────┘
///              │ media playlist
///   ┌──────────▼──────────┐   MediaWindow   ┌─────────────────┐
///   │     reload loop     ├────[watch]──────►  download loop  │
///   └─────────────────────┘                 └────────┬────────┘
///                                                    │ insert
///                             get(sequence) ┌────────▼────────┐
///                          ◄────────────────┤  SegmentCache   │
///                                           └─────────────────┘
/// ```
///
/// Dropping the fetcher stops the session.
pub struct HlsFetcher<T: Transport = HttpTransport> {
    inner: Arc<Inner<T>>,
}

impl HlsFetcher<HttpTransport> {
    pub fn builder() -> FetcherBuilder {
        FetcherBuilder::new()
    }
}

impl<T: Transport> HlsFetcher<T> {
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn cache_dir(&self) -> &Path {
        &self.inner.cache_dir
    }

    pub fn state(&self) -> FetchState {
        *self.inner.state.lock().unwrap()
    }

    pub fn cached_sequences(&self) -> Vec<u64> {
        self.inner.cache.sequences()
    }

    /// Start the session and resolve with the first downloaded segment.
    pub async fn start(&self) -> HlsResult<FetchedSegment> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if *state != FetchState::Idle {
                return Err(HlsError::Precondition("fetch session already started"));
            }
            *state = FetchState::Bootstrapping;
        }

        let bootstrapped = tokio::select! {
            _ = self.inner.token.cancelled() => Err(HlsError::Stopped),
            doc = bootstrap(&self.inner, self.inner.url.clone(), 0) => doc,
        };
        let doc = match bootstrapped {
            Ok(doc) => doc,
            Err(e) => {
                self.inner.fail(&e);
                return Err(e);
            }
        };

        let media_url = doc.url().clone();
        let window = doc
            .media()
            .cloned()
            .ok_or(HlsError::Precondition("bootstrap ended without a media playlist"))?;
        let end_list = window.end_list;
        let (window_tx, window_rx) = watch::channel(Arc::new(window));

        if end_list {
            self.inner.set_state(FetchState::Draining);
            drop(window_tx);
        } else {
            self.inner.set_state(FetchState::Streaming);
            self.spawn(live::reload_loop(self.inner.clone(), doc, window_tx));
        }
        self.spawn(download::download_loop(
            self.inner.clone(),
            media_url,
            window_rx,
        ));

        self.inner.cache.wait_for(0).await
    }

    /// Resolve with the smallest downloaded sequence `>= sequence`.
    pub async fn get(&self, sequence: u64) -> HlsResult<FetchedSegment> {
        if let Some(retain) = self.inner.options.retain {
            let evicted = self
                .inner
                .cache
                .evict_before(sequence.saturating_sub(retain))
                .await;
            if evicted > 0 {
                log::debug!("Evicted {evicted} segments before {sequence}");
            }
        }
        self.inner.cache.wait_for(sequence).await
    }

    /// Cancel timers and downloads and reject pending `get` calls. Calling it again has
    /// no effect.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("Stopping fetch session for {}", self.inner.url);

        *self.inner.state.lock().unwrap() = FetchState::Stopped;
        self.inner.token.cancel();
        for task in self.inner.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        self.inner.cache.set_status(CacheStatus::Stopped);
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = HlsResult<()>> + Send + 'static,
    {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = inner.token.cancelled() => return,
                result = AssertUnwindSafe(task).catch_unwind() => result,
            };
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => inner.fail(&e),
                // waiters must not hang on a task that is gone
                Err(panic) => inner.fail(&HlsError::Panicked(panic_message(panic.as_ref()))),
            }
        });
        self.inner.tasks.lock().unwrap().push(handle);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl<T: Transport> Drop for HlsFetcher<T> {
    fn drop(&mut self) {
        self.stop();
    }
}
