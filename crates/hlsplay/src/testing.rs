use std::{
    collections::{HashMap, HashSet, VecDeque},
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use reqwest::StatusCode;
use tokio::time::Instant;
use url::Url;

use crate::{
    error::{HlsError, HlsResult},
    transport::Transport,
};

#[derive(Default)]
struct State {
    playlists: HashMap<String, VecDeque<Result<String, u16>>>,
    segments: HashMap<String, Vec<u8>>,
    failures: HashMap<String, u32>,
    panics: HashSet<String>,
    requests: Vec<(String, Instant)>,
}

/// Transport serving canned responses, recording when each URL was requested.
#[derive(Clone)]
pub(crate) struct MemoryTransport {
    state: Arc<Mutex<State>>,
    created: Instant,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            state: Default::default(),
            created: Instant::now(),
        }
    }

    /// Queue a playlist response. The last queued response repeats forever.
    pub fn playlist(&self, url: &str, content: impl Into<String>) -> &Self {
        self.queue(url, Ok(content.into()))
    }

    pub fn playlist_status(&self, url: &str, status: u16) -> &Self {
        self.queue(url, Err(status))
    }

    pub fn segment(&self, url: &str, data: impl Into<Vec<u8>>) -> &Self {
        let mut state = self.state.lock().unwrap();
        state.segments.insert(url.to_string(), data.into());
        self
    }

    /// Answer the next `times` requests for `url` with 503.
    pub fn fail(&self, url: &str, times: u32) -> &Self {
        let mut state = self.state.lock().unwrap();
        state.failures.insert(url.to_string(), times);
        self
    }

    /// Panic inside the transport whenever `url` is requested.
    pub fn panic_on(&self, url: &str) -> &Self {
        let mut state = self.state.lock().unwrap();
        state.panics.insert(url.to_string());
        self
    }

    /// Offsets from creation at which `url` was requested.
    pub fn requests(&self, url: &str) -> Vec<Duration> {
        let state = self.state.lock().unwrap();
        state
            .requests
            .iter()
            .filter(|(requested, _)| requested == url)
            .map(|(_, at)| *at - self.created)
            .collect()
    }

    fn queue(&self, url: &str, response: Result<String, u16>) -> &Self {
        let mut state = self.state.lock().unwrap();
        state
            .playlists
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    fn record(&self, url: &Url) -> HlsResult<()> {
        let mut state = self.state.lock().unwrap();
        state.requests.push((url.to_string(), Instant::now()));
        if state.panics.contains(url.as_str()) {
            drop(state);
            panic!("transport exploded on {url}");
        }
        if let Some(remaining) = state.failures.get_mut(url.as_str()) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(HlsError::HttpError(StatusCode::SERVICE_UNAVAILABLE));
            }
        }
        Ok(())
    }
}

fn status_error(status: u16) -> HlsError {
    HlsError::HttpError(StatusCode::from_u16(status).unwrap())
}

impl Transport for MemoryTransport {
    async fn fetch_playlist(&self, url: &Url) -> HlsResult<String> {
        self.record(url)?;
        let mut state = self.state.lock().unwrap();
        let queue = state
            .playlists
            .get_mut(url.as_str())
            .ok_or_else(|| status_error(404))?;
        let response = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        response.ok_or_else(|| status_error(404))?.map_err(status_error)
    }

    async fn fetch_segment(&self, url: &Url, path: &Path) -> HlsResult<u64> {
        self.record(url)?;
        let data = {
            let state = self.state.lock().unwrap();
            state
                .segments
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| status_error(404))?
        };
        std::fs::write(path, &data)?;
        Ok(data.len() as u64)
    }
}

/// A media playlist with consecutive segments named after their sequence.
pub(crate) fn media_playlist(
    target_duration: u64,
    first_sequence: u64,
    durations: &[f64],
    end_list: bool,
) -> String {
    let mut playlist = format!(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:{target_duration}\n#EXT-X-MEDIA-SEQUENCE:{first_sequence}\n"
    );
    for (sequence, duration) in (first_sequence..).zip(durations) {
        playlist.push_str(&format!("#EXTINF:{duration},\n{sequence}.ts\n"));
    }
    if end_list {
        playlist.push_str("#EXT-X-ENDLIST\n");
    }
    playlist
}
