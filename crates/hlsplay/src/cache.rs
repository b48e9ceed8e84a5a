use std::{collections::BTreeMap, path::PathBuf, sync::Mutex};

use tokio::sync::watch;

use crate::{
    error::{HlsError, HlsResult},
    hls::Segment,
};

/// A downloaded segment, ready to be handed to a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedSegment {
    pub path: PathBuf,
    pub segment: Segment,
}

impl FetchedSegment {
    pub fn sequence(&self) -> u64 {
        self.segment.sequence
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CacheStatus {
    /// Downloads may still complete
    Running,
    /// The download loop has finished, nothing will be added anymore
    Drained,
    Failed(String),
    Stopped,
}

/// Result of a cache query.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Ready(FetchedSegment),
    Pending,
    Ended,
    Failed(String),
    Stopped,
}

struct CacheState {
    entries: BTreeMap<u64, FetchedSegment>,
    status: CacheStatus,
}

/// Downloaded segments of one fetch session, keyed by sequence number.
///
/// Any number of waiters may block in [`SegmentCache::wait_for`]; every insertion or
/// status change wakes all of them and each re-checks its own request.
pub struct SegmentCache {
    state: Mutex<CacheState>,
    generation: watch::Sender<u64>,
}

impl Default for SegmentCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentCache {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: BTreeMap::new(),
                status: CacheStatus::Running,
            }),
            generation: watch::channel(0).0,
        }
    }

    pub fn insert(&self, fetched: FetchedSegment) {
        self.state
            .lock()
            .unwrap()
            .entries
            .insert(fetched.sequence(), fetched);
        self.wake();
    }

    pub fn contains(&self, sequence: u64) -> bool {
        self.state.lock().unwrap().entries.contains_key(&sequence)
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.state.lock().unwrap().entries.keys().copied().collect()
    }

    /// The smallest cached sequence `>= sequence`, or why there is none.
    pub fn lookup(&self, sequence: u64) -> Lookup {
        let state = self.state.lock().unwrap();
        if state.status == CacheStatus::Stopped {
            return Lookup::Stopped;
        }
        if let Some((_, fetched)) = state.entries.range(sequence..).next() {
            return Lookup::Ready(fetched.clone());
        }
        match &state.status {
            CacheStatus::Running => Lookup::Pending,
            CacheStatus::Drained => Lookup::Ended,
            CacheStatus::Failed(reason) => Lookup::Failed(reason.clone()),
            CacheStatus::Stopped => Lookup::Stopped,
        }
    }

    /// Resolve with the smallest cached sequence `>= sequence`, waiting for downloads
    /// as long as the session runs.
    pub async fn wait_for(&self, sequence: u64) -> HlsResult<FetchedSegment> {
        let mut generation = self.generation.subscribe();
        loop {
            generation.borrow_and_update();
            match self.lookup(sequence) {
                Lookup::Ready(fetched) => return Ok(fetched),
                Lookup::Pending => log::debug!("missed {sequence} in {:?}", self.sequences()),
                Lookup::Ended => return Err(HlsError::EndOfStream(sequence)),
                Lookup::Failed(reason) => return Err(HlsError::SessionFailed(reason)),
                Lookup::Stopped => return Err(HlsError::Stopped),
            }

            if generation.changed().await.is_err() {
                return Err(HlsError::Stopped);
            }
        }
    }

    /// Drop entries older than `sequence` and remove their files.
    pub async fn evict_before(&self, sequence: u64) -> usize {
        let evicted = {
            let mut state = self.state.lock().unwrap();
            let kept = state.entries.split_off(&sequence);
            std::mem::replace(&mut state.entries, kept)
        };

        for fetched in evicted.values() {
            log::debug!("evicting {}", fetched.path.display());
            if let Err(e) = tokio::fs::remove_file(&fetched.path).await {
                log::warn!("Failed to remove {}: {e}", fetched.path.display());
            }
        }
        evicted.len()
    }

    pub(crate) fn set_status(&self, status: CacheStatus) {
        {
            let mut state = self.state.lock().unwrap();
            // a stopped or failed session never resumes
            if matches!(state.status, CacheStatus::Stopped | CacheStatus::Failed(_))
                && status != CacheStatus::Stopped
            {
                return;
            }
            state.status = status;
        }
        self.wake();
    }

    fn wake(&self) {
        self.generation.send_modify(|g| *g += 1);
    }
}
