use std::{sync::Arc, time::Duration};

use tokio::sync::watch;
use url::Url;

use super::{FetchState, Inner};
use crate::{
    cache::{CacheStatus, FetchedSegment, SegmentCache},
    error::{HlsError, HlsResult},
    hls::{resolve_url, segment_file_name, CursorPosition, MediaWindow, Segment},
    transport::Transport,
    util::retry::retry_with_backoff,
};

/// Walk the cursor through the playlist window, downloading each segment in order.
pub(super) async fn download_loop<T: Transport>(
    inner: Arc<Inner<T>>,
    media_url: Url,
    mut window_rx: watch::Receiver<Arc<MediaWindow>>,
) -> HlsResult<()> {
    let mut cursor = loop {
        let window = window_rx.borrow_and_update().clone();
        if let Some(start) = window.live_edge_start(inner.options.lookback) {
            break start;
        }
        if window.end_list {
            log::warn!("Playlist {media_url} ended without any segment.");
            finish(&inner);
            return Ok(());
        }
        if window_rx.changed().await.is_err() {
            return Ok(());
        }
    };
    log::info!("Start downloading {media_url} from sequence {cursor}.");

    let mut last_downloaded: Option<Segment> = None;
    loop {
        let window = window_rx.borrow_and_update().clone();
        match window.cursor(cursor) {
            CursorPosition::Ready(segment) => {
                let delay = pacing_delay(&inner.cache, cursor, last_downloaded.as_ref());
                if !delay.is_zero() {
                    log::debug!("Waiting {:.3}s before downloading {cursor}", delay.as_secs_f64());
                    tokio::time::sleep(delay).await;
                }

                download_segment(&inner, &media_url, &segment).await?;
                last_downloaded = Some(segment);
                match cursor.checked_add(1) {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
            CursorPosition::Gap(next) => {
                log::warn!("Segments {cursor}..{next} are gone from the playlist, skipping.");
                cursor = next;
            }
            CursorPosition::NotYetAvailable => {
                // a closed channel means the reload loop has failed and reports it
                if window_rx.changed().await.is_err() {
                    return Ok(());
                }
            }
            CursorPosition::Finished => break,
        }
    }

    finish(&inner);
    Ok(())
}

fn finish<T: Transport>(inner: &Inner<T>) {
    log::info!("All segments of {} downloaded.", inner.url);
    inner.cache.set_status(CacheStatus::Drained);
    inner.set_state(FetchState::Stopped);
}

/// Download at full speed until two segments of lead exist, then at playback pace.
fn pacing_delay(cache: &SegmentCache, sequence: u64, last_downloaded: Option<&Segment>) -> Duration {
    let warm = [1, 2].into_iter().all(|back| {
        sequence
            .checked_sub(back)
            .is_some_and(|previous| cache.contains(previous))
    });
    match last_downloaded {
        Some(last) if warm => Duration::try_from_secs_f64(last.duration).unwrap_or_default(),
        _ => Duration::ZERO,
    }
}

/// Fetch one segment into the cache. Segments that keep failing are dropped so the
/// cursor can move on.
async fn download_segment<T: Transport>(
    inner: &Inner<T>,
    media_url: &Url,
    segment: &Segment,
) -> HlsResult<()> {
    let url = match resolve_url(media_url, &segment.uri) {
        Ok(url) => url,
        Err(e) => {
            log::warn!("Invalid segment uri {}, drop. {e}", segment.uri);
            return Ok(());
        }
    };
    if segment.discontinuity {
        log::debug!("Discontinuity before segment {}", segment.sequence);
    }

    let path = inner
        .cache_dir
        .join(segment_file_name(&url, segment.sequence));
    let result = retry_with_backoff(&inner.options.retry, &inner.token, |_| {
        inner.transport.fetch_segment(&url, &path)
    })
    .await;

    match result {
        Ok(size) => {
            log::debug!(
                "Downloaded segment {} ({size} bytes) to {}",
                segment.sequence,
                path.display()
            );
            inner.cache.insert(FetchedSegment {
                path,
                segment: segment.clone(),
            });
            Ok(())
        }
        Err(HlsError::Stopped) => Err(HlsError::Stopped),
        Err(e) => {
            log::error!(
                "Processing segment {} failed, max retries exceed, drop. {e}",
                segment.sequence
            );
            Ok(())
        }
    }
}
