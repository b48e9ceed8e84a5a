use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

use super::{FetchState, Inner};
use crate::{
    error::{HlsError, HlsResult},
    hls::{MediaWindow, PlaylistDocument},
    transport::Transport,
};

/// Keep polling the media playlist until it ends, publishing a new window after
/// every change.
pub(super) async fn reload_loop<T: Transport>(
    inner: Arc<Inner<T>>,
    mut doc: PlaylistDocument,
    window_tx: watch::Sender<Arc<MediaWindow>>,
) -> HlsResult<()> {
    loop {
        let delay = next_reload_delay(&mut doc)?;
        log::debug!(
            "Reloading {} in {:.3}s, unchanged {} times",
            doc.url(),
            delay.as_secs_f64(),
            doc.unchanged_fetches()
        );
        tokio::time::sleep(delay).await;

        let content = inner.fetch_playlist(doc.url()).await?;
        if !doc.update(&content)? {
            continue;
        }

        let window = doc
            .media()
            .ok_or(HlsError::Precondition("media playlist turned into variant index"))?;
        log::debug!(
            "Playlist window is now {:?}..={:?}",
            window.first_sequence(),
            window.last_sequence()
        );
        window_tx.send_replace(Arc::new(window.clone()));

        if window.end_list {
            log::info!("Playlist {} reached its end.", doc.url());
            inner.set_state(FetchState::Draining);
            return Ok(());
        }
    }
}

fn next_reload_delay(doc: &mut PlaylistDocument) -> HlsResult<Duration> {
    // a live playlist without segments yet has no last segment to pace on
    if let Some(window) = doc.media().filter(|w| w.is_empty()) {
        return Duration::try_from_secs_f64(window.target_duration.max(1.))
            .map_err(|_| HlsError::Precondition("target duration out of range"));
    }
    doc.reload_delay()
}
