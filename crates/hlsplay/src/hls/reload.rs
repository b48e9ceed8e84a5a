use crate::{
    error::{HlsError, HlsResult},
    hls::playlist::MediaWindow,
};

/// Reload bookkeeping of a live media playlist.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReloadState {
    /// Fetches in a row that returned byte-identical content
    pub unchanged_fetches: u32,
    /// Delay computed after the last change, in seconds
    pub base_delay: Option<f64>,
}

impl ReloadState {
    /// Seconds to wait before fetching the playlist again.
    ///
    /// After a change the delay follows the last segment duration (capped at three
    /// target durations). Unchanged fetches poll faster once, then back off up to
    /// three times the steady cadence.
    pub fn next_delay(&mut self, window: &MediaWindow) -> HlsResult<f64> {
        if window.end_list {
            return Err(HlsError::Precondition("ended playlists are never reloaded"));
        }
        let last_sequence = window
            .last_sequence()
            .ok_or(HlsError::Precondition("playlist has no segments yet"))?;

        let delay = match self.unchanged_fetches {
            0 => {
                let last_duration = window.duration_of(last_sequence).unwrap_or_default();
                let base = (window.target_duration * 3.).min(last_duration);
                self.base_delay = Some(base);
                base
            }
            tries => {
                let base = self
                    .base_delay
                    .ok_or(HlsError::Precondition("no reload delay computed yet"))?;
                match tries {
                    1 => base * 0.5,
                    2 => base * 1.5,
                    _ => base * 3.,
                }
            }
        };

        log::debug!("Reload delay is {delay}s");
        Ok(delay)
    }
}
