use tokio::sync::mpsc;

use crate::{
    error::{HlsError, HlsResult},
    fetcher::HlsFetcher,
    sink::{Sink, SinkEvent},
    transport::Transport,
};

/// How the next segment is handed to a sink that is already playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwitchMode {
    /// stop, set the new source, play again
    #[default]
    Restart,
    /// replace the source without interrupting playback
    Gapless,
}

/// Feeds the segments of one fetch session to a sink, in sequence order.
pub struct PlaybackSequencer<T: Transport, S: Sink> {
    fetcher: HlsFetcher<T>,
    sink: S,
    mode: SwitchMode,
    current: Option<u64>,
}

impl<T: Transport, S: Sink> PlaybackSequencer<T, S> {
    pub fn new(fetcher: HlsFetcher<T>, sink: S, mode: SwitchMode) -> Self {
        Self {
            fetcher,
            sink,
            mode,
            current: None,
        }
    }

    pub fn current_sequence(&self) -> Option<u64> {
        self.current
    }

    pub fn fetcher(&self) -> &HlsFetcher<T> {
        &self.fetcher
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Start the fetch session and begin playback with its first segment.
    pub async fn start(&mut self) -> HlsResult<u64> {
        if self.current.is_some() {
            return Err(HlsError::Precondition("sequencer already started"));
        }

        let first = self.fetcher.start().await?;
        log::info!(
            "Playback of {} starts at sequence {}",
            self.fetcher.url(),
            first.sequence()
        );
        self.current = Some(first.sequence());
        self.sink.set_source(&first)?;
        self.sink.play()?;
        Ok(first.sequence())
    }

    /// Move on to the segment after the current one.
    pub async fn advance(&mut self) -> HlsResult<u64> {
        let current = self
            .current
            .ok_or(HlsError::Precondition("sequencer not started"))?;

        let wanted = current
            .checked_add(1)
            .ok_or(HlsError::EndOfStream(current))?;
        let next = self.fetcher.get(wanted).await?;
        if next.sequence() != wanted {
            log::warn!(
                "Segments {wanted}..{} were never downloaded, skipping",
                next.sequence()
            );
        }
        if next.segment.discontinuity {
            log::debug!("Discontinuity at sequence {}", next.sequence());
        }

        match self.mode {
            SwitchMode::Gapless => self.sink.set_source(&next)?,
            SwitchMode::Restart => {
                let was_playing = self.sink.is_playing();
                self.sink.stop()?;
                self.sink.set_source(&next)?;
                if was_playing {
                    self.sink.play()?;
                }
            }
        }

        self.current = Some(next.sequence());
        Ok(next.sequence())
    }

    /// Play until the stream ends, advancing on every [`SinkEvent::AboutToFinish`].
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<SinkEvent>) -> HlsResult<()> {
        let result = self.drive(&mut events).await;
        self.stop();

        match result {
            Err(HlsError::EndOfStream(sequence)) => {
                log::info!("{} ended before sequence {sequence}", self.fetcher.url());
                Ok(())
            }
            result => result,
        }
    }

    async fn drive(&mut self, events: &mut mpsc::UnboundedReceiver<SinkEvent>) -> HlsResult<()> {
        if self.current.is_none() {
            self.start().await?;
        }
        while let Some(event) = events.recv().await {
            match event {
                SinkEvent::AboutToFinish => {
                    let sequence = self.advance().await?;
                    log::debug!("Playing sequence {sequence}");
                }
            }
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Err(e) = self.sink.stop() {
            log::warn!("Failed to stop sink: {e}");
        }
        self.fetcher.stop();
    }
}
