use std::{fs::File, io::Write};

use tokio::sync::mpsc;

use crate::{cache::FetchedSegment, error::HlsResult};

/// Notifications a sink sends back to its sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    /// The current source is nearly exhausted and the next one should be queued.
    AboutToFinish,
}

/// The playback component a sequencer feeds. Sinks only read the files they are
/// given, the fetch session owns them.
pub trait Sink: Send {
    fn set_source(&mut self, segment: &FetchedSegment) -> HlsResult<()>;

    fn play(&mut self) -> HlsResult<()>;

    fn stop(&mut self) -> HlsResult<()>;

    fn is_playing(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Copy the segment bytes
    #[default]
    Content,
    /// Write the segment path on its own line
    Path,
}

/// A sink that "plays" a segment by writing it out, then immediately asks for the
/// next one.
pub struct WriterSink<W> {
    writer: W,
    mode: WriteMode,
    events: mpsc::UnboundedSender<SinkEvent>,

    source: Option<FetchedSegment>,
    playing: bool,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W, mode: WriteMode) -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let sink = Self {
            writer,
            mode,
            events,
            source: None,
            playing: false,
        };
        (sink, receiver)
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    fn flush_source(&mut self) -> HlsResult<()> {
        let Some(segment) = self.source.take() else {
            return Ok(());
        };

        match self.mode {
            WriteMode::Content => {
                let mut file = File::open(&segment.path)?;
                std::io::copy(&mut file, &mut self.writer)?;
            }
            WriteMode::Path => writeln!(self.writer, "{}", segment.path.display())?,
        }
        self.writer.flush()?;

        // the receiver is gone once the sequencer stopped listening
        let _ = self.events.send(SinkEvent::AboutToFinish);
        Ok(())
    }
}

impl<W: Write + Send> Sink for WriterSink<W> {
    fn set_source(&mut self, segment: &FetchedSegment) -> HlsResult<()> {
        self.source = Some(segment.clone());
        if self.playing {
            self.flush_source()?;
        }
        Ok(())
    }

    fn play(&mut self) -> HlsResult<()> {
        self.playing = true;
        self.flush_source()
    }

    fn stop(&mut self) -> HlsResult<()> {
        self.playing = false;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}
