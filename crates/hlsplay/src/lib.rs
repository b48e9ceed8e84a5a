//! HLS fetch engine: playlist polling, paced segment downloads and in-order playback.
//!
//! ```text
//! ┌──────────────────────┐  MediaWindow   ┌──────────────────────┐
//! │                      ├────[watch]─────►                      ├───┐
//! │     reload loop      │                │    download loop     │   │fetch_segment
//! │                      │                │                      ◄───┘
//! └───┬──────────▲───────┘                └──────────┬───────────┘
//!     │          │ fetch_playlist                    │ insert
//!     └──────────┘                        ┌──────────▼───────────┐
//!                                         │     SegmentCache     │
//!                                         └──────────┬───────────┘
//!                                                    │ get(sequence)
//! ┌──────────────────────┐  AboutToFinish ┌──────────▼───────────┐
//! │         Sink         ├────[MPSC]──────►  PlaybackSequencer   │
//! │                      ◄────────────────┤                      │
//! └──────────────────────┘  set_source    └──────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod hls;
pub mod sequencer;
pub mod sink;
pub mod transport;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::FetchedSegment;
pub use error::{HlsError, HlsResult};
pub use fetcher::{FetchState, FetcherBuilder, HlsFetcher};
pub use sequencer::{PlaybackSequencer, SwitchMode};
pub use sink::{Sink, SinkEvent, WriteMode, WriterSink};
pub use transport::{HttpTransport, Transport};
pub use util::{http::HttpClient, retry::RetryPolicy};
