use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use url::Url;

use crate::{
    error::{HlsError, HlsResult},
    hls::{reload::ReloadState, variant::VariantSelector},
};

/// Media sequence used when a playlist has no `#EXT-X-MEDIA-SEQUENCE` tag.
pub const DEFAULT_MEDIA_SEQUENCE: u64 = 1;

/// Longest segment or target duration accepted, in seconds.
pub const MAX_DURATION: f64 = 86_400.;

#[derive(Debug, Clone, PartialEq)]
pub struct VariantStream {
    pub uri: String,
    pub bandwidth: Option<u64>,
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub sequence: u64,
    pub uri: String,
    /// Duration in seconds, as announced by `#EXTINF`
    pub duration: f64,
    pub title: String,
    pub discontinuity: bool,
}

/// The rolling window of segments known for a media playlist.
///
/// Segments are merged in across reloads and never removed, so
/// `last_sequence` never decreases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaWindow {
    segments: BTreeMap<u64, Segment>,
    pub target_duration: f64,
    pub end_list: bool,
}

/// Position of the download cursor inside a [`MediaWindow`].
#[derive(Debug, Clone, PartialEq)]
pub enum CursorPosition {
    Ready(Segment),
    /// The sequence is missing but later ones exist.
    Gap(u64),
    NotYetAvailable,
    Finished,
}

impl MediaWindow {
    pub fn first_sequence(&self) -> Option<u64> {
        self.segments.keys().next().copied()
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.segments.keys().next_back().copied()
    }

    pub fn get(&self, sequence: u64) -> Option<&Segment> {
        self.segments.get(&sequence)
    }

    pub fn duration_of(&self, sequence: u64) -> Option<f64> {
        self.segments.get(&sequence).map(|s| s.duration)
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Where downloading starts: `lookback` segments behind the live edge,
    /// but never before the first known segment.
    pub fn live_edge_start(&self, lookback: u64) -> Option<u64> {
        let first = self.first_sequence()?;
        let last = self.last_sequence()?;
        Some(first.max(last.saturating_sub(lookback)))
    }

    pub fn cursor(&self, sequence: u64) -> CursorPosition {
        if let Some(segment) = self.segments.get(&sequence) {
            return CursorPosition::Ready(segment.clone());
        }
        if let Some((next, _)) = self.segments.range(sequence..).next() {
            return CursorPosition::Gap(*next);
        }
        if self.end_list {
            CursorPosition::Finished
        } else {
            CursorPosition::NotYetAvailable
        }
    }

    fn merge(&mut self, parsed: ParsedPlaylist) {
        for segment in parsed.segments {
            // segments already seen keep their first parsed value
            self.segments.entry(segment.sequence).or_insert(segment);
        }
        if let Some(target_duration) = parsed.target_duration {
            self.target_duration = target_duration;
        }
        self.end_list |= parsed.end_list;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistKind {
    VariantIndex(Vec<VariantStream>),
    Media(MediaWindow),
}

/// One M3U8 document, refreshed in place by successive [`PlaylistDocument::update`] calls.
#[derive(Debug)]
pub struct PlaylistDocument {
    url: Url,
    kind: Option<PlaylistKind>,
    last_raw_content: Option<String>,
    pub(crate) reload: ReloadState,
}

impl PlaylistDocument {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            kind: None,
            last_raw_content: None,
            reload: ReloadState::default(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn kind(&self) -> Option<&PlaylistKind> {
        self.kind.as_ref()
    }

    pub fn media(&self) -> Option<&MediaWindow> {
        match &self.kind {
            Some(PlaylistKind::Media(window)) => Some(window),
            _ => None,
        }
    }

    pub fn variants(&self) -> &[VariantStream] {
        match &self.kind {
            Some(PlaylistKind::VariantIndex(variants)) => variants,
            _ => &[],
        }
    }

    pub fn is_variant_index(&self) -> bool {
        matches!(self.kind, Some(PlaylistKind::VariantIndex(_)))
    }

    pub fn unchanged_fetches(&self) -> u32 {
        self.reload.unchanged_fetches
    }

    /// Feed freshly fetched content into the document.
    ///
    /// Returns `Ok(false)` without touching the parsed state when the content is
    /// byte-identical to the previous fetch.
    pub fn update(&mut self, content: &str) -> HlsResult<bool> {
        if self.last_raw_content.as_deref() == Some(content) {
            self.reload.unchanged_fetches += 1;
            return Ok(false);
        }

        let parsed = parse_playlist(content)?;

        let kind = match (self.kind.take(), parsed.is_variant_index()) {
            (None | Some(PlaylistKind::VariantIndex(_)), true) => {
                PlaylistKind::VariantIndex(parsed.variants)
            }
            (None, false) => {
                let mut window = MediaWindow::default();
                window.merge(parsed);
                PlaylistKind::Media(window)
            }
            (Some(PlaylistKind::Media(mut window)), false) => {
                window.merge(parsed);
                PlaylistKind::Media(window)
            }
            (previous, _) => {
                self.kind = previous;
                return Err(HlsError::parse("playlist changed kind between reloads"));
            }
        };
        self.kind = Some(kind);
        self.reload.unchanged_fetches = 0;

        self.last_raw_content = Some(content.to_string());
        Ok(true)
    }

    /// Delay before the next fetch of this live media playlist.
    pub fn reload_delay(&mut self) -> HlsResult<Duration> {
        let Some(PlaylistKind::Media(window)) = &self.kind else {
            return Err(HlsError::Precondition(
                "only media playlists can be reloaded",
            ));
        };
        let seconds = self.reload.next_delay(window)?;
        Duration::try_from_secs_f64(seconds.max(0.))
            .map_err(|_| HlsError::Precondition("reload delay out of range"))
    }

    pub fn select_variant(&self, selector: &dyn VariantSelector) -> HlsResult<&VariantStream> {
        let variants = self.variants();
        if variants.is_empty() {
            return Err(HlsError::Precondition("no variant streams in playlist"));
        }
        selector
            .select(variants)
            .ok_or(HlsError::Precondition("variant selector returned no stream"))
    }
}

#[derive(Debug, Default)]
pub(crate) struct ParsedPlaylist {
    variants: Vec<VariantStream>,
    segments: Vec<Segment>,
    target_duration: Option<f64>,
    end_list: bool,
}

impl ParsedPlaylist {
    fn is_variant_index(&self) -> bool {
        !self.variants.is_empty()
    }
}

/// A directive waiting for its URI line.
enum Pending {
    Variant(HashMap<String, String>),
    Segment { duration: f64, title: String },
}

pub(crate) fn parse_playlist(content: &str) -> HlsResult<ParsedPlaylist> {
    let mut lines = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| l.starts_with("#EXT") || !l.starts_with('#'));

    if !lines.next().is_some_and(|l| l.starts_with("#EXTM3U")) {
        return Err(HlsError::parse("missing #EXTM3U header"));
    }

    let mut parsed = ParsedPlaylist::default();
    // `None` once the sequence space is used up
    let mut sequence = Some(DEFAULT_MEDIA_SEQUENCE);
    let mut discontinuity = false;
    let mut pending: Option<Pending> = None;

    for line in lines {
        if !line.starts_with('#') {
            match pending.take() {
                Some(Pending::Variant(attributes)) => {
                    let bandwidth = attributes.get("BANDWIDTH").and_then(|b| b.parse().ok());
                    parsed.variants.push(VariantStream {
                        uri: line.to_string(),
                        bandwidth,
                        attributes,
                    });
                }
                Some(Pending::Segment { duration, title }) => {
                    let Some(current) = sequence else {
                        return Err(HlsError::parse("media sequence number overflow"));
                    };
                    parsed.segments.push(Segment {
                        sequence: current,
                        uri: line.to_string(),
                        duration,
                        title,
                        discontinuity,
                    });
                    discontinuity = false;
                    sequence = current.checked_add(1);
                }
                None => log::debug!("Ignoring URI without directive: {line}"),
            }
            continue;
        }

        let (tag, value) = line.split_once(':').unwrap_or((line, ""));
        match tag {
            "#EXT-X-STREAM-INF" => {
                replace_pending(&mut pending, Pending::Variant(parse_attributes(value)));
            }
            "#EXTINF" => {
                let (duration, title) = value.split_once(',').unwrap_or((value, ""));
                let duration = parse_duration(tag, duration)?;
                let pending_segment = Pending::Segment {
                    duration,
                    title: title.trim().to_string(),
                };
                replace_pending(&mut pending, pending_segment);
            }
            "#EXT-X-TARGETDURATION" => {
                parsed.target_duration = Some(parse_duration(tag, value)?);
            }
            "#EXT-X-MEDIA-SEQUENCE" => sequence = Some(parse_number::<u64>(tag, value)?),
            "#EXT-X-DISCONTINUITY" => discontinuity = true,
            "#EXT-X-ENDLIST" => parsed.end_list = true,
            "#EXT-X-PROGRAM-DATE-TIME" => log::debug!("Program date time: {value}"),
            _ => log::debug!("Ignoring unsupported tag: {line}"),
        }
    }

    if pending.is_some() {
        log::warn!("Playlist ends with a directive missing its URI");
    }

    if !parsed.variants.is_empty() && !parsed.segments.is_empty() {
        return Err(HlsError::parse(
            "playlist mixes variant streams and media segments",
        ));
    }
    if parsed.variants.is_empty() && parsed.target_duration.is_none() {
        return Err(HlsError::parse(
            "media playlist without #EXT-X-TARGETDURATION",
        ));
    }

    Ok(parsed)
}

fn replace_pending(pending: &mut Option<Pending>, next: Pending) {
    if pending.replace(next).is_some() {
        log::warn!("Dropping directive that was not followed by a URI");
    }
}

fn parse_number<T: std::str::FromStr>(tag: &str, value: &str) -> HlsResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| HlsError::parse(format!("invalid value for {tag}: {value:?}")))
}

fn parse_duration(tag: &str, value: &str) -> HlsResult<f64> {
    let duration = parse_number::<f64>(tag, value)?;
    if !(0. ..=MAX_DURATION).contains(&duration) {
        return Err(HlsError::parse(format!(
            "{tag} duration out of range: {value:?}"
        )));
    }
    Ok(duration)
}

/// Parse an attribute list such as `BANDWIDTH=1280000,CODECS="avc1.4d401f,mp4a.40.2"`.
pub(crate) fn parse_attributes(value: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    let mut rest = value.trim();

    while !rest.is_empty() {
        let Some((key, after_key)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().to_string();
        let after_key = after_key.trim_start();

        let (value, remain) = if let Some(quoted) = after_key.strip_prefix('"') {
            match quoted.split_once('"') {
                Some((value, remain)) => (value, remain),
                None => (quoted, ""),
            }
        } else {
            after_key.split_once(',').unwrap_or((after_key, ""))
        };

        attributes.insert(key, value.trim().to_string());
        rest = remain.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
    }

    attributes
}
