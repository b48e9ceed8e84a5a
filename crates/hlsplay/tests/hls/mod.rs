mod fetch;

use std::time::Duration;

use hlsplay::{FetcherBuilder, RetryPolicy};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

trait HlsMock {
    async fn mock<S>(&self, mock_path: &str, body: S) -> &Self
    where
        S: AsRef<str>;

    async fn mock_playlist(&self, mock_path: &str, durations: &[f64], end_list: bool) -> &Self;

    async fn mock_segments(&self, sequences: std::ops::RangeInclusive<u64>) -> &Self;
}

impl HlsMock for MockServer {
    async fn mock<S>(&self, mock_path: &str, body: S) -> &Self
    where
        S: AsRef<str>,
    {
        Mock::given(method("GET"))
            .and(path(mock_path))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.as_ref()))
            .mount(self)
            .await;
        self
    }

    async fn mock_playlist(&self, mock_path: &str, durations: &[f64], end_list: bool) -> &Self {
        self.mock(mock_path, media_playlist(1, durations, end_list))
            .await
    }

    async fn mock_segments(&self, sequences: std::ops::RangeInclusive<u64>) -> &Self {
        for sequence in sequences {
            self.mock(&format!("/{sequence}.ts"), format!("<{sequence}>"))
                .await;
        }
        self
    }
}

fn media_playlist(first_sequence: u64, durations: &[f64], end_list: bool) -> String {
    let mut playlist = format!(
        "#EXTM3U
#EXT-X-TARGETDURATION:1
#EXT-X-VERSION:3
#EXT-X-MEDIA-SEQUENCE:{first_sequence}
"
    );
    for (sequence, duration) in (first_sequence..).zip(durations) {
        playlist.push_str(&format!("#EXTINF:{duration},\n{sequence}.ts\n"));
    }
    if end_list {
        playlist.push_str("#EXT-X-ENDLIST\n");
    }
    playlist
}

fn builder(dir: &tempfile::TempDir) -> FetcherBuilder {
    FetcherBuilder::new().cache_dir(dir.path()).retry(RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        jitter: false,
    })
}
