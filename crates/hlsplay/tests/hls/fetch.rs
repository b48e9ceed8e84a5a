use hlsplay::{HlsError, PlaybackSequencer, Sink, SwitchMode, WriteMode, WriterSink};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use super::{builder, media_playlist, HlsMock};
use crate::AssertWrapper;

#[tokio::test]
async fn test_vod_playlist() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vod.m3u8"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(media_playlist(1, &[0.1; 3], true)),
        )
        .expect(1)
        .mount(&server)
        .await;
    server.mock_segments(1..=3).await;

    let dir = tempfile::tempdir()?;
    let fetcher = builder(&dir).build(&format!("{}/vod.m3u8", server.uri()))?;

    let first = fetcher.start().await?;
    assert_eq!(first.sequence(), 1);
    assert_eq!(std::fs::read_to_string(&first.path)?, "<1>");

    assert_eq!(fetcher.get(3).await?.sequence(), 3);
    assert!(matches!(fetcher.get(4).await, Err(HlsError::EndOfStream(4))));
    assert_eq!(fetcher.cached_sequences(), vec![1, 2, 3]);

    Ok(())
}

#[tokio::test]
async fn test_variant_with_relative_uri() {
    let server = MockServer::start().await;
    server
        .mock(
            "/master.m3u8",
            "#EXTM3U
#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=1280000,CODECS=\"avc1.4d401f,mp4a.40.2\"
video/720p.m3u8",
        )
        .await
        .mock(
            "/video/720p.m3u8",
            "#EXTM3U
#EXT-X-TARGETDURATION:1
#EXTINF:0.5,
chunk_0.ts
#EXT-X-ENDLIST",
        )
        .await
        .mock("/video/chunk_0.ts", "720p")
        .await;

    let dir = tempfile::tempdir().unwrap();
    let fetcher = builder(&dir)
        .build(&format!("{}/master.m3u8", server.uri()))
        .assert_success();

    let first = fetcher.start().await.assert_success();
    assert_eq!(first.path, dir.path().join("chunk_0.ts"));
    assert_eq!(std::fs::read_to_string(&first.path).unwrap(), "720p");
}

#[tokio::test]
async fn test_cookies_reach_segments() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vod.m3u8"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "token=abc; Path=/")
                .set_body_string(media_playlist(1, &[0.1], true)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/1.ts"))
        .and(header("cookie", "token=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("private"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let fetcher = builder(&dir)
        .build(&format!("{}/vod.m3u8", server.uri()))
        .assert_success();

    let first = fetcher.start().await.assert_success();
    assert_eq!(std::fs::read_to_string(&first.path).unwrap(), "private");
}

#[tokio::test]
async fn test_sessions_keep_separate_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.m3u8"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "token=abc; Path=/")
                .set_body_string(media_playlist(1, &[0.1], true)),
        )
        .mount(&server)
        .await;
    server
        .mock("/b.m3u8", media_playlist(5, &[0.1], true))
        .await
        .mock_segments(1..=1)
        .await
        .mock_segments(5..=5)
        .await;

    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let a = builder(&dir_a)
        .build(&format!("{}/a.m3u8", server.uri()))
        .assert_success();
    let b = builder(&dir_b)
        .build(&format!("{}/b.m3u8", server.uri()))
        .assert_success();

    a.start().await.assert_success();
    b.start().await.assert_success();

    let requests = server.received_requests().await.unwrap();
    let cookie_of = |request_path: &str| {
        requests
            .iter()
            .find(|r| r.url.path() == request_path)
            .map(|r| r.headers.contains_key("cookie"))
    };
    assert_eq!(cookie_of("/1.ts"), Some(true));
    assert_eq!(cookie_of("/b.m3u8"), Some(false));
    assert_eq!(cookie_of("/5.ts"), Some(false));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    server.mock_playlist("/vod.m3u8", &[0.1], true).await;
    Mock::given(method("GET"))
        .and(path("/1.ts"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    server.mock_segments(1..=1).await;

    let dir = tempfile::tempdir().unwrap();
    let fetcher = builder(&dir)
        .build(&format!("{}/vod.m3u8", server.uri()))
        .assert_success();

    assert_eq!(fetcher.start().await.assert_success().sequence(), 1);
    let requests = server.received_requests().await.unwrap();
    let attempts = requests.iter().filter(|r| r.url.path() == "/1.ts").count();
    assert_eq!(attempts, 3);
}

#[tokio::test]
async fn test_missing_playlist() -> anyhow::Result<()> {
    let server = MockServer::start().await;

    let dir = tempfile::tempdir()?;
    let fetcher = builder(&dir).build(&format!("{}/missing.m3u8", server.uri()))?;

    assert!(matches!(
        fetcher.start().await,
        Err(HlsError::HttpError(status)) if status == 404
    ));
    fetcher.get(1).await.assert_error();
    Ok(())
}

#[tokio::test]
async fn test_sequencer_plays_stream_in_order() {
    let server = MockServer::start().await;
    server.mock_playlist("/vod.m3u8", &[0.05; 4], true).await;
    server.mock_segments(1..=4).await;

    let dir = tempfile::tempdir().unwrap();
    let fetcher = builder(&dir)
        .lookback(10)
        .build(&format!("{}/vod.m3u8", server.uri()))
        .assert_success();
    let (sink, mut events) = WriterSink::new(Vec::new(), WriteMode::Content);
    let mut sequencer = PlaybackSequencer::new(fetcher, sink, SwitchMode::Gapless);

    sequencer.start().await.assert_success();
    while events.recv().await.is_some() {
        if sequencer.advance().await.is_err() {
            break;
        }
    }
    sequencer.stop();

    assert_eq!(sequencer.current_sequence(), Some(4));
    assert!(!sequencer.sink().is_playing());
    assert_eq!(sequencer.sink().writer(), b"<1><2><3><4>");
}
