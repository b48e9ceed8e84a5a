use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;
use clap::Parser;
use fake_user_agent::get_chrome_rua;
use hlsplay::{
    FetcherBuilder, HttpClient, HttpTransport, PlaybackSequencer, SwitchMode, WriteMode,
    WriterSink,
};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    ClientBuilder,
};

#[derive(Parser, Debug, Clone)]
#[clap(version, about = "Play HLS streams by prefetching their segments")]
pub struct HlsPlayArgs {
    /// Debug output
    #[clap(short, long, alias = "debug")]
    verbose: bool,

    /// Hand segments over without stopping playback in between
    #[clap(short, long)]
    gapless: bool,

    /// Directory to cache segments in. A temporary directory is used when unset.
    #[clap(short, long, env = "HLSPLAY_PATH")]
    path: Option<PathBuf>,

    /// Players to start for each URL
    #[clap(short, long, default_value = "1")]
    number: u32,

    /// Retry limit
    #[clap(long, default_value = "5")]
    retries: u32,

    /// Delete cached segments more than N sequences behind playback
    #[clap(long, value_name = "N")]
    retain: Option<u64>,

    /// Cookies used to download
    ///
    /// eg. "session=xxx; lang=ja"
    #[clap(long)]
    cookies: Option<String>,

    /// HTTP Header used to download
    ///
    /// Custom header. eg. "User-Agent: xxxxx".
    #[clap(short = 'H', long)]
    headers: Vec<String>,

    /// Write segment content to stdout instead of segment paths
    #[clap(long)]
    pipe: bool,

    /// m3u8 urls
    #[clap(required = true)]
    urls: Vec<String>,
}

impl HlsPlayArgs {
    /// A client with its own cookie jar, seeded for `url` only.
    fn client(&self, url: &str) -> anyhow::Result<HttpClient> {
        let mut headers = HeaderMap::new();
        for header in &self.headers {
            let (key, value) = header
                .split_once(':')
                .with_context(|| format!("Invalid header: {header}"))?;
            headers.insert(
                HeaderName::from_str(key.trim()).context("Invalid header name")?,
                HeaderValue::from_str(value.trim()).context("Invalid header value")?,
            );
        }

        let client = HttpClient::new(
            ClientBuilder::new()
                .default_headers(headers)
                .user_agent(get_chrome_rua())
                .timeout(Duration::from_secs(60)),
        )?;

        if let Some(cookies) = &self.cookies {
            let cookies: Vec<String> = cookies
                .split(';')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
            client.add_cookies(cookies, url)?;
        }

        Ok(client)
    }

    fn fetcher(&self, player: usize) -> FetcherBuilder {
        let mut builder = FetcherBuilder::new().retries(self.retries);
        if let Some(path) = &self.path {
            builder = builder.cache_dir(path.join(format!("player_{player}")));
        }
        if let Some(retain) = self.retain {
            builder = builder.retain(retain);
        }
        builder
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = HlsPlayArgs::parse();
    let mut logger = pretty_env_logger::formatted_builder();
    logger.filter_level(log::LevelFilter::Info).parse_default_env();
    if args.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let mode = if args.gapless {
        SwitchMode::Gapless
    } else {
        SwitchMode::Restart
    };
    let write_mode = if args.pipe {
        WriteMode::Content
    } else {
        WriteMode::Path
    };

    let mut players = Vec::new();
    for url in &args.urls {
        for _ in 0..args.number {
            let fetcher = args
                .fetcher(players.len())
                .build_with_transport(url, HttpTransport::new(args.client(url)?))
                .with_context(|| format!("Failed to prepare player for {url}"))?;
            log::info!(
                "Player {} caches {url} in {}",
                players.len(),
                fetcher.cache_dir().display()
            );

            let (sink, events) = WriterSink::new(std::io::stdout(), write_mode);
            players.push(PlaybackSequencer::new(fetcher, sink, mode).run(events));
        }
    }

    tokio::select! {
        results = futures::future::join_all(players) => {
            let failed = results.iter().filter(|result| result.is_err()).count();
            for error in results.into_iter().filter_map(Result::err) {
                log::error!("{error}");
            }
            if failed > 0 {
                anyhow::bail!("{failed} players failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, stopping all players.");
        }
    }

    Ok(())
}
