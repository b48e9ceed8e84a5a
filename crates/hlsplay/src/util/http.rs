use std::{ops::Deref, sync::Arc};

use reqwest::{Client, ClientBuilder, IntoUrl};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};

use crate::error::HlsResult;

/// Reqwest client sharing one cookie jar between playlist and segment requests.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cookies_store: Arc<CookieStoreMutex>,
}

impl HttpClient {
    pub fn new(builder: ClientBuilder) -> HlsResult<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = builder.cookie_provider(cookies_store.clone()).build()?;

        Ok(Self {
            client,
            cookies_store,
        })
    }

    /// Seed the jar with `Set-Cookie` style strings scoped to `url`.
    pub fn add_cookies(&self, cookies: Vec<String>, url: impl IntoUrl) -> HlsResult<()> {
        let url = url.into_url()?;
        let mut lock = self.cookies_store.lock().unwrap();
        for cookie in cookies {
            if let Err(e) = lock.parse(&cookie, &url) {
                log::warn!("Ignoring invalid cookie {cookie:?}: {e}");
            }
        }
        Ok(())
    }

    pub fn cookies(&self) -> Arc<CookieStoreMutex> {
        self.cookies_store.clone()
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Client::builder()).expect("failed to build default HTTP client")
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}
