//! Read-only views of stores owned by other services.
//!
//! The ratings service builds recommendations from the catalog and the
//! subscription index without owning either; these readers fetch them over HTTP
//! and surface failures as [`StoreError`] so the aggregator treats them like
//! any other store.

use crate::{ClientError, endpoint, http_client};
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tunestream_core::{
    CatalogReader, Song, StoreError, StoreFuture, Subscription, SubscriptionDirectory,
};

async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: Url,
    query: &[(&str, &str)],
) -> Result<T, StoreError> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(StoreError::Backend(format!("remote answered {status}")));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| StoreError::Backend(format!("undecodable response: {e}")))
}

/// Catalog songs from `GET {content}/songs`.
#[derive(Debug, Clone)]
pub struct RemoteCatalog {
    client: reqwest::Client,
    songs_url: Url,
}

impl RemoteCatalog {
    /// Reader for the catalog service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: http_client(timeout)?,
            songs_url: endpoint(base_url, "songs")?,
        })
    }
}

impl CatalogReader for RemoteCatalog {
    fn songs(&self) -> StoreFuture<'_, Vec<Song>> {
        Box::pin(async move {
            let mut songs: Vec<Song> = get_json(&self.client, self.songs_url.clone(), &[]).await?;
            songs.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(songs)
        })
    }
}

/// Subscription index from `GET {subscriptions}/subscriptions?...`.
#[derive(Debug, Clone)]
pub struct RemoteSubscriptions {
    client: reqwest::Client,
    url: Url,
}

impl RemoteSubscriptions {
    /// Reader for the subscriptions service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: http_client(timeout)?,
            url: endpoint(base_url, "subscriptions")?,
        })
    }

    fn query<'a>(&'a self, key: &'static str, value: &'a str) -> StoreFuture<'a, Vec<Subscription>> {
        Box::pin(async move { get_json(&self.client, self.url.clone(), &[(key, value)]).await })
    }
}

impl SubscriptionDirectory for RemoteSubscriptions {
    fn by_user<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, Vec<Subscription>> {
        self.query("userId", user_id)
    }

    fn by_artist<'a>(&'a self, artist_id: &'a str) -> StoreFuture<'a, Vec<Subscription>> {
        self.query("artistId", artist_id)
    }

    fn by_genre<'a>(&'a self, genre: &'a str) -> StoreFuture<'a, Vec<Subscription>> {
        self.query("genre", genre)
    }
}
