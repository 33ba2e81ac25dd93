use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::http;
use crate::types::{Coordinate, Place};
use futures::future::{join_all, BoxFuture};
use log::{debug, info, warn};
use serde::Deserialize;
use url::Url;

const GEOSEARCH: &str = "geosearch";
const SUMMARY: &str = "summary";

/// Finds notable places around a coordinate.
pub trait PlaceLookup: Send + Sync {
    fn nearby<'a>(
        &'a self,
        center: Coordinate,
        radius_meters: u32,
        limit: u32,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<Vec<Place>>>;
}

/// Geosearch followed by one REST summary request per hit.
pub struct Wikipedia {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Deserialize)]
struct GeoSearchResponse {
    query: Option<GeoSearchQuery>,
}

#[derive(Deserialize)]
struct GeoSearchQuery {
    #[serde(default)]
    geosearch: Vec<GeoSearchHit>,
}

#[derive(Deserialize, Debug)]
struct GeoSearchHit {
    title: String,
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct Summary {
    title: Option<String>,
    extract: Option<String>,
    content_urls: Option<ContentUrls>,
    thumbnail: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrls>,
}

#[derive(Deserialize)]
struct PageUrls {
    page: Option<String>,
}

#[derive(Deserialize)]
struct Thumbnail {
    source: Option<String>,
}

impl Wikipedia {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Wikipedia {
            client,
            base_url: config.wiki_url.clone(),
        }
    }

    fn geosearch_url(&self, center: Coordinate, radius_meters: u32, limit: u32) -> Result<Url> {
        let mut url = http::endpoint(&self.base_url, &["w", "api.php"])?;
        url.query_pairs_mut()
            .append_pair("origin", "*")
            .append_pair("action", "query")
            .append_pair("list", "geosearch")
            .append_pair(
                "gscoord",
                &format!("{}|{}", center.latitude, center.longitude),
            )
            .append_pair("gsradius", &radius_meters.to_string())
            .append_pair("gslimit", &limit.to_string())
            .append_pair("format", "json");
        Ok(url)
    }

    fn page_url(&self, title: &str) -> Result<Url> {
        http::endpoint(&self.base_url, &["wiki", title])
    }

    async fn geosearch(
        &self,
        center: Coordinate,
        radius_meters: u32,
        limit: u32,
    ) -> Result<Vec<GeoSearchHit>> {
        let url = self.geosearch_url(center, radius_meters, limit)?;
        let response: GeoSearchResponse = http::get_json(GEOSEARCH, self.client.get(url)).await?;
        Ok(response.query.map(|q| q.geosearch).unwrap_or_default())
    }

    async fn summary(&self, title: &str) -> Result<Summary> {
        let url = http::endpoint(&self.base_url, &["api", "rest_v1", "page", "summary", title])?;
        http::get_json(SUMMARY, self.client.get(url)).await
    }

    /// `Ok(None)` means the summary could not be fetched and the hit is omitted.
    async fn hydrate(&self, hit: GeoSearchHit, cancel: &CancelToken) -> Result<Option<Place>> {
        match cancel.run(self.summary(&hit.title)).await {
            Err(e) => Err(e),
            Ok(Ok(summary)) => {
                let fallback = self.page_url(&hit.title)?;
                Ok(Some(summary.into_place(hit, fallback)))
            }
            Ok(Err(e)) => {
                warn!("Dropping {:?} from results: {}", hit.title, e);
                Ok(None)
            }
        }
    }

    async fn lookup(
        &self,
        center: Coordinate,
        radius_meters: u32,
        limit: u32,
        cancel: &CancelToken,
    ) -> Result<Vec<Place>> {
        let hits = cancel
            .run(self.geosearch(center, radius_meters, limit))
            .await??;
        debug!("Geosearch returned {} hits", hits.len());

        let outcomes = join_all(hits.into_iter().map(|hit| self.hydrate(hit, cancel))).await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let places = outcomes
            .into_iter()
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        info!("Found {} places near ({}, {})", places.len(), center.latitude, center.longitude);
        Ok(places)
    }
}

impl Summary {
    fn into_place(self, hit: GeoSearchHit, fallback_url: Url) -> Place {
        Place {
            title: self.title.filter(|t| !t.is_empty()).unwrap_or(hit.title),
            extract: self.extract.unwrap_or_default(),
            url: self
                .content_urls
                .and_then(|urls| urls.desktop)
                .and_then(|desktop| desktop.page)
                .filter(|page| !page.is_empty())
                .unwrap_or_else(|| fallback_url.to_string()),
            image: self
                .thumbnail
                .and_then(|thumbnail| thumbnail.source)
                .filter(|source| !source.is_empty()),
            coordinate: Coordinate::new(hit.lat, hit.lon),
        }
    }
}

impl PlaceLookup for Wikipedia {
    fn nearby<'a>(
        &'a self,
        center: Coordinate,
        radius_meters: u32,
        limit: u32,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<Vec<Place>>> {
        Box::pin(self.lookup(center, radius_meters, limit, cancel))
    }
}
