use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::http;
use crate::types::{Coordinate, GeocodeResult};
use futures::future::BoxFuture;
use log::info;
use serde::Deserialize;
use url::Url;

const SERVICE: &str = "geocoder";

/// Resolves a free-text destination to a single coordinate.
pub trait Geocoder: Send + Sync {
    fn geocode<'a>(
        &'a self,
        query: &'a str,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<GeocodeResult>>;
}

/// Client for the Nominatim `/search` endpoint.
pub struct Nominatim {
    client: reqwest::Client,
    base_url: Url,
    language: String,
}

#[derive(Deserialize)]
struct Candidate {
    lat: String,
    lon: String,
    display_name: String,
}

impl Nominatim {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Nominatim {
            client,
            base_url: config.geocoder_url.clone(),
            language: config.language.clone(),
        }
    }

    /// Asks for exactly one ranked candidate as JSON.
    pub fn search_url(&self, query: &str) -> Result<Url> {
        let mut url = http::endpoint(&self.base_url, &["search"])?;
        url.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("q", query)
            .append_pair("limit", "1");
        Ok(url)
    }

    async fn lookup(&self, query: &str) -> Result<GeocodeResult> {
        let url = self.search_url(query)?;
        let request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT_LANGUAGE, self.language.as_str());
        let candidates: Vec<Candidate> = http::get_json(SERVICE, request).await?;
        let candidate = candidates.into_iter().next().ok_or_else(|| Error::NotFound {
            query: query.to_string(),
        })?;
        let result = candidate.into_result()?;
        info!(
            "Geocoded {:?} to {} ({}, {})",
            query, result.label, result.coordinate.latitude, result.coordinate.longitude
        );
        Ok(result)
    }
}

impl Candidate {
    fn into_result(self) -> Result<GeocodeResult> {
        let latitude = parse_degrees("lat", &self.lat)?;
        let longitude = parse_degrees("lon", &self.lon)?;
        Ok(GeocodeResult {
            coordinate: Coordinate::new(latitude, longitude),
            label: self.display_name,
        })
    }
}

fn parse_degrees(field: &str, text: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|e| Error::Decode(format!("invalid {} {:?}: {}", field, text, e)))
}

impl Geocoder for Nominatim {
    fn geocode<'a>(
        &'a self,
        query: &'a str,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<GeocodeResult>> {
        Box::pin(async move { cancel.run(self.lookup(query)).await? })
    }
}
