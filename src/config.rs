use crate::error::Result;
use clap::Args;
use std::time::Duration;
use url::Url;

const MIN_RADIUS_METERS: u32 = 10;
const MAX_RADIUS_METERS: u32 = 10_000;
const MAX_LIMIT: u32 = 500;

/// Service endpoints and search tuning, settable by flag or environment.
#[derive(Args, Debug, Clone)]
pub struct Config {
    #[arg(
        long,
        value_name = "URL",
        env = "PLACEFINDER_GEOCODER_URL",
        default_value = "https://nominatim.openstreetmap.org",
        help = "Base URL of the Nominatim-compatible geocoding service"
    )]
    pub geocoder_url: Url,
    #[arg(
        long,
        value_name = "URL",
        env = "PLACEFINDER_WIKI_URL",
        default_value = "https://en.wikipedia.org",
        help = "Base URL of the MediaWiki site used for nearby places"
    )]
    pub wiki_url: Url,
    #[arg(
        long,
        env = "PLACEFINDER_LANGUAGE",
        default_value = "en",
        help = "Preferred language for geocoding labels"
    )]
    pub language: String,
    #[arg(
        long,
        value_name = "METERS",
        env = "PLACEFINDER_RADIUS",
        default_value_t = 10_000,
        help = "Search radius around the destination (10-10000)"
    )]
    pub radius: u32,
    #[arg(
        long,
        env = "PLACEFINDER_LIMIT",
        default_value_t = 6,
        help = "Maximum number of places to return"
    )]
    pub limit: u32,
    #[arg(
        long,
        env = "PLACEFINDER_ZOOM",
        default_value_t = 6,
        help = "Map zoom level used when centering on a destination"
    )]
    pub zoom: u8,
    #[arg(
        long,
        value_name = "SECS",
        env = "PLACEFINDER_TIMEOUT_SECS",
        default_value_t = 15,
        help = "Per-request timeout"
    )]
    pub timeout_secs: u64,
    #[arg(
        long,
        env = "PLACEFINDER_USER_AGENT",
        default_value = concat!("placefinder/", env!("CARGO_PKG_VERSION")),
        help = "User-Agent sent to the upstream services"
    )]
    pub user_agent: String,
    #[arg(
        long,
        value_name = "MS",
        env = "PLACEFINDER_DEBOUNCE_MS",
        default_value_t = 0,
        help = "Wait this long after the last input before searching (0 disables)"
    )]
    pub debounce_ms: u64,
}

impl Config {
    /// Geosearch rejects radii outside 10..=10000 meters.
    pub fn radius_meters(&self) -> u32 {
        self.radius.clamp(MIN_RADIUS_METERS, MAX_RADIUS_METERS)
    }

    pub fn result_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_LIMIT)
    }

    pub fn debounce(&self) -> Option<Duration> {
        match self.debounce_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .user_agent(self.user_agent.clone())
            .build()?)
    }
}

#[cfg(test)]
pub(crate) fn test_config(geocoder_url: &str, wiki_url: &str) -> Config {
    Config {
        geocoder_url: Url::parse(geocoder_url).unwrap(),
        wiki_url: Url::parse(wiki_url).unwrap(),
        language: "en".to_string(),
        radius: 10_000,
        limit: 6,
        zoom: 6,
        timeout_secs: 5,
        user_agent: "placefinder-test".to_string(),
        debounce_ms: 0,
    }
}

/// Local test servers must not be routed through an ambient proxy.
#[cfg(test)]
pub(crate) fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
