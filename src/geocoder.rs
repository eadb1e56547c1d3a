//! Free-text location to coordinates.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// All matches for `query`, best first. An empty list is not an error here.
    async fn search(&self, query: &str) -> Result<Vec<Coordinates>>;
}

/// OpenStreetMap Nominatim search API.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    url: String,
}

impl NominatimGeocoder {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            url: NOMINATIM_URL.to_string(),
        }
    }

    pub fn with_url(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn search(&self, query: &str) -> Result<Vec<Coordinates>> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Nominatim error {}: {}", status, body);
        }

        let json: Value = response.json().await?;
        parse_nominatim_response(&json)
    }
}

/// Nominatim returns coordinates as strings: `[{"lat": "50.84", "lon": "4.35"}]`.
fn parse_nominatim_response(json: &Value) -> Result<Vec<Coordinates>> {
    let places = json
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid Nominatim response: expected an array"))?;

    let mut results = Vec::with_capacity(places.len());
    for place in places {
        let (Some(lat), Some(lon)) = (coordinate(place, "lat"), coordinate(place, "lon")) else {
            continue;
        };
        results.push(Coordinates { lat, lon });
    }
    Ok(results)
}

fn coordinate(place: &Value, key: &str) -> Option<f64> {
    match place.get(key)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}
