//! Open-Meteo daily forecast connector.
//!
//! A free-text location is geocoded (first match wins), the forecast API is
//! queried for a fixed set of daily attributes, and every returned day
//! becomes one entry at midnight UTC of that day.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use reqwest::Url;
use serde::Deserialize;

use crate::error::SparkError;
use crate::geocoder::{Coordinates, Geocoder};
use crate::models::Entry;
use crate::timeparse::utc_midnight;

pub const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

const DAILY_ATTRIBUTES: [&str; 9] = [
    "temperature_2m_min",
    "temperature_2m_max",
    "sunrise",
    "sunset",
    "rain_sum",
    "temperature_2m_mean",
    "snowfall_sum",
    "showers_sum",
    "wind_speed_10m_max",
];

/// Days of history and forecast to request.
#[derive(Debug, Clone, Copy)]
pub struct ForecastRange {
    pub past_days: u32,
    pub forecast_days: u32,
}

impl Default for ForecastRange {
    fn default() -> Self {
        Self {
            past_days: 1,
            forecast_days: 7,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct Forecast {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub daily_units: DailyUnits,
    #[serde(default)]
    pub daily: Daily,
}

#[derive(Debug, Deserialize, Default)]
pub struct DailyUnits {
    #[serde(default)]
    pub rain_sum: String,
    #[serde(default)]
    pub showers_sum: String,
    #[serde(default)]
    pub snowfall_sum: String,
    #[serde(default)]
    pub temperature_2m_max: String,
    #[serde(default)]
    pub temperature_2m_mean: String,
    #[serde(default)]
    pub temperature_2m_min: String,
    #[serde(default)]
    pub wind_speed_10m_max: String,
}

/// Column-oriented: index `i` of every vector describes `time[i]`.
#[derive(Debug, Deserialize, Default)]
pub struct Daily {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub sunrise: Vec<Option<String>>,
    #[serde(default)]
    pub sunset: Vec<Option<String>>,
    #[serde(default)]
    pub rain_sum: Vec<Option<f64>>,
    #[serde(default)]
    pub showers_sum: Vec<Option<f64>>,
    #[serde(default)]
    pub snowfall_sum: Vec<Option<f64>>,
    #[serde(default)]
    pub temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    pub temperature_2m_mean: Vec<Option<f64>>,
    #[serde(default)]
    pub temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    pub wind_speed_10m_max: Vec<Option<f64>>,
}

pub fn forecast_url(base: &str, at: Coordinates, tz: &Tz, range: ForecastRange) -> Result<Url> {
    let params = [
        ("latitude", at.lat.to_string()),
        ("longitude", at.lon.to_string()),
        ("daily", DAILY_ATTRIBUTES.join(",")),
        ("timezone", tz.name().to_string()),
        ("past_days", range.past_days.to_string()),
        ("forecast_days", range.forecast_days.to_string()),
    ];
    Url::parse_with_params(base, &params).context("Failed to build forecast URL")
}

/// Decode a forecast response body.
///
/// The API signals failures as `{"error": true, "reason": "..."}`; that is
/// surfaced as [`SparkError::Provider`].
pub fn parse_forecast(body: &[u8]) -> Result<Forecast> {
    let json: serde_json::Value =
        serde_json::from_slice(body).context("Failed to decode forecast response")?;

    if json.get("error").and_then(|v| v.as_bool()) == Some(true) {
        let reason = json
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown reason");
        return Err(SparkError::Provider(format!("could not get forecast: {}", reason)).into());
    }

    serde_json::from_value(json).context("Unexpected forecast response")
}

pub fn entries_from_forecast(forecast: &Forecast, location: &str) -> Result<Vec<Entry>> {
    let daily = &forecast.daily;
    let units = &forecast.daily_units;

    let mut entries = Vec::with_capacity(daily.time.len());
    for (i, day) in daily.time.iter().enumerate() {
        let Ok(date) = NaiveDate::parse_from_str(day, "%Y-%m-%d") else {
            tracing::warn!(day = %day, "skipping forecast day with invalid date");
            continue;
        };

        let mut entry = Entry::new(
            utc_midnight(date),
            format!("Weather for {} in {}", date.format("%A"), location),
        );

        entry.set_metadata("Sunrise", text_at(&daily.sunrise, i));
        entry.set_metadata("Sunset", text_at(&daily.sunset, i));
        entry.set_metadata(
            "Mean temperature",
            format!("{:.1} {}", value_at(&daily.temperature_2m_mean, i), units.temperature_2m_mean),
        );
        entry.set_metadata(
            "Max temperature",
            format!("{:.1} {}", value_at(&daily.temperature_2m_max, i), units.temperature_2m_max),
        );
        entry.set_metadata(
            "Min temperature",
            format!("{:.1} {}", value_at(&daily.temperature_2m_min, i), units.temperature_2m_min),
        );
        entry.set_metadata(
            "Rain sum",
            format!("{:.0} {}", value_at(&daily.rain_sum, i), units.rain_sum),
        );
        entry.set_metadata(
            "Showers sum",
            format!("{:.0} {}", value_at(&daily.showers_sum, i), units.showers_sum),
        );
        entry.set_metadata(
            "Snowfall sum",
            format!("{:.0} {}", value_at(&daily.snowfall_sum, i), units.snowfall_sum),
        );
        entry.set_metadata(
            "Windspeed max",
            format!("{:.1} {}", value_at(&daily.wind_speed_10m_max, i), units.wind_speed_10m_max),
        );
        entry.set_metadata("Latitude", forecast.latitude);
        entry.set_metadata("Longitude", forecast.longitude);

        entries.push(entry);
    }

    if entries.is_empty() {
        return Err(SparkError::EmptyFeed(format!("no forecast days for {}", location)).into());
    }
    Ok(entries)
}

fn value_at(values: &[Option<f64>], i: usize) -> f64 {
    values.get(i).copied().flatten().unwrap_or_default()
}

fn text_at(values: &[Option<String>], i: usize) -> String {
    values.get(i).cloned().flatten().unwrap_or_default()
}

/// Geocode `location`, fetch its forecast and build the entries.
pub async fn fetch_forecast_entries(
    client: &reqwest::Client,
    geocoder: &dyn Geocoder,
    base_url: &str,
    location: &str,
    tz: &Tz,
    range: ForecastRange,
) -> Result<Vec<Entry>> {
    let at = geocoder
        .search(location)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| SparkError::NoLocation(location.to_string()))?;
    tracing::debug!(location, lat = at.lat, lon = at.lon, "geocoded");

    let url = forecast_url(base_url, at, tz, range)?;
    let response = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("Request to {} failed", url))?;
    let status = response.status();
    let body = response.bytes().await?;

    // Error bodies carry the provider's own reason; read those first.
    let forecast = match parse_forecast(&body) {
        Err(e) if !status.is_success() && e.downcast_ref::<SparkError>().is_none() => {
            return Err(SparkError::Http {
                status: status.as_u16(),
                uri: url.to_string(),
            }
            .into())
        }
        other => other?,
    };

    entries_from_forecast(&forecast, location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    const BODY: &str = r#"{
        "latitude": 50.85,
        "longitude": 4.35,
        "daily_units": {
            "time": "iso8601",
            "temperature_2m_min": "°C",
            "temperature_2m_max": "°C",
            "temperature_2m_mean": "°C",
            "sunrise": "iso8601",
            "sunset": "iso8601",
            "rain_sum": "mm",
            "showers_sum": "mm",
            "snowfall_sum": "cm",
            "wind_speed_10m_max": "km/h"
        },
        "daily": {
            "time": ["2024-06-01", "2024-06-02"],
            "temperature_2m_min": [8.04, 9.5],
            "temperature_2m_max": [19.96, 21.0],
            "temperature_2m_mean": [14.0, null],
            "sunrise": ["2024-06-01T05:33", "2024-06-02T05:32"],
            "sunset": ["2024-06-01T21:50", "2024-06-02T21:51"],
            "rain_sum": [2.6, 0.0],
            "showers_sum": [0.4, 0.0],
            "snowfall_sum": [0.0, 0.0],
            "wind_speed_10m_max": [15.27, 12.0]
        }
    }"#;

    #[test]
    fn test_entries_from_forecast() {
        let forecast = parse_forecast(BODY.as_bytes()).unwrap();
        let entries = entries_from_forecast(&forecast, "Brussels").unwrap();
        assert_eq!(entries.len(), 2);

        let e = &entries[0];
        assert_eq!(e.summary, "Weather for Saturday in Brussels");
        assert_eq!(e.date, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        assert_eq!(e.metadata["Min temperature"], "8.0 °C");
        assert_eq!(e.metadata["Max temperature"], "20.0 °C");
        assert_eq!(e.metadata["Mean temperature"], "14.0 °C");
        assert_eq!(e.metadata["Rain sum"], "3 mm");
        assert_eq!(e.metadata["Showers sum"], "0 mm");
        assert_eq!(e.metadata["Snowfall sum"], "0 cm");
        assert_eq!(e.metadata["Windspeed max"], "15.3 km/h");
        assert_eq!(e.metadata["Sunrise"], "2024-06-01T05:33");
        assert_eq!(e.metadata["Latitude"], 50.85);
        assert_eq!(e.metadata["Longitude"], 4.35);

        assert_eq!(entries[1].summary, "Weather for Sunday in Brussels");
        assert_eq!(entries[1].metadata["Mean temperature"], "0.0 °C");
    }

    #[test]
    fn test_provider_error_is_surfaced() {
        let body = br#"{"error": true, "reason": "Cannot initialize WeatherVariable from invalid String value"}"#;
        let err = parse_forecast(body).unwrap_err();
        match err.downcast_ref::<SparkError>() {
            Some(SparkError::Provider(msg)) => assert!(msg.contains("invalid String value")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_no_days_is_an_error() {
        let forecast = parse_forecast(br#"{"latitude": 1.0, "longitude": 2.0, "daily": {"time": []}}"#)
            .unwrap();
        assert!(entries_from_forecast(&forecast, "Nowhere").is_err());
    }

    #[test]
    fn test_forecast_url() {
        let tz: Tz = "Europe/Brussels".parse().unwrap();
        let url = forecast_url(
            FORECAST_URL,
            Coordinates { lat: 50.85, lon: 4.35 },
            &tz,
            ForecastRange { past_days: 1, forecast_days: 7 },
        )
        .unwrap();

        let pairs: std::collections::HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(url.host_str(), Some("api.open-meteo.com"));
        assert_eq!(pairs["latitude"], "50.85");
        assert_eq!(pairs["longitude"], "4.35");
        assert_eq!(pairs["timezone"], "Europe/Brussels");
        assert_eq!(pairs["past_days"], "1");
        assert_eq!(pairs["forecast_days"], "7");
        assert_eq!(pairs["daily"].split(',').count(), 9);
    }

    struct NoResults;

    #[async_trait]
    impl Geocoder for NoResults {
        async fn search(&self, _query: &str) -> Result<Vec<Coordinates>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_unknown_location_is_an_error() {
        let client = reqwest::Client::new();
        let err = fetch_forecast_entries(
            &client,
            &NoResults,
            FORECAST_URL,
            "Atlantis",
            &Tz::UTC,
            ForecastRange::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "no location found for \"Atlantis\"");
    }
}
