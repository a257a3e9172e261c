//! BLS public API (v2) integration for CPI series.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::data::retry::RetryPolicy;
use crate::domain::{Observation, RawSeries, YearRange};
use crate::error::{ConfigError, FetchError, FetchErrorKind};
use crate::logging::Reporter;

const BASE_URL: &str = "https://api.bls.gov/publicAPI/v2/timeseries/data/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Registered v2 keys may request at most 20 years per call.
pub const MAX_YEARS_PER_REQUEST: i32 = 20;
pub const API_KEY_VAR: &str = "BLS_API_KEY";

const STATUS_SUCCEEDED: &str = "REQUEST_SUCCEEDED";

/// Anything that can produce a raw series for a series id and year range.
pub trait SeriesSource {
    fn fetch_series(
        &self,
        series_id: &str,
        years: YearRange,
        reporter: &dyn Reporter,
    ) -> Result<RawSeries, FetchError>;
}

pub struct BlsClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl BlsClient {
    pub fn from_env(retry: RetryPolicy) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let api_key = api_key_from(std::env::var(API_KEY_VAR).ok())?;
        Self::new(api_key, retry)
    }

    pub fn new(api_key: String, retry: RetryPolicy) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            base_url: BASE_URL.to_string(),
            retry,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn fetch_window(&self, series_id: &str, window: YearRange) -> Result<Vec<Observation>, FetchError> {
        let start = window.start.to_string();
        let end = window.end.to_string();
        let body = RequestBody {
            seriesid: [series_id],
            startyear: &start,
            endyear: &end,
            registrationkey: &self.api_key,
        };

        let resp = self
            .client
            .post(&self.base_url)
            .json(&body)
            .send()
            .map_err(|e| FetchError::new(series_id, FetchErrorKind::Transport, format!("BLS request failed: {e}")))?;

        let status = resp.status().as_u16();
        let text = resp.text().map_err(|e| {
            FetchError::new(series_id, FetchErrorKind::Transport, format!("Failed to read BLS response: {e}"))
        })?;

        parse_response(series_id, status, &text)
    }
}

impl SeriesSource for BlsClient {
    fn fetch_series(
        &self,
        series_id: &str,
        years: YearRange,
        reporter: &dyn Reporter,
    ) -> Result<RawSeries, FetchError> {
        let mut observations = Vec::new();
        let mut empty_windows: Vec<String> = Vec::new();
        for window in years.windows(MAX_YEARS_PER_REQUEST) {
            reporter.debug(&format!("Requesting {series_id} for {}-{}", window.start, window.end));
            match self.retry.run(reporter, || self.fetch_window(series_id, window)) {
                Ok(obs) => observations.extend(obs),
                // A window before the series starts or after the last release.
                Err(err) if err.kind == FetchErrorKind::Api && is_no_data_message(&err.message) => {
                    reporter.debug(&format!(
                        "{series_id}: no data for {}-{}: {}",
                        window.start, window.end, err.message
                    ));
                    empty_windows.push(err.message);
                }
                Err(err) => return Err(err),
            }
        }

        observations.sort_by_key(|o| o.date);
        observations.dedup_by_key(|o| o.date);

        if observations.is_empty() {
            let range = format!("{}-{}", years.start, years.end);
            return Err(if empty_windows.is_empty() {
                FetchError::new(
                    series_id,
                    FetchErrorKind::Malformed,
                    format!("No observations returned for {range}."),
                )
            } else {
                FetchError::new(
                    series_id,
                    FetchErrorKind::Api,
                    format!("No observations returned for {range}: {}", empty_windows.join("; ")),
                )
            });
        }

        Ok(RawSeries::new(series_id, observations))
    }
}

/// Resolve the API key from an optional environment value.
pub fn api_key_from(value: Option<String>) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingCredential { var: API_KEY_VAR })
}

#[derive(Debug, Serialize)]
struct RequestBody<'a> {
    seriesid: [&'a str; 1],
    startyear: &'a str,
    endyear: &'a str,
    registrationkey: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: Option<String>,
    #[serde(default)]
    message: Vec<String>,
    #[serde(rename = "Results")]
    results: Option<ApiResults>,
}

#[derive(Debug, Deserialize)]
struct ApiResults {
    series: Option<Vec<ApiSeries>>,
}

#[derive(Debug, Deserialize)]
struct ApiSeries {
    #[serde(rename = "seriesID", default)]
    series_id: Option<String>,
    data: Option<Vec<ApiObservation>>,
}

#[derive(Debug, Deserialize)]
struct ApiObservation {
    year: String,
    period: String,
    value: String,
}

/// Turn an HTTP status and body into observations, classifying failures.
///
/// Observations come back newest-first; the result is ascending by date.
pub fn parse_response(series_id: &str, http_status: u16, body: &str) -> Result<Vec<Observation>, FetchError> {
    let fail = |kind, message: String| FetchError::new(series_id, kind, message);

    match http_status {
        200..=299 => {}
        401 | 403 => return Err(fail(FetchErrorKind::Auth, format!("HTTP {http_status}"))),
        429 => return Err(fail(FetchErrorKind::RateLimited, "HTTP 429".to_string())),
        500..=599 => return Err(fail(FetchErrorKind::Transport, format!("HTTP {http_status}"))),
        _ => return Err(fail(FetchErrorKind::Api, format!("HTTP {http_status}"))),
    }

    let resp: ApiResponse = serde_json::from_str(body)
        .map_err(|e| fail(FetchErrorKind::Malformed, format!("Response is not valid JSON: {e}")))?;

    let status = resp
        .status
        .as_deref()
        .ok_or_else(|| fail(FetchErrorKind::Malformed, "Missing `status` field.".to_string()))?;
    let message = resp.message.join("; ");

    if status != STATUS_SUCCEEDED {
        let detail = if message.is_empty() { status.to_string() } else { message };
        return Err(fail(classify_api_message(&detail), detail));
    }

    let series = resp
        .results
        .ok_or_else(|| fail(FetchErrorKind::Malformed, "Missing `Results` field.".to_string()))?
        .series
        .ok_or_else(|| fail(FetchErrorKind::Malformed, "Missing `series` in Results.".to_string()))?;

    let mut matching = series
        .into_iter()
        .filter(|s| s.series_id.as_deref().is_none_or(|id| id == series_id));
    let entry = matching
        .next()
        .ok_or_else(|| fail(FetchErrorKind::Malformed, "Empty `series` array.".to_string()))?;
    let data = entry
        .data
        .ok_or_else(|| fail(FetchErrorKind::Malformed, "Missing `data` in series.".to_string()))?;

    let mut out = Vec::with_capacity(data.len());
    for item in data {
        let Some(value) = parse_value(&item.value)
            .map_err(|e| fail(FetchErrorKind::Malformed, format!("{e} ({} {})", item.year, item.period)))?
        else {
            continue;
        };
        let year: i32 = item
            .year
            .trim()
            .parse()
            .map_err(|_| fail(FetchErrorKind::Malformed, format!("Invalid year '{}'.", item.year)))?;
        let Some(date) = period_date(year, &item.period) else {
            continue;
        };
        out.push(Observation::new(date, value));
    }

    if out.is_empty() && !message.is_empty() {
        return Err(fail(FetchErrorKind::Api, message));
    }

    out.sort_by_key(|o| o.date);
    Ok(out)
}

/// BLS reports an empty year range as a successful request with a
/// "No Data Available for Series ..." message.
fn is_no_data_message(message: &str) -> bool {
    message.to_ascii_lowercase().contains("no data available")
}

/// Best-effort classification of a non-success API message.
fn classify_api_message(message: &str) -> FetchErrorKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("threshold") || lower.contains("too many") || lower.contains("rate limit") {
        FetchErrorKind::RateLimited
    } else if lower.contains("key") || lower.contains("unauthorized") || lower.contains("registration") {
        FetchErrorKind::Auth
    } else {
        FetchErrorKind::Api
    }
}

/// Monthly periods `M01`..`M12` map to the first of the month. Annual averages
/// (`M13`) and other period kinds are not part of a monthly series.
fn period_date(year: i32, period: &str) -> Option<NaiveDate> {
    let month: u32 = period.strip_prefix('M')?.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// `Ok(None)` for the API's "not available" markers.
fn parse_value(raw: &str) -> Result<Option<f64>, String> {
    let trimmed = raw.trim();
    if trimmed == "-" || trimmed.is_empty() {
        return Ok(None);
    }
    let v = trimmed
        .parse::<f64>()
        .map_err(|_| format!("Invalid value '{trimmed}'"))?;
    if v.is_finite() {
        Ok(Some(v))
    } else {
        Err(format!("Non-finite value '{trimmed}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUCCESS: &str = r#"{
        "status": "REQUEST_SUCCEEDED",
        "responseTime": 120,
        "message": [],
        "Results": {
            "series": [{
                "seriesID": "CUUR0000SA0",
                "data": [
                    {"year": "2024", "period": "M13", "periodName": "Annual", "value": "313.689", "footnotes": [{}]},
                    {"year": "2024", "period": "M02", "periodName": "February", "value": "310.326", "footnotes": [{}]},
                    {"year": "2024", "period": "M01", "periodName": "January", "value": "308.417", "footnotes": [{}]},
                    {"year": "2023", "period": "M12", "periodName": "December", "value": "-", "footnotes": [{}]}
                ]
            }]
        }
    }"#;

    #[test]
    fn parses_monthly_observations_ascending() {
        let obs = parse_response("CUUR0000SA0", 200, SUCCESS).unwrap();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!((obs[0].value - 308.417).abs() < 1e-9);
        assert_eq!(obs[1].date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[test]
    fn invalid_key_is_auth_error() {
        let body = r#"{"status":"REQUEST_NOT_PROCESSED","message":["The key provided by the User is invalid."],"Results":{}}"#;
        let err = parse_response("CUUR0000SA0", 200, body).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Auth);
        assert_eq!(err.series_id, "CUUR0000SA0");
        assert!(!err.kind.is_transient());
    }

    #[test]
    fn daily_threshold_is_rate_limited() {
        let body = r#"{"status":"REQUEST_NOT_PROCESSED","message":["Request could not be serviced, as the daily threshold for total number of requests allocated to the user has been reached."]}"#;
        let err = parse_response("CUUR0000SA0", 200, body).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::RateLimited);
        assert!(err.kind.is_transient());
    }

    #[test]
    fn http_status_classification() {
        assert_eq!(parse_response("X", 401, "").unwrap_err().kind, FetchErrorKind::Auth);
        assert_eq!(parse_response("X", 429, "").unwrap_err().kind, FetchErrorKind::RateLimited);
        assert_eq!(parse_response("X", 503, "").unwrap_err().kind, FetchErrorKind::Transport);
        assert_eq!(parse_response("X", 404, "").unwrap_err().kind, FetchErrorKind::Api);
    }

    #[test]
    fn malformed_bodies_are_reported() {
        assert_eq!(parse_response("X", 200, "<html>").unwrap_err().kind, FetchErrorKind::Malformed);
        assert_eq!(
            parse_response("X", 200, r#"{"message":[]}"#).unwrap_err().kind,
            FetchErrorKind::Malformed
        );
        assert_eq!(
            parse_response("X", 200, r#"{"status":"REQUEST_SUCCEEDED","Results":{"series":[]}}"#)
                .unwrap_err()
                .kind,
            FetchErrorKind::Malformed
        );
        let bad_value = r#"{"status":"REQUEST_SUCCEEDED","Results":{"series":[{"data":[
            {"year":"2024","period":"M01","value":"abc"}]}]}}"#;
        assert_eq!(parse_response("X", 200, bad_value).unwrap_err().kind, FetchErrorKind::Malformed);
    }

    #[test]
    fn unknown_series_surfaces_api_message() {
        let body = r#"{"status":"REQUEST_SUCCEEDED","message":["Series does not exist for Series BOGUS"],
            "Results":{"series":[{"seriesID":"BOGUS","data":[]}]}}"#;
        let err = parse_response("BOGUS", 200, body).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Api);
        assert!(err.message.contains("does not exist"));
    }

    #[test]
    fn period_mapping() {
        assert_eq!(period_date(2024, "M12"), NaiveDate::from_ymd_opt(2024, 12, 1));
        assert_eq!(period_date(2024, "M13"), None);
        assert_eq!(period_date(2024, "S01"), None);
    }

    #[test]
    fn blank_api_key_is_missing() {
        assert!(matches!(api_key_from(None), Err(ConfigError::MissingCredential { .. })));
        assert!(matches!(
            api_key_from(Some("   ".to_string())),
            Err(ConfigError::MissingCredential { .. })
        ));
        assert_eq!(api_key_from(Some(" abc ".to_string())).unwrap(), "abc");
    }

    /// Serve one canned JSON body per connection, in order, and hand back the
    /// request bodies.
    fn serve(bodies: Vec<String>) -> (String, std::thread::JoinHandle<Vec<String>>) {
        use std::io::{BufRead, BufReader, Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let mut requests = Vec::new();
            for body in bodies {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream);
                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().unwrap();
                        }
                    }
                }
                let mut request = vec![0u8; content_length];
                reader.read_exact(&mut request).unwrap();
                requests.push(String::from_utf8(request).unwrap());

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                reader.get_mut().write_all(response.as_bytes()).unwrap();
            }
            requests
        });
        (url, handle)
    }

    fn no_data(year: i32) -> String {
        format!(
            r#"{{"status":"REQUEST_SUCCEEDED","message":["No Data Available for Series CUUR0000SA0 Year: {year}"],
            "Results":{{"series":[{{"seriesID":"CUUR0000SA0","data":[]}}]}}}}"#
        )
    }

    fn client(url: &str) -> BlsClient {
        BlsClient::new("test-key".to_string(), RetryPolicy::none())
            .unwrap()
            .with_base_url(url)
    }

    #[test]
    fn windows_are_merged_and_empty_windows_skipped() {
        let (url, server) = serve(vec![SUCCESS.to_string(), no_data(2026)]);
        let reporter = crate::logging::MemoryReporter::new();

        let series = client(&url)
            .fetch_series("CUUR0000SA0", YearRange::new(2006, 2026).unwrap(), &reporter)
            .unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.first_date(), NaiveDate::from_ymd_opt(2024, 1, 1));
        assert!(reporter.contains(crate::logging::Level::Debug, "no data for 2026-2026"));

        let requests = server.join().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].contains(r#""startyear":"2006""#));
        assert!(requests[0].contains(r#""endyear":"2025""#));
        assert!(requests[1].contains(r#""startyear":"2026""#));
        assert!(requests[1].contains(r#""registrationkey":"test-key""#));
    }

    #[test]
    fn all_windows_empty_reports_api_message() {
        let (url, server) = serve(vec![no_data(2025), no_data(2026)]);
        let reporter = crate::logging::MemoryReporter::new();

        let err = client(&url)
            .fetch_series("CUUR0000SA0", YearRange::new(2006, 2026).unwrap(), &reporter)
            .unwrap_err();

        assert_eq!(err.kind, FetchErrorKind::Api);
        assert!(err.message.contains("No Data Available"));
        server.join().unwrap();
    }

    #[test]
    fn unknown_series_still_fails_on_first_window() {
        let body = r#"{"status":"REQUEST_SUCCEEDED","message":["Series does not exist for Series BOGUS"],
            "Results":{"series":[{"seriesID":"BOGUS","data":[]}]}}"#;
        let (url, server) = serve(vec![body.to_string()]);
        let reporter = crate::logging::MemoryReporter::new();

        let err = client(&url)
            .fetch_series("BOGUS", YearRange::new(2006, 2026).unwrap(), &reporter)
            .unwrap_err();

        assert_eq!(err.kind, FetchErrorKind::Api);
        assert!(err.message.contains("does not exist"));
        assert_eq!(server.join().unwrap().len(), 1);
    }
}
