//! Retrieval of the monthly archive over HTTP.

use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use reqwest::Client;
use tenderwatch_shared::{Result, TenderWatchError};
use tracing::{info, instrument};

/// Default download timeout in seconds. Monthly archives run to hundreds of MB.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// User-Agent string for archive requests.
const USER_AGENT: &str = concat!("TenderWatch/", env!("CARGO_PKG_VERSION"));

/// Options for [`download_archive`].
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub timeout_secs: u64,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// A downloaded (or locally read) archive and the month it covers.
#[derive(Debug, Clone)]
pub struct ArchivePayload {
    pub bytes: Vec<u8>,
    /// Month label in `MM/YYYY` form.
    pub period: String,
}

/// Build the archive URL for the month containing `date`: `<base>_<YYYYMM>.zip`.
pub fn monthly_archive_url(base: &str, date: NaiveDate) -> String {
    format!(
        "{}_{:04}{:02}.zip",
        base.trim_end_matches('/'),
        date.year(),
        date.month()
    )
}

/// `MM/YYYY` label for the month containing `date`.
pub fn period_label(date: NaiveDate) -> String {
    format!("{:02}/{:04}", date.month(), date.year())
}

/// Parse a `YYYYMM` month selector into the first day of that month.
pub fn parse_month(raw: &str) -> Result<NaiveDate> {
    let invalid = || TenderWatchError::validation(format!("invalid month {raw:?}, expected YYYYMM"));
    if raw.len() != 6 || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let year: i32 = raw[..4].parse().map_err(|_| invalid())?;
    let month: u32 = raw[4..].parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)
}

/// Download the archive for the month containing `date`.
#[instrument(skip_all, fields(url = %url))]
pub async fn download_archive(
    url: &str,
    date: NaiveDate,
    opts: &DownloadOptions,
) -> Result<ArchivePayload> {
    let client = build_client(opts)?;

    info!(period = %period_label(date), "downloading monthly archive");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| TenderWatchError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(TenderWatchError::Network(format!("{url}: HTTP {status}")));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| TenderWatchError::Network(format!("{url}: failed to read body: {e}")))?;

    info!(
        megabytes = %format!("{:.1}", bytes.len() as f64 / 1024.0 / 1024.0),
        "archive downloaded"
    );

    Ok(ArchivePayload {
        bytes: bytes.to_vec(),
        period: period_label(date),
    })
}

fn build_client(opts: &DownloadOptions) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(opts.timeout_secs))
        .build()
        .map_err(|e| TenderWatchError::Network(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn may_2024() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
    }

    #[test]
    fn url_uses_year_and_month() {
        assert_eq!(
            monthly_archive_url("https://host/feed/licitacionesCompleto3", may_2024()),
            "https://host/feed/licitacionesCompleto3_202405.zip"
        );
        assert_eq!(period_label(may_2024()), "05/2024");
    }

    #[test]
    fn month_selector_parsing() {
        assert_eq!(parse_month("202412").unwrap(), NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert!(parse_month("202413").is_err());
        assert!(parse_month("2024-1").is_err());
        assert!(parse_month("").is_err());
    }

    #[tokio::test]
    async fn download_returns_bytes_and_period() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/feed_202405.zip"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04".to_vec()))
            .mount(&server)
            .await;

        let url = monthly_archive_url(&format!("{}/feed", server.uri()), may_2024());
        let payload = download_archive(&url, may_2024(), &DownloadOptions::default())
            .await
            .unwrap();

        assert_eq!(payload.bytes, b"PK\x03\x04");
        assert_eq!(payload.period, "05/2024");
    }

    #[tokio::test]
    async fn download_http_error_is_network_error() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/missing.zip", server.uri());
        let err = download_archive(&url, may_2024(), &DownloadOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, TenderWatchError::Network(_)));
        assert!(err.to_string().contains("404"));
    }
}
