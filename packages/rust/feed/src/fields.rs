//! Named structural extractors over the raw text of one `<entry>`.
//!
//! Each extractor addresses a single field by pattern and returns `None`
//! (or `false`, or an empty list) when the field is missing or malformed.
//! No XML parsing happens here; the feed is treated as text.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex"));

static SUMMARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<summary[^>]*>(.*?)</summary>").expect("summary regex"));

static CASE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Expediente:\s*([^\s<,]+)").expect("case number regex"));

static ID_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<id>(.*?)</id>").expect("id regex"));

static PUBLISHED_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Estado:\s*Publicada|>\s*PUB\s*<").expect("status regex")
});

static ISSUE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<cbc:IssueDate>\s*(\d{4}-\d{2}-\d{2})\s*</cbc:IssueDate>")
        .expect("issue date regex")
});

static FEED_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(?:updated|published)>\s*(\d{4}-\d{2}-\d{2})").expect("feed date regex")
});

static TAX_EXCLUSIVE_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<cbc:TaxExclusiveAmount[^>]*>\s*([\d.]+)\s*</cbc:TaxExclusiveAmount>")
        .expect("tax exclusive amount regex")
});

static ESTIMATED_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"<cbc:EstimatedOverallContractAmount[^>]*>\s*([\d.]+)\s*</cbc:EstimatedOverallContractAmount>",
    )
    .expect("estimated amount regex")
});

static CPV_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<cbc:ItemClassificationCode[^>]*>\s*([^<\s]+)\s*<").expect("cpv regex")
});

static AUTHORITY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<cac-place-ext:ContractingAuthorityName[^>]*>(.*?)</cac-place-ext:ContractingAuthorityName>",
    )
    .expect("authority regex")
});

static REALIZED_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<cac:RealizedLocation.*?</cac:RealizedLocation>").expect("location regex")
});

static NOTICE_INFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<cac-place-ext:ValidNoticeInfo>.*?</cac-place-ext:ValidNoticeInfo>")
        .expect("notice info regex")
});

static CONTRACT_NOTICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<cac-place-ext:NoticeTypeCode[^>]*>DOC_CN</cac-place-ext:NoticeTypeCode>")
        .expect("notice type regex")
});

/// Inner text of the first `<title>` element, unprocessed.
pub fn title(entry: &str) -> Option<&str> {
    first_group(&TITLE, entry)
}

/// Inner text of the first `<summary>` element, unprocessed.
pub fn summary(entry: &str) -> Option<&str> {
    first_group(&SUMMARY, entry)
}

/// Case number from an `Expediente: <number>` annotation in the title.
pub fn case_number(entry: &str) -> Option<&str> {
    let title = title(entry)?;
    first_group(&CASE_NUMBER, title)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Last `/`-separated segment of the `<id>` element.
///
/// Falls back to the whole trimmed value when it ends with a slash.
pub fn id_tail(entry: &str) -> Option<&str> {
    let raw = first_group(&ID_ELEMENT, entry)?.trim();
    let tail = raw.rsplit('/').next().unwrap_or_default();
    let id = if tail.is_empty() { raw } else { tail };
    (!id.is_empty()).then_some(id)
}

/// Whether the entry carries a published/active status marker.
pub fn status_is_published(entry: &str) -> bool {
    PUBLISHED_STATUS.is_match(entry)
}

/// Issue date of the entry.
///
/// Prefers `<cbc:IssueDate>`, falling back to the date prefix of
/// `<updated>` or `<published>`. An unparseable date yields `None`.
pub fn issue_date(entry: &str) -> Option<NaiveDate> {
    first_group(&ISSUE_DATE, entry)
        .or_else(|| first_group(&FEED_DATE, entry))
        .and_then(parse_date)
}

/// Budget excluding taxes, falling back to the estimated overall amount.
pub fn budget(entry: &str) -> Option<f64> {
    first_group(&TAX_EXCLUSIVE_AMOUNT, entry)
        .or_else(|| first_group(&ESTIMATED_AMOUNT, entry))
        .and_then(|amount| amount.parse::<f64>().ok())
}

/// Every CPV classification code, in document order.
pub fn cpv_codes(entry: &str) -> Vec<&str> {
    CPV_CODE
        .captures_iter(entry)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Raw contracting authority name.
pub fn authority_name(entry: &str) -> Option<&str> {
    first_group(&AUTHORITY_NAME, entry)
}

/// The `<cac:RealizedLocation>` block describing where the work is executed.
pub fn location_block(entry: &str) -> Option<&str> {
    REALIZED_LOCATION.find(entry).map(|m| m.as_str())
}

/// Latest issue date among contract notices (`DOC_CN`).
pub fn notice_date(entry: &str) -> Option<NaiveDate> {
    NOTICE_INFO
        .find_iter(entry)
        .map(|m| m.as_str())
        .filter(|block| CONTRACT_NOTICE.is_match(block))
        .filter_map(|block| first_group(&ISSUE_DATE, block).and_then(parse_date))
        .max()
}

fn first_group<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}
