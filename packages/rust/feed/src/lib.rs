//! Monthly tender feed ingestion.
//!
//! The public procurement platform publishes one zip per month holding a set
//! of Atom documents. This crate downloads that archive, unpacks the feed
//! documents and splits them into per-entry fragments. Field access goes
//! through the named extractors in [`fields`].

mod archive;
mod extract;
mod fetch;
pub mod fields;

pub use archive::{RawDocument, is_feed_member, unpack};
pub use extract::{extract, extract_all, extract_unique_id};
pub use fetch::{
    ArchivePayload, DownloadOptions, download_archive, monthly_archive_url, parse_month,
    period_label,
};
