//! WARC framing of retrieved pages
//!
//! A loader asset is a WARC/1.0 file: one `warcinfo` record followed by one
//! record per retrieved URL. Plain fetches are archived as `response` records
//! carrying the HTTP exchange. Rendered pages have no HTTP response of their
//! own and are archived as `resource` records holding the serialized DOM. When the asset name ends in `.gz`
//! each record is compressed as its own gzip member, the usual layout of
//! `.warc.gz` files.

use crate::retrieval::{FetchPath, RetrievedPage};
use chrono::SecondsFormat;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::StatusCode;
use std::io::{self, Write};
use uuid::Uuid;

/// Headers not copied into the archived HTTP block; the body is stored decoded
const DROPPED_HEADERS: [&str; 3] = ["content-encoding", "content-length", "transfer-encoding"];

/// Bytes produced by retrieval, ready for the asset store or embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Vec<u8>,

    /// True when `bytes` are gzip framed
    pub compressed: bool,
}

impl Payload {
    /// Frames `pages` as a WARC file, gzip compressed when the asset name asks for it
    pub fn for_asset(target_asset: &str, pages: &[RetrievedPage]) -> io::Result<Self> {
        build_payload(pages, target_asset.ends_with(".gz"))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Frames `pages` as a WARC file
pub fn build_payload(pages: &[RetrievedPage], compressed: bool) -> io::Result<Payload> {
    let mut records = Vec::with_capacity(pages.len() + 1);
    records.push(warcinfo_record());
    records.extend(pages.iter().map(page_record));

    let mut bytes = Vec::new();
    for record in records {
        if compressed {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&record)?;
            bytes.extend(encoder.finish()?);
        } else {
            bytes.extend(record);
        }
    }

    Ok(Payload { bytes, compressed })
}

fn warcinfo_record() -> Vec<u8> {
    let fields = format!(
        "software: grid-loader/{}\r\nformat: WARC File Format 1.0\r\n",
        env!("CARGO_PKG_VERSION")
    );
    record(
        &[
            ("WARC-Type", "warcinfo".to_string()),
            ("WARC-Date", chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("WARC-Record-ID", record_id()),
            ("Content-Type", "application/warc-fields".to_string()),
        ],
        fields.as_bytes(),
    )
}

/// Builds the archive record of one retrieved page
pub fn page_record(page: &RetrievedPage) -> Vec<u8> {
    match (page.path, page.status) {
        (FetchPath::Plain, Some(status)) => response_record(page, status),
        _ => resource_record(page),
    }
}

fn response_record(page: &RetrievedPage, status: u16) -> Vec<u8> {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("");

    let mut block = format!("HTTP/1.1 {} {}\r\n", status, reason).into_bytes();
    for (name, value) in &page.headers {
        if DROPPED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        block.extend(format!("{}: {}\r\n", name, value).into_bytes());
    }
    block.extend(format!("content-length: {}\r\n\r\n", page.body.len()).into_bytes());
    block.extend(&page.body);

    record(
        &[
            ("WARC-Type", "response".to_string()),
            ("WARC-Target-URI", page.url.clone()),
            ("WARC-Date", warc_date(page)),
            ("WARC-Record-ID", record_id()),
            ("Content-Type", "application/http; msgtype=response".to_string()),
        ],
        &block,
    )
}

fn resource_record(page: &RetrievedPage) -> Vec<u8> {
    let content_type = page.content_type().unwrap_or("application/octet-stream");
    record(
        &[
            ("WARC-Type", "resource".to_string()),
            ("WARC-Target-URI", page.url.clone()),
            ("WARC-Date", warc_date(page)),
            ("WARC-Record-ID", record_id()),
            ("Content-Type", content_type.to_string()),
        ],
        &page.body,
    )
}

fn warc_date(page: &RetrievedPage) -> String {
    page.fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn record(headers: &[(&str, String)], block: &[u8]) -> Vec<u8> {
    let mut out = b"WARC/1.0\r\n".to_vec();
    for (name, value) in headers {
        out.extend(format!("{}: {}\r\n", name, value).into_bytes());
    }
    out.extend(format!("Content-Length: {}\r\n\r\n", block.len()).into_bytes());
    out.extend(block);
    out.extend(b"\r\n\r\n");
    out
}

fn record_id() -> String {
    format!("<urn:uuid:{}>", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flate2::read::MultiGzDecoder;
    use std::io::Read;

    fn page(body: &str) -> RetrievedPage {
        RetrievedPage {
            url: "http://yacy.net/".to_string(),
            final_url: "http://yacy.net/".to_string(),
            status: Some(200),
            headers: vec![
                ("content-type".to_string(), "text/html".to_string()),
                ("content-encoding".to_string(), "gzip".to_string()),
            ],
            body: body.as_bytes().to_vec(),
            path: FetchPath::Plain,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_response_record_layout() {
        let record = String::from_utf8(page_record(&page("<html/>"))).unwrap();

        assert!(record.starts_with("WARC/1.0\r\n"));
        assert!(record.contains("WARC-Type: response\r\n"));
        assert!(record.contains("WARC-Target-URI: http://yacy.net/\r\n"));
        assert!(record.contains("HTTP/1.1 200 OK\r\n"));
        assert!(record.contains("content-type: text/html\r\n"));
        assert!(record.contains("content-length: 7\r\n\r\n<html/>"));
        assert!(!record.contains("content-encoding"));
        assert!(record.ends_with("<html/>\r\n\r\n"));
    }

    #[test]
    fn test_rendered_page_is_a_resource_record() {
        let rendered = RetrievedPage::rendered("http://yacy.net/", "<html>dom</html>");
        let record = String::from_utf8(page_record(&rendered)).unwrap();

        assert!(record.contains("WARC-Type: resource\r\n"));
        assert!(record.contains("WARC-Target-URI: http://yacy.net/\r\n"));
        assert!(record.contains("Content-Type: text/html; charset=utf-8\r\n"));
        assert!(record.contains("Content-Length: 16\r\n\r\n<html>dom</html>"));
        assert!(!record.contains("HTTP/1.1"));
    }

    #[test]
    fn test_uncompressed_payload() {
        let payload = Payload::for_asset("a/b.warc", &[page("one"), page("two")]).unwrap();
        let text = String::from_utf8(payload.bytes).unwrap();

        assert!(!payload.compressed);
        assert_eq!(text.matches("WARC/1.0\r\n").count(), 3);
        assert!(text.starts_with("WARC/1.0\r\nWARC-Type: warcinfo"));
    }

    #[test]
    fn test_gz_suffix_compresses_each_record() {
        let plain = build_payload(&[page("content")], false).unwrap();
        let payload = Payload::for_asset("a/b.warc.gz", &[page("content")]).unwrap();

        assert!(payload.compressed);
        assert_eq!(&payload.bytes[..2], &[0x1f, 0x8b]);

        let mut decoded = String::new();
        MultiGzDecoder::new(&payload.bytes[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded.matches("WARC/1.0\r\n").count(), 2);
        assert!(decoded.contains("content-length: 7\r\n\r\ncontent"));
        assert_eq!(decoded.len(), plain.len());
    }
}
