//! Provider listing client
//!
//! Asks JRA-DB which dataset files were published since a watermark. The
//! answer is a small XML document:
//!
//! ```xml
//! <list xmlns="...">
//!   <nextexectime>20240601000000</nextexectime>
//!   <url category="XHOS">http://jradb.jp/.../EXjrshos.dat.zip</url>
//!   ...
//! </list>
//! ```
//!
//! The default namespace is neutralized before parsing so element names can
//! be matched as written.

use jradb_common::types::{Category, FeedClass, Watermark};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, info, instrument, warn};

use crate::category::CategoryRegistry;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::http::ProviderClient;

/// One file to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadCandidate {
    pub category: Category,
    pub url: String,
}

/// Filtered result of one listing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedListing {
    pub feed: FeedClass,
    pub candidates: Vec<DownloadCandidate>,
    /// Provider's suggestion for the next `fromtime`
    pub suggested_next: Option<Watermark>,
}

impl FeedListing {
    pub fn empty(feed: FeedClass) -> Self {
        Self {
            feed,
            candidates: Vec::new(),
            suggested_next: None,
        }
    }
}

/// Unfiltered content of a listing document
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ListingDocument {
    /// First `nextexectime` text, if non-empty
    pub next_exec_time: Option<String>,
    /// `(category, url)` pairs in document order
    pub entries: Vec<(String, String)>,
}

pub struct ListingClient {
    http: ProviderClient,
    list_url: String,
    registry: CategoryRegistry,
}

impl ListingClient {
    pub fn new(config: &SyncConfig, http: ProviderClient) -> Self {
        Self {
            http,
            list_url: config.provider.list_url.clone(),
            registry: config.registry.clone(),
        }
    }

    /// Query one feed class for files published since `since`
    #[instrument(skip(self), fields(feed = %feed, since = %since))]
    pub async fn list(&self, feed: FeedClass, since: &Watermark) -> Result<FeedListing> {
        let query = [("data", feed.wire_value()), ("fromtime", since.as_str())];
        let (http, list_url, query) = (&self.http, self.list_url.as_str(), &query);
        let body = http
            .with_retry(&format!("Listing {feed}"), move || async move {
                let response = http.get(list_url, query).await?;
                Ok(response.bytes().await?)
            })
            .await?;

        let text = neutralize_default_namespace(&String::from_utf8_lossy(&body));
        let document = parse_listing(&text)?;
        let listing = self.filter(feed, document);

        info!(
            candidates = listing.candidates.len(),
            next = ?listing.suggested_next.as_ref().map(Watermark::as_str),
            "Listing received"
        );
        Ok(listing)
    }

    /// Apply the allow-list and validate the suggested watermark
    pub fn filter(&self, feed: FeedClass, document: ListingDocument) -> FeedListing {
        let suggested_next = document.next_exec_time.and_then(|raw| match Watermark::parse(&raw) {
            Ok(watermark) => Some(watermark),
            Err(e) => {
                warn!(feed = %feed, error = %e, "Ignoring invalid nextexectime");
                None
            },
        });

        let mut candidates = Vec::new();
        for (code, url) in document.entries {
            let Some(category) = self.registry.lookup(&code) else {
                debug!(feed = %feed, code = %code, "Category not enabled, skipping");
                continue;
            };

            let expected = category.expected_filename();
            if url_filename(&url).as_deref() != Some(expected) {
                debug!(
                    category = %category,
                    expected,
                    url = %url,
                    "Filename differs from the usual one for this category"
                );
            }
            candidates.push(DownloadCandidate { category, url });
        }

        FeedListing {
            feed,
            candidates,
            suggested_next,
        }
    }
}

/// Rename default namespace declarations so they no longer apply
pub fn neutralize_default_namespace(xml: &str) -> String {
    xml.replace(" xmlns=", " ignore=")
}

/// Parse a listing document.
///
/// `nextexectime` and `url` elements are collected wherever they appear.
/// `url` elements without a category or a URL are skipped.
pub fn parse_listing(xml: &str) -> Result<ListingDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut document = ListingDocument::default();
    let mut depth = 0usize;
    let mut seen_root = false;
    let mut in_next = false;
    let mut next_text = String::new();
    let mut current_url: Option<(Option<String>, String)> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            SyncError::Listing(format!(
                "malformed XML at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(start) => {
                if depth == 0 && seen_root {
                    return Err(SyncError::Listing("multiple root elements".to_string()));
                }
                seen_root = true;
                depth += 1;

                match start.local_name().as_ref() {
                    b"nextexectime" => {
                        in_next = true;
                        next_text.clear();
                    },
                    b"url" => current_url = Some((category_attr(&start)?, String::new())),
                    _ => {},
                }
            },
            Event::Empty(start) => {
                if depth == 0 && seen_root {
                    return Err(SyncError::Listing("multiple root elements".to_string()));
                }
                seen_root = true;

                if start.local_name().as_ref() == b"url" {
                    push_entry(&mut document, category_attr(&start)?, String::new());
                }
            },
            Event::End(end) => {
                depth = depth.saturating_sub(1);
                match end.local_name().as_ref() {
                    b"nextexectime" if in_next => {
                        in_next = false;
                        let text = next_text.trim();
                        if document.next_exec_time.is_none() && !text.is_empty() {
                            document.next_exec_time = Some(text.to_string());
                        }
                    },
                    b"url" => {
                        if let Some((category, url)) = current_url.take() {
                            push_entry(&mut document, category, url);
                        }
                    },
                    _ => {},
                }
            },
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|e| SyncError::Listing(format!("bad text content: {e}")))?;
                append_text(&value, in_next, &mut next_text, &mut current_url);
            },
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data).into_owned();
                append_text(&value, in_next, &mut next_text, &mut current_url);
            },
            Event::Eof => break,
            _ => {},
        }
    }

    if !seen_root {
        return Err(SyncError::Listing("document has no root element".to_string()));
    }
    if depth != 0 {
        return Err(SyncError::Listing("document ends inside an element".to_string()));
    }

    Ok(document)
}

fn category_attr(start: &BytesStart<'_>) -> Result<Option<String>> {
    let attr = start
        .try_get_attribute("category")
        .map_err(|e| SyncError::Listing(format!("bad attribute: {e}")))?;
    match attr {
        Some(attr) => {
            let value = attr
                .unescape_value()
                .map_err(|e| SyncError::Listing(format!("bad category attribute: {e}")))?;
            let value = value.trim();
            Ok((!value.is_empty()).then(|| value.to_string()))
        },
        None => Ok(None),
    }
}

fn append_text(
    value: &str,
    in_next: bool,
    next_text: &mut String,
    current_url: &mut Option<(Option<String>, String)>,
) {
    if in_next {
        next_text.push_str(value);
    } else if let Some((_, url)) = current_url.as_mut() {
        url.push_str(value);
    }
}

fn push_entry(document: &mut ListingDocument, category: Option<String>, url: String) {
    let url = url.trim();
    match category {
        Some(category) if !url.is_empty() => {
            document.entries.push((category, url.to_string()));
        },
        Some(category) => warn!(category = %category, "Skipping url element without a URL"),
        None => warn!(url = %url, "Skipping url element without a category"),
    }
}

/// Last path segment of a URL, percent-decoded
pub fn url_filename(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let decoded = String::from_utf8_lossy(&urlencoding::decode_binary(segment.as_bytes())).into_owned();
    (!decoded.is_empty()).then_some(decoded)
}
