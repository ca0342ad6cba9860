//! Azure Blob Storage implementation of `BlobStore`.
//!
//! Talks to the Blob service REST API directly, authorized by appending a
//! pre-shared SAS token to every request. The store never holds account
//! keys; the token comes from configuration and is passed in at
//! construction.

use super::{
    BlobStore, ObjectRecord, PROGRESS_CHUNK, ProgressReporter, ProgressSender, StoreError,
    StoreResult, ensure_key_safe,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream;
use reqwest::{
    StatusCode,
    header::{CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED},
};
use serde::Deserialize;
use std::{collections::HashMap, io};

/// Service version sent with every request. SAS tokens carry their own
/// signed version; this pins the wire format of responses.
const API_VERSION: &str = "2021-12-02";

/// Prefix Azure uses for user metadata headers.
const META_HEADER_PREFIX: &str = "x-ms-meta-";

#[derive(Clone)]
pub struct AzureStore {
    client: reqwest::Client,
    container_name: String,
    /// `https://{account}.blob.core.windows.net/{container}`
    container_url: String,
    /// SAS query string without the leading `?`.
    sas_token: String,
}

impl AzureStore {
    pub fn new(account: &str, container: &str, sas_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            container_name: container.to_string(),
            container_url: format!("https://{}.blob.core.windows.net/{}", account, container),
            sas_token: sas_token.trim_start_matches('?').to_string(),
        }
    }

    fn container_op_url(&self, query: &str) -> String {
        format!("{}?{}&{}", self.container_url, query, self.sas_token)
    }

    fn blob_url(&self, key: &str) -> String {
        format!("{}/{}?{}", self.container_url, encode_key(key), self.sas_token)
    }

    async fn backend_error(resp: reqwest::Response) -> StoreError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        StoreError::Backend(format!("{}: {}", status, snippet))
    }
}

/// Percent-encode each path segment of a key while keeping the `/`
/// separators addressable.
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn parse_http_date(value: Option<&str>) -> DateTime<Utc> {
    value
        .and_then(|raw| DateTime::parse_from_rfc2822(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

// --- List Blobs XML (`EnumerationResults`) ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResults {
    blobs: Option<BlobList>,
    next_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    blob: Vec<BlobEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobEntry {
    name: String,
    #[serde(default)]
    properties: BlobProperties,
    metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize, Default)]
struct BlobProperties {
    #[serde(rename = "Content-Length")]
    content_length: Option<i64>,
    #[serde(rename = "Content-Type")]
    content_type: Option<String>,
    #[serde(rename = "Last-Modified")]
    last_modified: Option<String>,
}

impl BlobEntry {
    fn into_record(self) -> ObjectRecord {
        ObjectRecord {
            key: self.name,
            size_bytes: self.properties.content_length.unwrap_or(0),
            content_type: self
                .properties
                .content_type
                .filter(|value| !value.is_empty()),
            last_modified: parse_http_date(self.properties.last_modified.as_deref()),
            metadata: self.metadata.unwrap_or_default(),
        }
    }
}

/// Parse one page of a List Blobs response. Returns the records plus the
/// continuation marker, with Azure's empty `<NextMarker />` normalized to
/// `None`.
fn parse_list_page(xml: &str) -> StoreResult<(Vec<ObjectRecord>, Option<String>)> {
    let page: EnumerationResults = quick_xml::de::from_str(xml)?;
    let records = page
        .blobs
        .map(|list| list.blob.into_iter().map(BlobEntry::into_record).collect())
        .unwrap_or_default();
    let marker = page.next_marker.filter(|marker| !marker.is_empty());
    Ok((records, marker))
}

#[async_trait]
impl BlobStore for AzureStore {
    async fn ensure_container(&self) -> StoreResult<()> {
        let resp = self
            .client
            .put(self.container_op_url("restype=container"))
            .header("x-ms-version", API_VERSION)
            .send()
            .await?;
        match resp.status() {
            StatusCode::CREATED => Ok(()),
            StatusCode::CONFLICT => Ok(()),
            _ => Err(Self::backend_error(resp).await),
        }
    }

    async fn container_exists(&self) -> StoreResult<bool> {
        let resp = self
            .client
            .get(self.container_op_url("restype=container"))
            .header("x-ms-version", API_VERSION)
            .send()
            .await?;
        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::backend_error(resp).await),
        }
    }

    /// Flat enumeration, draining the service's `NextMarker` continuation
    /// until the listing is complete.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectRecord>> {
        let mut records = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut query = format!(
                "restype=container&comp=list&include=metadata&prefix={}",
                urlencoding::encode(prefix)
            );
            if let Some(marker) = &marker {
                query.push_str("&marker=");
                query.push_str(&urlencoding::encode(marker));
            }
            let resp = self
                .client
                .get(self.container_op_url(&query))
                .header("x-ms-version", API_VERSION)
                .send()
                .await?;
            if resp.status() == StatusCode::NOT_FOUND {
                return Err(StoreError::ContainerNotFound(self.container_name.clone()));
            }
            if !resp.status().is_success() {
                return Err(Self::backend_error(resp).await);
            }

            let (page, next) = parse_list_page(&resp.text().await?)?;
            records.extend(page);
            match next {
                Some(next) => marker = Some(next),
                None => return Ok(records),
            }
        }
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<String>,
        metadata: HashMap<String, String>,
        progress: Option<ProgressSender>,
    ) -> StoreResult<ObjectRecord> {
        ensure_key_safe(key)?;

        let total = body.len();
        let mut reporter = ProgressReporter::new(progress, total as u64);
        if body.is_empty() {
            reporter.advance(0);
        }

        // Hand the payload to the transport in chunks so progress tracks
        // bytes actually pulled onto the wire.
        let mut chunks = Vec::new();
        let mut offset = 0;
        while offset < total {
            let end = (offset + PROGRESS_CHUNK).min(total);
            chunks.push(body.slice(offset..end));
            offset = end;
        }
        let chunk_stream = stream::iter(chunks.into_iter().map(move |chunk| {
            reporter.advance(chunk.len() as u64);
            Ok::<_, io::Error>(chunk)
        }));

        let mut request = self
            .client
            .put(self.blob_url(key))
            .header("x-ms-version", API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .header(CONTENT_LENGTH, total);
        if let Some(content_type) = &content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        for (name, value) in &metadata {
            request = request.header(format!("{}{}", META_HEADER_PREFIX, name), value);
        }

        let resp = request
            .body(reqwest::Body::wrap_stream(chunk_stream))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::backend_error(resp).await);
        }

        let last_modified = parse_http_date(
            resp.headers()
                .get(LAST_MODIFIED)
                .and_then(|value| value.to_str().ok()),
        );
        Ok(ObjectRecord {
            key: key.to_string(),
            size_bytes: total as i64,
            content_type,
            last_modified,
            metadata,
        })
    }

    async fn get(&self, key: &str) -> StoreResult<(ObjectRecord, Bytes)> {
        ensure_key_safe(key)?;
        let resp = self
            .client
            .get(self.blob_url(key))
            .header("x-ms-version", API_VERSION)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(key.to_string()));
        }
        if !resp.status().is_success() {
            return Err(Self::backend_error(resp).await);
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let last_modified = parse_http_date(
            resp.headers()
                .get(LAST_MODIFIED)
                .and_then(|value| value.to_str().ok()),
        );
        let mut metadata = HashMap::new();
        for (name, value) in resp.headers() {
            if let Some(meta_key) = name.as_str().strip_prefix(META_HEADER_PREFIX) {
                if let Ok(value) = value.to_str() {
                    metadata.insert(meta_key.to_string(), value.to_string());
                }
            }
        }

        let body = resp.bytes().await?;
        let record = ObjectRecord {
            key: key.to_string(),
            size_bytes: body.len() as i64,
            content_type,
            last_modified,
            metadata,
        };
        Ok((record, body))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        ensure_key_safe(key)?;
        let resp = self
            .client
            .delete(self.blob_url(key))
            .header("x-ms-version", API_VERSION)
            .send()
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(key.to_string())),
            status if status.is_success() => Ok(()),
            _ => Err(Self::backend_error(resp).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_PAGE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://acct.blob.core.windows.net/" ContainerName="documents">
  <Blobs>
    <Blob>
      <Name>tax-documents/report.pdf</Name>
      <Properties>
        <Last-Modified>Tue, 04 Mar 2025 17:10:05 GMT</Last-Modified>
        <Content-Length>2048</Content-Length>
        <Content-Type>application/pdf</Content-Type>
      </Properties>
      <Metadata><client>acme</client></Metadata>
    </Blob>
    <Blob>
      <Name>tax-documents/.keep</Name>
      <Properties>
        <Last-Modified>not a date</Last-Modified>
        <Content-Length>44</Content-Length>
        <Content-Type></Content-Type>
      </Properties>
    </Blob>
  </Blobs>
  <NextMarker>marker-token</NextMarker>
</EnumerationResults>"#;

    #[test]
    fn parses_a_list_page() {
        let (records, marker) = parse_list_page(LIST_PAGE).unwrap();
        assert_eq!(marker.as_deref(), Some("marker-token"));
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].key, "tax-documents/report.pdf");
        assert_eq!(records[0].size_bytes, 2048);
        assert_eq!(records[0].content_type.as_deref(), Some("application/pdf"));
        assert_eq!(
            records[0].metadata.get("client").map(String::as_str),
            Some("acme")
        );

        // Empty content type and an unparseable date degrade, not fail.
        assert_eq!(records[1].content_type, None);
        assert!(records[1].metadata.is_empty());
    }

    #[test]
    fn empty_next_marker_ends_the_listing() {
        let xml = r#"<EnumerationResults><Blobs></Blobs><NextMarker /></EnumerationResults>"#;
        let (records, marker) = parse_list_page(xml).unwrap();
        assert!(records.is_empty());
        assert_eq!(marker, None);
    }

    #[test]
    fn list_page_without_blobs_is_empty() {
        let xml = r#"<EnumerationResults></EnumerationResults>"#;
        let (records, marker) = parse_list_page(xml).unwrap();
        assert!(records.is_empty());
        assert_eq!(marker, None);
    }

    #[test]
    fn keys_are_segment_encoded() {
        assert_eq!(
            encode_key("tax documents/q1 report.pdf"),
            "tax%20documents/q1%20report.pdf"
        );
        assert_eq!(encode_key("plain.txt"), "plain.txt");
    }

    #[test]
    fn blob_urls_keep_the_sas_query() {
        let store = AzureStore::new("acct", "documents", "?sv=2021&sig=abc");
        assert_eq!(
            store.blob_url("a/b.txt"),
            "https://acct.blob.core.windows.net/documents/a/b.txt?sv=2021&sig=abc"
        );
        assert_eq!(
            store.container_op_url("restype=container"),
            "https://acct.blob.core.windows.net/documents?restype=container&sv=2021&sig=abc"
        );
    }
}
