//! Azure Blob Storage backend over the REST API.

use super::{classify_reqwest, classify_status, ObjectEntry, ObjectStore, ObjectStoreError, StoreResult};
use crate::error::{Result, WarechatError};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use url::Url;

const API_VERSION: &str = "2021-08-06";
const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

/// Refresh tokens this long before Azure says they expire.
const TOKEN_SLACK: Duration = Duration::from_secs(120);

/// How requests to the storage account are authorized.
#[derive(Debug, Clone)]
pub enum AzureCredential {
    /// A SAS token appended to every request URL.
    SharedAccessSignature(String),
    /// A service principal exchanged for bearer tokens.
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Azure Blob Storage object store.
pub struct AzureBlobStore {
    http: reqwest::Client,
    account_url: Url,
    credential: AzureCredential,
    token: RwLock<Option<CachedToken>>,
}

impl AzureBlobStore {
    /// Create a store for `https://<account>.blob.core.windows.net`.
    pub fn new(account: &str, credential: AzureCredential, timeout: Duration) -> Result<Self> {
        let account_url = Url::parse(&format!("https://{}.blob.core.windows.net/", account))
            .map_err(|e| WarechatError::Config(format!("invalid storage account '{}': {}", account, e)))?;
        Self::with_endpoint(account_url, credential, timeout)
    }

    /// Create a store against an explicit endpoint (emulators, sovereign clouds).
    pub fn with_endpoint(account_url: Url, credential: AzureCredential, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            account_url,
            credential,
            token: RwLock::new(None),
        })
    }

    fn object_url(&self, container: &str, name: Option<&str>) -> StoreResult<Url> {
        let mut url = self.account_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ObjectStoreError::Permanent("account URL cannot be a base".to_string()))?;
            segments.pop_if_empty().push(container);
            if let Some(name) = name {
                segments.extend(name.split('/'));
            }
        }
        if let AzureCredential::SharedAccessSignature(sas) = &self.credential {
            let sas = sas.trim_start_matches('?');
            let mut pairs = url.query_pairs_mut();
            for (k, v) in url::form_urlencoded::parse(sas.as_bytes()) {
                pairs.append_pair(&k, &v);
            }
        }
        Ok(url)
    }

    /// Bearer token for service-principal auth, fetched on demand.
    ///
    /// The cache lock is never held while the token request is in flight.
    async fn bearer_token(&self) -> StoreResult<Option<String>> {
        let AzureCredential::ClientSecret {
            tenant_id,
            client_id,
            client_secret,
        } = &self.credential
        else {
            return Ok(None);
        };

        if let Some(cached) = self.token.read().await.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(Some(cached.value.clone()));
            }
        }

        debug!("Requesting Azure storage token for tenant {}", tenant_id);
        let response = self
            .http
            .post(format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                tenant_id
            ))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", STORAGE_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| classify_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &format!("token request failed: {}", body)));
        }

        let token: TokenResponse = response.json().await.map_err(|e| classify_reqwest(&e))?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_SLACK);
        let cached = CachedToken {
            value: token.access_token,
            refresh_at: Instant::now() + lifetime,
        };
        let value = cached.value.clone();
        *self.token.write().await = Some(cached);
        Ok(Some(value))
    }

    async fn send(&self, url: Url) -> StoreResult<reqwest::Response> {
        let mut request = self.http.get(url.clone()).header("x-ms-version", API_VERSION);
        if let Some(token) = self.bearer_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| classify_reqwest(&e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &format!("{} {}", url.path(), body.trim())))
    }
}

#[async_trait]
impl ObjectStore for AzureBlobStore {
    #[instrument(skip(self))]
    async fn list(&self, container: &str, prefix: &str) -> StoreResult<Vec<ObjectEntry>> {
        let mut entries = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = self.object_url(container, None)?;
            {
                let mut pairs = url.query_pairs_mut();
                pairs
                    .append_pair("restype", "container")
                    .append_pair("comp", "list")
                    .append_pair("prefix", prefix);
                if let Some(m) = &marker {
                    pairs.append_pair("marker", m);
                }
            }

            let body = self
                .send(url)
                .await?
                .text()
                .await
                .map_err(|e| classify_reqwest(&e))?;
            let (page, next) = parse_list_response(&body)?;
            debug!("Listed {} blobs (more: {})", page.len(), next.is_some());
            entries.extend(page);

            match next {
                Some(m) => marker = Some(m),
                None => break,
            }
        }

        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn get(&self, container: &str, name: &str) -> StoreResult<Vec<u8>> {
        let url = self.object_url(container, Some(name))?;
        let bytes = self
            .send(url)
            .await?
            .bytes()
            .await
            .map_err(|e| classify_reqwest(&e))?;
        Ok(bytes.to_vec())
    }
}

/// Parse one page of a List Blobs response into entries and the next marker.
fn parse_list_response(xml: &str) -> StoreResult<(Vec<ObjectEntry>, Option<String>)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut entries = Vec::new();
    let mut next_marker = None;
    let mut name: Option<String> = None;
    let mut size: Option<u64> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if tag == "Blob" {
                    name = None;
                    size = None;
                }
                path.push(tag);
            }
            Ok(Event::Text(text)) => {
                let value = text
                    .unescape()
                    .map_err(|e| ObjectStoreError::Permanent(format!("malformed listing: {}", e)))?
                    .into_owned();
                let tail: Vec<&str> = path.iter().rev().take(2).map(String::as_str).collect();
                match tail.as_slice() {
                    ["Name", "Blob"] => name = Some(value),
                    ["Content-Length", "Properties"] => size = value.parse().ok(),
                    ["NextMarker", "EnumerationResults"] if !value.is_empty() => {
                        next_marker = Some(value)
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"Blob" {
                    if let Some(n) = name.take() {
                        entries.push(ObjectEntry::new(n, size.take()));
                    }
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ObjectStoreError::Permanent(format!("malformed listing: {}", e)));
            }
        }
    }

    Ok((entries, next_marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://acct.blob.core.windows.net/" ContainerName="c">
  <Prefix>cam1/chunks/</Prefix>
  <Blobs>
    <Blob>
      <Name>cam1/chunks/ts_chunk_start-30_file.json</Name>
      <Properties><Content-Length>120</Content-Length></Properties>
    </Blob>
    <Blob>
      <Name>cam1/chunks/a&amp;b_chunk_start-0_file.json</Name>
      <Properties><Content-Length>64</Content-Length></Properties>
    </Blob>
  </Blobs>
  <NextMarker>page2</NextMarker>
</EnumerationResults>"#;

    #[test]
    fn test_parse_list_response() {
        let (entries, marker) = parse_list_response(PAGE).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "cam1/chunks/ts_chunk_start-30_file.json");
        assert_eq!(entries[0].size, Some(120));
        assert_eq!(entries[1].name, "cam1/chunks/a&b_chunk_start-0_file.json");
        assert_eq!(marker.as_deref(), Some("page2"));
    }

    #[test]
    fn test_parse_last_page_has_no_marker() {
        let xml = "<EnumerationResults><Blobs></Blobs><NextMarker /></EnumerationResults>";
        let (entries, marker) = parse_list_response(xml).unwrap();
        assert!(entries.is_empty());
        assert!(marker.is_none());
    }

    #[test]
    fn test_object_url_with_sas() {
        let store = AzureBlobStore::new(
            "acct",
            AzureCredential::SharedAccessSignature("?sv=2021&sig=abc%2B".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();

        let url = store.object_url("c", Some("cam1/chunks/x y.json")).unwrap();
        assert_eq!(url.host_str(), Some("acct.blob.core.windows.net"));
        assert_eq!(url.path(), "/c/cam1/chunks/x%20y.json");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("sig".to_string(), "abc+".to_string())));
    }
}
