//! # blob: Azure Blob Storage archiver
//!
//! Writes each file with a single `Put Blob` (BlockBlob) request, which replaces an existing blob
//! of the same name. The storage account comes from a standard connection string:
//!
//! - `DefaultEndpointsProtocol`, `AccountName`, `AccountKey`, `EndpointSuffix` for the public cloud
//! - `BlobEndpoint` to point at a custom endpoint (private link, Azurite, tests)
//! - `SharedAccessSignature` instead of `AccountKey` for SAS-token access
//! - `UseDevelopmentStorage=true` for the local emulator
//!
//! Requests with an account key are signed with SharedKey (HMAC-SHA256 over the canonical
//! request, see [`string_to_sign`]). SAS requests carry the token in the query string.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use sha2::Sha256;
use tracing::{debug, info};
use url::Url;

use crate::config::BlobConfig;
use crate::contract::Archiver;
use crate::error::{ArchiveError, ConfigError};

type HmacSha256 = Hmac<Sha256>;

pub const API_VERSION: &str = "2021-08-06";
pub const BLOB_CONTENT_TYPE: &str = "application/octet-stream";

const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

#[derive(Clone)]
pub enum BlobAuth {
    SharedKey { account_name: String, key: Vec<u8> },
    Sas(String),
}

/// A parsed storage account: where blobs live and how requests authenticate.
#[derive(Clone)]
pub struct StorageAccount {
    pub blob_endpoint: Url,
    pub auth: BlobAuth,
}

impl StorageAccount {
    pub fn from_connection_string(conn: &str) -> Result<Self, ConfigError> {
        let mut entries: HashMap<String, String> = HashMap::new();
        for entry in conn.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            // Account keys end in '=' padding, so only the first '=' separates key from value.
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedEntry(entry.to_string()))?;
            entries.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        if entries
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return Ok(Self {
                blob_endpoint: Url::parse(DEV_BLOB_ENDPOINT)?,
                auth: BlobAuth::SharedKey {
                    account_name: DEV_ACCOUNT_NAME.to_string(),
                    key: STANDARD.decode(DEV_ACCOUNT_KEY)?,
                },
            });
        }

        let account_name = entries.get("accountname").cloned();
        let blob_endpoint = match entries.get("blobendpoint") {
            Some(endpoint) => Url::parse(endpoint)?,
            None => {
                let account = account_name
                    .as_deref()
                    .ok_or(ConfigError::MissingKey("AccountName"))?;
                let protocol = entries
                    .get("defaultendpointsprotocol")
                    .map(String::as_str)
                    .unwrap_or("https");
                let suffix = entries
                    .get("endpointsuffix")
                    .map(String::as_str)
                    .unwrap_or("core.windows.net");
                Url::parse(&format!("{protocol}://{account}.blob.{suffix}"))?
            }
        };
        if blob_endpoint.cannot_be_a_base() {
            return Err(ConfigError::Url(
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }

        let auth = match (entries.get("accountkey"), entries.get("sharedaccesssignature")) {
            (Some(key), _) => BlobAuth::SharedKey {
                account_name: account_name.ok_or(ConfigError::MissingKey("AccountName"))?,
                key: STANDARD.decode(key)?,
            },
            (None, Some(sas)) => BlobAuth::Sas(sas.trim_start_matches('?').to_string()),
            (None, None) => {
                return Err(ConfigError::MissingKey(
                    "AccountKey or SharedAccessSignature",
                ))
            }
        };

        Ok(Self {
            blob_endpoint,
            auth,
        })
    }

    /// `{endpoint}/{container}/{name}`, each segment percent-encoded. '/' in a name is kept as a
    /// virtual directory separator.
    pub fn blob_url(&self, container: &str, name: &str) -> Result<Url, ArchiveError> {
        let mut url = self.blob_endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            segments.pop_if_empty().push(container);
            for part in name.split('/') {
                segments.push(part);
            }
        }
        if let BlobAuth::Sas(sas) = &self.auth {
            url.set_query(Some(sas));
        }
        Ok(url)
    }
}

/// Canonical string for a SharedKey-signed `PUT` (storage service version 2015-02-21 or later).
pub fn string_to_sign(
    account_name: &str,
    url: &Url,
    content_length: usize,
    content_type: &str,
    ms_headers: &[(&str, &str)],
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let mut headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .collect();
    headers.sort();
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect();

    let mut resource = format!("/{}{}", account_name, url.path());
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.into_owned()))
        .collect();
    params.sort();
    for (k, v) in params {
        resource.push_str(&format!("\n{k}:{v}"));
    }

    format!("PUT\n\n\n{length}\n\n{content_type}\n\n\n\n\n\n\n{canonical_headers}{resource}")
}

pub fn sign(key: &[u8], string_to_sign: &str) -> Result<String, ArchiveError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| ArchiveError::SigningKey)?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

pub struct BlobArchiver {
    http: Client,
    account: StorageAccount,
    container: String,
}

impl BlobArchiver {
    pub fn new(http: Client, config: &BlobConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            http,
            account: StorageAccount::from_connection_string(&config.connection_string)?,
            container: config.container.clone(),
        })
    }
}

#[async_trait]
impl Archiver for BlobArchiver {
    async fn store(&self, name: &str, content: &[u8]) -> Result<(), ArchiveError> {
        let url = self.account.blob_url(&self.container, name)?;
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        let ms_headers = [
            ("x-ms-blob-type", "BlockBlob"),
            ("x-ms-date", date.as_str()),
            ("x-ms-version", API_VERSION),
        ];

        let mut req = self
            .http
            .put(url.clone())
            .header(CONTENT_TYPE, BLOB_CONTENT_TYPE);
        for (k, v) in ms_headers {
            req = req.header(k, v);
        }
        if let BlobAuth::SharedKey { account_name, key } = &self.account.auth {
            let canonical = string_to_sign(
                account_name,
                &url,
                content.len(),
                BLOB_CONTENT_TYPE,
                &ms_headers,
            );
            debug!(canonical = %canonical, "[ARCHIVE] SharedKey string to sign");
            req = req.header(
                AUTHORIZATION,
                format!("SharedKey {}:{}", account_name, sign(key, &canonical)?),
            );
        }

        let resp = req.body(content.to_vec()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ArchiveError::Status {
                status: status.as_u16(),
                body,
            });
        }
        info!(file = %name, container = %self.container, "[ARCHIVE] Stored file in Blob Storage");
        Ok(())
    }
}
