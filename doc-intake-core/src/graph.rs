//! Microsoft Graph document library: root listing and pre-signed downloads.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{LibraryConfig, RunPolicy};
use crate::contract::{AccessToken, Library, RemoteFile};
use crate::error::{DownloadError, ListError};

#[derive(Debug, Deserialize)]
struct DriveItemPage {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveItem {
    name: String,
    #[serde(rename = "@microsoft.graph.downloadUrl")]
    download_url: Option<String>,
}

/// The root folder of one drive in one SharePoint site.
pub struct GraphLibrary {
    http: Client,
    config: LibraryConfig,
    fail_on_download_status: bool,
}

impl GraphLibrary {
    pub fn new(http: Client, config: LibraryConfig, policy: &RunPolicy) -> Self {
        Self {
            http,
            config,
            fail_on_download_status: policy.fail_on_download_status,
        }
    }

    pub fn children_url(&self) -> String {
        format!(
            "{}/v1.0/sites/{}/drives/{}/root/children",
            self.config.graph_base_url.trim_end_matches('/'),
            self.config.site_id,
            self.config.library_id
        )
    }
}

/// Turn a listing body into descriptors. Items without a download URL (folders) are skipped.
pub fn parse_listing(body: &str) -> Result<Vec<RemoteFile>, ListError> {
    let page: DriveItemPage = serde_json::from_str(body)?;
    if let Some(next) = &page.next_link {
        warn!(next_link = %next, "[LIST] Library has more pages; only the first page is processed");
    }
    let files = page
        .value
        .into_iter()
        .filter_map(|item| match item.download_url {
            Some(download_url) => Some(RemoteFile {
                name: item.name,
                download_url,
            }),
            None => {
                warn!(name = %item.name, "[LIST] Skipping item without download url");
                None
            }
        })
        .collect();
    Ok(files)
}

#[async_trait]
impl Library for GraphLibrary {
    async fn list_files(&self, token: &AccessToken) -> Result<Vec<RemoteFile>, ListError> {
        let url = self.children_url();
        debug!(url = %url, "[LIST] Fetching library children");

        let resp = self
            .http
            .get(&url)
            .header(AUTHORIZATION, token.bearer())
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if status != reqwest::StatusCode::OK {
            return Err(ListError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let files = parse_listing(&body)?;
        info!(count = files.len(), "[LIST] Listed library files");
        Ok(files)
    }

    async fn download(&self, file: &RemoteFile) -> Result<Vec<u8>, DownloadError> {
        let resp = self.http.get(&file.download_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            if self.fail_on_download_status {
                return Err(DownloadError::Status {
                    status: status.as_u16(),
                });
            }
            warn!(file = %file.name, status = %status, "[DOWNLOAD] Non-success download status, forwarding body as file content");
        }
        let bytes = resp.bytes().await?;
        info!(file = %file.name, size = bytes.len(), "[DOWNLOAD] Downloaded file");
        Ok(bytes.to_vec())
    }
}
