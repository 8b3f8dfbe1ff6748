//! Receipts and promissory notes stored in a Google Drive folder.

use std::sync::Arc;

use futures_util::future::try_join_all;
use loanbook_core::{drive_view_link, upload_name};
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::store::{AttachmentFile, AttachmentStore, BoxFuture};

use super::config::GoogleConfig;
use super::http::AuthorizedClient;
use super::state::ResourceCache;

const FILES_API: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_API: &str =
    "https://www.googleapis.com/upload/drive/v3/files?uploadType=multipart&fields=id,name,webViewLink";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const BACKEND: &str = "drive";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    trashed: bool,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// [`AttachmentStore`] over the Drive v3 API.
///
/// Uploaded files are shared as "anyone with the link can view" so the links
/// stored in the sheet open without signing in.
pub struct DriveStore {
    client: AuthorizedClient,
    config: GoogleConfig,
    cache: Arc<ResourceCache>,
    folder_id: OnceCell<String>,
}

impl DriveStore {
    pub fn new(client: AuthorizedClient, config: GoogleConfig, cache: Arc<ResourceCache>) -> Self {
        Self {
            client,
            config,
            cache,
            folder_id: OnceCell::new(),
        }
    }

    pub async fn folder_id(&self) -> StoreResult<&str> {
        self.folder_id
            .get_or_try_init(|| self.find_or_create_folder())
            .await
            .map(String::as_str)
    }

    async fn find_or_create_folder(&self) -> StoreResult<String> {
        if let Some(id) = self.cache.folder_id() {
            let url = format!("{}/{}?fields=id,name,trashed", FILES_API, urlencoding::encode(&id));
            match self.client.get_optional::<DriveFile>(&url).await? {
                Some(folder) if !folder.trashed => {
                    debug!(folder_id = %folder.id, "using remembered folder");
                    return Ok(folder.id);
                }
                _ => warn!(folder_id = %id, "remembered folder is gone"),
            }
        }

        let url = format!(
            "{}?q={}&fields=files(id,name)",
            FILES_API,
            urlencoding::encode(&folder_query(&self.config.folder_name))
        );
        let found: FileList = self.client.get(&url).await?;
        let id = match found.files.into_iter().next() {
            Some(folder) => {
                debug!(folder_id = %folder.id, name = %folder.name, "found folder by name");
                folder.id
            }
            None => {
                let body = json!({ "name": self.config.folder_name, "mimeType": FOLDER_MIME });
                let created: DriveFile = self.client.post(FILES_API, &body).await?;
                info!(folder_id = %created.id, name = %self.config.folder_name, "created folder");
                created.id
            }
        };
        self.cache.set_folder_id(Some(id.clone()))?;
        Ok(id)
    }

    async fn upload_one(
        &self,
        folder_id: &str,
        name: String,
        file: AttachmentFile,
    ) -> StoreResult<String> {
        let metadata = json!({ "name": name, "parents": [folder_id] });
        let form = Form::new()
            .part(
                "metadata",
                Part::text(metadata.to_string())
                    .mime_str("application/json; charset=UTF-8")
                    .map_err(|e| upload_error(&name, &e.to_string()))?,
            )
            .part(
                "file",
                Part::bytes(file.bytes)
                    .file_name(name.clone())
                    .mime_str(&file.mime_type)
                    .map_err(|e| upload_error(&name, &e.to_string()))?,
            );

        let request = self.client.request(Method::POST, UPLOAD_API).multipart(form);
        let response = self.client.send(request).await.map_err(|e| wrap(&name, e))?;
        let uploaded: DriveFile = response.json().await.map_err(|e| {
            StoreError::invalid_response(format!("invalid upload response for {}: {}", name, e))
                .with_backend(BACKEND)
        })?;
        debug!(file_id = %uploaded.id, %name, "uploaded file");

        self.share_publicly(&uploaded.id).await;
        Ok(drive_view_link(&uploaded.id))
    }

    /// Lets anyone with the link view the file. A failure leaves the file
    /// private to the owner, which is logged and tolerated.
    async fn share_publicly(&self, file_id: &str) {
        let url = format!("{}/{}/permissions", FILES_API, urlencoding::encode(file_id));
        let body = json!({ "role": "reader", "type": "anyone" });
        let result: StoreResult<Value> = self.client.post(&url, &body).await;
        if let Err(e) = result {
            warn!(%file_id, error = %e, "failed to share file");
        }
    }
}

impl AttachmentStore for DriveStore {
    fn name(&self) -> &str {
        BACKEND
    }

    fn upload_files<'a>(
        &'a self,
        files: Vec<AttachmentFile>,
        name_prefix: &'a str,
    ) -> BoxFuture<'a, StoreResult<Vec<String>>> {
        Box::pin(async move {
            if files.is_empty() {
                return Ok(Vec::new());
            }
            let folder_id = self.folder_id().await?;
            let count = files.len();
            let uploads = files.into_iter().enumerate().map(|(index, file)| {
                let name = upload_name(name_prefix, index, &file.file_name);
                self.upload_one(folder_id, name, file)
            });
            let links = try_join_all(uploads).await?;
            info!(count, prefix = name_prefix, "attachments uploaded");
            Ok(links)
        })
    }

    fn web_url(&self) -> BoxFuture<'_, StoreResult<String>> {
        Box::pin(async move {
            let id = self.folder_id().await?;
            Ok(format!("https://drive.google.com/drive/folders/{}", id))
        })
    }
}

/// Drive search for a live folder with exactly this name.
fn folder_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "name='{}' and mimeType='{}' and trashed=false",
        escaped, FOLDER_MIME
    )
}

fn upload_error(name: &str, reason: &str) -> StoreError {
    StoreError::attachment(format!("failed to upload {}: {}", name, reason)).with_backend(BACKEND)
}

/// Keeps authentication failures as they are so the caller can ask for a
/// new sign-in; anything else becomes an attachment failure.
fn wrap(name: &str, err: StoreError) -> StoreError {
    if err.is_authentication() {
        err
    } else {
        let reason = err.message().to_string();
        upload_error(name, &reason).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreErrorCode;

    #[test]
    fn folder_query_matches_live_folders() {
        assert_eq!(
            folder_query("Loan Attachments"),
            "name='Loan Attachments' and mimeType='application/vnd.google-apps.folder' and trashed=false"
        );
    }

    #[test]
    fn folder_query_escapes_quotes() {
        assert!(folder_query("Ravi's loans").starts_with("name='Ravi\\'s loans'"));
    }

    #[test]
    fn failed_uploads_become_attachment_errors() {
        let err = wrap("loan_Anil_1_a.jpg", StoreError::server("backend error"));
        assert_eq!(err.code(), StoreErrorCode::AttachmentFailed);
        assert!(err.message().contains("loan_Anil_1_a.jpg"));
        assert_eq!(err.backend(), Some("drive"));
    }

    #[test]
    fn authentication_failures_pass_through() {
        let err = wrap("a.jpg", StoreError::authentication("expired"));
        assert!(err.is_authentication());
    }
}
