//! Photo upload service speaking a small JSON/HTTP API.
//!
//! - `GET  {endpoint}/albums` returns `[{"id": .., "title": ..}]`
//! - `POST {endpoint}/albums/{id}/photos?filename=..` takes the image body and
//!   returns `{"url": ..}`
//!
//! Both requests carry the configured bearer token.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::capture::{Capture, file::generate_filename};
use crate::clipboard::{self, TextClipboard};
use crate::config::{UploadConfig, is_http_url};
use crate::destination::{
    ChildDiscovery, Destination, DestinationError, ExportContext, ExportOperation, Icon,
    ordering::sort_with_default,
};
use crate::i18n::{self, Language};
use crate::notification::Notification;
use crate::plugin::{Acquired, MenuItem, Plugin, PluginContext, PluginError, PluginSetup};
use crate::ui::{DialogResult, SettingsDraft, SettingsSurface};

const SOURCE: &str = "Upload";
pub const CONFIGURE_MENU_ID: &str = "upload.configure";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    pub id: String,
    pub title: String,
}

/// Remote side of the upload plugin.
#[async_trait]
pub trait PhotoService: Send + Sync {
    async fn albums(&self, config: &UploadConfig) -> Result<Vec<Album>, DestinationError>;

    /// Upload `image` and return the public URL of the stored photo.
    async fn upload(
        &self,
        config: &UploadConfig,
        album_id: &str,
        filename: &str,
        mime_type: &str,
        image: Arc<[u8]>,
    ) -> Result<String, DestinationError>;
}

/// reqwest-backed [`PhotoService`].
pub struct HttpPhotoService {
    client: reqwest::Client,
}

impl HttpPhotoService {
    pub fn new() -> Result<Self, DestinationError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("wayscriber-export/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PhotoService for HttpPhotoService {
    async fn albums(&self, config: &UploadConfig) -> Result<Vec<Album>, DestinationError> {
        let url = endpoint_url(&config.endpoint, &["albums"])?;
        log::debug!("Fetching albums from {}", url);
        let body = self
            .client
            .get(url)
            .bearer_auth(&config.token)
            .timeout(Duration::from_secs(config.timeout_secs))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_albums(&body)
    }

    async fn upload(
        &self,
        config: &UploadConfig,
        album_id: &str,
        filename: &str,
        mime_type: &str,
        image: Arc<[u8]>,
    ) -> Result<String, DestinationError> {
        let url = endpoint_url(&config.endpoint, &["albums", album_id, "photos"])?;
        log::debug!("Uploading {} ({} bytes) to {}", filename, image.len(), url);
        let body = self
            .client
            .post(url)
            .bearer_auth(&config.token)
            .query(&[("filename", filename)])
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(image.to_vec())
            .timeout(Duration::from_secs(config.timeout_secs))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_upload_url(&body)
    }
}

/// `endpoint` with `segments` appended as escaped path segments.
pub fn endpoint_url(endpoint: &str, segments: &[&str]) -> Result<url::Url, DestinationError> {
    let mut url = url::Url::parse(endpoint)
        .map_err(|e| DestinationError::Upload(format!("invalid endpoint '{}': {}", endpoint, e)))?;
    url.path_segments_mut()
        .map_err(|_| DestinationError::Upload(format!("invalid endpoint '{}'", endpoint)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Albums from the `/albums` response. Ids may be strings or numbers.
pub fn parse_albums(body: &str) -> Result<Vec<Album>, DestinationError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| DestinationError::InvalidResponse(format!("albums: {}", e)))?;
    let entries = value
        .as_array()
        .ok_or_else(|| DestinationError::InvalidResponse("albums: expected a list".into()))?;

    entries
        .iter()
        .map(|entry| {
            let id = match &entry["id"] {
                serde_json::Value::String(id) => id.clone(),
                serde_json::Value::Number(id) => id.to_string(),
                _ => {
                    return Err(DestinationError::InvalidResponse(
                        "albums: entry without id".into(),
                    ));
                }
            };
            let title = entry["title"]
                .as_str()
                .filter(|title| !title.trim().is_empty())
                .map_or_else(|| id.clone(), str::to_string);
            Ok(Album { id, title })
        })
        .collect()
}

/// Photo URL from the upload response.
pub fn parse_upload_url(body: &str) -> Result<String, DestinationError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| DestinationError::InvalidResponse(format!("upload: {}", e)))?;
    value["url"]
        .as_str()
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .ok_or_else(|| DestinationError::InvalidResponse("upload: response has no url".into()))
}

pub struct UploadPlugin {
    config: Arc<RwLock<UploadConfig>>,
    service: Arc<dyn PhotoService>,
    clipboard: Arc<dyn TextClipboard>,
}

impl UploadPlugin {
    pub fn new(
        config: UploadConfig,
        service: Arc<dyn PhotoService>,
        clipboard: Arc<dyn TextClipboard>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            service,
            clipboard,
        }
    }

    pub fn config(&self) -> UploadConfig {
        self.config.read().clone()
    }

    fn uploader(&self, language: &Arc<Language>) -> Uploader {
        Uploader {
            config: Arc::clone(&self.config),
            service: Arc::clone(&self.service),
            clipboard: Arc::clone(&self.clipboard),
            language: Arc::clone(language),
        }
    }
}

#[async_trait]
impl Plugin for UploadPlugin {
    fn name(&self) -> &str {
        "upload"
    }

    async fn acquire(
        &self,
        context: &PluginContext,
        _cancel: &CancellationToken,
    ) -> Result<Acquired, PluginError> {
        let config = self.config();
        if !config.enabled {
            return Ok(Acquired::Unavailable("upload disabled in config".into()));
        }
        if !is_http_url(config.endpoint.trim()) {
            return Ok(Acquired::Unavailable("no upload endpoint configured".into()));
        }
        if config.token.is_empty() {
            log::warn!("Upload token is empty; the service may reject requests");
        }

        let uploader = self.uploader(&context.language);
        let root = Destination::builder(SOURCE)
            .localized(
                &context.language,
                i18n::DESTINATION_UPLOAD,
                i18n::UPLOAD_ERROR,
            )
            .priority(300)
            .icon(Icon::named("folder-pictures"))
            .export(UploadTo {
                uploader: uploader.clone(),
                album: None,
            })
            .discovery(AlbumDiscovery { uploader })
            .build();

        Ok(Acquired::Available(PluginSetup {
            destinations: vec![root],
            menu_item: Some(MenuItem {
                id: CONFIGURE_MENU_ID.to_string(),
                text_key: i18n::UPLOAD_CONFIGURE.to_string(),
            }),
        }))
    }

    fn configure(&self, surface: &dyn SettingsSurface) -> DialogResult {
        let current = self.config();
        let mut draft = SettingsDraft::new()
            .with("endpoint", current.endpoint.clone())
            .with("token", current.token.clone())
            .with("default_album", current.default_album.clone().unwrap_or_default())
            .with("copy_url", current.copy_url.to_string());

        let result = surface.show("Photo upload", &mut draft);
        if result != DialogResult::Ok {
            return result;
        }

        let mut config = self.config.write();
        if let Some(endpoint) = draft.get("endpoint").map(str::trim) {
            if is_http_url(endpoint) {
                config.endpoint = endpoint.to_string();
            } else {
                log::warn!("Ignoring invalid upload endpoint '{}'", endpoint);
            }
        }
        if let Some(token) = draft.get("token") {
            config.token = token.trim().to_string();
        }
        if let Some(album) = draft.get("default_album").map(str::trim) {
            config.default_album = (!album.is_empty()).then(|| album.to_string());
        }
        match draft.get("copy_url").map(str::parse::<bool>) {
            Some(Ok(copy)) => config.copy_url = copy,
            Some(Err(_)) => log::warn!("Ignoring invalid copy_url value"),
            None => {}
        }
        result
    }
}

#[derive(Clone)]
struct Uploader {
    config: Arc<RwLock<UploadConfig>>,
    service: Arc<dyn PhotoService>,
    clipboard: Arc<dyn TextClipboard>,
    language: Arc<Language>,
}

impl Uploader {
    fn snapshot(&self) -> UploadConfig {
        self.config.read().clone()
    }
}

struct UploadTo {
    uploader: Uploader,
    /// `None` targets the configured default album.
    album: Option<String>,
}

#[async_trait]
impl ExportOperation for UploadTo {
    async fn export(
        &self,
        _context: &ExportContext,
        capture: &Capture,
        cancel: &CancellationToken,
    ) -> Result<Notification, DestinationError> {
        let config = self.uploader.snapshot();
        let album = self
            .album
            .clone()
            .or_else(|| config.default_album.clone())
            .ok_or_else(|| DestinationError::Upload("no default album configured".into()))?;

        let details = capture.details();
        let filename = generate_filename(
            &config.filename_template,
            &details.taken_at,
            capture.extension(),
        )
        .map_err(|_| {
            DestinationError::Upload(format!(
                "invalid filename template '{}'",
                config.filename_template
            ))
        })?;
        let upload = self.uploader.service.upload(
            &config,
            &album,
            &filename,
            &details.mime_type,
            capture.shared_image(),
        );
        let url = tokio::select! {
            url = upload => url?,
            _ = cancel.cancelled() => return Err(DestinationError::Cancelled),
        };
        log::info!("Uploaded {} to album {}: {}", filename, album, url);

        if config.copy_url {
            clipboard::copy_text_async(Arc::clone(&self.uploader.clipboard), url.clone()).await?;
        }

        Ok(Notification::success(
            SOURCE,
            self.uploader
                .language
                .format(i18n::UPLOAD_SUCCESS, &[("url", &url)]),
        ))
    }
}

struct AlbumDiscovery {
    uploader: Uploader,
}

#[async_trait]
impl ChildDiscovery for AlbumDiscovery {
    async fn discover(
        &self,
        _context: &ExportContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<Destination>, DestinationError> {
        let config = self.uploader.snapshot();
        let albums = tokio::select! {
            albums = self.uploader.service.albums(&config) => albums?,
            _ = cancel.cancelled() => return Err(DestinationError::Cancelled),
        };

        let default = config.default_album.as_deref();
        let ordered = sort_with_default(
            albums,
            |album| album.title.as_str(),
            |album| Some(album.id.as_str()) == default,
        );
        Ok(ordered
            .into_iter()
            .map(|album| {
                Destination::builder(album.id.clone())
                    .text(album.title)
                    .localized_failure(&self.uploader.language, i18n::UPLOAD_ERROR)
                    .source(SOURCE)
                    .icon(Icon::named("folder-pictures"))
                    .export(UploadTo {
                        uploader: self.uploader.clone(),
                        album: Some(album.id),
                    })
                    .build()
            })
            .collect())
    }
}
