//! Server configuration document and the fallback image gallery.
//!
//! The configuration is treated as an opaque JSON tree: the client loads
//! it, lets callers edit it, and posts it back whole.  Only the few keys
//! the dashboard itself writes (device identity, fallback image) are
//! touched by name.

use serde_json::{Map, Value};
use tracing::{info, warn};
use vinyl_proto::protocol::{paths, DiscoveredDevice, FallbackImage, FallbackImagesResponse, UploadResponse};

use crate::command::Confirmation;
use crate::error::{CommandError, SyncError};
use crate::state::StateStore;
use crate::transport::{server_ack, ApiRequest, SharedTransport};

pub struct SettingsClient {
    transport: SharedTransport,
    store: StateStore,
}

impl SettingsClient {
    pub fn new(transport: SharedTransport, store: StateStore) -> Self {
        Self { transport, store }
    }

    async fn fetch_document(&self) -> Result<Value, SyncError> {
        let body = self.transport.send(ApiRequest::get(paths::CONFIG)).await?.into_body()?;
        if !body.is_object() {
            return Err(SyncError::Protocol("configuration is not an object".to_string()));
        }
        Ok(body)
    }

    async fn post_document(&self, document: &Value) -> Result<(), SyncError> {
        let response = self
            .transport
            .send(ApiRequest::post(paths::CONFIG).with_json(document))
            .await?;
        server_ack(response).map(|_| ())
    }

    pub async fn load(&self) -> Result<Value, SyncError> {
        let result = self.fetch_document().await;
        self.store
            .update(|s| match &result {
                Ok(doc) => {
                    s.settings.document = Some(doc.clone());
                    s.settings.status_text = "Configuration loaded.".to_string();
                }
                Err(e) => {
                    s.settings.status_text = format!("Error loading configuration: {}", e.detail());
                }
            })
            .await;
        result
    }

    /// Post `document` back as the full configuration.
    pub async fn save(&self, document: Value) -> Result<(), SyncError> {
        let result = self.post_document(&document).await;
        match &result {
            Ok(()) => info!("Settings: configuration saved"),
            Err(e) => warn!("Settings: save failed: {}", e),
        }
        self.store
            .update(|s| match &result {
                Ok(()) => {
                    s.settings.document = Some(document);
                    s.settings.status_text = "Saved settings.".to_string();
                }
                Err(e) => s.settings.status_text = format!("Saving failed: {}", e.detail()),
            })
            .await;
        result
    }

    /// Save whatever is currently loaded.
    pub async fn save_loaded(&self) -> Result<(), SyncError> {
        let document = self.store.read().await.settings.document.clone();
        match document {
            Some(doc) => self.save(doc).await,
            None => Err(SyncError::Validation("configuration not loaded".to_string())),
        }
    }

    /// Restore server defaults, then reload the document.
    pub async fn reset(&self, confirmation: Confirmation) -> Result<Value, CommandError> {
        if confirmation != Confirmation::Granted {
            return Err(CommandError::NotConfirmed("reset"));
        }
        let reset = match self.transport.send(ApiRequest::post(paths::CONFIG_RESET)).await {
            Ok(response) => server_ack(response),
            Err(e) => Err(e),
        };
        if let Err(e) = reset {
            warn!("Settings: reset failed: {}", e);
            self.store
                .update(|s| s.settings.status_text = "Reset failed.".to_string())
                .await;
            return Err(e.into());
        }

        info!("Settings: configuration reset to defaults");
        let document = self.load().await?;
        self.store
            .update(|s| s.settings.status_text = "Settings reset to defaults.".to_string())
            .await;
        Ok(document)
    }

    /// Write a discovered device into the stored configuration.  Returns
    /// `false` when the server already had the same identity.
    pub async fn persist_device_identity(&self, device: &DiscoveredDevice) -> Result<bool, SyncError> {
        let mut document = self.fetch_document().await?;
        if !merge_device_identity(&mut document, device) {
            return Ok(false);
        }
        self.post_document(&document).await?;
        self.store.update(|s| s.settings.document = Some(document)).await;
        Ok(true)
    }

    /// Point the loaded configuration at `image_path`.  Takes effect on the
    /// next save.
    pub async fn select_fallback_image(&self, image_path: &str) -> Result<(), SyncError> {
        self.store
            .update(|s| -> Result<(), SyncError> {
                let doc = s
                    .settings
                    .document
                    .as_mut()
                    .ok_or_else(|| SyncError::Validation("configuration not loaded".to_string()))?;
                let fallback = section(doc, "fallback")?;
                fallback.insert("image_path".to_string(), Value::String(image_path.to_string()));
                for image in s.settings.gallery.iter_mut() {
                    image.is_current = image.path == image_path;
                }
                Ok(())
            })
            .await
    }

    // ── Gallery ───────────────────────────────────────────────────────────────

    async fn fetch_gallery(&self) -> Result<Vec<FallbackImage>, SyncError> {
        let response = self.transport.send(ApiRequest::get(paths::FALLBACK_IMAGES)).await?;
        let listing: FallbackImagesResponse = response.parse_object()?;
        if !listing.ok {
            return Err(SyncError::Protocol(listing.error.unwrap_or_else(|| "Error".to_string())));
        }
        Ok(listing.images)
    }

    async fn post_upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, SyncError> {
        let request = ApiRequest::post(paths::FALLBACK_IMAGE).with_file("file", file_name, bytes);
        let upload: UploadResponse = self.transport.send(request).await?.parse_object()?;
        match upload.image_path {
            Some(path) if upload.ok => Ok(path),
            _ => Err(SyncError::Protocol(
                upload.error.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }

    pub async fn list_gallery(&self) -> Result<Vec<FallbackImage>, SyncError> {
        let result = self.fetch_gallery().await;

        self.store
            .update(|s| match &result {
                Ok(images) => {
                    s.settings.gallery_status = if images.is_empty() {
                        "No uploaded fallback images available.".to_string()
                    } else {
                        format!("{} image(s).", images.len())
                    };
                    s.settings.gallery = images.clone();
                }
                Err(_) => {
                    s.settings.gallery.clear();
                    s.settings.gallery_status = "Error loading gallery.".to_string();
                }
            })
            .await;
        result
    }

    /// Upload an image and make it the fallback.  Returns the stored path.
    pub async fn upload_image(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, SyncError> {
        let path = match self.post_upload(file_name, bytes).await {
            Ok(path) => path,
            Err(e) => {
                let text = match &e {
                    SyncError::Network(_) => "Upload failed (network error).".to_string(),
                    other => format!("Upload failed: {}", other.detail()),
                };
                self.store.update(|s| s.settings.gallery_status = text).await;
                return Err(e);
            }
        };

        info!("Settings: uploaded fallback image {}", path);
        let _ = self.list_gallery().await;
        if self.store.read().await.settings.document.is_some() {
            self.select_fallback_image(&path).await?;
        }
        self.store
            .update(|s| s.settings.gallery_status = "Fallback image updated.".to_string())
            .await;
        Ok(path)
    }

    /// Delete an uploaded image, then reload the gallery.
    pub async fn delete_image(&self, file_name: &str, confirmation: Confirmation) -> Result<(), CommandError> {
        if confirmation != Confirmation::Granted {
            return Err(CommandError::NotConfirmed("delete"));
        }
        let path = image_path(file_name)?;
        let result = match self.transport.send(ApiRequest::delete(path)).await {
            Ok(response) => server_ack(response).map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Settings: delete {} failed: {}", file_name, e);
            let text = format!("Deletion failed: {}", e.detail());
            self.store.update(|s| s.settings.gallery_status = text).await;
            return Err(e.into());
        }

        info!("Settings: deleted fallback image {}", file_name);
        self.list_gallery().await?;
        Ok(())
    }
}

/// `/api/fallback-image/<name>` with `name` percent-encoded as one segment.
fn image_path(file_name: &str) -> Result<String, SyncError> {
    if file_name.is_empty() {
        return Err(SyncError::Validation("no image selected".to_string()));
    }
    let mut url = reqwest::Url::parse("http://localhost/")
        .map_err(|e| SyncError::Validation(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| SyncError::Validation("cannot build image path".to_string()))?
        .pop_if_empty()
        .extend(paths::FALLBACK_IMAGE.trim_start_matches('/').split('/'))
        .push(file_name);
    Ok(url.path().to_string())
}

fn section<'a>(document: &'a mut Value, key: &str) -> Result<&'a mut Map<String, Value>, SyncError> {
    let root = document
        .as_object_mut()
        .ok_or_else(|| SyncError::Validation("configuration is not an object".to_string()))?;
    let entry = root.entry(key).or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    entry
        .as_object_mut()
        .ok_or_else(|| SyncError::Validation(format!("{} is not an object", key)))
}

/// Copy the discovered address and ids into the `divoom` section.
/// Absent fields are left as they were.  Returns whether anything changed.
pub fn merge_device_identity(document: &mut Value, device: &DiscoveredDevice) -> bool {
    let Ok(divoom) = section(document, "divoom") else {
        return false;
    };
    let mut changed = false;
    let mut set = |key: &str, value: Value| {
        if divoom.get(key) != Some(&value) {
            divoom.insert(key.to_string(), value);
            changed = true;
        }
    };
    if let Some(ip) = device.device_private_ip.as_deref().filter(|ip| !ip.is_empty()) {
        set("ip", Value::String(ip.to_string()));
    }
    if let Some(id) = device.device_id {
        set("device_id", Value::from(id));
    }
    if let Some(mac) = device.device_mac.as_deref().filter(|mac| !mac.is_empty()) {
        set("device_mac", Value::String(mac.to_string()));
    }
    changed
}

/// `[r, g, b]` → `#rrggbb`.
pub fn rgb_to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// `#rrggbb` (the `#` is optional) → `[r, g, b]`.
pub fn hex_to_rgb(hex: &str) -> Result<[u8; 3], SyncError> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SyncError::Validation(format!("malformed colour {:?}", hex)));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&digits[i..i + 2], 16)
            .map_err(|_| SyncError::Validation(format!("malformed colour {:?}", hex)))
    };
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::DashboardState;
    use crate::testing::FakeTransport;
    use crate::transport::{ApiResponse, Method, RequestBody};

    fn client() -> (std::sync::Arc<FakeTransport>, StateStore, SettingsClient) {
        let fake = FakeTransport::new();
        let store = StateStore::new(DashboardState::new(5, "/logo.png"));
        let client = SettingsClient::new(fake.clone(), store.clone());
        (fake, store, client)
    }

    fn device() -> DiscoveredDevice {
        DiscoveredDevice {
            device_name: Some("Pixoo64".to_string()),
            device_private_ip: Some("192.168.1.42".to_string()),
            device_id: Some(300_123_456),
            device_mac: None,
        }
    }

    #[test]
    fn test_colour_helpers() {
        assert_eq!(rgb_to_hex([255, 255, 255]), "#ffffff");
        assert_eq!(rgb_to_hex([0, 8, 160]), "#0008a0");
        assert_eq!(hex_to_rgb("#0008a0"), Ok([0, 8, 160]));
        assert_eq!(hex_to_rgb("FF8000"), Ok([255, 128, 0]));
        for bad in ["", "#fff", "#12345g", "#1234567", "#ééé"] {
            assert!(matches!(hex_to_rgb(bad), Err(SyncError::Validation(_))), "{:?}", bad);
        }
    }

    #[test]
    fn test_merge_device_identity() {
        let mut doc = json!({"divoom": {"ip": "10.0.0.2", "device_mac": "aa:bb"}, "audio": {"channels": 1}});
        assert!(merge_device_identity(&mut doc, &device()));
        assert_eq!(doc["divoom"]["ip"], "192.168.1.42");
        assert_eq!(doc["divoom"]["device_id"], 300_123_456);
        assert_eq!(doc["divoom"]["device_mac"], "aa:bb");
        assert_eq!(doc["audio"]["channels"], 1);

        assert!(!merge_device_identity(&mut doc, &device()));

        let mut empty = json!({});
        assert!(merge_device_identity(&mut empty, &device()));
        assert_eq!(empty["divoom"]["ip"], "192.168.1.42");
    }

    #[test]
    fn test_image_path_encodes_name() {
        assert_eq!(image_path("cover.png").unwrap(), "/api/fallback-image/cover.png");
        assert_eq!(
            image_path("my cover?.png").unwrap(),
            "/api/fallback-image/my%20cover%3F.png"
        );
        assert!(image_path("").is_err());
    }

    #[tokio::test]
    async fn test_load_and_save_round_trip_document() {
        let (fake, store, client) = client();
        fake.respond(Method::Get, paths::CONFIG, json!({"image": {"text_color": [255, 255, 255]}}));
        fake.respond(Method::Post, paths::CONFIG, json!({"ok": true}));

        let mut doc = client.load().await.unwrap();
        assert_eq!(store.read().await.settings.status_text, "Configuration loaded.");

        doc["image"]["text_color"] = json!(hex_to_rgb("#102030").unwrap());
        client.save(doc).await.unwrap();

        let sent = fake.last(Method::Post, paths::CONFIG).unwrap();
        assert_eq!(sent.body, RequestBody::Json(json!({"image": {"text_color": [16, 32, 48]}})));
        assert_eq!(store.read().await.settings.status_text, "Saved settings.");
    }

    #[tokio::test]
    async fn test_selected_fallback_is_saved_with_loaded_document() {
        let (fake, _store, client) = client();
        assert!(matches!(client.save_loaded().await, Err(SyncError::Validation(_))));
        assert!(fake.requests().is_empty());

        fake.respond(Method::Get, paths::CONFIG, json!({"fallback": {"image_path": "/old.png"}, "x": 1}));
        fake.respond(Method::Post, paths::CONFIG, json!({"ok": true}));
        client.load().await.unwrap();
        client.select_fallback_image("/data/fallback/cat.png").await.unwrap();
        client.save_loaded().await.unwrap();

        let sent = fake.last(Method::Post, paths::CONFIG).unwrap();
        assert_eq!(
            sent.body,
            RequestBody::Json(json!({"fallback": {"image_path": "/data/fallback/cat.png"}, "x": 1}))
        );
    }

    #[tokio::test]
    async fn test_reset_requires_confirmation() {
        let (fake, _store, client) = client();
        assert_eq!(
            client.reset(Confirmation::Denied).await,
            Err(CommandError::NotConfirmed("reset"))
        );
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn test_reset_reloads_document() {
        let (fake, store, client) = client();
        fake.respond(Method::Post, paths::CONFIG_RESET, json!({"ok": true}));
        fake.respond(Method::Get, paths::CONFIG, json!({"divoom": {}}));

        assert_eq!(client.reset(Confirmation::Granted).await, Ok(json!({"divoom": {}})));
        assert_eq!(fake.count(Method::Get, paths::CONFIG), 1);
        assert_eq!(store.read().await.settings.status_text, "Settings reset to defaults.");

        fake.respond_with(Method::Post, paths::CONFIG_RESET, Ok(ApiResponse::with_status(500, Value::Null)));
        assert!(client.reset(Confirmation::Granted).await.is_err());
        assert_eq!(store.read().await.settings.status_text, "Reset failed.");
        assert_eq!(fake.count(Method::Get, paths::CONFIG), 1);
    }

    #[tokio::test]
    async fn test_persist_identity_skips_unchanged() {
        let (fake, _store, client) = client();
        fake.respond(
            Method::Get,
            paths::CONFIG,
            json!({"divoom": {"ip": "192.168.1.42", "device_id": 300_123_456}}),
        );
        assert_eq!(client.persist_device_identity(&device()).await, Ok(false));
        assert_eq!(fake.count(Method::Post, paths::CONFIG), 0);

        fake.respond(Method::Get, paths::CONFIG, json!({"divoom": {"ip": "10.0.0.9"}}));
        fake.respond(Method::Post, paths::CONFIG, json!({"ok": true}));
        assert_eq!(client.persist_device_identity(&device()).await, Ok(true));
        let sent = fake.last(Method::Post, paths::CONFIG).unwrap();
        assert_eq!(sent.json_field("divoom").unwrap()["ip"], "192.168.1.42");
    }

    #[tokio::test]
    async fn test_gallery_upload_and_delete() {
        let (fake, store, client) = client();
        fake.respond(Method::Get, paths::CONFIG, json!({"fallback": {"enabled": true}}));
        client.load().await.unwrap();

        fake.respond(
            Method::Post,
            paths::FALLBACK_IMAGE,
            json!({"ok": true, "image_path": "/data/fallback/cat.png"}),
        );
        fake.respond(
            Method::Get,
            paths::FALLBACK_IMAGES,
            json!({"ok": true, "images": [
                {"filename": "cat.png", "path": "/data/fallback/cat.png", "url": "/fallback/cat.png"},
                {"filename": "dog.png", "path": "/data/fallback/dog.png", "url": "/fallback/dog.png", "is_current": true}
            ]}),
        );

        let path = client.upload_image("cat.png", vec![0x89, 0x50]).await.unwrap();
        assert_eq!(path, "/data/fallback/cat.png");
        let upload = fake.last(Method::Post, paths::FALLBACK_IMAGE).unwrap();
        assert!(matches!(upload.body, RequestBody::File { ref field, .. } if field == "file"));

        let s = store.snapshot().await;
        assert_eq!(s.settings.gallery_status, "Fallback image updated.");
        assert_eq!(
            s.settings.document.as_ref().unwrap()["fallback"]["image_path"],
            "/data/fallback/cat.png"
        );
        assert!(s.settings.gallery[0].is_current);
        assert!(!s.settings.gallery[1].is_current);

        assert_eq!(
            client.delete_image("dog.png", Confirmation::Denied).await,
            Err(CommandError::NotConfirmed("delete"))
        );
        fake.respond(Method::Delete, "/api/fallback-image/dog.png", json!({"ok": true}));
        client.delete_image("dog.png", Confirmation::Granted).await.unwrap();
        assert_eq!(fake.count(Method::Delete, "/api/fallback-image/dog.png"), 1);
        assert_eq!(fake.count(Method::Get, paths::FALLBACK_IMAGES), 2);
    }

    #[tokio::test]
    async fn test_gallery_failures() {
        let (fake, store, client) = client();
        fake.respond(Method::Get, paths::FALLBACK_IMAGES, json!({"ok": true, "images": []}));
        assert_eq!(client.list_gallery().await, Ok(vec![]));
        assert_eq!(
            store.read().await.settings.gallery_status,
            "No uploaded fallback images available."
        );

        fake.respond(Method::Get, paths::FALLBACK_IMAGES, json!({"ok": false, "error": "disk"}));
        assert!(client.list_gallery().await.is_err());
        assert_eq!(store.read().await.settings.gallery_status, "Error loading gallery.");

        fake.respond(Method::Post, paths::FALLBACK_IMAGE, json!({"ok": false, "error": "not an image"}));
        assert!(client.upload_image("notes.txt", b"hi".to_vec()).await.is_err());
        assert_eq!(
            store.read().await.settings.gallery_status,
            "Upload failed: not an image"
        );

        fake.respond_with(
            Method::Delete,
            "/api/fallback-image/gone.png",
            Ok(ApiResponse::with_status(404, json!({"ok": false, "error": "not found"}))),
        );
        assert!(client.delete_image("gone.png", Confirmation::Granted).await.is_err());
        assert_eq!(
            store.read().await.settings.gallery_status,
            "Deletion failed: not found"
        );
    }
}
