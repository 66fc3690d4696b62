//! Binary object store: upload-by-path returning a fetchable URL, delete-by-path.

use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Error;

/// Largest accepted image upload.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub url: String,
    pub path: String,
}

pub trait ObjectStore: Send + Sync {
    fn put<'a>(&'a self, path: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, crate::Result<StoredObject>>;
    fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, crate::Result<()>>;
    /// The public URL an object at `path` is served from.
    fn url(&self, path: &str) -> String;
    /// Whether an object has been stored at `path`. Invalid paths never exist.
    fn exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, crate::Result<bool>>;
}

pub type Storage = Arc<dyn ObjectStore>;

/// Objects stored as files under `root`, served from `base_url`.
pub struct LocalStore {
    root: PathBuf,
    base_url: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    fn resolve(&self, path: &str) -> crate::Result<PathBuf> {
        let relative = Path::new(path);
        let clean = !path.is_empty()
            && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(Error::Storage(format!("invalid object path `{path}`")));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for LocalStore {
    fn put<'a>(&'a self, path: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, crate::Result<StoredObject>> {
        Box::pin(async move {
            let file = self.resolve(path)?;
            if let Some(parent) = file.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&file, bytes).await?;
            debug!("stored {path}");
            Ok(StoredObject {
                url: self.url(path),
                path: path.to_owned(),
            })
        })
    }

    fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, crate::Result<()>> {
        Box::pin(async move {
            match tokio::fs::remove_file(self.resolve(path)?).await {
                Ok(()) => {
                    debug!("deleted {path}");
                    Ok(())
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    warn!("delete of missing object {path}");
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, crate::Result<bool>> {
        Box::pin(async move {
            let Ok(file) = self.resolve(path) else {
                return Ok(false);
            };
            Ok(tokio::fs::try_exists(file).await?)
        })
    }
}

/// File extension for an accepted image content type; `None` rejects the upload.
pub fn image_extension(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let subtype = mime.strip_prefix("image/")?;
    Some(match subtype {
        "png" => "png",
        "jpeg" | "jpg" => "jpg",
        "gif" => "gif",
        "webp" => "webp",
        "avif" => "avif",
        _ => "img",
    })
}

/// Checks an upload against the image rules and names its extension.
pub fn check_image(content_type: Option<&str>, len: usize) -> crate::Result<&'static str> {
    let ext = content_type
        .and_then(image_extension)
        .ok_or_else(|| Error::validation("Por favor selecciona un archivo de imagen válido"))?;
    if len > MAX_IMAGE_BYTES {
        return Err(Error::validation("La imagen debe ser menor a 5MB"));
    }
    if len == 0 {
        return Err(Error::validation("La imagen está vacía"));
    }
    Ok(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), "http://localhost:8080/files/");

        let stored = store.put("chat/general/u1/a.png", vec![1, 2, 3]).await.unwrap();
        assert_eq!(stored.url, "http://localhost:8080/files/chat/general/u1/a.png");
        assert_eq!(std::fs::read(dir.path().join("chat/general/u1/a.png")).unwrap(), [1, 2, 3]);

        assert!(store.exists(&stored.path).await.unwrap());
        store.delete(&stored.path).await.unwrap();
        assert!(!dir.path().join("chat/general/u1/a.png").exists());
        assert!(!store.exists(&stored.path).await.unwrap());
        // second delete is a no-op
        store.delete(&stored.path).await.unwrap();
    }

    #[tokio::test]
    async fn paths_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), "/files");

        for path in ["../x.png", "/etc/passwd", "", "a/../../b"] {
            assert!(matches!(store.put(path, vec![0]).await, Err(Error::Storage(_))), "{path}");
            assert!(!store.exists(path).await.unwrap(), "{path}");
        }
    }

    #[test]
    fn only_images_under_limit() {
        assert_eq!(check_image(Some("image/jpeg"), 10).unwrap(), "jpg");
        assert_eq!(check_image(Some("image/PNG; charset=binary"), 10).unwrap(), "png");
        assert!(check_image(Some("text/plain"), 10).is_err());
        assert!(check_image(None, 10).is_err());
        assert!(check_image(Some("image/png"), MAX_IMAGE_BYTES + 1).is_err());
    }
}
