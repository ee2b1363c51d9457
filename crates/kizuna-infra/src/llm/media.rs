//! Image resolution for providers that need inline base64.
//!
//! Anthropic and Gemini cannot fetch our media URLs, so image parts are
//! resolved to base64 before the request leaves the process: inline data
//! URLs are decoded in place, and URLs pointing at our own media paths
//! are read from the media root on disk. Anything else stays unresolved
//! and degrades to a text placeholder at the call site.

use std::path::{Component, Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// An image payload ready for an inline block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub mime_type: String,
    pub base64: String,
}

/// Resolves image URLs to base64 payloads.
#[derive(Debug, Clone)]
pub struct MediaResolver {
    media_root: Option<PathBuf>,
}

impl MediaResolver {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = media_root.into();
        Self {
            media_root: if root.as_os_str().is_empty() { None } else { Some(root) },
        }
    }

    /// A resolver with no local media root; only data URLs resolve.
    pub fn data_urls_only() -> Self {
        Self { media_root: None }
    }

    /// Resolve a URL-ish string to an inline payload, if possible.
    pub async fn resolve(&self, url_like: &str) -> Option<ResolvedImage> {
        let trimmed = url_like.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(image) = parse_data_url(trimmed) {
            return Some(image);
        }

        let root = self.media_root.as_deref()?;
        let key = media_key_from_url(trimmed)?;
        let path = resolve_under_root(root, &key)?;

        let bytes = tokio::fs::read(&path).await.ok()?;
        let mime_type = read_meta_content_type(&path)
            .await
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Some(ResolvedImage {
            mime_type,
            base64: BASE64.encode(bytes),
        })
    }
}

/// Decode a `data:<mime>;base64,<payload>` URL.
fn parse_data_url(raw: &str) -> Option<ResolvedImage> {
    let rest = raw.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    if !header.to_lowercase().contains(";base64") {
        return None;
    }
    let mime_type = header
        .to_lowercase()
        .replace(";base64", "")
        .trim()
        .to_string();
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    // Validate the payload so a corrupt attachment fails here, not at the vendor.
    BASE64.decode(data).ok()?;
    Some(ResolvedImage {
        mime_type: if mime_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            mime_type
        },
        base64: data.to_string(),
    })
}

/// Extract the media key from one of our own media URL paths:
/// `/media/<key>` or `/media-s/<sig>/<exp>/<key>`.
fn media_key_from_url(url_like: &str) -> Option<String> {
    let pathname = url::path_of(url_like)?;
    if let Some(key) = pathname.strip_prefix("/media/") {
        let key = key.trim_start_matches('/');
        return (!key.is_empty()).then(|| key.to_string());
    }
    if let Some(rest) = pathname.strip_prefix("/media-s/") {
        let parts: Vec<&str> = rest.split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() >= 3 {
            return Some(parts[2..].join("/"));
        }
    }
    None
}

/// Minimal URL path extraction; avoids a full URL parser dependency.
mod url {
    pub fn path_of(url_like: &str) -> Option<String> {
        let rest = url_like.split_once("://").map_or(url_like, |(_, rest)| rest);
        let path_start = rest.find('/')?;
        let path = &rest[path_start..];
        let path = path.split(['?', '#']).next().unwrap_or(path);
        Some(path.to_string())
    }
}

/// Join `key` under `root`, refusing traversal components.
fn resolve_under_root(root: &Path, key: &str) -> Option<PathBuf> {
    let normalized = key.trim_start_matches('/').replace('\\', "/");
    if normalized.is_empty() {
        return None;
    }
    let relative = Path::new(&normalized);
    for component in relative.components() {
        match component {
            Component::Normal(_) => {}
            _ => return None,
        }
    }
    Some(root.join(relative))
}

/// Content type from the `<file>.meta.json` sidecar, if present.
async fn read_meta_content_type(path: &Path) -> Option<String> {
    let meta_path = PathBuf::from(format!("{}.meta.json", path.display()));
    let raw = tokio::fs::read_to_string(&meta_path).await.ok()?;
    let parsed: serde_json::Value = serde_json::from_str(&raw).ok()?;
    parsed
        .get("contentType")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_data_url_resolves_without_root() {
        let resolver = MediaResolver::data_urls_only();
        let encoded = BASE64.encode(b"pixels");
        let image = resolver
            .resolve(&format!("data:image/png;base64,{encoded}"))
            .await
            .unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.base64, encoded);
    }

    #[tokio::test]
    async fn test_non_base64_data_url_rejected() {
        let resolver = MediaResolver::data_urls_only();
        assert!(resolver.resolve("data:text/plain,hello").await.is_none());
        assert!(resolver.resolve("data:image/png;base64,!!!").await.is_none());
    }

    #[test]
    fn test_media_key_extraction() {
        assert_eq!(
            media_key_from_url("https://host/media/2026/a.png").as_deref(),
            Some("2026/a.png")
        );
        assert_eq!(
            media_key_from_url("https://host/media-s/sig/1234/2026/a.png").as_deref(),
            Some("2026/a.png")
        );
        assert!(media_key_from_url("https://host/other/a.png").is_none());
        assert!(media_key_from_url("https://host/media/").is_none());
    }

    #[test]
    fn test_traversal_is_refused() {
        let root = Path::new("/srv/media");
        assert!(resolve_under_root(root, "../etc/passwd").is_none());
        assert!(resolve_under_root(root, "/abs/path").is_some()); // leading slash stripped
        assert_eq!(
            resolve_under_root(root, "2026/a.png").unwrap(),
            PathBuf::from("/srv/media/2026/a.png")
        );
    }

    #[tokio::test]
    async fn test_local_file_with_meta_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.png");
        tokio::fs::write(&file, b"imagebytes").await.unwrap();
        tokio::fs::write(
            dir.path().join("a.png.meta.json"),
            r#"{"contentType":"image/png"}"#,
        )
        .await
        .unwrap();

        let resolver = MediaResolver::new(dir.path());
        let image = resolver.resolve("https://host/media/a.png").await.unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.base64, BASE64.encode(b"imagebytes"));
    }

    #[tokio::test]
    async fn test_local_file_without_meta_defaults() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("b.bin"), b"x").await.unwrap();

        let resolver = MediaResolver::new(dir.path());
        let image = resolver.resolve("https://host/media/b.bin").await.unwrap();
        assert_eq!(image.mime_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn test_external_url_unresolved() {
        let resolver = MediaResolver::data_urls_only();
        assert!(resolver.resolve("https://elsewhere.example/cat.png").await.is_none());
    }
}
