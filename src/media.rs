//! Media-type classification service.
//!
//! Maps file extensions to declared media types, media types to semantic
//! groups ("text", "images", ...), and media types to resource kinds.
//! Constructed once and injected into the [`Keeper`](crate::keeper::Keeper)
//! as a read-only dependency rather than accessed as a process-wide
//! singleton.

use std::collections::HashMap;

use crate::domain::ResourceKind;

/// Read-only classification tables for package content.
#[derive(Debug)]
pub struct MediaTypes {
    ext_to_media_type: HashMap<&'static str, &'static str>,
    media_type_to_group: HashMap<&'static str, &'static str>,
    media_type_to_kind: HashMap<&'static str, ResourceKind>,
}

impl Default for MediaTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaTypes {
    /// Build the classification tables.
    pub fn new() -> Self {
        let ext_to_media_type: HashMap<&'static str, &'static str> = [
            ("xhtml", "application/xhtml+xml"),
            ("html", "application/xhtml+xml"),
            ("htm", "application/xhtml+xml"),
            ("css", "text/css"),
            ("png", "image/png"),
            ("jpg", "image/jpeg"),
            ("jpeg", "image/jpeg"),
            ("gif", "image/gif"),
            ("webp", "image/webp"),
            ("bmp", "image/bmp"),
            ("svg", "image/svg+xml"),
            ("otf", "font/otf"),
            ("ttf", "font/ttf"),
            ("woff", "font/woff"),
            ("woff2", "font/woff2"),
            ("mp3", "audio/mpeg"),
            ("m4a", "audio/mp4"),
            ("ogg", "audio/ogg"),
            ("oga", "audio/ogg"),
            ("wav", "audio/wav"),
            ("mp4", "video/mp4"),
            ("m4v", "video/mp4"),
            ("webm", "video/webm"),
            ("ogv", "video/ogg"),
            ("txt", "text/plain"),
            ("js", "application/javascript"),
            ("xml", "application/xml"),
            ("smil", "application/smil+xml"),
            ("pls", "application/pls+xml"),
            ("ncx", "application/x-dtbncx+xml"),
            ("opf", "application/oebps-package+xml"),
        ]
        .into_iter()
        .collect();

        let media_type_to_group: HashMap<&'static str, &'static str> = [
            ("application/xhtml+xml", "text"),
            ("text/css", "styles"),
            ("image/png", "images"),
            ("image/jpeg", "images"),
            ("image/gif", "images"),
            ("image/webp", "images"),
            ("image/bmp", "images"),
            ("image/svg+xml", "images"),
            ("font/otf", "fonts"),
            ("font/ttf", "fonts"),
            ("font/woff", "fonts"),
            ("font/woff2", "fonts"),
            ("application/vnd.ms-opentype", "fonts"),
            ("application/font-sfnt", "fonts"),
            ("audio/mpeg", "audio"),
            ("audio/mp4", "audio"),
            ("audio/ogg", "audio"),
            ("audio/wav", "audio"),
            ("video/mp4", "video"),
            ("video/webm", "video"),
            ("video/ogg", "video"),
            ("text/plain", "misc"),
            ("application/javascript", "misc"),
            ("application/xml", "misc"),
            ("application/smil+xml", "misc"),
            ("application/pls+xml", "misc"),
        ]
        .into_iter()
        .collect();

        let media_type_to_kind: HashMap<&'static str, ResourceKind> = [
            ("application/xhtml+xml", ResourceKind::Html),
            ("text/css", ResourceKind::Css),
            ("image/png", ResourceKind::Image),
            ("image/jpeg", ResourceKind::Image),
            ("image/gif", ResourceKind::Image),
            ("image/webp", ResourceKind::Image),
            ("image/bmp", ResourceKind::Image),
            ("image/svg+xml", ResourceKind::Svg),
            ("font/otf", ResourceKind::Font),
            ("font/ttf", ResourceKind::Font),
            ("font/woff", ResourceKind::Font),
            ("font/woff2", ResourceKind::Font),
            ("application/vnd.ms-opentype", ResourceKind::Font),
            ("application/font-sfnt", ResourceKind::Font),
            ("audio/mpeg", ResourceKind::Audio),
            ("audio/mp4", ResourceKind::Audio),
            ("audio/ogg", ResourceKind::Audio),
            ("audio/wav", ResourceKind::Audio),
            ("video/mp4", ResourceKind::Video),
            ("video/webm", ResourceKind::Video),
            ("video/ogg", ResourceKind::Video),
            ("text/plain", ResourceKind::MiscText),
            ("application/javascript", ResourceKind::MiscText),
            ("application/xml", ResourceKind::Xml),
            ("application/smil+xml", ResourceKind::Xml),
            ("application/pls+xml", ResourceKind::Xml),
            ("application/x-dtbncx+xml", ResourceKind::Ncx),
            ("application/oebps-package+xml", ResourceKind::Opf),
        ]
        .into_iter()
        .collect();

        Self {
            ext_to_media_type,
            media_type_to_group,
            media_type_to_kind,
        }
    }

    /// Media type for a file extension, or `default` when unknown.
    /// The extension is matched case-insensitively.
    pub fn media_type_for_extension(&self, extension: &str, default: &str) -> String {
        let ext = extension.to_ascii_lowercase();
        self.ext_to_media_type
            .get(ext.as_str())
            .map(|mt| (*mt).to_string())
            .unwrap_or_else(|| default.to_string())
    }

    /// Semantic group ("text", "styles", "images", ...) for a media type,
    /// or `default` when unknown.
    pub fn group_for_media_type(&self, media_type: &str, default: &str) -> String {
        self.media_type_to_group
            .get(media_type)
            .map(|g| (*g).to_string())
            .unwrap_or_else(|| default.to_string())
    }

    /// Resource kind for a media type, or `default` when unknown.
    pub fn kind_for_media_type(&self, media_type: &str, default: ResourceKind) -> ResourceKind {
        self.media_type_to_kind
            .get(media_type)
            .copied()
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lookup_case_insensitive() {
        let media = MediaTypes::new();

        assert_eq!(
            media.media_type_for_extension("xhtml", ""),
            "application/xhtml+xml"
        );
        assert_eq!(
            media.media_type_for_extension("XHTML", ""),
            "application/xhtml+xml"
        );
        assert_eq!(media.media_type_for_extension("JPG", ""), "image/jpeg");
    }

    #[test]
    fn test_unknown_extension_falls_back() {
        let media = MediaTypes::new();
        assert_eq!(media.media_type_for_extension("xyz", ""), "");
        assert_eq!(media.media_type_for_extension("xyz", "fallback"), "fallback");
    }

    #[test]
    fn test_group_lookup() {
        let media = MediaTypes::new();

        assert_eq!(media.group_for_media_type("text/css", "other"), "styles");
        assert_eq!(media.group_for_media_type("image/svg+xml", "other"), "images");
        assert_eq!(media.group_for_media_type("font/woff2", "other"), "fonts");
        assert_eq!(
            media.group_for_media_type("application/unknown", "other"),
            "other"
        );
    }

    #[test]
    fn test_kind_lookup() {
        let media = MediaTypes::new();

        assert_eq!(
            media.kind_for_media_type("application/xhtml+xml", ResourceKind::Generic),
            ResourceKind::Html
        );
        assert_eq!(
            media.kind_for_media_type("image/svg+xml", ResourceKind::Generic),
            ResourceKind::Svg
        );
        assert_eq!(
            media.kind_for_media_type("application/x-dtbncx+xml", ResourceKind::Generic),
            ResourceKind::Ncx
        );
        assert_eq!(
            media.kind_for_media_type("application/unknown", ResourceKind::Generic),
            ResourceKind::Generic
        );
    }
}
