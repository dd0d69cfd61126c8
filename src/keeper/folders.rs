//! On-disk folder taxonomy and storage-root key map.
//!
//! A package mirrors a fixed folder tree on its working directory:
//!
//! ```text
//! META-INF/
//! OEBPS/
//!     Audio/  Video/  Images/  Fonts/  Text/  Styles/  Misc/
//! ```
//!
//! Each resource group is keyed to the longest-common-path of its storage
//! folder. Every keyed path ends with a '/'; the package root itself never
//! does. Book-path arithmetic elsewhere depends on that asymmetry.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const IMAGE_FOLDER_NAME: &str = "Images";
pub const FONT_FOLDER_NAME: &str = "Fonts";
pub const TEXT_FOLDER_NAME: &str = "Text";
pub const STYLE_FOLDER_NAME: &str = "Styles";
pub const AUDIO_FOLDER_NAME: &str = "Audio";
pub const VIDEO_FOLDER_NAME: &str = "Video";
pub const MISC_FOLDER_NAME: &str = "Misc";

pub const OPF_FILE_NAME: &str = "content.opf";
pub const NCX_FILE_NAME: &str = "toc.ncx";

/// Marker recognized in source paths for non-standard control files.
/// Files matching it are mirrored under the package root untouched,
/// keeping their path from the marker onward, bypassing group-based
/// relocation and filename versioning.
pub const FILE_EXCEPTION_MARKER: &str = "META-INF";

const CONTAINER_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n\
\x20   <rootfiles>\n\
\x20       <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n\
\x20  </rootfiles>\n\
</container>\n";

/// The materialized folder tree of one package.
#[derive(Debug)]
pub struct FolderLayout {
    /// Package root. The stored string form never ends with a separator.
    root: PathBuf,
    root_str: String,
    storage_roots: HashMap<&'static str, String>,
}

impl FolderLayout {
    /// Create the fixed subfolder tree under `root` and build the
    /// key-to-storage-root map. Creating over an existing tree is not an
    /// error.
    pub fn materialize(root: &Path) -> io::Result<Self> {
        let root_str = root
            .to_string_lossy()
            .trim_end_matches(['/', '\\'])
            .to_string();
        let root = PathBuf::from(&root_str);

        fs::create_dir_all(root.join("META-INF"))?;
        let oebps = root.join("OEBPS");
        for folder in [
            AUDIO_FOLDER_NAME,
            VIDEO_FOLDER_NAME,
            IMAGE_FOLDER_NAME,
            FONT_FOLDER_NAME,
            TEXT_FOLDER_NAME,
            STYLE_FOLDER_NAME,
            MISC_FOLDER_NAME,
        ] {
            fs::create_dir_all(oebps.join(folder))?;
        }

        // Every storage-root value ends with '/'; the root never does.
        let mut storage_roots = HashMap::new();
        storage_roots.insert("text", format!("{root_str}/OEBPS/{TEXT_FOLDER_NAME}/"));
        storage_roots.insert("styles", format!("{root_str}/OEBPS/{STYLE_FOLDER_NAME}/"));
        storage_roots.insert("images", format!("{root_str}/OEBPS/{IMAGE_FOLDER_NAME}/"));
        storage_roots.insert("fonts", format!("{root_str}/OEBPS/{FONT_FOLDER_NAME}/"));
        storage_roots.insert("audio", format!("{root_str}/OEBPS/{AUDIO_FOLDER_NAME}/"));
        storage_roots.insert("video", format!("{root_str}/OEBPS/{VIDEO_FOLDER_NAME}/"));
        storage_roots.insert("misc", format!("{root_str}/OEBPS/{MISC_FOLDER_NAME}/"));
        storage_roots.insert("ncx", format!("{root_str}/OEBPS/"));
        storage_roots.insert("opf", format!("{root_str}/OEBPS/"));
        storage_roots.insert("other", format!("{root_str}/"));

        Ok(Self {
            root,
            root_str,
            storage_roots,
        })
    }

    /// Write the fixed `META-INF/container.xml` pointing at
    /// `OEBPS/content.opf`.
    pub fn write_container_xml(&self) -> io::Result<()> {
        fs::write(self.meta_inf_dir().join("container.xml"), CONTAINER_XML)
    }

    /// Longest-common-path for a storage key, or "" when unknown.
    pub fn storage_root(&self, key: &str) -> &str {
        self.storage_roots
            .get(key)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Package root. Never ends with a separator.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Package root in string form. Never ends with a separator.
    pub fn root_str(&self) -> &str {
        &self.root_str
    }

    pub fn meta_inf_dir(&self) -> PathBuf {
        self.root.join("META-INF")
    }

    pub fn oebps_dir(&self) -> PathBuf {
        self.root.join("OEBPS")
    }

    pub fn text_dir(&self) -> PathBuf {
        self.oebps_dir().join(TEXT_FOLDER_NAME)
    }

    pub fn styles_dir(&self) -> PathBuf {
        self.oebps_dir().join(STYLE_FOLDER_NAME)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.oebps_dir().join(IMAGE_FOLDER_NAME)
    }

    pub fn fonts_dir(&self) -> PathBuf {
        self.oebps_dir().join(FONT_FOLDER_NAME)
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.oebps_dir().join(AUDIO_FOLDER_NAME)
    }

    pub fn video_dir(&self) -> PathBuf {
        self.oebps_dir().join(VIDEO_FOLDER_NAME)
    }

    pub fn misc_dir(&self) -> PathBuf {
        self.oebps_dir().join(MISC_FOLDER_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_materialize_creates_tree() {
        let temp = TempDir::new().unwrap();
        let layout = FolderLayout::materialize(temp.path()).unwrap();

        assert!(layout.meta_inf_dir().is_dir());
        assert!(layout.text_dir().is_dir());
        assert!(layout.styles_dir().is_dir());
        assert!(layout.images_dir().is_dir());
        assert!(layout.fonts_dir().is_dir());
        assert!(layout.audio_dir().is_dir());
        assert!(layout.video_dir().is_dir());
        assert!(layout.misc_dir().is_dir());
    }

    #[test]
    fn test_materialize_is_idempotent() {
        let temp = TempDir::new().unwrap();
        FolderLayout::materialize(temp.path()).unwrap();
        // Second materialization over the existing tree must succeed.
        FolderLayout::materialize(temp.path()).unwrap();
    }

    #[test]
    fn test_root_and_storage_root_separator_asymmetry() {
        let temp = TempDir::new().unwrap();
        let layout = FolderLayout::materialize(temp.path()).unwrap();

        assert!(!layout.root_str().ends_with('/'));
        for key in [
            "text", "styles", "images", "fonts", "audio", "video", "misc", "ncx", "opf", "other",
        ] {
            let path = layout.storage_root(key);
            assert!(!path.is_empty(), "missing storage root for {key}");
            assert!(path.ends_with('/'), "storage root for {key} lacks '/'");
        }
    }

    #[test]
    fn test_root_with_trailing_separator_is_normalized() {
        let temp = TempDir::new().unwrap();
        let with_sep = format!("{}/", temp.path().display());
        let layout = FolderLayout::materialize(Path::new(&with_sep)).unwrap();
        assert!(!layout.root_str().ends_with('/'));
    }

    #[test]
    fn test_unknown_key_yields_empty_string() {
        let temp = TempDir::new().unwrap();
        let layout = FolderLayout::materialize(temp.path()).unwrap();
        assert_eq!(layout.storage_root("nope"), "");
    }

    #[test]
    fn test_container_xml_contents() {
        let temp = TempDir::new().unwrap();
        let layout = FolderLayout::materialize(temp.path()).unwrap();
        layout.write_container_xml().unwrap();

        let body =
            std::fs::read_to_string(layout.meta_inf_dir().join("container.xml")).unwrap();
        assert!(body.contains("OEBPS/content.opf"));
        assert!(body.contains("urn:oasis:names:tc:opendocument:xmlns:container"));
    }
}
