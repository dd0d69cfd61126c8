//! Resource handles for files belonging to a package.
//!
//! A [`Resource`] identifies one on-disk file: its stable identifier, its
//! absolute filesystem path, its book path (path relative to the package
//! root), its declared media type, and its storage-root key. Handles are
//! owned by the [`Keeper`](crate::keeper::Keeper); external callers hold
//! `Arc` clones and mutate paths only through the registry's operations.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{OnceLock, Weak};

use parking_lot::RwLock;

use uuid::Uuid;

use crate::keeper::Keeper;

/// The kind of content a resource holds.
///
/// A closed set: classification picks one of these for every file added
/// to the package, and the two singleton kinds (Opf, Ncx) are only ever
/// produced by their dedicated creation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Plain-text content (scripts, plain notes)
    MiscText,
    Audio,
    Video,
    /// Raster image
    Image,
    /// Vector image (SVG)
    Svg,
    Font,
    /// Markup content (XHTML). The only kind holding a back-reference
    /// to the registry, for cross-reference resolution.
    Html,
    /// Stylesheet (CSS)
    Css,
    /// Generic XML content
    Xml,
    /// The package manifest (content.opf) singleton
    Opf,
    /// The table-of-contents (toc.ncx) singleton
    Ncx,
    /// Anything unclassified
    Generic,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MiscText => "misc-text",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Image => "image",
            Self::Svg => "svg",
            Self::Font => "font",
            Self::Html => "html",
            Self::Css => "css",
            Self::Xml => "xml",
            Self::Opf => "opf",
            Self::Ncx => "ncx",
            Self::Generic => "generic",
        }
    }

    /// Whether files of this kind may be round-tripped through an
    /// external editor, which makes them eligible for change watching.
    pub fn editable_externally(self) -> bool {
        matches!(
            self,
            Self::MiscText
                | Self::Audio
                | Self::Video
                | Self::Image
                | Self::Svg
                | Self::Font
                | Self::Css
                | Self::Xml
                | Self::Generic
        )
    }
}

/// Mutable path state, kept together so a rename updates both fields
/// under one write lock.
#[derive(Debug, Clone)]
struct ResourcePaths {
    full_path: PathBuf,
    book_path: String,
}

/// One on-disk file belonging to the package.
#[derive(Debug)]
pub struct Resource {
    /// Stable for the handle's lifetime.
    id: Uuid,

    /// Package root. Never ends with a path separator.
    root: PathBuf,

    kind: ResourceKind,
    media_type: String,

    /// Longest-common-path of the storage folder. Always ends with '/'.
    storage_root: String,

    paths: RwLock<ResourcePaths>,

    /// Package format version ("2.0" or "3.0").
    version: RwLock<String>,

    /// Linkage key assigned to the table-of-contents resource.
    main_identifier: RwLock<Option<String>>,

    /// Set for Html resources only.
    keeper: OnceLock<Weak<Keeper>>,

    changed_on_disk: AtomicBool,
}

impl Resource {
    /// Create a handle for a file at `full_path` under `root`.
    ///
    /// The book path is derived from `full_path` by stripping the root
    /// prefix and its separator, which relies on the root never ending
    /// with a separator.
    pub(crate) fn new(
        root: &Path,
        full_path: PathBuf,
        kind: ResourceKind,
        media_type: String,
        storage_root: String,
    ) -> Self {
        let book_path = book_path_for(root, &full_path);
        Self {
            id: Uuid::new_v4(),
            root: root.to_path_buf(),
            kind,
            media_type,
            storage_root,
            paths: RwLock::new(ResourcePaths {
                full_path,
                book_path,
            }),
            version: RwLock::new(String::new()),
            main_identifier: RwLock::new(None),
            keeper: OnceLock::new(),
            changed_on_disk: AtomicBool::new(false),
        }
    }

    /// Unique identifier, stable for the program lifetime.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Package root this resource belongs to. Never ends with a separator.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Storage-root path used for longest-common-path computations.
    /// Always ends with '/'.
    pub fn storage_root(&self) -> &str {
        &self.storage_root
    }

    /// Absolute filesystem path.
    pub fn full_path(&self) -> PathBuf {
        self.paths.read().full_path.clone()
    }

    /// Path relative to the package root, '/'-separated, no leading
    /// separator.
    pub fn book_path(&self) -> String {
        self.paths.read().book_path.clone()
    }

    /// The last component of the book path.
    pub fn filename(&self) -> String {
        let paths = self.paths.read();
        paths
            .book_path
            .rsplit('/')
            .next()
            .unwrap_or(paths.book_path.as_str())
            .to_string()
    }

    /// Short display name. Currently the filename.
    pub fn short_name(&self) -> String {
        self.filename()
    }

    pub fn version(&self) -> String {
        self.version.read().clone()
    }

    pub fn set_version(&self, version: &str) {
        *self.version.write() = version.to_string();
    }

    /// Linkage key of the table-of-contents resource, when assigned.
    pub fn main_identifier(&self) -> Option<String> {
        self.main_identifier
            .read().clone()
    }

    pub(crate) fn set_main_identifier(&self, value: &str) {
        *self.main_identifier.write() = Some(value.to_string());
    }

    /// Registry back-reference. Only present on Html resources.
    pub fn keeper(&self) -> Option<std::sync::Arc<Keeper>> {
        self.keeper.get().and_then(Weak::upgrade)
    }

    pub(crate) fn attach_keeper(&self, keeper: Weak<Keeper>) {
        // At most one attachment; later attempts are ignored.
        let _ = self.keeper.set(keeper);
    }

    /// Move the handle to a new absolute path, recomputing the book path.
    /// Only the registry calls this, as part of its rename operation.
    pub(crate) fn relocate(&self, new_full_path: PathBuf) {
        let book_path = book_path_for(&self.root, &new_full_path);
        let mut paths = self.paths.write();
        paths.full_path = new_full_path;
        paths.book_path = book_path;
    }

    /// Record that the file backing this handle was modified outside the
    /// program.
    pub(crate) fn mark_changed_on_disk(&self) {
        self.changed_on_disk.store(true, Ordering::SeqCst);
    }

    pub fn changed_on_disk(&self) -> bool {
        self.changed_on_disk.load(Ordering::SeqCst)
    }
}

/// Book path arithmetic: strip the root prefix and its separator.
///
/// Depends on the root never ending with a separator.
fn book_path_for(root: &Path, full_path: &Path) -> String {
    match full_path.strip_prefix(root) {
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => full_path.to_string_lossy().into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_path_strips_root() {
        let root = Path::new("/tmp/book");
        let full = PathBuf::from("/tmp/book/OEBPS/Text/chapter1.xhtml");
        assert_eq!(book_path_for(root, &full), "OEBPS/Text/chapter1.xhtml");
    }

    #[test]
    fn test_filename_is_last_component() {
        let root = Path::new("/tmp/book");
        let resource = Resource::new(
            root,
            PathBuf::from("/tmp/book/OEBPS/Images/cover.jpg"),
            ResourceKind::Image,
            "image/jpeg".to_string(),
            "/tmp/book/OEBPS/Images/".to_string(),
        );

        assert_eq!(resource.filename(), "cover.jpg");
        assert_eq!(resource.book_path(), "OEBPS/Images/cover.jpg");
    }

    #[test]
    fn test_relocate_updates_both_paths() {
        let root = Path::new("/tmp/book");
        let resource = Resource::new(
            root,
            PathBuf::from("/tmp/book/OEBPS/Text/old.xhtml"),
            ResourceKind::Html,
            "application/xhtml+xml".to_string(),
            "/tmp/book/OEBPS/Text/".to_string(),
        );

        resource.relocate(PathBuf::from("/tmp/book/OEBPS/Text/new.xhtml"));

        assert_eq!(resource.book_path(), "OEBPS/Text/new.xhtml");
        assert_eq!(
            resource.full_path(),
            PathBuf::from("/tmp/book/OEBPS/Text/new.xhtml")
        );
    }

    #[test]
    fn test_externally_editable_kinds() {
        assert!(ResourceKind::Image.editable_externally());
        assert!(ResourceKind::Css.editable_externally());
        assert!(ResourceKind::Font.editable_externally());
        assert!(!ResourceKind::Html.editable_externally());
        assert!(!ResourceKind::Opf.editable_externally());
        assert!(!ResourceKind::Ncx.editable_externally());
    }
}
