//! Resource registry orchestration.
//!
//! The [`Keeper`] owns every resource belonging to a package and keeps two
//! index tables synchronized: identifier to handle, and book path to
//! handle. Adding a file classifies it, allocates a unique filename,
//! copies it into the mirrored folder tree, and announces it to the
//! manifest collaborator. A single mutex guards filename allocation and
//! both tables; physical copies and listener dispatch happen outside it.

pub mod folders;
pub mod naming;
pub mod watch;

pub use folders::FolderLayout;
pub use naming::unique_filename;
pub use watch::WatchHandle;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Resource, ResourceKind};
use crate::media::MediaTypes;

use folders::{FILE_EXCEPTION_MARKER, NCX_FILE_NAME, OPF_FILE_NAME};
use watch::WatchBridge;

/// Errors surfaced by registry operations.
///
/// Deliberate no-ops (removing an already-removed resource, renaming an
/// unknown old path, duplicate watch wiring, re-suspending while
/// suspended) are idempotence guards and never raise.
#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("source file does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("no resource matches: {0}")]
    ResourceNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("filesystem watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Manifest collaborator notifications.
///
/// `resource_added` is dispatched synchronously on the adding thread;
/// deferring it has corrupted manifest state under concurrent adds in the
/// past, so implementations must tolerate calls from worker threads.
pub trait ManifestListener: Send + Sync {
    fn resource_added(&self, resource: &Resource);
    fn resource_removed(&self, resource: &Resource);
    fn resource_renamed(&self, resource: &Resource, old_book_path: &str);
}

/// Owning-package notifications, driven by the watch bridge.
pub trait PackageListener: Send + Sync {
    fn resource_updated_from_disk(&self, resource: &Resource);
}

/// The two index tables. Invariants:
/// - every identifier maps to exactly one handle
/// - every current book path maps to exactly one handle, and always agrees
///   with the handle's own recorded book path
#[derive(Default)]
struct Tables {
    by_id: HashMap<Uuid, Arc<Resource>>,
    by_book_path: HashMap<String, Arc<Resource>>,
}

impl Tables {
    fn insert(&mut self, resource: Arc<Resource>) {
        self.by_id.insert(resource.id(), Arc::clone(&resource));
        self.by_book_path.insert(resource.book_path(), resource);
    }
}

/// Registry and folder manager for one package.
pub struct Keeper {
    layout: FolderLayout,
    media: Arc<MediaTypes>,
    tables: Mutex<Tables>,
    opf: Arc<Resource>,
    ncx: Mutex<Option<Arc<Resource>>>,
    /// The package's primary identifier, used as the linkage key of the
    /// table-of-contents resource.
    main_identifier: String,
    manifest_listener: RwLock<Option<Arc<dyn ManifestListener>>>,
    package_listener: RwLock<Option<Arc<dyn PackageListener>>>,
    bridge: WatchBridge,
}

impl Keeper {
    /// Materialize the folder tree under `root`, write the infrastructure
    /// files, and create the singleton manifest resource.
    pub fn create(
        root: &Path,
        media: Arc<MediaTypes>,
        default_version: &str,
    ) -> Result<Arc<Self>, KeeperError> {
        let layout = FolderLayout::materialize(root)?;
        layout.write_container_xml()?;

        let opf_path = layout.oebps_dir().join(OPF_FILE_NAME);
        let opf = Arc::new(Resource::new(
            layout.root(),
            opf_path.clone(),
            ResourceKind::Opf,
            "application/oebps-package+xml".to_string(),
            layout.storage_root("opf").to_string(),
        ));
        opf.set_version(default_version);
        // Placeholder file so the manifest path exists on disk; its
        // contents belong to the manifest collaborator.
        if !opf_path.exists() {
            fs::write(&opf_path, "")?;
        }

        let keeper = Arc::new(Self {
            layout,
            media,
            tables: Mutex::new(Tables::default()),
            opf: Arc::clone(&opf),
            ncx: Mutex::new(None),
            main_identifier: format!("urn:uuid:{}", Uuid::new_v4()),
            manifest_listener: RwLock::new(None),
            package_listener: RwLock::new(None),
            bridge: WatchBridge::new()?,
        });

        keeper.tables.lock().insert(opf);
        info!(root = %keeper.layout.root_str(), "package folder materialized");
        Ok(keeper)
    }

    /// Register the manifest collaborator. Dispatch is direct and
    /// synchronous.
    pub fn set_manifest_listener(&self, listener: Arc<dyn ManifestListener>) {
        *self.manifest_listener.write() = Some(listener);
    }

    /// Register the owning package's modified-flag hook.
    pub fn set_package_listener(&self, listener: Arc<dyn PackageListener>) {
        *self.package_listener.write() = Some(listener);
    }

    /// Add a content file to the package.
    ///
    /// Never processes manifest or table-of-contents files; those use
    /// [`Keeper::create`] and [`Keeper::create_ncx`]. Safe to call from
    /// multiple worker threads: filename allocation and table insertion
    /// run under the registry mutex, the physical copy does not.
    pub fn add_file(
        self: &Arc<Self>,
        source: &Path,
        announce: bool,
        media_type: Option<&str>,
    ) -> Result<Arc<Resource>, KeeperError> {
        if !source.exists() {
            return Err(KeeperError::SourceNotFound(source.to_path_buf()));
        }

        // Filenames starting with '.' cause needless friction downstream;
        // drop the leading dot in the destination name.
        let source_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let normalized_name = source_name.strip_prefix('.').unwrap_or(&source_name);

        let source_str = source.to_string_lossy();
        let is_exception = source_str.contains(FILE_EXCEPTION_MARKER);

        // Critical section: allocation and table mutation only. The copy
        // below must not run with this lock held.
        let resource = {
            let mut tables = self.tables.lock();

            let existing: Vec<String> =
                tables.by_id.values().map(|r| r.filename()).collect();
            let filename = unique_filename(normalized_name, &existing);

            let extension = Path::new(normalized_name)
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();
            let media_type = match media_type {
                Some(mt) => mt.to_string(),
                None => self.media.media_type_for_extension(&extension, ""),
            };

            let kind = self
                .media
                .kind_for_media_type(&media_type, ResourceKind::Generic);
            let group = if is_exception || media_type.is_empty() {
                "other".to_string()
            } else {
                self.media.group_for_media_type(&media_type, "other")
            };

            let (dest_path, kind, storage_key) = if is_exception {
                // Non-standard control files are mirrored byte-identical
                // under the package root, from the marker onward.
                let marker_pos = source_str
                    .find(FILE_EXCEPTION_MARKER)
                    .unwrap_or(source_str.len());
                let mirrored = self
                    .layout
                    .root()
                    .join(source_str[marker_pos..].trim_start_matches(['/', '\\']));
                (mirrored, ResourceKind::Generic, "other".to_string())
            } else {
                match kind {
                    ResourceKind::MiscText => {
                        (self.layout.misc_dir().join(&filename), kind, group)
                    }
                    ResourceKind::Audio => {
                        (self.layout.audio_dir().join(&filename), kind, group)
                    }
                    ResourceKind::Video => {
                        (self.layout.video_dir().join(&filename), kind, group)
                    }
                    ResourceKind::Image | ResourceKind::Svg => {
                        (self.layout.images_dir().join(&filename), kind, group)
                    }
                    ResourceKind::Font => {
                        (self.layout.fonts_dir().join(&filename), kind, group)
                    }
                    ResourceKind::Html => {
                        (self.layout.text_dir().join(&filename), kind, group)
                    }
                    ResourceKind::Css => {
                        (self.layout.styles_dir().join(&filename), kind, group)
                    }
                    ResourceKind::Xml => {
                        (self.layout.misc_dir().join(&filename), kind, group)
                    }
                    // Unrecognized kinds, and opf/ncx media types which
                    // never come through this path as their own kinds.
                    ResourceKind::Generic | ResourceKind::Opf | ResourceKind::Ncx => (
                        self.layout.misc_dir().join(&filename),
                        ResourceKind::Generic,
                        "misc".to_string(),
                    ),
                }
            };

            let resource = Arc::new(Resource::new(
                self.layout.root(),
                dest_path,
                kind,
                media_type,
                self.layout.storage_root(&storage_key).to_string(),
            ));
            if kind == ResourceKind::Html {
                // Markup needs registry visibility for cross-reference
                // resolution.
                resource.attach_keeper(Arc::downgrade(self));
            }
            resource.set_version(&self.opf.version());

            tables.insert(Arc::clone(&resource));
            resource
        };

        let dest = resource.full_path();
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Err(error) = fs::copy(source, &dest) {
            warn!(
                source = %source.display(),
                dest = %dest.display(),
                %error,
                "failed to copy content file into package"
            );
        }

        debug!(book_path = %resource.book_path(), kind = resource.kind().as_str(), "added resource");

        if announce {
            if let Some(listener) = self.manifest_listener.read().clone() {
                listener.resource_added(&resource);
            }
        }

        Ok(resource)
    }

    /// Erase a resource from both tables and the watch sets, then announce
    /// the removal. A no-op on the tables when the resource is already
    /// absent; callers must not rely on an error here.
    pub fn remove_resource(&self, resource: &Resource) {
        {
            let mut tables = self.tables.lock();
            tables.by_id.remove(&resource.id());
            tables.by_book_path.remove(&resource.book_path());
        }
        self.bridge.unwatch_path(&resource.full_path());
        self.bridge.unwire(resource.id());

        if let Some(listener) = self.manifest_listener.read().clone() {
            listener.resource_removed(resource);
        }
    }

    /// Remove a resource's file from disk, then tear it down. Deletion is
    /// an observable event: the manifest collaborator is always told.
    pub fn delete_resource(&self, resource: &Resource) {
        if let Err(error) = fs::remove_file(resource.full_path()) {
            debug!(path = %resource.full_path().display(), %error, "delete: file already gone");
        }
        self.remove_resource(resource);
    }

    /// Rename a resource's file within its folder, updating the handle,
    /// the book-path table, and watch membership, and forwarding exactly
    /// one rename notification to the manifest collaborator.
    pub fn rename_resource(
        &self,
        resource: &Arc<Resource>,
        new_filename: &str,
    ) -> Result<(), KeeperError> {
        let old_full_path = resource.full_path();
        let new_full_path = old_full_path
            .parent()
            .map(|p| p.join(new_filename))
            .unwrap_or_else(|| PathBuf::from(new_filename));

        fs::rename(&old_full_path, &new_full_path)?;
        resource.relocate(new_full_path.clone());
        self.bridge.rename_watched(&old_full_path, &new_full_path);
        self.resource_renamed(resource, &old_full_path);
        Ok(())
    }

    /// Re-key the book-path table after a resource moved from
    /// `old_full_path`, and forward the rename to the manifest
    /// collaborator.
    ///
    /// An unknown old book path is logged and left alone. No compensating
    /// action exists if a rename arrives before the corresponding add has
    /// published its entry.
    pub fn resource_renamed(&self, resource: &Resource, old_full_path: &Path) {
        // Root-strip arithmetic; the root never ends with a separator.
        let old_full = old_full_path.to_string_lossy();
        let root = self.layout.root_str();
        let old_book_path = old_full
            .strip_prefix(root)
            .map(|rest| rest.trim_start_matches(['/', '\\']).to_string())
            .unwrap_or_else(|| old_full.into_owned());

        let rekeyed = {
            let mut tables = self.tables.lock();
            match tables.by_book_path.remove(&old_book_path) {
                Some(handle) => {
                    tables.by_book_path.insert(resource.book_path(), handle);
                    true
                }
                None => false,
            }
        };

        if !rekeyed {
            warn!(%old_book_path, "rename for a book path missing from the table; ignored");
            return;
        }

        if let Some(listener) = self.manifest_listener.read().clone() {
            listener.resource_renamed(resource, &old_book_path);
        }
    }

    /// The singleton manifest resource.
    pub fn opf(&self) -> Arc<Resource> {
        Arc::clone(&self.opf)
    }

    /// The table-of-contents resource, when one exists. Optional on
    /// format versions that omit it.
    pub fn ncx(&self) -> Option<Arc<Resource>> {
        self.ncx.lock().clone()
    }

    /// The package's primary identifier value.
    pub fn main_identifier(&self) -> &str {
        &self.main_identifier
    }

    /// Create the table-of-contents resource on demand. Returns the
    /// existing one when already present.
    pub fn create_ncx(&self, version: &str) -> Arc<Resource> {
        let mut slot = self.ncx.lock();
        if let Some(existing) = slot.as_ref() {
            return Arc::clone(existing);
        }

        let ncx = Arc::new(Resource::new(
            self.layout.root(),
            self.layout.oebps_dir().join(NCX_FILE_NAME),
            ResourceKind::Ncx,
            "application/x-dtbncx+xml".to_string(),
            self.layout.storage_root("ncx").to_string(),
        ));
        ncx.set_main_identifier(&self.main_identifier);
        ncx.set_version(version);

        self.tables.lock().insert(Arc::clone(&ncx));
        *slot = Some(Arc::clone(&ncx));
        ncx
    }

    /// Destroy the table-of-contents resource. A no-op when none exists.
    pub fn remove_ncx(&self) {
        let taken = self.ncx.lock().take();
        if let Some(ncx) = taken {
            self.remove_resource(&ncx);
        }
    }

    /// All resource handles, in no particular order.
    pub fn resources(&self) -> Vec<Arc<Resource>> {
        self.tables.lock().by_id.values().cloned().collect()
    }

    pub fn resources_by_kind(&self, kind: ResourceKind) -> Vec<Arc<Resource>> {
        self.tables
            .lock()
            .by_id
            .values()
            .filter(|r| r.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn resource_by_identifier(&self, id: &Uuid) -> Option<Arc<Resource>> {
        self.tables.lock().by_id.get(id).cloned()
    }

    /// Look a resource up by its short name. A missing name is a distinct
    /// failure, never an empty result.
    pub fn resource_by_short_name(&self, name: &str) -> Result<Arc<Resource>, KeeperError> {
        self.tables
            .lock()
            .by_id
            .values()
            .find(|r| r.short_name() == name)
            .cloned()
            .ok_or_else(|| KeeperError::ResourceNotFound(name.to_string()))
    }

    /// Look a resource up by its book path.
    pub fn resource_by_book_path(&self, book_path: &str) -> Result<Arc<Resource>, KeeperError> {
        self.tables
            .lock()
            .by_book_path
            .get(book_path)
            .cloned()
            .ok_or_else(|| KeeperError::ResourceNotFound(book_path.to_string()))
    }

    /// First book path ending with `path_end`, compared case-insensitively
    /// for case-insensitive filesystems. Neither unique nor guaranteed to
    /// be found.
    pub fn book_path_by_path_end(&self, path_end: &str) -> Option<String> {
        let suffix = path_end.to_lowercase();
        self.tables
            .lock()
            .by_book_path
            .keys()
            .find(|bp| bp.to_lowercase().ends_with(&suffix))
            .cloned()
    }

    pub fn all_filenames(&self) -> Vec<String> {
        self.tables.lock().by_id.values().map(|r| r.filename()).collect()
    }

    pub fn all_book_paths(&self) -> Vec<String> {
        self.tables.lock().by_book_path.keys().cloned().collect()
    }

    /// Index of the last markup document in reading order: the count of
    /// markup resources minus one.
    pub fn highest_reading_order(&self) -> isize {
        let html_count = self
            .tables
            .lock()
            .by_id
            .values()
            .filter(|r| r.kind() == ResourceKind::Html)
            .count();
        html_count as isize - 1
    }

    pub fn layout(&self) -> &FolderLayout {
        &self.layout
    }

    pub fn media(&self) -> &MediaTypes {
        &self.media
    }

    pub(crate) fn bridge(&self) -> &WatchBridge {
        &self.bridge
    }

    pub(crate) fn package_listener(&self) -> Option<Arc<dyn PackageListener>> {
        self.package_listener.read().clone()
    }

    pub(crate) fn resource_by_full_path(&self, path: &Path) -> Option<Arc<Resource>> {
        self.tables
            .lock()
            .by_id
            .values()
            .find(|r| r.full_path() == path)
            .cloned()
    }
}
