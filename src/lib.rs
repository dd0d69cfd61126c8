//! bookpack - Manifest and folder-materialization core for EPUB-like packages
//!
//! Maintains the authoritative mapping between logical book paths (paths
//! relative to the package root), unique on-disk filenames, and typed
//! resource handles, while mirroring the fixed EPUB folder taxonomy
//! (Text, Styles, Images, Fonts, Audio, Video, Misc, META-INF) on a
//! working directory.
//!
//! # Architecture
//!
//! - Every file added to the package gets a unique filename, a typed
//!   resource handle, and entries in two index tables (identifier and
//!   book path)
//! - A single mutex guards filename allocation and both tables; physical
//!   file copies happen outside it so concurrent adds don't serialize
//!   on disk I/O
//! - Externally-editable resources are monitored through a notify-based
//!   watch bridge that tolerates atomic-rename editor saves
//!
//! # Modules
//!
//! - `media`: Media-type classification service (extension, group, kind)
//! - `domain`: Data structures (Resource, ResourceKind)
//! - `keeper`: Registry orchestration (Keeper, naming, folders, watch)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Materialize an empty package skeleton
//! bookpack init ./mybook
//!
//! # Import files into a package
//! bookpack import ./mybook chapter1.xhtml cover.jpg style.css
//!
//! # Import and monitor for external edits
//! bookpack watch ./mybook chapter1.xhtml
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod keeper;
pub mod media;

// Re-export main types at crate root for convenience
pub use domain::{Resource, ResourceKind};
pub use keeper::{
    unique_filename, FolderLayout, Keeper, KeeperError, ManifestListener, PackageListener,
    WatchHandle,
};
pub use media::MediaTypes;
