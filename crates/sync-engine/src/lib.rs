//! Graph synchronization through version control: a diff-friendly JSONL
//! manifest bound to a commit, hydration into a fresh store on the
//! receiving side, and conflict resolution by regenerating from source.

pub mod engine;
pub mod error;
pub mod manifest;

#[cfg(test)]
mod tests;

pub use engine::{SyncEngine, SyncState};
pub use error::SyncError;
pub use manifest::{MANIFEST_FILE_NAME, Manifest, ManifestHeader};
