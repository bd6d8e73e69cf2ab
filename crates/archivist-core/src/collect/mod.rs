//! Directory classification and file collection.
//!
//! The classifier turns a distribution root into patch/client directories;
//! the collector turns one such directory into [`FileEntry`] values. Both are
//! lazy iterators so a distribution is never held in memory at once.
//!
//! [`FileEntry`]: archivist_domain::FileEntry

mod classifier;
mod collector;

pub use classifier::{ClassifiedRoot, Classifier};
pub use collector::EntryCollector;
