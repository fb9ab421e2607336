//! State stores.
//!
//! [`MemoryStore`] keeps everything in process and can simulate outages.
//! [`JsonFileStore`] writes one JSON document per user with atomic
//! replace-on-write and appends recaps to a JSON-lines archive.

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
