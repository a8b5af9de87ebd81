pub mod bytes;
pub mod error;
pub mod fs;

pub use bytes::format_bytes;
pub use error::{FileIOError, NonUtf8PathError};
pub use fs::AtomicFile;
