use std::{io, path::Path};

/// Wrapper for `io::Error` that keeps the path the operation failed on and an
/// optional static context message.
#[derive(thiserror::Error, Debug)]
#[error("file IO error at '{}'{}: {source}", .path.display(), .context.map(|ctx| format!(" ({ctx})")).unwrap_or_default())]
pub struct FileIOError {
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
	pub context: Option<&'static str>,
}

impl<P: AsRef<Path>> From<(P, io::Error)> for FileIOError {
	fn from((path, source): (P, io::Error)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			context: None,
		}
	}
}

impl<P: AsRef<Path>> From<(P, io::Error, &'static str)> for FileIOError {
	fn from((path, source, context): (P, io::Error, &'static str)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			context: Some(context),
		}
	}
}

#[derive(thiserror::Error, Debug)]
#[error("received a non UTF-8 path: <lossy_display='{}'>", .0.to_string_lossy())]
pub struct NonUtf8PathError(pub Box<Path>);
