//! Layered I/O runtime.
//!
//! Script-level filehandles are [`LayeredHandle`]s over one of the backing
//! shapes: file, socket, scalar buffer, standard stream, process pipe or the
//! closed sentinel. Failures additionally record their text in a
//! process-wide last-error slot, mirroring how Perl operators report through
//! `$!` while returning a false value.

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::IoError;

pub mod charset;
pub mod dir;
pub mod file;
pub mod handle;
pub mod layer;
pub mod layered;
pub mod mem;
pub mod pipe;
pub mod socket;
pub mod stdio;

pub use charset::Charset;
pub use dir::DirectoryHandle;
pub use file::{FileHandle, OpenMode};
pub use handle::{ClosedHandle, IoHandle, Whence};
pub use layer::{octets, CrlfLayer, EncodingLayer, IoLayer};
pub use layered::LayeredHandle;
pub use mem::ScalarFile;
pub use pipe::{PipeReader, PipeWriter};
pub use socket::SocketHandle;
pub use stdio::{StandardInput, StandardStream};

static LAST_ERROR: Lazy<Mutex<String>> = Lazy::new(|| Mutex::new(String::new()));

/// Text of the most recent I/O failure, process-wide — the `$!` the script
/// inspects after a false return.
pub fn last_error() -> String {
    LAST_ERROR.lock().clone()
}

pub(crate) fn set_last_error(e: &IoError) {
    *LAST_ERROR.lock() = e.to_string();
}
