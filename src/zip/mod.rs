//! Streaming ZIP container assembly.
//!
//! [`assemble`] turns one [`Volume`](crate::volume::Volume) into a lazy
//! byte stream forming a valid ZIP archive: a local file header before each
//! entry's bytes, a data descriptor after them, and the central directory
//! once all entries are exhausted. Entries are stored uncompressed; sizes
//! and CRCs are accounted on the fly, so nothing is buffered beyond the
//! chunk in flight.

mod records;
mod stream;

pub use stream::assemble;

pub(crate) use records::{EntryRecord, central_directory, data_descriptor, dos_datetime, local_file_header};
