//! Unpacking `docker cp <container>:<path> -` tar streams.

use bytes::Bytes;
use std::io::Read;
use tar::{Archive, EntryType};

/// Contents of the first regular file in a tar stream.
///
/// `Ok(None)` means the archive holds no regular file (the path was a
/// directory, for instance).
pub(super) fn single_file(archive: &[u8]) -> std::io::Result<Option<Bytes>> {
    let mut archive = Archive::new(archive);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type() != EntryType::Regular {
            continue;
        }
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut contents)?;
        return Ok(Some(Bytes::from(contents)));
    }
    Ok(None)
}
