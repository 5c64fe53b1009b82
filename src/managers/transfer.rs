/*!
 * Chunked Transfers
 * Streaming between byte streams and a view through the staged-write protocol
 */

use std::io::{self, Read, Write};
use thiserror::Error;
use tracing::warn;

use crate::vfs::{FileSystemView, VfsError};

/// Upload and download chunk size, 64 KiB
pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Vfs(#[from] VfsError),

    #[error("local I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Stream `reader` into a new file committed at `path`.
///
/// Any failure discards the pending file, so nothing partial is ever
/// published and its reserved space is released.
pub fn upload(
    view: &FileSystemView,
    reader: &mut dyn Read,
    path: &str,
) -> Result<u64, TransferError> {
    let id = view.create_new_file()?;
    let result = stream_chunks(view, id, reader).and_then(|written| {
        view.commit_new_file(id, path)?;
        Ok(written)
    });

    if result.is_err() {
        if let Err(e) = view.flush_new_file(id) {
            warn!(%id, error = %e, "could not discard failed upload");
        }
    }
    result
}

fn stream_chunks(
    view: &FileSystemView,
    id: crate::vfs::NewFileId,
    reader: &mut dyn Read,
) -> Result<u64, TransferError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let n = read_full(reader, &mut buf)?;
        if n == 0 {
            return Ok(written);
        }
        view.write_to_new_file(id, &buf[..n])?;
        written += n as u64;
    }
}

/// Fill `buf` as far as the reader allows; short only at end of stream
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Copy the file at `path`, from `offset` on, into `writer` chunk by chunk
pub fn download(
    view: &FileSystemView,
    path: &str,
    offset: u64,
    writer: &mut dyn Write,
) -> Result<u64, TransferError> {
    let mut position = offset;
    loop {
        let chunk = view.read(path, position, Some(CHUNK_SIZE as u64))?;
        if chunk.is_empty() {
            break;
        }
        writer.write_all(&chunk)?;
        position += chunk.len() as u64;
        if chunk.len() < CHUNK_SIZE {
            break;
        }
    }
    writer.flush()?;
    Ok(position - offset)
}
