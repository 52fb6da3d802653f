use std::path::Path;

use bytes::Bytes;

use crate::NbContainerResult;

use super::FileBatch;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Packs a batch into an uncompressed tar archive meant to be extracted at `/`.
///
/// Entries keep their absolute host path minus the leading `/`, and symlinks are stored as the
/// files they point to.
pub fn build_archive(batch: &FileBatch) -> NbContainerResult<Bytes> {
    let mut builder = tar::Builder::new(Vec::with_capacity(*batch.get_size() as usize));
    builder.follow_symlinks(true);

    for path in batch.get_files() {
        builder.append_path_with_name(path, archive_name(path))?;
    }

    Ok(Bytes::from(builder.into_inner()?))
}

fn archive_name(path: &Path) -> &Path {
    path.strip_prefix("/").unwrap_or(path)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
