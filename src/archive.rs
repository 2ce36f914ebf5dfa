use std::io::{Cursor, Write as _};

use anyhow::Context as _;
use zip::write::SimpleFileOptions;

use crate::package::ArchiveFile;

pub const MIMETYPE: &[u8] = b"application/epub+zip";

/// Zips `files` into an EPUB container. `mimetype` is always the first entry
/// and stored uncompressed; any `mimetype` in `files` is ignored.
pub fn package_to_zip(files: &[ArchiveFile]) -> anyhow::Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));

    let mimetype_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    zip.start_file("mimetype", mimetype_options)
        .context("epub start_file mimetype")?;
    zip.write_all(MIMETYPE).context("epub write mimetype")?;

    let deflated_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for file in files.iter().filter(|f| f.path != "mimetype") {
        zip.start_file(file.path.as_str(), deflated_options)
            .with_context(|| format!("epub start_file: {}", file.path))?;
        zip.write_all(&file.data)
            .with_context(|| format!("epub write: {}", file.path))?;
    }

    let cursor = zip.finish().context("epub finish zip")?;
    Ok(cursor.into_inner())
}
