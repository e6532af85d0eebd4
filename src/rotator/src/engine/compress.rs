use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;

/// Path of the gzip artifact for `path`.
pub fn gzip_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".gz");
    PathBuf::from(name)
}

/// Gzip `path` into `<path>.gz` and remove the source.
///
/// The artifact keeps the source's modification time. On failure the source
/// is left in place and a partial artifact may remain.
pub fn compress_gzip(path: &Path) -> io::Result<PathBuf> {
    let target = gzip_path(path);
    let source = File::open(path)?;
    let modified = source.metadata()?.modified().ok();

    let mut encoder = GzEncoder::new(BufWriter::new(File::create(&target)?), Compression::default());
    io::copy(&mut BufReader::new(source), &mut encoder)?;
    let output = encoder.finish()?.into_inner().map_err(|e| e.into_error())?;
    output.sync_all()?;
    if let Some(modified) = modified {
        output.set_modified(modified)?;
    }

    fs::remove_file(path)?;
    Ok(target)
}
