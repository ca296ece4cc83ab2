use std::ffi::OsString;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Stream `reader` into `scratch`, flush it to disk, then rename it to `destination`.
pub fn write_via_rename<R: Read + ?Sized>(
    reader: &mut R,
    scratch: &Path,
    destination: &Path,
) -> Result<u64> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let written = (|| -> Result<u64> {
        let mut file = fs::File::create(scratch)
            .with_context(|| format!("failed to create staging file: {}", scratch.display()))?;
        let written = io::copy(reader, &mut file)
            .with_context(|| format!("failed to write staging file: {}", scratch.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush staging file: {}", scratch.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to sync staging file: {}", scratch.display()))?;
        Ok(written)
    })();

    let written = match written {
        Ok(written) => written,
        Err(err) => {
            let _ = remove_file_if_exists(scratch);
            return Err(err);
        }
    };

    if let Err(err) = fs::rename(scratch, destination) {
        let _ = remove_file_if_exists(scratch);
        return Err(err).with_context(|| {
            format!(
                "failed to move {} into {}",
                scratch.display(),
                destination.display()
            )
        });
    }
    Ok(written)
}

pub fn write_file_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut reader = contents;
    write_via_rename(&mut reader, &partial_path(path), path)?;
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(".partial");
    PathBuf::from(raw)
}
