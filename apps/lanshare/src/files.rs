use std::path::{Component, Path};

use anyhow::bail;
use tokio::fs::{File, OpenOptions};

/// Checks that a peer-supplied file name is a single plain path component.
///
/// Rejects:
/// - Empty names
/// - Absolute paths and Windows prefixes (`C:`, `\\server`)
/// - Parent directory traversal (`..`)
/// - Anything with a directory part, including backslash separators
pub fn safe_file_name(name: &str) -> anyhow::Result<&str> {
    if name.trim().is_empty() {
        bail!("empty file name");
    }
    if name.contains('\\') {
        bail!("directory separators not allowed: {name}");
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) => match part.to_str() {
            Some(part) => Ok(part),
            None => bail!("file name is not valid UTF-8: {name}"),
        },
        (Some(Component::ParentDir), _) => {
            bail!("parent directory traversal not allowed: {name}")
        }
        (Some(Component::RootDir | Component::Prefix(_)), _) => {
            bail!("absolute path not allowed: {name}")
        }
        _ => bail!("directories not allowed in file name: {name}"),
    }
}

/// Opens `path` for appending and returns it with the number of bytes
/// already on disk.
///
/// A file longer than `payload_len` cannot be a prefix of this payload and
/// is truncated.
pub async fn open_for_resume(path: &Path, payload_len: u64) -> std::io::Result<(File, u64)> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let mut existing = file.metadata().await?.len();
    if existing > payload_len {
        tracing::debug!(
            path = %path.display(),
            existing,
            payload_len,
            "existing file is longer than the payload, starting over"
        );
        file.set_len(0).await?;
        existing = 0;
    }
    Ok((file, existing))
}
