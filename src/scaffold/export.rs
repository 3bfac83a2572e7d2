//! Archive export of an environment's working directory.

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;

use crate::sandbox::{EnvHandle, ExecutionEnvironment, join_path};

/// Name of the single top-level directory inside exported archives.
pub const ARCHIVE_ROOT: &str = "project";

/// Pack every file under `workdir` into a `.tar.gz`.
///
/// All files are read before anything is written, so a failure yields an
/// error and no bytes at all.
pub async fn export_archive(
    env: &dyn ExecutionEnvironment,
    handle: &EnvHandle,
    workdir: &str,
) -> Result<Vec<u8>> {
    let paths = env
        .list_files(handle, workdir)
        .await
        .context("Failed to list project files")?;

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let content = env
            .read_file_bytes(handle, &join_path(workdir, &path))
            .await
            .with_context(|| format!("Failed to read {}", path))?;
        files.push((path, content));
    }

    tracing::info!(sandbox_id = %handle, files = files.len(), "Exporting project archive");
    pack(&files)
}

/// Build a gzip-compressed tar from `(relative path, content)` pairs.
pub fn pack(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mtime = chrono::Utc::now().timestamp().max(0) as u64;

    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        header.set_cksum();
        builder
            .append_data(
                &mut header,
                format!("{}/{}", ARCHIVE_ROOT, path),
                content.as_slice(),
            )
            .with_context(|| format!("Failed to add {} to archive", path))?;
    }

    let encoder = builder.into_inner().context("Failed to finish tar archive")?;
    encoder.finish().context("Failed to finish gzip stream")
}
