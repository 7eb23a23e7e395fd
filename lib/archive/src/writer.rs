use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tar::{EntryType, Header};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::SyncIoBridge;
use tracing::debug;
use walkdir::WalkDir;

use crate::compression::{Compression, Encoder};

const PIPE_BUFFER: usize = 256 * 1024;

/// Streams `sources` into a single compressed tar at `dest`. Each source
/// root is archived under its own basename, mirroring what a plain `tar
/// -C <parent> -cf archive.tar <basename>` invocation would produce.
pub async fn create_archive(
  sources: &[PathBuf],
  dest: &Path,
  compression: Compression,
) -> anyhow::Result<()> {
  if let Some(parent) = dest.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create staging directory {}", parent.display()))?;
  }

  let out_file = File::create(dest)
    .await
    .with_context(|| format!("failed to create archive file {}", dest.display()))?;
  let mut encoder = Encoder::new(compression, out_file);

  let (pipe_writer, mut pipe_reader) = tokio::io::duplex(PIPE_BUFFER);

  let sources = sources.to_vec();
  let build_task = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
    let sync_writer = SyncIoBridge::new(pipe_writer);
    let mut builder = tar::Builder::new(sync_writer);
    for source in &sources {
      write_source_tree(&mut builder, source)?;
    }
    builder
      .finish()
      .context("failed to finalize tar stream")?;
    Ok(())
  });

  let copy_result = tokio::io::copy(&mut pipe_reader, &mut encoder).await;

  let build_result = build_task
    .await
    .context("archive builder task panicked")?;
  build_result?;
  copy_result.context("failed to stream tar data into compressor")?;

  encoder.shutdown().await?;
  Ok(())
}

fn write_source_tree<W: io::Write>(
  builder: &mut tar::Builder<W>,
  source: &Path,
) -> anyhow::Result<()> {
  let root_name = source
    .file_name()
    .ok_or_else(|| anyhow!("source root {} has no basename", source.display()))?;

  for entry in WalkDir::new(source).follow_links(false) {
    let entry = entry.with_context(|| format!("failed to walk {}", source.display()))?;
    let rel = entry
      .path()
      .strip_prefix(source)
      .expect("walkdir yields paths under its root");
    let archive_path = PathBuf::from(root_name).join(rel);

    let file_type = entry.file_type();
    let metadata = entry
      .metadata()
      .with_context(|| format!("failed to stat {}", entry.path().display()))?;

    if file_type.is_block_device() || file_type.is_char_device() || file_type.is_fifo() {
      debug!(path = %entry.path().display(), "skipping device node, not supported in archive");
      continue;
    }

    let mut header = Header::new_gnu();
    header.set_mode(metadata.mode());
    header.set_uid(metadata.uid() as u64);
    header.set_gid(metadata.gid() as u64);
    header.set_mtime(metadata.mtime().max(0) as u64);

    if file_type.is_symlink() {
      let target = std::fs::read_link(entry.path())
        .with_context(|| format!("failed to read symlink {}", entry.path().display()))?;
      header.set_entry_type(EntryType::Symlink);
      header.set_size(0);
      builder
        .append_link(&mut header, &archive_path, &target)
        .with_context(|| format!("failed to append symlink {}", archive_path.display()))?;
    } else if file_type.is_dir() {
      header.set_entry_type(EntryType::Directory);
      header.set_size(0);
      builder
        .append_data(&mut header, &archive_path, io::empty())
        .with_context(|| format!("failed to append directory {}", archive_path.display()))?;
    } else {
      header.set_entry_type(EntryType::Regular);
      header.set_size(metadata.len());
      let mut file = std::fs::File::open(entry.path())
        .with_context(|| format!("failed to open {}", entry.path().display()))?;
      builder
        .append_data(&mut header, &archive_path, &mut file)
        .with_context(|| format!("failed to append file {}", archive_path.display()))?;
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::os::unix::fs::symlink;

  #[tokio::test]
  async fn archives_file_symlink_and_empty_dir() {
    let src = tempfile::tempdir().unwrap();
    let root = src.path().join("a");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("x"), b"1").unwrap();
    std::fs::create_dir(root.join("empty")).unwrap();
    symlink("x", root.join("link")).unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let dest = out_dir.path().join("b.tar.gz");

    create_archive(&[root.clone()], &dest, Compression::Gzip)
      .await
      .unwrap();

    assert!(dest.exists());

    let bytes = std::fs::read(&dest).unwrap();
    let decoder = flate2_decode(&bytes);
    let mut archive = tar::Archive::new(decoder.as_slice());
    let mut names = Vec::new();
    for entry in archive.entries().unwrap() {
      let entry = entry.unwrap();
      names.push(entry.path().unwrap().to_path_buf());
    }
    assert!(names.iter().any(|p| p.ends_with("a/x")));
    assert!(names.iter().any(|p| p.ends_with("a/link")));
    assert!(names.iter().any(|p| p.ends_with("a/empty")));
  }

  fn flate2_decode(bytes: &[u8]) -> Vec<u8> {
    use flate2::read::GzDecoder;
    use std::io::Read;
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).unwrap();
    out
  }
}
