use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Extracts every entry of a zip archive into `dest`. Returns the number of
/// files written.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<usize> {
    info!("Extracting {:?}...", archive_path);
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {:?}", archive_path))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Invalid or corrupt ZIP: {:?}", archive_path))?;

    let mut count = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read entry {} of {:?}", i, archive_path))?;

        let entry_path = match entry.enclosed_name() {
            Some(p) => p.to_path_buf(),
            None => {
                warn!("Skipping unsafe archive entry: {}", entry.name());
                continue;
            },
        };
        let output_path = dest.join(&entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&output_path)
                .with_context(|| format!("Failed to create dir: {:?}", output_path))?;
        } else {
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create dir: {:?}", parent))?;
            }
            let mut outfile = File::create(&output_path)
                .with_context(|| format!("Failed to create file: {:?}", output_path))?;
            io::copy(&mut entry, &mut outfile)
                .with_context(|| format!("Failed to write file: {:?}", output_path))?;
            debug!("Extracted {:?}", entry_path);
            count += 1;
        }
    }

    info!("Extracted {} file(s)", count);
    Ok(count)
}

/// Bundles the component files of each dataset in `dir` into one zip at
/// `output`, stored under their bare file names.
///
/// Extensions with no file on disk are skipped. The archive is staged next to
/// `output` and renamed into place only once complete, so a failure leaves
/// any previous archive untouched. Returns the entry names in archive order.
pub fn package_archive(
    dir: &Path,
    base_names: &[String],
    extensions: &[String],
    output: &Path,
) -> Result<Vec<String>> {
    info!("Creating zip file: {:?}", output);
    let output_dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;

    let mut staged = NamedTempFile::new_in(output_dir)
        .with_context(|| format!("Failed to stage archive in {:?}", output_dir))?;

    let mut entries = Vec::new();
    {
        let mut writer = ZipWriter::new(staged.as_file_mut());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for base_name in base_names {
            for ext in extensions {
                let name = format!("{}{}", base_name, ext);
                let path = dir.join(&name);
                if !path.exists() {
                    continue;
                }

                let mut file = File::open(&path)
                    .with_context(|| format!("Failed to open {:?}", path))?;
                writer
                    .start_file(name.clone(), options)
                    .with_context(|| format!("Failed to add {} to archive", name))?;
                io::copy(&mut file, &mut writer)
                    .with_context(|| format!("Failed to add {} to archive", name))?;
                info!("  Added: {}", name);
                entries.push(name);
            }
        }

        writer.finish().context("Failed to finish zip archive")?;
    }

    // Replacing an archive keeps its mode; a new one is world-readable.
    if let Some(permissions) = archive_permissions(output) {
        staged
            .as_file()
            .set_permissions(permissions)
            .with_context(|| format!("Failed to set permissions on staged archive for {:?}", output))?;
    }

    staged
        .persist(output)
        .with_context(|| format!("Failed to write archive: {:?}", output))?;

    Ok(entries)
}

fn archive_permissions(output: &Path) -> Option<fs::Permissions> {
    match fs::metadata(output) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => default_permissions(),
    }
}

#[cfg(unix)]
fn default_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<fs::Permissions> {
    None
}
