use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::{write::FileOptions, ZipWriter};

use crate::error::CollectorError;
use crate::host::{path_safe, Host};

/// Output directory shared by every writer in a run. Each producer owns a
/// distinct sub-path: one directory per host, one for cluster-wide steps,
/// one file per exported table.
#[derive(Debug, Clone)]
pub struct Staging {
    root: PathBuf,
}

impl Staging {
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, CollectorError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// A fresh `<base>/<run_id>` directory, so nothing left by an earlier
    /// run ends up in this run's archive. A non-empty directory is refused.
    pub fn for_run(base: impl AsRef<Path>, run_id: &str) -> Result<Self, CollectorError> {
        let root = base.as_ref().join(path_safe(run_id));
        if root.is_dir() && std::fs::read_dir(&root)?.next().is_some() {
            return Err(CollectorError::ConfigValidation(format!(
                "staging directory {} is not empty",
                root.display()
            )));
        }
        Self::create(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<role>s/<host>`
    pub fn host_dir(&self, host: &Host) -> PathBuf {
        self.root.join(host.role.dir_name()).join(host.dir_name())
    }

    pub fn cluster_dir(&self) -> PathBuf {
        self.root.join("cluster")
    }

    pub fn system_tables_dir(&self) -> PathBuf {
        self.root.join("system-tables")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.root.join("summary.json")
    }

    /// Pack the whole staging tree into a zip archive. Returns the file count.
    pub fn archive(&self, output: &Path) -> Result<usize, CollectorError> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let out = File::create(output)?;
        let mut zip = ZipWriter::new(BufWriter::new(out));
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let mut files = 0usize;
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            let rel = match path.strip_prefix(&self.root) {
                Ok(rel) if !rel.as_os_str().is_empty() => rel,
                _ => continue,
            };
            // zip entry names always use forward slashes
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if entry.file_type().is_dir() {
                zip.add_directory(name, options)?;
            } else if entry.file_type().is_file() {
                debug!("Archiving {}", name);
                zip.start_file(name, options)?;
                let mut f = File::open(path)?;
                std::io::copy(&mut f, &mut zip)?;
                files += 1;
            }
        }

        let mut writer = zip.finish()?;
        writer.flush()?;
        info!("Archived {} file(s) into {}", files, output.display());
        Ok(files)
    }
}

/// File name for an exported system table: `sys.<table>.json`, with
/// escaped quotes removed and path separators replaced.
pub fn system_table_file_name(table: &str) -> String {
    let unquoted = table.replace("\\\"", "").replace('"', "");
    format!("sys.{}.json", path_safe(&unquoted))
}
