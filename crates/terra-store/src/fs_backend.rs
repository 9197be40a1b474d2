#![cfg(feature = "std")]

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use terra_core::{TerraError, TerraResult};
use terra_hal::FlashMedium;

use crate::backend::ERASED_BYTE;

/// Flash medium backed by a host file.
///
/// A missing file is an erased part. Programs are atomic: the image goes to a
/// `.tmp` sibling, is fsynced, then renamed over the real file.
pub struct FileFlash {
    path: PathBuf,
    capacity: usize,
}

impl FileFlash {
    pub fn new(path: impl AsRef<Path>, capacity: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path, capacity })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FlashMedium for FileFlash {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn load(&mut self, buf: &mut [u8]) -> TerraResult<()> {
        if buf.len() > self.capacity {
            return Err(TerraError::OutOfRange);
        }
        buf.fill(ERASED_BYTE);

        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} not found, treating as erased", self.path.display());
                return Ok(());
            }
            Err(_) => return Err(TerraError::BackendIo),
        };

        // A short image leaves the tail erased.
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return Err(TerraError::BackendIo),
            }
        }
        Ok(())
    }

    fn program(&mut self, image: &[u8]) -> TerraResult<()> {
        if image.len() > self.capacity {
            return Err(TerraError::OutOfRange);
        }
        let tmp_path = self.path.with_extension("tmp");

        // 1. Write .tmp
        {
            let mut file = OpenOptions::new()
                .write(true).create(true).truncate(true)
                .open(&tmp_path).map_err(|_| TerraError::BackendIo)?;

            file.write_all(image).map_err(|_| TerraError::BackendIo)?;

            // 2. FSYNC
            file.sync_all().map_err(|_| TerraError::BackendIo)?;
        }

        // 3. Rename (Atomic)
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            warn!("rename {} failed: {}", tmp_path.display(), e);
            TerraError::BackendIo
        })?;

        // 4. Sync Parent Dir
        if let Some(parent) = self.path.parent() {
            if let Ok(f) = File::open(parent) { let _ = f.sync_all(); }
        }

        Ok(())
    }
}
