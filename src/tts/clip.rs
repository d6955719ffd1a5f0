//! Temporary audio renderings.
//!
//! Every answer is synthesized into its own `tts_<uuid>.wav` file.  The
//! [`TempClip`] guard removes it when playback ends, however it ends.  A
//! crash can still leave files behind, so [`purge_stale_clips`] sweeps the
//! clip directory at startup.

use std::io;
use std::path::{Path, PathBuf};

/// File-name prefix shared by every rendering.
pub const CLIP_PREFIX: &str = "tts_";
const CLIP_EXTENSION: &str = "wav";

/// Owns a clip path; the file (if it was ever created) is deleted on drop.
#[derive(Debug)]
pub struct TempClip {
    path: PathBuf,
}

impl TempClip {
    /// Reserve a fresh, unique clip path inside `dir`.  Nothing is written.
    pub fn create_in(dir: &Path) -> Self {
        let name = format!("{CLIP_PREFIX}{}.{CLIP_EXTENSION}", uuid::Uuid::new_v4());
        Self {
            path: dir.join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempClip {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("tts: removed {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("tts: could not remove {}: {e}", self.path.display()),
        }
    }
}

fn is_clip_name(name: &str) -> bool {
    name.starts_with(CLIP_PREFIX)
        && Path::new(name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(CLIP_EXTENSION))
}

/// Delete leftover `tts_*.wav` files in `dir`.  Returns how many were
/// removed.  A missing directory counts as clean.
pub fn purge_stale_clips(dir: &Path) -> io::Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !is_clip_name(name) || !entry.file_type()?.is_file() {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => log::warn!("tts: could not purge {name}: {e}"),
        }
    }

    if removed > 0 {
        log::info!("tts: purged {removed} stale clip(s) from {}", dir.display());
    }
    Ok(removed)
}
