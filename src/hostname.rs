use std::ffi::CStr;
use std::io;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Determine the hostname used as the metric path prefix.
///
/// Prefers `<procfs>/sys/kernel/hostname` and falls back to `gethostname(2)`.
pub fn resolve(procfs_root: &Path) -> Result<String> {
    let path = procfs_root.join("sys/kernel/hostname");
    if let Ok(content) = std::fs::read_to_string(&path) {
        let name = content.trim();
        if !name.is_empty() {
            return Ok(name.to_string());
        }
    }

    let name = gethostname().context("unable to determine hostname")?;
    if name.is_empty() {
        bail!("unable to determine hostname: empty name");
    }

    Ok(name)
}

fn gethostname() -> io::Result<String> {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer is valid for `buf.len()` bytes; the last byte is
    // never written so the result stays NUL-terminated.
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len() - 1) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    let name = CStr::from_bytes_until_nul(&buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_from_procfs() {
        let dir = tempfile::tempdir().expect("temp dir");
        let kernel = dir.path().join("sys/kernel");
        std::fs::create_dir_all(&kernel).expect("mkdir");
        std::fs::write(kernel.join("hostname"), "web-01\n").expect("write hostname");

        assert_eq!(resolve(dir.path()).expect("resolves"), "web-01");
    }

    #[test]
    fn test_resolve_falls_back_to_gethostname() {
        let dir = tempfile::tempdir().expect("temp dir");
        let name = resolve(dir.path()).expect("resolves");
        assert!(!name.is_empty());
        assert_eq!(name, gethostname().expect("gethostname"));
    }
}
