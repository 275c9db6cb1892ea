use std::fs::{self, File};
use std::io;
use std::path::Path;

/// Writes the full contents to `path` through a temp file + rename so a
/// process kill mid-write cannot leave a half-written record behind.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let temp_path = path.with_extension("tmp");
    if let Some(parent) = temp_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(&temp_path)?;
    use std::io::Write;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("patchline-file-test-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("create temp directory");
        dir
    }

    #[test]
    fn write_atomic_replaces_existing_contents() {
        let dir = temp_dir();
        let target = dir.join("record.json");

        write_atomic(&target, b"first").expect("first write");
        write_atomic(&target, b"second").expect("second write");

        let read = fs::read(&target).expect("read back");
        assert_eq!(read, b"second");
        assert!(!target.with_extension("tmp").exists());
    }

    #[test]
    fn write_atomic_creates_missing_parents() {
        let dir = temp_dir();
        let target = dir.join("nested").join("deeper").join("record.json");

        write_atomic(&target, b"payload").expect("nested write");
        assert_eq!(fs::read(&target).expect("read back"), b"payload");
    }
}
