use std::path::{Path, PathBuf};

/// Rejects paths that could land outside the directory they are joined to:
/// absolute paths, drive prefixes, and parent-directory components.
pub fn is_safe_relative_path(path: &Path) -> bool {
    use std::path::Component;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::ParentDir => return false,
            _ => {}
        }
    }
    true
}

fn ensure_dir(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if std::fs::create_dir_all(path).is_ok() {
        return Some(path.to_path_buf());
    }
    None
}

fn env_dir(key: &str) -> Option<PathBuf> {
    let value = std::env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    ensure_dir(&PathBuf::from(trimmed))
}

pub fn resolve_root_dir() -> PathBuf {
    if let Some(dir) = env_dir("PATCHLINE_ROOT_DIR") {
        return dir;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            return dir.to_path_buf();
        }
    }

    PathBuf::from(".")
}

pub fn resolve_data_dir() -> PathBuf {
    if let Some(dir) = env_dir("PATCHLINE_DATA_DIR") {
        return dir;
    }

    let root = resolve_root_dir();
    let data = root.join("data");
    ensure_dir(&data).unwrap_or(data)
}

pub fn resolve_install_dir() -> PathBuf {
    if let Some(dir) = env_dir("PATCHLINE_INSTALL_DIR") {
        return dir;
    }

    let root = resolve_root_dir();
    let game = root.join("game");
    ensure_dir(&game).unwrap_or(game)
}

/// Directory the launcher itself runs from, the target of a self-update.
pub fn resolve_launcher_dir() -> PathBuf {
    if let Some(dir) = env_dir("PATCHLINE_LAUNCHER_DIR") {
        return dir;
    }

    resolve_root_dir()
}

pub fn resolve_log_dir() -> PathBuf {
    if let Some(dir) = env_dir("PATCHLINE_LOG_DIR") {
        return dir;
    }

    let root = resolve_root_dir();
    let logs = root.join("logs");
    ensure_dir(&logs).unwrap_or(logs)
}
