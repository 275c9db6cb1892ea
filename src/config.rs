use std::path::PathBuf;
use std::time::Duration;

use crate::utils::paths::{resolve_data_dir, resolve_install_dir, resolve_launcher_dir};

const DEFAULT_MANIFEST_URL: &str = "https://reallylinux.nz/RaisSoftware/cw/game_data.json";
const DEFAULT_WORKER_COUNT: usize = 4;
const MAX_WORKER_COUNT: usize = 16;

pub fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
}

pub fn env_truthy(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
        })
        .unwrap_or(false)
}

#[derive(Clone, Debug)]
pub struct UpdaterConfig {
    pub manifest_url: String,
    pub data_dir: PathBuf,
    pub install_dir: PathBuf,
    pub launcher_dir: PathBuf,
    pub worker_count: usize,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl UpdaterConfig {
    pub fn from_env() -> Self {
        let manifest_url = std::env::var("PATCHLINE_MANIFEST_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_MANIFEST_URL.to_string());

        let worker_count = env_usize("PATCHLINE_WORKERS")
            .unwrap_or(DEFAULT_WORKER_COUNT)
            .clamp(1, MAX_WORKER_COUNT);

        let request_timeout_seconds = env_usize("PATCHLINE_HTTP_TIMEOUT_SECONDS")
            .unwrap_or(600)
            .clamp(30, 7200) as u64;
        let connect_timeout_seconds = env_usize("PATCHLINE_HTTP_CONNECT_TIMEOUT_SECONDS")
            .unwrap_or(20)
            .clamp(5, 120) as u64;

        Self {
            manifest_url,
            data_dir: resolve_data_dir(),
            install_dir: resolve_install_dir(),
            launcher_dir: resolve_launcher_dir(),
            worker_count,
            request_timeout: Duration::from_secs(request_timeout_seconds),
            connect_timeout: Duration::from_secs(connect_timeout_seconds),
        }
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join("saved_data.json")
    }

    pub fn build_client(&self) -> crate::errors::Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|err| crate::errors::UpdaterError::Config(err.to_string()))?;
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_truthy_accepts_common_forms() {
        std::env::set_var("PATCHLINE_TEST_TRUTHY", "  Yes ");
        assert!(env_truthy("PATCHLINE_TEST_TRUTHY"));
        std::env::set_var("PATCHLINE_TEST_TRUTHY", "0");
        assert!(!env_truthy("PATCHLINE_TEST_TRUTHY"));
        std::env::remove_var("PATCHLINE_TEST_TRUTHY");
        assert!(!env_truthy("PATCHLINE_TEST_TRUTHY"));
    }

    #[test]
    fn worker_count_is_clamped() {
        std::env::set_var("PATCHLINE_WORKERS", "500");
        let config = UpdaterConfig::from_env();
        assert_eq!(config.worker_count, MAX_WORKER_COUNT);
        std::env::remove_var("PATCHLINE_WORKERS");
    }
}
