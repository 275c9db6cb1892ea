use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::errors::{Result, UpdaterError};

/// Wire shape of the version directory payload. Version keys arrive as JSON
/// strings and are validated into integers below.
#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(rename = "Launcher")]
    launcher: i64,
    #[serde(rename = "Binaries")]
    binaries: i64,
    #[serde(rename = "InitialDownload")]
    initial_download: String,
    #[serde(rename = "FilesUrl")]
    files_url: Option<String>,
    #[serde(rename = "CurrentFiles", default)]
    current_files: Vec<String>,
    #[serde(rename = "PatchChanges", default)]
    patch_changes: HashMap<String, Vec<String>>,
    #[serde(rename = "Game", default)]
    game: HashMap<String, String>,
    #[serde(rename = "Mapdata", default)]
    mapdata: HashMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct VersionManifest {
    pub latest_content_version: u32,
    pub launcher_version: u32,
    pub binaries_version: u32,
    pub content_download_url: String,
    pub map_download_url: String,
    pub files_base_url: String,
    pub initial_archive_name: String,
    pub current_files: Vec<String>,
    pub patch_changes: BTreeMap<u32, Vec<String>>,
}

impl VersionManifest {
    /// Absolute URL for one content file, relative path preserved.
    pub fn file_url(&self, relative: &str) -> String {
        format!(
            "{}/{}",
            self.files_base_url.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }

    pub fn initial_archive_url(&self) -> String {
        self.file_url(&self.initial_archive_name)
    }

    /// Binaries patch archive served next to the content files.
    pub fn binaries_archive_url(&self) -> String {
        self.file_url("Binaries.zip")
    }

    /// Bundled launcher archive for self-updates.
    pub fn launcher_archive_url(&self) -> String {
        self.file_url("Launcher.zip")
    }
}

#[derive(Clone)]
pub struct VersionDirectoryClient {
    client: reqwest::Client,
    manifest_url: String,
}

impl VersionDirectoryClient {
    pub fn new(client: reqwest::Client, manifest_url: String) -> Self {
        Self {
            client,
            manifest_url,
        }
    }

    /// One fetch per session start; the caller decides whether a failure is
    /// retried or surfaced, so no retry loop lives here.
    pub async fn fetch_manifest(&self) -> Result<VersionManifest> {
        let response = self.client.get(&self.manifest_url).send().await?;
        if !response.status().is_success() {
            return Err(UpdaterError::Http(format!(
                "manifest fetch returned HTTP {}",
                response.status().as_u16()
            )));
        }
        let body = response.text().await?;
        parse_manifest(&body)
    }
}

/// The served payload is wrapped in a bytes-literal style envelope with
/// literal escape sequences left in the text. Strip those before handing the
/// remainder to the JSON parser.
pub fn sanitize_payload(raw: &str) -> String {
    let cleaned = raw
        .replace("\\n", "")
        .replace("\\r", "")
        .replace("\\t", "");
    let cleaned = cleaned.trim();
    let stripped = cleaned
        .strip_prefix("b'")
        .and_then(|rest| rest.strip_suffix('\''))
        .or_else(|| {
            cleaned
                .strip_prefix("b\"")
                .and_then(|rest| rest.strip_suffix('"'))
        })
        .unwrap_or(cleaned);
    stripped.to_string()
}

pub fn parse_manifest(body: &str) -> Result<VersionManifest> {
    let sanitized = sanitize_payload(body);
    let raw: RawManifest = serde_json::from_str(&sanitized)
        .map_err(|err| UpdaterError::ManifestFormat(err.to_string()))?;

    let launcher_version = version_field("Launcher", raw.launcher)?;
    let binaries_version = version_field("Binaries", raw.binaries)?;

    let mut patch_changes = BTreeMap::new();
    for (key, files) in raw.patch_changes {
        let version = parse_version_key("PatchChanges", &key)?;
        patch_changes.insert(version, files);
    }

    let (content_version, content_download_url) = latest_entry("Game", &raw.game)?;
    let (_, map_download_url) = latest_entry("Mapdata", &raw.mapdata)?;

    // Latest content version is the highest patch key; a directory with no
    // patches yet falls back to the full-archive entry.
    let latest_content_version = patch_changes
        .keys()
        .next_back()
        .copied()
        .unwrap_or(content_version)
        .max(content_version);

    let files_base_url = raw
        .files_url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| UpdaterError::ManifestFormat("missing FilesUrl".to_string()))?;

    if raw.initial_download.trim().is_empty() {
        return Err(UpdaterError::ManifestFormat(
            "missing InitialDownload".to_string(),
        ));
    }

    Ok(VersionManifest {
        latest_content_version,
        launcher_version,
        binaries_version,
        content_download_url,
        map_download_url,
        files_base_url,
        initial_archive_name: raw.initial_download,
        current_files: raw.current_files,
        patch_changes,
    })
}

fn version_field(field: &str, value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| UpdaterError::ManifestFormat(format!("{field} is not a valid version")))
}

fn parse_version_key(field: &str, key: &str) -> Result<u32> {
    key.trim()
        .parse::<u32>()
        .map_err(|_| UpdaterError::ManifestFormat(format!("{field} key '{key}' is not numeric")))
}

fn latest_entry(field: &str, entries: &HashMap<String, String>) -> Result<(u32, String)> {
    let mut latest: Option<(u32, String)> = None;
    for (key, url) in entries {
        let version = parse_version_key(field, key)?;
        match &latest {
            Some((current, _)) if *current >= version => {}
            _ => latest = Some((version, url.clone())),
        }
    }
    latest.ok_or_else(|| UpdaterError::ManifestFormat(format!("missing {field} entry")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Launcher": 3,
        "Binaries": 4,
        "InitialDownload": "GameContent.zip",
        "FilesUrl": "https://example.test/files/",
        "CurrentFiles": ["maps/base.pak", "core/engine.pak"],
        "PatchChanges": {
            "2": ["a.pak"],
            "3": ["b.pak", "a.pak"],
            "4": ["c.pak"]
        },
        "Game": {"4": "https://example.test/full/v4.zip"},
        "Mapdata": {"4": "https://example.test/maps/v4.zip"}
    }"#;

    #[test]
    fn sanitize_strips_bytes_wrapper_and_escapes() {
        let wrapped = format!("b'{}'", "{\\n  \"Launcher\": 3\\r\\t}");
        assert_eq!(sanitize_payload(&wrapped), "{  \"Launcher\": 3}");
    }

    #[test]
    fn sanitize_passes_plain_json_through() {
        assert_eq!(sanitize_payload("{\"Launcher\": 3}"), "{\"Launcher\": 3}");
    }

    #[test]
    fn parses_full_payload() {
        let manifest = parse_manifest(SAMPLE).expect("parse sample");
        assert_eq!(manifest.latest_content_version, 4);
        assert_eq!(manifest.launcher_version, 3);
        assert_eq!(manifest.binaries_version, 4);
        assert_eq!(manifest.initial_archive_name, "GameContent.zip");
        assert_eq!(manifest.patch_changes[&3], vec!["b.pak", "a.pak"]);
        assert_eq!(manifest.current_files.len(), 2);
    }

    #[test]
    fn parses_wrapped_payload() {
        let wrapped = format!("b'{}'", SAMPLE.replace('\n', "\\n"));
        let manifest = parse_manifest(&wrapped).expect("parse wrapped sample");
        assert_eq!(manifest.latest_content_version, 4);
    }

    #[test]
    fn rejects_non_numeric_patch_key() {
        let body = SAMPLE.replace("\"4\": [\"c.pak\"]", "\"latest\": [\"c.pak\"]");
        let err = parse_manifest(&body).expect_err("non-numeric key");
        assert!(matches!(err, UpdaterError::ManifestFormat(_)));
    }

    #[test]
    fn rejects_missing_required_field() {
        let body = SAMPLE.replace("\"FilesUrl\": \"https://example.test/files/\",", "");
        let err = parse_manifest(&body).expect_err("missing files url");
        assert!(matches!(err, UpdaterError::ManifestFormat(_)));
    }

    #[test]
    fn file_url_joins_cleanly() {
        let manifest = parse_manifest(SAMPLE).expect("parse sample");
        assert_eq!(
            manifest.file_url("/maps/base.pak"),
            "https://example.test/files/maps/base.pak"
        );
    }
}
