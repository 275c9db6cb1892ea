use std::collections::HashSet;

use crate::services::version_directory::VersionManifest;

/// Files a fresh install needs: the full current file list.
pub fn fresh_install_files(manifest: &VersionManifest) -> Vec<String> {
    manifest.current_files.clone()
}

/// Files an update from `installed_version` needs. Walks patch entries for
/// every version newer than the installed one in ascending order and keeps
/// the first occurrence of each file, so a file touched by several patches
/// is fetched once.
pub fn update_delta(manifest: &VersionManifest, installed_version: u32) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut delta = Vec::new();
    for (_, files) in manifest.patch_changes.range(installed_version + 1..) {
        for file in files {
            if seen.insert(file.clone()) {
                delta.push(file.clone());
            }
        }
    }
    delta
}

/// Drops files a resumed attempt already finished, preserving order.
pub fn without_downloaded(files: Vec<String>, downloaded: &HashSet<String>) -> Vec<String> {
    files
        .into_iter()
        .filter(|file| !downloaded.contains(file))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn manifest_with_patches(patches: Vec<(u32, Vec<&str>)>) -> VersionManifest {
        let mut patch_changes = BTreeMap::new();
        for (version, files) in patches {
            patch_changes.insert(
                version,
                files.into_iter().map(|file| file.to_string()).collect(),
            );
        }
        VersionManifest {
            latest_content_version: patch_changes.keys().next_back().copied().unwrap_or(1),
            launcher_version: 1,
            binaries_version: 1,
            content_download_url: "https://example.test/full.zip".to_string(),
            map_download_url: "https://example.test/maps.zip".to_string(),
            files_base_url: "https://example.test/files".to_string(),
            initial_archive_name: "GameContent.zip".to_string(),
            current_files: vec!["base.pak".to_string()],
            patch_changes,
        }
    }

    #[test]
    fn delta_unions_newer_patches_in_first_seen_order() {
        let manifest = manifest_with_patches(vec![
            (2, vec!["a.pak"]),
            (3, vec!["b.pak", "a.pak"]),
            (4, vec!["c.pak"]),
        ]);

        let delta = update_delta(&manifest, 2);
        assert_eq!(delta, vec!["b.pak", "a.pak", "c.pak"]);
    }

    #[test]
    fn up_to_date_install_has_empty_delta() {
        let manifest = manifest_with_patches(vec![(2, vec!["a.pak"]), (3, vec!["b.pak"])]);
        assert!(update_delta(&manifest, 3).is_empty());
    }

    #[test]
    fn resumed_attempt_skips_finished_files() {
        let manifest = manifest_with_patches(vec![(2, vec!["a.pak", "b.pak", "c.pak"])]);
        let mut downloaded = HashSet::new();
        downloaded.insert("b.pak".to_string());

        let pending = without_downloaded(update_delta(&manifest, 1), &downloaded);
        assert_eq!(pending, vec!["a.pak", "c.pak"]);
    }

    #[test]
    fn fresh_install_takes_the_full_file_list() {
        let manifest = manifest_with_patches(vec![(2, vec!["a.pak"])]);
        assert_eq!(fresh_install_files(&manifest), vec!["base.pak"]);
    }
}
