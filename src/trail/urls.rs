// Storage bucket addressing
// Projects live under {base_url}/{short_name}/ with each whitespace character in the name replaced by '_'

use std::path::{Path, PathBuf};

/// Folder name of a project in the bucket
pub fn project_key(short_name: &str) -> String {
    short_name
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

pub fn project_url(base_url: &str, short_name: &str) -> String {
    asset_url(base_url, short_name, "project.json")
}

/// URL of a file referenced from project.json (image, narration, video)
pub fn asset_url(base_url: &str, short_name: &str, file: &str) -> String {
    format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        project_key(short_name),
        file.trim_start_matches('/')
    )
}

/// Where a downloaded asset is stored. Only the file name is kept, as the
/// offline copies of one project share a folder.
pub fn local_asset_path(media_dir: &Path, short_name: &str, file: &str) -> PathBuf {
    let file_name = file.rsplit('/').next().unwrap_or(file);
    media_dir.join(project_key(short_name)).join(file_name)
}
