//! Fixed namespace layout inside the backing store.
//!
//! Repository content and the trash holding area live under distinct
//! prefixes so a repository key can never collide with a holding folder.

/// Root of all repository content subtrees.
pub const REPOSITORIES_PREFIX: &str = "repositories";

/// Root of the trash holding area.
pub const TRASH_PREFIX: &str = "trash";

/// Absolute store path of a repository's content subtree.
pub fn repo_root(repo_key: &str) -> String {
    format!("{REPOSITORIES_PREFIX}/{repo_key}")
}

/// Absolute store path of an item inside a repository.
pub fn repo_item(repo_key: &str, rel_path: &str) -> String {
    if rel_path.is_empty() {
        repo_root(repo_key)
    } else {
        format!("{REPOSITORIES_PREFIX}/{repo_key}/{rel_path}")
    }
}

/// Absolute store path of a trash holding folder.
pub fn trash_folder(folder_name: &str) -> String {
    format!("{TRASH_PREFIX}/{folder_name}")
}

/// Absolute store path of a trashed item inside a holding folder.
///
/// The original `(repo_key, rel_path)` shape is preserved under the holding
/// folder so a purge failure leaves forensically readable remains.
pub fn trash_item(folder_name: &str, repo_key: &str, rel_path: &str) -> String {
    if rel_path.is_empty() {
        format!("{TRASH_PREFIX}/{folder_name}/{repo_key}")
    } else {
        format!("{TRASH_PREFIX}/{folder_name}/{repo_key}/{rel_path}")
    }
}
