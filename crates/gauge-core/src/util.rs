//! Spec and concept file recognition and discovery.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

/// Extensions recognised as specification files.
pub const SPEC_EXTENSIONS: &[&str] = &["spec", "md"];

/// Extension recognised as a concept file.
pub const CONCEPT_EXTENSION: &str = "cpt";

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Whether a path names a specification file.
pub fn is_spec_file(path: &Path) -> bool {
    has_extension(path, SPEC_EXTENSIONS)
}

/// Whether a path names a concept file.
pub fn is_concept_file(path: &Path) -> bool {
    has_extension(path, &[CONCEPT_EXTENSION])
}

fn find_files(root: &Path, predicate: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkBuilder::new(root)
        .follow_links(true)
        .hidden(false)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| predicate(path))
        .collect();
    files.sort();
    files
}

/// Recursively find every spec file under a directory.
pub fn find_spec_files(root: &Path) -> Vec<PathBuf> {
    find_files(root, is_spec_file)
}

/// Recursively find every concept file under a directory.
pub fn find_concept_files(root: &Path) -> Vec<PathBuf> {
    find_files(root, is_concept_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_spec_extensions() {
        assert!(is_spec_file(Path::new("specs/login.spec")));
        assert!(is_spec_file(Path::new("specs/login.md")));
        assert!(is_spec_file(Path::new("specs/LOGIN.SPEC")));
        assert!(!is_spec_file(Path::new("specs/login.cpt")));
        assert!(!is_spec_file(Path::new("specs/login")));
    }

    #[test]
    fn recognises_concept_extension() {
        assert!(is_concept_file(Path::new("specs/concepts/auth.cpt")));
        assert!(!is_concept_file(Path::new("specs/auth.spec")));
    }
}
