//! Flattened output names.
//!
//! Every archive entered on the way down to a leaf contributes its stem to a
//! [`NamePrefix`]; the final name is the prefix segments and the leaf's file
//! name joined by `_`, with whitespace replaced. The mapping is pure, which
//! is what makes re-running `unfold` over the same packs idempotent.
//!
//! Two different sources that resolve to the same name overwrite each other.

use std::path::Path;

use crate::paths;

/// Separator between origin segments in a flattened name
pub const SEPARATOR: char = '_';

/// Archive stems accumulated from the outermost archive inwards.
///
/// Passed by value down each branch of the traversal; [`NamePrefix::merge`]
/// returns a new prefix and leaves the parent's untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamePrefix {
    segments: Vec<String>,
}

impl NamePrefix {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of this prefix with `stem` appended.
    pub fn merge(&self, stem: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(stem.to_string());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

/// Join the prefix and `file_name`, then replace every whitespace character
/// with an underscore.
/// `["Forest Pack", "tiles"]` + `grass 01.png` -> `Forest_Pack_tiles_grass_01.png`
pub fn resolve_final_name(prefix: &NamePrefix, file_name: &str) -> String {
    let mut joined = String::new();
    for segment in prefix.segments() {
        joined.push_str(segment);
        joined.push(SEPARATOR);
    }
    joined.push_str(file_name);

    joined
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// The segment an archive contributes to the prefix: its file stem.
///
/// Only the last extension is removed, so `pack.tar.gz` contributes `pack.tar`.
pub fn archive_stem(path: &Path) -> String {
    paths::file_stem(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_prefix() {
        assert_eq!(resolve_final_name(&NamePrefix::new(), "icon.png"), "icon.png");
        assert_eq!(resolve_final_name(&NamePrefix::new(), "my icon.png"), "my_icon.png");
    }

    #[test]
    fn test_nested_prefix() {
        let prefix = NamePrefix::new().merge("pack").merge("sub");
        assert_eq!(resolve_final_name(&prefix, "icon.png"), "pack_sub_icon.png");
    }

    #[test]
    fn test_all_whitespace_replaced() {
        let prefix = NamePrefix::new().merge("Forest Pack").merge("tab\tdir");
        let name = resolve_final_name(&prefix, "grass 01\n.png");
        assert_eq!(name, "Forest_Pack_tab_dir_grass_01_.png");
        assert!(!name.chars().any(char::is_whitespace));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let prefix = NamePrefix::new().merge("a b").merge("c");
        let first = resolve_final_name(&prefix, "d e.svg");
        for _ in 0..3 {
            assert_eq!(resolve_final_name(&prefix.clone(), "d e.svg"), first);
        }
    }

    #[test]
    fn test_merge_does_not_touch_parent() {
        let parent = NamePrefix::new().merge("outer");
        let left = parent.merge("left");
        let right = parent.merge("right");

        assert_eq!(parent.segments(), ["outer"]);
        assert_eq!(left.segments(), ["outer", "left"]);
        assert_eq!(right.segments(), ["outer", "right"]);
        assert_eq!(right.depth(), 2);
    }

    #[test]
    fn test_archive_stem() {
        assert_eq!(archive_stem(Path::new("pack.zip")), "pack");
        assert_eq!(archive_stem(Path::new("pack.tar.gz")), "pack.tar");
        assert_eq!(archive_stem(Path::new("Pack.TAR.XZ")), "Pack.TAR");
        assert_eq!(archive_stem(Path::new("icon.png.gz")), "icon.png");
        assert_eq!(archive_stem(Path::new("dir/My Pack.7z")), "My Pack");
    }
}
