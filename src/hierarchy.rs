// FolderHierarchy (spec §6): decides how a newly requested watch folder
// relates to the folders already registered, using strict prefix
// comparison with a trailing `/` so `/a/bc` is never mistaken for a child
// of `/a/b`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdditionResolution {
    /// Already registered (after normalizing a trailing slash).
    Duplicate,
    /// No relationship to any existing folder; index it as its own root.
    AddNormally,
    /// `new` is an ancestor of one or more already-registered folders.
    /// Those children must be excluded from `new`'s own scan — they're
    /// independently indexed already.
    AddAsParent { children: Vec<String> },
    /// `new` is a descendant of an already-registered folder. It gets a
    /// UI bookmark only; it is never given its own per-folder DB or index.
    AddAsSubfolderBookmark { parent: String },
}

fn normalize(path: &str) -> String {
    path.trim_end_matches('/').to_string()
}

fn is_strict_prefix(ancestor: &str, descendant: &str) -> bool {
    descendant.starts_with(&format!("{ancestor}/"))
}

pub struct FolderHierarchy;

impl FolderHierarchy {
    pub fn resolve_addition(new: &str, existing: &[String]) -> AdditionResolution {
        let new = normalize(new);

        if existing.iter().any(|e| normalize(e) == new) {
            return AdditionResolution::Duplicate;
        }

        let children: Vec<String> = existing.iter().filter(|e| is_strict_prefix(&new, e)).cloned().collect();
        if !children.is_empty() {
            return AdditionResolution::AddAsParent { children };
        }

        if let Some(parent) = existing.iter().find(|e| is_strict_prefix(e, &new)) {
            return AdditionResolution::AddAsSubfolderBookmark { parent: parent.clone() };
        }

        AdditionResolution::AddNormally
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_duplicate_is_rejected_regardless_of_trailing_slash() {
        let existing = vec!["/videos/family".to_string()];
        assert_eq!(FolderHierarchy::resolve_addition("/videos/family/", &existing), AdditionResolution::Duplicate);
    }

    #[test]
    fn unrelated_path_is_added_normally() {
        let existing = vec!["/videos/family".to_string()];
        assert_eq!(FolderHierarchy::resolve_addition("/videos/work", &existing), AdditionResolution::AddNormally);
    }

    #[test]
    fn adding_an_ancestor_folds_in_existing_children() {
        let existing = vec!["/videos/family/2020".to_string(), "/videos/work".to_string()];
        let resolution = FolderHierarchy::resolve_addition("/videos/family", &existing);
        assert_eq!(
            resolution,
            AdditionResolution::AddAsParent { children: vec!["/videos/family/2020".to_string()] }
        );
    }

    #[test]
    fn adding_a_descendant_of_an_existing_folder_is_a_bookmark_only() {
        let existing = vec!["/videos/family".to_string()];
        let resolution = FolderHierarchy::resolve_addition("/videos/family/2020", &existing);
        assert_eq!(resolution, AdditionResolution::AddAsSubfolderBookmark { parent: "/videos/family".to_string() });
    }

    #[test]
    fn sibling_with_shared_prefix_is_not_mistaken_for_a_child() {
        let existing = vec!["/videos/family".to_string()];
        assert_eq!(FolderHierarchy::resolve_addition("/videos/familyalbum", &existing), AdditionResolution::AddNormally);
    }
}
