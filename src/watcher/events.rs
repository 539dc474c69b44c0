// File-change events and the dedup rule from spec §4.4.

use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
    RescanNeeded,
}

#[derive(Debug, Clone)]
pub struct FileChangeEvent {
    pub path: PathBuf,
    pub folder_path: String,
    pub kind: ChangeKind,
}

/// Collapses multiple events on the same path to the last non-`Modified`
/// event, with `Removed` dominating `Modified`. Order of the surviving
/// events follows first-occurrence order of each path.
pub fn deduplicate_events(events: Vec<FileChangeEvent>) -> Vec<FileChangeEvent> {
    let mut order: Vec<PathBuf> = Vec::new();
    let mut by_path: HashMap<PathBuf, FileChangeEvent> = HashMap::new();

    for event in events {
        match by_path.get(&event.path) {
            None => {
                order.push(event.path.clone());
                by_path.insert(event.path.clone(), event);
            }
            Some(existing) => {
                let winner = merge_kind(existing.kind, event.kind);
                let mut merged = event;
                merged.kind = winner;
                by_path.insert(merged.path.clone(), merged);
            }
        }
    }

    order.into_iter().filter_map(|p| by_path.remove(&p)).collect()
}

/// `removed` dominates `modified`; a later non-modified event (added,
/// removed, rescan_needed) otherwise replaces the earlier one.
fn merge_kind(existing: ChangeKind, incoming: ChangeKind) -> ChangeKind {
    match (existing, incoming) {
        (ChangeKind::Removed, ChangeKind::Modified) => ChangeKind::Removed,
        (_, ChangeKind::Modified) => existing,
        (_, later) => later,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(path: &str, kind: ChangeKind) -> FileChangeEvent {
        FileChangeEvent {
            path: PathBuf::from(path),
            folder_path: "/f".to_string(),
            kind,
        }
    }

    #[test]
    fn removed_dominates_later_modified() {
        let events = vec![ev("/f/a.mp4", ChangeKind::Removed), ev("/f/a.mp4", ChangeKind::Modified)];
        let deduped = deduplicate_events(events);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].kind, ChangeKind::Removed);
    }

    #[test]
    fn later_added_replaces_earlier_modified() {
        let events = vec![ev("/f/a.mp4", ChangeKind::Modified), ev("/f/a.mp4", ChangeKind::Added)];
        let deduped = deduplicate_events(events);
        assert_eq!(deduped[0].kind, ChangeKind::Added);
    }

    #[test]
    fn distinct_paths_are_preserved_in_first_seen_order() {
        let events = vec![ev("/f/b.mp4", ChangeKind::Added), ev("/f/a.mp4", ChangeKind::Added)];
        let deduped = deduplicate_events(events);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].path, PathBuf::from("/f/b.mp4"));
        assert_eq!(deduped[1].path, PathBuf::from("/f/a.mp4"));
    }

    #[test]
    fn rescan_needed_wins_over_everything() {
        let events = vec![
            ev("/f/a.mp4", ChangeKind::Added),
            ev("/f/a.mp4", ChangeKind::Modified),
            ev("/f/a.mp4", ChangeKind::RescanNeeded),
        ];
        let deduped = deduplicate_events(events);
        assert_eq!(deduped[0].kind, ChangeKind::RescanNeeded);
    }
}
