//! Plain-text rendering of histories and chat listings.

use loom_common::{ChatSummary, HistoryEntry};

/// Header line for one turn: its distance from the current turn (the
/// number `/edit`, `/regen`, `/next` and `/prev` take), role, and branch
/// position when it has siblings.
pub fn entry_header(entry: &HistoryEntry, distance: usize) -> String {
    let mut header = format!("[{distance}] {}", entry.role);
    if entry.has_siblings() {
        header.push_str(&format!(
            " ({}/{})",
            entry.sibling_position, entry.sibling_count
        ));
    }
    header
}

pub fn history(entries: &[HistoryEntry]) -> String {
    let last = entries.len().saturating_sub(1);
    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        out.push_str(&entry_header(entry, last - i));
        out.push('\n');
        if !entry.content.is_empty() {
            out.push_str(&entry.content);
            out.push('\n');
        }
        if i != last {
            out.push('\n');
        }
    }
    out
}

pub fn chat_list(chats: &[ChatSummary]) -> String {
    if chats.is_empty() {
        return "no saved chats\n".to_string();
    }
    chats
        .iter()
        .map(|chat| {
            format!(
                "{}  {}  {}\n",
                chat.id,
                chat.last_modified.format("%Y-%m-%d %H:%M"),
                chat.name
            )
        })
        .collect()
}

/// Text appended to the reply since the previous snapshot.
pub fn reply_delta<'a>(snapshot: &'a [HistoryEntry], printed: usize) -> &'a str {
    snapshot
        .last()
        .and_then(|entry| entry.content.get(printed..))
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use loom_common::Role;

    use super::*;

    fn entry(role: Role, content: &str, position: usize, count: usize) -> HistoryEntry {
        HistoryEntry {
            role,
            content: content.into(),
            sibling_position: position,
            sibling_count: count,
        }
    }

    #[test]
    fn history_numbers_turns_by_distance() {
        let text = history(&[
            entry(Role::System, "S", 1, 1),
            entry(Role::User, "Hi", 2, 2),
            entry(Role::Assistant, "Hello!", 1, 1),
        ]);
        assert_eq!(
            text,
            "[2] system\nS\n\n[1] user (2/2)\nHi\n\n[0] assistant\nHello!\n"
        );
    }

    #[test]
    fn empty_turn_has_header_only() {
        assert_eq!(history(&[entry(Role::Assistant, "", 1, 1)]), "[0] assistant\n");
    }

    #[test]
    fn list_shows_id_time_and_name() {
        let chats = vec![ChatSummary {
            id: "abc".into(),
            name: "Trip".into(),
            last_modified: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        }];
        assert_eq!(chat_list(&chats), "abc  2024-05-01 09:30  Trip\n");
        assert_eq!(chat_list(&[]), "no saved chats\n");
    }

    #[test]
    fn delta_is_new_suffix() {
        let snapshot = vec![entry(Role::Assistant, "Hello!", 1, 1)];
        assert_eq!(reply_delta(&snapshot, 3), "lo!");
        assert_eq!(reply_delta(&snapshot, 6), "");
        assert_eq!(reply_delta(&snapshot, 60), "");
    }
}
