//! Message timelines, ordered by creation time and keyed by message id.

use std::collections::HashSet;

use ripple_types::ChatMessage;

use crate::{ListChange, dedup_last_wins, partition_changes, uniquely_merged};

/// Applies a batch of incremental changes to a time-ordered timeline.
///
/// Removed messages vanish; upserted messages land at their time-sorted
/// position, replacing any previous copy with the same id.
pub fn apply_changes(current: &[ChatMessage], changes: Vec<ListChange<ChatMessage>>) -> Vec<ChatMessage> {
    let (removed, mut upserts) = partition_changes(changes, |m| m.id.clone());
    sort_by_creation(&mut upserts);

    let upserted: HashSet<&str> = upserts.iter().map(|m| m.id.as_str()).collect();
    let retained: Vec<ChatMessage> = current
        .iter()
        .filter(|m| !removed.contains(&m.id) && !upserted.contains(m.id.as_str()))
        .cloned()
        .collect();

    let result = uniquely_merged(
        retained,
        upserts,
        |a, b| a.created_at < b.created_at,
        |existing, incoming| removed.contains(&existing.id) || existing.id == incoming.id,
    );
    debug_assert!(has_unique_ids(&result));
    debug_assert!(is_sorted(&result));
    result
}

/// Folds a freshly fetched page into the timeline.
pub fn merge(current: &[ChatMessage], page: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut page = dedup_last_wins(page, |m| m.id.clone());
    sort_by_creation(&mut page);

    let fetched: HashSet<&str> = page.iter().map(|m| m.id.as_str()).collect();
    let retained: Vec<ChatMessage> = current
        .iter()
        .filter(|m| !fetched.contains(m.id.as_str()))
        .cloned()
        .collect();

    let result = uniquely_merged(
        retained,
        page,
        |a, b| a.created_at < b.created_at,
        |existing, incoming| existing.id == incoming.id,
    );
    debug_assert!(has_unique_ids(&result));
    debug_assert!(is_sorted(&result));
    result
}

pub fn has_unique_ids(messages: &[ChatMessage]) -> bool {
    let mut seen = HashSet::with_capacity(messages.len());
    messages.iter().all(|m| seen.insert(m.id.as_str()))
}

pub fn is_sorted(messages: &[ChatMessage]) -> bool {
    messages.windows(2).all(|w| w[0].created_at <= w[1].created_at)
}

// Ties on created_at are broken by id so batches sort deterministically.
fn sort_by_creation(messages: &mut [ChatMessage]) {
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;
    use ripple_types::{ChannelId, MessageType};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn message(id: &str, secs: i64) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            cid: ChannelId::new("messaging", "general"),
            author_id: "u1".to_string(),
            text: format!("text of {id}"),
            message_type: MessageType::Regular,
            created_at: at(secs),
            updated_at: at(secs),
            deleted_at: None,
            parent_id: None,
            quoted_message_id: None,
            show_reply_in_channel: false,
            show_inside_thread: false,
            is_silent: false,
            is_hard_deleted: false,
            pin: None,
            own_reactions: Vec::new(),
            local_state: None,
            reply_count: 0,
            command: None,
            arguments: None,
            mentioned_user_ids: Vec::new(),
            extra_data: Default::default(),
        }
    }

    fn ids(messages: &[ChatMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn upserts_insert_at_time_position() {
        let current = vec![message("a", 1), message("c", 3)];
        let result = apply_changes(&current, vec![ListChange::Upsert(message("b", 2))]);
        assert_eq!(ids(&result), ["a", "b", "c"]);
    }

    #[test]
    fn upsert_replaces_in_place() {
        let current = vec![message("a", 1), message("b", 2), message("c", 3)];
        let mut edited = message("b", 2);
        edited.text = "edited".to_string();

        let result = apply_changes(&current, vec![ListChange::Upsert(edited)]);
        assert_eq!(ids(&result), ["a", "b", "c"]);
        assert_eq!(result[1].text, "edited");
    }

    #[test]
    fn removing_the_last_message_drops_it() {
        let current = vec![message("a", 1), message("b", 2)];
        let result = apply_changes(&current, vec![ListChange::Remove(message("b", 2))]);
        assert_eq!(ids(&result), ["a"]);
    }

    #[test]
    fn later_change_in_batch_wins() {
        let current = vec![message("a", 1)];
        let result = apply_changes(
            &current,
            vec![
                ListChange::Upsert(message("b", 2)),
                ListChange::Remove(message("b", 2)),
                ListChange::Remove(message("a", 1)),
                ListChange::Upsert(message("a", 5)),
            ],
        );
        assert_eq!(ids(&result), ["a"]);
        assert_eq!(result[0].created_at, at(5));
    }

    #[test]
    fn reupserted_message_survives_later_inserts() {
        let result = apply_changes(
            &[],
            vec![
                ListChange::Remove(message("a", 1)),
                ListChange::Upsert(message("a", 1)),
                ListChange::Upsert(message("x", 2)),
            ],
        );
        assert_eq!(ids(&result), ["a", "x"]);
    }

    #[test]
    fn merge_page_deduplicates_against_timeline() {
        let current = vec![message("c", 3), message("d", 4)];
        let page = vec![message("d", 4), message("a", 1), message("b", 2)];
        let result = merge(&current, page);
        assert_eq!(ids(&result), ["a", "b", "c", "d"]);
    }

    fn change_strategy() -> impl Strategy<Value = ListChange<ChatMessage>> {
        (0u8..12, 0i64..30, any::<bool>()).prop_map(|(id, secs, remove)| {
            let m = message(&format!("m{id}"), secs);
            if remove {
                ListChange::Remove(m)
            } else {
                ListChange::Upsert(m)
            }
        })
    }

    proptest! {
        #[test]
        fn applying_changes_keeps_invariants_and_is_idempotent(
            seed in proptest::collection::vec(change_strategy(), 0..20),
            batch in proptest::collection::vec(change_strategy(), 0..20),
        ) {
            let current = apply_changes(&[], seed);
            let once = apply_changes(&current, batch.clone());
            let twice = apply_changes(&once, batch);

            prop_assert!(has_unique_ids(&once));
            prop_assert!(is_sorted(&once));
            prop_assert_eq!(ids(&once), ids(&twice));
        }

        #[test]
        fn applying_changes_matches_a_keyed_fold(
            seed in proptest::collection::vec(change_strategy(), 0..20),
            batch in proptest::collection::vec(change_strategy(), 0..20),
        ) {
            let current = apply_changes(&[], seed);

            let mut expected: BTreeMap<String, DateTime<Utc>> =
                current.iter().map(|m| (m.id.clone(), m.created_at)).collect();
            for change in &batch {
                let m = change.item();
                if change.is_remove() {
                    expected.remove(&m.id);
                } else {
                    expected.insert(m.id.clone(), m.created_at);
                }
            }

            let result = apply_changes(&current, batch);
            let actual: BTreeMap<String, DateTime<Utc>> =
                result.iter().map(|m| (m.id.clone(), m.created_at)).collect();
            prop_assert_eq!(result.len(), actual.len());
            prop_assert_eq!(actual, expected);
            prop_assert!(is_sorted(&result));
        }
    }
}
