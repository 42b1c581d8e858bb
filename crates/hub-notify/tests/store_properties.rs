//! Property tests for the notification store invariants.

use std::collections::HashSet;

use hub_core::{Notification, NotificationKind};
use hub_notify::NotificationStore;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Initialize(Vec<(u8, bool)>),
    Add(u8, bool),
    Extend(Vec<(u8, bool)>),
    MarkRead(u8),
    MarkAllRead,
    ServerCount(u8),
    Reset,
}

fn note((id, read): (u8, bool)) -> Notification {
    Notification::new(format!("n{id}"), NotificationKind::Like, "liked").with_read(read)
}

fn entry() -> impl Strategy<Value = (u8, bool)> {
    (0u8..16, any::<bool>())
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        prop::collection::vec(entry(), 0..8).prop_map(Op::Initialize),
        entry().prop_map(|(id, read)| Op::Add(id, read)),
        prop::collection::vec(entry(), 0..8).prop_map(Op::Extend),
        (0u8..16).prop_map(Op::MarkRead),
        Just(Op::MarkAllRead),
        any::<u8>().prop_map(Op::ServerCount),
        Just(Op::Reset),
    ]
}

fn apply(store: &NotificationStore, op: Op) {
    match op {
        Op::Initialize(list) => store.initialize(list.into_iter().map(note).collect()),
        Op::Add(id, read) => {
            store.add_notification(note((id, read)));
        }
        Op::Extend(list) => {
            store.extend_history(list.into_iter().map(note).collect());
        }
        Op::MarkRead(id) => {
            store.mark_as_read(&format!("n{id}"));
        }
        Op::MarkAllRead => {
            store.mark_all_read();
        }
        Op::ServerCount(count) => store.update_unread_count(usize::from(count)),
        Op::Reset => store.reset(),
    }
}

proptest! {
    #[test]
    fn ids_stay_unique(ops in prop::collection::vec(op(), 1..40)) {
        let store = NotificationStore::new();
        for op in ops {
            apply(&store, op);
            let ids: Vec<String> = store.notifications().into_iter().map(|n| n.id).collect();
            let unique: HashSet<&String> = ids.iter().collect();
            prop_assert_eq!(unique.len(), ids.len());
        }
    }

    #[test]
    fn unread_count_matches_collection_after_local_mutations(ops in prop::collection::vec(op(), 1..40)) {
        let store = NotificationStore::new();
        for op in ops {
            let server_override = matches!(op, Op::ServerCount(_));
            let before = store.unread_count();
            let duplicate_push = matches!(&op, Op::Add(id, _) if store.get(&format!("n{id}")).is_some());
            apply(&store, op);

            if duplicate_push {
                prop_assert_eq!(store.unread_count(), before);
            } else if !server_override {
                prop_assert_eq!(store.unread_count(), store.derived_unread_count());
            }
        }
    }

    #[test]
    fn read_flags_never_revert_through_marking(ids in prop::collection::vec(0u8..16, 1..16)) {
        let store = NotificationStore::new();
        store.initialize(ids.iter().map(|id| note((*id, false))).collect());
        for id in &ids {
            store.mark_as_read(&format!("n{id}"));
            let key = format!("n{id}");
            prop_assert!(store.get(&key).is_some_and(|n| n.read));
        }
        prop_assert_eq!(store.unread_count(), 0);
    }
}
