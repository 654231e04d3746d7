//! Subscriber notification and queued re-entrant dispatch.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{json, Value};

use wfst_edit::clock::{ManualClock, Timeline};
use wfst_edit::store::{Action, EditStore};
use wfst_edit::types::Properties;
use wfst_edit::FeatureId;

fn store() -> Arc<EditStore> {
    let timeline = Arc::new(Timeline::new(Arc::new(ManualClock::new(1_000))));
    Arc::new(EditStore::new(timeline))
}

fn new_draft() -> Action {
    Action::CreateDraft {
        properties: Properties::new(),
        geometry: None,
    }
}

#[test]
fn subscribers_hear_only_state_changes() {
    let store = store();
    let seen = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&seen);
    let unsubscribe = store.subscribe(move |_| *counter.lock() += 1);

    store.dispatch(new_draft());
    store.dispatch(Action::Undo);
    store.dispatch(Action::DiscardDrafts {
        ids: vec![FeatureId::Draft(-1)],
    });
    assert_eq!(*seen.lock(), 2);

    unsubscribe();
    store.dispatch(new_draft());
    assert_eq!(*seen.lock(), 2);
}

#[test]
fn dispatch_from_a_subscriber_runs_after_the_current_round() {
    let store = store();
    let observed: Arc<Mutex<Vec<(usize, Value)>>> = Arc::default();
    let inner_results: Arc<Mutex<Vec<bool>>> = Arc::default();

    let weak: Weak<EditStore> = Arc::downgrade(&store);
    let log = Arc::clone(&observed);
    let results = Arc::clone(&inner_results);
    let _unsubscribe = store.subscribe(move |snapshot| {
        let draft = FeatureId::Draft(-1);
        let name = snapshot
            .effective_value(&draft, "name")
            .unwrap_or(Value::Null);
        log.lock().push((snapshot.pending_adds.len(), name.clone()));
        if name.is_null() {
            if let Some(store) = weak.upgrade() {
                results.lock().push(store.dispatch(Action::Edit {
                    id: draft,
                    key: "name".to_string(),
                    value: json!("auto"),
                }));
            }
        }
    });

    assert!(store.dispatch(new_draft()));
    assert_eq!(
        *observed.lock(),
        vec![(1, Value::Null), (1, json!("auto"))]
    );
    assert_eq!(*inner_results.lock(), vec![false]);
    assert_eq!(store.version(), 2);
}

#[test]
fn snapshots_do_not_change_after_later_dispatches() {
    let store = store();
    let before = store.get_snapshot();
    store.dispatch(new_draft());
    assert!(before.pending_adds.is_empty());
    assert_eq!(store.get_snapshot().pending_adds.len(), 1);
}

#[test]
fn a_panicking_subscriber_does_not_stall_later_dispatches() {
    let store = store();
    let armed = Arc::new(AtomicBool::new(true));
    let trigger = Arc::clone(&armed);
    let _unsubscribe = store.subscribe(move |_| {
        if trigger.swap(false, Ordering::SeqCst) {
            panic!("listener failure");
        }
    });

    let first = panic::catch_unwind(AssertUnwindSafe(|| store.dispatch(new_draft())));
    assert!(first.is_err());
    assert_eq!(store.get_snapshot().pending_adds.len(), 1);

    assert!(store.dispatch(new_draft()));
    assert_eq!(store.get_snapshot().pending_adds.len(), 2);
    assert!(!armed.load(Ordering::SeqCst));
}
