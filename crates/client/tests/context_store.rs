mod common;

use common::{doc, services, services_on, session, MockProvider};
use docbridge_client::{BridgeEvent, ManualClock, StorageTiers};
use docbridge_shared::{BridgeError, DocumentContextEntry, DocumentRef};
use pretty_assertions::assert_eq;

fn with_text(id: &str) -> DocumentRef {
    doc(id).with_content(format!("contents of {id}"))
}

#[tokio::test]
async fn context_survives_a_restart() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    let tiers = StorageTiers::in_memory();

    let before = session(&provider, services_on(tiers.clone(), &clock));
    before.add_document_to_context("conv1", with_text("doc1")).await.unwrap();
    drop(before);

    let after = session(&provider, services_on(tiers.restarted(), &clock));

    assert_eq!(after.get_documents_in_context("conv1"), vec![with_text("doc1")]);
}

#[tokio::test]
async fn adding_twice_keeps_one_entry() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    let session = session(&provider, services(&clock));

    let first = session.add_document_to_context("conv1", with_text("doc1")).await.unwrap();
    let second = session.add_document_to_context("conv1", with_text("doc1")).await.unwrap();

    assert!(first.changed);
    assert!(!second.changed);
    assert_eq!(session.get_documents_in_context("conv1"), vec![with_text("doc1")]);
}

#[tokio::test]
async fn content_is_fetched_before_adding() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    provider.set_content("doc1", "meeting notes");
    let session = session(&provider, services(&clock));
    session.connect("client", "key").await.unwrap();

    let update = session.add_document_to_context("conv1", doc("doc1")).await.unwrap();
    assert_eq!(update.documents, vec![doc("doc1").with_content("meeting notes")]);

    // Already attached: no second fetch.
    let again = session.add_document_to_context("conv1", doc("doc1")).await.unwrap();
    assert!(!again.changed);
    assert_eq!(provider.fetches(), 1);
}

#[tokio::test]
async fn fetch_failure_leaves_context_untouched() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    let session = session(&provider, services(&clock));

    let err = session.add_document_to_context("conv1", doc("doc1")).await.unwrap_err();

    assert_eq!(err, BridgeError::NotConnected);
    assert!(session.get_documents_in_context("conv1").is_empty());
}

#[tokio::test]
async fn remove_reports_whether_anything_changed() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    let session = session(&provider, services(&clock));
    session.add_document_to_context("conv1", with_text("doc1")).await.unwrap();

    assert!(!session.remove_document_from_context("conv1", "nope").unwrap());
    assert!(session.remove_document_from_context("conv1", "doc1").unwrap());
    assert!(!session.remove_document_from_context("conv1", "doc1").unwrap());
    assert!(session.get_documents_in_context("conv1").is_empty());
}

#[tokio::test]
async fn remove_after_restart_clears_the_backup() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    let tiers = StorageTiers::in_memory();
    let before = session(&provider, services_on(tiers.clone(), &clock));
    before.add_document_to_context("conv1", with_text("doc1")).await.unwrap();
    before.add_document_to_context("conv1", with_text("doc2")).await.unwrap();

    let after = session(&provider, services_on(tiers.restarted(), &clock));

    assert!(after.remove_document_from_context("conv1", "doc1").unwrap());
    assert_eq!(after.get_documents_in_context("conv1"), vec![with_text("doc2")]);

    let again = session(&provider, services_on(tiers.restarted(), &clock));
    assert_eq!(again.get_documents_in_context("conv1"), vec![with_text("doc2")]);
}

#[tokio::test]
async fn memory_and_backup_agree_after_every_call() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    let services = services(&clock);
    let key = services.keys.context("conv1");
    let persistent = services.storage.persistent.clone();
    let session = session(&provider, services);

    let check = || {
        let durable = persistent
            .load::<DocumentContextEntry>(&key)
            .map(|entry| entry.documents)
            .unwrap_or_default();
        assert_eq!(durable, session.get_documents_in_context("conv1"));
    };

    session.add_document_to_context("conv1", with_text("doc1")).await.unwrap();
    check();
    session.add_document_to_context("conv1", with_text("doc2")).await.unwrap();
    check();
    session.add_document_to_context("conv1", with_text("doc1")).await.unwrap();
    check();
    session.remove_document_from_context("conv1", "doc1").unwrap();
    check();
    session.remove_document_from_context("conv1", "doc2").unwrap();
    check();
    assert!(!persistent.exists(&key));
}

#[tokio::test]
async fn updates_are_published() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    let session = session(&provider, services(&clock));
    let mut events = session.subscribe();

    session.add_document_to_context("conv1", with_text("doc1")).await.unwrap();
    session.add_document_to_context("conv1", with_text("doc1")).await.unwrap();
    session.clear_context("conv1").unwrap();

    let mut updates = Vec::new();
    while let Ok(BridgeEvent::DocumentContextUpdated { documents, .. }) = events.try_recv() {
        updates.push(documents.len());
    }
    assert_eq!(updates, vec![1, 0]);
}
