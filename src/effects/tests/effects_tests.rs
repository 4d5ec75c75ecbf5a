use super::*;
use crate::domain::types::DocumentLocator;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

/// Notifier that fails while `down` is set and records what it delivered.
#[derive(Default)]
struct FlakyNotifier {
    down: AtomicBool,
    delivered: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

#[async_trait]
impl NotificationDispatcher for FlakyNotifier {
    async fn dispatch(
        &self,
        event_name: &str,
        _payload: &serde_json::Value,
    ) -> Result<(), CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Io("smtp unreachable".to_string()));
        }
        self.delivered
            .lock()
            .expect("lock")
            .push(event_name.to_string());
        Ok(())
    }
}

fn notify(name: &str) -> SideEffect {
    SideEffect::Notify {
        event_name: name.to_string(),
        payload: serde_json::json!({"entity_id": "f-1"}),
    }
}

fn dispatcher(dir: &TempDir, max_attempts: u32) -> (Arc<FlakyNotifier>, EffectDispatcher) {
    let notifier = Arc::new(FlakyNotifier::default());
    let dispatcher = EffectDispatcher::new(notifier.clone(), Outbox::new(dir.path(), max_attempts));
    (notifier, dispatcher)
}

#[tokio::test]
async fn test_successful_dispatch_leaves_outbox_empty() {
    let dir = TempDir::new().expect("temp dir");
    let (notifier, dispatcher) = dispatcher(&dir, 3);

    let deferred = dispatcher.dispatch(vec![notify("case_file.closed")]).await;

    assert_eq!(deferred, 0);
    assert_eq!(*notifier.delivered.lock().unwrap(), vec!["case_file.closed"]);
    assert!(dispatcher.outbox().pending().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_dispatch_is_parked_then_retried() {
    let dir = TempDir::new().expect("temp dir");
    let (notifier, dispatcher) = dispatcher(&dir, 3);
    notifier.down.store(true, Ordering::SeqCst);

    let deferred = dispatcher
        .dispatch(vec![notify("case_file.assigned_evs"), notify("case_file.closed")])
        .await;
    assert_eq!(deferred, 2);
    assert_eq!(dispatcher.outbox().pending().unwrap().len(), 2);

    let report = dispatcher.retry_outbox().await.unwrap();
    assert_eq!(
        report,
        RetryReport {
            delivered: 0,
            pending: 2,
            dead_lettered: 0
        }
    );
    assert!(dispatcher
        .outbox()
        .pending()
        .unwrap()
        .iter()
        .all(|entry| entry.attempts == 2));

    notifier.down.store(false, Ordering::SeqCst);
    let report = dispatcher.retry_outbox().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.pending, 0);
    assert!(dispatcher.outbox().pending().unwrap().is_empty());
    assert_eq!(notifier.delivered.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_exhausted_entries_move_to_dead_letters() {
    let dir = TempDir::new().expect("temp dir");
    let (notifier, dispatcher) = dispatcher(&dir, 2);
    notifier.down.store(true, Ordering::SeqCst);

    dispatcher.dispatch(vec![notify("case_file.closed")]).await;
    let report = dispatcher.retry_outbox().await.unwrap();

    assert_eq!(report.dead_lettered, 1);
    assert!(dispatcher.outbox().pending().unwrap().is_empty());
    let dead = dispatcher.outbox().dead_letters().unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 2);
    assert_eq!(dead[0].last_error, "I/O failure: smtp unreachable");
}

#[tokio::test]
async fn test_audit_effects_need_a_sink() {
    let dir = TempDir::new().expect("temp dir");
    let (_notifier, dispatcher) = dispatcher(&dir, 3);
    let record = AuditRecord::new(
        "case_file",
        "f-1",
        1,
        "CaseFileCreated",
        HashMap::new(),
        TimestampUtc::now(),
    );

    assert!(dispatcher.effects_for(&[], vec![record.clone()]).is_empty());

    let audit_path = dir.path().join("audit.jsonl");
    let dispatcher = dispatcher.with_audit_sink(Arc::new(JsonlAuditSink::new(audit_path.clone())));
    let effects = dispatcher.effects_for(&[], vec![record.clone()]);
    assert_eq!(effects.len(), 1);

    dispatcher.dispatch(effects).await;
    let line = std::fs::read_to_string(&audit_path).unwrap();
    let mirrored: AuditRecord = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(mirrored, record);
}

#[tokio::test]
async fn test_jsonl_notifier_appends_lines() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("mail/notifications.jsonl");
    let notifier = JsonlNotifier::new(path.clone());

    notifier
        .dispatch("case_file.contract_sent", &serde_json::json!({"n": 1}))
        .await
        .unwrap();
    notifier
        .dispatch("case_file.contract_signed", &serde_json::json!({"n": 2}))
        .await
        .unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let names: Vec<String> = content
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["event_name"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(names, vec!["case_file.contract_sent", "case_file.contract_signed"]);
}

#[tokio::test]
async fn test_documents_are_content_addressed() {
    let dir = TempDir::new().expect("temp dir");
    let storage = FsDocumentStorage::new(dir.path().to_path_buf());
    let metadata = DocumentMetadata {
        file_name: Some("convention.pdf".to_string()),
        ..DocumentMetadata::default()
    };

    let first = storage.store(b"signed contract", &metadata).await.unwrap();
    let second = storage.store(b"signed contract", &metadata).await.unwrap();
    let other = storage.store(b"another contract", &metadata).await.unwrap();

    assert_eq!(first, second);
    assert_ne!(first, other);
    assert!(first.as_str().starts_with("sha256:"));
    assert_eq!(storage.fetch(&first).await.unwrap(), b"signed contract");
}

#[tokio::test]
async fn test_unknown_documents_are_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let storage = FsDocumentStorage::new(dir.path().to_path_buf());

    let missing = DocumentLocator::from(format!("sha256:{}", "ab".repeat(32)));
    assert!(matches!(
        storage.fetch(&missing).await,
        Err(CollaboratorError::Missing(_))
    ));
    assert!(matches!(
        storage.fetch(&DocumentLocator::from("s3://bucket/key")).await,
        Err(CollaboratorError::Rejected(_))
    ));
    assert!(matches!(
        storage.fetch(&DocumentLocator::from("sha256:../../etc/passwd")).await,
        Err(CollaboratorError::Rejected(_))
    ));
}
