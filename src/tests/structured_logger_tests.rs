use super::*;
use crate::domain::permissions::Role;
use crate::domain::{CaseFileCommand, LifecycleState};
use tempfile::TempDir;

fn create_test_logger() -> (StructuredLogger, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let logger =
        StructuredLogger::new("test-invocation", temp_dir.path()).expect("Failed to create logger");
    (logger, temp_dir)
}

fn read_entries(temp_dir: &TempDir) -> Vec<LogEntry> {
    std::fs::read_to_string(temp_dir.path().join("events.jsonl"))
        .expect("Failed to read log file")
        .lines()
        .map(|line| serde_json::from_str(line).expect("Failed to parse log entry"))
        .collect()
}

#[test]
fn test_log_entries_are_valid_json() {
    let (logger, temp_dir) = create_test_logger();

    logger.log("TestComponent", serde_json::json!({"key": "value1"}));
    logger.log("TestComponent", serde_json::json!({"key": "value2"}));

    for entry in read_entries(&temp_dir) {
        assert_eq!(entry.invocation_id, "test-invocation");
        assert_eq!(entry.component, "TestComponent");
    }
}

#[test]
fn test_sequence_numbers_monotonic() {
    let (logger, temp_dir) = create_test_logger();

    for i in 0..10 {
        logger.log("Test", serde_json::json!({"iteration": i}));
    }

    let mut prev_seq = 0u64;
    for entry in read_entries(&temp_dir) {
        assert!(
            entry.seq > prev_seq,
            "Sequence numbers should be monotonically increasing"
        );
        prev_seq = entry.seq;
    }
}

#[test]
fn test_concurrent_logging() {
    use std::sync::Arc;
    use std::thread;

    let (logger, temp_dir) = create_test_logger();
    let logger = Arc::new(logger);

    let handles: Vec<_> = (0..5)
        .map(|t| {
            let logger_clone = Arc::clone(&logger);
            thread::spawn(move || {
                for i in 0..20 {
                    logger_clone.log("Thread", serde_json::json!({"thread": t, "iteration": i}));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_eq!(read_entries(&temp_dir).len(), 100);
}

#[test]
fn test_timestamp_format() {
    let (logger, temp_dir) = create_test_logger();

    logger.log("Test", serde_json::json!({"msg": "test"}));

    let entry = read_entries(&temp_dir).remove(0);
    // YYYY-MM-DDTHH:MM:SS.ffffffZ
    assert!(entry.ts.contains('T'));
    assert!(entry.ts.ends_with('Z'));
    let micros_part = entry.ts.split('.').nth(1).unwrap();
    assert_eq!(micros_part.len(), 7);
}

#[test]
fn test_command_and_commit_logging() {
    let (logger, temp_dir) = create_test_logger();
    let actor = Actor::new("issuer-1", Role::Issuer);
    let command = CaseFileCommand::RequestTransition {
        actor: actor.clone(),
        to: LifecycleState::SubmittedToFeves,
    };

    logger.log_command("case_file", "file-1", &actor, &command);
    logger.log_committed("case_file", "file-1", 2, &vec!["StateChanged"]);
    logger.log_rejected(
        "case_file",
        "file-1",
        &CoreError::forbidden("role issuer lacks capability assign"),
    );
    logger.log_effects_deferred("file-1", 1);

    let entries = read_entries(&temp_dir);
    assert_eq!(entries.len(), 4);

    assert_eq!(entries[0].component, "case_file");
    assert_eq!(entries[0].event["type"], "Command");
    assert_eq!(entries[0].event["actor_role"], "issuer");
    assert_eq!(
        entries[0].event["command"]["request_transition"]["to"],
        "SUBMITTED_TO_FEVES"
    );

    assert_eq!(entries[1].event["type"], "Committed");
    assert_eq!(entries[1].event["version"], 2);

    assert_eq!(entries[2].event["type"], "Rejected");
    assert_eq!(entries[2].event["kind"], "forbidden");

    assert_eq!(entries[3].component, "Effects");
    assert_eq!(entries[3].event["count"], 1);
}
