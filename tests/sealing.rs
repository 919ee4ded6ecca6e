//! Sealing Pipeline Integration Tests
//!
//! Drives the orchestrator end to end against deterministic fakes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use common::*;
use witness::adapters::AnchorError;
use witness::core::{
    fingerprint, EventStore, FileRecordStore, Limits, MemoryRecordStore, Orchestrator, RecordStore,
};
use witness::domain::{EventType, IncidentCategory, RecordId, SealStage, Step};
use witness::{ErrorKind, SealError};

const ABC_SHA256: &str = "b5d4045c3f466fa91fe2cc6abe79232a1a57cdf104f7a26e716e0a1e2789df78";

#[tokio::test]
async fn test_submit_seals_abc() {
    let (orchestrator, ledger, _store) = memory_orchestrator();

    let record = orchestrator.submit(b"ABC").await.unwrap();

    assert_eq!(record.fingerprint.to_hex(), ABC_SHA256);
    assert!(!record.anchor_reference.is_empty());
    assert!(record.is_sealed());
    assert_eq!(record.stages(), vec![SealStage::Ingested, SealStage::Anchored]);
    assert_eq!(ledger.writes(), 1);

    let fetched = orchestrator.fetch(record.id).await.unwrap();
    assert_eq!(fetched, record);
}

#[tokio::test]
async fn test_anchor_failure_creates_no_record() {
    for error in [
        AnchorError::Unavailable("connection reset".to_string()),
        AnchorError::Rejected("insufficient funds".to_string()),
    ] {
        let (orchestrator, store) = with_ledger(Arc::new(FailingLedger(error)));

        let err = orchestrator.submit(b"ABC").await.unwrap_err();
        assert_eq!(err.step(), Step::Anchor);
        assert_eq!(err.record_id(), None);
        assert!(store.is_empty().await);
    }
}

#[tokio::test]
async fn test_anchor_error_kinds_are_distinguishable() {
    let (orchestrator, _) = with_ledger(Arc::new(FailingLedger(AnchorError::Unavailable("down".into()))));
    assert_eq!(orchestrator.submit(b"x").await.unwrap_err().kind(), ErrorKind::Transport);

    let (orchestrator, _) = with_ledger(Arc::new(FailingLedger(AnchorError::Rejected("no".into()))));
    assert_eq!(orchestrator.submit(b"x").await.unwrap_err().kind(), ErrorKind::Rejected);

    let (orchestrator, _) = with_ledger(Arc::new(FailingLedger(AnchorError::ConfirmationTimeout {
        reference: Some("tx-pending".into()),
        waited: Duration::from_secs(3),
    })));
    match orchestrator.submit(b"x").await.unwrap_err() {
        SealError::ConfirmationTimeout { reference, .. } => {
            assert_eq!(reference.as_deref(), Some("tx-pending"))
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_anchor_times_out() {
    let (orchestrator, store) = with_ledger(Arc::new(HangingLedger));
    let orchestrator = orchestrator.with_limits(Limits {
        anchor_timeout_seconds: 5,
        ..Limits::default()
    });

    let err = orchestrator.submit(b"ABC").await.unwrap_err();

    match err {
        SealError::ConfirmationTimeout { reference, waited } => {
            assert_eq!(reference, None);
            assert!(waited >= Duration::from_secs(5));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(store.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_client_timeout_keeps_reference() {
    let (orchestrator, store) = with_ledger(Arc::new(SlowTimeoutLedger {
        reference: "r1".to_string(),
        after: Duration::from_secs(5),
    }));
    let orchestrator = orchestrator.with_limits(Limits {
        anchor_timeout_seconds: 5,
        ..Limits::default()
    });

    match orchestrator.submit(b"ABC").await.unwrap_err() {
        SealError::ConfirmationTimeout { reference, .. } => {
            assert_eq!(reference.as_deref(), Some("r1"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_blank_reference_is_malformed() {
    let (orchestrator, store) = with_ledger(Arc::new(BlankLedger));

    let err = orchestrator.submit(b"ABC").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_empty_artifact_is_validation_error() {
    let (orchestrator, ledger, store) = memory_orchestrator();

    let err = orchestrator.submit(b"").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(ledger.writes(), 0);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_oversize_artifact_never_reaches_ledger() {
    let (orchestrator, ledger, _store) = memory_orchestrator();
    let orchestrator = orchestrator.with_limits(Limits {
        max_artifact_bytes: 4,
        ..Limits::default()
    });

    let err = orchestrator.submit(b"too large").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(ledger.writes(), 0);
}

#[tokio::test]
async fn test_narration_keeps_seal() {
    let (orchestrator, _ledger, _store) = memory_orchestrator();
    let sealed = orchestrator.submit(b"ABC").await.unwrap();

    orchestrator.attach_narration(sealed.id, "hello").await.unwrap();

    let record = orchestrator.fetch(sealed.id).await.unwrap();
    assert!(!record.narration_audio.as_deref().unwrap_or_default().is_empty());
    assert_eq!(record.statement_text.as_deref(), Some("hello"));
    assert!(record.narrated_at.is_some());
    assert_eq!(record.fingerprint, sealed.fingerprint);
    assert_eq!(record.anchor_reference, sealed.anchor_reference);
    assert_eq!(record.sealed_at, sealed.sealed_at);
}

#[tokio::test]
async fn test_second_narration_wins() {
    let (orchestrator, _ledger, _store) = memory_orchestrator();
    let id = orchestrator.submit(b"ABC").await.unwrap().id;

    orchestrator.attach_narration(id, "first").await.unwrap();
    orchestrator.attach_narration(id, "second").await.unwrap();

    let record = orchestrator.fetch(id).await.unwrap();
    assert_eq!(record.statement_text.as_deref(), Some("second"));
    assert_eq!(record.narration_audio.as_deref(), Some(&b"AUDIO:second"[..]));
}

#[tokio::test]
async fn test_narration_failure_leaves_record_untouched() {
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = Orchestrator::new(
        Arc::new(CountingLedger::default()),
        Arc::new(DownNarrator),
        Arc::new(ScriptedAnalyst::valid()),
        store.clone(),
    );
    let sealed = orchestrator.submit(b"ABC").await.unwrap();

    let err = orchestrator.attach_narration(sealed.id, "hello").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.step(), Step::Narrate);
    assert_eq!(err.record_id(), Some(sealed.id));

    assert_eq!(orchestrator.fetch(sealed.id).await.unwrap(), sealed);
}

#[tokio::test]
async fn test_blank_statement_rejected_before_service() {
    let (orchestrator, _ledger, _store) = memory_orchestrator();
    let id = orchestrator.submit(b"ABC").await.unwrap().id;

    let err = orchestrator.attach_narration(id, "   ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.record_id(), Some(id));
}

#[tokio::test]
async fn test_analysis_stored() {
    let (orchestrator, _ledger, _store) = memory_orchestrator();
    let id = orchestrator.submit(b"ABC").await.unwrap().id;

    let record = orchestrator
        .attach_analysis(id, "The landlord changed the locks")
        .await
        .unwrap();

    let analysis = record.analysis.unwrap();
    assert_eq!(analysis.category, IncidentCategory::Housing);
    assert_eq!(analysis.urgency_score, 4);
    assert_eq!(analysis.entities, vec!["landlord", "Unit 4B"]);
    // Analysis does not write the statement
    assert_eq!(record.statement_text, None);
}

#[tokio::test]
async fn test_malformed_analysis_not_persisted() {
    for raw in [
        "Sure! This looks like a housing matter.",
        r#"{"incidentType": "housing", "urgency": 9, "extractedEntities": [], "formalReport": "x"}"#,
        r#"{"incidentType": "aliens", "urgency": 2, "extractedEntities": [], "formalReport": "x"}"#,
        r#"{"incidentType": "police", "urgency": 3, "formalReport": "Report"}"#,
    ] {
        let store = Arc::new(MemoryRecordStore::new());
        let orchestrator = Orchestrator::new(
            Arc::new(CountingLedger::default()),
            Arc::new(EchoNarrator),
            Arc::new(ScriptedAnalyst(raw.to_string())),
            store.clone(),
        );
        let id = orchestrator.submit(b"ABC").await.unwrap().id;

        let err = orchestrator.attach_analysis(id, "statement").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert_eq!(err.step(), Step::Analyze);

        let record = orchestrator.fetch(id).await.unwrap();
        assert!(record.analysis.is_none());
        assert!(record.analyzed_at.is_none());
    }
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let (orchestrator, _ledger, _store) = memory_orchestrator();
    let unknown = RecordId::generate();

    for err in [
        orchestrator.fetch(unknown).await.unwrap_err(),
        orchestrator.attach_narration(unknown, "hello").await.unwrap_err(),
        orchestrator.attach_analysis(unknown, "hello").await.unwrap_err(),
    ] {
        assert_eq!(err.kind(), ErrorKind::RecordNotFound);
        assert_eq!(err.record_id(), Some(unknown));
    }
}

#[tokio::test]
async fn test_duplicate_submissions_are_distinct_records() {
    let (orchestrator, ledger, store) = memory_orchestrator();

    let (a, b) = tokio::join!(orchestrator.submit(b"ABC"), orchestrator.submit(b"ABC"));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.fingerprint, b.fingerprint);
    assert_ne!(a.id, b.id);
    assert_ne!(a.anchor_reference, b.anchor_reference);
    assert_eq!(ledger.writes(), 2);
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn test_concurrent_enrichment_on_file_store() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FileRecordStore::open(temp.path().join("records")).await.unwrap());
    let orchestrator = Orchestrator::new(
        Arc::new(CountingLedger::default()),
        Arc::new(EchoNarrator),
        Arc::new(ScriptedAnalyst::valid()),
        store.clone(),
    );
    let id = orchestrator.submit(b"ABC").await.unwrap().id;

    let (narrated, analyzed) = tokio::join!(
        orchestrator.attach_narration(id, "hello"),
        orchestrator.attach_analysis(id, "hello"),
    );
    narrated.unwrap();
    analyzed.unwrap();

    let record = store.get(id).await.unwrap().unwrap();
    assert!(record.narration_audio.is_some());
    assert!(record.analysis.is_some());
    assert_eq!(
        record.stages(),
        vec![
            SealStage::Ingested,
            SealStage::Anchored,
            SealStage::Narrated,
            SealStage::Analyzed
        ]
    );
}

#[tokio::test]
async fn test_steps_are_journaled() {
    let temp = TempDir::new().unwrap();
    let events = EventStore::open(temp.path().join("events.jsonl")).await.unwrap();
    let (orchestrator, _ledger, _store) = memory_orchestrator();
    let orchestrator = orchestrator.with_event_store(events.clone());

    let id = orchestrator.submit(b"ABC").await.unwrap().id;
    orchestrator.attach_narration(id, "hello").await.unwrap();

    let all = events.replay().await.unwrap();
    let types: Vec<EventType> = all.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![
            EventType::StepStarted,
            EventType::StepCompleted,
            EventType::RecordSealed,
            EventType::StepStarted,
            EventType::StepCompleted,
        ]
    );

    // Statement text never reaches the audit log
    let raw = std::fs::read_to_string(events.events_path()).unwrap();
    assert!(!raw.contains("hello"));

    let for_record = events.events_for(id).await.unwrap();
    assert_eq!(for_record.len(), 3);
}

#[tokio::test]
async fn test_failed_anchor_is_journaled() {
    let temp = TempDir::new().unwrap();
    let events = EventStore::open(temp.path().join("events.jsonl")).await.unwrap();
    let (orchestrator, _store) =
        with_ledger(Arc::new(FailingLedger(AnchorError::Rejected("bad".into()))));
    let orchestrator = orchestrator.with_event_store(events.clone());

    orchestrator.submit(b"ABC").await.unwrap_err();

    let failed = events
        .last_event_of_type(EventType::StepFailed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.step, Some(Step::Anchor));
    assert!(failed.error.is_some());
    assert!(failed.record_id.is_none());
    assert_eq!(fingerprint(b"ABC").unwrap().to_hex(), ABC_SHA256);
}
