//! Remediation pipeline runs against a real store and fake collaborators.

mod common;

use common::*;
use repairnet_db::{LinkClass, Stage};
use repairnet_sentinel::collaborators::InterfaceAction;
use repairnet_sentinel::config::PipelineConfig;
use repairnet_sentinel::{Chain, HaltReason, Pipeline, PipelineRegistry, RunOutcome};

fn config(allow_shutdown: bool) -> PipelineConfig {
    PipelineConfig {
        allow_shutdown,
        ..PipelineConfig::default()
    }
}

fn pipeline(db: &repairnet_db::IncidentDb, fakes: &Fakes, config: PipelineConfig) -> Pipeline {
    Pipeline::new(db.clone(), PipelineRegistry::standard(), fakes.targets(), config, None)
}

#[tokio::test]
async fn test_permitted_run_shuts_down_and_escalates() {
    let (_tmp, db) = open_db().await;
    let fakes = Fakes::new(RecordingActuator::new(ActuatorMode::Succeed));
    let incident = seed_incident(&db, "switchA", "eth0", "peerB", "P", "edge", "").await;

    let outcome = pipeline(&db, &fakes, config(true)).run_incident(incident.id).await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Completed {
            ticket_id: Some(format!("NET-{}", incident.id)),
            shut_down: true,
        }
    );

    assert_eq!(
        fakes.actuator.calls(),
        vec![("switchA".to_string(), "eth0".to_string(), InterfaceAction::Down)]
    );
    assert_eq!(fakes.notifier.messages.lock().unwrap().len(), 1);

    let stored = db.get_incident(incident.id).await.unwrap().unwrap();
    assert_eq!(stored.stage, Stage::JiraCreate);
    assert_eq!(stored.classname, LinkClass::PeerUplink);
    assert!(stored.permit);
    assert!(!stored.running);
    assert_eq!(stored.ticket_id.as_deref(), Some(format!("NET-{}", incident.id).as_str()));
}

#[tokio::test]
async fn test_shutdown_without_permit_advances_without_actuator() {
    let (_tmp, db) = open_db().await;
    let fakes = Fakes::new(RecordingActuator::new(ActuatorMode::Succeed));
    let incident = seed_incident(&db, "switchA", "eth0", "peerB", "P", "edge", "").await;

    // Chain that stops at the mitigation stage so its bookkeeping is observable
    let mut registry = PipelineRegistry::standard();
    registry.register(Chain::new(
        LinkClass::PeerUplink,
        vec![Stage::ExistenceCheck, Stage::BandwidthCheck, Stage::PortShutdown],
    ));
    let pipeline = Pipeline::new(db.clone(), registry, fakes.targets(), config(false), None);

    let outcome = pipeline.run_incident(incident.id).await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Completed {
            ticket_id: None,
            shut_down: false,
        }
    );
    assert!(fakes.actuator.calls().is_empty());
    assert!(fakes.notifier.messages.lock().unwrap().is_empty());

    let stored = db.get_incident(incident.id).await.unwrap().unwrap();
    assert_eq!(stored.stage, Stage::PortShutdown);
    assert!(!stored.permit);
}

#[tokio::test]
async fn test_actuator_failure_halts_without_advancing() {
    let (_tmp, db) = open_db().await;
    let fakes = Fakes::new(RecordingActuator::new(ActuatorMode::Reject));
    let incident = seed_incident(&db, "core1", "et-0/0/1", "agg1", "I", "core", "aggregate").await;

    let outcome = pipeline(&db, &fakes, config(true)).run_incident(incident.id).await.unwrap();
    match outcome {
        RunOutcome::Halted { at, reason, shut_down } => {
            assert_eq!(at, Stage::BandwidthCheck);
            assert!(matches!(reason, HaltReason::ActuatorFailed(_)));
            assert!(!shut_down);
        }
        other => panic!("expected halt, got {:?}", other),
    }

    let stored = db.get_incident(incident.id).await.unwrap().unwrap();
    assert_eq!(stored.stage, Stage::BandwidthCheck);
    assert_eq!(stored.classname, LinkClass::CoreAggregateBorder);
    assert!(stored.running);
    assert!(fakes.tickets.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_ticket_failure_halts_after_shutdown() {
    let (_tmp, db) = open_db().await;
    let fakes = Fakes::with(
        RecordingActuator::new(ActuatorMode::Succeed),
        RecordingTickets {
            fail: true,
            ..Default::default()
        },
        RecordingNotifier {
            fail: true,
            ..Default::default()
        },
    );
    let incident = seed_incident(&db, "switchA", "eth0", "peerB", "P", "edge", "").await;

    let outcome = pipeline(&db, &fakes, config(true)).run_incident(incident.id).await.unwrap();
    match outcome {
        RunOutcome::Halted { at, reason, shut_down } => {
            assert_eq!(at, Stage::PortShutdown);
            assert!(matches!(reason, HaltReason::TicketFailed(_)));
            assert!(shut_down);
        }
        other => panic!("expected halt, got {:?}", other),
    }
    // Notification failure was not fatal
    assert_eq!(fakes.notifier.messages.lock().unwrap().len(), 1);
    assert_eq!(fakes.actuator.calls().len(), 1);
}

#[tokio::test]
async fn test_classification_removes_incident_from_admission() {
    let (_tmp, db) = open_db().await;
    let fakes = Fakes::new(RecordingActuator::new(ActuatorMode::Succeed));
    let incident = seed_incident(&db, "leaf1", "xe-0/0/1", "leaf2", "I", "leaf", "leaf").await;
    assert_eq!(db.select_pending().await.unwrap().len(), 1);

    let pipeline = pipeline(&db, &fakes, config(true));
    assert_eq!(pipeline.run_incident(incident.id).await.unwrap(), RunOutcome::Unclassified);

    let stored = db.get_incident(incident.id).await.unwrap().unwrap();
    assert_eq!(stored.stage, Stage::Classification);
    assert!(stored.running);
    assert!(db.select_pending().await.unwrap().is_empty());

    // A second run in the same pass is refused
    assert_eq!(pipeline.run_incident(incident.id).await.unwrap(), RunOutcome::NotPending);
}

#[tokio::test]
async fn test_concurrent_runs_on_one_incident() {
    let (_tmp, db) = open_db().await;
    let fakes = Fakes::new(RecordingActuator::new(ActuatorMode::Succeed));
    let incident = seed_incident(&db, "switchA", "eth0", "peerB", "P", "edge", "").await;

    let first = pipeline(&db, &fakes, config(true));
    let second = pipeline(&db, &fakes, config(true));
    let (a, b) = tokio::join!(first.run_incident(incident.id), second.run_incident(incident.id));
    let outcomes = [a.unwrap(), b.unwrap()];

    let contended = outcomes.iter().filter(|o| **o == RunOutcome::Contended).count();
    let completed = outcomes
        .iter()
        .filter(|o| matches!(o, RunOutcome::Completed { .. }))
        .count();
    assert_eq!((contended, completed), (1, 1));
    assert_eq!(fakes.actuator.calls().len(), 1);
    assert_eq!(fakes.tickets.created.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reverse_direction_is_suppressed() {
    let (_tmp, db) = open_db().await;
    let fakes = Fakes::new(RecordingActuator::new(ActuatorMode::Succeed));
    let forward = seed_incident(&db, "core1", "et-0/0/1", "agg1", "I", "core", "aggregate").await;
    let reverse = seed_incident(&db, "agg1", "et-0/0/9", "core1", "I", "aggregate", "core").await;

    let pipeline = pipeline(&db, &fakes, config(true));
    assert!(matches!(
        pipeline.run_incident(forward.id).await.unwrap(),
        RunOutcome::Completed { .. }
    ));

    match pipeline.run_incident(reverse.id).await.unwrap() {
        RunOutcome::Halted { at, reason, .. } => {
            assert_eq!(at, Stage::Classification);
            assert_eq!(reason, HaltReason::ReverseLinkOpen { incident_id: forward.id });
        }
        other => panic!("expected halt, got {:?}", other),
    }
    assert_eq!(fakes.actuator.calls().len(), 1);
}

#[tokio::test]
async fn test_shutdown_budget_per_host() {
    let (_tmp, db) = open_db().await;
    let fakes = Fakes::new(RecordingActuator::new(ActuatorMode::Succeed));
    let first = seed_incident(&db, "switchA", "eth0", "peerB", "P", "edge", "").await;
    let second = seed_incident(&db, "switchA", "eth1", "peerC", "P", "edge", "").await;

    let pipeline = pipeline(&db, &fakes, config(true));
    assert!(matches!(
        pipeline.run_incident(first.id).await.unwrap(),
        RunOutcome::Completed { shut_down: true, .. }
    ));

    match pipeline.run_incident(second.id).await.unwrap() {
        RunOutcome::Halted { at, reason, .. } => {
            assert_eq!(at, Stage::ExistenceCheck);
            assert_eq!(reason, HaltReason::ShutdownBudgetExhausted { shutdowns: 1 });
        }
        other => panic!("expected halt, got {:?}", other),
    }
}

#[tokio::test]
async fn test_run_on_busy_link_is_contended_and_stays_pending() {
    let (_tmp, db) = open_db().await;
    let fakes = Fakes::new(RecordingActuator::new(ActuatorMode::Succeed));
    let forward = seed_incident(&db, "core1", "et-0/0/1", "agg1", "I", "core", "aggregate").await;
    let reverse = seed_incident(&db, "agg1", "et-0/0/9", "core1", "I", "aggregate", "core").await;

    let pipeline = pipeline(&db, &fakes, config(true));
    {
        // A live run on the forward direction owns the link
        let _scope = db.try_lock_scope(&forward).unwrap();
        assert_eq!(pipeline.run_incident(reverse.id).await.unwrap(), RunOutcome::Contended);
    }

    let stored = db.get_incident(reverse.id).await.unwrap().unwrap();
    assert_eq!(stored.stage, Stage::Initial);
    assert!(!stored.running);
    assert!(fakes.actuator.calls().is_empty());
    assert!(db.select_pending().await.unwrap().iter().any(|i| i.id == reverse.id));

    // Once released, the reverse direction runs normally
    assert!(matches!(
        pipeline.run_incident(reverse.id).await.unwrap(),
        RunOutcome::Completed { .. }
    ));
}
