//! FSM unit tests

use roledeploy::deploy::fsm::{OrchestratorEvent, OrchestratorFsm, OrchestratorState};
use roledeploy::errors::PluginError;

#[test]
fn test_fsm_initial_state() {
    let fsm = OrchestratorFsm::new();
    assert_eq!(fsm.state(), OrchestratorState::Idle);
    assert!(fsm.error().is_none());
    assert!(fsm.history().is_empty());
}

#[test]
fn test_fsm_build_failure_flow() {
    let mut fsm = OrchestratorFsm::new();

    fsm.process(OrchestratorEvent::Start).unwrap();
    fsm.process(OrchestratorEvent::Validated).unwrap();
    fsm.process(OrchestratorEvent::Fail("build failed to run".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), OrchestratorState::Failed);
    assert!(fsm.state().is_terminal());
    assert_eq!(fsm.error(), Some("build failed to run"));
    assert_eq!(
        fsm.history(),
        &[
            OrchestratorState::Validating,
            OrchestratorState::Building,
            OrchestratorState::Failed,
        ]
    );
}

#[test]
fn test_fsm_fail_from_every_running_state() {
    let steps = [
        OrchestratorEvent::Validated,
        OrchestratorEvent::BuildSucceeded,
        OrchestratorEvent::Finalized,
    ];

    for depth in 0..=steps.len() {
        let mut fsm = OrchestratorFsm::new();
        fsm.process(OrchestratorEvent::Start).unwrap();
        for event in steps.iter().take(depth) {
            fsm.process(event.clone()).unwrap();
        }
        let state = fsm.process(OrchestratorEvent::Fail("boom".to_string()));
        assert_eq!(state.unwrap(), OrchestratorState::Failed);
    }
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = OrchestratorFsm::new();

    // Cannot build before validating
    let result = fsm.process(OrchestratorEvent::BuildSucceeded);
    assert!(matches!(result, Err(PluginError::InvalidTransition(_))));
    assert_eq!(fsm.state(), OrchestratorState::Idle);

    // Cannot fail before starting
    assert!(fsm.process(OrchestratorEvent::Fail("early".to_string())).is_err());
    assert!(fsm.history().is_empty());
}

#[test]
fn test_fsm_done_is_terminal() {
    let mut fsm = OrchestratorFsm::new();
    for event in [
        OrchestratorEvent::Start,
        OrchestratorEvent::Validated,
        OrchestratorEvent::BuildSucceeded,
        OrchestratorEvent::Finalized,
        OrchestratorEvent::Deployed,
    ] {
        fsm.process(event).unwrap();
    }

    assert_eq!(fsm.state(), OrchestratorState::Done);
    assert!(fsm.process(OrchestratorEvent::Start).is_err());
    assert!(fsm.process(OrchestratorEvent::Fail("late".to_string())).is_err());
}
