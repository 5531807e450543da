use remedy_phase::pipeline::{allowed_transitions, is_valid_transition, validate_transition};
use remedy_phase::{InvestigationPhase, Pipeline, RegenerationPhase};
use proptest::prelude::*;

#[test]
fn test_investigation_transitions() {
    use InvestigationPhase::*;
    assert!(validate_transition(Idle, Observing).is_ok());
    assert!(validate_transition(Deciding, Completed).is_ok());
    assert!(validate_transition(Remediating, Deciding).is_ok());

    // Invalid
    assert!(validate_transition(Idle, Analyzing).is_err());
    assert!(validate_transition(Observing, Remediating).is_err());
    assert!(validate_transition(Remediating, Completed).is_err());
}

#[test]
fn test_regeneration_transitions() {
    use RegenerationPhase::*;
    assert!(validate_transition(Idle, AnalyzingRequirements).is_ok());
    assert!(validate_transition(Deploying, Building).is_ok());
    assert!(validate_transition(Verifying, Completed).is_ok());

    // Invalid
    assert!(validate_transition(Testing, Deploying).is_err());
    assert!(validate_transition(Idle, Failed).is_err());
}

#[test]
fn test_terminal_phases_are_dead_ends() {
    for phase in [InvestigationPhase::Completed, InvestigationPhase::Failed] {
        assert!(allowed_transitions(phase).is_empty());
    }
    for phase in [RegenerationPhase::Completed, RegenerationPhase::Failed] {
        assert!(allowed_transitions(phase).is_empty());
    }
}

#[test]
fn test_phase_names_round_trip() {
    for phase in InvestigationPhase::all() {
        assert_eq!(InvestigationPhase::from_name(phase.as_str()), Some(*phase));
    }
    assert_eq!(
        RegenerationPhase::from_name("generating_code"),
        Some(RegenerationPhase::GeneratingCode)
    );
    assert_eq!(RegenerationPhase::from_name("compiling"), None);
}

fn investigation_phase() -> impl Strategy<Value = InvestigationPhase> {
    prop::sample::select(InvestigationPhase::all().to_vec())
}

fn regeneration_phase() -> impl Strategy<Value = RegenerationPhase> {
    prop::sample::select(RegenerationPhase::all().to_vec())
}

proptest! {
    #[test]
    fn prop_validate_agrees_with_table(from in investigation_phase(), to in investigation_phase()) {
        let allowed = allowed_transitions(from);
        prop_assert_eq!(validate_transition(from, to).is_ok(), allowed.contains(&to));
        prop_assert_eq!(is_valid_transition(from, to), allowed.contains(&to));
    }

    #[test]
    fn prop_regeneration_validate_agrees_with_table(
        from in regeneration_phase(),
        to in regeneration_phase(),
    ) {
        prop_assert_eq!(
            validate_transition(from, to).is_ok(),
            allowed_transitions(from).contains(&to)
        );
    }

    #[test]
    fn prop_nothing_reenters_idle(from in investigation_phase()) {
        prop_assert!(!is_valid_transition(from, InvestigationPhase::Idle));
    }

    #[test]
    fn prop_every_working_phase_can_fail(from in regeneration_phase()) {
        let working = from != RegenerationPhase::Idle && !from.is_terminal();
        prop_assert_eq!(is_valid_transition(from, RegenerationPhase::Failed), working);
    }

    #[test]
    fn prop_random_walk_stays_in_table(steps in prop::collection::vec(0usize..8, 1..40)) {
        let mut phase = InvestigationPhase::Idle;
        for pick in steps {
            let allowed = allowed_transitions(phase);
            if allowed.is_empty() {
                prop_assert!(phase.is_terminal());
                break;
            }
            let next = allowed[pick % allowed.len()];
            prop_assert!(validate_transition(phase, next).is_ok());
            phase = next;
        }
    }
}
