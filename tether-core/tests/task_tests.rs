// ABOUTME: Tests for the task lifecycle state machine
// ABOUTME: Verifies the transition table, absorbing terminal states, and stale-event handling

use tether_core::task::{
    Applied, IgnoreReason, PlanStep, StepStatus, StepUpdate, TaskEvent, TaskStateMachine,
    TaskStatus,
};

fn started(id: &str) -> TaskEvent {
    TaskEvent::Started {
        task_id: id.to_string(),
        description: format!("task {}", id),
        steps: vec![],
    }
}

fn plan(steps: &[&str]) -> TaskEvent {
    TaskEvent::PlanReady {
        task_id: None,
        steps: steps
            .iter()
            .map(|id| PlanStep::new(*id, format!("step {}", id)))
            .collect(),
    }
}

fn step(id: &str, status: StepStatus) -> StepUpdate {
    StepUpdate {
        task_id: None,
        step_id: id.to_string(),
        status,
    }
}

fn completed() -> TaskEvent {
    TaskEvent::Completed {
        task_id: None,
        output: None,
        reported: None,
    }
}

fn failed(error: &str) -> TaskEvent {
    TaskEvent::Failed {
        task_id: None,
        error: Some(error.to_string()),
    }
}

fn status(machine: &TaskStateMachine) -> TaskStatus {
    machine.current().expect("task present").status
}

#[test]
fn test_full_lifecycle_scenario() {
    let mut machine = TaskStateMachine::new();
    machine.apply(started("t1"));
    machine.apply(plan(&["A", "B"]));
    machine.apply_step(step("A", StepStatus::Completed));
    machine.apply_step(step("B", StepStatus::Executing));
    machine.apply(completed());

    let task = machine.current().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.step("A").unwrap().status, StepStatus::Completed);
    // Completion does not retroactively complete steps
    assert_eq!(task.step("B").unwrap().status, StepStatus::Executing);
    assert!(task.finished_at.is_some());
}

#[test]
fn test_plan_ready_moves_to_executing() {
    let mut machine = TaskStateMachine::new();
    machine.apply(started("t1"));
    let applied = machine.apply(plan(&["A"]));
    assert_eq!(
        applied,
        Applied::Transitioned {
            from: TaskStatus::Planning,
            to: TaskStatus::Executing
        }
    );
    assert_eq!(machine.current().unwrap().steps.len(), 1);
}

#[test]
fn test_failure_from_planning_and_executing() {
    let mut machine = TaskStateMachine::new();
    machine.apply(started("t1"));
    machine.apply(failed("no plan"));
    assert_eq!(status(&machine), TaskStatus::Failed);
    assert_eq!(machine.current().unwrap().error.as_deref(), Some("no plan"));

    let mut machine = TaskStateMachine::new();
    machine.apply(started("t2"));
    machine.apply(plan(&["A"]));
    machine.apply(failed("tests broke"));
    assert_eq!(status(&machine), TaskStatus::Failed);
    assert!(!machine.current().unwrap().cancelled);
}

#[test]
fn test_stop_acknowledged_cancels_any_live_state() {
    for with_plan in [false, true] {
        let mut machine = TaskStateMachine::new();
        machine.apply(started("t1"));
        if with_plan {
            machine.apply(plan(&["A"]));
        }
        machine.apply(TaskEvent::StopAcknowledged { task_id: None });

        let task = machine.current().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.cancelled);
    }
}

#[test]
fn test_completed_while_planning_is_ignored() {
    let mut machine = TaskStateMachine::new();
    machine.apply(started("t1"));
    assert_eq!(
        machine.apply(completed()),
        Applied::Ignored(IgnoreReason::InvalidTransition)
    );
    assert_eq!(status(&machine), TaskStatus::Planning);
}

#[test]
fn test_reported_completion_finishes_a_planning_task() {
    let mut machine = TaskStateMachine::new();
    machine.apply(started("t1"));
    let applied = machine.apply(TaskEvent::Completed {
        task_id: Some("t1".to_string()),
        output: Some("Task completed after 3 iterations".to_string()),
        reported: Some(TaskStatus::Completed),
    });
    assert_eq!(
        applied,
        Applied::Transitioned {
            from: TaskStatus::Planning,
            to: TaskStatus::Completed,
        }
    );

    let task = machine.current().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.output.as_deref(), Some("Task completed after 3 iterations"));
    assert!(task.finished_at.is_some());
    assert!(machine.ensure_idle().is_ok());
}

#[test]
fn test_reported_status_must_say_completed() {
    let mut machine = TaskStateMachine::new();
    machine.apply(started("t1"));
    let applied = machine.apply(TaskEvent::Completed {
        task_id: None,
        output: None,
        reported: Some(TaskStatus::Executing),
    });
    assert_eq!(applied, Applied::Ignored(IgnoreReason::InvalidTransition));
    assert_eq!(status(&machine), TaskStatus::Planning);
}

#[test]
fn test_terminal_states_absorb() {
    let events = || {
        vec![
            started("t1"),
            plan(&["A"]),
            completed(),
            failed("late"),
            TaskEvent::StopAcknowledged { task_id: None },
        ]
    };

    for terminal in [completed(), failed("boom")] {
        let mut machine = TaskStateMachine::new();
        machine.apply(started("t1"));
        machine.apply(plan(&["A"]));
        machine.apply(terminal);
        let frozen = machine.current().unwrap().clone();
        assert!(frozen.status.is_terminal());

        for event in events() {
            assert!(!machine.apply(event).changed());
        }
        assert!(!machine
            .apply_step(step("A", StepStatus::Completed))
            .changed());
        assert_eq!(machine.current().unwrap(), &frozen);
    }
}

#[test]
fn test_unknown_step_ids_leave_task_unchanged() {
    let mut machine = TaskStateMachine::new();
    machine.apply(started("t1"));
    machine.apply(plan(&["A", "B"]));
    let before = machine.current().unwrap().clone();

    for id in ["C", "old-step", "", "a"] {
        for status in [StepStatus::Completed, StepStatus::Failed] {
            assert_eq!(
                machine.apply_step(step(id, status)),
                Applied::Ignored(IgnoreReason::UnknownStep)
            );
        }
    }
    assert_eq!(machine.current().unwrap(), &before);
}

#[test]
fn test_events_for_other_task_are_stale() {
    let mut machine = TaskStateMachine::new();
    machine.apply(started("t1"));
    machine.apply(plan(&["A"]));

    let stale = StepUpdate {
        task_id: Some("t0".to_string()),
        step_id: "A".to_string(),
        status: StepStatus::Completed,
    };
    assert_eq!(
        machine.apply_step(stale),
        Applied::Ignored(IgnoreReason::StaleTask)
    );
    assert_eq!(
        machine.apply(TaskEvent::Completed {
            task_id: Some("t0".to_string()),
            output: None,
            reported: None,
        }),
        Applied::Ignored(IgnoreReason::StaleTask)
    );
    assert_eq!(status(&machine), TaskStatus::Executing);
}

#[test]
fn test_new_task_id_replaces_wholesale() {
    let mut machine = TaskStateMachine::new();
    machine.apply(started("t1"));
    machine.apply(plan(&["A"]));
    machine.apply(completed());

    assert_eq!(machine.apply(started("t2")), Applied::Replaced);
    let task = machine.current().unwrap();
    assert_eq!(task.id, "t2");
    assert_eq!(task.status, TaskStatus::Planning);
    assert!(task.steps.is_empty());
}

#[test]
fn test_duplicate_started_is_ignored() {
    let mut machine = TaskStateMachine::new();
    machine.apply(started("t1"));
    assert_eq!(
        machine.apply(started("t1")),
        Applied::Ignored(IgnoreReason::InvalidTransition)
    );
    assert_eq!(status(&machine), TaskStatus::Planning);

    machine.apply(plan(&["A"]));
    assert!(!machine.apply(started("t1")).changed());
    assert_eq!(status(&machine), TaskStatus::Executing);
}

#[test]
fn test_events_without_task_are_ignored() {
    let mut machine = TaskStateMachine::new();
    assert_eq!(
        machine.apply(completed()),
        Applied::Ignored(IgnoreReason::NoTask)
    );
    assert_eq!(
        machine.apply_step(step("A", StepStatus::Executing)),
        Applied::Ignored(IgnoreReason::NoTask)
    );
    assert!(machine.current().is_none());
}

#[test]
fn test_empty_plan_keeps_started_steps() {
    let mut machine = TaskStateMachine::new();
    machine.apply(TaskEvent::Started {
        task_id: "t1".to_string(),
        description: "d".to_string(),
        steps: vec![PlanStep::new("A", "first")],
    });
    machine.apply(plan(&[]));
    let task = machine.current().unwrap();
    assert_eq!(task.status, TaskStatus::Executing);
    assert_eq!(task.steps.len(), 1);
}
