//! Infraflow Core Integration Tests

use infraflow_core::{
    Error,
    actor::{Actor, Role},
    audit::SqliteAuditSink,
    commands::project::{self, Project, ProjectStatus, ProjectType},
    storage::{Database, DatabaseConfig},
    workflow::{
        ApprovalStatus, DisbursementFields, EditPolicy, InfraPhase, InfraWorkflow, NewExecutionLog,
        NewRkbItem, ProposalFields, RkbFields, WorkflowPolicy,
    },
};

fn approver() -> Actor {
    Actor::new("u-admin", "Admin", Role::Admin)
}

async fn infra_project(db: &Database, name: &str) -> Project {
    project::create_project(db, Project::new(name, ProjectType::Infrastructure))
        .await
        .unwrap()
}

async fn phase_of(db: &Database, id: &str) -> Option<InfraPhase> {
    project::get_project(db, id).await.unwrap().unwrap().current_phase
}

/// Drive a project through the proposal, RKB and disbursement gates
async fn approve_through_disbursement(workflow: &InfraWorkflow<'_>, id: &str) {
    let proposal = ProposalFields {
        background: Some("x".to_string()),
        ..Default::default()
    };
    workflow.save_proposal(id, &proposal).await.unwrap();
    workflow.submit_proposal(id).await.unwrap();
    workflow.approve_proposal(id).await.unwrap();

    workflow
        .add_rkb_item(id, &NewRkbItem::new("Access point", 10, "unit", 1_500_000))
        .await
        .unwrap();
    workflow.submit_rkb(id).await.unwrap();
    workflow.approve_rkb(id).await.unwrap();

    let disbursement = DisbursementFields {
        approved_budget: Some(15_000_000),
        ..Default::default()
    };
    workflow.save_disbursement(id, &disbursement).await.unwrap();
    workflow.submit_disbursement(id).await.unwrap();
    workflow.approve_disbursement(id).await.unwrap();
}

#[tokio::test]
async fn test_end_to_end_proposal_approval() {
    let db = Database::in_memory().await.unwrap();
    let project = infra_project(&db, "Campus network").await;
    assert_eq!(project.current_phase, Some(InfraPhase::Proposal));

    let admin = approver();
    let workflow = InfraWorkflow::new(&db).acting_as(&admin);

    let fields = ProposalFields {
        background: Some("x".to_string()),
        ..Default::default()
    };
    workflow.save_proposal(&project.id, &fields).await.unwrap();
    let submitted = workflow.submit_proposal(&project.id).await.unwrap();
    assert_eq!(submitted.approval_status, ApprovalStatus::Pending);

    workflow.approve_proposal(&project.id).await.unwrap();

    let detail = project::get_full_project_data(&db, &project.id).await.unwrap();
    assert_eq!(detail.project.current_phase, Some(InfraPhase::Rkb));
    assert_eq!(detail.project.status, ProjectStatus::InProgress);
    let proposal = detail.proposal.unwrap();
    assert_eq!(proposal.approval_status, ApprovalStatus::Approved);
    assert_eq!(proposal.approved_by.as_deref(), Some("Admin"));
    assert_eq!(proposal.fields.background.as_deref(), Some("x"));
}

#[tokio::test]
async fn test_budget_scenario() {
    let db = Database::in_memory().await.unwrap();
    let project = infra_project(&db, "Office cabling").await;
    let admin = approver();
    let workflow = InfraWorkflow::new(&db).acting_as(&admin);

    workflow.submit_proposal(&project.id).await.unwrap();
    workflow.approve_proposal(&project.id).await.unwrap();

    let first = workflow
        .add_rkb_item(&project.id, &NewRkbItem::new("Cat6 cable", 2, "roll", 500_000))
        .await
        .unwrap();
    let second = workflow
        .add_rkb_item(&project.id, &NewRkbItem::new("Patch panel", 1, "unit", 250_000))
        .await
        .unwrap();
    assert_eq!(second.total_budget, 1_250_000);

    let removed = workflow.remove_rkb_item(&first.item.id).await.unwrap();
    assert_eq!(removed.total_budget, 250_000);

    let rkb = workflow.get_rkb(&project.id).await.unwrap().unwrap();
    assert_eq!(rkb.fields.total_budget, 250_000);
}

#[tokio::test]
async fn test_free_item_has_zero_total() {
    let db = Database::in_memory().await.unwrap();
    let project = infra_project(&db, "Donated hardware").await;
    let admin = approver();
    let workflow = InfraWorkflow::new(&db).acting_as(&admin);
    workflow.submit_proposal(&project.id).await.unwrap();
    workflow.approve_proposal(&project.id).await.unwrap();

    let change = workflow
        .add_rkb_item(&project.id, &NewRkbItem::new("Donated switch", 1, "unit", 0))
        .await
        .unwrap();
    assert_eq!(change.item.total_price, 0);
    assert_eq!(change.total_budget, 0);
}

#[tokio::test]
async fn test_terminal_guard() {
    let db = Database::in_memory().await.unwrap();
    let project = infra_project(&db, "Backup site").await;
    let workflow = InfraWorkflow::new(&db);

    workflow.complete_project(&project.id).await.unwrap();
    let err = workflow.advance_phase(&project.id).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyCompleted));
}

#[tokio::test]
async fn test_non_infrastructure_guard() {
    let db = Database::in_memory().await.unwrap();
    let project = project::create_project(&db, Project::new("Company site", ProjectType::WebDev))
        .await
        .unwrap();
    assert_eq!(project.current_phase, None);

    let err = InfraWorkflow::new(&db).advance_phase(&project.id).await.unwrap_err();
    assert!(matches!(err, Error::NotInfrastructureProject));

    let err = InfraWorkflow::new(&db)
        .save_proposal(&project.id, &ProposalFields::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotInfrastructureProject));
}

#[tokio::test]
async fn test_each_gate_requires_approval() {
    let db = Database::in_memory().await.unwrap();
    let project = infra_project(&db, "Data center").await;
    let admin = approver();
    let workflow = InfraWorkflow::new(&db).acting_as(&admin);

    // PROPOSAL gate: nothing saved, then saved, then pending
    for step in 0..3 {
        match step {
            1 => {
                workflow
                    .save_proposal(&project.id, &ProposalFields::default())
                    .await
                    .unwrap();
            }
            2 => {
                workflow.submit_proposal(&project.id).await.unwrap();
            }
            _ => {}
        }
        let err = workflow.advance_phase(&project.id).await.unwrap_err();
        assert!(matches!(err, Error::PhaseNotApproved(ref s) if s == "Proposal"));
    }
    workflow.approve_proposal(&project.id).await.unwrap();

    // RKB gate: rejected is not approved
    workflow.submit_rkb(&project.id).await.unwrap();
    workflow.reject_rkb(&project.id, "No quotes attached").await.unwrap();
    let err = workflow.advance_phase(&project.id).await.unwrap_err();
    assert!(matches!(err, Error::PhaseNotApproved(ref s) if s == "RKB"));
    workflow.submit_rkb(&project.id).await.unwrap();
    workflow.approve_rkb(&project.id).await.unwrap();

    // DISBURSEMENT gate
    let err = workflow.advance_phase(&project.id).await.unwrap_err();
    assert!(matches!(err, Error::PhaseNotApproved(ref s) if s == "Disbursement"));
    assert_eq!(phase_of(&db, &project.id).await, Some(InfraPhase::Disbursement));
}

#[tokio::test]
async fn test_full_lifecycle_to_completion() {
    let db = Database::in_memory().await.unwrap();
    let project = infra_project(&db, "Wireless upgrade").await;
    let admin = approver();
    let policy = WorkflowPolicy::default().with_full_progress_required(true);
    let workflow = InfraWorkflow::new(&db).with_policy(policy).acting_as(&admin);

    approve_through_disbursement(&workflow, &project.id).await;
    assert_eq!(phase_of(&db, &project.id).await, Some(InfraPhase::Execution));

    workflow
        .add_execution_log(&project.id, &NewExecutionLog::new("Mounted access points", 70))
        .await
        .unwrap();
    let err = workflow.complete_project(&project.id).await.unwrap_err();
    assert!(matches!(err, Error::IncompleteExecution(70)));

    workflow
        .add_execution_log(
            &project.id,
            &NewExecutionLog::new("Site acceptance test", 100).with_findings("All green"),
        )
        .await
        .unwrap();
    let completed = workflow.complete_project(&project.id).await.unwrap();
    assert_eq!(completed.current_phase, Some(InfraPhase::Completed));
    assert_eq!(completed.status, ProjectStatus::Completed);

    let detail = workflow.get_full_project_data(&project.id).await.unwrap();
    assert_eq!(detail.current_progress(), 100);
    assert_eq!(detail.rkb_items.len(), 1);
    assert_eq!(detail.rkb_submission.unwrap().fields.total_budget, 15_000_000);
    assert_eq!(detail.execution_logs[0].activity_description, "Site acceptance test");
}

#[tokio::test]
async fn test_locked_policy_refuses_pending_edits() {
    let db = Database::in_memory().await.unwrap();
    let project = infra_project(&db, "Firewall").await;
    let admin = approver();
    let workflow = InfraWorkflow::new(&db).acting_as(&admin);

    workflow.submit_proposal(&project.id).await.unwrap();
    let err = workflow
        .save_proposal(&project.id, &ProposalFields::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StageLocked { .. }));

    let stage = workflow.get_proposal(&project.id).await.unwrap().unwrap();
    assert_eq!(stage.approval_status, ApprovalStatus::Pending);
}

#[tokio::test]
async fn test_reset_policy_reopens_pending_stage() {
    let db = Database::in_memory().await.unwrap();
    let project = infra_project(&db, "Firewall").await;
    let workflow = InfraWorkflow::new(&db)
        .with_policy(WorkflowPolicy::default().with_edit_policy(EditPolicy::ResetToDraft));

    workflow.submit_proposal(&project.id).await.unwrap();
    let fields = ProposalFields {
        scope: Some("Edge only".to_string()),
        ..Default::default()
    };
    let saved = workflow.save_proposal(&project.id, &fields).await.unwrap();
    assert_eq!(saved.approval_status, ApprovalStatus::Draft);
    assert_eq!(saved.fields.scope.as_deref(), Some("Edge only"));
}

#[tokio::test]
async fn test_reject_save_submit_round_trip() {
    let db = Database::in_memory().await.unwrap();
    let project = infra_project(&db, "VPN concentrator").await;
    let admin = approver();
    let workflow = InfraWorkflow::new(&db).acting_as(&admin);
    workflow.submit_proposal(&project.id).await.unwrap();
    workflow.approve_proposal(&project.id).await.unwrap();

    workflow.submit_rkb(&project.id).await.unwrap();
    workflow.reject_rkb(&project.id, "Justification missing").await.unwrap();

    let fields = RkbFields {
        justification: Some("Remote staff growth".to_string()),
        ..Default::default()
    };
    workflow.save_rkb(&project.id, &fields).await.unwrap();
    let resubmitted = workflow.submit_rkb(&project.id).await.unwrap();

    assert_eq!(resubmitted.approval_status, ApprovalStatus::Pending);
    assert!(resubmitted.rejection_reason.is_none());
    assert_eq!(resubmitted.fields.justification.as_deref(), Some("Remote staff growth"));
}

#[tokio::test]
async fn test_only_deciders_approve() {
    let db = Database::in_memory().await.unwrap();
    let project = infra_project(&db, "Badge readers").await;
    let user = Actor::new("u-9", "Intern", Role::User);

    let workflow = InfraWorkflow::new(&db).acting_as(&user);
    workflow.submit_proposal(&project.id).await.unwrap();

    let err = workflow.approve_proposal(&project.id).await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));
    let err = InfraWorkflow::new(&db)
        .reject_proposal(&project.id, "No")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));

    let stage = workflow.get_proposal(&project.id).await.unwrap().unwrap();
    assert_eq!(stage.approval_status, ApprovalStatus::Pending);
}

#[tokio::test]
async fn test_approved_stage_cannot_be_resubmitted() {
    let db = Database::in_memory().await.unwrap();
    let project = infra_project(&db, "NAS").await;
    let admin = approver();
    let workflow = InfraWorkflow::new(&db)
        .with_policy(WorkflowPolicy::default().with_phase_guard(false))
        .acting_as(&admin);

    workflow.submit_proposal(&project.id).await.unwrap();
    workflow.approve_proposal(&project.id).await.unwrap();

    let err = workflow.submit_proposal(&project.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_approval_rolls_back_when_gate_fails() {
    let db = Database::in_memory().await.unwrap();
    let project = infra_project(&db, "Telephony").await;
    let admin = approver();
    let workflow = InfraWorkflow::new(&db)
        .with_policy(WorkflowPolicy::permissive())
        .acting_as(&admin);

    // With the guard off, an RKB can be approved while the project still
    // sits in PROPOSAL; the proposal gate then refuses the advance.
    workflow.submit_rkb(&project.id).await.unwrap();
    let err = workflow.approve_rkb(&project.id).await.unwrap_err();
    assert!(matches!(err, Error::PhaseNotApproved(ref s) if s == "Proposal"));

    let rkb = workflow.get_rkb(&project.id).await.unwrap().unwrap();
    assert_eq!(rkb.approval_status, ApprovalStatus::Pending);
    assert!(rkb.approved_by.is_none());
    assert_eq!(phase_of(&db, &project.id).await, Some(InfraPhase::Proposal));
}

#[tokio::test]
async fn test_wrong_phase_guard_on_stage_operations() {
    let db = Database::in_memory().await.unwrap();
    let project = infra_project(&db, "Printers").await;
    let admin = approver();
    let workflow = InfraWorkflow::new(&db).acting_as(&admin);

    let err = workflow.submit_rkb(&project.id).await.unwrap_err();
    assert!(matches!(err, Error::WrongPhase { .. }));
    let err = workflow
        .add_rkb_item(&project.id, &NewRkbItem::new("Toner", 4, "box", 90_000))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WrongPhase { .. }));

    workflow.submit_proposal(&project.id).await.unwrap();
    workflow.approve_proposal(&project.id).await.unwrap();

    // Proposal is frozen once the project has moved on
    let err = workflow
        .save_proposal(&project.id, &ProposalFields::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WrongPhase { .. }));
}

#[tokio::test]
async fn test_audit_trail_records_actions() {
    let db = Database::in_memory().await.unwrap();
    let project = infra_project(&db, "Door access").await;
    let sink = SqliteAuditSink::new(db.clone());
    let admin = approver();
    let workflow = InfraWorkflow::new(&db).with_audit(&sink).acting_as(&admin);

    workflow.submit_proposal(&project.id).await.unwrap();
    workflow.approve_proposal(&project.id).await.unwrap();

    let entries = sink.recent(Some(&project.id), 10).await.unwrap();
    let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    assert!(actions.contains(&"SUBMIT_PROPOSAL"));
    assert!(actions.contains(&"APPROVE_PROPOSAL"));
    assert!(actions.contains(&"ADVANCE_PHASE"));
    assert!(entries.iter().all(|e| e.user_id.as_deref() == Some("u-admin")));
}

#[tokio::test]
async fn test_concurrent_approvals_advance_once() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(DatabaseConfig::with_path(dir.path().join("infraflow.db")))
        .await
        .unwrap();
    let project = infra_project(&db, "Cooling").await;

    let first = Actor::new("u1", "Rina", Role::Admin);
    let second = Actor::new("u2", "Budi", Role::Staff);
    InfraWorkflow::new(&db).submit_proposal(&project.id).await.unwrap();

    let a = InfraWorkflow::new(&db).acting_as(&first);
    let b = InfraWorkflow::new(&db).acting_as(&second);
    let (ra, rb) = tokio::join!(a.approve_proposal(&project.id), b.approve_proposal(&project.id));

    let successes = [ra.is_ok(), rb.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);

    let loser = if ra.is_ok() { rb.unwrap_err() } else { ra.unwrap_err() };
    assert!(matches!(
        loser,
        Error::WrongPhase { .. } | Error::InvalidTransition { .. }
    ));
    assert_eq!(phase_of(&db, &project.id).await, Some(InfraPhase::Rkb));

    db.close().await;
}
