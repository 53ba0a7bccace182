use super::common::*;
use crate::governance::repository::{EntityId, PolicyId, PolicyStatus};
use crate::governance::ruleset::TierKey;
use crate::governance::service::GovernanceError;

fn seeded_inventory() -> (
    crate::governance::service::GovernanceService<MemoryInventory, MemoryPolicies>,
    std::sync::Arc<MemoryInventory>,
    std::sync::Arc<MemoryPolicies>,
) {
    let (service, inventory, policies) = build_service();
    inventory.seed(vec![
        record("uc-loan", "T3", Some(date(2025, 3, 1))),
        record("uc-fraud", "T3", None),
        record("uc-forecast", "T2", Some(date(2025, 2, 1))),
        record("uc-routing", "T1", Some(date(2025, 4, 1))),
        record("uc-pricing", "T3", Some(date(2025, 5, 1))),
    ]);
    (service, inventory, policies)
}

fn approved_tightening_policy(
    service: &crate::governance::service::GovernanceService<MemoryInventory, MemoryPolicies>,
) -> PolicyId {
    let policy = service
        .submit_policy(tightened_policy_document(), date(2025, 6, 1))
        .expect("submit succeeds");
    service.analyze_policy(&policy.id).expect("analyze succeeds");
    service.approve_policy(&policy.id).expect("approve succeeds");
    policy.id
}

#[test]
fn lifecycle_advances_through_analyze_approve_apply() {
    let (service, _inventory, policies) = seeded_inventory();

    let policy = service
        .submit_policy(tightened_policy_document(), date(2025, 6, 1))
        .expect("submit succeeds");
    assert_eq!(policy.status, PolicyStatus::Draft);

    let analyzed = service.analyze_policy(&policy.id).expect("analyze succeeds");
    assert_eq!(analyzed.status, PolicyStatus::Analyzed);
    let extraction = analyzed.extraction.expect("extraction stored");
    assert_eq!(
        extraction
            .validation_frequencies
            .months_for(&TierKey::from("T3")),
        Some(6),
    );
    assert!(analyzed.diff.expect("diff stored").is_material());

    let approved = service.approve_policy(&policy.id).expect("approve succeeds");
    assert_eq!(approved.status, PolicyStatus::Approved);

    let report = service.apply_policy(&policy.id).expect("apply succeeds");
    assert!(report.success);
    assert_eq!(report.records_updated, 5);

    assert_eq!(
        policies.get(&policy.id).expect("policy stored").status,
        PolicyStatus::Applied,
    );
}

#[test]
fn apply_updates_schedules_and_swaps_the_active_table() {
    let (service, inventory, _policies) = seeded_inventory();
    let policy_id = approved_tightening_policy(&service);

    service.apply_policy(&policy_id).expect("apply succeeds");

    // T3 records move to the 6-month cadence from their own anchors.
    let loan = inventory.get("uc-loan").expect("record exists");
    assert_eq!(loan.validation_frequency_months, Some(6));
    assert_eq!(loan.next_validation_due, Some(date(2025, 9, 1)));

    // Never-validated records anchor on onboarding.
    let fraud = inventory.get("uc-fraud").expect("record exists");
    assert_eq!(fraud.next_validation_due, Some(date(2025, 7, 15)));

    // Tiers the policy does not mention keep their cadence.
    let forecast = inventory.get("uc-forecast").expect("record exists");
    assert_eq!(forecast.validation_frequency_months, Some(24));

    let snapshot = service.active_snapshot();
    assert_eq!(
        snapshot.frequencies.months_for(&TierKey::from("T3")),
        Some(6),
    );
    assert_eq!(
        snapshot.frequencies.months_for(&TierKey::from("T2")),
        Some(24),
    );
    assert_eq!(snapshot.applied_policy.as_ref(), Some(&policy_id));
}

#[test]
fn preview_and_apply_agree_on_every_due_date() {
    let (service, inventory, _policies) = seeded_inventory();
    let policy_id = approved_tightening_policy(&service);

    let report = service.preview_policy(&policy_id).expect("preview succeeds");
    service.apply_policy(&policy_id).expect("apply succeeds");

    for row in &report.affected {
        let stored = inventory.get(&row.entity_id.0).expect("record exists");
        assert_eq!(stored.next_validation_due, row.new_due);
        assert_eq!(stored.validation_frequency_months, row.new_frequency_months);
    }
}

#[test]
fn preview_leaves_policy_and_records_untouched() {
    let (service, inventory, policies) = seeded_inventory();
    let policy_id = approved_tightening_policy(&service);
    let before = inventory.get("uc-loan").expect("record exists");

    service.preview_policy(&policy_id).expect("preview succeeds");

    assert_eq!(inventory.get("uc-loan"), Some(before));
    assert_eq!(
        policies.get(&policy_id).expect("policy stored").status,
        PolicyStatus::Approved,
    );
}

#[test]
fn reapplying_an_applied_policy_is_idempotent() {
    let (service, inventory, policies) = seeded_inventory();
    let policy_id = approved_tightening_policy(&service);

    service.apply_policy(&policy_id).expect("first apply succeeds");
    let after_first = inventory.get("uc-loan").expect("record exists");

    let report = service.apply_policy(&policy_id).expect("second apply succeeds");
    assert!(report.success);

    assert_eq!(inventory.get("uc-loan"), Some(after_first));
    assert_eq!(
        policies.get(&policy_id).expect("policy stored").status,
        PolicyStatus::Applied,
    );
}

#[test]
fn mid_batch_failure_leaves_lifecycle_state_unchanged() {
    let (service, inventory, policies) = seeded_inventory();
    let policy_id = approved_tightening_policy(&service);

    // Store goes down after the first schedule write.
    inventory.fail_after(1);
    let report = service.apply_policy(&policy_id).expect("apply reports failure");
    assert!(!report.success);
    assert_eq!(report.records_updated, 1);
    assert_eq!(report.errors.len(), 4);

    // Partial state: the policy is still only approved and the active
    // cadences never swapped.
    assert_eq!(
        policies.get(&policy_id).expect("policy stored").status,
        PolicyStatus::Approved,
    );
    assert_eq!(
        service
            .active_snapshot()
            .frequencies
            .months_for(&TierKey::from("T3")),
        Some(12),
    );
}

#[test]
fn listing_outage_mid_batch_is_reported_not_raised() {
    let (service, inventory, policies) = seeded_inventory();
    let policy_id = approved_tightening_policy(&service);

    // Store goes down after the first chunk is listed; the two records in
    // it have already been rewritten by then.
    inventory.fail_listing_after(1);
    let report = service.apply_policy(&policy_id).expect("apply reports failure");
    assert!(!report.success);
    assert_eq!(report.records_updated, 2);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].entity_id.is_none());
    assert!(report.errors[0].message.contains("offset 2"));

    let fraud = inventory.get("uc-fraud").expect("record exists");
    assert_eq!(fraud.validation_frequency_months, Some(6));
    assert_eq!(
        policies.get(&policy_id).expect("policy stored").status,
        PolicyStatus::Approved,
    );
    assert_eq!(
        service
            .active_snapshot()
            .frequencies
            .months_for(&TierKey::from("T3")),
        Some(12),
    );

    inventory.heal();
    let retry = service.apply_policy(&policy_id).expect("retry succeeds");
    assert!(retry.success);
    assert_eq!(retry.records_updated, 5);
}

#[test]
fn failed_apply_is_re_driveable_after_the_store_recovers() {
    let (service, inventory, policies) = seeded_inventory();
    let policy_id = approved_tightening_policy(&service);

    inventory.fail_after(2);
    let first = service.apply_policy(&policy_id).expect("apply reports failure");
    assert!(!first.success);

    inventory.heal();
    let second = service.apply_policy(&policy_id).expect("retry succeeds");
    assert!(second.success);
    assert_eq!(second.records_updated, 5);
    assert_eq!(
        policies.get(&policy_id).expect("policy stored").status,
        PolicyStatus::Applied,
    );
}

#[test]
fn applying_a_successor_archives_the_previous_policy() {
    let (service, _inventory, policies) = seeded_inventory();
    let first = approved_tightening_policy(&service);
    service.apply_policy(&first).expect("first apply succeeds");

    let second = service
        .submit_policy(
            "Tier 3 use cases must be revalidated every 9 months.".to_string(),
            date(2025, 7, 1),
        )
        .expect("submit succeeds");
    service.analyze_policy(&second.id).expect("analyze succeeds");
    service.approve_policy(&second.id).expect("approve succeeds");
    service.apply_policy(&second.id).expect("second apply succeeds");

    assert_eq!(
        policies.get(&first).expect("policy stored").status,
        PolicyStatus::Archived,
    );
    assert_eq!(
        policies.get(&second.id).expect("policy stored").status,
        PolicyStatus::Applied,
    );
    assert_eq!(
        service
            .active_snapshot()
            .frequencies
            .months_for(&TierKey::from("T3")),
        Some(9),
    );
}

#[test]
fn approving_a_draft_is_rejected() {
    let (service, _inventory, _policies) = seeded_inventory();
    let policy = service
        .submit_policy(tightened_policy_document(), date(2025, 6, 1))
        .expect("submit succeeds");

    let error = service.approve_policy(&policy.id).expect_err("must reject");
    assert!(matches!(
        error,
        GovernanceError::InvalidTransition { from: "draft", .. },
    ));
}

#[test]
fn applying_an_unapproved_policy_is_rejected() {
    let (service, _inventory, _policies) = seeded_inventory();
    let policy = service
        .submit_policy(tightened_policy_document(), date(2025, 6, 1))
        .expect("submit succeeds");
    service.analyze_policy(&policy.id).expect("analyze succeeds");

    let error = service.apply_policy(&policy.id).expect_err("must reject");
    assert!(matches!(
        error,
        GovernanceError::InvalidTransition { from: "analyzed", .. },
    ));
}

#[test]
fn archiving_the_applied_policy_is_rejected() {
    let (service, _inventory, _policies) = seeded_inventory();
    let policy_id = approved_tightening_policy(&service);
    service.apply_policy(&policy_id).expect("apply succeeds");

    let error = service.archive_policy(&policy_id).expect_err("must reject");
    assert!(matches!(
        error,
        GovernanceError::InvalidTransition { from: "applied", .. },
    ));
}

#[test]
fn archiving_a_draft_is_allowed_and_terminal() {
    let (service, _inventory, _policies) = seeded_inventory();
    let policy = service
        .submit_policy(tightened_policy_document(), date(2025, 6, 1))
        .expect("submit succeeds");

    let archived = service.archive_policy(&policy.id).expect("archive succeeds");
    assert_eq!(archived.status, PolicyStatus::Archived);

    let error = service.analyze_policy(&policy.id).expect_err("must reject");
    assert!(matches!(error, GovernanceError::InvalidTransition { .. }));
}

#[test]
fn preview_of_an_unanalyzed_policy_is_rejected() {
    let (service, _inventory, _policies) = seeded_inventory();
    let policy = service
        .submit_policy(tightened_policy_document(), date(2025, 6, 1))
        .expect("submit succeeds");

    let error = service.preview_policy(&policy.id).expect_err("must reject");
    assert!(matches!(error, GovernanceError::MissingExtraction(_)));
}

#[test]
fn unknown_policy_ids_surface_not_found() {
    let (service, _inventory, _policies) = seeded_inventory();
    let missing = PolicyId("pol-999999".to_string());
    assert!(matches!(
        service.get_policy(&missing),
        Err(GovernanceError::PolicyNotFound(_)),
    ));
}

#[test]
fn record_validation_rolls_the_schedule_forward() {
    let (service, _inventory, _policies) = seeded_inventory();
    let policy_id = approved_tightening_policy(&service);
    service.apply_policy(&policy_id).expect("apply succeeds");

    let updated = service
        .record_validation(&EntityId("uc-loan".to_string()), date(2025, 9, 3))
        .expect("validation recorded");

    assert_eq!(updated.last_validation_date, Some(date(2025, 9, 3)));
    assert_eq!(updated.next_validation_due, Some(date(2026, 3, 3)));
}

#[test]
fn record_validation_for_unknown_entity_is_not_found() {
    let (service, _inventory, _policies) = seeded_inventory();
    let error = service
        .record_validation(&EntityId("uc-ghost".to_string()), date(2025, 9, 3))
        .expect_err("must reject");
    assert!(matches!(error, GovernanceError::EntityNotFound(_)));
}

#[test]
fn overdue_lists_past_due_records_in_due_order() {
    let (service, inventory, _policies) = seeded_inventory();
    let policy_id = approved_tightening_policy(&service);
    service.apply_policy(&policy_id).expect("apply succeeds");

    // After apply: uc-loan due 2025-09-01, uc-fraud due 2025-07-15,
    // uc-pricing due 2025-11-01.
    let overdue = service.overdue(date(2025, 10, 1)).expect("overdue succeeds");
    let ids: Vec<&str> = overdue
        .iter()
        .map(|record| record.entity_id.0.as_str())
        .collect();
    assert_eq!(ids, vec!["uc-fraud", "uc-loan"]);

    assert!(inventory
        .get("uc-pricing")
        .and_then(|record| record.next_validation_due)
        .is_some());
}

#[test]
fn classify_entity_enrolls_the_record_with_a_schedule() {
    let (service, inventory, _policies) = build_service();

    let decision = service
        .classify_entity(
            EntityId("uc-new".to_string()),
            "Loan decisioning".to_string(),
            &decisioning_attributes(),
            date(2025, 6, 1),
        )
        .expect("classification succeeds");
    assert_eq!(decision.tier, TierKey::from("T3"));

    let stored = inventory.get("uc-new").expect("record enrolled");
    assert_eq!(stored.tier, TierKey::from("T3"));
    assert_eq!(stored.validation_frequency_months, Some(12));
    assert_eq!(stored.onboarded_on, date(2025, 6, 1));
    assert_eq!(stored.next_validation_due, Some(date(2026, 6, 1)));

    let decisions = inventory.decisions.lock().expect("decision log");
    assert_eq!(decisions.len(), 1);
}

#[test]
fn classify_with_uses_the_supplied_rule_set_and_stores_nothing() {
    let (service, inventory, _policies) = build_service();

    let mut draft = base_rule_set();
    draft.version = "2024-q4-draft".to_string();
    draft.rules[0].tier = TierKey::from("T2");

    let decision = service.classify_with(std::sync::Arc::new(draft), &decisioning_attributes());
    assert_eq!(decision.tier, TierKey::from("T2"));
    assert_eq!(decision.rule_set_version, "2024-q4-draft");

    // The active rule set is untouched and nothing was persisted.
    assert_eq!(
        service.classify(&decisioning_attributes()).tier,
        TierKey::from("T3"),
    );
    assert!(inventory
        .decisions
        .lock()
        .expect("decision log")
        .is_empty());
}

#[test]
fn reclassification_preserves_onboarding_and_validation_history() {
    let (service, inventory, _policies) = build_service();
    let mut existing = record("uc-old", "T1", Some(date(2025, 2, 1)));
    existing.onboarded_on = date(2024, 11, 1);
    inventory.seed(vec![existing]);

    service
        .classify_entity(
            EntityId("uc-old".to_string()),
            "Re-reviewed use case".to_string(),
            &decisioning_attributes(),
            date(2025, 6, 1),
        )
        .expect("reclassification succeeds");

    let stored = inventory.get("uc-old").expect("record exists");
    assert_eq!(stored.tier, TierKey::from("T3"));
    assert_eq!(stored.onboarded_on, date(2024, 11, 1));
    assert_eq!(stored.last_validation_date, Some(date(2025, 2, 1)));
    // Schedule anchors on the preserved validation history.
    assert_eq!(stored.next_validation_due, Some(date(2026, 2, 1)));
}
