use crate::infra::{
    default_frequencies, default_rule_set, InMemoryInventoryRepository, InMemoryPolicyRepository,
};
use chrono::{Local, NaiveDate};
use clap::Args;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use model_governance::error::AppError;
use model_governance::governance::{AttributeMap, EntityId, GovernanceService};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Evaluation date for the demo (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Policy document to roll out instead of the built-in sample.
    #[arg(long)]
    pub(crate) policy_file: Option<PathBuf>,
    /// Skip the policy rollout portion of the demo.
    #[arg(long)]
    pub(crate) skip_policy: bool,
}

fn sample_attributes(entries: &[(&str, serde_json::Value)]) -> AttributeMap {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn sample_policy_document() -> String {
    [
        "Model Risk Policy, revision 4.",
        "Tier 3 use cases must be revalidated every 6 months.",
        "Tier 2 use cases must be revalidated every 18 months.",
        "Updated rule: Automated decisioning with customer impact now includes indirect harm.",
        "New rule: vendor-provided scores require an annual review.",
    ]
    .join("\n")
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        today,
        policy_file,
        skip_policy,
    } = args;

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let inventory = Arc::new(InMemoryInventoryRepository::default());
    let policies = Arc::new(InMemoryPolicyRepository::default());
    let service = GovernanceService::new(
        default_rule_set(),
        default_frequencies(),
        inventory.clone(),
        policies,
    );

    println!("Model governance demo (evaluated {today})");
    println!("\nClassification intake");

    let samples: Vec<(&str, &str, AttributeMap)> = vec![
        (
            "uc-loan-decisioning",
            "Consumer loan decisioning",
            sample_attributes(&[
                ("usageType", json!("Decisioning")),
                ("customerImpact", json!("Direct")),
                ("technique", json!("ml")),
                ("usesPersonalData", json!(true)),
            ]),
        ),
        (
            "uc-churn-forecast",
            "Churn forecasting",
            sample_attributes(&[
                ("usageType", json!("Advisory")),
                ("technique", json!("statistical")),
                ("deployment", json!("Internal")),
            ]),
        ),
        (
            "uc-vendor-fraud",
            "Vendor fraud score passthrough",
            sample_attributes(&[
                ("usageType", json!("Monitoring")),
                ("usesVendorScores", json!(true)),
                ("deployment", json!("CustomerFacing")),
                ("usesPersonalData", json!(true)),
            ]),
        ),
    ];

    for (entity_id, name, attributes) in samples {
        let decision = service.classify_entity(
            EntityId(entity_id.to_string()),
            name.to_string(),
            &attributes,
            today,
        )?;
        println!(
            "- {name}: tier {} | model definition {} | {} rule(s) fired",
            decision.tier,
            decision.model_classification.label(),
            decision.triggered_rules.len()
        );
        for triggered in &decision.triggered_rules {
            println!("    {} -> {}", triggered.rule_id, triggered.rationale);
        }
        if !decision.required_artifacts.is_empty() {
            let artifacts: Vec<&str> = decision
                .required_artifacts
                .iter()
                .map(|artifact| artifact.0.as_str())
                .collect();
            println!("    required artifacts: {}", artifacts.join(", "));
        }
    }

    let record = service.get_record(&EntityId("uc-loan-decisioning".to_string()))?;
    println!(
        "\nSchedule for {}: every {} months, next due {}",
        record.entity_id,
        record
            .validation_frequency_months
            .map(|months| months.to_string())
            .unwrap_or_else(|| "?".to_string()),
        record
            .next_validation_due
            .map(|due| due.to_string())
            .unwrap_or_else(|| "unscheduled".to_string()),
    );
    println!(
        "Classification decisions recorded for audit: {}",
        inventory.decisions().len()
    );

    if skip_policy {
        return Ok(());
    }

    println!("\nPolicy rollout");
    let document = match policy_file {
        Some(path) => std::fs::read_to_string(path)?,
        None => sample_policy_document(),
    };

    let policy = service.submit_policy(document, today)?;
    println!("- Submitted {} ({})", policy.id, policy.status.label());

    let analyzed = service.analyze_policy(&policy.id)?;
    if let Some(extraction) = &analyzed.extraction {
        println!(
            "- Analysis extracted {} cadence(s) and {} rule marker(s), confidence {:.2}",
            extraction.validation_frequencies.iter().count(),
            extraction.rule_markers.len(),
            extraction.confidence
        );
        for note in &extraction.notes {
            println!("    note: {note}");
        }
    }
    if let Some(diff) = &analyzed.diff {
        println!("- Diff: {}", diff.summary);
        for delta in &diff.frequency_changes {
            println!("    {}: {}", delta.tier, delta.note);
        }
        for change in &diff.rule_changes {
            println!("    {:?}: {}", change.kind, change.label);
        }
        if !diff.is_material() {
            println!("- Candidate changes nothing; stopping before approval");
            return Ok(());
        }
    }

    service.approve_policy(&policy.id)?;
    let preview = service.preview_policy(&policy.id)?;
    println!(
        "- Preview: {} reviewed, {} affected, {} earlier / {} later due dates",
        preview.summary.records_reviewed,
        preview.summary.records_affected,
        preview.summary.earlier_due_dates,
        preview.summary.later_due_dates
    );

    let report = service.apply_policy(&policy.id)?;
    if report.success {
        println!("- Applied: {} record(s) rescheduled", report.records_updated);
    } else {
        println!(
            "- Apply incomplete: {} updated, {} failed; policy remains approved",
            report.records_updated,
            report.errors.len()
        );
        return Ok(());
    }

    let applied = service.get_policy(&policy.id)?;
    println!(
        "- Policy {} is now {} and drives the active cadences",
        applied.id,
        applied.status.label()
    );

    println!("\nInventory after rollout");
    for entity in ["uc-loan-decisioning", "uc-churn-forecast", "uc-vendor-fraud"] {
        let record = service.get_record(&EntityId(entity.to_string()))?;
        println!(
            "- {} (tier {}): every {} months, next due {}",
            record.entity_id,
            record.tier,
            record
                .validation_frequency_months
                .map(|months| months.to_string())
                .unwrap_or_else(|| "?".to_string()),
            record
                .next_validation_due
                .map(|due| due.to_string())
                .unwrap_or_else(|| "unscheduled".to_string()),
        );
    }

    let overdue = service.overdue(today)?;
    if overdue.is_empty() {
        println!("\nOverdue validations: none");
    } else {
        println!("\nOverdue validations");
        for record in overdue {
            println!(
                "- {} due {}",
                record.entity_id,
                record
                    .next_validation_due
                    .map(|due| due.to_string())
                    .unwrap_or_else(|| "unscheduled".to_string()),
            );
        }
    }

    Ok(())
}
