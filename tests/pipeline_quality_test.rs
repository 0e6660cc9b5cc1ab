//! Pipeline registry and quality gate through the public API

use serde_json::json;

use lead_cache_core::lead::Lead;
use lead_cache_core::quality::evaluate_value;
use lead_cache_core::{evaluate, is_terminal, list_stages, Stage};

#[test]
fn test_stage_registry() {
    let stages = list_stages();
    assert_eq!(stages.len(), 11);
    assert_eq!(stages[0], Stage::NewLead);
    assert_eq!(stages[10], Stage::Nurture);

    let terminal: Vec<&str> = stages.iter().filter(|s| is_terminal(**s)).map(|s| s.key()).collect();
    assert_eq!(terminal, vec!["Closed Won", "Closed Lost", "Nurture"]);
}

#[test]
fn test_quality_gate_example() {
    let record = json!({
        "id": "L1",
        "stage": "Qualified",
        "companyName": "Acme",
        "website": null,
        "companyLinkedinUrl": null,
        "personLinkedinUrl": null,
        "state": "NY",
        "segment": "Insurance",
        "name": "Jo",
        "title": null,
        "email": null,
        "workDirectPhone": null,
        "mobilePhone": null,
        "homePhone": null,
        "sourceChannel": "Referral"
    });

    let report = evaluate_value(&record);
    assert!(!report.pass);
    assert_eq!(report.missing, vec!["Website or LinkedIn URL", "Valid Email or Phone"]);

    let lead = Lead::from_value(record).unwrap();
    assert_eq!(evaluate(&lead), report);
}

#[test]
fn test_quality_gate_complete_lead() {
    let record = json!({
        "_id": 42,
        "stage": "New Lead",
        "companyName": "Acme",
        "website": "https://acme.test",
        "state": "NY",
        "segment": "Insurance",
        "name": "Jo",
        "email": "jo@acme.test",
        "sourceChannel": "Referral"
    });
    let lead = Lead::from_value(record).unwrap();
    assert_eq!(lead.id, "42");

    let report = evaluate(&lead);
    assert!(report.pass);
    assert!(report.missing.is_empty());
    assert_eq!(report.completeness(), 1.0);
}

#[test]
fn test_numeric_phone_counts_as_contact() {
    let record = json!({
        "id": "L5",
        "stage": "Connected",
        "companyName": "Acme",
        "personLinkedinUrl": "https://linkedin.test/jo",
        "state": "NY",
        "segment": "Insurance",
        "name": "Jo",
        "workDirectPhone": 5551234567u64,
        "sourceChannel": "Cold Call"
    });

    let report = evaluate_value(&record);
    assert!(report.pass);

    let lead = Lead::from_value(record).unwrap();
    assert_eq!(lead.work_direct_phone.as_deref(), Some("5551234567"));
    assert_eq!(evaluate(&lead), report);
}
