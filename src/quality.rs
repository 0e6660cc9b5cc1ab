//! Lead quality gate
//!
//! Seven completeness rules over a lead's company and contact fields, evaluated
//! in a fixed order. The labels of failed rules are shown verbatim by the
//! dashboards, so both order and wording are part of the contract.
//!
//! The gate is advisory. Nothing in this crate refuses a stage change because a
//! lead fails it; collaborators call [`evaluate`] to decide whether to show a
//! "ready to promote" badge.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lead::Lead;

/// How a rule decides whether it is satisfied.
#[derive(Debug, Clone, Copy)]
enum Predicate {
    /// The field is present.
    Present(&'static str),
    /// At least one of the fields is present.
    AnyOf(&'static [&'static str]),
    /// The first field is present and at least one of the others is.
    PresentAndAnyOf(&'static str, &'static [&'static str]),
}

/// One row of the rule table.
#[derive(Debug, Clone, Copy)]
pub struct QualityRule {
    pub label: &'static str,
    predicate: Predicate,
}

/// The fixed rule table, in evaluation order.
pub const RULES: [QualityRule; 7] = [
    QualityRule {
        label: "Company Name",
        predicate: Predicate::Present("companyName"),
    },
    QualityRule {
        label: "Website or LinkedIn URL",
        predicate: Predicate::AnyOf(&["website", "companyLinkedinUrl", "personLinkedinUrl"]),
    },
    QualityRule {
        label: "State",
        predicate: Predicate::Present("state"),
    },
    QualityRule {
        label: "Segment",
        predicate: Predicate::Present("segment"),
    },
    // Equivalent to Present("name").
    QualityRule {
        label: "Decision-maker Name or Title",
        predicate: Predicate::PresentAndAnyOf("name", &["title", "name"]),
    },
    QualityRule {
        label: "Valid Email or Phone",
        predicate: Predicate::AnyOf(&["email", "workDirectPhone", "mobilePhone", "homePhone"]),
    },
    QualityRule {
        label: "Source Channel",
        predicate: Predicate::Present("sourceChannel"),
    },
];

/// Result of running the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    pub pass: bool,
    /// Labels of failed rules, in rule order
    pub missing: Vec<String>,
}

impl QualityReport {
    /// Fraction of rules satisfied, 0.0 ..= 1.0
    pub fn completeness(&self) -> f64 {
        (RULES.len() - self.missing.len()) as f64 / RULES.len() as f64
    }
}

impl QualityRule {
    fn holds(&self, present: &dyn Fn(&str) -> bool) -> bool {
        match self.predicate {
            Predicate::Present(field) => present(field),
            Predicate::AnyOf(fields) => fields.iter().any(|&f| present(f)),
            Predicate::PresentAndAnyOf(field, others) => {
                present(field) && others.iter().any(|&f| present(f))
            }
        }
    }
}

fn run(present: &dyn Fn(&str) -> bool) -> QualityReport {
    let missing: Vec<String> = RULES
        .iter()
        .filter(|rule| !rule.holds(present))
        .map(|rule| rule.label.to_string())
        .collect();

    QualityReport {
        pass: missing.is_empty(),
        missing,
    }
}

/// Evaluate a typed lead.
pub fn evaluate(lead: &Lead) -> QualityReport {
    run(&|field| {
        lead_field(lead, field)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    })
}

/// Evaluate a raw cached entity (wire field names).
pub fn evaluate_value(entity: &Value) -> QualityReport {
    run(&|field| match entity.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    })
}

fn lead_field<'a>(lead: &'a Lead, field: &str) -> Option<&'a str> {
    let value = match field {
        "companyName" => &lead.company_name,
        "website" => &lead.website,
        "companyLinkedinUrl" => &lead.company_linkedin_url,
        "personLinkedinUrl" => &lead.person_linkedin_url,
        "state" => &lead.state,
        "segment" => &lead.segment,
        "name" => &lead.name,
        "title" => &lead.title,
        "email" => &lead.email,
        "workDirectPhone" => &lead.work_direct_phone,
        "mobilePhone" => &lead.mobile_phone,
        "homePhone" => &lead.home_phone,
        "sourceChannel" => &lead.source_channel,
        _ => return None,
    };
    value.as_deref()
}
