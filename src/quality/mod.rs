//! Data quality engine
//!
//! A pure function validating a record batch against declarative rules.
//! Violations are reported structurally and never raised — deciding that a
//! FAIL-severity violation aborts the run is the worker's call, not this
//! module's. Severity is a static property of the rule, not of the data.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connectors::projection::as_f64;
use crate::connectors::types::Record;

/// Detailed violations reported per rule evaluation; the remainder is
/// summarized by count so a fully-broken batch cannot flood the log.
pub const MAX_DETAILED_VIOLATIONS: usize = 100;

/// How a violated rule affects the run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Logged, run continues
    Warn,
    /// Hard gate: the worker aborts before Load
    Fail,
}

/// Declarative rule, as stored on the pipeline record
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleKind {
    NotNull,
    /// Within-batch uniqueness
    Unique,
    Range {
        min: Option<f64>,
        max: Option<f64>,
    },
    Regex {
        pattern: String,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QualityRule {
    pub column: String,
    #[serde(flatten)]
    pub kind: RuleKind,
    pub severity: Severity,
}

/// One rule violation at one row
#[derive(Clone, Debug, Serialize)]
pub struct Violation {
    pub row_index: usize,
    pub column: String,
    pub message: String,
    pub severity: Severity,
}

/// Structured outcome of a quality run
#[derive(Clone, Debug, Default)]
pub struct QualityReport {
    /// First [`MAX_DETAILED_VIOLATIONS`] violations, in row order per rule
    pub violations: Vec<Violation>,
    /// Violations beyond the detail cap, by severity
    pub summarized_warn: usize,
    pub summarized_fail: usize,
}

impl QualityReport {
    pub fn total(&self) -> usize {
        self.violations.len() + self.summarized_warn + self.summarized_fail
    }

    pub fn fail_count(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Fail)
            .count()
            + self.summarized_fail
    }

    /// Whether any FAIL-severity rule was violated
    pub fn has_failures(&self) -> bool {
        self.fail_count() > 0
    }

    /// Distinct columns with FAIL-severity violations, for the gate message
    pub fn failed_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for violation in &self.violations {
            if violation.severity == Severity::Fail && !columns.contains(&violation.column) {
                columns.push(violation.column.clone());
            }
        }
        columns
    }

    fn push(&mut self, violation: Violation) {
        if self.violations.len() < MAX_DETAILED_VIOLATIONS {
            self.violations.push(violation);
        } else if violation.severity == Severity::Fail {
            self.summarized_fail += 1;
        } else {
            self.summarized_warn += 1;
        }
    }
}

/// Parse the rules column of a pipeline record
pub fn parse_rules(json: &str) -> Result<Vec<QualityRule>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Validate a batch against a rule set. Never errors on violations; an
/// unparseable regex is itself reported as a violation of that rule.
pub fn evaluate(rows: &[Record], rules: &[QualityRule]) -> QualityReport {
    let mut report = QualityReport::default();

    for rule in rules {
        match &rule.kind {
            RuleKind::NotNull => {
                for (index, row) in rows.iter().enumerate() {
                    let missing = match row.get(&rule.column) {
                        None => true,
                        Some(value) => value.is_null(),
                    };
                    if missing {
                        report.push(Violation {
                            row_index: index,
                            column: rule.column.clone(),
                            message: format!("null value in non-null column '{}'", rule.column),
                            severity: rule.severity,
                        });
                    }
                }
            }

            RuleKind::Unique => {
                let mut first_seen: HashMap<String, usize> = HashMap::with_capacity(rows.len());
                for (index, row) in rows.iter().enumerate() {
                    let value = row.get(&rule.column).cloned().unwrap_or(Value::Null);
                    if value.is_null() {
                        continue; // nulls are not considered duplicates of each other
                    }
                    let key = value.to_string();
                    if let Some(original) = first_seen.get(&key) {
                        report.push(Violation {
                            row_index: index,
                            column: rule.column.clone(),
                            message: format!(
                                "duplicate value {} in unique column '{}' (first at row {})",
                                key, rule.column, original
                            ),
                            severity: rule.severity,
                        });
                    } else {
                        first_seen.insert(key, index);
                    }
                }
            }

            RuleKind::Range { min, max } => {
                for (index, row) in rows.iter().enumerate() {
                    let value = match row.get(&rule.column) {
                        Some(v) if !v.is_null() => v,
                        _ => continue, // null handling belongs to not_null rules
                    };
                    match as_f64(value) {
                        Some(number) => {
                            let below = min.map(|m| number < m).unwrap_or(false);
                            let above = max.map(|m| number > m).unwrap_or(false);
                            if below || above {
                                report.push(Violation {
                                    row_index: index,
                                    column: rule.column.clone(),
                                    message: format!(
                                        "value {} outside range [{}, {}]",
                                        number,
                                        min.map(|m| m.to_string()).unwrap_or_else(|| "-inf".into()),
                                        max.map(|m| m.to_string()).unwrap_or_else(|| "inf".into()),
                                    ),
                                    severity: rule.severity,
                                });
                            }
                        }
                        None => {
                            report.push(Violation {
                                row_index: index,
                                column: rule.column.clone(),
                                message: format!(
                                    "non-numeric value in range-checked column '{}'",
                                    rule.column
                                ),
                                severity: rule.severity,
                            });
                        }
                    }
                }
            }

            RuleKind::Regex { pattern } => {
                let compiled = match Regex::new(pattern) {
                    Ok(re) => re,
                    Err(e) => {
                        report.push(Violation {
                            row_index: 0,
                            column: rule.column.clone(),
                            message: format!("invalid pattern '{pattern}': {e}"),
                            severity: rule.severity,
                        });
                        continue;
                    }
                };
                for (index, row) in rows.iter().enumerate() {
                    let value = match row.get(&rule.column).and_then(|v| v.as_str()) {
                        Some(s) => s,
                        None => continue,
                    };
                    if !compiled.is_match(value) {
                        report.push(Violation {
                            row_index: index,
                            column: rule.column.clone(),
                            message: format!(
                                "value does not match pattern for column '{}'",
                                rule.column
                            ),
                            severity: rule.severity,
                        });
                    }
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> Record {
        let mut map = Record::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.clone());
        }
        map
    }

    fn rule(column: &str, kind: RuleKind, severity: Severity) -> QualityRule {
        QualityRule {
            column: column.to_string(),
            kind,
            severity,
        }
    }

    #[test]
    fn test_not_null() {
        let rows = vec![
            record(&[("email", json!("a@x.io"))]),
            record(&[("email", Value::Null)]),
            record(&[("other", json!(1))]),
        ];
        let report = evaluate(&rows, &[rule("email", RuleKind::NotNull, Severity::Fail)]);
        assert_eq!(report.total(), 2);
        assert!(report.has_failures());
        assert_eq!(report.failed_columns(), vec!["email".to_string()]);
    }

    #[test]
    fn test_unique_within_batch() {
        let rows = vec![
            record(&[("sku", json!("A-1"))]),
            record(&[("sku", json!("A-2"))]),
            record(&[("sku", json!("A-1"))]),
            record(&[("sku", Value::Null)]),
            record(&[("sku", Value::Null)]),
        ];
        let report = evaluate(&rows, &[rule("sku", RuleKind::Unique, Severity::Warn)]);
        assert_eq!(report.total(), 1);
        assert_eq!(report.violations[0].row_index, 2);
        assert!(!report.has_failures());
    }

    #[test]
    fn test_range_bounds() {
        let rows = vec![
            record(&[("age", json!(17))]),
            record(&[("age", json!(30))]),
            record(&[("age", json!(210))]),
            record(&[("age", json!("abc"))]),
        ];
        let report = evaluate(
            &rows,
            &[rule(
                "age",
                RuleKind::Range {
                    min: Some(18.0),
                    max: Some(120.0),
                },
                Severity::Fail,
            )],
        );
        assert_eq!(report.total(), 3);
    }

    #[test]
    fn test_regex_rule() {
        let rows = vec![
            record(&[("email", json!("ada@example.com"))]),
            record(&[("email", json!("not-an-email"))]),
        ];
        let report = evaluate(
            &rows,
            &[rule(
                "email",
                RuleKind::Regex {
                    pattern: "^[^@]+@[^@]+\\.[^@]+$".to_string(),
                },
                Severity::Warn,
            )],
        );
        assert_eq!(report.total(), 1);
        assert_eq!(report.violations[0].row_index, 1);
    }

    #[test]
    fn test_violations_are_capped() {
        let rows: Vec<Record> = (0..250)
            .map(|_| record(&[("v", Value::Null)]))
            .collect();
        let report = evaluate(&rows, &[rule("v", RuleKind::NotNull, Severity::Fail)]);
        assert_eq!(report.violations.len(), MAX_DETAILED_VIOLATIONS);
        assert_eq!(report.summarized_fail, 150);
        assert_eq!(report.total(), 250);
        assert_eq!(report.fail_count(), 250);
    }

    #[test]
    fn test_rules_parse_from_stored_json() {
        let json = r#"[
            {"column": "email", "rule": "not_null", "severity": "fail"},
            {"column": "sku", "rule": "unique", "severity": "warn"},
            {"column": "age", "rule": "range", "min": 0, "max": 120, "severity": "fail"},
            {"column": "email", "rule": "regex", "pattern": ".+@.+", "severity": "warn"}
        ]"#;
        let rules = parse_rules(json).unwrap();
        assert_eq!(rules.len(), 4);
        assert_eq!(rules[0].severity, Severity::Fail);
        assert!(matches!(rules[2].kind, RuleKind::Range { .. }));
    }
}
