use std::collections::HashSet;

use serde_json::Value;

use crate::connectors::projection::{cmp_values, eval_expr, parse_scalar_expr};
use crate::connectors::types::{coerce_value, Record};
use crate::errors::{TransformError, TransformResult};

use super::{FilterOp, TransformStep};

/// What one step did, for the execution log
#[derive(Clone, Debug)]
pub struct StepSummary {
    pub kind: &'static str,
    pub rows_dropped: usize,
}

/// Result of applying a step list to a batch
#[derive(Clone, Debug)]
pub struct TransformOutcome {
    pub rows: Vec<Record>,
    pub steps: Vec<StepSummary>,
}

impl TransformOutcome {
    /// Total rows removed by filter and dedupe steps
    pub fn rows_dropped(&self) -> usize {
        self.steps.iter().map(|s| s.rows_dropped).sum()
    }
}

/// Apply an ordered step list to a batch.
///
/// Deterministic and side-effect-free: the same rows and steps always
/// produce the same output.
pub fn apply(rows: Vec<Record>, steps: &[TransformStep]) -> TransformResult<TransformOutcome> {
    let mut rows = rows;
    let mut summaries = Vec::with_capacity(steps.len());

    for (index, step) in steps.iter().enumerate() {
        let before = rows.len();
        rows = apply_step(rows, step, index)?;
        summaries.push(StepSummary {
            kind: step.kind(),
            rows_dropped: before.saturating_sub(rows.len()),
        });
    }

    Ok(TransformOutcome {
        rows,
        steps: summaries,
    })
}

fn apply_step(
    rows: Vec<Record>,
    step: &TransformStep,
    index: usize,
) -> TransformResult<Vec<Record>> {
    match step {
        TransformStep::Trim { column } => Ok(rows
            .into_iter()
            .map(|mut row| {
                if let Some(Value::String(s)) = row.get(column) {
                    let trimmed = s.trim().to_string();
                    row.insert(column.clone(), Value::String(trimmed));
                }
                row
            })
            .collect()),

        TransformStep::Rename { from, to } => Ok(rows
            .into_iter()
            .map(|mut row| {
                if let Some(value) = row.remove(from) {
                    row.insert(to.clone(), value);
                }
                row
            })
            .collect()),

        TransformStep::Cast {
            column,
            to,
            fail_fast,
        } => {
            let target = to.as_column_type();
            let mut out = Vec::with_capacity(rows.len());
            for (row_index, mut row) in rows.into_iter().enumerate() {
                if let Some(value) = row.get(column) {
                    let coerced = coerce_value(value, target);
                    if *fail_fast && coerced.is_null() && !value.is_null() {
                        return Err(TransformError::CastFailed {
                            step: index,
                            row: row_index,
                            target: target.as_str().to_string(),
                        });
                    }
                    row.insert(column.clone(), coerced);
                }
                out.push(row);
            }
            Ok(out)
        }

        TransformStep::Filter { column, op, value } => Ok(rows
            .into_iter()
            .filter(|row| {
                let cell = row.get(column).unwrap_or(&Value::Null);
                // SQL semantics: a null cell never satisfies the predicate
                if cell.is_null() {
                    return false;
                }
                let ordering = cmp_values(cell, value);
                match op {
                    FilterOp::Eq => ordering == std::cmp::Ordering::Equal,
                    FilterOp::NotEq => ordering != std::cmp::Ordering::Equal,
                    FilterOp::Gt => ordering == std::cmp::Ordering::Greater,
                    FilterOp::GtEq => ordering != std::cmp::Ordering::Less,
                    FilterOp::Lt => ordering == std::cmp::Ordering::Less,
                    FilterOp::LtEq => ordering != std::cmp::Ordering::Greater,
                }
            })
            .collect()),

        TransformStep::Dedupe { columns } => {
            if columns.is_empty() {
                return Err(TransformError::InvalidStep {
                    step: index,
                    reason: "dedupe requires at least one key column".to_string(),
                });
            }
            let mut seen: HashSet<String> = HashSet::with_capacity(rows.len());
            Ok(rows
                .into_iter()
                .filter(|row| {
                    let key: Vec<String> = columns
                        .iter()
                        .map(|c| row.get(c).cloned().unwrap_or(Value::Null).to_string())
                        .collect();
                    seen.insert(key.join("\u{1f}"))
                })
                .collect())
        }

        TransformStep::Derive { column, expression } => {
            let expr = parse_scalar_expr(expression).map_err(|e| {
                TransformError::InvalidExpression {
                    step: index,
                    reason: e.to_string(),
                }
            })?;
            let mut out = Vec::with_capacity(rows.len());
            for mut row in rows {
                let value =
                    eval_expr(&expr, &row).map_err(|e| TransformError::InvalidExpression {
                        step: index,
                        reason: e.to_string(),
                    })?;
                row.insert(column.clone(), value);
                out.push(row);
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{parse_steps, CastType};
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> Record {
        let mut map = Record::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.clone());
        }
        map
    }

    fn customers() -> Vec<Record> {
        vec![
            record(&[("name", json!("  Ada ")), ("age", json!(36))]),
            record(&[("name", json!("Grace")), ("age", json!("45"))]),
            record(&[("name", json!("Linus")), ("age", json!(19))]),
        ]
    }

    #[test]
    fn test_trim_and_cast() {
        let steps = vec![
            TransformStep::Trim {
                column: "name".to_string(),
            },
            TransformStep::Cast {
                column: "age".to_string(),
                to: CastType::Integer,
                fail_fast: false,
            },
        ];
        let outcome = apply(customers(), &steps).unwrap();
        assert_eq!(outcome.rows[0]["name"], json!("Ada"));
        assert_eq!(outcome.rows[1]["age"], json!(45));
        assert_eq!(outcome.rows_dropped(), 0);
    }

    #[test]
    fn test_cast_non_coercible_becomes_null() {
        let rows = vec![record(&[("age", json!("unknown"))])];
        let steps = vec![TransformStep::Cast {
            column: "age".to_string(),
            to: CastType::Integer,
            fail_fast: false,
        }];
        let outcome = apply(rows, &steps).unwrap();
        assert!(outcome.rows[0]["age"].is_null());
    }

    #[test]
    fn test_cast_fail_fast() {
        let rows = vec![record(&[("age", json!("unknown"))])];
        let steps = vec![TransformStep::Cast {
            column: "age".to_string(),
            to: CastType::Integer,
            fail_fast: true,
        }];
        assert!(matches!(
            apply(rows, &steps),
            Err(TransformError::CastFailed { step: 0, row: 0, .. })
        ));
    }

    #[test]
    fn test_filter_conserves_counts() {
        let steps = vec![TransformStep::Filter {
            column: "age".to_string(),
            op: FilterOp::GtEq,
            value: json!(21),
        }];
        let input = customers();
        let input_count = input.len();
        let outcome = apply(input, &steps).unwrap();
        assert_eq!(outcome.rows.len() + outcome.rows_dropped(), input_count);
        assert_eq!(outcome.rows.len(), 2);
    }

    #[test]
    fn test_dedupe_keeps_first_in_order() {
        let rows = vec![
            record(&[("email", json!("a@x.io")), ("n", json!(1))]),
            record(&[("email", json!("b@x.io")), ("n", json!(2))]),
            record(&[("email", json!("a@x.io")), ("n", json!(3))]),
        ];
        let steps = vec![TransformStep::Dedupe {
            columns: vec!["email".to_string()],
        }];
        let outcome = apply(rows, &steps).unwrap();
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.rows[0]["n"], json!(1));
        assert_eq!(outcome.rows[1]["n"], json!(2));
        assert_eq!(outcome.rows_dropped(), 1);
    }

    #[test]
    fn test_rename_then_derive() {
        let rows = vec![record(&[("qty", json!(4)), ("price", json!(2.5))])];
        let steps = vec![
            TransformStep::Rename {
                from: "qty".to_string(),
                to: "quantity".to_string(),
            },
            TransformStep::Derive {
                column: "total".to_string(),
                expression: "quantity * price".to_string(),
            },
        ];
        let outcome = apply(rows, &steps).unwrap();
        assert_eq!(outcome.rows[0]["total"], json!(10));
        assert!(!outcome.rows[0].contains_key("qty"));
    }

    #[test]
    fn test_deterministic() {
        let steps = vec![
            TransformStep::Trim {
                column: "name".to_string(),
            },
            TransformStep::Filter {
                column: "age".to_string(),
                op: FilterOp::Gt,
                value: json!(20),
            },
        ];
        let first = apply(customers(), &steps).unwrap();
        let second = apply(customers(), &steps).unwrap();
        assert_eq!(first.rows, second.rows);
        assert_eq!(first.rows_dropped(), second.rows_dropped());
    }

    #[test]
    fn test_steps_parse_from_stored_json() {
        let json = r#"[
            {"type": "trim", "column": "name"},
            {"type": "cast", "column": "age", "to": "integer"},
            {"type": "filter", "column": "age", "op": ">=", "value": 21},
            {"type": "dedupe", "columns": ["email"]},
            {"type": "derive", "column": "total", "expression": "price * quantity"}
        ]"#;
        let steps = parse_steps(json).unwrap();
        assert_eq!(steps.len(), 5);
        assert_eq!(steps[0].kind(), "trim");
        assert_eq!(steps[4].kind(), "derive");
    }
}
