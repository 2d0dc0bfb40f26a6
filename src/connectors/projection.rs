//! Embedded SQL evaluator for sources with no native SQL engine
//!
//! GraphQL and CRM connectors receive ordinary SQL text from callers. This
//! module parses that text once into a [`SelectPlan`] (so the connector knows
//! which collection and fields to fetch from the origin) and then applies the
//! projection, predicate, aggregation, ordering and limit against the fetched
//! in-memory record set. Both connectors share this one evaluator; none of
//! them carries its own SQL-string handling.
//!
//! Supported surface: single-table SELECT with column lists, `*`, aliases,
//! WHERE (`=`, `!=`, `<`, `<=`, `>`, `>=`, AND/OR/NOT, IS [NOT] NULL, LIKE),
//! arithmetic and `||` in scalar expressions, ungrouped COUNT/SUM/AVG/MIN/MAX,
//! ORDER BY, LIMIT and OFFSET. Anything else is rejected as
//! [`ConnectorError::UnsupportedSql`] before any I/O happens.

use std::cmp::Ordering;

use serde_json::Value as JsonValue;
use sqlparser::ast::{
    BinaryOperator, Expr, FunctionArg, FunctionArgExpr, GroupByExpr, OrderByExpr, Select,
    SelectItem, SetExpr, Statement, TableFactor, UnaryOperator, Value as SqlValue,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::errors::{ConnectorError, ConnectorResult};

use super::types::{QueryResult, Record};

static DIALECT: GenericDialect = GenericDialect {};

/// Aggregate functions the evaluator understands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggregateFunc::Count),
            "SUM" => Some(AggregateFunc::Sum),
            "AVG" => Some(AggregateFunc::Avg),
            "MIN" => Some(AggregateFunc::Min),
            "MAX" => Some(AggregateFunc::Max),
            _ => None,
        }
    }
}

/// One aggregate in the SELECT list
#[derive(Clone, Debug)]
pub struct AggregateSpec {
    pub func: AggregateFunc,
    /// None for `COUNT(*)`
    pub column: Option<String>,
    /// Output column name
    pub alias: String,
}

/// One scalar column in the SELECT list
#[derive(Clone, Debug)]
pub struct ProjectedColumn {
    pub expr: Expr,
    /// Output column name
    pub alias: String,
}

/// What the SELECT list asks for
#[derive(Clone, Debug)]
pub enum Projection {
    Wildcard,
    Columns(Vec<ProjectedColumn>),
    Aggregates(Vec<AggregateSpec>),
}

/// Parsed form of an incoming SELECT statement
#[derive(Clone, Debug)]
pub struct SelectPlan {
    /// Target table or collection name
    pub collection: String,
    pub projection: Projection,
    pub predicate: Option<Expr>,
    /// (column, ascending) pairs in ORDER BY order
    pub order_by: Vec<(String, bool)>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SelectPlan {
    /// Column names the plan reads, or None when a wildcard forces a full
    /// fetch. Connectors use this to restrict what they request from the
    /// origin.
    pub fn referenced_columns(&self) -> Option<Vec<String>> {
        let mut columns: Vec<String> = Vec::new();

        match &self.projection {
            Projection::Wildcard => return None,
            Projection::Columns(cols) => {
                for col in cols {
                    collect_identifiers(&col.expr, &mut columns);
                }
            }
            Projection::Aggregates(aggs) => {
                for agg in aggs {
                    if let Some(column) = &agg.column {
                        push_unique(&mut columns, column.clone());
                    }
                }
            }
        }

        if let Some(predicate) = &self.predicate {
            collect_identifiers(predicate, &mut columns);
        }
        for (column, _) in &self.order_by {
            push_unique(&mut columns, column.clone());
        }

        Some(columns)
    }
}

/// Parse SQL text into a [`SelectPlan`]
pub fn parse_select(sql: &str) -> ConnectorResult<SelectPlan> {
    let statements = Parser::parse_sql(&DIALECT, sql)
        .map_err(|e| ConnectorError::MalformedSql(e.to_string()))?;

    let query = match statements.as_slice() {
        [Statement::Query(query)] => query,
        [] => return Err(ConnectorError::MalformedSql("empty statement".to_string())),
        [_] => {
            return Err(ConnectorError::UnsupportedSql(
                "only SELECT statements are supported".to_string(),
            ))
        }
        _ => {
            return Err(ConnectorError::UnsupportedSql(
                "multiple statements are not supported".to_string(),
            ))
        }
    };

    let select = match query.body.as_ref() {
        SetExpr::Select(select) => select,
        _ => {
            return Err(ConnectorError::UnsupportedSql(
                "set operations and VALUES are not supported".to_string(),
            ))
        }
    };

    let collection = extract_collection(select)?;
    let projection = extract_projection(select)?;

    match &select.group_by {
        GroupByExpr::Expressions(exprs) if !exprs.is_empty() => {
            return Err(ConnectorError::UnsupportedSql(
                "GROUP BY is not supported".to_string(),
            ))
        }
        GroupByExpr::All => {
            return Err(ConnectorError::UnsupportedSql(
                "GROUP BY is not supported".to_string(),
            ))
        }
        _ => {}
    }
    if select.having.is_some() {
        return Err(ConnectorError::UnsupportedSql(
            "HAVING is not supported".to_string(),
        ));
    }
    if select.distinct.is_some() {
        return Err(ConnectorError::UnsupportedSql(
            "DISTINCT is not supported".to_string(),
        ));
    }

    let order_by = extract_order_by(&query.order_by)?;
    let limit = match &query.limit {
        Some(expr) => Some(expr_as_usize(expr)?),
        None => None,
    };
    let offset = match &query.offset {
        Some(offset) => expr_as_usize(&offset.value)?,
        None => 0,
    };

    Ok(SelectPlan {
        collection,
        projection,
        predicate: select.selection.clone(),
        order_by,
        limit,
        offset,
    })
}

/// Apply SQL semantics to an in-memory record set.
///
/// The result's column set always matches the requested projection, even
/// when the input rows carry extra fields.
pub fn execute_projection(rows: &[Record], sql: &str) -> ConnectorResult<QueryResult> {
    let plan = parse_select(sql)?;
    execute_plan(rows, &plan)
}

/// Apply an already-parsed plan to an in-memory record set
pub fn execute_plan(rows: &[Record], plan: &SelectPlan) -> ConnectorResult<QueryResult> {
    let started = std::time::Instant::now();

    let mut filtered: Vec<&Record> = Vec::with_capacity(rows.len());
    for row in rows {
        let keep = match &plan.predicate {
            Some(predicate) => is_truthy(&eval_expr(predicate, row)?),
            None => true,
        };
        if keep {
            filtered.push(row);
        }
    }

    if let Projection::Aggregates(aggs) = &plan.projection {
        let mut out = Record::new();
        let mut columns = Vec::with_capacity(aggs.len());
        for agg in aggs {
            out.insert(agg.alias.clone(), compute_aggregate(agg, &filtered));
            columns.push(agg.alias.clone());
        }
        return Ok(QueryResult::new(
            columns,
            vec![out],
            started.elapsed().as_millis() as u64,
        ));
    }

    if !plan.order_by.is_empty() {
        filtered.sort_by(|a, b| {
            for (column, asc) in &plan.order_by {
                let ord = cmp_values(
                    a.get(column).unwrap_or(&JsonValue::Null),
                    b.get(column).unwrap_or(&JsonValue::Null),
                );
                let ord = if *asc { ord } else { ord.reverse() };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    let window: Vec<&Record> = filtered
        .into_iter()
        .skip(plan.offset)
        .take(plan.limit.unwrap_or(usize::MAX))
        .collect();

    let (columns, projected) = match &plan.projection {
        Projection::Wildcard => {
            let mut columns: Vec<String> = Vec::new();
            for row in &window {
                for key in row.keys() {
                    push_unique(&mut columns, key.clone());
                }
            }
            let projected = window
                .iter()
                .map(|row| {
                    let mut out = Record::new();
                    for column in &columns {
                        out.insert(
                            column.clone(),
                            row.get(column).cloned().unwrap_or(JsonValue::Null),
                        );
                    }
                    out
                })
                .collect();
            (columns, projected)
        }
        Projection::Columns(cols) => {
            let columns: Vec<String> = cols.iter().map(|c| c.alias.clone()).collect();
            let mut projected = Vec::with_capacity(window.len());
            for &row in &window {
                let mut out = Record::new();
                for col in cols {
                    out.insert(col.alias.clone(), eval_expr(&col.expr, row)?);
                }
                projected.push(out);
            }
            (columns, projected)
        }
        Projection::Aggregates(_) => unreachable!("handled above"),
    };

    Ok(QueryResult::new(
        columns,
        projected,
        started.elapsed().as_millis() as u64,
    ))
}

/// Parse a bare scalar expression (the transform engine's derive step)
pub fn parse_scalar_expr(text: &str) -> ConnectorResult<Expr> {
    let mut parser = Parser::new(&DIALECT)
        .try_with_sql(text)
        .map_err(|e| ConnectorError::MalformedSql(e.to_string()))?;
    parser
        .parse_expr()
        .map_err(|e| ConnectorError::MalformedSql(e.to_string()))
}

/// Evaluate a scalar expression against one record
pub fn eval_expr(expr: &Expr, row: &Record) -> ConnectorResult<JsonValue> {
    match expr {
        Expr::Identifier(ident) => Ok(row.get(&ident.value).cloned().unwrap_or(JsonValue::Null)),
        Expr::CompoundIdentifier(parts) => {
            let name = parts
                .last()
                .map(|i| i.value.clone())
                .unwrap_or_default();
            Ok(row.get(&name).cloned().unwrap_or(JsonValue::Null))
        }
        Expr::Value(value) => sql_value_to_json(value),
        Expr::Nested(inner) => eval_expr(inner, row),
        Expr::IsNull(inner) => Ok(JsonValue::Bool(eval_expr(inner, row)?.is_null())),
        Expr::IsNotNull(inner) => Ok(JsonValue::Bool(!eval_expr(inner, row)?.is_null())),
        Expr::UnaryOp { op, expr } => {
            let operand = eval_expr(expr, row)?;
            match op {
                UnaryOperator::Not => Ok(JsonValue::Bool(!is_truthy(&operand))),
                UnaryOperator::Minus => as_f64(&operand)
                    .map(|f| json_number(-f))
                    .ok_or_else(|| {
                        ConnectorError::UnsupportedSql("unary minus on non-number".to_string())
                    }),
                UnaryOperator::Plus => Ok(operand),
                other => Err(ConnectorError::UnsupportedSql(format!(
                    "unary operator {other}"
                ))),
            }
        }
        Expr::BinaryOp { left, op, right } => {
            eval_binary_op(&eval_expr(left, row)?, op, &eval_expr(right, row)?)
        }
        Expr::Like {
            negated,
            expr,
            pattern,
            ..
        } => {
            let value = eval_expr(expr, row)?;
            let pattern = eval_expr(pattern, row)?;
            let matched = match (value.as_str(), pattern.as_str()) {
                (Some(v), Some(p)) => like_match(v, p),
                _ => false,
            };
            Ok(JsonValue::Bool(matched != *negated))
        }
        Expr::Function(func) => eval_scalar_function(func, row),
        other => Err(ConnectorError::UnsupportedSql(format!(
            "expression {other}"
        ))),
    }
}

fn eval_binary_op(
    left: &JsonValue,
    op: &BinaryOperator,
    right: &JsonValue,
) -> ConnectorResult<JsonValue> {
    match op {
        BinaryOperator::And => Ok(JsonValue::Bool(is_truthy(left) && is_truthy(right))),
        BinaryOperator::Or => Ok(JsonValue::Bool(is_truthy(left) || is_truthy(right))),
        BinaryOperator::Eq
        | BinaryOperator::NotEq
        | BinaryOperator::Lt
        | BinaryOperator::LtEq
        | BinaryOperator::Gt
        | BinaryOperator::GtEq => {
            // SQL comparison with NULL never holds
            if left.is_null() || right.is_null() {
                return Ok(JsonValue::Bool(false));
            }
            let ordering = cmp_values(left, right);
            let holds = match op {
                BinaryOperator::Eq => ordering == Ordering::Equal,
                BinaryOperator::NotEq => ordering != Ordering::Equal,
                BinaryOperator::Lt => ordering == Ordering::Less,
                BinaryOperator::LtEq => ordering != Ordering::Greater,
                BinaryOperator::Gt => ordering == Ordering::Greater,
                BinaryOperator::GtEq => ordering != Ordering::Less,
                _ => unreachable!(),
            };
            Ok(JsonValue::Bool(holds))
        }
        BinaryOperator::Plus
        | BinaryOperator::Minus
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Modulo => {
            let (a, b) = match (as_f64(left), as_f64(right)) {
                (Some(a), Some(b)) => (a, b),
                _ => return Ok(JsonValue::Null),
            };
            let result = match op {
                BinaryOperator::Plus => a + b,
                BinaryOperator::Minus => a - b,
                BinaryOperator::Multiply => a * b,
                BinaryOperator::Divide => {
                    if b == 0.0 {
                        return Ok(JsonValue::Null);
                    }
                    a / b
                }
                BinaryOperator::Modulo => {
                    if b == 0.0 {
                        return Ok(JsonValue::Null);
                    }
                    a % b
                }
                _ => unreachable!(),
            };
            Ok(json_number(result))
        }
        BinaryOperator::StringConcat => {
            let concat = format!("{}{}", stringify(left), stringify(right));
            Ok(JsonValue::String(concat))
        }
        other => Err(ConnectorError::UnsupportedSql(format!(
            "binary operator {other}"
        ))),
    }
}

fn eval_scalar_function(
    func: &sqlparser::ast::Function,
    row: &Record,
) -> ConnectorResult<JsonValue> {
    let name = func.name.to_string().to_ascii_uppercase();
    let mut args = Vec::new();
    for arg in &func.args {
        match arg {
            FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => args.push(eval_expr(expr, row)?),
            _ => {
                return Err(ConnectorError::UnsupportedSql(format!(
                    "argument form in {name}()"
                )))
            }
        }
    }

    match (name.as_str(), args.as_slice()) {
        ("UPPER", [JsonValue::String(s)]) => Ok(JsonValue::String(s.to_uppercase())),
        ("LOWER", [JsonValue::String(s)]) => Ok(JsonValue::String(s.to_lowercase())),
        ("LENGTH", [JsonValue::String(s)]) => Ok(JsonValue::from(s.chars().count() as i64)),
        ("ABS", [v]) => Ok(as_f64(v).map(|f| json_number(f.abs())).unwrap_or(JsonValue::Null)),
        ("ROUND", [v]) => Ok(as_f64(v).map(|f| json_number(f.round())).unwrap_or(JsonValue::Null)),
        ("COALESCE", _) => Ok(args
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(JsonValue::Null)),
        ("CONCAT", _) => Ok(JsonValue::String(
            args.iter().map(stringify).collect::<String>(),
        )),
        _ => Err(ConnectorError::UnsupportedSql(format!("function {name}()"))),
    }
}

fn compute_aggregate(spec: &AggregateSpec, rows: &[&Record]) -> JsonValue {
    let values = || {
        rows.iter().filter_map(|row| {
            spec.column
                .as_ref()
                .and_then(|c| row.get(c))
                .filter(|v| !v.is_null())
        })
    };

    match spec.func {
        AggregateFunc::Count => match &spec.column {
            None => JsonValue::from(rows.len() as i64),
            Some(_) => JsonValue::from(values().count() as i64),
        },
        AggregateFunc::Sum => {
            json_number(values().filter_map(as_f64).sum::<f64>())
        }
        AggregateFunc::Avg => {
            let nums: Vec<f64> = values().filter_map(as_f64).collect();
            if nums.is_empty() {
                JsonValue::Null
            } else {
                json_number(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        AggregateFunc::Min => values()
            .min_by(|a, b| cmp_values(*a, *b))
            .cloned()
            .unwrap_or(JsonValue::Null),
        AggregateFunc::Max => values()
            .max_by(|a, b| cmp_values(*a, *b))
            .cloned()
            .unwrap_or(JsonValue::Null),
    }
}

fn extract_collection(select: &Select) -> ConnectorResult<String> {
    if select.from.len() != 1 {
        return Err(ConnectorError::UnsupportedSql(
            "exactly one FROM table is required".to_string(),
        ));
    }
    if !select.from[0].joins.is_empty() {
        return Err(ConnectorError::UnsupportedSql(
            "JOIN is not supported".to_string(),
        ));
    }
    match &select.from[0].relation {
        TableFactor::Table { name, .. } => {
            // last segment of a possibly schema-qualified name
            Ok(name
                .0
                .last()
                .map(|i| i.value.clone())
                .unwrap_or_default())
        }
        _ => Err(ConnectorError::UnsupportedSql(
            "subqueries in FROM are not supported".to_string(),
        )),
    }
}

fn extract_projection(select: &Select) -> ConnectorResult<Projection> {
    let mut aggregates = Vec::new();
    let mut columns = Vec::new();
    let mut saw_wildcard = false;

    for item in &select.projection {
        match item {
            SelectItem::Wildcard(_) => saw_wildcard = true,
            SelectItem::QualifiedWildcard(..) => saw_wildcard = true,
            SelectItem::UnnamedExpr(expr) => {
                if let Some(agg) = try_aggregate(expr, None)? {
                    aggregates.push(agg);
                } else {
                    columns.push(ProjectedColumn {
                        alias: default_alias(expr),
                        expr: expr.clone(),
                    });
                }
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                if let Some(agg) = try_aggregate(expr, Some(alias.value.clone()))? {
                    aggregates.push(agg);
                } else {
                    columns.push(ProjectedColumn {
                        alias: alias.value.clone(),
                        expr: expr.clone(),
                    });
                }
            }
        }
    }

    if !aggregates.is_empty() {
        if saw_wildcard || !columns.is_empty() {
            return Err(ConnectorError::UnsupportedSql(
                "cannot mix aggregates with plain columns without GROUP BY".to_string(),
            ));
        }
        return Ok(Projection::Aggregates(aggregates));
    }
    if saw_wildcard {
        if !columns.is_empty() {
            return Err(ConnectorError::UnsupportedSql(
                "cannot mix * with explicit columns".to_string(),
            ));
        }
        return Ok(Projection::Wildcard);
    }
    Ok(Projection::Columns(columns))
}

fn try_aggregate(expr: &Expr, alias: Option<String>) -> ConnectorResult<Option<AggregateSpec>> {
    let func = match expr {
        Expr::Function(func) => func,
        _ => return Ok(None),
    };
    let agg = match AggregateFunc::from_name(&func.name.to_string()) {
        Some(agg) => agg,
        None => return Ok(None),
    };

    let column = match func.args.as_slice() {
        [FunctionArg::Unnamed(FunctionArgExpr::Wildcard)] => None,
        [FunctionArg::Unnamed(FunctionArgExpr::Expr(Expr::Identifier(ident)))] => {
            Some(ident.value.clone())
        }
        [FunctionArg::Unnamed(FunctionArgExpr::Expr(Expr::CompoundIdentifier(parts)))] => {
            parts.last().map(|i| i.value.clone())
        }
        _ => {
            return Err(ConnectorError::UnsupportedSql(format!(
                "aggregate arguments in {}",
                func.name
            )))
        }
    };

    if column.is_none() && agg != AggregateFunc::Count {
        return Err(ConnectorError::UnsupportedSql(format!(
            "{:?}(*) is not valid",
            agg
        )));
    }

    let alias = alias.unwrap_or_else(|| default_alias(expr));
    Ok(Some(AggregateSpec { func: agg, column, alias }))
}

fn extract_order_by(order_by: &[OrderByExpr]) -> ConnectorResult<Vec<(String, bool)>> {
    let mut out = Vec::with_capacity(order_by.len());
    for item in order_by {
        let column = match &item.expr {
            Expr::Identifier(ident) => ident.value.clone(),
            Expr::CompoundIdentifier(parts) => {
                parts.last().map(|i| i.value.clone()).unwrap_or_default()
            }
            other => {
                return Err(ConnectorError::UnsupportedSql(format!(
                    "ORDER BY expression {other}"
                )))
            }
        };
        out.push((column, item.asc.unwrap_or(true)));
    }
    Ok(out)
}

fn expr_as_usize(expr: &Expr) -> ConnectorResult<usize> {
    match expr {
        Expr::Value(SqlValue::Number(n, _)) => n
            .parse::<usize>()
            .map_err(|_| ConnectorError::MalformedSql(format!("invalid count: {n}"))),
        other => Err(ConnectorError::UnsupportedSql(format!(
            "LIMIT/OFFSET expression {other}"
        ))),
    }
}

fn default_alias(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(parts) => {
            parts.last().map(|i| i.value.clone()).unwrap_or_default()
        }
        other => other.to_string(),
    }
}

fn collect_identifiers(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Identifier(ident) => push_unique(out, ident.value.clone()),
        Expr::CompoundIdentifier(parts) => {
            if let Some(last) = parts.last() {
                push_unique(out, last.value.clone());
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_identifiers(left, out);
            collect_identifiers(right, out);
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) => collect_identifiers(expr, out),
        Expr::IsNull(expr) | Expr::IsNotNull(expr) => collect_identifiers(expr, out),
        Expr::Like { expr, pattern, .. } => {
            collect_identifiers(expr, out);
            collect_identifiers(pattern, out);
        }
        Expr::Function(func) => {
            for arg in &func.args {
                if let FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) = arg {
                    collect_identifiers(expr, out);
                }
            }
        }
        _ => {}
    }
}

fn push_unique(columns: &mut Vec<String>, column: String) {
    if !columns.contains(&column) {
        columns.push(column);
    }
}

fn sql_value_to_json(value: &SqlValue) -> ConnectorResult<JsonValue> {
    match value {
        SqlValue::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(JsonValue::from(i))
            } else {
                n.parse::<f64>()
                    .map(json_number)
                    .map_err(|_| ConnectorError::MalformedSql(format!("invalid number: {n}")))
            }
        }
        SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => {
            Ok(JsonValue::String(s.clone()))
        }
        SqlValue::Boolean(b) => Ok(JsonValue::Bool(*b)),
        SqlValue::Null => Ok(JsonValue::Null),
        other => Err(ConnectorError::UnsupportedSql(format!("literal {other}"))),
    }
}

/// Total order over JSON values: null < numbers < strings < bools
pub fn cmp_values(a: &JsonValue, b: &JsonValue) -> Ordering {
    match (a, b) {
        (JsonValue::Null, JsonValue::Null) => Ordering::Equal,
        (JsonValue::Null, _) => Ordering::Less,
        (_, JsonValue::Null) => Ordering::Greater,
        (JsonValue::Number(_), JsonValue::Number(_)) => {
            let a = as_f64(a).unwrap_or(f64::NAN);
            let b = as_f64(b).unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (JsonValue::String(a), JsonValue::String(b)) => a.cmp(b),
        (JsonValue::Bool(a), JsonValue::Bool(b)) => a.cmp(b),
        // numeric string vs number: compare numerically when possible
        (JsonValue::String(_), JsonValue::Number(_)) | (JsonValue::Number(_), JsonValue::String(_)) => {
            match (as_f64(a), as_f64(b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => stringify(a).cmp(&stringify(b)),
            }
        }
        _ => stringify(a).cmp(&stringify(b)),
    }
}

pub fn as_f64(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn is_truthy(value: &JsonValue) -> bool {
    matches!(value, JsonValue::Bool(true))
}

fn stringify(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_number(f: f64) -> JsonValue {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        JsonValue::from(f as i64)
    } else {
        serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

/// SQL LIKE with `%` and `_` wildcards
fn like_match(value: &str, pattern: &str) -> bool {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    regex::Regex::new(&regex)
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}
