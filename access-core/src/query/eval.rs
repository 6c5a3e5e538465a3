//! In-process evaluation of conditions
//!
//! Both storage backends filter and sort rows with these functions. Sub-selects
//! must be resolved into value lists before rows are matched.

use super::condition::{Condition, SortDirection, SortField};
use super::value::Value;
use crate::store::Row;
use shared::models::Permission;
use std::cmp::Ordering;

/// Check whether `row` satisfies `condition`
pub fn matches(condition: &Condition, row: &Row) -> bool {
    match condition {
        Condition::True => true,
        Condition::False => false,
        Condition::Compare { column, op, value } => op.matches(row.get(column).compare(value)),
        Condition::In {
            column,
            values,
            negated,
        } => {
            let v = row.get(column);
            if v.is_null() {
                return false;
            }
            let found = values
                .iter()
                .any(|candidate| v.compare(candidate) == Some(Ordering::Equal));
            found != *negated
        }
        Condition::Like {
            column,
            pattern,
            case_insensitive,
        } => match row.get(column) {
            Value::Null => false,
            v => {
                let text = v.to_string();
                if *case_insensitive {
                    wildcard_match(&pattern.to_lowercase(), &text.to_lowercase())
                } else {
                    wildcard_match(pattern, &text)
                }
            }
        },
        Condition::IsNull { column, negated } => row.get(column).is_null() != *negated,
        Condition::Contains { column, value } => row
            .get(column)
            .as_str()
            .is_some_and(|text| text.contains(value.as_str())),
        Condition::And(members) => members.iter().all(|c| matches(c, row)),
        Condition::Or(members) => members.iter().any(|c| matches(c, row)),
        Condition::Not(inner) => !matches(inner, row),
        Condition::InSubSelect { sub, .. } => {
            tracing::debug!(table = %sub.table, "Unresolved sub-select treated as no match");
            false
        }
        Condition::Permitted { column, roles } => row
            .get(column)
            .as_str()
            .and_then(|raw| Permission::decode(raw).ok())
            .is_some_and(|permission| permission.is_satisfied_by(roles)),
    }
}

/// Glob match with `*` (any run) and `?` (single char)
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Compare two rows by a list of sort keys
pub fn compare_rows(a: &Row, b: &Row, sort: &[SortField]) -> Ordering {
    for field in sort {
        let ord = a.get(&field.column).sort_cmp(b.get(&field.column));
        let ord = match field.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
