//! Backend-neutral filter, sort and page descriptor

use super::value::Value;
use shared::models::Role;
use std::cmp::Ordering;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "ge" => Some(Self::Ge),
            "lt" => Some(Self::Lt),
            "le" => Some(Self::Le),
            _ => None,
        }
    }

    /// Apply to an ordering, `None` (incomparable) never matches
    pub fn matches(&self, ordering: Option<Ordering>) -> bool {
        let Some(ord) = ordering else {
            return false;
        };
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Ne => ord != Ordering::Equal,
            Self::Gt => ord == Ordering::Greater,
            Self::Ge => ord != Ordering::Less,
            Self::Lt => ord == Ordering::Less,
            Self::Le => ord != Ordering::Greater,
        }
    }
}

/// Nested query producing a set of values for `IN`
#[derive(Debug, Clone, PartialEq)]
pub struct SubSelect {
    pub table: String,
    pub select_column: String,
    pub condition: Box<Condition>,
}

impl SubSelect {
    pub fn new(table: impl Into<String>, select_column: impl Into<String>, condition: Condition) -> Self {
        Self {
            table: table.into(),
            select_column: select_column.into(),
            condition: Box::new(condition),
        }
    }
}

/// Predicate tree over physical columns
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    True,
    False,
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// `*` and `?` wildcards
    Like {
        column: String,
        pattern: String,
        case_insensitive: bool,
    },
    IsNull {
        column: String,
        negated: bool,
    },
    /// Substring match on text columns
    Contains {
        column: String,
        value: String,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    InSubSelect {
        column: String,
        sub: SubSelect,
        negated: bool,
    },
    /// Row carries an encoded permission in `column` that `roles` must satisfy
    Permitted {
        column: String,
        roles: BTreeSet<Role>,
    },
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Compare {
            column: column.into(),
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn in_values(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In {
            column: column.into(),
            values,
            negated: false,
        }
    }

    pub fn in_sub_select(column: impl Into<String>, sub: SubSelect) -> Self {
        Self::InSubSelect {
            column: column.into(),
            sub,
            negated: false,
        }
    }

    /// Conjunction with trivial members folded away
    pub fn and_all(conditions: impl IntoIterator<Item = Condition>) -> Self {
        let mut members = Vec::new();
        for c in conditions {
            match c {
                Condition::True => {}
                Condition::False => return Condition::False,
                Condition::And(inner) => members.extend(inner),
                other => members.push(other),
            }
        }
        match members.len() {
            0 => Condition::True,
            1 => members.remove(0),
            _ => Condition::And(members),
        }
    }

    /// Disjunction with trivial members folded away
    pub fn or_all(conditions: impl IntoIterator<Item = Condition>) -> Self {
        let mut members = Vec::new();
        for c in conditions {
            match c {
                Condition::False => {}
                Condition::True => return Condition::True,
                Condition::Or(inner) => members.extend(inner),
                other => members.push(other),
            }
        }
        match members.len() {
            0 => Condition::False,
            1 => members.remove(0),
            _ => Condition::Or(members),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Condition::True => Condition::False,
            Condition::False => Condition::True,
            Condition::Not(inner) => *inner,
            other => Condition::Not(Box::new(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub column: String,
    pub direction: SortDirection,
}

impl SortField {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Limit and offset, always present together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

impl Page {
    pub fn new(limit: u64, offset: u64) -> Self {
        Self { limit, offset }
    }
}

/// Filter, ordering and pagination
///
/// Only a condition, no sort or limit, means unbounded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionSortLimit {
    pub condition: Option<Condition>,
    pub sort: Vec<SortField>,
    pub page: Option<Page>,
}

impl ConditionSortLimit {
    pub fn new(condition: Option<Condition>, sort: Vec<SortField>, page: Option<Page>) -> Self {
        Self {
            condition,
            sort,
            page,
        }
    }

    /// Condition and sort only, no limit or offset
    pub fn with_null_limit_offset(condition: Option<Condition>, sort: Vec<SortField>) -> Self {
        Self::new(condition, sort, None)
    }

    /// Unbounded, matches every row
    pub fn all() -> Self {
        Self::default()
    }

    pub fn from_condition(condition: Condition) -> Self {
        Self::new(Some(condition), Vec::new(), None)
    }

    /// Effective condition, `True` when absent
    pub fn condition_or_true(&self) -> Condition {
        self.condition.clone().unwrap_or(Condition::True)
    }

    /// Add `extra` to the condition with AND
    pub fn restrict(mut self, extra: Condition) -> Self {
        self.condition = Some(Condition::and_all([self.condition_or_true(), extra]));
        self
    }

    pub fn limit(&self) -> Option<u64> {
        self.page.map(|p| p.limit)
    }

    pub fn offset(&self) -> Option<u64> {
        self.page.map(|p| p.offset)
    }
}
