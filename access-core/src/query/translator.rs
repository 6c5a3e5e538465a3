//! Lowering of query ASTs to [`ConditionSortLimit`]
//!
//! Three lookup tables drive the translation:
//! - alias map: logical property to physical column
//! - sub-select map: logical property to a resolver producing a nested query
//! - value converters: logical property to a literal transform
//!
//! The default tables are shared behind `Arc` and never mutated. A call site
//! that needs more mappings gets a new translator from [`QueryTranslator::extend`].

use super::ast::{AstArg, AstNode};
use super::condition::{CompareOp, Condition, ConditionSortLimit, Page, SortField};
use super::parser::parse_query;
use super::value::Value;
use crate::error::{CoreError, CoreResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Resolves a comparison on a logical property into a (usually nested) condition
pub type SubSelectFn = Arc<dyn Fn(&str, &[Value]) -> CoreResult<Condition> + Send + Sync>;

/// Transforms a literal before it is compared
pub type ValueConverter = Arc<dyn Fn(Value) -> Value + Send + Sync>;

pub type AliasMap = HashMap<String, String>;
pub type SubSelectMap = HashMap<String, SubSelectFn>;
pub type ValueConverterMap = HashMap<String, ValueConverter>;

/// Booleans stored as `Y`/`N` characters
pub static BOOLEAN_VALUE_CONVERTER: LazyLock<ValueConverter> = LazyLock::new(|| {
    let converter: ValueConverter = Arc::new(|value: Value| match value {
        Value::Bool(b) => Value::Text(if b { "Y" } else { "N" }.to_string()),
        Value::Text(ref s) if s.eq_ignore_ascii_case("true") => Value::Text("Y".into()),
        Value::Text(ref s) if s.eq_ignore_ascii_case("false") => Value::Text("N".into()),
        other => other,
    });
    converter
});

#[derive(Clone, Default)]
pub struct QueryTranslator {
    alias_map: Arc<AliasMap>,
    sub_select_map: Arc<SubSelectMap>,
    value_converters: Arc<ValueConverterMap>,
}

impl fmt::Debug for QueryTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut aliases: Vec<&String> = self.alias_map.keys().collect();
        aliases.sort();
        let mut sub_selects: Vec<&String> = self.sub_select_map.keys().collect();
        sub_selects.sort();
        f.debug_struct("QueryTranslator")
            .field("aliases", &aliases)
            .field("sub_selects", &sub_selects)
            .field("converters", &self.value_converters.len())
            .finish()
    }
}

impl QueryTranslator {
    pub fn new(
        alias_map: AliasMap,
        sub_select_map: SubSelectMap,
        value_converters: ValueConverterMap,
    ) -> Self {
        Self {
            alias_map: Arc::new(alias_map),
            sub_select_map: Arc::new(sub_select_map),
            value_converters: Arc::new(value_converters),
        }
    }

    /// New translator with extra mappings layered over this one
    ///
    /// Extra entries win over existing ones. Tables without extra entries
    /// keep sharing the same allocation.
    pub fn extend(
        &self,
        alias_map: AliasMap,
        sub_select_map: SubSelectMap,
        value_converters: ValueConverterMap,
    ) -> Self {
        Self {
            alias_map: combine(&self.alias_map, alias_map),
            sub_select_map: combine(&self.sub_select_map, sub_select_map),
            value_converters: combine(&self.value_converters, value_converters),
        }
    }

    pub fn alias_map(&self) -> &AliasMap {
        &self.alias_map
    }

    pub fn sub_select_map(&self) -> &SubSelectMap {
        &self.sub_select_map
    }

    pub fn value_converters(&self) -> &ValueConverterMap {
        &self.value_converters
    }

    /// Parse and translate a query string
    pub fn translate_query(&self, query: &str) -> CoreResult<ConditionSortLimit> {
        let node = parse_query(query)?;
        self.translate(&node)
    }

    /// Translate a parsed query
    ///
    /// `sort()` and `limit()` are only recognised at the top level, either as
    /// the root node or as direct children of the root `and()`.
    pub fn translate(&self, node: &AstNode) -> CoreResult<ConditionSortLimit> {
        let mut sort = Vec::new();
        let mut page = None;
        let mut conditions = Vec::new();

        let top: Vec<&AstNode> = if node.name == "and" {
            node.args
                .iter()
                .map(|a| match a {
                    AstArg::Node(n) => Ok(n),
                    other => Err(CoreError::QuerySyntax(format!(
                        "and() expects operators, got {}",
                        other
                    ))),
                })
                .collect::<CoreResult<_>>()?
        } else {
            vec![node]
        };

        for child in top {
            match child.name.as_str() {
                "sort" => sort.extend(self.translate_sort(child)?),
                "limit" => page = Some(translate_limit(child)?),
                _ => conditions.push(self.translate_condition(child)?),
            }
        }

        let condition = if conditions.is_empty() {
            None
        } else {
            Some(Condition::and_all(conditions))
        };
        Ok(ConditionSortLimit::new(condition, sort, page))
    }

    /// Translate a filter node
    pub fn translate_condition(&self, node: &AstNode) -> CoreResult<Condition> {
        match node.name.as_str() {
            "and" => Ok(Condition::and_all(self.translate_children(node)?)),
            "or" => Ok(Condition::or_all(self.translate_children(node)?)),
            "not" => {
                let mut children = self.translate_children(node)?;
                if children.len() != 1 {
                    return Err(CoreError::QuerySyntax("not() takes one operator".into()));
                }
                Ok(children.remove(0).negate())
            }
            "sort" | "limit" => Err(CoreError::QuerySyntax(format!(
                "{}() is only allowed at the top level",
                node.name
            ))),
            _ => self.translate_property_op(node),
        }
    }

    fn translate_children(&self, node: &AstNode) -> CoreResult<Vec<Condition>> {
        node.args
            .iter()
            .map(|a| match a {
                AstArg::Node(n) => self.translate_condition(n),
                other => Err(CoreError::QuerySyntax(format!(
                    "{}() expects operators, got {}",
                    node.name, other
                ))),
            })
            .collect()
    }

    fn translate_property_op(&self, node: &AstNode) -> CoreResult<Condition> {
        let op = node.name.as_str();
        let property = node
            .value_arg(0)
            .map(ToString::to_string)
            .ok_or_else(|| CoreError::QuerySyntax(format!("{}() requires a property", op)))?;
        let args = self.literal_args(node, &property)?;

        if let Some(resolver) = self.sub_select_map.get(&property) {
            return resolver(op, &args);
        }

        let column = self
            .alias_map
            .get(&property)
            .cloned()
            .ok_or_else(|| CoreError::FieldNotFound(property.clone()))?;

        if let Some(cmp) = CompareOp::from_name(op) {
            let value = single_arg(op, args)?;
            return Ok(match (cmp, value) {
                (CompareOp::Eq, Value::Null) => Condition::IsNull {
                    column,
                    negated: false,
                },
                (CompareOp::Ne, Value::Null) => Condition::IsNull {
                    column,
                    negated: true,
                },
                (cmp, value) => Condition::compare(column, cmp, value),
            });
        }

        match op {
            "in" | "out" => Ok(Condition::In {
                column,
                values: args,
                negated: op == "out",
            }),
            "like" | "match" => Ok(Condition::Like {
                column,
                pattern: single_arg(op, args)?.to_string(),
                case_insensitive: op == "match",
            }),
            "contains" => Ok(Condition::Contains {
                column,
                value: single_arg(op, args)?.to_string(),
            }),
            _ => Err(CoreError::QuerySyntax(format!("unsupported operator: {}", op))),
        }
    }

    /// Literal arguments after the property, arrays flattened, converted
    fn literal_args(&self, node: &AstNode, property: &str) -> CoreResult<Vec<Value>> {
        let mut values = Vec::new();
        for arg in node.args.iter().skip(1) {
            match arg {
                AstArg::Value(v) => values.push(v.clone()),
                AstArg::Array(vs) => values.extend(vs.iter().cloned()),
                AstArg::Node(n) => {
                    return Err(CoreError::QuerySyntax(format!(
                        "{}() cannot take operator {} as a value",
                        node.name, n.name
                    )));
                }
            }
        }
        if let Some(convert) = self.value_converters.get(property) {
            values = values.into_iter().map(|v| convert(v)).collect();
        }
        Ok(values)
    }

    fn translate_sort(&self, node: &AstNode) -> CoreResult<Vec<SortField>> {
        node.args
            .iter()
            .map(|arg| {
                let raw = match arg {
                    AstArg::Value(v) => v.to_string(),
                    other => {
                        return Err(CoreError::QuerySyntax(format!(
                            "sort() expects properties, got {}",
                            other
                        )));
                    }
                };
                let (descending, property) = match raw.strip_prefix('-') {
                    Some(p) => (true, p),
                    None => (false, raw.strip_prefix('+').unwrap_or(&raw)),
                };
                let column = self
                    .alias_map
                    .get(property)
                    .cloned()
                    .ok_or_else(|| CoreError::FieldNotFound(property.to_string()))?;
                Ok(if descending {
                    SortField::desc(column)
                } else {
                    SortField::asc(column)
                })
            })
            .collect()
    }
}

fn combine<V: Clone>(base: &Arc<HashMap<String, V>>, extra: HashMap<String, V>) -> Arc<HashMap<String, V>> {
    if extra.is_empty() {
        return Arc::clone(base);
    }
    let mut merged = HashMap::clone(base);
    merged.extend(extra);
    Arc::new(merged)
}

fn single_arg(op: &str, mut args: Vec<Value>) -> CoreResult<Value> {
    if args.len() != 1 {
        return Err(CoreError::QuerySyntax(format!(
            "{}() takes a property and one value",
            op
        )));
    }
    Ok(args.remove(0))
}

fn translate_limit(node: &AstNode) -> CoreResult<Page> {
    let number = |i: usize| -> CoreResult<Option<u64>> {
        match node.value_arg(i) {
            None => Ok(None),
            Some(Value::Int(n)) if *n >= 0 => Ok(Some(*n as u64)),
            Some(other) => Err(CoreError::QuerySyntax(format!(
                "limit() expects non-negative integers, got {}",
                other
            ))),
        }
    };
    let limit = number(0)?.ok_or_else(|| CoreError::QuerySyntax("limit() requires a count".into()))?;
    let offset = number(1)?.unwrap_or(0);
    Ok(Page::new(limit, offset))
}
