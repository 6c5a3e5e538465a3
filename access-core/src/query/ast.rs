//! Query AST

use super::value::Value;
use std::fmt;

/// Operator call, e.g. `eq(name,foo)` or `and(...)`
#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    pub name: String,
    pub args: Vec<AstArg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstArg {
    Node(AstNode),
    Value(Value),
    Array(Vec<Value>),
}

impl AstNode {
    pub fn new(name: impl Into<String>, args: Vec<AstArg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Empty conjunction, matches everything
    pub fn match_all() -> Self {
        Self::new("and", Vec::new())
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Argument `i` as a value
    pub fn value_arg(&self, i: usize) -> Option<&Value> {
        match self.args.get(i) {
            Some(AstArg::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// Child nodes, skipping non-node arguments
    pub fn child_nodes(&self) -> impl Iterator<Item = &AstNode> {
        self.args.iter().filter_map(|a| match a {
            AstArg::Node(n) => Some(n),
            _ => None,
        })
    }
}

impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", arg)?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for AstArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AstArg::Node(n) => write!(f, "{}", n),
            AstArg::Value(v) => write!(f, "{}", v),
            AstArg::Array(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(","))
            }
        }
    }
}
