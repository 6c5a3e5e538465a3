//! Query language
//!
//! Query string → [`AstNode`] ([`parser`]) → [`ConditionSortLimit`]
//! ([`translator`]) → rows ([`eval`], run by the storage backends).

pub mod ast;
pub mod condition;
pub mod eval;
pub mod parser;
pub mod translator;
pub mod value;

pub use ast::{AstArg, AstNode};
pub use condition::{
    CompareOp, Condition, ConditionSortLimit, Page, SortDirection, SortField, SubSelect,
};
pub use parser::parse_query;
pub use translator::{
    AliasMap, BOOLEAN_VALUE_CONVERTER, QueryTranslator, SubSelectFn, SubSelectMap, ValueConverter,
    ValueConverterMap,
};
pub use value::Value;
