//! Query string parser
//!
//! Accepts the restricted RQL/FIQL filter grammar used by the REST surface:
//!
//! ```text
//! query      := or_expr?
//! or_expr    := and_expr ('|' and_expr)*
//! and_expr   := term (('&' | ',') term)*
//! term       := '(' or_expr ')' | call | comparison
//! call       := ident '(' (arg (',' arg)*)? ')'
//! arg        := call | comparison | '(' values ')' | value
//! comparison := token ('=' ident '=' | '=' | '!=' | '<=' | '>=' | '<' | '>') rhs
//! ```
//!
//! Tokens are percent-decoded. `true`, `false`, `null` and numbers are
//! converted automatically, `string:`, `number:` and `boolean:` prefixes force
//! a type.
//!
//! Every level of recursion in the grammar starts at a literal `(`, so the
//! parenthesis depth is checked up front and capped at [`MAX_NESTING`].

use super::ast::{AstArg, AstNode};
use super::value::Value;
use crate::error::{CoreError, CoreResult};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map, map_res},
    multi::{separated_list0, separated_list1},
    sequence::{delimited, pair},
};

/// Deepest parenthesis nesting a query may use
pub const MAX_NESTING: usize = 64;

/// Parse a query string into an AST
///
/// An empty query is an empty `and()`, which matches every row.
pub fn parse_query(query: &str) -> CoreResult<AstNode> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Ok(AstNode::match_all());
    }
    check_nesting(trimmed)?;

    match all_consuming(or_expr)(trimmed) {
        Ok((_, node)) => Ok(node),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(CoreError::QuerySyntax(
            format!("unexpected input at '{}'", excerpt(e.input)),
        )),
        Err(nom::Err::Incomplete(_)) => Err(CoreError::QuerySyntax("incomplete query".into())),
    }
}

fn check_nesting(query: &str) -> CoreResult<()> {
    let mut depth = 0usize;
    for (idx, c) in query.char_indices() {
        match c {
            '(' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(CoreError::QuerySyntax(format!(
                        "nesting deeper than {} levels at '{}'",
                        MAX_NESTING,
                        excerpt(&query[idx..])
                    )));
                }
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn excerpt(input: &str) -> &str {
    match input.char_indices().nth(24) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_token_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '&' | '|' | ',' | '=' | '<' | '>' | '!')
}

fn token(input: &str) -> IResult<&str, &str> {
    take_while1(is_token_char)(input)
}

fn ident(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

/// Fold a list of terms into a single node under `name`
fn combine(name: &str, mut terms: Vec<AstNode>) -> AstNode {
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        AstNode::new(name, terms.into_iter().map(AstArg::Node).collect())
    }
}

fn or_expr(input: &str) -> IResult<&str, AstNode> {
    map(separated_list1(ws(char('|')), and_expr), |terms| {
        combine("or", terms)
    })(input)
}

fn and_expr(input: &str) -> IResult<&str, AstNode> {
    map(
        separated_list1(ws(alt((char('&'), char(',')))), term),
        |terms| combine("and", terms),
    )(input)
}

fn term(input: &str) -> IResult<&str, AstNode> {
    ws(alt((group, call, comparison)))(input)
}

fn group(input: &str) -> IResult<&str, AstNode> {
    delimited(char('('), or_expr, char(')'))(input)
}

fn call(input: &str) -> IResult<&str, AstNode> {
    map(
        pair(
            ident,
            delimited(char('('), separated_list0(ws(char(',')), arg), ws(char(')'))),
        ),
        |(name, args)| AstNode::new(name, args),
    )(input)
}

fn arg(input: &str) -> IResult<&str, AstArg> {
    ws(alt((
        map(call, AstArg::Node),
        map(comparison, AstArg::Node),
        map(array, AstArg::Array),
        map(value, AstArg::Value),
    )))(input)
}

fn array(input: &str) -> IResult<&str, Vec<Value>> {
    delimited(
        char('('),
        separated_list0(ws(char(',')), ws(value)),
        char(')'),
    )(input)
}

fn value(input: &str) -> IResult<&str, Value> {
    map_res(token, convert_token)(input)
}

fn operator(input: &str) -> IResult<&str, String> {
    alt((
        map(delimited(char('='), ident, char('=')), |op: &str| {
            op.to_ascii_lowercase()
        }),
        map(tag("!="), |_| "ne".to_string()),
        map(tag("<="), |_| "le".to_string()),
        map(tag(">="), |_| "ge".to_string()),
        map(char('<'), |_| "lt".to_string()),
        map(char('>'), |_| "gt".to_string()),
        map(char('='), |_| "eq".to_string()),
    ))(input)
}

fn comparison(input: &str) -> IResult<&str, AstNode> {
    let (input, property) = map_res(token, decode)(input)?;
    let (input, op) = operator(input)?;
    let (input, rhs) = alt((map(array, AstArg::Array), map(value, AstArg::Value)))(input)?;
    Ok((
        input,
        AstNode::new(op, vec![AstArg::Value(Value::Text(property)), rhs]),
    ))
}

fn decode(raw: &str) -> Result<String, String> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| e.to_string())
}

/// Convert a raw token to a typed value
pub fn convert_token(raw: &str) -> Result<Value, String> {
    let decoded = decode(raw)?;
    if let Some((prefix, rest)) = decoded.split_once(':') {
        match prefix {
            "string" => return Ok(Value::Text(rest.to_string())),
            "number" => {
                return parse_number(rest).ok_or_else(|| format!("not a number: {}", rest));
            }
            "boolean" => {
                return match rest {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Err(format!("not a boolean: {}", rest)),
                };
            }
            _ => {}
        }
    }
    Ok(auto_convert(decoded))
}

fn auto_convert(s: String) -> Value {
    match s.as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => parse_number(&s).unwrap_or(Value::Text(s)),
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let numeric = s.chars().any(|c| c.is_ascii_digit())
        && s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'));
    if !numeric {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Int(i));
    }
    s.parse::<f64>().ok().map(Value::Float)
}
