use super::QueryError;
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

/// A small jq dialect for computed columns, e.g.
/// `.spec.containers | map(.image) | join(",")` or
/// `.status.conditions[] | select(.type == "Ready") | .status`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpr {
    root: Expr,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Identity,
    Recurse,
    Literal(Value),
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Iterate(Box<Expr>),
    Try(Box<Expr>),
    Array(Option<Box<Expr>>),
    Pipe(Box<Expr>, Box<Expr>),
    Comma(Box<Expr>, Box<Expr>),
    Alt(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    Arith(Box<Expr>, ArithOp, Box<Expr>),
    Call(Builtin, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ArithOp {
    Add,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Builtin {
    Length,
    Keys,
    Select,
    Map,
    Join,
    First,
    Last,
    Not,
    Has,
    ToString,
    ToNumber,
    Downcase,
    Upcase,
    Split,
    Contains,
    ToEntries,
    Add,
    Empty,
    Sort,
    Unique,
    Min,
    Max,
    Test,
    StartsWith,
    EndsWith,
    Type,
}

impl Builtin {
    fn lookup(name: &str, arity: usize) -> Option<Self> {
        let builtin = match (name, arity) {
            ("length", 0) => Self::Length,
            ("keys", 0) => Self::Keys,
            ("select", 1) => Self::Select,
            ("map", 1) => Self::Map,
            ("join", 1) => Self::Join,
            ("first", 0 | 1) => Self::First,
            ("last", 0 | 1) => Self::Last,
            ("not", 0) => Self::Not,
            ("has", 1) => Self::Has,
            ("tostring", 0) => Self::ToString,
            ("tonumber", 0) => Self::ToNumber,
            ("ascii_downcase", 0) => Self::Downcase,
            ("ascii_upcase", 0) => Self::Upcase,
            ("split", 1) => Self::Split,
            ("contains", 1) => Self::Contains,
            ("to_entries", 0) => Self::ToEntries,
            ("add", 0) => Self::Add,
            ("empty", 0) => Self::Empty,
            ("sort", 0) => Self::Sort,
            ("unique", 0) => Self::Unique,
            ("min", 0) => Self::Min,
            ("max", 0) => Self::Max,
            ("test", 1) => Self::Test,
            ("startswith", 1) => Self::StartsWith,
            ("endswith", 1) => Self::EndsWith,
            ("type", 0) => Self::Type,
            _ => return None,
        };
        Some(builtin)
    }
}

impl FilterExpr {
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        let tokens = lex(raw)?;
        let mut parser = Parser {
            raw,
            tokens,
            pos: 0,
        };
        let root = parser.pipe()?;
        if let Some((offset, token)) = parser.tokens.get(parser.pos) {
            return Err(QueryError::parse(
                raw,
                *offset,
                format!("unexpected {token:?}"),
            ));
        }

        Ok(Self { root })
    }

    /// Runs the expression against `input` and returns every output value.
    pub fn evaluate(&self, input: &Value) -> Result<Vec<Value>, QueryError> {
        eval(&self.root, input)
    }
}

fn eval(expr: &Expr, input: &Value) -> Result<Vec<Value>, QueryError> {
    let mut out = Vec::new();
    emit(expr, input, &mut out)?;
    Ok(out)
}

/// Pushes the outputs of `expr` into `out`. Outputs produced before an error
/// stay in `out`, which is what `?` relies on.
fn emit(expr: &Expr, input: &Value, out: &mut Vec<Value>) -> Result<(), QueryError> {
    match expr {
        Expr::Identity => out.push(input.clone()),
        Expr::Recurse => recurse(input, out),
        Expr::Literal(value) => out.push(value.clone()),
        Expr::Field(base, name) => {
            let key = Value::String(name.clone());
            for value in eval(base, input)? {
                out.push(index_value(&value, &key)?);
            }
        }
        Expr::Index(base, index) => {
            let indices = eval(index, input)?;
            for value in eval(base, input)? {
                for index in &indices {
                    out.push(index_value(&value, index)?);
                }
            }
        }
        Expr::Iterate(base) => {
            for value in eval(base, input)? {
                match value {
                    Value::Array(items) => out.extend(items),
                    Value::Object(map) => out.extend(map.into_iter().map(|(_, value)| value)),
                    other => {
                        return Err(QueryError::eval(format!(
                            "cannot iterate over {}",
                            type_name(&other)
                        )));
                    }
                }
            }
        }
        Expr::Try(inner) => {
            if let Err(error) = emit(inner, input, out) {
                tracing::trace!("suppressed query error: {error}");
            }
        }
        Expr::Array(None) => out.push(Value::Array(Vec::new())),
        Expr::Array(Some(inner)) => out.push(Value::Array(eval(inner, input)?)),
        Expr::Pipe(left, right) => {
            for value in eval(left, input)? {
                emit(right, &value, out)?;
            }
        }
        Expr::Comma(left, right) => {
            emit(left, input, out)?;
            emit(right, input, out)?;
        }
        Expr::Alt(left, right) => {
            let mut truthy = Vec::new();
            if emit(left, input, &mut truthy).is_err() {
                truthy.clear();
            }
            truthy.retain(is_truthy);
            if truthy.is_empty() {
                emit(right, input, out)?;
            } else {
                out.extend(truthy);
            }
        }
        Expr::And(left, right) => {
            for value in eval(left, input)? {
                if !is_truthy(&value) {
                    out.push(Value::Bool(false));
                    continue;
                }
                out.extend(
                    eval(right, input)?
                        .iter()
                        .map(|value| Value::Bool(is_truthy(value))),
                );
            }
        }
        Expr::Or(left, right) => {
            for value in eval(left, input)? {
                if is_truthy(&value) {
                    out.push(Value::Bool(true));
                    continue;
                }
                out.extend(
                    eval(right, input)?
                        .iter()
                        .map(|value| Value::Bool(is_truthy(value))),
                );
            }
        }
        Expr::Compare(left, op, right) => {
            let rights = eval(right, input)?;
            for value in eval(left, input)? {
                out.extend(
                    rights
                        .iter()
                        .map(|right| Value::Bool(compare_op(*op, &value, right))),
                );
            }
        }
        Expr::Arith(left, op, right) => {
            let rights = eval(right, input)?;
            for value in eval(left, input)? {
                for right in &rights {
                    out.push(arith(*op, &value, right)?);
                }
            }
        }
        Expr::Call(builtin, args) => out.extend(call(*builtin, args, input)?),
    }

    Ok(())
}

fn recurse(value: &Value, out: &mut Vec<Value>) {
    out.push(value.clone());
    match value {
        Value::Array(items) => items.iter().for_each(|item| recurse(item, out)),
        Value::Object(map) => map.values().for_each(|item| recurse(item, out)),
        _ => {}
    }
}

fn index_value(value: &Value, index: &Value) -> Result<Value, QueryError> {
    match (value, index) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Object(map), Value::String(key)) => {
            Ok(map.get(key).cloned().unwrap_or(Value::Null))
        }
        (Value::Array(items), Value::Number(number)) => {
            let Some(position) = number.as_f64().map(|position| position.floor() as i64) else {
                return Ok(Value::Null);
            };
            let position = if position < 0 {
                items.len() as i64 + position
            } else {
                position
            };
            Ok(usize::try_from(position)
                .ok()
                .and_then(|position| items.get(position))
                .cloned()
                .unwrap_or(Value::Null))
        }
        (value, index) => Err(QueryError::eval(format!(
            "cannot index {} with {}",
            type_name(value),
            render_key(index)
        ))),
    }
}

fn render_key(index: &Value) -> String {
    match index {
        Value::String(key) => format!("{key:?}"),
        other => type_name(other).to_string(),
    }
}

fn call(builtin: Builtin, args: &[Expr], input: &Value) -> Result<Vec<Value>, QueryError> {
    match builtin {
        Builtin::Select => {
            let keep = eval(&args[0], input)?.iter().any(is_truthy);
            Ok(if keep { vec![input.clone()] } else { Vec::new() })
        }
        Builtin::Map => {
            let Value::Array(items) = input else {
                return Err(type_error("map", input));
            };
            let mut mapped = Vec::with_capacity(items.len());
            for item in items {
                mapped.extend(eval(&args[0], item)?);
            }
            Ok(vec![Value::Array(mapped)])
        }
        Builtin::First | Builtin::Last if !args.is_empty() => {
            let mut outputs = eval(&args[0], input)?;
            let picked = if builtin == Builtin::First {
                outputs.drain(..).next()
            } else {
                outputs.pop()
            };
            Ok(picked.into_iter().collect())
        }
        Builtin::Empty => Ok(Vec::new()),
        _ if args.is_empty() => Ok(vec![unary(builtin, input)?]),
        _ => {
            let mut out = Vec::new();
            for arg in eval(&args[0], input)? {
                out.push(binary(builtin, input, &arg)?);
            }
            Ok(out)
        }
    }
}

fn unary(builtin: Builtin, input: &Value) -> Result<Value, QueryError> {
    let value = match (builtin, input) {
        (Builtin::Length, Value::Null) => Value::from(0),
        (Builtin::Length, Value::String(text)) => Value::from(text.chars().count()),
        (Builtin::Length, Value::Array(items)) => Value::from(items.len()),
        (Builtin::Length, Value::Object(map)) => Value::from(map.len()),
        (Builtin::Length, Value::Number(number)) => number_value(number.as_f64().unwrap_or(0.0).abs()),
        (Builtin::Keys, Value::Object(map)) => {
            Value::Array(map.keys().cloned().map(Value::String).collect())
        }
        (Builtin::Keys, Value::Array(items)) => Value::Array((0..items.len()).map(Value::from).collect()),
        (Builtin::First, Value::Array(items)) => items.first().cloned().unwrap_or(Value::Null),
        (Builtin::Last, Value::Array(items)) => items.last().cloned().unwrap_or(Value::Null),
        (Builtin::Not, value) => Value::Bool(!is_truthy(value)),
        (Builtin::ToString, Value::String(text)) => Value::String(text.clone()),
        (Builtin::ToString, value) => Value::String(value.to_string()),
        (Builtin::ToNumber, Value::Number(number)) => Value::Number(number.clone()),
        (Builtin::ToNumber, Value::String(text)) => {
            let parsed = text
                .trim()
                .parse::<f64>()
                .map_err(|_| QueryError::eval(format!("cannot parse {text:?} as a number")))?;
            number_value(parsed)
        }
        (Builtin::Downcase, Value::String(text)) => Value::String(text.to_ascii_lowercase()),
        (Builtin::Upcase, Value::String(text)) => Value::String(text.to_ascii_uppercase()),
        (Builtin::ToEntries, Value::Object(map)) => Value::Array(
            map.iter()
                .map(|(key, value)| {
                    let mut entry = Map::new();
                    entry.insert("key".to_string(), Value::String(key.clone()));
                    entry.insert("value".to_string(), value.clone());
                    Value::Object(entry)
                })
                .collect(),
        ),
        (Builtin::Add, Value::Array(items)) => {
            let mut total = Value::Null;
            for item in items {
                total = arith(ArithOp::Add, &total, item)?;
            }
            total
        }
        (Builtin::Sort, Value::Array(items)) => Value::Array(sorted(items)),
        (Builtin::Unique, Value::Array(items)) => {
            let mut items = sorted(items);
            items.dedup();
            Value::Array(items)
        }
        (Builtin::Min, Value::Array(items)) => items
            .iter()
            .min_by(|left, right| compare_json(left, right))
            .cloned()
            .unwrap_or(Value::Null),
        (Builtin::Max, Value::Array(items)) => items
            .iter()
            .max_by(|left, right| compare_json(left, right))
            .cloned()
            .unwrap_or(Value::Null),
        (Builtin::Type, value) => Value::String(type_name(value).to_string()),
        (builtin, value) => return Err(type_error(builtin_name(builtin), value)),
    };

    Ok(value)
}

fn binary(builtin: Builtin, input: &Value, arg: &Value) -> Result<Value, QueryError> {
    let value = match (builtin, input, arg) {
        (Builtin::Join, Value::Array(items), Value::String(separator)) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(match item {
                    Value::Null => String::new(),
                    Value::String(text) => text.clone(),
                    Value::Number(_) | Value::Bool(_) => item.to_string(),
                    other => return Err(type_error("join", other)),
                });
            }
            Value::String(parts.join(separator))
        }
        (Builtin::Has, Value::Object(map), Value::String(key)) => Value::Bool(map.contains_key(key)),
        (Builtin::Has, Value::Array(items), Value::Number(index)) => Value::Bool(
            index
                .as_u64()
                .and_then(|index| usize::try_from(index).ok())
                .is_some_and(|index| index < items.len()),
        ),
        (Builtin::Split, Value::String(text), Value::String(separator)) => Value::Array(
            text.split(separator.as_str())
                .map(|part| Value::String(part.to_string()))
                .collect(),
        ),
        (Builtin::Contains, value, needle) => Value::Bool(contains(value, needle)),
        (Builtin::Test, Value::String(text), Value::String(pattern)) => {
            let regex = Regex::new(pattern).map_err(|source| QueryError::Regex {
                pattern: pattern.clone(),
                source,
            })?;
            Value::Bool(regex.is_match(text))
        }
        (Builtin::StartsWith, Value::String(text), Value::String(prefix)) => {
            Value::Bool(text.starts_with(prefix.as_str()))
        }
        (Builtin::EndsWith, Value::String(text), Value::String(suffix)) => {
            Value::Bool(text.ends_with(suffix.as_str()))
        }
        (builtin, value, _) => return Err(type_error(builtin_name(builtin), value)),
    };

    Ok(value)
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(text), Value::String(part)) => text.contains(part.as_str()),
        (Value::Array(items), Value::Array(parts)) => parts
            .iter()
            .all(|part| items.iter().any(|item| contains(item, part))),
        (Value::Object(map), Value::Object(parts)) => parts.iter().all(|(key, part)| {
            map.get(key)
                .is_some_and(|value| contains(value, part))
        }),
        (left, right) => left == right,
    }
}

fn sorted(items: &[Value]) -> Vec<Value> {
    let mut items = items.to_vec();
    items.sort_by(compare_json);
    items
}

fn arith(op: ArithOp, left: &Value, right: &Value) -> Result<Value, QueryError> {
    let value = match (op, left, right) {
        (ArithOp::Add, Value::Null, value) | (ArithOp::Add, value, Value::Null) => value.clone(),
        (op, Value::Number(l), Value::Number(r)) => {
            let (l, r) = (l.as_f64().unwrap_or(0.0), r.as_f64().unwrap_or(0.0));
            number_value(match op {
                ArithOp::Add => l + r,
                ArithOp::Sub => l - r,
            })
        }
        (ArithOp::Add, Value::String(l), Value::String(r)) => Value::String(format!("{l}{r}")),
        (ArithOp::Add, Value::Array(l), Value::Array(r)) => {
            Value::Array(l.iter().chain(r).cloned().collect())
        }
        (ArithOp::Add, Value::Object(l), Value::Object(r)) => {
            let mut merged = l.clone();
            merged.extend(r.iter().map(|(key, value)| (key.clone(), value.clone())));
            Value::Object(merged)
        }
        (ArithOp::Sub, Value::Array(l), Value::Array(r)) => {
            Value::Array(l.iter().filter(|item| !r.contains(item)).cloned().collect())
        }
        (op, left, right) => {
            return Err(QueryError::eval(format!(
                "{} and {} cannot be {}",
                type_name(left),
                type_name(right),
                match op {
                    ArithOp::Add => "added",
                    ArithOp::Sub => "subtracted",
                }
            )));
        }
    };

    Ok(value)
}

/// Integral results stay integers so they print without a trailing `.0`.
fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        return Value::from(value as i64);
    }
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn compare_op(op: CmpOp, left: &Value, right: &Value) -> bool {
    let ordering = compare_json(left, right);
    match op {
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
    }
}

/// jq total order: null < false < true < numbers < strings < arrays < objects.
fn compare_json(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(false) => 1,
            Value::Bool(true) => 2,
            Value::Number(_) => 3,
            Value::String(_) => 4,
            Value::Array(_) => 5,
            Value::Object(_) => 6,
        }
    }

    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l
            .as_f64()
            .partial_cmp(&r.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(l), Value::String(r)) => l.cmp(r),
        (Value::Array(l), Value::Array(r)) => l
            .iter()
            .zip(r)
            .map(|(l, r)| compare_json(l, r))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| l.len().cmp(&r.len())),
        (Value::Object(l), Value::Object(r)) => {
            let (lk, rk) = (l.keys().collect::<Vec<_>>(), r.keys().collect::<Vec<_>>());
            lk.cmp(&rk).then_with(|| {
                l.values()
                    .zip(r.values())
                    .map(|(l, r)| compare_json(l, r))
                    .find(|ordering| *ordering != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            })
        }
        (left, right) => rank(left).cmp(&rank(right)),
    }
}

fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(function: &str, value: &Value) -> QueryError {
    QueryError::eval(format!("{function} cannot be applied to {}", type_name(value)))
}

fn builtin_name(builtin: Builtin) -> &'static str {
    match builtin {
        Builtin::Length => "length",
        Builtin::Keys => "keys",
        Builtin::Select => "select",
        Builtin::Map => "map",
        Builtin::Join => "join",
        Builtin::First => "first",
        Builtin::Last => "last",
        Builtin::Not => "not",
        Builtin::Has => "has",
        Builtin::ToString => "tostring",
        Builtin::ToNumber => "tonumber",
        Builtin::Downcase => "ascii_downcase",
        Builtin::Upcase => "ascii_upcase",
        Builtin::Split => "split",
        Builtin::Contains => "contains",
        Builtin::ToEntries => "to_entries",
        Builtin::Add => "add",
        Builtin::Empty => "empty",
        Builtin::Sort => "sort",
        Builtin::Unique => "unique",
        Builtin::Min => "min",
        Builtin::Max => "max",
        Builtin::Test => "test",
        Builtin::StartsWith => "startswith",
        Builtin::EndsWith => "endswith",
        Builtin::Type => "type",
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Dot,
    DotDot,
    Field(String),
    Ident(String),
    Str(String),
    Num(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Pipe,
    Comma,
    Semicolon,
    Question,
    Alt,
    Cmp(CmpOp),
    Plus,
    Minus,
}

fn lex(raw: &str) -> Result<Vec<(usize, Token)>, QueryError> {
    let chars = raw.char_indices().collect::<Vec<_>>();
    let mut tokens = Vec::new();
    let mut i = 0;
    let at = |index: usize| chars.get(index).map(|(_, c)| *c);

    while let Some(&(offset, c)) = chars.get(i) {
        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '.' if at(i + 1) == Some('.') => {
                i += 2;
                Token::DotDot
            }
            '.' if at(i + 1).is_some_and(is_ident_start) => {
                let (name, next) = read_ident(&chars, i + 1);
                i = next;
                Token::Field(name)
            }
            '.' if at(i + 1) == Some('"') => {
                let (text, next) = read_string(raw, &chars, i + 1)?;
                i = next;
                Token::Field(text)
            }
            '.' => {
                i += 1;
                Token::Dot
            }
            '"' => {
                let (text, next) = read_string(raw, &chars, i)?;
                i = next;
                Token::Str(text)
            }
            c if c.is_ascii_digit() => {
                let begin = i;
                while at(i).is_some_and(|c| c.is_ascii_digit() || c == '.') {
                    i += 1;
                }
                let text = chars[begin..i].iter().map(|(_, c)| *c).collect::<String>();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| QueryError::parse(raw, offset, format!("invalid number {text:?}")))?;
                Token::Num(number)
            }
            c if is_ident_start(c) => {
                let (name, next) = read_ident(&chars, i);
                i = next;
                Token::Ident(name)
            }
            '/' if at(i + 1) == Some('/') => {
                i += 2;
                Token::Alt
            }
            '=' if at(i + 1) == Some('=') => {
                i += 2;
                Token::Cmp(CmpOp::Eq)
            }
            '!' if at(i + 1) == Some('=') => {
                i += 2;
                Token::Cmp(CmpOp::Ne)
            }
            '<' | '>' => {
                let or_equal = at(i + 1) == Some('=');
                i += if or_equal { 2 } else { 1 };
                Token::Cmp(match (c, or_equal) {
                    ('<', false) => CmpOp::Lt,
                    ('<', true) => CmpOp::Le,
                    ('>', false) => CmpOp::Gt,
                    _ => CmpOp::Ge,
                })
            }
            single => {
                i += 1;
                match single {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '|' => Token::Pipe,
                    ',' => Token::Comma,
                    ';' => Token::Semicolon,
                    '?' => Token::Question,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    other => {
                        return Err(QueryError::parse(
                            raw,
                            offset,
                            format!("unexpected character {other:?}"),
                        ));
                    }
                }
            }
        };
        tokens.push((offset, token));
    }

    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn read_ident(chars: &[(usize, char)], mut i: usize) -> (String, usize) {
    let mut name = String::new();
    while let Some(&(_, c)) = chars.get(i) {
        if !(c.is_ascii_alphanumeric() || c == '_') {
            break;
        }
        name.push(c);
        i += 1;
    }
    (name, i)
}

fn read_string(
    raw: &str,
    chars: &[(usize, char)],
    start: usize,
) -> Result<(String, usize), QueryError> {
    let offset = chars.get(start).map_or(raw.len(), |(offset, _)| *offset);
    let mut text = String::new();
    let mut i = start + 1;
    while let Some(&(_, c)) = chars.get(i) {
        match c {
            '"' => return Ok((text, i + 1)),
            '\\' => {
                let escaped = chars.get(i + 1).map(|(_, c)| *c);
                match escaped {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(other) => text.push(other),
                    None => break,
                }
                i += 2;
            }
            other => {
                text.push(other);
                i += 1;
            }
        }
    }

    Err(QueryError::parse(raw, offset, "unterminated string"))
}

struct Parser<'a> {
    raw: &'a str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, token)| token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn error(&self, reason: impl Into<String>) -> QueryError {
        let offset = self
            .tokens
            .get(self.pos)
            .map_or(self.raw.len(), |(offset, _)| *offset);
        QueryError::parse(self.raw, offset, reason)
    }

    fn expect(&mut self, expected: Token) -> Result<(), QueryError> {
        if self.eat(&expected) {
            return Ok(());
        }
        Err(self.error(format!("expecting {expected:?}")))
    }

    fn pipe(&mut self) -> Result<Expr, QueryError> {
        let left = self.comma()?;
        if self.eat(&Token::Pipe) {
            let right = self.pipe()?;
            return Ok(Expr::Pipe(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn comma(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.alternative()?;
        while self.eat(&Token::Comma) {
            let right = self.alternative()?;
            left = Expr::Comma(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn alternative(&mut self) -> Result<Expr, QueryError> {
        let left = self.or()?;
        if self.eat(&Token::Alt) {
            let right = self.alternative()?;
            return Ok(Expr::Alt(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn or(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.and()?;
        while self.eat(&Token::Ident("or".to_string())) {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.comparison()?;
        while self.eat(&Token::Ident("and".to_string())) {
            let right = self.comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, QueryError> {
        let left = self.additive()?;
        if let Some(Token::Cmp(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.additive()?;
            return Ok(Expr::Compare(Box::new(left), op, Box::new(right)));
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.postfix()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.postfix()?;
            left = Expr::Arith(Box::new(left), op, Box::new(right));
        }
    }

    fn postfix(&mut self) -> Result<Expr, QueryError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Field(name)) => {
                    let name = name.clone();
                    self.pos += 1;
                    expr = Expr::Field(Box::new(expr), name);
                }
                Some(Token::Dot)
                    if matches!(self.tokens.get(self.pos + 1), Some((_, Token::LBracket))) =>
                {
                    self.pos += 1;
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    expr = self.bracket_suffix(expr)?;
                }
                Some(Token::Question) => {
                    self.pos += 1;
                    expr = Expr::Try(Box::new(expr));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn bracket_suffix(&mut self, base: Expr) -> Result<Expr, QueryError> {
        if self.eat(&Token::RBracket) {
            return Ok(Expr::Iterate(Box::new(base)));
        }
        let index = self.pipe()?;
        self.expect(Token::RBracket)?;
        Ok(Expr::Index(Box::new(base), Box::new(index)))
    }

    fn primary(&mut self) -> Result<Expr, QueryError> {
        let Some(token) = self.next() else {
            return Err(self.error("unexpected end of expression"));
        };
        match token {
            Token::Dot => {
                if self.eat(&Token::LBracket) {
                    return self.bracket_suffix(Expr::Identity);
                }
                Ok(Expr::Identity)
            }
            Token::DotDot => Ok(Expr::Recurse),
            Token::Field(name) => Ok(Expr::Field(Box::new(Expr::Identity), name)),
            Token::Str(text) => Ok(Expr::Literal(Value::String(text))),
            Token::Num(number) => Ok(Expr::Literal(number_value(number))),
            Token::Minus => match self.next() {
                Some(Token::Num(number)) => Ok(Expr::Literal(number_value(-number))),
                _ => Err(self.error("expecting a number after '-'")),
            },
            Token::LParen => {
                let inner = self.pipe()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                if self.eat(&Token::RBracket) {
                    return Ok(Expr::Array(None));
                }
                let inner = self.pipe()?;
                self.expect(Token::RBracket)?;
                Ok(Expr::Array(Some(Box::new(inner))))
            }
            Token::Ident(name) => self.ident(name),
            other => {
                self.pos -= 1;
                Err(self.error(format!("unexpected {other:?}")))
            }
        }
    }

    fn ident(&mut self, name: String) -> Result<Expr, QueryError> {
        match name.as_str() {
            "null" => return Ok(Expr::Literal(Value::Null)),
            "true" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" => return Ok(Expr::Literal(Value::Bool(false))),
            _ => {}
        }

        let mut args = Vec::new();
        if self.eat(&Token::LParen) {
            loop {
                args.push(self.pipe()?);
                if self.eat(&Token::Semicolon) {
                    continue;
                }
                self.expect(Token::RParen)?;
                break;
            }
        }
        let Some(builtin) = Builtin::lookup(&name, args.len()) else {
            return Err(self.error(format!("unknown function {name}/{}", args.len())));
        };

        Ok(Expr::Call(builtin, args))
    }
}

#[cfg(test)]
mod tests {
    use super::FilterExpr;
    use serde_json::{Value, json};

    fn pod() -> Value {
        json!({
            "metadata": {"name": "fred", "labels": {"app": "blee", "tier": "web"}},
            "spec": {
                "containers": [
                    {"name": "c1", "image": "nginx:1.25", "ports": [{"containerPort": 80}]},
                    {"name": "c2", "image": "busybox"}
                ]
            },
            "status": {
                "conditions": [
                    {"type": "Ready", "status": "True"},
                    {"type": "PodScheduled", "status": "True"}
                ]
            }
        })
    }

    fn run(expr: &str) -> Vec<Value> {
        FilterExpr::parse(expr).unwrap().evaluate(&pod()).unwrap()
    }

    #[test]
    fn field_access_and_pipes() {
        assert_eq!(run(".metadata.name"), vec![json!("fred")]);
        assert_eq!(run(".metadata | .name"), vec![json!("fred")]);
        assert_eq!(run(".metadata.zorg"), vec![Value::Null]);
        assert_eq!(run(".spec.containers[1].name"), vec![json!("c2")]);
        assert_eq!(run(".spec.containers[-1].name"), vec![json!("c2")]);
    }

    #[test]
    fn iteration_and_select() {
        assert_eq!(
            run(".spec.containers[].image"),
            vec![json!("nginx:1.25"), json!("busybox")]
        );
        assert_eq!(
            run(r#".status.conditions[] | select(.type == "Ready") | .status"#),
            vec![json!("True")]
        );
        assert_eq!(
            run(".spec.containers | map(.name) | join(\"/\")"),
            vec![json!("c1/c2")]
        );
    }

    #[test]
    fn builtins() {
        assert_eq!(run(".spec.containers | length"), vec![json!(2)]);
        assert_eq!(run(".metadata.labels | keys"), vec![json!(["app", "tier"])]);
        assert_eq!(run(".metadata.name | ascii_upcase"), vec![json!("FRED")]);
        assert_eq!(run(".metadata.name | test(\"^fr\")"), vec![json!(true)]);
        assert_eq!(run("[.spec.containers[].ports[]?.containerPort] | add"), vec![json!(80)]);
        assert_eq!(run(".metadata.labels | has(\"app\")"), vec![json!(true)]);
        assert_eq!(run("first(.spec.containers[].name)"), vec![json!("c1")]);
        assert_eq!(run(".metadata.zorg // \"none\""), vec![json!("none")]);
        assert_eq!(run("1 + 2, \"a\" + \"b\""), vec![json!(3), json!("ab")]);
        assert_eq!(run(".metadata.name | type"), vec![json!("string")]);
    }

    #[test]
    fn boolean_operators() {
        assert_eq!(
            run(r#".metadata.name == "fred" and (.spec.containers | length) > 1"#),
            vec![json!(true)]
        );
        assert_eq!(run("false or null"), vec![json!(false)]);
        assert_eq!(run(".metadata.name | not"), vec![json!(false)]);
    }

    #[test]
    fn evaluation_errors_surface() {
        let expr = FilterExpr::parse(".metadata.name[]").unwrap();
        assert!(expr.evaluate(&pod()).is_err());
        let expr = FilterExpr::parse(".metadata.name[]?").unwrap();
        assert_eq!(expr.evaluate(&pod()).unwrap(), Vec::<Value>::new());
        let expr = FilterExpr::parse(".metadata.name + 1").unwrap();
        assert!(expr.evaluate(&pod()).is_err());
    }

    #[test]
    fn malformed_expressions_fail_to_parse() {
        assert!(FilterExpr::parse("").is_err());
        assert!(FilterExpr::parse(".metadata |").is_err());
        assert!(FilterExpr::parse("frobnicate(.a)").is_err());
        assert!(FilterExpr::parse("(.a").is_err());
        assert!(FilterExpr::parse("\"open").is_err());
    }
}
