use super::QueryError;
use serde_json::Value;
use std::cmp::Ordering;

/// Structural path over a JSON document, in the Kubernetes JSONPath flavour:
/// `.metadata.name`, `.spec.containers[*].image`, `..image`,
/// `.status.addresses[?(@.type == 'InternalIP')].address`.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Child(String),
    Index(i64),
    Slice(Option<i64>, Option<i64>),
    Wildcard,
    Descend(String),
    Filter(Predicate),
}

#[derive(Debug, Clone, PartialEq)]
struct Predicate {
    path: Vec<Segment>,
    test: Option<(CmpOp, Literal)>,
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

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

impl JsonPath {
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        let mut expr = raw.trim();
        if let Some(inner) = expr.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) {
            expr = inner.trim();
        }
        if let Some(rest) = expr.strip_prefix('$') {
            expr = rest;
        }
        if expr.is_empty() {
            return Err(QueryError::parse(raw, 0, "empty path"));
        }

        let segments = Parser::new(raw, expr).segments()?;
        Ok(Self { segments })
    }

    /// Every value the path selects, in document order. Missing keys and out
    /// of range indices select nothing.
    pub fn find<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        select(&self.segments, vec![root])
    }
}

fn select<'a>(segments: &[Segment], mut current: Vec<&'a Value>) -> Vec<&'a Value> {
    for segment in segments {
        current = current
            .into_iter()
            .flat_map(|value| step(segment, value))
            .collect();
        if current.is_empty() {
            break;
        }
    }
    current
}

fn step<'a>(segment: &Segment, value: &'a Value) -> Vec<&'a Value> {
    match segment {
        Segment::Child(name) => value.get(name.as_str()).into_iter().collect(),
        Segment::Index(index) => {
            let Value::Array(items) = value else {
                return Vec::new();
            };
            resolve_index(*index, items.len())
                .and_then(|index| items.get(index))
                .into_iter()
                .collect()
        }
        Segment::Slice(start, end) => {
            let Value::Array(items) = value else {
                return Vec::new();
            };
            let len = items.len();
            let start = start.map_or(0, |start| clamp_index(start, len));
            let end = end.map_or(len, |end| clamp_index(end, len));
            if start >= end {
                return Vec::new();
            }
            items[start..end].iter().collect()
        }
        Segment::Wildcard => match value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(map) => map.values().collect(),
            _ => Vec::new(),
        },
        Segment::Descend(name) => {
            let mut found = Vec::new();
            descend(value, name, &mut found);
            found
        }
        Segment::Filter(predicate) => match value {
            Value::Array(items) => items
                .iter()
                .filter(|item| predicate.matches(item))
                .collect(),
            other if predicate.matches(other) => vec![other],
            _ => Vec::new(),
        },
    }
}

fn descend<'a>(value: &'a Value, name: &str, found: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if name == "*" {
                found.extend(map.values());
            } else if let Some(child) = map.get(name) {
                found.push(child);
            }
            for child in map.values() {
                descend(child, name, found);
            }
        }
        Value::Array(items) => {
            if name == "*" {
                found.extend(items.iter());
            }
            for item in items {
                descend(item, name, found);
            }
        }
        _ => {}
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    if index >= 0 {
        return usize::try_from(index).ok();
    }
    let back = usize::try_from(index.unsigned_abs()).ok()?;
    len.checked_sub(back)
}

fn clamp_index(index: i64, len: usize) -> usize {
    if index >= 0 {
        usize::try_from(index).map_or(len, |index| index.min(len))
    } else {
        resolve_index(index, len).unwrap_or(0)
    }
}

impl Predicate {
    fn matches(&self, item: &Value) -> bool {
        let selected = select(&self.path, vec![item]);
        let Some(value) = selected.first() else {
            return false;
        };
        let Some((op, literal)) = &self.test else {
            return !matches!(value, Value::Null | Value::Bool(false));
        };

        let ordering = match (literal, value) {
            (Literal::Num(expected), Value::Number(actual)) => {
                actual.as_f64().and_then(|actual| actual.partial_cmp(expected))
            }
            (Literal::Str(expected), Value::String(actual)) => Some(actual.as_str().cmp(expected)),
            (Literal::Bool(expected), Value::Bool(actual)) => Some(actual.cmp(expected)),
            (Literal::Null, Value::Null) => Some(Ordering::Equal),
            _ => None,
        };
        match (op, ordering) {
            (CmpOp::Eq, Some(ordering)) => ordering == Ordering::Equal,
            (CmpOp::Ne, Some(ordering)) => ordering != Ordering::Equal,
            (CmpOp::Ne, None) => true,
            (CmpOp::Lt, Some(ordering)) => ordering == Ordering::Less,
            (CmpOp::Le, Some(ordering)) => ordering != Ordering::Greater,
            (CmpOp::Gt, Some(ordering)) => ordering == Ordering::Greater,
            (CmpOp::Ge, Some(ordering)) => ordering != Ordering::Less,
            _ => false,
        }
    }
}

struct Parser<'a> {
    raw: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(raw: &'a str, expr: &str) -> Self {
        Self {
            raw,
            chars: expr.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> QueryError {
        QueryError::parse(self.raw, self.pos, reason)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn segments(&mut self) -> Result<Vec<Segment>, QueryError> {
        let mut segments = Vec::new();
        if !matches!(self.peek(), Some('.' | '[')) {
            segments.push(self.child()?);
        }
        while let Some(c) = self.peek() {
            match c {
                '.' if self.peek_at(1) == Some('.') => {
                    self.pos += 2;
                    let name = if self.peek() == Some('*') {
                        self.pos += 1;
                        "*".to_string()
                    } else {
                        self.ident()?
                    };
                    segments.push(Segment::Descend(name));
                }
                '.' => {
                    self.pos += 1;
                    match self.peek() {
                        None => break,
                        Some('[') => {}
                        Some(_) => segments.push(self.child()?),
                    }
                }
                '[' => segments.push(self.bracket()?),
                other => return Err(self.error(format!("unexpected character {other:?}"))),
            }
        }

        Ok(segments)
    }

    fn child(&mut self) -> Result<Segment, QueryError> {
        if self.peek() == Some('*') {
            self.pos += 1;
            return Ok(Segment::Wildcard);
        }
        Ok(Segment::Child(self.ident()?))
    }

    fn ident(&mut self) -> Result<String, QueryError> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            match c {
                '\\' => {
                    let Some(escaped) = self.peek_at(1) else {
                        return Err(self.error("dangling escape"));
                    };
                    name.push(escaped);
                    self.pos += 2;
                }
                '.' | '[' | ']' | ' ' | '=' | '!' | '<' | '>' | ')' => break,
                other => {
                    name.push(other);
                    self.pos += 1;
                }
            }
        }
        if name.is_empty() {
            return Err(self.error("expecting a field name"));
        }
        Ok(name)
    }

    fn bracket(&mut self) -> Result<Segment, QueryError> {
        self.pos += 1;
        self.skip_ws();
        let segment = match self.peek() {
            Some('*') => {
                self.pos += 1;
                Segment::Wildcard
            }
            Some(quote @ ('\'' | '"')) => Segment::Child(self.quoted(quote)?),
            Some('?') => {
                self.pos += 1;
                self.expect('(')?;
                let predicate = self.predicate()?;
                self.skip_ws();
                self.expect(')')?;
                Segment::Filter(predicate)
            }
            _ => self.index_or_slice()?,
        };
        self.skip_ws();
        self.expect(']')?;
        Ok(segment)
    }

    fn index_or_slice(&mut self) -> Result<Segment, QueryError> {
        let start = self.integer()?;
        self.skip_ws();
        if self.peek() != Some(':') {
            return start
                .map(Segment::Index)
                .ok_or_else(|| self.error("expecting an index, '*', a quoted key or a filter"));
        }
        self.pos += 1;
        self.skip_ws();
        let end = self.integer()?;
        Ok(Segment::Slice(start, end))
    }

    fn integer(&mut self) -> Result<Option<i64>, QueryError> {
        let begin = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == begin {
            return Ok(None);
        }
        let digits = self.chars[begin..self.pos].iter().collect::<String>();
        digits
            .parse::<i64>()
            .map(Some)
            .map_err(|_| self.error(format!("invalid index {digits:?}")))
    }

    fn predicate(&mut self) -> Result<Predicate, QueryError> {
        self.skip_ws();
        self.expect('@')?;
        let mut path = Vec::new();
        while let Some(c) = self.peek() {
            match c {
                '.' => {
                    self.pos += 1;
                    path.push(self.child()?);
                }
                '[' => path.push(self.bracket()?),
                _ => break,
            }
        }
        self.skip_ws();

        let op = match (self.peek(), self.peek_at(1)) {
            (Some('='), Some('=')) => Some((CmpOp::Eq, 2)),
            (Some('!'), Some('=')) => Some((CmpOp::Ne, 2)),
            (Some('<'), Some('=')) => Some((CmpOp::Le, 2)),
            (Some('>'), Some('=')) => Some((CmpOp::Ge, 2)),
            (Some('<'), _) => Some((CmpOp::Lt, 1)),
            (Some('>'), _) => Some((CmpOp::Gt, 1)),
            _ => None,
        };
        let Some((op, width)) = op else {
            return Ok(Predicate { path, test: None });
        };
        self.pos += width;
        self.skip_ws();
        let literal = self.literal()?;

        Ok(Predicate {
            path,
            test: Some((op, literal)),
        })
    }

    fn literal(&mut self) -> Result<Literal, QueryError> {
        if let Some(quote @ ('\'' | '"')) = self.peek() {
            return Ok(Literal::Str(self.quoted(quote)?));
        }

        let begin = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
        {
            self.pos += 1;
        }
        let word = self.chars[begin..self.pos].iter().collect::<String>();
        match word.as_str() {
            "" => Err(self.error("expecting a literal")),
            "true" => Ok(Literal::Bool(true)),
            "false" => Ok(Literal::Bool(false)),
            "null" => Ok(Literal::Null),
            number => number
                .parse::<f64>()
                .map(Literal::Num)
                .map_err(|_| self.error(format!("invalid literal {number:?}"))),
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String, QueryError> {
        self.pos += 1;
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('\\') => {
                    if let Some(escaped) = self.peek_at(1) {
                        text.push(escaped);
                    }
                    self.pos += 2;
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(text);
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), QueryError> {
        if self.peek() != Some(expected) {
            return Err(self.error(format!("expecting {expected:?}")));
        }
        self.pos += 1;
        Ok(())
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::JsonPath;
    use serde_json::{Value, json};

    fn pod() -> Value {
        json!({
            "metadata": {
                "name": "fred",
                "namespace": "ns1",
                "labels": {"app.kubernetes.io/name": "blee", "tier": "web"}
            },
            "spec": {
                "containers": [
                    {"name": "c1", "image": "nginx:1.25"},
                    {"name": "c2", "image": "busybox"}
                ]
            },
            "status": {
                "addresses": [
                    {"type": "InternalIP", "ip": "10.0.0.1"},
                    {"type": "CiliumInternalIP", "ip": "10.0.0.2"}
                ],
                "restarts": 3
            }
        })
    }

    fn find(path: &str) -> Vec<Value> {
        JsonPath::parse(path)
            .unwrap()
            .find(&pod())
            .into_iter()
            .cloned()
            .collect()
    }

    #[test]
    fn plain_fields() {
        assert_eq!(find(".metadata.name"), vec![json!("fred")]);
        assert_eq!(find("{.metadata.namespace}"), vec![json!("ns1")]);
        assert_eq!(find("$.status.restarts"), vec![json!(3)]);
        assert!(find(".metadata.zorg").is_empty());
    }

    #[test]
    fn indices_and_wildcards() {
        assert_eq!(find(".spec.containers[0].name"), vec![json!("c1")]);
        assert_eq!(find(".spec.containers[-1].name"), vec![json!("c2")]);
        assert_eq!(
            find(".spec.containers[*].image"),
            vec![json!("nginx:1.25"), json!("busybox")]
        );
        assert_eq!(find(".spec.containers[0:1].name"), vec![json!("c1")]);
        assert!(find(".spec.containers[5].name").is_empty());
    }

    #[test]
    fn escaped_and_quoted_keys() {
        assert_eq!(
            find(".metadata.labels.app\\.kubernetes\\.io/name"),
            vec![json!("blee")]
        );
        assert_eq!(find(".metadata.labels['tier']"), vec![json!("web")]);
    }

    #[test]
    fn filters_and_descent() {
        assert_eq!(
            find(".status.addresses[?(@.type == 'CiliumInternalIP')].ip"),
            vec![json!("10.0.0.2")]
        );
        assert_eq!(find(".status.addresses[?(@.type != 'CiliumInternalIP')].ip").len(), 1);
        assert_eq!(find("..image"), vec![json!("nginx:1.25"), json!("busybox")]);
        assert_eq!(find(".status[?(@.restarts > 2)].restarts"), vec![json!(3)]);
    }

    #[test]
    fn malformed_paths_fail_to_parse() {
        assert!(JsonPath::parse("").is_err());
        assert!(JsonPath::parse(".spec.containers[").is_err());
        assert!(JsonPath::parse(".spec.containers[?(@.name == 'x'").is_err());
        assert!(JsonPath::parse(".spec.containers[abc]").is_err());
    }
}
