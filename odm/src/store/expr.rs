//! Condition, update and projection expressions for the in-memory store.
//!
//! Supports the subset of the store's expression language that models
//! generate: comparisons, `AND`/`OR`/`NOT`, parentheses, the
//! `attribute_exists`, `attribute_not_exists`, `contains` and `begins_with`
//! functions, `SET` (with `if_not_exists` and `+`/`-`) and `REMOVE`.

use super::StoreResult;
use crate::error::StoreError;
use dynadoc_engine::codec::parse_number;
use dynadoc_engine::wire::{AttributeNames, AttributeValues};
use dynadoc_engine::{AttributeValue, Item};
use serde_json::Number;
use std::cmp::Ordering;

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::service(StoreError::VALIDATION, message)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Placeholder(String),
    Word(String),
    Index(usize),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Plus,
    Minus,
    Cmp(CmpOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn tokenize(input: &str) -> StoreResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let word_end = |mut j: usize| {
        while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
            j += 1;
        }
        j
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' | ')' | '[' | ']' | ',' | '.' | '+' | '-' | '=' => {
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ',' => Token::Comma,
                    '.' => Token::Dot,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    _ => Token::Cmp(CmpOp::Eq),
                });
                i += 1;
            }
            '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('<', Some('>')) => (CmpOp::Ne, 2),
                    ('<', Some('=')) => (CmpOp::Le, 2),
                    ('<', _) => (CmpOp::Lt, 1),
                    ('>', Some('=')) => (CmpOp::Ge, 2),
                    _ => (CmpOp::Gt, 1),
                };
                tokens.push(Token::Cmp(op));
                i += width;
            }
            ':' | '#' => {
                let end = word_end(i + 1);
                if end == i + 1 {
                    return Err(invalid(format!("dangling '{c}' in expression: {input}")));
                }
                let text: String = chars[i..end].iter().collect();
                tokens.push(if c == ':' {
                    Token::Placeholder(text)
                } else {
                    Token::Name(text)
                });
                i = end;
            }
            c if c.is_ascii_digit() => {
                let end = word_end(i);
                let text: String = chars[i..end].iter().collect();
                let n = text
                    .parse()
                    .map_err(|_| invalid(format!("invalid list index {text}")))?;
                tokens.push(Token::Index(n));
                i = end;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let end = word_end(i);
                tokens.push(Token::Word(chars[i..end].iter().collect()));
                i = end;
            }
            other => return Err(invalid(format!("unexpected '{other}' in expression: {input}"))),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PathElement {
    Key(String),
    Index(usize),
}

pub(crate) type Path = Vec<PathElement>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Path(Path),
    Value(AttributeValue),
}

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Condition {
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Compare(Operand, CmpOp, Operand),
    Exists(Path),
    NotExists(Path),
    Contains(Operand, Operand),
    BeginsWith(Operand, Operand),
}

#[derive(Debug, Clone, PartialEq)]
enum ValueExpr {
    Operand(Operand),
    IfNotExists(Path, Box<ValueExpr>),
    Add(Box<ValueExpr>, Box<ValueExpr>),
    Sub(Box<ValueExpr>, Box<ValueExpr>),
}

/// A parsed update expression.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct Update {
    set: Vec<(Path, ValueExpr)>,
    remove: Vec<Path>,
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    names: &'a AttributeNames,
    values: &'a AttributeValues,
}

impl<'a> Parser<'a> {
    fn new(input: &str, names: &'a AttributeNames, values: &'a AttributeValues) -> StoreResult<Self> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
            names,
            values,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> StoreResult<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(invalid(format!("expected {expected:?}, found {other:?}"))),
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn finished(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn condition(&mut self) -> StoreResult<Condition> {
        let mut left = self.conjunction()?;
        while self.at_keyword("OR") {
            self.next();
            let right = self.conjunction()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn conjunction(&mut self) -> StoreResult<Condition> {
        let mut left = self.negation()?;
        while self.at_keyword("AND") {
            self.next();
            let right = self.negation()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn negation(&mut self) -> StoreResult<Condition> {
        if self.at_keyword("NOT") {
            self.next();
            return Ok(Condition::Not(Box::new(self.negation()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> StoreResult<Condition> {
        if self.peek() == Some(&Token::LParen) {
            self.next();
            let inner = self.condition()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }

        if let (Some(Token::Word(function)), Some(Token::LParen)) = (self.peek(), self.peek_at(1)) {
            let function = function.to_ascii_lowercase();
            self.next();
            self.next();
            let condition = match function.as_str() {
                "attribute_exists" => Condition::Exists(self.path()?),
                "attribute_not_exists" => Condition::NotExists(self.path()?),
                "contains" | "begins_with" => {
                    let target = self.operand()?;
                    self.expect(Token::Comma)?;
                    let operand = self.operand()?;
                    if function == "contains" {
                        Condition::Contains(target, operand)
                    } else {
                        Condition::BeginsWith(target, operand)
                    }
                }
                other => return Err(invalid(format!("unsupported function {other}"))),
            };
            self.expect(Token::RParen)?;
            return Ok(condition);
        }

        let left = self.operand()?;
        let op = match self.next() {
            Some(Token::Cmp(op)) => op,
            other => return Err(invalid(format!("expected comparator, found {other:?}"))),
        };
        let right = self.operand()?;
        Ok(Condition::Compare(left, op, right))
    }

    fn operand(&mut self) -> StoreResult<Operand> {
        if let Some(Token::Placeholder(name)) = self.peek() {
            let value = self
                .values
                .get(name)
                .cloned()
                .ok_or_else(|| invalid(format!("unresolved attribute value {name}")))?;
            self.next();
            return Ok(Operand::Value(value));
        }
        Ok(Operand::Path(self.path()?))
    }

    fn segment(&mut self) -> StoreResult<String> {
        match self.next() {
            Some(Token::Name(alias)) => self
                .names
                .get(&alias)
                .cloned()
                .ok_or_else(|| invalid(format!("unresolved attribute name {alias}"))),
            Some(Token::Word(word)) => Ok(word),
            other => Err(invalid(format!("expected attribute path, found {other:?}"))),
        }
    }

    fn path(&mut self) -> StoreResult<Path> {
        let mut path = vec![PathElement::Key(self.segment()?)];
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.next();
                    path.push(PathElement::Key(self.segment()?));
                }
                Some(Token::LBracket) => {
                    self.next();
                    match self.next() {
                        Some(Token::Index(i)) => path.push(PathElement::Index(i)),
                        other => return Err(invalid(format!("expected list index, found {other:?}"))),
                    }
                    self.expect(Token::RBracket)?;
                }
                _ => return Ok(path),
            }
        }
    }

    fn value_expr(&mut self) -> StoreResult<ValueExpr> {
        let left = self.value_term()?;
        match self.peek() {
            Some(Token::Plus) => {
                self.next();
                Ok(ValueExpr::Add(Box::new(left), Box::new(self.value_term()?)))
            }
            Some(Token::Minus) => {
                self.next();
                Ok(ValueExpr::Sub(Box::new(left), Box::new(self.value_term()?)))
            }
            _ => Ok(left),
        }
    }

    fn value_term(&mut self) -> StoreResult<ValueExpr> {
        if let (Some(Token::Word(w)), Some(Token::LParen)) = (self.peek(), self.peek_at(1)) {
            if !w.eq_ignore_ascii_case("if_not_exists") {
                return Err(invalid(format!("unsupported function {w}")));
            }
            self.next();
            self.next();
            let path = self.path()?;
            self.expect(Token::Comma)?;
            let fallback = self.value_expr()?;
            self.expect(Token::RParen)?;
            return Ok(ValueExpr::IfNotExists(path, Box::new(fallback)));
        }
        Ok(ValueExpr::Operand(self.operand()?))
    }

    fn update(&mut self) -> StoreResult<Update> {
        let mut update = Update::default();
        while !self.finished() {
            if self.at_keyword("SET") {
                self.next();
                loop {
                    let path = self.path()?;
                    self.expect(Token::Cmp(CmpOp::Eq))?;
                    update.set.push((path, self.value_expr()?));
                    if self.peek() != Some(&Token::Comma) {
                        break;
                    }
                    self.next();
                }
            } else if self.at_keyword("REMOVE") {
                self.next();
                loop {
                    update.remove.push(self.path()?);
                    if self.peek() != Some(&Token::Comma) {
                        break;
                    }
                    self.next();
                }
            } else {
                return Err(invalid(format!(
                    "unsupported update clause at {:?}",
                    self.peek()
                )));
            }
        }
        if update.set.is_empty() && update.remove.is_empty() {
            return Err(invalid("update expression is empty"));
        }
        Ok(update)
    }
}

/// Parse a condition, filter or key-condition expression.
pub(crate) fn parse_condition(
    input: &str,
    names: &AttributeNames,
    values: &AttributeValues,
) -> StoreResult<Condition> {
    let mut parser = Parser::new(input, names, values)?;
    let condition = parser.condition()?;
    if !parser.finished() {
        return Err(invalid(format!("trailing tokens in expression: {input}")));
    }
    Ok(condition)
}

/// Parse an update expression.
pub(crate) fn parse_update(
    input: &str,
    names: &AttributeNames,
    values: &AttributeValues,
) -> StoreResult<Update> {
    Parser::new(input, names, values)?.update()
}

/// Parse a projection expression into its paths.
pub(crate) fn parse_projection(input: &str, names: &AttributeNames) -> StoreResult<Vec<Path>> {
    let values = AttributeValues::new();
    let mut parser = Parser::new(input, names, &values)?;
    let mut paths = vec![parser.path()?];
    while parser.peek() == Some(&Token::Comma) {
        parser.next();
        paths.push(parser.path()?);
    }
    if !parser.finished() {
        return Err(invalid(format!("trailing tokens in projection: {input}")));
    }
    Ok(paths)
}

fn resolve<'i>(item: &'i Item, path: &[PathElement]) -> Option<&'i AttributeValue> {
    let (first, rest) = path.split_first()?;
    let PathElement::Key(key) = first else {
        return None;
    };
    let mut current = item.get(key)?;
    for element in rest {
        current = match (element, current) {
            (PathElement::Key(k), AttributeValue::Map(map)) => map.get(k)?,
            (PathElement::Index(i), AttributeValue::List(list)) => list.get(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

fn operand_value<'v>(operand: &'v Operand, item: &'v Item) -> Option<&'v AttributeValue> {
    match operand {
        Operand::Path(path) => resolve(item, path),
        Operand::Value(value) => Some(value),
    }
}

fn as_number(value: &AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Number(n) => n.parse().ok(),
        _ => None,
    }
}

fn compare(a: &AttributeValue, b: &AttributeValue) -> Option<Ordering> {
    match (a, b) {
        (AttributeValue::Number(_), AttributeValue::Number(_)) => {
            as_number(a)?.partial_cmp(&as_number(b)?)
        }
        (AttributeValue::String(x), AttributeValue::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn equal(a: &AttributeValue, b: &AttributeValue) -> bool {
    match (a, b) {
        (AttributeValue::Number(_), AttributeValue::Number(_)) => {
            compare(a, b) == Some(Ordering::Equal)
        }
        (AttributeValue::StringSet(x), AttributeValue::StringSet(y)) => {
            x.len() == y.len() && x.iter().all(|v| y.contains(v))
        }
        (AttributeValue::NumberSet(x), AttributeValue::NumberSet(y)) => {
            x.len() == y.len()
                && x.iter().all(|v| {
                    y.iter().any(|w| {
                        equal(
                            &AttributeValue::Number(v.clone()),
                            &AttributeValue::Number(w.clone()),
                        )
                    })
                })
        }
        _ => a == b,
    }
}

impl Condition {
    /// Evaluate against one item.
    pub(crate) fn matches(&self, item: &Item) -> bool {
        match self {
            Condition::And(a, b) => a.matches(item) && b.matches(item),
            Condition::Or(a, b) => a.matches(item) || b.matches(item),
            Condition::Not(c) => !c.matches(item),
            Condition::Exists(path) => resolve(item, path).is_some(),
            Condition::NotExists(path) => resolve(item, path).is_none(),
            Condition::Compare(left, op, right) => {
                let (Some(a), Some(b)) = (operand_value(left, item), operand_value(right, item))
                else {
                    return false;
                };
                match op {
                    CmpOp::Eq => equal(a, b),
                    CmpOp::Ne => !equal(a, b),
                    CmpOp::Lt => compare(a, b) == Some(Ordering::Less),
                    CmpOp::Le => matches!(compare(a, b), Some(Ordering::Less | Ordering::Equal)),
                    CmpOp::Gt => compare(a, b) == Some(Ordering::Greater),
                    CmpOp::Ge => {
                        matches!(compare(a, b), Some(Ordering::Greater | Ordering::Equal))
                    }
                }
            }
            Condition::Contains(target, operand) => {
                let (Some(target), Some(operand)) =
                    (operand_value(target, item), operand_value(operand, item))
                else {
                    return false;
                };
                match (target, operand) {
                    (AttributeValue::String(s), AttributeValue::String(sub)) => s.contains(sub.as_str()),
                    (AttributeValue::StringSet(set), AttributeValue::String(member)) => {
                        set.contains(member)
                    }
                    (AttributeValue::NumberSet(set), AttributeValue::Number(_)) => set
                        .iter()
                        .any(|n| equal(&AttributeValue::Number(n.clone()), operand)),
                    (AttributeValue::List(list), member) => list.iter().any(|v| equal(v, member)),
                    _ => false,
                }
            }
            Condition::BeginsWith(target, prefix) => matches!(
                (operand_value(target, item), operand_value(prefix, item)),
                (Some(AttributeValue::String(s)), Some(AttributeValue::String(p))) if s.starts_with(p.as_str())
            ),
        }
    }
}

fn arithmetic(a: &AttributeValue, b: &AttributeValue, negate: bool) -> StoreResult<AttributeValue> {
    let (AttributeValue::Number(x), AttributeValue::Number(y)) = (a, b) else {
        return Err(invalid("arithmetic operands must be numbers"));
    };
    let (x, y) = (
        parse_number(x).map_err(|e| invalid(e.to_string()))?,
        parse_number(y).map_err(|e| invalid(e.to_string()))?,
    );
    let result = match (x.as_i64(), y.as_i64()) {
        (Some(x), Some(y)) => {
            let sum = if negate { x.checked_sub(y) } else { x.checked_add(y) };
            sum.map(Number::from)
        }
        _ => None,
    };
    let result = match result {
        Some(n) => n,
        None => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            Number::from_f64(if negate { x - y } else { x + y })
                .ok_or_else(|| invalid("arithmetic result is not a finite number"))?
        }
    };
    Ok(AttributeValue::Number(result.to_string()))
}

impl ValueExpr {
    fn evaluate(&self, item: &Item) -> StoreResult<AttributeValue> {
        match self {
            ValueExpr::Operand(operand) => operand_value(operand, item)
                .cloned()
                .ok_or_else(|| invalid("update references a missing attribute")),
            ValueExpr::IfNotExists(path, fallback) => match resolve(item, path) {
                Some(value) => Ok(value.clone()),
                None => fallback.evaluate(item),
            },
            ValueExpr::Add(a, b) => arithmetic(&a.evaluate(item)?, &b.evaluate(item)?, false),
            ValueExpr::Sub(a, b) => arithmetic(&a.evaluate(item)?, &b.evaluate(item)?, true),
        }
    }
}

fn set_path(item: &mut Item, path: &[PathElement], value: AttributeValue) -> StoreResult<()> {
    let Some((PathElement::Key(first), rest)) = path.split_first() else {
        return Err(invalid("document path must start with an attribute name"));
    };
    if rest.is_empty() {
        item.insert(first.clone(), value);
        return Ok(());
    }
    let mut current = item
        .get_mut(first)
        .ok_or_else(|| invalid("the document path provided in the update expression is invalid"))?;
    for (i, element) in rest.iter().enumerate() {
        let last = i == rest.len() - 1;
        current = match (element, current) {
            (PathElement::Key(k), AttributeValue::Map(map)) => {
                if last {
                    map.insert(k.clone(), value);
                    return Ok(());
                }
                map.get_mut(k)
            }
            (PathElement::Index(idx), AttributeValue::List(list)) => {
                if last {
                    if *idx < list.len() {
                        list[*idx] = value;
                    } else {
                        list.push(value);
                    }
                    return Ok(());
                }
                list.get_mut(*idx)
            }
            _ => None,
        }
        .ok_or_else(|| invalid("the document path provided in the update expression is invalid"))?;
    }
    Ok(())
}

fn remove_path(item: &mut Item, path: &[PathElement]) {
    let Some((PathElement::Key(first), rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        item.remove(first);
        return;
    }
    let Some(mut current) = item.get_mut(first) else {
        return;
    };
    for (i, element) in rest.iter().enumerate() {
        let last = i == rest.len() - 1;
        let next = match (element, current) {
            (PathElement::Key(k), AttributeValue::Map(map)) => {
                if last {
                    map.remove(k);
                    return;
                }
                map.get_mut(k)
            }
            (PathElement::Index(idx), AttributeValue::List(list)) => {
                if last {
                    if *idx < list.len() {
                        list.remove(*idx);
                    }
                    return;
                }
                list.get_mut(*idx)
            }
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return,
        }
    }
}

impl Update {
    /// Apply to an item. Right-hand sides see the item as it was before the update.
    pub(crate) fn apply(&self, item: &mut Item) -> StoreResult<()> {
        let original = item.clone();
        for (path, expr) in &self.set {
            let value = expr.evaluate(&original)?;
            set_path(item, path, value)?;
        }
        for path in &self.remove {
            remove_path(item, path);
        }
        Ok(())
    }
}

/// Keep only the projected paths of an item.
pub(crate) fn project(item: &Item, paths: &[Path]) -> Item {
    let mut out = Item::new();
    for path in paths {
        let Some(PathElement::Key(first)) = path.first() else {
            continue;
        };
        if path.len() == 1 {
            if let Some(value) = item.get(first) {
                out.insert(first.clone(), value.clone());
            }
            continue;
        }
        // Nested projections keep the enclosing top-level attribute.
        if resolve(item, path).is_some() {
            if let Some(value) = item.get(first) {
                out.insert(first.clone(), value.clone());
            }
        }
    }
    out
}
