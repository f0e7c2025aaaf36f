// Restricted boolean expressions used to gate steps.
//
// Conditions are tokenized and parsed into a small AST, then evaluated
// against the result store. The grammar has literals, `results.*` paths,
// `len(...)`, comparisons and `and`/`or`/`not`. Nothing else runs.

use crate::error::ConditionError;
use crate::store::{ResultStore, RESULTS_PREFIX};
use serde_json::Value;
use std::cmp::Ordering;

/// Deepest expression tree the parser will build
const MAX_DEPTH: usize = 128;

/// Evaluate a condition against the results recorded so far.
///
/// Any error means the condition is unevaluatable; the caller treats that
/// the same as `false`.
pub fn evaluate(expr: &str, store: &ResultStore) -> Result<bool, ConditionError> {
    let ast = parse(expr)?;
    let value = eval(&ast, store)?;
    Ok(truthy(&value))
}

/// Parse a condition without evaluating it
pub fn parse(expr: &str) -> Result<Expr, ConditionError> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let ast = parser.parse_or()?;

    if let Some(token) = parser.peek() {
        return Err(ConditionError::Parse(format!(
            "unexpected {token:?} in '{expr}'"
        )));
    }

    Ok(ast)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Parsed condition
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(String),
    Len(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(CompareOp),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let next_is_eq = chars.get(i + 1) == Some(&'=');
                let op = match (c, next_is_eq) {
                    ('=', true) => CompareOp::Eq,
                    ('!', true) => CompareOp::Ne,
                    ('<', true) => CompareOp::Le,
                    ('>', true) => CompareOp::Ge,
                    ('<', false) => CompareOp::Lt,
                    ('>', false) => CompareOp::Gt,
                    _ => {
                        return Err(ConditionError::Parse(format!(
                            "unexpected '{c}' at offset {i}"
                        )))
                    }
                };
                tokens.push(Token::Op(op));
                i += if next_is_eq { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(ConditionError::Parse(
                                "unterminated string literal".to_string(),
                            ))
                        }
                        Some('\\') if i + 1 < chars.len() => {
                            text.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() || (c == '-' && next_is_digit(&chars, i)) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let invalid = || ConditionError::Parse(format!("invalid number '{text}'"));
                let token = if text.contains('.') {
                    Token::Float(text.parse::<f64>().map_err(|_| invalid())?)
                } else {
                    Token::Int(text.parse::<i64>().map_err(|_| invalid())?)
                };
                tokens.push(token);
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '.' | '-'))
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(ConditionError::Parse(format!(
                    "unexpected '{other}' at offset {i}"
                )))
            }
        }
    }

    Ok(tokens)
}

fn next_is_digit(chars: &[char], i: usize) -> bool {
    chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(word)) if word == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn enter(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ConditionError::Parse(
                "condition nested too deeply".to_string(),
            ));
        }
        Ok(())
    }

    // Each chained operator deepens the left-leaning tree by one
    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_and()?;
        let mut chained = 0;
        while self.eat_keyword("or") {
            self.enter()?;
            chained += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth -= chained;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_not()?;
        let mut chained = 0;
        while self.eat_keyword("and") {
            self.enter()?;
            chained += 1;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth -= chained;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ConditionError> {
        if self.eat_keyword("not") {
            self.enter()?;
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ConditionError> {
        let left = self.parse_operand()?;

        if let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.parse_operand()?;

            if matches!(self.peek(), Some(Token::Op(_))) {
                return Err(ConditionError::Parse(
                    "chained comparisons are not supported".to_string(),
                ));
            }

            return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
        }

        Ok(left)
    }

    fn parse_operand(&mut self) -> Result<Expr, ConditionError> {
        match self.next() {
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.parse_or()?;
                self.expect_rparen()?;
                self.depth -= 1;
                Ok(inner)
            }
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::from(n))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::from(f))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(word)) => self.parse_ident(word),
            Some(other) => Err(ConditionError::Parse(format!("unexpected {other:?}"))),
            None => Err(ConditionError::Parse(
                "unexpected end of expression".to_string(),
            )),
        }
    }

    fn parse_ident(&mut self, word: String) -> Result<Expr, ConditionError> {
        match word.as_str() {
            "true" | "True" => Ok(Expr::Literal(Value::Bool(true))),
            "false" | "False" => Ok(Expr::Literal(Value::Bool(false))),
            "null" | "None" => Ok(Expr::Literal(Value::Null)),
            "len" => {
                if self.next() != Some(Token::LParen) {
                    return Err(ConditionError::Parse("expected '(' after len".to_string()));
                }
                self.enter()?;
                let inner = self.parse_operand()?;
                self.expect_rparen()?;
                self.depth -= 1;
                Ok(Expr::Len(Box::new(inner)))
            }
            "and" | "or" | "not" => Err(ConditionError::Parse(format!(
                "unexpected keyword '{word}'"
            ))),
            path if path.split('.').next() == Some(RESULTS_PREFIX) => {
                if path.split('.').any(str::is_empty) || !path.contains('.') {
                    return Err(ConditionError::Parse(format!("malformed path '{path}'")));
                }
                Ok(Expr::Path(path.to_string()))
            }
            other => Err(ConditionError::Parse(format!(
                "unknown identifier '{other}'"
            ))),
        }
    }

    fn expect_rparen(&mut self) -> Result<(), ConditionError> {
        match self.next() {
            Some(Token::RParen) => Ok(()),
            _ => Err(ConditionError::Parse("expected ')'".to_string())),
        }
    }
}

fn eval(expr: &Expr, store: &ResultStore) -> Result<Value, ConditionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(path) => store
            .get(path)
            .cloned()
            .ok_or_else(|| ConditionError::Unresolved(path.clone())),
        Expr::Len(inner) => {
            let value = eval(inner, store)?;
            let len = match &value {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => {
                    return Err(ConditionError::Type(format!(
                        "len() of {}",
                        type_name(other)
                    )))
                }
            };
            Ok(Value::from(len))
        }
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, store)?))),
        Expr::And(left, right) => {
            if !truthy(&eval(left, store)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval(right, store)?)))
        }
        Expr::Or(left, right) => {
            if truthy(&eval(left, store)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval(right, store)?)))
        }
        Expr::Compare(op, left, right) => {
            let left = eval(left, store)?;
            let right = eval(right, store)?;
            compare(*op, &left, &right).map(Value::Bool)
        }
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ConditionError> {
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::Ne => Ok(!values_equal(left, right)),
        CompareOp::Lt => Ok(order(left, right)? == Ordering::Less),
        CompareOp::Le => Ok(order(left, right)? != Ordering::Greater),
        CompareOp::Gt => Ok(order(left, right)? == Ordering::Greater),
        CompareOp::Ge => Ok(order(left, right)? != Ordering::Less),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) if a.is_f64() || b.is_f64() => {
            a.as_f64() == b.as_f64()
        }
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Result<Ordering, ConditionError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                return Ok(a.cmp(&b));
            }
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            a.partial_cmp(&b)
                .ok_or_else(|| ConditionError::Type("numbers are not comparable".to_string()))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(ConditionError::Type(format!(
            "cannot order {} and {}",
            type_name(left),
            type_name(right)
        ))),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StepId, StepResult};
    use chrono::Utc;
    use serde_json::json;

    fn store() -> ResultStore {
        let mut store = ResultStore::new();
        store.record(
            StepId::new("step1"),
            StepResult::success(
                json!({"output": "Result of: echo 'success'", "success": true}),
                Utc::now(),
            ),
        );
        store.record(
            StepId::new("get_data"),
            StepResult::success(
                json!({"output": "important data", "rows": [1, 2, 3], "score": 0.75, "empty": ""}),
                Utc::now(),
            ),
        );
        store.record(StepId::new("gate"), StepResult::skipped(None));
        store
    }

    fn check(expr: &str) -> Result<bool, ConditionError> {
        evaluate(expr, &store())
    }

    #[test]
    fn test_boolean_field_comparisons() {
        assert_eq!(check("results.step1.success == True"), Ok(true));
        assert_eq!(check("results.step1.success == false"), Ok(false));
        assert_eq!(check("results.step1.success != False"), Ok(true));
    }

    #[test]
    fn test_len_comparisons() {
        assert_eq!(check("len(results.get_data.output) > 0"), Ok(true));
        assert_eq!(check("len(results.get_data.rows) == 3"), Ok(true));
        assert_eq!(check("len(results.get_data.empty) >= 1"), Ok(false));
        assert_eq!(check("len(results.get_data) == 4"), Ok(true));
        assert_eq!(check("len('héllo') == 5"), Ok(true));
    }

    #[test]
    fn test_numeric_and_string_ordering() {
        assert_eq!(check("results.get_data.score < 1"), Ok(true));
        assert_eq!(check("results.get_data.score >= 0.75"), Ok(true));
        assert_eq!(check("-2 < -1"), Ok(true));
        assert_eq!(check("3 == 3.0"), Ok(true));
        assert_eq!(check("'abc' < \"abd\""), Ok(true));
        assert_eq!(check("results.get_data.output == 'important data'"), Ok(true));
    }

    #[test]
    fn test_boolean_combinators_and_precedence() {
        assert_eq!(check("not results.step1.success"), Ok(false));
        assert_eq!(check("true or false and false"), Ok(true));
        assert_eq!(check("(true or false) and false"), Ok(false));
        assert_eq!(check("not false and false"), Ok(false));
        assert_eq!(check("not (false and false)"), Ok(true));
        assert_eq!(check("not not true"), Ok(true));
    }

    #[test]
    fn test_truthiness_of_bare_operands() {
        assert_eq!(check("results.get_data.rows"), Ok(true));
        assert_eq!(check("results.get_data.empty"), Ok(false));
        assert_eq!(check("0"), Ok(false));
        assert_eq!(check("null"), Ok(false));
    }

    #[test]
    fn test_unresolved_paths_are_unevaluatable() {
        assert_eq!(
            check("results.gate.output == 'x'"),
            Err(ConditionError::Unresolved("results.gate.output".to_string()))
        );
        assert!(matches!(
            check("results.step1.output.success == True"),
            Err(ConditionError::Unresolved(_))
        ));
        assert!(matches!(
            check("len(results.unknown.output) > 0"),
            Err(ConditionError::Unresolved(_))
        ));
    }

    #[test]
    fn test_short_circuit_skips_unresolved_side() {
        assert_eq!(check("false and results.missing.x == 1"), Ok(false));
        assert_eq!(check("true or results.missing.x == 1"), Ok(true));
        assert!(check("true and results.missing.x == 1").is_err());
    }

    #[test]
    fn test_type_errors() {
        assert!(matches!(check("len(3) > 0"), Err(ConditionError::Type(_))));
        assert!(matches!(
            check("results.step1.success > 1"),
            Err(ConditionError::Type(_))
        ));
        assert!(matches!(check("'a' < 1"), Err(ConditionError::Type(_))));
        assert_eq!(check("'1' == 1"), Ok(false));
    }

    #[test]
    fn test_rejects_anything_outside_the_grammar() {
        for expr in [
            "__import__('os').system('rm -rf /')",
            "x = 1",
            "results.step1.output.upper()",
            "open('file')",
            "1 < 2 < 3",
            "(true",
            "true)",
            "",
            "results",
            "results..x == 1",
            "len results.step1",
            "'unterminated",
            "true and",
            "a ! b",
        ] {
            assert!(
                matches!(check(expr), Err(ConditionError::Parse(_))),
                "expected parse error for {expr:?}"
            );
        }
    }

    #[test]
    fn test_deeply_nested_conditions_are_rejected() {
        let parens = format!("{}true{}", "(".repeat(10_000), ")".repeat(10_000));
        let nots = format!("{}true", "not ".repeat(10_000));
        let lens = format!("{}results.a{} > 0", "len(".repeat(10_000), ")".repeat(10_000));
        let chain = vec!["true"; 10_000].join(" and ");

        for expr in [&parens, &nots, &lens, &chain] {
            assert!(matches!(
                evaluate(expr, &ResultStore::new()),
                Err(ConditionError::Parse(msg)) if msg.contains("nested too deeply")
            ));
        }
    }

    #[test]
    fn test_moderate_nesting_still_evaluates() {
        let expr = format!("{}true{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(check(&expr), Ok(true));
        assert_eq!(check(&format!("{}true", "not ".repeat(20))), Ok(true));
        assert_eq!(check(&vec!["true"; 50].join(" and ")), Ok(true));
    }

    #[test]
    fn test_parse_builds_expected_tree() {
        let ast = parse("not results.a.x == 1 or len(results.b) > 2").unwrap();
        assert_eq!(
            ast,
            Expr::Or(
                Box::new(Expr::Not(Box::new(Expr::Compare(
                    CompareOp::Eq,
                    Box::new(Expr::Path("results.a.x".to_string())),
                    Box::new(Expr::Literal(json!(1))),
                )))),
                Box::new(Expr::Compare(
                    CompareOp::Gt,
                    Box::new(Expr::Len(Box::new(Expr::Path("results.b".to_string())))),
                    Box::new(Expr::Literal(json!(2))),
                )),
            )
        );
    }
}
