use anyhow::{Error, Result};
use regex::Regex;
use std::{cmp::Ordering, fmt::Display, str::FromStr, sync::LazyLock};

use crate::{
    ebi_framework::model_error::ModelError,
    ebi_objects::event_log::{AttributeValue, Attributes},
};

/// Bound on the depth of a parsed expression.
const MAX_NESTING: usize = 500;

static UNSAFE_CONSTRUCTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"__|\bimport\b|\blambda\b|\bexec\b|\beval\b|\bopen\b|;|\[|\]|\{|\}|`")
        .expect("guard filter is a valid regex")
});

/// Where guards look up variables.
pub trait VariableScope {
    fn get_variable(&self, name: &str) -> Option<&AttributeValue>;
}

impl VariableScope for Attributes {
    fn get_variable(&self, name: &str) -> Option<&AttributeValue> {
        self.get(name)
    }
}

/// The attributes of an event shadowing the variables of a data marking.
pub struct OverlayScope<'a> {
    pub event: Option<&'a Attributes>,
    pub variables: &'a Attributes,
}

impl VariableScope for OverlayScope<'_> {
    fn get_variable(&self, name: &str) -> Option<&AttributeValue> {
        self.event
            .and_then(|event| event.get(name))
            .or_else(|| self.variables.get(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl ComparisonOperator {
    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            ComparisonOperator::Equal => ordering.is_eq(),
            ComparisonOperator::NotEqual => ordering.is_ne(),
            ComparisonOperator::Less => ordering.is_lt(),
            ComparisonOperator::LessOrEqual => ordering.is_le(),
            ComparisonOperator::Greater => ordering.is_gt(),
            ComparisonOperator::GreaterOrEqual => ordering.is_ge(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(AttributeValue),
    Variable(String),
    Not(Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Compare(ComparisonOperator, Box<Expression>, Box<Expression>),
}

impl Expression {
    /// Unknown variables and non-boolean values are false.
    pub fn is_true(&self, scope: &impl VariableScope) -> bool {
        match self {
            Expression::Not(inner) => !inner.is_true(scope),
            Expression::And(left, right) => left.is_true(scope) && right.is_true(scope),
            Expression::Or(left, right) => left.is_true(scope) || right.is_true(scope),
            Expression::Compare(operator, left, right) => {
                match (left.value(scope), right.value(scope)) {
                    (Some(left), Some(right)) => compare(*operator, &left, &right),
                    _ => false,
                }
            }
            Expression::Literal(_) | Expression::Variable(_) => {
                matches!(self.value(scope), Some(AttributeValue::Boolean(true)))
            }
        }
    }

    fn value(&self, scope: &impl VariableScope) -> Option<AttributeValue> {
        match self {
            Expression::Literal(value) => Some(value.clone()),
            Expression::Variable(name) => scope.get_variable(name).cloned(),
            _ => Some(AttributeValue::Boolean(self.is_true(scope))),
        }
    }
}

fn compare(operator: ComparisonOperator, left: &AttributeValue, right: &AttributeValue) -> bool {
    let ordering = match (left, right) {
        (AttributeValue::Int(a), AttributeValue::Int(b)) => Some(a.cmp(b)),
        (AttributeValue::String(a), AttributeValue::String(b)) => Some(a.cmp(b)),
        (AttributeValue::Boolean(a), AttributeValue::Boolean(b)) => Some(a.cmp(b)),
        _ => match (left.try_as_number(), right.try_as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    match ordering {
        Some(ordering) => operator.holds(ordering),
        None => operator == ComparisonOperator::NotEqual,
    }
}

/// A transition guard: a boolean expression over the net's variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Guard {
    source: String,
    expression: Expression,
}

impl Guard {
    pub fn parse(source: &str) -> Result<Self> {
        if let Some(found) = UNSAFE_CONSTRUCTS.find(source) {
            return Err(ModelError::InvalidNet(format!(
                "guard `{}` contains the forbidden construct `{}`",
                source,
                found.as_str()
            ))
            .into());
        }

        let tokens = tokenize(source).map_err(|message| {
            ModelError::InvalidNet(format!("guard `{}`: {}", source, message))
        })?;
        let mut parser = Parser {
            tokens,
            position: 0,
            depth: 0,
        };
        let expression = parser
            .parse_or()
            .and_then(|expression| match parser.peek() {
                None => Ok(expression),
                Some(token) => Err(format!("unexpected `{}`", token)),
            })
            .map_err(|message| ModelError::InvalidNet(format!("guard `{}`: {}", source, message)))?;

        Ok(Self {
            source: source.to_string(),
            expression,
        })
    }

    pub fn evaluate(&self, scope: &impl VariableScope) -> bool {
        self.expression.is_true(scope)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl FromStr for Guard {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Identifier(String),
    Bool(bool),
    And,
    Or,
    Not,
    Minus,
    Compare(ComparisonOperator),
    OpenParenthesis,
    CloseParenthesis,
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Int(v) => write!(f, "{}", v),
            Token::Float(v) => write!(f, "{}", v),
            Token::Str(v) => write!(f, "\"{}\"", v),
            Token::Identifier(v) => write!(f, "{}", v),
            Token::Bool(v) => write!(f, "{}", v),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::Minus => write!(f, "-"),
            Token::Compare(op) => write!(
                f,
                "{}",
                match op {
                    ComparisonOperator::Equal => "==",
                    ComparisonOperator::NotEqual => "!=",
                    ComparisonOperator::Less => "<",
                    ComparisonOperator::LessOrEqual => "<=",
                    ComparisonOperator::Greater => ">",
                    ComparisonOperator::GreaterOrEqual => ">=",
                }
            ),
            Token::OpenParenthesis => write!(f, "("),
            Token::CloseParenthesis => write!(f, ")"),
        }
    }
}

fn tokenize(source: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut result = vec![];
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                result.push(Token::OpenParenthesis);
                i += 1;
            }
            ')' => {
                result.push(Token::CloseParenthesis);
                i += 1;
            }
            '-' => {
                result.push(Token::Minus);
                i += 1;
            }
            '&' if next == Some('&') => {
                result.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                result.push(Token::Or);
                i += 2;
            }
            '=' if next == Some('=') => {
                result.push(Token::Compare(ComparisonOperator::Equal));
                i += 2;
            }
            '!' if next == Some('=') => {
                result.push(Token::Compare(ComparisonOperator::NotEqual));
                i += 2;
            }
            '!' => {
                result.push(Token::Not);
                i += 1;
            }
            '<' | '>' => {
                let or_equal = next == Some('=');
                result.push(Token::Compare(match (c, or_equal) {
                    ('<', false) => ComparisonOperator::Less,
                    ('<', true) => ComparisonOperator::LessOrEqual,
                    (_, false) => ComparisonOperator::Greater,
                    (_, true) => ComparisonOperator::GreaterOrEqual,
                }));
                i += if or_equal { 2 } else { 1 };
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|x| *x == c)
                    .ok_or_else(|| "unterminated string".to_string())?;
                result.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let number: String = chars[start..i].iter().collect();
                if number.contains('.') {
                    result.push(Token::Float(
                        number
                            .parse()
                            .map_err(|_| format!("invalid number `{}`", number))?,
                    ));
                } else {
                    result.push(Token::Int(
                        number
                            .parse()
                            .map_err(|_| format!("invalid number `{}`", number))?,
                    ));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | ':' | '.'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                result.push(match word.as_str() {
                    "and" | "AND" => Token::And,
                    "or" | "OR" => Token::Or,
                    "not" | "NOT" => Token::Not,
                    "true" | "True" => Token::Bool(true),
                    "false" | "False" => Token::Bool(false),
                    _ => Token::Identifier(word),
                });
            }
            _ => return Err(format!("unexpected character `{}`", c)),
        }
    }
    Ok(result)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    /// Upper bound on the depth of the expression under construction.
    depth: usize,
}

type ParseResult = std::result::Result<Expression, String>;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let result = self.tokens.get(self.position).cloned();
        self.position += 1;
        result
    }

    fn descend(&mut self) -> std::result::Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(format!("expression nested deeper than {} levels", MAX_NESTING));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> ParseResult {
        let depth = self.depth;
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.position += 1;
            self.descend()?;
            let right = self.parse_and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult {
        let depth = self.depth;
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.position += 1;
            self.descend()?;
            let right = self.parse_not()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_not(&mut self) -> ParseResult {
        if self.peek() == Some(&Token::Not) {
            self.position += 1;
            self.descend()?;
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expression::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult {
        let left = self.parse_primary()?;
        if let Some(Token::Compare(operator)) = self.peek() {
            let operator = *operator;
            self.position += 1;
            let right = self.parse_primary()?;
            return Ok(Expression::Compare(
                operator,
                Box::new(left),
                Box::new(right),
            ));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> ParseResult {
        match self.next() {
            Some(Token::Int(v)) => Ok(Expression::Literal(AttributeValue::Int(v))),
            Some(Token::Float(v)) => Ok(Expression::Literal(AttributeValue::Float(v))),
            Some(Token::Str(v)) => Ok(Expression::Literal(AttributeValue::String(v))),
            Some(Token::Bool(v)) => Ok(Expression::Literal(AttributeValue::Boolean(v))),
            Some(Token::Identifier(name)) => Ok(Expression::Variable(name)),
            Some(Token::Minus) => match self.next() {
                Some(Token::Int(v)) => Ok(Expression::Literal(AttributeValue::Int(-v))),
                Some(Token::Float(v)) => Ok(Expression::Literal(AttributeValue::Float(-v))),
                _ => Err("`-` must precede a number".to_string()),
            },
            Some(Token::OpenParenthesis) => {
                self.descend()?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::CloseParenthesis) => Ok(inner),
                    _ => Err("missing `)`".to_string()),
                }
            }
            Some(token) => Err(format!("unexpected `{}`", token)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ebi_framework::model_error::ModelError,
        ebi_objects::event_log::{AttributeValue, Attributes},
    };

    use super::{Guard, OverlayScope};

    fn scope(pairs: &[(&str, AttributeValue)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn comparisons() {
        let variables = scope(&[
            ("amount", AttributeValue::Int(700)),
            ("rate", AttributeValue::Float(0.25)),
            ("org:resource", AttributeValue::String("Pete".to_string())),
            ("approved", AttributeValue::Boolean(true)),
        ]);

        let check = |source: &str| Guard::parse(source).unwrap().evaluate(&variables);

        assert!(check("amount > 500"));
        assert!(check("amount >= 700 and rate < 0.5"));
        assert!(check("amount == 700.0"));
        assert!(check("org:resource == \"Pete\""));
        assert!(check("org:resource != 'Sara' && approved"));
        assert!(check("not (amount < 0) || false"));
        assert!(check("rate > -1"));
        assert!(!check("approved == False"));
        assert!(!check("amount <= 699"));
    }

    #[test]
    fn unknown_variables_are_false() {
        let variables = Attributes::new();
        assert!(!Guard::parse("x > 3").unwrap().evaluate(&variables));
        assert!(!Guard::parse("x").unwrap().evaluate(&variables));
        assert!(!Guard::parse("x != 3").unwrap().evaluate(&variables));
        assert!(Guard::parse("not x").unwrap().evaluate(&variables));
    }

    #[test]
    fn incompatible_types() {
        let variables = scope(&[("name", AttributeValue::String("5".to_string()))]);
        assert!(!Guard::parse("name == 5").unwrap().evaluate(&variables));
        assert!(Guard::parse("name != 5").unwrap().evaluate(&variables));
        assert!(!Guard::parse("name < 5").unwrap().evaluate(&variables));
    }

    #[test]
    fn event_shadows_marking() {
        let variables = scope(&[("amount", AttributeValue::Int(10))]);
        let event = scope(&[("amount", AttributeValue::Int(1000))]);
        let guard = Guard::parse("amount > 100").unwrap();

        assert!(!guard.evaluate(&OverlayScope {
            event: None,
            variables: &variables
        }));
        assert!(guard.evaluate(&OverlayScope {
            event: Some(&event),
            variables: &variables
        }));
    }

    #[test]
    fn rejected_guards() {
        let deep_parentheses = format!("{}a{}", "(".repeat(200_000), ")".repeat(200_000));
        let deep_negation = format!("{}a", "not ".repeat(200_000));
        let deep_bang = format!("{}a", "!".repeat(200_000));
        let long_conjunction = vec!["a"; 200_000].join(" and ");
        for source in [
            "__import__('os')",
            "import os",
            "x = 3",
            "x[0] > 1",
            "lambda: 1",
            "a > 1; b",
            "(a > 1",
            "a > ",
            "a > 1 b",
            "'open",
            deep_parentheses.as_str(),
            deep_negation.as_str(),
            deep_bang.as_str(),
            long_conjunction.as_str(),
        ] {
            let error = Guard::parse(source).unwrap_err();
            assert!(
                matches!(
                    error.downcast_ref::<ModelError>(),
                    Some(ModelError::InvalidNet(_))
                ),
                "{}",
                source
            );
        }
    }

    #[test]
    fn nested_guards() {
        let variables = scope(&[("a", AttributeValue::Boolean(true))]);

        let parenthesised = format!("{}a{}", "(".repeat(100), ")".repeat(100));
        assert!(Guard::parse(&parenthesised).unwrap().evaluate(&variables));

        let negated = format!("{}a", "not ".repeat(100));
        assert!(Guard::parse(&negated).unwrap().evaluate(&variables));

        let conjunction = vec!["a"; 100].join(" and ");
        assert!(Guard::parse(&conjunction).unwrap().evaluate(&variables));

        let guard = Guard::parse("(a > b) or a == \"x\" and not c").unwrap();
        assert_eq!(guard.to_string(), "(a > b) or a == \"x\" and not c");
    }
}
