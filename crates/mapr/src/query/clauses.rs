//! The building blocks of a parsed query.

use std::fmt;

use crate::aggregate::AggregateOp;
use crate::error::QueryError;
use crate::functions::SetFunction;
use crate::parser::Fields;

use super::lexer::{Token, TokenKind};

/// Words with a meaning at clause level.
pub const KEYWORDS: &[&str] = &[
    "select", "from", "where", "set", "group", "order", "rorder", "by", "interval", "limit",
    "outfile", "logformat", "and", "append",
];

fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// Writes a field name, backticked when it collides with a keyword.
pub(crate) fn write_field(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if is_keyword(name) || name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == ',')
    {
        write!(f, "`{name}`")
    } else {
        f.write_str(name)
    }
}

/// One `select` entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SelectField {
    /// Aggregation applied; bare fields behave like `last`.
    pub op: AggregateOp,
    /// Field the aggregation reads.
    pub field: String,
    /// Written without a function call.
    pub bare: bool,
}

impl SelectField {
    /// Parses `op(field)` or a bare `field`.
    pub fn parse(token: &Token) -> Result<Self, QueryError> {
        if token.kind == TokenKind::Bare {
            if let Some((name, inner)) = split_call(&token.text) {
                let op = name.parse()?;
                return Ok(Self {
                    op,
                    field: inner.to_owned(),
                    bare: false,
                });
            }
        }
        Ok(Self {
            op: AggregateOp::Last,
            field: token.text.clone(),
            bare: true,
        })
    }

    /// Column name and storage key: `count($line)` or `$time`.
    pub fn name(&self) -> String {
        if self.bare {
            self.field.clone()
        } else {
            format!("{}({})", self.op, self.field)
        }
    }
}

impl fmt::Display for SelectField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bare {
            write_field(f, &self.field)
        } else {
            write!(f, "{}({})", self.op, self.field)
        }
    }
}

/// Splits `name(inner)` into its parts.
pub(crate) fn split_call(text: &str) -> Option<(&str, &str)> {
    let open = text.find('(')?;
    let inner = text[open + 1..].strip_suffix(')')?;
    let name = &text[..open];
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name, inner))
}

/// A value in a condition or `set` expression.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operand {
    /// Looked up in the line's fields.
    Field(String),
    /// Numeric literal, kept as written.
    Number(String),
    /// Quoted string literal.
    Text(String),
}

impl Operand {
    /// Classifies a token: quoted text, bare number, or field.
    pub fn from_token(token: &Token) -> Self {
        match token.kind {
            TokenKind::Quoted => Self::Text(token.text.clone()),
            TokenKind::Bare if token.text.parse::<f64>().is_ok() => {
                Self::Number(token.text.clone())
            }
            TokenKind::Bare | TokenKind::Backtick => Self::Field(token.text.clone()),
        }
    }

    /// Resolves against `fields`; missing fields yield `None`.
    pub fn resolve<'a>(&'a self, fields: &'a Fields) -> Option<&'a str> {
        match self {
            Self::Field(name) => fields.get(name).map(String::as_str),
            Self::Number(text) | Self::Text(text) => Some(text),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write_field(f, name),
            Self::Number(text) => f.write_str(text),
            Self::Text(text) => write!(f, "\"{text}\""),
        }
    }
}

/// Comparison operators of `where`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operator {
    /// `==` numeric.
    NumEq,
    /// `!=` numeric.
    NumNe,
    /// `<` numeric.
    Lt,
    /// `<=` numeric.
    Le,
    /// `>` numeric.
    Gt,
    /// `>=` numeric.
    Ge,
    /// `eq` string.
    Eq,
    /// `ne` string.
    Ne,
    /// `contains` string.
    Contains,
    /// `lacks` string.
    Lacks,
    /// `hasprefix` string.
    HasPrefix,
    /// `nhasprefix` string.
    NHasPrefix,
    /// `hassuffix` string.
    HasSuffix,
    /// `nhassuffix` string.
    NHasSuffix,
}

impl Operator {
    const ALL: [Self; 14] = [
        Self::NumEq,
        Self::NumNe,
        Self::Lt,
        Self::Le,
        Self::Gt,
        Self::Ge,
        Self::Eq,
        Self::Ne,
        Self::Contains,
        Self::Lacks,
        Self::HasPrefix,
        Self::NHasPrefix,
        Self::HasSuffix,
        Self::NHasSuffix,
    ];

    /// Spelling in queries.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NumEq => "==",
            Self::NumNe => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Contains => "contains",
            Self::Lacks => "lacks",
            Self::HasPrefix => "hasprefix",
            Self::NHasPrefix => "nhasprefix",
            Self::HasSuffix => "hassuffix",
            Self::NHasSuffix => "nhassuffix",
        }
    }

    /// Parses an operator token.
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(text))
            .ok_or_else(|| QueryError::UnknownOperator(text.to_owned()))
    }

    fn evaluate(self, lhs: &str, rhs: &str) -> bool {
        let numeric = |cmp: fn(f64, f64) -> bool| match (lhs.parse::<f64>(), rhs.parse::<f64>()) {
            (Ok(a), Ok(b)) => cmp(a, b),
            _ => false,
        };
        match self {
            Self::NumEq => numeric(|a, b| (a - b).abs() < f64::EPSILON),
            Self::NumNe => numeric(|a, b| (a - b).abs() >= f64::EPSILON),
            Self::Lt => numeric(|a, b| a < b),
            Self::Le => numeric(|a, b| a <= b),
            Self::Gt => numeric(|a, b| a > b),
            Self::Ge => numeric(|a, b| a >= b),
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Contains => lhs.contains(rhs),
            Self::Lacks => !lhs.contains(rhs),
            Self::HasPrefix => lhs.starts_with(rhs),
            Self::NHasPrefix => !lhs.starts_with(rhs),
            Self::HasSuffix => lhs.ends_with(rhs),
            Self::NHasSuffix => !lhs.ends_with(rhs),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `where` condition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Condition {
    /// Left side.
    pub lhs: Operand,
    /// Comparison.
    pub op: Operator,
    /// Right side.
    pub rhs: Operand,
}

impl Condition {
    /// Whether `fields` satisfy the condition. Missing fields never do.
    pub fn matches(&self, fields: &Fields) -> bool {
        match (self.lhs.resolve(fields), self.rhs.resolve(fields)) {
            (Some(lhs), Some(rhs)) => self.op.evaluate(lhs, rhs),
            _ => false,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}

/// One `set` assignment: `$target = f(g(operand))`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SetClause {
    /// Field written.
    pub target: String,
    /// Functions, outermost first.
    pub functions: Vec<SetFunction>,
    /// Innermost value.
    pub operand: Operand,
}

impl SetClause {
    /// Parses the expression token of an assignment.
    pub fn parse(target: &Token, expr: &Token) -> Result<Self, QueryError> {
        let mut functions = Vec::new();
        let mut text = expr.text.as_str();

        if expr.kind == TokenKind::Bare {
            while let Some((name, inner)) = split_call(text) {
                functions.push(name.parse()?);
                text = inner;
            }
        }

        let operand = if expr.kind != TokenKind::Bare {
            Operand::from_token(expr)
        } else if let Some(quoted) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
            Operand::Text(quoted.to_owned())
        } else {
            Operand::from_token(&Token {
                text: text.to_owned(),
                kind: TokenKind::Bare,
            })
        };

        Ok(Self {
            target: target.text.clone(),
            functions,
            operand,
        })
    }

    /// Applies the assignment to `fields`. Missing inputs leave them as is.
    pub fn apply(&self, fields: &mut Fields) {
        let Some(value) = self.operand.resolve(fields) else {
            return;
        };
        let value = self
            .functions
            .iter()
            .rev()
            .fold(value.to_owned(), |acc, function| function.apply(&acc));
        fields.insert(self.target.clone(), value);
    }
}

impl fmt::Display for SetClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_field(f, &self.target)?;
        f.write_str(" = ")?;
        for function in &self.functions {
            write!(f, "{function}(")?;
        }
        write!(f, "{}", self.operand)?;
        for _ in &self.functions {
            f.write_str(")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare(text: &str) -> Token {
        Token {
            text: text.to_owned(),
            kind: TokenKind::Bare,
        }
    }

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn select_field_forms() {
        let agg = SelectField::parse(&bare("COUNT($line)")).unwrap();
        assert_eq!(agg.op, AggregateOp::Count);
        assert_eq!(agg.name(), "count($line)");
        let plain = SelectField::parse(&bare("$time")).unwrap();
        assert!(plain.bare);
        assert_eq!(plain.name(), "$time");
        assert!(SelectField::parse(&bare("median($x)")).is_err());
    }

    #[test]
    fn numeric_and_string_conditions() {
        let f = fields(&[("lifetimeConnections", "12"), ("$hostname", "web01")]);
        let gt = Condition {
            lhs: Operand::Field("lifetimeConnections".into()),
            op: Operator::Gt,
            rhs: Operand::Number("10".into()),
        };
        assert!(gt.matches(&f));
        let prefix = Condition {
            lhs: Operand::Field("$hostname".into()),
            op: Operator::HasPrefix,
            rhs: Operand::Text("web".into()),
        };
        assert!(prefix.matches(&f));
        let missing = Condition {
            lhs: Operand::Field("nope".into()),
            op: Operator::Ne,
            rhs: Operand::Text("x".into()),
        };
        assert!(!missing.matches(&f));
        let not_numeric = Condition {
            lhs: Operand::Field("$hostname".into()),
            op: Operator::Lt,
            rhs: Operand::Number("1".into()),
        };
        assert!(!not_numeric.matches(&f));
    }

    #[test]
    fn set_applies_functions_inner_to_outer() {
        let clause = SetClause::parse(&bare("$masked"), &bare("md5sum(maskdigits($line))")).unwrap();
        assert_eq!(
            clause.functions,
            [SetFunction::Md5Sum, SetFunction::MaskDigits]
        );
        let mut f = fields(&[("$line", "id 42")]);
        clause.apply(&mut f);
        assert_eq!(f["$masked"], SetFunction::Md5Sum.apply("id .."));
        assert_eq!(clause.to_string(), "$masked = md5sum(maskdigits($line))");
    }

    #[test]
    fn set_with_literal() {
        let clause = SetClause::parse(
            &bare("$env"),
            &Token {
                text: "prod".into(),
                kind: TokenKind::Quoted,
            },
        )
        .unwrap();
        let mut f = Fields::new();
        clause.apply(&mut f);
        assert_eq!(f["$env"], "prod");
        assert_eq!(clause.to_string(), "$env = \"prod\"");
    }

    #[test]
    fn operators_parse_case_insensitively() {
        assert_eq!(Operator::parse("HasPrefix").unwrap(), Operator::HasPrefix);
        assert_eq!(Operator::parse("<=").unwrap(), Operator::Le);
        assert!(Operator::parse("~=").is_err());
    }
}
