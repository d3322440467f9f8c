use std::cmp::Ordering;
use std::fmt;

/// One aggregate slot.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Counters, sums, minima, maxima and lengths.
    Number(f64),
    /// The most recent raw value.
    Text(String),
}

impl Value {
    /// Kind name used in error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Number(_) => "a number",
            Self::Text(_) => "text",
        }
    }

    /// The number, if this is one.
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Orders rendered cells numerically when both parse as numbers, else
/// lexically.
pub fn compare_cells(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_render_shortest_form() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Text("x".into()).to_string(), "x");
    }

    #[test]
    fn cells_compare_numerically_when_possible() {
        assert_eq!(compare_cells("10", "9"), Ordering::Greater);
        assert_eq!(compare_cells("abc", "abd"), Ordering::Less);
        assert_eq!(compare_cells("10", "abc"), Ordering::Less);
    }
}
