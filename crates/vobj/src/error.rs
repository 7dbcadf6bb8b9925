use thiserror::Error;

/// Errors raised while parsing, validating, or serializing content trees.
#[derive(Error, Debug)]
pub enum VObjectError {
    /// The input text could not be read as content lines or components.
    #[error("Parse error: {msg}{}", fmt_line(*line))]
    Parse { msg: String, line: Option<usize> },

    /// A component or property failed structural validation.
    #[error("Validation error: {msg}")]
    Validate { msg: String },

    /// A value could not be converted between its text and native forms.
    #[error("Native transform error: {msg}{}", fmt_line(*line))]
    Native { msg: String, line: Option<usize> },

    /// The library was asked for something it has no registration for.
    #[error("Configuration error: {msg}")]
    Config { msg: String },

    #[error("RRule parse error: {0}")]
    RRuleParse(#[from] rrule::RRuleError),
}

fn fmt_line(line: Option<usize>) -> String {
    line.map(|n| format!(" at line {n}")).unwrap_or_default()
}

impl VObjectError {
    #[must_use]
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            msg: msg.into(),
            line: None,
        }
    }

    #[must_use]
    pub fn parse_at(msg: impl Into<String>, line: usize) -> Self {
        Self::Parse {
            msg: msg.into(),
            line: Some(line),
        }
    }

    #[must_use]
    pub fn validate(msg: impl Into<String>) -> Self {
        Self::Validate { msg: msg.into() }
    }

    #[must_use]
    pub fn native(msg: impl Into<String>) -> Self {
        Self::Native {
            msg: msg.into(),
            line: None,
        }
    }

    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config { msg: msg.into() }
    }

    /// Attaches a line number to parse and native errors that lack one.
    #[must_use]
    pub fn at_line(self, line: usize) -> Self {
        match self {
            Self::Parse { msg, line: None } => Self::Parse {
                msg,
                line: Some(line),
            },
            Self::Native { msg, line: None } => Self::Native {
                msg,
                line: Some(line),
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, VObjectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_includes_line_number() {
        let err = VObjectError::parse("unexpected END").at_line(12);
        assert_eq!(err.to_string(), "Parse error: unexpected END at line 12");
    }

    #[test]
    fn at_line_does_not_overwrite() {
        let err = VObjectError::parse_at("bad line", 3).at_line(9);
        assert_eq!(err.to_string(), "Parse error: bad line at line 3");
    }
}
