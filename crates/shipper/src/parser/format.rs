//! nginx `log_format` compiler.
//!
//! A format such as
//! `$remote_addr - $remote_user [$time_local] "$request" $status`
//! is split into literal text and `$variable` / `${variable}` tokens, then
//! compiled into one anchored regex with a named capture per variable.
//! A variable followed by literal text captures everything up to the first
//! character of that literal; a trailing variable captures the rest of the
//! line.

use regex::Regex;

use super::model::{FormatError, ParseError, ParsedRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Variable(String),
}

/// A compiled nginx log format.
#[derive(Debug, Clone)]
pub struct LogFormat {
    name: String,
    source: String,
    variables: Vec<String>,
    regex: Regex,
}

impl LogFormat {
    /// Compile `format` registered under `name` (nginx `log_format <name> '...'`).
    pub fn compile(name: &str, format: &str) -> Result<Self, FormatError> {
        let format = format.trim();
        if format.is_empty() {
            return Err(FormatError::Empty);
        }

        let tokens = tokenize(format)?;
        let mut pattern = String::with_capacity(format.len() * 2);
        let mut variables: Vec<String> = Vec::new();
        pattern.push('^');

        for (i, token) in tokens.iter().enumerate() {
            match token {
                Token::Literal(text) => pattern.push_str(&regex::escape(text)),
                Token::Variable(var) => {
                    if variables.contains(var) {
                        return Err(FormatError::DuplicateVariable(var.clone()));
                    }
                    let capture = match tokens.get(i + 1) {
                        Some(Token::Literal(next)) => match next.chars().next() {
                            Some(stop) => format!("(?P<{}>[^{}]*)", var, regex::escape(&stop.to_string())),
                            None => format!("(?P<{}>.*)", var),
                        },
                        Some(Token::Variable(next)) => {
                            return Err(FormatError::AdjacentVariables(var.clone(), next.clone()));
                        }
                        None => format!("(?P<{}>.*)", var),
                    };
                    pattern.push_str(&capture);
                    variables.push(var.clone());
                }
            }
        }
        pattern.push('$');

        if variables.is_empty() {
            return Err(FormatError::NoVariables);
        }

        Ok(Self {
            name: name.to_string(),
            source: format.to_string(),
            variables,
            regex: Regex::new(&pattern)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The format string this was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Variable names in the order they appear in the format.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn has_variable(&self, variable: &str) -> bool {
        self.variables.iter().any(|v| v == variable)
    }

    /// Parse one raw line into a record.
    pub fn parse_line(&self, line: &str) -> Result<ParsedRecord, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let caps = self
            .regex
            .captures(line)
            .ok_or_else(|| ParseError::NoMatch(self.name.clone()))?;

        let fields = self
            .variables
            .iter()
            .map(|var| {
                let value = caps.name(var).map(|m| m.as_str()).unwrap_or_default();
                (var.clone(), value.to_string())
            })
            .collect();

        Ok(ParsedRecord::new(fields))
    }
}

fn tokenize(format: &str) -> Result<Vec<Token>, FormatError> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            literal.push(c);
            continue;
        }

        let name = if chars.peek() == Some(&'{') {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                name.push(c);
            }
            if !closed || name.is_empty() {
                return Err(FormatError::InvalidVariable(name));
            }
            name
        } else {
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                // A lone `$` is literal text.
                literal.push('$');
                continue;
            }
            name
        };

        if !is_valid_name(&name) {
            return Err(FormatError::InvalidVariable(name));
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(&mut literal)));
        }
        tokens.push(Token::Variable(name));
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    Ok(tokens)
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
