//! # Subjects and Patterns
//!
//! Subjects are dot-separated tokens (`chat.room.42`). Subscription patterns
//! may also use NATS-style wildcards:
//!
//! - `*` matches exactly one token: `chat.*` matches `chat.lobby`
//! - `>` as the last token matches one or more tokens: `chat.>` matches
//!   `chat.room.42` but not `chat`

use std::fmt;

use crate::error::BrokerError;

/// Wildcard matching exactly one token.
pub const WILDCARD_SINGLE: &str = "*";

/// Wildcard matching the remaining tokens.
pub const WILDCARD_TAIL: &str = ">";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Single,
    Tail,
}

/// A parsed subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectPattern {
    raw: String,
    tokens: Vec<Token>,
}

impl SubjectPattern {
    /// Parse and validate a pattern.
    pub fn parse(pattern: &str) -> Result<Self, BrokerError> {
        if pattern.is_empty() {
            return Err(BrokerError::invalid_subject(pattern, "subject is empty"));
        }

        let parts: Vec<&str> = pattern.split('.').collect();
        let last = parts.len() - 1;
        let mut tokens = Vec::with_capacity(parts.len());

        for (i, part) in parts.into_iter().enumerate() {
            check_token(pattern, part)?;
            let token = match part {
                WILDCARD_SINGLE => Token::Single,
                WILDCARD_TAIL if i == last => Token::Tail,
                WILDCARD_TAIL => {
                    return Err(BrokerError::invalid_subject(
                        pattern,
                        "'>' is only allowed as the last token",
                    ))
                }
                _ if part.contains('*') || part.contains('>') => {
                    return Err(BrokerError::invalid_subject(
                        pattern,
                        "wildcards must be whole tokens",
                    ))
                }
                literal => Token::Literal(literal.to_string()),
            };
            tokens.push(token);
        }

        Ok(Self {
            raw: pattern.to_string(),
            tokens,
        })
    }

    /// Whether `subject` is covered by this pattern.
    #[must_use]
    pub fn matches(&self, subject: &str) -> bool {
        let mut parts = subject.split('.');
        for token in &self.tokens {
            match token {
                Token::Tail => return parts.next().is_some_and(|p| !p.is_empty()),
                Token::Single => match parts.next() {
                    Some(p) if !p.is_empty() => {}
                    _ => return false,
                },
                Token::Literal(literal) => {
                    if parts.next() != Some(literal.as_str()) {
                        return false;
                    }
                }
            }
        }
        parts.next().is_none()
    }

    /// True if the pattern contains no wildcards.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.tokens.iter().all(|t| matches!(t, Token::Literal(_)))
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for SubjectPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Validate a concrete subject for publishing.
///
/// Wildcards are rejected; they are only meaningful in subscriptions.
pub fn validate_subject(subject: &str) -> Result<(), BrokerError> {
    let pattern = SubjectPattern::parse(subject)?;
    if pattern.is_literal() {
        Ok(())
    } else {
        Err(BrokerError::invalid_subject(
            subject,
            "wildcards are not allowed when publishing",
        ))
    }
}

fn check_token(pattern: &str, token: &str) -> Result<(), BrokerError> {
    if token.is_empty() {
        return Err(BrokerError::invalid_subject(pattern, "empty token"));
    }
    if token.chars().any(char::is_whitespace) {
        return Err(BrokerError::invalid_subject(pattern, "whitespace in token"));
    }
    Ok(())
}
