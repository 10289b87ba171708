//! Action Token Grammar
//!
//! Two schemes coexist on components posted over the bot's lifetime:
//!
//! - **structured**: `domain:verb[:arg...]`, colon-delimited
//! - **legacy**: a flat underscore/dash string such as `lottery_run` or
//!   `report-submit-StoreA`, matched by prefix at dispatch time
//!
//! There is no normalization between them.

use std::fmt;

/// Segment separator of the structured grammar
pub const SEPARATOR: char = ':';

/// A parsed action token
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionToken {
    /// `domain:verb[:arg...]`
    Structured {
        /// First segment
        domain: String,
        /// Second segment
        verb: String,
        /// Remaining segments, in order
        args: Vec<String>,
    },
    /// Anything with fewer than two colon-separated segments
    Legacy(String),
}

impl ActionToken {
    /// Parse a raw component id
    ///
    /// Never fails: input that is not structured is legacy.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut segments = raw.split(SEPARATOR);
        match (segments.next(), segments.next()) {
            (Some(domain), Some(verb)) if !domain.is_empty() && !verb.is_empty() => {
                Self::Structured {
                    domain: domain.to_string(),
                    verb: verb.to_string(),
                    args: segments.map(str::to_string).collect(),
                }
            }
            _ => Self::Legacy(raw.to_string()),
        }
    }

    /// Build a structured token
    pub fn structured<I, S>(domain: &str, verb: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Structured {
            domain: domain.to_string(),
            verb: verb.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `(domain, verb)` of a structured token
    #[must_use]
    pub fn route_key(&self) -> Option<(&str, &str)> {
        match self {
            Self::Structured { domain, verb, .. } => Some((domain, verb)),
            Self::Legacy(_) => None,
        }
    }
}

impl fmt::Display for ActionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured { domain, verb, args } => {
                write!(f, "{domain}{SEPARATOR}{verb}")?;
                for arg in args {
                    write!(f, "{SEPARATOR}{arg}")?;
                }
                Ok(())
            }
            Self::Legacy(raw) => f.write_str(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_structured_parse() {
        assert_eq!(
            ActionToken::parse("report:submit:Store A"),
            ActionToken::structured("report", "submit", ["Store A"])
        );
        assert_eq!(
            ActionToken::parse("lottery:run:open").route_key(),
            Some(("lottery", "run"))
        );
    }

    #[test]
    fn test_empty_trailing_args_are_kept() {
        let token = ActionToken::parse("a:b::c");
        assert_eq!(token, ActionToken::structured("a", "b", ["", "c"]));
        assert_eq!(token.to_string(), "a:b::c");
    }

    #[test]
    fn test_legacy_forms() {
        assert_eq!(
            ActionToken::parse("lottery_run"),
            ActionToken::Legacy("lottery_run".into())
        );
        assert_eq!(
            ActionToken::parse("report-submit-StoreA"),
            ActionToken::Legacy("report-submit-StoreA".into())
        );
        assert_eq!(ActionToken::parse(":verb"), ActionToken::Legacy(":verb".into()));
        assert_eq!(ActionToken::parse(""), ActionToken::Legacy(String::new()));
    }
}
