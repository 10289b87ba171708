//! Deterministic document paths.

use chrono::{Datelike, NaiveDate, Utc};

use super::StoreError;
use crate::ids::GuildId;

const CONFIG_LEAF: &str = "config";
const PANEL_LEAF: &str = "panel";

/// Day-granular bucket for append-only logs (`YYYY-MM-DD`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateBucket(NaiveDate);

impl DateBucket {
    /// Bucket for a calendar date
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Bucket for the current UTC date
    #[must_use]
    pub fn today() -> Self {
        Self(Utc::now().date_naive())
    }

    /// Parse a `YYYY-MM-DD` string
    pub fn parse(value: &str) -> Option<Self> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .ok()
            .map(Self)
    }

    /// The underlying date
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Month period (`YYYY-MM`) the bucket falls in
    #[must_use]
    pub fn period(&self) -> String {
        format!("{:04}-{:02}", self.0.year(), self.0.month())
    }
}

impl std::fmt::Display for DateBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// A validated blob path
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentPath(String);

impl DocumentPath {
    /// `{guild}/{feature}/config`
    pub fn config(guild: &GuildId, feature: &str) -> Result<Self, StoreError> {
        Self::join(guild, feature, CONFIG_LEAF)
    }

    /// `{guild}/{feature}/panel`
    pub fn panel(guild: &GuildId, feature: &str) -> Result<Self, StoreError> {
        Self::join(guild, feature, PANEL_LEAF)
    }

    /// `{guild}/{feature}/{date}`
    pub fn log(guild: &GuildId, feature: &str, bucket: DateBucket) -> Result<Self, StoreError> {
        Self::join(guild, feature, &bucket.to_string())
    }

    fn join(guild: &GuildId, feature: &str, leaf: &str) -> Result<Self, StoreError> {
        check_segment(guild.as_str())?;
        check_segment(feature)?;
        Ok(Self(format!("{guild}/{feature}/{leaf}")))
    }

    /// The path as stored
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn check_segment(segment: &str) -> Result<(), StoreError> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\'])
    {
        return Err(StoreError::InvalidPath(segment.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let guild = GuildId::from("42");
        assert_eq!(
            DocumentPath::config(&guild, "lottery").unwrap().as_str(),
            "42/lottery/config"
        );
        assert_eq!(
            DocumentPath::panel(&guild, "lottery").unwrap().as_str(),
            "42/lottery/panel"
        );
        let bucket = DateBucket::parse("2025-06-14").unwrap();
        assert_eq!(
            DocumentPath::log(&guild, "report", bucket).unwrap().as_str(),
            "42/report/2025-06-14"
        );
    }

    #[test]
    fn test_rejects_escaping_segments() {
        let guild = GuildId::from("..");
        assert!(DocumentPath::config(&guild, "lottery").is_err());

        let guild = GuildId::from("42");
        assert!(DocumentPath::config(&guild, "a/b").is_err());
        assert!(DocumentPath::config(&guild, "").is_err());
    }

    #[test]
    fn test_bucket_period() {
        let bucket = DateBucket::parse("2025-06-01").unwrap();
        assert_eq!(bucket.period(), "2025-06");
        assert!(DateBucket::parse("2025-13-01").is_none());
        assert!(DateBucket::parse("14/06/2025").is_none());
    }
}
