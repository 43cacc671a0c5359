use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::SchemaError;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"));

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 ()\-.]{5,}$").expect("valid phone pattern"));

const MAX_AGE: i64 = 150;

/// How a value is represented, independent of what it means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Text,
    Uuid,
    Url,
    Date,
    Integer,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Text => "text",
            ValueKind::Uuid => "uuid",
            ValueKind::Url => "url",
            ValueKind::Date => "date",
            ValueKind::Integer => "integer",
        };
        f.write_str(s)
    }
}

/// A single observed value. Serialized as `{"kind": ..., "value": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Text(String),
    Uuid(Uuid),
    Url(String),
    Date(NaiveDate),
    Integer(i64),
}

impl AttributeValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            AttributeValue::Text(_) => ValueKind::Text,
            AttributeValue::Uuid(_) => ValueKind::Uuid,
            AttributeValue::Url(_) => ValueKind::Url,
            AttributeValue::Date(_) => ValueKind::Date,
            AttributeValue::Integer(_) => ValueKind::Integer,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(s) | AttributeValue::Url(s) => f.write_str(s),
            AttributeValue::Uuid(u) => write!(f, "{}", u),
            AttributeValue::Date(d) => write!(f, "{}", d),
            AttributeValue::Integer(i) => write!(f, "{}", i),
        }
    }
}

/// The closed catalog of things we can know about an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeCategory {
    FirstName,
    LastName,
    Email,
    PhoneNumber,
    PhotoReference,
    ProfileUrl,
    BirthDate,
    Age,
    Hometown,
    Employer,
}

impl AttributeCategory {
    pub const ALL: [AttributeCategory; 10] = [
        AttributeCategory::FirstName,
        AttributeCategory::LastName,
        AttributeCategory::Email,
        AttributeCategory::PhoneNumber,
        AttributeCategory::PhotoReference,
        AttributeCategory::ProfileUrl,
        AttributeCategory::BirthDate,
        AttributeCategory::Age,
        AttributeCategory::Hometown,
        AttributeCategory::Employer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeCategory::FirstName => "first_name",
            AttributeCategory::LastName => "last_name",
            AttributeCategory::Email => "email",
            AttributeCategory::PhoneNumber => "phone_number",
            AttributeCategory::PhotoReference => "photo_reference",
            AttributeCategory::ProfileUrl => "profile_url",
            AttributeCategory::BirthDate => "birth_date",
            AttributeCategory::Age => "age",
            AttributeCategory::Hometown => "hometown",
            AttributeCategory::Employer => "employer",
        }
    }

    /// The value representation this category expects.
    pub fn representation(&self) -> ValueKind {
        match self {
            AttributeCategory::FirstName
            | AttributeCategory::LastName
            | AttributeCategory::Email
            | AttributeCategory::PhoneNumber
            | AttributeCategory::Hometown
            | AttributeCategory::Employer => ValueKind::Text,
            AttributeCategory::PhotoReference => ValueKind::Uuid,
            AttributeCategory::ProfileUrl => ValueKind::Url,
            AttributeCategory::BirthDate => ValueKind::Date,
            AttributeCategory::Age => ValueKind::Integer,
        }
    }

    /// Compatibility check applied to every write.
    pub fn accepts(&self, value: &AttributeValue) -> bool {
        match (self, value) {
            (
                AttributeCategory::FirstName
                | AttributeCategory::LastName
                | AttributeCategory::Hometown
                | AttributeCategory::Employer,
                AttributeValue::Text(s),
            ) => !s.trim().is_empty(),
            (AttributeCategory::Email, AttributeValue::Text(s)) => EMAIL_RE.is_match(s.trim()),
            (AttributeCategory::PhoneNumber, AttributeValue::Text(s)) => PHONE_RE.is_match(s.trim()),
            (AttributeCategory::PhotoReference, AttributeValue::Uuid(_)) => true,
            (AttributeCategory::ProfileUrl, AttributeValue::Url(s)) => {
                let s = s.trim();
                (s.starts_with("https://") || s.starts_with("http://")) && !s.contains(char::is_whitespace)
            }
            (AttributeCategory::BirthDate, AttributeValue::Date(d)) => *d <= Utc::now().date_naive(),
            (AttributeCategory::Age, AttributeValue::Integer(n)) => (0..=MAX_AGE).contains(n),
            _ => false,
        }
    }
}

impl fmt::Display for AttributeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeCategory {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        AttributeCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == needle)
            .ok_or_else(|| SchemaError::UnknownCategory(s.to_string()))
    }
}
