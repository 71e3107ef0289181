//! Core entry types for growthlog.
//!
//! A [`PlantEntry`] is one recorded growth observation. Entries are only ever
//! created from a validated [`PlantEntryDraft`], so the store never sees a
//! row with a missing name, a malformed date, or a negative height.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Storage and wire format for entry dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Maximum length of a plant name, in characters.
pub const MAX_NAME_LEN: usize = 100;

/// A stored plant-growth observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantEntry {
    /// Identifier assigned by the store. Never reused.
    pub id: i64,

    /// Plant name.
    pub name: String,

    /// Reference to a stored photo in the upload directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,

    /// Observation date.
    pub date: NaiveDate,

    /// Height in centimetres.
    pub height: f64,

    /// Free-form notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PlantEntry {
    /// Build a stored entry from a draft and the id the store assigned to it.
    #[must_use]
    pub fn from_draft(id: i64, draft: PlantEntryDraft) -> Self {
        Self {
            id,
            name: draft.name,
            photo: draft.photo,
            date: draft.date,
            height: draft.height,
            notes: draft.notes,
        }
    }

    /// The date in `YYYY-MM-DD` form.
    #[must_use]
    pub fn date_string(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }
}

/// A validated entry that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantEntryDraft {
    name: String,
    photo: Option<String>,
    date: NaiveDate,
    height: f64,
    notes: Option<String>,
}

impl PlantEntryDraft {
    /// Validate raw form input and build a draft.
    ///
    /// `name` must contain something other than whitespace and is kept as
    /// submitted. `date` must be a real calendar date written as `YYYY-MM-DD`.
    /// `height` must parse as a finite, non-negative number. Blank notes are
    /// treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first offending field.
    pub fn parse(name: &str, date: &str, height: &str, notes: Option<&str>) -> Result<Self> {
        Ok(Self {
            name: parse_name(name)?,
            photo: None,
            date: parse_date(date)?,
            height: parse_height(height)?,
            notes: notes
                .filter(|n| !n.trim().is_empty())
                .map(ToString::to_string),
        })
    }

    /// Attach a stored photo reference.
    #[must_use]
    pub fn with_photo(mut self, photo: impl Into<String>) -> Self {
        self.photo = Some(photo.into());
        self
    }

    /// Plant name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stored photo reference, if any.
    #[must_use]
    pub fn photo(&self) -> Option<&str> {
        self.photo.as_deref()
    }

    /// Observation date.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Height in centimetres.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Notes, if any.
    #[must_use]
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}

fn parse_name(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(Error::validation("name", "a plant name is required"));
    }
    if raw.chars().count() > MAX_NAME_LEN {
        return Err(Error::validation(
            "name",
            format!("must be at most {MAX_NAME_LEN} characters"),
        ));
    }
    Ok(raw.to_string())
}

/// Exactly `YYYY-MM-DD`: four-digit year, no sign, zero-padded month and day.
fn date_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("valid date regex"))
}

/// Parse a `YYYY-MM-DD` date, rejecting other spellings like `2024-3-1` or
/// signed years like `-0001-01-01`.
///
/// Stored dates sort as text, so only this exact shape keeps text order
/// equal to calendar order.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the text is not a canonical calendar date.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::validation("date", "a date is required"));
    }
    if !date_shape().is_match(raw) {
        return Err(Error::validation(
            "date",
            format!("'{raw}' is not a YYYY-MM-DD date"),
        ));
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        Error::validation("date", format!("'{raw}' is not a YYYY-MM-DD date: {e}"))
    })
}

fn parse_height(raw: &str) -> Result<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::validation("height", "a height is required"));
    }
    let height: f64 = raw
        .parse()
        .map_err(|_| Error::validation("height", format!("'{raw}' is not a number")))?;
    if !height.is_finite() {
        return Err(Error::validation("height", "must be a finite number"));
    }
    if height < 0.0 {
        return Err(Error::validation("height", "cannot be negative"));
    }
    // `-0` passes the sign check; store it as plain zero.
    Ok(height.abs())
}
