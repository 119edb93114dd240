//! Field extraction from message text
//!
//! An [`ExtractorRegistry`] is an ordered list of named [`Extractor`]s. Each
//! extractor looks at the message text (body, or snippet for bodyless
//! messages) and contributes one field when it matches.

use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::models::Message;

/// Pulls one value out of message text
pub trait Extractor: Send + Sync {
    /// Find the value in `text`, borrowing from it where possible
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>>;

    /// Human-readable description used in logs
    fn description(&self) -> &str;
}

/// Regex extractor yielding the first capture group, or the whole match
/// when the pattern has no groups
#[derive(Debug, Clone)]
pub struct RegexExtractor {
    regex: Regex,
    description: String,
}

impl RegexExtractor {
    pub fn new(pattern: &str) -> Result<Self> {
        Self::with_description(pattern, format!("regex pattern: {pattern}"))
    }

    pub fn with_description(pattern: &str, description: impl Into<String>) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::InvalidCriteria(format!("invalid pattern {pattern:?}: {e}")))?;
        Ok(Self {
            regex,
            description: description.into(),
        })
    }
}

impl Extractor for RegexExtractor {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        let captures = self.regex.captures(text)?;
        let matched = if self.regex.captures_len() > 1 {
            captures.get(1)?
        } else {
            captures.get(0)?
        };
        let value = matched.as_str().trim();
        (!value.is_empty()).then_some(Cow::Borrowed(value))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Ordered set of named extractors
#[derive(Default)]
pub struct ExtractorRegistry {
    entries: Vec<(String, Box<dyn Extractor>)>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an extractor; a repeated name replaces the earlier one in place
    pub fn register(
        mut self,
        name: impl Into<String>,
        extractor: impl Extractor + 'static,
    ) -> Self {
        let name = name.into();
        let boxed: Box<dyn Extractor> = Box::new(extractor);
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = boxed,
            None => self.entries.push((name, boxed)),
        }
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &dyn Extractor)> {
        self.entries.iter().map(|(name, e)| (name.as_str(), e.as_ref()))
    }
}

/// Fields extracted from one message; empty means no structured data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExtractedFields(BTreeMap<String, String>);

impl ExtractedFields {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Run every extractor in `registry` over the message text
pub fn extract(message: &Message, registry: &ExtractorRegistry) -> ExtractedFields {
    let text = message.text();
    let mut fields = BTreeMap::new();

    for (name, extractor) in registry.iter() {
        if let Some(value) = extractor.find_match(text) {
            fields.insert(name.to_string(), value.into_owned());
        } else {
            log::debug!("{}: no match for {}", message.id, extractor.description());
        }
    }

    ExtractedFields(fields)
}

/// Field names used by [`card_transactions`]
pub const AMOUNT: &str = "amount";
pub const MERCHANT: &str = "merchant";
pub const CARD_TYPE: &str = "card_type";

/// Extractors for card purchase notifications
///
/// Matches alerts shaped like "Realizaste un consumo de S/ 25.90 con tu
/// Tarjeta de Crédito BCP en TAMBO."
pub fn card_transactions() -> Result<ExtractorRegistry> {
    Ok(ExtractorRegistry::new()
        .register(
            AMOUNT,
            RegexExtractor::with_description(r"S/\s*[\d,]+(?:\.\d+)?", "amount in soles")?,
        )
        .register(
            MERCHANT,
            RegexExtractor::with_description(r"BCP en (.+?)\.", "merchant after card name")?,
        )
        .register(
            CARD_TYPE,
            RegexExtractor::with_description(r"(Crédito|Débito)", "credit or debit card")?,
        ))
}

/// Numeric value of an amount such as `S/ 1,250.50`
pub fn parse_amount(amount: &str) -> Option<f64> {
    let cleaned: String = amount
        .trim()
        .trim_start_matches("S/")
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    cleaned.parse().ok()
}

/// One card transaction assembled from a message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    pub date: String,
    pub read: bool,
    pub amount: Option<String>,
    pub amount_value: Option<f64>,
    pub merchant: Option<String>,
    pub card_type: Option<String>,
}

impl TransactionRecord {
    /// Build a record when the message carries at least an amount
    pub fn from_message(message: &Message, fields: &ExtractedFields) -> Option<Self> {
        let amount = fields.get(AMOUNT)?;
        Some(Self {
            id: message.id.to_string(),
            date: message.date.clone(),
            read: message.is_read,
            amount: Some(amount.to_string()),
            amount_value: parse_amount(amount),
            merchant: fields.get(MERCHANT).map(str::to_string),
            card_type: fields.get(CARD_TYPE).map(str::to_string),
        })
    }
}
