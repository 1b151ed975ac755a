//! Phone-number canonicalization.
//!
//! Every number that enters the bot (chat arguments, CSV rows, contact cards)
//! goes through [`PhoneNormalizer::normalize`] so the ledger and checkpoints
//! only ever hold one spelling per subscriber.

use crate::error::WacastError;

/// Shortest accepted canonical number.
pub const MIN_LEN: usize = 10;
/// Longest accepted canonical number (E.164 limit).
pub const MAX_LEN: usize = 15;

const JID_SUFFIX: &str = "@s.whatsapp.net";

/// Canonicalizes raw phone input into international digits-only form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNormalizer {
    country_code: String,
}

impl PhoneNormalizer {
    /// Build a normalizer for `country_code` (1-3 digits, no leading zero, no `+`).
    pub fn new(country_code: &str) -> Result<Self, WacastError> {
        let valid = (1..=3).contains(&country_code.len())
            && country_code.bytes().all(|b| b.is_ascii_digit())
            && !country_code.starts_with('0');
        if !valid {
            return Err(WacastError::Config(format!(
                "invalid default country code '{country_code}': expected 1-3 digits without a leading zero"
            )));
        }
        Ok(Self {
            country_code: country_code.to_string(),
        })
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// Normalize `raw` into a canonical key, or `None` if it can't be a phone number.
    ///
    /// Separators (whitespace, `-`, `.`, `(`, `)`) and one leading `+` are
    /// dropped. Short numbers and numbers starting with `0` are treated as
    /// local: the leading `0` is swapped for the country code, otherwise the
    /// country code is prepended.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        let body = trimmed.strip_prefix('+').unwrap_or(trimmed);

        let mut digits = String::with_capacity(body.len());
        for c in body.chars() {
            match c {
                '0'..='9' => digits.push(c),
                c if c.is_whitespace() => {}
                '-' | '.' | '(' | ')' => {}
                _ => return None,
            }
        }
        if digits.is_empty() {
            return None;
        }

        let international = digits.len() >= MIN_LEN && !digits.starts_with('0');
        let key = if international {
            digits
        } else if let Some(rest) = digits.strip_prefix('0') {
            format!("{}{rest}", self.country_code)
        } else {
            format!("{}{digits}", self.country_code)
        };

        (MIN_LEN..=MAX_LEN).contains(&key.len()).then_some(key)
    }
}

/// WhatsApp user JID for a canonical key.
pub fn jid(key: &str) -> String {
    format!("{key}{JID_SUFFIX}")
}

/// Strip the server part of a JID (`254700000000@s.whatsapp.net` → `254700000000`).
pub fn key_from_jid(jid: &str) -> &str {
    jid.split('@').next().unwrap_or(jid)
}
