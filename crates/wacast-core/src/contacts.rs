//! Contact extraction from CSV uploads and free-text bulk input.

use crate::{csv_codec, error::WacastError, phone::PhoneNormalizer};

/// Headers that hold a contact's name, in preference order.
const NAME_HEADERS: &[&str] = &[
    "name",
    "full name",
    "full_name",
    "contact name",
    "display name",
    "first name",
    "contact",
];

/// Headers that hold a phone number, in preference order.
const PHONE_HEADERS: &[&str] = &[
    "phone",
    "phone number",
    "phone_number",
    "mobile",
    "mobile number",
    "cell",
    "telephone",
    "tel",
    "whatsapp",
    "number",
];

/// Share of phone-ish characters a field needs to count as a number.
const NUMERIC_SHARE: f64 = 0.7;

/// A contact with a canonical number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRow {
    pub name: String,
    pub key: String,
}

/// A row that could not be turned into a contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// 1-based data row (or line) number.
    pub row: usize,
    pub name: String,
    /// The phone text as found, empty when nothing looked like a number.
    pub raw: String,
    pub reason: String,
}

/// Result of splitting input into usable and unusable contacts.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub valid: Vec<ContactRow>,
    pub invalid: Vec<RejectedRow>,
}

fn looks_numeric(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    let total = value.chars().count();
    let phoneish = value
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' '))
        .count();
    phoneish as f64 >= total as f64 * NUMERIC_SHARE
}

fn default_name(row: usize) -> String {
    format!("Contact {row}")
}

/// Extract contacts from CSV text with a header row.
///
/// The phone column is picked by header name. Without one, the first field of
/// each row that is mostly phone characters is used.
pub fn extract_from_csv(
    bytes: &[u8],
    normalizer: &PhoneNormalizer,
) -> Result<Extraction, WacastError> {
    let table = csv_codec::decode(bytes)?;
    let name_col = table.column(NAME_HEADERS);
    let phone_col = table.column(PHONE_HEADERS);

    let mut out = Extraction::default();
    for (idx, row) in table.rows.iter().enumerate() {
        let row_no = idx + 1;
        // A blank phone cell still gets the row scan.
        let raw = phone_col
            .map(|col| table.cell(row, col))
            .filter(|cell| !cell.is_empty())
            .or_else(|| row.iter().map(String::as_str).find(|v| looks_numeric(v)))
            .unwrap_or_default()
            .to_string();
        let name = name_col
            .map(|col| table.cell(row, col).to_string())
            .filter(|n| !n.is_empty() && *n != raw)
            .unwrap_or_else(|| default_name(row_no));

        push(&mut out, normalizer, row_no, name, raw);
    }
    Ok(out)
}

/// Parse free-text bulk input: one contact per line, `Name,Number` or a bare number.
pub fn parse_lines(text: &str, normalizer: &PhoneNormalizer) -> Extraction {
    let mut out = Extraction::default();
    let lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    for (idx, line) in lines.enumerate() {
        let row_no = idx + 1;
        let (name, raw) = match line.rsplit_once(',') {
            Some((name, number)) if !name.trim().is_empty() => {
                (name.trim().to_string(), number.trim().to_string())
            }
            Some((_, number)) => (default_name(row_no), number.trim().to_string()),
            None => (default_name(row_no), line.to_string()),
        };
        push(&mut out, normalizer, row_no, name, raw);
    }
    out
}

fn push(
    out: &mut Extraction,
    normalizer: &PhoneNormalizer,
    row: usize,
    name: String,
    raw: String,
) {
    if raw.is_empty() {
        out.invalid.push(RejectedRow {
            row,
            name,
            raw,
            reason: "no phone number found".into(),
        });
        return;
    }
    match normalizer.normalize(&raw) {
        Some(key) => out.valid.push(ContactRow { name, key }),
        None => out.invalid.push(RejectedRow {
            row,
            name,
            raw,
            reason: "invalid number format".into(),
        }),
    }
}
