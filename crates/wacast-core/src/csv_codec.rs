//! Shared RFC 4180 CSV decode/encode.
//!
//! Every command that reads or writes CSV (uploads, URL imports, exports, the
//! cast book) goes through these two functions.

use crate::error::WacastError;

/// A decoded CSV file: header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Index of the first header equal (case-insensitive, trimmed) to any of `names`.
    ///
    /// Candidates are tried in order, so earlier names win.
    pub fn column(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|want| {
            self.headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(want))
        })
    }

    /// Cell `col` of `row`, or `""` when the row is short.
    pub fn cell<'a>(&'a self, row: &'a [String], col: usize) -> &'a str {
        row.get(col).map(String::as_str).unwrap_or("")
    }
}

/// Decode CSV bytes with a header row.
///
/// Rows may have fewer or more fields than the header. Blank lines are
/// skipped. A UTF-8 BOM is ignored.
pub fn decode(bytes: &[u8]) -> Result<Table, WacastError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .headers()?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Table { headers, rows })
}

/// Encode a header row and data rows. Fields are quoted only when needed.
pub fn encode<R, F>(headers: &[&str], rows: R) -> Result<Vec<u8>, WacastError>
where
    R: IntoIterator<Item = Vec<F>>,
    F: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|e| WacastError::Csv(format!("flush failed: {}", e.error())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_basic() {
        let table = decode(b"Name,Phone\nJane,0712345678\nJohn,0722000000\n").unwrap();
        assert_eq!(table.headers, vec!["Name", "Phone"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1], vec!["John", "0722000000"]);
    }

    #[test]
    fn test_decode_quoted_fields() {
        let input = b"Name,Phone\n\"Doe, Jane \"\"JD\"\"\",\"0712 345 678\"\n";
        let table = decode(input).unwrap();
        assert_eq!(table.rows[0][0], "Doe, Jane \"JD\"");
        assert_eq!(table.rows[0][1], "0712 345 678");
    }

    #[test]
    fn test_decode_ragged_rows_and_blank_lines() {
        let input = b"\xEF\xBB\xBFName,Phone,Note\nJane,0712345678\n\n,,\nJohn,0722000000,vip,extra\n";
        let table = decode(input).unwrap();
        assert_eq!(table.headers[0], "Name", "BOM stripped");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.cell(&table.rows[0], 2), "");
        assert_eq!(table.rows[1].len(), 4);
    }

    #[test]
    fn test_decode_header_only() {
        let table = decode(b"Name,Phone\n").unwrap();
        assert!(table.rows.is_empty());
    }

    #[test]
    fn test_column_lookup_order() {
        let table = Table {
            headers: vec!["Contact".into(), " PHONE NUMBER ".into(), "mobile".into()],
            rows: vec![],
        };
        assert_eq!(table.column(&["phone number", "mobile"]), Some(1));
        assert_eq!(table.column(&["mobile", "phone number"]), Some(2));
        assert_eq!(table.column(&["email"]), None);
    }

    #[test]
    fn test_encode_quotes_when_needed() {
        let rows = vec![
            vec!["Doe, Jane".to_string(), "254712345678".to_string()],
            vec!["Say \"hi\"".to_string(), "254722000000".to_string()],
        ];
        let bytes = encode(&["Name", "Phone Number"], rows).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "Name,Phone Number\n\"Doe, Jane\",254712345678\n\"Say \"\"hi\"\"\",254722000000\n"
        );
    }

    #[test]
    fn test_encode_then_decode_preserves_cells() {
        let rows = vec![vec!["Line\nbreak", "254712345678"]];
        let bytes = encode(&["Name", "Phone Number"], rows).unwrap();
        let table = decode(&bytes).unwrap();
        assert_eq!(table.rows[0][0], "Line\nbreak");
    }
}
