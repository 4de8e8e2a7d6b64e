//! Best-effort typed access to custom fields.
//!
//! Custom fields are configured per project on the server, and the server
//! encodes them inconsistently: a currency field may arrive as a JSON
//! number or as `"12.50"`, an integer as `3` or `3.0`, rich text as a
//! `{type, value}` mapping with either sub-key missing. [`CustomFields`]
//! holds the raw decoded values and offers one coercion accessor per
//! semantic kind. Coercion never fails: a missing key, a null, or a shape
//! the kind cannot absorb all read as `None`.
//!
//! Writes go through [`set`](CustomFields::set) verbatim; the server is the
//! schema authority and rejects what it does not accept.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// The custom-field container of an entity: field name to raw JSON value.
///
/// Serializes transparently as a JSON object, so entity types embed it
/// directly:
///
/// ```
/// use serde::Deserialize;
/// use trackline::CustomFields;
///
/// #[derive(Deserialize)]
/// struct WorkItemAttributes {
///     #[serde(flatten)]
///     custom_fields: CustomFields,
/// }
///
/// let attrs: WorkItemAttributes =
///     serde_json::from_str(r#"{"storyPoints": 3.0, "customer": "ACME"}"#).unwrap();
/// assert_eq!(attrs.custom_fields.get_int("storyPoints"), Some(3));
/// assert_eq!(attrs.custom_fields.get_string("customer"), Some("ACME"));
/// ```
///
/// Not synchronized; callers serialize concurrent writes to one container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomFields(Map<String, Value>);

/// A rich text value: a content type tag and the text itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichText {
    /// Content type, typically `text/html` or `text/plain`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// The text content.
    #[serde(default)]
    pub value: String,
}

impl RichText {
    /// A `text/plain` value.
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            kind: "text/plain".to_string(),
            value: value.into(),
        }
    }

    /// A `text/html` value.
    pub fn html(value: impl Into<String>) -> Self {
        Self {
            kind: "text/html".to_string(),
            value: value.into(),
        }
    }
}

/// A tabular field value: column keys plus rows of rich-text cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Column keys.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Rows, each holding one cell per column.
    #[serde(default)]
    pub rows: Vec<TableRow>,
}

/// One row of a [`Table`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    /// The row's cells, in column order.
    #[serde(default)]
    pub values: Vec<RichText>,
}

impl CustomFields {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fields, null-valued ones included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no fields are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over field names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Returns the raw value of a field, nulls included.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Stores a value verbatim. No client-side validation is applied.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Removes a field, returning its raw value if it was present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Reports key presence, independent of whether the value is null.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// The value of `key` unless absent or null.
    fn non_null(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Reads a string field. The value must already be a JSON string.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.non_null(key)?.as_str()
    }

    /// Reads an enumeration field. Option ids travel as plain strings.
    pub fn get_enum(&self, key: &str) -> Option<&str> {
        self.get_string(key)
    }

    /// Reads an integer field.
    ///
    /// Accepts any JSON number; floating values truncate toward zero, so
    /// `3.9` reads as `3` and `-3.9` as `-3`. Strings are not accepted.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.non_null(key)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
            _ => None,
        }
    }

    /// Reads a float field.
    ///
    /// Accepts any JSON number, and also a string parsed as a decimal
    /// number: the server transmits currency-like fields as `"12.50"`.
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.non_null(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Reads a boolean field. The value must already be a boolean.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.non_null(key)?.as_bool()
    }

    /// Reads a rich text field from a `{type, value}` mapping.
    ///
    /// Missing or non-string sub-keys default to empty strings; any
    /// non-mapping shape reads as `None`.
    pub fn get_text(&self, key: &str) -> Option<RichText> {
        text_from_value(self.non_null(key)?)
    }

    /// Reads a time-of-day field, transmitted as `HH:MM:SS`.
    pub fn get_time(&self, key: &str) -> Option<NaiveTime> {
        self.get_string(key)?.parse().ok()
    }

    /// Reads a date field, transmitted as `YYYY-MM-DD`.
    pub fn get_date(&self, key: &str) -> Option<NaiveDate> {
        self.get_string(key)?.parse().ok()
    }

    /// Reads a date-time field, transmitted as RFC 3339.
    pub fn get_date_time(&self, key: &str) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(self.get_string(key)?).ok()
    }

    /// Reads a work-duration field, transmitted as tokens like `"2d 4h 30m"`.
    ///
    /// Units are `d`, `h`, `m`, `s`; fractional amounts such as `"1.5d"`
    /// are accepted. A day is 24 hours.
    pub fn get_duration(&self, key: &str) -> Option<Duration> {
        parse_duration(self.get_string(key)?)
    }

    /// Reads a tabular field.
    ///
    /// The value must be a mapping with a `keys` list and/or a `rows` list.
    /// A malformed row or cell decodes to a zero-value entry instead of
    /// failing the table; a malformed column key reads as an empty string.
    pub fn get_table(&self, key: &str) -> Option<Table> {
        let map = self.non_null(key)?.as_object()?;
        if !map.contains_key("keys") && !map.contains_key("rows") {
            return None;
        }

        let keys = list_of(map, "keys")
            .iter()
            .map(|k| k.as_str().unwrap_or_default().to_string())
            .collect();

        let rows = list_of(map, "rows")
            .iter()
            .map(|row| {
                let Some(row) = row.as_object() else {
                    return TableRow::default();
                };
                let values = list_of(row, "values")
                    .iter()
                    .map(|cell| text_from_value(cell).unwrap_or_default())
                    .collect();
                TableRow { values }
            })
            .collect();

        Some(Table { keys, rows })
    }
}

impl From<Map<String, Value>> for CustomFields {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for CustomFields {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Decodes a `{type, value}` mapping, defaulting missing or non-string
/// sub-keys to empty strings. `None` for non-mapping shapes.
fn text_from_value(value: &Value) -> Option<RichText> {
    let map = value.as_object()?;
    let field = |name: &str| {
        map.get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Some(RichText {
        kind: field("type"),
        value: field("value"),
    })
}

fn list_of<'a>(map: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    map.get(key).and_then(Value::as_array).map_or(&[], Vec::as_slice)
}

fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    for token in input.split_whitespace() {
        let unit_at = token.find(|c: char| c.is_ascii_alphabetic())?;
        let (amount, unit) = token.split_at(unit_at);
        let amount: f64 = amount.parse().ok()?;
        if !amount.is_finite() || amount < 0.0 {
            return None;
        }
        let seconds = match unit {
            "d" => amount * 86_400.0,
            "h" => amount * 3_600.0,
            "m" => amount * 60.0,
            "s" => amount,
            _ => return None,
        };
        total += Duration::try_from_secs_f64(seconds).ok()?;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> CustomFields {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn string_requires_a_string() {
        let f = fields(json!({"customer": "ACME", "points": 3}));
        assert_eq!(f.get_string("customer"), Some("ACME"));
        assert_eq!(f.get_string("points"), None);
        assert_eq!(f.get_string("missing"), None);
        assert_eq!(f.get_enum("customer"), Some("ACME"));
    }

    #[test]
    fn int_truncates_floats_toward_zero() {
        let f = fields(json!({
            "a": 3,
            "b": 3.9,
            "c": -3.9,
            "d": "abc",
            "e": "4",
        }));
        assert_eq!(f.get_int("a"), Some(3));
        assert_eq!(f.get_int("b"), Some(3));
        assert_eq!(f.get_int("c"), Some(-3));
        assert_eq!(f.get_int("d"), None);
        // Numeric strings are rejected for integers, unlike floats.
        assert_eq!(f.get_int("e"), None);
    }

    #[test]
    fn float_accepts_numbers_and_decimal_strings() {
        let f = fields(json!({
            "n": 2.5,
            "i": 4,
            "currency": "12.50",
            "padded": " 7.25 ",
            "junk": "abc",
            "flag": true,
        }));
        assert_eq!(f.get_float("n"), Some(2.5));
        assert_eq!(f.get_float("i"), Some(4.0));
        assert_eq!(f.get_float("currency"), Some(12.5));
        assert_eq!(f.get_float("padded"), Some(7.25));
        assert_eq!(f.get_float("junk"), None);
        assert_eq!(f.get_float("flag"), None);
    }

    #[test]
    fn bool_requires_a_boolean() {
        let f = fields(json!({"done": true, "count": 1}));
        assert_eq!(f.get_bool("done"), Some(true));
        assert_eq!(f.get_bool("count"), None);
    }

    #[test]
    fn null_reads_as_absent_but_counts_as_present() {
        let f = fields(json!({"cleared": null}));
        assert_eq!(f.get_string("cleared"), None);
        assert_eq!(f.get_int("cleared"), None);
        assert!(f.contains("cleared"));
        assert!(!f.contains("missing"));
    }

    #[test]
    fn rich_text_defaults_missing_sub_keys() {
        let f = fields(json!({
            "full": {"type": "text/html", "value": "<b>hi</b>"},
            "bare": {"value": "plain words"},
            "odd": {"type": 7, "value": "kept"},
            "not_text": "just a string",
        }));

        assert_eq!(f.get_text("full"), Some(RichText::html("<b>hi</b>")));
        assert_eq!(
            f.get_text("bare"),
            Some(RichText {
                kind: String::new(),
                value: "plain words".to_string(),
            })
        );
        assert_eq!(f.get_text("odd").unwrap().kind, "");
        assert_eq!(f.get_text("odd").unwrap().value, "kept");
        assert_eq!(f.get_text("not_text"), None);
    }

    #[test]
    fn temporal_kinds_parse_or_read_absent() {
        let f = fields(json!({
            "standup": "09:15:00",
            "due": "2026-03-31",
            "created": "2026-03-01T10:30:00+02:00",
            "garbage": "not a date",
            "numeric": 20260331,
        }));

        assert_eq!(
            f.get_time("standup"),
            Some(NaiveTime::from_hms_opt(9, 15, 0).unwrap())
        );
        assert_eq!(
            f.get_date("due"),
            Some(NaiveDate::from_ymd_opt(2026, 3, 31).unwrap())
        );
        let created = f.get_date_time("created").unwrap();
        assert_eq!(created.to_rfc3339(), "2026-03-01T10:30:00+02:00");

        assert_eq!(f.get_date("garbage"), None);
        assert_eq!(f.get_date("numeric"), None);
        assert_eq!(f.get_date_time("due"), None);
    }

    #[test]
    fn durations_parse_token_lists() {
        let f = fields(json!({
            "estimate": "2d 4h 30m",
            "fractional": "1.5h",
            "bad_unit": "3w",
            "no_unit": "3",
        }));

        assert_eq!(
            f.get_duration("estimate"),
            Some(Duration::from_secs(2 * 86_400 + 4 * 3_600 + 30 * 60))
        );
        assert_eq!(f.get_duration("fractional"), Some(Duration::from_secs(5_400)));
        assert_eq!(f.get_duration("bad_unit"), None);
        assert_eq!(f.get_duration("no_unit"), None);
    }

    #[test]
    fn table_tolerates_malformed_rows_and_cells() {
        let f = fields(json!({
            "matrix": {
                "keys": ["component", "owner", 3],
                "rows": [
                    {"values": [
                        {"type": "text/plain", "value": "parser"},
                        {"type": "text/plain", "value": "ana"},
                    ]},
                    "not a row",
                    {"values": ["not a cell", {"value": "bo"}]},
                ],
            },
            "not_a_table": {"some": "object"},
        }));

        let table = f.get_table("matrix").unwrap();
        assert_eq!(table.keys, vec!["component", "owner", ""]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0].values[0].value, "parser");
        assert_eq!(table.rows[1], TableRow::default());
        assert_eq!(table.rows[2].values[0], RichText::default());
        assert_eq!(table.rows[2].values[1].value, "bo");

        assert_eq!(f.get_table("not_a_table"), None);
        assert_eq!(f.get_table("missing"), None);
    }

    #[test]
    fn set_stores_verbatim_and_remove_deletes() {
        let mut f = CustomFields::new();
        f.set("anything", json!({"deeply": ["nested", 1]}));
        f.set("count", 7);
        assert!(f.contains("anything"));
        assert_eq!(f.get_int("count"), Some(7));

        assert!(f.remove("anything").is_some());
        assert!(!f.contains("anything"));
        assert!(f.remove("anything").is_none());
    }

    #[test]
    fn serializes_transparently() {
        let mut f = CustomFields::new();
        f.set("points", 5);
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json, json!({"points": 5}));
    }
}
