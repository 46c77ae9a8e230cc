//! Positional parameter substitution for query templates.
//!
//! A template is scanned once, left to right: every `?` outside a
//! double-quoted literal is a placeholder. Inside literals, backslash is the
//! escape character, so `"a\"b"` contains no placeholder boundary. Bound
//! values are spliced in as literal text; everything outside the
//! placeholders is preserved verbatim.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};

/// A value bound to one placeholder.
///
/// The encodings are what the query language accepts as literals: canonical
/// decimal text for numbers, millisecond epoch integers for timestamps, and
/// double-quoted strings with `"` and `\` backslash-escaped.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    Str(String),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
}

impl Value {
    fn encode(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Str(v) => escape_string(v),
            Value::Timestamp(millis) => millis.to_string(),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v.timestamp_millis())
    }
}

/// Byte offsets of every placeholder in the template, in order of
/// appearance.
pub(crate) fn placeholder_positions(template: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut in_literal = false;
    let mut escaping = false;
    for (i, ch) in template.char_indices() {
        if in_literal {
            if escaping {
                escaping = false;
            } else if ch == '\\' {
                escaping = true;
            } else if ch == '"' {
                in_literal = false;
            }
        } else if ch == '?' {
            positions.push(i);
        } else if ch == '"' {
            in_literal = true;
        }
    }
    positions
}

/// A query template with recorded placeholder positions and bindings.
///
/// Ordinals are 1-based, in order of appearance. Every placeholder must be
/// bound before [`render`](Template::render) succeeds; the first unbound
/// ordinal is reported, before any network activity.
#[derive(Debug, Clone)]
pub struct Template {
    text: String,
    positions: Vec<usize>,
    values: Vec<Option<Value>>,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let positions = placeholder_positions(&text);
        let values = vec![None; positions.len()];
        Self {
            text,
            positions,
            values,
        }
    }

    /// Number of placeholders recorded in the template.
    pub fn parameter_count(&self) -> usize {
        self.positions.len()
    }

    /// Bind a value to the placeholder at `ordinal` (1-based).
    pub fn bind(&mut self, ordinal: usize, value: impl Into<Value>) -> Result<()> {
        if ordinal == 0 || ordinal > self.values.len() {
            return Err(Error::InvalidParameter(ordinal));
        }
        self.values[ordinal - 1] = Some(value.into());
        Ok(())
    }

    /// Clear all bindings, keeping the recorded placeholder positions.
    pub fn clear_bindings(&mut self) {
        for value in &mut self.values {
            *value = None;
        }
    }

    /// Produce the literal query text with all bindings spliced in.
    pub fn render(&self) -> Result<String> {
        if self.positions.is_empty() {
            return Ok(self.text.clone());
        }

        for (i, value) in self.values.iter().enumerate() {
            if value.is_none() {
                return Err(Error::UnboundParameter(i + 1));
            }
        }

        let mut out = String::with_capacity(self.text.len() + 16 * self.values.len());
        let mut last = 0;
        for (position, value) in self.positions.iter().zip(&self.values) {
            out.push_str(&self.text[last..*position]);
            out.push_str(&value.as_ref().expect("checked above").encode());
            last = position + 1;
        }
        out.push_str(&self.text[last..]);
        Ok(out)
    }
}

/// Wrap a string in double quotes, escaping `"` and `\` with a backslash.
fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn placeholders_are_recorded_left_to_right() {
        assert_eq!(placeholder_positions("? and ? or ?"), vec![0, 6, 11]);
    }

    #[test]
    fn question_marks_inside_literals_are_ignored() {
        assert_eq!(placeholder_positions(r#"a = "?" AND b = ?"#), vec![16]);
    }

    #[test]
    fn escaped_quotes_do_not_close_literals() {
        // the literal "a\"b?" never closes around the '?', so no placeholder
        assert_eq!(placeholder_positions(r#""a\"b?""#), Vec::<usize>::new());
    }

    #[test]
    fn integer_binding_renders_decimal_text() {
        let mut template = Template::new("SELECT * WHERE x = ?");
        template.bind(1, 5).unwrap();
        assert_eq!(template.render().unwrap(), "SELECT * WHERE x = 5");
    }

    #[test]
    fn string_binding_is_quoted_and_escaped() {
        let mut template = Template::new("SELECT * WHERE msg = ?");
        template.bind(1, r#"he said "hi""#).unwrap();
        assert_eq!(
            template.render().unwrap(),
            r#"SELECT * WHERE msg = "he said \"hi\"""#
        );
    }

    #[test]
    fn backslashes_are_escaped_in_strings() {
        let mut template = Template::new("path = ?");
        template.bind(1, r"C:\logs").unwrap();
        assert_eq!(template.render().unwrap(), r#"path = "C:\\logs""#);
    }

    #[test]
    fn timestamp_renders_as_epoch_millis() {
        let mut template = Template::new("t >= ?");
        let when = DateTime::from_timestamp_millis(1_500_000_000_123).unwrap();
        template.bind(1, when).unwrap();
        assert_eq!(template.render().unwrap(), "t >= 1500000000123");
    }

    #[test]
    fn unbound_placeholder_is_reported_by_ordinal() {
        let mut template = Template::new("a = ? AND b = ?");
        template.bind(1, 1).unwrap();
        assert_eq!(template.render().unwrap_err(), Error::UnboundParameter(2));
    }

    #[test]
    fn bindings_apply_in_order_of_appearance() {
        let mut template = Template::new("a = ? AND b = ? AND c = ?");
        template.bind(1, 10).unwrap();
        template.bind(2, "x").unwrap();
        template.bind(3, 2.5).unwrap();
        assert_eq!(
            template.render().unwrap(),
            r#"a = 10 AND b = "x" AND c = 2.5"#
        );
    }

    #[test]
    fn out_of_range_ordinal_is_rejected() {
        let mut template = Template::new("a = ?");
        assert_eq!(template.bind(2, 1).unwrap_err(), Error::InvalidParameter(2));
        assert_eq!(template.bind(0, 1).unwrap_err(), Error::InvalidParameter(0));
    }

    #[test]
    fn template_without_placeholders_renders_verbatim_without_bindings() {
        let template = Template::new(r#"SELECT * WHERE tag = "a?b""#);
        assert_eq!(template.render().unwrap(), r#"SELECT * WHERE tag = "a?b""#);
    }

    #[test]
    fn clear_bindings_requires_rebinding() {
        let mut template = Template::new("a = ?");
        template.bind(1, 7).unwrap();
        template.clear_bindings();
        assert_eq!(template.render().unwrap_err(), Error::UnboundParameter(1));
    }
}
