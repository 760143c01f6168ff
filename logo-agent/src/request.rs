//! Request schema and validation.
//!
//! A [`LogoRequest`] is the client-supplied body of `POST /v1/logo`. It is
//! decoded strictly (unknown fields are rejected) and every string and list is
//! bounded before the request is accepted. Once accepted it is never mutated.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Character bounds for a single string field.
#[derive(Debug, Clone, Copy)]
struct TextBounds {
    min_chars: usize,
    max_chars: usize,
}

/// Bounds for a list-of-strings field.
#[derive(Debug, Clone, Copy)]
struct ListBounds {
    max_items: usize,
    item: TextBounds,
}

const REQUEST_ID: TextBounds = TextBounds {
    min_chars: 6,
    max_chars: 200,
};
const BRAND: TextBounds = TextBounds {
    min_chars: 1,
    max_chars: 120,
};
const INDUSTRY: TextBounds = BRAND;
const SHORT_TAG: TextBounds = TextBounds {
    min_chars: 1,
    max_chars: 40,
};
const VIBE: ListBounds = ListBounds {
    max_items: 12,
    item: SHORT_TAG,
};
const COLORS: ListBounds = ListBounds {
    max_items: 8,
    item: SHORT_TAG,
};
const ICON_IDEAS: ListBounds = ListBounds {
    max_items: 10,
    item: SHORT_TAG,
};
const AVOID: ListBounds = ListBounds {
    max_items: 12,
    item: TextBounds {
        min_chars: 1,
        max_chars: 60,
    },
};

/// A branding request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LogoRequest {
    /// Optional client-chosen request identifier. Part of the fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Brand name.
    pub brand: String,
    /// Industry or market the brand operates in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    /// Style tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibe: Option<Vec<String>>,
    /// Palette restrictions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<String>>,
    /// Symbols worth exploring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_ideas: Option<Vec<String>>,
    /// Things the design must avoid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avoid: Option<Vec<String>>,
}

impl LogoRequest {
    /// Creates a request for `brand` with every optional field omitted.
    #[must_use]
    pub fn new(brand: impl Into<String>) -> Self {
        Self {
            request_id: None,
            brand: brand.into(),
            industry: None,
            vibe: None,
            colors: None,
            icon_ideas: None,
            avoid: None,
        }
    }

    /// Decodes and validates a JSON request body.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the body is not a JSON object of the
    /// expected shape or any field violates its bounds.
    pub fn parse(body: &[u8]) -> Result<Self, ValidationError> {
        let request: Self =
            serde_json::from_slice(body).map_err(|e| ValidationError::form(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    /// Checks every field against its bounds, collecting all violations.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing each offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::default();
        if let Some(id) = &self.request_id {
            check_text(&mut err, "requestId", id, REQUEST_ID);
        }
        check_text(&mut err, "brand", &self.brand, BRAND);
        if let Some(industry) = &self.industry {
            check_text(&mut err, "industry", industry, INDUSTRY);
        }
        check_list(&mut err, "vibe", self.vibe.as_deref(), VIBE);
        check_list(&mut err, "colors", self.colors.as_deref(), COLORS);
        check_list(&mut err, "iconIdeas", self.icon_ideas.as_deref(), ICON_IDEAS);
        check_list(&mut err, "avoid", self.avoid.as_deref(), AVOID);
        if err.is_empty() { Ok(()) } else { Err(err) }
    }
}

fn text_violation(value: &str, bounds: TextBounds) -> Option<String> {
    let chars = value.chars().count();
    if chars < bounds.min_chars {
        Some(format!(
            "must contain at least {} character(s)",
            bounds.min_chars
        ))
    } else if chars > bounds.max_chars {
        Some(format!(
            "must contain at most {} character(s)",
            bounds.max_chars
        ))
    } else {
        None
    }
}

fn check_text(err: &mut ValidationError, field: &str, value: &str, bounds: TextBounds) {
    if let Some(message) = text_violation(value, bounds) {
        err.push_field(field, message);
    }
}

fn check_list(err: &mut ValidationError, field: &str, items: Option<&[String]>, bounds: ListBounds) {
    let Some(items) = items else {
        return;
    };
    if items.len() > bounds.max_items {
        err.push_field(
            field,
            format!("must contain at most {} item(s)", bounds.max_items),
        );
    }
    for (i, item) in items.iter().enumerate() {
        if let Some(message) = text_violation(item, bounds.item) {
            err.push_field(field, format!("item {i} {message}"));
        }
    }
}

/// A request that failed schema validation.
///
/// Serialized as `{ "formErrors": [...], "fieldErrors": { field: [...] } }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    /// Errors not attributable to a single field (e.g. malformed JSON).
    pub form_errors: Vec<String>,
    /// Errors keyed by the offending field's wire name.
    pub field_errors: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    /// Creates an error with a single form-level message.
    #[must_use]
    pub fn form(message: impl Into<String>) -> Self {
        Self {
            form_errors: vec![message.into()],
            field_errors: BTreeMap::new(),
        }
    }

    /// Adds a message for `field`.
    pub fn push_field(&mut self, field: &str, message: impl Into<String>) {
        self.field_errors
            .entry(field.to_owned())
            .or_default()
            .push(message.into());
    }

    /// Returns `true` if no violation was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.form_errors.is_empty() && self.field_errors.is_empty()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid request")?;
        let mut sep = ": ";
        for message in &self.form_errors {
            write!(f, "{sep}{message}")?;
            sep = "; ";
        }
        for (field, messages) in &self.field_errors {
            for message in messages {
                write!(f, "{sep}{field} {message}")?;
                sep = "; ";
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_request() {
        let request = LogoRequest::parse(br#"{"brand":"Acme"}"#).unwrap();
        assert_eq!(request, LogoRequest::new("Acme"));
    }

    #[test]
    fn test_full_request() {
        let request = LogoRequest::parse(
            br#"{
                "requestId": "req-123456",
                "brand": "Acme",
                "industry": "logistics",
                "vibe": ["calm"],
                "colors": ["teal", "white"],
                "iconIdeas": ["arrow"],
                "avoid": ["skulls"]
            }"#,
        )
        .unwrap();
        assert_eq!(request.request_id.as_deref(), Some("req-123456"));
        assert_eq!(request.icon_ideas, Some(vec!["arrow".to_owned()]));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = LogoRequest::parse(br#"{"brand":"Acme","price":0}"#).unwrap_err();
        assert_eq!(err.form_errors.len(), 1);
        assert!(err.form_errors[0].contains("price"));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = LogoRequest::parse(b"{brand:").unwrap_err();
        assert!(!err.form_errors.is_empty());
        let err = LogoRequest::parse(br#"{"industry":"x"}"#).unwrap_err();
        assert!(err.form_errors[0].contains("brand"));
    }

    #[test]
    fn test_bounds_collect_every_violation() {
        let mut request = LogoRequest::new("");
        request.request_id = Some("abc".into());
        request.colors = Some(vec!["c".into(); 9]);
        request.avoid = Some(vec![String::new(), "x".repeat(61)]);
        let err = request.validate().unwrap_err();
        assert!(err.form_errors.is_empty());
        assert_eq!(err.field_errors["brand"].len(), 1);
        assert_eq!(err.field_errors["requestId"].len(), 1);
        assert_eq!(err.field_errors["colors"].len(), 1);
        assert_eq!(err.field_errors["avoid"].len(), 2);
        assert!(!err.field_errors.contains_key("vibe"));
    }

    #[test]
    fn test_bounds_count_characters_not_bytes() {
        let request = LogoRequest::new("é".repeat(120));
        assert!(request.validate().is_ok());
        let request = LogoRequest::new("é".repeat(121));
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_serialization_omits_absent_fields() {
        let value = serde_json::to_value(LogoRequest::new("Acme")).unwrap();
        assert_eq!(value, serde_json::json!({ "brand": "Acme" }));
    }

    #[test]
    fn test_error_serialization_shape() {
        let mut err = ValidationError::default();
        err.push_field("brand", "must contain at least 1 character(s)");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "formErrors": [],
                "fieldErrors": { "brand": ["must contain at least 1 character(s)"] }
            })
        );
        assert_eq!(
            err.to_string(),
            "invalid request: brand must contain at least 1 character(s)"
        );
    }
}
