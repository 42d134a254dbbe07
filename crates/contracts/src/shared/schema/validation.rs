//! Validation rules attached to column types

use serde::Serialize;

/// Semantic validation rules for values of a column type
/// Copy trait for efficient passing
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ValidationRules {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Human-readable description of the accepted format (e.g. "RFC 3339")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<&'static str>,
}

impl ValidationRules {
    /// No constraints
    pub const fn none() -> Self {
        Self {
            min: None,
            max: None,
            pattern: None,
        }
    }

    /// Numeric range
    pub const fn range(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            pattern: None,
        }
    }

    /// Textual format described by `pattern`
    pub const fn pattern(pattern: &'static str) -> Self {
        Self {
            min: None,
            max: None,
            pattern: Some(pattern),
        }
    }

    /// Validate a numeric value against min/max rules
    pub fn validate_number(&self, value: f64, field_label: &str) -> Result<(), String> {
        if let Some(min) = self.min {
            if value < min {
                return Err(format!("{} must be at least {}", field_label, min));
            }
        }

        if let Some(max) = self.max {
            if value > max {
                return Err(format!("{} must be at most {}", field_label, max));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_rules() {
        let rules = ValidationRules::range(-10.0, 10.0);
        assert!(rules.validate_number(10.0, "value").is_ok());
        assert!(rules.validate_number(11.0, "value").is_err());
        assert!(rules.validate_number(-11.0, "value").is_err());
    }

    #[test]
    fn test_none_accepts_everything() {
        let rules = ValidationRules::none();
        assert!(rules.validate_number(f64::MAX, "value").is_ok());
        assert!(rules.validate_number(f64::MIN, "value").is_ok());
    }
}
