use crate::error::{TixError, TixResult};
use regex::Regex;
use std::sync::OnceLock;
use validator::{Validate, ValidationErrors};

pub fn validate_model<T: Validate>(model: &T) -> TixResult<()> {
    match model.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let error_messages = format_validation_errors(&errors);
            Err(TixError::validation("request", error_messages))
        }
    }
}

pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages = Vec::new();

    for (field, field_errors) in errors.field_errors() {
        for error in field_errors {
            let message = match error.code.as_ref() {
                "length" => format!("Length validation failed for field '{}'", field),
                "range" => format!("Value out of range for field '{}'", field),
                "required" => format!("Field '{}' is required", field),
                code => format!("Validation failed for field '{}': {}", field, code),
            };
            messages.push(message);
        }
    }

    messages.sort();
    messages.join(", ")
}

fn case_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z]\d{6}-\d{5,}$").expect("case id pattern compiles"))
}

/// Case ids look like `I250101-00001`: a channel letter, `yyMMdd`, a daily sequence.
pub fn validate_case_id(case_id: &str) -> TixResult<()> {
    if case_id_pattern().is_match(case_id) {
        Ok(())
    } else {
        Err(TixError::validation(
            "caseId",
            format!("'{}' is not a case id (expected e.g. I250101-00001)", case_id),
        ))
    }
}

pub fn require_non_empty(field: &str, value: &str) -> TixResult<()> {
    if value.trim().is_empty() {
        Err(TixError::validation(field, "must not be empty"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1))]
        status: String,
        #[validate(range(min = 1, max = 5))]
        priority: i32,
    }

    #[test]
    fn test_case_id_format() {
        assert!(validate_case_id("I250101-00001").is_ok());
        assert!(validate_case_id("W991231-123456").is_ok());
        assert!(validate_case_id("250101-00001").is_err());
        assert!(validate_case_id("I2501-1").is_err());
    }

    #[test]
    fn test_validate_model_reports_fields() {
        let err = validate_model(&Sample { status: String::new(), priority: 9 }).unwrap_err();
        let TixError::Validation { message, .. } = err else {
            panic!("expected validation error");
        };
        assert!(message.contains("status"));
        assert!(message.contains("priority"));
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("title", "  ").is_err());
        assert!(require_non_empty("title", "Broken camera").is_ok());
    }
}
