//! Input cleaning and risk flagging
//!
//! Stateless heuristics consulted by form handlers before submission:
//! normalization for emails and free text, password-strength validation, and
//! signature matching for SQL-injection and XSS shaped input.
//!
//! The detectors are pattern matches, not parsers. They exist to flag
//! obviously hostile input for logging and UX friction; they are trivially
//! bypassable and must never be the enforcement point. Real enforcement
//! belongs on the server.

use std::sync::LazyLock;

use regex::Regex;

/// Punctuation accepted as the "special character" password rule.
const SPECIAL_CHARACTERS: &str = "!@#$%^&*(),.?\":{}|<>";

static SQL_SIGNATURES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // OR/AND beside a comparison, the classic tautology probe
        r#"(?i)\b(or|and)\b\s+['"]?[\w@.]+['"]?\s*(=|<|>)"#,
        r"(?i)\bunion\b[\s\S]*\bselect\b",
        r"(?i)\bdrop\s+table\b",
        r"(?i)\binsert\s+into\b",
        r"(?i)\bdelete\s+from\b",
        // Comment markers used to truncate the rest of a statement
        r"--|/\*|\*/",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Invalid SQL signature pattern"))
    .collect()
});

static XSS_SIGNATURES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)<\s*script",
        r"(?i)<\s*iframe",
        r"(?i)javascript\s*:",
        // Inline event-handler attributes
        r"(?i)\bon(abort|blur|change|click|dblclick|error|focus|input|keydown|keypress|keyup|load|mousedown|mouseover|mouseup|submit)\s*=",
        r"(?i)\beval\s*\(",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Invalid XSS signature pattern"))
    .collect()
});

/// Normalize an email address: trim surrounding whitespace and lowercase.
pub fn sanitize_email(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Strip markup-significant characters (`<`, `>`, `"`, `'`) and trim.
pub fn sanitize_text(input: &str) -> String {
    let stripped: String = input
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\''))
        .collect();
    stripped.trim().to_string()
}

/// Result of a password-strength check.
#[derive(Debug, Clone)]
pub struct PasswordCheck {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Validate password strength, accumulating one error per missing rule.
pub fn validate_password(password: &str) -> PasswordCheck {
    let mut errors = Vec::new();

    if password.chars().count() < 8 {
        errors.push("Password must be at least 8 characters long".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number".to_string());
    }
    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        errors.push("Password must contain at least one special character".to_string());
    }

    PasswordCheck {
        valid: errors.is_empty(),
        errors,
    }
}

/// Whether the input matches any SQL-injection signature.
pub fn detect_sql_injection(input: &str) -> bool {
    SQL_SIGNATURES.iter().any(|signature| signature.is_match(input))
}

/// Whether the input matches any XSS signature.
pub fn detect_xss(input: &str) -> bool {
    XSS_SIGNATURES.iter().any(|signature| signature.is_match(input))
}

/// Whether either detector flags the input.
pub fn is_suspicious(input: &str) -> bool {
    detect_sql_injection(input) || detect_xss(input)
}
