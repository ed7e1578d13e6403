use regex::Regex;

const USERNAME_PATTERN: &str = r"^[a-zA-Z0-9_-]{3,50}$";
const HTML_TAG_PATTERN: &str = r"<[^>]*>";

const DISPLAY_NAME_MAX: usize = 100;

pub fn validate_username(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    let pattern = Regex::new(USERNAME_PATTERN).unwrap();
    if !pattern.is_match(trimmed) {
        return Err(
            "Username must be 3-50 characters using letters, digits, hyphens or underscores"
                .to_string(),
        );
    }
    Ok(trimmed.to_string())
}

/// Display names are free text, so markup is stripped rather than
/// rejected before the value is trimmed and length-capped.
pub fn sanitize_display_name(value: &str) -> Result<String, String> {
    let tags = Regex::new(HTML_TAG_PATTERN).unwrap();
    let stripped = tags.replace_all(value, "");
    let trimmed = stripped.trim();

    if trimmed.is_empty() {
        return Err("Display name cannot be empty".to_string());
    }

    let capped: String = trimmed.chars().take(DISPLAY_NAME_MAX).collect();
    Ok(capped)
}
