// Input validation utilities
//
// All validators return a user-facing message on failure; callers attach it to
// the offending field.

use chrono::NaiveDate;
use regex::Regex;

/// Required text field.
pub fn validate_required(label: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", label));
    }
    Ok(())
}

/// Email address (basic shape check; the backend re-validates).
pub fn validate_email(value: &str) -> Result<(), String> {
    let s = value.trim();
    if s.is_empty() {
        return Err("Email is required".to_string());
    }
    let re = Regex::new(r"^[^\s@]+@[^\s@]+\.[A-Za-z]{2,}$")
        .map_err(|e| format!("Internal error: failed to compile email regex: {}", e))?;
    if !re.is_match(s) {
        return Err("Enter a valid email address".to_string());
    }
    Ok(())
}

/// Phone number: optional leading `+`, digits with spaces/dashes, 7-15 digits total.
pub fn validate_phone(value: &str) -> Result<(), String> {
    let s = value.trim();
    if s.is_empty() {
        return Err("Phone number is required".to_string());
    }
    let body = s.strip_prefix('+').unwrap_or(s);
    if body
        .chars()
        .any(|c| !(c.is_ascii_digit() || c == ' ' || c == '-'))
    {
        return Err("Phone number may only contain digits, spaces and dashes".to_string());
    }
    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    if !(7..=15).contains(&digits) {
        return Err("Phone number must have between 7 and 15 digits".to_string());
    }
    Ok(())
}

/// Ownership percentage in (0, 100].
pub fn validate_percentage(value: &str) -> Result<(), String> {
    let s = value.trim().trim_end_matches('%').trim();
    let n = s
        .parse::<f64>()
        .map_err(|_| "Enter a percentage (e.g. 25 or 12.5)".to_string())?;
    if !(n > 0.0 && n <= 100.0) {
        return Err("Percentage must be greater than 0 and at most 100".to_string());
    }
    Ok(())
}

/// Calendar date in `YYYY-MM-DD`.
pub fn validate_iso_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| "Enter a date as YYYY-MM-DD".to_string())
}

/// Website URL; a bare host (`example.com`) is accepted and treated as https.
pub fn validate_website(value: &str) -> Result<(), String> {
    let s = value.trim();
    if s.is_empty() {
        return Err("Website is required".to_string());
    }
    let candidate = if s.contains("://") {
        s.to_string()
    } else {
        format!("https://{}", s)
    };
    let parsed = url::Url::parse(&candidate).map_err(|_| "Enter a valid website".to_string())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err("Website must use http or https".to_string());
    }
    match parsed.host_str() {
        Some(h) if h.contains('.') => Ok(()),
        _ => Err("Enter a valid website".to_string()),
    }
}

/// Decimal amount (turnover etc.); thousands separators allowed.
pub fn validate_amount(label: &str, value: &str) -> Result<(), String> {
    let cleaned: String = value.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Err(format!("{} is required", label));
    }
    match cleaned.parse::<f64>() {
        Ok(n) if n >= 0.0 => Ok(()),
        _ => Err(format!("{} must be a non-negative amount", label)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_rejects_whitespace() {
        assert!(validate_required("Company name", "   ").is_err());
        assert!(validate_required("Company name", "Acme").is_ok());
    }

    #[test]
    fn email_shapes() {
        assert!(validate_email("ops@acme.ae").is_ok());
        assert!(validate_email("ops@acme").is_err());
        assert!(validate_email("not an email").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn phone_digit_count() {
        assert!(validate_phone("+971 4 123 4567").is_ok());
        assert!(validate_phone("123").is_err());
        assert!(validate_phone("+971-abc").is_err());
    }

    #[test]
    fn percentage_bounds() {
        assert!(validate_percentage("25").is_ok());
        assert!(validate_percentage("12.5%").is_ok());
        assert!(validate_percentage("100").is_ok());
        assert!(validate_percentage("0").is_err());
        assert!(validate_percentage("101").is_err());
        assert!(validate_percentage("lots").is_err());
    }

    #[test]
    fn iso_date_parses() {
        assert!(validate_iso_date("2027-03-31").is_ok());
        assert!(validate_iso_date("31/03/2027").is_err());
    }

    #[test]
    fn website_accepts_bare_host() {
        assert!(validate_website("acme-gold.ae").is_ok());
        assert!(validate_website("https://acme-gold.ae/about").is_ok());
        assert!(validate_website("ftp://acme-gold.ae").is_err());
        assert!(validate_website("localhost").is_err());
    }

    #[test]
    fn amount_allows_separators() {
        assert!(validate_amount("Annual turnover", "1,250,000").is_ok());
        assert!(validate_amount("Annual turnover", "-5").is_err());
        assert!(validate_amount("Annual turnover", "").is_err());
    }
}
