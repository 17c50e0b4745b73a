use crate::utils::error::{Result, ScanError};
use std::collections::HashSet;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(ScanError::invalid_config(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(ScanError::invalid_config(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(ScanError::invalid_config(
            field_name,
            url_str,
            format!("Invalid URL format: {}", e),
        )),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ScanError::invalid_config(field_name, path, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(ScanError::invalid_config(field_name, path, "Path contains null bytes"));
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(ScanError::invalid_config(
            field_name,
            value,
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ScanError::invalid_config(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_unique_names<'a, I>(field_name: &str, names: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ScanError::invalid_config(field_name, name, "Duplicate name"));
        }
    }
    Ok(())
}

pub fn validate_finite(field_name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(ScanError::invalid_config(field_name, value, "Value must be a finite number"));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(ScanError::invalid_config(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("eligibility.url", "https://example.com").is_ok());
        assert!(validate_url("eligibility.url", "http://example.com").is_ok());
        assert!(validate_url("eligibility.url", "").is_err());
        assert!(validate_url("eligibility.url", "invalid-url").is_err());
        assert!(validate_url("eligibility.url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("scoring.top_n", 5, 1).is_ok());
        assert!(validate_positive_number("scoring.top_n", 0, 1).is_err());
    }

    #[test]
    fn test_validate_unique_names() {
        assert!(validate_unique_names("scan.queries", ["a", "b"]).is_ok());
        assert!(validate_unique_names("scan.queries", ["a", "b", "a"]).is_err());
    }

    #[test]
    fn test_validate_range_and_finite() {
        assert!(validate_range("scoring.neutral_band_pct", 1.5, 0.0, 100.0).is_ok());
        assert!(validate_range("scoring.neutral_band_pct", -1.0, 0.0, 100.0).is_err());
        assert!(validate_finite("filter.min_price", f64::NAN).is_err());
        assert!(validate_finite("filter.min_price", 100.0).is_ok());
    }
}
