//! Datacenter names of the form `CC-CCC` (country code, city code).

use super::countries::country_name;
use super::UNKNOWN;

/// Split `"de-frm"` into `("DE", "FRM")`. Anything without a dash, or a
/// missing value, yields `("Unknown", "Unknown")`.
pub fn parse_dc_name(dc_name: Option<&str>) -> (String, String) {
    let unknown = || (UNKNOWN.to_string(), UNKNOWN.to_string());

    let dc_name = match dc_name.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => name,
        None => return unknown(),
    };

    match dc_name.split_once('-') {
        Some((country, rest)) => {
            let city = rest.split('-').next().unwrap_or(rest);
            (country.trim().to_uppercase(), city.trim().to_uppercase())
        }
        None => unknown(),
    }
}

/// `"DE-FRM"` becomes `"Germany (FRM)"`
pub fn dc_display_name(dc_name: Option<&str>) -> String {
    let (country, city) = parse_dc_name(dc_name);
    if country == UNKNOWN {
        return UNKNOWN.to_string();
    }
    format!("{} ({})", country_name(&country), city)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dc_name() {
        assert_eq!(parse_dc_name(Some("DE-FRM")), ("DE".to_string(), "FRM".to_string()));
        assert_eq!(parse_dc_name(Some(" us-nyc ")), ("US".to_string(), "NYC".to_string()));
        assert_eq!(parse_dc_name(Some("A-B-C")), ("A".to_string(), "B".to_string()));
        assert_eq!(parse_dc_name(Some("NODASH")), ("Unknown".to_string(), "Unknown".to_string()));
        assert_eq!(parse_dc_name(None), ("Unknown".to_string(), "Unknown".to_string()));
    }

    #[test]
    fn test_dc_display_name() {
        assert_eq!(dc_display_name(Some("DE-FRM")), "Germany (FRM)");
        assert_eq!(dc_display_name(Some("XX-ABC")), "XX (ABC)");
        assert_eq!(dc_display_name(Some("")), "Unknown");
    }
}
