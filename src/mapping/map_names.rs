//! Raw map identifiers from the client log to the names players know.

const MAP_NAMES: &[(&str, &str)] = &[
    ("bigmap", "Customs"),
    ("RezervBase", "Reserve"),
    ("factory4_day", "Factory"),
    ("factory4_night", "Factory"),
    ("Sandbox", "Factory"),
    ("Sandbox_high", "Factory"),
    ("laboratory", "Labs"),
];

/// Display name for a raw map code, case-insensitive. Unmapped codes pass
/// through unchanged; missing or blank input yields `"Unknown"`.
pub fn map_display_name(raw: Option<&str>) -> String {
    let raw = match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => raw,
        None => return super::UNKNOWN.to_string(),
    };

    MAP_NAMES
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(raw))
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Every display name a raw code can map to, including `"Unknown"`
pub fn all_display_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = MAP_NAMES.iter().map(|(_, name)| *name).collect();
    names.push(super::UNKNOWN);
    names.sort_unstable();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_maps() {
        assert_eq!(map_display_name(Some("bigmap")), "Customs");
        assert_eq!(map_display_name(Some("REZERVBASE")), "Reserve");
        assert_eq!(map_display_name(Some("factory4_night")), "Factory");
        assert_eq!(map_display_name(Some("Sandbox_high")), "Factory");
        assert_eq!(map_display_name(Some("laboratory")), "Labs");
    }

    #[test]
    fn test_passthrough_and_blank() {
        assert_eq!(map_display_name(Some("Shoreline")), "Shoreline");
        assert_eq!(map_display_name(Some("   ")), "Unknown");
        assert_eq!(map_display_name(None), "Unknown");
    }

    #[test]
    fn test_all_display_names() {
        assert_eq!(
            all_display_names(),
            vec!["Customs", "Factory", "Labs", "Reserve", "Unknown"]
        );
    }
}
