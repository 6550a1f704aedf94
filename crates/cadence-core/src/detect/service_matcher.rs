//! Matching free-text merchant names against the service catalog

use crate::models::SubscriptionService;

/// Lowercased, trimmed form used for all name comparisons
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Minimum catalog name length for "candidate contains catalog name" matches
const MIN_CONTAINED_NAME_LEN: usize = 4;

/// Find the catalog service a merchant name refers to
///
/// Rules, first match wins:
/// 1. exact equality
/// 2. catalog name contains the candidate (shortest catalog name, then catalog order)
/// 3. candidate contains a catalog name of at least four characters (longest wins)
pub fn find_service<'a>(
    candidate: &str,
    catalog: &'a [SubscriptionService],
) -> Option<&'a SubscriptionService> {
    let needle = normalize_name(candidate);
    if needle.is_empty() {
        return None;
    }

    let names: Vec<(usize, String)> = catalog
        .iter()
        .enumerate()
        .map(|(i, s)| (i, normalize_name(&s.name)))
        .filter(|(_, n)| !n.is_empty())
        .collect();

    if let Some((i, _)) = names.iter().find(|(_, n)| *n == needle) {
        return Some(&catalog[*i]);
    }

    // min_by_key keeps the first of equal keys, which preserves catalog order
    if let Some((i, _)) = names
        .iter()
        .filter(|(_, n)| n.contains(&needle))
        .min_by_key(|(_, n)| n.chars().count())
    {
        return Some(&catalog[*i]);
    }

    names
        .iter()
        .filter(|(_, n)| n.chars().count() >= MIN_CONTAINED_NAME_LEN && needle.contains(n.as_str()))
        .fold(None::<&(usize, String)>, |best, item| match best {
            Some(b) if b.1.chars().count() >= item.1.chars().count() => Some(b),
            _ => Some(item),
        })
        .map(|(i, _)| &catalog[*i])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(names: &[&str]) -> Vec<SubscriptionService> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| SubscriptionService {
                id: i as i64 + 1,
                name: name.to_string(),
                slug: name.to_lowercase().replace(' ', "-"),
                domain: format!("{}.com", name.to_lowercase().replace(' ', "")),
                category: None,
                color: "#000000".to_string(),
                icon_cached: false,
            })
            .collect()
    }

    #[test]
    fn test_exact_match_ignores_case_and_whitespace() {
        let services = catalog(&["Netflix", "Spotify"]);
        let found = find_service("  NETFLIX ", &services).unwrap();
        assert_eq!(found.name, "Netflix");
    }

    #[test]
    fn test_candidate_contains_catalog_name() {
        let services = catalog(&["Netflix", "Spotify"]);
        let found = find_service("Spotify Premium", &services).unwrap();
        assert_eq!(found.name, "Spotify");
    }

    #[test]
    fn test_catalog_name_contains_candidate_prefers_shortest() {
        let services = catalog(&["YouTube Premium", "YouTube", "YouTube Music"]);
        let found = find_service("Tube", &services).unwrap();
        assert_eq!(found.name, "YouTube");

        let services = catalog(&["Disney Plus", "Disney Kids"]);
        // Same length: catalog order wins
        let found = find_service("Disney", &services).unwrap();
        assert_eq!(found.name, "Disney Plus");
    }

    #[test]
    fn test_short_catalog_names_not_matched_by_containment() {
        let services = catalog(&["HBO", "Box"]);
        assert!(find_service("HBO Max Monthly", &services).is_none());
        assert!(find_service("Boxing Gym", &services).is_none());
    }

    #[test]
    fn test_containment_prefers_longest_catalog_name() {
        let services = catalog(&["Apple", "Apple Music"]);
        let found = find_service("Apple Music Family", &services).unwrap();
        assert_eq!(found.name, "Apple Music");
    }

    #[test]
    fn test_empty_candidate() {
        let services = catalog(&["Netflix"]);
        assert!(find_service("   ", &services).is_none());
        assert!(find_service("Netflix", &[]).is_none());
    }

    #[test]
    fn test_no_match() {
        let services = catalog(&["Netflix", "Spotify"]);
        assert!(find_service("Corner Grocery", &services).is_none());
    }
}
