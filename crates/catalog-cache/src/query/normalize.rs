//! Token normalization shared by category lookup and facet matching.

/// Normalizes a slug, name or URL segment for comparison.
///
/// Lowercases, drops everything but alphanumerics, `_`, `-` and whitespace,
/// turns whitespace runs into a single `-`, collapses repeated `-` and trims
/// `-` from both ends. "Gaming  Laptops!" and "gaming-laptops" normalize to
/// the same token.
pub fn normalize_token(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());
    for ch in raw.trim().chars().flat_map(char::to_lowercase) {
        let mapped = if ch.is_whitespace() || ch == '-' {
            '-'
        } else if ch.is_alphanumeric() || ch == '_' {
            ch
        } else {
            continue;
        };
        if mapped == '-' && (normalized.is_empty() || normalized.ends_with('-')) {
            continue;
        }
        normalized.push(mapped);
    }
    while normalized.ends_with('-') {
        normalized.pop();
    }
    normalized
}

/// Collapses whitespace runs to single spaces and trims the ends.
pub fn normalize_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_names_and_slugs_to_same_token() {
        assert_eq!(normalize_token("Gaming Laptops"), "gaming-laptops");
        assert_eq!(normalize_token("gaming-laptops"), "gaming-laptops");
        assert_eq!(normalize_token("  Gaming  --  Laptops! "), "gaming-laptops");
        assert_eq!(normalize_token("15-inch"), "15-inch");
        assert_eq!(normalize_token("RTX 4060"), "rtx-4060");
    }

    #[test]
    fn strips_punctuation_and_edge_dashes() {
        assert_eq!(normalize_token("--Men's & Women's--"), "mens-womens");
        assert_eq!(normalize_token("snake_case"), "snake_case");
        assert_eq!(normalize_token("!!!"), "");
        assert_eq!(normalize_token(""), "");
    }

    #[test]
    fn whitespace_normalization_keeps_words() {
        assert_eq!(normalize_whitespace("  gaming \t laptop   bag "), "gaming laptop bag");
        assert_eq!(normalize_whitespace("   "), "");
    }
}
