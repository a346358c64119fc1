//! Title normalization.
//!
//! A post's normalized title (slug) is its storage identity: two display
//! titles that normalize to the same slug are the same post.

/// Map a display title to a lowercase, hyphen-delimited slug.
///
/// Every character that is not a letter, digit or whitespace becomes a
/// hyphen, whitespace runs become a single hyphen, repeated hyphens collapse
/// and leading/trailing hyphens are dropped. Only ASCII letters are lowered.
///
/// Never fails. Titles with no letters or digits produce an empty string,
/// which callers must reject before using it as a key.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());

    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    slug.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_punctuation_and_case() {
        assert_eq!(normalize_title("Hello, World!"), "hello-world");
        assert_eq!(normalize_title("What's New in 2024?"), "what-s-new-in-2024");
    }

    #[test]
    fn test_whitespace_runs() {
        assert_eq!(normalize_title("  multi   space  "), "multi-space");
        assert_eq!(normalize_title("tabs\tand\nnewlines"), "tabs-and-newlines");
    }

    #[test]
    fn test_repeated_hyphens_collapse() {
        assert_eq!(normalize_title("a -- b"), "a-b");
        assert_eq!(normalize_title("snake_case_title"), "snake-case-title");
    }

    #[test]
    fn test_empty_and_symbol_only() {
        assert_eq!(normalize_title(""), "");
        assert_eq!(normalize_title("   "), "");
        assert_eq!(normalize_title("!?!"), "");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "Hello, World!",
            "  multi   space  ",
            "Café au lait -- a review",
            "My First Post",
            "---",
            "ÀÉÎ upper",
        ];
        for s in samples {
            let once = normalize_title(s);
            assert_eq!(normalize_title(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_identical_titles_collide() {
        assert_eq!(normalize_title("My First Post"), normalize_title("my first post!"));
    }
}
