//! Slug normalization policy.
//!
//! Slugs are the article's external identity and URL path segment. Editors
//! usually leave the field blank and get one derived from the title; the
//! store's uniqueness check on write is the enforcement point either way.

/// Derive a slug from a title: lowercase, drop everything outside
/// `[a-z0-9 \t-]`, trim, collapse whitespace runs to single hyphens, and
/// collapse hyphen runs. May return an empty string (e.g. a title of
/// punctuation only); callers must treat that as invalid input.
pub fn slugify(title: &str) -> String {
    let mut cleaned = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || c == '-' {
            cleaned.push(c);
        }
    }

    let mut slug = String::with_capacity(cleaned.len());
    let mut previous_hyphen = false;
    for c in cleaned.trim().chars() {
        let mapped = if c.is_whitespace() { '-' } else { c };
        if mapped == '-' {
            if !previous_hyphen {
                slug.push('-');
            }
            previous_hyphen = true;
        } else {
            slug.push(mapped);
            previous_hyphen = false;
        }
    }
    slug
}

/// Whether an explicitly provided slug is already in the URL-safe alphabet.
pub fn is_valid(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::{is_valid, slugify};
    use proptest::prelude::*;

    #[test]
    fn basic_titles() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  Expense   Policy  "), "expense-policy");
        assert_eq!(slugify("Q3 2024 Roadmap!"), "q3-2024-roadmap");
        assert_eq!(slugify("Already-Hyphenated - Title"), "already-hyphenated-title");
    }

    #[test]
    fn strips_punctuation_and_unicode() {
        assert_eq!(slugify("C'est la vie"), "cest-la-vie");
        assert_eq!(slugify("100% Remote: FAQ"), "100-remote-faq");
        assert_eq!(slugify("émigré"), "migr");
    }

    #[test]
    fn degenerate_titles_go_empty() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
        assert_eq!(slugify("   "), "");
    }

    #[test]
    fn validity() {
        assert!(is_valid("hello-world"));
        assert!(is_valid("a"));
        assert!(!is_valid(""));
        assert!(!is_valid("Hello"));
        assert!(!is_valid("with space"));
        assert!(!is_valid("trailing-ok-but-ünicode-not"));
    }

    proptest! {
        #[test]
        fn output_is_valid_or_empty(title in ".{0,64}") {
            let slug = slugify(&title);
            prop_assert!(slug.is_empty() || is_valid(&slug));
        }

        #[test]
        fn idempotent(title in ".{0,64}") {
            let once = slugify(&title);
            prop_assert_eq!(slugify(&once), once);
        }

        #[test]
        fn no_hyphen_runs(title in ".{0,64}") {
            prop_assert!(!slugify(&title).contains("--"));
        }
    }
}
