//! Bean IDs, slugs and the file names that encode them.

use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

/// Characters used for the random part of an ID.
pub const ID_ALPHABET: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

/// Maximum slug length in characters.
pub const MAX_SLUG_LEN: usize = 50;

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new ID: `prefix` followed by `length` characters from [`ID_ALPHABET`].
///
/// The characters are derived from a SHA-256 of the seed, the current time
/// and a process-wide counter, so repeated calls with the same seed differ.
pub fn generate_id(prefix: &str, length: usize, seed: &str) -> String {
    let alphabet = ID_ALPHABET.as_bytes();
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(
        chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or(0)
            .to_le_bytes(),
    );
    hasher.update(counter.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    let mut block = hasher.finalize();

    let mut id = String::with_capacity(prefix.len() + length);
    id.push_str(prefix);
    let mut pos = 0;
    for _ in 0..length {
        if pos == block.len() {
            block = Sha256::digest(block);
            pos = 0;
        }
        id.push(alphabet[block[pos] as usize % alphabet.len()] as char);
        pos += 1;
    }
    id
}

/// Turn a title into a file name friendly slug.
///
/// Lowercased; whitespace and underscores become dashes; anything that is not
/// alphanumeric or a dash is dropped; dash runs collapse; the result is trimmed
/// of dashes and truncated to [`MAX_SLUG_LEN`] characters.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        let c = if c.is_whitespace() || c == '_' { '-' } else { c };
        if c == '-' {
            if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        } else if c.is_alphanumeric() {
            slug.push(c);
        }
    }

    let truncated: String = slug.chars().take(MAX_SLUG_LEN).collect();
    truncated.trim_matches('-').to_string()
}

/// Split a bean file name into its ID and slug.
///
/// Accepted forms are `<id>--<slug>.md`, `<id>.<slug>.md` and `<id>.md`.
/// The slug is empty when the name carries none.
pub fn parse_filename(name: &str) -> (String, String) {
    let stem = name.strip_suffix(".md").unwrap_or(name);

    if let Some((id, slug)) = stem.split_once("--") {
        return (id.to_string(), slug.to_string());
    }
    if let Some((id, slug)) = stem.split_once('.') {
        return (id.to_string(), slug.to_string());
    }
    (stem.to_string(), String::new())
}

/// Build the canonical file name for an ID and slug.
pub fn build_filename(id: &str, slug: &str) -> String {
    if slug.is_empty() {
        format!("{}.md", id)
    } else {
        format!("{}--{}.md", id, slug)
    }
}

/// Validate that a string is usable as a bean ID.
///
/// IDs end up in file names, so path separators, dots, whitespace and the
/// `--` slug separator are not allowed. A leading or trailing `-` would merge
/// into the separator and change the ID on the next load.
pub fn validate_id(id: &str) -> crate::Result<()> {
    if id.is_empty() {
        return Err(crate::Error::InvalidId("ID cannot be empty".to_string()));
    }
    if id.starts_with('-') || id.ends_with('-') {
        return Err(crate::Error::InvalidId(format!(
            "ID cannot start or end with '-': {}",
            id
        )));
    }
    if id.contains("--") {
        return Err(crate::Error::InvalidId(format!(
            "ID cannot contain '--': {}",
            id
        )));
    }
    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(crate::Error::InvalidId(format!(
            "ID contains invalid character {:?}: {}",
            c, id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_slugify() {
        let cases = [
            ("Hello World", "hello-world"),
            ("hello_world", "hello-world"),
            ("Hello! World?", "hello-world"),
            ("hello   world", "hello-world"),
            ("hello---world", "hello-world"),
            ("--hello--", "hello"),
            ("", ""),
            ("Test 123", "test-123"),
            ("Hello, World! How's it going?", "hello-world-hows-it-going"),
            ("!@#$%^&*()", ""),
            ("Café Résumé", "café-résumé"),
            ("ALL CAPS", "all-caps"),
        ];
        for (input, expected) in cases {
            assert_eq!(slugify(input), expected, "slugify({:?})", input);
        }
    }

    #[test]
    fn test_slugify_truncates_without_trailing_dash() {
        assert_eq!(
            slugify("this is a very long title that should be truncated to fifty characters"),
            "this-is-a-very-long-title-that-should-be-truncated"
        );
        assert_eq!(
            slugify("this is a very long title that should be truncated-at dash"),
            "this-is-a-very-long-title-that-should-be-truncated"
        );
    }

    #[test]
    fn test_parse_filename() {
        let cases = [
            ("abc--my-slug.md", "abc", "my-slug"),
            ("beans-z5r9--add-unit-tests.md", "beans-z5r9", "add-unit-tests"),
            ("abc.my-slug.md", "abc", "my-slug"),
            ("beans-z5r9.add-unit-tests.md", "beans-z5r9", "add-unit-tests"),
            ("abc.md", "abc", ""),
            ("beans-z5r9.md", "beans-z5r9", ""),
            ("abc", "abc", ""),
            ("", "", ""),
            (".md", "", ""),
        ];
        for (name, id, slug) in cases {
            assert_eq!(
                parse_filename(name),
                (id.to_string(), slug.to_string()),
                "parse_filename({:?})",
                name
            );
        }
    }

    #[test]
    fn test_build_filename() {
        assert_eq!(build_filename("abc", "my-slug"), "abc--my-slug.md");
        assert_eq!(build_filename("abc", ""), "abc.md");
        assert_eq!(
            build_filename("beans-z5r9", "add-tests"),
            "beans-z5r9--add-tests.md"
        );
    }

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id("beans-", 4, "seed");
        assert_eq!(id.len(), 10);
        assert!(id.starts_with("beans-"));

        let long = generate_id("", 100, "seed");
        assert_eq!(long.len(), 100);
        assert!(long.chars().all(|c| ID_ALPHABET.contains(c)));
    }

    #[test]
    fn test_generate_id_unique() {
        let ids: HashSet<_> = (0..100).map(|_| generate_id("", 8, "same")).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("beans-a1b2").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("a--b").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("a.b").is_err());
        assert!(validate_id("task-").is_err());
        assert!(validate_id("-task").is_err());
    }

    #[test]
    fn test_valid_ids_survive_file_name_round_trip() {
        for id in ["beans-a1b2", "task", "a-b_c", "x1"] {
            validate_id(id).unwrap();
            let name = build_filename(id, "hello");
            assert_eq!(parse_filename(&name).0, id, "{}", name);
        }
    }
}
