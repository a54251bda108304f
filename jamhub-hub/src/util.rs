use rand::{distributions::Alphanumeric, thread_rng, Rng};

pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}

/// Turns a display name into an identifier-safe slug.
/// Runs of non-alphanumeric characters collapse into single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }

            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        slug.push_str("room");
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_string_has_requested_length_and_charset() {
        let value = random_string(32);

        assert_eq!(value.len(), 32);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn random_strings_differ() {
        assert_ne!(random_string(32), random_string(32));
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Jam"), "jam");
        assert_eq!(slugify("The Band"), "the-band");
        assert_eq!(slugify("  Friday -- Night!! "), "friday-night");
        assert_eq!(slugify("???"), "room");
    }
}
