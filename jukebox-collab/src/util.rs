use rand::{distributions::Alphanumeric, thread_rng, Rng};

pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}

/// Reduces a room name to a URL-safe identifier fragment.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_dash = true;

    for char in name.chars() {
        if char.is_ascii_alphanumeric() {
            slug.push(char.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    slug
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn slugs_are_url_safe() {
        assert_eq!(slugify("Friday Bangers"), "friday-bangers");
        assert_eq!(slugify("  lo-fi // beats  "), "lo-fi-beats");
        assert_eq!(slugify("Ünïcode room"), "ncode-room");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn random_strings_have_requested_length() {
        assert_eq!(random_string(32).len(), 32);
        assert!(random_string(8).chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
