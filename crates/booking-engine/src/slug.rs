//! Public slugs for booking links.

use rand::Rng;

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 6;

/// Reduce a title to lowercase `[a-z0-9]` runs joined by single dashes.
///
/// ```
/// use booking_engine::slug::slugify;
///
/// assert_eq!(slugify("  Coffee Chat: 30 min! "), "coffee-chat-30-min");
/// ```
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch);
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Build a new slug: the slugified title plus a random base-36 suffix.
///
/// The suffix keeps links unique across meeting requests with the same
/// title. An empty title yields just the suffix.
pub fn generate_slug(title: &str) -> String {
    generate_slug_with(title, &mut rand::thread_rng())
}

/// [`generate_slug`] with a caller-supplied RNG.
pub fn generate_slug_with<R: Rng + ?Sized>(title: &str, rng: &mut R) -> String {
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    let base = slugify(title);
    if base.is_empty() {
        suffix
    } else {
        format!("{}-{}", base, suffix)
    }
}
