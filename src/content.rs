use sha2::{Digest, Sha256};

/// Computes the sha256 hex digest of document content. Doubles as the ETag.
#[must_use]
pub fn checksum_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Rough token count for budgeting chunks: one token per four characters,
/// rounded up. Intentionally cheap; consumers treat it as an estimate.
#[must_use]
pub fn estimate_tokens(text: &str) -> i64 {
    let chars = text.chars().count();
    (chars.div_ceil(4)) as i64
}

/// Derives a filesystem-safe slug from a title or folder name: lowercase
/// alphanumerics with single hyphens between word runs.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_sep = true;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('-');
            last_was_sep = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.is_empty() {
        slug.push_str("untitled");
    }

    slug
}

/// Builds the logical file path for a document from its folder directory
/// chain (root first) and slug.
#[must_use]
pub fn build_file_path(dir_chain: &[String], slug: &str) -> String {
    if dir_chain.is_empty() {
        format!("/{slug}.md")
    } else {
        format!("/{}/{slug}.md", dir_chain.join("/"))
    }
}
