//! Collision-resistant object names for uploads.

use uuid::Uuid;

/// Length of the random suffix appended to every uploaded name.
pub const UNIQUE_SUFFIX_LEN: usize = 16;

/// Base name used when nothing sluggable is left.
const FALLBACK_SLUG: &str = "file";

/// Lowercase ASCII slug: alphanumerics kept, every other run collapsed to `-`.
#[must_use]
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
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
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Builds `<slug(base)>-<16 hex chars><.ext>` from an original file name.
///
/// Directory components (either separator) are dropped; the extension is
/// kept lowercased when it is alphanumeric.
#[must_use]
pub fn unique_object_name(original_name: &str) -> String {
    let file_name = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);

    let (base, extension) = match file_name.rsplit_once('.') {
        Some((base, ext))
            if !base.is_empty()
                && !ext.is_empty()
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            (base, format!(".{}", ext.to_ascii_lowercase()))
        }
        _ => (file_name, String::new()),
    };

    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}{extension}",
        slugify(base),
        &random[..UNIQUE_SUFFIX_LEN]
    )
}
