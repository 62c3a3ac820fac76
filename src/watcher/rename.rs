//! Detection of the sync client's publish-rename convention.
//!
//! Nextcloud-style clients download into a hidden temp file named
//! `.<final>.~<revision-hex>` and rename it over the final name once the
//! content is complete. Seeing that rename is the only signal that a file
//! was just published by the client (the move emits no modify event).

/// Match a publish rename by file name.
///
/// Returns the final name embedded in `old_name` when `old_name` has the
/// shape `.<stem>.~<hex>` and `new_name` equals `<stem>`. The revision
/// token's length is whatever the client chose; only the shape matters.
pub fn match_publish_rename<'a>(old_name: &'a str, new_name: &str) -> Option<&'a str> {
    let stripped = old_name.strip_prefix('.')?;
    // The stem may itself contain `.~`; the token is everything after the
    // last occurrence, mirroring a greedy match on the stem.
    let (stem, token) = stripped.rsplit_once(".~")?;
    if stem.is_empty() || token.is_empty() {
        return None;
    }
    if !token
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return None;
    }
    (stem == new_name).then_some(stem)
}
