//! Small text utilities shared by providers and the document pipeline.

/// Remove markup tags from speech markup, leaving the spoken text.
///
/// Providers without SSML support strip incoming markup rather than read
/// tag soup aloud. This is a tag-skipping scan, not an XML parse; malformed
/// markup degrades to text with the angle-bracket runs removed.
pub fn strip_ssml_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                if in_tag {
                    in_tag = false;
                    // Tag boundaries separate words when stripped.
                    if !out.ends_with(char::is_whitespace) && !out.is_empty() {
                        out.push(' ');
                    }
                } else {
                    out.push('>');
                }
            }
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Collapse all whitespace runs to single spaces and trim. Used when
/// comparing spoken text across representations.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
