pub const DEFAULT_EXCERPT_LENGTH: usize = 200;
/// Characters of context kept before the earliest hit.
const LEAD_CONTEXT: usize = 50;
const ELLIPSIS: &str = "...";

/// Preview window around the earliest literal occurrence of any matched term.
///
/// Lengths are counted in characters. When no term occurs literally in the content
/// (index terms are normalized tokens, not substrings), the first `max_len`
/// characters are returned instead.
pub fn excerpt<S: AsRef<str>>(content: &str, matched_terms: &[S], max_len: usize) -> String {
    // Terms are ASCII, so ASCII folding finds the same hits with byte offsets intact.
    let lowered = content.to_ascii_lowercase();
    let hit = matched_terms
        .iter()
        .map(AsRef::as_ref)
        .filter(|t| !t.is_empty())
        .filter_map(|t| lowered.find(t))
        .min();
    let total = content.chars().count();

    let Some(byte_pos) = hit else {
        let mut out: String = content.chars().take(max_len).collect();
        if total > max_len {
            out.push_str(ELLIPSIS);
        }
        return out;
    };

    let hit_char = content[..byte_pos].chars().count();
    let start = hit_char.saturating_sub(LEAD_CONTEXT);
    let end = hit_char.saturating_add(max_len).min(total);
    let mut out = String::with_capacity(end - start + 2 * ELLIPSIS.len());
    if start > 0 {
        out.push_str(ELLIPSIS);
    }
    out.extend(content.chars().skip(start).take(end - start));
    if end < total {
        out.push_str(ELLIPSIS);
    }
    out
}
