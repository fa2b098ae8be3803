//! Text measurement helpers.

use unicode_segmentation::UnicodeSegmentation;

/// Count user-perceived characters (extended grapheme clusters).
///
/// Post length limits on the network are measured this way, so a
/// multi-codepoint emoji or a letter with combining marks counts as one.
pub fn count_graphemes(text: &str) -> usize {
    text.graphemes(true).count()
}
