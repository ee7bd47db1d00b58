//! Normalisation of the certidões list field.
//!
//! Users paste references such as `Num. 72323682 - Pág. 3` separated by
//! commas or semicolons. [`parse`] is the single rule that turns that text
//! into an ordered set; [`join`] renders a stored set back into editable
//! text. `parse(join(parse(x))) == parse(x)` for items without delimiters.

/// Split on `,`/`;`, trim, drop empties, deduplicate keeping first occurrence.
///
/// Total: empty or all-whitespace input yields an empty list.
pub fn parse(text: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for piece in text.split([',', ';']) {
        let piece = piece.trim();
        if piece.is_empty() || items.iter().any(|seen| seen == piece) {
            continue;
        }
        items.push(piece.to_string());
    }
    items
}

/// Render a list back into the text form [`parse`] accepts.
pub fn join<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", ")
}
