//! Keystroke masking for the `DD/MM/YYYY` date input.

/// Maximum length of a masked date.
pub const MASKED_LEN: usize = 10;

/// Reshape the raw result of a keystroke into `DD/MM/YYYY` form.
///
/// Non-digits are stripped, `/` is inserted after the 2nd and 4th digit and
/// the result is cut at 10 characters. `_previous` is the value before the
/// keystroke; the mask only depends on `raw`, so it is accepted for callers
/// that track it but not consulted. Calendar validity is not checked here.
pub fn format(_previous: &str, raw: &str) -> String {
    let mut out = String::with_capacity(MASKED_LEN);
    for (i, digit) in raw.chars().filter(char::is_ascii_digit).enumerate() {
        if i == 2 || i == 4 {
            out.push('/');
        }
        out.push(digit);
        if out.len() >= MASKED_LEN {
            break;
        }
    }
    out
}
