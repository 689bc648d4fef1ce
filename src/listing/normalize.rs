//! Pure, idempotent field normalizers
//!
//! Every function here satisfies `f(f(x)) == f(x)`.

/// Separator reserved by downstream CSV exports
const FIELD_SEPARATOR: char = ';';

/// Flattens free text into a single clean line
///
/// Line breaks become `", "`, the field separator is dropped, whitespace runs
/// collapse to one space, and leading/trailing commas and spaces are trimmed.
///
/// # Examples
///
/// ```
/// use listing_harvester::listing::clean_text;
///
/// assert_eq!(clean_text("Hauptstr. 1\n20095  Hamburg"), "Hauptstr. 1, 20095 Hamburg");
/// assert_eq!(clean_text("Acme; GmbH"), "Acme GmbH");
/// ```
pub fn clean_text(value: &str) -> String {
    let flattened = value
        .replace("\r\n", "\n")
        .replace(['\n', '\r'], ", ")
        .replace(FIELD_SEPARATOR, "");

    flattened
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == ',' || c.is_whitespace())
        .to_string()
}

/// Removes every whitespace character
///
/// Used for phone numbers: `"040 123 45"` becomes `"04012345"`.
pub fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Zero-pads a numeric postal code to five digits
///
/// Non-numeric codes and codes that already have five or more digits are
/// returned unchanged.
pub fn pad_postal_code(code: &str) -> String {
    let code = code.trim();
    if !code.is_empty() && code.len() < 5 && code.chars().all(|c| c.is_ascii_digit()) {
        format!("{:0>5}", code)
    } else {
        code.to_string()
    }
}
