use super::phrases::PhraseBook;

/// Normalizes a free-form agent fee into a percentage.
///
/// Returns `None` when the text is not recognized; callers treat that as a fee that
/// cannot be ruled out. An empty field means the source stated no fee.
pub fn parse_commission(raw: &str) -> Option<u8> {
    parse_commission_with(raw, &PhraseBook::CURRENT)
}

pub(crate) fn parse_commission_with(raw: &str, phrases: &PhraseBook) -> Option<u8> {
    let text = raw.trim().to_lowercase();
    if text.is_empty() {
        return Some(0);
    }
    if phrases.mentions_no_commission(&text) {
        return Some(0);
    }

    let mut number = text.as_str();
    for prefix in phrases.commission_prefixes {
        if let Some(rest) = number.strip_prefix(prefix) {
            number = rest.trim_start_matches([' ', ':']);
            break;
        }
    }
    let number = number.trim_end_matches('%').trim();

    percent_from_number(number)
}

fn percent_from_number(number: &str) -> Option<u8> {
    if number.is_empty() {
        return None;
    }
    let normalized = number.replace(',', ".");
    let valid = normalized
        .chars()
        .enumerate()
        .all(|(index, ch)| ch.is_ascii_digit() || ch == '.' || (index == 0 && ch == '-'));
    if !valid {
        return None;
    }

    let value: f64 = normalized.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value.round().clamp(0.0, 100.0) as u8)
}
