//! Free-text price parsing and image URL resolution.
//!
//! Pure functions, no I/O. Prices come back as integer hundredths of the major
//! unit together with an ISO 4217 code; no floating point is involved.

use regex::Regex;
use std::sync::LazyLock;

/// A parsed price in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPrice {
    pub price: u64,
    pub currency: String,
}

/// ISO 4217 codes accepted as an explicit currency signal.
const ISO_CODES: &[&str] = &[
    "AED", "ARS", "AUD", "BGN", "BRL", "CAD", "CHF", "CLP", "CNY", "COP", "CZK", "DKK", "EGP",
    "EUR", "GBP", "HKD", "HUF", "IDR", "ILS", "INR", "ISK", "JPY", "KRW", "KWD", "MAD", "MXN",
    "MYR", "NGN", "NOK", "NZD", "PEN", "PHP", "PKR", "PLN", "QAR", "RON", "RUB", "SAR", "SEK",
    "SGD", "THB", "TRY", "TWD", "UAH", "USD", "VND", "ZAR",
];

/// Currency symbols, most specific first. `US$` must precede `S$`, `CA$`
/// must precede `A$`, and the bare `$` comes last.
const SYMBOLS: &[(&str, &str)] = &[
    ("US$", "USD"),
    ("CA$", "CAD"),
    ("AU$", "AUD"),
    ("NZ$", "NZD"),
    ("HK$", "HKD"),
    ("MX$", "MXN"),
    ("C$", "CAD"),
    ("A$", "AUD"),
    ("S$", "SGD"),
    ("R$", "BRL"),
    ("zł", "PLN"),
    ("\u{20AC}", "EUR"),
    ("\u{00A3}", "GBP"),
    ("\u{00A5}", "JPY"),
    ("\u{20B9}", "INR"),
    ("\u{20A9}", "KRW"),
    ("\u{20BD}", "RUB"),
    ("\u{20BA}", "TRY"),
    ("\u{20AA}", "ILS"),
    ("\u{0E3F}", "THB"),
    ("\u{20AB}", "VND"),
    ("\u{20B1}", "PHP"),
    ("\u{20B4}", "UAH"),
    ("$", "USD"),
];

static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^A-Za-z])([A-Z]{3})(?:[^A-Za-z]|$)").expect("currency code regex is valid")
});

// Space-grouped thousands ("1 234,56") first, then any digit run with `.`/`,`,
// then a bare fraction with a leading point (".99").
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"[0-9]{1,3}(?:[ '\u{A0}\u{202F}][0-9]{3})+(?:[.,][0-9]{1,2})?",
        r"|[0-9][0-9.,]*[0-9]|[0-9]|[.,][0-9]+",
    ))
    .expect("number regex is valid")
});

/// Parse a price fragment such as `"$1,234.56"` or `"1.234,56 €"`.
///
/// Returns `None` when there is no recognisable currency signal or no digits.
pub fn parse_price(text: &str) -> Option<ParsedPrice> {
    let currency = detect_currency(text)?;
    let price = parse_minor_units(text)?;
    Some(ParsedPrice {
        price,
        currency: currency.to_string(),
    })
}

/// Find the currency: an explicit ISO code wins over a symbol.
pub fn detect_currency(text: &str) -> Option<&'static str> {
    for caps in CODE_RE.captures_iter(text) {
        let code = &caps[1];
        if let Some(known) = ISO_CODES.iter().find(|c| **c == code) {
            return Some(known);
        }
    }
    SYMBOLS
        .iter()
        .find(|(symbol, _)| text.contains(symbol))
        .map(|(_, code)| *code)
}

/// Parse the first number in `text` into hundredths.
///
/// The last `.` or `,` is the decimal separator unless exactly three digits
/// follow it, in which case every separator groups thousands. A leading
/// separator (`.99`) always starts a fraction.
pub fn parse_minor_units(text: &str) -> Option<u64> {
    let raw = NUMBER_RE.find(text)?.as_str();
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '\'' | '\u{A0}' | '\u{202F}'))
        .collect();

    let (integer, fraction) = match cleaned.rfind(['.', ',']) {
        Some(0) => ("", &cleaned[1..]),
        Some(idx) if cleaned.len() - idx - 1 != 3 => (&cleaned[..idx], &cleaned[idx + 1..]),
        _ => (cleaned.as_str(), ""),
    };

    let integer_digits: String = integer.chars().filter(char::is_ascii_digit).collect();
    let whole: u64 = if integer_digits.is_empty() {
        0
    } else {
        integer_digits.parse().ok()?
    };

    let mut frac = fraction.bytes().map(|b| u64::from(b - b'0'));
    let tenths = frac.next().unwrap_or(0);
    let hundredths = frac.next().unwrap_or(0);
    let round_up = u64::from(frac.next().is_some_and(|d| d >= 5));

    whole
        .checked_mul(100)?
        .checked_add(tenths * 10 + hundredths + round_up)
}

/// Resolve an image reference against the page URL.
///
/// Handles absolute, protocol-relative (`//cdn...`) and relative paths.
/// Returns `None` for empty input, `data:` URIs, or anything that does not
/// resolve to an http(s) URL.
pub fn resolve_image_url(raw: Option<&str>, base_url: &str) -> Option<String> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    if raw.starts_with("data:") {
        return None;
    }
    let base = url::Url::parse(base_url).ok()?;
    let resolved = base.join(raw).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(price: u64, currency: &str) -> Option<ParsedPrice> {
        Some(ParsedPrice {
            price,
            currency: currency.to_string(),
        })
    }

    #[test]
    fn test_us_format() {
        assert_eq!(parse_price("$1,234.56"), parsed(123456, "USD"));
        assert_eq!(parse_price("$29.99"), parsed(2999, "USD"));
    }

    #[test]
    fn test_european_format() {
        assert_eq!(parse_price("1.234,56 €"), parsed(123456, "EUR"));
        assert_eq!(parse_price("29,99 €"), parsed(2999, "EUR"));
        assert_eq!(parse_price("1 234,56 €"), parsed(123456, "EUR"));
        assert_eq!(parse_price("1\u{A0}234,56\u{A0}€"), parsed(123456, "EUR"));
    }

    #[test]
    fn test_leading_decimal_point() {
        assert_eq!(parse_price("$.99"), parsed(99, "USD"));
        assert_eq!(parse_price("€,5"), parsed(50, "EUR"));
        assert_eq!(parse_price("USD .999"), parsed(100, "USD"));
        assert_eq!(parse_minor_units(".05"), Some(5));
    }

    #[test]
    fn test_pound() {
        assert_eq!(parse_price("£19.99"), parsed(1999, "GBP"));
    }

    #[test]
    fn test_no_price() {
        assert_eq!(parse_price("no price here"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn test_currency_without_number() {
        assert_eq!(parse_price("$ call for price"), None);
    }

    #[test]
    fn test_number_without_currency() {
        assert_eq!(parse_price("19.99"), None);
    }

    #[test]
    fn test_three_digit_group_is_thousands() {
        assert_eq!(parse_price("$1,234"), parsed(123400, "USD"));
        assert_eq!(parse_price("¥12.800"), parsed(1280000, "JPY"));
        assert_eq!(parse_price("CHF 1'299.00"), parsed(129900, "CHF"));
    }

    #[test]
    fn test_iso_code_leading_and_trailing() {
        assert_eq!(parse_price("USD 45.00"), parsed(4500, "USD"));
        assert_eq!(parse_price("45,00 PLN"), parsed(4500, "PLN"));
    }

    #[test]
    fn test_iso_code_beats_symbol() {
        assert_eq!(parse_price("$12.50 CAD"), parsed(1250, "CAD"));
    }

    #[test]
    fn test_unknown_code_is_not_a_signal() {
        assert_eq!(parse_price("XYZ 10.00"), None);
    }

    #[test]
    fn test_prefixed_dollar_symbols() {
        assert_eq!(parse_price("US$5.00"), parsed(500, "USD"));
        assert_eq!(parse_price("A$5.00"), parsed(500, "AUD"));
        assert_eq!(parse_price("CA$5.00"), parsed(500, "CAD"));
        assert_eq!(parse_price("R$ 89,90"), parsed(8990, "BRL"));
    }

    #[test]
    fn test_rounding_to_nearest_cent() {
        assert_eq!(parse_minor_units("1.2345"), Some(123));
        assert_eq!(parse_minor_units("1.2355"), Some(124));
        assert_eq!(parse_minor_units("9.5"), Some(950));
    }

    #[test]
    fn test_first_number_only() {
        assert_eq!(parse_price("$19.99 $29.99"), parsed(1999, "USD"));
    }

    #[test]
    fn test_negative_sign_ignored() {
        assert_eq!(parse_price("-$5.00"), parsed(500, "USD"));
    }

    #[test]
    fn test_resolve_absolute() {
        assert_eq!(
            resolve_image_url(Some("https://cdn.test/a.jpg"), "https://shop.test/p/1"),
            Some("https://cdn.test/a.jpg".to_string())
        );
    }

    #[test]
    fn test_resolve_protocol_relative() {
        assert_eq!(
            resolve_image_url(Some("//cdn.test/a.jpg"), "https://shop.test/p/1"),
            Some("https://cdn.test/a.jpg".to_string())
        );
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            resolve_image_url(Some("/img/a.jpg"), "https://shop.test/p/1"),
            Some("https://shop.test/img/a.jpg".to_string())
        );
        assert_eq!(
            resolve_image_url(Some("a.jpg"), "https://shop.test/p/1"),
            Some("https://shop.test/p/a.jpg".to_string())
        );
    }

    #[test]
    fn test_resolve_rejects_empty_and_unresolvable() {
        assert_eq!(resolve_image_url(None, "https://shop.test/"), None);
        assert_eq!(resolve_image_url(Some("   "), "https://shop.test/"), None);
        assert_eq!(resolve_image_url(Some("/a.jpg"), "not a url"), None);
        assert_eq!(
            resolve_image_url(Some("data:image/gif;base64,R0lG"), "https://shop.test/"),
            None
        );
        assert_eq!(resolve_image_url(Some("javascript:void(0)"), "https://shop.test/"), None);
    }
}
