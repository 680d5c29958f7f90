//! Cyrillic/Latin folding for Mongolian names and register numbers.
//!
//! Bank descriptions are typed in either script, often both in the same
//! word. Comparisons go through [`latin_key`], which maps Mongolian Cyrillic
//! to a Latin spelling and then folds the spellings that differ between
//! common romanizations, so `Ням-Очир` and `Nyam-Ochir` share a key.

/// Mongolian Cyrillic → Latin. Ө and Ү romanize as U on bank statements.
const CYRILLIC_TO_LATIN: &[(char, &str)] = &[
    ('А', "A"),
    ('Б', "B"),
    ('В', "V"),
    ('Г', "G"),
    ('Д', "D"),
    ('Е', "E"),
    ('Ё', "YO"),
    ('Ж', "ZH"),
    ('З', "Z"),
    ('И', "I"),
    ('Й', "Y"),
    ('К', "K"),
    ('Л', "L"),
    ('М', "M"),
    ('Н', "N"),
    ('О', "O"),
    ('Ө', "U"),
    ('П', "P"),
    ('Р', "R"),
    ('С', "S"),
    ('Т', "T"),
    ('У', "U"),
    ('Ү', "U"),
    ('Ф', "F"),
    ('Х', "KH"),
    ('Ц', "TS"),
    ('Ч', "CH"),
    ('Ш', "SH"),
    ('Щ', "SHCH"),
    ('Ъ', ""),
    ('Ы', "Y"),
    ('Ь', ""),
    ('Э', "E"),
    ('Ю', "YU"),
    ('Я', "YA"),
];

/// Spellings that several romanizations disagree on, folded to one form
const LATIN_FOLDS: &[(&str, &str)] = &[("ZH", "J"), ("KH", "H")];

/// Uppercase `text` and replace every Cyrillic letter with its Latin
/// spelling. Other characters pass through unchanged.
///
/// # Examples
///
/// ```
/// use loan_matcher::utils::transliteration::to_latin;
///
/// assert_eq!(to_latin("Ням-Очир"), "NYAM-OCHIR");
/// assert_eq!(to_latin("Төмөр"), "TUMUR");
/// ```
#[must_use]
pub fn to_latin(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_uppercase) {
        match CYRILLIC_TO_LATIN.iter().find(|(cyrillic, _)| *cyrillic == c) {
            Some((_, latin)) => out.push_str(latin),
            None => out.push(c),
        }
    }
    out
}

/// Script-insensitive comparison key: Latin spelling, folded, letters and
/// digits only
#[must_use]
pub fn latin_key(text: &str) -> String {
    let mut key: String = to_latin(text)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    for (from, to) in LATIN_FOLDS {
        key = key.replace(from, to);
    }
    key
}

/// Whether two names are the same once script and separators are ignored
#[must_use]
pub fn flexible_match(a: &str, b: &str) -> bool {
    let a = latin_key(a);
    !a.is_empty() && a == latin_key(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_script_names_share_a_key() {
        assert_eq!(latin_key("Ням-Очир"), "NYAMOCHIR");
        assert_eq!(latin_key("Nyam-Ochir"), "NYAMOCHIR");
        assert_eq!(latin_key("Номин-Эрдэнэ"), latin_key("nomin erdene"));
        assert_eq!(latin_key("Дорж"), latin_key("Dorj"));
        assert_eq!(latin_key("Хулан"), latin_key("Khulan"));
    }

    #[test]
    fn test_flexible_match() {
        assert!(flexible_match("Баяр", "BAYAR"));
        assert!(flexible_match("Ганбаатар", "Ganbaatar"));
        assert!(!flexible_match("Баяр", "Болд"));
        assert!(!flexible_match("", ""));
        assert!(!flexible_match("-", "-"));
    }

    #[test]
    fn test_soft_and_hard_signs_drop_out() {
        assert_eq!(to_latin("Ь"), "");
        assert_eq!(latin_key("Гэрэль"), "GEREL");
    }
}
