//! Regex tables used by the detection engines.
//!
//! Each table is a named constant so it can be unit-tested on its own. Every
//! regex is compiled lazily from a literal; a pattern that fails to compile is
//! `None` and is skipped by the scanners (the tests below guarantee all of
//! them compile).

use regex::Regex;
use std::sync::LazyLock;

use crate::utils::validation::is_phone_token;

macro_rules! lazy_pattern {
    ($(#[$meta:meta])* $name:ident, $regex_str:expr) => {
        $(#[$meta])*
        pub static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($regex_str).ok());
    };
}

/// A compiled pattern with a stable name.
pub struct NamedPattern {
    pub name: &'static str,
    pub regex: &'static LazyLock<Option<Regex>>,
}

/// A plate format with the confidence it earns when matched.
pub struct PlateFormat {
    pub name: &'static str,
    pub regex: &'static LazyLock<Option<Regex>>,
    pub confidence: u8,
}

// ── Phone numbers ──────────────────────────────────────────────────────────
lazy_pattern!(RE_PHONE, r"\b\d{8}\b");

// ── License plates (Latin, Cyrillic and Mongolian letters) ─────────────────
lazy_pattern!(
    RE_PLATE_LETTERS_DIGITS,
    r"(?i)\b[A-Za-zА-Яа-яӨөҮүЁё]{2,3}-?\d{3,4}\b"
);
lazy_pattern!(
    RE_PLATE_DIGITS_LETTERS,
    r"(?i)\b\d{3,4}[A-Za-zА-Яа-яӨөҮүЁё]{2,3}\b"
);
lazy_pattern!(
    RE_PLATE_DIGITS_SPACE_LETTERS,
    r"(?i)\b\d{3,4}\s+[A-Za-zА-Яа-яӨөҮүЁё]{2,3}\b"
);
lazy_pattern!(
    RE_PLATE_LETTERS_DIGITS_LETTER,
    r"(?i)\b[A-Za-zА-Яа-яӨөҮүЁё]{3}\d{3}[A-Za-zА-Яа-яӨөҮүЁё]\b"
);
lazy_pattern!(
    RE_PLATE_DIGITS_LETTERS_DIGITS,
    r"(?i)\b\d{2}[A-Za-zА-Яа-яӨөҮүЁё]{2}\d{3}\b"
);
lazy_pattern!(RE_PLATE_REGISTRY, r"(?i)\d{2}-\d{2}\s*[А-Яа-яӨөҮүЁё]{3}");
lazy_pattern!(RE_PLATE_CYRILLIC, r"(?i)\d{4}[А-Яа-яӨөҮүЁё]{3}");
lazy_pattern!(
    RE_PLATE_CYRILLIC_FRAMED,
    r"(?i)[А-Яа-яӨөҮүЁё]{2}\d{4}[А-Яа-яӨөҮүЁё]{2}"
);
lazy_pattern!(RE_PLATE_SHORT_LATIN, r"(?i)[A-Z]\d{3}[A-Z]{2}");

// Anchored variants used to grade a plate that was already extracted
lazy_pattern!(RE_GRADE_REGISTRY, r"(?i)^\d{2}-\d{2}\s*[А-Яа-яӨөҮүЁё]{3}");
lazy_pattern!(RE_GRADE_CYRILLIC, r"(?i)^\d{4}[А-Яа-яӨөҮүЁё]{3}");
lazy_pattern!(RE_GRADE_LATIN_PREFIX, r"^[A-Za-z]{2,3}-?\d{3,4}");

/// Plate grammar shared by the phone-priority and license-plate engines, in
/// scan order.
pub static PLATE_PATTERNS: &[NamedPattern] = &[
    NamedPattern {
        name: "letters_digits",
        regex: &RE_PLATE_LETTERS_DIGITS,
    },
    NamedPattern {
        name: "digits_letters",
        regex: &RE_PLATE_DIGITS_LETTERS,
    },
    NamedPattern {
        name: "digits_space_letters",
        regex: &RE_PLATE_DIGITS_SPACE_LETTERS,
    },
    NamedPattern {
        name: "letters_digits_letter",
        regex: &RE_PLATE_LETTERS_DIGITS_LETTER,
    },
    NamedPattern {
        name: "digits_letters_digits",
        regex: &RE_PLATE_DIGITS_LETTERS_DIGITS,
    },
    NamedPattern {
        name: "registry",
        regex: &RE_PLATE_REGISTRY,
    },
    NamedPattern {
        name: "cyrillic",
        regex: &RE_PLATE_CYRILLIC,
    },
    NamedPattern {
        name: "cyrillic_framed",
        regex: &RE_PLATE_CYRILLIC_FRAMED,
    },
    NamedPattern {
        name: "short_latin",
        regex: &RE_PLATE_SHORT_LATIN,
    },
];

/// Plate confidence grades, most specific first. Plates matching none of
/// these get [`PLATE_BASE_CONFIDENCE`].
pub static PLATE_GRADES: &[PlateFormat] = &[
    PlateFormat {
        name: "registry",
        regex: &RE_GRADE_REGISTRY,
        confidence: 90,
    },
    PlateFormat {
        name: "cyrillic",
        regex: &RE_GRADE_CYRILLIC,
        confidence: 85,
    },
    PlateFormat {
        name: "latin_prefix",
        regex: &RE_GRADE_LATIN_PREFIX,
        confidence: 82,
    },
];

pub const PLATE_BASE_CONFIDENCE: u8 = 80;

// ── Loan disbursement phrases ──────────────────────────────────────────────
lazy_pattern!(RE_DISB_EB_GRANTED, r"(?i)EB-.*зээл олгов");
lazy_pattern!(RE_DISB_EB_ENGLISH, r"(?i)EB-.*loan disbursement");
lazy_pattern!(RE_DISB_EB_GRANTED_TO, r"(?i)EB-.*д зээл олгов");
lazy_pattern!(RE_DISB_EB_NUMBER, r"(?i)EB-\d+");
lazy_pattern!(RE_DISB_GRANTED, r"(?i).*зээл олгов.*");
lazy_pattern!(RE_DISB_LOAN_GRANTED, r"(?i).*loan granted.*");
lazy_pattern!(RE_DISB_GENERIC, r"(?i).*disbursement.*");

/// Disbursement signatures in scan order
pub static DISBURSEMENT_PATTERNS: &[NamedPattern] = &[
    NamedPattern {
        name: "eb_granted",
        regex: &RE_DISB_EB_GRANTED,
    },
    NamedPattern {
        name: "eb_english",
        regex: &RE_DISB_EB_ENGLISH,
    },
    NamedPattern {
        name: "eb_granted_to",
        regex: &RE_DISB_EB_GRANTED_TO,
    },
    NamedPattern {
        name: "eb_number",
        regex: &RE_DISB_EB_NUMBER,
    },
    NamedPattern {
        name: "granted",
        regex: &RE_DISB_GRANTED,
    },
    NamedPattern {
        name: "loan_granted",
        regex: &RE_DISB_LOAN_GRANTED,
    },
    NamedPattern {
        name: "disbursement",
        regex: &RE_DISB_GENERIC,
    },
];

lazy_pattern!(
    /// Customer named between the `EB-` prefix and a letters-only `-д` suffix
    RE_DISB_NAMED_GRANT,
    r"EB-[А-Яа-яA-Za-zӨөҮүЁё\s.]+-д зээл олгов"
);

// Name extraction, most specific first
lazy_pattern!(RE_NAME_GRANTED, r"(?i)EB-(.+)-д\s+зээл\s+олгов");
lazy_pattern!(RE_NAME_ENGLISH, r"(?i)EB-(.+?)\s+loan\s+disbursement");
lazy_pattern!(RE_NAME_FALLBACK, r"EB-([А-Яа-яA-Za-zӨөҮүЁё\s.]+)");
lazy_pattern!(
    RE_NAME_TRAILING_NOISE,
    r"(?i)(?:-д|\s+loan|\s+disbursement|\s+зээл).*$"
);

/// Name extraction patterns, tried in order; capture group 1 is the name
pub static NAME_EXTRACTORS: &[NamedPattern] = &[
    NamedPattern {
        name: "granted_to",
        regex: &RE_NAME_GRANTED,
    },
    NamedPattern {
        name: "english",
        regex: &RE_NAME_ENGLISH,
    },
    NamedPattern {
        name: "fallback",
        regex: &RE_NAME_FALLBACK,
    },
];

// ── Recurring pattern customer hints ───────────────────────────────────────
lazy_pattern!(RE_HINT_EB_NAME, r"EB-([^-]+)-д");
lazy_pattern!(RE_HINT_CYRILLIC_NAME, r"([А-ЯӨҮЁ][а-яөүё]+\s+[А-ЯӨҮЁ][а-яөүё]+)");
lazy_pattern!(RE_HINT_LATIN_NAME, r"\b([A-Z][a-z]+\s+[A-Z][a-z]+)\b");

pub static CUSTOMER_HINTS: &[NamedPattern] = &[
    NamedPattern {
        name: "eb_name",
        regex: &RE_HINT_EB_NAME,
    },
    NamedPattern {
        name: "cyrillic_name",
        regex: &RE_HINT_CYRILLIC_NAME,
    },
    NamedPattern {
        name: "latin_name",
        regex: &RE_HINT_LATIN_NAME,
    },
];

// ── Register numbers ───────────────────────────────────────────────────────
lazy_pattern!(
    /// Two prefix letters in either script, `3` allowed for З, then eight digits
    RE_ID_PREFIXED,
    r"\b([А-ЯЁӨҮа-яёөүA-Za-z][А-ЯЁӨҮа-яёөүA-Za-z3])-?([0-9]{8})\b"
);
lazy_pattern!(RE_ID_BARE, r"\b([0-9]{8})\b");

/// Register-number grammar, most specific first. Group 2 (or 1 for the bare
/// form) holds the digits.
pub static ID_PATTERNS: &[NamedPattern] = &[
    NamedPattern {
        name: "prefixed",
        regex: &RE_ID_PREFIXED,
    },
    NamedPattern {
        name: "bare_digits",
        regex: &RE_ID_BARE,
    },
];

/// Characters typed in place of the Cyrillic letters used in register
/// prefixes. Keyboard neighbours (Ц for Ч, Ъ for Л) and Latin look-alikes
/// fold onto the letter they stand for.
pub const ID_PREFIX_CONFUSIONS: &[(char, char)] = &[
    ('C', 'Ч'),
    ('Ц', 'Ч'),
    ('L', 'Л'),
    ('Ъ', 'Л'),
    ('T', 'Т'),
    ('Z', 'З'),
    ('3', 'З'),
    ('U', 'У'),
    ('Y', 'У'),
    ('Ү', 'У'),
    ('Ө', 'У'),
    ('A', 'А'),
    ('B', 'В'),
    ('E', 'Е'),
    ('H', 'Н'),
    ('K', 'К'),
    ('M', 'М'),
    ('O', 'О'),
    ('P', 'Р'),
    ('X', 'Х'),
];

/// A register number found in a description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterToken {
    /// Text as it appeared
    pub raw: String,
    /// Two-letter prefix, `None` for bare digits
    pub prefix: Option<String>,
    pub digits: String,
}

/// Fold a register prefix onto canonical Cyrillic so `TZ`, `ТZ` and `Т3`
/// all read `ТЗ`
#[must_use]
pub fn fold_id_prefix(prefix: &str) -> String {
    prefix
        .chars()
        .flat_map(char::to_uppercase)
        .map(|c| {
            ID_PREFIX_CONFUSIONS
                .iter()
                .find(|(typed, _)| *typed == c)
                .map_or(c, |(_, canonical)| *canonical)
        })
        .collect()
}

/// Register numbers in `text`, one per digit run. A prefixed form wins over
/// the same digits seen bare.
#[must_use]
pub fn extract_register_numbers(text: &str) -> Vec<RegisterToken> {
    let mut tokens: Vec<RegisterToken> = Vec::new();
    if let Some(re) = RE_ID_PREFIXED.as_ref() {
        for caps in re.captures_iter(text) {
            let (Some(raw), Some(prefix), Some(digits)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            if tokens.iter().any(|t| t.digits == digits.as_str()) {
                continue;
            }
            tokens.push(RegisterToken {
                raw: raw.as_str().to_string(),
                prefix: Some(prefix.as_str().to_string()),
                digits: digits.as_str().to_string(),
            });
        }
    }
    for digits in find_all(&RE_ID_BARE, text) {
        if tokens.iter().all(|t| t.digits != digits) {
            tokens.push(RegisterToken {
                raw: digits.clone(),
                prefix: None,
                digits,
            });
        }
    }
    tokens
}

// ── Mongolian names ────────────────────────────────────────────────────────
lazy_pattern!(
    /// `Б.Номин-Эрдэнэ`, `T.Gantulga`: capital initial, dot, name with optional
    /// hyphenated parts (which may include a case suffix)
    RE_NAME_INITIAL,
    r"\b([А-ЯЁӨҮA-Z])\.\s?([А-ЯЁӨҮа-яёөүA-Za-z]+(?:-[А-ЯЁӨҮа-яёөүA-Za-z]+)*)"
);
lazy_pattern!(
    /// Hyphenated compound name without an initial
    RE_NAME_COMPOUND,
    r"\b[А-ЯЁӨҮ][а-яёөү]+(?:-[А-ЯЁӨҮ][а-яёөү]+)+"
);
lazy_pattern!(
    /// Capitalized Cyrillic word long enough to be a given name
    RE_NAME_STANDALONE,
    r"\b[А-ЯЁӨҮ][а-яёөү]{5,}"
);

/// Name mention grammar, most specific first
pub static MONGOLIAN_NAME_PATTERNS: &[NamedPattern] = &[
    NamedPattern {
        name: "initial_name",
        regex: &RE_NAME_INITIAL,
    },
    NamedPattern {
        name: "compound",
        regex: &RE_NAME_COMPOUND,
    },
    NamedPattern {
        name: "standalone",
        regex: &RE_NAME_STANDALONE,
    },
];

/// Case suffixes attached to names with a hyphen (`Б.Ням-Очир-д`)
pub const NAME_CASE_SUFFIXES: &[&str] = &[
    "-д", "-г", "-аар", "-ээр", "-аас", "-ээс", "-тай", "-тэй",
];

/// Capitalized banking words the standalone name pattern must skip
pub const NAME_STOPWORDS: &[&str] = &[
    "зээлийн", "олгосон", "төлбөр", "гүйлгээ", "харилцах", "огноо", "шилжүүлэг",
];

/// Shortest compound name worth a lookup
const COMPOUND_NAME_MIN_CHARS: usize = 6;

/// A name mentioned in a description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameToken {
    /// Text as it appeared
    pub raw: String,
    pub initial: Option<char>,
    /// Name with any case suffix removed
    pub name: String,
}

/// Drop one trailing case suffix, ignoring case
#[must_use]
pub fn strip_case_suffix(name: &str) -> &str {
    let lower = name.to_lowercase();
    for suffix in NAME_CASE_SUFFIXES {
        if lower.ends_with(suffix) && lower.len() == name.len() {
            return &name[..name.len() - suffix.len()];
        }
    }
    name
}

fn push_name(tokens: &mut Vec<NameToken>, token: NameToken) {
    if token.name.chars().count() >= 2 && !tokens.iter().any(|t| t.name == token.name) {
        tokens.push(token);
    }
}

/// Name mentions in `text`, deduplicated in first-seen order.
///
/// Initial-and-name forms are preferred; compound and standalone names are
/// only collected when there is no initial form. A standalone word that is
/// part of a compound already found is skipped.
#[must_use]
pub fn extract_names(text: &str) -> Vec<NameToken> {
    let mut tokens: Vec<NameToken> = Vec::new();

    if let Some(re) = RE_NAME_INITIAL.as_ref() {
        for caps in re.captures_iter(text) {
            let (Some(raw), Some(initial), Some(name)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            let token = NameToken {
                raw: raw.as_str().to_string(),
                initial: initial.as_str().chars().next(),
                name: strip_case_suffix(name.as_str()).to_string(),
            };
            push_name(&mut tokens, token);
        }
    }
    if !tokens.is_empty() {
        return tokens;
    }

    for raw in find_all(&RE_NAME_COMPOUND, text) {
        let name = strip_case_suffix(&raw).to_string();
        if name.chars().count() >= COMPOUND_NAME_MIN_CHARS {
            let token = NameToken {
                raw,
                initial: None,
                name,
            };
            push_name(&mut tokens, token);
        }
    }
    for raw in find_all(&RE_NAME_STANDALONE, text) {
        if NAME_STOPWORDS.contains(&raw.to_lowercase().as_str())
            || tokens.iter().any(|t| t.raw.contains(raw.as_str()))
        {
            continue;
        }
        let token = NameToken {
            name: raw.clone(),
            raw,
            initial: None,
        };
        push_name(&mut tokens, token);
    }
    tokens
}

/// All matches of `pattern` in `text`, in order of appearance
#[must_use]
pub fn find_all(pattern: &LazyLock<Option<Regex>>, text: &str) -> Vec<String> {
    pattern.as_ref().map_or_else(Vec::new, |re| {
        re.find_iter(text).map(|m| m.as_str().to_string()).collect()
    })
}

/// Whether `pattern` matches anywhere in `text`
#[must_use]
pub fn is_match(pattern: &LazyLock<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

/// Capture group 1 of the first match of `pattern`
#[must_use]
pub fn first_capture(pattern: &LazyLock<Option<Regex>>, text: &str) -> Option<String> {
    pattern
        .as_ref()?
        .captures(text)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

/// Every 8-digit phone token in `text`, in order
#[must_use]
pub fn extract_phones(text: &str) -> Vec<String> {
    find_all(&RE_PHONE, text)
        .into_iter()
        .filter(|token| is_phone_token(token))
        .collect()
}

/// Every plate-shaped token in `text`, deduplicated in first-seen order
#[must_use]
pub fn extract_plates(text: &str) -> Vec<String> {
    let mut plates: Vec<String> = Vec::new();
    for pattern in PLATE_PATTERNS {
        for plate in find_all(pattern.regex, text) {
            if !plates.contains(&plate) {
                plates.push(plate);
            }
        }
    }
    plates
}

/// Confidence for an extracted plate based on how specific its format is
#[must_use]
pub fn grade_plate(plate: &str) -> u8 {
    PLATE_GRADES
        .iter()
        .find(|grade| is_match(grade.regex, plate))
        .map_or(PLATE_BASE_CONFIDENCE, |grade| grade.confidence)
}
