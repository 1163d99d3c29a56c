//! Built-in English normalizer.
//!
//! Spells out the things a voice-cloning engine tends to mumble: cardinal and
//! decimal numbers, ordinals, percentages, currency amounts, clock times and
//! common contractions.  Casing and punctuation are left alone because the
//! engine uses both for prosody and the dispatcher splits batches on
//! sentence punctuation.

use fancy_regex::{Captures, Regex};
use once_cell::sync::Lazy;

use super::TextNormalizer;

// ─────────────────────────────────────────────────────────────────────────────
// Numbers → words
// ─────────────────────────────────────────────────────────────────────────────

const SMALL: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    "ten", "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen",
    "seventeen", "eighteen", "nineteen",
];
const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];
const SCALES: [&str; 7] = [
    "", "thousand", "million", "billion", "trillion", "quadrillion", "quintillion",
];

/// 1..=999 in words.
fn below_thousand(n: u64) -> String {
    let mut words = Vec::with_capacity(2);
    if n >= 100 {
        words.push(format!("{} hundred", SMALL[(n / 100) as usize]));
    }
    match n % 100 {
        0 => {}
        r if r < 20 => words.push(SMALL[r as usize].to_string()),
        r if r % 10 == 0 => words.push(TENS[(r / 10) as usize].to_string()),
        r => words.push(format!("{}-{}", TENS[(r / 10) as usize], SMALL[(r % 10) as usize])),
    }
    words.join(" ")
}

fn unsigned_to_words(n: u64) -> String {
    if n == 0 {
        return SMALL[0].to_string();
    }
    // 1100, 1900: "eleven hundred", "nineteen hundred"
    if (1100..2000).contains(&n) && n % 100 == 0 {
        return format!("{} hundred", SMALL[(n / 100) as usize]);
    }
    let mut groups = Vec::new();
    let mut rest = n;
    for scale in SCALES {
        let group = rest % 1000;
        if group > 0 {
            let words = below_thousand(group);
            groups.push(if scale.is_empty() { words } else { format!("{} {}", words, scale) });
        }
        rest /= 1000;
        if rest == 0 {
            break;
        }
    }
    groups.reverse();
    groups.join(" ")
}

/// Integer in words, e.g. `-42` → `negative forty-two`.
pub fn number_to_words(n: i64) -> String {
    if n < 0 {
        format!("negative {}", unsigned_to_words(n.unsigned_abs()))
    } else {
        unsigned_to_words(n as u64)
    }
}

fn digit_word(c: char) -> Option<&'static str> {
    c.to_digit(10).map(|d| SMALL[d as usize])
}

/// Decimal string in words, fraction digits read one by one:
/// `3.14` → `three point one four`.  Thousands separators are ignored.
/// Returns `None` when the string is not a plain number.
pub fn decimal_to_words(raw: &str) -> Option<String> {
    let raw = raw.replace(',', "");
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.as_str()),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };
    let int_words = if int_part.is_empty() {
        SMALL[0].to_string()
    } else {
        unsigned_to_words(int_part.parse::<u64>().ok()?)
    };
    let mut out = if negative { format!("negative {}", int_words) } else { int_words };
    if let Some(frac) = frac_part {
        let digits: Option<Vec<&str>> = frac.chars().map(digit_word).collect();
        let digits = digits?;
        if !digits.is_empty() {
            out.push_str(" point ");
            out.push_str(&digits.join(" "));
        }
    }
    Some(out)
}

/// Ordinal in words: `21` → `twenty-first`.
pub fn ordinal_words(n: u64) -> String {
    const IRREGULAR: [(&str, &str); 10] = [
        ("one", "first"),
        ("two", "second"),
        ("three", "third"),
        ("four", "fourth"),
        ("five", "fifth"),
        ("six", "sixth"),
        ("seven", "seventh"),
        ("eight", "eighth"),
        ("nine", "ninth"),
        ("twelve", "twelfth"),
    ];
    let cardinal = unsigned_to_words(n);
    let split = cardinal.rfind(['-', ' ']).map(|i| i + 1).unwrap_or(0);
    let (head, last) = cardinal.split_at(split);
    let last = match IRREGULAR.iter().find(|(c, _)| *c == last) {
        Some((_, o)) => (*o).to_string(),
        None if last.ends_with('y') => format!("{}ieth", &last[..last.len() - 1]),
        None => format!("{}th", last),
    };
    format!("{}{}", head, last)
}

// ─────────────────────────────────────────────────────────────────────────────
// Patterns
// ─────────────────────────────────────────────────────────────────────────────

const NUM: &str = r"\d+(?:,\d{3})*(?:\.\d+)?";

static RE_CURRENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"([$€£¥₹])\s*({})\s*([KMB])?(?![A-Za-z\d])", NUM)).unwrap()
});
static RE_PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?<![\w.])(-?{})\s*%", NUM)).unwrap());
static RE_ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d+)(st|nd|rd|th)\b").unwrap());
static RE_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2}):(\d{2})(?:\s*(am|pm)\b)?").unwrap());
static RE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?<![\w.])-?{}", NUM)).unwrap());
static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());

/// Contractions with a fixed expansion.
static WHOLE_CONTRACTIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        ("can", "cannot"),
        ("won", "will not"),
        ("shan", "shall not"),
        ("ain", "is not"),
    ]
    .into_iter()
    .map(|(stem, full)| (Regex::new(&format!(r"(?i)\b{}['’]t\b", stem)).unwrap(), full))
    .chain([
        (Regex::new(r"(?i)\blet['’]s\b").unwrap(), "let us"),
        (Regex::new(r"(?i)\bit['’]s\b").unwrap(), "it is"),
    ])
    .collect()
});

/// Contractions that keep their stem: `(\w+)n't` → `$1 not`.
static SUFFIX_CONTRACTIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [("n['’]t", "not"), ("['’]re", "are"), ("['’]ve", "have"), ("['’]ll", "will"), ("['’]d", "would"), ("['’]m", "am")]
        .into_iter()
        .map(|(suffix, word)| (Regex::new(&format!(r"(?i)\b(\w+){}\b", suffix)).unwrap(), word))
        .collect()
});

// ─────────────────────────────────────────────────────────────────────────────
// Expansions
// ─────────────────────────────────────────────────────────────────────────────

/// Upper-case the first letter of `word` when `like` starts upper-case.
fn match_case(like: &str, word: &str) -> String {
    let upper = like.chars().next().is_some_and(char::is_uppercase);
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if upper => first.to_uppercase().chain(chars).collect(),
        _ => word.to_string(),
    }
}

pub fn expand_contractions(text: &str) -> String {
    let mut text = text.to_string();
    for (re, full) in WHOLE_CONTRACTIONS.iter() {
        text = re
            .replace_all(&text, |caps: &Captures| match_case(&caps[0], full))
            .into_owned();
    }
    for (re, word) in SUFFIX_CONTRACTIONS.iter() {
        text = re
            .replace_all(&text, |caps: &Captures| format!("{} {}", &caps[1], word))
            .into_owned();
    }
    text
}

/// (singular, plural, minor unit singular, minor unit plural)
fn currency_names(symbol: &str) -> (&'static str, &'static str, Option<(&'static str, &'static str)>) {
    match symbol {
        "$" => ("dollar", "dollars", Some(("cent", "cents"))),
        "€" => ("euro", "euros", Some(("cent", "cents"))),
        "£" => ("pound", "pounds", Some(("penny", "pence"))),
        "¥" => ("yen", "yen", None),
        _ => ("rupee", "rupees", None),
    }
}

fn scale_word(suffix: &str) -> &'static str {
    match suffix {
        "K" => "thousand",
        "M" => "million",
        _ => "billion",
    }
}

pub fn expand_currency(text: &str) -> String {
    RE_CURRENCY
        .replace_all(text, |caps: &Captures| {
            let (one, many, minor) = currency_names(&caps[1]);
            let raw = caps[2].replace(',', "");
            let Some(amount) = decimal_to_words(&raw) else {
                return caps[0].to_string();
            };
            if let Some(suffix) = caps.get(3) {
                return format!("{} {} {}", amount, scale_word(suffix.as_str()), many);
            }
            let (whole, cents) = match raw.split_once('.') {
                Some((w, c)) => (w, Some(c)),
                None => (raw.as_str(), None),
            };
            let whole_n: u64 = whole.parse().unwrap_or(0);
            match (cents, minor) {
                (Some(c), Some((minor_one, minor_many))) if c.len() <= 2 => {
                    let cents_n: u64 = format!("{:0<2}", c).parse().unwrap_or(0);
                    let mut out = format!(
                        "{} {}",
                        unsigned_to_words(whole_n),
                        if whole_n == 1 { one } else { many }
                    );
                    if cents_n > 0 {
                        out.push_str(&format!(
                            " and {} {}",
                            unsigned_to_words(cents_n),
                            if cents_n == 1 { minor_one } else { minor_many }
                        ));
                    }
                    out
                }
                (Some(_), _) => format!("{} {}", amount, many),
                (None, _) => format!("{} {}", amount, if whole_n == 1 { one } else { many }),
            }
        })
        .into_owned()
}

pub fn expand_percentages(text: &str) -> String {
    RE_PERCENT
        .replace_all(text, |caps: &Captures| match decimal_to_words(&caps[1]) {
            Some(words) => format!("{} percent", words),
            None => caps[0].to_string(),
        })
        .into_owned()
}

pub fn expand_ordinals(text: &str) -> String {
    RE_ORDINAL
        .replace_all(text, |caps: &Captures| match caps[1].parse::<u64>() {
            Ok(n) => ordinal_words(n),
            Err(_) => caps[0].to_string(),
        })
        .into_owned()
}

pub fn expand_times(text: &str) -> String {
    RE_TIME
        .replace_all(text, |caps: &Captures| {
            let (Ok(hour), Ok(minute)) = (caps[1].parse::<u64>(), caps[2].parse::<u64>()) else {
                return caps[0].to_string();
            };
            if hour > 23 || minute > 59 {
                return caps[0].to_string();
            }
            let mut out = unsigned_to_words(hour);
            match minute {
                0 if caps.get(3).is_none() => out.push_str(" o'clock"),
                0 => {}
                1..=9 => out.push_str(&format!(" oh {}", SMALL[minute as usize])),
                _ => out.push_str(&format!(" {}", unsigned_to_words(minute))),
            }
            if let Some(meridiem) = caps.get(3) {
                out.push(' ');
                out.push_str(&meridiem.as_str().to_uppercase());
            }
            out
        })
        .into_owned()
}

pub fn expand_numbers(text: &str) -> String {
    RE_NUMBER
        .replace_all(text, |caps: &Captures| {
            decimal_to_words(&caps[0]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Normalizer
// ─────────────────────────────────────────────────────────────────────────────

/// Which expansions [`EnglishNormalizer`] runs.  All on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnglishOptions {
    pub contractions: bool,
    pub currency: bool,
    pub percentages: bool,
    pub times: bool,
    pub ordinals: bool,
    pub numbers: bool,
}

impl Default for EnglishOptions {
    fn default() -> Self {
        Self {
            contractions: true,
            currency: true,
            percentages: true,
            times: true,
            ordinals: true,
            numbers: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnglishNormalizer {
    pub options: EnglishOptions,
}

impl EnglishNormalizer {
    pub fn with_options(options: EnglishOptions) -> Self {
        Self { options }
    }
}

impl TextNormalizer for EnglishNormalizer {
    fn normalize(&self, text: &str) -> String {
        let opts = &self.options;
        let mut text = text.to_string();
        // Currency, percent and time patterns contain plain numbers, so they
        // must run before the generic number pass.
        if opts.contractions {
            text = expand_contractions(&text);
        }
        if opts.currency {
            text = expand_currency(&text);
        }
        if opts.percentages {
            text = expand_percentages(&text);
        }
        if opts.times {
            text = expand_times(&text);
        }
        if opts.ordinals {
            text = expand_ordinals(&text);
        }
        if opts.numbers {
            text = expand_numbers(&text);
        }
        RE_SPACES.replace_all(&text, " ").into_owned()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(text: &str) -> String {
        EnglishNormalizer::default().normalize(text)
    }

    #[test]
    fn test_number_to_words() {
        assert_eq!(number_to_words(0), "zero");
        assert_eq!(number_to_words(12), "twelve");
        assert_eq!(number_to_words(40), "forty");
        assert_eq!(number_to_words(1200), "twelve hundred");
        assert_eq!(number_to_words(2000), "two thousand");
        assert_eq!(number_to_words(1_000_001), "one million one");
        assert_eq!(number_to_words(-42), "negative forty-two");
        assert!(number_to_words(i64::MIN).starts_with("negative nine quintillion"));
    }

    #[test]
    fn test_decimal_to_words() {
        assert_eq!(decimal_to_words("3.14").as_deref(), Some("three point one four"));
        assert_eq!(decimal_to_words("-0.5").as_deref(), Some("negative zero point five"));
        assert_eq!(decimal_to_words("1,250").as_deref(), Some("one thousand two hundred fifty"));
        assert_eq!(decimal_to_words("12a"), None);
    }

    #[test]
    fn test_ordinal_words() {
        assert_eq!(ordinal_words(1), "first");
        assert_eq!(ordinal_words(12), "twelfth");
        assert_eq!(ordinal_words(20), "twentieth");
        assert_eq!(ordinal_words(21), "twenty-first");
        assert_eq!(ordinal_words(100), "one hundredth");
    }

    #[test]
    fn test_contractions_keep_case() {
        assert_eq!(expand_contractions("Can't stop, won't stop."), "Cannot stop, will not stop.");
        assert_eq!(expand_contractions("They're sure I don't know"), "They are sure I do not know");
        assert_eq!(expand_contractions("It’s fine"), "It is fine");
    }

    #[test]
    fn test_currency() {
        assert_eq!(expand_currency("$4.99"), "four dollars and ninety-nine cents");
        assert_eq!(expand_currency("£1.05"), "one pound and five pence");
        assert_eq!(expand_currency("It was $1, ok"), "It was one dollar, ok");
        assert_eq!(expand_currency("$5M"), "five million dollars");
        assert_eq!(expand_currency("¥300"), "three hundred yen");
    }

    #[test]
    fn test_percent_keeps_punctuation() {
        assert_eq!(norm("Save 15%, now."), "Save fifteen percent, now.");
    }

    #[test]
    fn test_times() {
        assert_eq!(expand_times("at 3:30 pm."), "at three thirty PM.");
        assert_eq!(expand_times("at 7:05"), "at seven oh five");
        assert_eq!(expand_times("at 9:00 now"), "at nine o'clock now");
        assert_eq!(expand_times("score 31:75"), "score 31:75");
    }

    #[test]
    fn test_full_sentence() {
        assert_eq!(
            norm("I can't pay $4.99 for the 2nd ticket."),
            "I cannot pay four dollars and ninety-nine cents for the second ticket."
        );
        assert_eq!(norm("1,000 people, 3.5 hours."), "one thousand people, three point five hours.");
    }

    #[test]
    fn test_numbers_inside_words_untouched() {
        assert_eq!(expand_numbers("GPT4 and mp3"), "GPT4 and mp3");
    }

    #[test]
    fn test_options_disable_passes() {
        let n = EnglishNormalizer::with_options(EnglishOptions { numbers: false, ..Default::default() });
        assert_eq!(n.normalize("I'm 30"), "I am 30");
    }
}
