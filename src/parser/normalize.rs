//! Canonical forms for values found in free text
//!
//! Amounts become integer won, percentages become `f64` in 0..=100, dates
//! become `NaiveDate`, categories and regions become canonical tokens.
//! Scanners return byte spans so callers can blank out what they consumed.

use crate::models::MAX_AMOUNT_WON;
use chrono::{NaiveDate, NaiveTime};

/// Category token → aliases (English words match whole words, Korean
/// aliases match as substrings because particles attach to them).
const CATEGORY_ALIASES: &[(&str, &[&str])] = &[
    ("hall", &["hall", "halls", "venue", "venues", "웨딩홀", "예식장", "예식홀", "결혼식장"]),
    ("studio", &["studio", "studios", "photographer", "photography", "snap", "스튜디오", "스냅"]),
    ("dress", &["dress", "dresses", "gown", "드레스"]),
    ("makeup", &["makeup", "make-up", "hair", "메이크업", "헤어", "헤메"]),
    ("honeymoon", &["honeymoon", "신혼여행", "허니문"]),
    ("jewelry", &["jewelry", "jewellery", "ring", "rings", "예물", "반지"]),
    ("invitation", &["invitation", "invitations", "청첩장"]),
];

const REGION_ALIASES: &[(&str, &str)] = &[
    ("gangnam", "Gangnam"),
    ("강남", "Gangnam"),
    ("cheongdam", "Cheongdam"),
    ("청담", "Cheongdam"),
    ("hongdae", "Hongdae"),
    ("홍대", "Hongdae"),
    ("jamsil", "Jamsil"),
    ("잠실", "Jamsil"),
    ("yeouido", "Yeouido"),
    ("여의도", "Yeouido"),
    ("seongsu", "Seongsu"),
    ("성수", "Seongsu"),
    ("apgujeong", "Apgujeong"),
    ("압구정", "Apgujeong"),
    ("pangyo", "Pangyo"),
    ("판교", "Pangyo"),
    ("seoul", "Seoul"),
    ("서울", "Seoul"),
    ("busan", "Busan"),
    ("부산", "Busan"),
    ("incheon", "Incheon"),
    ("인천", "Incheon"),
];

const MONTHS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

/// Multipliers recognised right after a number, longest first.
const MULTIPLIERS: &[(&str, f64)] = &[
    ("천만", 10_000_000.0),
    ("백만", 1_000_000.0),
    ("억", 100_000_000.0),
    ("만", 10_000.0),
    ("천", 1_000.0),
    ("million", 1_000_000.0),
    ("k", 1_000.0),
];

const CURRENCY_WORDS: &[&str] = &["원", "won", "krw"];

/// Bare numbers at or above this are read as money.
const BARE_MONEY_THRESHOLD: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Bare,
    Money,
    Percent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberToken {
    pub start: usize,
    pub end: usize,
    pub value: f64,
    pub kind: NumberKind,
}

impl NumberToken {
    /// Money value in won; large bare numbers count as money.
    pub fn as_won(&self) -> Option<i64> {
        match self.kind {
            NumberKind::Money => won_from(self.value),
            NumberKind::Bare if self.value >= BARE_MONEY_THRESHOLD => won_from(self.value),
            _ => None,
        }
    }
}

// =============================
// Categories & regions
// =============================

pub fn normalize_category(raw: &str) -> Option<&'static str> {
    let needle = raw.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    CATEGORY_ALIASES
        .iter()
        .find(|(token, aliases)| *token == needle || aliases.iter().any(|a| *a == needle))
        .map(|(token, _)| *token)
}

/// All category mentions in `text` as `(byte offset, token)`, in order.
pub fn find_categories(text: &str) -> Vec<(usize, &'static str)> {
    let lower = ascii_lower(text);
    let mut found: Vec<(usize, &'static str)> = Vec::new();

    for (token, aliases) in CATEGORY_ALIASES {
        for alias in *aliases {
            let mut from = 0;
            while let Some(pos) = lower[from..].find(alias) {
                let at = from + pos;
                let end = at + alias.len();
                let ascii_alias = alias.is_ascii();
                if !ascii_alias || is_word_boundary(&lower, at, end) {
                    found.push((at, *token));
                }
                from = end;
            }
        }
    }

    found.sort_by_key(|(at, _)| *at);
    found.dedup_by(|a, b| a.0 == b.0);
    found
}

pub fn find_category(text: &str) -> Option<&'static str> {
    find_categories(text).first().map(|(_, token)| *token)
}

pub fn normalize_region(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches(|c: char| c.is_ascii_punctuation());
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();
    if let Some((_, canonical)) = REGION_ALIASES.iter().find(|(alias, _)| *alias == lower) {
        return Some((*canonical).to_string());
    }
    let mut chars = trimmed.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().collect::<String>() + chars.as_str())
}

/// First known region mentioned in `text`.
pub fn find_region(text: &str) -> Option<String> {
    let lower = ascii_lower(text);
    REGION_ALIASES
        .iter()
        .filter_map(|(alias, canonical)| {
            lower.find(alias).and_then(|at| {
                let end = at + alias.len();
                if !alias.is_ascii() || is_word_boundary(&lower, at, end) {
                    Some((at, *canonical))
                } else {
                    None
                }
            })
        })
        .min_by_key(|(at, _)| *at)
        .map(|(_, canonical)| canonical.to_string())
}

// =============================
// Numbers
// =============================

/// Scan every number in `text`, attaching units that follow it.
///
/// "50,000,000 won" and "5천만원" are money, "60%" is a percentage, and a
/// number with no unit is bare.
pub fn scan_numbers(text: &str) -> Vec<NumberToken> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let starts_number = bytes[i].is_ascii_digit()
            && (i == 0 || !(bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'.'));

        if !starts_number {
            i += 1;
            continue;
        }

        let start = i;
        let (value, after_digits) = read_number(text, i);
        let money_prefix = has_currency_prefix(text, start);
        let (value, kind, end) = read_units(text, after_digits, value);
        let kind = if kind == NumberKind::Bare && money_prefix {
            NumberKind::Money
        } else {
            kind
        };

        tokens.push(NumberToken {
            start,
            end,
            value,
            kind,
        });
        i = end.max(start + 1);
    }

    tokens
}

/// Parse an amount phrase into won. Amounts above [`MAX_AMOUNT_WON`] are
/// rejected rather than clamped.
pub fn parse_amount(raw: &str) -> Option<i64> {
    let token = scan_numbers(raw)
        .into_iter()
        .find(|t| t.kind != NumberKind::Percent)?;
    won_from(token.value)
}

fn won_from(value: f64) -> Option<i64> {
    let won = value.round();
    (won.is_finite() && won >= 0.0 && won <= MAX_AMOUNT_WON as f64).then_some(won as i64)
}

/// Parse "60%", "60 percent" or "60" into a percentage in 0..=100.
pub fn parse_percentage(raw: &str) -> Option<f64> {
    let token = scan_numbers(raw).into_iter().next()?;
    let value = token.value;
    (value.is_finite() && (0.0..=100.0).contains(&value)).then_some(value)
}

/// Parse an identifier such as "3", "#3" or "event 3".
pub fn parse_id(raw: &str) -> Option<i64> {
    let digits: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<i64>().ok().filter(|id| *id > 0)
}

/// Parse a head count such as "150", "150명" or "150 guests".
pub fn parse_count(raw: &str) -> Option<u32> {
    let token = scan_numbers(raw)
        .into_iter()
        .find(|t| t.kind != NumberKind::Percent)?;
    (token.value >= 0.0 && token.value <= u32::MAX as f64).then(|| token.value.round() as u32)
}

fn read_number(text: &str, from: usize) -> (f64, usize) {
    let bytes = text.as_bytes();
    let mut digits = String::new();
    let mut seen_dot = false;
    let mut j = from;

    while j < bytes.len() {
        let b = bytes[j];
        if b.is_ascii_digit() {
            digits.push(b as char);
            j += 1;
        } else if b == b','
            && !seen_dot
            && j + 3 < bytes.len() + 1
            && bytes.get(j + 1..j + 4).map_or(false, |d| d.iter().all(u8::is_ascii_digit))
            && bytes.get(j + 4).map_or(true, |n| !n.is_ascii_digit())
        {
            j += 1;
        } else if b == b'.'
            && !seen_dot
            && bytes.get(j + 1).map_or(false, u8::is_ascii_digit)
        {
            seen_dot = true;
            digits.push('.');
            j += 1;
        } else {
            break;
        }
    }

    (digits.parse::<f64>().unwrap_or(0.0), j)
}

fn read_units(text: &str, from: usize, value: f64) -> (f64, NumberKind, usize) {
    let p = skip_spaces(text, from);
    if starts_with_ci(text, p, "%") {
        return (value, NumberKind::Percent, p + 1);
    }
    if let Some(len) = word_at(text, p, "percent") {
        return (value, NumberKind::Percent, p + len);
    }

    let mut total = 0.0;
    let mut current = value;
    let mut pos = from;
    let mut kind = NumberKind::Bare;

    loop {
        let p = skip_spaces(text, pos);
        let unit = MULTIPLIERS.iter().find_map(|(unit, mult)| {
            let len = if unit.is_ascii() {
                word_at(text, p, unit)?
            } else if starts_with_ci(text, p, unit) {
                unit.len()
            } else {
                return None;
            };
            Some((len, *mult))
        });

        let Some((len, mult)) = unit else {
            total += current;
            break;
        };

        current *= mult;
        kind = NumberKind::Money;
        pos = p + len;

        // "1억 5천만" continues with a smaller Korean unit
        if mult == 100_000_000.0 {
            total += current;
            let q = skip_spaces(text, pos);
            if text.as_bytes().get(q).map_or(false, u8::is_ascii_digit) {
                let (next, after) = read_number(text, q);
                let r = skip_spaces(text, after);
                if ["천만", "백만", "만", "천"].iter().any(|u| starts_with_ci(text, r, u)) {
                    current = next;
                    pos = after;
                    continue;
                }
            }
            break;
        }

        total += current;
        break;
    }

    let p = skip_spaces(text, pos);
    for word in CURRENCY_WORDS {
        let len = if word.is_ascii() {
            word_at(text, p, word)
        } else if starts_with_ci(text, p, word) {
            Some(word.len())
        } else {
            None
        };
        if let Some(len) = len {
            return (total, NumberKind::Money, p + len);
        }
    }

    (total, kind, pos)
}

fn has_currency_prefix(text: &str, start: usize) -> bool {
    let before = text[..start].trim_end();
    before.ends_with('₩') || before.to_ascii_lowercase().ends_with("krw")
}

// =============================
// Dates & times
// =============================

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    find_date(raw).map(|(_, _, date)| date)
}

/// First date in `text` as `(start, end, date)`.
///
/// Accepts `2026-05-23`, `2026/5/23`, `2026.05.23`, `2026년 5월 23일`,
/// `May 23, 2026` and `23 May 2026`.
pub fn find_date(text: &str) -> Option<(usize, usize, NaiveDate)> {
    let numeric = find_numeric_date(text);
    let named = find_named_date(text);
    match (numeric, named) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find_numeric_date(text: &str) -> Option<(usize, usize, NaiveDate)> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i + 4 <= bytes.len() {
        let boundary = i == 0 || !bytes[i - 1].is_ascii_digit();
        let four = bytes[i..i + 4].iter().all(u8::is_ascii_digit)
            && bytes.get(i + 4).map_or(true, |b| !b.is_ascii_digit());
        if boundary && four {
            if let Some(found) = numeric_date_at(text, i) {
                return Some(found);
            }
        }
        i += 1;
    }
    None
}

fn numeric_date_at(text: &str, start: usize) -> Option<(usize, usize, NaiveDate)> {
    let year: i32 = text.get(start..start + 4)?.parse().ok()?;
    if !(1900..=2100).contains(&year) {
        return None;
    }
    let mut pos = start + 4;

    let korean = starts_with_ci(text, skip_spaces(text, pos), "년");
    pos = if korean {
        skip_spaces(text, skip_spaces(text, pos) + "년".len())
    } else {
        let sep = *text.as_bytes().get(pos)?;
        if !matches!(sep, b'-' | b'/' | b'.') {
            return None;
        }
        pos + 1
    };

    let (month, after_month) = read_small_int(text, pos)?;
    pos = after_month;
    if korean {
        let p = skip_spaces(text, pos);
        if !starts_with_ci(text, p, "월") {
            return None;
        }
        pos = skip_spaces(text, p + "월".len());
    } else {
        let sep = *text.as_bytes().get(pos)?;
        if !matches!(sep, b'-' | b'/' | b'.') {
            return None;
        }
        pos += 1;
    }

    let (day, mut end) = read_small_int(text, pos)?;
    if korean && starts_with_ci(text, skip_spaces(text, end), "일") {
        end = skip_spaces(text, end) + "일".len();
    }

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some((start, end, date))
}

fn find_named_date(text: &str) -> Option<(usize, usize, NaiveDate)> {
    let lower = ascii_lower(text);
    let mut best: Option<(usize, usize, NaiveDate)> = None;

    for (idx, month) in MONTHS.iter().enumerate() {
        let mut from = 0;
        while let Some(pos) = lower[from..].find(month) {
            let at = from + pos;
            let end = at + month.len();
            from = end;
            if !is_word_boundary(&lower, at, end) {
                continue;
            }
            let month_no = idx as u32 + 1;

            // "May 23, 2026"
            let p = skip_spaces(text, end);
            if let Some((day, after_day)) = read_small_int(text, p) {
                let mut q = after_day;
                if text.as_bytes().get(q) == Some(&b',') {
                    q += 1;
                }
                let q = skip_spaces(text, q);
                if let Some((year, after_year)) = read_year(text, q) {
                    if let Some(date) = NaiveDate::from_ymd_opt(year, month_no, day) {
                        best = pick_earliest(best, (at, after_year, date));
                        continue;
                    }
                }
            }

            // "23 May 2026"
            let before = text[..at].trim_end();
            let day_start = before
                .char_indices()
                .rev()
                .take_while(|(_, c)| c.is_ascii_digit())
                .last()
                .map(|(i, _)| i);
            if let Some(ds) = day_start {
                if let Ok(day) = before[ds..].parse::<u32>() {
                    let q = skip_spaces(text, end);
                    if let Some((year, after_year)) = read_year(text, q) {
                        if let Some(date) = NaiveDate::from_ymd_opt(year, month_no, day) {
                            best = pick_earliest(best, (ds, after_year, date));
                        }
                    }
                }
            }
        }
    }

    best
}

fn pick_earliest(
    current: Option<(usize, usize, NaiveDate)>,
    candidate: (usize, usize, NaiveDate),
) -> Option<(usize, usize, NaiveDate)> {
    match current {
        Some(c) if c.0 <= candidate.0 => Some(c),
        _ => Some(candidate),
    }
}

pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    find_time(raw).map(|(_, _, time)| time)
}

/// First clock time in `text`: `14:30`, `2:30 pm`, `2pm`, `오후 2시 30분`.
pub fn find_time(text: &str) -> Option<(usize, usize, NaiveTime)> {
    let bytes = text.as_bytes();
    let lower = ascii_lower(text);
    let mut i = 0;

    while i < bytes.len() {
        let boundary = i == 0 || !bytes[i - 1].is_ascii_digit();
        if !(boundary && bytes[i].is_ascii_digit()) {
            i += 1;
            continue;
        }

        if let Some((hour, after_hour)) = read_small_int(text, i) {
            // HH:MM
            if bytes.get(after_hour) == Some(&b':') {
                if let Some((minute, after_minute)) = read_small_int(text, after_hour + 1) {
                    let (hour, end) = apply_meridiem(&lower, hour, after_minute);
                    if let Some(t) = NaiveTime::from_hms_opt(hour, minute, 0) {
                        return Some((i, end, t));
                    }
                }
            }

            // 2pm / 2 pm
            let p = skip_spaces(text, after_hour);
            if word_at(text, p, "pm").is_some() || word_at(text, p, "am").is_some() {
                let (hour, end) = apply_meridiem(&lower, hour, after_hour);
                if let Some(t) = NaiveTime::from_hms_opt(hour, 0, 0) {
                    return Some((i, end, t));
                }
            }

            // 오후 2시 30분
            if starts_with_ci(text, p, "시") {
                let mut end = p + "시".len();
                let mut minute = 0;
                let q = skip_spaces(text, end);
                if let Some((m, after_m)) = read_small_int(text, q) {
                    if starts_with_ci(text, skip_spaces(text, after_m), "분") {
                        minute = m;
                        end = skip_spaces(text, after_m) + "분".len();
                    }
                }
                let prefix = text[..i].trim_end();
                let mut hour = hour;
                let mut start = i;
                if prefix.ends_with("오후") {
                    if hour < 12 {
                        hour += 12;
                    }
                    start = prefix.len() - "오후".len();
                } else if prefix.ends_with("오전") {
                    start = prefix.len() - "오전".len();
                }
                if let Some(t) = NaiveTime::from_hms_opt(hour, minute, 0) {
                    return Some((start, end, t));
                }
            }

            i = after_hour;
            continue;
        }
        i += 1;
    }

    None
}

fn apply_meridiem(lower: &str, hour: u32, after: usize) -> (u32, usize) {
    let p = skip_spaces(lower, after);
    if word_at(lower, p, "pm").is_some() {
        let hour = if hour < 12 { hour + 12 } else { hour };
        (hour, p + 2)
    } else if word_at(lower, p, "am").is_some() {
        let hour = if hour == 12 { 0 } else { hour };
        (hour, p + 2)
    } else {
        (hour, after)
    }
}

// =============================
// Helpers
// =============================

/// Replace a byte span with spaces, keeping every other offset valid.
pub fn blank_span(text: &str, start: usize, end: usize) -> String {
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..start]);
    out.push_str(&" ".repeat(end - start));
    out.push_str(&text[end..]);
    out
}

/// Lowercase ASCII only so byte offsets line up with the input.
pub fn ascii_lower(text: &str) -> String {
    text.to_ascii_lowercase()
}

pub fn is_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let bytes = text.as_bytes();
    let before = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
    let after = end >= bytes.len() || !bytes[end].is_ascii_alphanumeric();
    before && after
}

fn skip_spaces(text: &str, mut pos: usize) -> usize {
    let bytes = text.as_bytes();
    while pos < bytes.len() && bytes[pos] == b' ' {
        pos += 1;
    }
    pos
}

fn starts_with_ci(text: &str, pos: usize, needle: &str) -> bool {
    text.get(pos..pos + needle.len())
        .map_or(false, |s| s.eq_ignore_ascii_case(needle))
}

/// Length of `word` at `pos` if it is followed by a non-letter.
fn word_at(text: &str, pos: usize, word: &str) -> Option<usize> {
    if !starts_with_ci(text, pos, word) {
        return None;
    }
    let end = pos + word.len();
    let followed_by_letter = text.as_bytes().get(end).map_or(false, u8::is_ascii_alphabetic);
    (!followed_by_letter).then_some(word.len())
}

fn read_small_int(text: &str, pos: usize) -> Option<(u32, usize)> {
    let bytes = text.as_bytes();
    let mut end = pos;
    while end < bytes.len() && end - pos < 2 && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == pos || bytes.get(end).map_or(false, u8::is_ascii_digit) {
        return None;
    }
    text[pos..end].parse().ok().map(|n| (n, end))
}

fn read_year(text: &str, pos: usize) -> Option<(i32, usize)> {
    let slice = text.get(pos..pos + 4)?;
    if !slice.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if text.as_bytes().get(pos + 4).map_or(false, u8::is_ascii_digit) {
        return None;
    }
    slice.parse().ok().map(|y| (y, pos + 4))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amounts_in_won() {
        assert_eq!(parse_amount("50,000,000 won"), Some(50_000_000));
        assert_eq!(parse_amount("3000만원"), Some(30_000_000));
        assert_eq!(parse_amount("5천만원"), Some(50_000_000));
        assert_eq!(parse_amount("1.5억"), Some(150_000_000));
        assert_eq!(parse_amount("1억 5천만원"), Some(150_000_000));
        assert_eq!(parse_amount("132만원"), Some(1_320_000));
        assert_eq!(parse_amount("5 million won"), Some(5_000_000));
        assert_eq!(parse_amount("₩2,500,000"), Some(2_500_000));
        assert_eq!(parse_amount("no money here"), None);
    }

    #[test]
    fn test_amounts_outside_range_are_rejected() {
        assert_eq!(parse_amount("99999999999999999999 won"), None);
        assert_eq!(parse_amount("99999999999억"), None);
        assert_eq!(parse_amount("1,000,000,000,000,000 won"), Some(MAX_AMOUNT_WON));
        assert_eq!(parse_amount("1,000,000,000,000,001 won"), None);

        let tokens = scan_numbers("budget 99999999999999999999 won, hall 50%");
        assert_eq!(tokens[0].kind, NumberKind::Money);
        assert_eq!(tokens[0].as_won(), None);
    }

    #[test]
    fn test_scan_distinguishes_money_percent_and_bare() {
        let tokens = scan_numbers("budget 50,000,000 won, hall 60%, studio 15%");
        let kinds: Vec<_> = tokens.iter().map(|t| (t.value, t.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (50_000_000.0, NumberKind::Money),
                (60.0, NumberKind::Percent),
                (15.0, NumberKind::Percent),
            ]
        );

        let tokens = scan_numbers("guest count to 150");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, NumberKind::Bare);
        assert_eq!(tokens[0].as_won(), None);
    }

    #[test]
    fn test_percentages() {
        assert_eq!(parse_percentage("60%"), Some(60.0));
        assert_eq!(parse_percentage("12.5 percent"), Some(12.5));
        assert_eq!(parse_percentage("140%"), None);
    }

    #[test]
    fn test_dates() {
        let d = NaiveDate::from_ymd_opt(2026, 5, 23).unwrap();
        assert_eq!(parse_date("2026-05-23"), Some(d));
        assert_eq!(parse_date("on 2026/5/23 please"), Some(d));
        assert_eq!(parse_date("2026.05.23"), Some(d));
        assert_eq!(parse_date("2026년 5월 23일"), Some(d));
        assert_eq!(parse_date("May 23, 2026"), Some(d));
        assert_eq!(parse_date("23 May 2026"), Some(d));
        assert_eq!(parse_date("2026-02-30"), None);
        assert_eq!(parse_date("sometime in may"), None);
    }

    #[test]
    fn test_date_span_can_be_blanked() {
        let text = "fitting on 2026-03-14 at 14:00";
        let (start, end, _) = find_date(text).unwrap();
        let blanked = blank_span(text, start, end);
        assert_eq!(blanked.len(), text.len());
        assert!(scan_numbers(&blanked).iter().all(|t| t.value < 100.0));
    }

    #[test]
    fn test_times() {
        assert_eq!(parse_time("at 14:30"), NaiveTime::from_hms_opt(14, 30, 0));
        assert_eq!(parse_time("2pm"), NaiveTime::from_hms_opt(14, 0, 0));
        assert_eq!(parse_time("2:15 pm"), NaiveTime::from_hms_opt(14, 15, 0));
        assert_eq!(parse_time("오후 2시 30분"), NaiveTime::from_hms_opt(14, 30, 0));
        assert_eq!(parse_time("no time"), None);
    }

    #[test]
    fn test_categories() {
        assert_eq!(normalize_category("웨딩홀"), Some("hall"));
        assert_eq!(normalize_category("Venue"), Some("hall"));
        assert_eq!(normalize_category("spaceship"), None);
        assert_eq!(find_category("recommend a studio in Gangnam"), Some("studio"));
        assert_eq!(find_category("드레스는 어디가 좋아?"), Some("dress"));
        // "hallway" is not a hall
        assert_eq!(find_category("the hallway"), None);

        let all = find_categories("hall 60%, studio 15%");
        assert_eq!(all.iter().map(|(_, c)| *c).collect::<Vec<_>>(), vec!["hall", "studio"]);
    }

    #[test]
    fn test_regions() {
        assert_eq!(find_region("a studio in gangnam"), Some("Gangnam".to_string()));
        assert_eq!(find_region("청담 쪽 드레스"), Some("Cheongdam".to_string()));
        assert_eq!(normalize_region("seoul"), Some("Seoul".to_string()));
        assert_eq!(normalize_region("daejeon"), Some("Daejeon".to_string()));
    }

    #[test]
    fn test_ids_and_counts() {
        assert_eq!(parse_id("#3"), Some(3));
        assert_eq!(parse_id("event 12"), Some(12));
        assert_eq!(parse_id("none"), None);
        assert_eq!(parse_count("150명"), Some(150));
    }
}
