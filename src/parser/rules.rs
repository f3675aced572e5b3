//! Keyword-based language understanding
//!
//! Deterministic extractor used when no model is configured and in tests.
//! Static keyword lists score the utterance into an intent; the scanners in
//! [`normalize`] pull out values. Output is a raw frame like any other
//! capability, so the parser's normalization still applies.

use super::normalize::{
    ascii_lower, blank_span, find_categories, find_category, find_date, find_region, find_time,
    is_word_boundary, scan_numbers, NumberKind,
};
use super::{ExtractedFrame, LanguageUnderstanding, RawSlots, RawSplit, UnderstandingRequest};
use crate::memory::history::Turn;
use crate::models::Intent;
use crate::Result;

/// Static keyword lists
const RECOMMEND_WORDS: &[&str] = &[
    "recommend", "suggest", "find", "looking for", "search", "options", "vendor", "vendors",
    "추천", "찾아", "알아봐", "업체",
];

const MORE_OPTIONS_WORDS: &[&str] = &[
    "cheaper", "more options", "other options", "another", "something else", "다른", "저렴",
];

const BUDGET_WORDS: &[&str] = &[
    "budget", "allocate", "allocation", "split", "spend", "cost", "예산", "비용",
];

const BUDGET_QUERY_WORDS: &[&str] = &[
    "how much", "left", "remaining", "remainder", "what's", "what is", "show", "status",
    "얼마", "남은", "남았", "알려",
];

const BUDGET_UPDATE_WORDS: &[&str] = &[
    "set", "change", "update", "allocate", "split", "raise", "increase", "lower", "reduce",
    "make it", "바꿔", "변경", "설정", "올려", "줄여",
];

const SCHEDULE_WORDS: &[&str] = &[
    "schedule", "appointment", "event", "events", "calendar", "일정", "예약",
];

const MILESTONE_WORDS: &[&str] = &[
    "milestone", "milestones", "checklist", "to-do", "todo", "task", "할일", "체크리스트",
];

const CREATE_WORDS: &[&str] = &[
    "add", "create", "book", "set up", "plan a", "new", "추가", "잡아", "등록",
];

const UPDATE_WORDS: &[&str] = &[
    "move", "reschedule", "change", "update", "cancel", "mark", "done", "complete", "completed",
    "finished", "undo", "reopen", "옮겨", "변경", "취소", "완료",
];

const QUERY_WORDS: &[&str] = &[
    "what's on", "show", "list", "when", "upcoming", "what do i have", "readiness", "progress",
    "how ready", "보여", "언제", "진행",
];

const PROFILE_WORDS: &[&str] = &[
    "guest", "guests", "my name", "call me", "contact", "phone", "email", "we live",
    "we're in", "we are in", "located in", "하객", "연락처", "이름", "인원",
];

const GUEST_WORDS: &[&str] = &["guest", "guests", "하객", "인원", "명"];

const EVENT_TYPES: &[(&str, &[&str])] = &[
    ("wedding", &["ceremony", "wedding day", "wedding date", "our wedding", "the wedding", "결혼식", "본식", "예식일"]),
    ("fitting", &["fitting", "가봉", "피팅"]),
    ("tour", &["tour", "visit", "투어"]),
    ("shoot", &["shoot", "photoshoot", "촬영"]),
    ("tasting", &["tasting", "시식"]),
    ("meeting", &["meeting", "consultation", "appointment", "상담", "미팅"]),
    ("trip", &["trip", "flight", "여행"]),
];

const UNLOCK_WORDS: &[&str] = &["unlock", "잠금 해제", "해제"];
const LOCK_WORDS: &[&str] = &["lock", "잠가", "고정", "확정"];
const CONFIRM_WORDS: &[&str] = &["confirm", "override", "anyway", "go ahead", "확인", "그래도"];
const CANCEL_WORDS: &[&str] = &["cancel", "call off", "취소"];
const NOT_DONE_WORDS: &[&str] = &["not done", "undone", "incomplete", "reopen", "uncheck", "미완료"];
const DONE_WORDS: &[&str] = &["done", "complete", "completed", "finished", "check off", "완료", "끝냈"];
const MIN_WORDS: &[&str] = &["over", "above", "at least", "more than", "이상"];
const RANGE_WORDS: &[&str] = &["between", "from", "~", "사이"];

const EVENT_ID_WORDS: &[&str] = &["event", "appointment", "일정"];
const MILESTONE_ID_WORDS: &[&str] = &["milestone", "task", "item", "할일", "체크리스트"];
const NAME_MARKERS: &[&str] = &["my name is", "call me", "이름은"];
const NOTE_MARKERS: &[&str] = &["note:", "memo:", "메모:"];

const NOT_REGIONS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "the", "a", "an", "my", "our", "total", "mind",
];

/// Keyword extractor
pub struct RuleBasedUnderstanding;

#[async_trait::async_trait]
impl LanguageUnderstanding for RuleBasedUnderstanding {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn extract(&self, request: &UnderstandingRequest<'_>) -> Result<ExtractedFrame> {
        Ok(extract_frame(request.utterance, request.context_window))
    }
}

/// Score and slot-fill one utterance.
pub fn extract_frame(utterance: &str, window: &[Turn]) -> ExtractedFrame {
    let original = utterance.trim();
    if original.is_empty() {
        return frame(Intent::GeneralChat, RawSlots::default());
    }

    let lower = ascii_lower(original);
    let mut work = lower.clone();
    let mut slots = RawSlots::default();

    // Spans that look like numbers but are not amounts go first.
    if let Some((start, end, contact)) = find_contact(original) {
        slots.contact = Some(contact);
        work = blank_span(&work, start, end);
    }
    if let Some((start, end, date)) = find_date(&work) {
        slots.date = Some(date.format("%Y-%m-%d").to_string());
        work = blank_span(&work, start, end);
    }
    if let Some((start, end, time)) = find_time(&work) {
        slots.time = Some(time.format("%H:%M").to_string());
        work = blank_span(&work, start, end);
    }
    if let Some((start, end, id)) = find_id_after(&work, MILESTONE_ID_WORDS) {
        slots.milestone_id = Some(id.to_string());
        work = blank_span(&work, start, end);
    }
    if let Some((start, end, id)) = find_id_after(&work, EVENT_ID_WORDS) {
        slots.event_id = Some(id.to_string());
        work = blank_span(&work, start, end);
    }

    let tokens = scan_numbers(&work);
    if has_any(&lower, GUEST_WORDS) {
        if let Some(count) = tokens
            .iter()
            .find(|t| t.kind == NumberKind::Bare && t.value < 100_000.0)
        {
            slots.guest_count = Some((count.value.round() as u64).to_string());
        }
    }

    // Splits pair each percentage with the closest preceding category.
    let categories = find_categories(&lower);
    let mut segment_start = 0;
    for token in tokens.iter().filter(|t| t.kind == NumberKind::Percent) {
        let category = categories
            .iter()
            .filter(|(at, _)| *at >= segment_start && *at < token.start)
            .last()
            .map(|(_, c)| *c);
        match category {
            Some(category) => slots.splits.push(RawSplit {
                category: Some(category.to_string()),
                percentage: Some(format_number(token.value)),
            }),
            None if slots.percentage.is_none() => {
                slots.percentage = Some(format_number(token.value))
            }
            None => {}
        }
        segment_start = token.end;
    }

    let money: Vec<_> = tokens
        .iter()
        .filter(|t| t.kind != NumberKind::Percent)
        .filter_map(|t| t.as_won().map(|won| (t.start, won)))
        .collect();
    match money.as_slice() {
        [(_, low), (_, high), ..] if has_any(&lower, RANGE_WORDS) || lower.contains(" and ") => {
            slots.min_amount = Some(low.min(high).to_string());
            slots.amount = Some(low.max(high).to_string());
        }
        [(at, won), ..] => {
            let before = &lower[..*at];
            if MIN_WORDS.iter().any(|w| before.trim_end().ends_with(w)) {
                slots.min_amount = Some(won.to_string());
            } else {
                slots.amount = Some(won.to_string());
            }
        }
        [] => {}
    }

    if slots.splits.is_empty() {
        slots.category = find_category(&lower).map(str::to_string);
    }
    slots.region = find_region(original).or_else(|| region_after_in(original));

    // Flags
    if has_any(&lower, UNLOCK_WORDS) {
        slots.lock = Some(false);
    } else if has_any(&lower, LOCK_WORDS) {
        slots.lock = Some(true);
    }
    slots.confirm = has_any(&lower, CONFIRM_WORDS).then_some(true);
    slots.cancel = has_any(&lower, CANCEL_WORDS).then_some(true);
    if has_any(&lower, NOT_DONE_WORDS) {
        slots.completed = Some(false);
    } else if has_any(&lower, DONE_WORDS) {
        slots.completed = Some(true);
    }

    slots.event_type = EVENT_TYPES
        .iter()
        .find(|(_, words)| has_any(&lower, words))
        .map(|(t, _)| t.to_string());
    slots.title = quoted(original);
    slots.name = text_after_marker(original, &lower, NAME_MARKERS, true);
    slots.notes = text_after_marker(original, &lower, NOTE_MARKERS, false);

    let intent = score_intent(&lower, &slots, window);

    // Follow-ups inherit the category under discussion.
    if slots.category.is_none()
        && slots.splits.is_empty()
        && matches!(intent, Intent::RecommendVendor | Intent::BudgetUpdate)
    {
        slots.category = window
            .iter()
            .rev()
            .find_map(|turn| find_category(&ascii_lower(&turn.user)))
            .map(str::to_string);
    }

    match intent {
        Intent::ScheduleCreate | Intent::ScheduleUpdate => {
            if slots.location.is_none() {
                slots.location = slots.region.take();
            }
            if slots.title.is_none() && intent == Intent::ScheduleCreate {
                slots.title = default_title(slots.category.as_deref(), slots.event_type.as_deref());
            }
        }
        Intent::GeneralChat => {
            slots = RawSlots {
                free_text: Some(original.to_string()),
                ..RawSlots::default()
            };
        }
        _ => {}
    }

    frame(intent, slots)
}

fn score_intent(lower: &str, slots: &RawSlots, window: &[Turn]) -> Intent {
    let has = |words: &[&str]| has_any(lower, words);
    let has_amount = slots.amount.is_some() || slots.min_amount.is_some();
    let has_category = slots.category.is_some();
    let schedule_context = has(SCHEDULE_WORDS)
        || has(MILESTONE_WORDS)
        || slots.event_type.is_some()
        || slots.event_id.is_some()
        || slots.milestone_id.is_some();

    if (has(PROFILE_WORDS) || slots.notes.is_some()) && !has(RECOMMEND_WORDS) {
        return Intent::ProfileUpdate;
    }

    if has(RECOMMEND_WORDS) && (has_category || !schedule_context) {
        return Intent::RecommendVendor;
    }

    let continuing_recommendation = window
        .last()
        .map_or(false, |t| t.intent == Intent::RecommendVendor);
    if continuing_recommendation && has(MORE_OPTIONS_WORDS) {
        return Intent::RecommendVendor;
    }

    let budget_context = has(BUDGET_WORDS)
        || !slots.splits.is_empty()
        || (slots.percentage.is_some() && has_amount)
        || (has_category && has_amount && !schedule_context)
        || (has_category && slots.lock.is_some());

    if budget_context {
        if !slots.splits.is_empty() {
            return Intent::BudgetUpdate;
        }
        if slots.percentage.is_some() && has_amount {
            return Intent::BudgetQuery;
        }
        if slots.lock.is_some() || slots.confirm.is_some() {
            return Intent::BudgetUpdate;
        }
        if has(BUDGET_QUERY_WORDS) && !has_amount {
            return Intent::BudgetQuery;
        }
        if has_amount || has(BUDGET_UPDATE_WORDS) {
            return Intent::BudgetUpdate;
        }
        return Intent::BudgetQuery;
    }

    if schedule_context {
        if slots.event_id.is_some() || slots.milestone_id.is_some() || has(UPDATE_WORDS) {
            return Intent::ScheduleUpdate;
        }
        if has(CREATE_WORDS) || (slots.date.is_some() && slots.event_type.is_some()) {
            return Intent::ScheduleCreate;
        }
        return Intent::ScheduleQuery;
    }

    if has(QUERY_WORDS) && has_any(lower, &["wedding", "plan", "planning"]) {
        return Intent::ScheduleQuery;
    }

    Intent::GeneralChat
}

fn frame(intent: Intent, slots: RawSlots) -> ExtractedFrame {
    ExtractedFrame {
        intent: intent.as_str().to_string(),
        slots,
    }
}

/// Keyword match; ASCII keywords must sit on word boundaries.
fn has_any(lower: &str, words: &[&str]) -> bool {
    words.iter().any(|word| has_word(lower, word))
}

fn has_word(lower: &str, word: &str) -> bool {
    if !word.is_ascii() || !word.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return lower.contains(word);
    }
    let mut from = 0;
    while let Some(pos) = lower[from..].find(word) {
        let at = from + pos;
        let end = at + word.len();
        if is_word_boundary(lower, at, end) {
            return true;
        }
        from = end;
    }
    false
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// "event 3", "event #3", "milestone id 4"
fn find_id_after(work: &str, keywords: &[&str]) -> Option<(usize, usize, i64)> {
    for keyword in keywords {
        let mut from = 0;
        while let Some(pos) = work[from..].find(keyword) {
            let at = from + pos;
            let after_keyword = at + keyword.len();
            from = after_keyword;
            if keyword.is_ascii() && !is_word_boundary(work, at, after_keyword) {
                continue;
            }
            let trimmed = work[after_keyword..].trim_start();
            let trimmed = trimmed.strip_prefix("id").map(str::trim_start).unwrap_or(trimmed);
            let trimmed = trimmed.strip_prefix('#').unwrap_or(trimmed);
            let cursor = work.len() - trimmed.len();
            let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                continue;
            }
            if trimmed[digits.len()..].starts_with(|c: char| c.is_ascii_alphanumeric() || c == '%') {
                continue;
            }
            if let Ok(id) = digits.parse::<i64>() {
                return Some((at, cursor + digits.len(), id));
            }
        }
    }
    None
}

/// Email address or phone number with at least ten digits.
fn find_contact(text: &str) -> Option<(usize, usize, String)> {
    let mut offset = 0;
    for word in text.split(' ') {
        let start = offset;
        offset += word.len() + 1;
        let cleaned = word.trim_end_matches(|c: char| matches!(c, ',' | '.' | '!' | '?' | ')'));
        let end = start + cleaned.len();

        if cleaned.contains('@') && cleaned.contains('.') && !cleaned.starts_with('@') {
            return Some((start, end, cleaned.to_string()));
        }
        let digits = cleaned.chars().filter(char::is_ascii_digit).count();
        let phone_shaped = cleaned
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '(' | ')'));
        if phone_shaped && digits >= 10 && cleaned.contains('-') {
            return Some((start, end, cleaned.to_string()));
        }
    }
    None
}

fn region_after_in(original: &str) -> Option<String> {
    let mut words = original.split_whitespace().peekable();
    while let Some(word) = words.next() {
        if !word.eq_ignore_ascii_case("in") {
            continue;
        }
        let Some(next) = words.peek() else { break };
        let candidate = next.trim_matches(|c: char| !c.is_alphanumeric());
        let capitalized = candidate.chars().next().map_or(false, char::is_uppercase);
        let lower = candidate.to_lowercase();
        if capitalized && !NOT_REGIONS.contains(&lower.as_str()) && find_category(&lower).is_none() {
            return Some(candidate.to_string());
        }
    }
    None
}

fn quoted(original: &str) -> Option<String> {
    for quote in ['"', '\''] {
        let mut parts = original.split(quote);
        parts.next();
        if let (Some(inner), Some(_)) = (parts.next(), parts.next()) {
            let inner = inner.trim();
            if !inner.is_empty() {
                return Some(inner.to_string());
            }
        }
    }
    None
}

fn text_after_marker(
    original: &str,
    lower: &str,
    markers: &[&str],
    single_phrase: bool,
) -> Option<String> {
    let (at, marker) = markers
        .iter()
        .find_map(|m| lower.find(m).map(|at| (at, *m)))?;
    let rest = original.get(at + marker.len()..)?.trim();
    let value = if single_phrase {
        rest.split(|c: char| matches!(c, ',' | '.' | '!' | '?' | ';'))
            .next()
            .unwrap_or("")
            .split(" and ")
            .next()
            .unwrap_or("")
            .trim()
    } else {
        rest
    };
    (!value.is_empty()).then(|| value.to_string())
}

fn default_title(category: Option<&str>, event_type: Option<&str>) -> Option<String> {
    match (category, event_type) {
        (_, Some("wedding")) => Some("Wedding ceremony".to_string()),
        (Some(category), Some(event_type)) => Some(capitalize(&format!("{} {}", category, event_type))),
        (None, Some(event_type)) => Some(capitalize(event_type)),
        _ => None,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars
        .next()
        .map(|c| c.to_uppercase().collect::<String>() + chars.as_str())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::normalize_frame;
    use chrono::NaiveDate;

    fn parse(utterance: &str) -> crate::parser::ParsedTurn {
        normalize_frame(extract_frame(utterance, &[]))
    }

    #[test]
    fn test_budget_split_scenario() {
        let parsed = parse("budget 50,000,000 won, hall 60%, studio 15%");
        assert_eq!(parsed.intent, Intent::BudgetUpdate);
        assert_eq!(parsed.slots.amount, Some(50_000_000));
        let splits: Vec<_> = parsed
            .slots
            .splits
            .iter()
            .map(|s| (s.category.as_str(), s.percentage))
            .collect();
        assert_eq!(splits, vec![("hall", 60.0), ("studio", 15.0)]);
        assert_eq!(parsed.slots.category, None);
    }

    #[test]
    fn test_guest_count_is_a_profile_update() {
        let parsed = parse("change guest count to 150");
        assert_eq!(parsed.intent, Intent::ProfileUpdate);
        assert_eq!(parsed.slots.guest_count, Some(150));
        assert_eq!(parsed.slots.amount, None);
        assert_eq!(parsed.slots.category, None);
    }

    #[test]
    fn test_recommendation_with_region_and_ceiling() {
        let parsed = parse("Recommend a studio in Gangnam under 3,000,000 won");
        assert_eq!(parsed.intent, Intent::RecommendVendor);
        assert_eq!(parsed.slots.category.as_deref(), Some("studio"));
        assert_eq!(parsed.slots.region.as_deref(), Some("Gangnam"));
        assert_eq!(parsed.slots.amount, Some(3_000_000));
    }

    #[test]
    fn test_korean_recommendation() {
        let parsed = parse("강남 웨딩홀 추천해줘 3000만원 이하");
        assert_eq!(parsed.intent, Intent::RecommendVendor);
        assert_eq!(parsed.slots.category.as_deref(), Some("hall"));
        assert_eq!(parsed.slots.region.as_deref(), Some("Gangnam"));
        assert_eq!(parsed.slots.amount, Some(30_000_000));
    }

    #[test]
    fn test_category_amount_is_budget_update() {
        let parsed = parse("set the dress budget to 3,000,000 won");
        assert_eq!(parsed.intent, Intent::BudgetUpdate);
        assert_eq!(parsed.slots.category.as_deref(), Some("dress"));
        assert_eq!(parsed.slots.amount, Some(3_000_000));
    }

    #[test]
    fn test_lock_and_unlock_flags() {
        let parsed = parse("lock the hall budget");
        assert_eq!(parsed.intent, Intent::BudgetUpdate);
        assert_eq!(parsed.slots.lock, Some(true));

        let parsed = parse("unlock the hall budget");
        assert_eq!(parsed.slots.lock, Some(false));

        // "clock" is not "lock"
        let parsed = parse("what's the clock say");
        assert_eq!(parsed.slots.lock, None);
    }

    #[test]
    fn test_budget_queries() {
        assert_eq!(parse("how much budget do I have left?").intent, Intent::BudgetQuery);

        let parsed = parse("what's 15% of 40,000,000 won?");
        assert_eq!(parsed.intent, Intent::BudgetQuery);
        assert_eq!(parsed.slots.percentage, Some(15.0));
        assert_eq!(parsed.slots.amount, Some(40_000_000));
    }

    #[test]
    fn test_schedule_create_with_date_and_time() {
        let parsed = parse("Add a dress fitting on 2026-03-14 at 2pm");
        assert_eq!(parsed.intent, Intent::ScheduleCreate);
        assert_eq!(parsed.slots.event_type.as_deref(), Some("fitting"));
        assert_eq!(parsed.slots.date, NaiveDate::from_ymd_opt(2026, 3, 14));
        assert_eq!(parsed.slots.time.map(|t| t.to_string()), Some("14:00:00".to_string()));
        assert_eq!(parsed.slots.title.as_deref(), Some("Dress fitting"));
        assert_eq!(parsed.slots.amount, None);
    }

    #[test]
    fn test_wedding_date_creates_wedding_event() {
        let parsed = parse("Our wedding is on 2026-05-23");
        assert_eq!(parsed.intent, Intent::ScheduleCreate);
        assert_eq!(parsed.slots.event_type.as_deref(), Some("wedding"));
        assert_eq!(parsed.slots.date, NaiveDate::from_ymd_opt(2026, 5, 23));
    }

    #[test]
    fn test_schedule_updates() {
        let parsed = parse("cancel event 2");
        assert_eq!(parsed.intent, Intent::ScheduleUpdate);
        assert_eq!(parsed.slots.event_id, Some(2));
        assert!(parsed.slots.cancel);

        let parsed = parse("mark milestone #3 as done");
        assert_eq!(parsed.intent, Intent::ScheduleUpdate);
        assert_eq!(parsed.slots.milestone_id, Some(3));
        assert_eq!(parsed.slots.completed, Some(true));

        let parsed = parse("milestone 3 is not done");
        assert_eq!(parsed.slots.completed, Some(false));
    }

    #[test]
    fn test_schedule_query() {
        assert_eq!(parse("what's on my schedule?").intent, Intent::ScheduleQuery);
        assert_eq!(parse("show my checklist").intent, Intent::ScheduleQuery);
    }

    #[test]
    fn test_profile_fields() {
        let parsed = parse("my name is Jisoo, email jisoo@example.com");
        assert_eq!(parsed.intent, Intent::ProfileUpdate);
        assert_eq!(parsed.slots.name.as_deref(), Some("Jisoo"));
        assert_eq!(parsed.slots.contact.as_deref(), Some("jisoo@example.com"));

        let parsed = parse("we live in Busan");
        assert_eq!(parsed.intent, Intent::ProfileUpdate);
        assert_eq!(parsed.slots.region.as_deref(), Some("Busan"));
    }

    #[test]
    fn test_unmatched_input_is_general_chat() {
        let parsed = parse("hello there!");
        assert_eq!(parsed.intent, Intent::GeneralChat);
        assert_eq!(parsed.slots.free_text.as_deref(), Some("hello there!"));
        assert_eq!(parse("   ").intent, Intent::GeneralChat);
    }

    #[test]
    fn test_follow_up_inherits_category() {
        let window = vec![Turn::new(
            "recommend a dress in Cheongdam",
            "Here are some dresses",
            Intent::RecommendVendor,
        )];
        let parsed = normalize_frame(extract_frame("any cheaper ones?", &window));
        assert_eq!(parsed.intent, Intent::RecommendVendor);
        assert_eq!(parsed.slots.category.as_deref(), Some("dress"));
    }
}
