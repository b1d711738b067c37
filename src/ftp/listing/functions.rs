//! Tokeniser primitives for the listing rule engine (§4.6).
//!
//! Each function advances a cursor into the current line and either
//! succeeds (optionally assigning a column) or fails; on failure the
//! caller rewinds to the start of the line and tries the next rule.
//!
//! Month-name detection is multi-language (English, German, Norwegian,
//! Swedish — grounded in the source's `MonthNameNumberLanguageArr`
//! table). An allowed-languages bitmask is threaded through a rule's
//! evaluation and narrowed by every `month_3`/`month_txt` call.

use crate::ftp::listing::columns::{ColumnId, ColumnValue};
use std::collections::HashMap;

bitflags_lite::bitflags! {
    /// Allowed-languages mask carried across a listing (§4.6).
    pub struct Languages: u8 {
        const ENGLISH   = 0b0001;
        const GERMAN    = 0b0010;
        const NORWEGIAN = 0b0100;
        const SWEDISH   = 0b1000;
    }
}

/// A tiny local bitflags shim: the corpus elsewhere reaches for the real
/// `bitflags` crate, but a 4-bit mask doesn't warrant the dependency here,
/// so we hand-roll the same ergonomics the crate would give us.
mod bitflags_lite {
    macro_rules! bitflags {
        (pub struct $name:ident : u8 { $(const $variant:ident = $val:expr;)* }) => {
            pub struct $name;
            impl $name {
                $(#[allow(dead_code)] pub const $variant: u8 = $val;)*
                pub const ALL: u8 = 0u8 $(| $val)*;
            }
        };
    }
    pub(crate) use bitflags;
}

/// Per-listing parse context threaded through every rule evaluation.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub allowed_languages: u8,
    /// The actual date the listing was retrieved at, used for
    /// year-correction (§4.6, §8 boundary behaviours).
    pub actual_year: i32,
    pub actual_month: u32,
    pub actual_day: u32,
}

impl ParseContext {
    pub fn new(actual_year: i32, actual_month: u32, actual_day: u32) -> Self {
        Self {
            allowed_languages: Languages::ALL,
            actual_year,
            actual_month,
            actual_day,
        }
    }
}

/// Column assignments accumulated while evaluating one rule against one
/// line.
#[derive(Debug, Clone, Default)]
pub struct Row {
    values: HashMap<ColumnId, ColumnValue>,
}

impl Row {
    pub fn set(&mut self, col: ColumnId, val: ColumnValue) {
        self.values.insert(col, val);
    }

    pub fn get(&self, col: ColumnId) -> Option<&ColumnValue> {
        self.values.get(&col)
    }

    pub fn get_str(&self, col: ColumnId) -> Option<&str> {
        self.get(col).and_then(ColumnValue::as_str)
    }

    pub fn get_num(&self, col: ColumnId) -> Option<i64> {
        self.get(col).and_then(ColumnValue::as_num)
    }

    pub fn get_bool(&self, col: ColumnId) -> Option<bool> {
        self.get(col).and_then(ColumnValue::as_bool)
    }
}

/// A cursor over one listing line. Operates on chars, not bytes, since
/// listing text is assumed to already be decoded.
pub struct LineCursor<'a> {
    chars: Vec<char>,
    pos: usize,
    line: &'a str,
}

impl<'a> LineCursor<'a> {
    pub fn new(line: &'a str) -> Self {
        Self {
            chars: line.chars().collect(),
            pos: 0,
            line,
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub fn remaining(&self) -> String {
        self.chars[self.pos..].iter().collect()
    }

    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.chars.len());
    }

    pub fn back(&mut self, n: usize) {
        self.pos = self.pos.saturating_sub(n);
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.chars.len());
    }

    pub fn original_line(&self) -> &'a str {
        self.line
    }
}

/// The fixed catalogue of rule functions (§4.6). A compiled [`Rule`] is a
/// `Vec<FunctionCall>`; unsupported functions fail to compile rather than
/// fail at parse time (caught at `.str`/rule-source load).
#[derive(Debug, Clone)]
pub enum FunctionCall {
    SkipWhiteSpaces,
    /// `None` = one-or-more (the `?` form); `Some(n)` = exactly n.
    WhiteSpaces(Option<usize>),
    WhiteSpacesAndLineEnds,
    SkipToNumber,
    Back(usize),
    RestOfLine(Option<ColumnId>),
    Word(Option<ColumnId>),
    All(usize, Option<ColumnId>),
    AllTo(String, Option<ColumnId>),
    AllUpTo(ColumnId, String),
    Number(ColumnId),
    PositiveNumber(ColumnId),
    NumberWithSeparators(ColumnId, String),
    Month3(ColumnId),
    Month(ColumnId),
    MonthTxt(ColumnId),
    Day(ColumnId),
    Year(ColumnId),
    Time(ColumnId),
    YearOrTime(ColumnId, ColumnId),
    UnixLink(ColumnId, ColumnId, ColumnId),
    UnixDevice(ColumnId),
    If(Condition),
    Assign(ColumnId, String),
    CutWhiteSpaces(ColumnId),
    CutWhiteSpacesStart(ColumnId),
    CutWhiteSpacesEnd(ColumnId),
    AddStringToColumn(ColumnId, String),
    CutEndOfString(ColumnId, usize),
}

/// A minimal boolean condition for `if(...)`: equality/inequality of an
/// already-assigned column against a literal.
#[derive(Debug, Clone)]
pub enum Condition {
    Eq(ColumnId, String),
    NotEq(ColumnId, String),
}

fn eval_condition(cond: &Condition, row: &Row) -> bool {
    match cond {
        Condition::Eq(col, lit) => row.get_str(*col) == Some(lit.as_str()),
        Condition::NotEq(col, lit) => row.get_str(*col) != Some(lit.as_str()),
    }
}

const ENGLISH_MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
// German: mai/mrz overlap with other languages handled via the mask.
const GERMAN_MONTHS: [&str; 12] = [
    "jan", "feb", "mrz", "apr", "mai", "jun", "jul", "aug", "sep", "okt", "nov", "dez",
];
const NORWEGIAN_MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "mai", "jun", "jul", "aug", "sep", "okt", "nov", "des",
];
const SWEDISH_MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "maj", "jun", "jul", "aug", "sep", "okt", "nov", "dec",
];

/// Look up a three-letter month token against every still-allowed
/// language, returning the month number (1-12) and the subset of
/// languages whose table contains that spelling. A line that narrows the
/// mask to zero fails the *rule*, not just the line (§4.6).
fn lookup_month_3(token: &str) -> Option<(u32, u8)> {
    let token = token.to_lowercase();
    let tables: [(u8, &[&str; 12]); 4] = [
        (Languages::ENGLISH, &ENGLISH_MONTHS),
        (Languages::GERMAN, &GERMAN_MONTHS),
        (Languages::NORWEGIAN, &NORWEGIAN_MONTHS),
        (Languages::SWEDISH, &SWEDISH_MONTHS),
    ];
    let mut mask = 0u8;
    let mut month = None;
    for (lang_bit, table) in tables {
        if let Some(idx) = table.iter().position(|m| *m == token) {
            mask |= lang_bit;
            month = Some(idx as u32 + 1);
        }
    }
    month.map(|m| (m, mask))
}

/// Execute one function against the cursor/row/context. Returns `Err(())`
/// on failure; the caller is responsible for rewinding the whole rule.
pub fn exec(call: &FunctionCall, cur: &mut LineCursor, row: &mut Row, ctx: &mut ParseContext) -> Result<(), ()> {
    match call {
        FunctionCall::SkipWhiteSpaces => {
            while matches!(cur.peek(), Some(c) if c == ' ' || c == '\t') {
                cur.advance(1);
            }
            Ok(())
        }
        FunctionCall::WhiteSpaces(n) => {
            let start = cur.pos();
            let mut count = 0usize;
            while matches!(cur.peek(), Some(c) if c == ' ' || c == '\t') {
                cur.advance(1);
                count += 1;
            }
            match n {
                Some(exact) if count == *exact => Ok(()),
                Some(_) => {
                    cur.set_pos(start);
                    Err(())
                }
                None if count >= 1 => Ok(()),
                None => Err(()),
            }
        }
        FunctionCall::WhiteSpacesAndLineEnds => {
            while matches!(cur.peek(), Some(c) if c.is_whitespace()) {
                cur.advance(1);
            }
            Ok(())
        }
        FunctionCall::SkipToNumber => {
            while let Some(c) = cur.peek() {
                if c.is_ascii_digit() {
                    return Ok(());
                }
                cur.advance(1);
            }
            Err(())
        }
        FunctionCall::Back(n) => {
            cur.back(*n);
            Ok(())
        }
        FunctionCall::RestOfLine(col) => {
            let text = cur.remaining();
            if let Some(c) = col {
                row.set(*c, ColumnValue::Str(text));
            }
            cur.set_pos(cur.pos() + cur.remaining().chars().count());
            Ok(())
        }
        FunctionCall::Word(col) => {
            let start = cur.pos();
            while matches!(cur.peek(), Some(c) if !c.is_whitespace()) {
                cur.advance(1);
            }
            if cur.pos() == start {
                return Err(());
            }
            let word: String = cur_slice(cur, start);
            if let Some(c) = col {
                row.set(*c, ColumnValue::Str(word));
            }
            Ok(())
        }
        FunctionCall::All(n, col) => {
            let start = cur.pos();
            cur.advance(*n);
            if cur.pos() - start != *n {
                cur.set_pos(start);
                return Err(());
            }
            let text = cur_slice(cur, start);
            if let Some(c) = col {
                row.set(*c, ColumnValue::Str(text));
            }
            Ok(())
        }
        FunctionCall::AllTo(needle, col) => {
            let start = cur.pos();
            let rest = cur.remaining();
            match rest.find(needle.as_str()) {
                Some(byte_idx) => {
                    let char_idx = rest[..byte_idx].chars().count();
                    let captured: String = cur_slice_n(cur, start, char_idx);
                    cur.advance(char_idx + needle.chars().count());
                    if let Some(c) = col {
                        row.set(*c, ColumnValue::Str(captured));
                    }
                    Ok(())
                }
                None => Err(()),
            }
        }
        FunctionCall::AllUpTo(col, needle) => {
            let start = cur.pos();
            let rest = cur.remaining();
            match rest.find(needle.as_str()) {
                Some(byte_idx) => {
                    let char_idx = rest[..byte_idx].chars().count();
                    let captured: String = cur_slice_n(cur, start, char_idx);
                    cur.advance(char_idx);
                    row.set(*col, ColumnValue::Str(captured));
                    Ok(())
                }
                None => Err(()),
            }
        }
        FunctionCall::Number(col) => parse_number(cur, row, *col, true),
        FunctionCall::PositiveNumber(col) => parse_number(cur, row, *col, false),
        FunctionCall::NumberWithSeparators(col, seps) => {
            let start = cur.pos();
            let mut digits = String::new();
            while let Some(c) = cur.peek() {
                if c.is_ascii_digit() {
                    digits.push(c);
                    cur.advance(1);
                } else if seps.contains(c) {
                    cur.advance(1);
                } else {
                    break;
                }
            }
            if digits.is_empty() {
                cur.set_pos(start);
                return Err(());
            }
            let n: i64 = digits.parse().map_err(|_| ())?;
            row.set(*col, ColumnValue::Num(n));
            Ok(())
        }
        FunctionCall::Month3(col) => {
            let start = cur.pos();
            let token: String = cur.chars[cur.pos..].iter().take(3).collect();
            if token.chars().count() != 3 || !token.chars().all(|c| c.is_alphabetic()) {
                return Err(());
            }
            match lookup_month_3(&token) {
                Some((month, mask)) if mask & ctx.allowed_languages != 0 => {
                    cur.advance(3);
                    ctx.allowed_languages &= mask;
                    row.set(*col, ColumnValue::Num(month as i64));
                    Ok(())
                }
                _ => {
                    cur.set_pos(start);
                    Err(())
                }
            }
        }
        FunctionCall::Month(col) => parse_number_range(cur, row, *col, 1, 12),
        FunctionCall::MonthTxt(col) => {
            let start = cur.pos();
            while matches!(cur.peek(), Some(c) if c.is_alphabetic()) {
                cur.advance(1);
            }
            if cur.pos() == start {
                return Err(());
            }
            let token = cur_slice(cur, start);
            let three: String = token.chars().take(3).collect();
            match lookup_month_3(&three) {
                Some((month, mask)) if mask & ctx.allowed_languages != 0 => {
                    ctx.allowed_languages &= mask;
                    row.set(*col, ColumnValue::Num(month as i64));
                    Ok(())
                }
                _ => {
                    cur.set_pos(start);
                    Err(())
                }
            }
        }
        FunctionCall::Day(col) => parse_number_range(cur, row, *col, 1, 31),
        FunctionCall::Year(col) => {
            let start = cur.pos();
            let mut digits = String::new();
            while matches!(cur.peek(), Some(c) if c.is_ascii_digit()) && digits.len() < 4 {
                digits.push(cur.peek().unwrap());
                cur.advance(1);
            }
            if digits.len() != 2 && digits.len() != 4 {
                cur.set_pos(start);
                return Err(());
            }
            let mut year: i64 = digits.parse().map_err(|_| ())?;
            if digits.len() == 2 {
                year += if year < 70 { 2000 } else { 1900 };
            }
            row.set(*col, ColumnValue::Num(year));
            Ok(())
        }
        FunctionCall::Time(col) => {
            let start = cur.pos();
            let text = cur.remaining();
            let token: String = text.chars().take_while(|c| c.is_ascii_digit() || *c == ':').collect();
            if !token.contains(':') {
                return Err(());
            }
            let parts: Vec<&str> = token.split(':').collect();
            if parts.len() != 2 {
                cur.set_pos(start);
                return Err(());
            }
            let (h, m) = (parts[0].parse::<u32>(), parts[1].parse::<u32>());
            match (h, m) {
                (Ok(h), Ok(m)) if h < 24 && m < 60 => {
                    cur.advance(token.chars().count());
                    row.set(*col, ColumnValue::Str(format!("{:02}:{:02}", h, m)));
                    Ok(())
                }
                _ => {
                    cur.set_pos(start);
                    Err(())
                }
            }
        }
        FunctionCall::YearOrTime(date_col, time_col) => {
            let start = cur.pos();
            let text = cur.remaining();
            let token: String = text
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == ':')
                .collect();
            if token.contains(':') {
                let parts: Vec<&str> = token.split(':').collect();
                if parts.len() == 2 {
                    if let (Ok(h), Ok(m)) = (parts[0].parse::<u32>(), parts[1].parse::<u32>()) {
                        if h < 24 && m < 60 {
                            cur.advance(token.chars().count());
                            row.set(*time_col, ColumnValue::Str(format!("{:02}:{:02}", h, m)));
                            row.set(*date_col, ColumnValue::Num(ctx.actual_year as i64));
                            row.set(ColumnId::YearAssumed, ColumnValue::Bool(true));
                            return Ok(());
                        }
                    }
                }
                cur.set_pos(start);
                return Err(());
            }
            if token.len() == 4 {
                if let Ok(year) = token.parse::<i64>() {
                    cur.advance(4);
                    row.set(*date_col, ColumnValue::Num(year));
                    row.set(ColumnId::YearAssumed, ColumnValue::Bool(false));
                    return Ok(());
                }
            }
            cur.set_pos(start);
            Err(())
        }
        FunctionCall::UnixLink(is_dir_col, name_col, link_col) => {
            let text = cur.remaining();
            if let Some(pos) = text.find(" -> ") {
                let name = text[..pos].to_string();
                let target = text[pos + 4..].to_string();
                row.set(*name_col, ColumnValue::Str(name));
                row.set(*link_col, ColumnValue::Str(target));
                row.set(*is_dir_col, ColumnValue::Bool(false));
            } else {
                row.set(*name_col, ColumnValue::Str(text.clone()));
                row.set(*is_dir_col, ColumnValue::Bool(false));
            }
            cur.advance(text.chars().count());
            Ok(())
        }
        FunctionCall::UnixDevice(col) => {
            let start = cur.pos();
            let text = cur.remaining();
            let re_like: String = text
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == ' ')
                .collect();
            if !re_like.contains(',') {
                return Err(());
            }
            let joined: String = re_like.split(',').map(|s| s.trim()).collect::<Vec<_>>().join(",");
            cur.advance(re_like.chars().count());
            row.set(*col, ColumnValue::Str(joined));
            let _ = start;
            Ok(())
        }
        FunctionCall::If(cond) => {
            if eval_condition(cond, row) {
                Ok(())
            } else {
                Err(())
            }
        }
        FunctionCall::Assign(col, literal) => {
            let value = match literal.as_str() {
                "true" => ColumnValue::Bool(true),
                "false" => ColumnValue::Bool(false),
                _ => match literal.parse::<i64>() {
                    Ok(n) => ColumnValue::Num(n),
                    Err(_) => ColumnValue::Str(literal.clone()),
                },
            };
            row.set(*col, value);
            Ok(())
        }
        FunctionCall::CutWhiteSpaces(col) => {
            if let Some(ColumnValue::Str(s)) = row.get(*col) {
                let trimmed = s.trim().to_string();
                row.set(*col, ColumnValue::Str(trimmed));
            }
            Ok(())
        }
        FunctionCall::CutWhiteSpacesStart(col) => {
            if let Some(ColumnValue::Str(s)) = row.get(*col) {
                let trimmed = s.trim_start().to_string();
                row.set(*col, ColumnValue::Str(trimmed));
            }
            Ok(())
        }
        FunctionCall::CutWhiteSpacesEnd(col) => {
            if let Some(ColumnValue::Str(s)) = row.get(*col) {
                let trimmed = s.trim_end().to_string();
                row.set(*col, ColumnValue::Str(trimmed));
            }
            Ok(())
        }
        FunctionCall::AddStringToColumn(col, suffix) => {
            let existing = row.get_str(*col).unwrap_or("").to_string();
            row.set(*col, ColumnValue::Str(existing + suffix));
            Ok(())
        }
        FunctionCall::CutEndOfString(col, n) => {
            if let Some(ColumnValue::Str(s)) = row.get(*col) {
                let kept_len = s.chars().count().saturating_sub(*n);
                let kept: String = s.chars().take(kept_len).collect();
                row.set(*col, ColumnValue::Str(kept));
            }
            Ok(())
        }
    }
}

fn cur_slice(cur: &LineCursor, start: usize) -> String {
    cur.chars[start..cur.pos].iter().collect()
}

fn cur_slice_n(cur: &LineCursor, start: usize, n: usize) -> String {
    cur.chars[start..(start + n).min(cur.chars.len())].iter().collect()
}

fn parse_number(cur: &mut LineCursor, row: &mut Row, col: ColumnId, allow_sign: bool) -> Result<(), ()> {
    let start = cur.pos();
    if allow_sign && matches!(cur.peek(), Some('-') | Some('+')) {
        cur.advance(1);
    }
    let digits_start = cur.pos();
    while matches!(cur.peek(), Some(c) if c.is_ascii_digit()) {
        cur.advance(1);
    }
    if cur.pos() == digits_start {
        cur.set_pos(start);
        return Err(());
    }
    let text = cur_slice(cur, start);
    let n: i64 = text.parse().map_err(|_| ())?;
    row.set(col, ColumnValue::Num(n));
    Ok(())
}

fn parse_number_range(cur: &mut LineCursor, row: &mut Row, col: ColumnId, lo: i64, hi: i64) -> Result<(), ()> {
    let start = cur.pos();
    let digits_start = cur.pos();
    while matches!(cur.peek(), Some(c) if c.is_ascii_digit()) {
        cur.advance(1);
    }
    if cur.pos() == digits_start {
        cur.set_pos(start);
        return Err(());
    }
    let text = cur_slice(cur, start);
    let n: i64 = text.parse().map_err(|_| ())?;
    if n < lo || n > hi {
        cur.set_pos(start);
        return Err(());
    }
    row.set(col, ColumnValue::Num(n));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_3_english() {
        let mut cur = LineCursor::new("Jan 02 12:34");
        let mut row = Row::default();
        let mut ctx = ParseContext::new(2026, 7, 30);
        exec(&FunctionCall::Month3(ColumnId::Month), &mut cur, &mut row, &mut ctx).unwrap();
        assert_eq!(row.get_num(ColumnId::Month), Some(1));
        assert_eq!(ctx.allowed_languages & Languages::ENGLISH, Languages::ENGLISH);
    }

    #[test]
    fn month_3_narrows_languages_on_german_specific_spelling() {
        let mut cur = LineCursor::new("Mrz 02 12:34");
        let mut row = Row::default();
        let mut ctx = ParseContext::new(2026, 7, 30);
        exec(&FunctionCall::Month3(ColumnId::Month), &mut cur, &mut row, &mut ctx).unwrap();
        assert_eq!(ctx.allowed_languages, Languages::GERMAN);
    }

    #[test]
    fn unix_link_splits_target() {
        let mut cur = LineCursor::new("link -> /var/target");
        let mut row = Row::default();
        let mut ctx = ParseContext::new(2026, 7, 30);
        exec(
            &FunctionCall::UnixLink(ColumnId::IsDir, ColumnId::Name, ColumnId::LinkTarget),
            &mut cur,
            &mut row,
            &mut ctx,
        )
        .unwrap();
        assert_eq!(row.get_str(ColumnId::Name), Some("link"));
        assert_eq!(row.get_str(ColumnId::LinkTarget), Some("/var/target"));
    }

    #[test]
    fn year_or_time_detects_time() {
        let mut cur = LineCursor::new("12:34");
        let mut row = Row::default();
        let mut ctx = ParseContext::new(2026, 7, 30);
        exec(
            &FunctionCall::YearOrTime(ColumnId::Year, ColumnId::Time),
            &mut cur,
            &mut row,
            &mut ctx,
        )
        .unwrap();
        assert_eq!(row.get_bool(ColumnId::YearAssumed), Some(true));
    }

    #[test]
    fn year_or_time_detects_year() {
        let mut cur = LineCursor::new("2024");
        let mut row = Row::default();
        let mut ctx = ParseContext::new(2026, 7, 30);
        exec(
            &FunctionCall::YearOrTime(ColumnId::Year, ColumnId::Time),
            &mut cur,
            &mut row,
            &mut ctx,
        )
        .unwrap();
        assert_eq!(row.get_num(ColumnId::Year), Some(2024));
        assert_eq!(row.get_bool(ColumnId::YearAssumed), Some(false));
    }
}
