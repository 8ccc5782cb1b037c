//! Computed-field formulas.
//!
//! Supported forms, parsed once into [`Formula`]:
//!
//! - `concat(First, ' ', Last)`
//! - `Price + Tax`, `Total - Discount`, `Price + 5`
//! - `Start + 2h30m`, `Start - 45m`
//! - `sum(a, b, c)`
//!
//! Anything else is a plain field lookup on the formula text.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat};
use xforge_config::Row;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    /// Signed span in minutes.
    Span(i64),
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(String),
    Literal(String),
    Number(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    Concat(Vec<Operand>),
    Arithmetic { lhs: String, op: ArithOp, rhs: Operand },
    ShiftTime { field: String, minutes: i64 },
    Sum(Vec<Operand>),
    Lookup(String),
}

impl Formula {
    pub fn parse(text: &str) -> Self {
        tokenize(text)
            .and_then(|tokens| parse_tokens(&tokens))
            .unwrap_or_else(|| Formula::Lookup(text.trim().to_string()))
    }

    /// Field names the formula reads.
    pub fn inputs(&self) -> Vec<String> {
        let fields = |ops: &[Operand]| {
            ops.iter()
                .filter_map(|o| match o {
                    Operand::Field(f) => Some(f.clone()),
                    _ => None,
                })
                .collect::<Vec<_>>()
        };
        match self {
            Formula::Concat(ops) | Formula::Sum(ops) => fields(ops),
            Formula::Arithmetic { lhs, rhs, .. } => {
                let mut out = vec![lhs.clone()];
                out.extend(fields(std::slice::from_ref(rhs)));
                out
            }
            Formula::ShiftTime { field, .. } => vec![field.clone()],
            Formula::Lookup(f) => vec![f.clone()],
        }
    }

    /// `Ok(None)` only for a lookup of an absent field.
    pub fn eval(&self, row: &Row) -> Result<Option<String>, String> {
        match self {
            Formula::Lookup(f) => Ok(row.get(f).cloned()),
            Formula::Concat(ops) => {
                let mut out = String::new();
                for op in ops {
                    match op {
                        Operand::Field(f) => out.push_str(field(row, f)?),
                        Operand::Literal(s) => out.push_str(s),
                        Operand::Number(n) => out.push_str(&format_number(*n)),
                    }
                }
                Ok(Some(out))
            }
            Formula::Arithmetic { lhs, op, rhs } => {
                let a = number(row, lhs)?;
                let b = match rhs {
                    Operand::Field(f) => number(row, f)?,
                    Operand::Number(n) => *n,
                    Operand::Literal(s) => s.trim().parse().map_err(|_| format!("'{s}' is not numeric"))?,
                };
                let v = match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                };
                Ok(Some(format_number(v)))
            }
            Formula::Sum(ops) => {
                let mut total = 0.0;
                for op in ops {
                    let v = match op {
                        Operand::Field(f) => row.get(f).and_then(|s| s.trim().parse::<f64>().ok()),
                        Operand::Number(n) => Some(*n),
                        Operand::Literal(s) => s.trim().parse().ok(),
                    };
                    // non-numeric members are skipped, missing ones count as zero
                    total += v.unwrap_or(0.0);
                }
                Ok(Some(format_number(total)))
            }
            Formula::ShiftTime { field: f, minutes } => shift_time(field(row, f)?, *minutes).map(Some),
        }
    }
}

fn field<'a>(row: &'a Row, name: &str) -> Result<&'a str, String> {
    row.get(name)
        .map(String::as_str)
        .ok_or_else(|| format!("field '{name}' is missing"))
}

fn number(row: &Row, name: &str) -> Result<f64, String> {
    let raw = field(row, name)?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| format!("field '{name}' is not numeric ('{raw}')"))
}

/// Integral values print without a fractional part.
pub fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

fn shift_time(raw: &str, minutes: i64) -> Result<String, String> {
    let out_of_range = || format!("shifting '{}' by {minutes} minutes is out of range", raw.trim());
    let delta = Duration::try_minutes(minutes).ok_or_else(out_of_range)?;
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        let shifted = dt.checked_add_signed(delta).ok_or_else(out_of_range)?;
        return Ok(shifted.to_rfc3339_opts(SecondsFormat::AutoSi, true));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            let shifted = dt.checked_add_signed(delta).ok_or_else(out_of_range)?;
            return Ok(shifted.format(fmt).to_string());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let dt = d
            .and_time(NaiveTime::MIN)
            .checked_add_signed(delta)
            .ok_or_else(out_of_range)?;
        return Ok(if dt.time() == NaiveTime::MIN {
            dt.format("%Y-%m-%d").to_string()
        } else {
            dt.format("%Y-%m-%dT%H:%M:%S").to_string()
        });
    }
    for fmt in ["%H:%M:%S", "%H:%M"] {
        if let Ok(t) = NaiveTime::parse_from_str(raw, fmt) {
            // clock times wrap around midnight
            let (shifted, _) = t.overflowing_add_signed(delta);
            return Ok(shifted.format(fmt).to_string());
        }
    }
    Err(format!("'{raw}' is not a recognised date or time"))
}

fn tokenize(text: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                out.push(Token::LParen);
                i += 1;
            }
            ')' => {
                out.push(Token::RParen);
                i += 1;
            }
            ',' => {
                out.push(Token::Comma);
                i += 1;
            }
            '+' => {
                out.push(Token::Plus);
                i += 1;
            }
            '-' => {
                out.push(Token::Minus);
                i += 1;
            }
            '\'' | '"' => {
                let close = chars[i + 1..].iter().position(|ch| *ch == c)?;
                out.push(Token::Str(chars[i + 1..i + 1 + close].iter().collect()));
                i += close + 2;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let digits: String = chars[start..i].iter().collect();
                if i < chars.len() && matches!(chars[i], 'h' | 'm') {
                    let (span, next) = span_at(&chars, start)?;
                    out.push(Token::Span(span));
                    i = next;
                } else {
                    out.push(Token::Number(digits));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '.')) {
                    i += 1;
                }
                out.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => return None,
        }
    }
    Some(out)
}

/// `2h`, `30m`, `2h30m` starting at `start`; returns minutes and the next index.
/// Spans that overflow `i64` minutes are not spans.
fn span_at(chars: &[char], start: usize) -> Option<(i64, usize)> {
    let mut i = start;
    let mut minutes = 0i64;
    let mut saw_unit = false;
    let mut last_unit = ' ';
    while i < chars.len() && chars[i].is_ascii_digit() {
        let s = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        let n: i64 = chars[s..i].iter().collect::<String>().parse().ok()?;
        match chars.get(i) {
            Some('h') if last_unit == ' ' => minutes = minutes.checked_add(n.checked_mul(60)?)?,
            Some('m') if last_unit != 'm' => minutes = minutes.checked_add(n)?,
            _ => return None,
        }
        last_unit = chars[i];
        saw_unit = true;
        i += 1;
    }
    saw_unit.then_some((minutes, i))
}

fn operand(tok: &Token) -> Option<Operand> {
    match tok {
        Token::Ident(s) => Some(Operand::Field(s.clone())),
        Token::Str(s) => Some(Operand::Literal(s.clone())),
        Token::Number(n) => n.parse().ok().map(Operand::Number),
        _ => None,
    }
}

fn parse_tokens(tokens: &[Token]) -> Option<Formula> {
    match tokens {
        [Token::Ident(f)] => Some(Formula::Lookup(f.clone())),
        [Token::Ident(func), Token::LParen, args @ .., Token::RParen] => {
            let mut ops = Vec::new();
            for (i, t) in args.iter().enumerate() {
                if i % 2 == 1 {
                    if *t != Token::Comma {
                        return None;
                    }
                } else {
                    ops.push(operand(t)?);
                }
            }
            if args.len() % 2 == 0 {
                // empty list or trailing comma
                if !args.is_empty() {
                    return None;
                }
            }
            match func.to_ascii_lowercase().as_str() {
                "concat" => Some(Formula::Concat(ops)),
                "sum" => Some(Formula::Sum(ops)),
                _ => None,
            }
        }
        [Token::Ident(field), op @ (Token::Plus | Token::Minus), Token::Span(m)] => {
            let minutes = if *op == Token::Minus { -m } else { *m };
            Some(Formula::ShiftTime {
                field: field.clone(),
                minutes,
            })
        }
        [Token::Ident(lhs), op @ (Token::Plus | Token::Minus), rhs] => Some(Formula::Arithmetic {
            lhs: lhs.clone(),
            op: if *op == Token::Plus { ArithOp::Add } else { ArithOp::Sub },
            rhs: match rhs {
                Token::Ident(_) | Token::Number(_) => operand(rhs)?,
                _ => return None,
            },
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn parses_each_form() {
        assert_eq!(
            Formula::parse("concat(First, ' ', Last)"),
            Formula::Concat(vec![
                Operand::Field("First".into()),
                Operand::Literal(" ".into()),
                Operand::Field("Last".into()),
            ])
        );
        assert!(matches!(Formula::parse("Price + Tax"), Formula::Arithmetic { op: ArithOp::Add, .. }));
        assert_eq!(
            Formula::parse("Start + 2h30m"),
            Formula::ShiftTime {
                field: "Start".into(),
                minutes: 150
            }
        );
        assert_eq!(
            Formula::parse("Start - 45m"),
            Formula::ShiftTime {
                field: "Start".into(),
                minutes: -45
            }
        );
        assert!(matches!(Formula::parse("sum(a, b, c)"), Formula::Sum(v) if v.len() == 3));
        assert_eq!(Formula::parse("upper(Name)"), Formula::Lookup("upper(Name)".into()));
        assert_eq!(Formula::parse("concat(a,,b)"), Formula::Lookup("concat(a,,b)".into()));
    }

    #[test]
    fn concat_joins_fields_and_literals() {
        let f = Formula::parse("concat(First,' ',Last)");
        let r = row(&[("First", "Jane"), ("Last", "Doe")]);
        assert_eq!(f.eval(&r).unwrap().as_deref(), Some("Jane Doe"));
        assert!(f.eval(&row(&[("First", "Jane")])).is_err());
    }

    #[test]
    fn arithmetic_requires_numbers() {
        let r = row(&[("Price", "10.50"), ("Tax", "2"), ("Name", "x")]);
        assert_eq!(Formula::parse("Price + Tax").eval(&r).unwrap().as_deref(), Some("12.5"));
        assert_eq!(Formula::parse("Tax - 2").eval(&r).unwrap().as_deref(), Some("0"));
        assert!(Formula::parse("Price + Name").eval(&r).is_err());
    }

    #[test]
    fn sum_skips_non_numeric_members() {
        let r = row(&[("a", "1"), ("b", "2.5"), ("c", "n/a")]);
        assert_eq!(Formula::parse("sum(a,b,c,d)").eval(&r).unwrap().as_deref(), Some("3.5"));
    }

    #[test]
    fn shifts_dates_and_times() {
        let shift = Formula::parse("Start + 2h30m");
        let at = |v: &str| shift.eval(&row(&[("Start", v)])).unwrap().unwrap();
        assert_eq!(at("2024-03-01T10:00:00"), "2024-03-01T12:30:00");
        assert_eq!(at("2024-03-01T23:00:00Z"), "2024-03-02T01:30:00Z");
        assert_eq!(at("09:15"), "11:45");
        assert_eq!(at("2024-03-01"), "2024-03-01T02:30:00");
        assert!(shift.eval(&row(&[("Start", "soon")])).is_err());
    }

    #[test]
    fn huge_shifts_fail_instead_of_panicking() {
        let start = |v: &str| row(&[("Start", v)]);

        // too many minutes to count: not a shift at all, so it reads as a lookup
        let unparsable = Formula::parse("Start + 999999999999999999h");
        assert!(matches!(unparsable, Formula::Lookup(_)));
        assert_eq!(unparsable.eval(&start("2024-03-01T10:00:00")).unwrap(), None);

        let beyond_delta = Formula::parse("Start + 999999999999999m");
        assert!(matches!(beyond_delta, Formula::ShiftTime { .. }));
        assert!(beyond_delta.eval(&start("2024-03-01T10:00:00")).is_err());

        let beyond_calendar = Formula::parse("Start + 9999999999h");
        for v in ["2024-03-01T10:00:00", "2024-03-01T10:00:00Z", "2024-03-01"] {
            let err = beyond_calendar.eval(&start(v)).unwrap_err();
            assert!(err.contains("out of range"), "{v}: {err}");
        }
        assert!(Formula::parse("Start - 9999999999h").eval(&start("2024-03-01")).is_err());
        // 9999999999h is 416666666 days and 15 hours
        assert_eq!(beyond_calendar.eval(&start("10:00")).unwrap().as_deref(), Some("01:00"));
    }

    #[test]
    fn lookup_of_missing_field_yields_nothing() {
        assert_eq!(Formula::parse("Nope").eval(&Row::new()).unwrap(), None);
    }

    #[test]
    fn reports_inputs() {
        assert_eq!(Formula::parse("concat(a,'-',b)").inputs(), ["a", "b"]);
        assert_eq!(Formula::parse("x + y").inputs(), ["x", "y"]);
        assert_eq!(Formula::parse("x + 3").inputs(), ["x"]);
    }
}
