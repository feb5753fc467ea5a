use crate::model::{NA_VALUE, UNKNOWN_VALUE};
use crate::render::helpers::parse_quantity;
use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::{Chars, FromStr};

const SECONDS_PER_YEAR: f64 = 365.0 * 86_400.0;

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct SortColumn {
    pub name: String,
    pub asc: bool,
}

impl SortColumn {
    pub fn new(name: impl Into<String>, asc: bool) -> Self {
        Self {
            name: name.into(),
            asc,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.name.is_empty()
    }
}

impl FromStr for SortColumn {
    type Err = anyhow::Error;

    /// Accepts `NAME`, `NAME:asc` or `NAME:desc`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let (name, order) = raw.split_once(':').unwrap_or((raw, "asc"));
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("sort column name is required in {raw:?}");
        }
        let asc = match order.trim().to_ascii_lowercase().as_str() {
            "" | "asc" => true,
            "desc" => false,
            other => anyhow::bail!("invalid sort order {other:?}, expecting asc or desc"),
        };

        Ok(Self::new(name, asc))
    }
}

/// Returns true when `v1` sorts before `v2`. Equal values fall back to the
/// row ids so the order stays stable between refreshes.
pub fn less(
    is_number: bool,
    is_duration: bool,
    is_capacity: bool,
    id1: &str,
    id2: &str,
    v1: &str,
    v2: &str,
) -> bool {
    match compare_values(is_number, is_duration, is_capacity, v1, v2) {
        Ordering::Equal => natural_cmp(id1, id2) == Ordering::Less,
        ordering => ordering == Ordering::Less,
    }
}

/// Content-aware ordering of two cell values: durations first, then numbers
/// or capacities, then natural text ordering.
pub fn compare_values(
    is_number: bool,
    is_duration: bool,
    is_capacity: bool,
    v1: &str,
    v2: &str,
) -> Ordering {
    if v1 == v2 {
        return Ordering::Equal;
    }

    let (d1, d2) = (duration_to_seconds(v1), duration_to_seconds(v2));
    if is_duration {
        if d1.is_none() && d2.is_none() {
            return natural_cmp(v1, v2);
        }
        let (d1, d2) = (d1.unwrap_or(f64::INFINITY), d2.unwrap_or(f64::INFINITY));
        return d1.partial_cmp(&d2).unwrap_or(Ordering::Equal);
    }
    if let (Some(d1), Some(d2)) = (d1, d2) {
        return d1.partial_cmp(&d2).unwrap_or(Ordering::Equal);
    }

    if is_number || is_capacity {
        let (s1, s2) = (v1.replace(',', ""), v2.replace(',', ""));
        let parse = |value: &str| {
            if is_capacity {
                parse_quantity(value)
            } else {
                value.trim().parse::<f64>().ok()
            }
        };
        return match (parse(&s1), parse(&s2)) {
            (Some(n1), Some(n2)) => n1.partial_cmp(&n2).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => natural_cmp(&s1, &s2),
        };
    }

    natural_cmp(v1, v2)
}

/// Parses compact durations such as `19s`, `10m10s`, `3d4h`, `2y10d` or
/// `250ms` into seconds.
pub fn duration_to_seconds(value: &str) -> Option<f64> {
    let raw = value.trim();
    if raw.is_empty() || raw == NA_VALUE || raw == UNKNOWN_VALUE {
        return None;
    }

    let mut total = 0.0;
    let mut number = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }
        let multiplier = match c {
            'y' => SECONDS_PER_YEAR,
            'd' => 86_400.0,
            'h' => 3_600.0,
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                0.001
            }
            'm' => 60.0,
            's' => 1.0,
            _ => return None,
        };
        if number.is_empty() {
            return None;
        }
        total += number.parse::<f64>().ok()? * multiplier;
        number.clear();
    }
    if !number.is_empty() {
        return None;
    }

    Some(total)
}

/// Natural string ordering where embedded digit runs compare as numbers,
/// so `item2` sorts before `item10`.
pub fn natural_cmp(left: &str, right: &str) -> Ordering {
    let (mut l, mut r) = (left.chars().peekable(), right.chars().peekable());
    loop {
        match (l.peek().copied(), r.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(lc), Some(rc)) if lc.is_ascii_digit() && rc.is_ascii_digit() => {
                let (ln, rn) = (digit_run(&mut l), digit_run(&mut r));
                let (lt, rt) = (ln.trim_start_matches('0'), rn.trim_start_matches('0'));
                let ordering = lt
                    .len()
                    .cmp(&rt.len())
                    .then_with(|| lt.cmp(rt))
                    .then_with(|| ln.len().cmp(&rn.len()));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(lc), Some(rc)) => {
                if lc != rc {
                    return lc.cmp(&rc);
                }
                l.next();
                r.next();
            }
        }
    }
}

fn digit_run(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        run.push(c);
    }
    run
}
