//! Filter algebra (spec §3 "Filter variant", §4.1).
//!
//! A [`Filter`] is the intersection of every predicate the embedded engine
//! pushed down for a single column in a single scan. [`Filter::Impossible`]
//! is the empty set: once any column's bound collapses to it, the adapter
//! never needs to be called.

use crate::value::NativeValue;

/// The comparison operators a pushed-down constraint can carry. `Like`,
/// `IsNull`, `IsNotNull` are their own filter variants rather than
/// comparators on a value, since they don't combine with range bounds the
/// way `>`/`>=`/`<`/`<=`/`=` do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    IsNull,
    IsNotNull,
}

/// A single column's accepted bound for one scan.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Equal(NativeValue),
    NotEqual(NativeValue),
    Range {
        start: Option<NativeValue>,
        end: Option<NativeValue>,
        include_start: bool,
        include_end: bool,
    },
    /// SQL `LIKE` pattern, `%`/`_` wildcards, case-sensitive.
    Like(String),
    IsNull,
    IsNotNull,
    /// The empty set.
    Impossible,
}

impl Filter {
    /// Every filter tag this crate is capable of pushing down, in the
    /// order adapters are expected to enumerate them in `filters()`.
    pub const ALL_TAGS: &'static [&'static str] = &[
        "Equal",
        "NotEqual",
        "Range",
        "Like",
        "IsNull",
        "IsNotNull",
    ];

    /// Fold a set of `(operator, value)` pairs drawn from `{>, >=, <, <=}`
    /// into a single normalized `Range` (or `Impossible` if the bounds
    /// collapse). Spec §4.1 `build`.
    pub fn build(constraints: impl IntoIterator<Item = (Operator, NativeValue)>) -> Filter {
        let mut start: Option<NativeValue> = None;
        let mut include_start = false;
        let mut end: Option<NativeValue> = None;
        let mut include_end = false;

        for (op, value) in constraints {
            match op {
                Operator::Gt => narrow_start(&mut start, &mut include_start, value, false),
                Operator::Ge => narrow_start(&mut start, &mut include_start, value, true),
                Operator::Lt => narrow_end(&mut end, &mut include_end, value, false),
                Operator::Le => narrow_end(&mut end, &mut include_end, value, true),
                _ => continue,
            }
        }

        let range = Filter::Range {
            start,
            end,
            include_start,
            include_end,
        };
        if range.is_empty() {
            Filter::Impossible
        } else {
            range
        }
    }

    fn is_empty(&self) -> bool {
        if let Filter::Range {
            start: Some(s),
            end: Some(e),
            include_start,
            include_end,
        } = self
        {
            match s.partial_cmp(e) {
                Some(std::cmp::Ordering::Greater) => true,
                Some(std::cmp::Ordering::Equal) => !(*include_start && *include_end),
                _ => false,
            }
        } else {
            false
        }
    }

    /// Evaluate this filter against a single native value. Used for
    /// engine-side residual checks when `exact = false` (spec §7.1/§8).
    pub fn check(&self, value: &NativeValue) -> bool {
        match self {
            Filter::Impossible => false,
            Filter::IsNull => value.is_null(),
            Filter::IsNotNull => !value.is_null(),
            Filter::Equal(v) => value == v,
            Filter::NotEqual(v) => value != v,
            Filter::Like(pattern) => like_match(pattern, value),
            Filter::Range {
                start,
                end,
                include_start,
                include_end,
            } => {
                if value.is_null() {
                    return false;
                }
                let above_start = match start {
                    None => true,
                    Some(s) => {
                        if *include_start {
                            value >= s
                        } else {
                            value > s
                        }
                    }
                };
                let below_end = match end {
                    None => true,
                    Some(e) => {
                        if *include_end {
                            value <= e
                        } else {
                            value < e
                        }
                    }
                };
                above_start && below_end
            }
        }
    }

    /// Narrow `self` by `other`, returning the filter representing rows
    /// that satisfy both. Associative: `a.intersect(b).intersect(c) ==
    /// a.intersect(b.intersect(c))` for range-only inputs (spec §8).
    pub fn intersect(&self, other: &Filter) -> Filter {
        use Filter::*;

        match (self, other) {
            (Impossible, _) | (_, Impossible) => Impossible,

            (IsNotNull, IsNotNull) => IsNotNull,
            (IsNull, IsNull) => IsNull,
            // A null can't also satisfy an equality, range or like bound.
            (IsNull, _) | (_, IsNull) => Impossible,

            (Equal(a), Equal(b)) => {
                if a == b {
                    Equal(a.clone())
                } else {
                    Impossible
                }
            }
            (NotEqual(a), NotEqual(b)) => {
                if a == b {
                    NotEqual(a.clone())
                } else {
                    // Two distinct exclusions can't collapse to a single
                    // filter tag; keep the narrower-looking one and rely
                    // on residual engine-side checking.
                    NotEqual(a.clone())
                }
            }
            (Equal(v), NotEqual(n)) | (NotEqual(n), Equal(v)) => {
                if v == n {
                    Impossible
                } else {
                    Equal(v.clone())
                }
            }
            (Equal(v), Range { .. }) | (Range { .. }, Equal(v)) => {
                let range = if matches!(self, Range { .. }) {
                    self
                } else {
                    other
                };
                if range.check(v) {
                    Equal(v.clone())
                } else {
                    Impossible
                }
            }
            (
                Range {
                    start: s1,
                    end: e1,
                    include_start: is1,
                    include_end: ie1,
                },
                Range {
                    start: s2,
                    end: e2,
                    include_start: is2,
                    include_end: ie2,
                },
            ) => {
                let (start, include_start) = tighter_start(s1, *is1, s2, *is2);
                let (end, include_end) = tighter_end(e1, *ie1, e2, *ie2);
                let merged = Range {
                    start,
                    end,
                    include_start,
                    include_end,
                };
                if merged.is_empty() {
                    Impossible
                } else {
                    merged
                }
            }
            // Like/NotEqual combined with a range: no tighter closed form,
            // so keep both sides representable by preferring the more
            // selective-looking one; the engine re-checks residually.
            (other_filter, Range { .. }) | (Range { .. }, other_filter) => other_filter.clone(),
            (a, _) => a.clone(),
        }
    }
}

fn narrow_start(
    start: &mut Option<NativeValue>,
    include_start: &mut bool,
    value: NativeValue,
    inclusive: bool,
) {
    match start {
        None => {
            *start = Some(value);
            *include_start = inclusive;
        }
        Some(current) => {
            if value > *current || (value == *current && !inclusive) {
                *start = Some(value);
                *include_start = inclusive;
            }
        }
    }
}

fn narrow_end(
    end: &mut Option<NativeValue>,
    include_end: &mut bool,
    value: NativeValue,
    inclusive: bool,
) {
    match end {
        None => {
            *end = Some(value);
            *include_end = inclusive;
        }
        Some(current) => {
            if value < *current || (value == *current && !inclusive) {
                *end = Some(value);
                *include_end = inclusive;
            }
        }
    }
}

fn tighter_start(
    s1: &Option<NativeValue>,
    is1: bool,
    s2: &Option<NativeValue>,
    is2: bool,
) -> (Option<NativeValue>, bool) {
    match (s1, s2) {
        (None, None) => (None, false),
        (Some(v), None) => (Some(v.clone()), is1),
        (None, Some(v)) => (Some(v.clone()), is2),
        (Some(a), Some(b)) => {
            if a > b {
                (Some(a.clone()), is1)
            } else if b > a {
                (Some(b.clone()), is2)
            } else {
                (Some(a.clone()), is1 && is2)
            }
        }
    }
}

fn tighter_end(
    e1: &Option<NativeValue>,
    ie1: bool,
    e2: &Option<NativeValue>,
    ie2: bool,
) -> (Option<NativeValue>, bool) {
    match (e1, e2) {
        (None, None) => (None, false),
        (Some(v), None) => (Some(v.clone()), ie1),
        (None, Some(v)) => (Some(v.clone()), ie2),
        (Some(a), Some(b)) => {
            if a < b {
                (Some(a.clone()), ie1)
            } else if b < a {
                (Some(b.clone()), ie2)
            } else {
                (Some(a.clone()), ie1 && ie2)
            }
        }
    }
}

/// SQL `LIKE` semantics: `%` matches any run of characters, `_` matches
/// exactly one. Case-sensitive (spec §4.1).
fn like_match(pattern: &str, value: &NativeValue) -> bool {
    let text = match value {
        NativeValue::String(s) => s.as_str(),
        _ => return false,
    };

    fn matches(pattern: &[char], text: &[char]) -> bool {
        match pattern.split_first() {
            None => text.is_empty(),
            Some(('%', rest)) => {
                matches(rest, text)
                    || (!text.is_empty() && matches(pattern, &text[1..]))
            }
            Some(('_', rest)) => !text.is_empty() && matches(rest, &text[1..]),
            Some((c, rest)) => {
                !text.is_empty() && text[0] == *c && matches(rest, &text[1..])
            }
        }
    }

    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();
    matches(&pattern_chars, &text_chars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::NativeValue::Integer;

    #[test]
    fn build_folds_range_constraints() {
        let filter = Filter::build([(Operator::Gt, Integer(21)), (Operator::Le, Integer(65))]);
        assert_eq!(
            filter,
            Filter::Range {
                start: Some(Integer(21)),
                end: Some(Integer(65)),
                include_start: false,
                include_end: true,
            }
        );
    }

    #[test]
    fn build_detects_impossible_range() {
        let filter = Filter::build([(Operator::Gt, Integer(100)), (Operator::Lt, Integer(10))]);
        assert_eq!(filter, Filter::Impossible);
    }

    #[test]
    fn build_detects_impossible_at_equal_exclusive_bounds() {
        let filter = Filter::build([(Operator::Ge, Integer(10)), (Operator::Lt, Integer(10))]);
        assert_eq!(filter, Filter::Impossible);
    }

    #[test]
    fn intersect_with_impossible_is_impossible() {
        let range = Filter::Range {
            start: Some(Integer(0)),
            end: None,
            include_start: true,
            include_end: false,
        };
        assert_eq!(range.intersect(&Filter::Impossible), Filter::Impossible);
    }

    #[test]
    fn intersect_is_associative_for_ranges() {
        let a = Filter::Range {
            start: Some(Integer(0)),
            end: Some(Integer(100)),
            include_start: true,
            include_end: true,
        };
        let b = Filter::Range {
            start: Some(Integer(10)),
            end: Some(Integer(90)),
            include_start: false,
            include_end: true,
        };
        let c = Filter::Range {
            start: None,
            end: Some(Integer(50)),
            include_start: false,
            include_end: false,
        };

        let left = a.intersect(&b).intersect(&c);
        let right = a.intersect(&b.intersect(&c));
        assert_eq!(left, right);
    }

    #[test]
    fn check_range_respects_inclusivity() {
        let filter = Filter::Range {
            start: Some(Integer(21)),
            end: None,
            include_start: false,
            include_end: false,
        };
        assert!(!filter.check(&Integer(21)));
        assert!(filter.check(&Integer(22)));
    }

    #[test]
    fn like_matches_percent_and_underscore() {
        let value = NativeValue::String("Alice".into());
        assert!(like_match("A%", &value));
        assert!(like_match("A_i%", &value));
        assert!(!like_match("B%", &value));
    }
}
