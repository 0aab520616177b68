//! arXiv identifiers and identifier ranges
//!
//! Two textual forms:
//! - canonical `yyyymm-nnnnn` (on-disk directory names, reference keys)
//! - external `yymm.nnnnn` (arXiv URLs and APIs)
//!
//! arXiv widened the sequence from 4 to 5 digits in January 2015, so the
//! external form of older ids is `yymm.nnnn`.

use std::fmt;
use std::ops::RangeInclusive;

use papercrawl_core::ConfigError;

/// First year of new-style (`yymm.nnnn`) identifiers.
pub const MIN_YEAR: u16 = 2007;
/// Last year representable with a two-digit `yy` prefix.
pub const MAX_YEAR: u16 = 2099;

/// Identifier that cannot be parsed or names an impossible paper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierError(pub String);

impl fmt::Display for IdentifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for IdentifierError {}

impl From<IdentifierError> for ConfigError {
    fn from(e: IdentifierError) -> Self {
        ConfigError::InvalidIdentifier(e.0)
    }
}

/// One arXiv paper, ordered by `(year, month, sequence)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier {
    year: u16,
    month: u8,
    sequence: u32,
}

/// Digits in the sequence part for a given month.
pub fn sequence_width(year: u16, month: u8) -> usize {
    if (year, month) < (2015, 1) { 4 } else { 5 }
}

/// Largest sequence number arXiv can assign in a given month.
pub fn max_sequence(year: u16, month: u8) -> u32 {
    10u32.pow(sequence_width(year, month) as u32) - 1
}

fn check_period(year: u16, month: u8) -> Result<(), IdentifierError> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(IdentifierError(format!(
            "year {year} outside {MIN_YEAR}..={MAX_YEAR}"
        )));
    }
    if !(1..=12).contains(&month) {
        return Err(IdentifierError(format!("month {month} outside 1..=12")));
    }
    Ok(())
}

fn parse_digits<T: std::str::FromStr>(s: &str, what: &str, input: &str) -> Result<T, IdentifierError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdentifierError(format!("{input:?}: bad {what} {s:?}")));
    }
    s.parse()
        .map_err(|_| IdentifierError(format!("{input:?}: bad {what} {s:?}")))
}

impl Identifier {
    pub fn new(year: u16, month: u8, sequence: u32) -> Result<Self, IdentifierError> {
        check_period(year, month)?;
        if sequence > max_sequence(year, month) {
            return Err(IdentifierError(format!(
                "sequence {sequence} exceeds {} digits for {year}-{month:02}",
                sequence_width(year, month)
            )));
        }
        Ok(Self {
            year,
            month,
            sequence,
        })
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// `yyyymm-nnnnn`, e.g. `202510-00824`.
    pub fn canonical(&self) -> String {
        format!("{:04}{:02}-{:05}", self.year, self.month, self.sequence)
    }

    /// `yymm.nnnnn`, e.g. `2510.00824` (`0704.0001` before 2015).
    pub fn external(&self) -> String {
        let width = sequence_width(self.year, self.month);
        format!(
            "{:02}{:02}.{:0width$}",
            self.year % 100,
            self.month,
            self.sequence
        )
    }

    /// Parse `yyyymm-nnnnn`.
    pub fn parse_canonical(s: &str) -> Result<Self, IdentifierError> {
        // Byte offsets below assume single-byte characters
        if !s.is_ascii() {
            return Err(IdentifierError(format!("{s:?}: expected yyyymm-nnnnn")));
        }
        let (period, seq) = s
            .split_once('-')
            .ok_or_else(|| IdentifierError(format!("{s:?}: expected yyyymm-nnnnn")))?;
        if period.len() != 6 || seq.len() != 5 {
            return Err(IdentifierError(format!("{s:?}: expected yyyymm-nnnnn")));
        }
        let year = parse_digits(&period[..4], "year", s)?;
        let month = parse_digits(&period[4..], "month", s)?;
        let sequence = parse_digits(seq, "sequence", s)?;
        Self::new(year, month, sequence)
    }

    /// Parse `yymm.nnnnn`, ignoring an `arXiv:` prefix and a `vN` suffix.
    pub fn parse_external(s: &str) -> Result<Self, IdentifierError> {
        let trimmed = s.trim();
        let bare = trimmed
            .strip_prefix("arXiv:")
            .or_else(|| trimmed.strip_prefix("arxiv:"))
            .unwrap_or(trimmed);
        let bare = strip_version(bare);
        if !bare.is_ascii() {
            return Err(IdentifierError(format!("{s:?}: expected yymm.nnnnn")));
        }
        let (period, seq) = bare
            .split_once('.')
            .ok_or_else(|| IdentifierError(format!("{s:?}: expected yymm.nnnnn")))?;
        if period.len() != 4 || !(4..=5).contains(&seq.len()) {
            return Err(IdentifierError(format!("{s:?}: expected yymm.nnnnn")));
        }
        let yy: u16 = parse_digits(&period[..2], "year", s)?;
        let month: u8 = parse_digits(&period[2..], "month", s)?;
        let year = 2000 + yy;
        if seq.len() != sequence_width(year, month) {
            return Err(IdentifierError(format!(
                "{s:?}: {}-digit sequence expected for {year}-{month:02}",
                sequence_width(year, month)
            )));
        }
        let sequence = parse_digits(seq, "sequence", s)?;
        Self::new(year, month, sequence)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Drop a trailing `vN` version suffix, if present.
fn strip_version(s: &str) -> &str {
    match s.rfind('v') {
        Some(pos)
            if pos + 1 < s.len() && s[pos + 1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            &s[..pos]
        }
        _ => s,
    }
}

/// Closed, ascending range of sequence numbers within one month.
///
/// Lazily materialized; iterating twice yields the same identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    year: u16,
    month: u8,
    from: u32,
    to: u32,
}

impl IdRange {
    pub fn new(from: i64, to: i64, year: u16, month: u8) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidRange { from, to, reason };
        check_period(year, month).map_err(|e| invalid(e.0))?;
        if from < 0 || to < 0 {
            return Err(invalid("bounds must be non-negative".to_string()));
        }
        if from > to {
            return Err(invalid("from must not exceed to".to_string()));
        }
        let max = i64::from(max_sequence(year, month));
        if to > max {
            return Err(invalid(format!(
                "{to} exceeds the {}-digit sequence for {year}-{month:02}",
                sequence_width(year, month)
            )));
        }
        Ok(Self {
            year,
            month,
            from: from as u32,
            to: to as u32,
        })
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn first(&self) -> Identifier {
        self.at(self.from)
    }

    pub fn last(&self) -> Identifier {
        self.at(self.to)
    }

    /// Number of identifiers (never zero).
    pub fn len(&self) -> usize {
        (self.to - self.from) as usize + 1
    }

    pub fn iter(&self) -> Iter {
        Iter {
            year: self.year,
            month: self.month,
            sequences: self.from..=self.to,
        }
    }

    fn at(&self, sequence: u32) -> Identifier {
        Identifier {
            year: self.year,
            month: self.month,
            sequence,
        }
    }
}

impl IntoIterator for IdRange {
    type Item = Identifier;
    type IntoIter = Iter;

    fn into_iter(self) -> Iter {
        self.iter()
    }
}

impl IntoIterator for &IdRange {
    type Item = Identifier;
    type IntoIter = Iter;

    fn into_iter(self) -> Iter {
        self.iter()
    }
}

/// Iterator over an [`IdRange`].
#[derive(Debug, Clone)]
pub struct Iter {
    year: u16,
    month: u8,
    sequences: RangeInclusive<u32>,
}

impl Iterator for Iter {
    type Item = Identifier;

    fn next(&mut self) -> Option<Identifier> {
        self.sequences.next().map(|sequence| Identifier {
            year: self.year,
            month: self.month,
            sequence,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.sequences.size_hint()
    }
}

/// Build the range `[from, to]` for `(year, month)`.
pub fn enumerate(from: i64, to: i64, year: u16, month: u8) -> Result<IdRange, ConfigError> {
    IdRange::new(from, to, year, month)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_and_external_forms() {
        let id = Identifier::new(2025, 10, 824).unwrap();
        assert_eq!(id.canonical(), "202510-00824");
        assert_eq!(id.external(), "2510.00824");
        assert_eq!(id.to_string(), "202510-00824");
    }

    #[test]
    fn pre_2015_external_uses_four_digits() {
        let id = Identifier::new(2014, 12, 42).unwrap();
        assert_eq!(id.external(), "1412.0042");
        assert_eq!(id.canonical(), "201412-00042");
        assert!(Identifier::new(2014, 12, 10_000).is_err());
        assert!(Identifier::new(2015, 1, 10_000).is_ok());
    }

    #[test]
    fn parse_round_trips() {
        let id = Identifier::new(2023, 10, 10000).unwrap();
        assert_eq!(Identifier::parse_canonical(&id.canonical()).unwrap(), id);
        assert_eq!(Identifier::parse_external(&id.external()).unwrap(), id);
    }

    #[test]
    fn parse_external_strips_version_and_prefix() {
        let id = Identifier::parse_external("arXiv:2510.00824v3").unwrap();
        assert_eq!(id.canonical(), "202510-00824");
        let old = Identifier::parse_external("0704.0001v1").unwrap();
        assert_eq!(old.canonical(), "200704-00001");
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "2510", "2510.8", "25a0.00001", "hep-th/9901001", "2513.00001"] {
            assert!(Identifier::parse_external(bad).is_err(), "{bad}");
        }
        for bad in ["202510", "202510-824", "20251000824", "199001-00001"] {
            assert!(Identifier::parse_canonical(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn parse_external_checks_width_for_period() {
        // 5-digit sequences only exist from 2015 on
        assert!(Identifier::parse_external("1412.00042").is_err());
        assert!(Identifier::parse_external("1501.0042").is_err());
    }

    #[test]
    fn ordering_is_chronological() {
        let a = Identifier::new(2024, 12, 99_999).unwrap();
        let b = Identifier::new(2025, 1, 1).unwrap();
        let c = Identifier::new(2025, 1, 2).unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn range_enumerates_in_order() {
        let range = enumerate(1, 3, 2025, 10).unwrap();
        let ids: Vec<String> = range.iter().map(|id| id.canonical()).collect();
        assert_eq!(ids, ["202510-00001", "202510-00002", "202510-00003"]);
        assert_eq!(range.len(), 3);
    }

    #[test]
    fn range_is_restartable() {
        let range = IdRange::new(10, 12, 2025, 10).unwrap();
        let first: Vec<_> = range.iter().collect();
        let second: Vec<_> = range.into_iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn single_element_range() {
        let range = IdRange::new(5, 5, 2025, 10).unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range.first(), range.last());
    }

    #[test]
    fn invalid_ranges_rejected() {
        assert!(matches!(
            IdRange::new(5, 1, 2025, 10),
            Err(ConfigError::InvalidRange { from: 5, to: 1, .. })
        ));
        assert!(IdRange::new(-1, 3, 2025, 10).is_err());
        assert!(IdRange::new(0, 100_000, 2025, 10).is_err());
        assert!(IdRange::new(0, 10_000, 2014, 10).is_err());
        assert!(IdRange::new(0, 1, 2025, 13).is_err());
        assert!(IdRange::new(0, 1, 1999, 1).is_err());
    }

    #[test]
    fn non_ascii_rejected_without_panic() {
        // Byte lengths match the expected shape, characters do not
        for bad in ["1é2.00001", "2510.0082é", "arXiv:25é.0001", "\u{1F600}.00001"] {
            assert!(Identifier::parse_external(bad).is_err(), "{bad}");
        }
        for bad in ["202é5-00001", "202510-0082é", "2025é-00001"] {
            assert!(Identifier::parse_canonical(bad).is_err(), "{bad}");
        }
    }
}
