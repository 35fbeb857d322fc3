//! Per-line-type statistics accumulated while reading or writing.

/// Statistics for one line type.
///
/// `count`, `max`, and `total` accumulate over the whole file; the group
/// figures are the maxima over all groups of the per-group deltas. A file's
/// header (or binary footer) carries one set of these as the declared
/// (`given`) values, while the session accumulates a second (`accum`) set
/// from the records actually seen.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    /// Number of records of this line type.
    pub count: i64,
    /// Maximum list length seen (0 if the line type carries no list).
    pub max: i64,
    /// Sum of list lengths seen.
    pub total: i64,
    /// Maximum number of records of this type within any single group.
    pub group_count: i64,
    /// Maximum summed list length of this type within any single group.
    pub group_total: i64,
}

impl Counts {
    /// Account for one record carrying a list of `len` elements.
    pub fn add_list(&mut self, len: i64) {
        self.total += len;
        if len > self.max {
            self.max = len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_list() {
        let mut c = Counts::default();
        c.add_list(5);
        c.add_list(3);
        assert_eq!(c.max, 5);
        assert_eq!(c.total, 8);
    }
}
