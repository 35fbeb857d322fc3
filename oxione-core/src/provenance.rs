//! Provenance and reference records carried in file headers.

/// One `!` provenance line: which program wrote the file, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// Program name.
    pub program: String,
    /// Program version.
    pub version: String,
    /// Command line used.
    pub command: String,
    /// Local timestamp, `%F_%T`.
    pub date: String,
}

/// One `<` reference line (an input this file was derived from) or one `>`
/// deferred line (an output that accompanies this file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Referenced file name.
    pub filename: String,
    /// Object count of the referenced file (0 for deferred lines).
    pub count: i64,
}
