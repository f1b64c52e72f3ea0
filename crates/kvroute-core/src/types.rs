//! Per-call diagnostics and successful replies.

/// Best-effort diagnostics for one call.
///
/// Fields hold `-1` / empty when the value was not available, e.g. on a
/// transport failure. `decree` is only meaningful for writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalInfo {
    pub app_id: i32,
    pub partition_index: i32,
    pub decree: i64,
    pub server: String,
}

impl Default for InternalInfo {
    fn default() -> Self {
        Self {
            app_id: -1,
            partition_index: -1,
            decree: -1,
            server: String::new(),
        }
    }
}

impl InternalInfo {
    /// True when no field was populated.
    pub fn is_unknown(&self) -> bool {
        *self == Self::default()
    }
}

/// Successful result of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<T> {
    pub value: T,
    pub info: InternalInfo,
}

impl<T> Reply<T> {
    pub fn new(value: T, info: InternalInfo) -> Self {
        Self { value, info }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        Reply { value: f(self.value), info: self.info }
    }
}

/// Records returned by a bounded multi-read.
///
/// `complete` is false when `max_fetch_count` or `max_fetch_size` cut the
/// fetch short; `values` still holds everything read up to that point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched<T> {
    pub values: T,
    pub complete: bool,
}
