//! Fixed windows enforced by the interceptor.

/// Name segment shared by every built-in window key.
pub const REQUESTS: &str = "requests";

pub const DEFAULT_HOURLY_LIMIT: i64 = 6000;
pub const DEFAULT_MINUTE_LIMIT: i64 = 200;
pub const DEFAULT_SECOND_LIMIT: i64 = 20;

fn enabled(limit: i64) -> Option<u64> {
    u64::try_from(limit).ok().filter(|l| *l > 0)
}

/// One fixed window: a name segment, its length and its threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub name: String,
    pub interval_seconds: u64,
    pub threshold: u64,
}

impl Window {
    pub fn new(name: impl Into<String>, interval_seconds: u64, threshold: u64) -> Self {
        Self { name: name.into(), interval_seconds, threshold }
    }

    pub fn hourly(threshold: u64) -> Self {
        Self::new("hourly", 3600, threshold)
    }

    pub fn minute(threshold: u64) -> Self {
        Self::new("minute", 60, threshold)
    }

    pub fn second(threshold: u64) -> Self {
        Self::new("second", 1, threshold)
    }
}

/// Ordered set of windows checked for every request.
///
/// Windows are evaluated in order and the first one exceeded rejects the
/// request. Disabled windows are simply absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowLimits {
    windows: Vec<Window>,
}

impl Default for WindowLimits {
    fn default() -> Self {
        Self::standard(DEFAULT_HOURLY_LIMIT, DEFAULT_MINUTE_LIMIT, DEFAULT_SECOND_LIMIT)
    }
}

impl WindowLimits {
    /// Hourly, per-minute and per-second windows, in that order. A limit
    /// `<= 0` disables its window.
    pub fn standard(hourly: i64, minute: i64, second: i64) -> Self {
        let windows = [
            enabled(hourly).map(Window::hourly),
            enabled(minute).map(Window::minute),
            enabled(second).map(Window::second),
        ]
        .into_iter()
        .flatten()
        .collect();
        Self { windows }
    }

    /// Arbitrary windows. Windows with a zero interval are dropped.
    pub fn custom(windows: impl IntoIterator<Item = Window>) -> Self {
        Self { windows: windows.into_iter().filter(|w| w.interval_seconds > 0).collect() }
    }

    /// No limits at all.
    pub fn disabled() -> Self {
        Self { windows: Vec::new() }
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
