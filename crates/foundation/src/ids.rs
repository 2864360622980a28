/// Identifies one issued image fetch.
///
/// Tokens are strictly increasing; a completion carrying anything other than
/// the current token is stale and must not be rendered.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn new(n: u64) -> Self {
        RequestToken(n)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic source of [`RequestToken`]s.
#[derive(Debug, Default)]
pub struct TokenAllocator {
    last: u64,
}

impl TokenAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> RequestToken {
        self.last += 1;
        RequestToken(self.last)
    }

    /// The most recently issued token, if any.
    pub fn current(&self) -> Option<RequestToken> {
        (self.last > 0).then_some(RequestToken(self.last))
    }
}
