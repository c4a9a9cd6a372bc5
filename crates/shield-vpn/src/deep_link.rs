//! Deep links opened by the OS (widget buttons, live activity actions)

use url::Url;

/// Recognised deep link actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeepLink {
    /// Tear the tunnel down (`<scheme>://disconnect`)
    Disconnect,
}

impl DeepLink {
    /// Parse a deep link URL; the scheme is not checked
    pub fn parse(input: &str) -> Option<Self> {
        let url = Url::parse(input).ok()?;

        match url.host_str()? {
            host if host.eq_ignore_ascii_case("disconnect") => Some(DeepLink::Disconnect),
            _ => None,
        }
    }
}
