//! Redirection and cluster error classification
//!
//! Pure predicates over the error text the store reports, plus extraction of
//! the redirect target from MOVED/ASK payloads. Classification goes by the
//! fixed uppercase token the message starts with, never by substring.

/// Redirect information parsed from a MOVED/ASK error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectInfo {
    /// Slot the redirection is about
    pub slot: u16,
    /// Target host
    pub host: String,
    /// Target port
    pub port: u16,
    /// Whether this is an ASK redirect (requires the ASKING handshake)
    pub is_ask: bool,
}

impl RedirectInfo {
    /// Parse from an error like "MOVED 3999 127.0.0.1:7001" or "ASK 3999 127.0.0.1:7001"
    pub fn parse(error_msg: &str) -> Option<Self> {
        let parts: Vec<&str> = error_msg.split_whitespace().collect();
        if parts.len() < 3 {
            return None;
        }

        let is_ask = parts[0] == "ASK";
        if !is_ask && parts[0] != "MOVED" {
            return None;
        }

        let slot: u16 = parts[1].parse().ok()?;
        let (host, port_str) = parts[2].rsplit_once(':')?;
        let port: u16 = port_str.parse().ok()?;

        Some(Self {
            slot,
            host: host.to_string(),
            port,
            is_ask,
        })
    }

    /// Target as a "host:port" address
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Permanent relocation: the asking node no longer owns the slot
pub fn is_moved(error_msg: &str) -> bool {
    has_token(error_msg, "MOVED")
}

/// Transient one-shot relocation during slot migration
pub fn is_ask(error_msg: &str) -> bool {
    has_token(error_msg, "ASK")
}

/// Caller combined keys from different slots in one request
pub fn is_cross_slot(error_msg: &str) -> bool {
    has_token(error_msg, "CROSSSLOT")
}

/// Cluster is mid-resharding; the caller should back off and retry
pub fn is_try_again(error_msg: &str) -> bool {
    has_token(error_msg, "TRYAGAIN")
}

/// Token prefix match: the message is the token, or the token followed by a space
fn has_token(msg: &str, token: &str) -> bool {
    match msg.strip_prefix(token) {
        Some(rest) => rest.is_empty() || rest.starts_with(' '),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_moved() {
        let info = RedirectInfo::parse("MOVED 3999 127.0.0.1:7001").unwrap();
        assert_eq!(info.slot, 3999);
        assert_eq!(info.host, "127.0.0.1");
        assert_eq!(info.port, 7001);
        assert!(!info.is_ask);
        assert_eq!(info.addr(), "127.0.0.1:7001");
    }

    #[test]
    fn test_parse_ask() {
        let info = RedirectInfo::parse("ASK 1234 10.0.0.5:6380").unwrap();
        assert_eq!(info.slot, 1234);
        assert_eq!(info.host, "10.0.0.5");
        assert_eq!(info.port, 6380);
        assert!(info.is_ask);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(RedirectInfo::parse("ERR unknown command").is_none());
        assert!(RedirectInfo::parse("MOVED").is_none());
        assert!(RedirectInfo::parse("MOVED 123").is_none());
        assert!(RedirectInfo::parse("MOVED 123 noport").is_none());
        assert!(RedirectInfo::parse("MOVED notaslot 127.0.0.1:7001").is_none());
    }

    #[test]
    fn test_cross_slot_classification() {
        assert!(is_cross_slot(
            "CROSSSLOT Keys in request don't hash to the same slot"
        ));
        assert!(!is_cross_slot("ERR unknown command"));
        assert!(!is_cross_slot("CROSSSLOTS nope"));
        assert!(!is_try_again("CROSSSLOT Keys in request don't hash to the same slot"));
    }

    #[test]
    fn test_try_again_classification() {
        assert!(is_try_again("TRYAGAIN Multiple keys request during rehashing of slot"));
        assert!(!is_try_again("ERR something"));
        assert!(!is_cross_slot("TRYAGAIN Multiple keys request during rehashing of slot"));
    }

    #[test]
    fn test_moved_ask_exclusive() {
        assert!(is_moved("MOVED 3999 127.0.0.1:7001"));
        assert!(!is_ask("MOVED 3999 127.0.0.1:7001"));
        assert!(is_ask("ASK 3999 127.0.0.1:7001"));
        assert!(!is_moved("ASK 3999 127.0.0.1:7001"));
        // ASKING is a command, not a redirect notice
        assert!(!is_ask("ASKING required"));
    }

    #[test]
    fn test_generic_errors_classify_as_nothing() {
        for msg in ["ERR unknown command", "WRONGTYPE Operation", "connection reset"] {
            assert!(!is_moved(msg));
            assert!(!is_ask(msg));
            assert!(!is_cross_slot(msg));
            assert!(!is_try_again(msg));
        }
    }
}
