//! SOA authority configuration.

use crate::error::Error;

const DEFAULT_REFRESH: u32 = 2 * 60 * 60;
const DEFAULT_RETRY: u32 = 15 * 60;
const DEFAULT_EXPIRE: u32 = 14 * 24 * 60 * 60;
const DEFAULT_MIN_TTL: u32 = 60 * 60;
const DEFAULT_TTL: u32 = 60 * 60;

/// SOA record settings. The default value implies no authority. If `ns` is
/// specified, the server answers authoritatively and `mbox` is also
/// required. Unset numeric fields are filled with conservative defaults.
#[derive(Debug, Clone, Default)]
pub struct Soa {
    /// Primary name server, as a dot-terminated FQDN.
    pub ns: String,
    /// Responsible party in mbox form; see [`email_mbox`].
    pub mbox: String,

    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub min_ttl: u32,
    pub ttl: u32,
}

impl Soa {
    /// Validate and fill unset fields.
    pub(crate) fn init(&mut self) -> Result<(), Error> {
        if !self.ns.is_empty() {
            if self.mbox.is_empty() {
                return Err(Error::SoaWithoutMbox);
            }

            if self.refresh == 0 {
                self.refresh = DEFAULT_REFRESH;
            }
            if self.retry == 0 {
                self.retry = DEFAULT_RETRY;
            }
            if self.expire == 0 {
                self.expire = DEFAULT_EXPIRE;
            }
            if self.min_ttl == 0 {
                self.min_ttl = DEFAULT_MIN_TTL;
            }
            if self.ttl == 0 {
                self.ttl = DEFAULT_TTL;
            }
        }

        Ok(())
    }

    pub(crate) fn authority(&self) -> bool {
        !self.ns.is_empty()
    }
}

/// Convert "admin@example.org" to "admin.example.org." etc. Rejects
/// addresses whose local part contains a '.'. The empty string is passed
/// through.
pub fn email_mbox(email: &str) -> Result<String, Error> {
    let mbox = match email.find('@') {
        Some(at) => {
            if email[..at].contains('.') {
                return Err(Error::InvalidMboxEmail(email.to_string()));
            }
            email.replacen('@', ".", 1)
        }
        None => email.to_string(),
    };
    Ok(dot_suffix(&mbox))
}

/// Ensure the name has a dot suffix, unless it is the empty string.
pub fn dot_suffix(name: &str) -> String {
    if name.is_empty() || name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_fills_defaults() {
        let mut soa = Soa {
            ns: "ns.example.net.".to_string(),
            mbox: "hostmaster.example.net.".to_string(),
            ..Soa::default()
        };
        soa.init().unwrap();
        assert!(soa.authority());
        assert_eq!(soa.refresh, 7200);
        assert_eq!(soa.retry, 900);
        assert_eq!(soa.expire, 1_209_600);
        assert_eq!(soa.min_ttl, 3600);
        assert_eq!(soa.ttl, 3600);
    }

    #[test]
    fn init_keeps_explicit_values() {
        let mut soa = Soa {
            ns: "ns.example.net.".to_string(),
            mbox: "hostmaster.example.net.".to_string(),
            refresh: 60,
            ..Soa::default()
        };
        soa.init().unwrap();
        assert_eq!(soa.refresh, 60);
        assert_eq!(soa.retry, 900);
    }

    #[test]
    fn ns_without_mbox_is_an_error() {
        let mut soa = Soa {
            ns: "ns.example.net.".to_string(),
            ..Soa::default()
        };
        assert!(matches!(soa.init(), Err(Error::SoaWithoutMbox)));
    }

    #[test]
    fn default_value_has_no_authority() {
        let mut soa = Soa::default();
        soa.init().unwrap();
        assert!(!soa.authority());
        assert_eq!(soa.refresh, 0);
    }

    #[test]
    fn email_mbox_conversion() {
        assert_eq!(
            email_mbox("admin@example.org").unwrap(),
            "admin.example.org."
        );
        assert_eq!(
            email_mbox("hostmaster.example.org").unwrap(),
            "hostmaster.example.org."
        );
        assert_eq!(email_mbox("").unwrap(), "");
        assert!(matches!(
            email_mbox("user.name@example.org"),
            Err(Error::InvalidMboxEmail(_))
        ));
    }

    #[test]
    fn dot_suffix_cases() {
        assert_eq!(dot_suffix("example.org"), "example.org.");
        assert_eq!(dot_suffix("example.org."), "example.org.");
        assert_eq!(dot_suffix(""), "");
    }
}
