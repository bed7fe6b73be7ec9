//! HTTP method subset accepted by the API namespace.
//!
//! API route maps register handlers per method, but only for the four
//! methods convention-loaded route modules may export. Requests carrying any
//! other method never match an API route and fall through to a 404; they are
//! not rejected at the server level.

use std::fmt;
use std::str::FromStr;

/// A method an API route can be registered under.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get    => "GET",
            Self::Post   => "POST",
            Self::Put    => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// Parses an uppercase method string. Case-sensitive per RFC 9110 §9.1.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET"    => Ok(Self::Get),
            "POST"   => Ok(Self::Post),
            "PUT"    => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            _        => Err(()),
        }
    }
}

/// Conversion from the wire-level method type. Fails for methods the API
/// namespace cannot register (HEAD, PATCH, OPTIONS, ...).
impl TryFrom<&http::Method> for Method {
    type Error = ();

    fn try_from(m: &http::Method) -> Result<Self, Self::Error> {
        m.as_str().parse()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_four_registerable_methods() {
        assert_eq!("GET".parse(), Ok(Method::Get));
        assert_eq!("POST".parse(), Ok(Method::Post));
        assert_eq!("PUT".parse(), Ok(Method::Put));
        assert_eq!("DELETE".parse(), Ok(Method::Delete));
    }

    #[test]
    fn rejects_everything_else() {
        assert_eq!(Method::from_str("HEAD"), Err(()));
        assert_eq!(Method::from_str("PATCH"), Err(()));
        assert_eq!(Method::from_str("get"), Err(()));
    }

    #[test]
    fn converts_from_wire_method() {
        assert_eq!(Method::try_from(&http::Method::GET), Ok(Method::Get));
        assert!(Method::try_from(&http::Method::OPTIONS).is_err());
    }
}
