//! Request method for resource operations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The four resource methods the engine dispatches on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// All methods, in dispatch-table order.
    pub const ALL: [Method; 4] = [Method::Get, Method::Post, Method::Put, Method::Delete];

    /// Index into a per-method slot table.
    pub fn index(self) -> usize {
        match self {
            Method::Get => 0,
            Method::Post => 1,
            Method::Put => 2,
            Method::Delete => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            other => Err(crate::Error::BadRequest {
                message: format!("unknown method: {}", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for method in Method::ALL {
            assert_eq!(method.as_str().parse::<Method>().unwrap(), method);
        }
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
    }

    #[test]
    fn unknown_method_is_bad_request() {
        let err = "PATCH".parse::<Method>().unwrap_err();
        assert!(matches!(err, crate::Error::BadRequest { .. }));
    }

    #[test]
    fn indices_are_distinct() {
        let mut seen = [false; 4];
        for method in Method::ALL {
            assert!(!seen[method.index()]);
            seen[method.index()] = true;
        }
    }
}
