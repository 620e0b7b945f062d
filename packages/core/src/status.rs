//! Canonical response status registry.
//!
//! The hosted apps historically spelled status codes two ways: as the raw
//! registry byte (`class << 5 | detail`, e.g. 69) and as the dotted form
//! (e.g. "2.05"). This module fixes one canonical enumeration and an
//! explicit conversion table between the three spellings. Unknown codes are
//! rejected, never guessed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    // 2.xx success class
    Created,
    Deleted,
    Valid,
    Changed,
    Content,
    // 4.xx client error class
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    // 5.xx server error class
    InternalServerError,
    GatewayTimeout,
}

impl Status {
    /// The conversion table: (status, registry byte, dotted form).
    const TABLE: [(Status, u8, &'static str); 12] = [
        (Status::Created, 65, "2.01"),
        (Status::Deleted, 66, "2.02"),
        (Status::Valid, 67, "2.03"),
        (Status::Changed, 68, "2.04"),
        (Status::Content, 69, "2.05"),
        (Status::BadRequest, 128, "4.00"),
        (Status::Unauthorized, 129, "4.01"),
        (Status::Forbidden, 131, "4.03"),
        (Status::NotFound, 132, "4.04"),
        (Status::MethodNotAllowed, 133, "4.05"),
        (Status::InternalServerError, 160, "5.00"),
        (Status::GatewayTimeout, 164, "5.04"),
    ];

    /// The raw registry byte (`class << 5 | detail`).
    pub fn registry_code(self) -> u8 {
        Self::TABLE
            .iter()
            .find(|(s, _, _)| *s == self)
            .map(|(_, code, _)| *code)
            .unwrap_or_else(|| unreachable!("status missing from table"))
    }

    /// The dotted `class.detail` rendering.
    pub fn dotted(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(s, _, _)| *s == self)
            .map(|(_, _, dotted)| *dotted)
            .unwrap_or_else(|| unreachable!("status missing from table"))
    }

    /// Look up a status by its raw registry byte.
    pub fn from_registry_code(code: u8) -> Result<Status, crate::Error> {
        Self::TABLE
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|(s, _, _)| *s)
            .ok_or_else(|| crate::Error::BadRequest {
                message: format!("unknown status code: {}", code),
            })
    }

    /// Look up a status by its dotted rendering, e.g. `"2.05"`.
    pub fn from_dotted(dotted: &str) -> Result<Status, crate::Error> {
        Self::TABLE
            .iter()
            .find(|(_, _, d)| *d == dotted)
            .map(|(s, _, _)| *s)
            .ok_or_else(|| crate::Error::BadRequest {
                message: format!("unknown status code: {}", dotted),
            })
    }

    /// True for the 2.xx class.
    pub fn is_success(self) -> bool {
        self.registry_code() >> 5 == 2
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dotted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_round_trips_both_spellings() {
        for (status, code, dotted) in Status::TABLE {
            assert_eq!(status.registry_code(), code);
            assert_eq!(status.dotted(), dotted);
            assert_eq!(Status::from_registry_code(code).unwrap(), status);
            assert_eq!(Status::from_dotted(dotted).unwrap(), status);
        }
    }

    #[test]
    fn content_is_sixty_nine() {
        assert_eq!(Status::Content.registry_code(), 69);
        assert_eq!(Status::from_registry_code(69).unwrap(), Status::Content);
        assert_eq!(Status::Content.to_string(), "2.05");
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert!(Status::from_registry_code(42).is_err());
        assert!(Status::from_dotted("9.99").is_err());
    }

    #[test]
    fn success_classification() {
        assert!(Status::Created.is_success());
        assert!(Status::Content.is_success());
        assert!(!Status::NotFound.is_success());
        assert!(!Status::InternalServerError.is_success());
    }
}
