//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.

//! The interface between the authenticator and the protocol handler that owns
//! it.

use std::fmt;
use std::io;

use super::mechanism::Mechanism;
use crate::layer::context::Qop;

/// A directory principal that an exchange resolved to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Principal {
    /// Stable identifier of the account.
    pub id: String,
    /// The name the account logs in with.
    pub name: String,
}

impl Principal {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Principal {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// What a mechanism proved about the authentication identity.
#[derive(Clone, Copy)]
pub enum Credential<'a> {
    /// A password, which must still be checked against the directory.
    Password(&'a str),
    /// A session token which the token verifier has already accepted as
    /// belonging to the authentication identity.
    Token,
    /// The security-context provider established a context for the
    /// authentication identity at the given QOP.
    SecurityContext { qop: Qop },
}

impl Credential<'_> {
    /// Whether the identity has already been proven by the mechanism, so the
    /// directory does not need to check anything further.
    pub fn is_asserted(&self) -> bool {
        match *self {
            Credential::Password(..) => false,
            Credential::Token | Credential::SecurityContext { .. } => true,
        }
    }
}

impl fmt::Debug for Credential<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Credential::Password(..) => f.write_str("Password(..)"),
            Credential::Token => f.write_str("Token"),
            Credential::SecurityContext { qop } => {
                write!(f, "SecurityContext({})", qop)
            }
        }
    }
}

/// Implemented by the protocol handler driving an `Authenticator`.
///
/// The `send_*` methods write the corresponding protocol response (e.g. an
/// IMAP `+` continuation, tagged `OK`, `NO` or `BAD`). Errors from them are
/// transport errors and are passed straight back to the caller of the
/// authenticator.
pub trait AuthenticatorUser {
    /// The name of the line protocol (e.g. `imap`).
    fn protocol(&self) -> &str;

    /// Send a challenge, already base64-encoded.
    fn send_continuation(&mut self, challenge: &str) -> io::Result<()>;
    fn send_success(&mut self, message: &str) -> io::Result<()>;
    fn send_failure(&mut self, message: &str) -> io::Result<()>;
    fn send_bad_request(&mut self, message: &str) -> io::Result<()>;

    /// Whether the connection already has confidentiality, e.g. from TLS.
    fn is_transport_confidential(&self) -> bool;

    /// Whether passwords may be sent on this connection even without
    /// transport confidentiality.
    fn allows_clear_text_credentials(&self) -> bool;

    /// Resolve and authorise the identities of a completed exchange.
    ///
    /// This is normally implemented by delegating to an
    /// `AuthorizationResolver`. Returns the principal the connection acts as,
    /// or `None` if authentication fails for any reason.
    fn authenticate(
        &mut self,
        authorization_id: &str,
        authentication_id: &str,
        credential: Credential<'_>,
        mechanism: Mechanism,
    ) -> Option<Principal>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn password_is_not_printed() {
        let s = format!("{:?}", Credential::Password("hunter2"));
        assert!(!s.contains("hunter2"));
        assert_eq!(
            "SecurityContext(auth-int)",
            format!("{:?}", Credential::SecurityContext { qop: Qop::AuthInt })
        );
    }

    #[test]
    fn asserted_credentials() {
        assert!(!Credential::Password("x").is_asserted());
        assert!(Credential::Token.is_asserted());
        assert!(Credential::SecurityContext { qop: Qop::Auth }.is_asserted());
    }
}
