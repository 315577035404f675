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

//! The PLAIN mechanism (RFC 4616), and the message format it shares with the
//! session token mechanism.

use log::warn;
use memchr::memchr;
use secstr::SecStr;

use super::authenticator::Outcome;
use super::mechanism::Mechanism;
use super::user::{AuthenticatorUser, Credential};
use crate::support::log_prefix::LogPrefix;

/// A decoded `authzid NUL authcid NUL secret` message.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Credentials<'a> {
    /// The identity to act as. Empty to act as `authentication_id`.
    pub authorization_id: &'a str,
    pub authentication_id: &'a str,
    pub secret: &'a str,
}

/// Split a PLAIN-format message into its three fields.
///
/// There must be exactly two NULs, and every field must be valid UTF-8. The
/// authentication identity must not be empty. On failure, returns a message
/// suitable for a bad-request response.
pub fn parse_credentials(
    data: &[u8],
) -> Result<Credentials<'_>, &'static str> {
    const MALFORMED: &str = "Malformed credentials";

    let first = memchr(0, data).ok_or(MALFORMED)?;
    let rest = &data[first + 1..];
    let second = memchr(0, rest).ok_or(MALFORMED)?;
    let secret = &rest[second + 1..];
    if memchr(0, secret).is_some() {
        return Err(MALFORMED);
    }

    let credentials = Credentials {
        authorization_id: utf8(&data[..first])?,
        authentication_id: utf8(&rest[..second])?,
        secret: utf8(secret)?,
    };

    if credentials.authentication_id.is_empty() {
        return Err("Missing authentication identity");
    }

    Ok(credentials)
}

fn utf8(s: &[u8]) -> Result<&str, &'static str> {
    std::str::from_utf8(s).map_err(|_| "Bad UTF-8")
}

/// Whether PLAIN may be used on the connection of `user`.
pub(super) fn is_available(
    user: &dyn AuthenticatorUser,
    allow_cleartext_login: bool,
) -> bool {
    user.is_transport_confidential()
        || user.allows_clear_text_credentials()
        || allow_cleartext_login
}

pub(super) struct PlainState {
    allow_cleartext_login: bool,
}

impl PlainState {
    pub(super) fn new(allow_cleartext_login: bool) -> Self {
        PlainState {
            allow_cleartext_login,
        }
    }

    pub(super) fn initialize(
        &self,
        user: &dyn AuthenticatorUser,
        log_prefix: &LogPrefix,
    ) -> bool {
        if is_available(user, self.allow_cleartext_login) {
            true
        } else {
            warn!(
                "{} Refusing PLAIN without transport confidentiality",
                log_prefix
            );
            false
        }
    }

    pub(super) fn step(
        &self,
        data: &[u8],
        user: &mut dyn AuthenticatorUser,
    ) -> Outcome {
        // Keep the decoded password out of swappable memory and zero it once
        // we're done.
        let message = SecStr::from(data.to_vec());
        let credentials = match parse_credentials(message.unsecure()) {
            Ok(c) => c,
            Err(why) => return Outcome::BadRequest(why),
        };

        match user.authenticate(
            credentials.authorization_id,
            credentials.authentication_id,
            Credential::Password(credentials.secret),
            Mechanism::Plain,
        ) {
            Some(principal) => Outcome::Success {
                principal,
                layer: None,
            },
            None => Outcome::Failure,
        }
    }
}
