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

//! The session token mechanism, `X-TOKEN`.
//!
//! The message has the same layout as PLAIN, but the secret is a session
//! token previously issued by another component of the installation. Since
//! the token is not a reusable password, the mechanism is offered whether or
//! not the transport is confidential.

use std::sync::Arc;

use log::warn;

use super::authenticator::Outcome;
use super::mechanism::Mechanism;
use super::plain::parse_credentials;
use super::user::{AuthenticatorUser, Credential};
use crate::support::log_prefix::LogPrefix;

/// The service which validates session tokens.
pub trait TokenVerifier: Send + Sync {
    /// Returns the identity that owns `token`, or `None` if the token is
    /// malformed, expired or revoked.
    fn verify_token(&self, token: &str) -> Option<String>;
}

pub(super) struct TokenState {
    verifier: Arc<dyn TokenVerifier>,
}

impl TokenState {
    pub(super) fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        TokenState { verifier }
    }

    pub(super) fn step(
        &self,
        data: &[u8],
        user: &mut dyn AuthenticatorUser,
        log_prefix: &LogPrefix,
    ) -> Outcome {
        let credentials = match parse_credentials(data) {
            Ok(c) => c,
            Err(why) => return Outcome::BadRequest(why),
        };

        let owner = match self.verifier.verify_token(credentials.secret) {
            Some(owner) => owner,
            None => {
                warn!(
                    "{} Rejected token for '{}'",
                    log_prefix, credentials.authentication_id
                );
                return Outcome::Failure;
            }
        };

        if owner.to_lowercase()
            != credentials.authentication_id.to_lowercase()
        {
            warn!(
                "{} Token belongs to '{}', not '{}'",
                log_prefix, owner, credentials.authentication_id
            );
            return Outcome::Failure;
        }

        match user.authenticate(
            credentials.authorization_id,
            credentials.authentication_id,
            Credential::Token,
            Mechanism::Token,
        ) {
            Some(principal) => Outcome::Success {
                principal,
                layer: None,
            },
            None => Outcome::Failure,
        }
    }
}
