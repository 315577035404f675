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

//! The set of mechanisms a server supports, and which of them may be used on
//! a particular connection.

use std::fmt;
use std::sync::Arc;

use super::authenticator::{Authenticator, MechanismState};
use super::gssapi::GssapiState;
use super::plain::{self, PlainState};
use super::token::{TokenState, TokenVerifier};
use super::user::AuthenticatorUser;
use crate::layer::context::SecurityContextProvider;
use crate::support::system_config::SaslConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mechanism {
    /// RFC 4616 PLAIN: a password sent in the clear.
    Plain,
    /// A session token previously issued by this installation, in the same
    /// format as PLAIN.
    Token,
    /// RFC 4752 GSSAPI, i.e., Kerberos.
    Gssapi,
}

impl Mechanism {
    /// Every mechanism, in the order they are advertised.
    pub const ALL: [Mechanism; 3] =
        [Mechanism::Plain, Mechanism::Gssapi, Mechanism::Token];

    pub fn name(self) -> &'static str {
        match self {
            Mechanism::Plain => "PLAIN",
            Mechanism::Token => "X-TOKEN",
            Mechanism::Gssapi => "GSSAPI",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Mechanism::ALL
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The mechanisms a server supports, along with the collaborators they need.
///
/// A mechanism whose collaborator is not configured is treated as disabled.
pub struct Mechanisms {
    config: SaslConfig,
    token_verifier: Option<Arc<dyn TokenVerifier>>,
    context_provider: Option<Arc<dyn SecurityContextProvider>>,
}

impl Mechanisms {
    pub fn new(config: SaslConfig) -> Self {
        Mechanisms {
            config,
            token_verifier: None,
            context_provider: None,
        }
    }

    pub fn with_token_verifier(
        mut self,
        token_verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        self.token_verifier = Some(token_verifier);
        self
    }

    pub fn with_context_provider(
        mut self,
        context_provider: Arc<dyn SecurityContextProvider>,
    ) -> Self {
        self.context_provider = Some(context_provider);
        self
    }

    pub fn config(&self) -> &SaslConfig {
        &self.config
    }

    /// Whether `mechanism` may be used on the connection of `user`.
    pub fn is_usable(
        &self,
        mechanism: Mechanism,
        user: &dyn AuthenticatorUser,
    ) -> bool {
        self.config.is_enabled(mechanism.name())
            && match mechanism {
                Mechanism::Plain => plain::is_available(
                    user,
                    self.config.allow_cleartext_login,
                ),
                Mechanism::Token => self.token_verifier.is_some(),
                Mechanism::Gssapi => self.context_provider.is_some(),
            }
    }

    /// Create an authenticator for the mechanism called `name`.
    ///
    /// Returns `None` if there is no such mechanism or it cannot be used on
    /// this connection, in which case the handler should respond that the
    /// mechanism is not supported.
    pub fn authenticator(
        &self,
        name: &str,
        user: &dyn AuthenticatorUser,
    ) -> Option<Authenticator> {
        let mechanism = Mechanism::from_name(name)?;
        if !self.is_usable(mechanism, user) {
            return None;
        }

        let state = match mechanism {
            Mechanism::Plain => MechanismState::Plain(PlainState::new(
                self.config.allow_cleartext_login,
            )),
            Mechanism::Token => MechanismState::Token(TokenState::new(
                Arc::clone(self.token_verifier.as_ref()?),
            )),
            Mechanism::Gssapi => MechanismState::Gssapi(GssapiState::new(
                Arc::clone(self.context_provider.as_ref()?),
                self.config.gssapi.clone(),
            )),
        };

        Some(Authenticator::new(user.protocol(), state))
    }

    /// The mechanisms to list in the capabilities of `user`'s connection.
    pub fn advertised(&self, user: &dyn AuthenticatorUser) -> Vec<Mechanism> {
        Mechanism::ALL
            .iter()
            .copied()
            .filter(|&m| self.is_usable(m, user))
            .filter(|m| !self.config.is_hidden(m.name()))
            .collect()
    }

    /// Format the advertised mechanisms as IMAP `AUTH=` capabilities, each
    /// preceded by a space.
    pub fn capability_string(&self, user: &dyn AuthenticatorUser) -> String {
        self.advertised(user)
            .into_iter()
            .map(|m| format!(" AUTH={}", m))
            .collect()
    }

    /// Format the advertised mechanisms for a POP3 `SASL` capability, each
    /// preceded by a space.
    pub fn sasl_capability_string(
        &self,
        user: &dyn AuthenticatorUser,
    ) -> String {
        self.advertised(user)
            .into_iter()
            .map(|m| format!(" {}", m))
            .collect()
    }
}
