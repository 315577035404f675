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

//! The per-connection authentication state machine.
//!
//! An `Authenticator` is obtained from `Mechanisms::authenticator`. The
//! protocol handler then calls `initialize()` once, and feeds each decoded
//! client response to `handle()` until `is_complete()`. Every outcome,
//! including malformed input, is reported to the peer through the
//! `AuthenticatorUser`; the only errors returned are transport errors from
//! sending those responses.
//!
//! The mechanisms differ only in how they turn a client message into an
//! `Outcome`. Everything else (the completion flags, logging, responses, and
//! releasing the security context) is handled here.

use std::io;

use log::{debug, info};

use super::gssapi::GssapiState;
use super::mechanism::Mechanism;
use super::plain::PlainState;
use super::response::ClientResponse;
use super::token::TokenState;
use super::user::{AuthenticatorUser, Principal};
use crate::layer::context::Qop;
use crate::layer::security::SecurityLayer;
use crate::support::log_prefix::LogPrefix;

const MSG_UNSUPPORTED: &str = "mechanism not supported";
const MSG_SUCCESS: &str = "authentication successful";
const MSG_FAILED: &str = "authentication failed";

pub(super) enum MechanismState {
    Plain(PlainState),
    Token(TokenState),
    Gssapi(GssapiState),
}

impl MechanismState {
    fn mechanism(&self) -> Mechanism {
        match *self {
            MechanismState::Plain(..) => Mechanism::Plain,
            MechanismState::Token(..) => Mechanism::Token,
            MechanismState::Gssapi(..) => Mechanism::Gssapi,
        }
    }

    fn release(&mut self) {
        if let MechanismState::Gssapi(ref mut state) = *self {
            state.release();
        }
    }
}

/// The result of one step of a mechanism.
#[derive(Debug)]
pub(super) enum Outcome {
    /// Send the given challenge and wait for another response.
    Challenge(Vec<u8>),
    /// The exchange succeeded.
    Success {
        principal: Principal,
        layer: Option<SecurityLayer>,
    },
    /// Authentication failed. Details have already been logged.
    Failure,
    /// The client's message could not be understood.
    BadRequest(&'static str),
}

pub struct Authenticator {
    mechanism: Mechanism,
    protocol: String,
    log_prefix: LogPrefix,
    state: MechanismState,
    initialized: bool,
    complete: bool,
    authenticated: bool,
    principal: Option<Principal>,
    security_layer: Option<SecurityLayer>,
}

impl Authenticator {
    pub(super) fn new(protocol: &str, state: MechanismState) -> Self {
        let mechanism = state.mechanism();
        let log_prefix = LogPrefix::new(protocol.to_owned());
        log_prefix.set_mechanism(mechanism.name().to_owned());

        Authenticator {
            mechanism,
            protocol: protocol.to_owned(),
            log_prefix,
            state,
            initialized: false,
            complete: false,
            authenticated: false,
            principal: None,
            security_layer: None,
        }
    }

    pub fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// The prefix used for all log messages about this exchange.
    ///
    /// The handler may add the peer address to it.
    pub fn log_prefix(&self) -> &LogPrefix {
        &self.log_prefix
    }

    /// Perform mechanism-specific setup.
    ///
    /// If the mechanism cannot run on this connection, a "mechanism not
    /// supported" failure is sent, the exchange completes unauthenticated,
    /// and this returns `false`.
    ///
    /// Panics if called more than once.
    pub fn initialize(
        &mut self,
        user: &mut dyn AuthenticatorUser,
    ) -> io::Result<bool> {
        assert!(!self.initialized, "Authenticator initialised twice");
        self.initialized = true;

        let available = match self.state {
            MechanismState::Plain(ref state) => {
                state.initialize(user, &self.log_prefix)
            }
            MechanismState::Token(..) => true,
            MechanismState::Gssapi(ref mut state) => {
                state.initialize(&self.protocol, user, &self.log_prefix)
            }
        };

        if !available {
            debug!("{} Mechanism unavailable", self.log_prefix);
            self.complete = true;
            self.state.release();
            user.send_failure(MSG_UNSUPPORTED)?;
        }

        Ok(available)
    }

    /// Process one decoded message from the client.
    ///
    /// Panics if the exchange is already complete or `initialize()` has not
    /// been called.
    pub fn handle(
        &mut self,
        data: &[u8],
        user: &mut dyn AuthenticatorUser,
    ) -> io::Result<()> {
        assert!(!self.complete, "handle() called on completed exchange");
        assert!(self.initialized, "handle() called before initialize()");

        let outcome = match self.state {
            MechanismState::Plain(ref state) => state.step(data, user),
            MechanismState::Token(ref state) => {
                state.step(data, user, &self.log_prefix)
            }
            MechanismState::Gssapi(ref mut state) => {
                state.step(data, user, &self.log_prefix)
            }
        };

        self.apply(outcome, user)
    }

    /// Process one undecoded response line from the client.
    ///
    /// This handles the client aborting the exchange and invalid base64 as
    /// bad requests, and otherwise passes the decoded data to `handle()`.
    pub fn handle_line(
        &mut self,
        line: &[u8],
        user: &mut dyn AuthenticatorUser,
    ) -> io::Result<()> {
        assert!(!self.complete, "handle_line() called on completed exchange");

        match ClientResponse::parse(line) {
            Ok(ClientResponse::Data(data)) => self.handle(&data, user),
            Ok(ClientResponse::Abort) => {
                self.apply(Outcome::BadRequest("AUTHENTICATE aborted"), user)
            }
            Err(_) => self.apply(Outcome::BadRequest("Bad base64"), user),
        }
    }

    fn apply(
        &mut self,
        outcome: Outcome,
        user: &mut dyn AuthenticatorUser,
    ) -> io::Result<()> {
        match outcome {
            Outcome::Challenge(challenge) => {
                user.send_continuation(&base64::encode(&challenge))
            }

            Outcome::Success { principal, layer } => {
                self.complete = true;
                self.authenticated = true;
                self.state.release();

                self.log_prefix.set_user(principal.name.clone());
                info!(
                    "{} User authenticated, mechanism={}, qop={}",
                    self.log_prefix,
                    self.mechanism,
                    layer.as_ref().map_or(Qop::Auth, SecurityLayer::qop)
                );

                self.principal = Some(principal);
                self.security_layer = layer;
                user.send_success(MSG_SUCCESS)
            }

            Outcome::Failure => {
                self.complete = true;
                self.state.release();
                user.send_failure(MSG_FAILED)
            }

            Outcome::BadRequest(why) => {
                info!("{} Bad request: {}", self.log_prefix, why);
                self.complete = true;
                self.state.release();
                user.send_bad_request(why)
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// The principal the connection now acts as, if authenticated.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Whether the exchange negotiated a security layer which all further
    /// traffic must pass through.
    pub fn is_encryption_enabled(&self) -> bool {
        self.security_layer
            .as_ref()
            .map_or(false, SecurityLayer::is_enabled)
    }

    pub fn security_layer(&self) -> Option<&SecurityLayer> {
        self.security_layer.as_ref()
    }

    /// Take ownership of the negotiated security layer, to install it on the
    /// connection.
    pub fn take_security_layer(&mut self) -> Option<SecurityLayer> {
        self.security_layer.take()
    }

    /// Release any security context still held by this exchange, including
    /// a security layer that was not taken.
    ///
    /// Safe to call at any point, any number of times. Dropping the
    /// authenticator has the same effect.
    pub fn dispose(&mut self) {
        self.state.release();
        if let Some(layer) = self.security_layer.take() {
            layer.dispose();
        }
    }
}
