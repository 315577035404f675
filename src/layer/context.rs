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

//! The contract between this crate and whatever actually implements the
//! cryptography of a security context (e.g. a Kerberos GSSAPI library).
//!
//! Providers are black boxes: they establish a context from the peer's
//! tokens, report what was negotiated through named properties, and wrap or
//! unwrap individual blocks once established. Everything about framing,
//! buffering and authorisation is handled on this side of the boundary.

use std::fmt;

use bitflags::bitflags;
use thiserror::Error;

/// Property holding the negotiated quality of protection, as a `Qop` name.
pub const PROP_QOP: &str = "qop";
/// Property holding the largest plaintext block that may be passed to
/// `wrap`.
pub const PROP_RAW_SEND_SIZE: &str = "rawsendsize";
/// Property holding the largest frame this side will accept.
pub const PROP_MAX_RECEIVE: &str = "maxreceive";
/// Property holding the receive buffer size advertised during negotiation.
///
/// Used as the max receive size if `PROP_MAX_RECEIVE` is absent.
pub const PROP_MAX_BUFFER: &str = "maxbuffer";

/// Quality of protection of a negotiated context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Qop {
    /// Authentication only; no security layer.
    Auth,
    /// Integrity protection.
    AuthInt,
    /// Integrity and confidentiality protection.
    AuthConf,
}

impl Qop {
    pub fn name(self) -> &'static str {
        match self {
            Qop::Auth => "auth",
            Qop::AuthInt => "auth-int",
            Qop::AuthConf => "auth-conf",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if "auth".eq_ignore_ascii_case(name) {
            Some(Qop::Auth)
        } else if "auth-int".eq_ignore_ascii_case(name) {
            Some(Qop::AuthInt)
        } else if "auth-conf".eq_ignore_ascii_case(name) {
            Some(Qop::AuthConf)
        } else {
            None
        }
    }

    /// Whether traffic must pass through a security layer at this level.
    pub fn is_protected(self) -> bool {
        Qop::Auth != self
    }
}

impl fmt::Display for Qop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// A set of QOP levels, using the bit values of the GSSAPI SASL security
    /// layer negotiation (RFC 4752 section 3.3).
    pub struct QopSet: u8 {
        const AUTH = 1;
        const AUTH_INT = 2;
        const AUTH_CONF = 4;
    }
}

impl QopSet {
    /// The levels to offer a peer.
    ///
    /// If the transport is already confidential (e.g. TLS), a second layer of
    /// protection is pointless and only authentication is offered.
    pub fn offer(transport_confidential: bool) -> Self {
        if transport_confidential {
            QopSet::AUTH
        } else {
            QopSet::AUTH_CONF | QopSet::AUTH_INT | QopSet::AUTH
        }
    }

    pub fn contains_qop(self, qop: Qop) -> bool {
        self.contains(qop.into())
    }

    /// Returns the strongest level in the set.
    pub fn strongest(self) -> Option<Qop> {
        if self.contains(QopSet::AUTH_CONF) {
            Some(Qop::AuthConf)
        } else if self.contains(QopSet::AUTH_INT) {
            Some(Qop::AuthInt)
        } else if self.contains(QopSet::AUTH) {
            Some(Qop::Auth)
        } else {
            None
        }
    }
}

impl From<Qop> for QopSet {
    fn from(qop: Qop) -> Self {
        match qop {
            Qop::Auth => QopSet::AUTH,
            Qop::AuthInt => QopSet::AUTH_INT,
            Qop::AuthConf => QopSet::AUTH_CONF,
        }
    }
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("No service credential available for {0}")]
    Unavailable(String),
    #[error("Peer token rejected: {0}")]
    Rejected(String),
    #[error("Integrity check failed on wrapped data")]
    Integrity,
    #[error("Security context provider failure: {0}")]
    Internal(String),
    #[error("Security context does not support negotiation")]
    NotNegotiable,
    #[error(transparent)]
    Crypto(#[from] openssl::error::ErrorStack),
}

/// What the server side asks of the provider when acquiring a context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextRequest {
    /// The service part of the service principal (e.g. `imap`).
    pub service_name: String,
    /// The host part of the service principal.
    pub host_name: String,
    /// The QOP levels the peer may choose from.
    pub qops: QopSet,
    /// The largest frame we are prepared to receive.
    pub max_receive_size: u32,
    /// The largest plaintext block we intend to wrap.
    pub max_send_size: u32,
}

/// The result of feeding one peer token to a context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Establish {
    /// The provider needs another round; the token is sent to the peer as a
    /// challenge.
    Continue(Vec<u8>),
    /// The context is established.
    Done {
        /// The negotiated quality of protection.
        qop: Qop,
        /// The identity the peer asked to act as. May be empty.
        authorization_id: String,
        /// The identity the provider proved.
        authentication_id: String,
    },
}

/// Source of security contexts for the server side of an exchange.
pub trait SecurityContextProvider: Send + Sync {
    /// Acquire a context for the service credential described by `request`.
    ///
    /// Returns `ProviderError::Unavailable` if this deployment has no
    /// credential material for the service.
    fn acquire_service_credential(
        &self,
        request: &ContextRequest,
    ) -> Result<Box<dyn SecurityContext>, ProviderError>;
}

/// One security context.
///
/// A context is owned by exactly one connection and is normally held inside a
/// `ContextHandle`, which guarantees `dispose` is called exactly once.
pub trait SecurityContext: Send {
    /// Feed the next token from the peer into context establishment.
    fn establish(
        &mut self,
        _peer_token: &[u8],
    ) -> Result<Establish, ProviderError> {
        Err(ProviderError::NotNegotiable)
    }

    /// Query a negotiated property (see the `PROP_*` constants).
    fn negotiated_property(&self, name: &str) -> Option<String>;

    fn wrap(&mut self, data: &[u8]) -> Result<Vec<u8>, ProviderError>;

    fn unwrap(&mut self, data: &[u8]) -> Result<Vec<u8>, ProviderError>;

    /// Release any resources held by the provider for this context.
    fn dispose(&mut self) {}
}

/// Exclusive owner of a `SecurityContext`.
///
/// The context is disposed when the handle is dropped or released, so every
/// exit path releases it, and the type system prevents use after release.
pub struct ContextHandle {
    context: Box<dyn SecurityContext>,
}

impl ContextHandle {
    pub fn new(context: Box<dyn SecurityContext>) -> Self {
        ContextHandle { context }
    }

    pub fn establish(
        &mut self,
        peer_token: &[u8],
    ) -> Result<Establish, ProviderError> {
        self.context.establish(peer_token)
    }

    pub fn negotiated_property(&self, name: &str) -> Option<String> {
        self.context.negotiated_property(name)
    }

    pub fn wrap(&mut self, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        self.context.wrap(data)
    }

    pub fn unwrap(&mut self, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        self.context.unwrap(data)
    }

    /// Dispose the context now.
    pub fn release(self) {}
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        self.context.dispose();
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("ContextHandle")
    }
}
