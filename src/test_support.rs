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

//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::layer::context::*;
use crate::layer::security::SecurityLayer;
use crate::sasl::authorize::{AuthorizationResolver, Directory};
use crate::sasl::mechanism::{Mechanism, Mechanisms};
use crate::sasl::token::TokenVerifier;
use crate::sasl::user::{AuthenticatorUser, Credential, Principal};
use crate::support::log_prefix::LogPrefix;
use crate::support::system_config::SaslConfig;

/// A toy context which XORs each byte with a constant and appends an additive
/// checksum of the cleartext. Flipping any bit of a wrapped block makes it
/// fail to unwrap.
struct ChecksumContext {
    qop: Qop,
    max_send_size: u32,
    max_receive_size: u32,
}

const XOR_KEY: u8 = 0x5A;

fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

impl SecurityContext for ChecksumContext {
    fn negotiated_property(&self, name: &str) -> Option<String> {
        match name {
            PROP_QOP => Some(self.qop.name().to_owned()),
            PROP_RAW_SEND_SIZE => Some(self.max_send_size.to_string()),
            PROP_MAX_RECEIVE => Some(self.max_receive_size.to_string()),
            _ => None,
        }
    }

    fn wrap(&mut self, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let mut wrapped: Vec<u8> = data.iter().map(|b| b ^ XOR_KEY).collect();
        wrapped.push(checksum(data));
        Ok(wrapped)
    }

    fn unwrap(&mut self, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let (&sum, body) =
            data.split_last().ok_or(ProviderError::Integrity)?;
        let cleartext: Vec<u8> = body.iter().map(|b| b ^ XOR_KEY).collect();
        if checksum(&cleartext) != sum {
            return Err(ProviderError::Integrity);
        }

        Ok(cleartext)
    }
}

/// A confidential security layer with the given limits. Each wrapped block is
/// one byte longer than its cleartext.
pub fn test_layer(max_send_size: u32, max_receive_size: u32) -> SecurityLayer {
    SecurityLayer::from_context(ContextHandle::new(Box::new(ChecksumContext {
        qop: Qop::AuthConf,
        max_send_size,
        max_receive_size,
    })))
}

#[derive(Default)]
pub struct MockDirectory {
    passwords: HashMap<String, String>,
    act_as: HashSet<(String, String)>,
    notified: Mutex<Vec<String>>,
    verify_calls: AtomicUsize,
}

impl MockDirectory {
    pub fn notified(&self) -> Vec<String> {
        self.notified.lock().unwrap().clone()
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

impl Directory for MockDirectory {
    fn lookup_principal(&self, name: &str) -> Option<Principal> {
        if self.passwords.contains_key(name) {
            Some(Principal::new(format!("id-{}", name), name))
        } else {
            None
        }
    }

    fn verify_credential(
        &self,
        principal: &Principal,
        credential: &Credential<'_>,
    ) -> bool {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        match *credential {
            Credential::Password(password) => self
                .passwords
                .get(&principal.name)
                .map_or(false, |p| p == password),
            _ => false,
        }
    }

    fn can_act_as(&self, acting: &Principal, target: &Principal) -> bool {
        self.act_as
            .contains(&(acting.name.clone(), target.name.clone()))
    }

    fn notify_authenticated(&self, principal: &Principal) {
        self.notified.lock().unwrap().push(principal.name.clone());
    }
}

/// Users `alice`, `bob`, `carol`, `dave` and `admin`; `admin` may act as
/// `bob`.
pub fn directory() -> Arc<MockDirectory> {
    let passwords = [
        ("alice", "s3cret"),
        ("bob", "hunter2"),
        ("carol", "carol-pw"),
        ("dave", "dave-pw"),
        ("admin", "root"),
    ]
    .iter()
    .map(|&(u, p)| (u.to_owned(), p.to_owned()))
    .collect();

    let mut act_as = HashSet::new();
    act_as.insert(("admin".to_owned(), "bob".to_owned()));

    Arc::new(MockDirectory {
        passwords,
        act_as,
        ..MockDirectory::default()
    })
}

pub struct MockTokenVerifier(HashMap<String, String>);

impl TokenVerifier for MockTokenVerifier {
    fn verify_token(&self, token: &str) -> Option<String> {
        self.0.get(token).cloned()
    }
}

/// Accepts `tok-carol` (owned by `carol`) and `tok-dave` (owned by `dave`).
pub fn token_verifier() -> Arc<MockTokenVerifier> {
    let mut tokens = HashMap::new();
    tokens.insert("tok-carol".to_owned(), "carol".to_owned());
    tokens.insert("tok-dave".to_owned(), "dave".to_owned());
    Arc::new(MockTokenVerifier(tokens))
}

pub fn done(qop: Qop, authz: &str, authn: &str) -> Establish {
    Establish::Done {
        qop,
        authorization_id: authz.to_owned(),
        authentication_id: authn.to_owned(),
    }
}

/// A provider whose first context replays a fixed list of establishment
/// results.
///
/// Contexts report the sizes from their `ContextRequest` as their negotiated
/// limits, and wrap like `test_layer`.
pub struct ScriptedProvider {
    available: bool,
    script: Mutex<Vec<Result<Establish, ProviderError>>>,
    requests: Mutex<Vec<ContextRequest>>,
    tokens: Arc<Mutex<Vec<Vec<u8>>>>,
    disposed: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<Establish, ProviderError>>) -> Arc<Self> {
        Arc::new(ScriptedProvider {
            available: true,
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
            tokens: Arc::new(Mutex::new(Vec::new())),
            disposed: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(ScriptedProvider {
            available: false,
            script: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            tokens: Arc::new(Mutex::new(Vec::new())),
            disposed: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn requests(&self) -> Vec<ContextRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Every token passed to `establish`, across all contexts.
    pub fn tokens(&self) -> Vec<Vec<u8>> {
        self.tokens.lock().unwrap().clone()
    }

    /// The number of contexts disposed so far.
    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl SecurityContextProvider for ScriptedProvider {
    fn acquire_service_credential(
        &self,
        request: &ContextRequest,
    ) -> Result<Box<dyn SecurityContext>, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.available {
            return Err(ProviderError::Unavailable(format!(
                "no keytab entry for {}/{}",
                request.service_name, request.host_name
            )));
        }

        let script = std::mem::take(&mut *self.script.lock().unwrap());
        Ok(Box::new(ScriptedContext {
            script: script.into_iter().collect(),
            qop: None,
            inner: ChecksumContext {
                qop: Qop::Auth,
                max_send_size: request.max_send_size,
                max_receive_size: request.max_receive_size,
            },
            tokens: Arc::clone(&self.tokens),
            disposed: Arc::clone(&self.disposed),
        }))
    }
}

struct ScriptedContext {
    script: VecDeque<Result<Establish, ProviderError>>,
    qop: Option<Qop>,
    inner: ChecksumContext,
    tokens: Arc<Mutex<Vec<Vec<u8>>>>,
    disposed: Arc<AtomicUsize>,
}

impl SecurityContext for ScriptedContext {
    fn establish(
        &mut self,
        peer_token: &[u8],
    ) -> Result<Establish, ProviderError> {
        self.tokens.lock().unwrap().push(peer_token.to_vec());
        let result = self.script.pop_front().unwrap_or_else(|| {
            Err(ProviderError::Internal("script exhausted".to_owned()))
        });
        if let Ok(Establish::Done { qop, .. }) = result {
            self.qop = Some(qop);
            self.inner.qop = qop;
        }
        result
    }

    fn negotiated_property(&self, name: &str) -> Option<String> {
        if PROP_QOP == name && self.qop.is_none() {
            return None;
        }

        self.inner.negotiated_property(name)
    }

    fn wrap(&mut self, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        self.inner.wrap(data)
    }

    fn unwrap(&mut self, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        self.inner.unwrap(data)
    }

    fn dispose(&mut self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

/// The default configuration with every collaborator available.
pub fn mechanisms() -> Mechanisms {
    let mut config = SaslConfig::default();
    config.gssapi.host_name = "mail.example.com".to_owned();
    Mechanisms::new(config)
        .with_token_verifier(token_verifier())
        .with_context_provider(ScriptedProvider::new(Vec::new()))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Continuation(String),
    Success(String),
    Failure(String),
    BadRequest(String),
}

/// An `AuthenticatorUser` which records every response, and authenticates
/// through an `AuthorizationResolver` over a `MockDirectory`.
pub struct RecordingUser {
    pub confidential: bool,
    pub clear_text_allowed: bool,
    /// If set, every send fails.
    pub broken: bool,
    pub sent: Vec<Sent>,
    pub authenticate_calls: Vec<(String, String, Mechanism)>,
    resolver: AuthorizationResolver,
}

impl RecordingUser {
    pub fn new(directory: &Arc<MockDirectory>, confidential: bool) -> Self {
        RecordingUser {
            confidential,
            clear_text_allowed: false,
            broken: false,
            sent: Vec::new(),
            authenticate_calls: Vec::new(),
            resolver: AuthorizationResolver::new(
                Arc::clone(directory) as Arc<dyn Directory>,
                LogPrefix::new("imap".to_owned()),
            ),
        }
    }

    fn record(&mut self, sent: Sent) -> io::Result<()> {
        if self.broken {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "connection closed",
            ));
        }

        self.sent.push(sent);
        Ok(())
    }
}

impl AuthenticatorUser for RecordingUser {
    fn protocol(&self) -> &str {
        "imap"
    }

    fn send_continuation(&mut self, challenge: &str) -> io::Result<()> {
        self.record(Sent::Continuation(challenge.to_owned()))
    }

    fn send_success(&mut self, message: &str) -> io::Result<()> {
        self.record(Sent::Success(message.to_owned()))
    }

    fn send_failure(&mut self, message: &str) -> io::Result<()> {
        self.record(Sent::Failure(message.to_owned()))
    }

    fn send_bad_request(&mut self, message: &str) -> io::Result<()> {
        self.record(Sent::BadRequest(message.to_owned()))
    }

    fn is_transport_confidential(&self) -> bool {
        self.confidential
    }

    fn allows_clear_text_credentials(&self) -> bool {
        self.clear_text_allowed
    }

    fn authenticate(
        &mut self,
        authorization_id: &str,
        authentication_id: &str,
        credential: Credential<'_>,
        mechanism: Mechanism,
    ) -> Option<Principal> {
        self.authenticate_calls.push((
            authorization_id.to_owned(),
            authentication_id.to_owned(),
            mechanism,
        ));
        self.resolver
            .resolve(authorization_id, authentication_id, &credential)
    }
}
