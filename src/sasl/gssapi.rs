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

//! The GSSAPI mechanism (RFC 4752).
//!
//! Context establishment and the security layer negotiation are left entirely
//! to the security-context provider; this side only relays tokens, applies
//! the authorisation check to the identities the provider reports, and
//! decides what to do with the context afterwards.

use std::sync::Arc;

use log::{debug, error, warn};

use super::authenticator::Outcome;
use super::mechanism::Mechanism;
use super::user::{AuthenticatorUser, Credential};
use crate::layer::context::*;
use crate::layer::security::SecurityLayer;
use crate::support::log_prefix::LogPrefix;
use crate::support::system_config::GssapiConfig;

pub(super) struct GssapiState {
    provider: Arc<dyn SecurityContextProvider>,
    config: GssapiConfig,
    offered: QopSet,
    context: Option<ContextHandle>,
}

impl GssapiState {
    pub(super) fn new(
        provider: Arc<dyn SecurityContextProvider>,
        config: GssapiConfig,
    ) -> Self {
        GssapiState {
            provider,
            config,
            offered: QopSet::empty(),
            context: None,
        }
    }

    /// Acquire the service credential for this connection.
    pub(super) fn initialize(
        &mut self,
        protocol: &str,
        user: &dyn AuthenticatorUser,
        log_prefix: &LogPrefix,
    ) -> bool {
        let host_name = match self.config.effective_host_name() {
            Ok(h) => h,
            Err(e) => {
                warn!("{} Unable to determine host name: {}", log_prefix, e);
                return false;
            }
        };

        let request = ContextRequest {
            service_name: self.config.effective_service_name(protocol),
            host_name,
            qops: QopSet::offer(user.is_transport_confidential()),
            max_receive_size: self.config.max_receive_size,
            max_send_size: self.config.max_send_size,
        };

        match self.provider.acquire_service_credential(&request) {
            Ok(context) => {
                debug!(
                    "{} Acquired service credential for {}/{}, offering up \
                     to {}",
                    log_prefix,
                    request.service_name,
                    request.host_name,
                    request.qops.strongest().unwrap_or(Qop::Auth)
                );
                self.offered = request.qops;
                self.context = Some(ContextHandle::new(context));
                true
            }
            Err(ProviderError::Unavailable(what)) => {
                debug!(
                    "{} No service credential for {}/{}: {}",
                    log_prefix, request.service_name, request.host_name, what
                );
                false
            }
            Err(e) => {
                error!(
                    "{} Failed to acquire service credential for {}/{}: {}",
                    log_prefix, request.service_name, request.host_name, e
                );
                false
            }
        }
    }

    pub(super) fn step(
        &mut self,
        data: &[u8],
        user: &mut dyn AuthenticatorUser,
        log_prefix: &LogPrefix,
    ) -> Outcome {
        let result = match self.context.as_mut() {
            Some(context) => context.establish(data),
            None => {
                error!("{} GSSAPI step without a context", log_prefix);
                return Outcome::Failure;
            }
        };

        let (qop, authorization_id, authentication_id) = match result {
            Ok(Establish::Continue(challenge)) => {
                return Outcome::Challenge(challenge)
            }
            Ok(Establish::Done {
                qop,
                authorization_id,
                authentication_id,
            }) => (qop, authorization_id, authentication_id),
            Err(ProviderError::Rejected(why)) => {
                warn!("{} GSSAPI token rejected: {}", log_prefix, why);
                return Outcome::Failure;
            }
            Err(e) => {
                error!("{} GSSAPI provider failure: {}", log_prefix, e);
                return Outcome::Failure;
            }
        };

        if !self.offered.contains_qop(qop) {
            error!(
                "{} Provider negotiated {}, which was not offered ({:?})",
                log_prefix, qop, self.offered
            );
            return Outcome::Failure;
        }

        let principal = match user.authenticate(
            &authorization_id,
            &authentication_id,
            Credential::SecurityContext { qop },
            Mechanism::Gssapi,
        ) {
            Some(principal) => principal,
            None => return Outcome::Failure,
        };

        let layer = match self.context.take() {
            Some(context) if qop.is_protected() => {
                Some(SecurityLayer::new(context, qop))
            }
            Some(context) => {
                context.release();
                None
            }
            None => None,
        };

        Outcome::Success { principal, layer }
    }

    /// Dispose the context, if still held.
    pub(super) fn release(&mut self) {
        if let Some(context) = self.context.take() {
            context.release();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::*;

    fn config() -> GssapiConfig {
        GssapiConfig {
            host_name: "mail.example.com".to_owned(),
            max_receive_size: 2048,
            max_send_size: 1024,
            ..GssapiConfig::default()
        }
    }

    fn prefix() -> LogPrefix {
        LogPrefix::new("imap".to_owned())
    }

    #[test]
    fn request_reflects_connection() {
        let provider = ScriptedProvider::new(Vec::new());
        let mut state = GssapiState::new(provider.clone(), config());
        let user = RecordingUser::new(&directory(), false);
        assert!(state.initialize("imap", &user, &prefix()));

        let mut tls_state = GssapiState::new(provider.clone(), config());
        let tls_user = RecordingUser::new(&directory(), true);
        assert!(tls_state.initialize("pop", &tls_user, &prefix()));

        let requests = provider.requests();
        assert_eq!(
            ContextRequest {
                service_name: "imap".to_owned(),
                host_name: "mail.example.com".to_owned(),
                qops: QopSet::AUTH | QopSet::AUTH_INT | QopSet::AUTH_CONF,
                max_receive_size: 2048,
                max_send_size: 1024,
            },
            requests[0]
        );
        assert_eq!("pop", requests[1].service_name);
        assert_eq!(QopSet::AUTH, requests[1].qops);
    }

    #[test]
    fn configured_service_name_wins() {
        let provider = ScriptedProvider::new(Vec::new());
        let mut state = GssapiState::new(
            provider.clone(),
            GssapiConfig {
                service_name: "mail".to_owned(),
                ..config()
            },
        );
        let user = RecordingUser::new(&directory(), false);
        assert!(state.initialize("imap", &user, &prefix()));
        assert_eq!("mail", provider.requests()[0].service_name);
    }

    #[test]
    fn unavailable_credential() {
        let provider = ScriptedProvider::unavailable();
        let mut state = GssapiState::new(provider.clone(), config());
        let user = RecordingUser::new(&directory(), false);
        assert!(!state.initialize("imap", &user, &prefix()));
        assert!(state.context.is_none());
    }

    #[test]
    fn challenge_then_protected_success() {
        let provider = ScriptedProvider::new(vec![
            Ok(Establish::Continue(b"challenge".to_vec())),
            Ok(done(Qop::AuthConf, "", "alice")),
        ]);
        let mut state = GssapiState::new(provider.clone(), config());
        let mut user = RecordingUser::new(&directory(), false);
        assert!(state.initialize("imap", &user, &prefix()));

        match state.step(b"token1", &mut user, &prefix()) {
            Outcome::Challenge(c) => assert_eq!(b"challenge", &c[..]),
            outcome => panic!("Unexpected outcome: {:?}", outcome),
        }
        match state.step(b"token2", &mut user, &prefix()) {
            Outcome::Success {
                principal,
                layer: Some(layer),
            } => {
                assert_eq!("alice", principal.name);
                assert_eq!(Qop::AuthConf, layer.qop());
                assert_eq!(1024, layer.max_send_size());
                assert_eq!(2048, layer.max_receive_size());
                assert_eq!(0, provider.disposed());
                layer.dispose();
                assert_eq!(1, provider.disposed());
            }
            outcome => panic!("Unexpected outcome: {:?}", outcome),
        }

        assert_eq!(
            vec![b"token1".to_vec(), b"token2".to_vec()],
            provider.tokens()
        );
    }

    #[test]
    fn unprotected_success_releases_context() {
        let provider =
            ScriptedProvider::new(vec![Ok(done(Qop::Auth, "", "alice"))]);
        let mut state = GssapiState::new(provider.clone(), config());
        let mut user = RecordingUser::new(&directory(), true);
        assert!(state.initialize("imap", &user, &prefix()));
        assert_matches!(
            Outcome::Success { layer: None, .. },
            state.step(b"token", &mut user, &prefix())
        );
        assert_eq!(1, provider.disposed());
        assert!(state.context.is_none());
    }

    #[test]
    fn unoffered_qop_is_failure() {
        let provider =
            ScriptedProvider::new(vec![Ok(done(Qop::AuthConf, "", "alice"))]);
        let mut state = GssapiState::new(provider.clone(), config());
        let mut user = RecordingUser::new(&directory(), true);
        assert!(state.initialize("imap", &user, &prefix()));
        assert_matches!(
            Outcome::Failure,
            state.step(b"token", &mut user, &prefix())
        );
        assert!(user.authenticate_calls.is_empty());
    }

    #[test]
    fn act_as_is_checked() {
        let provider =
            ScriptedProvider::new(vec![Ok(done(Qop::AuthInt, "bob", "alice"))]);
        let mut state = GssapiState::new(provider.clone(), config());
        let mut user = RecordingUser::new(&directory(), false);
        assert!(state.initialize("imap", &user, &prefix()));
        assert_matches!(
            Outcome::Failure,
            state.step(b"token", &mut user, &prefix())
        );
        assert_eq!(
            vec![("bob".to_owned(), "alice".to_owned(), Mechanism::Gssapi)],
            user.authenticate_calls
        );
        // Still held until the authenticator releases it
        assert_eq!(0, provider.disposed());
        state.release();
        state.release();
        assert_eq!(1, provider.disposed());
    }

    #[test]
    fn provider_errors_are_failures() {
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::Rejected("bad ticket".to_owned())),
        ]);
        let mut state = GssapiState::new(provider.clone(), config());
        let mut user = RecordingUser::new(&directory(), false);
        assert!(state.initialize("imap", &user, &prefix()));
        assert_matches!(
            Outcome::Failure,
            state.step(b"token", &mut user, &prefix())
        );

        let provider = ScriptedProvider::new(vec![Err(
            ProviderError::Internal("KDC on fire".to_owned()),
        )]);
        let mut state = GssapiState::new(provider.clone(), config());
        assert!(state.initialize("imap", &user, &prefix()));
        assert_matches!(
            Outcome::Failure,
            state.step(b"token", &mut user, &prefix())
        );
    }
}
