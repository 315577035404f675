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

//! Resolution of the authentication and authorisation identities of an
//! exchange into the principal the connection will act as.
//!
//! Every mechanism funnels through `AuthorizationResolver::resolve`, so the
//! act-as check is applied identically whether the authentication identity
//! came from a password, a session token, or a security-context provider.

use std::sync::Arc;

use log::{info, warn};
use thiserror::Error;

use super::user::{Credential, Principal};
use crate::support::log_prefix::LogPrefix;

/// The account directory and access-control service.
pub trait Directory: Send + Sync {
    fn lookup_principal(&self, name: &str) -> Option<Principal>;

    /// Check a credential which the mechanism has not already proven.
    ///
    /// Only called for `Credential::Password`.
    fn verify_credential(
        &self,
        principal: &Principal,
        credential: &Credential<'_>,
    ) -> bool;

    /// Whether `acting` may act as `target` (e.g. an administrator or a
    /// delegate).
    fn can_act_as(&self, acting: &Principal, target: &Principal) -> bool;

    /// Called once a principal has been successfully authenticated.
    fn notify_authenticated(&self, principal: &Principal);
}

/// Why an exchange was refused.
///
/// This is only ever logged. The peer always gets the same generic failure,
/// so that it cannot learn which of these applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("No such user '{0}'")]
    UnknownPrincipal(String),
    #[error("Bad credential for '{0}'")]
    BadCredential(String),
    #[error("No such target user '{0}'")]
    UnknownTarget(String),
    #[error("'{acting}' may not act as '{target}'")]
    ActAsDenied { acting: String, target: String },
}

pub struct AuthorizationResolver {
    directory: Arc<dyn Directory>,
    log_prefix: LogPrefix,
}

impl AuthorizationResolver {
    pub fn new(directory: Arc<dyn Directory>, log_prefix: LogPrefix) -> Self {
        AuthorizationResolver {
            directory,
            log_prefix,
        }
    }

    /// Resolve the principal that `authentication_id`, proven by
    /// `credential`, may act as when requesting `authorization_id`.
    ///
    /// An empty `authorization_id` means to act as the authentication
    /// identity.
    pub fn resolve(
        &self,
        authorization_id: &str,
        authentication_id: &str,
        credential: &Credential<'_>,
    ) -> Option<Principal> {
        match self.check(authorization_id, authentication_id, credential) {
            Ok(principal) => {
                if principal.name != authentication_id {
                    info!(
                        "{} '{}' acting as '{}'",
                        self.log_prefix, authentication_id, principal.name
                    );
                }
                self.directory.notify_authenticated(&principal);
                Some(principal)
            }
            Err(rejection) => {
                warn!(
                    "{} Rejected authentication: {}",
                    self.log_prefix, rejection
                );
                None
            }
        }
    }

    fn check(
        &self,
        authorization_id: &str,
        authentication_id: &str,
        credential: &Credential<'_>,
    ) -> Result<Principal, Rejection> {
        let authenticated = self
            .directory
            .lookup_principal(authentication_id)
            .ok_or_else(|| {
                Rejection::UnknownPrincipal(authentication_id.to_owned())
            })?;

        if !credential.is_asserted()
            && !self.directory.verify_credential(&authenticated, credential)
        {
            return Err(Rejection::BadCredential(authenticated.name));
        }

        if authorization_id.is_empty() || authorization_id == authentication_id
        {
            return Ok(authenticated);
        }

        let target = self
            .directory
            .lookup_principal(authorization_id)
            .ok_or_else(|| {
                Rejection::UnknownTarget(authorization_id.to_owned())
            })?;

        if target.id == authenticated.id {
            return Ok(authenticated);
        }

        if !self.directory.can_act_as(&authenticated, &target) {
            return Err(Rejection::ActAsDenied {
                acting: authenticated.name,
                target: target.name,
            });
        }

        Ok(target)
    }
}
