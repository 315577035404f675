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

//! A security context keyed from a secret shared in advance by both ends.
//!
//! The 128-bit key is `KMAC128(secret, "layer-key", 16, "sasl")`, and is kept
//! in locked memory for the lifetime of the context.
//!
//! With `auth-conf`, each wrapped block is:
//! - 16-byte IV
//! - AES-128-GCM ciphertext, the same length as the cleartext
//! - 16-byte authentication tag
//!
//! With `auth-int`, each wrapped block is the cleartext followed by
//! `KMAC128(key, cleartext, 16, "int")`.
//!
//! With `auth`, wrapping is the identity, though a security layer negotiated
//! at that level is never used to wrap anything.

use openssl::symm::{decrypt_aead, encrypt_aead, Cipher};
use rand::{rngs::OsRng, Rng};
use secstr::SecBox;
use tiny_keccak::{Hasher, Kmac};

use super::context::*;
use crate::support::system_config::{
    DEFAULT_MAX_RECEIVE_SIZE, DEFAULT_MAX_SEND_SIZE,
};

const KEY_SIZE: usize = 16;
const IV_SIZE: usize = 16;
const TAG_SIZE: usize = 16;

pub struct KeyedContext {
    key: SecBox<[u8; KEY_SIZE]>,
    qop: Qop,
    max_send_size: u32,
    max_receive_size: u32,
}

impl KeyedContext {
    /// Create a context from `secret` operating at `qop`, with the default
    /// block size limits.
    pub fn new(secret: &[u8], qop: Qop) -> Self {
        let mut key = SecBox::new(Box::new([0u8; KEY_SIZE]));
        let mut kmac = Kmac::v128(secret, b"sasl");
        kmac.update(b"layer-key");
        kmac.finalize(&mut key.unsecure_mut()[..]);

        KeyedContext {
            key,
            qop,
            max_send_size: DEFAULT_MAX_SEND_SIZE,
            max_receive_size: DEFAULT_MAX_RECEIVE_SIZE,
        }
    }

    /// Override the block size limits.
    ///
    /// `max_receive_size` must allow for the wrapping overhead of blocks of
    /// `max_send_size` on the peer.
    pub fn with_limits(
        mut self,
        max_send_size: u32,
        max_receive_size: u32,
    ) -> Self {
        self.max_send_size = max_send_size;
        self.max_receive_size = max_receive_size;
        self
    }

    fn integrity_tag(&self, data: &[u8]) -> [u8; TAG_SIZE] {
        let mut tag = [0u8; TAG_SIZE];
        let mut kmac = Kmac::v128(&self.key.unsecure()[..], b"int");
        kmac.update(data);
        kmac.finalize(&mut tag);
        tag
    }
}

impl SecurityContext for KeyedContext {
    fn negotiated_property(&self, name: &str) -> Option<String> {
        match name {
            PROP_QOP => Some(self.qop.name().to_owned()),
            PROP_RAW_SEND_SIZE => Some(self.max_send_size.to_string()),
            PROP_MAX_RECEIVE => Some(self.max_receive_size.to_string()),
            _ => None,
        }
    }

    fn wrap(&mut self, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        match self.qop {
            Qop::Auth => Ok(data.to_vec()),
            Qop::AuthInt => {
                let mut wrapped = Vec::with_capacity(data.len() + TAG_SIZE);
                wrapped.extend_from_slice(data);
                wrapped.extend_from_slice(&self.integrity_tag(data));
                Ok(wrapped)
            }
            Qop::AuthConf => {
                let iv: [u8; IV_SIZE] = OsRng.gen();
                let mut tag = [0u8; TAG_SIZE];
                let ciphertext = encrypt_aead(
                    Cipher::aes_128_gcm(),
                    &self.key.unsecure()[..],
                    Some(&iv),
                    &[],
                    data,
                    &mut tag,
                )?;

                let mut wrapped =
                    Vec::with_capacity(IV_SIZE + ciphertext.len() + TAG_SIZE);
                wrapped.extend_from_slice(&iv);
                wrapped.extend_from_slice(&ciphertext);
                wrapped.extend_from_slice(&tag);
                Ok(wrapped)
            }
        }
    }

    fn unwrap(&mut self, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        match self.qop {
            Qop::Auth => Ok(data.to_vec()),
            Qop::AuthInt => {
                if data.len() < TAG_SIZE {
                    return Err(ProviderError::Integrity);
                }

                let (cleartext, tag) = data.split_at(data.len() - TAG_SIZE);
                if !openssl::memcmp::eq(&self.integrity_tag(cleartext), tag) {
                    return Err(ProviderError::Integrity);
                }

                Ok(cleartext.to_vec())
            }
            Qop::AuthConf => {
                if data.len() < IV_SIZE + TAG_SIZE {
                    return Err(ProviderError::Integrity);
                }

                let (iv, rest) = data.split_at(IV_SIZE);
                let (ciphertext, tag) = rest.split_at(rest.len() - TAG_SIZE);
                decrypt_aead(
                    Cipher::aes_128_gcm(),
                    &self.key.unsecure()[..],
                    Some(iv),
                    &[],
                    ciphertext,
                    tag,
                )
                .map_err(|_| ProviderError::Integrity)
            }
        }
    }
}
