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

use std::fmt;
use std::sync::Mutex;

use log::debug;

use super::context::*;
use crate::support::error::Error;
use crate::support::system_config::{
    DEFAULT_MAX_RECEIVE_SIZE, DEFAULT_MAX_SEND_SIZE,
};

/// A negotiated security layer.
///
/// This presents the same interface whichever mechanism produced the
/// underlying context. The negotiated parameters are fixed at construction;
/// only the context itself is mutable, and it is serialised internally so
/// that a read thread and a write thread may share one `SecurityLayer`.
pub struct SecurityLayer {
    qop: Qop,
    max_send_size: u32,
    max_receive_size: u32,
    context: Mutex<ContextHandle>,
}

impl SecurityLayer {
    /// Build a security layer over an established context which negotiated
    /// `qop`.
    pub fn new(context: ContextHandle, qop: Qop) -> Self {
        let max_send_size = size_property(
            &context,
            &[PROP_RAW_SEND_SIZE],
            DEFAULT_MAX_SEND_SIZE,
        );
        let max_receive_size = size_property(
            &context,
            &[PROP_MAX_RECEIVE, PROP_MAX_BUFFER],
            DEFAULT_MAX_RECEIVE_SIZE,
        );

        SecurityLayer {
            qop,
            max_send_size,
            max_receive_size,
            context: Mutex::new(context),
        }
    }

    /// Build a security layer, taking the QOP from the context's own
    /// negotiated properties.
    ///
    /// A context which does not report a recognisable QOP is treated as
    /// authentication-only.
    pub fn from_context(context: ContextHandle) -> Self {
        let qop = context
            .negotiated_property(PROP_QOP)
            .and_then(|q| Qop::from_name(&q))
            .unwrap_or(Qop::Auth);
        Self::new(context, qop)
    }

    pub fn qop(&self) -> Qop {
        self.qop
    }

    /// Whether traffic must actually be passed through this layer.
    pub fn is_enabled(&self) -> bool {
        self.qop.is_protected()
    }

    /// The largest plaintext block that may be passed to `wrap`.
    pub fn max_send_size(&self) -> u32 {
        self.max_send_size
    }

    /// The largest frame that may be accepted from the peer.
    pub fn max_receive_size(&self) -> u32 {
        self.max_receive_size
    }

    pub fn negotiated_property(&self, name: &str) -> Option<String> {
        self.context.lock().unwrap().negotiated_property(name)
    }

    pub fn wrap(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(self.context.lock().unwrap().wrap(data)?)
    }

    pub fn unwrap(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(self.context.lock().unwrap().unwrap(data)?)
    }

    /// Release the underlying context.
    ///
    /// This happens automatically on drop; this method just makes it explicit
    /// at the call site.
    pub fn dispose(self) {}
}

impl fmt::Debug for SecurityLayer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SecurityLayer")
            .field("qop", &self.qop)
            .field("max_send_size", &self.max_send_size)
            .field("max_receive_size", &self.max_receive_size)
            .finish()
    }
}

fn size_property(
    context: &ContextHandle,
    names: &[&str],
    default: u32,
) -> u32 {
    for name in names {
        if let Some(value) = context.negotiated_property(name) {
            match value.trim().parse::<u32>() {
                Ok(size) if size > 0 => return size,
                _ => debug!(
                    "Ignoring unusable negotiated {} value {:?}",
                    name, value
                ),
            }
        }
    }

    default
}
