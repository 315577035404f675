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
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};

/// Tracks text that should be included in at the start of every log statement
/// emitted while authenticating a connection.
///
/// Clones of a `LogPrefix` share the same underlying data.
#[derive(Clone)]
pub struct LogPrefix {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Clone)]
struct Inner {
    protocol: String,
    peer: Option<String>,
    user: Option<String>,
    mechanism: Option<String>,
}

impl LogPrefix {
    pub fn new(protocol: String) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                protocol,
                peer: None,
                user: None,
                mechanism: None,
            })),
        }
    }

    pub fn deep_clone(&self) -> Self {
        let inner = self.lock();
        Self {
            inner: Arc::new(Mutex::new(Inner::clone(&inner))),
        }
    }

    pub fn set_peer(&self, peer: String) {
        self.lock().peer = Some(sanitise(peer));
    }

    pub fn set_user(&self, user: String) {
        self.lock().user = Some(sanitise(user));
    }

    pub fn set_mechanism(&self, mechanism: String) {
        self.lock().mechanism = Some(sanitise(mechanism));
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }
}

impl fmt::Display for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.lock();
        write!(f, "{}", inner.protocol)?;
        if let Some(ref peer) = inner.peer {
            write!(f, ":{peer}")?;
        }

        if inner.user.is_some() || inner.mechanism.is_some() {
            write!(f, "[")?;
            let mut first = true;
            if let Some(ref user) = inner.user {
                write!(f, "{user}")?;
                first = false;
            }

            if let Some(ref mechanism) = inner.mechanism {
                if !mem::take(&mut first) {
                    write!(f, " ")?;
                }
                write!(f, "mech={mechanism}")?;
            }
            write!(f, "]")?;
        }

        Ok(())
    }
}

fn sanitise(mut s: String) -> String {
    s.retain(|c| !c.is_control());
    if let Some((truncate_len, _)) = s.char_indices().nth(64) {
        s.truncate(truncate_len);
    }

    s
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn format_progression() {
        let prefix = LogPrefix::new("imap".to_owned());
        assert_eq!("imap", prefix.to_string());

        prefix.set_peer("192.0.2.1".to_owned());
        assert_eq!("imap:192.0.2.1", prefix.to_string());

        prefix.set_mechanism("PLAIN".to_owned());
        assert_eq!("imap:192.0.2.1[mech=PLAIN]", prefix.to_string());

        prefix.set_user("alice".to_owned());
        assert_eq!("imap:192.0.2.1[alice mech=PLAIN]", prefix.to_string());
    }

    #[test]
    fn clones_share_and_deep_clones_do_not() {
        let prefix = LogPrefix::new("pop3".to_owned());
        let shallow = prefix.clone();
        let deep = prefix.deep_clone();

        prefix.set_user("bob".to_owned());
        assert_eq!("pop3[bob]", shallow.to_string());
        assert_eq!("pop3", deep.to_string());
    }

    #[test]
    fn peer_supplied_names_are_sanitised() {
        let prefix = LogPrefix::new("imap".to_owned());
        prefix.set_user(format!("ev\r\nil{}", "x".repeat(100)));
        let s = prefix.to_string();
        assert!(!s.contains('\r'));
        assert!(!s.contains('\n'));
        // "imap[" + 64 chars + "]"
        assert_eq!(5 + 64 + 1, s.len());
    }
}
