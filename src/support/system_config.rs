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

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::support::error::Error;

/// Default largest plaintext block handed to the security layer's `wrap`.
pub const DEFAULT_MAX_SEND_SIZE: u32 = 4096;
/// Default largest frame accepted from the peer.
pub const DEFAULT_MAX_RECEIVE_SIZE: u32 = 65536;

/// Configuration for SASL authentication.
///
/// This is normally stored in the `[sasl]` table of the server's
/// configuration file, but can also be loaded on its own.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SaslConfig {
    /// If true, PLAIN may be used on connections without transport
    /// confidentiality.
    ///
    /// This exposes passwords to anyone who can observe the connection and
    /// should only be enabled for testing or when the network path is
    /// otherwise protected.
    pub allow_cleartext_login: bool,

    /// The mechanisms that may be used at all.
    ///
    /// Names are matched case-insensitively.
    pub mechanisms: Vec<String>,

    /// Mechanisms which are usable but not listed in capability responses.
    ///
    /// By default the internal token mechanism is hidden, since it is only
    /// meaningful to other components of the same installation.
    pub hidden_mechanisms: Vec<String>,

    /// Configuration for GSSAPI.
    pub gssapi: GssapiConfig,
}

impl Default for SaslConfig {
    fn default() -> Self {
        SaslConfig {
            allow_cleartext_login: false,
            mechanisms: vec![
                "PLAIN".to_owned(),
                "GSSAPI".to_owned(),
                "X-TOKEN".to_owned(),
            ],
            hidden_mechanisms: vec!["X-TOKEN".to_owned()],
            gssapi: GssapiConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct GssapiConfig {
    /// The host name used to find the service credential.
    ///
    /// If unset, the system host name is used.
    pub host_name: String,

    /// The service name used to find the service credential.
    ///
    /// If unset, the name of the protocol being served (e.g. `imap`) is used.
    pub service_name: String,

    /// The largest frame we are willing to receive once a security layer is
    /// established.
    pub max_receive_size: u32,

    /// The largest plaintext block we will wrap into a single frame.
    pub max_send_size: u32,
}

impl Default for GssapiConfig {
    fn default() -> Self {
        GssapiConfig {
            host_name: String::new(),
            service_name: String::new(),
            max_receive_size: DEFAULT_MAX_RECEIVE_SIZE,
            max_send_size: DEFAULT_MAX_SEND_SIZE,
        }
    }
}

impl SaslConfig {
    /// Parse the configuration from TOML text.
    pub fn parse(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }

    /// Load the configuration from the given file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let mut buf = String::new();
        fs::File::open(path)?.take(65536).read_to_string(&mut buf)?;
        Self::parse(&buf)
    }

    /// Whether `mechanism` is enabled.
    pub fn is_enabled(&self, mechanism: &str) -> bool {
        contains_ignore_case(&self.mechanisms, mechanism)
    }

    /// Whether `mechanism` should be omitted from capability listings.
    pub fn is_hidden(&self, mechanism: &str) -> bool {
        contains_ignore_case(&self.hidden_mechanisms, mechanism)
    }
}

impl GssapiConfig {
    /// Determine the host name to use for the service credential.
    pub fn effective_host_name(&self) -> Result<String, nix::Error> {
        if !self.host_name.is_empty() {
            return Ok(self.host_name.clone());
        }

        let mut buf = [0u8; 256];
        let host_name = nix::unistd::gethostname(&mut buf)?;
        Ok(host_name.to_string_lossy().into_owned())
    }

    /// Determine the service name for the given protocol.
    pub fn effective_service_name(&self, protocol: &str) -> String {
        if self.service_name.is_empty() {
            protocol.to_owned()
        } else {
            self.service_name.clone()
        }
    }
}

fn contains_ignore_case(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|s| s.eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        let config = SaslConfig::parse("").unwrap();
        assert!(!config.allow_cleartext_login);
        assert!(config.is_enabled("plain"));
        assert!(config.is_enabled("GSSAPI"));
        assert!(config.is_enabled("x-token"));
        assert!(config.is_hidden("X-TOKEN"));
        assert!(!config.is_hidden("PLAIN"));
        assert_eq!(65536, config.gssapi.max_receive_size);
        assert_eq!(4096, config.gssapi.max_send_size);
    }

    #[test]
    fn parse_overrides() {
        let config = SaslConfig::parse(
            r#"
allow_cleartext_login = true
mechanisms = ["plain"]
hidden_mechanisms = []

[gssapi]
host_name = "mail.example.com"
service_name = "imap"
max_receive_size = 1024
"#,
        )
        .unwrap();

        assert!(config.allow_cleartext_login);
        assert!(config.is_enabled("PLAIN"));
        assert!(!config.is_enabled("GSSAPI"));
        assert!(!config.is_hidden("X-TOKEN"));
        assert_eq!(1024, config.gssapi.max_receive_size);
        assert_eq!(4096, config.gssapi.max_send_size);
        assert_eq!(
            "mail.example.com",
            config.gssapi.effective_host_name().unwrap()
        );
        assert_eq!("imap", config.gssapi.effective_service_name("pop3"));
    }

    #[test]
    fn service_name_defaults_to_protocol() {
        let config = GssapiConfig::default();
        assert_eq!("pop3", config.effective_service_name("pop3"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mechanisms = [\"GSSAPI\"]").unwrap();
        file.flush().unwrap();

        let config = SaslConfig::load(file.path()).unwrap();
        assert!(config.is_enabled("gssapi"));
        assert!(!config.is_enabled("plain"));
    }

    #[test]
    fn bad_config_is_an_error() {
        assert_matches!(
            Err(Error::Config(..)),
            SaslConfig::parse("mechanisms = 42")
        );
    }
}
