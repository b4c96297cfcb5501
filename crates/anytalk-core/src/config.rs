//! Session configuration.

use secrecy::{ExposeSecret, SecretString};

/// Service endpoint / request-shape selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Bidirectional streaming, incremental revisions via `utterances`.
    Bidi,
    /// Bidirectional streaming, aggressive full-text revision: each
    /// `result.text` is both the partial preview and the final commit.
    BidiAsync,
    /// Non-streaming: language is pinned in the initial request body.
    NoStream,
}

impl Mode {
    /// Parse from the FFI/config string form. Unknown values default to
    /// `bidi_async` per §6's null-default rule.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "bidi" => Self::Bidi,
            "nostream" => Self::NoStream,
            _ => Self::BidiAsync,
        }
    }

    /// The WebSocket path for this mode.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Bidi => "/api/v3/sauc/bigmodel",
            Self::BidiAsync => "/api/v3/sauc/bigmodel_async",
            Self::NoStream => "/api/v3/sauc/bigmodel_nostream",
        }
    }
}

/// Remote ASR endpoint host.
pub const ANYTALK_HOST: &str = "openspeech.bytedance.com";
/// Remote ASR endpoint port (TLS required).
pub const ANYTALK_PORT: u16 = 443;
/// Default resource id when none is configured.
pub const DEFAULT_RESOURCE_ID: &str = "volc.seedasr.sauc.duration";

fn env_default(var: &str) -> String {
    std::env::var(var).unwrap_or_default()
}

/// Immutable-after-init session configuration.
///
/// Mirrors the builder shape of `outfox_doubao::config::DoubaoConfig`:
/// construct with [`Config::new`] (reads `ANYTALK_*` environment
/// variables), override fields with the `with_*` methods.
#[derive(Clone)]
pub struct Config {
    app_id: String,
    access_token: SecretString,
    resource_id: String,
    mode: Mode,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("app_id", &self.app_id)
            .field("access_token", &"[redacted]")
            .field("resource_id", &self.resource_id)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Build a configuration from `ANYTALK_*` environment variables,
    /// falling back to this module's defaults for resource id and mode.
    #[must_use]
    pub fn new() -> Self {
        Self {
            app_id: env_default("ANYTALK_APP_ID"),
            access_token: env_default("ANYTALK_ACCESS_TOKEN").into(),
            resource_id: std::env::var("ANYTALK_RESOURCE_ID")
                .unwrap_or_else(|_| DEFAULT_RESOURCE_ID.to_string()),
            mode: std::env::var("ANYTALK_MODE")
                .map(|s| Mode::parse(&s))
                .unwrap_or(Mode::BidiAsync),
        }
    }

    /// Set the application id (`X-Api-App-Key`).
    #[must_use]
    pub fn with_app_id<S: Into<String>>(mut self, app_id: S) -> Self {
        self.app_id = app_id.into();
        self
    }

    /// Set the access key (`X-Api-Access-Key`).
    #[must_use]
    pub fn with_access_token<S: Into<String>>(mut self, access_token: S) -> Self {
        self.access_token = SecretString::from(access_token.into());
        self
    }

    /// Set the resource id (`X-Api-Resource-Id`).
    #[must_use]
    pub fn with_resource_id<S: Into<String>>(mut self, resource_id: S) -> Self {
        self.resource_id = resource_id.into();
        self
    }

    /// Set the streaming mode.
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// The application id.
    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// The access token (exposed secret).
    #[must_use]
    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// The resource id.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// The streaming mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parse_defaults_to_bidi_async() {
        assert_eq!(Mode::parse("bogus"), Mode::BidiAsync);
        assert_eq!(Mode::parse("bidi"), Mode::Bidi);
        assert_eq!(Mode::parse("nostream"), Mode::NoStream);
    }

    #[test]
    fn mode_paths_match_known_endpoints() {
        assert_eq!(Mode::Bidi.path(), "/api/v3/sauc/bigmodel");
        assert_eq!(Mode::BidiAsync.path(), "/api/v3/sauc/bigmodel_async");
        assert_eq!(Mode::NoStream.path(), "/api/v3/sauc/bigmodel_nostream");
    }

    #[test]
    fn config_debug_redacts_access_token() {
        let cfg = Config::new().with_access_token("super-secret");
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("super-secret"));
    }
}
