use super::{CertificateLifecycleEngine, EngineConfig, EngineState, LifecycleError};
use crate::authority::AuthorityClient;
use crate::cert::{CertUtil, CsrGenerator, RsaCsrGenerator, X509CertUtil};
use crate::platform::IdentityProvider;
use crate::secrets::SecretSink;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Builder for [`CertificateLifecycleEngine`].
///
/// The identity provider, authority client and secret sink are required.
/// The certificate utility defaults to [`X509CertUtil`] and the CSR generator
/// to [`RsaCsrGenerator`].
pub struct CertificateLifecycleEngineBuilder {
    config: EngineConfig,
    platform: Option<Arc<dyn IdentityProvider>>,
    authority: Option<Arc<dyn AuthorityClient>>,
    sink: Option<Arc<dyn SecretSink>>,
    cert_util: Option<Arc<dyn CertUtil>>,
    csr_generator: Option<Arc<dyn CsrGenerator>>,
}

impl fmt::Debug for CertificateLifecycleEngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateLifecycleEngineBuilder")
            .field("config", &self.config)
            .field("platform", &self.platform.as_ref().map(|_| "<IdentityProvider>"))
            .field("authority", &self.authority.as_ref().map(|_| "<AuthorityClient>"))
            .field("sink", &self.sink.as_ref().map(|_| "<SecretSink>"))
            .field("cert_util", &self.cert_util.as_ref().map(|_| "<CertUtil>"))
            .field(
                "csr_generator",
                &self.csr_generator.as_ref().map(|_| "<CsrGenerator>"),
            )
            .finish()
    }
}

impl Default for CertificateLifecycleEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CertificateLifecycleEngineBuilder {
    /// Creates a builder with [`EngineConfig::default`] and no collaborators.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            platform: None,
            authority: None,
            sink: None,
            cert_util: None,
            csr_generator: None,
        }
    }

    /// Sets the engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the identity provider.
    #[must_use]
    pub fn identity_provider(mut self, platform: Arc<dyn IdentityProvider>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Sets the authority client.
    #[must_use]
    pub fn authority(mut self, authority: Arc<dyn AuthorityClient>) -> Self {
        self.authority = Some(authority);
        self
    }

    /// Sets where issued credentials are written.
    #[must_use]
    pub fn secret_sink(mut self, sink: Arc<dyn SecretSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Overrides the renewal wait computation.
    #[must_use]
    pub fn cert_util(mut self, cert_util: Arc<dyn CertUtil>) -> Self {
        self.cert_util = Some(cert_util);
        self
    }

    /// Overrides CSR generation.
    #[must_use]
    pub fn csr_generator(mut self, csr_generator: Arc<dyn CsrGenerator>) -> Self {
        self.csr_generator = Some(csr_generator);
        self
    }

    /// Builds the engine. Nothing runs until [`CertificateLifecycleEngine::run`].
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::MissingCollaborator`] if a required
    /// collaborator was not set.
    pub fn build(self) -> Result<CertificateLifecycleEngine, LifecycleError> {
        let platform = self
            .platform
            .ok_or(LifecycleError::MissingCollaborator("identity provider"))?;
        let authority = self
            .authority
            .ok_or(LifecycleError::MissingCollaborator("authority client"))?;
        let sink = self
            .sink
            .ok_or(LifecycleError::MissingCollaborator("secret sink"))?;

        let (state_tx, _) = watch::channel(EngineState::Idle);

        Ok(CertificateLifecycleEngine {
            config: self.config,
            platform,
            authority,
            sink,
            cert_util: self
                .cert_util
                .unwrap_or_else(|| Arc::new(X509CertUtil::default())),
            csr_generator: self
                .csr_generator
                .unwrap_or_else(|| Arc::new(RsaCsrGenerator)),
            state_tx,
        })
    }
}
