use super::{
    AttemptFailure, CertificateLifecycleEngineBuilder, EngineConfig, EngineState, EngineUpdates,
    LifecycleError,
};
use crate::authority::AuthorityClient;
use crate::cert::{CertUtil, CsrGenerator, CsrOptions};
use crate::credential::{ttl_minutes, CsrArtifact, CsrRequest, Identity, IssuedCertificate};
use crate::platform::IdentityProvider;
use crate::prelude::{error, info, warn};
use crate::secrets::SecretSink;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;

/// Issues and renews the node identity certificate.
///
/// Build with [`CertificateLifecycleEngine::builder`], observe with
/// [`updates`](Self::updates), then drive with [`run`](Self::run). At most one
/// engine should run per node identity.
pub struct CertificateLifecycleEngine {
    pub(super) config: EngineConfig,
    pub(super) platform: Arc<dyn IdentityProvider>,
    pub(super) authority: Arc<dyn AuthorityClient>,
    pub(super) sink: Arc<dyn SecretSink>,
    pub(super) cert_util: Arc<dyn CertUtil>,
    pub(super) csr_generator: Arc<dyn CsrGenerator>,
    pub(super) state_tx: watch::Sender<EngineState>,
}

impl fmt::Debug for CertificateLifecycleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateLifecycleEngine")
            .field("config", &self.config)
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl CertificateLifecycleEngine {
    /// Returns a builder.
    pub fn builder() -> CertificateLifecycleEngineBuilder {
        CertificateLifecycleEngineBuilder::new()
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribes to state transitions.
    pub fn updates(&self) -> EngineUpdates {
        EngineUpdates {
            rx: self.state_tx.subscribe(),
        }
    }

    /// Runs the issue/renew loop.
    ///
    /// Returns only when the engine hits a terminal condition, after
    /// publishing [`EngineState::Fatal`].
    ///
    /// # Errors
    ///
    /// Always returns a [`LifecycleError`] describing why the engine stopped:
    /// unsupported platform, missing identity or credential, CSR generation
    /// failure, a failed secret write, or exhausted retries.
    pub async fn run(self) -> Result<Infallible, LifecycleError> {
        let err = match self.run_loop().await {
            Err(e) => e,
            Ok(never) => match never {},
        };
        error!("Lifecycle engine terminated: error={err}");
        self.publish(EngineState::Fatal);
        Err(err)
    }

    async fn run_loop(&self) -> Result<Infallible, LifecycleError> {
        if !self.platform.is_proper_platform() {
            return Err(LifecycleError::NotProperPlatform);
        }

        let identity = self
            .platform
            .service_identity()
            .map_err(LifecycleError::Identity)?;
        info!("Lifecycle engine started: identity={identity}");

        let policy = self.config.retry;
        let mut retry = policy.initial_state();

        loop {
            self.publish(EngineState::Issuing);
            let (artifact, request) = self.create_request(&identity).await?;

            info!("Sending CSR: retry={}", retry.attempts());
            self.publish(EngineState::AwaitingApproval);

            match self.attempt(&request).await {
                Ok((issued, wait)) => {
                    self.persist(&issued, &artifact)?;
                    policy.reset(&mut retry);
                    self.publish(EngineState::Active);
                    info!("CSR approved: renew_in={wait:?}");
                    tokio::time::sleep(wait).await;
                }
                Err(failure) => {
                    let (interval, exhausted) = policy.next_interval(&retry);
                    if exhausted {
                        return Err(LifecycleError::RetriesExhausted {
                            attempts: retry.attempts(),
                            last: failure,
                        });
                    }
                    log_failure(&failure, interval);
                    self.publish(EngineState::BackingOff);
                    policy.record_failure(&mut retry);
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    async fn create_request(
        &self,
        identity: &Identity,
    ) -> Result<(CsrArtifact, CsrRequest), LifecycleError> {
        let options = CsrOptions {
            host: identity.as_str().to_owned(),
            org: self.config.organization.clone(),
            rsa_key_size: self.config.rsa_key_size,
        };
        let generator = Arc::clone(&self.csr_generator);
        let generated = tokio::task::spawn_blocking(move || generator.generate(&options)).await??;

        let credential = self
            .platform
            .agent_credential()
            .map_err(LifecycleError::Credential)?;

        let ttl = self.config.workload_cert_ttl;
        let request = CsrRequest {
            csr_pem: generated.csr_pem.clone(),
            credential,
            credential_type: self.platform.credential_type(),
            requested_ttl_minutes: ttl_minutes(ttl),
            for_ca: false,
        };
        let artifact = CsrArtifact::new(generated.csr_pem, generated.private_key_pem, ttl);
        Ok((artifact, request))
    }

    async fn attempt(
        &self,
        request: &CsrRequest,
    ) -> Result<(IssuedCertificate, Duration), AttemptFailure> {
        let issued = self
            .authority
            .send_csr(request, self.platform.as_ref(), &self.config.authority_address)
            .await
            .map_err(AttemptFailure::Transport)?;

        if !issued.approved {
            return Err(AttemptFailure::Rejected);
        }
        if issued.is_empty() {
            return Err(AttemptFailure::EmptyResponse);
        }

        let wait = self
            .cert_util
            .wait_time(&issued.signed_cert, SystemTime::now())
            .map_err(AttemptFailure::RenewalWait)?;
        Ok((issued, wait))
    }

    fn persist(&self, issued: &IssuedCertificate, artifact: &CsrArtifact) -> Result<(), LifecycleError> {
        self.sink
            .set_identity_cert(&issued.full_chain())
            .map_err(LifecycleError::WriteCertificate)?;
        self.sink
            .set_identity_private_key(artifact.private_key())
            .map_err(LifecycleError::WritePrivateKey)
    }

    fn publish(&self, state: EngineState) {
        self.state_tx.send_replace(state);
    }
}

fn log_failure(failure: &AttemptFailure, retry_in: Duration) {
    match failure {
        AttemptFailure::Transport(e) => {
            warn!("CSR signing failed: error={e}, retry_in={retry_in:?}");
        }
        AttemptFailure::Rejected => {
            warn!("CSR signing failed: request not approved, retry_in={retry_in:?}");
        }
        AttemptFailure::EmptyResponse => {
            warn!("CSR signing failed: response empty, retry_in={retry_in:?}");
        }
        AttemptFailure::RenewalWait(e) => {
            warn!("Issued certificate unusable: error={e}, retry_in={retry_in:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::AuthorityError;
    use crate::cert::{CertError, CsrError, GeneratedCsr};
    use crate::platform::PlatformError;
    use crate::retry::RetryPolicy;
    use crate::secrets::SecretError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;
    use zeroize::Zeroizing;

    struct FakePlatform {
        proper: bool,
        identity_fails: bool,
        credential_fails: bool,
    }

    impl FakePlatform {
        fn proper() -> Self {
            Self {
                proper: true,
                identity_fails: false,
                credential_fails: false,
            }
        }
    }

    impl IdentityProvider for FakePlatform {
        fn is_proper_platform(&self) -> bool {
            self.proper
        }

        fn service_identity(&self) -> Result<Identity, PlatformError> {
            if self.identity_fails {
                return Err(PlatformError::Other("no node certificate".into()));
            }
            Ok(Identity::new("spiffe://cluster.local/ns/default/sa/node"))
        }

        fn agent_credential(&self) -> Result<Vec<u8>, PlatformError> {
            if self.credential_fails {
                return Err(PlatformError::Other("credential unreadable".into()));
            }
            Ok(b"platform-credential".to_vec())
        }

        fn credential_type(&self) -> String {
            "onprem".to_string()
        }
    }

    #[derive(Clone, Copy)]
    enum Reply {
        Approve,
        Reject,
        Empty,
        Unavailable,
    }

    /// Replays scripted answers; once the script is exhausted every call is rejected.
    #[derive(Default)]
    struct FakeAuthority {
        script: Mutex<VecDeque<Reply>>,
        calls: Mutex<Vec<(Instant, CsrRequest)>>,
    }

    impl FakeAuthority {
        fn new(script: impl IntoIterator<Item = Reply>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().collect()),
                calls: Mutex::default(),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }
    }

    #[async_trait]
    impl AuthorityClient for FakeAuthority {
        async fn send_csr(
            &self,
            request: &CsrRequest,
            _platform: &dyn IdentityProvider,
            _address: &str,
        ) -> Result<IssuedCertificate, AuthorityError> {
            self.calls
                .lock()
                .unwrap()
                .push((Instant::now(), request.clone()));
            let reply = self.script.lock().unwrap().pop_front().unwrap_or(Reply::Reject);
            match reply {
                Reply::Approve => Ok(IssuedCertificate::approved("LEAF\n", "CHAIN\n")),
                Reply::Reject => Ok(IssuedCertificate::rejected()),
                Reply::Empty => Ok(IssuedCertificate {
                    approved: true,
                    ..IssuedCertificate::default()
                }),
                Reply::Unavailable => Err(AuthorityError::Status(tonic::Status::unavailable(
                    "authority down",
                ))),
            }
        }
    }

    #[derive(Default)]
    struct MemorySink {
        fail_cert: bool,
        fail_key: bool,
        writes: Mutex<Vec<(&'static str, Vec<u8>)>>,
    }

    impl SecretSink for MemorySink {
        fn set_identity_cert(&self, cert_chain_pem: &[u8]) -> Result<(), SecretError> {
            if self.fail_cert {
                return Err(SecretError::Other("disk full".into()));
            }
            self.writes
                .lock()
                .unwrap()
                .push(("cert", cert_chain_pem.to_vec()));
            Ok(())
        }

        fn set_identity_private_key(&self, key_pem: &[u8]) -> Result<(), SecretError> {
            if self.fail_key {
                return Err(SecretError::Other("read-only key file".into()));
            }
            self.writes.lock().unwrap().push(("key", key_pem.to_vec()));
            Ok(())
        }
    }

    /// Answers a fixed wait, after failing the first `failures` calls.
    struct FixedWait {
        wait: Duration,
        failures: Mutex<u32>,
    }

    impl FixedWait {
        fn new(wait: Duration) -> Self {
            Self::failing(wait, 0)
        }

        fn failing(wait: Duration, failures: u32) -> Self {
            Self {
                wait,
                failures: Mutex::new(failures),
            }
        }
    }

    impl CertUtil for FixedWait {
        fn wait_time(&self, _cert_pem: &[u8], _now: SystemTime) -> Result<Duration, CertError> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(CertError::MissingSubjectAltName);
            }
            Ok(self.wait)
        }
    }

    /// Numbers every key so tests can tell attempts apart.
    #[derive(Default)]
    struct CountingCsrGenerator {
        generated: Mutex<u32>,
    }

    impl CsrGenerator for CountingCsrGenerator {
        fn generate(&self, options: &CsrOptions) -> Result<GeneratedCsr, CsrError> {
            let mut n = self.generated.lock().unwrap();
            *n += 1;
            Ok(GeneratedCsr {
                csr_pem: format!("CSR for {}", options.host).into_bytes(),
                private_key_pem: Zeroizing::new(format!("KEY {n}").into_bytes()),
            })
        }
    }

    struct Harness {
        authority: Arc<FakeAuthority>,
        sink: Arc<MemorySink>,
        engine: CertificateLifecycleEngine,
    }

    fn harness(script: Vec<Reply>, max_attempts: u32, sink: MemorySink) -> Harness {
        harness_with(
            script,
            max_attempts,
            FakePlatform::proper(),
            sink,
            FixedWait::new(Duration::from_secs(600)),
        )
    }

    fn harness_with(
        script: Vec<Reply>,
        max_attempts: u32,
        platform: FakePlatform,
        sink: MemorySink,
        wait: FixedWait,
    ) -> Harness {
        let authority = FakeAuthority::new(script);
        let sink = Arc::new(sink);
        let config = EngineConfig {
            organization: "example".into(),
            retry: RetryPolicy::new(Duration::from_secs(1), max_attempts),
            ..EngineConfig::default()
        };
        let engine = CertificateLifecycleEngine::builder()
            .config(config)
            .identity_provider(Arc::new(platform))
            .authority(authority.clone())
            .secret_sink(sink.clone())
            .cert_util(Arc::new(wait))
            .csr_generator(Arc::new(CountingCsrGenerator::default()))
            .build()
            .unwrap();
        Harness {
            authority,
            sink,
            engine,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_renews_after_wait_time() {
        let h = harness(vec![Reply::Approve, Reply::Approve], 0, MemorySink::default());

        let err = h.engine.run().await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::RetriesExhausted {
                attempts: 0,
                last: AttemptFailure::Rejected
            }
        ));

        let times = h.authority.call_times();
        assert_eq!(times.len(), 3);
        let gap = times[1] - times[0];
        assert!(gap >= Duration::from_secs(600), "renewed too early: {gap:?}");
        assert!(gap < Duration::from_secs(601), "renewed too late: {gap:?}");

        let writes = h.sink.writes.lock().unwrap();
        assert_eq!(writes.len(), 4);
        assert_eq!(writes[0], ("cert", b"LEAF\nCHAIN\n".to_vec()));
        assert_eq!(writes[1], ("key", b"KEY 1".to_vec()));
        assert_eq!(writes[3], ("key", b"KEY 2".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_carries_identity_credential_and_ttl() {
        let h = harness(vec![], 0, MemorySink::default());
        let _ = h.engine.run().await;

        let calls = h.authority.calls.lock().unwrap();
        let (_, request) = &calls[0];
        assert_eq!(
            request.csr_pem,
            b"CSR for spiffe://cluster.local/ns/default/sa/node".to_vec()
        );
        assert_eq!(request.credential, b"platform-credential".to_vec());
        assert_eq!(request.credential_type, "onprem");
        assert_eq!(request.requested_ttl_minutes, 19 * 60);
        assert!(!request.for_ca);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_failures() {
        let h = harness(
            vec![Reply::Unavailable, Reply::Reject, Reply::Empty, Reply::Approve],
            10,
            MemorySink::default(),
        );
        let mut updates = h.engine.updates();
        let authority = h.authority.clone();

        let task = tokio::spawn(h.engine.run());
        let state = updates
            .wait_for(|s| *s == EngineState::Active)
            .await
            .unwrap();
        assert_eq!(state, EngineState::Active);

        let times = authority.call_times();
        assert_eq!(times.len(), 4);
        assert_eq!(times[1] - times[0], Duration::from_secs(1));
        assert_eq!(times[2] - times[1], Duration::from_secs(2));
        assert_eq!(times[3] - times[2], Duration::from_secs(4));

        let writes = h.sink.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 2);
        // Keys from failed attempts are never persisted.
        assert_eq!(writes[1], ("key", b"KEY 4".to_vec()));

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let h = harness(vec![], 5, MemorySink::default());
        let mut updates = h.engine.updates();

        let err = h.engine.run().await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::RetriesExhausted { attempts: 5, .. }
        ));
        assert_eq!(updates.last(), EngineState::Fatal);
        assert_eq!(updates.changed().await.unwrap(), EngineState::Fatal);
        assert!(updates.changed().await.is_err());

        let times = h.authority.call_times();
        assert_eq!(times.len(), 6);
        let deltas: Vec<u64> = times.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
        assert_eq!(deltas, vec![1, 2, 4, 8, 16]);
        assert!(h.sink.writes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_restarts_after_success() {
        let h = harness(
            vec![Reply::Reject, Reply::Reject, Reply::Approve],
            2,
            MemorySink::default(),
        );
        let err = h.engine.run().await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::RetriesExhausted { attempts: 2, .. }
        ));

        let times = h.authority.call_times();
        assert_eq!(times.len(), 6);
        let deltas: Vec<u64> = times.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
        assert_eq!(deltas, vec![1, 2, 600, 1, 2]);
    }

    #[tokio::test]
    async fn test_wrong_platform_is_fatal() {
        let authority = FakeAuthority::new(vec![]);
        let engine = CertificateLifecycleEngine::builder()
            .identity_provider(Arc::new(FakePlatform {
                proper: false,
                ..FakePlatform::proper()
            }))
            .authority(authority.clone())
            .secret_sink(Arc::new(MemorySink::default()))
            .build()
            .unwrap();

        let err = engine.run().await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotProperPlatform));
        assert!(authority.call_times().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_secret_write_failure_is_fatal() {
        let h = harness(
            vec![Reply::Approve],
            10,
            MemorySink {
                fail_cert: true,
                ..MemorySink::default()
            },
        );
        let err = h.engine.run().await.unwrap_err();
        assert!(matches!(err, LifecycleError::WriteCertificate(_)));
        assert_eq!(h.authority.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_write_failure_is_fatal() {
        let h = harness(
            vec![Reply::Approve],
            10,
            MemorySink {
                fail_key: true,
                ..MemorySink::default()
            },
        );
        let mut updates = h.engine.updates();

        let err = h.engine.run().await.unwrap_err();
        assert!(matches!(err, LifecycleError::WritePrivateKey(_)));
        assert_eq!(updates.last(), EngineState::Fatal);
        assert_eq!(h.authority.call_times().len(), 1);
        // The certificate went out before the key write failed.
        let writes = h.sink.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "cert");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_identity_is_fatal() {
        let h = harness_with(
            vec![Reply::Approve],
            10,
            FakePlatform {
                identity_fails: true,
                ..FakePlatform::proper()
            },
            MemorySink::default(),
            FixedWait::new(Duration::from_secs(600)),
        );
        let mut updates = h.engine.updates();

        let err = h.engine.run().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Identity(PlatformError::Other(_))));
        assert_eq!(updates.last(), EngineState::Fatal);
        assert!(h.authority.call_times().is_empty());
        assert!(h.sink.writes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credential_is_fatal() {
        let h = harness_with(
            vec![Reply::Approve],
            10,
            FakePlatform {
                credential_fails: true,
                ..FakePlatform::proper()
            },
            MemorySink::default(),
            FixedWait::new(Duration::from_secs(600)),
        );

        let err = h.engine.run().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Credential(PlatformError::Other(_))));
        assert!(h.authority.call_times().is_empty());
        assert!(h.sink.writes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unusable_certificate_is_retried() {
        let h = harness_with(
            vec![Reply::Approve, Reply::Approve],
            10,
            FakePlatform::proper(),
            MemorySink::default(),
            FixedWait::failing(Duration::from_secs(600), 1),
        );
        let mut updates = h.engine.updates();
        let authority = h.authority.clone();

        let task = tokio::spawn(h.engine.run());
        updates
            .wait_for(|s| *s == EngineState::Active)
            .await
            .unwrap();

        let times = authority.call_times();
        assert_eq!(times.len(), 2);
        assert_eq!(times[1] - times[0], Duration::from_secs(1));

        let writes = h.sink.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1], ("key", b"KEY 2".to_vec()));

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unusable_certificate_exhausts_retries() {
        let h = harness_with(
            vec![Reply::Approve, Reply::Approve],
            1,
            FakePlatform::proper(),
            MemorySink::default(),
            FixedWait::failing(Duration::from_secs(600), 2),
        );

        let err = h.engine.run().await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::RetriesExhausted {
                attempts: 1,
                last: AttemptFailure::RenewalWait(CertError::MissingSubjectAltName)
            }
        ));
        assert_eq!(h.authority.call_times().len(), 2);
        assert!(h.sink.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let err = CertificateLifecycleEngine::builder()
            .identity_provider(Arc::new(FakePlatform::proper()))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::MissingCollaborator("authority client")
        ));
    }
}
