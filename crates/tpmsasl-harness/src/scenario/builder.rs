//! Scenario builder API.
//!
//! Provides a declarative API for constructing negotiation scenarios that
//! enforce the Oracle Pattern.

use std::{sync::PoisonError, time::Duration};

use tpmsasl_core::{DeviceIdentity, NegotiationConfig, SaslListener, TpmSaslHandler};
use tpmsasl_proto::TPM_MECHANISM;

use crate::{
    HarnessError, SasSigner, SimService,
    pipeline::{PipelineMode, credential_pipeline},
    scenario::{NegotiationRecord, OracleFn},
};

const DEFAULT_ID_SCOPE: &str = "0ne00000001";
const DEFAULT_REGISTRATION_ID: &str = "device-1";
const RESOURCE_URI: &str = "0ne00000001/registrations/device-1";
const TOKEN_EXPIRY: u64 = 1_700_000_000;
const SERVICE_KEY: &[u8] = b"provisioning-service-key";
const FOREIGN_KEY: &[u8] = b"some-other-service-key";

/// Scenario builder.
///
/// Defaults to a successful negotiation: the service offers only `TPM`, the
/// pipeline signs immediately, and the device waits the configured default.
/// Must call `.oracle()` to get a [`RunnableScenario`].
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    identity: DeviceIdentity,
    mechanisms: Vec<String>,
    nonce: Vec<u8>,
    mode: PipelineMode,
    config: NegotiationConfig,
    cancel_after: Option<Duration>,
    reject_token: bool,
}

impl Scenario {
    /// Create a new scenario with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: DeviceIdentity {
                id_scope: DEFAULT_ID_SCOPE.to_owned(),
                registration_id: DEFAULT_REGISTRATION_ID.to_owned(),
                endorsement_key: (0u8..64).collect(),
                storage_root_key: (0u8..64).rev().collect(),
            },
            mechanisms: vec![TPM_MECHANISM.to_owned()],
            nonce: (0u8..32).map(|b| b.wrapping_mul(7).wrapping_add(3)).collect(),
            mode: PipelineMode::Sign { delay: Duration::ZERO },
            config: NegotiationConfig::default(),
            cancel_after: None,
            reject_token: false,
        }
    }

    /// Device identity.
    pub fn identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Mechanisms the service offers.
    pub fn mechanisms<I, S>(mut self, mechanisms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mechanisms = mechanisms.into_iter().map(Into::into).collect();
        self
    }

    /// Nonce the service challenges with.
    pub fn nonce(mut self, nonce: impl Into<Vec<u8>>) -> Self {
        self.nonce = nonce.into();
        self
    }

    /// Pipeline signs after `delay`.
    pub fn token_delay(self, delay: Duration) -> Self {
        self.pipeline(PipelineMode::Sign { delay })
    }

    /// Pipeline behavior.
    pub fn pipeline(mut self, mode: PipelineMode) -> Self {
        self.mode = mode;
        self
    }

    /// How long the device waits for the token.
    pub fn token_timeout(mut self, timeout: Duration) -> Self {
        self.config.token_timeout = timeout;
        self
    }

    /// Cancel the token wait `after` the scenario starts.
    pub fn cancel_after(mut self, after: Duration) -> Self {
        self.cancel_after = Some(after);
        self
    }

    /// Service expects tokens signed under a different key than the device
    /// uses.
    pub fn reject_token(mut self) -> Self {
        self.reject_token = true;
        self
    }

    /// Scenario name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the negotiation and collect observations, without judging them.
    pub fn execute(&self) -> Result<NegotiationRecord, HarnessError> {
        let runtime =
            tokio::runtime::Builder::new_multi_thread().worker_threads(1).enable_time().build()?;

        let device_signer = SasSigner::new(SERVICE_KEY, RESOURCE_URI, TOKEN_EXPIRY)?;
        let service_key = if self.reject_token { FOREIGN_KEY } else { SERVICE_KEY };
        let service_signer = SasSigner::new(service_key, RESOURCE_URI, TOKEN_EXPIRY)?;

        let (forwarder, pipeline) = credential_pipeline(self.mode, device_signer);
        let delivered = forwarder.delivered();
        let (handler, submitter) =
            TpmSaslHandler::new(self.identity.clone(), self.config.clone(), forwarder);

        runtime.spawn(pipeline.run(submitter));
        if let Some(after) = self.cancel_after {
            let cancel = handler.cancel_handle();
            runtime.spawn(async move {
                tokio::time::sleep(after).await;
                cancel.cancel();
            });
        }

        tracing::debug!(scenario = self.name(), "running negotiation");

        let mut service =
            SimService::new(self.mechanisms.clone(), self.nonce.clone(), service_signer);
        let mut listener = SaslListener::new(handler);
        let result = service.drive(&mut listener);
        let handler = listener.into_inner();

        runtime.shutdown_background();

        let nonces_delivered = delivered.lock().unwrap_or_else(PoisonError::into_inner).clone();

        Ok(NegotiationRecord {
            result,
            final_state: handler.state(),
            concluded: handler.is_concluded(),
            frames_sent: service.frames().to_vec(),
            nonces_delivered,
            service_nonce: self.nonce.clone(),
            registration: service.registration().cloned(),
            storage_root_key: service.storage_root_key().map(<[u8]>::to_vec),
            presented_token: service.presented_token().map(str::to_owned),
            expected_token: service.expected_token(),
        })
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario and verify it with the oracle.
    pub fn run(self) -> Result<(), String> {
        let name = self.scenario.name();
        let record = self.scenario.execute().map_err(|e| format!("Scenario '{name}': {e}"))?;
        (self.oracle)(&record).map_err(|e| format!("Scenario '{name}': oracle failed: {e}"))
    }
}

impl std::fmt::Debug for RunnableScenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnableScenario")
            .field("scenario", &self.scenario)
            .finish_non_exhaustive()
    }
}
