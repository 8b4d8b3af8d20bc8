//! Simulated credential pipeline.
//!
//! Receives the nonce from the negotiation thread, "signs" it on the async
//! runtime and submits the SAS token back through the gate. The modes cover
//! the ways a real pipeline can behave from the negotiation's point of view.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::sync::mpsc;
use tpmsasl_core::{Nonce, NonceCallback, TokenSubmitter};

use crate::sas::SasSigner;

/// How the pipeline reacts to the nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Sign the nonce after `delay` and submit the token
    Sign {
        /// Simulated signing latency
        delay: Duration,
    },
    /// Keep the submitter but never submit
    Silent,
    /// Drop the submitter without submitting
    Abandon,
}

/// Nonces handed to the pipeline, in delivery order.
pub type DeliveredNonces = Arc<Mutex<Vec<Vec<u8>>>>;

/// [`NonceCallback`] that records the nonce and forwards it to the pipeline.
#[derive(Debug)]
pub struct NonceForwarder {
    tx: mpsc::UnboundedSender<Nonce>,
    delivered: DeliveredNonces,
}

impl NonceForwarder {
    /// Shared record of delivered nonces.
    pub fn delivered(&self) -> DeliveredNonces {
        Arc::clone(&self.delivered)
    }
}

impl NonceCallback for NonceForwarder {
    fn provide_nonce(&mut self, nonce: &Nonce) {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(nonce.as_bytes().to_vec());
        if self.tx.send(nonce.clone()).is_err() {
            tracing::warn!("credential pipeline is gone; nonce dropped");
        }
    }
}

/// Async side of the pipeline.
#[derive(Debug)]
pub struct CredentialPipeline {
    mode: PipelineMode,
    signer: SasSigner,
    rx: mpsc::UnboundedReceiver<Nonce>,
}

/// Create a forwarder/pipeline pair.
pub fn credential_pipeline(
    mode: PipelineMode,
    signer: SasSigner,
) -> (NonceForwarder, CredentialPipeline) {
    let (tx, rx) = mpsc::unbounded_channel();
    let forwarder = NonceForwarder { tx, delivered: DeliveredNonces::default() };
    (forwarder, CredentialPipeline { mode, signer, rx })
}

impl CredentialPipeline {
    /// Serve one nonce.
    pub async fn run(mut self, submitter: TokenSubmitter) {
        if self.mode == PipelineMode::Abandon {
            tracing::debug!("credential pipeline abandons the negotiation");
            drop(submitter);
            return;
        }

        let Some(nonce) = self.rx.recv().await else {
            tracing::debug!("negotiation ended before a nonce arrived");
            return;
        };

        match self.mode {
            PipelineMode::Sign { delay } => {
                tracing::debug!(nonce_len = nonce.len(), ?delay, "signing nonce");
                tokio::time::sleep(delay).await;
                submitter.submit(self.signer.sign(nonce.as_bytes()));
            },
            PipelineMode::Silent => {
                tracing::debug!("credential pipeline holds the token back");
                std::future::pending::<()>().await;
                drop(submitter);
            },
            PipelineMode::Abandon => drop(submitter),
        }
    }
}
