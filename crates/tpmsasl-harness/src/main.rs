//! `tpmsasl-sim`: run one TPM SASL negotiation against the scripted service.
//!
//! ```text
//! tpmsasl-sim --registration-id dev-7 --token-delay-ms 250
//! RUST_LOG=debug tpmsasl-sim --silent --timeout-ms 500
//! ```

use std::{process::ExitCode, time::Duration};

use clap::Parser;
use tpmsasl_core::DeviceIdentity;
use tpmsasl_harness::{PipelineMode, scenario::Scenario};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tpmsasl-sim", version, about)]
struct Args {
    /// Tenant scope the device registers under
    #[arg(long, default_value = "0ne00000001")]
    id_scope: String,

    /// Device registration id
    #[arg(long, default_value = "device-1")]
    registration_id: String,

    /// Simulated signing latency of the credential pipeline
    #[arg(long, default_value_t = 50)]
    token_delay_ms: u64,

    /// How long the device waits for the token
    #[arg(long, default_value_t = 180_000)]
    timeout_ms: u64,

    /// Service expects a token signed under a different key
    #[arg(long)]
    reject: bool,

    /// Pipeline never submits a token
    #[arg(long, conflicts_with = "abandon")]
    silent: bool,

    /// Pipeline drops its submitter without submitting
    #[arg(long)]
    abandon: bool,
}

impl Args {
    fn scenario(&self) -> Scenario {
        let mode = if self.silent {
            PipelineMode::Silent
        } else if self.abandon {
            PipelineMode::Abandon
        } else {
            PipelineMode::Sign { delay: Duration::from_millis(self.token_delay_ms) }
        };

        let scenario = Scenario::new("tpmsasl-sim")
            .identity(DeviceIdentity {
                id_scope: self.id_scope.clone(),
                registration_id: self.registration_id.clone(),
                endorsement_key: (0u8..64).collect(),
                storage_root_key: (0u8..64).rev().collect(),
            })
            .pipeline(mode)
            .token_timeout(Duration::from_millis(self.timeout_ms));

        if self.reject { scenario.reject_token() } else { scenario }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let record = match args.scenario().execute() {
        Ok(record) => record,
        Err(e) => {
            tracing::error!(error = %e, "simulation could not start");
            return ExitCode::from(2);
        },
    };

    tracing::info!(
        succeeded = record.succeeded(),
        state = %record.final_state,
        frames = record.frames_sent.len(),
        nonce_len = record.service_nonce.len(),
        "negotiation finished"
    );

    match record.result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(kind = ?e.kind(), error = %e, "negotiation failed");
            ExitCode::FAILURE
        },
    }
}
