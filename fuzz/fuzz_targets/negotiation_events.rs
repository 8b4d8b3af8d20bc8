//! Fuzz target: arbitrary SASL event sequences against the device handler.
//!
//! Input is a stream of events. Each event starts with an opcode byte:
//!
//! - `0`: mechanism list, next byte selects whether `TPM` is offered
//! - `1`: challenge, next byte is the length of the payload that follows
//! - `2`: outcome, next byte is the raw outcome code
//!
//! The token is submitted up front and the timeout is tiny, so no input can
//! block. Checked properties:
//!
//! - the handler never panics
//! - the state only moves forward
//! - every error concludes the negotiation
//! - a concluded negotiation rejects further mechanisms and challenges

#![no_main]

use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use tpmsasl_core::{DeviceIdentity, NegotiationConfig, Nonce, SaslHandler, TpmSaslHandler};
use tpmsasl_proto::SaslOutcome;

fuzz_target!(|data: &[u8]| {
    let identity = DeviceIdentity {
        id_scope: "scope".to_owned(),
        registration_id: "dev".to_owned(),
        endorsement_key: vec![0x01, 0x00, 0x02],
        storage_root_key: vec![0x03, 0x04],
    };
    let config =
        NegotiationConfig { token_timeout: Duration::from_millis(1), ..Default::default() };
    let mut delivered = 0usize;
    let (mut handler, submitter) =
        TpmSaslHandler::new(identity, config, |_: &Nonce| delivered += 1);
    submitter.submit("token");

    let mut input = data.iter().copied();
    while let Some(op) = input.next() {
        let was_concluded = handler.is_concluded();
        let before = handler.state();

        let failed = match op % 3 {
            0 => {
                let offered: &[&str] =
                    if input.next().unwrap_or(0) & 1 == 1 { &["TPM"] } else { &["PLAIN"] };
                handler.handle_mechanisms(offered).is_err()
            },
            1 => {
                let len = usize::from(input.next().unwrap_or(0));
                let challenge: Vec<u8> = input.by_ref().take(len).collect();
                handler.handle_challenge(&challenge).is_err()
            },
            _ => {
                let code = i8::from_ne_bytes([input.next().unwrap_or(0)]);
                handler.handle_outcome(SaslOutcome::from_code(code)).is_err()
            },
        };

        assert!(handler.state() >= before, "state moved backwards from {before}");
        if failed {
            assert!(handler.is_concluded(), "error left negotiation open");
        }
        if was_concluded && op % 3 != 2 {
            assert!(failed, "concluded negotiation accepted another event");
        }
    }

    drop(handler);
    assert!(delivered <= 1, "nonce delivered {delivered} times");
});
