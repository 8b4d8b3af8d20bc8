//! Reusable oracles.

use tpmsasl_core::{ErrorKind, NegotiationState};

use super::OracleFn;

/// Negotiation succeeded and the service saw the token it expected.
pub fn succeeded() -> OracleFn {
    Box::new(|record| {
        if let Err(e) = &record.result {
            return Err(format!("negotiation should succeed, failed with: {e}"));
        }
        if record.presented_token.as_deref() != Some(record.expected_token.as_str()) {
            return Err(format!(
                "service should have received the expected token, got {:?}",
                record.presented_token
            ));
        }
        Ok(())
    })
}

/// Negotiation failed with an error of `kind`.
pub fn failed_with(kind: ErrorKind) -> OracleFn {
    Box::new(move |record| match &record.result {
        Ok(()) => Err(format!("negotiation should fail with {kind:?}, but succeeded")),
        Err(e) if e.kind() == kind => Ok(()),
        Err(e) => Err(format!("negotiation should fail with {kind:?}, got {e}")),
    })
}

/// The service nonce reached the pipeline exactly once, intact.
pub fn nonce_delivered_once() -> OracleFn {
    Box::new(|record| match record.nonces_delivered.as_slice() {
        [nonce] if *nonce == record.service_nonce => Ok(()),
        [nonce] => Err(format!(
            "delivered nonce {} does not match service nonce {}",
            hex::encode(nonce),
            hex::encode(&record.service_nonce)
        )),
        other => {
            Err(format!("nonce should be delivered once, was delivered {} times", other.len()))
        },
    })
}

/// Handler stopped in `state`.
pub fn final_state(state: NegotiationState) -> OracleFn {
    Box::new(move |record| {
        if record.final_state == state {
            Ok(())
        } else {
            Err(format!("final state should be {state}, got {}", record.final_state))
        }
    })
}

/// Device sent exactly `count` frames.
pub fn frames_sent(count: usize) -> OracleFn {
    Box::new(move |record| {
        if record.frames_sent.len() == count {
            Ok(())
        } else {
            Err(format!("device should send {count} frames, sent {}", record.frames_sent.len()))
        }
    })
}

/// Every oracle must pass; reports the first failure.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |record| oracles.iter().try_for_each(|oracle| oracle(record)))
}
