//! Byte-exact trace of a full negotiation.

use std::time::Duration;

use hex_literal::hex;
use tpmsasl_core::{
    DeviceIdentity, Nonce, NegotiationConfig, NegotiationState, SaslListener, TpmSaslHandler,
};
use tpmsasl_harness::{SasSigner, SimService};
use tpmsasl_proto::SaslOutcome;

fn identity() -> DeviceIdentity {
    DeviceIdentity {
        id_scope: "scope".to_owned(),
        registration_id: "dev".to_owned(),
        endorsement_key: hex!("0102").to_vec(),
        storage_root_key: hex!("0304").to_vec(),
    }
}

#[test]
fn device_frames_match_wire_format() {
    let nonce = hex!("aabbccdd");
    let signer = SasSigner::new(b"key", "scope/registrations/dev", 1).unwrap();
    let token = signer.sign(&nonce);
    let mut service = SimService::new(vec!["TPM".into()], nonce.to_vec(), signer);

    let mut seen = Vec::new();
    let config = NegotiationConfig { token_timeout: Duration::from_secs(5), ..Default::default() };
    let (handler, submitter) =
        TpmSaslHandler::new(identity(), config, |n: &Nonce| seen.push(n.as_bytes().to_vec()));
    // Token may arrive before the device starts waiting for it.
    submitter.submit(token.clone());

    let mut listener = SaslListener::new(handler);
    service.drive(&mut listener).unwrap();
    assert_eq!(listener.handler().state(), NegotiationState::AwaitingOutcome);
    drop(listener);

    let frames = service.frames();
    assert_eq!(frames.len(), 4);
    assert_eq!(&frames[0][..], hex!("00 73636f7065 00 646576 00 0102"));
    assert_eq!(&frames[1][..], hex!("00 0304"));
    assert_eq!(&frames[2][..], hex!("00"));
    assert_eq!(frames[3][0], 0x00);
    assert_eq!(&frames[3][1..], token.as_bytes());

    assert_eq!(service.accepted_mechanisms(), ["TPM"]);
    assert_eq!(service.outcome(), Some(SaslOutcome::Ok));
    assert_eq!(seen, vec![nonce.to_vec()]);
}

#[test]
fn odd_length_nonce_is_reassembled() {
    let nonce = hex!("0102030405");
    let signer = SasSigner::new(b"key", "scope/registrations/dev", 1).unwrap();
    let token = signer.sign(&nonce);
    let mut service = SimService::new(vec!["TPM".into()], nonce.to_vec(), signer);

    let (handler, submitter) =
        TpmSaslHandler::new(identity(), NegotiationConfig::default(), |_: &Nonce| {});
    submitter.submit(token);

    let mut listener = SaslListener::new(handler);
    service.drive(&mut listener).unwrap();

    assert_eq!(service.outcome(), Some(SaslOutcome::Ok));
}
