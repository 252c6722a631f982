use wasp_core::config::{SignatureAction, SignatureConfig};
use wasp_core::{Error, OutboundDecision, SignatureGuard};

fn config(action: SignatureAction) -> SignatureConfig {
    SignatureConfig {
        enabled: true,
        signature: "Δ".to_string(),
        signature_prefix: None,
        action,
        channels: vec!["whatsapp".to_string()],
    }
}

#[test]
fn enabled_guard_without_signature_fails_validation() {
    let cfg = SignatureConfig {
        enabled: true,
        signature: String::new(),
        ..Default::default()
    };
    assert!(matches!(cfg.validate(), Err(Error::Misconfigured(_))));
    assert!(matches!(SignatureGuard::new(cfg), Err(Error::Misconfigured(_))));
}

#[test]
fn disabled_guard_passes_everything_through() {
    let guard = SignatureGuard::new(SignatureConfig::default()).expect("guard");
    assert_eq!(
        guard.inspect("hello", "whatsapp", true),
        OutboundDecision::Pass
    );
}

#[test]
fn unlisted_channel_and_non_agent_messages_pass_through() {
    let guard = SignatureGuard::new(config(SignatureAction::Append)).expect("guard");
    assert_eq!(
        guard.inspect("hello", "telegram", true),
        OutboundDecision::Pass
    );
    assert_eq!(
        guard.inspect("hello", "whatsapp", false),
        OutboundDecision::Pass
    );
}

#[test]
fn append_adds_two_newlines_then_signature() {
    let guard = SignatureGuard::new(config(SignatureAction::Append)).expect("guard");
    match guard.inspect("hello", "whatsapp", true) {
        OutboundDecision::Rewrite { content } => {
            assert_eq!(content, "hello\n\nΔ");
        }
        other => panic!("expected rewrite, got {other:?}"),
    }
}

#[test]
fn append_honors_the_optional_prefix() {
    let mut cfg = config(SignatureAction::Append);
    cfg.signature_prefix = Some("-- ".to_string());
    let guard = SignatureGuard::new(cfg).expect("guard");
    match guard.inspect("hello", "whatsapp", true) {
        OutboundDecision::Rewrite { content } => {
            assert_eq!(content, "hello\n\n-- Δ");
        }
        other => panic!("expected rewrite, got {other:?}"),
    }
}

#[test]
fn already_signed_content_is_left_alone() {
    let guard = SignatureGuard::new(config(SignatureAction::Append)).expect("guard");
    let signed = match guard.inspect("hello", "whatsapp", true) {
        OutboundDecision::Rewrite { content } => content,
        other => panic!("expected rewrite, got {other:?}"),
    };
    // A second pass over the signed content must not stack markers.
    assert_eq!(
        guard.inspect(&signed, "whatsapp", true),
        OutboundDecision::Pass
    );
}

#[test]
fn block_action_refuses_unsigned_sends() {
    let guard = SignatureGuard::new(config(SignatureAction::Block)).expect("guard");
    match guard.inspect("hello", "whatsapp", true) {
        OutboundDecision::Block { reason } => assert_eq!(reason, "missing signature"),
        other => panic!("expected block, got {other:?}"),
    }
    // Signed content sails through even under block.
    assert_eq!(
        guard.inspect("hello Δ", "whatsapp", true),
        OutboundDecision::Pass
    );
}
