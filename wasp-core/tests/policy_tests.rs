use wasp_core::config::PolicyConfig;
use wasp_core::{ToolDecision, ToolPolicy, TrustLevel};

fn default_policy() -> ToolPolicy {
    ToolPolicy::from_config(&PolicyConfig::default())
}

#[test]
fn trusted_and_sovereign_turns_allow_everything() {
    let policy = default_policy();
    for trust in [TrustLevel::Trusted, TrustLevel::Sovereign] {
        for tool in ["exec", "write", "web_search", "never_heard_of_it"] {
            assert!(
                policy.decide(tool, Some(trust)).is_allowed(),
                "{trust} must allow {tool}"
            );
        }
    }
}

#[test]
fn limited_and_unknown_turns_block_dangerous_tools() {
    let policy = default_policy();
    for trust in [Some(TrustLevel::Limited), None] {
        for tool in ["exec", "write", "message", "gateway", "Edit", "Write"] {
            match policy.decide(tool, trust) {
                ToolDecision::Block { reason } => {
                    assert!(
                        reason.contains("blocked for untrusted sender"),
                        "reason: {reason}"
                    );
                    assert!(reason.contains(tool));
                }
                ToolDecision::Allow => panic!("{tool} must be blocked for {trust:?}"),
            }
        }
    }
}

#[test]
fn safe_tools_are_allowed_for_everyone() {
    let policy = default_policy();
    for tool in ["web_search", "memory_search", "Read", "session_status"] {
        assert!(policy.decide(tool, None).is_allowed());
        assert!(policy.decide(tool, Some(TrustLevel::Limited)).is_allowed());
    }
}

#[test]
fn unlisted_tools_default_to_allow() {
    let policy = default_policy();
    assert!(policy.decide("brand_new_tool", None).is_allowed());
}

#[test]
fn dangerous_wins_when_a_tool_appears_in_both_lists() {
    let cfg = PolicyConfig {
        dangerous_tools: vec!["overlap".into()],
        safe_tools: vec!["overlap".into()],
        default_deny: false,
    };
    let policy = ToolPolicy::from_config(&cfg);
    assert!(!policy.decide("overlap", None).is_allowed());
    // Overlap never loosens: a trusted turn is still allowed.
    assert!(policy
        .decide("overlap", Some(TrustLevel::Sovereign))
        .is_allowed());
}

#[test]
fn default_deny_posture_blocks_unlisted_tools() {
    let cfg = PolicyConfig {
        default_deny: true,
        ..Default::default()
    };
    let policy = ToolPolicy::from_config(&cfg);
    assert!(!policy.decide("brand_new_tool", None).is_allowed());
    // The explicit safe list still allows.
    assert!(policy.decide("web_search", None).is_allowed());
}

#[test]
fn identical_inputs_produce_identical_outputs() {
    let policy = default_policy();
    let a = policy.decide("exec", Some(TrustLevel::Limited));
    let b = policy.decide("exec", Some(TrustLevel::Limited));
    assert_eq!(a, b);
}
