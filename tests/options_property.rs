use proptest::prelude::*;
use procwarden::config::OptionSet;
use procwarden::registry::{Marker, ProcessSnapshot};
use procwarden::types::InstanceId;

fn token_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "-X[a-z]{2,3}[0-9]{1,4}[mg]",
        "-D[a-z]{1,8}=[a-z0-9]{0,8}",
        "-D[a-z]{1,8}=[a-z]{1,4} [a-z]{1,4}",
        "--[a-z]{2,10}",
    ]
}

proptest! {
    #[test]
    fn parse_render_preserves_tokens(tokens in proptest::collection::vec(token_strategy(), 0..8)) {
        let mut set = OptionSet::new();
        for t in &tokens {
            set.push(t.clone());
        }

        let reparsed = OptionSet::parse(&set.render());
        prop_assert_eq!(reparsed.tokens(), set.tokens());
    }

    #[test]
    fn replace_leaves_exactly_one_token_for_prefix(
        tokens in proptest::collection::vec(token_strategy(), 0..8),
        value in "[0-9]{1,4}[mg]",
    ) {
        let mut set = OptionSet::new();
        for t in &tokens {
            set.push(t.clone());
        }
        set.replace("-Xmx", &value);

        let matching: Vec<&String> = set.tokens().iter().filter(|t| t.starts_with("-Xmx")).collect();
        prop_assert_eq!(matching.len(), 1);
        prop_assert_eq!(matching[0].clone(), format!("-Xmx{value}"));
    }

    #[test]
    fn add_if_absent_never_overrides(
        tokens in proptest::collection::vec(token_strategy(), 0..8),
    ) {
        let mut set = OptionSet::new();
        for t in &tokens {
            set.push(t.clone());
        }
        let before = set.clone();
        let had = set.contains_prefix("-Dmode=");

        set.add_if_absent("-Dmode=", "fallback");

        if had {
            prop_assert_eq!(set, before);
        } else {
            prop_assert_eq!(set.tokens().last().map(String::as_str), Some("-Dmode=fallback"));
        }
    }

    #[test]
    fn marker_matches_only_its_own_id(id in 1u64..u64::MAX / 10, suffix in 0u64..10) {
        let marker = Marker::new(InstanceId::from_raw(id));
        let longer = InstanceId::from_raw(id * 10 + suffix);

        let own = ProcessSnapshot {
            pid: 1,
            environ: vec![format!("INSTANCE_ID={id}")],
            ..Default::default()
        };
        let other = ProcessSnapshot {
            pid: 2,
            environ: vec![format!("INSTANCE_ID={longer}")],
            cmd: vec!["java".into(), format!("-Dinstance.id={longer}")],
            ..Default::default()
        };

        prop_assert!(marker.matches(&own));
        prop_assert!(!marker.matches(&other));
    }
}
