//! Property Tests
//!
//! Random histories replayed against every backend and a plain model.

use crate::*;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    /// Blind append of a payload
    Blind(i64),
    /// Optimistic append presenting `latest - lag`
    Presenting { lag: u64, payload: i64 },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        any::<i64>().prop_map(Step::Blind),
        (0u64..3, any::<i64>()).prop_map(|(lag, payload)| Step::Presenting { lag, payload }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_history_matches_model(steps in prop::collection::vec(step(), 0..30)) {
        for kind in ALL_BACKENDS {
            let store = open(kind);
            let mut model: Vec<i64> = vec![0];
            store.add(Entity::new("p", 0)).unwrap();

            for s in &steps {
                let latest = model.len() as u64;
                match *s {
                    Step::Blind(payload) => {
                        let e = store.append(Entity::new("p", payload), ConcurrencyMode::None).unwrap();
                        model.push(payload);
                        prop_assert_eq!(e.version, latest + 1);
                    }
                    Step::Presenting { lag, payload } => {
                        let presented = latest.saturating_sub(lag);
                        let result = store.append(
                            Entity::new("p", payload).with_version(presented),
                            ConcurrencyMode::Optimistic,
                        );
                        if presented == latest {
                            prop_assert_eq!(result.unwrap().version, latest + 1);
                            model.push(payload);
                        } else {
                            prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::VersionConflict);
                        }
                    }
                }
            }

            let latest = model.len() as u64;
            prop_assert_eq!(store.get_latest_version_number("p").unwrap(), latest);
            for (i, payload) in model.iter().enumerate() {
                let e = store.get_by_version("p", i as u64 + 1).unwrap();
                prop_assert_eq!(e.data, json!(*payload));
            }
        }
    }

    #[test]
    fn prop_range_is_exact_slice(len in 1u64..25, a in 0u64..30, b in 0u64..30) {
        for kind in ALL_BACKENDS {
            let store = open(kind);
            store.add(Entity::new("r", 1)).unwrap();
            for n in 2..=len {
                store.append(Entity::new("r", n), ConcurrencyMode::None).unwrap();
            }
            let got = versions(&store.get_by_version_range("r", a, b).unwrap());
            let expected: Vec<Version> = (a.max(1)..=b.min(len)).collect();
            prop_assert_eq!(got, expected, "{} [{}, {}] of {}", kind, a, b, len);
        }
    }
}
