//! Property-based tests using proptest
//!
//! These tests verify identifier derivation, path lookup into rows and
//! pagination ordering using randomized inputs.

use cloudinv::normalize::{display_value, PathExpr};
use cloudinv::paginate::{collect_all, Page};
use cloudinv::record::resource_id_from_arn;
use proptest::prelude::*;
use serde_json::{json, Value};

/// ARN segment without colons
fn arb_segment() -> impl Strategy<Value = String> {
    "[a-z0-9-]{0,12}"
}

mod arn_tests {
    use super::*;

    proptest! {
        #[test]
        fn resource_part_after_fifth_colon(
            partition in arb_segment(),
            service in arb_segment(),
            region in arb_segment(),
            account in "[0-9]{12}",
            resource in "[a-zA-Z0-9/:_*-]{1,40}",
        ) {
            let arn = format!("arn:{}:{}:{}:{}:{}", partition, service, region, account, resource);
            prop_assert_eq!(resource_id_from_arn(&arn), resource.as_str());
        }

        #[test]
        fn short_identifiers_unchanged(id in "[a-z0-9]{0,8}(:[a-z0-9]{0,8}){0,4}") {
            prop_assert_eq!(resource_id_from_arn(&id), id.as_str());
        }

        #[test]
        fn derivation_is_a_suffix(id in "[a-z:/]{0,40}") {
            prop_assert!(id.ends_with(resource_id_from_arn(&id)));
        }
    }
}

mod path_tests {
    use super::*;

    fn arb_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
        ]
    }

    proptest! {
        #[test]
        fn dotted_and_bracket_keys_agree(key in "[A-Za-z][A-Za-z0-9_]{0,10}", leaf in arb_leaf()) {
            let mut attributes = serde_json::Map::new();
            attributes.insert(key.clone(), leaf.clone());
            let record = json!({"attributes": attributes});
            let dotted = PathExpr::parse(&format!("attributes.{}", key)).unwrap();
            let bracket = PathExpr::parse(&format!("attributes['{}']", key)).unwrap();
            prop_assert_eq!(dotted.lookup(&record), Some(&leaf));
            prop_assert_eq!(bracket.lookup(&record), Some(&leaf));
        }

        #[test]
        fn index_lookup_within_bounds(
            items in prop::collection::vec(arb_leaf(), 0..10),
            index in 0usize..12,
        ) {
            let record = json!({"payload": {"rules": items.clone()}});
            let expr = PathExpr::parse(&format!("payload.rules[{}]", index)).unwrap();
            prop_assert_eq!(expr.lookup(&record), items.get(index));
        }

        #[test]
        fn missing_key_is_absent(key in "[a-z]{1,8}") {
            let record = json!({"present": 1});
            let expr = PathExpr::parse(&format!("missing_{}.deeper", key)).unwrap();
            prop_assert_eq!(expr.lookup(&record), None);
            prop_assert_eq!(display_value(expr.lookup(&record)), "-");
        }

        #[test]
        fn arrays_display_their_length(items in prop::collection::vec(arb_leaf(), 0..20)) {
            let value = Value::from(items.clone());
            prop_assert_eq!(display_value(Some(&value)), format!("[{} items]", items.len()));
        }
    }
}

mod pagination_tests {
    use super::*;

    proptest! {
        #[test]
        fn pages_concatenate_in_order(
            pages in prop::collection::vec(prop::collection::vec(any::<u32>(), 0..5), 1..6),
        ) {
            let expected: Vec<u32> = pages.iter().flatten().copied().collect();
            let source = pages.clone();

            let collected = tokio_test::block_on(collect_all(|token: Option<String>| {
                let index: usize = token.map(|t| t.parse().unwrap()).unwrap_or(0);
                let next = (index + 1 < source.len()).then(|| (index + 1).to_string());
                let page = Page::new(source[index].clone(), next);
                async move { Ok::<_, std::convert::Infallible>(page) }
            }))
            .unwrap();

            prop_assert_eq!(collected, expected);
        }
    }
}
