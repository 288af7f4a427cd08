use proptest::prelude::*;

use oxpool_types::{Amount, BlockHash, MinerAddress, Timestamp};

fn address_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop::sample::select(
            "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789/+"
                .chars()
                .collect::<Vec<_>>(),
        ),
        32,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

fn hash_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop::sample::select("0123456789abcdef".chars().collect::<Vec<_>>()),
        64,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    /// Any 32 base64-alphabet characters parse, and the storage key maps
    /// back by reversing the separator normalization.
    #[test]
    fn address_storage_key_is_reversible(raw in address_strategy()) {
        let addr: MinerAddress = raw.parse().unwrap();
        let key = addr.storage_key();
        prop_assert!(!key.contains('/'));
        prop_assert_eq!(key.replace('_', "/"), raw.replace('_', "/"));
    }

    /// BlockHash text round-trip through serde_json.
    #[test]
    fn block_hash_json_roundtrip(raw in hash_strategy()) {
        let hash: BlockHash = raw.parse().unwrap();
        let encoded = serde_json::to_string(&hash).unwrap();
        let decoded: BlockHash = serde_json::from_str(&encoded).unwrap();
        prop_assert_eq!(decoded, hash);
    }

    /// Amount display/parse round-trip is lossless for any nano value.
    #[test]
    fn amount_text_roundtrip(nanos in 0u64..10_000_000_000_000_000) {
        let amount = Amount::from_nanos(nanos);
        let parsed: Amount = amount.to_string().parse().unwrap();
        prop_assert_eq!(parsed, amount);
    }

    /// Amount ordering agrees with the underlying nano value.
    #[test]
    fn amount_ordering(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        prop_assert_eq!(Amount::from_nanos(a) <= Amount::from_nanos(b), a <= b);
    }

    /// Timestamp text round-trip at second precision.
    #[test]
    fn timestamp_text_roundtrip(secs in 0i64..4_000_000_000) {
        let dt = chrono::DateTime::from_timestamp(secs, 0).unwrap().naive_utc();
        let ts = Timestamp::new(dt);
        let parsed = Timestamp::parse_flexible(&ts.to_string()).unwrap();
        prop_assert_eq!(parsed, ts);
    }
}
