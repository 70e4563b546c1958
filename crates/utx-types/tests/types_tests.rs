use proptest::prelude::*;
use std::collections::BTreeSet;
use utx_types::{AccountName, Checksum256};

proptest! {
    #[test]
    fn prop_generated_names_are_accepted(name in "[a-z1-5.]{1,12}") {
        let parsed = AccountName::new(name.clone()).unwrap();
        prop_assert_eq!(parsed.to_string(), name);
    }

    #[test]
    fn prop_digest_is_stable(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        prop_assert_eq!(Checksum256::digest(&data), Checksum256::digest(&data));
    }
}

#[test]
fn test_names_order_lexicographically() {
    let names: BTreeSet<AccountName> = ["carol", "alice", "bob"]
        .iter()
        .map(|n| n.parse().unwrap())
        .collect();
    let ordered: Vec<String> = names.into_iter().map(String::from).collect();
    assert_eq!(ordered, vec!["alice", "bob", "carol"]);
}

#[test]
fn test_checksum_serde_round_trip_via_json() {
    let h = Checksum256::digest("1000-10");
    let json = serde_json::to_string(&h).unwrap();
    let back: Checksum256 = serde_json::from_str(&json).unwrap();
    assert_eq!(h, back);
}
