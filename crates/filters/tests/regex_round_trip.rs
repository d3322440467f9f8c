//! The serialised regex behaves exactly like the original on any input.

use filters::{LineRegex, RegexFlag};
use proptest::prelude::*;

fn flag_strategy() -> impl Strategy<Value = RegexFlag> {
    prop_oneof![
        Just(RegexFlag::Default),
        Just(RegexFlag::Invert),
        Just(RegexFlag::Noop),
    ]
}

proptest! {
    #[test]
    fn deserialised_regex_matches_like_original(
        pattern in "[a-z ]{0,6}(\\|[0-9]{1,3})?",
        flag in flag_strategy(),
        inputs in proptest::collection::vec("[a-z0-9 |]{0,20}", 1..20),
    ) {
        let original = LineRegex::new(&pattern, flag).unwrap();
        let decoded: LineRegex = original.serialize().parse().unwrap();
        prop_assert_eq!(&decoded, &original);
        for input in &inputs {
            prop_assert_eq!(decoded.is_match(input.as_bytes()), original.is_match(input.as_bytes()));
        }
    }
}

#[test]
fn grep_and_invert_partition_a_file() {
    let lines: Vec<String> = (0..10)
        .map(|i| {
            if i % 3 == 0 {
                format!("INFO|20211002-071947|line {i}")
            } else {
                format!("INFO|20211002-071950|line {i}")
            }
        })
        .collect();
    let grep = LineRegex::new("20211002-071947", RegexFlag::Default).unwrap();
    let invert = LineRegex::new("20211002-071947", RegexFlag::Invert).unwrap();

    let matched = lines.iter().filter(|l| grep.is_match(l.as_bytes())).count();
    let inverted = lines.iter().filter(|l| invert.is_match(l.as_bytes())).count();
    assert_eq!(matched, 4);
    assert_eq!(inverted, 6);
}
