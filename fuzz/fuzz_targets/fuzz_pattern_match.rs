#![no_main]
use arbitrary::Arbitrary;
use infra_policy::iam::{PatternMatcher, ResourcePattern};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    pattern: String,
    path: String,
}

fuzz_target!(|input: Input| {
    let matched = PatternMatcher::matches(&input.pattern, &input.path);

    match ResourcePattern::parse(&input.pattern) {
        Ok(pattern) => {
            assert_eq!(pattern.matches(&input.path), matched);
            // a literal pattern matches its own text
            if pattern.is_literal() {
                assert!(pattern.matches(pattern.as_str()));
            }
        }
        Err(_) => assert!(!matched),
    }
});
