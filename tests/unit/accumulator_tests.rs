use batch_conductor::orchestrator::accumulator::SessionAccumulator;

#[test]
fn joins_fragments_in_arrival_order() {
    let mut acc = SessionAccumulator::new();
    assert!(acc.push("first"));
    assert!(acc.push(String::from("second")));
    assert!(acc.push("third"));

    assert_eq!(acc.len(), 3);
    assert_eq!(acc.joined(), "first\nsecond\nthird");
}

#[test]
fn empty_fragments_are_skipped() {
    let mut acc = SessionAccumulator::new();
    assert!(acc.push("a"));
    assert!(!acc.push(""));
    assert!(acc.push("b"));

    assert_eq!(acc.fragments(), ["a", "b"]);
    assert_eq!(acc.joined(), "a\nb");
}

#[test]
fn new_accumulator_joins_to_empty() {
    let acc = SessionAccumulator::new();
    assert!(acc.is_empty());
    assert_eq!(acc.joined(), "");
}
