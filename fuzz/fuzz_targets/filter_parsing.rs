#![no_main]
use libfuzzer_sys::fuzz_target;
use servicehub::{Filter, Properties};

fuzz_target!(|data: &[u8]| {
    // Filters arrive from configuration and other modules: parsing must
    // reject malformed input with an error, never panic

    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(filter) = Filter::parse(input) else {
        return;
    };

    // The canonical form must parse back to the same filter
    let canonical = filter.to_string();
    let reparsed = Filter::parse(&canonical).expect("canonical form parses");
    assert_eq!(reparsed, filter);

    // Matching must not panic whatever the property types
    let props = Properties::new()
        .with("name", "fuzz")
        .with("count", 42i64)
        .with("ratio", 0.5f64)
        .with("enabled", true)
        .with("tags", vec!["a", "b"]);
    let _ = filter.matches(&props);
});
