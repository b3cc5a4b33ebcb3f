use std::ptr;

use warmpath::{OptimizerConfig, global};

// The process instance is shared by every test in this binary, so all
// assertions about it live in one test.
#[test]
fn process_instance_is_created_once() -> anyhow::Result<()> {
    assert!(global::optimizer().is_none());

    let first = global::init(OptimizerConfig {
        cache_size: 7,
        ..OptimizerConfig::default()
    })?;
    let second = global::init(OptimizerConfig {
        cache_size: 9,
        ..OptimizerConfig::default()
    })?;

    assert!(ptr::eq(first, second));
    assert_eq!(first.lock().config().cache_size, 7);
    let current = global::optimizer().expect("initialised");
    assert!(ptr::eq(first, current));
    Ok(())
}
