mod common;

use std::sync::Arc;

use common::{RecordingHost, RecordingSink};
use faultline::{Debugger, global, host::OutputContext, severity::LogLevel};

#[test]
fn test_process_wide_debugger() {
    assert!(global::current().is_none());
    assert_eq!(global::dump(7), 7);
    assert!(!global::fire_log("nobody listening"));

    let host = Arc::new(RecordingHost::new(OutputContext::Console));
    let sink = RecordingSink::default();
    let first = Debugger::builder(host.clone())
        .mode(false)
        .logger(sink.clone())
        .build();
    global::install_global(first.clone()).unwrap();

    let second = Debugger::builder(host.clone()).mode(true).build();
    let rejected = global::install_global(second.clone()).unwrap_err();
    assert!(Arc::ptr_eq(&rejected.0, &second));
    assert!(global::current().is_some_and(|current| Arc::ptr_eq(&current, &first)));

    assert_eq!(global::dump("cart total"), "cart total");
    assert!(host.output().contains("\"cart total\""));

    global::log("checkout started", LogLevel::Info).unwrap();
    assert_eq!(
        sink.entries(),
        [(String::from("checkout started"), LogLevel::Info)]
    );

    let previous = global::replace_global(second.clone());
    assert!(previous.is_some_and(|previous| Arc::ptr_eq(&previous, &first)));
    assert!(global::current().is_some_and(|current| current.is_production()));
}
