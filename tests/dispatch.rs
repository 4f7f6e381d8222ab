mod common;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use common::{RecordingConsole, RecordingHost, RecordingSink};
use faultline::{
    Debugger, Disposition, ERROR_LOG_HEADER, FATAL_EXIT_CODE,
    buffer::BufferStack,
    dedup::DedupKey,
    event::{ErrorEvent, ErrorOutcome},
    failure,
    failure::{CapturedFailure, FailureKind, Frame, SharedFailure, SourceLocation},
    host::{Host, LastError, OutputContext},
    mode::ModeSetting,
    severity::{ErrorSeverity, LogLevel, SeverityMask, StrictMode},
};

fn production(host: &Arc<RecordingHost>, sink: &RecordingSink) -> Arc<Debugger> {
    Debugger::builder(host.clone())
        .mode(ModeSetting::Production)
        .logger(sink.clone())
        .build()
}

fn development(host: &Arc<RecordingHost>, console: &RecordingConsole) -> Arc<Debugger> {
    Debugger::builder(host.clone())
        .mode(ModeSetting::Development)
        .console(console.clone())
        .build()
}

#[test]
fn test_production_failure_is_logged_and_hidden() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    let sink = RecordingSink::default();
    let callbacks = Arc::new(AtomicUsize::new(0));
    let counter = callbacks.clone();
    let debugger = Debugger::builder(host.clone())
        .mode(true)
        .logger(sink.clone())
        .on_fatal_error(move |_: &CapturedFailure| -> Result<(), CapturedFailure> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build();
    debugger.enable();

    host.throw(failure!("db timeout"));

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].0.starts_with("Exception: db timeout in "));
    assert_eq!(entries[0].1, LogLevel::Exception);

    assert_eq!(host.exits(), [FATAL_EXIT_CODE]);
    assert_eq!(host.status(), Some(500));
    assert_eq!(
        host.header("Content-Type").as_deref(),
        Some("text/html; charset=UTF-8")
    );
    let output = host.output();
    assert!(output.contains("Server Error"));
    assert!(!output.contains("db timeout"));
    assert!(!output.contains("could not be logged"));
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
}

#[test]
fn test_second_uncaught_failure_is_a_duplicate() {
    let host = Arc::new(RecordingHost::new(OutputContext::Console));
    let sink = RecordingSink::default();
    let debugger = production(&host, &sink);
    debugger.enable();
    assert!(debugger.holds_slack());

    let first = debugger.handle_exception(failure!("first"), true);
    let second = debugger.handle_exception(failure!("second"), true);

    assert_eq!(first, Disposition::Production { logged: true });
    assert_eq!(second, Disposition::Duplicate);
    assert_eq!(sink.entries().len(), 1);
    assert_eq!(host.exits(), [FATAL_EXIT_CODE]);
    assert_eq!(
        host.errors(),
        "ERROR: application encountered an error and can not continue. Error was logged.\n"
    );
}

#[test]
fn test_production_without_working_log() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    let sink = RecordingSink {
        fail: true,
        ..RecordingSink::default()
    };
    let debugger = production(&host, &sink);

    let disposition = debugger.handle_exception(failure!("db timeout"), false);

    assert_eq!(disposition, Disposition::Production { logged: false });
    assert!(host.output().contains("The error could not be logged."));
    assert!(host.exits().is_empty());
}

#[test]
fn test_legacy_user_agent_gets_503() {
    let mut host = RecordingHost::new(OutputContext::Ajax);
    host.user_agent = Some(String::from("Mozilla/4.0 (compatible; MSIE 8.0; Windows NT 6.1)"));
    let host = Arc::new(host);
    let debugger = production(&host, &RecordingSink::default());

    debugger.handle_exception(failure!("boom"), false);

    assert_eq!(host.status(), Some(503));
    assert_eq!(host.header("Content-Type"), None);
    assert_eq!(host.output(), "");
}

#[test]
fn test_headers_untouched_once_sent() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    host.headers_sent.store(true, Ordering::SeqCst);
    let debugger = production(&host, &RecordingSink::default());

    debugger.handle_exception(failure!("boom"), false);

    assert_eq!(host.status(), None);
    assert!(host.headers.lock().unwrap().is_empty());
}

#[test]
fn test_development_html_shows_diagnostic_and_toolbar() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    let console = RecordingConsole::default();
    let debugger = development(&host, &console);
    debugger.configure(|config| {
        config.add_context_collector(|| -> faultline::failure::FailureContext {
            [("route", "POST /checkout")].into_iter().collect()
        })
    });

    let disposition =
        debugger.handle_exception(failure!("payment declined").with_previous(failure!("card expired")), false);

    assert_eq!(disposition, Disposition::Diagnostic);
    let output = host.output();
    assert!(output.contains("<h1>Exception</h1>\n<p>payment declined</p>"));
    assert!(output.contains("<h2>Caused by</h2>"));
    assert!(output.contains("<tr><th>route</th><td>POST /checkout</td></tr>"));
    assert!(output.contains("id=\"faultline-bar\""));
    assert!(console.sent().is_empty());
}

#[test]
fn test_development_aborted_connection_takes_console_branch() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    host.aborted.store(true, Ordering::SeqCst);
    let console = RecordingConsole::default();
    let debugger = development(&host, &console);

    let disposition = debugger.handle_exception(failure!("client went away"), false);

    assert_eq!(disposition, Disposition::Console { reference: None });
    let output = host.output();
    assert!(output.starts_with("Exception: client went away in "));
    assert!(output.contains("Unable to log error: "));
    assert!(!output.contains("<h1>"));
    assert!(!output.contains("id=\"faultline-bar\""));
    assert_eq!(console.sent().len(), 1);
}

#[test]
fn test_development_console_prints_summary_and_reference() {
    let host = Arc::new(RecordingHost::new(OutputContext::Console));
    let console = RecordingConsole::default();
    let sink = RecordingSink {
        reference: Some(faultline::sink::LogReference::new("/var/log/app/exception-1.txt")),
        ..RecordingSink::default()
    };
    let debugger = Debugger::builder(host.clone())
        .mode(false)
        .console(console.clone())
        .logger(sink.clone())
        .viewer("less -R")
        .build();

    let failure = CapturedFailure::new(FailureKind::Exception, "Exception", "queue stalled")
        .at(SourceLocation::new("src/queue.rs", 88))
        .with_frames(vec![Frame {
            function: Some(String::from("app::queue::drain")),
            file: Some(String::from("src/queue.rs")),
            line: Some(88),
            args: None,
        }]);
    let disposition = debugger.handle_exception(failure, false);

    assert_eq!(
        disposition,
        Disposition::Console {
            reference: sink.reference.clone()
        }
    );
    assert_eq!(console.sent(), ["Exception: queue stalled in src/queue.rs:88"]);
    assert_eq!(
        host.output(),
        "Exception: queue stalled in src/queue.rs:88\nStack trace:\n\
         #0 app::queue::drain at src/queue.rs:88\n#1 {main}\n\
         (stored in /var/log/app/exception-1.txt)\n"
    );
    assert_eq!(
        host.header(ERROR_LOG_HEADER).as_deref(),
        Some("/var/log/app/exception-1.txt")
    );
    assert_eq!(
        *host.launched.lock().unwrap(),
        [(
            String::from("less -R"),
            String::from("/var/log/app/exception-1.txt")
        )]
    );
}

#[test]
fn test_development_console_reports_log_failure() {
    let host = Arc::new(RecordingHost::new(OutputContext::Console));
    let debugger = Debugger::builder(host.clone())
        .mode(false)
        .logger(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        })
        .viewer("less")
        .build();

    let disposition = debugger.handle_exception(failure!("queue stalled"), false);

    assert_eq!(disposition, Disposition::Console { reference: None });
    assert!(
        host.output()
            .ends_with("\nUnable to log error: log entry rejected: disk full\n")
    );
    assert!(host.launched.lock().unwrap().is_empty());
}

#[test]
fn test_failing_fatal_callbacks_are_isolated() {
    let host = Arc::new(RecordingHost::new(OutputContext::Console));
    let sink = RecordingSink::default();
    let last_ran = Arc::new(AtomicUsize::new(0));
    let counter = last_ran.clone();
    let debugger = Debugger::builder(host.clone())
        .mode(true)
        .logger(sink.clone())
        .on_fatal_error(|_: &CapturedFailure| -> Result<(), CapturedFailure> {
            Err(CapturedFailure::new(
                FailureKind::Exception,
                "CleanupError",
                "flush failed",
            ))
        })
        .on_fatal_error(|_: &CapturedFailure| -> Result<(), CapturedFailure> {
            panic!("callback exploded")
        })
        .on_fatal_error(move |_: &CapturedFailure| -> Result<(), CapturedFailure> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build();

    let disposition = debugger.handle_exception(failure!("db timeout"), true);

    assert_eq!(disposition, Disposition::Production { logged: true });
    let entries = sink.entries();
    assert_eq!(entries.len(), 3);
    assert!(entries[0].0.starts_with("Exception: db timeout"));
    assert_eq!(entries[1].0, "CleanupError: flush failed");
    assert_eq!(entries[2].0, "panic: callback exploded");
    assert!(entries.iter().all(|(_, level)| *level == LogLevel::Exception));
    assert_eq!(last_ran.load(Ordering::SeqCst), 1);
    assert_eq!(host.exits(), [FATAL_EXIT_CODE]);
}

#[test]
fn test_stack_capture_fills_missing_frames() {
    struct FixedStack;

    impl faultline::config::StackCapture for FixedStack {
        fn capture(&self) -> Vec<Frame> {
            vec![Frame {
                function: Some(String::from("app::main")),
                ..Frame::default()
            }]
        }
    }

    let host = Arc::new(RecordingHost::new(OutputContext::Console));
    let debugger = Debugger::builder(host.clone())
        .mode(false)
        .logger(RecordingSink::default())
        .stack_capture(FixedStack)
        .build();

    debugger.handle_exception(failure!("boom"), false);

    assert!(host.output().contains("\n#0 app::main\n#1 {main}\n"));
}

#[test]
fn test_repeated_warning_acts_once_and_counts() {
    let host = Arc::new(RecordingHost::new(OutputContext::Console));
    let console = RecordingConsole::default();
    let debugger = development(&host, &console);
    debugger.enable();

    let warning = || ErrorEvent::new(ErrorSeverity::Warning, "undefined index").at("src/cart.rs", 12);
    let mut outcomes = Vec::new();
    for _ in 0..5 {
        outcomes.push(host.raise(warning()).unwrap());
    }

    assert_eq!(outcomes[0], ErrorOutcome::DeferToDefault);
    assert!(outcomes[1..].iter().all(|outcome| *outcome == ErrorOutcome::Handled));
    assert_eq!(console.sent(), ["ErrorException: Warning: undefined index in src/cart.rs:12"]);

    let bar = debugger.bar();
    let key = DedupKey::new("src/cart.rs", 12, "Warning: undefined index");
    assert_eq!(bar.errors().count(&key), 5);
    assert_eq!(bar.error_total(), 5);

    let other = host
        .raise(ErrorEvent::new(ErrorSeverity::Warning, "undefined index").at("src/cart.rs", 13))
        .unwrap();
    assert_eq!(other, ErrorOutcome::DeferToDefault);
    assert_eq!(console.sent().len(), 2);
}

#[test]
fn test_warning_in_html_context_is_handled() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    let console = RecordingConsole::default();
    let debugger = development(&host, &console);

    let outcome = debugger
        .handle_error(ErrorEvent::new(ErrorSeverity::Notice, "undefined variable"))
        .unwrap();

    assert_eq!(outcome, ErrorOutcome::Handled);
    assert_eq!(console.sent().len(), 1);
}

#[test]
fn test_production_warning_logged_once() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    let sink = RecordingSink::default();
    let debugger = production(&host, &sink);

    for _ in 0..3 {
        let outcome = debugger
            .handle_error(ErrorEvent::new(ErrorSeverity::Deprecated, "Cart::total is deprecated").at("src/legacy.rs", 3))
            .unwrap();
        assert_eq!(outcome, ErrorOutcome::Handled);
    }

    assert_eq!(
        sink.entries(),
        [(
            String::from("Deprecated: Cart::total is deprecated in src/legacy.rs:3"),
            LogLevel::Error
        )]
    );
}

#[test]
fn test_log_severity_logs_every_occurrence() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    let sink = RecordingSink::default();
    let debugger = Debugger::builder(host.clone())
        .mode(true)
        .logger(sink.clone())
        .log_severity(SeverityMask::NONE.with(ErrorSeverity::Notice))
        .build();

    for _ in 0..2 {
        let event = ErrorEvent::new(ErrorSeverity::Notice, "undefined offset")
            .at("src/grid.rs", 7)
            .with_var("row", "4");
        assert_eq!(debugger.handle_error(event).unwrap(), ErrorOutcome::Handled);
    }

    let entries = sink.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, "ErrorException: undefined offset in src/grid.rs:7");
    assert_eq!(entries[0].1, LogLevel::Error);
    assert_eq!(debugger.bar().error_total(), 0);
}

#[test]
fn test_unreported_severity_defers() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    let console = RecordingConsole::default();
    let debugger = development(&host, &console);
    debugger.enable();
    host.set_reporting_mask(SeverityMask::ALL.without(ErrorSeverity::Deprecated));

    let outcome = host
        .raise(ErrorEvent::new(ErrorSeverity::Deprecated, "old api"))
        .unwrap();

    assert_eq!(outcome, ErrorOutcome::DeferToDefault);
    assert!(console.sent().is_empty());
}

#[test]
fn test_scream_restores_full_reporting() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    let console = RecordingConsole::default();
    let debugger = development(&host, &console);
    debugger.configure(|config| config.scream = true);
    host.set_reporting_mask(SeverityMask::NONE);

    let outcome = debugger
        .handle_error(ErrorEvent::new(ErrorSeverity::Warning, "silenced"))
        .unwrap();

    assert_eq!(outcome, ErrorOutcome::Handled);
    assert_eq!(console.sent().len(), 1);
}

#[test]
fn test_strict_mode_escalates_to_skippable_failure() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    let console = RecordingConsole::default();
    let debugger = Debugger::builder(host.clone())
        .mode(false)
        .console(console.clone())
        .strict_mode(true)
        .build();
    debugger.enable();

    let outcome = host
        .raise(ErrorEvent::new(ErrorSeverity::Notice, "undefined variable total").at("src/cart.rs", 30))
        .unwrap();

    assert_eq!(outcome, ErrorOutcome::Handled);
    let output = host.output();
    assert!(output.contains("<h1>ErrorException</h1>\n<p>undefined variable total</p>"));
    assert!(output.contains("?_faultline_skip_error"));
    assert_eq!(host.exits(), [FATAL_EXIT_CODE]);
    assert!(console.sent().is_empty());
}

#[test]
fn test_strict_mode_warning_after_handled_failure_is_counted() {
    let host = Arc::new(RecordingHost::new(OutputContext::Console));
    let console = RecordingConsole::default();
    let debugger = Debugger::builder(host.clone())
        .mode(false)
        .console(console.clone())
        .strict_mode(true)
        .build();
    debugger.enable();
    debugger.handle_exception(failure!("first"), false);
    let sent = console.sent().len();

    let outcome = host
        .raise(ErrorEvent::new(ErrorSeverity::Warning, "later warning").at("src/cart.rs", 40))
        .unwrap();

    assert_eq!(outcome, ErrorOutcome::DeferToDefault);
    assert!(host.exits().is_empty());
    assert_eq!(console.sent().len(), sent + 1);
    assert_eq!(
        console.sent().last().map(String::as_str),
        Some("ErrorException: Warning: later warning in src/cart.rs:40")
    );
    assert_eq!(debugger.bar().error_total(), 1);
}

#[test]
fn test_strict_mode_mask_and_skip_signal() {
    let mut host = RecordingHost::new(OutputContext::Html);
    host.skip_error = true;
    let host = Arc::new(host);
    let console = RecordingConsole::default();
    let debugger = Debugger::builder(host.clone())
        .mode(false)
        .console(console.clone())
        .strict_mode(StrictMode::Only(SeverityMask::NONE.with(ErrorSeverity::Notice)))
        .build();

    let outcome = debugger
        .handle_error(ErrorEvent::new(ErrorSeverity::Notice, "undefined variable"))
        .unwrap();

    assert_eq!(outcome, ErrorOutcome::Handled);
    assert!(host.exits().is_empty());
    assert_eq!(console.sent().len(), 1);
}

#[test]
fn test_strict_mode_ignored_in_production() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    let sink = RecordingSink::default();
    let debugger = Debugger::builder(host.clone())
        .mode(true)
        .logger(sink.clone())
        .strict_mode(StrictMode::All)
        .build();

    debugger
        .handle_error(ErrorEvent::new(ErrorSeverity::Warning, "careful"))
        .unwrap();

    assert!(host.exits().is_empty());
    assert_eq!(sink.entries().len(), 1);
}

#[test]
fn test_recoverable_fatal_comes_back_as_err() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    let sink = RecordingSink::default();
    let debugger = production(&host, &sink);

    let failure = debugger
        .handle_error(
            ErrorEvent::new(ErrorSeverity::RecoverableError, "argument 1 must be a string")
                .at("src/form.rs", 19)
                .with_var("field", "email"),
        )
        .unwrap_err();

    assert_eq!(failure.kind(), FailureKind::Exception);
    assert_eq!(failure.class(), "ErrorException");
    assert_eq!(failure.severity(), Some(ErrorSeverity::RecoverableError));
    assert_eq!(failure.location(), Some(&SourceLocation::new("src/form.rs", 19)));
    assert_eq!(failure.context().and_then(|context| context.get("field")), Some("email"));
    assert!(sink.entries().is_empty());
    assert!(host.exits().is_empty());
}

#[test]
fn test_recoverable_fatal_during_formatting_is_dispatched() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    let sink = RecordingSink::default();
    let debugger = production(&host, &sink);
    debugger.enable();

    let in_flight = SharedFailure::new(failure!("template failed"));
    let result = debugger.handle_error(
        ErrorEvent::new(ErrorSeverity::UserError, "cannot format price")
            .with_previous(in_flight)
            .in_string_conversion(),
    );

    assert_eq!(result.unwrap_err().message(), "cannot format price");
    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].0.starts_with("ErrorException: cannot format price"));
    assert_eq!(host.exits(), [FATAL_EXIT_CODE]);
}

#[test]
fn test_shutdown_dispatches_fatal_last_error_once() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    let sink = RecordingSink::default();
    let debugger = production(&host, &sink);
    debugger.enable();
    *host.last_error.lock().unwrap() = Some(LastError {
        severity: ErrorSeverity::Error,
        message: String::from("allowed memory size exhausted"),
        location: SourceLocation::new("src/report.rs", 210),
    });

    host.shut_down();
    host.shut_down();

    let entries = sink.entries();
    assert_eq!(
        entries,
        [(
            String::from("FatalError: allowed memory size exhausted in src/report.rs:210"),
            LogLevel::Exception
        )]
    );
    assert!(host.exits().is_empty());
    assert!(!debugger.holds_slack());
}

#[test]
fn test_shutdown_after_failure_does_nothing() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    let console = RecordingConsole::default();
    let debugger = development(&host, &console);
    debugger.enable();

    host.throw(failure!("boom"));
    let after_failure = host.output();
    host.shut_down();

    assert_eq!(host.output(), after_failure);
}

#[test]
fn test_shutdown_flushes_buffers_and_appends_toolbar() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    let console = RecordingConsole::default();
    let debugger = development(&host, &console);
    debugger.enable();
    {
        let mut buffers = host.buffers.lock().unwrap();
        buffers.push("page", 0);
        buffers.write("<p>order placed</p>");
    }
    debugger.bar_dump(vec![1, 2], Some("ids"));

    host.shut_down();

    let output = host.output();
    let page = output.find("<p>order placed</p>").unwrap();
    let bar = output.find("id=\"faultline-bar\"").unwrap();
    assert!(page < bar);
    assert!(output.contains("<h3>ids</h3>"));
    assert!(output.contains("<p>Execution time: "));
}

#[test]
fn test_failure_discards_buffers_above_mark_and_stops_at_compression() {
    let host = Arc::new(RecordingHost::new(OutputContext::Html));
    host.buffers.lock().unwrap().push("app", 4096);
    let debugger = production(&host, &RecordingSink::default());
    debugger.enable();
    assert_eq!(debugger.buffer_mark().map(|mark| mark.depth()), Some(1));

    {
        let mut buffers = host.buffers.lock().unwrap();
        buffers.push("gzip", 4096);
        buffers.push("layout", 4096);
        buffers.write("<div>half a page");
    }
    host.throw(failure!("db timeout"));

    let buffers = host.buffers.lock().unwrap();
    assert_eq!(buffers.depth(), 2);
    assert!(!host.output.lock().unwrap().contains("half a page"));
}
