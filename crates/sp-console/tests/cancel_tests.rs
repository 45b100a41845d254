// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cancel-protocol tests against an in-memory console.

use sp_console::{
    AbandonOutcome, AbandonPendingRead, CancellableLineReader, LineRead, LineSource, SourceRead,
};
use sp_error::{CancelFailureKind, ErrorCode, ProcessError};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Fake console
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ConsoleState {
    lines: VecDeque<String>,
    closed: bool,
    pending: bool,
    abandon: bool,
}

/// Blocking line buffer whose pending read can be abandoned.
#[derive(Default)]
struct Console {
    state: Mutex<ConsoleState>,
    cond: Condvar,
    abandon_calls: AtomicUsize,
    /// Abandon requests that report "nothing pending" even while a read
    /// is pending, as when the kernel has not registered it yet.
    unregistered: AtomicUsize,
}

impl Console {
    fn push(&self, line: &str) {
        self.state.lock().unwrap().lines.push_back(line.to_string());
        self.cond.notify_all();
    }

    fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.cond.notify_all();
    }

    fn calls(&self) -> usize {
        self.abandon_calls.load(Ordering::SeqCst)
    }
}

struct FakeSource(Arc<Console>);

impl LineSource for FakeSource {
    fn read_line(&mut self) -> io::Result<SourceRead> {
        let mut st = self.0.state.lock().unwrap();
        st.pending = true;
        loop {
            if st.abandon {
                st.abandon = false;
                st.pending = false;
                return Ok(SourceRead::Abandoned);
            }
            if let Some(line) = st.lines.pop_front() {
                st.pending = false;
                return Ok(SourceRead::Line(line));
            }
            if st.closed {
                st.pending = false;
                return Ok(SourceRead::Eof);
            }
            st = self.0.cond.wait(st).unwrap();
        }
    }
}

struct FakeCanceller(Arc<Console>);

impl AbandonPendingRead for FakeCanceller {
    fn abandon(&self) -> AbandonOutcome {
        let console = &self.0;
        console.abandon_calls.fetch_add(1, Ordering::SeqCst);
        if console
            .unregistered
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return AbandonOutcome::NothingPending;
        }
        let mut st = console.state.lock().unwrap();
        if st.pending {
            st.abandon = true;
            console.cond.notify_all();
            AbandonOutcome::Abandoned
        } else {
            AbandonOutcome::NothingPending
        }
    }
}

fn reader(console: &Arc<Console>) -> CancellableLineReader<FakeSource, FakeCanceller> {
    CancellableLineReader::new(
        FakeSource(Arc::clone(console)),
        FakeCanceller(Arc::clone(console)),
    )
}

fn cancel_kind(err: ProcessError) -> CancelFailureKind {
    match err {
        ProcessError::CancelFailure { kind } => kind,
        other => panic!("expected CancelFailure, got {other:?}"),
    }
}

// ===========================================================================
// 1. Timeouts
// ===========================================================================

#[test]
fn timeout_cancels_then_next_read_gets_the_line() {
    let console = Arc::new(Console::default());
    let mut r = reader(&console);

    assert_eq!(r.read_line(Duration::from_millis(20)).unwrap(), LineRead::Cancelled);
    assert!(console.calls() >= 1);

    console.push("provided line\n");
    assert_eq!(
        r.read_line(Duration::from_secs(5)).unwrap(),
        LineRead::Line("provided line".into())
    );
}

#[test]
fn no_abandon_request_outlives_a_cancelled_read() {
    let console = Arc::new(Console::default());
    let mut r = reader(&console);
    assert_eq!(r.read_line(Duration::from_millis(5)).unwrap(), LineRead::Cancelled);
    let calls = console.calls();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(console.calls(), calls);
}

#[test]
fn abandon_is_retried_until_the_read_is_registered() {
    let console = Arc::new(Console::default());
    console.unregistered.store(25, Ordering::SeqCst);
    let mut r = reader(&console);
    assert_eq!(r.read_line(Duration::from_millis(5)).unwrap(), LineRead::Cancelled);
    assert!(console.calls() > 25);
}

#[test]
fn unbounded_timeout_waits_for_the_line() {
    let console = Arc::new(Console::default());
    let c = Arc::clone(&console);
    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        c.push("eventually\n");
    });
    let mut r = reader(&console);
    assert_eq!(
        r.read_line(Duration::MAX).unwrap(),
        LineRead::Line("eventually".into())
    );
    writer.join().unwrap();
    assert_eq!(console.calls(), 0);
}

#[test]
fn unbounded_timeout_with_input_ready() {
    let console = Arc::new(Console::default());
    console.push("now\n");
    let mut r = reader(&console);
    assert_eq!(r.read_line(Duration::MAX).unwrap(), LineRead::Line("now".into()));
}

// ===========================================================================
// 2. Input before the timeout
// ===========================================================================

#[test]
fn line_before_timeout_is_returned_without_abandoning() {
    let console = Arc::new(Console::default());
    console.push("hello\r\n");
    let mut r = reader(&console);
    assert_eq!(
        r.read_line(Duration::from_secs(5)).unwrap(),
        LineRead::Line("hello".into())
    );
    thread::sleep(Duration::from_millis(20));
    assert_eq!(console.calls(), 0);
}

#[test]
fn line_arriving_later_but_in_time() {
    let console = Arc::new(Console::default());
    let c = Arc::clone(&console);
    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        c.push("late\n");
    });
    let mut r = reader(&console);
    assert_eq!(
        r.read_line(Duration::from_secs(5)).unwrap().into_line().as_deref(),
        Some("late")
    );
    writer.join().unwrap();
    assert_eq!(console.calls(), 0);
}

#[test]
fn end_of_input_is_closed() {
    let console = Arc::new(Console::default());
    console.close();
    let mut r = reader(&console);
    assert_eq!(r.read_line(Duration::from_secs(5)).unwrap(), LineRead::Closed);
}

// ===========================================================================
// 3. Races and failures
// ===========================================================================

/// Completes with a line after a delay and ignores abandon requests.
struct SlowSource(Duration);

impl LineSource for SlowSource {
    fn read_line(&mut self) -> io::Result<SourceRead> {
        thread::sleep(self.0);
        Ok(SourceRead::Line("raced\n".into()))
    }
}

struct Always(AbandonOutcome, AtomicUsize);

impl AbandonPendingRead for Always {
    fn abandon(&self) -> AbandonOutcome {
        self.1.fetch_add(1, Ordering::SeqCst);
        self.0
    }
}

#[test]
fn line_completing_during_cancellation_is_kept() {
    let canceller = Always(AbandonOutcome::NothingPending, AtomicUsize::new(0));
    let mut r = CancellableLineReader::new(SlowSource(Duration::from_millis(40)), &canceller);
    assert_eq!(
        r.read_line(Duration::from_millis(1)).unwrap(),
        LineRead::Line("raced".into())
    );
    assert!(canceller.1.load(Ordering::SeqCst) >= 1);
}

#[test]
fn unexpected_abandon_error_is_a_cancel_failure() {
    let canceller = Always(AbandonOutcome::Failed(5), AtomicUsize::new(0));
    let mut r = CancellableLineReader::new(SlowSource(Duration::from_millis(40)), &canceller);
    let err = r.read_line(Duration::from_millis(1)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CancelAbandonFailed);
    assert_eq!(cancel_kind(err), CancelFailureKind::AbandonFailed { code: 5 });
    assert_eq!(canceller.1.load(Ordering::SeqCst), 1);
}

struct ForeignAbandon;

impl LineSource for ForeignAbandon {
    fn read_line(&mut self) -> io::Result<SourceRead> {
        Ok(SourceRead::Abandoned)
    }
}

#[test]
fn abandonment_we_did_not_request_is_foreign() {
    let canceller = Always(AbandonOutcome::NothingPending, AtomicUsize::new(0));
    let mut r = CancellableLineReader::new(ForeignAbandon, &canceller);
    let err = r.read_line(Duration::from_secs(5)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CancelForeign);
    assert_eq!(cancel_kind(err), CancelFailureKind::ForeignCancellation);
    assert_eq!(canceller.1.load(Ordering::SeqCst), 0);
}

struct Broken;

impl LineSource for Broken {
    fn read_line(&mut self) -> io::Result<SourceRead> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
    }
}

#[test]
fn source_errors_surface_as_io() {
    let canceller = Always(AbandonOutcome::NothingPending, AtomicUsize::new(0));
    let mut r = CancellableLineReader::new(Broken, &canceller);
    let err = r.read_line(Duration::from_secs(5)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::StreamIo);
}
