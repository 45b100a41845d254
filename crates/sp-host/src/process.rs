// SPDX-License-Identifier: MIT OR Apache-2.0
//! [`ScriptableProcess`]: one child-process lifetime with pipe-backed
//! standard streams.

use crate::ended::{EndedSignal, ProcessEnded};
use crate::lifecycle::{Lifecycle, LifecycleTransition, ProcessState};
use crate::pipe::{InputAnonymousPipe, OutputAnonymousPipe};
use crate::stream::{StandardStream, StreamSet};
use sp_config::LaunchConfig;
use sp_error::{ProcessError, Result};
use sp_winapi::{
    InheritanceAttributes, ProcessIdentity, StartupOptions, StdHandles, launch, query_exit_code,
    wait_for_exit,
};
use std::fs::File;
use std::os::windows::io::{AsHandle, RawHandle};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

struct Shared {
    lifecycle: Mutex<Lifecycle>,
    ended: EndedSignal,
    streams: StreamSet,
}

impl Shared {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Body of the exit-wait thread.
    fn await_exit(&self, identity: &ProcessIdentity) {
        let pid = identity.pid;
        let exit_code = match wait_for_exit(identity.process.as_handle(), None) {
            Ok(_) => query_exit_code(identity.process.as_handle()),
            Err(e) => {
                warn!(target: "sp.host", pid, error = %e, "exit wait failed; exit code unknown");
                None
            }
        };

        for stream in self.streams.distinct() {
            stream.handle_process_end();
        }

        if let Err(e) = self.lifecycle().transition(ProcessState::Ended { pid }) {
            error!(target: "sp.host", pid, error = %e, "lifecycle rejected end transition");
        }
        info!(target: "sp.host", pid, exit_code = ?exit_code, "process ended");

        self.ended.complete(ProcessEnded {
            pid,
            exit_code,
            ended_at: chrono::Utc::now(),
        });
    }
}

/// A child process whose standard streams are owned by the parent.
///
/// One instance models exactly one child lifetime: [`start`](Self::start)
/// succeeds at most once, and the end is observed exactly once by a
/// dedicated wait thread no matter how many callers wait on it.
///
/// ```no_run
/// use sp_host::ScriptableProcess;
/// use std::io::{BufRead, BufReader};
///
/// let process = ScriptableProcess::new(true)?;
/// process.start("cmd.exe /c echo hello")?;
/// let stdout = BufReader::new(process.take_stdout().unwrap());
/// for line in stdout.lines() {
///     println!("{}", line?);
/// }
/// let ended = process.wait_for_end()?;
/// assert_eq!(ended.exit_code, Some(0));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ScriptableProcess {
    shared: Arc<Shared>,
    options: StartupOptions,
    identity: OnceLock<Arc<ProcessIdentity>>,
}

impl ScriptableProcess {
    /// Three fresh anonymous pipes, all impersonating a console or none.
    pub fn new(impersonate_console: bool) -> Result<Self> {
        Ok(Self::with_streams(
            Some(Arc::new(InputAnonymousPipe::new(impersonate_console)?)),
            Some(Arc::new(OutputAnonymousPipe::new(impersonate_console)?)),
            Some(Arc::new(OutputAnonymousPipe::new(impersonate_console)?)),
        ))
    }

    /// Like [`new`](Self::new), but stdout and stderr share one pipe.
    pub fn merged(impersonate_console: bool) -> Result<Self> {
        let output: Arc<dyn StandardStream> =
            Arc::new(OutputAnonymousPipe::new(impersonate_console)?);
        Ok(Self::with_streams(
            Some(Arc::new(InputAnonymousPipe::new(impersonate_console)?)),
            Some(Arc::clone(&output)),
            Some(output),
        ))
    }

    /// Arbitrary streams. Passing the same `Arc` for output and error
    /// merges them; the child inherits the handle once.
    pub fn with_streams(
        input: Option<Arc<dyn StandardStream>>,
        output: Option<Arc<dyn StandardStream>>,
        error: Option<Arc<dyn StandardStream>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(Lifecycle::new()),
                ended: EndedSignal::new(),
                streams: StreamSet::new(input, output, error),
            }),
            options: StartupOptions::default(),
            identity: OnceLock::new(),
        }
    }

    /// Streams and startup options described by `config`.
    pub fn from_config(config: &LaunchConfig) -> Result<Self> {
        let [stdin, stdout, stderr] = config.resolved_streams();

        let input: Option<Arc<dyn StandardStream>> = match stdin {
            (true, console) => Some(Arc::new(InputAnonymousPipe::new(console)?)),
            _ => None,
        };
        let output: Option<Arc<dyn StandardStream>> = match stdout {
            (true, console) => Some(Arc::new(OutputAnonymousPipe::new(console)?)),
            _ => None,
        };
        let error: Option<Arc<dyn StandardStream>> = if config.merge_stderr {
            output.clone()
        } else {
            match stderr {
                (true, console) => Some(Arc::new(OutputAnonymousPipe::new(console)?)),
                _ => None,
            }
        };

        Ok(Self::with_streams(input, output, error).with_options(StartupOptions {
            hide_window: config.hide_window,
        }))
    }

    /// Replace the startup options. Only meaningful before `start`.
    pub fn with_options(mut self, options: StartupOptions) -> Self {
        self.options = options;
        self
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Create the child running `command`.
    ///
    /// When this returns `Ok`, every stream has released its child-side
    /// handle and the exit wait is registered, so the parent-side ends may
    /// be used immediately.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` on a second call or a malformed stream set;
    /// `OsResource` if building the attribute list or creating the
    /// process fails. A failed launch leaves the instance in
    /// [`ProcessState::Failed`].
    pub fn start(&self, command: &str) -> Result<()> {
        self.shared.lifecycle().begin_launch()?;

        let identity = match self.create(command) {
            Ok(identity) => Arc::new(identity),
            Err(e) => {
                warn!(target: "sp.host", error = %e, "launch failed");
                if let Err(te) = self.shared.lifecycle().transition(ProcessState::Failed) {
                    error!(target: "sp.host", error = %te, "lifecycle rejected failure transition");
                }
                return Err(e);
            }
        };
        let pid = identity.pid;

        for stream in self.shared.streams.distinct() {
            stream.handle_process_start();
            debug!(target: "sp.host", pid, direction = ?stream.direction(), "stream handed to child");
        }

        self.register_exit_wait(identity, |name, body| {
            thread::Builder::new().name(name).spawn(body).map(drop)
        })
    }

    /// Launching → Running with an exit waiter, or Launching → Failed if the
    /// waiter cannot be spawned.
    ///
    /// The lifecycle lock is held across the spawn so the waiter cannot
    /// record the end before the process is marked running.
    fn register_exit_wait<F>(&self, identity: Arc<ProcessIdentity>, spawn: F) -> Result<()>
    where
        F: FnOnce(String, Box<dyn FnOnce() + Send + 'static>) -> std::io::Result<()>,
    {
        let pid = identity.pid;
        // Only `start` sets the identity and `begin_launch` admits one caller.
        let _ = self.identity.set(Arc::clone(&identity));

        let mut lifecycle = self.shared.lifecycle();
        let shared = Arc::clone(&self.shared);
        let spawned = spawn(
            format!("sp-exit-wait-{pid}"),
            Box::new(move || shared.await_exit(&identity)),
        );
        if let Err(e) = spawned {
            error!(target: "sp.host", pid, error = %e, "cannot spawn exit waiter; child left unobserved");
            if let Err(te) = lifecycle.transition(ProcessState::Failed) {
                error!(target: "sp.host", error = %te, "lifecycle rejected failure transition");
            }
            return Err(e.into());
        }
        lifecycle.transition(ProcessState::Running { pid })?;
        drop(lifecycle);

        debug!(target: "sp.host", pid, "exit wait registered");
        Ok(())
    }

    fn create(&self, command: &str) -> Result<ProcessIdentity> {
        let streams = &self.shared.streams;
        let plan = streams.plan()?;
        let mut attributes = InheritanceAttributes::build(&plan)?;

        let child = |slot: &Option<Arc<dyn StandardStream>>| {
            slot.as_ref()
                .and_then(|s| s.child_handle())
                .map(|h| h as RawHandle)
        };
        let std_handles = StdHandles {
            input: child(&streams.input),
            output: child(&streams.output),
            error: child(&streams.error),
        };

        let identity = launch(command, &mut attributes, &std_handles, &self.options)?;
        drop(attributes);
        Ok(identity)
    }

    /// Block until the child has ended.
    ///
    /// Fails with `InvalidConfiguration` if the process was never started
    /// or its launch failed.
    pub fn wait_for_end(&self) -> Result<ProcessEnded> {
        self.ensure_started()?;
        Ok(self.shared.ended.wait())
    }

    /// Block for at most `timeout`. Returns `true` if the child has ended.
    pub fn wait_for_end_timeout(&self, timeout: Duration) -> bool {
        self.shared.ended.wait_timeout(timeout).is_some()
    }

    /// Resolve once the child has ended.
    pub async fn ended(&self) -> Result<ProcessEnded> {
        self.ensure_started()?;
        Ok(self.shared.ended.wait_async().await)
    }

    /// Run `listener` once the child has ended, on the exit-wait thread.
    /// If it has already ended, `listener` runs immediately.
    pub fn on_ended<F>(&self, listener: F)
    where
        F: FnOnce(&ProcessEnded) + Send + 'static,
    {
        self.shared.ended.on_ended(listener);
    }

    fn ensure_started(&self) -> Result<()> {
        match self.state() {
            ProcessState::Idle => Err(ProcessError::invalid("process has not been started")),
            ProcessState::Failed => Err(ProcessError::invalid("process failed to launch")),
            _ => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessState {
        self.shared.lifecycle().state()
    }

    /// Every lifecycle transition so far, oldest first.
    pub fn history(&self) -> Vec<LifecycleTransition> {
        self.shared.lifecycle().history().to_vec()
    }

    /// Process id, once started.
    pub fn pid(&self) -> Option<u32> {
        self.identity.get().map(|i| i.pid)
    }

    /// Exit code. `None` until the child has ended, and also when the OS
    /// could not report it.
    pub fn exit_code(&self) -> Option<u32> {
        self.shared.ended.get().and_then(|e| e.exit_code)
    }

    /// Everything known about the end, once it has happened.
    pub fn ended_info(&self) -> Option<ProcessEnded> {
        self.shared.ended.get()
    }

    /// The streams this process owns.
    pub fn streams(&self) -> &StreamSet {
        &self.shared.streams
    }

    /// Parent-side writer of the child's stdin.
    pub fn take_stdin(&self) -> Option<File> {
        self.shared.streams.input.as_ref()?.take_stream()
    }

    /// Parent-side reader of the child's stdout.
    pub fn take_stdout(&self) -> Option<File> {
        self.shared.streams.output.as_ref()?.take_stream()
    }

    /// Parent-side reader of the child's stderr. `None` after
    /// [`take_stdout`](Self::take_stdout) when the two are merged.
    pub fn take_stderr(&self) -> Option<File> {
        self.shared.streams.error.as_ref()?.take_stream()
    }
}

impl std::fmt::Debug for ScriptableProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptableProcess")
            .field("state", &self.state())
            .field("streams", &self.shared.streams)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sp_error::ErrorCode;

    #[test]
    fn failed_waiter_spawn_leaves_process_failed() {
        let process = ScriptableProcess::with_streams(None, None, None);
        process.shared.lifecycle().begin_launch().unwrap();
        let identity = Arc::new(process.create("cmd.exe /c exit 0").unwrap());

        let err = process
            .register_exit_wait(identity, |_, _| Err(std::io::Error::other("no threads")))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Io(_)));
        assert_eq!(process.state(), ProcessState::Failed);
        assert!(process.pid().is_some());

        let err = process.wait_for_end().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
        assert!(!process.wait_for_end_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn running_is_recorded_before_the_waiter_can_end_it() {
        let process = ScriptableProcess::with_streams(None, None, None);
        process.shared.lifecycle().begin_launch().unwrap();
        let identity = Arc::new(process.create("cmd.exe /c exit 3").unwrap());

        process
            .register_exit_wait(identity, |name, body| {
                thread::Builder::new().name(name).spawn(body).map(drop)
            })
            .unwrap();
        let ended = process.wait_for_end().unwrap();
        assert_eq!(ended.exit_code, Some(3));
        let states: Vec<_> = process.history().iter().map(|t| t.to).collect();
        assert_eq!(
            states,
            [
                ProcessState::Launching,
                ProcessState::Running { pid: ended.pid },
                ProcessState::Ended { pid: ended.pid },
            ]
        );
    }
}
