//! Runnable handle around a [`CommandSpec`].
//!
//! Output from the child is read on helper threads and forwarded over a
//! channel, so callbacks always run on the caller's thread. No timeouts are
//! applied; cancellation is left to the hosting process's signal handling.

use std::io::{self, BufRead, BufReader, IsTerminal, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use portable_pty::{MasterPty, PtySize, native_pty_system};
use tracing::{debug, trace, warn};

use super::command::{AttachMode, CommandSpec};
use super::error::SandboxError;

/// Which stream a piece of output came from. Pseudo-terminal output is
/// always reported as stdout since both streams share the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Exit status of a finished child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    code: Option<i32>,
}

impl ProcessExit {
    pub fn from_code(code: Option<i32>) -> Self {
        Self { code }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code, or -1 when the child was killed by a signal.
    pub fn code(&self) -> i32 {
        self.code.unwrap_or(-1)
    }
}

enum ChildHandle {
    Std(Child),
    Pty {
        child: Box<dyn portable_pty::Child + Send + Sync>,
        // The reader stops at EOF only while the master stays open.
        _master: Box<dyn MasterPty + Send>,
    },
}

impl ChildHandle {
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        match self {
            Self::Std(child) => Ok(child.try_wait()?.map(|s| ProcessExit::from_code(s.code()))),
            Self::Pty { child, .. } => Ok(child.try_wait()?.map(pty_exit)),
        }
    }

    fn wait(&mut self) -> io::Result<ProcessExit> {
        match self {
            Self::Std(child) => Ok(ProcessExit::from_code(child.wait()?.code())),
            Self::Pty { child, .. } => Ok(pty_exit(child.wait()?)),
        }
    }
}

fn pty_exit(status: portable_pty::ExitStatus) -> ProcessExit {
    ProcessExit::from_code(Some(i32::try_from(status.exit_code()).unwrap_or(-1)))
}

type Chunk = (OutputStream, String);

/// A child process for one lifecycle operation.
pub struct SandboxProcess {
    spec: CommandSpec,
    child: Option<ChildHandle>,
    output: Option<Receiver<Chunk>>,
    readers: Vec<JoinHandle<()>>,
    stdout: String,
    stderr: String,
    reaped: Option<ProcessExit>,
    exit: Option<ProcessExit>,
}

impl SandboxProcess {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            child: None,
            output: None,
            readers: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            reaped: None,
            exit: None,
        }
    }

    /// Tokens joined with spaces, for showing the user what runs.
    pub fn command_line(&self) -> String {
        self.spec.command_line()
    }

    /// Run to completion, handing output to `sink` as it arrives.
    pub fn run(
        &mut self,
        mut sink: impl FnMut(OutputStream, &str),
    ) -> Result<ProcessExit, SandboxError> {
        self.start()?;
        self.finish(&mut sink)
    }

    /// Spawn the child without waiting for it.
    pub fn start(&mut self) -> Result<(), SandboxError> {
        if self.child.is_some() {
            return Ok(());
        }
        debug!(command = %self.spec.shell_line(), mode = ?self.spec.mode(), "process:start");

        let (child, receiver, readers) = match self.spec.mode() {
            AttachMode::Terminal => (self.spawn_terminal()?, None, Vec::new()),
            AttachMode::Batch => {
                let (child, rx, readers) = self.spawn_piped()?;
                (child, Some(rx), readers)
            }
            AttachMode::Capture => match self.spawn_pty() {
                Ok((child, rx, readers)) => (child, Some(rx), readers),
                Err(PtyError::Unsupported(e)) => {
                    warn!(error = %e, "pseudo-terminal unavailable, capturing through pipes");
                    let (child, rx, readers) = self.spawn_piped()?;
                    (child, Some(rx), readers)
                }
                Err(PtyError::Spawn(e)) => return Err(e),
            },
        };

        self.child = Some(child);
        self.output = receiver;
        self.readers = readers;
        Ok(())
    }

    /// Non-blocking check, suitable for a poll loop. Buffers any output that
    /// arrived since the last call.
    pub fn is_running(&mut self) -> bool {
        self.drain_available();
        if self.exit.is_some() || self.reaped.is_some() {
            return false;
        }
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(exit)) => {
                self.reaped = Some(exit);
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(error = %e, "failed to poll child process");
                false
            }
        }
    }

    /// Block until the child exits, collecting remaining output.
    pub fn wait(&mut self) -> Result<ProcessExit, SandboxError> {
        self.finish(&mut |_, _| {})
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Everything captured, with terminal escape sequences removed.
    pub fn output_plain(&self) -> String {
        let mut combined = String::with_capacity(self.stdout.len() + self.stderr.len());
        combined.push_str(&self.stderr);
        combined.push_str(&self.stdout);
        strip_ansi_escapes::strip_str(&combined)
    }

    /// Turn an unsuccessful exit into a [`SandboxError::ChildProcess`].
    pub fn ensure_success(&self, operation: &str) -> Result<(), SandboxError> {
        match self.exit {
            Some(exit) if exit.success() => Ok(()),
            Some(exit) => Err(SandboxError::child_process(
                operation,
                exit.code(),
                self.failure_output(),
            )),
            None => Err(SandboxError::child_process(operation, -1, "process did not run")),
        }
    }

    /// Best text to show for a failure: stderr, or the combined capture.
    pub fn failure_output(&self) -> String {
        if self.stderr.trim().is_empty() {
            strip_ansi_escapes::strip_str(&self.stdout)
        } else {
            self.stderr.clone()
        }
    }

    fn finish(
        &mut self,
        sink: &mut dyn FnMut(OutputStream, &str),
    ) -> Result<ProcessExit, SandboxError> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        if let Some(rx) = self.output.take() {
            for (stream, text) in rx.iter() {
                self.record(stream, &text);
                sink(stream, &text);
            }
        }
        for reader in self.readers.drain(..) {
            reader.join().ok();
        }

        let exit = match self.reaped.take() {
            Some(exit) => exit,
            None => {
                let child = self.child.as_mut().ok_or_else(|| {
                    SandboxError::child_process(self.spec.command_line(), -1, "process not started")
                })?;
                child.wait().map_err(|e| {
                    SandboxError::runtime_unavailable(self.spec.program(), e.to_string())
                })?
            }
        };
        debug!(command = %self.spec.command_line(), code = exit.code(), "process:exit");
        self.exit = Some(exit);
        Ok(exit)
    }

    fn drain_available(&mut self) {
        let Some(rx) = self.output.as_ref() else {
            return;
        };
        let mut pending = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(chunk) => pending.push(chunk),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        for (stream, text) in pending {
            self.record(stream, &text);
        }
    }

    fn record(&mut self, stream: OutputStream, text: &str) {
        trace!(?stream, text, "process:output");
        match stream {
            OutputStream::Stdout => self.stdout.push_str(text),
            OutputStream::Stderr => self.stderr.push_str(text),
        }
    }

    fn spawn_error(&self, err: io::Error) -> SandboxError {
        let message = if err.kind() == io::ErrorKind::NotFound {
            format!("'{}' was not found in PATH", self.spec.program())
        } else {
            err.to_string()
        };
        SandboxError::runtime_unavailable(self.spec.program(), message)
    }

    fn spawn_terminal(&self) -> Result<ChildHandle, SandboxError> {
        if !io::stdin().is_terminal() || !io::stdout().is_terminal() {
            warn!("no terminal attached, running without interactive control");
        }
        let child = Command::new(self.spec.program())
            .args(self.spec.args())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;
        Ok(ChildHandle::Std(child))
    }

    fn spawn_piped(
        &self,
    ) -> Result<(ChildHandle, Receiver<Chunk>, Vec<JoinHandle<()>>), SandboxError> {
        let mut child = Command::new(self.spec.program())
            .args(self.spec.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, OutputStream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, OutputStream::Stderr, tx.clone()));
        }
        drop(tx);

        Ok((ChildHandle::Std(child), rx, readers))
    }

    fn spawn_pty(
        &self,
    ) -> Result<(ChildHandle, Receiver<Chunk>, Vec<JoinHandle<()>>), PtyError> {
        let pair = native_pty_system()
            .openpty(terminal_size())
            .map_err(PtyError::Unsupported)?;

        let mut cmd = portable_pty::CommandBuilder::new(self.spec.program());
        cmd.args(self.spec.args());
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            PtyError::Spawn(SandboxError::runtime_unavailable(
                self.spec.program(),
                e.to_string(),
            ))
        })?;
        // Only the child may hold the slave, otherwise the reader never sees EOF.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(PtyError::Unsupported)?;
        let (tx, rx) = mpsc::channel();
        let handle = spawn_chunk_reader(reader, tx);

        Ok((
            ChildHandle::Pty {
                child,
                _master: pair.master,
            },
            rx,
            vec![handle],
        ))
    }
}

enum PtyError {
    /// No pseudo-terminal could be allocated on this host.
    Unsupported(anyhow::Error),
    Spawn(SandboxError),
}

fn terminal_size() -> PtySize {
    let (rows, cols) = console::Term::stdout().size_checked().unwrap_or((24, 80));
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn spawn_line_reader<R: Read + Send + 'static>(
    source: R,
    stream: OutputStream,
    tx: Sender<Chunk>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(source);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

fn spawn_chunk_reader(mut source: Box<dyn Read + Send>, tx: Sender<Chunk>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        let mut pending: Vec<u8> = Vec::new();
        loop {
            // EIO once the child side closes is the normal end of a pty stream.
            let n = match source.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            pending.extend_from_slice(&buf[..n]);
            let text = take_utf8(&mut pending);
            if !text.is_empty() && tx.send((OutputStream::Stdout, text)).is_err() {
                return;
            }
        }
        if !pending.is_empty() {
            let rest = String::from_utf8_lossy(&pending).into_owned();
            let _ = tx.send((OutputStream::Stdout, rest));
        }
    })
}

/// Remove and return the longest decodable prefix of `bytes`, keeping an
/// incomplete trailing character for the next read.
fn take_utf8(bytes: &mut Vec<u8>) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let text = text.to_string();
            bytes.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            let text = String::from_utf8_lossy(&bytes[..valid]).into_owned();
            bytes.drain(..valid);
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            bytes.clear();
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(tokens: &[&str], mode: AttachMode) -> CommandSpec {
        CommandSpec::new(tokens.iter().map(|s| s.to_string()).collect(), mode)
    }

    #[test]
    fn test_batch_streams_lines_to_sink() {
        let mut process = SandboxProcess::new(spec(
            &["sh", "-c", "echo one; echo two; echo oops >&2"],
            AttachMode::Batch,
        ));
        let mut lines = Vec::new();
        let exit = process
            .run(|stream, text| lines.push((stream, text.trim_end().to_string())))
            .unwrap();

        assert!(exit.success());
        assert!(lines.contains(&(OutputStream::Stdout, "one".to_string())));
        assert!(lines.contains(&(OutputStream::Stdout, "two".to_string())));
        assert!(lines.contains(&(OutputStream::Stderr, "oops".to_string())));
        assert_eq!(process.stdout(), "one\ntwo\n");
        assert_eq!(process.stderr(), "oops\n");
    }

    #[test]
    fn test_batch_reports_failure_with_stderr() {
        let mut process = SandboxProcess::new(spec(
            &["sh", "-c", "echo broken >&2; exit 3"],
            AttachMode::Batch,
        ));
        let exit = process.run(|_, _| {}).unwrap();

        assert!(!exit.success());
        assert_eq!(exit.code(), 3);
        let err = process.ensure_success("Image build").unwrap_err();
        assert_eq!(err.to_string(), "Image build failed (exit code 3):\nbroken");
    }

    #[test]
    fn test_missing_binary_is_runtime_unavailable() {
        let mut process = SandboxProcess::new(spec(
            &["turbo-test-no-such-binary", "sandbox", "ls"],
            AttachMode::Batch,
        ));
        let err = process.run(|_, _| {}).unwrap_err();
        assert!(matches!(err, SandboxError::RuntimeUnavailable { .. }));
    }

    #[test]
    fn test_start_then_poll_until_done() {
        let mut process = SandboxProcess::new(spec(
            &["sh", "-c", "sleep 0.2; echo finished"],
            AttachMode::Batch,
        ));
        process.start().unwrap();
        let mut polls = 0;
        while process.is_running() {
            polls += 1;
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        let exit = process.wait().unwrap();

        assert!(polls > 0);
        assert!(exit.success());
        assert!(process.stdout().contains("finished"));
        assert!(process.ensure_success("Sleep").is_ok());
    }

    #[test]
    fn test_capture_collects_output() {
        let mut process = SandboxProcess::new(spec(
            &["sh", "-c", "printf 'hello from pty\\n'"],
            AttachMode::Capture,
        ));
        let exit = process.run(|_, _| {}).unwrap();

        assert!(exit.success());
        assert!(process.output_plain().contains("hello from pty"));
    }

    #[test]
    fn test_take_utf8_keeps_partial_character() {
        let mut bytes = "héllo".as_bytes().to_vec();
        let split = bytes.split_off(2);
        let mut pending = bytes;
        assert_eq!(take_utf8(&mut pending), "h");
        assert_eq!(pending.len(), 1);
        pending.extend_from_slice(&split);
        assert_eq!(take_utf8(&mut pending), "éllo");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_wait_before_start_errors() {
        let mut process = SandboxProcess::new(spec(&["true"], AttachMode::Batch));
        assert!(process.wait().is_err());
        assert!(!process.is_running());
    }
}
