//! The `exec` command: runs the analyser for a client.

use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;

use tracing::{debug, info};

use super::{COMMAND_TARGET, CommandError, Invocation, ServerContext};
use crate::process::files::atomic_write;
use crate::stdio;

/// Runs the analyser with the request's arguments and working directory.
///
/// The request body becomes the analyser's standard input, and its output is
/// relayed to the current standard streams. A non-zero exit code is a normal
/// analyser verdict and is recorded in the status file rather than raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exec {
    invocation: Invocation,
}

impl Exec {
    pub fn new(invocation: Invocation) -> Self {
        Self { invocation }
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Runs the analyser to completion.
    ///
    /// # Errors
    ///
    /// Fails on a foreign token, a missing working directory, an analyser
    /// that cannot be started or is killed by a signal, and IO failures on
    /// the current streams or the status file.
    pub fn run(&self, context: &ServerContext) -> Result<(), CommandError> {
        context.verify_token(&self.invocation.token)?;

        let cwd = Path::new(&self.invocation.cwd);
        if !cwd.is_dir() {
            return Err(CommandError::WorkingDirectory {
                path: cwd.to_path_buf(),
            });
        }

        let mut input = Vec::new();
        stdio::stdin().read_to_end(&mut input)?;

        let program = context.analyser();
        debug!(
            target: COMMAND_TARGET,
            program,
            args = ?self.invocation.args,
            cwd = %cwd.display(),
            input_bytes = input.len(),
            "starting analyser"
        );

        let mut child = Command::new(program)
            .args(&self.invocation.args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let output = collect_output(&mut child, input)?;
        stdio::stdout().write_all(&output.stdout)?;
        stdio::stderr().write_all(&output.stderr)?;
        stdio::stdout().flush()?;

        let Some(code) = output.status.code() else {
            return Err(CommandError::Terminated {
                program: program.to_string(),
            });
        };
        info!(target: COMMAND_TARGET, program, status = code, "analyser finished");

        if let Some(path) = context.status_path() {
            atomic_write(path, format!("{code}\n").as_bytes()).map_err(|source| {
                CommandError::Status {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        }
        Ok(())
    }
}

/// Feeds `input` to the child on a helper thread while collecting its output.
fn collect_output(child: &mut Child, input: Vec<u8>) -> io::Result<std::process::Output> {
    let feeder = child
        .stdin
        .take()
        .map(|stdin| thread::spawn(move || feed(stdin, &input)));

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (stdout, stderr) = thread::scope(|scope| {
        let stderr = scope.spawn(move || drain(stderr));
        let stdout = drain(stdout);
        let stderr = stderr
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("analyser stderr reader panicked")));
        (stdout, stderr)
    });
    let status = child.wait()?;

    if let Some(feeder) = feeder {
        feeder
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("analyser stdin writer panicked")))?;
    }

    Ok(std::process::Output {
        status,
        stdout: stdout?,
        stderr: stderr?,
    })
}

fn feed(mut stdin: ChildStdin, input: &[u8]) -> io::Result<()> {
    match stdin.write_all(input) {
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

fn drain(stream: Option<impl Read>) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buffer)?;
    }
    Ok(buffer)
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::command::TokenVerifier;
    use crate::dispatch::test_utils::MemoryConnection;
    use crate::process::ShutdownTrigger;
    use crate::stdio::{Redirection, redirect};

    fn context(status_path: &Path) -> ServerContext {
        ServerContext::new(TokenVerifier::new("tok123"), ShutdownTrigger::new())
            .with_analyser("sh")
            .with_status_path(status_path)
    }

    fn exec(script: &str, cwd: &Path) -> Exec {
        Exec::new(Invocation::new(
            vec!["-c".into(), script.into()],
            "tok123",
            cwd.to_str().expect("utf8 path"),
        ))
    }

    #[test]
    fn pipes_body_through_analyser_and_records_status() {
        let dir = tempfile::tempdir().expect("temp dir");
        let status = dir.path().join("lintd.status");
        let connection = MemoryConnection::default();

        let result = redirect(
            Redirection::new(b"puts :ok\n".as_slice(), Box::new(connection.clone())),
            || exec("pwd; cat; echo offence >&2; exit 1", dir.path()).run(&context(&status)),
        );

        result.expect("exec should succeed despite non-zero status");
        let output = connection.contents();
        let cwd = dir.path().canonicalize().expect("canonical temp dir");
        assert!(output.contains(cwd.to_str().expect("utf8 path")), "{output}");
        assert!(output.contains("puts :ok\n"), "{output}");
        assert!(output.ends_with("offence\n"), "{output}");
        assert_eq!(fs::read_to_string(&status).expect("status file"), "1\n");
    }

    #[test]
    fn status_file_is_replaced_whole_by_concurrent_runs() {
        let dir = tempfile::tempdir().expect("temp dir");
        let status = Arc::new(dir.path().join("lintd.status"));
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let status = Arc::clone(&status);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut reads = Vec::new();
                while !done.load(Ordering::SeqCst) {
                    if let Ok(content) = fs::read_to_string(status.as_path()) {
                        reads.push(content);
                    }
                }
                reads
            })
        };

        let runners: Vec<_> = (0..4)
            .map(|code| {
                let status = Arc::clone(&status);
                let cwd = dir.path().to_path_buf();
                thread::spawn(move || {
                    for _ in 0..10 {
                        redirect(
                            Redirection::new(Vec::new(), Box::new(MemoryConnection::default())),
                            || exec(&format!("exit {code}"), &cwd).run(&context(&status)),
                        )
                        .expect("exec");
                    }
                })
            })
            .collect();
        for runner in runners {
            runner.join().expect("runner thread");
        }
        done.store(true, Ordering::SeqCst);

        let reads = reader.join().expect("reader thread");
        for content in &reads {
            assert!(
                matches!(content.as_str(), "0\n" | "1\n" | "2\n" | "3\n"),
                "torn status read: {content:?}"
            );
        }
        let last = fs::read_to_string(status.as_path()).expect("status file");
        assert!(matches!(last.as_str(), "0\n" | "1\n" | "2\n" | "3\n"));
    }

    #[test]
    fn rejects_missing_working_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("missing");
        let error = exec("true", &missing)
            .run(&context(&dir.path().join("lintd.status")))
            .expect_err("missing cwd");
        assert!(matches!(error, CommandError::WorkingDirectory { .. }));
    }

    #[test]
    fn reports_unstartable_analyser() {
        let dir = tempfile::tempdir().expect("temp dir");
        let context = context(&dir.path().join("lintd.status"))
            .with_analyser("lintd-test-no-such-analyser");
        let error = exec("true", dir.path())
            .run(&context)
            .expect_err("spawn should fail");
        assert!(matches!(error, CommandError::Spawn { .. }));
    }

    #[test]
    fn rejects_foreign_token_without_running() {
        let dir = tempfile::tempdir().expect("temp dir");
        let marker = dir.path().join("ran");
        let command = Exec::new(Invocation::new(
            vec!["-c".into(), format!("touch '{}'", marker.display())],
            "intruder",
            dir.path().to_str().expect("utf8 path"),
        ));
        let error = command
            .run(&context(&dir.path().join("lintd.status")))
            .expect_err("token should be rejected");
        assert!(matches!(error, CommandError::InvalidToken));
        assert!(!marker.exists());
    }
}
