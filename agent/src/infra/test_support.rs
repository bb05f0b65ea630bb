//! Shared test helpers for adapters built on `CommandRunner`.

use std::collections::VecDeque;
use std::process::Output;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;

use crate::application::ports::CommandRunner;

/// Build an `ExitStatus` from a logical exit code.
#[cfg(unix)]
pub fn exit_status(code: i32) -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(code << 8)
}

pub fn ok_output(stdout: &[u8]) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.to_vec(),
        stderr: Vec::new(),
    }
}

pub fn fail_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// One recorded invocation: the full command line and any stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub stdin: Option<Vec<u8>>,
}

/// Returns queued outputs in order (success when the queue is empty) and
/// records every command line.
#[derive(Default)]
pub struct ScriptedRunner {
    replies: Mutex<VecDeque<Output>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn with_replies(replies: impl IntoIterator<Item = Output>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .map(|c| c.command.clone())
            .collect()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.lock().expect("lock").clone()
    }

    fn reply(&self, program: &str, args: &[&str], stdin: Option<&[u8]>) -> Output {
        let mut command = program.to_string();
        for arg in args {
            command.push(' ');
            command.push_str(arg);
        }
        self.calls.lock().expect("lock").push(Invocation {
            command,
            stdin: stdin.map(<[u8]>::to_vec),
        });
        self.replies
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| ok_output(b""))
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        Ok(self.reply(program, args, None))
    }

    async fn run_with_timeout(&self, program: &str, args: &[&str], _: Duration) -> Result<Output> {
        Ok(self.reply(program, args, None))
    }

    async fn run_with_stdin(&self, program: &str, args: &[&str], input: &[u8]) -> Result<Output> {
        Ok(self.reply(program, args, Some(input)))
    }
}

impl CommandRunner for &ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        (**self).run(program, args).await
    }

    async fn run_with_timeout(&self, program: &str, args: &[&str], t: Duration) -> Result<Output> {
        (**self).run_with_timeout(program, args, t).await
    }

    async fn run_with_stdin(&self, program: &str, args: &[&str], input: &[u8]) -> Result<Output> {
        (**self).run_with_stdin(program, args, input).await
    }
}
