// MIT License
//
// Copyright (c) 2016 Alexander Thaller <alexander.thaller@trivago.com>
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use std::ffi::OsString;
use std::process::Command;

use crate::Error;

/// Captured result of one manager invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Output {
    /// Exit code, `None` when the child was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// What to do with diagnostics the manager writes to stderr while still
/// exiting with status zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StderrPolicy {
    /// Any stderr output is a failure.
    Strict,
    /// Only the exit status decides; stderr output is logged.
    Tolerate,
}

impl Default for StderrPolicy {
    fn default() -> StderrPolicy {
        StderrPolicy::Strict
    }
}

/// Something that can run a VBoxManage subcommand and hand back its output.
pub trait Manager {
    fn run(&self, args: &[&str]) -> Result<Output, Error>;
}

/// Runs the real `VBoxManage` executable.
#[derive(Debug, Clone)]
pub struct VBoxManage {
    program: OsString,
}

impl VBoxManage {
    pub fn new<P: Into<OsString>>(program: P) -> VBoxManage {
        VBoxManage { program: program.into() }
    }
}

impl Default for VBoxManage {
    fn default() -> VBoxManage {
        VBoxManage::new("VBoxManage")
    }
}

impl Manager for VBoxManage {
    fn run(&self, args: &[&str]) -> Result<Output, Error> {
        let command = command_line(&self.program.to_string_lossy(), args);
        debug!("running: {}", command);

        // output() waits for the child and drains both pipes before returning
        let output = Command::new(&self.program).args(args).output().map_err(|err| {
            Error::Spawn {
                command: command.clone(),
                source: err,
            }
        })?;

        let output = Output {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        trace!("output of {}: {:#?}", command, output);

        Ok(output)
    }
}

/// Runs `args` through the manager and returns stdout if the call counts as
/// successful under `policy`.
pub fn query<M: Manager>(manager: &M, policy: StderrPolicy, args: &[&str]) -> Result<String, Error> {
    let output = manager.run(args)?;
    check(&command_line("VBoxManage", args), output, policy)
}

fn check(command: &str, output: Output, policy: StderrPolicy) -> Result<String, Error> {
    let has_stderr = !output.stderr.is_empty();

    if !output.success() || (has_stderr && policy == StderrPolicy::Strict) {
        return Err(Error::Invocation {
            command: command.to_string(),
            status: output.status,
            stderr: output.stderr,
        });
    }

    if has_stderr {
        warn!("{} wrote to stderr: {}", command, output.stderr.trim_end());
    }

    Ok(output.stdout)
}

fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = String::from(program);
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }

    line
}
