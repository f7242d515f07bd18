// SPDX-License-Identifier: MIT

//! Canned `HostOps` for tests: replies are matched on the program name and,
//! optionally, a needle found among the arguments or in stdin.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::{
    error::{HostError, HostResult},
    runner::{HostOps, ToolOutput, ToolRequest},
};

#[derive(Debug, Clone)]
pub enum Reply {
    /// Exit 0 with this stdout.
    Stdout(Vec<u8>),
    /// Exit with `code` and this stdout.
    Exit { code: i32, stdout: Vec<u8> },
    Error(HostError),
}

impl Reply {
    pub fn text<S: AsRef<str>>(text: S) -> Self {
        Reply::Stdout(text.as_ref().as_bytes().to_vec())
    }
}

#[derive(Debug)]
struct Rule {
    program: String,
    needle: Option<String>,
    reply: Reply,
}

impl Rule {
    fn matches(&self, request: &ToolRequest) -> bool {
        if self.program != request.program {
            return false;
        }
        let Some(needle) = &self.needle else {
            return true;
        };
        request.args.iter().any(|a| a == needle)
            || request
                .stdin
                .as_deref()
                .is_some_and(|stdin| stdin.contains(needle.as_str()))
    }
}

#[derive(Debug, Default)]
pub struct ScriptedHost {
    rules: Vec<Rule>,
    inodes: HashMap<PathBuf, u64>,
    calls: Mutex<Vec<ToolRequest>>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies to every call of `program` not matched by an earlier rule.
    pub fn reply<S: Into<String>>(mut self, program: S, reply: Reply) -> Self {
        self.rules.push(Rule {
            program: program.into(),
            needle: None,
            reply,
        });
        self
    }

    /// Replies to calls of `program` having `needle` as an argument or in stdin.
    pub fn reply_when<S: Into<String>, N: Into<String>>(
        mut self,
        program: S,
        needle: N,
        reply: Reply,
    ) -> Self {
        self.rules.push(Rule {
            program: program.into(),
            needle: Some(needle.into()),
            reply,
        });
        self
    }

    pub fn inode<P: Into<PathBuf>>(mut self, path: P, inode: u64) -> Self {
        self.inodes.insert(path.into(), inode);
        self
    }

    pub fn calls(&self) -> Vec<ToolRequest> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls_to(&self, program: &str) -> usize {
        self.calls().iter().filter(|c| c.program == program).count()
    }
}

impl HostOps for ScriptedHost {
    fn run(&self, request: &ToolRequest) -> HostResult<ToolOutput> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let rule = self
            .rules
            .iter()
            .find(|r| r.matches(request))
            .ok_or_else(|| HostError::Spawn {
                tool: request.program.clone(),
                reason: format!("no scripted reply for `{}`", request.command_line()),
            })?;

        match &rule.reply {
            Reply::Stdout(stdout) => Ok(ToolOutput {
                stdout: stdout.clone(),
                code: Some(0),
                ..Default::default()
            }),
            Reply::Exit { code, stdout } => Ok(ToolOutput {
                stdout: stdout.clone(),
                code: Some(*code),
                ..Default::default()
            }),
            Reply::Error(error) => Err(error.clone()),
        }
    }

    fn inode_of(&self, path: &Path) -> HostResult<u64> {
        self.inodes.get(path).copied().ok_or_else(|| HostError::Stat {
            path: path.to_path_buf(),
            reason: "No such file or directory".into(),
        })
    }
}
