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

//! Parsing of the plain text VBoxManage prints.
//!
//! Nothing here trusts the output to be well formed: blank lines are skipped,
//! quoting may be unbalanced and lines may carry more tokens than expected.

use regex::Regex;
use std::vec::IntoIter;

use crate::Error;

/// What VBoxManage prints for a guest property that has never been set.
const NO_VALUE: &'static str = "No value set!";

/// Lazy sequence of VM names taken from `VBoxManage list runningvms` output.
///
/// Each line looks like `"name" {uuid}`. Names are only extracted as the
/// iterator is advanced.
#[derive(Debug)]
pub struct VmNames {
    lines: IntoIter<String>,
    quoted: Regex,
}

impl VmNames {
    pub fn new(stdout: &str) -> Result<VmNames, Error> {
        let lines: Vec<String> = stdout.lines().map(String::from).collect();

        Ok(VmNames {
            lines: lines.into_iter(),
            quoted: Regex::new(r#"^"(?P<name>.*)"(\s+\{[^}]*\})?$"#)?,
        })
    }

    fn name(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(captures) = self.quoted.captures(line) {
            if let Some(name) = captures.name("name") {
                return Some(name.as_str().to_string());
            }
        }

        line.split_whitespace()
            .next()
            .map(|token| token.trim_matches('"').to_string())
    }
}

impl Iterator for VmNames {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while let Some(line) = self.lines.next() {
            match self.name(&line) {
                Some(name) => {
                    trace!("vm name {:?} from line {:?}", name, line);
                    return Some(name);
                }
                None => trace!("skipping line {:?}", line),
            }
        }

        None
    }
}

/// Extracts the address from `VBoxManage guestproperty get` output.
///
/// Returns `None` when the property is not set, which VBoxManage reports
/// either with no output at all or with `No value set!`.
pub fn guest_ip(stdout: &str) -> Option<String> {
    let stdout = stdout.trim();
    if stdout.is_empty() || stdout == NO_VALUE {
        return None;
    }

    stdout.split_whitespace()
        .last()
        .map(|token| token.trim().to_string())
}
