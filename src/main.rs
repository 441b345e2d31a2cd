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

extern crate env_logger;
extern crate inventory;

#[macro_use]
extern crate log;

#[macro_use]
extern crate clap;

use clap::{App, ArgMatches};
use env_logger::LogBuilder;
use inventory::vboxmanage::{StderrPolicy, VBoxManage};
use inventory::{Config, Error};
use log::LogLevelFilter;
use std::ffi::OsStr;
use std::process;

fn main() {
    let yaml = load_yaml!("cli.yml");
    let mut app = App::from_yaml(yaml).version(crate_version!());
    let matches = app.clone().get_matches();

    let loglevel: LogLevelFilter = matches.value_of("log_level")
        .unwrap_or("warn")
        .parse()
        .unwrap_or(LogLevelFilter::Warn);
    LogBuilder::new()
        .filter(None, loglevel)
        .init()
        .expect("can not initialize logger");

    debug!("starting");
    debug!("matches: {:#?}", matches);

    let code = match run(&mut app, &matches) {
        Ok(()) => 0,
        Err(err) => report(&err),
    };

    debug!("exit code: {}", code);
    process::exit(code);
}

fn run(app: &mut App, matches: &ArgMatches) -> Result<(), Error> {
    let policy = if matches.is_present("tolerate_stderr") {
        StderrPolicy::Tolerate
    } else {
        StderrPolicy::Strict
    };

    let config = Config::with_vars(matches.values_of("var").into_iter().flatten(), policy)?;
    debug!("config: {:#?}", config);

    let manager = VBoxManage::new(matches.value_of_os("vboxmanage")
        .unwrap_or_else(|| OsStr::new("VBoxManage")));
    let pretty = matches.is_present("pretty");

    if matches.is_present("list") {
        let hosts = inventory::inventory(&manager, &config)?;
        println!("{}", inventory::to_json(&hosts, pretty)?);
    } else if let Some(vmname) = matches.value_of("host") {
        let hostvars = inventory::hostvars(&manager, &config, vmname)?;
        println!("{}", inventory::to_json(&hostvars, pretty)?);
    } else {
        app.print_help().expect("can not print help");
        println!();
    }

    Ok(())
}

/// Writes the error to stderr and returns the exit code for it. Failing
/// VBoxManage calls exit with 1 and pass their stderr through untouched,
/// anything else is unexpected and exits with 2.
fn report(err: &Error) -> i32 {
    match *err {
        Error::Invocation { ref stderr, .. } if !stderr.is_empty() => {
            eprint!("{}", stderr);
            1
        }
        Error::Invocation { .. } => {
            eprintln!("{}", err);
            1
        }
        _ => {
            eprintln!("error: {}", err);
            2
        }
    }
}
