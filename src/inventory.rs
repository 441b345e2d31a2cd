#![crate_name = "inventory"]
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

//! Ansible dynamic inventory for running VirtualBox VMs.
//!
//! Running VMs are discovered with `VBoxManage list runningvms` and each
//! guest's first IPv4 address is read from its guest properties.

#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

extern crate regex;
extern crate serde;
extern crate serde_json;
extern crate thiserror;

pub mod parse;
pub mod vboxmanage;

use crate::parse::VmNames;
use crate::vboxmanage::{Manager, StderrPolicy};
use std::collections::BTreeMap as Map;
use std::io;
use std::vec::Vec;

/// Host variable set from the guest's first IPv4 address.
pub const SSH_HOST_VAR: &'static str = "ansible_ssh_host";

/// Guest property holding the IPv4 address of the first network interface.
pub const IP_PROPERTY: &'static str = "/VirtualBox/GuestInfo/Net/0/V4/IP";

pub type HostVars = Map<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{} failed ({}): {}", .command, status_text(.status), .stderr)]
    Invocation {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("can not run {}: {}", .command, .source)]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid line pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("can not convert to json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid host variable {0:?}, expected KEY=VALUE")]
    InvalidHostvar(String),
}

impl Error {
    pub fn is_invocation(&self) -> bool {
        match *self {
            Error::Invocation { .. } => true,
            _ => false,
        }
    }
}

fn status_text(status: &Option<i32>) -> String {
    match *status {
        Some(code) => format!("exit status {}", code),
        None => "killed by signal".to_string(),
    }
}

/// Settings shared by every query. Never modified once built.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Static variables every host starts out with.
    pub template: HostVars,
    pub stderr_policy: StderrPolicy,
}

impl Config {
    /// Builds a config from `KEY=VALUE` pairs. Later duplicates win.
    pub fn with_vars<'a, I>(vars: I, stderr_policy: StderrPolicy) -> Result<Config, Error>
        where I: IntoIterator<Item = &'a str>
    {
        let mut template = HostVars::new();
        for var in vars {
            let (key, value) = parse_hostvar(var)?;
            template.insert(key, value);
        }

        Ok(Config {
            template: template,
            stderr_policy: stderr_policy,
        })
    }
}

/// Splits a `KEY=VALUE` argument. The value may itself contain `=`.
pub fn parse_hostvar(var: &str) -> Result<(String, String), Error> {
    match var.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(Error::InvalidHostvar(var.to_string())),
    }
}

/// The document Ansible expects from `--list`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Inventory {
    /// The Ansible group every running VM ends up in.
    pub vbox: Vec<String>,
    #[serde(rename = "_meta")]
    pub meta: Meta,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Meta {
    pub hostvars: Map<String, HostVars>,
}

/// Names of the currently running VMs, in the order VBoxManage lists them.
pub fn running_vm_names<M: Manager>(manager: &M, config: &Config) -> Result<VmNames, Error> {
    let stdout = vboxmanage::query(manager, config.stderr_policy, &["list", "runningvms"])?;
    VmNames::new(&stdout)
}

/// Host variables for one VM: the template plus `ansible_ssh_host` when the
/// guest reports an address.
pub fn hostvars<M: Manager>(manager: &M, config: &Config, vmname: &str) -> Result<HostVars, Error> {
    let mut vars = config.template.clone();

    let stdout = vboxmanage::query(manager,
                                   config.stderr_policy,
                                   &["guestproperty", "get", vmname, IP_PROPERTY])?;

    match parse::guest_ip(&stdout) {
        Some(ip) => {
            debug!("{} has ip {}", vmname, ip);
            vars.insert(SSH_HOST_VAR.to_string(), ip);
        }
        None => debug!("{} reports no ip, guest additions missing?", vmname),
    }

    Ok(vars)
}

/// Queries every running VM. The first failing query aborts the whole run.
pub fn inventory<M: Manager>(manager: &M, config: &Config) -> Result<Inventory, Error> {
    let mut inventory = Inventory::default();

    for vmname in running_vm_names(manager, config)? {
        let vars = hostvars(manager, config, &vmname)?;
        inventory.meta.hostvars.insert(vmname.clone(), vars);
        inventory.vbox.push(vmname);
    }

    debug!("inventory has {} hosts", inventory.vbox.len());

    Ok(inventory)
}

pub fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String, Error> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };

    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use crate::vboxmanage::Output;

    /// Replays canned outputs keyed by the joined argument list.
    #[derive(Default)]
    struct Replay {
        outputs: Map<String, Output>,
        calls: RefCell<Vec<String>>,
    }

    impl Replay {
        fn on(mut self, args: &str, status: i32, stdout: &str, stderr: &str) -> Replay {
            self.outputs.insert(args.to_string(),
                                Output {
                                    status: Some(status),
                                    stdout: stdout.to_string(),
                                    stderr: stderr.to_string(),
                                });
            self
        }

        fn ip(self, vmname: &str, stdout: &str) -> Replay {
            let args = format!("guestproperty get {} {}", vmname, IP_PROPERTY);
            self.on(&args, 0, stdout, "")
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl Manager for Replay {
        fn run(&self, args: &[&str]) -> Result<Output, Error> {
            let key = args.join(" ");
            self.calls.borrow_mut().push(key.clone());

            match self.outputs.get(&key) {
                Some(output) => Ok(output.clone()),
                None => panic!("unexpected call: {}", key),
            }
        }
    }

    fn template() -> Config {
        Config::with_vars(vec!["ansible_ssh_user=vagrant", "env=dev"], StderrPolicy::Strict)
            .unwrap()
    }

    #[test]
    fn hostvars_with_ip() {
        let manager = Replay::default().ip("web", "Value: 10.0.2.15\n");
        let vars = hostvars(&manager, &Config::default(), "web").unwrap();

        assert_eq!(vars.len(), 1);
        assert_eq!(vars[SSH_HOST_VAR], "10.0.2.15");
    }

    #[test]
    fn hostvars_without_ip_omit_the_key() {
        let manager = Replay::default().ip("web", "").ip("db", "No value set!\n");
        let config = template();

        let web = hostvars(&manager, &config, "web").unwrap();
        let db = hostvars(&manager, &config, "db").unwrap();

        assert!(!web.contains_key(SSH_HOST_VAR));
        assert!(!db.contains_key(SSH_HOST_VAR));
        assert_eq!(web, config.template);
    }

    #[test]
    fn template_is_not_shared_between_hosts() {
        let manager = Replay::default()
            .ip("web", "Value: 10.0.2.15\n")
            .ip("db", "");
        let config = template();
        let before = config.template.clone();

        let web = hostvars(&manager, &config, "web").unwrap();
        let db = hostvars(&manager, &config, "db").unwrap();

        assert_eq!(config.template, before);
        assert_eq!(web["ansible_ssh_user"], "vagrant");
        assert_eq!(web[SSH_HOST_VAR], "10.0.2.15");
        assert_eq!(db["env"], "dev");
        assert!(!db.contains_key(SSH_HOST_VAR));
    }

    #[test]
    fn hostvars_failure_carries_stderr() {
        let manager = Replay::default().on(&format!("guestproperty get ghost {}", IP_PROPERTY),
                                           1,
                                           "",
                                           "VBoxManage: error: Could not find a registered \
                                            machine named 'ghost'\n");

        let err = hostvars(&manager, &Config::default(), "ghost").unwrap_err();

        match err {
            Error::Invocation { command, stderr, .. } => {
                assert_eq!(command,
                           format!("VBoxManage guestproperty get ghost {}", IP_PROPERTY));
                assert!(stderr.contains("Could not find a registered machine"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn inventory_keeps_listing_order() {
        let manager = Replay::default()
            .on("list runningvms", 0, "\"web\" {1}\n\"db\" {2}\n\"cache\" {3}\n", "")
            .ip("web", "Value: 10.0.2.15\n")
            .ip("db", "Value: 10.0.2.16\n")
            .ip("cache", "");

        let inventory = inventory(&manager, &Config::default()).unwrap();

        assert_eq!(inventory.vbox, vec!["web", "db", "cache"]);
        assert_eq!(inventory.meta.hostvars.len(), 3);
        assert_eq!(inventory.meta.hostvars["db"][SSH_HOST_VAR], "10.0.2.16");
        assert!(inventory.meta.hostvars["cache"].is_empty());
    }

    #[test]
    fn inventory_without_running_vms() {
        let manager = Replay::default().on("list runningvms", 0, "", "");

        let inventory = inventory(&manager, &Config::default()).unwrap();

        assert!(inventory.vbox.is_empty());
        assert!(inventory.meta.hostvars.is_empty());
        assert_eq!(manager.calls(), vec!["list runningvms"]);
    }

    #[test]
    fn inventory_fails_when_listing_fails() {
        let manager = Replay::default().on("list runningvms", 0, "\"web\" {1}\n", "warning\n");

        let err = inventory(&manager, &Config::default()).unwrap_err();

        assert!(err.is_invocation());
        assert_eq!(manager.calls(), vec!["list runningvms"]);
    }

    #[test]
    fn inventory_fails_when_one_host_fails() {
        let manager = Replay::default()
            .on("list runningvms", 0, "\"web\" {1}\n\"db\" {2}\n\"cache\" {3}\n", "")
            .ip("web", "Value: 10.0.2.15\n")
            .on(&format!("guestproperty get db {}", IP_PROPERTY), 1, "", "boom\n");

        let err = inventory(&manager, &Config::default()).unwrap_err();

        assert!(err.is_invocation());
        assert_eq!(manager.calls().len(), 3);
    }

    #[test]
    fn tolerated_stderr_does_not_abort() {
        let manager = Replay::default()
            .on("list runningvms", 0, "\"web\" {1}\n", "warning\n")
            .on(&format!("guestproperty get web {}", IP_PROPERTY),
                0,
                "Value: 10.0.2.15\n",
                "warning\n");
        let config = Config { stderr_policy: StderrPolicy::Tolerate, ..Config::default() };

        let inventory = inventory(&manager, &config).unwrap();

        assert_eq!(inventory.vbox, vec!["web"]);
    }

    #[test]
    fn inventory_json_shape() {
        let manager = Replay::default()
            .on("list runningvms", 0, "\"web\" {1}\n", "")
            .ip("web", "Value: 10.0.2.15\n");

        let json = to_json(&inventory(&manager, &template()).unwrap(), false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let top: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(top, vec!["_meta", "vbox"]);

        let meta: Vec<_> = value["_meta"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(meta, vec!["hostvars"]);

        assert_eq!(value["vbox"], serde_json::json!(["web"]));
        assert_eq!(value["_meta"]["hostvars"]["web"],
                   serde_json::json!({
                       "ansible_ssh_host": "10.0.2.15",
                       "ansible_ssh_user": "vagrant",
                       "env": "dev",
                   }));
    }

    #[test]
    fn hostvar_arguments() {
        assert_eq!(parse_hostvar("env=dev").unwrap(),
                   ("env".to_string(), "dev".to_string()));
        assert_eq!(parse_hostvar("opts=-o a=b").unwrap(),
                   ("opts".to_string(), "-o a=b".to_string()));
        assert_eq!(parse_hostvar("empty=").unwrap(),
                   ("empty".to_string(), String::new()));
        assert!(parse_hostvar("novalue").is_err());
        assert!(parse_hostvar("=value").is_err());
    }

    #[test]
    fn later_hostvars_win() {
        let config = Config::with_vars(vec!["env=dev", "env=prod"], StderrPolicy::Strict).unwrap();

        assert_eq!(config.template.len(), 1);
        assert_eq!(config.template["env"], "prod");
    }
}
