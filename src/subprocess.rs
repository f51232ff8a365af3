//! Subprocess management.
//!
//! Commands are written as templates such as `"ip link set ? netns ?"`.
//! The template is split into words once; each bare `?` word is then
//! replaced, left to right, by the next argument.  Arguments are never
//! re-split, so a value containing spaces stays a single argv entry.

use std::fmt::Display;
use std::process::{Command, ExitStatus, Stdio};

use tracing::{debug, info};

use crate::err::*;
use crate::namespace::NamespaceHandle;

/// Split a command template into words on whitespace.  Single and
/// double quotes group words and are removed; there are no escapes.
pub fn split_words(template: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut cur = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in template.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => cur.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut cur));
                    in_word = false;
                }
            }
            None => {
                cur.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(cur);
    }
    words
}

/// Expand a template into an argument vector.  The number of `?`
/// placeholders must match `args.len()`; a mismatch is a bug in the
/// caller, not a runtime condition, and panics.
pub fn expand_template(template: &str, args: &[&dyn Display]) -> Vec<String> {
    let mut next = args.iter();
    let argv: Vec<String> = split_words(template).into_iter()
        .map(|w| if w == "?" {
            match next.next() {
                Some(a) => a.to_string(),
                None => panic!("too few arguments for command template {:?}",
                               template),
            }
        } else {
            w
        })
        .collect();
    assert!(next.next().is_none(),
            "too many arguments for command template {:?}", template);
    argv
}

/// Something that can execute an argument vector as a privileged
/// external command.  `run` and `run_in_namespace` are built on top
/// of the two required methods.
pub trait CommandRunner {
    /// Run `argv` to completion.  A non-zero exit is `CommandFailed`.
    fn run_argv(&mut self, argv: &[String]) -> Result<()>;

    /// Run `argv` to completion and return its standard output.
    fn run_argv_output(&mut self, argv: &[String]) -> Result<Vec<u8>>;

    fn run(&mut self, template: &str, args: &[&dyn Display]) -> Result<()> {
        let argv = expand_template(template, args);
        self.run_argv(&argv)
    }

    fn run_in_namespace(&mut self, ns: &NamespaceHandle, template: &str,
                        args: &[&dyn Display]) -> Result<()> {
        let full = format!("ip netns exec ? {}", template);
        let mut all: Vec<&dyn Display> = Vec::with_capacity(args.len() + 1);
        all.push(ns);
        all.extend_from_slice(args);
        self.run(&full, &all)
    }

    fn run_output(&mut self, template: &str, args: &[&dyn Display])
                  -> Result<Vec<u8>> {
        let argv = expand_template(template, args);
        self.run_argv_output(&argv)
    }
}

/// Execution settings for real child processes.
#[derive(Debug, Clone, Default)]
pub struct ChildEnv {
    pub dryrun: bool,
}

/// Runs commands as real child processes, with stdin closed and
/// stdout/stderr inherited.  Every command is logged at debug level.
/// In dry-run mode it is logged at info level and replaced by `true`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    pub env: ChildEnv,
}

impl SystemRunner {
    pub fn new(env: ChildEnv) -> SystemRunner {
        SystemRunner { env }
    }

    fn command(&self, argv: &[String], stdout: Stdio) -> Command {
        if self.env.dryrun {
            info!(cmd = %argv.join(" "), "dry run");
        } else {
            debug!(cmd = %argv.join(" "), "running");
        }
        let exe = if self.env.dryrun { "true" } else { argv[0].as_str() };
        let mut cmd = Command::new(exe);
        cmd.stdin(Stdio::null());
        cmd.stdout(stdout);
        if !self.env.dryrun {
            cmd.args(&argv[1..]);
        }
        cmd
    }
}

fn check_child_status(argv: &[String], status: &ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(map_unsuc_child(status, argv))
    }
}

impl CommandRunner for SystemRunner {
    fn run_argv(&mut self, argv: &[String]) -> Result<()> {
        let status = self.command(argv, Stdio::inherit())
            .status()
            .map_err(|e| map_spawn_err(e, format!("spawn {}", argv[0])))?;
        check_child_status(argv, &status)
    }

    fn run_argv_output(&mut self, argv: &[String]) -> Result<Vec<u8>> {
        let output = self.command(argv, Stdio::piped())
            .output()
            .map_err(|e| map_spawn_err(e, format!("reading from {}", argv[0])))?;
        check_child_status(argv, &output.status)?;
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Vec<String>>,
    }

    impl CommandRunner for Recorder {
        fn run_argv(&mut self, argv: &[String]) -> Result<()> {
            self.calls.push(argv.to_vec());
            Ok(())
        }
        fn run_argv_output(&mut self, argv: &[String]) -> Result<Vec<u8>> {
            self.calls.push(argv.to_vec());
            Ok(Vec::new())
        }
    }

    #[test]
    fn placeholders_substituted_in_order() {
        let argv = expand_template("ip addr change ? dev ?",
                                   &[&"10.8.0.2/24", &"tun0"]);
        assert_eq!(argv, vec!["ip", "addr", "change", "10.8.0.2/24",
                              "dev", "tun0"]);
    }

    #[test]
    fn substituted_values_are_not_resplit() {
        let argv = expand_template("ip addr change ? dev ?",
                                   &[&"10.8.0.2/24; rm -rf /", &"tun 0"]);
        assert_eq!(argv.len(), 6);
        assert_eq!(argv[3], "10.8.0.2/24; rm -rf /");
        assert_eq!(argv[5], "tun 0");
    }

    #[test]
    fn numbers_are_stringified() {
        let argv = expand_template("ip link set dev ? mtu ?", &[&"tun0", &1500u32]);
        assert_eq!(argv, vec!["ip", "link", "set", "dev", "tun0", "mtu", "1500"]);
    }

    #[test]
    fn quoting_and_whitespace() {
        assert_eq!(split_words("  a   'b c'  \"d ? e\" f"),
                   vec!["a", "b c", "d ? e", "f"]);
        assert_eq!(split_words("x '' y"), vec!["x", "", "y"]);
        assert!(split_words("   ").is_empty());
        // a quoted question mark is still a bare "?" word after unquoting
        assert_eq!(expand_template("echo '?'", &[&"hi"]), vec!["echo", "hi"]);
    }

    #[test]
    #[should_panic(expected = "too few arguments")]
    fn too_few_arguments() {
        expand_template("ip link set ? netns ?", &[&"tun0"]);
    }

    #[test]
    #[should_panic(expected = "too many arguments")]
    fn too_many_arguments() {
        expand_template("ip netns add ?", &[&"ns1", &"ns2"]);
    }

    #[test]
    fn namespace_prefix() {
        let ns = NamespaceHandle::new("vpn");
        let mut r = Recorder::default();
        r.run_in_namespace(&ns, "ip link set ? up", &[&"tun0"]).unwrap();
        assert_eq!(r.calls, vec![vec!["ip", "netns", "exec", "vpn",
                                      "ip", "link", "set", "tun0", "up"]]);
    }

    #[test]
    fn dry_run_executes_nothing() {
        let mut r = SystemRunner::new(ChildEnv { dryrun: true });
        let argv = expand_template("/nonexistent/command ?", &[&"x"]);
        r.run_argv(&argv).unwrap();
        assert!(r.run_argv_output(&argv).unwrap().is_empty());
    }

    #[test]
    fn failing_command_reports_status() {
        let mut r = SystemRunner::default();
        match r.run("false", &[]) {
            Err(HLError::CommandFailed { status, cmdline }) => {
                assert_eq!(cmdline, "false");
                assert!(status.contains("code 1"), "{}", status);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let mut r = SystemRunner::default();
        assert!(matches!(r.run("/nonexistent/command", &[]),
                         Err(HLError::Spawn { .. })));
    }
}
