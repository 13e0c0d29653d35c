//! Shell execution boundary with a denylist, timeout and bounded output.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{automation, media};
use super::{CommandExecutor, ExecFailure, ExecResult};
use crate::config::{AutomationConfig, ShellConfig};
use crate::directive::CommandKind;

/// Patterns that are never executed, whatever the risk tier or grants.
const DENY_PATTERNS: &[(&str, &str)] = &[
    (
        r"\brm\s+(-\S+\s+)*-\S*r\S*\s+(-\S+\s+)*(/|/\*|~/?|\$home/?)(\s|;|&|\||$)",
        "recursive delete of a root directory",
    ),
    (
        r"\b(mkfs(\.\w+)?|diskutil\s+(erase\w*|reformat|partitiondisk))\b",
        "disk formatting utility",
    ),
    (r"\bformat\s+[a-z]:", "disk formatting utility"),
    (r"\bdd\b.*\bof=/dev/", "raw write to a device"),
    (r">\s*/dev/(sd|disk|nvme|hd)", "raw write to a device"),
    (r"\bsudo\s+rm\b", "privileged delete"),
    (r"\b(shutdown|reboot)\b", "power control"),
    (r"\blaunchctl\s+unload\b", "service control"),
    (r"\bsystemctl\s+(stop|disable)\b", "service control"),
    (r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", "fork bomb"),
];

/// Compiled denylist.
#[derive(Debug, Clone)]
pub struct Denylist {
    patterns: Vec<(Regex, &'static str)>,
}

impl Default for Denylist {
    fn default() -> Self {
        let patterns = DENY_PATTERNS
            .iter()
            .filter_map(|(pattern, reason)| {
                Regex::new(&format!("(?i){pattern}"))
                    .map(|re| (re, *reason))
                    .map_err(|e| warn!(pattern, error = %e, "skipping invalid deny pattern"))
                    .ok()
            })
            .collect();
        Self { patterns }
    }
}

impl Denylist {
    /// The reason `command` is refused, if it is.
    pub fn check(&self, command: &str) -> Option<&'static str> {
        self.patterns
            .iter()
            .find(|(re, _)| re.is_match(command))
            .map(|(_, reason)| *reason)
    }
}

/// Runs command lines through `/bin/sh -c`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    denylist: Denylist,
    timeout: Duration,
    script_timeout: Duration,
    max_bytes: usize,
}

impl ShellExecutor {
    pub fn new(shell: &ShellConfig, automation: &AutomationConfig) -> Self {
        Self {
            denylist: Denylist::default(),
            timeout: Duration::from_secs(shell.timeout_secs),
            script_timeout: Duration::from_secs(automation.timeout_secs),
            max_bytes: shell.max_output_bytes,
        }
    }

    async fn spawn(&self, line: &str, timeout: Duration) -> ExecResult {
        let mut child = match Command::new("/bin/sh")
            .arg("-c")
            .arg(line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ExecResult::failed(ExecFailure::NotFound(e.to_string()));
            }
            Err(e) => {
                return ExecResult::failed(ExecFailure::Other(format!(
                    "failed to spawn command: {e}"
                )));
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let cap = self.max_bytes;

        let run = async {
            let ((out, out_cut), (err, err_cut)) =
                tokio::join!(read_capped(stdout, cap), read_capped(stderr, cap));
            let status = child.wait().await;
            (out, err, out_cut || err_cut, status)
        };

        let outcome = tokio::time::timeout(timeout, run).await;
        let (stdout, stderr, truncated, status) = match outcome {
            Ok(done) => done,
            Err(_) => {
                let _ = child.start_kill();
                warn!(secs = timeout.as_secs(), "command timed out");
                return ExecResult::failed(ExecFailure::Timeout(timeout.as_secs()));
            }
        };

        let mut output = merge_output(&stdout, &stderr);
        if truncated {
            output.push_str(&format!("\n\n[output truncated at {cap} bytes]"));
        }

        match status {
            Ok(status) if status.success() => ExecResult::ok(output),
            Ok(status) => match status.code() {
                Some(127) => ExecResult::failed_with_output(
                    ExecFailure::NotFound(stderr.trim().to_owned()),
                    output,
                ),
                Some(code) => ExecResult::failed_with_output(ExecFailure::Failed { code }, output),
                // Killed by a signal.
                None => ExecResult::failed_with_output(ExecFailure::Failed { code: -1 }, output),
            },
            Err(e) => ExecResult::failed(ExecFailure::Other(format!(
                "failed to check command status: {e}"
            ))),
        }
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run_shell(&self, command: &str, kind: CommandKind) -> ExecResult {
        if let Some(reason) = self.denylist.check(command) {
            warn!(%kind, reason, "refused denylisted command");
            return ExecResult::failed(ExecFailure::Refused(reason.to_owned()));
        }
        info!(%kind, "running shell command");
        debug!(command, "shell command text");
        self.spawn(command, self.timeout).await
    }

    async fn run_script(&self, script: &str) -> ExecResult {
        info!("running automation script");
        self.spawn(&automation::shell_command(script), self.script_timeout)
            .await
    }

    async fn open_url(&self, url: &str) -> ExecResult {
        if !is_web_link(url) {
            warn!("refused to open a non-web link");
            return ExecResult::failed(ExecFailure::Refused("not a web link".to_owned()));
        }
        info!("opening link");
        debug!(url, "link text");
        self.spawn(&media::opener_command(url), self.timeout).await
    }
}

fn is_web_link(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

/// Keep at most `cap` bytes. The rest of the stream is drained into a sink so
/// the writer never dies of a closed pipe.
async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize) -> (String, bool) {
    let Some(reader) = reader else {
        return (String::new(), false);
    };
    let mut buf = Vec::new();
    let limit = u64::try_from(cap).unwrap_or(u64::MAX).saturating_add(1);
    let mut limited = reader.take(limit);
    if let Err(e) = limited.read_to_end(&mut buf).await {
        debug!(error = %e, "output stream read failed");
    }
    let truncated = buf.len() > cap;
    if truncated {
        let mut rest = limited.into_inner();
        match tokio::io::copy(&mut rest, &mut tokio::io::sink()).await {
            Ok(dropped) => debug!(dropped, "discarded output past the cap"),
            Err(e) => debug!(error = %e, "output stream drain failed"),
        }
    }
    buf.truncate(cap);
    (String::from_utf8_lossy(&buf).into_owned(), truncated)
}

fn merge_output(stdout: &str, stderr: &str) -> String {
    if stderr.trim().is_empty() {
        stdout.to_owned()
    } else if stdout.trim().is_empty() {
        stderr.to_owned()
    } else {
        format!("{stdout}\n--- stderr ---\n{stderr}")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn executor() -> ShellExecutor {
        ShellExecutor::new(&ShellConfig::default(), &AutomationConfig::default())
    }

    #[test]
    fn denylist_compiles_every_pattern() {
        assert_eq!(Denylist::default().patterns.len(), DENY_PATTERNS.len());
    }

    #[test]
    fn denylist_refuses_destructive_commands() {
        let deny = Denylist::default();
        for cmd in [
            "rm -rf /",
            "rm -rf / --no-preserve-root",
            "RM -RF ~",
            "rm -r -f /*",
            "sudo rm -rf /important",
            "mkfs.ext4 /dev/sdb1",
            "diskutil eraseDisk APFS X disk2",
            "dd if=/dev/zero of=/dev/disk2 bs=1m",
            "cat junk > /dev/sda",
            "shutdown -h now",
            "sudo reboot",
            "launchctl unload -w /System/Library/LaunchDaemons/x.plist",
            "systemctl stop sshd",
            "systemctl disable firewalld",
            ":(){ :|:& };:",
        ] {
            assert!(deny.check(cmd).is_some(), "{cmd} should be refused");
        }
    }

    #[test]
    fn denylist_allows_ordinary_commands() {
        let deny = Denylist::default();
        for cmd in [
            "ls -la ~",
            "rm -rf ./build",
            "rm notes.txt",
            "echo hello > /dev/null",
            "open -a Calculator",
            "df -h /",
            "systemctl status nginx",
        ] {
            assert!(deny.check(cmd).is_none(), "{cmd} should be allowed");
        }
    }

    #[tokio::test]
    async fn refused_command_is_not_spawned() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let cmd = format!("touch {} ; shutdown -h now", marker.display());
        let result = executor().run_shell(&cmd, CommandKind::Terminal).await;
        assert!(matches!(result.error, Some(ExecFailure::Refused(_))));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn open_url_refuses_non_web_links() {
        for url in ["file:///etc/passwd", "javascript:alert(1)", "; reboot"] {
            let result = executor().open_url(url).await;
            assert!(matches!(result.error, Some(ExecFailure::Refused(_))), "{url}");
        }
    }

    #[test]
    fn web_links_are_recognised() {
        assert!(is_web_link("https://www.youtube.com/results?search_query=reboot+lofi+mix"));
        assert!(is_web_link("HTTP://example.test"));
        assert!(!is_web_link("ftp://example.test"));
    }

    #[tokio::test]
    async fn captures_stdout() {
        let result = executor().run_shell("echo hello", CommandKind::Terminal).await;
        assert!(result.success);
        assert_eq!(result.output.trim(), "hello");
    }

    #[tokio::test]
    async fn merges_stderr() {
        let result = executor()
            .run_shell("echo out; echo err 1>&2", CommandKind::Terminal)
            .await;
        assert!(result.success);
        assert!(result.output.contains("out"));
        assert!(result.output.contains("--- stderr ---"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_failed() {
        let result = executor().run_shell("exit 3", CommandKind::Terminal).await;
        assert_eq!(result.error, Some(ExecFailure::Failed { code: 3 }));
    }

    #[tokio::test]
    async fn missing_program_is_not_found() {
        let result = executor()
            .run_shell("definitely-not-a-real-program-xyz", CommandKind::Terminal)
            .await;
        assert!(matches!(result.error, Some(ExecFailure::NotFound(_))));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let shell = ShellConfig {
            timeout_secs: 1,
            ..ShellConfig::default()
        };
        let exec = ShellExecutor::new(&shell, &AutomationConfig::default());
        let result = exec.run_shell("sleep 5", CommandKind::Terminal).await;
        assert_eq!(result.error, Some(ExecFailure::Timeout(1)));
    }

    #[tokio::test]
    async fn large_output_is_capped() {
        let shell = ShellConfig {
            max_output_bytes: 1024,
            ..ShellConfig::default()
        };
        let exec = ShellExecutor::new(&shell, &AutomationConfig::default());
        let result = exec
            .run_shell("head -c 100000 /dev/zero | tr '\\0' 'a'", CommandKind::Terminal)
            .await;
        assert!(result.success, "{:?}", result.error);
        assert!(result.output.contains("[output truncated at 1024 bytes]"));
        assert!(result.output.len() < 1200);
    }

    #[tokio::test]
    async fn long_running_writer_past_the_cap_still_succeeds() {
        let shell = ShellConfig {
            max_output_bytes: 1024,
            ..ShellConfig::default()
        };
        let exec = ShellExecutor::new(&shell, &AutomationConfig::default());
        let result = exec.run_shell("seq 1 2000000", CommandKind::Terminal).await;
        assert!(result.success, "{:?}", result.error);
        assert!(result.output.starts_with("1\n2\n3\n"));
        assert!(result.output.contains("[output truncated at 1024 bytes]"));
    }

    #[test]
    fn merge_output_variants() {
        assert_eq!(merge_output("a", ""), "a");
        assert_eq!(merge_output("", "b"), "b");
        assert_eq!(merge_output("a", "b"), "a\n--- stderr ---\nb");
    }
}
