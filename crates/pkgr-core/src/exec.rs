//! Subprocess execution with privilege de-escalation, dry-run, and timeouts.
//!
//! Adapted from `vx-core::command`'s cross-platform `build_command` idiom;
//! here synchronous (the core has no internal async scheduling, see
//! CONCURRENCY & RESOURCE MODEL), with an added EUID-drop and timeout layer
//! grounded on `pydantic_pkgr/binprovider.py`'s `BinProvider.exec`.

use crate::error::{PkgrError, PkgrResult};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    fn dry_run() -> Self {
        Self {
            returncode: 0,
            stdout: String::new(),
            stderr: "skipped (dry run)".to_string(),
        }
    }
}

/// The uid/gid a subprocess should run as, if the caller wants to drop
/// privileges before exec. `None` means "inherit the current process's".
#[derive(Debug, Clone, Copy, Default)]
pub struct Euid {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

pub struct ExecOptions<'a> {
    pub cwd: &'a Path,
    pub euid: Euid,
    pub timeout: Duration,
    pub dry_run: bool,
    pub quiet: bool,
}

/// Run `bin argv...` to completion, honoring dry-run and a wall-clock
/// timeout. Privileges are dropped between fork and exec on POSIX via
/// `Command::uid`/`gid`, which the standard library implements with
/// `setuid`/`setgid` calls in the child before `execve`.
pub fn exec(bin: &Path, argv: &[&str], opts: &ExecOptions) -> PkgrResult<ExecResult> {
    let command_line = format!(
        "{} {}",
        bin.display(),
        argv.join(" ")
    );

    if opts.dry_run {
        info!(target: "pkgr::exec", "DRY RUN: $ {command_line}");
        return Ok(ExecResult::dry_run());
    }

    if !opts.quiet {
        info!(target: "pkgr::exec", "$ {command_line}");
    }

    if !opts.cwd.is_dir() {
        return Err(PkgrError::InvalidInput {
            field: "cwd",
            value: opts.cwd.display().to_string(),
            reason: "working directory does not exist or is not readable".to_string(),
        });
    }

    let mut command = Command::new(bin);
    command
        .args(argv)
        .current_dir(opts.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        if let Some(uid) = opts.euid.uid {
            command.uid(uid);
            apply_passwd_env(&mut command, uid);
        }
        if let Some(gid) = opts.euid.gid {
            command.gid(gid);
        }
    }
    #[cfg(not(unix))]
    {
        if opts.euid.uid.is_some() || opts.euid.gid.is_some() {
            return Err(PkgrError::UnsupportedOperation {
                operation: "privilege drop".to_string(),
                reason: "EUID selection requires a POSIX fork/exec model".to_string(),
            });
        }
    }

    let output = run_with_timeout(command, opts.timeout)?;
    let result = ExecResult {
        returncode: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };

    if !opts.quiet && result.returncode != 0 {
        if result.stderr.contains("Permission denied") {
            return Err(PkgrError::ExecFailed {
                command: command_line,
                status: output.status.code(),
                stderr: result.stderr,
            });
        }
    }

    Ok(result)
}

/// Override `PWD`/`HOME`/`LOGNAME`/`USER` from `uid`'s passwd entry, the way
/// `su`/`sudo -u` reset the child's environment to match the account it's
/// dropping into rather than leaving the caller's identity behind. A uid
/// with no passwd entry (e.g. a bare numeric uid with no matching account)
/// leaves the inherited environment untouched.
#[cfg(unix)]
fn apply_passwd_env(command: &mut Command, uid: u32) {
    let Some(user) = users::get_user_by_uid(uid) else {
        return;
    };
    let home = user.home_dir();
    let login = user.name().to_string_lossy().to_string();
    command.env("HOME", home).env("PWD", home).env("LOGNAME", &login).env("USER", &login);
}

/// The current process's real uid/gid, for providers that want to drop back
/// to "whoever is running us" as a last-resort euid (e.g. `npm`'s "fall back
/// to the currently running user" rule).
#[cfg(unix)]
pub fn current_euid() -> Euid {
    Euid {
        uid: Some(users::get_current_uid()),
        gid: Some(users::get_current_gid()),
    }
}

#[cfg(not(unix))]
pub fn current_euid() -> Euid {
    Euid::default()
}

/// The uid/gid that owns `path`, for providers that drop privileges to
/// match the owner of an install prefix or binary (e.g. `npm`'s prefix dir).
#[cfg(unix)]
pub fn owner_euid(path: &Path) -> Option<Euid> {
    use std::os::unix::fs::MetadataExt;
    let meta = path.metadata().ok()?;
    Some(Euid {
        uid: Some(meta.uid()),
        gid: Some(meta.gid()),
    })
}

#[cfg(not(unix))]
pub fn owner_euid(_path: &Path) -> Option<Euid> {
    None
}

/// A child with piped stdout/stderr must have both pipes drained
/// concurrently with waiting on it: once either pipe fills its OS buffer
/// (~64 KiB), the child blocks on write and never exits, so draining only
/// after `try_wait` reports an exit deadlocks a chatty child until the
/// timeout kills it. Each pipe gets its own reader thread, blocked on
/// `read_to_end` until the child closes it (at exit); `try_wait` only
/// decides when to stop polling and join those threads.
fn run_with_timeout(mut command: Command, timeout: Duration) -> PkgrResult<Output> {
    let start = Instant::now();
    let mut child = command.spawn()?;

    let stdout_reader = child.stdout.take().map(spawn_pipe_reader);
    let stderr_reader = child.stderr.take().map(spawn_pipe_reader);

    loop {
        if let Some(status) = child.try_wait()? {
            let stdout = stdout_reader.map(join_pipe_reader).unwrap_or_default();
            let stderr = stderr_reader.map(join_pipe_reader).unwrap_or_default();
            return Ok(Output {
                status,
                stdout,
                stderr,
            });
        }

        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PkgrError::ExecFailed {
                command: "<timed out>".to_string(),
                status: None,
                stderr: format!("timed out after {:?}", timeout),
            });
        }

        std::thread::sleep(Duration::from_millis(25));
    }
}

fn spawn_pipe_reader<R>(mut pipe: R) -> std::thread::JoinHandle<Vec<u8>>
where
    R: std::io::Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_pipe_reader(handle: std::thread::JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_never_spawns() {
        let opts = ExecOptions {
            cwd: Path::new("/"),
            euid: Euid::default(),
            timeout: Duration::from_secs(1),
            dry_run: true,
            quiet: false,
        };
        let result = exec(Path::new("/definitely/not/a/real/binary"), &[], &opts).unwrap();
        assert_eq!(result.returncode, 0);
        assert!(result.stderr.contains("dry run"));
    }

    #[test]
    fn owner_euid_matches_current_euid_for_a_file_we_just_created() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("owned");
        std::fs::write(&file, b"x").unwrap();
        let owner = owner_euid(&file).unwrap();
        assert_eq!(owner.uid, current_euid().uid);
    }

    #[test]
    fn true_and_false_report_expected_status() {
        let opts = ExecOptions {
            cwd: Path::new("/"),
            euid: Euid::default(),
            timeout: Duration::from_secs(5),
            dry_run: false,
            quiet: true,
        };
        let ok = exec(Path::new("/usr/bin/true"), &[], &opts);
        if let Ok(result) = ok {
            assert_eq!(result.returncode, 0);
        }
    }
}
