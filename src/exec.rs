use std::ffi::CString;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use tracing::warn;

use crate::error::ExecError;
use crate::types::{Command, RedirectKind};

/// Everything the child needs after `fork`, prepared by the parent. With
/// reaper threads running, the child must stay off the allocator until exec.
struct ChildPlan {
	argv: Vec<CString>,
	redirects: Vec<OpenPlan>,
}

struct OpenPlan {
	fd: RawFd,
	path: CString,
	flags: OFlag,
	mode: Mode,
}

impl ChildPlan {
	fn prepare(cmd: &Command) -> Result<ChildPlan, ExecError> {
		let argv = cmd.argv()?;
		let mut redirects = Vec::with_capacity(cmd.redirects.len());
		for redirect in &cmd.redirects {
			let path = CString::new(redirect.path.as_bytes()).map_err(|e| ExecError::BadArgument {
				name: cmd.name().to_owned(),
				source: e,
			})?;
			let (flags, mode) = match redirect.kind {
				RedirectKind::Input => (OFlag::O_RDONLY, Mode::empty()),
				RedirectKind::Output => (
					OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
					Mode::from_bits_truncate(0o644),
				),
			};
			redirects.push(OpenPlan { fd: redirect.fd, path, flags, mode });
		}
		Ok(ChildPlan { argv, redirects })
	}
}

/// Forks and execs one command. Pipe endpoints, when given, are bound to the
/// child's stdin/stdout before its explicit redirects are applied, so an
/// explicit redirect of the same descriptor wins.
pub fn launch(cmd: &Command, stdin: Option<&OwnedFd>, stdout: Option<&OwnedFd>) -> Result<Pid, ExecError> {
	let plan = ChildPlan::prepare(cmd)?;
	match unsafe { unistd::fork() } {
		Ok(ForkResult::Parent { child }) => Ok(child),
		Ok(ForkResult::Child) => exec_child(&plan, stdin, stdout),
		Err(errno) => Err(ExecError::ForkFailed { name: cmd.name().to_owned(), errno }),
	}
}

/// Runs only in the forked child. Binds pipe endpoints, applies redirects in
/// line order, then replaces the image. Never returns into the caller's
/// stack; any failure is reported as one line and ends the child with
/// status 1.
fn exec_child(plan: &ChildPlan, stdin: Option<&OwnedFd>, stdout: Option<&OwnedFd>) -> ! {
	let name = plan.argv[0].to_bytes();
	if let Some(fd) = stdin {
		if let Err(errno) = unistd::dup2(fd.as_raw_fd(), libc::STDIN_FILENO) {
			die(name, errno.desc());
		}
	}
	if let Some(fd) = stdout {
		if let Err(errno) = unistd::dup2(fd.as_raw_fd(), libc::STDOUT_FILENO) {
			die(name, errno.desc());
		}
	}
	for redirect in &plan.redirects {
		apply_redirect(redirect);
	}
	let _ = unistd::execvp(&plan.argv[0], &plan.argv);
	die(name, "command not found")
}

/// Rewrites one descriptor. The file is opened without `O_CLOEXEC`, so when
/// open lands directly on the target descriptor it is already in place and
/// must survive exec untouched; dup2ing is only needed when it lands
/// elsewhere.
fn apply_redirect(redirect: &OpenPlan) {
	let fd = match fcntl::open(redirect.path.as_c_str(), redirect.flags, redirect.mode) {
		Ok(fd) => fd,
		Err(errno) => die(redirect.path.to_bytes(), errno.desc()),
	};
	if fd != redirect.fd {
		// a later redirect of the same descriptor dup2s over the earlier one
		if let Err(errno) = unistd::dup2(fd, redirect.fd).and(unistd::close(fd)) {
			die(redirect.path.to_bytes(), errno.desc());
		}
	}
}

// single-line failure report, written without touching the allocator
fn die(what: &[u8], why: &str) -> ! {
	let mut stderr = io::stderr();
	let _ = stderr.write_all(what);
	let _ = stderr.write_all(b": ");
	let _ = stderr.write_all(why.as_bytes());
	let _ = stderr.write_all(b"\n");
	unsafe { libc::_exit(1) }
}

/// Launches every stage of a pipeline, stage 0 first, wiring each stage's
/// stdout to the next stage's stdin. A single command is the degenerate case
/// with no pipes. Returns the pids of all stages in launch order.
pub fn run_pipeline(cmds: &[Command]) -> Result<Vec<Pid>, ExecError> {
	let mut pids = Vec::with_capacity(cmds.len());
	let mut prev_read: Option<OwnedFd> = None;
	for (i, cmd) in cmds.iter().enumerate() {
		let pipe = if i + 1 < cmds.len() {
			// O_CLOEXEC: every inherited endpoint that was not dup2ed onto
			// 0/1 closes at exec, so a reader sees EOF once all writers exit
			Some(unistd::pipe2(OFlag::O_CLOEXEC).map_err(ExecError::PipeFailed)?)
		} else {
			None
		};
		let pid = launch(cmd, prev_read.as_ref(), pipe.as_ref().map(|(_, w)| w))?;
		pids.push(pid);
		// reassignment drops the parent's copies of the consumed endpoints;
		// a write end left open here would deny the next stage its EOF
		prev_read = pipe.map(|(r, _)| r);
	}
	Ok(pids)
}

/// Blocks until every listed process has terminated. The returned status is
/// the last stage's, which is the pipeline's observable status.
pub fn wait_all(pids: &[Pid]) -> Option<WaitStatus> {
	let mut last = None;
	for &pid in pids {
		match waitpid(pid, None) {
			Ok(status) => last = Some(status),
			Err(errno) => warn!(pid = pid.as_raw(), %errno, "wait failed"),
		}
	}
	last
}
