use std::ffi::NulError;

use nix::errno::Errno;
use thiserror::Error;

/// Launch failures the parent can observe. Failures inside the forked child
/// (unopenable redirect target, unknown program) are reported by the child
/// itself on stderr before it exits. Nothing here terminates the shell.
#[derive(Debug, Error)]
pub enum ExecError {
	#[error("{name}: fork failed: {errno}")]
	ForkFailed { name: String, errno: Errno },
	#[error("pipe failed: {0}")]
	PipeFailed(Errno),
	#[error("{name}: {source}")]
	BadArgument { name: String, source: NulError },
}
