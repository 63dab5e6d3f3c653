use std::ffi::CString;
use std::os::fd::RawFd;

use crate::error::ExecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind { Input, Output }

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
	pub fd: RawFd,
	pub kind: RedirectKind,
	pub path: String,
}

/// One parsed command. `args` is never empty; `args[0]` is the program name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
	pub args: Vec<String>,
	pub redirects: Vec<Redirect>,
}

impl Command {
	pub fn new(args: Vec<String>, redirects: Vec<Redirect>) -> Command {
		debug_assert!(!args.is_empty());
		Command { args, redirects }
	}

	pub fn name(&self) -> &str {
		&self.args[0]
	}

	pub fn argv(&self) -> Result<Vec<CString>, ExecError> {
		let argv: Result<Vec<CString>, _> = self.args.iter().map(|a| CString::new(a.as_bytes())).collect();
		argv.map_err(|e| ExecError::BadArgument { name: self.name().to_owned(), source: e })
	}

	/// Derives a copy with the leading word dropped, so the next argument
	/// becomes the program name. The original command is left untouched.
	pub fn strip_keyword(&self) -> Option<Command> {
		if self.args.len() < 2 {
			return None;
		}
		Some(Command {
			args: self.args[1..].to_vec(),
			redirects: self.redirects.clone(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cmd(args: &[&str]) -> Command {
		Command::new(args.iter().map(|s| s.to_string()).collect(), vec![])
	}

	#[test]
	fn name_is_the_first_argument() {
		assert_eq!(cmd(&["ls", "-l"]).name(), "ls");
	}

	#[test]
	fn argv_keeps_the_name_in_slot_zero() {
		let argv = cmd(&["ls", "-l"]).argv().unwrap();
		assert_eq!(argv[0], CString::new("ls").unwrap());
		assert_eq!(argv.len(), 2);
	}

	#[test]
	fn argv_rejects_interior_nul() {
		assert!(cmd(&["ls", "a\0b"]).argv().is_err());
	}

	#[test]
	fn strip_keyword_derives_without_mutating() {
		let original = cmd(&["bg", "sleep", "5"]);
		let derived = original.strip_keyword().unwrap();
		assert_eq!(derived.args, vec!["sleep", "5"]);
		assert_eq!(derived.name(), "sleep");
		assert_eq!(original.args, vec!["bg", "sleep", "5"]);
	}

	#[test]
	fn strip_keyword_on_a_bare_word_is_none() {
		assert!(cmd(&["bg"]).strip_keyword().is_none());
	}
}
