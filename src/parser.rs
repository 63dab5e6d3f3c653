use std::os::fd::RawFd;

use thiserror::Error;

use crate::types::{Command, Redirect, RedirectKind};

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
	#[error("empty command")]
	EmptyCommand,
	#[error("bad file descriptor: {0}")]
	BadFd(#[from] std::num::ParseIntError),
	#[error("missing redirect target")]
	MissingTarget,
}

struct Parser<'a> {
	line: &'a str,
	i: usize,
}

impl<'a> Parser<'a> {
	fn peek(&self) -> Option<u8> {
		self.line.as_bytes().get(self.i).copied()
	}

	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(c) = self.peek() {
			if !f(c) { break; }
			self.i += 1;
		}
	}

	fn is_whitespace(c: u8) -> bool {
		matches!(c, b' ' | b'\t' | b'\n' | b'\r')
	}

	fn is_word(c: u8) -> bool {
		!Parser::is_whitespace(c) && !matches!(c, b'|' | b'<' | b'>')
	}

	fn skip_whitespaces(&mut self) {
		self.proceed_while(Parser::is_whitespace);
	}

	fn read_word(&mut self) -> &'a str {
		let orig = self.i;
		self.proceed_while(Parser::is_word);
		&self.line[orig .. self.i]
	}

	fn read_digits(&mut self) -> &'a str {
		let orig = self.i;
		self.proceed_while(|c| c.is_ascii_digit());
		&self.line[orig .. self.i]
	}

	fn parse_redirect(&mut self) -> Result<Option<Redirect>, ParseError> {
		let orig = self.i;
		let digits = self.read_digits();

		// direction comes from the operator alone, never from the fd number
		let kind = match self.peek() {
			Some(b'<') => RedirectKind::Input,
			Some(b'>') => RedirectKind::Output,
			_ => {
				self.i = orig;
				return Ok(None);
			},
		};
		self.i += 1;

		let fd: RawFd = if digits.is_empty() {
			match kind {
				RedirectKind::Input => 0,
				RedirectKind::Output => 1,
			}
		} else {
			digits.parse()?
		};

		self.skip_whitespaces();
		let target = self.read_word();
		if target.is_empty() {
			return Err(ParseError::MissingTarget);
		}

		Ok(Some(Redirect { fd, kind, path: target.to_owned() }))
	}

	fn parse_command(&mut self) -> Result<Command, ParseError> {
		let mut args: Vec<String> = vec![];
		let mut redirects: Vec<Redirect> = vec![];

		loop {
			self.skip_whitespaces();
			match self.peek() {
				None | Some(b'|') => break,
				_ => {},
			}
			if let Some(redirect) = self.parse_redirect()? {
				redirects.push(redirect);
				continue;
			}
			let word = self.read_word();
			if word.is_empty() {
				return Err(ParseError::EmptyCommand);
			}
			args.push(word.to_owned());
		}

		if args.is_empty() {
			return Err(ParseError::EmptyCommand);
		}
		Ok(Command::new(args, redirects))
	}

	fn parse_pipeline(&mut self) -> Result<Vec<Command>, ParseError> {
		let mut commands: Vec<Command> = vec![];
		loop {
			self.skip_whitespaces();
			if self.peek().is_none() && commands.is_empty() {
				return Ok(commands);
			}
			commands.push(self.parse_command()?);
			match self.peek() {
				Some(b'|') => { self.i += 1; },
				_ => break,
			}
		}
		Ok(commands)
	}
}

pub fn parse(line: &str) -> Result<Vec<Command>, ParseError> {
	let mut parser = Parser { line, i: 0 };
	parser.parse_pipeline()
}
