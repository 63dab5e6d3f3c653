use std::io::{self, BufRead, Write};

use tracing_subscriber::EnvFilter;

use xeu::dispatch::Dispatcher;
use xeu::parser;

const PROMPT: &[u8] = b"xeu$ ";

fn main() {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(io::stderr)
		.with_target(false)
		.compact()
		.init();

	let mut dispatcher = Dispatcher::new();
	let stdin = io::stdin();
	let mut stdin = stdin.lock();
	let mut stdout = io::stdout();
	loop {
		let _ = stdout.write_all(PROMPT);
		let _ = stdout.flush();
		let mut line = String::new();
		match stdin.read_line(&mut line) {
			Ok(0) | Err(_) => break,
			Ok(_) => {},
		}
		match parser::parse(&line) {
			Ok(cmds) => dispatcher.dispatch(&cmds),
			Err(e) => eprintln!("xeu: {}", e),
		}
	}
	dispatcher.shutdown();
}
