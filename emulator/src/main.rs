mod console;
mod link;
mod runtime;
mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use pulse_core::modes::StimulationMode;
use session::{Session, TranscriptProfile};

const USAGE: &str =
    "Usage: pulse-emulator [--profile <mode>] [--realtime] [--transcript <path>]";

struct Options {
    profile: Option<StimulationMode>,
    realtime: bool,
    transcript: PathBuf,
}

fn main() -> io::Result<()> {
    let options = parse_options().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(
        &options.transcript,
        TranscriptProfile::Interactive.header(),
    )?;

    writeln!(
        writer,
        "Pulse Emulator ready. Type `help` for commands or `exit` to quit."
    )?;
    for response in session.handle_command("connect")? {
        writeln!(writer, "{response}")?;
    }
    if let Some(mode) = options.profile {
        for response in session.handle_command(&format!("mode {}", mode.key()))? {
            writeln!(writer, "{response}")?;
        }
    }

    if options.realtime {
        writer.flush()?;
        drop(writer);
        runtime::run(session);
    }

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut line = String::new();

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        for response in session.handle_command(trimmed)? {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options() -> Result<Options, String> {
    let mut options = Options {
        profile: None,
        realtime: false,
        transcript: PathBuf::from(TranscriptProfile::Interactive.log_path()),
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--profile=") {
            options.profile = Some(parse_mode(value)?);
        } else if arg == "--profile" {
            let value = args
                .next()
                .ok_or_else(|| "Expected value after --profile".to_string())?;
            options.profile = Some(parse_mode(&value)?);
        } else if let Some(value) = arg.strip_prefix("--transcript=") {
            options.transcript = PathBuf::from(value);
        } else if arg == "--transcript" {
            let value = args
                .next()
                .ok_or_else(|| "Expected path after --transcript".to_string())?;
            options.transcript = PathBuf::from(value);
        } else if arg == "--realtime" {
            options.realtime = true;
        } else {
            return Err(format!("Unknown argument `{arg}`"));
        }
    }

    Ok(options)
}

fn parse_mode(tag: &str) -> Result<StimulationMode, String> {
    StimulationMode::from_key(&tag.to_ascii_lowercase())
        .ok_or_else(|| format!("Unknown stimulation mode `{tag}`"))
}
