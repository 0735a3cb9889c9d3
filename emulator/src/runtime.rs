//! Real-time driver: a 1 Hz ticker advances the session clock while operator
//! lines arrive from a stdin thread.
//!
//! Both sides run on `embassy-executor`'s std executor, which parks its
//! thread until a waker fires.

use std::io::{self, BufRead, Write};
use std::process;
use std::thread;
use std::time::Duration;

use embassy_executor::{Executor, SpawnError};
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::Ticker;
use static_cell::StaticCell;
// Links the std critical-section implementation the static channel relies on.
use critical_section as _;

use crate::session::Session;

const INPUT_QUEUE_DEPTH: usize = 8;

enum OperatorInput {
    Line(String),
    Closed,
}

static OPERATOR_INPUT: Channel<CriticalSectionRawMutex, OperatorInput, INPUT_QUEUE_DEPTH> =
    Channel::new();

static SESSION: StaticCell<Session> = StaticCell::new();
static CONSOLE_EXECUTOR: StaticCell<Executor> = StaticCell::new();
static STDIN_EXECUTOR: StaticCell<Executor> = StaticCell::new();

/// Hands the session to the executor. The process exits when the operator
/// quits or stdin closes.
pub fn run(session: Session) -> ! {
    let session = SESSION.init(session);
    thread::spawn(run_stdin_executor);

    CONSOLE_EXECUTOR.init(Executor::new()).run(|spawner| {
        exit_on_spawn_error("console", spawner.spawn(console_task(session)));
    })
}

fn run_stdin_executor() {
    STDIN_EXECUTOR.init(Executor::new()).run(|spawner| {
        exit_on_spawn_error("stdin", spawner.spawn(forward_stdin()));
    })
}

fn exit_on_spawn_error(name: &str, result: Result<(), SpawnError>) {
    if let Err(err) = result {
        eprintln!("failed to spawn {name} task: {err:?}");
        process::exit(1);
    }
}

#[embassy_executor::task]
async fn console_task(session: &'static mut Session) {
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let code = match drive(session, &mut writer).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{err}");
            1
        }
    };
    let _ = writer.flush();
    process::exit(code);
}

async fn drive(session: &mut Session, writer: &mut impl Write) -> io::Result<()> {
    let mut ticker = Ticker::every(embassy_time::Duration::from_secs(1));
    loop {
        match select(OPERATOR_INPUT.receive(), ticker.next()).await {
            Either::First(OperatorInput::Line(line)) => {
                if crate::should_terminate(line.trim()) {
                    writeln!(writer, "Session closed.")?;
                    return Ok(());
                }
                for response in session.handle_command(&line)? {
                    writeln!(writer, "{response}")?;
                }
            }
            Either::First(OperatorInput::Closed) => {
                writeln!(writer)?;
                return Ok(());
            }
            Either::Second(()) => {
                let lines = session.advance(Duration::from_secs(1))?;
                // The trailing clock summary is only interesting on demand.
                for response in &lines[..lines.len().saturating_sub(1)] {
                    writeln!(writer, "{response}")?;
                }
            }
        }
        writer.flush()?;
    }
}

/// Reads stdin on its own executor thread; a full queue parks the send.
#[embassy_executor::task]
async fn forward_stdin() {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        OPERATOR_INPUT.send(OperatorInput::Line(line)).await;
    }
    OPERATOR_INPUT.send(OperatorInput::Closed).await;
}
