use std::io;

#[path = "../console.rs"]
mod console;
#[path = "../link.rs"]
mod link;
#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, TranscriptProfile};

fn main() -> io::Result<()> {
    record_profile(TranscriptProfile::Sleep)?;
    record_profile(TranscriptProfile::Recovery)?;
    record_profile(TranscriptProfile::Breathing)?;
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::for_profile(profile)?;
    let script: &[&str] = match profile {
        TranscriptProfile::Sleep => SLEEP,
        TranscriptProfile::Recovery => RECOVERY,
        TranscriptProfile::Breathing => BREATHING,
        TranscriptProfile::Interactive => &[],
    };
    for line in script {
        let _ = session.handle_command(line)?;
    }
    Ok(())
}

const SLEEP: &[&str] = &[
    "connect",
    "feel wired",
    "start",
    "advance 2m",
    "advance 4m",
    "status",
    "advance 4m",
    "journal 6",
];

const RECOVERY: &[&str] = &[
    "connect",
    "mode focus",
    "strength 6",
    "start",
    "advance 25",
    "disconnect",
    "advance 70",
    "connect",
    "advance 10",
    "pause",
    "advance 30",
    "resume",
    "battery 3.1",
    "charging on",
    "advance 30",
    "status",
    "stop",
];

const BREATHING: &[&str] = &[
    "connect",
    "mode calm",
    "timer down",
    "start",
    "advance 5",
    "advance 3",
    "advance 7",
    "strength up",
    "advance 15",
    "stop",
    "journal",
];
