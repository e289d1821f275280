//! REPL – the operator's microphone and camera.
//!
//! Each line typed at the prompt becomes one transcript on the perception
//! bus, preceded by a frame of the configured scene so the round does not
//! wait out the sync deadline for vision.
//!
//! Supported slash-commands:
//!   /help         – show this list
//!   /demo         – send the canned pick-and-place instruction
//!   /scene        – send a camera frame without speaking
//!   /quit | /exit – stop feeding the session and exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use embodia_middleware::PerceptionBus;
use embodia_types::{AgentError, VisualObject};

pub const DEMO_INSTRUCTION: &str =
    "First return to zero, then shake head, and put the green block on the basketball";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Demo,
    Scene,
    Quit,
    Say(String),
    Unknown(String),
    Empty,
}

/// Whether the prompt loop keeps reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub fn parse(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if !line.starts_with('/') {
        return Command::Say(line.to_string());
    }
    match line {
        "/help" => Command::Help,
        "/demo" => Command::Demo,
        "/scene" => Command::Scene,
        "/quit" | "/exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    }
}

/// Apply one command to the bus.
///
/// # Errors
///
/// [`AgentError::Channel`] once the session has stopped consuming.
pub fn handle(
    command: Command,
    bus: &PerceptionBus,
    scene: &[VisualObject],
) -> Result<Flow, AgentError> {
    match command {
        Command::Empty => {}
        Command::Help => cmd_help(),
        Command::Scene => bus.push_vision(scene.to_vec())?,
        Command::Demo => {
            println!("  {} {}", "you:".bold(), DEMO_INSTRUCTION.italic());
            say(bus, scene, DEMO_INSTRUCTION)?;
        }
        Command::Say(text) => say(bus, scene, &text)?,
        Command::Quit => {
            println!("{}", "Goodbye.".green());
            return Ok(Flow::Quit);
        }
        Command::Unknown(other) => {
            println!(
                "{} '{}'. Type {} for available commands.",
                "Unknown command:".red(),
                other.yellow(),
                "/help".bold()
            );
        }
    }
    Ok(Flow::Continue)
}

fn say(bus: &PerceptionBus, scene: &[VisualObject], text: &str) -> Result<(), AgentError> {
    bus.push_vision(scene.to_vec())?;
    bus.push_transcript(text)
}

/// Read stdin until EOF, `/quit`, or `shutdown` is raised.
///
/// Takes ownership of `bus`; dropping it on return lets the session see
/// its perception close.
pub fn run(bus: PerceptionBus, scene: Vec<VisualObject>, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "embodia>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        match handle(parse(&line), &bus, &scene) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => {
                println!("{}: {}", "Session no longer listening".yellow(), e);
                break;
            }
        }
    }
}

fn cmd_help() {
    println!();
    println!("{}", "Embodia Commands".bold().underline());
    println!("  {}         – say something to the agent", "<text>".bold().cyan());
    println!("  {}          – pick-and-place demo instruction", "/demo".bold().cyan());
    println!("  {}         – send a camera frame only", "/scene".bold().cyan());
    println!("  {}  – exit", "/quit  /exit".bold().cyan());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use embodia_middleware::{Polled, perception_channel};

    fn scene() -> Vec<VisualObject> {
        vec![VisualObject::new("green block").at(210, 140)]
    }

    #[test]
    fn parse_distinguishes_commands_from_speech() {
        assert_eq!(parse("  "), Command::Empty);
        assert_eq!(parse("/help"), Command::Help);
        assert_eq!(parse("/exit\n"), Command::Quit);
        assert_eq!(parse("/dance"), Command::Unknown("/dance".into()));
        assert_eq!(parse("  pick it up \n"), Command::Say("pick it up".into()));
    }

    #[test]
    fn speech_pushes_scene_then_transcript() {
        let (bus, mut streams) = perception_channel(4);
        let flow = handle(Command::Say("wave".into()), &bus, &scene()).unwrap();
        assert_eq!(flow, Flow::Continue);

        match streams.vision.try_recv() {
            Polled::Ready(event) => assert_eq!(event.objects, scene()),
            other => panic!("expected a frame, got {other:?}"),
        }
        match streams.transcripts.try_recv() {
            Polled::Ready(event) => assert_eq!(event.text, "wave"),
            other => panic!("expected a transcript, got {other:?}"),
        }
    }

    #[test]
    fn demo_sends_canned_instruction() {
        let (bus, mut streams) = perception_channel(4);
        handle(Command::Demo, &bus, &scene()).unwrap();
        match streams.transcripts.try_recv() {
            Polled::Ready(event) => assert_eq!(event.text, DEMO_INSTRUCTION),
            other => panic!("expected a transcript, got {other:?}"),
        }
    }

    #[test]
    fn scene_sends_no_transcript() {
        let (bus, mut streams) = perception_channel(4);
        handle(Command::Scene, &bus, &scene()).unwrap();
        assert!(matches!(streams.vision.try_recv(), Polled::Ready(_)));
        assert!(matches!(streams.transcripts.try_recv(), Polled::Empty));
    }

    #[test]
    fn quit_stops_the_loop() {
        let (bus, _streams) = perception_channel(4);
        assert_eq!(handle(Command::Quit, &bus, &[]).unwrap(), Flow::Quit);
    }

    #[test]
    fn speech_fails_once_session_is_gone() {
        let (bus, streams) = perception_channel(4);
        drop(streams);
        let err = handle(Command::Say("hello".into()), &bus, &scene()).unwrap_err();
        assert!(matches!(err, AgentError::Channel(_)));
    }
}
