mod console;

use std::fs::File;
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use promptdj_audio::output::output_device_names;
use promptdj_audio::{render_link, DeviceOutput, EngineHandle, NullOutput};
use promptdj_core::config::{self, Config};
use promptdj_core::controller::{DjController, MidiOutcome};
use promptdj_core::midi::MidiInputManager;
use promptdj_core::prompts::default_prompts;
use promptdj_net::TcpConnector;
use promptdj_types::{EngineEvent, EqGains, PromptId};

use console::ConsoleCommand;

const TICK: Duration = Duration::from_millis(20);

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = config::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("promptdj.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path).or_else(|_| File::create("/tmp/promptdj.log")) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("promptdj: cannot create log file: {}", e);
            return;
        }
    };

    if WriteLogger::init(log_level, simplelog::Config::default(), log_file).is_err() {
        eprintln!("promptdj: logger already initialized");
    }

    log::info!("promptdj starting (log level: {:?})", log_level);
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1).cloned())
}

/// Output keeps rendering for as long as it lives.
#[allow(dead_code)]
enum Output {
    Device(DeviceOutput),
    Null(NullOutput),
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let config = Config::load();
    let address = arg_value(&args, "--address").unwrap_or_else(|| config.address().to_string());
    let device = arg_value(&args, "--device");
    let midi_port = arg_value(&args, "--midi").or_else(|| config.midi_port().map(str::to_string));

    let (link, renderer) = render_link();
    let _output = if args.iter().any(|a| a == "--null-output") {
        Output::Null(NullOutput::spawn(renderer)?)
    } else {
        match DeviceOutput::open(renderer, device.as_deref()) {
            Ok(out) => {
                println!("output: {}", out.device_name());
                Output::Device(out)
            }
            Err(e) => {
                // The renderer moved into the failed open; build a fresh pair.
                log::warn!(target: "audio", "no audio device ({}), rendering silently", e);
                println!("no audio device ({}), output discarded", e);
                return run_silent(&config, &address, midi_port.as_deref());
            }
        }
    };

    run(&config, link, &address, midi_port.as_deref())
}

fn run_silent(config: &Config, address: &str, midi_port: Option<&str>) -> std::io::Result<()> {
    let (link, renderer) = render_link();
    let _output = NullOutput::spawn(renderer)?;
    run(config, link, address, midi_port)
}

fn run(
    config: &Config,
    link: promptdj_audio::RenderLink,
    address: &str,
    midi_port: Option<&str>,
) -> std::io::Result<()> {
    let connector = Arc::new(TcpConnector::new(address));
    let mut engine = EngineHandle::spawn(config.engine_config(), connector, link)?;
    engine.set_eq_gains(config.eq_gains());
    engine.set_master_volume(config.master_volume());

    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut dj = DjController::new(default_prompts(seed));
    dj.publish(&engine);

    let mut midi = MidiInputManager::new();
    match midi.connect_matching(midi_port) {
        Ok(()) => println!("midi: {}", midi.connected_port_name().unwrap_or("?")),
        Err(e) => log::info!(target: "midi", "{}", e),
    }

    println!("promptdj ready, service at {} (type help)", address);
    print_prompts(&dj, &engine);

    let lines = spawn_stdin_reader();
    loop {
        match lines.recv_timeout(TICK) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                match console::parse(&line) {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(cmd) => execute(cmd, &mut dj, &engine, &mut midi),
                    Err(e) => println!("{}", e),
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        for event in midi.poll_events() {
            match dj.handle_midi(&engine, event) {
                MidiOutcome::Learned { prompt, controller } => {
                    println!("CC {} -> {}", controller, prompt_label(&dj, &prompt));
                }
                MidiOutcome::Weight { .. } | MidiOutcome::PitchBend(_) | MidiOutcome::Ignored => {}
            }
        }

        for event in engine.drain_events() {
            report(&event);
        }
    }

    engine.shutdown();
    log::info!("promptdj exiting");
    Ok(())
}

/// Blocking stdin reads live on their own thread.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("promptdj-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .ok();
    rx
}

fn execute(
    cmd: ConsoleCommand,
    dj: &mut DjController,
    engine: &EngineHandle,
    midi: &mut MidiInputManager,
) {
    match cmd {
        ConsoleCommand::Play => engine.play(),
        ConsoleCommand::Pause => engine.pause(),
        ConsoleCommand::Stop => engine.stop(),
        ConsoleCommand::Toggle => engine.play_pause(),
        ConsoleCommand::List => print_prompts(dj, engine),
        ConsoleCommand::Weight { index, weight } => match prompt_at(dj, index) {
            Some(id) => {
                dj.set_weight(engine, &id, weight);
            }
            None => println!("no prompt {}", index + 1),
        },
        ConsoleCommand::Text { index, text } => match prompt_at(dj, index) {
            Some(id) => {
                dj.set_text(engine, &id, &text);
            }
            None => println!("no prompt {}", index + 1),
        },
        ConsoleCommand::Learn { index } => match prompt_at(dj, index) {
            Some(id) if midi.is_connected() => {
                dj.start_learn(id);
                println!("move a knob to bind prompt {}", index + 1);
            }
            Some(_) => println!("no MIDI input connected"),
            None => println!("no prompt {}", index + 1),
        },
        ConsoleCommand::CancelLearn => dj.cancel_learn(),
        ConsoleCommand::Eq { low, mid, high } => engine.set_eq_gains(EqGains::new(low, mid, high)),
        ConsoleCommand::Volume(level) => engine.set_master_volume(level),
        ConsoleCommand::Bend(value) => engine.set_pitch_bend(value.clamp(-1.0, 1.0)),
        ConsoleCommand::RecordStart => engine.start_recording(),
        ConsoleCommand::RecordStop => engine.stop_recording(),
        ConsoleCommand::Midi(None) => {
            midi.refresh_ports();
            if midi.list_ports().is_empty() {
                println!("no MIDI inputs");
            }
            for port in midi.list_ports() {
                let mark = if midi.connected_port_name() == Some(port.name.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{} {}", mark, port.name);
            }
        }
        ConsoleCommand::Midi(Some(name)) => match midi.connect_matching(Some(&name)) {
            Ok(()) => println!("midi: {}", midi.connected_port_name().unwrap_or("?")),
            Err(e) => println!("{}", e),
        },
        ConsoleCommand::Devices => {
            for name in output_device_names() {
                println!("  {}", name);
            }
        }
        ConsoleCommand::Status => {
            let state = engine.read_state();
            println!(
                "{}  peak {:.2}{}",
                state.playback,
                engine.output_peak(),
                if state.recording { "  [rec]" } else { "" }
            );
            if let Some(err) = &state.last_error {
                println!("last error: {}", err);
            }
        }
        ConsoleCommand::Help => println!("{}", console::HELP),
        ConsoleCommand::Quit => {}
    }
}

fn prompt_at(dj: &DjController, index: usize) -> Option<PromptId> {
    dj.ordered().get(index).map(|p| p.prompt_id.clone())
}

fn prompt_label(dj: &DjController, id: &PromptId) -> String {
    dj.prompts()
        .get(id)
        .map(|p| p.text.clone())
        .unwrap_or_else(|| id.to_string())
}

fn print_prompts(dj: &DjController, engine: &EngineHandle) {
    let filtered = &engine.read_state().filtered;
    for (i, p) in dj.ordered().iter().enumerate() {
        let cc = p
            .controller_binding
            .map(|c| format!("cc{:<3}", c))
            .unwrap_or_else(|| "     ".to_string());
        let flag = if filtered.contains(&p.text) { " (filtered)" } else { "" };
        println!("{:>2}  {}  {:4.2}  {}{}", i + 1, cc, p.weight, p.text, flag);
    }
}

fn report(event: &EngineEvent) {
    match event {
        EngineEvent::PlaybackStateChanged(state) => println!("[{}]", state),
        EngineEvent::FilteredPrompt(text) => println!("filtered: {}", text),
        EngineEvent::Error(message) => println!("error: {}", message),
        EngineEvent::RecordingStarted { format } => println!("recording ({})", format),
        EngineEvent::RecordingFinished(artifact) => {
            println!("saved {} ({} frames)", artifact.path.display(), artifact.frames)
        }
        EngineEvent::ScheduleSummary {
            avg_lead_ms,
            min_lead_ms,
            underruns,
        } => log::debug!(
            target: "audio",
            "lead avg {}ms min {}ms, {} underruns",
            avg_lead_ms,
            min_lead_ms,
            underruns
        ),
    }
}
