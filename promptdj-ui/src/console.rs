//! Line commands typed at the promptdj prompt.

/// One parsed console line. Prompt numbers are the 1-based bank positions
/// shown by `list`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Play,
    Pause,
    Stop,
    Toggle,
    List,
    Weight { index: usize, weight: f32 },
    Text { index: usize, text: String },
    Learn { index: usize },
    CancelLearn,
    Eq { low: f32, mid: f32, high: f32 },
    Volume(f32),
    Bend(f32),
    RecordStart,
    RecordStop,
    Midi(Option<String>),
    Devices,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  play | pause | stop | toggle      transport
  list                              show the prompt bank
  weight <n> <0..2>                 set prompt n's weight
  text <n> <words...>               rename prompt n
  learn <n> | cancel                bind the next MIDI CC to prompt n
  eq <low> <mid> <high>             EQ gains in dB (-24..24)
  volume <0..1>                     master volume
  bend <-1..1>                      pitch bend
  record | record stop              start / stop recording
  midi [name]                       list MIDI inputs, or connect to one
  devices                           list audio outputs
  status                            playback state and output level
  quit";

pub fn parse(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err(String::new());
    };
    let rest: Vec<&str> = words.collect();

    let cmd = match verb.to_lowercase().as_str() {
        "play" => ConsoleCommand::Play,
        "pause" => ConsoleCommand::Pause,
        "stop" => ConsoleCommand::Stop,
        "toggle" | "t" => ConsoleCommand::Toggle,
        "list" | "ls" => ConsoleCommand::List,
        "weight" | "w" => {
            let [n, w] = rest.as_slice() else {
                return Err("usage: weight <n> <0..2>".to_string());
            };
            ConsoleCommand::Weight {
                index: parse_index(n)?,
                weight: parse_number(w)?,
            }
        }
        "text" => {
            if rest.len() < 2 {
                return Err("usage: text <n> <words...>".to_string());
            }
            ConsoleCommand::Text {
                index: parse_index(rest[0])?,
                text: rest[1..].join(" "),
            }
        }
        "learn" => match rest.as_slice() {
            [n] => ConsoleCommand::Learn {
                index: parse_index(n)?,
            },
            _ => return Err("usage: learn <n>".to_string()),
        },
        "cancel" => ConsoleCommand::CancelLearn,
        "eq" => {
            let [low, mid, high] = rest.as_slice() else {
                return Err("usage: eq <low> <mid> <high>".to_string());
            };
            ConsoleCommand::Eq {
                low: parse_number(low)?,
                mid: parse_number(mid)?,
                high: parse_number(high)?,
            }
        }
        "volume" | "vol" => match rest.as_slice() {
            [level] => ConsoleCommand::Volume(parse_number(level)?),
            _ => return Err("usage: volume <0..1>".to_string()),
        },
        "bend" => match rest.as_slice() {
            [value] => ConsoleCommand::Bend(parse_number(value)?),
            _ => return Err("usage: bend <-1..1>".to_string()),
        },
        "record" | "rec" => match rest.as_slice() {
            [] | ["start"] => ConsoleCommand::RecordStart,
            ["stop"] => ConsoleCommand::RecordStop,
            _ => return Err("usage: record [stop]".to_string()),
        },
        "midi" => ConsoleCommand::Midi(if rest.is_empty() {
            None
        } else {
            Some(rest.join(" "))
        }),
        "devices" => ConsoleCommand::Devices,
        "status" | "s" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{}', try help", other)),
    };
    Ok(cmd)
}

fn parse_index(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(format!("not a prompt number: {}", s)),
    }
}

fn parse_number(s: &str) -> Result<f32, String> {
    s.parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("not a number: {}", s))
}
