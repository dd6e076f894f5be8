use midir::{MidiInput, MidiInputConnection};
use std::sync::mpsc::{self, Receiver};

use promptdj_types::MAX_PROMPT_WEIGHT;

const CLIENT_NAME: &str = "promptdj";

/// Controller input with the driver timestamp (microseconds, driver epoch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiEvent {
    pub timestamp_us: u64,
    pub kind: MidiEventKind,
}

/// The messages promptdj reacts to. Everything else is dropped at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEventKind {
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    PitchBend {
        channel: u8,
        /// -8192 (full down) to +8191 (full up), 0 = center
        value: i16,
    },
}

impl MidiEvent {
    pub fn new(timestamp_us: u64, kind: MidiEventKind) -> Self {
        Self { timestamp_us, kind }
    }
}

/// CC value 0..127 to prompt weight 0..2.
pub fn cc_to_weight(value: u8) -> f32 {
    value.min(127) as f32 / 127.0 * MAX_PROMPT_WEIGHT
}

/// Pitch-bend value to -1..1, with both extremes reaching full scale.
pub fn bend_to_unit(value: i16) -> f32 {
    if value < 0 {
        (value as f32 / 8192.0).max(-1.0)
    } else {
        (value as f32 / 8191.0).min(1.0)
    }
}

/// Information about an available MIDI port
#[derive(Debug, Clone)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// MIDI input manager
pub struct MidiInputManager {
    midi_in: Option<MidiInput>,
    connection: Option<MidiInputConnection<()>>,
    event_receiver: Option<Receiver<MidiEvent>>,
    connected_port_name: Option<String>,
    available_ports: Vec<MidiPortInfo>,
}

impl MidiInputManager {
    pub fn new() -> Self {
        let midi_in = MidiInput::new(CLIENT_NAME).ok();
        Self {
            midi_in,
            connection: None,
            event_receiver: None,
            connected_port_name: None,
            available_ports: Vec::new(),
        }
    }

    /// Refresh the list of available MIDI input ports
    pub fn refresh_ports(&mut self) {
        self.available_ports.clear();

        if let Some(ref midi_in) = self.midi_in {
            let ports = midi_in.ports();
            for (index, port) in ports.iter().enumerate() {
                if let Ok(name) = midi_in.port_name(port) {
                    self.available_ports.push(MidiPortInfo { index, name });
                }
            }
        }
    }

    pub fn list_ports(&self) -> &[MidiPortInfo] {
        &self.available_ports
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connected_port_name(&self) -> Option<&str> {
        self.connected_port_name.as_deref()
    }

    /// Connect to the first port whose name contains `pattern`
    /// (case-insensitive), or to the first port when `pattern` is `None`.
    pub fn connect_matching(&mut self, pattern: Option<&str>) -> Result<(), String> {
        self.refresh_ports();
        let needle = pattern.map(|p| p.to_lowercase());
        let index = self
            .available_ports
            .iter()
            .find(|p| match &needle {
                Some(n) => p.name.to_lowercase().contains(n.as_str()),
                None => true,
            })
            .map(|p| p.index)
            .ok_or_else(|| match pattern {
                Some(p) => format!("No MIDI input matching '{}'", p),
                None => "No MIDI input ports".to_string(),
            })?;
        self.connect(index)
    }

    /// Connect to a MIDI input port by index
    pub fn connect(&mut self, port_index: usize) -> Result<(), String> {
        self.disconnect();

        // Connecting consumes the MidiInput; a fresh one is made for listing below.
        let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| e.to_string())?;
        let ports = midi_in.ports();

        if port_index >= ports.len() {
            return Err(format!("Invalid port index: {}", port_index));
        }

        let port = &ports[port_index];
        let port_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let (tx, rx) = mpsc::channel();
        self.event_receiver = Some(rx);

        let connection = midi_in
            .connect(
                port,
                "promptdj-input",
                move |timestamp, message, _| {
                    if let Some(kind) = parse_midi_message(message) {
                        let _ = tx.send(MidiEvent::new(timestamp, kind));
                    }
                },
                (),
            )
            .map_err(|e| e.to_string())?;

        log::info!(target: "midi", "listening on {}", port_name);
        self.connection = Some(connection);
        self.connected_port_name = Some(port_name);
        self.midi_in = MidiInput::new(CLIENT_NAME).ok();

        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
        self.event_receiver = None;
        self.connected_port_name = None;
    }

    /// Poll for pending MIDI events (non-blocking)
    pub fn poll_events(&self) -> Vec<MidiEvent> {
        match &self.event_receiver {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        }
    }
}

impl Default for MidiInputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MidiInputManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Parse a raw MIDI message into a MidiEventKind
fn parse_midi_message(data: &[u8]) -> Option<MidiEventKind> {
    let (&status, rest) = data.split_first()?;
    let channel = status & 0x0F;

    match (status & 0xF0, rest) {
        (0xB0, [controller, value, ..]) => Some(MidiEventKind::ControlChange {
            channel,
            controller: *controller,
            value: *value,
        }),
        (0xE0, [lsb, msb, ..]) => {
            let raw = ((*msb as i16) << 7) | *lsb as i16;
            Some(MidiEventKind::PitchBend {
                channel,
                value: raw - 8192,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pitch_bend() {
        let data = [0xE0, 0x00, 0x40]; // LSB=0, MSB=64 = 8192 = center
        assert_eq!(
            parse_midi_message(&data),
            Some(MidiEventKind::PitchBend {
                channel: 0,
                value: 0
            })
        );

        let data = [0xE3, 0x7F, 0x7F];
        assert_eq!(
            parse_midi_message(&data),
            Some(MidiEventKind::PitchBend {
                channel: 3,
                value: 8191
            })
        );

        let data = [0xE0, 0x00, 0x00];
        assert_eq!(
            parse_midi_message(&data),
            Some(MidiEventKind::PitchBend {
                channel: 0,
                value: -8192
            })
        );
    }

    #[test]
    fn test_parse_control_change() {
        let data = [0xB9, 21, 64]; // channel 9, controller 21
        assert_eq!(
            parse_midi_message(&data),
            Some(MidiEventKind::ControlChange {
                channel: 9,
                controller: 21,
                value: 64
            })
        );
    }

    #[test]
    fn test_notes_and_short_messages_are_ignored() {
        assert!(parse_midi_message(&[]).is_none());
        assert!(parse_midi_message(&[0x90, 60, 100]).is_none());
        assert!(parse_midi_message(&[0xB0, 1]).is_none());
        assert!(parse_midi_message(&[0xE0, 0x00]).is_none());
        assert!(parse_midi_message(&[0xF0, 0x01, 0x02]).is_none());
    }

    #[test]
    fn test_value_scaling() {
        assert_eq!(cc_to_weight(0), 0.0);
        assert_eq!(cc_to_weight(127), 2.0);
        assert!((cc_to_weight(64) - 1.0079).abs() < 1e-3);
        assert_eq!(bend_to_unit(-8192), -1.0);
        assert_eq!(bend_to_unit(8191), 1.0);
        assert_eq!(bend_to_unit(0), 0.0);
    }
}
