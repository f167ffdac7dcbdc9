//! A minimal live demonstration: listens on a MIDI input port, runs every
//! incoming note through the channel-juggling emitter, and writes the
//! result to a MIDI output port.
//!
//! Grounded on `main.rs`'s error-handling style (`eprintln!` + `exit(1)`,
//! YAML configuration via `serde_yml`) and `connections.rs`'s direct
//! `midir` port discovery/connect calls, stripped of the GUI/actor-thread
//! machinery those files also carry (this binary has nothing for a GUI
//! thread to talk to, and the emitter is synchronous, so the callback
//! simply owns it directly rather than forwarding through an `mpsc`
//! translate thread).

use std::error::Error;

use fretless::{
    capabilities::{Capabilities, Diagnostics, DefaultAllocator},
    constants::NOTE_MAX,
    decoder::{DecodedEvent, Decoder, RawEngine},
    emitter::{Emitter, EmitterConfig},
    finger::Legato,
};

struct MidirSink {
    connection: midir::MidiOutputConnection,
    buffer: Vec<u8>,
}

impl fretless::capabilities::ByteSink for MidirSink {
    fn put_byte(&mut self, byte: u8) {
        self.buffer.push(byte);
    }

    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            let _ = self.connection.send(&self.buffer);
            self.buffer.clear();
        }
    }
}

struct EprintlnDiagnostics;

impl Diagnostics for EprintlnDiagnostics {
    fn fail(&mut self, message: &str) {
        eprintln!("fretless: FAIL: {message}");
    }

    fn log(&mut self, message: &str) {
        eprintln!("fretless: {message}");
    }

    fn passed(&mut self) {}
}

type DemoEmitter = Emitter<MidirSink, EprintlnDiagnostics, DefaultAllocator>;

/// Routes decoded note-on/note-off pairs into the emitter's gesture calls,
/// one finger per MIDI note number.
struct GestureEngine {
    emitter: DemoEmitter,
}

impl RawEngine for GestureEngine {
    fn on_event(&mut self, event: DecodedEvent) {
        match event {
            DecodedEvent::NoteOn { note, velocity, .. } => {
                let finger = note as usize;
                self.emitter.begin_down(finger);
                self.emitter.end_down(finger, note as f64, 0, velocity as f64 / 127.0, Legato::None);
                self.emitter.flush();
            }
            DecodedEvent::NoteOff { note, .. } => {
                let finger = note as usize;
                self.emitter.up(finger, Legato::None);
                self.emitter.flush();
            }
            DecodedEvent::PitchBend { pitch, .. } => {
                eprintln!("fretless: reconstructed pitch {pitch:.3}");
            }
            DecodedEvent::Expression { channel, value } => {
                eprintln!("fretless: expression {value} on {channel:?}");
            }
            _ => {}
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config: EmitterConfig = match std::env::args().nth(1) {
        Some(path) => serde_yml::from_reader(std::fs::File::open(path)?)?,
        None => EmitterConfig::default(),
    };

    let midi_in = midir::MidiInput::new("fretless input")?;
    let midi_out = midir::MidiOutput::new("fretless output")?;

    let in_port = midi_in.ports().into_iter().next().ok_or("no MIDI input ports available")?;
    let in_port_name = midi_in.port_name(&in_port)?;

    let out_port = midi_out.ports().into_iter().next().ok_or("no MIDI output ports available")?;
    let out_port_name = midi_out.port_name(&out_port)?;

    let connection = midi_out.connect(&out_port, &out_port_name)?;
    let sink = MidirSink { connection, buffer: Vec::new() };
    let capabilities = Capabilities::new(sink, EprintlnDiagnostics);

    let mut emitter = Emitter::new(NOTE_MAX, config, capabilities);
    emitter.boot();
    emitter.flush();

    let engine = GestureEngine { emitter };
    let mut decoder = Decoder::with_diagnostics(engine, EprintlnDiagnostics);

    let _connection_in = midi_in.connect(
        &in_port,
        &in_port_name,
        move |_timestamp, bytes, _| {
            for &byte in bytes {
                decoder.put_byte(byte);
            }
        },
        (),
    )?;

    eprintln!("fretless: listening on \"{in_port_name}\", emitting on \"{out_port_name}\". Press enter to quit.");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    Ok(())
}
