//! audionotes - transcribe an audio take into notes, optionally add an
//! accompaniment, and loop it through the default audio output.
//!
//! ```bash
//! audionotes take.wav --accompany --export take.mid
//! audionotes take.wav --loop 2 6 --seconds 20
//! ```

use anyhow::{bail, ensure, Context, Result};
use audionotes_core::{Event, Session};
use audionotes_infra_audio_cpal::CpalAudioOutputPort;
use audionotes_infra_storage_fs::FsStorage;
use audionotes_infra_synth_simple::SimpleSynth;
use audionotes_infra_transcribe_cmd::CommandEngine;
use audionotes_ports::storage::StoragePort;
use audionotes_ports::transcription::AudioClip;
use audionotes_ports::types::Volume01;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const TICK_INTERVAL: Duration = Duration::from_millis(16);
const DEFAULT_RUN_SECONDS: f64 = 30.0;

struct CliOptions {
    audio: PathBuf,
    engine: Option<String>,
    accompany: bool,
    export: Option<PathBuf>,
    once: bool,
    loop_range: Option<(f64, f64)>,
    seconds: f64,
    volume: Option<f32>,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut audio = None;
        let mut engine = None;
        let mut accompany = false;
        let mut export = None;
        let mut once = false;
        let mut loop_range = None;
        let mut seconds = DEFAULT_RUN_SECONDS;
        let mut volume = None;

        let mut it = args.iter();
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--engine" | "-e" => engine = Some(value(&mut it, arg)?.to_string()),
                "--accompany" | "-a" => accompany = true,
                "--export" | "-o" => export = Some(PathBuf::from(value(&mut it, arg)?)),
                "--once" => once = true,
                "--loop" => {
                    let start = number(value(&mut it, arg)?, arg)?;
                    let end = number(value(&mut it, arg)?, arg)?;
                    loop_range = Some((start, end));
                }
                "--seconds" | "-s" => seconds = number(value(&mut it, arg)?, arg)?,
                "--volume" => volume = Some(number(value(&mut it, arg)?, arg)? as f32),
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                other if other.starts_with('-') => bail!("unknown option {other}"),
                other => {
                    if audio.replace(PathBuf::from(other)).is_some() {
                        bail!("only one audio file may be given");
                    }
                }
            }
        }

        let Some(audio) = audio else {
            print_help();
            bail!("missing audio file");
        };
        Ok(Self {
            audio,
            engine,
            accompany,
            export,
            once,
            loop_range,
            seconds,
            volume,
        })
    }
}

fn value<'a>(it: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<&'a str> {
    it.next()
        .map(String::as_str)
        .with_context(|| format!("{flag} requires a value"))
}

fn number(raw: &str, flag: &str) -> Result<f64> {
    let value: f64 = raw
        .parse()
        .with_context(|| format!("{flag}: '{raw}' is not a number"))?;
    ensure!(value.is_finite(), "{flag}: '{raw}' is not a finite number");
    Ok(value)
}

/// Wall-clock run time for `--seconds`; negative means zero and huge values
/// saturate.
fn run_length(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX)
}

fn print_help() {
    eprintln!("usage: audionotes <audio-file> [options]");
    eprintln!();
    eprintln!("  -e, --engine <path>    transcription/accompaniment executable");
    eprintln!("  -a, --accompany        generate an accompaniment after transcribing");
    eprintln!("  -o, --export <path>    write the notes as a MIDI file");
    eprintln!("      --loop <s> <e>     loop between two song times (seconds)");
    eprintln!("      --once             play through once instead of looping");
    eprintln!("  -s, --seconds <n>      stop after n seconds (default 30)");
    eprintln!("      --volume <0..1>    master volume, persisted");
}

fn mime_type_for(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "m4a" | "aac" => "audio/mp4",
        "webm" => "audio/webm",
        _ => return None,
    };
    Some(mime.to_string())
}

fn report(events: Vec<Event>) {
    for event in events {
        match event {
            Event::NotesUpdated {
                notes,
                total_duration,
            } => info!(notes = notes.len(), total_duration, "notes updated"),
            Event::KeyDetected {
                detected_key,
                key_signature,
            } => info!(?detected_key, ?key_signature, "key detected"),
            Event::MidiExported { path, bytes } => info!(%path, bytes, "midi exported"),
            Event::Notice { title, message } => info!("{title}: {message}"),
            Event::Error { title, message } => error!("{title}: {message}"),
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let storage: Option<Box<dyn StoragePort>> = match FsStorage::default_base_dir() {
        Ok(dir) => Some(Box::new(FsStorage::new(dir))),
        Err(err) => {
            warn!("settings will not be persisted: {err}");
            None
        }
    };

    let mut session = Session::with_audio_output(
        Box::new(CpalAudioOutputPort::new()),
        Arc::new(SimpleSynth::default()),
        storage,
    )
    .context("opening audio output")?;

    let engine_path = cli
        .engine
        .clone()
        .or_else(|| session.settings().transcription_engine_path.clone());
    session = session
        .with_transcriber(Box::new(CommandEngine::new(engine_path.clone())))
        .with_accompanist(Box::new(CommandEngine::new(engine_path)));

    if let Some(volume) = cli.volume {
        session.set_master_volume(Volume01::new(volume));
    }

    let bytes = std::fs::read(&cli.audio)
        .with_context(|| format!("reading {}", cli.audio.display()))?;
    let clip = AudioClip {
        bytes,
        file_name: cli
            .audio
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        mime_type: mime_type_for(&cli.audio),
    };
    let loaded = session.load_audio(clip);
    report(session.drain_events());
    let count = loaded.context("transcribing audio")?;
    if count == 0 {
        bail!("no notes were detected in {}", cli.audio.display());
    }

    if cli.accompany {
        if let Err(err) = session.generate_accompaniment() {
            warn!("continuing without accompaniment: {err}");
        }
        report(session.drain_events());
    }

    if let Some(path) = cli.export.as_deref() {
        session
            .export_midi(path)
            .with_context(|| format!("exporting {}", path.display()))?;
        report(session.drain_events());
    }

    if cli.once {
        session.set_loop(0.0, 0.0)?;
    } else if let Some((start, end)) = cli.loop_range {
        session.set_loop(start, end)?;
    }

    session.play(None).context("starting playback")?;
    report(session.drain_events());

    let started = Instant::now();
    let run_for = run_length(cli.seconds);
    while started.elapsed() < run_for {
        session.tick();
        report(session.drain_events());
        if !session.transport().is_playing {
            break;
        }
        thread::sleep(TICK_INTERVAL);
    }

    session.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numbers_must_be_finite() {
        assert_eq!(number("2.5", "--seconds").expect("parses"), 2.5);
        assert_eq!(number("-1", "--seconds").expect("parses"), -1.0);
        for raw in ["inf", "-inf", "infinity", "NaN", "1e400"] {
            let err = number(raw, "--seconds").expect_err(raw);
            assert!(err.to_string().contains("finite"), "{raw}: {err}");
        }
        assert!(number("abc", "--loop").is_err());
    }

    #[test]
    fn run_length_clamps_out_of_range_seconds() {
        assert_eq!(run_length(1.5), Duration::from_millis(1500));
        assert_eq!(run_length(-3.0), Duration::ZERO);
        assert_eq!(run_length(1e300), Duration::MAX);
    }
}
